//! Turning raw `ovs-vsctl` output into a `Snapshot`. The stages are pure and run in order: the
//! sanitizer strips session noise, the record parser splits listings into records, and the
//! topology builder correlates the three tables.

pub mod sanitizer;
pub mod records;
pub mod topology;
