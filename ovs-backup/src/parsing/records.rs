use std::collections::BTreeMap;
use lazy_static::lazy_static;
use regex::Regex;
use crate::error::OvsBackupError;

lazy_static! {
    static ref KEY_VALUE: Regex = Regex::new(r"^([^\s:]+)\s*:\s*(.*)$").unwrap();
}

/// One row of an `ovs-vsctl list <table>` listing as column name to raw value. Transient, only
/// lives until the topology builder has consumed it.
pub type RawRecord = BTreeMap<String, String>;

/// The records decoded from one table listing, plus the lines that could not be decoded
#[derive(Debug, Default)]
pub struct ParsedTable {
    pub records: Vec<RawRecord>,
    pub skipped: Vec<OvsBackupError>,
}

/// Splits sanitized listing text into records. Records end at a blank line, or where a column
/// repeats inside the open record. Sanitized text has no blank lines left, so the repeated column
/// (`_uuid` for `ovs-vsctl list`, `name` for hand written listings) is what frames it.
pub struct RecordParser {
    table: String,
}

impl RecordParser {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
        }
    }

    pub fn parse(&self, text: &str) -> ParsedTable {
        let mut parsed = ParsedTable::default();
        let mut current = RawRecord::new();

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                if !current.is_empty() {
                    parsed.records.push(std::mem::take(&mut current));
                }
                continue;
            }
            let Some(captures) = KEY_VALUE.captures(line) else {
                tracing::debug!("{} listing line {} is not a key value pair, skipping: {:?}", &self.table, index + 1, line);
                parsed.skipped.push(OvsBackupError::MalformedRecord {
                    table: self.table.clone(),
                    line_number: index + 1,
                    line: line.to_string(),
                });
                continue;
            };
            let key = captures[1].to_string();
            let value = strip_quotes(captures[2].trim()).to_string();
            if current.contains_key(&key) {
                parsed.records.push(std::mem::take(&mut current));
            }
            current.insert(key, value);
        }
        if !current.is_empty() {
            parsed.records.push(current);
        }

        parsed
    }
}

/// Remove one pair of surrounding double quotes
pub fn strip_quotes(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Decode a set column such as `ports : [abcd-1, efgh-2]`. A bare single value is accepted as a set
/// of one, which is how `ovs-vsctl` prints sets with a single member in some columns.
pub fn parse_identifier_list(value: &str) -> Vec<String> {
    let inner = value.trim();
    let inner = inner.strip_prefix('[').unwrap_or(inner);
    let inner = inner.strip_suffix(']').unwrap_or(inner);
    inner.split(',')
        .map(|s| strip_quotes(s.trim()).to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_line_framing() {
        let text = "name: \"br0\"\nports: [abcd-1]\n\nname: \"br1\"\nports: []\n";
        let parsed = RecordParser::new("bridge").parse(text);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].get("name").unwrap(), "br0");
        assert_eq!(parsed.records[0].get("ports").unwrap(), "[abcd-1]");
        assert_eq!(parsed.records[1].get("name").unwrap(), "br1");
        assert!(parsed.skipped.is_empty());
    }

    #[test]
    fn test_repeated_key_framing() {
        // what the sanitizer leaves of an `ovs-vsctl list interface` listing
        let text = "_uuid               : 1111\n\
name                : eth0\n\
type                : \"\"\n\
_uuid               : 2222\n\
name                : vport1\n\
type                : internal";
        let parsed = RecordParser::new("interface").parse(text);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].get("_uuid").unwrap(), "1111");
        assert_eq!(parsed.records[0].get("type").unwrap(), "");
        assert_eq!(parsed.records[1].get("_uuid").unwrap(), "2222");
        assert_eq!(parsed.records[1].get("name").unwrap(), "vport1");
    }

    #[test]
    fn test_repeated_name_framing() {
        let text = "name: br0\nports: [a]\nname: br1\nports: [b]";
        let parsed = RecordParser::new("bridge").parse(text);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[1].get("ports").unwrap(), "[b]");
    }

    #[test]
    fn test_undecodable_lines_are_skipped() {
        let text = "name : br0\nthis is not a column\nports : []";
        let parsed = RecordParser::new("bridge").parse(text);
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].len(), 2);
        assert_eq!(parsed.skipped.len(), 1);
        match &parsed.skipped[0] {
            OvsBackupError::MalformedRecord { line_number, line, .. } => {
                assert_eq!(*line_number, 2);
                assert_eq!(line, "this is not a column");
            }
            other => panic!("unexpected diagnostic {other:?}"),
        }
    }

    #[test]
    fn test_empty_input() {
        let parsed = RecordParser::new("port").parse("");
        assert!(parsed.records.is_empty());
        assert!(parsed.skipped.is_empty());
    }

    #[test]
    fn test_value_with_colons() {
        let parsed = RecordParser::new("interface").parse("external_ids : {iface-id=\"sw0-port1\", attached-mac=\"00:00:00:00:00:01\"}");
        assert_eq!(
            parsed.records[0].get("external_ids").unwrap(),
            "{iface-id=\"sw0-port1\", attached-mac=\"00:00:00:00:00:01\"}"
        );
    }

    #[test]
    fn test_parse_identifier_list() {
        assert_eq!(parse_identifier_list("[abcd-1, efgh-2]"), vec!["abcd-1", "efgh-2"]);
        assert_eq!(parse_identifier_list("[]"), Vec::<String>::new());
        assert_eq!(parse_identifier_list(""), Vec::<String>::new());
        assert_eq!(parse_identifier_list("abcd-1"), vec!["abcd-1"]);
    }

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("\"br0\""), "br0");
        assert_eq!(strip_quotes("\"\""), "");
        assert_eq!(strip_quotes("\""), "\"");
        assert_eq!(strip_quotes("br0"), "br0");
    }
}
