//! Input records and the tab-separated line format they are stored in.
//!
//! A store line is `identifier \t version \t neighbor,neighbor,...`. The
//! neighbor field may be missing or empty; both mean the identifier is an
//! active member with no coaching edges.

use crate::error::RolloutError;

/// One active member and the identifiers it is directly related to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub identifier: String,
    /// `None` and `Some(vec![])` both describe an isolated member.
    pub neighbors: Option<Vec<String>>,
}

impl Record {
    #[must_use]
    pub fn isolated(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            neighbors: None,
        }
    }

    pub fn with_neighbors<I, S>(identifier: impl Into<String>, neighbors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identifier: identifier.into(),
            neighbors: Some(neighbors.into_iter().map(Into::into).collect()),
        }
    }

    /// Neighbor identifiers, empty for isolated members.
    #[must_use]
    pub fn neighbor_list(&self) -> &[String] {
        self.neighbors.as_deref().unwrap_or(&[])
    }
}

/// Borrowed view of one parsed store line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLine<'a> {
    pub identifier: &'a str,
    pub version: &'a str,
    /// Raw neighbor field; `None` when absent or empty.
    pub neighbors: Option<&'a str>,
}

impl StoreLine<'_> {
    #[must_use]
    pub fn to_record(&self) -> Record {
        Record {
            identifier: self.identifier.to_string(),
            neighbors: self
                .neighbors
                .map(|field| field.split(',').map(str::to_string).collect()),
        }
    }
}

/// Split one line (without its terminator) into fields.
///
/// Returns `Ok(None)` for blank lines. `line_no` is 1-based and only used for
/// error reporting.
///
/// # Errors
///
/// Returns [`RolloutError::MalformedRecord`] when the identifier or version
/// field is missing or empty, or when the neighbor list has an empty entry.
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<StoreLine<'_>>, RolloutError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(None);
    }

    let malformed = |reason: &str| RolloutError::MalformedRecord {
        line: line_no,
        reason: reason.to_string(),
    };

    let mut fields = line.splitn(3, '\t');
    let identifier = fields.next().unwrap_or_default();
    if identifier.is_empty() {
        return Err(malformed("empty identifier"));
    }
    let version = fields.next().ok_or_else(|| malformed("missing version field"))?;
    if version.is_empty() {
        return Err(malformed("empty version field"));
    }

    let neighbors = fields.next().map(|field| field.trim_end_matches('\t'));
    let neighbors = match neighbors {
        Some(field) if !field.is_empty() => {
            if field.contains('\t') {
                return Err(malformed("unexpected extra field"));
            }
            if field.split(',').any(str::is_empty) {
                return Err(malformed("empty neighbor identifier"));
            }
            Some(field)
        }
        _ => None,
    };

    Ok(Some(StoreLine {
        identifier,
        version,
        neighbors,
    }))
}

/// Format a record back into a store line (without terminator).
#[must_use]
pub fn format_line(identifier: &str, version: &str, neighbors: &[String]) -> String {
    format!("{identifier}\t{version}\t{}", neighbors.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_fields() {
        let line = parse_line("a\t1.1\tb,c\n", 1).unwrap().unwrap();
        assert_eq!(line.identifier, "a");
        assert_eq!(line.version, "1.1");
        assert_eq!(line.neighbors, Some("b,c"));
        assert_eq!(
            line.to_record(),
            Record::with_neighbors("a", ["b", "c"])
        );
    }

    #[test]
    fn empty_or_missing_neighbor_field_is_isolated() {
        let trailing_tab = parse_line("a\t1.1\t", 1).unwrap().unwrap();
        let two_fields = parse_line("a\t1.1", 1).unwrap().unwrap();
        assert_eq!(trailing_tab.neighbors, None);
        assert_eq!(two_fields.neighbors, None);
        assert_eq!(two_fields.to_record(), Record::isolated("a"));
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert!(parse_line("", 3).unwrap().is_none());
        assert!(parse_line("   \r\n", 3).unwrap().is_none());
    }

    #[test]
    fn missing_version_is_malformed() {
        let err = parse_line("lonely", 4).unwrap_err();
        assert!(matches!(err, RolloutError::MalformedRecord { line: 4, .. }));
    }

    #[test]
    fn empty_neighbor_entry_is_malformed() {
        let err = parse_line("a\t1.1\tb,,c", 2).unwrap_err();
        assert!(err.to_string().contains("empty neighbor"));
    }

    #[test]
    fn empty_identifier_is_malformed() {
        assert!(parse_line("\t1.1\tb", 1).is_err());
    }

    #[test]
    fn crlf_terminators_are_stripped() {
        let line = parse_line("a\t2.0\tb\r\n", 1).unwrap().unwrap();
        assert_eq!(line.neighbors, Some("b"));
    }

    #[test]
    fn empty_and_absent_neighbor_lists_read_the_same() {
        assert!(Record::isolated("x").neighbor_list().is_empty());
        assert!(Record::with_neighbors("x", Vec::<String>::new()).neighbor_list().is_empty());
    }

    #[test]
    fn format_line_round_trips_through_parse() {
        let neighbors = vec!["b".to_string(), "c".to_string()];
        let text = format_line("a", "3.0", &neighbors);
        let parsed = parse_line(&text, 1).unwrap().unwrap();
        assert_eq!(parsed.version, "3.0");
        assert_eq!(parsed.neighbors, Some("b,c"));
    }
}
