//! Two-line CSV codec for stored ideas.
//!
//! A stored idea is exactly one header line and one data line. Every field is
//! double-quoted with internal quotes doubled. Embedded newlines are not part of
//! the format: they are flattened to a single space on write.

use std::collections::HashMap;

/// A flat header -> value record.
pub type CsvRecord = HashMap<String, String>;

/// Fixed, ordered header list shared by the writer and the reader.
pub const IDEA_CSV_HEADERS: &[&str] = &[
    "idea_id",
    "session_uuid",
    "created_at",
    "updated_at",
    "created_by_email",
    "project_name",
    "problem_statement",
    "target_user",
    "solution_summary",
    "constraints",
    "differentiation",
    "risks",
    "next_action",
    "status",
    "priority",
    "tags",
    "source",
    "version",
    "image_url_1",
    "image_url_2",
    "image_url_3",
    "image_url_4",
    "image_url_5",
    "audio_transcript",
    "harness_project_type",
    "harness_tech_stack",
    "harness_features",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CsvError {
    #[error("CSV content needs a header and a data line, found {0} line(s)")]
    TooFewLines(usize),

    #[error("CSV header is missing expected column(s): {}", .0.join(", "))]
    MissingHeaders(Vec<String>),
}

/// Replace CR/LF sequences with a single space.
fn flatten_newlines(value: &str) -> String {
    if !value.contains(['\n', '\r']) {
        return value.to_string();
    }

    log::debug!("Flattening embedded newline(s) in CSV value");
    value
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
}

fn quote(value: &str) -> String {
    format!("\"{}\"", flatten_newlines(value).replace('"', "\"\""))
}

/// Quote and join one row of values.
pub fn serialize_row<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(|v| quote(v.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Serialize a record as one header line and one data line, in `header_order`.
///
/// Keys missing from `record` serialize as empty fields; keys not in
/// `header_order` are dropped.
pub fn serialize(record: &CsvRecord, header_order: &[&str]) -> String {
    let values: Vec<&str> = header_order
        .iter()
        .map(|h| record.get(*h).map(String::as_str).unwrap_or(""))
        .collect();

    format!("{}\n{}", header_order.join(","), serialize_row(&values))
}

/// Split one CSV line into fields, honoring quoted commas and `""` escapes.
pub fn parse_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);

    fields
}

/// Parse header + data line into a record.
///
/// When `expected_headers` is given every one of them must appear in the header
/// line. Values missing from a short data line become empty strings.
pub fn parse_record(content: &str, expected_headers: Option<&[&str]>) -> Result<CsvRecord, CsvError> {
    let lines: Vec<&str> = content
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .filter(|l| !l.trim().is_empty())
        .collect();

    if lines.len() < 2 {
        return Err(CsvError::TooFewLines(lines.len()));
    }
    if lines.len() > 2 {
        log::warn!("CSV content has {} lines; only the first data line is read", lines.len());
    }

    let headers = parse_row(lines[0]);
    let values = parse_row(lines[1]);

    if let Some(expected) = expected_headers {
        let missing: Vec<String> = expected
            .iter()
            .filter(|e| !headers.iter().any(|h| h == *e))
            .map(|e| e.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(CsvError::MissingHeaders(missing));
        }
    }

    if values.len() != headers.len() {
        log::warn!(
            "CSV field count mismatch: {} headers, {} values",
            headers.len(),
            values.len()
        );
    }

    let mut values = values.into_iter();
    Ok(headers
        .into_iter()
        .map(|h| (h, values.next().unwrap_or_default()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(pairs: &[(&str, &str)]) -> CsvRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_serialize_shape() {
        let r = record(&[("a", "1"), ("b", "two")]);
        assert_eq!(serialize(&r, &["a", "b", "c"]), "a,b,c\n\"1\",\"two\",\"\"");
    }

    #[test]
    fn test_round_trip() {
        let r = record(&[
            ("project_name", "Acme"),
            ("tags", "a, b, c"),
            ("solution_summary", "He said \"hi\", twice"),
            ("risks", ""),
        ]);
        let headers = ["project_name", "tags", "solution_summary", "risks"];
        let parsed = parse_record(&serialize(&r, &headers), Some(&headers)).unwrap();
        assert_eq!(parsed, r);
    }

    #[test]
    fn test_parse_row_quoted_comma_and_escape() {
        let line = serialize_row(&["He said \"hi\", twice", "plain"]);
        assert_eq!(line, "\"He said \"\"hi\"\", twice\",\"plain\"");
        assert_eq!(
            parse_row(&line),
            vec!["He said \"hi\", twice".to_string(), "plain".to_string()]
        );
    }

    #[test]
    fn test_parse_row_unquoted() {
        assert_eq!(parse_row("a,b,,c"), vec!["a", "b", "", "c"]);
    }

    #[test]
    fn test_too_few_lines() {
        assert_eq!(parse_record("a,b", None), Err(CsvError::TooFewLines(1)));
        assert_eq!(parse_record("a,b\n", None), Err(CsvError::TooFewLines(1)));
        assert_eq!(parse_record("", None), Err(CsvError::TooFewLines(0)));
    }

    #[test]
    fn test_trailing_newline_and_crlf() {
        let parsed = parse_record("a,b\r\n\"1\",\"2\"\r\n", None).unwrap();
        assert_eq!(parsed, record(&[("a", "1"), ("b", "2")]));
    }

    #[test]
    fn test_missing_expected_header() {
        let err = parse_record("a\n\"1\"", Some(&["a", "b"])).unwrap_err();
        assert_eq!(err, CsvError::MissingHeaders(vec!["b".to_string()]));
    }

    #[test]
    fn test_short_data_line_zips_empty() {
        let parsed = parse_record("a,b,c\n\"1\"", None).unwrap();
        assert_eq!(parsed, record(&[("a", "1"), ("b", ""), ("c", "")]));
    }

    #[test]
    fn test_newlines_flattened_on_write() {
        let r = record(&[("t", "line one\nline two\r\nthree")]);
        let out = serialize(&r, &["t"]);
        assert_eq!(out.lines().count(), 2);
        let parsed = parse_record(&out, None).unwrap();
        assert_eq!(parsed["t"], "line one line two three");
    }

    #[test]
    fn test_header_list_is_unique() {
        let mut seen = std::collections::HashSet::new();
        assert!(IDEA_CSV_HEADERS.iter().all(|h| seen.insert(*h)));
        assert_eq!(
            IDEA_CSV_HEADERS.iter().filter(|h| h.starts_with("image_url_")).count(),
            5
        );
    }
}
