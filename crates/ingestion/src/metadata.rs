//! Metadata parser
//!
//! The metadata file is an exam-schedule spreadsheet exported as CSV:
//! a few title lines, then records of `date, item code, "CODE - Title", scripts`.
//! A record carrying only a date starts a new exam day for the records below it.

use serde::Serialize;

/// One paper listed in the metadata file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataRow {
    pub exam_date: String,
    pub code: String,
    pub title: String,
    /// Parsed for completeness; not used by the import
    pub script_count: Option<String>,
}

/// Parse metadata text into rows, in file order.
///
/// The first `header_lines` physical lines are skipped before CSV parsing
/// starts. Records with an empty code or title are dropped.
pub fn parse_metadata(text: &str, header_lines: usize) -> Result<Vec<MetadataRow>, csv::Error> {
    let body = skip_lines(text.trim_start_matches('\u{feff}'), header_lines);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let mut rows = Vec::new();
    let mut current_date: Option<String> = None;

    for record in reader.records() {
        let record = record?;
        let column = |i: usize| record.get(i).unwrap_or("");

        let (date, code, title) = (column(0), column(1), column(2));

        if is_date_like(date) && code.is_empty() {
            current_date = Some(date.to_string());
            continue;
        }

        if code.is_empty() || title.is_empty() {
            continue;
        }

        rows.push(MetadataRow {
            exam_date: current_date.clone().unwrap_or_else(|| date.to_string()),
            code: code.to_string(),
            title: title.to_string(),
            script_count: Some(column(3)).filter(|s| !s.is_empty()).map(String::from),
        });
    }

    Ok(rows)
}

fn is_date_like(value: &str) -> bool {
    !value.is_empty() && (value.contains('-') || value.contains('/'))
}

fn skip_lines(text: &str, count: usize) -> &str {
    let mut rest = text;
    for _ in 0..count {
        match rest.find('\n') {
            Some(pos) => rest = &rest[pos + 1..],
            None => return "",
        }
    }
    rest
}
