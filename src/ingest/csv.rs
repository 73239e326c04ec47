// src/ingest/csv.rs
//! Delimiter-sniffing CSV reader for vendor exports.
//!
//! The first line decides the delimiter (`,` `;` tab `|`, highest count wins,
//! comma on ties). Quoted fields may contain delimiters, doubled quotes and
//! line breaks. Output is rectangular: short rows are padded, long rows cut.

use serde::Serialize;

use crate::error::ImportError;

const CANDIDATE_DELIMITERS: [char; 4] = [',', ';', '\t', '|'];

/// Result of parsing one export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub delimiter: char,
    /// Rows dropped because every cell was empty.
    pub blank_rows: usize,
    /// Rows whose width differed from the header row.
    pub ragged_rows: usize,
}

/// Pick the delimiter with the most occurrences on the first line.
pub fn detect_delimiter(text: &str) -> char {
    let first = text.lines().next().unwrap_or_default();
    let mut best = ',';
    let mut best_count = 0usize;
    for d in CANDIDATE_DELIMITERS {
        let n = first.matches(d).count();
        if n > best_count {
            best = d;
            best_count = n;
        }
    }
    best
}

/// Parse CSV text into headers + header-aligned rows.
pub fn parse(text: &str) -> Result<ParsedCsv, ImportError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    if text.trim().is_empty() {
        return Err(ImportError::Empty);
    }

    let delimiter = detect_delimiter(text);
    let mut records = split_records(text, delimiter).into_iter();

    let headers: Vec<String> = match records.next() {
        Some(h) => h.iter().map(|c| clean_header(c)).collect(),
        None => return Err(ImportError::Empty),
    };
    let width = headers.len();

    let mut rows = Vec::new();
    let mut blank_rows = 0usize;
    let mut ragged_rows = 0usize;
    for record in records {
        let mut cells: Vec<String> = record.iter().map(|c| clean_cell(c)).collect();
        if cells.iter().all(|c| c.is_empty()) {
            blank_rows += 1;
            continue;
        }
        if cells.len() != width {
            ragged_rows += 1;
            cells.resize(width, String::new());
        }
        rows.push(cells);
    }

    if rows.is_empty() {
        return Err(ImportError::NoDataRows);
    }

    Ok(ParsedCsv {
        headers,
        rows,
        delimiter,
        blank_rows,
        ragged_rows,
    })
}

/// Quote-aware split into records of raw (untrimmed) fields.
fn split_records(text: &str, delimiter: char) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            '"' if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
            }
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            c if c == delimiter => record.push(std::mem::take(&mut field)),
            c => field.push(c),
        }
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

fn clean_cell(raw: &str) -> String {
    html_escape::decode_html_entities(raw.trim()).trim().to_string()
}

fn clean_header(raw: &str) -> String {
    clean_cell(raw)
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}
