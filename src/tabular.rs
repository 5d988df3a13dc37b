use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+(?:[.,]\d+)?$").expect("number pattern"));
static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d{4}-\d{2}-\d{2}|\d{1,2}[./]\d{1,2}[./]\d{2,4})$").expect("date pattern")
});

/// How many leading rows the type heuristic samples.
const TYPE_SAMPLE_ROWS: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Number,
    Date,
}

/// Header-indexed row data supplied by the external tabular source.
/// Read-only to the core; the merge only ever builds per-row views of it.
#[derive(Clone, Debug, Default)]
pub struct DataTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// columnName -> value view of one row. Short rows simply omit the
    /// trailing columns; the renderer treats a missing value as empty.
    pub fn row_map(&self, index: usize) -> HashMap<String, String> {
        let mut map = HashMap::new();
        if let Some(row) = self.rows.get(index) {
            for (i, header) in self.headers.iter().enumerate() {
                if let Some(value) = row.get(i) {
                    map.insert(header.clone(), value.clone());
                }
            }
        }
        map
    }

    /// First non-empty value of a column, for mapping previews.
    pub fn sample_value(&self, column: usize) -> Option<&str> {
        self.rows
            .iter()
            .filter_map(|r| r.get(column))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }

    /// Heuristic column type from a sample of leading rows: a strict
    /// majority of non-empty samples must agree, otherwise Text.
    pub fn inferred_type(&self, column: usize) -> ColumnType {
        let mut total = 0usize;
        let mut numbers = 0usize;
        let mut dates = 0usize;
        for row in self.rows.iter().take(TYPE_SAMPLE_ROWS) {
            let value = match row.get(column) {
                Some(v) => v.trim(),
                None => continue,
            };
            if value.is_empty() {
                continue;
            }
            total += 1;
            if DATE_RE.is_match(value) {
                dates += 1;
            } else if NUMBER_RE.is_match(value) {
                numbers += 1;
            }
        }
        if total == 0 {
            return ColumnType::Text;
        }
        if dates * 2 > total {
            ColumnType::Date
        } else if numbers * 2 > total {
            ColumnType::Number
        } else {
            ColumnType::Text
        }
    }

    /// CLI-side adapter over the external data file. The core itself never
    /// parses text; it only consumes the resulting headers + rows.
    pub fn from_csv_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read data file: {}", path.display()))?;
        let delimiter = detect_delimiter(raw.lines().next().unwrap_or(""));
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(raw.as_bytes());
        let headers: Vec<String> = reader
            .headers()
            .context("read csv header")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.context("read csv record")?;
            rows.push(record.iter().map(|v| v.to_string()).collect());
        }
        Ok(Self { headers, rows })
    }
}

fn detect_delimiter(header_line: &str) -> u8 {
    let semicolons = header_line.matches(';').count();
    let commas = header_line.matches(',').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> DataTable {
        DataTable::new(
            vec!["name".into(), "amount".into(), "opened".into()],
            vec![
                vec!["Alice".into(), "100".into(), "2024-01-05".into()],
                vec!["Bob".into(), "2500,50".into(), "12/03/2024".into()],
                vec!["".into(), "7".into(), "2023-11-30".into()],
            ],
        )
    }

    #[test]
    fn row_map_is_header_keyed_and_tolerates_short_rows() {
        let mut t = table();
        t.rows.push(vec!["Carol".into()]);
        let m = t.row_map(3);
        assert_eq!(m.get("name").map(String::as_str), Some("Carol"));
        assert!(!m.contains_key("amount"));
    }

    #[test]
    fn sample_value_skips_blanks() {
        let t = table();
        assert_eq!(t.sample_value(0), Some("Alice"));
        assert_eq!(t.sample_value(1), Some("100"));
    }

    #[test]
    fn type_inference_majority_vote() {
        let t = table();
        assert_eq!(t.inferred_type(0), ColumnType::Text);
        assert_eq!(t.inferred_type(1), ColumnType::Number);
        assert_eq!(t.inferred_type(2), ColumnType::Date);
    }

    #[test]
    fn delimiter_sniffing_prefers_semicolons_when_dominant() {
        assert_eq!(detect_delimiter("a;b;c"), b';');
        assert_eq!(detect_delimiter("a,b,c"), b',');
        assert_eq!(detect_delimiter("a;b,c;d"), b';');
    }
}
