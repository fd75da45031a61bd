//! Birthday record store.
//!
//! Loads `last_name,first_name,YYYY-MM-DD` lines into memory. Imports are
//! all-or-nothing: the first malformed line fails the import and the
//! previously loaded records stay in place.

use std::path::Path;

use chrono::NaiveDate;
use log::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::BirthdayRecord;

const FIELD_COUNT: usize = 3;
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Default)]
pub struct BirthdayStore {
    records: Vec<BirthdayRecord>,
}

impl BirthdayStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[BirthdayRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Replaces the loaded records with the contents of `path`.
    pub fn import(&mut self, path: &Path) -> AppResult<&[BirthdayRecord]> {
        let contents = std::fs::read_to_string(path)?;
        self.import_str(&contents)?;
        info!("Imported {} birthdays from {}", self.records.len(), path.display());
        Ok(&self.records)
    }

    pub fn import_str(&mut self, contents: &str) -> AppResult<&[BirthdayRecord]> {
        self.records = parse_records(contents)?;
        Ok(&self.records)
    }
}

pub fn parse_records(contents: &str) -> AppResult<Vec<BirthdayRecord>> {
    let mut records = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if let Some(record) = parse_line(index + 1, line)? {
            records.push(record);
        }
    }
    Ok(records)
}

/// Parses one line. Blank lines yield `Ok(None)`.
pub fn parse_line(line_number: usize, line: &str) -> AppResult<Option<BirthdayRecord>> {
    let line = line.trim().trim_start_matches('\u{feff}');
    if line.is_empty() {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != FIELD_COUNT {
        return Err(AppError::parse(
            line_number,
            format!(
                "expected {} comma-separated fields (last,first,YYYY-MM-DD), found {}",
                FIELD_COUNT,
                fields.len()
            ),
        ));
    }

    let (last, first, date) = (fields[0], fields[1], fields[2]);
    if last.is_empty() || first.is_empty() {
        return Err(AppError::parse(line_number, "name fields must not be empty"));
    }

    let birth_date = NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|e| {
        AppError::parse(line_number, format!("invalid date '{}': {}", date, e))
    })?;

    debug!("Parsed line {}: {} {} born {}", line_number, first, last, birth_date);
    Ok(Some(BirthdayRecord::new(last, first, birth_date)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_strips_whitespace() {
        let record = parse_line(1, " Lovelace , Ada , 1990-04-01 ").unwrap().unwrap();
        assert_eq!(
            record,
            BirthdayRecord::new("Lovelace", "Ada", NaiveDate::from_ymd_opt(1990, 4, 1).unwrap())
        );
    }

    #[test]
    fn test_parse_line_blank() {
        assert_eq!(parse_line(1, "").unwrap(), None);
        assert_eq!(parse_line(2, "   \t ").unwrap(), None);
    }

    #[test]
    fn test_parse_line_wrong_field_count() {
        let err = parse_line(4, "Lovelace,Ada").unwrap_err();
        assert!(matches!(err, AppError::Parse { line: 4, .. }));

        let err = parse_line(5, "Lovelace,Ada,1990-04-01,extra").unwrap_err();
        assert!(matches!(err, AppError::Parse { line: 5, .. }));
    }

    #[test]
    fn test_parse_line_invalid_date() {
        for bad in ["Snow,Jon,1990-02-30", "Snow,Jon,04/01/1990", "Snow,Jon,"] {
            let err = parse_line(9, bad).unwrap_err();
            assert!(matches!(err, AppError::Parse { line: 9, .. }), "{}", bad);
        }
    }

    #[test]
    fn test_parse_line_empty_name() {
        let err = parse_line(2, " ,Ada,1990-04-01").unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn test_parse_records_skips_blank_lines_and_reports_line_numbers() {
        let text = "Snow,Jon,1986-12-26\n\n  \nStark,Arya,1997-04-15\nbroken line\n";
        let err = parse_records(text).unwrap_err();
        assert!(matches!(err, AppError::Parse { line: 5, .. }));

        let records = parse_records("Snow,Jon,1986-12-26\n\nStark,Arya,1997-04-15\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].display_name(), "Arya Stark");
    }

    #[test]
    fn test_import_replaces_and_failed_import_keeps_previous() {
        let mut store = BirthdayStore::new();
        store.import_str("Snow,Jon,1986-12-26").unwrap();
        store.import_str("Stark,Arya,1997-04-15\nStark,Sansa,1996-02-21").unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.records()[0].first_name, "Arya");

        assert!(store.import_str("nonsense").is_err());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_byte_order_mark_is_ignored() {
        let records = parse_records("\u{feff}Snow,Jon,1986-12-26\n").unwrap();
        assert_eq!(records[0].last_name, "Snow");
    }
}
