//! Clean the extracted CSV
//!
//! Steps run in a fixed order:
//!
//! 1. Drop duplicate rows (first occurrence wins)
//! 2. Drop rows with any missing cell
//! 3. Lowercase column names and replace spaces with `_`
//! 4. `date`: parse with the configured format
//! 5. `amount`: strip the currency glyph and parse as a float
//! 6. `gender`: `M`/`F` to `Male`/`Female`
//! 7. `age`: floor to an integer
//! 8. `bank`: apply spelling corrections
//! 9. `fraud`: `0`/`1` to `Legitimate`/`Fraud`
//!
//! Steps 4 to 9 require their column after renaming. Under
//! [`ErrorPolicy::Abort`] the first unparsable cell fails the stage and no
//! output is written; under [`ErrorPolicy::Skip`] the row is logged and
//! dropped.

use chrono::{Datelike, NaiveDate};
use fdp_common::{ColumnType, PipelineError, Result, Table, Value};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use tracing::{info, warn};

use crate::artifact::{read_table, write_table};
use crate::config::{ErrorPolicy, NormalizeConfig};

pub const DATE_COLUMN: &str = "date";
pub const AMOUNT_COLUMN: &str = "amount";
pub const GENDER_COLUMN: &str = "gender";
pub const AGE_COLUMN: &str = "age";
pub const BANK_COLUMN: &str = "bank";
pub const FRAUD_COLUMN: &str = "fraud";

/// Row counts from cleaning a table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub rows_read: usize,
    pub duplicates_removed: usize,
    pub incomplete_removed: usize,
    /// Rows dropped for unparsable cells (skip policy only)
    pub rejected: usize,
    pub rows_written: usize,
}

/// Outcome of a Normalize run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeReport {
    pub stats: NormalizeStats,
    /// SHA-256 of the written file
    pub checksum: String,
}

/// Clean `source` and atomically write the result to `dest`
pub fn run(source: &Path, dest: &Path, config: &NormalizeConfig) -> Result<NormalizeReport> {
    let table = read_table(source)?;
    let (cleaned, stats) = normalize_table(table, config)?;
    let checksum = write_table(&cleaned, dest)?;

    info!(
        path = %dest.display(),
        rows_read = stats.rows_read,
        duplicates = stats.duplicates_removed,
        incomplete = stats.incomplete_removed,
        rejected = stats.rejected,
        rows = stats.rows_written,
        %checksum,
        "Wrote cleaned file"
    );

    Ok(NormalizeReport { stats, checksum })
}

/// Apply every cleaning step to an in-memory table
pub fn normalize_table(table: Table, config: &NormalizeConfig) -> Result<(Table, NormalizeStats)> {
    let mut cleaner = Cleaner::new(table, config.on_error);

    cleaner.drop_duplicates();
    cleaner.drop_incomplete();
    cleaner.rename_columns();

    cleaner.convert_column(DATE_COLUMN, ColumnType::Date, |value| {
        parse_date(value, &config.date_format)
    })?;
    cleaner.convert_column(AMOUNT_COLUMN, ColumnType::Float, |value| {
        parse_amount(value, &config.currency_symbol)
    })?;
    cleaner.convert_column(GENDER_COLUMN, ColumnType::Text, |value| Ok(expand_gender(value)))?;
    cleaner.convert_column(AGE_COLUMN, ColumnType::Integer, floor_age)?;
    cleaner.convert_column(BANK_COLUMN, ColumnType::Text, |value| {
        Ok(correct_bank(value, config))
    })?;
    cleaner.convert_column(FRAUD_COLUMN, ColumnType::Text, |value| Ok(label_fraud(value)))?;

    Ok(cleaner.finish())
}

/// Lowercase a header and replace spaces with underscores
pub fn normalize_column_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

struct Cleaner {
    table: Table,
    /// 1-based data row of each remaining row in the input file
    line_numbers: Vec<usize>,
    rejected: BTreeSet<usize>,
    policy: ErrorPolicy,
    stats: NormalizeStats,
}

impl Cleaner {
    fn new(table: Table, policy: ErrorPolicy) -> Self {
        let rows_read = table.len();
        Self {
            line_numbers: (1..=rows_read).collect(),
            table,
            rejected: BTreeSet::new(),
            policy,
            stats: NormalizeStats {
                rows_read,
                ..Default::default()
            },
        }
    }

    fn retain_rows(&mut self, keep: &[bool]) {
        let rows = std::mem::take(&mut self.table.rows);
        let lines = std::mem::take(&mut self.line_numbers);

        for ((row, line), keep) in rows.into_iter().zip(lines).zip(keep) {
            if *keep {
                self.table.rows.push(row);
                self.line_numbers.push(line);
            }
        }
    }

    fn drop_duplicates(&mut self) {
        let mut seen: HashSet<&[Value]> = HashSet::with_capacity(self.table.len());
        let mut keep = Vec::with_capacity(self.table.len());
        for row in &self.table.rows {
            keep.push(seen.insert(row.as_slice()));
        }
        drop(seen);

        let before = self.table.len();
        self.retain_rows(&keep);
        self.stats.duplicates_removed = before - self.table.len();
    }

    fn drop_incomplete(&mut self) {
        let keep: Vec<bool> = self
            .table
            .rows
            .iter()
            .map(|row| !row.iter().any(Value::is_null))
            .collect();

        let before = self.table.len();
        self.retain_rows(&keep);
        self.stats.incomplete_removed = before - self.table.len();
    }

    fn rename_columns(&mut self) {
        for column in &mut self.table.columns {
            *column = normalize_column_name(column);
        }
    }

    /// Replace every cell of `name` with `convert(cell)`
    fn convert_column<F>(&mut self, name: &str, column_type: ColumnType, mut convert: F) -> Result<()>
    where
        F: FnMut(&Value) -> std::result::Result<Value, String>,
    {
        let idx = self
            .table
            .column_index(name)
            .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))?;

        for (pos, row) in self.table.rows.iter_mut().enumerate() {
            if self.rejected.contains(&pos) {
                continue;
            }

            match convert(&row[idx]) {
                Ok(value) => row[idx] = value,
                Err(reason) => {
                    let line = self.line_numbers[pos];
                    match self.policy {
                        ErrorPolicy::Abort => return Err(PipelineError::parse(name, line, reason)),
                        ErrorPolicy::Skip => {
                            warn!(column = name, row = line, %reason, "Rejecting row");
                            self.rejected.insert(pos);
                        },
                    }
                }
            }
        }

        self.table.column_types[idx] = column_type;
        Ok(())
    }

    fn finish(mut self) -> (Table, NormalizeStats) {
        if !self.rejected.is_empty() {
            let keep: Vec<bool> = (0..self.table.len())
                .map(|pos| !self.rejected.contains(&pos))
                .collect();
            self.stats.rejected = self.rejected.len();
            self.retain_rows(&keep);
        }

        self.stats.rows_written = self.table.len();
        (self.table, self.stats)
    }
}

fn parse_date(value: &Value, format: &str) -> std::result::Result<Value, String> {
    match value {
        Value::Date(date) => Ok(Value::Date(*date)),
        Value::Text(text) => NaiveDate::parse_from_str(text, format)
            .map(|date| Value::Date(pivot_two_digit_year(date, format)))
            .map_err(|e| format!("'{}' does not match {}: {}", text, format, e)),
        other => Err(format!("'{}' does not match {}", other, format)),
    }
}

/// Move `%y` years onto the POSIX pivot: `00`-`68` are 2000-2068 and
/// `69`-`99` are 1969-1999. chrono reads `69` as 2069.
fn pivot_two_digit_year(date: NaiveDate, format: &str) -> NaiveDate {
    if format.contains("%y") && date.year() == 2069 {
        date.with_year(1969).unwrap_or(date)
    } else {
        date
    }
}

fn parse_amount(value: &Value, currency_symbol: &str) -> std::result::Result<Value, String> {
    if let Some(number) = value.as_f64() {
        return Ok(Value::Float(number));
    }

    let text = value.to_string();
    let stripped = match currency_symbol {
        "" => text.trim().to_string(),
        symbol => text.replace(symbol, ""),
    };

    stripped
        .trim()
        .parse::<f64>()
        .map(Value::Float)
        .map_err(|_| format!("'{}' is not a valid amount", text))
}

fn expand_gender(value: &Value) -> Value {
    match value.as_text() {
        Some("M") => Value::Text("Male".to_string()),
        Some("F") => Value::Text("Female".to_string()),
        _ => value.clone(),
    }
}

fn floor_age(value: &Value) -> std::result::Result<Value, String> {
    let number = match value {
        Value::Integer(i) => return Ok(Value::Integer(*i)),
        Value::Float(f) => *f,
        Value::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{}' is not numeric", text))?,
        other => return Err(format!("'{}' is not numeric", other)),
    };

    if !number.is_finite() {
        return Err(format!("'{}' is not a finite number", number));
    }

    let floored = number.floor();
    // i64::MAX as f64 rounds up to 2^63, which is out of range
    if floored < i64::MIN as f64 || floored >= i64::MAX as f64 {
        return Err(format!("'{}' is out of range for an integer age", number));
    }

    Ok(Value::Integer(floored as i64))
}

fn correct_bank(value: &Value, config: &NormalizeConfig) -> Value {
    value
        .as_text()
        .and_then(|bank| config.bank_corrections.iter().find(|c| c.from == bank))
        .map(|correction| Value::Text(correction.to.clone()))
        .unwrap_or_else(|| value.clone())
}

fn label_fraud(value: &Value) -> Value {
    match value.as_f64() {
        Some(flag) if flag == 0.0 => Value::Text("Legitimate".to_string()),
        Some(flag) if flag == 1.0 => Value::Text("Fraud".to_string()),
        _ => value.clone(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::BankCorrection;

    const HEADER: &str = "Date,Amount,Gender,Age,Bank,Fraud";

    fn table(body: &[&str]) -> Table {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        let mut text = format!("{}\n", HEADER);
        for line in body {
            text.push_str(line);
            text.push('\n');
        }
        std::fs::write(&path, text).unwrap();
        read_table(&path).unwrap()
    }

    fn clean(body: &[&str]) -> (Table, NormalizeStats) {
        normalize_table(table(body), &NormalizeConfig::default()).unwrap()
    }

    fn column<'t>(table: &'t Table, name: &str) -> Vec<&'t Value> {
        let idx = table.column_index(name).unwrap();
        table.rows.iter().map(|row| &row[idx]).collect()
    }

    #[test]
    fn test_end_to_end_row() {
        let (cleaned, stats) = clean(&["01-Jan-20,£50.00,F,29.9,Barlcays,0"]);

        assert_eq!(cleaned.columns, vec!["date", "amount", "gender", "age", "bank", "fraud"]);
        assert_eq!(
            cleaned.rows[0],
            vec![
                Value::Date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()),
                Value::Float(50.0),
                Value::Text("Female".into()),
                Value::Integer(29),
                Value::Text("Barclays".into()),
                Value::Text("Legitimate".into()),
            ]
        );
        assert_eq!(stats.rows_written, 1);
    }

    #[test]
    fn test_duplicates_and_incomplete_rows_are_dropped() {
        let (cleaned, stats) = clean(&[
            "18-Jun-24,£123.45,M,41,HSBC,1",
            "18-Jun-24,£123.45,M,41,HSBC,1",
            "19-Jun-24,,F,30,Monzo,0",
            "20-Jun-24,£9.99,F,NaN,Monzo,0",
            "21-Jun-24,£1.00,F,22,Monzo,0",
        ]);

        assert_eq!(stats.rows_read, 5);
        assert_eq!(stats.duplicates_removed, 1);
        assert_eq!(stats.incomplete_removed, 2);
        assert_eq!(stats.rows_written, 2);

        let unique: HashSet<&[Value]> = cleaned.rows.iter().map(|r| r.as_slice()).collect();
        assert_eq!(unique.len(), cleaned.len());
        assert!(cleaned.rows.iter().all(|row| row.iter().all(|v| !v.is_null())));
    }

    #[test]
    fn test_date_and_amount_parsing() {
        let (cleaned, _) = clean(&["18-Jun-24,£123.45,M,41,HSBC,1"]);
        assert_eq!(
            column(&cleaned, "date"),
            vec![&Value::Date(NaiveDate::from_ymd_opt(2024, 6, 18).unwrap())]
        );
        assert_eq!(column(&cleaned, "amount"), vec![&Value::Float(123.45)]);
    }

    #[test]
    fn test_age_floors_toward_negative_infinity() {
        let (cleaned, _) = clean(&[
            "01-Jan-20,£1.00,F,3.7,Monzo,0",
            "02-Jan-20,£1.00,F,-1.2,Monzo,0",
        ]);
        assert_eq!(
            column(&cleaned, "age"),
            vec![&Value::Integer(3), &Value::Integer(-2)]
        );
    }

    #[test]
    fn test_two_digit_year_pivot() {
        let (cleaned, _) = clean(&[
            "01-Jan-68,£1.00,F,30,Monzo,0",
            "01-Jan-69,£1.00,F,30,Monzo,0",
            "01-Jan-70,£1.00,F,30,Monzo,0",
            "31-Dec-99,£1.00,F,30,Monzo,0",
        ]);
        let expected: Vec<Value> = [(2068, 1, 1), (1969, 1, 1), (1970, 1, 1), (1999, 12, 31)]
            .iter()
            .map(|(y, m, d)| Value::Date(NaiveDate::from_ymd_opt(*y, *m, *d).unwrap()))
            .collect();
        assert_eq!(column(&cleaned, "date"), expected.iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_numeric_amount_and_float_fraud_flags() {
        let (cleaned, _) = clean(&[
            "01-Jan-20,50.00,F,30,Monzo,0.0",
            "02-Jan-20,7,M,31,Monzo,1.0",
            "03-Jan-20,12.5,F,32,Monzo,2.5",
        ]);
        assert_eq!(
            column(&cleaned, "amount"),
            vec![&Value::Float(50.0), &Value::Float(7.0), &Value::Float(12.5)]
        );
        assert_eq!(
            column(&cleaned, "fraud"),
            vec![
                &Value::Text("Legitimate".into()),
                &Value::Text("Fraud".into()),
                &Value::Float(2.5)
            ]
        );
    }

    #[test]
    fn test_out_of_range_age_is_rejected() {
        let err = normalize_table(
            table(&["01-Jan-20,£1.00,F,1e30,Monzo,0"]),
            &NormalizeConfig::default(),
        )
        .unwrap_err();
        match err {
            PipelineError::Parse { column, message, .. } => {
                assert_eq!(column, "age");
                assert!(message.contains("out of range"));
            },
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(floor_age(&Value::Float(-1e30)).is_err());
        assert_eq!(floor_age(&Value::Float(-3.5)).unwrap(), Value::Integer(-4));
    }

    #[test]
    fn test_unknown_labels_pass_through() {
        let (cleaned, _) = clean(&[
            "01-Jan-20,£1.00,X,30,Lloyds,2",
            "02-Jan-20,£1.00,M,30,Barlcays,1",
        ]);
        assert_eq!(
            column(&cleaned, "gender"),
            vec![&Value::Text("X".into()), &Value::Text("Male".into())]
        );
        assert_eq!(
            column(&cleaned, "bank"),
            vec![&Value::Text("Lloyds".into()), &Value::Text("Barclays".into())]
        );
        assert_eq!(
            column(&cleaned, "fraud"),
            vec![&Value::Integer(2), &Value::Text("Fraud".into())]
        );
    }

    #[test]
    fn test_column_names_are_normalized() {
        let raw = Table::from_text_rows(
            vec!["Date".into(), "Amount".into(), "Gender".into(), "Age".into(), "Bank".into(), "Fraud".into(), "Merchant Name".into()],
            vec![vec![
                Some("01-Jan-20".into()),
                Some("£5".into()),
                Some("M".into()),
                Some("30".into()),
                Some("HSBC".into()),
                Some("0".into()),
                Some("Tesco".into()),
            ]],
        );
        let (cleaned, _) = normalize_table(raw, &NormalizeConfig::default()).unwrap();
        assert_eq!(cleaned.columns[6], "merchant_name");
        assert_eq!(cleaned.rows[0][6], Value::Text("Tesco".into()));
    }

    #[test]
    fn test_bad_date_aborts_with_row_number() {
        let err = normalize_table(
            table(&["01-Jan-20,£1.00,F,30,Monzo,0", "2020-01-02,£1.00,F,30,Monzo,0"]),
            &NormalizeConfig::default(),
        )
        .unwrap_err();

        match err {
            PipelineError::Parse { column, row, .. } => {
                assert_eq!(column, "date");
                assert_eq!(row, 2);
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_bad_amount_aborts() {
        let err = normalize_table(
            table(&["01-Jan-20,$1.00,F,30,Monzo,0"]),
            &NormalizeConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Parse { ref column, .. } if column == "amount"));
    }

    #[test]
    fn test_skip_policy_drops_bad_rows() {
        let config = NormalizeConfig {
            on_error: ErrorPolicy::Skip,
            ..Default::default()
        };
        let (cleaned, stats) = normalize_table(
            table(&[
                "01-Jan-20,£1.00,F,30,Monzo,0",
                "not a date,£1.00,F,31,Monzo,0",
                "03-Jan-20,£1.00,F,old,Monzo,0",
                "04-Jan-20,£2.00,M,33,Monzo,1",
            ]),
            &config,
        )
        .unwrap();

        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.rows_written, 2);
        assert_eq!(
            column(&cleaned, "age"),
            vec![&Value::Integer(30), &Value::Integer(33)]
        );
    }

    #[test]
    fn test_missing_column() {
        let raw = Table::from_text_rows(
            vec!["Date".into(), "Amount".into()],
            vec![vec![Some("01-Jan-20".into()), Some("£1".into())]],
        );
        let err = normalize_table(raw, &NormalizeConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn(ref name) if name == "gender"));
    }

    #[test]
    fn test_custom_bank_corrections() {
        let config = NormalizeConfig {
            bank_corrections: vec![BankCorrection {
                from: "Natwest".into(),
                to: "NatWest".into(),
            }],
            ..Default::default()
        };
        let (cleaned, _) = normalize_table(
            table(&["01-Jan-20,£1.00,F,30,Natwest,0", "01-Jan-20,£1.00,F,30,Barlcays,0"]),
            &config,
        )
        .unwrap();
        assert_eq!(
            column(&cleaned, "bank"),
            vec![&Value::Text("NatWest".into()), &Value::Text("Barlcays".into())]
        );
    }

    #[test]
    fn test_run_is_idempotent_and_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("fraud_data_raw.csv");
        let dest = dir.path().join("fraud_data_clean.csv");
        std::fs::write(
            &source,
            format!("{}\n18-Jun-24,£123.45,M,41.5,Barlcays,1\n19-Jun-24,£7,F,23,HSBC,0\n", HEADER),
        )
        .unwrap();

        let config = NormalizeConfig::default();
        let first = run(&source, &dest, &config).unwrap();
        let first_bytes = std::fs::read(&dest).unwrap();
        let second = run(&source, &dest, &config).unwrap();

        assert_eq!(first.checksum, second.checksum);
        assert_eq!(first_bytes, std::fs::read(&dest).unwrap());
        assert_eq!(
            String::from_utf8(first_bytes).unwrap(),
            "date,amount,gender,age,bank,fraud\n\
             2024-06-18,123.45,Male,41,Barclays,Fraud\n\
             2024-06-19,7.0,Female,23,HSBC,Legitimate\n"
        );

        let bad = dir.path().join("bad.csv");
        let bad_dest = dir.path().join("bad_clean.csv");
        std::fs::write(&bad, format!("{}\nyesterday,£1,F,30,HSBC,0\n", HEADER)).unwrap();
        assert!(run(&bad, &bad_dest, &config).is_err());
        assert!(!bad_dest.exists());
    }
}
