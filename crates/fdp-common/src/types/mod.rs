//! Common types used across the pipeline
//!
//! A [`Table`] is the in-memory form of every artifact: the raw file, the
//! relational table, the extracted file and the cleaned file. Column types
//! are inferred structurally from text, the same way for every stage, so a
//! file written by one stage reads back with the same shape in the next.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Field values treated as missing when reading delimited text
pub const MISSING_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Date rendering used at every file boundary
pub const DATE_OUTPUT_FORMAT: &str = "%Y-%m-%d";

/// Whether a raw field denotes a missing value
pub fn is_missing(raw: &str) -> bool {
    MISSING_MARKERS.contains(&raw)
}

/// Render a float in shortest round-trip form, always with a decimal point
/// for finite integral values (`50.0`, not `50`).
///
/// Magnitudes of `1e16` and above, or below `1e-4`, use scientific notation
/// with a signed exponent of at least two digits (`1e+16`, `1.5e-05`).
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return String::new();
    }

    let shortest = format!("{:?}", value);
    match shortest.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        },
        None => shortest,
    }
}

// ============================================================================
// Column Types
// ============================================================================

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Date,
}

impl ColumnType {
    /// Infer a column type from its raw cells
    ///
    /// Missing cells are ignored. A column is `Integer` when every present
    /// cell parses as `i64`, `Float` when every present cell parses as `f64`,
    /// and `Text` otherwise (including a column with no present cells).
    pub fn infer<'a, I>(cells: I) -> Self
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut seen = false;
        let mut all_integer = true;
        let mut all_float = true;

        for cell in cells.into_iter().flatten() {
            seen = true;
            if all_integer && cell.parse::<i64>().is_err() {
                all_integer = false;
            }
            if cell.parse::<f64>().is_err() {
                all_float = false;
                break;
            }
        }

        match (seen, all_integer, all_float) {
            (false, _, _) => ColumnType::Text,
            (true, true, _) => ColumnType::Integer,
            (true, false, true) => ColumnType::Float,
            _ => ColumnType::Text,
        }
    }

    /// SQL type used when creating a relational column
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Integer => "BIGINT",
            ColumnType::Float => "DOUBLE PRECISION",
            ColumnType::Text => "TEXT",
            ColumnType::Date => "DATE",
        }
    }

    /// Map a catalog `data_type` name back to a column type
    pub fn from_sql_type(data_type: &str) -> Self {
        match data_type.to_ascii_lowercase().as_str() {
            "bigint" | "integer" | "smallint" | "int8" | "int4" | "int2" => ColumnType::Integer,
            "double precision" | "real" | "numeric" | "float8" | "float4" => ColumnType::Float,
            "date" => ColumnType::Date,
            _ => ColumnType::Text,
        }
    }

    /// Convert a raw cell into a value of this type
    ///
    /// Cells that do not fit the type are kept as text so no data is lost.
    pub fn parse_cell(self, raw: Option<&str>) -> Value {
        let Some(raw) = raw else {
            return Value::Null;
        };

        match self {
            ColumnType::Integer => raw
                .parse()
                .map(Value::Integer)
                .unwrap_or_else(|_| Value::Text(raw.to_string())),
            ColumnType::Float => raw
                .parse()
                .map(Value::Float)
                .unwrap_or_else(|_| Value::Text(raw.to_string())),
            ColumnType::Date => NaiveDate::parse_from_str(raw, DATE_OUTPUT_FORMAT)
                .map(Value::Date)
                .unwrap_or_else(|_| Value::Text(raw.to_string())),
            ColumnType::Text => Value::Text(raw.to_string()),
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::Text => write!(f, "text"),
            ColumnType::Date => write!(f, "date"),
        }
    }
}

// ============================================================================
// Values
// ============================================================================

/// A single cell
///
/// Equality and hashing are total so whole rows can be deduplicated:
/// floats compare by bit pattern with `-0.0` folded into `0.0`.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the text of a `Text` cell
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of `Integer` and `Float` cells
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// JSON form used for search documents
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => serde_json::Value::String(d.format(DATE_OUTPUT_FORMAT).to_string()),
        }
    }

    fn float_bits(f: f64) -> u64 {
        if f == 0.0 {
            0.0f64.to_bits()
        } else {
            f.to_bits()
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => Self::float_bits(*a) == Self::float_bits(*b),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {},
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => Self::float_bits(*f).hash(state),
            Value::Text(s) => s.hash(state),
            Value::Date(d) => d.hash(state),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", format_float(*v)),
            Value::Text(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format(DATE_OUTPUT_FORMAT)),
        }
    }
}

// ============================================================================
// Tables
// ============================================================================

/// An ordered set of named, typed columns and their rows
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub column_types: Vec<ColumnType>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with a fixed schema
    pub fn new(columns: Vec<String>, column_types: Vec<ColumnType>) -> Self {
        Self {
            columns,
            column_types,
            rows: Vec::new(),
        }
    }

    /// Build a table from raw text cells, inferring each column's type
    pub fn from_text_rows(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        let column_types: Vec<ColumnType> = (0..columns.len())
            .map(|idx| {
                ColumnType::infer(
                    rows.iter()
                        .map(|row| row.get(idx).and_then(|cell| cell.as_deref())),
                )
            })
            .collect();

        let rows = rows
            .iter()
            .map(|row| {
                column_types
                    .iter()
                    .enumerate()
                    .map(|(idx, ty)| ty.parse_cell(row.get(idx).and_then(|cell| cell.as_deref())))
                    .collect()
            })
            .collect();

        Self {
            columns,
            column_types,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by exact name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}
