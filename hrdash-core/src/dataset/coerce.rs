//! Raw cell → typed value conversion and column type inference

use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use super::schema::ColumnType;
use super::table::Value;

/// A cell as read from the uploaded file. CSV cells are always `Text`;
/// spreadsheet cells keep the type the workbook stored.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl RawCell {
    /// Empty cells and whitespace-only text both mean NULL
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Short form used in warnings
    pub fn describe(&self) -> String {
        match self {
            Self::Empty => "<empty>".to_string(),
            Self::Text(s) => format!("'{}'", s),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Bool(v) => v.to_string(),
            Self::DateTime(v) => v.to_string(),
        }
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y", "%d-%b-%Y", "%d %b %Y"];

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Largest serial Excel can represent (9999-12-31)
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

static GROUPED_NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?\d{1,3}(,\d{3})+(\.\d+)?$").expect("invalid grouped number regex")
});

/// Convert one cell to the requested type. `Err` carries a human-readable
/// reason for the row warning.
pub fn coerce_cell(cell: &RawCell, ty: ColumnType) -> Result<Value, String> {
    if cell.is_blank() {
        return Ok(Value::Null);
    }

    let converted = match ty {
        ColumnType::Integer => to_integer(cell).map(Value::Int),
        ColumnType::Float => to_float(cell).map(Value::Float),
        ColumnType::Decimal => to_decimal(cell).map(Value::Decimal),
        ColumnType::Text => Some(Value::Text(to_text(cell))),
        ColumnType::Boolean => to_bool(cell).map(Value::Bool),
        ColumnType::Date => to_date(cell).map(Value::Date),
        ColumnType::Timestamp => to_timestamp(cell).map(Value::Timestamp),
    };

    converted.ok_or_else(|| format!("{} is not a valid {}", cell.describe(), ty))
}

/// Pick a column type from the cells' dominant family.
///
/// Each non-blank cell is classed as numeric, temporal, boolean or text.
/// When a non-text family covers at least half of the non-blank cells the
/// column takes that family's type, widened across its members (integers
/// to floats, dates to timestamps). Ties go to numeric, then temporal,
/// then boolean. Cells outside the family then fail coercion and go
/// through the malformed-row policy. Anything else, including a column
/// with no values at all, is text.
pub fn infer_column_type<'a>(cells: impl IntoIterator<Item = &'a RawCell>) -> ColumnType {
    let mut non_blank = 0usize;
    let mut families: [(usize, Option<ColumnType>); 3] = [(0, None); 3];

    for cell in cells {
        if cell.is_blank() {
            continue;
        }
        non_blank += 1;
        let kind = cell_kind(cell);
        let Some(family) = family_of(kind) else {
            continue;
        };
        let (count, ty) = &mut families[family];
        *count += 1;
        *ty = Some(match *ty {
            None => kind,
            Some(current) => widen(current, kind),
        });
    }

    families
        .into_iter()
        .find(|(count, _)| *count > 0 && *count * 2 >= non_blank)
        .and_then(|(_, ty)| ty)
        .unwrap_or(ColumnType::Text)
}

/// Index into the inference tally; text has no family
fn family_of(kind: ColumnType) -> Option<usize> {
    match kind {
        ColumnType::Integer | ColumnType::Float | ColumnType::Decimal => Some(0),
        ColumnType::Date | ColumnType::Timestamp => Some(1),
        ColumnType::Boolean => Some(2),
        ColumnType::Text => None,
    }
}

fn cell_kind(cell: &RawCell) -> ColumnType {
    match cell {
        RawCell::Empty => ColumnType::Text,
        RawCell::Int(_) => ColumnType::Integer,
        RawCell::Float(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => ColumnType::Integer,
        RawCell::Float(_) => ColumnType::Float,
        RawCell::Bool(_) => ColumnType::Boolean,
        RawCell::DateTime(dt) if dt.time() == NaiveTime::MIN => ColumnType::Date,
        RawCell::DateTime(_) => ColumnType::Timestamp,
        RawCell::Text(s) => {
            let s = s.trim();
            if parse_int(s).is_some() {
                ColumnType::Integer
            } else if parse_float(s).is_some() {
                ColumnType::Float
            } else if parse_bool_word(s).is_some() {
                ColumnType::Boolean
            } else if parse_date(s).is_some() {
                ColumnType::Date
            } else if parse_timestamp(s).is_some() {
                ColumnType::Timestamp
            } else {
                ColumnType::Text
            }
        }
    }
}

/// Widen within one family
fn widen(current: ColumnType, next: ColumnType) -> ColumnType {
    use ColumnType::*;
    match (current, next) {
        (a, b) if a == b => a,
        (Integer, Float) | (Float, Integer) => Float,
        (Date, Timestamp) | (Timestamp, Date) => Timestamp,
        _ => Text,
    }
}

fn strip_grouping(s: &str) -> std::borrow::Cow<'_, str> {
    if GROUPED_NUMBER_RE.is_match(s) {
        std::borrow::Cow::Owned(s.replace(',', ""))
    } else {
        std::borrow::Cow::Borrowed(s)
    }
}

fn parse_int(s: &str) -> Option<i64> {
    strip_grouping(s).parse::<i64>().ok()
}

fn parse_float(s: &str) -> Option<f64> {
    let cleaned = strip_grouping(s);
    // f64::from_str also accepts "inf" and "NaN"
    if !cleaned.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_bool_word(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    parse_bool_word(s).or_else(|| match s.to_ascii_lowercase().as_str() {
        "y" | "t" | "1" => Some(true),
        "n" | "f" | "0" => Some(false),
        _ => None,
    })
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(1.0..=MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}

fn whole_float_to_i64(v: f64) -> Option<i64> {
    (v.fract() == 0.0 && v.abs() < 9.0e15).then_some(v as i64)
}

fn to_integer(cell: &RawCell) -> Option<i64> {
    match cell {
        RawCell::Int(v) => Some(*v),
        RawCell::Float(v) => whole_float_to_i64(*v),
        RawCell::Text(s) => {
            let s = s.trim();
            parse_int(s).or_else(|| parse_float(s).and_then(whole_float_to_i64))
        }
        _ => None,
    }
}

fn to_float(cell: &RawCell) -> Option<f64> {
    match cell {
        RawCell::Int(v) => Some(*v as f64),
        RawCell::Float(v) if v.is_finite() => Some(*v),
        RawCell::Text(s) => parse_float(s.trim()),
        _ => None,
    }
}

fn to_decimal(cell: &RawCell) -> Option<Decimal> {
    match cell {
        RawCell::Int(v) => Some(Decimal::from(*v)),
        RawCell::Float(v) => Decimal::from_f64(*v),
        RawCell::Text(s) => {
            let cleaned = strip_grouping(s.trim()).into_owned();
            Decimal::from_str(&cleaned)
                .or_else(|_| Decimal::from_scientific(&cleaned))
                .ok()
        }
        _ => None,
    }
}

fn to_text(cell: &RawCell) -> String {
    match cell {
        RawCell::Empty => String::new(),
        RawCell::Text(s) => s.trim().to_string(),
        RawCell::Int(v) => v.to_string(),
        // Spreadsheets store ids like 1001 as floats
        RawCell::Float(v) => match whole_float_to_i64(*v) {
            Some(i) => i.to_string(),
            None => v.to_string(),
        },
        RawCell::Bool(v) => v.to_string(),
        RawCell::DateTime(dt) if dt.time() == NaiveTime::MIN => dt.date().to_string(),
        RawCell::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}

fn to_bool(cell: &RawCell) -> Option<bool> {
    match cell {
        RawCell::Bool(v) => Some(*v),
        RawCell::Int(0) => Some(false),
        RawCell::Int(1) => Some(true),
        RawCell::Float(v) if *v == 0.0 => Some(false),
        RawCell::Float(v) if *v == 1.0 => Some(true),
        RawCell::Text(s) => parse_bool(s.trim()),
        _ => None,
    }
}

fn to_date(cell: &RawCell) -> Option<NaiveDate> {
    match cell {
        RawCell::DateTime(dt) => Some(dt.date()),
        RawCell::Int(v) => excel_serial_to_date(*v as f64),
        RawCell::Float(v) => excel_serial_to_date(*v),
        RawCell::Text(s) => {
            let s = s.trim();
            parse_date(s).or_else(|| {
                parse_timestamp(s)
                    .filter(|dt| dt.time() == NaiveTime::MIN)
                    .map(|dt| dt.date())
            })
        }
        _ => None,
    }
}

fn to_timestamp(cell: &RawCell) -> Option<NaiveDateTime> {
    match cell {
        RawCell::DateTime(dt) => Some(*dt),
        RawCell::Text(s) => {
            let s = s.trim();
            parse_timestamp(s).or_else(|| parse_date(s).map(|d| d.and_time(NaiveTime::MIN)))
        }
        _ => to_date(cell).map(|d| d.and_time(NaiveTime::MIN)),
    }
}
