//! Dynamic property values and the coercion rules between them.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Error, Result};
use crate::types::PropertyType;

/// Format used for DATETIME columns.
pub const SQL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Format used for DATE columns.
pub const SQL_DATE_FORMAT: &str = "%Y-%m-%d";
/// Prefix of the "zero date" some servers return for unset dates.
pub const ZERO_DATE: &str = "0000-00-00";

/// A dynamically-typed property value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Json(serde_json::Value),
}

impl Value {
    /// Wrap a raw column value as delivered by the driver.
    pub fn from_sql(raw: Option<&str>) -> Self {
        raw.map_or(Value::Null, |s| Value::Text(s.to_string()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Empty text or an empty JSON array.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Text(s) => s.is_empty(),
            Value::Json(serde_json::Value::Array(items)) => items.is_empty(),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Json(_) => "json",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Float(f) => Some(f.trunc() as i64),
            Value::Text(s) => numeric_prefix(s).map(|f| f.trunc() as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Bool(b) => Some(f64::from(u8::from(*b))),
            Value::Text(s) => numeric_prefix(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date()),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            Value::Date(d) => Some(d.and_time(NaiveTime::MIN)),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Coerce into the representation for `ty`.
    ///
    /// `key` names the property in error reports. Dates that do not parse
    /// become `Null`; JSON that does not decode is an error.
    pub fn convert(self, ty: PropertyType, key: &str) -> Result<Value> {
        if self.is_null() {
            return Ok(Value::Null);
        }
        match ty {
            PropertyType::Int => match self.as_i64() {
                Some(i) => Ok(Value::Int(i)),
                None => unsupported(&self, ty),
            },
            PropertyType::Float => match self.as_f64() {
                Some(f) => Ok(Value::Float(f)),
                None => unsupported(&self, ty),
            },
            PropertyType::Bool => Ok(Value::Bool(self.truthy_flag())),
            PropertyType::Enum | PropertyType::String | PropertyType::Text | PropertyType::File => {
                match self {
                    Value::Text(_) => Ok(self),
                    other => Ok(Value::Text(other.to_string())),
                }
            }
            PropertyType::Date | PropertyType::DateTime => convert_temporal(self, ty, key),
            PropertyType::ForeignKey | PropertyType::None => Ok(self),
            PropertyType::Json => match self {
                Value::Json(_) => Ok(self),
                Value::Text(text) => serde_json::from_str(&text)
                    .map(Value::Json)
                    .map_err(|source| Error::InvalidJson {
                        key: key.to_string(),
                        source,
                    }),
                other => serde_json::from_str(&other.to_string())
                    .map(Value::Json)
                    .map_err(|source| Error::InvalidJson {
                        key: key.to_string(),
                        source,
                    }),
            },
        }
    }

    /// Boolean validation filter: `1`, `true`, `on`, `yes` are true.
    fn truthy_flag(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i == 1,
            Value::Float(f) => *f == 1.0,
            Value::Text(s) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "on" | "yes"
            ),
            Value::Date(_) | Value::DateTime(_) => false,
            Value::Json(v) => v.as_bool().unwrap_or(false),
        }
    }

    /// The string form written to SQL and used for dirty tracking.
    ///
    /// Returns `None` for null.
    pub fn to_sql_string(&self, ty: PropertyType) -> Option<String> {
        if self.is_null() {
            return None;
        }
        let text = match ty {
            PropertyType::Int => match self.as_i64() {
                Some(i) => i.to_string(),
                None => self.to_string(),
            },
            PropertyType::Float => match self.as_f64() {
                Some(f) => format!("{f:.6}"),
                None => self.to_string(),
            },
            PropertyType::Bool => match self {
                Value::Bool(b) => String::from(if *b { "1" } else { "0" }),
                other => String::from(if other.truthy_flag() { "1" } else { "0" }),
            },
            PropertyType::DateTime => match self.as_datetime() {
                Some(dt) => dt.format(SQL_DATETIME_FORMAT).to_string(),
                None => self.to_string(),
            },
            PropertyType::Date => match self.as_date() {
                Some(d) => d.format(SQL_DATE_FORMAT).to_string(),
                None => self.to_string(),
            },
            _ => self.to_string(),
        };
        Some(text)
    }

    /// JSON rendering used by entity serialization.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => serde_json::Value::String(d.format(SQL_DATE_FORMAT).to_string()),
            Value::DateTime(dt) => {
                serde_json::Value::String(dt.format(SQL_DATETIME_FORMAT).to_string())
            }
            Value::Json(v) => v.clone(),
        }
    }
}

fn unsupported(value: &Value, ty: PropertyType) -> Result<Value> {
    Err(Error::UnsupportedType(format!(
        "cannot convert {} value to {}",
        value.type_name(),
        ty
    )))
}

fn convert_temporal(value: Value, ty: PropertyType, key: &str) -> Result<Value> {
    let as_date = ty == PropertyType::Date;
    match value {
        Value::Date(d) if as_date => Ok(Value::Date(d)),
        Value::Date(d) => Ok(Value::DateTime(d.and_time(NaiveTime::MIN))),
        Value::DateTime(dt) if as_date => Ok(Value::Date(dt.date())),
        Value::DateTime(dt) => Ok(Value::DateTime(dt)),
        Value::Text(text) => {
            let text = text.trim();
            if text.is_empty() || text.starts_with(ZERO_DATE) {
                return Ok(Value::Null);
            }
            let parsed = if as_date {
                NaiveDate::parse_from_str(text, SQL_DATE_FORMAT)
                    .map(Value::Date)
                    .ok()
            } else {
                NaiveDateTime::parse_from_str(text, SQL_DATETIME_FORMAT)
                    .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
                    .map(Value::DateTime)
                    .ok()
            };
            Ok(parsed.unwrap_or_else(|| {
                tracing::warn!(key, value = text, target_type = %ty, "unparsable date, using null");
                Value::Null
            }))
        }
        other => unsupported(&other, ty),
    }
}

/// Parse the leading numeric part of a string the way lenient numeric
/// casts do: `"12abc"` is 12, `"abc"` is 0.
fn numeric_prefix(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if let Some(n) = strict_numeric(trimmed) {
        return Some(n);
    }
    let mut end = 0;
    for (i, c) in trimmed.char_indices() {
        let sign = (c == '-' || c == '+') && i == 0;
        if c.is_ascii_digit() || c == '.' || sign {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    Some(trimmed[..end].parse::<f64>().unwrap_or(0.0))
}

/// A fully numeric string (optional surrounding whitespace).
fn strict_numeric(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty()
        || !trimmed.bytes().any(|b| b.is_ascii_digit())
        || !trimmed
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
    {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Loose equality of two string forms.
///
/// Two numeric strings compare by value (`"1"` equals `"1.0"`, `"0"` equals
/// `"0.000000"`); anything else compares byte for byte.
pub fn loosely_equal(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    if let (Ok(x), Ok(y)) = (a.trim().parse::<i64>(), b.trim().parse::<i64>()) {
        return x == y;
    }
    match (strict_numeric(a), strict_numeric(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => f.write_str(if *b { "1" } else { "0" }),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format(SQL_DATE_FORMAT)),
            Value::DateTime(dt) => write!(f, "{}", dt.format(SQL_DATETIME_FORMAT)),
            Value::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl<Tz: chrono::TimeZone> From<chrono::DateTime<Tz>> for Value {
    fn from(v: chrono::DateTime<Tz>) -> Self {
        Value::DateTime(v.naive_local())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(v: impl Into<Value>, ty: PropertyType) -> Value {
        v.into().convert(ty, "field").unwrap()
    }

    #[test]
    fn test_convert_numbers() {
        assert_eq!(convert("42", PropertyType::Int), Value::Int(42));
        assert_eq!(convert("12abc", PropertyType::Int), Value::Int(12));
        assert_eq!(convert("abc", PropertyType::Int), Value::Int(0));
        assert_eq!(convert(true, PropertyType::Int), Value::Int(1));
        assert_eq!(convert("1.5", PropertyType::Float), Value::Float(1.5));
        assert_eq!(convert(3, PropertyType::Float), Value::Float(3.0));
    }

    #[test]
    fn test_convert_bool_filter() {
        for truthy in ["1", "true", "On", "yes"] {
            assert_eq!(convert(truthy, PropertyType::Bool), Value::Bool(true), "{truthy}");
        }
        for falsy in ["0", "false", "off", "no", "maybe"] {
            assert_eq!(convert(falsy, PropertyType::Bool), Value::Bool(false), "{falsy}");
        }
        assert_eq!(convert(1, PropertyType::Bool), Value::Bool(true));
    }

    #[test]
    fn test_convert_dates() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(convert("2024-01-05", PropertyType::Date), Value::Date(date));
        assert_eq!(
            convert("2024-01-05 10:30:00", PropertyType::DateTime),
            Value::DateTime(date.and_hms_opt(10, 30, 0).unwrap())
        );
        assert_eq!(convert("0000-00-00 00:00:00", PropertyType::DateTime), Value::Null);
        assert_eq!(convert("not a date", PropertyType::Date), Value::Null);
        assert_eq!(
            convert(date, PropertyType::DateTime),
            Value::DateTime(date.and_hms_opt(0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_convert_date_from_number_is_unsupported() {
        let err = Value::Int(5).convert(PropertyType::Date, "born").unwrap_err();
        assert!(matches!(err, Error::UnsupportedType(_)));
    }

    #[test]
    fn test_convert_json() {
        let v = convert(r#"{"a":[1,2]}"#, PropertyType::Json);
        assert_eq!(v, Value::Json(serde_json::json!({"a": [1, 2]})));

        let err = Value::from("{broken").convert(PropertyType::Json, "payload").unwrap_err();
        match err {
            Error::InvalidJson { key, .. } => assert_eq!(key, "payload"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_convert_passthrough() {
        assert_eq!(convert(7, PropertyType::ForeignKey), Value::Int(7));
        assert_eq!(convert(7, PropertyType::String), Value::Text("7".into()));
        assert_eq!(Value::Null.convert(PropertyType::Int, "x").unwrap(), Value::Null);
    }

    #[test]
    fn test_sql_string_forms() {
        assert_eq!(Value::Int(5).to_sql_string(PropertyType::Int).as_deref(), Some("5"));
        assert_eq!(
            Value::Float(1.5).to_sql_string(PropertyType::Float).as_deref(),
            Some("1.500000")
        );
        assert_eq!(Value::Bool(false).to_sql_string(PropertyType::Bool).as_deref(), Some("0"));
        let dt = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(8, 5, 3)
            .unwrap();
        assert_eq!(
            Value::DateTime(dt).to_sql_string(PropertyType::DateTime).as_deref(),
            Some("2024-02-29 08:05:03")
        );
        assert_eq!(
            Value::Json(serde_json::json!([1, "a"]))
                .to_sql_string(PropertyType::Json)
                .as_deref(),
            Some(r#"[1,"a"]"#)
        );
        assert_eq!(Value::Null.to_sql_string(PropertyType::Text), None);
    }

    #[test]
    fn test_loosely_equal() {
        assert!(loosely_equal("0", "0"));
        assert!(loosely_equal("1", "1.0"));
        assert!(loosely_equal("1.500000", "1.5"));
        assert!(loosely_equal(" 12", "12"));
        assert!(!loosely_equal("abc", "ABC"));
        assert!(!loosely_equal("1", "1a"));
        assert!(!loosely_equal("", "0"));
    }

    #[test]
    fn test_is_empty() {
        assert!(Value::from("").is_empty());
        assert!(Value::Json(serde_json::json!([])).is_empty());
        assert!(!Value::Bool(false).is_empty());
        assert!(!Value::Int(0).is_empty());
    }
}
