//! Semantic property types and the classification rules that produce them.
//!
//! A column is classified from its raw SQL type (`varchar(50)`, `tinyint(1)`,
//! `enum('a','b')`, ...). Declared-but-not-persisted properties are classified
//! from their free-text type annotation instead. The two sources meet in
//! [`classify_column`], where an annotation may refine an ambiguous SQL type.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Closed set of semantic property types.
///
/// Drives value coercion ([`crate::Value::convert`]) and SQL literal formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PropertyType {
    Bool,
    Enum,
    Int,
    Float,
    File,
    Date,
    DateTime,
    String,
    Text,
    Json,
    ForeignKey,
    None,
}

impl PropertyType {
    /// All variants in declaration order.
    pub const ALL: [PropertyType; 12] = [
        PropertyType::Bool,
        PropertyType::Enum,
        PropertyType::Int,
        PropertyType::Float,
        PropertyType::File,
        PropertyType::Date,
        PropertyType::DateTime,
        PropertyType::String,
        PropertyType::Text,
        PropertyType::Json,
        PropertyType::ForeignKey,
        PropertyType::None,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            PropertyType::Bool => "bool",
            PropertyType::Enum => "enum",
            PropertyType::Int => "int",
            PropertyType::Float => "float",
            PropertyType::File => "file",
            PropertyType::Date => "date",
            PropertyType::DateTime => "datetime",
            PropertyType::String => "string",
            PropertyType::Text => "text",
            PropertyType::Json => "json",
            PropertyType::ForeignKey => "foreign_key",
            PropertyType::None => "none",
        }
    }

    /// Types whose values are calendar instants.
    pub const fn is_temporal(self) -> bool {
        matches!(self, PropertyType::Date | PropertyType::DateTime)
    }

    /// Types stored verbatim as text.
    pub const fn is_textual(self) -> bool {
        matches!(
            self,
            PropertyType::Enum | PropertyType::String | PropertyType::Text | PropertyType::File
        )
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn int_family() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(tiny|small|medium|big)?int").ok())
        .as_ref()
}

fn char_family() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(var)?char(?:\((\d+)\))?").ok())
        .as_ref()
}

fn text_family() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(medium|long)?text").ok())
        .as_ref()
}

fn enum_literal() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"'((?:[^']|'')*)'").ok())
        .as_ref()
}

fn is_match(re: Option<&Regex>, text: &str) -> bool {
    re.is_some_and(|re| re.is_match(text))
}

/// Classify a raw SQL column type. First matching rule wins.
pub fn classify_sql(sql_type: &str) -> PropertyType {
    let ty = sql_type.trim().to_ascii_lowercase();

    if is_match(int_family(), &ty) {
        return PropertyType::Int;
    }
    if ty.starts_with("enum") {
        return PropertyType::Enum;
    }
    if ty.starts_with("tinytext") {
        return PropertyType::String;
    }
    if let Some(caps) = char_family().and_then(|re| re.captures(&ty)) {
        return match caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok()) {
            Some(len) if len <= 255 => PropertyType::String,
            _ => PropertyType::Text,
        };
    }
    if is_match(text_family(), &ty) {
        return PropertyType::Text;
    }
    if ty.starts_with("float") || ty.starts_with("double") || ty.starts_with("decimal") {
        return PropertyType::Float;
    }
    if ty.starts_with("bool") {
        return PropertyType::Bool;
    }
    if ty.starts_with("datetime") {
        return PropertyType::DateTime;
    }
    if ty.starts_with("date") {
        return PropertyType::Date;
    }
    if ty.starts_with("json") {
        return PropertyType::Json;
    }
    PropertyType::String
}

/// Classify a free-text type annotation such as `int|null`, `?bool`,
/// `LocalDateTime` or `array`.
pub fn classify_annotation(annotation: &str) -> PropertyType {
    let ty = annotation.trim().trim_start_matches('?');

    if ty.starts_with("int") || is_sized_integer(ty) {
        PropertyType::Int
    } else if ty.starts_with("bool") {
        PropertyType::Bool
    } else if ty.starts_with("string") || ty.starts_with("String") || ty.starts_with("&str") {
        PropertyType::String
    } else if ty.starts_with("float") || ty.starts_with("f32") || ty.starts_with("f64") {
        PropertyType::Float
    } else if ty.contains("Date") {
        PropertyType::DateTime
    } else if ty.starts_with("array") || ty.starts_with("Vec<") || ty.starts_with("json") {
        PropertyType::Json
    } else {
        PropertyType::None
    }
}

fn is_sized_integer(ty: &str) -> bool {
    let digits = ty
        .strip_prefix('i')
        .or_else(|| ty.strip_prefix('u'))
        .unwrap_or("");
    matches!(digits, "8" | "16" | "32" | "64" | "128" | "size")
}

/// Parse the value list of an `enum('a','b')` column type, in order.
pub fn parse_enum_values(sql_type: &str) -> Vec<String> {
    let Some(re) = enum_literal() else {
        return Vec::new();
    };
    re.captures_iter(sql_type)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().replace("''", "'"))
        .collect()
}

/// Classify a table column, consulting the declared annotation where the SQL
/// type alone is ambiguous.
///
/// - `tinyint(1)` becomes Bool when the annotation says bool.
/// - `longtext` becomes Json when the annotation says json.
/// - An enum whose values are exactly `{'0','1'}` becomes Bool.
pub fn classify_column(
    sql_type: &str,
    declared: Option<PropertyType>,
    enum_values: Option<&[String]>,
) -> PropertyType {
    let lowered = sql_type.trim().to_ascii_lowercase();
    if lowered.starts_with("tinyint(1)") && declared == Some(PropertyType::Bool) {
        return PropertyType::Bool;
    }
    if lowered.starts_with("longtext") && declared == Some(PropertyType::Json) {
        return PropertyType::Json;
    }

    let classified = classify_sql(&lowered);
    if classified == PropertyType::Enum
        && let Some(values) = enum_values
        && values.len() == 2
        && values.iter().any(|v| v == "0")
        && values.iter().any(|v| v == "1")
    {
        return PropertyType::Bool;
    }
    classified
}
