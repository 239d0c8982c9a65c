//! Conversions between field values and their tabular text and relational forms.
use chrono::NaiveDate;
use rgb::RGB8;
use rusqlite::types::{Value, ValueRef};
use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use std::fmt;

/// A concrete type usable as an entity field.
///
/// `parse_text` is never handed an empty string: empty text means absent, and only
/// [crate::Opt] can be absent.
pub trait FieldValue: Sized {
    /// Parses the tabular text form
    fn parse_text(s: &str) -> Result<Self, String>;
    /// Canonical tabular text form
    fn to_text(&self) -> String;
    /// Relational driver value
    fn to_sql(&self) -> Value;
    /// Reads back a relational driver value
    fn from_sql(value: ValueRef<'_>) -> Result<Self, String>;
    /// Numeric view, used by range and enum checks
    fn as_number(&self) -> Option<f64> {
        None
    }
    /// Whether the value counts as filled in for required checks
    fn is_present(&self) -> bool {
        true
    }
}

fn sql_text(value: ValueRef<'_>) -> Result<String, String> {
    match value {
        ValueRef::Text(t) => String::from_utf8(t.to_vec()).map_err(|e| e.to_string()),
        ValueRef::Integer(i) => Ok(i.to_string()),
        ValueRef::Real(f) => Ok(f.to_string()),
        ValueRef::Null => Ok(String::new()),
        ValueRef::Blob(_) => Err("unexpected blob".to_owned()),
    }
}

impl FieldValue for String {
    fn parse_text(s: &str) -> Result<Self, String> {
        Ok(s.to_owned())
    }
    fn to_text(&self) -> String {
        self.clone()
    }
    fn to_sql(&self) -> Value {
        Value::Text(self.clone())
    }
    fn from_sql(value: ValueRef<'_>) -> Result<Self, String> {
        sql_text(value)
    }
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

macro_rules! integer_field_value {
    ($($t:ty),*) => {
        $(
            impl FieldValue for $t {
                fn parse_text(s: &str) -> Result<Self, String> {
                    s.parse().map_err(|_| format!("'{}' is not a valid integer", s))
                }
                fn to_text(&self) -> String {
                    self.to_string()
                }
                fn to_sql(&self) -> Value {
                    Value::Integer(i64::from(*self))
                }
                fn from_sql(value: ValueRef<'_>) -> Result<Self, String> {
                    match value {
                        ValueRef::Integer(i) => <$t>::try_from(i).map_err(|e| e.to_string()),
                        other => Self::parse_text(&sql_text(other)?),
                    }
                }
                fn as_number(&self) -> Option<f64> {
                    Some(*self as f64)
                }
            }
        )*
    };
}

integer_field_value!(i32, i64, u32);

impl FieldValue for f64 {
    fn parse_text(s: &str) -> Result<Self, String> {
        s.parse().map_err(|_| format!("'{}' is not a valid number", s))
    }
    // Display gives the shortest representation that parses back to the same float
    fn to_text(&self) -> String {
        self.to_string()
    }
    fn to_sql(&self) -> Value {
        Value::Real(*self)
    }
    fn from_sql(value: ValueRef<'_>) -> Result<Self, String> {
        match value {
            ValueRef::Real(f) => Ok(f),
            ValueRef::Integer(i) => Ok(i as f64),
            other => Self::parse_text(&sql_text(other)?),
        }
    }
    fn as_number(&self) -> Option<f64> {
        Some(*self)
    }
}

impl FieldValue for bool {
    fn parse_text(s: &str) -> Result<Self, String> {
        match s {
            "0" => Ok(false),
            "1" => Ok(true),
            _ => Err(format!("Invalid value `{}`, expected 0 or 1", s)),
        }
    }
    fn to_text(&self) -> String {
        u8::from(*self).to_string()
    }
    fn to_sql(&self) -> Value {
        Value::Integer(i64::from(*self))
    }
    fn from_sql(value: ValueRef<'_>) -> Result<Self, String> {
        match value {
            ValueRef::Integer(i) => Ok(i != 0),
            other => Self::parse_text(&sql_text(other)?),
        }
    }
    fn as_number(&self) -> Option<f64> {
        Some(if *self { 1.0 } else { 0.0 })
    }
}

/// Parses a GTFS `YYYYMMDD` date
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y%m%d").map_err(|e| format!("'{}' is not a valid date: {}", s, e))
}

impl FieldValue for NaiveDate {
    fn parse_text(s: &str) -> Result<Self, String> {
        parse_date(s)
    }
    fn to_text(&self) -> String {
        self.format("%Y%m%d").to_string()
    }
    fn to_sql(&self) -> Value {
        Value::Text(self.format("%Y-%m-%d").to_string())
    }
    fn from_sql(value: ValueRef<'_>) -> Result<Self, String> {
        let s = sql_text(value)?;
        NaiveDate::parse_from_str(&s, "%Y-%m-%d").or_else(|_| parse_date(&s))
    }
}

pub(crate) fn parse_time_impl(h: &str, m: &str, s: &str) -> Result<u32, std::num::ParseIntError> {
    let hours: u32 = h.parse()?;
    let minutes: u32 = m.parse()?;
    let seconds: u32 = s.parse()?;
    Ok(hours * 3600 + minutes * 60 + seconds)
}

/// Parses `HH:MM:SS` (or `H:MM:SS`) into seconds since noon minus 12h
pub fn parse_time(s: &str) -> Result<u32, crate::Error> {
    let len = s.len();

    if len < 7 || len > 9 || !s.is_ascii() {
        Err(crate::Error::InvalidTime(s.to_owned()))
    } else {
        let sec = &s[len - 2..];
        let min = &s[len - 5..len - 3];
        let hour = &s[..len - 6];
        if &s[len - 3..len - 2] != ":" || &s[len - 6..len - 5] != ":" {
            return Err(crate::Error::InvalidTime(s.to_owned()));
        }
        parse_time_impl(hour, min, sec).map_err(|_| crate::Error::InvalidTime(s.to_owned()))
    }
}

/// A time of day in seconds, it can go past midnight (`25:10:00`)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Seconds(pub u32);

impl Seconds {
    /// Builds from hours, minutes and seconds
    pub fn hms(h: u32, m: u32, s: u32) -> Self {
        Seconds(h * 3600 + m * 60 + s)
    }
}

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let time = self.0;
        write!(
            f,
            "{:02}:{:02}:{:02}",
            time / 3600,
            time % 3600 / 60,
            time % 60
        )
    }
}

impl FieldValue for Seconds {
    fn parse_text(s: &str) -> Result<Self, String> {
        parse_time(s).map(Seconds).map_err(|e| e.to_string())
    }
    fn to_text(&self) -> String {
        self.to_string()
    }
    fn to_sql(&self) -> Value {
        Value::Integer(i64::from(self.0))
    }
    fn from_sql(value: ValueRef<'_>) -> Result<Self, String> {
        match value {
            ValueRef::Integer(i) => u32::try_from(i).map(Seconds).map_err(|e| e.to_string()),
            other => Self::parse_text(&sql_text(other)?),
        }
    }
    fn as_number(&self) -> Option<f64> {
        Some(f64::from(self.0))
    }
}

impl Serialize for Seconds {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Seconds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_time(&s).map(Seconds).map_err(de::Error::custom)
    }
}

/// Parses a `RRGGBB` color, without the leading `#`
pub fn parse_color(s: &str) -> Result<RGB8, crate::Error> {
    if s.len() != 6 || !s.is_ascii() {
        return Err(crate::Error::InvalidColor(s.to_owned()));
    }
    let r =
        u8::from_str_radix(&s[0..2], 16).map_err(|_| crate::Error::InvalidColor(s.to_owned()))?;
    let g =
        u8::from_str_radix(&s[2..4], 16).map_err(|_| crate::Error::InvalidColor(s.to_owned()))?;
    let b =
        u8::from_str_radix(&s[4..6], 16).map_err(|_| crate::Error::InvalidColor(s.to_owned()))?;
    Ok(RGB8::new(r, g, b))
}

/// Route and text colors
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color(pub RGB8);

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02X}{:02X}{:02X}", self.0.r, self.0.g, self.0.b)
    }
}

impl FieldValue for Color {
    fn parse_text(s: &str) -> Result<Self, String> {
        parse_color(s).map(Color).map_err(|e| e.to_string())
    }
    fn to_text(&self) -> String {
        self.to_string()
    }
    fn to_sql(&self) -> Value {
        Value::Text(self.to_string())
    }
    fn from_sql(value: ValueRef<'_>) -> Result<Self, String> {
        Self::parse_text(&sql_text(value)?)
    }
}

impl Serialize for Color {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_color(&s).map(Color).map_err(de::Error::custom)
    }
}
