//! The nullable value wrapper used for every optional entity field
use crate::values::FieldValue;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Deref, DerefMut};

/// A value that may be absent.
///
/// Empty tabular text is always absent, strings included. In JSON, absent is `null`
/// while `""` stays a present empty string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Opt<T>(pub Option<T>);

impl<T> Opt<T> {
    /// A present value
    pub fn new(value: T) -> Self {
        Opt(Some(value))
    }

    /// An absent value
    pub const fn none() -> Self {
        Opt(None)
    }

    /// Is a value present
    pub fn is_present(&self) -> bool {
        self.0.is_some()
    }

    /// Borrow the inner value
    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }
}

impl Opt<String> {
    /// The string, or `""` when absent
    pub fn as_str(&self) -> &str {
        self.0.as_deref().unwrap_or("")
    }
}

impl<T> Default for Opt<T> {
    fn default() -> Self {
        Opt(None)
    }
}

impl<T> Deref for Opt<T> {
    type Target = Option<T>;
    fn deref(&self) -> &Option<T> {
        &self.0
    }
}

impl<T> DerefMut for Opt<T> {
    fn deref_mut(&mut self) -> &mut Option<T> {
        &mut self.0
    }
}

impl<T> From<Option<T>> for Opt<T> {
    fn from(value: Option<T>) -> Self {
        Opt(value)
    }
}

/// Empty text is absent, as in a file
impl From<&str> for Opt<String> {
    fn from(value: &str) -> Self {
        Opt((!value.is_empty()).then(|| value.to_owned()))
    }
}

impl<T: fmt::Debug> fmt::Debug for Opt<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.0 {
            Some(v) => v.fmt(f),
            None => f.write_str("-"),
        }
    }
}

impl<T: FieldValue> FieldValue for Opt<T> {
    fn parse_text(s: &str) -> Result<Self, String> {
        if s.is_empty() {
            Ok(Opt(None))
        } else {
            T::parse_text(s).map(Opt::new)
        }
    }

    fn to_text(&self) -> String {
        self.0.as_ref().map(T::to_text).unwrap_or_default()
    }

    fn to_sql(&self) -> Value {
        self.0.as_ref().map(T::to_sql).unwrap_or(Value::Null)
    }

    fn from_sql(value: ValueRef<'_>) -> Result<Self, String> {
        match value {
            ValueRef::Null => Ok(Opt(None)),
            v => T::from_sql(v).map(Opt::new),
        }
    }

    fn as_number(&self) -> Option<f64> {
        self.0.as_ref().and_then(T::as_number)
    }

    fn is_present(&self) -> bool {
        self.0.is_some()
    }
}

impl<T: FieldValue> ToSql for Opt<T> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(FieldValue::to_sql(self)))
    }
}

impl<T: FieldValue> FromSql for Opt<T> {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        <Self as FieldValue>::from_sql(value).map_err(|e| FromSqlError::Other(e.into()))
    }
}

impl<T: Serialize> Serialize for Opt<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Opt<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Opt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::{Color, Seconds};
    use chrono::NaiveDate;
    use rgb::RGB8;

    fn round_trip<T: FieldValue + PartialEq + fmt::Debug>(value: T) {
        let opt = Opt::new(value);
        assert_eq!(opt, Opt::<T>::parse_text(&opt.to_text()).unwrap());
        assert_eq!("", Opt::<T>::none().to_text());
        assert_eq!(Opt::<T>::none(), Opt::<T>::parse_text("").unwrap());
    }

    #[test]
    fn text_round_trip() {
        round_trip("stop 1".to_owned());
        round_trip(-12i32);
        round_trip(9_000_000_000i64);
        round_trip(7u32);
        round_trip(45.123456789f64);
        round_trip(true);
        round_trip(NaiveDate::from_ymd_opt(2022, 1, 2).unwrap());
        round_trip(Seconds::hms(26, 5, 0));
        round_trip(Color(RGB8::new(1, 2, 255)));
    }

    #[test]
    fn json_null_is_absent() {
        let absent: Opt<i32> = Opt::none();
        assert_eq!("null", serde_json::to_string(&absent).unwrap());
        let back: Opt<i32> = serde_json::from_str("null").unwrap();
        assert!(!back.is_present());

        let empty: Opt<String> = serde_json::from_str("\"\"").unwrap();
        assert_eq!(Some(""), empty.as_deref());
        let date = Opt::new(NaiveDate::from_ymd_opt(2018, 6, 3).unwrap());
        assert_eq!("\"2018-06-03\"", serde_json::to_string(&date).unwrap());
        let time = Opt::new(Seconds::hms(8, 0, 0));
        assert_eq!("\"08:00:00\"", serde_json::to_string(&time).unwrap());
    }

    #[test]
    fn sql_null_is_absent() {
        let absent: Opt<f64> = Opt::none();
        assert_eq!(Value::Null, FieldValue::to_sql(&absent));
        assert_eq!(absent, <Opt<f64> as FieldValue>::from_sql(ValueRef::Null).unwrap());
        let seconds = Opt::new(Seconds(3600));
        assert_eq!(Value::Integer(3600), FieldValue::to_sql(&seconds));
    }

    #[test]
    fn invalid_text_is_an_error() {
        assert!(Opt::<i32>::parse_text("abc").is_err());
        assert!(Opt::<NaiveDate>::parse_text("2022-01-01").is_err());
    }
}
