//! SQL literal model
//!
//! Every fetched value is resolved once into a [`SqlValue`] and rendered by a
//! single exhaustive match, so quoting rules live in one place.

use std::fmt::Display;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};

/// A row value, classified by how it must appear in an `INSERT` statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    /// Rendered as unquoted `NULL`
    Null,
    /// Rendered single-quoted with embedded quotes doubled
    Text(String),
    /// ISO-8601 date/time, rendered single-quoted
    Temporal(String),
    /// Numbers and booleans, rendered verbatim
    Raw(String),
}

impl SqlValue {
    pub fn text(value: impl Into<String>) -> Self {
        SqlValue::Text(value.into())
    }

    pub fn from_bool(value: bool) -> Self {
        SqlValue::Raw(value.to_string())
    }

    pub fn from_i64(value: i64) -> Self {
        SqlValue::Raw(value.to_string())
    }

    /// Non-finite floats have no bare literal form; the quoted spellings
    /// `'NaN'`, `'Infinity'` and `'-Infinity'` are accepted as float input.
    pub fn from_f64(value: f64) -> Self {
        if value.is_nan() {
            SqlValue::text("NaN")
        } else if value.is_infinite() && value > 0.0 {
            SqlValue::text("Infinity")
        } else if value.is_infinite() {
            SqlValue::text("-Infinity")
        } else {
            SqlValue::Raw(value.to_string())
        }
    }

    /// `numeric` values arrive as their text form. Anything that is not a
    /// plain number (`NaN`, `Infinity`, `-Infinity`) must be quoted.
    pub fn from_numeric_text(value: impl Into<String>) -> Self {
        let value = value.into();
        let is_number = value.bytes().any(|b| b.is_ascii_digit())
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'));
        if is_number {
            SqlValue::Raw(value)
        } else {
            SqlValue::Text(value)
        }
    }

    /// The `infinity` sentinel of timestamp and date columns
    pub fn infinity() -> Self {
        SqlValue::Temporal("infinity".to_string())
    }

    /// The `-infinity` sentinel of timestamp and date columns
    pub fn neg_infinity() -> Self {
        SqlValue::Temporal("-infinity".to_string())
    }

    pub fn from_timestamptz(value: DateTime<Utc>) -> Self {
        match before_common_era(value.year(), value.format("%m-%d %H:%M:%S%.f+00")) {
            Some(bc) => SqlValue::Temporal(bc),
            None => SqlValue::Temporal(value.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        }
    }

    pub fn from_timestamp(value: NaiveDateTime) -> Self {
        match before_common_era(value.year(), value.format("%m-%d %H:%M:%S%.f")) {
            Some(bc) => SqlValue::Temporal(bc),
            None => SqlValue::Temporal(value.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        }
    }

    pub fn from_date(value: NaiveDate) -> Self {
        match before_common_era(value.year(), value.format("%m-%d")) {
            Some(bc) => SqlValue::Temporal(bc),
            None => SqlValue::Temporal(value.format("%Y-%m-%d").to_string()),
        }
    }

    pub fn from_time(value: NaiveTime) -> Self {
        SqlValue::Temporal(value.format("%H:%M:%S%.f").to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Render as a SQL literal
    pub fn render(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Text(s) | SqlValue::Temporal(s) => quote_literal(s),
            SqlValue::Raw(s) => s.clone(),
        }
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::text(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::from_bool(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::from_i64(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::from_i64(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::from_f64(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::from_timestamptz(value)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(value: NaiveDateTime) -> Self {
        SqlValue::from_timestamp(value)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(value: NaiveDate) -> Self {
        SqlValue::from_date(value)
    }
}

/// PostgreSQL has no year 0 and no signed years: proleptic year 0 is 1 BC.
/// Returns `None` for years from 1 AD on.
fn before_common_era(year: i32, rest: impl Display) -> Option<String> {
    (year < 1).then(|| format!("{:04}-{rest} BC", 1 - i64::from(year)))
}

/// Single-quote a string literal, doubling embedded single quotes.
///
/// Only `'` is escaped. Backslashes pass through unchanged, which is correct
/// under `standard_conforming_strings = on`.
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Double-quote an identifier, doubling embedded double quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(SqlValue::Null, "NULL")]
    #[case(SqlValue::text("O'Brien"), "'O''Brien'")]
    #[case(SqlValue::text("''"), "''''''")]
    #[case(SqlValue::text(r"C:\temp"), r"'C:\temp'")]
    #[case(SqlValue::text(""), "''")]
    #[case(SqlValue::from_bool(true), "true")]
    #[case(SqlValue::from_bool(false), "false")]
    #[case(SqlValue::from_i64(-42), "-42")]
    #[case(SqlValue::from_f64(1.5), "1.5")]
    #[case(SqlValue::from_f64(f64::NAN), "'NaN'")]
    #[case(SqlValue::from_f64(f64::INFINITY), "'Infinity'")]
    #[case(SqlValue::from_f64(f64::NEG_INFINITY), "'-Infinity'")]
    #[case(SqlValue::from_numeric_text("12345.6789"), "12345.6789")]
    #[case(SqlValue::from_numeric_text("-0.001"), "-0.001")]
    #[case(SqlValue::from_numeric_text("NaN"), "'NaN'")]
    #[case(SqlValue::from_numeric_text("Infinity"), "'Infinity'")]
    #[case(SqlValue::from_numeric_text("-Infinity"), "'-Infinity'")]
    #[case(SqlValue::infinity(), "'infinity'")]
    #[case(SqlValue::neg_infinity(), "'-infinity'")]
    fn renders_literals(#[case] value: SqlValue, #[case] expected: &str) {
        assert_eq!(value.render(), expected);
    }

    #[test]
    fn timestamptz_renders_as_quoted_utc_iso8601() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 34, 56).unwrap()
            + chrono::Duration::milliseconds(789);
        assert_eq!(
            SqlValue::from_timestamptz(ts).render(),
            "'2024-05-01T12:34:56.789Z'"
        );
    }

    #[test]
    fn timestamp_without_zone_keeps_fraction() {
        let ts = NaiveDate::from_ymd_opt(2023, 1, 2)
            .unwrap()
            .and_hms_milli_opt(3, 4, 5, 123)
            .unwrap();
        assert_eq!(SqlValue::from(ts).render(), "'2023-01-02T03:04:05.123'");
    }

    #[test]
    fn date_and_time_render_quoted() {
        let date = NaiveDate::from_ymd_opt(1999, 12, 31).unwrap();
        assert_eq!(SqlValue::from(date).render(), "'1999-12-31'");

        let time = NaiveTime::from_hms_opt(23, 59, 1).unwrap();
        assert_eq!(SqlValue::from_time(time).render(), "'23:59:01'");
    }

    #[rstest]
    #[case(-4, "'0005-03-15 BC'")]
    #[case(0, "'0001-03-15 BC'")]
    #[case(1, "'0001-03-15'")]
    fn dates_before_common_era_use_bc_suffix(#[case] year: i32, #[case] expected: &str) {
        let date = NaiveDate::from_ymd_opt(year, 3, 15).unwrap();
        assert_eq!(SqlValue::from_date(date).render(), expected);
    }

    #[test]
    fn timestamps_before_common_era_use_bc_suffix() {
        let naive = NaiveDate::from_ymd_opt(-43, 3, 15)
            .unwrap()
            .and_hms_milli_opt(12, 0, 0, 250)
            .unwrap();
        assert_eq!(
            SqlValue::from_timestamp(naive).render(),
            "'0044-03-15 12:00:00.250 BC'"
        );
        assert_eq!(
            SqlValue::from_timestamptz(naive.and_utc()).render(),
            "'0044-03-15 12:00:00.250+00 BC'"
        );
    }

    #[test]
    fn option_none_is_null() {
        let value: SqlValue = Option::<i64>::None.into();
        assert!(value.is_null());
        assert_eq!(SqlValue::from(Some(7i64)).render(), "7");
    }

    #[rstest]
    #[case("users", "\"users\"")]
    #[case("Mixed Case", "\"Mixed Case\"")]
    #[case("a\"b", "\"a\"\"b\"")]
    fn quotes_identifiers(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(quote_ident(name), expected);
    }

    proptest! {
        #[test]
        fn quoted_literal_unescapes_to_original(s in ".*") {
            let quoted = quote_literal(&s);
            prop_assert!(quoted.starts_with('\'') && quoted.ends_with('\''));
            let inner = &quoted[1..quoted.len() - 1];
            // every quote inside the literal comes in pairs
            prop_assert!(!inner.replace("''", "").contains('\''));
            prop_assert_eq!(inner.replace("''", "'"), s);
        }
    }
}
