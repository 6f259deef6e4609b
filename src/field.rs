use std::fmt::{self, Write as _};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Serialize, Serializer};

/// Typed value attached to a [`Field`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Duration(Duration),
    Timestamp(DateTime<Utc>),
}

/// One key/value pair of a record. Records keep fields in the order the
/// caller supplied them.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: String,
    pub value: FieldValue,
}

impl Field {
    pub fn new(key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Field {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<&String> for FieldValue {
    fn from(v: &String) -> Self {
        FieldValue::Str(v.clone())
    }
}

macro_rules! int_field {
    ($($t:ty),*) => {
        $(impl From<$t> for FieldValue {
            fn from(v: $t) -> Self {
                FieldValue::Int(v as i64)
            }
        })*
    };
}

int_field!(i8, i16, i32, i64, u8, u16, u32, isize);

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<usize> for FieldValue {
    fn from(v: usize) -> Self {
        FieldValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(v as f64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<Duration> for FieldValue {
    fn from(v: Duration) -> Self {
        FieldValue::Duration(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(v)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Duration(d) => f.write_str(&format_duration(*d)),
            FieldValue::Timestamp(t) => {
                f.write_str(&t.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Str(s) => serializer.serialize_str(s),
            FieldValue::Int(i) => serializer.serialize_i64(*i),
            // Non-finite floats have no JSON form.
            FieldValue::Float(x) if !x.is_finite() => serializer.collect_str(x),
            FieldValue::Float(x) => serializer.serialize_f64(*x),
            FieldValue::Bool(b) => serializer.serialize_bool(*b),
            FieldValue::Duration(_) | FieldValue::Timestamp(_) => serializer.collect_str(self),
        }
    }
}

/// Render a duration the way Go's `time.Duration` prints: `0s`, `850ns`,
/// `12.5µs`, `200ms`, `1.5s`, `2m3.25s`, `1h0m0s`.
pub fn format_duration(d: Duration) -> String {
    const MICRO: u128 = 1_000;
    const MILLI: u128 = 1_000_000;
    const SECOND: u128 = 1_000_000_000;

    let nanos = d.as_nanos();
    let mut out = String::new();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < MICRO {
        let _ = write!(out, "{}ns", nanos);
        return out;
    }
    if nanos < MILLI {
        push_fraction(&mut out, nanos, MICRO);
        out.push_str("µs");
        return out;
    }
    if nanos < SECOND {
        push_fraction(&mut out, nanos, MILLI);
        out.push_str("ms");
        return out;
    }

    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    if hours > 0 {
        let _ = write!(out, "{}h", hours);
    }
    if hours > 0 || minutes > 0 {
        let _ = write!(out, "{}m", minutes);
    }
    push_fraction(&mut out, nanos % (60 * SECOND), SECOND);
    out.push('s');
    out
}

fn push_fraction(out: &mut String, value: u128, unit: u128) {
    let whole = value / unit;
    let frac = value % unit;
    let _ = write!(out, "{}", whole);
    if frac == 0 {
        return;
    }
    // unit is a power of ten
    let width = unit.to_string().len() - 1;
    let digits = format!("{:0width$}", frac, width = width);
    out.push('.');
    out.push_str(digits.trim_end_matches('0'));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_render_like_go() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_nanos(850)), "850ns");
        assert_eq!(format_duration(Duration::from_nanos(12_500)), "12.5µs");
        assert_eq!(format_duration(Duration::from_millis(200)), "200ms");
        assert_eq!(format_duration(Duration::from_micros(1_234)), "1.234ms");
        assert_eq!(format_duration(Duration::from_millis(1_500)), "1.5s");
        assert_eq!(format_duration(Duration::from_millis(123_250)), "2m3.25s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h0m0s");
    }

    #[test]
    fn values_convert_from_primitives() {
        assert_eq!(FieldValue::from(3_u32), FieldValue::Int(3));
        assert_eq!(FieldValue::from("x"), FieldValue::Str("x".into()));
        assert_eq!(FieldValue::from(u64::MAX), FieldValue::Int(i64::MAX));
        assert_eq!(
            FieldValue::from(Duration::from_millis(5)).to_string(),
            "5ms"
        );
    }

    #[test]
    fn serializes_to_json_scalars() {
        let json = serde_json::to_string(&FieldValue::Duration(Duration::from_millis(200))).unwrap();
        assert_eq!(json, "\"200ms\"");
        let json = serde_json::to_string(&FieldValue::Float(f64::NAN)).unwrap();
        assert_eq!(json, "\"NaN\"");
        let json = serde_json::to_string(&FieldValue::Int(-4)).unwrap();
        assert_eq!(json, "-4");
    }
}
