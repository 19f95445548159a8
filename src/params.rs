//! Statement parameters: quoting for display, decoding to text, and JSON serialization.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sea_orm::Value;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use uuid::Uuid;

/// Marker substituted for byte values that are not valid UTF-8.
pub const ENCODED_STRING: &str = "(encoded string)";

/// A statement parameter as passed to a cursor.
///
/// Positional parameters are a [`Param::List`], named parameters a [`Param::Map`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Param {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Uuid(Uuid),
    List(Vec<Param>),
    Map(BTreeMap<String, Param>),
}

impl Param {
    /// Build a positional parameter list.
    pub fn list<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Param>,
    {
        Param::List(values.into_iter().map(Into::into).collect())
    }

    /// Build a named parameter mapping.
    pub fn map<I, K, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Into<Param>,
    {
        Param::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    fn is_empty(&self) -> bool {
        match self {
            Param::Null => true,
            Param::List(items) => items.is_empty(),
            Param::Map(entries) => entries.is_empty(),
            _ => false,
        }
    }

    /// Quote a single value for display inside rendered SQL.
    ///
    /// Text-like values are wrapped in single quotes with embedded quotes doubled;
    /// everything else uses its literal representation.
    pub fn quote(&self) -> String {
        match self {
            Param::Text(s) => quote_text(s),
            Param::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => quote_text(s),
                Err(_) => self.repr(),
            },
            other => other.repr(),
        }
    }

    /// Literal representation of the value.
    pub fn repr(&self) -> String {
        match self {
            Param::Null => "NULL".to_string(),
            Param::Bool(b) => b.to_string(),
            Param::Int(i) => i.to_string(),
            Param::Float(f) => format!("{f:?}"),
            Param::Text(s) => quote_text(s),
            Param::Bytes(bytes) => format!("b'{}'", bytes.escape_ascii()),
            Param::Date(d) => format!("{d:?}"),
            Param::Time(t) => format!("{t:?}"),
            Param::DateTime(dt) => format!("{dt:?}"),
            Param::Uuid(u) => format!("{u:?}"),
            Param::List(items) => {
                let inner: Vec<String> = items.iter().map(Param::repr).collect();
                format!("[{}]", inner.join(", "))
            }
            Param::Map(entries) => {
                let inner: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", quote_text(k), v.repr()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
        }
    }

    /// Decode the value into display text, recursing through lists and maps.
    ///
    /// Dates, times and byte strings become text; bytes that are not UTF-8
    /// become [`ENCODED_STRING`]. Numbers, booleans and null are kept as is.
    pub fn decode(&self) -> Decoded {
        match self {
            Param::Null => Decoded::Null,
            Param::Bool(b) => Decoded::Bool(*b),
            Param::Int(i) => Decoded::Int(*i),
            Param::Float(f) => Decoded::Float(*f),
            Param::Text(s) => Decoded::Text(s.clone()),
            Param::Bytes(bytes) => match String::from_utf8(bytes.clone()) {
                Ok(s) => Decoded::Text(s),
                Err(err) => {
                    tracing::debug!(error = %err, "parameter is not valid UTF-8");
                    Decoded::Text(ENCODED_STRING.to_string())
                }
            },
            Param::Date(d) => Decoded::Text(d.to_string()),
            Param::Time(t) => Decoded::Text(t.to_string()),
            Param::DateTime(dt) => Decoded::Text(dt.to_string()),
            Param::Uuid(u) => Decoded::Text(u.to_string()),
            Param::List(items) => Decoded::List(items.iter().map(Param::decode).collect()),
            Param::Map(entries) => Decoded::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.decode()))
                    .collect(),
            ),
        }
    }

    /// Convert a JSON document into a parameter.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Param::Null,
            serde_json::Value::Bool(b) => Param::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Param::Int(i),
                None => n.as_f64().map(Param::Float).unwrap_or(Param::Null),
            },
            serde_json::Value::String(s) => Param::Text(s.clone()),
            serde_json::Value::Array(items) => Param::List(items.iter().map(Param::from_json).collect()),
            serde_json::Value::Object(entries) => Param::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Param::from_json(v)))
                    .collect(),
            ),
        }
    }
}

fn quote_text(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

macro_rules! param_from {
    ($($ty:ty => $variant:ident $(as $cast:ty)?),* $(,)?) => {
        $(
            impl From<$ty> for Param {
                fn from(value: $ty) -> Self {
                    Param::$variant(value $(as $cast)?)
                }
            }
        )*
    };
}

param_from! {
    bool => Bool,
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int,
    u8 => Int as i64,
    u16 => Int as i64,
    u32 => Int as i64,
    f32 => Float as f64,
    f64 => Float,
    String => Text,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
    Uuid => Uuid,
    Vec<Param> => List,
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Text(value.to_string())
    }
}

impl From<&[u8]> for Param {
    fn from(value: &[u8]) -> Self {
        Param::Bytes(value.to_vec())
    }
}

impl From<DateTime<Utc>> for Param {
    fn from(value: DateTime<Utc>) -> Self {
        Param::DateTime(value.naive_utc())
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        value.map_or(Param::Null, Into::into)
    }
}

impl From<&Value> for Param {
    fn from(value: &Value) -> Self {
        match value {
            Value::Bool(Some(v)) => Param::Bool(*v),
            Value::TinyInt(Some(v)) => Param::from(*v),
            Value::SmallInt(Some(v)) => Param::from(*v),
            Value::Int(Some(v)) => Param::from(*v),
            Value::BigInt(Some(v)) => Param::from(*v),
            Value::TinyUnsigned(Some(v)) => Param::from(*v),
            Value::SmallUnsigned(Some(v)) => Param::from(*v),
            Value::Unsigned(Some(v)) => Param::from(*v),
            Value::BigUnsigned(Some(v)) => match i64::try_from(*v) {
                Ok(i) => Param::Int(i),
                Err(_) => Param::Text(v.to_string()),
            },
            Value::Float(Some(v)) => Param::from(*v),
            Value::Double(Some(v)) => Param::from(*v),
            Value::String(Some(s)) => {
                let s: &str = s;
                Param::from(s)
            }
            Value::Char(Some(c)) => Param::Text(c.to_string()),
            Value::Bytes(Some(bytes)) => {
                let bytes: &[u8] = bytes;
                Param::from(bytes)
            }
            Value::Json(Some(json)) => {
                let json: &serde_json::Value = json;
                Param::from_json(json)
            }
            Value::ChronoDate(Some(d)) => {
                let d: &NaiveDate = d;
                Param::Date(*d)
            }
            Value::ChronoTime(Some(t)) => {
                let t: &NaiveTime = t;
                Param::Time(*t)
            }
            Value::ChronoDateTime(Some(dt)) => {
                let dt: &NaiveDateTime = dt;
                Param::DateTime(*dt)
            }
            Value::ChronoDateTimeUtc(Some(dt)) => {
                let dt: &DateTime<Utc> = dt;
                Param::from(*dt)
            }
            Value::Uuid(Some(u)) => {
                let u: &Uuid = u;
                Param::Uuid(*u)
            }
            Value::Bool(None)
            | Value::TinyInt(None)
            | Value::SmallInt(None)
            | Value::Int(None)
            | Value::BigInt(None)
            | Value::TinyUnsigned(None)
            | Value::SmallUnsigned(None)
            | Value::Unsigned(None)
            | Value::BigUnsigned(None)
            | Value::Float(None)
            | Value::Double(None)
            | Value::String(None)
            | Value::Char(None)
            | Value::Bytes(None)
            | Value::Json(None)
            | Value::ChronoDate(None)
            | Value::ChronoTime(None)
            | Value::ChronoDateTime(None)
            | Value::ChronoDateTimeUtc(None)
            | Value::Uuid(None) => Param::Null,
            #[allow(unreachable_patterns)]
            other => Param::Text(format!("{other:?}")),
        }
    }
}

/// Parameters quoted for display, shaped like the parameters they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotedParams {
    Positional(Vec<String>),
    Named(BTreeMap<String, String>),
}

impl QuotedParams {
    /// The quoted value for positional slot `index` (zero based).
    pub fn positional(&self, index: usize) -> Option<&str> {
        match self {
            QuotedParams::Positional(values) => values.get(index).map(String::as_str),
            QuotedParams::Named(_) => None,
        }
    }

    pub fn named(&self, name: &str) -> Option<&str> {
        match self {
            QuotedParams::Named(values) => values.get(name).map(String::as_str),
            QuotedParams::Positional(_) => None,
        }
    }
}

/// Quote every top-level parameter for display.
///
/// Returns `None` for absent or empty parameters. A scalar is treated as a single
/// positional parameter.
pub fn quote_params(params: Option<&Param>) -> Option<QuotedParams> {
    let params = params.filter(|p| !p.is_empty())?;
    Some(match params {
        Param::List(items) => QuotedParams::Positional(items.iter().map(Param::quote).collect()),
        Param::Map(entries) => QuotedParams::Named(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), v.quote()))
                .collect(),
        ),
        scalar => QuotedParams::Positional(vec![scalar.quote()]),
    })
}

/// Parameters decoded to display text.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Decoded>),
    Map(BTreeMap<String, Decoded>),
}

impl Serialize for Decoded {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Decoded::Null => serializer.serialize_unit(),
            Decoded::Bool(b) => serializer.serialize_bool(*b),
            Decoded::Int(i) => serializer.serialize_i64(*i),
            Decoded::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Decoded::Float(f) => Err(S::Error::custom(format!("{f} is not representable"))),
            Decoded::Text(s) => serializer.serialize_str(s),
            Decoded::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Decoded::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

/// Decode parameters for display. Absent parameters decode to `Null`.
pub fn decode_params(params: Option<&Param>) -> Decoded {
    params.map_or(Decoded::Null, Param::decode)
}

/// Serialize decoded parameters as JSON, or an empty string if they cannot be.
pub fn serialize_params(decoded: &Decoded) -> String {
    match serde_json::to_string(decoded) {
        Ok(json) => json,
        Err(err) => {
            tracing::debug!(error = %err, "parameters are not serializable");
            String::new()
        }
    }
}
