//! Reply values and their text rendering.
//!
//! [`ReplyValue`] is the closed set of shapes a Redis reply can take once the
//! protocol details (RESP2 vs RESP3, status vs bulk strings) are dropped.
//! [`format_reply`] renders one as the text a tool returns.

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<ReplyValue>),
    /// Keys are rendered as text; ordering is by key.
    Map(BTreeMap<String, ReplyValue>),
}

impl ReplyValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Text of a scalar reply, without quoting. Collections and nulls have none.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Str(s) => Some(s.clone()),
            Self::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Null | Self::List(_) | Self::Map(_) => None,
        }
    }

    fn map_key(value: redis::Value) -> String {
        let value = ReplyValue::from(value);
        match value.as_text() {
            Some(text) => text,
            None => format_reply(&value),
        }
    }
}

impl From<redis::Value> for ReplyValue {
    fn from(value: redis::Value) -> Self {
        match value {
            redis::Value::Nil => Self::Null,
            redis::Value::Int(i) => Self::Int(i),
            redis::Value::BulkString(bytes) => Self::Bytes(bytes),
            redis::Value::SimpleString(s) => Self::Str(s),
            redis::Value::Okay => Self::Str("OK".to_string()),
            redis::Value::Double(f) => Self::Float(f),
            redis::Value::Boolean(b) => Self::Bool(b),
            redis::Value::VerbatimString { text, .. } => Self::Str(text),
            redis::Value::Array(items) | redis::Value::Set(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            }
            redis::Value::Push { data, .. } => Self::List(data.into_iter().map(Self::from).collect()),
            redis::Value::Map(pairs) => Self::Map(
                pairs
                    .into_iter()
                    .map(|(k, v)| (Self::map_key(k), Self::from(v)))
                    .collect(),
            ),
            redis::Value::Attribute { data, .. } => Self::from(*data),
            other => Self::Str(format!("{other:?}")),
        }
    }
}

impl Serialize for ReplyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Str(s) => serializer.serialize_str(s),
            Self::Bytes(b) => serializer.serialize_str(&String::from_utf8_lossy(b)),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

/// Render a reply as tool output text.
///
/// Scalar strings are wrapped in double quotes as-is, with no escaping.
/// Floats use six fractional digits. Collections go through JSON; should
/// that fail the debug form is returned instead of an error.
pub fn format_reply(value: &ReplyValue) -> String {
    match value {
        ReplyValue::Null => "null".to_string(),
        ReplyValue::Str(s) => format!("\"{s}\""),
        ReplyValue::Bytes(b) => format!("\"{}\"", String::from_utf8_lossy(b)),
        ReplyValue::Int(i) => i.to_string(),
        ReplyValue::Float(f) => format!("{f:.6}"),
        ReplyValue::Bool(b) => b.to_string(),
        ReplyValue::List(_) | ReplyValue::Map(_) => {
            serde_json::to_string(value).unwrap_or_else(|_| format!("{value:?}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(items: &[&str]) -> ReplyValue {
        ReplyValue::List(items.iter().map(|s| ReplyValue::Str(s.to_string())).collect())
    }

    #[test]
    fn test_format_scalars() {
        assert_eq!(format_reply(&ReplyValue::Null), "null");
        assert_eq!(format_reply(&ReplyValue::Int(42)), "42");
        assert_eq!(format_reply(&ReplyValue::Int(-1_000_000)), "-1000000");
        assert_eq!(format_reply(&ReplyValue::Float(1.5)), "1.500000");
        assert_eq!(format_reply(&ReplyValue::Bool(true)), "true");
        assert_eq!(format_reply(&ReplyValue::Bool(false)), "false");
    }

    #[test]
    fn test_format_list_of_strings() {
        assert_eq!(format_reply(&strs(&["a", "b", "c"])), "[\"a\",\"b\",\"c\"]");
    }

    #[test]
    fn test_format_strings_are_quoted_without_escaping() {
        assert_eq!(format_reply(&ReplyValue::Str("hello".into())), "\"hello\"");
        assert_eq!(
            format_reply(&ReplyValue::Str("say \"hi\"".into())),
            "\"say \"hi\"\""
        );
        assert_eq!(format_reply(&ReplyValue::Bytes(b"raw".to_vec())), "\"raw\"");
    }

    #[test]
    fn test_format_large_float_stays_fixed_point() {
        assert_eq!(format_reply(&ReplyValue::Float(1e10)), "10000000000.000000");
        assert_eq!(format_reply(&ReplyValue::Float(1e-9)), "0.000000");
    }

    #[test]
    fn test_format_nested_collections() {
        let mut inner = BTreeMap::new();
        inner.insert("count".to_string(), ReplyValue::Int(2));
        inner.insert("name".to_string(), ReplyValue::Bytes(b"x".to_vec()));
        let value = ReplyValue::List(vec![ReplyValue::Map(inner), ReplyValue::Null]);
        assert_eq!(format_reply(&value), r#"[{"count":2,"name":"x"},null]"#);
    }

    #[test]
    fn test_from_redis_scalars() {
        assert_eq!(ReplyValue::from(redis::Value::Nil), ReplyValue::Null);
        assert_eq!(ReplyValue::from(redis::Value::Int(7)), ReplyValue::Int(7));
        assert_eq!(
            ReplyValue::from(redis::Value::Okay),
            ReplyValue::Str("OK".into())
        );
        assert_eq!(
            ReplyValue::from(redis::Value::SimpleString("PONG".into())),
            ReplyValue::Str("PONG".into())
        );
        assert_eq!(
            ReplyValue::from(redis::Value::BulkString(b"v".to_vec())),
            ReplyValue::Bytes(b"v".to_vec())
        );
        assert_eq!(
            ReplyValue::from(redis::Value::Double(2.5)),
            ReplyValue::Float(2.5)
        );
    }

    #[test]
    fn test_from_redis_collections() {
        let array = redis::Value::Array(vec![
            redis::Value::BulkString(b"a".to_vec()),
            redis::Value::Int(1),
        ]);
        assert_eq!(format_reply(&array.into()), "[\"a\",1]");

        let map = redis::Value::Map(vec![
            (
                redis::Value::BulkString(b"field".to_vec()),
                redis::Value::BulkString(b"value".to_vec()),
            ),
            (redis::Value::Int(2), redis::Value::Nil),
        ]);
        assert_eq!(format_reply(&map.into()), r#"{"2":null,"field":"value"}"#);
    }

    #[test]
    fn test_invalid_utf8_bytes_are_rendered_lossily() {
        let value = ReplyValue::Bytes(vec![0x66, 0xff, 0x6f]);
        assert_eq!(format_reply(&value), "\"f\u{fffd}o\"");
    }

    #[test]
    fn test_as_text() {
        assert_eq!(ReplyValue::Int(3).as_text().as_deref(), Some("3"));
        assert_eq!(ReplyValue::Bytes(b"k".to_vec()).as_text().as_deref(), Some("k"));
        assert!(ReplyValue::Null.as_text().is_none());
        assert!(strs(&["a"]).as_text().is_none());
    }
}
