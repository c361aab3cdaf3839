//! JSON <-> Value conversion utilities

use crate::{ProjectedRecord, Value};
use rust_decimal::prelude::ToPrimitive;

/// Convert serde_json::Value to a query Value. Integers that fit become
/// `Int32`, larger ones `Int64`, and other numbers `Double`.
pub fn json_to_value(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => i32::try_from(i).map(Value::Int32).unwrap_or(Value::Int64(i)),
            None => n.as_f64().map(Value::Double).unwrap_or(Value::Null),
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(arr) => Value::Collection(arr.into_iter().map(json_to_value).collect()),
        serde_json::Value::Object(obj) => {
            Value::Record(obj.into_iter().map(|(k, v)| (k, json_to_value(v))).collect())
        }
    }
}

/// Convert a query Value to serde_json::Value. Date, time, GUID and binary
/// values become strings.
pub fn value_to_json(v: Value) -> serde_json::Value {
    match v {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(b),
        Value::Byte(n) => serde_json::Value::Number(n.into()),
        Value::Int32(n) => serde_json::Value::Number(n.into()),
        Value::Int64(n) => serde_json::Value::Number(n.into()),
        Value::Single(n) => float(f64::from(n)),
        Value::Double(n) => float(n),
        Value::Decimal(d) => match d.to_i64() {
            Some(i) if d.fract().is_zero() => serde_json::Value::Number(i.into()),
            _ => d.to_f64().map(float).unwrap_or(serde_json::Value::Null),
        },
        Value::String(s) => serde_json::Value::String(s),
        Value::Collection(items) => serde_json::Value::Array(items.into_iter().map(value_to_json).collect()),
        Value::Record(fields) => serde_json::Value::Object(
            fields.into_iter().map(|(k, v)| (k, value_to_json(v))).collect(),
        ),
        other => serde_json::Value::String(other.to_string()),
    }
}

pub fn projected_to_json(record: ProjectedRecord) -> serde_json::Value {
    value_to_json(record.into_value())
}

fn float(n: f64) -> serde_json::Value {
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}
