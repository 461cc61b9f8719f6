use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::domain::{calculation::MAX_EXACT_INTEGER, history::HistoryRecord};

/// Operands arrive loosely typed; parsing happens in the domain layer.
#[derive(Debug)]
pub struct CalculateRequest {
    pub num1: Option<Value>,
    pub num2: Option<Value>,
}

impl CalculateRequest {
    /// `None` unless `body` is a JSON object. An absent field stays `None`,
    /// distinct from an explicit `null`.
    pub fn from_body(body: Value) -> Option<Self> {
        match body {
            Value::Object(mut fields) => Some(Self {
                num1: fields.remove("num1"),
                num2: fields.remove("num2"),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CalculateResponse {
    #[serde(serialize_with = "serialize_number")]
    pub result: f64,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    #[serde(serialize_with = "serialize_number")]
    pub num1: f64,
    #[serde(serialize_with = "serialize_number")]
    pub num2: f64,
    #[serde(serialize_with = "serialize_number")]
    pub result: f64,
}

impl From<HistoryRecord> for HistoryEntry {
    fn from(record: HistoryRecord) -> Self {
        Self {
            num1: record.num1,
            num2: record.num2,
            result: record.result,
        }
    }
}

/// Integral values inside the exact-integer range render without a fraction.
fn serialize_number<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && value.abs() <= MAX_EXACT_INTEGER {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}
