use bytes::Bytes;
use serde_json::Value;

/// One decoded unit of a response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Json(Value),
    Bytes(Bytes),
}

impl Record {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Record::Json(value) => Some(value),
            Record::Bytes(_) => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Record::Json(value) => Some(value),
            Record::Bytes(_) => None,
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            Record::Bytes(bytes) => bytes,
            Record::Json(value) => Bytes::from(value.to_string()),
        }
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        Record::Json(value)
    }
}

/// Transaction id of a Bitbus/Bitsocket record (`tx.h`).
pub fn tx_id(record: &Value) -> Option<&str> {
    record.get("tx")?.get("h")?.as_str()
}
