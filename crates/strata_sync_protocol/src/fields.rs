//! Field access helpers for decoding message maps.

use strata_codec::{from_cbor, CodecError, CodecResult, Value};

/// Decoded top-level map of a message.
pub(crate) struct Fields {
    pairs: Vec<(Value, Value)>,
}

impl Fields {
    pub(crate) fn decode(bytes: &[u8]) -> CodecResult<Self> {
        Self::from_value(from_cbor(bytes)?)
    }

    pub(crate) fn from_value(value: Value) -> CodecResult<Self> {
        match value {
            Value::Map(pairs) => Ok(Self { pairs }),
            _ => Err(CodecError::invalid_structure("expected map")),
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Value> {
        self.pairs
            .iter()
            .find(|(k, _)| k.as_text() == Some(name))
            .map(|(_, v)| v)
    }

    pub(crate) fn text(&self, name: &str) -> CodecResult<String> {
        self.get(name)
            .and_then(Value::as_text)
            .map(str::to_string)
            .ok_or_else(|| missing(name))
    }

    pub(crate) fn optional_text(&self, name: &str) -> Option<String> {
        self.get(name).and_then(Value::as_text).map(str::to_string)
    }

    pub(crate) fn unsigned(&self, name: &str) -> CodecResult<u64> {
        self.get(name)
            .and_then(Value::as_integer)
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| missing(name))
    }

    pub(crate) fn boolean(&self, name: &str) -> bool {
        self.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    pub(crate) fn array(&self, name: &str) -> &[Value] {
        self.get(name).and_then(Value::as_array).unwrap_or_default()
    }
}

pub(crate) fn missing(name: &str) -> CodecError {
    CodecError::invalid_structure(format!("missing {name}"))
}

#[allow(clippy::cast_possible_wrap)]
pub(crate) fn unsigned_value(n: u64) -> Value {
    Value::Integer(n as i64)
}

pub(crate) fn key(name: &str) -> Value {
    Value::Text(name.to_string())
}

pub(crate) fn unsigned_list(values: &[Value], name: &str) -> CodecResult<Vec<u64>> {
    values
        .iter()
        .map(|v| {
            v.as_integer()
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| CodecError::invalid_structure(format!("invalid {name} entry")))
        })
        .collect()
}
