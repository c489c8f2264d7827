//! Canonical encoder.

use crate::error::{CodecError, CodecResult};
use crate::header::{write_head, Major, DOUBLE, FALSE, NULL, TRUE};
use crate::value::Value;

/// Encodes `value` to its unique canonical byte string.
///
/// # Errors
///
/// Fails on NaN floats and on maps holding the same key twice.
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// Appends canonical encodings of values to a buffer.
///
/// Map entries are written in bytewise order of their encoded keys, whatever
/// order the [`Value::Map`] holds them in.
#[derive(Debug, Default)]
pub struct CanonicalEncoder {
    out: Vec<u8>,
}

impl CanonicalEncoder {
    /// Creates an encoder with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an encoder whose buffer holds `capacity` bytes before growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            out: Vec::with_capacity(capacity),
        }
    }

    /// Appends `value`. On error the buffer holds a partial item.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Null => self.out.push(NULL),
            Value::Bool(flag) => self.out.push(if *flag { TRUE } else { FALSE }),
            Value::Integer(n) if *n >= 0 => write_head(&mut self.out, Major::Unsigned, *n as u64),
            // -1 - n, which is the bitwise complement for negative n
            Value::Integer(n) => write_head(&mut self.out, Major::Negative, !*n as u64),
            Value::Float(f) => {
                if f.is_nan() {
                    return Err(CodecError::NaN);
                }
                self.out.push(DOUBLE);
                self.out.extend_from_slice(&f.to_bits().to_be_bytes());
            }
            Value::Bytes(bytes) => self.string(Major::Bytes, bytes),
            Value::Text(text) => self.string(Major::Text, text.as_bytes()),
            Value::Array(items) => {
                write_head(&mut self.out, Major::Array, items.len() as u64);
                for item in items {
                    self.encode(item)?;
                }
            }
            Value::Map(pairs) => self.map(pairs)?,
        }
        Ok(())
    }

    /// Consumes the encoder, returning the buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }

    /// The bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.out
    }

    fn string(&mut self, major: Major, bytes: &[u8]) {
        write_head(&mut self.out, major, bytes.len() as u64);
        self.out.extend_from_slice(bytes);
    }

    fn map(&mut self, pairs: &[(Value, Value)]) -> CodecResult<()> {
        let mut entries = pairs
            .iter()
            .map(|(key, value)| Ok((to_canonical_cbor(key)?, value)))
            .collect::<CodecResult<Vec<_>>>()?;
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        if entries.windows(2).any(|pair| pair[0].0 == pair[1].0) {
            return Err(CodecError::DuplicateKey);
        }

        write_head(&mut self.out, Major::Map, entries.len() as u64);
        for (key, value) in entries {
            self.out.extend_from_slice(&key);
            self.encode(value)?;
        }
        Ok(())
    }
}
