//! Strict canonical decoder.
//!
//! Only the encoding [`to_canonical_cbor`](crate::to_canonical_cbor) would
//! produce is accepted, so decoding then re-encoding is the identity on bytes.

use crate::error::{CodecError, CodecResult};
use crate::header::{argument_form, Major, DOUBLE, FALSE, INDEFINITE, NULL, TRUE};
use crate::value::Value;

/// Deepest nesting of arrays and maps the decoder follows.
pub const MAX_DEPTH: usize = 64;

/// Decodes a single value spanning all of `bytes`.
///
/// # Errors
///
/// Fails on malformed or non-canonical input and on trailing bytes.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = CanonicalDecoder::new(bytes);
    let value = decoder.decode()?;
    match decoder.remaining().len() {
        0 => Ok(value),
        count => Err(CodecError::TrailingBytes { count }),
    }
}

/// Reads canonical values one after another from a byte slice.
#[derive(Debug)]
pub struct CanonicalDecoder<'a> {
    input: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> CanonicalDecoder<'a> {
    /// Creates a decoder positioned at the start of `input`.
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    /// Reads the next value.
    pub fn decode(&mut self) -> CodecResult<Value> {
        let start = self.pos;
        let initial = self.take(1)?[0];
        let info = initial & 0x1f;
        let major = Major::of(initial);

        if major == Major::Simple {
            return self.simple(start, initial);
        }
        let argument = self.argument(start, info)?;
        match major {
            Major::Unsigned => i64::try_from(argument)
                .map(Value::Integer)
                .map_err(|_| CodecError::IntegerOverflow { offset: start }),
            Major::Negative => i64::try_from(argument)
                .map(|n| Value::Integer(-1 - n))
                .map_err(|_| CodecError::IntegerOverflow { offset: start }),
            Major::Bytes => Ok(Value::Bytes(self.payload(start, argument)?.to_vec())),
            Major::Text => {
                let raw = self.payload(start, argument)?;
                std::str::from_utf8(raw)
                    .map(|text| Value::Text(text.to_owned()))
                    .map_err(|_| CodecError::InvalidUtf8 { offset: start })
            }
            Major::Array => self.nested(|d| d.array(start, argument)),
            Major::Map => self.nested(|d| d.map(start, argument)),
            Major::Tag | Major::Simple => Err(CodecError::Unsupported {
                offset: start,
                what: "tagged item",
            }),
        }
    }

    /// Returns `true` once every byte has been read.
    pub fn is_empty(&self) -> bool {
        self.pos == self.input.len()
    }

    /// The unread tail of the input.
    pub fn remaining(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }

    fn take(&mut self, count: usize) -> CodecResult<&'a [u8]> {
        let input = self.input;
        let end = self
            .pos
            .checked_add(count)
            .filter(|end| *end <= input.len())
            .ok_or(CodecError::UnexpectedEof { offset: self.pos })?;
        let slice = &input[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn argument(&mut self, start: usize, info: u8) -> CodecResult<u64> {
        let Some((width, floor)) = argument_form(info) else {
            return Err(CodecError::Unsupported {
                offset: start,
                what: if info == INDEFINITE {
                    "indefinite-length item"
                } else {
                    "reserved additional information"
                },
            });
        };
        if width == 0 {
            return Ok(u64::from(info));
        }
        let argument = self
            .take(width)?
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
        if argument < floor {
            return Err(CodecError::NonCanonical {
                offset: start,
                reason: "argument not in shortest form",
            });
        }
        Ok(argument)
    }

    /// Converts an announced length to `usize`, bounded by what the rest of
    /// the input could hold at `unit` bytes per element.
    fn length(&self, start: usize, claimed: u64, unit: usize) -> CodecResult<usize> {
        let available = self.input.len() - self.pos;
        match usize::try_from(claimed) {
            Ok(len) if len.saturating_mul(unit) <= available => Ok(len),
            _ => Err(CodecError::LengthExceeded {
                offset: start,
                claimed,
                available,
            }),
        }
    }

    fn payload(&mut self, start: usize, claimed: u64) -> CodecResult<&'a [u8]> {
        let len = self.length(start, claimed, 1)?;
        self.take(len)
    }

    fn nested(&mut self, read: impl FnOnce(&mut Self) -> CodecResult<Value>) -> CodecResult<Value> {
        if self.depth == MAX_DEPTH {
            return Err(CodecError::TooDeep { limit: MAX_DEPTH });
        }
        self.depth += 1;
        let value = read(self);
        self.depth -= 1;
        value
    }

    fn array(&mut self, start: usize, claimed: u64) -> CodecResult<Value> {
        let len = self.length(start, claimed, 1)?;
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(self.decode()?);
        }
        Ok(Value::Array(items))
    }

    fn map(&mut self, start: usize, claimed: u64) -> CodecResult<Value> {
        let len = self.length(start, claimed, 2)?;
        let input = self.input;
        let mut pairs = Vec::with_capacity(len);
        let mut previous: Option<&'a [u8]> = None;

        for _ in 0..len {
            let key_start = self.pos;
            let key = self.decode()?;
            let raw = &input[key_start..self.pos];
            if let Some(prev) = previous {
                if raw <= prev {
                    return Err(CodecError::NonCanonical {
                        offset: key_start,
                        reason: if raw == prev {
                            "duplicate map key"
                        } else {
                            "map keys out of order"
                        },
                    });
                }
            }
            previous = Some(raw);
            let value = self.decode()?;
            pairs.push((key, value));
        }
        Ok(Value::Map(pairs))
    }

    fn simple(&mut self, start: usize, initial: u8) -> CodecResult<Value> {
        let unsupported = |what| CodecError::Unsupported {
            offset: start,
            what,
        };
        match initial {
            FALSE => Ok(Value::Bool(false)),
            TRUE => Ok(Value::Bool(true)),
            NULL => Ok(Value::Null),
            DOUBLE => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(self.take(8)?);
                let float = f64::from_be_bytes(raw);
                if float.is_nan() {
                    return Err(CodecError::NaN);
                }
                Ok(Value::Float(float))
            }
            0xf9 | 0xfa => Err(CodecError::NonCanonical {
                offset: start,
                reason: "floats must be 64-bit",
            }),
            0xf7 => Err(unsupported("undefined")),
            0xff => Err(unsupported("indefinite-length item")),
            _ => Err(unsupported("simple value")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::to_canonical_cbor;

    fn error_of(bytes: &[u8]) -> CodecError {
        from_cbor(bytes).unwrap_err()
    }

    #[test]
    fn decodes_document_fields() {
        let value = Value::map(vec![
            (Value::from("EntityID"), Value::Integer(1_000_000)),
            (Value::from("Offset"), Value::Integer(-300)),
            (Value::from("Name"), Value::from("Files/foo.main")),
        ]);
        let bytes = to_canonical_cbor(&value).unwrap();
        assert_eq!(from_cbor(&bytes).unwrap(), value);
    }

    #[test]
    fn integer_extremes() {
        for n in [i64::MIN, -1, 0, 23, 24, i64::MAX] {
            let bytes = to_canonical_cbor(&Value::Integer(n)).unwrap();
            assert_eq!(from_cbor(&bytes).unwrap(), Value::Integer(n));
        }
        // 2^63 does not fit in either direction.
        let too_big = [0x1b, 0x80, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(error_of(&too_big), CodecError::IntegerOverflow { offset: 0 });
        let too_small = [0x3b, 0x80, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(error_of(&too_small), CodecError::IntegerOverflow { offset: 0 });
    }

    #[test]
    fn rejects_long_form_arguments() {
        assert!(matches!(
            error_of(&[0x18, 0x05]),
            CodecError::NonCanonical { offset: 0, .. }
        ));
        assert!(matches!(
            error_of(&[0x82, 0x01, 0x19, 0x00, 0xff]),
            CodecError::NonCanonical { offset: 2, .. }
        ));
    }

    #[test]
    fn rejects_short_floats_and_nan() {
        assert!(matches!(
            error_of(&[0xf9, 0x3c, 0x00]),
            CodecError::NonCanonical { .. }
        ));
        let nan = f64::NAN.to_bits().to_be_bytes();
        let mut bytes = vec![0xfb];
        bytes.extend_from_slice(&nan);
        assert_eq!(error_of(&bytes), CodecError::NaN);
    }

    #[test]
    fn rejects_unsorted_and_duplicate_keys() {
        // {"b": 1, "a": 2}
        let unsorted = [0xa2, 0x61, b'b', 0x01, 0x61, b'a', 0x02];
        assert!(matches!(
            error_of(&unsorted),
            CodecError::NonCanonical {
                offset: 4,
                reason: "map keys out of order"
            }
        ));
        let duplicate = [0xa2, 0x61, b'a', 0x01, 0x61, b'a', 0x02];
        assert!(matches!(
            error_of(&duplicate),
            CodecError::NonCanonical {
                reason: "duplicate map key",
                ..
            }
        ));
    }

    #[test]
    fn rejects_unsupported_items() {
        for bytes in [
            &[0x5f, 0xff][..],
            &[0x9f, 0xff],
            &[0xc1, 0x00],
            &[0xf7],
            &[0xe0],
            &[0x1c],
        ] {
            assert!(
                matches!(error_of(bytes), CodecError::Unsupported { .. }),
                "{bytes:02x?}"
            );
        }
    }

    #[test]
    fn lengths_are_bounded_by_input() {
        assert_eq!(
            error_of(&[0x5a, 0xff, 0xff, 0xff, 0xff]),
            CodecError::LengthExceeded {
                offset: 0,
                claimed: u64::from(u32::MAX),
                available: 0
            }
        );
        // Two entries need at least four bytes.
        assert!(matches!(
            error_of(&[0xa2, 0x01, 0x02]),
            CodecError::LengthExceeded { .. }
        ));
        assert_eq!(
            error_of(&[0x62, b'a']),
            CodecError::LengthExceeded {
                offset: 0,
                claimed: 2,
                available: 1
            }
        );
        assert_eq!(error_of(&[0x19, 0x01]), CodecError::UnexpectedEof { offset: 1 });
        assert_eq!(error_of(&[]), CodecError::UnexpectedEof { offset: 0 });
    }

    #[test]
    fn rejects_invalid_utf8() {
        assert_eq!(
            error_of(&[0x62, 0xc3, 0x28]),
            CodecError::InvalidUtf8 { offset: 0 }
        );
    }

    #[test]
    fn nesting_is_limited() {
        let mut bytes = vec![0x81; MAX_DEPTH];
        bytes.push(0x00);
        assert!(from_cbor(&bytes).is_ok());

        let mut bytes = vec![0x81; MAX_DEPTH + 1];
        bytes.push(0x00);
        assert_eq!(error_of(&bytes), CodecError::TooDeep { limit: MAX_DEPTH });
    }

    #[test]
    fn trailing_bytes_and_sequences() {
        assert_eq!(error_of(&[0x01, 0x02]), CodecError::TrailingBytes { count: 1 });

        let mut decoder = CanonicalDecoder::new(&[0x01, 0x61, b'x']);
        assert_eq!(decoder.decode().unwrap(), Value::Integer(1));
        assert_eq!(decoder.remaining(), [0x61, b'x']);
        assert_eq!(decoder.decode().unwrap(), Value::from("x"));
        assert!(decoder.is_empty());
    }
}
