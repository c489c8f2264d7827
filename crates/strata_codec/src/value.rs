//! Document field values.

use crate::encoder::to_canonical_cbor;
use std::cmp::Ordering;

/// A field value of a stored document or sync message.
///
/// Floats are held as doubles and always encoded as doubles, so every value
/// without NaN has exactly one encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Double-precision float. NaN cannot be encoded.
    Float(f64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// UTF-8 text.
    Text(String),
    /// Array.
    Array(Vec<Value>),
    /// Key/value pairs. The encoder orders them, see [`Value::map`].
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Builds a map with its pairs already in encoding order, so that a
    /// decoded map compares equal to the one that was stored.
    pub fn map(mut pairs: Vec<(Value, Value)>) -> Self {
        pairs.sort_by_cached_key(|(key, _)| sort_key(key));
        Value::Map(pairs)
    }

    /// Orders values by their encoded bytes, the order of map keys on disk.
    ///
    /// Values that cannot be encoded sort first.
    pub fn cmp_canonical(&self, other: &Self) -> Ordering {
        sort_key(self).cmp(&sort_key(other))
    }

    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(flag) => Some(flag),
            _ => None,
        }
    }

    /// The integer, if this is one.
    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            Value::Integer(n) => Some(n),
            _ => None,
        }
    }

    /// The float. Integers are widened, since whole-number coordinates may
    /// have been written as integers.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match *self {
            Value::Float(f) => Some(f),
            Value::Integer(n) => Some(n as f64),
            _ => None,
        }
    }

    /// The byte string, if this is one.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The text, if this is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// The items, if this is an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The pairs, if this is a map.
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Looks up a text key in a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
    }
}

fn sort_key(value: &Value) -> Vec<u8> {
    to_canonical_cbor(value).unwrap_or_default()
}

macro_rules! value_from {
    ($($ty:ty => |$arg:ident| $body:expr;)*) => {
        $(
            impl From<$ty> for Value {
                fn from($arg: $ty) -> Self {
                    $body
                }
            }
        )*
    };
}

value_from! {
    bool => |flag| Value::Bool(flag);
    i64 => |n| Value::Integer(n);
    i32 => |n| Value::Integer(i64::from(n));
    u32 => |n| Value::Integer(i64::from(n));
    f64 => |f| Value::Float(f);
    String => |text| Value::Text(text);
    &str => |text| Value::Text(text.to_owned());
    Vec<u8> => |bytes| Value::Bytes(bytes);
    &[u8] => |bytes| Value::Bytes(bytes.to_vec());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::from_cbor;

    fn keys(value: &Value) -> Vec<Value> {
        value
            .as_map()
            .unwrap()
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    #[test]
    fn map_orders_shorter_keys_first() {
        let map = Value::map(vec![
            (Value::from("EntityID"), Value::Integer(7)),
            (Value::from("Name"), Value::from("Files/foo.main")),
            (Value::from("Data"), Value::Null),
            (Value::from("Version"), Value::Integer(2)),
        ]);
        assert_eq!(
            keys(&map),
            ["Data", "Name", "Version", "EntityID"].map(Value::from)
        );
    }

    #[test]
    fn map_matches_its_decoded_form() {
        let map = Value::map(vec![
            (Value::Integer(-3), Value::Bool(true)),
            (Value::from("b"), Value::Null),
            (Value::Integer(100), Value::Bool(false)),
        ]);
        let decoded = from_cbor(&to_canonical_cbor(&map).unwrap()).unwrap();
        assert_eq!(decoded, map);
    }

    #[test]
    fn canonical_order_follows_major_type() {
        let mut values = vec![
            Value::Float(-2.0),
            Value::from("a"),
            Value::Integer(-1),
            Value::Null,
            Value::Bytes(vec![0]),
            Value::Integer(1),
        ];
        values.sort_by(Value::cmp_canonical);
        assert_eq!(
            values,
            [
                Value::Integer(1),
                Value::Integer(-1),
                Value::Bytes(vec![0]),
                Value::from("a"),
                Value::Null,
                Value::Float(-2.0),
            ]
        );
    }

    #[test]
    fn accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Bool(false).as_bool(), Some(false));
        assert_eq!(Value::Integer(5).as_integer(), Some(5));
        assert_eq!(Value::Integer(5).as_float(), Some(5.0));
        assert_eq!(Value::from("5").as_float(), None);
        assert_eq!(Value::from(&b"raw"[..]).as_bytes(), Some(&b"raw"[..]));
        assert_eq!(Value::from(9u32).as_text(), None);
        assert_eq!(Value::Array(vec![Value::Null]).as_array().map(<[_]>::len), Some(1));
    }

    #[test]
    fn get_looks_up_text_keys() {
        let map = Value::map(vec![
            (Value::from("Project"), Value::from("foo")),
            (Value::Integer(1), Value::from("numeric key")),
        ]);
        assert_eq!(map.get("Project"), Some(&Value::from("foo")));
        assert_eq!(map.get("1"), None);
        assert_eq!(Value::from("Project").get("Project"), None);
    }
}
