use std::fmt;

use lsb_nls::Codec;
use serde::{Deserialize, Serialize};

use crate::error::{Error, FormatKind, Result};
use crate::io::{ByteReader, put_blob, put_f64_le, put_i32_le, put_u8, put_u32_le};

/// Declared kind of a parameter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Real,
    Flag,
    Str,
    Array(&'static ValueKind),
}

impl ValueKind {
    /// Smallest possible encoding of a value of this kind.
    pub const fn min_size(self) -> usize {
        match self {
            ValueKind::Int => 4,
            ValueKind::Real => 8,
            ValueKind::Flag => 1,
            ValueKind::Str | ValueKind::Array(_) => 4,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Int => f.write_str("Int"),
            ValueKind::Real => f.write_str("Real"),
            ValueKind::Flag => f.write_str("Flag"),
            ValueKind::Str => f.write_str("Str"),
            ValueKind::Array(elem) => write!(f, "Array<{elem}>"),
        }
    }
}

/// A command parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Int(i32),
    Real(f64),
    Flag(bool),
    Str(String),
    Array(Vec<Value>),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Real(_) => "Real",
            Value::Flag(_) => "Flag",
            Value::Str(_) => "Str",
            Value::Array(_) => "Array",
        }
    }

    /// Whether this value may be stored in a slot of `kind`, elements included.
    pub fn matches(&self, kind: ValueKind) -> bool {
        match (self, kind) {
            (Value::Int(_), ValueKind::Int)
            | (Value::Real(_), ValueKind::Real)
            | (Value::Flag(_), ValueKind::Flag)
            | (Value::Str(_), ValueKind::Str) => true,
            (Value::Array(items), ValueKind::Array(elem)) => items.iter().all(|v| v.matches(*elem)),
            _ => false,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Value::Flag(v) => Some(*v),
            _ => None,
        }
    }

    /// Read one value of `kind`.
    pub fn decode(kind: ValueKind, r: &mut ByteReader<'_>, codec: &Codec) -> Result<Value> {
        Ok(match kind {
            ValueKind::Int => Value::Int(r.read_i32()?),
            ValueKind::Real => Value::Real(r.read_f64()?),
            ValueKind::Flag => {
                let at = r.offset();
                match r.read_u8()? {
                    0 => Value::Flag(false),
                    1 => Value::Flag(true),
                    other => return Err(r.error_at(at, FormatKind::BadFlag(other))),
                }
            }
            ValueKind::Str => Value::Str(decode_str(r, codec)?),
            ValueKind::Array(elem) => {
                let at = r.offset();
                let count = r.read_u32()? as usize;
                // Every element takes at least min_size bytes; reject absurd counts
                // before allocating.
                if count.saturating_mul(elem.min_size()) > r.remaining() {
                    return Err(r.error_at(at, FormatKind::Truncated));
                }
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(Value::decode(*elem, r, codec)?);
                }
                Value::Array(items)
            }
        })
    }

    /// Append the encoding of this value as `kind`.
    ///
    /// `field` only names the slot in a `TypeMismatch` error.
    pub fn encode(&self, kind: ValueKind, field: &str, codec: &Codec, out: &mut Vec<u8>) -> Result<()> {
        match (self, kind) {
            (Value::Int(v), ValueKind::Int) => put_i32_le(*v, out),
            (Value::Real(v), ValueKind::Real) => put_f64_le(*v, out),
            (Value::Flag(v), ValueKind::Flag) => put_u8(u8::from(*v), out),
            (Value::Str(s), ValueKind::Str) => put_blob(&codec.encode(s)?, out),
            (Value::Array(items), ValueKind::Array(elem)) => {
                put_u32_le(items.len() as u32, out);
                for (i, item) in items.iter().enumerate() {
                    item.encode(*elem, &format!("{field}[{i}]"), codec, out)?;
                }
            }
            _ => {
                return Err(Error::TypeMismatch {
                    field: field.to_string(),
                    expected: kind,
                    found: self.kind_name(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Flag(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Length-prefixed string in the chart encoding.
pub(crate) fn decode_str(r: &mut ByteReader<'_>, codec: &Codec) -> Result<String> {
    let at = r.offset();
    let len = r.read_u32()? as usize;
    if len > r.remaining() {
        return Err(r.error_at(
            at,
            FormatKind::StringOverrun {
                len,
                remaining: r.remaining(),
            },
        ));
    }
    let body_at = r.offset();
    let bytes = r.read_bytes(len)?;
    codec
        .decode_exact(bytes)
        .map(|s| s.into_owned())
        .map_err(|e| r.error_at(body_at, FormatKind::BadString(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsb_nls::Encoding;

    static STR: ValueKind = ValueKind::Str;

    fn cp932() -> Codec {
        Codec::new(Encoding::Cp932)
    }

    #[test]
    fn string_overrun_is_format_error() {
        let data = [5u8, 0, 0, 0, b'a', b'b'];
        let mut r = ByteReader::new(&data);
        let err = Value::decode(ValueKind::Str, &mut r, &cp932()).unwrap_err();
        match err {
            Error::Format { offset, kind, .. } => {
                assert_eq!(offset, 0);
                assert_eq!(kind, FormatKind::StringOverrun { len: 5, remaining: 2 });
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn flag_rejects_non_boolean_byte() {
        let data = [2u8];
        let mut r = ByteReader::new(&data);
        let err = Value::decode(ValueKind::Flag, &mut r, &cp932()).unwrap_err();
        assert!(matches!(err, Error::Format { kind: FormatKind::BadFlag(2), .. }));
    }

    #[test]
    fn array_of_strings() {
        let codec = cp932();
        let value = Value::Array(vec![Value::Str("a".into()), Value::Str("選".into())]);
        let kind = ValueKind::Array(&STR);
        let mut out = Vec::new();
        value.encode(kind, "Params", &codec, &mut out).unwrap();
        assert_eq!(out, [2, 0, 0, 0, 1, 0, 0, 0, b'a', 2, 0, 0, 0, 0x91, 0x49]);
        let mut r = ByteReader::new(&out);
        assert_eq!(Value::decode(kind, &mut r, &codec).unwrap(), value);
        assert!(r.is_empty());
    }

    #[test]
    fn encode_checks_kind() {
        let mut out = Vec::new();
        let err = Value::Str("x".into())
            .encode(ValueKind::Int, "Time", &cp932(), &mut out)
            .unwrap_err();
        match err {
            Error::TypeMismatch { field, expected, found } => {
                assert_eq!(field, "Time");
                assert_eq!(expected, ValueKind::Int);
                assert_eq!(found, "Str");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(out.is_empty());
    }

    #[test]
    fn kind_display() {
        assert_eq!(ValueKind::Array(&STR).to_string(), "Array<Str>");
    }
}
