use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;

use crate::error::{BayesError, Result};
use crate::hasher;

/// Type tag mixed into every hash input, so that equal byte patterns of
/// different declared types never share a UID.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeSalt {
    I8 = 1,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Str,
    Bytes,
    Bool,
    /// Composite identity of an ordered UID sequence.
    Flow,
}

/// The closed set of scalar kinds that can be turned into a UID.
#[derive(Archive, RkyvDeserialize, RkyvSerialize, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub enum Value {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(#[serde(with = "f32_bits")] f32),
    F64(#[serde(with = "f64_bits")] f64),
    Str(String),
    Bytes(Vec<u8>),
    Bool(bool),
}

// Floats are written to text formats as their IEEE-754 bit pattern, so NaN,
// infinities and -0.0 come back exactly.
mod f32_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &f32, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u32(v.to_bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f32, D::Error> {
        u32::deserialize(d).map(f32::from_bits)
    }
}

mod f64_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(v.to_bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        u64::deserialize(d).map(f64::from_bits)
    }
}

impl Value {
    pub fn salt(&self) -> TypeSalt {
        match self {
            Value::I8(_) => TypeSalt::I8,
            Value::I16(_) => TypeSalt::I16,
            Value::I32(_) => TypeSalt::I32,
            Value::I64(_) => TypeSalt::I64,
            Value::U8(_) => TypeSalt::U8,
            Value::U16(_) => TypeSalt::U16,
            Value::U32(_) => TypeSalt::U32,
            Value::U64(_) => TypeSalt::U64,
            Value::F32(_) => TypeSalt::F32,
            Value::F64(_) => TypeSalt::F64,
            Value::Str(_) => TypeSalt::Str,
            Value::Bytes(_) => TypeSalt::Bytes,
            Value::Bool(_) => TypeSalt::Bool,
        }
    }

    /// Short name of the declared type, as used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Bool(_) => "bool",
        }
    }

    /// Canonical byte encoding: big-endian at the declared width for
    /// numerics, raw bytes for strings and blobs, and an all-ones or
    /// all-zeros word for booleans.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Value::I8(v) => v.to_be_bytes().to_vec(),
            Value::I16(v) => v.to_be_bytes().to_vec(),
            Value::I32(v) => v.to_be_bytes().to_vec(),
            Value::I64(v) => v.to_be_bytes().to_vec(),
            Value::U8(v) => v.to_be_bytes().to_vec(),
            Value::U16(v) => v.to_be_bytes().to_vec(),
            Value::U32(v) => v.to_be_bytes().to_vec(),
            Value::U64(v) => v.to_be_bytes().to_vec(),
            Value::F32(v) => v.to_bits().to_be_bytes().to_vec(),
            Value::F64(v) => v.to_bits().to_be_bytes().to_vec(),
            Value::Str(s) => s.as_bytes().to_vec(),
            Value::Bytes(b) => b.clone(),
            Value::Bool(true) => vec![0xFF; 8],
            Value::Bool(false) => vec![0x00; 8],
        }
    }

    /// Identity comparison: same declared type and same canonical bytes.
    /// Unlike `==`, a NaN is the same as itself.
    pub fn same_as(&self, other: &Value) -> bool {
        self.salt() == other.salt() && self.canonical_bytes() == other.canonical_bytes()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I8(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::U8(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Str(s) => f.write_str(s),
            Value::Bytes(b) => {
                f.write_str("0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Value::Bool(v) => write!(f, "{}", v),
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_scalar!(
    i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64,
    f32 => F32, f64 => F64,
    String => Str, Vec<u8> => Bytes, bool => Bool,
);

// Pointer-sized integers are stored at 64-bit width.
impl From<isize> for Value {
    fn from(v: isize) -> Self {
        Value::I64(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::U64(v as u64)
    }
}

impl From<&Value> for Value {
    fn from(v: &Value) -> Self {
        v.clone()
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

/// Boundary check for loosely typed input: only scalars pass.
impl TryFrom<&serde_json::Value> for Value {
    type Error = BayesError;

    fn try_from(raw: &serde_json::Value) -> Result<Self> {
        match raw {
            serde_json::Value::Null => Err(BayesError::NilInput),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::I64(i))
                } else if let Some(u) = n.as_u64() {
                    Ok(Value::U64(u))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::F64(f))
                } else {
                    Err(BayesError::UnsupportedType { kind: format!("number {}", n) })
                }
            }
            serde_json::Value::String(s) => Ok(Value::Str(s.clone())),
            serde_json::Value::Array(_) => Err(BayesError::UnsupportedType { kind: "array".into() }),
            serde_json::Value::Object(_) => Err(BayesError::UnsupportedType { kind: "object".into() }),
        }
    }
}

/// A raw value paired with its UID. The unit exchanged with storage.
#[derive(Archive, RkyvDeserialize, RkyvSerialize, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct Item {
    pub value: Option<Value>,
    pub uid: u64,
}

impl Item {
    pub fn new(value: impl Into<Value>) -> Self {
        let value = value.into();
        let uid = hasher::to_uid(&value);
        Self { value: Some(value), uid }
    }

    /// Recomputes the UID from the held value. False for an empty item.
    pub fn is_valid_uid(&self) -> bool {
        match &self.value {
            Some(v) => hasher::to_uid(v) == self.uid,
            None => false,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.value.is_none() {
            return Err(BayesError::EmptyValue);
        }

        let bytes = rkyv::to_bytes::<_, 256>(self)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        Ok(bytes.into_vec())
    }

    pub fn decode(encoded: &[u8]) -> Result<Self> {
        let mut aligned = rkyv::AlignedVec::with_capacity(encoded.len());
        aligned.extend_from_slice(encoded);

        let archived = rkyv::check_archived_root::<Item>(&aligned)
        .map_err(|e| BayesError::decode(format!("malformed item ({} bytes): {}", encoded.len(), e)))?;

        let item: Item = archived
        .deserialize(&mut rkyv::Infallible)
        .unwrap_or_else(|never| match never {});

        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_bytes_do_not_look_like_small_ints() {
        assert_eq!(Value::Bool(true).canonical_bytes(), vec![0xFF; 8]);
        assert_eq!(Value::Bool(false).canonical_bytes(), vec![0x00; 8]);
        assert_ne!(Value::Bool(false).canonical_bytes(), Value::I64(1).canonical_bytes());
    }

    #[test]
    fn numerics_are_big_endian_at_declared_width() {
        assert_eq!(Value::I16(0x0102).canonical_bytes(), vec![0x01, 0x02]);
        assert_eq!(Value::U32(1).canonical_bytes(), vec![0, 0, 0, 1]);
        assert_eq!(Value::I8(-1).canonical_bytes(), vec![0xFF]);
        assert_eq!(Value::F64(1.0).canonical_bytes(), 1.0f64.to_bits().to_be_bytes().to_vec());
    }

    #[test]
    fn same_as_treats_nan_as_itself() {
        let nan = Value::F64(f64::NAN);
        assert_ne!(nan, nan.clone());
        assert!(nan.same_as(&nan.clone()));
        assert!(!Value::I32(1).same_as(&Value::I64(1)));
    }

    #[test]
    fn json_scalars_convert_and_composites_are_rejected() {
        let v: serde_json::Value = serde_json::json!(["So", 3, -4, 1.5, true, 18446744073709551615u64]);
        let arr = v.as_array().unwrap();
        assert_eq!(Value::try_from(&arr[0]).unwrap(), Value::Str("So".into()));
        assert_eq!(Value::try_from(&arr[1]).unwrap(), Value::I64(3));
        assert_eq!(Value::try_from(&arr[2]).unwrap(), Value::I64(-4));
        assert_eq!(Value::try_from(&arr[3]).unwrap(), Value::F64(1.5));
        assert_eq!(Value::try_from(&arr[4]).unwrap(), Value::Bool(true));
        assert_eq!(Value::try_from(&arr[5]).unwrap(), Value::U64(u64::MAX));

        assert!(matches!(Value::try_from(&serde_json::Value::Null), Err(BayesError::NilInput)));
        assert!(matches!(Value::try_from(&v), Err(BayesError::UnsupportedType { .. })));
        assert!(matches!(
            Value::try_from(&serde_json::json!({"a": 1})),
            Err(BayesError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn floats_serialize_as_bit_patterns() {
        let json = serde_json::to_string(&Value::F64(1.0)).unwrap();
        assert_eq!(json, format!(r#"{{"F64":{}}}"#, 1.0f64.to_bits()));

        for v in [f32::INFINITY, f32::NEG_INFINITY, f32::NAN, -0.0f32] {
            let back: Value = serde_json::from_str(&serde_json::to_string(&Value::F32(v)).unwrap()).unwrap();
            assert!(back.same_as(&Value::F32(v)), "{:?}", v);
        }
        for v in [f64::INFINITY, f64::NAN, -0.0f64, 0.1] {
            let back: Value = serde_json::from_str(&serde_json::to_string(&Value::F64(v)).unwrap()).unwrap();
            assert!(back.same_as(&Value::F64(v)), "{:?}", v);
        }
    }

    #[test]
    fn item_round_trips_through_binary() {
        for value in [
            Value::from("Happy Birthday"),
            Value::from(42u16),
            Value::from(-7i64),
            Value::from(2.5f32),
            Value::from(vec![0u8, 1, 2, 255]),
            Value::from(false),
        ] {
            let item = Item::new(value);
            let encoded = item.encode().unwrap();
            let decoded = Item::decode(&encoded).unwrap();
            assert_eq!(item, decoded);
            assert!(decoded.is_valid_uid());
        }
    }

    #[test]
    fn empty_item_refuses_to_encode() {
        let item = Item { value: None, uid: 1 };
        assert!(matches!(item.encode(), Err(BayesError::EmptyValue)));
        assert!(!item.is_valid_uid());
    }

    #[test]
    fn malformed_bytes_fail_to_decode() {
        assert!(matches!(Item::decode(&[]), Err(BayesError::DecodeFailure { .. })));

        let encoded = Item::new("truncate me").encode().unwrap();
        let truncated = &encoded[..encoded.len() / 2];
        assert!(matches!(Item::decode(truncated), Err(BayesError::DecodeFailure { .. })));
    }

    #[test]
    fn tampered_uid_is_detected() {
        let mut item = Item::new("1");
        assert!(item.is_valid_uid());
        item.uid ^= 1;
        assert!(!item.is_valid_uid());
    }
}
