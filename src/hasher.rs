//! Deterministic 64-bit surrogate keys ("UIDs") for values and for ordered
//! UID sequences ("flows").
//!
//! Every identity goes through the same three steps: salted canonical bytes,
//! SeaHash, then a fold down to 8 bytes where the last byte is the XOR of the
//! whole digest. SeaHash runs with its fixed default seeds, so UIDs are stable
//! across processes and platforms.

use crate::error::{BayesError, Result};
use crate::model::{TypeSalt, Value};

/// UID of a single value. Total over `Value`: the type check happens when
/// the `Value` is built.
pub fn to_uid(value: &Value) -> u64 {
    let mut buf = value.canonical_bytes();
    buf.push(value.salt() as u8);
    digest(&buf)
}

/// UID of a batch of values hashed as one unit, in order.
pub fn values_to_uid(values: &[Value]) -> Result<u64> {
    match values {
        [] => Err(BayesError::EmptyInput),
        [single] => Ok(to_uid(single)),
        many => {
            let uids: Vec<u64> = many.iter().map(to_uid).collect();
            flow_id(&uids)
        }
    }
}

/// Composite identity of an ordered UID history.
///
/// A one-element history is the UID itself, so first-order transitions and
/// prediction from a single predecessor share the same key. Longer histories
/// hash the concatenated big-endian UIDs; the order matters.
pub fn flow_id(uids: &[u64]) -> Result<u64> {
    match uids {
        [] => Err(BayesError::EmptyInput),
        [single] => Ok(*single),
        many => {
            let mut buf = Vec::with_capacity(many.len() * 8 + 1);
            for uid in many {
                buf.extend_from_slice(&uid.to_be_bytes());
            }
            buf.push(TypeSalt::Flow as u8);
            Ok(digest(&buf))
        }
    }
}

fn digest(salted: &[u8]) -> u64 {
    fold(&seahash::hash(salted).to_be_bytes())
}

/// Keeps the first 7 bytes and replaces the 8th with the XOR of every
/// byte of `hashed`, read as big-endian.
pub fn fold(hashed: &[u8]) -> u64 {
    let mut compressed = [0u8; 8];
    let head = hashed.len().min(7);
    compressed[..head].copy_from_slice(&hashed[..head]);
    compressed[7] = hashed.iter().fold(0u8, |acc, b| acc ^ b);
    u64::from_be_bytes(compressed)
}
