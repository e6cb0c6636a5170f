//! Decoded events and their persisted row form.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schema::EventSchema;

/// A decoded field value.
///
/// Integers wider than 128 bits keep their full decimal text so no precision
/// is lost on the way to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Uint(u128),
    /// Unsigned value above `u128::MAX`, decimal text.
    BigUint(String),
    Int(i128),
    /// Signed value outside `i128`, decimal text.
    BigInt(String),
    Bool(bool),
    /// EIP-55 checksummed address.
    Address(String),
    Bytes(Vec<u8>),
    Str(String),
    Array(Vec<FieldValue>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::BigUint(s) | Self::BigInt(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Address(a) => f.write_str(a),
            Self::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Self::Str(s) => f.write_str(s),
            Self::Array(items) => {
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

/// A log decoded against an `EventSchema`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedEvent {
    pub block_number: u64,
    /// `0x`-prefixed 32-byte transaction hash.
    pub transaction_hash: String,
    /// Field values in schema order.
    pub fields: IndexMap<String, FieldValue>,
}

/// The persisted form of a `DecodedEvent`. Equality is the row identity used
/// for de-duplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardRow {
    pub block_number: u64,
    pub transaction_hash: String,
    /// Text form of each field, in schema order.
    pub values: Vec<String>,
}

impl ShardRow {
    /// Project `event` onto the schema's columns. Fields missing from the
    /// event become empty strings.
    pub fn from_event(event: &DecodedEvent, schema: &EventSchema) -> Self {
        let values = schema
            .fields
            .iter()
            .map(|field| {
                event
                    .fields
                    .get(&field.name)
                    .map(ToString::to_string)
                    .unwrap_or_default()
            })
            .collect();
        Self {
            block_number: event.block_number,
            transaction_hash: event.transaction_hash.clone(),
            values,
        }
    }
}
