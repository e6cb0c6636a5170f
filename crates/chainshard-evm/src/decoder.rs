//! `EventDecoder` — maps raw logs to `DecodedEvent`s.
//!
//! Schemas are compiled once: the signature hash becomes the lookup key and
//! every field type is resolved to its alloy `DynSolType` up front, so decoding
//! a log is a hash lookup plus ABI decoding.
//!
//! # Indexed-parameter encoding
//! - **Value types** (uint, int, bool, address, bytes1–bytes32) are padded to
//!   32 bytes and stored in the topic directly.
//! - **Reference types** (string, bytes, arrays) are stored as the keccak256
//!   of their encoding; the original value is unrecoverable and the decoder
//!   returns the 32-byte hash as `Bytes`.

use std::collections::HashMap;

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::B256;
use indexmap::IndexMap;

use chainshard_core::error::DecodeError;
use chainshard_core::event::{DecodedEvent, FieldValue};
use chainshard_core::schema::{EventSchema, FieldType};

use crate::normalizer::{normalize, to_dyn_type};
use crate::source::RawLog;

struct CompiledField {
    name: String,
    ty: FieldType,
    dyn_ty: DynSolType,
    indexed: bool,
}

struct CompiledEvent {
    schema: EventSchema,
    fields: Vec<CompiledField>,
    indexed_count: usize,
    /// Tuple of the non-indexed field types, `None` if there are none.
    data_tuple: Option<DynSolType>,
}

impl CompiledEvent {
    fn new(schema: EventSchema) -> Self {
        let fields: Vec<CompiledField> = schema
            .fields
            .iter()
            .map(|f| CompiledField {
                name: f.name.clone(),
                ty: f.ty.clone(),
                dyn_ty: to_dyn_type(&f.ty),
                indexed: f.indexed,
            })
            .collect();
        let data_types: Vec<DynSolType> = fields
            .iter()
            .filter(|f| !f.indexed)
            .map(|f| f.dyn_ty.clone())
            .collect();
        Self {
            indexed_count: fields.iter().filter(|f| f.indexed).count(),
            data_tuple: (!data_types.is_empty()).then(|| DynSolType::Tuple(data_types)),
            fields,
            schema,
        }
    }
}

/// Decoder over a fixed set of event schemas.
pub struct EventDecoder {
    table: HashMap<B256, CompiledEvent>,
}

impl EventDecoder {
    /// Build the signature-hash → schema table.
    pub fn new(schemas: impl IntoIterator<Item = EventSchema>) -> Self {
        let table = schemas
            .into_iter()
            .map(|s| (B256::from(s.signature_hash()), CompiledEvent::new(s)))
            .collect();
        Self { table }
    }

    /// `0x`-prefixed signature hashes this decoder accepts, for log filters.
    pub fn topic0s(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.table.keys().map(|k| format!("{k:#x}")).collect();
        topics.sort();
        topics
    }

    /// Decode a single log.
    pub fn decode(&self, log: &RawLog) -> Result<DecodedEvent, DecodeError> {
        let topic0 = log.topics.first().ok_or_else(|| DecodeError::SchemaMismatch {
            expected: self.expected(),
            got: "<no topics>".into(),
        })?;
        let compiled = topic0
            .parse::<B256>()
            .ok()
            .and_then(|hash| self.table.get(&hash))
            .ok_or_else(|| DecodeError::SchemaMismatch {
                expected: self.expected(),
                got: topic0.clone(),
            })?;

        let block_number = log
            .block_number_u64()
            .ok_or_else(|| DecodeError::malformed(format!("invalid block number {:?}", log.block_number)))?;
        let transaction_hash = match log.tx_hash.as_deref() {
            Some(h) if is_hash32(h) => h.to_ascii_lowercase(),
            other => return Err(DecodeError::malformed(format!("invalid transaction hash {other:?}"))),
        };

        let topics = &log.topics[1..];
        if topics.len() != compiled.indexed_count {
            return Err(DecodeError::malformed(format!(
                "{} expects {} indexed topic(s), log has {}",
                compiled.schema.name,
                compiled.indexed_count,
                topics.len()
            )));
        }

        let mut data_values = match &compiled.data_tuple {
            Some(tuple) => {
                let data = decode_hex(&log.data, "data")?;
                match tuple.abi_decode_params(&data) {
                    Ok(DynSolValue::Tuple(vals)) => vals.into_iter(),
                    Ok(other) => vec![other].into_iter(),
                    Err(e) => return Err(DecodeError::malformed(format!("data: {e}"))),
                }
            }
            None => Vec::new().into_iter(),
        };

        let mut topic_iter = topics.iter();
        let mut fields = IndexMap::with_capacity(compiled.fields.len());
        for field in &compiled.fields {
            let value = if field.indexed {
                let topic = topic_iter
                    .next()
                    .ok_or_else(|| DecodeError::malformed(format!("missing topic for '{}'", field.name)))?;
                decode_topic(topic, field)?
            } else {
                let val = data_values
                    .next()
                    .ok_or_else(|| DecodeError::malformed(format!("missing data for '{}'", field.name)))?;
                normalize(val)
            };
            fields.insert(field.name.clone(), value);
        }

        Ok(DecodedEvent {
            block_number,
            transaction_hash,
            fields,
        })
    }

    fn expected(&self) -> String {
        let mut sigs: Vec<String> = self.table.values().map(|c| c.schema.signature()).collect();
        sigs.sort();
        sigs.join(" | ")
    }
}

fn decode_topic(topic: &str, field: &CompiledField) -> Result<FieldValue, DecodeError> {
    let bytes = decode_hex(topic, &field.name)?;
    if bytes.len() != 32 {
        return Err(DecodeError::malformed(format!(
            "topic for '{}' is {} bytes, expected 32",
            field.name,
            bytes.len()
        )));
    }
    if field.ty.is_hashed_when_indexed() {
        return Ok(FieldValue::Bytes(bytes));
    }
    field
        .dyn_ty
        .abi_decode(&bytes)
        .map(normalize)
        .map_err(|e| DecodeError::malformed(format!("topic '{}': {e}", field.name)))
}

fn decode_hex(s: &str, what: &str) -> Result<Vec<u8>, DecodeError> {
    let hex_str = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(hex_str).map_err(|e| DecodeError::malformed(format!("invalid hex in {what}: {e}")))
}

fn is_hash32(s: &str) -> bool {
    s.strip_prefix("0x")
        .map_or(false, |h| h.len() == 64 && h.bytes().all(|b| b.is_ascii_hexdigit()))
}
