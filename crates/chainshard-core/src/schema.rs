//! Event schema model.
//!
//! An `EventSchema` is the typed descriptor of one event: its name and the
//! ordered list of `(name, type, indexed)` fields. Field order drives both ABI
//! decoding and the column order of persisted shards.
//!
//! The signature hash of an event is
//!   keccak256("Transfer(address,address,uint256)")
//!   → 0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef
//! and is what appears in `topics[0]` of every non-anonymous log.

use std::collections::HashSet;
use std::path::Path;

use alloy_json_abi::JsonAbi;
use serde::{Deserialize, Serialize};
use tiny_keccak::{Hasher, Keccak};

use crate::error::SchemaError;

/// Column names reserved for log metadata in persisted shards.
pub const RESERVED_COLUMNS: [&str; 2] = ["blockNumber", "transactionHash"];

// ─── FieldType ───────────────────────────────────────────────────────────────

/// Solidity ABI type of an event field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldType {
    /// `uintN`, width in bits.
    Uint(u16),
    /// `intN`, width in bits.
    Int(u16),
    Bool,
    Address,
    /// `bytesN`, length in bytes.
    FixedBytes(u8),
    /// Dynamic `bytes`.
    Bytes,
    String,
    /// Dynamic array `T[]`.
    Array(Box<FieldType>),
    /// Fixed array `T[k]`.
    FixedArray(Box<FieldType>, usize),
    /// Struct parameter, written `(T1,T2,...)`.
    Tuple(Vec<FieldType>),
}

impl FieldType {
    /// Parse a Solidity type name. `uint` and `int` normalise to 256 bits.
    pub fn parse(s: &str) -> Result<Self, SchemaError> {
        let s = s.trim();
        let unsupported = || SchemaError::UnsupportedType(s.to_string());

        if let Some(inner) = s.strip_suffix(']') {
            let open = inner.rfind('[').ok_or_else(unsupported)?;
            let elem = Self::parse(&inner[..open])?;
            let dim = &inner[open + 1..];
            return if dim.is_empty() {
                Ok(Self::Array(Box::new(elem)))
            } else {
                let len: usize = dim.parse().map_err(|_| unsupported())?;
                if len == 0 {
                    return Err(unsupported());
                }
                Ok(Self::FixedArray(Box::new(elem), len))
            };
        }

        if let Some(inner) = s.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
            let members = split_top_level(inner).ok_or_else(unsupported)?;
            if members.is_empty() {
                return Err(unsupported());
            }
            return members
                .into_iter()
                .map(Self::parse)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Tuple);
        }

        match s {
            "bool" => return Ok(Self::Bool),
            "address" => return Ok(Self::Address),
            "bytes" => return Ok(Self::Bytes),
            "string" => return Ok(Self::String),
            "uint" => return Ok(Self::Uint(256)),
            "int" => return Ok(Self::Int(256)),
            _ => {}
        }

        if let Some(bits) = s.strip_prefix("uint") {
            return parse_bits(bits).map(Self::Uint).ok_or_else(unsupported);
        }
        if let Some(bits) = s.strip_prefix("int") {
            return parse_bits(bits).map(Self::Int).ok_or_else(unsupported);
        }
        if let Some(len) = s.strip_prefix("bytes") {
            return match len.parse::<u8>() {
                Ok(n) if (1..=32).contains(&n) => Ok(Self::FixedBytes(n)),
                _ => Err(unsupported()),
            };
        }
        Err(unsupported())
    }

    /// Reference types appear in indexed topics only as their keccak hash.
    pub fn is_hashed_when_indexed(&self) -> bool {
        matches!(
            self,
            Self::Bytes | Self::String | Self::Array(_) | Self::FixedArray(..) | Self::Tuple(_)
        )
    }
}

fn parse_bits(s: &str) -> Option<u16> {
    let bits: u16 = s.parse().ok()?;
    (bits % 8 == 0 && (8..=256).contains(&bits)).then_some(bits)
}

/// Split a tuple body on commas outside nested parentheses. `None` when the
/// parentheses are unbalanced.
fn split_top_level(s: &str) -> Option<Vec<&str>> {
    if s.trim().is_empty() {
        return Some(Vec::new());
    }
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut from = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                parts.push(&s[from..i]);
                from = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    parts.push(&s[from..]);
    Some(parts)
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uint(bits) => write!(f, "uint{bits}"),
            Self::Int(bits) => write!(f, "int{bits}"),
            Self::Bool => write!(f, "bool"),
            Self::Address => write!(f, "address"),
            Self::FixedBytes(n) => write!(f, "bytes{n}"),
            Self::Bytes => write!(f, "bytes"),
            Self::String => write!(f, "string"),
            Self::Array(elem) => write!(f, "{elem}[]"),
            Self::FixedArray(elem, len) => write!(f, "{elem}[{len}]"),
            Self::Tuple(members) => {
                f.write_str("(")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{m}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl std::str::FromStr for FieldType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FieldType {
    type Error = SchemaError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<FieldType> for String {
    fn from(ty: FieldType) -> Self {
        ty.to_string()
    }
}

// ─── EventSchema ─────────────────────────────────────────────────────────────

/// One declared event parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
    #[serde(default)]
    pub indexed: bool,
}

impl EventField {
    pub fn new(name: impl Into<String>, ty: FieldType, indexed: bool) -> Self {
        Self {
            name: name.into(),
            ty,
            indexed,
        }
    }
}

/// Typed descriptor of a single event. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSchema {
    pub name: String,
    pub fields: Vec<EventField>,
}

impl EventSchema {
    /// Build a schema, rejecting duplicate or reserved field names.
    pub fn new(name: impl Into<String>, fields: Vec<EventField>) -> Result<Self, SchemaError> {
        let name = name.into();
        if name.is_empty() {
            return Err(SchemaError::Invalid("event name is empty".into()));
        }
        let mut seen = HashSet::new();
        for field in &fields {
            if RESERVED_COLUMNS.contains(&field.name.as_str()) {
                return Err(SchemaError::Invalid(format!(
                    "field name '{}' collides with a metadata column",
                    field.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::Invalid(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }
        }
        let indexed = fields.iter().filter(|f| f.indexed).count();
        if indexed > 3 {
            return Err(SchemaError::Invalid(format!(
                "{indexed} indexed fields; at most 3 fit in topics"
            )));
        }
        Ok(Self { name, fields })
    }

    /// Canonical signature, e.g. `Transfer(address,address,uint256)`.
    pub fn signature(&self) -> String {
        let types: Vec<String> = self.fields.iter().map(|f| f.ty.to_string()).collect();
        format!("{}({})", self.name, types.join(","))
    }

    /// keccak256 of the canonical signature.
    pub fn signature_hash(&self) -> [u8; 32] {
        keccak256(self.signature().as_bytes())
    }

    /// `0x`-prefixed lowercase hex of [`signature_hash`](Self::signature_hash).
    pub fn signature_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signature_hash()))
    }

    /// Indexed fields in declared order (topics[1..]).
    pub fn indexed_fields(&self) -> impl Iterator<Item = &EventField> {
        self.fields.iter().filter(|f| f.indexed)
    }

    /// Non-indexed fields in declared order (data payload).
    pub fn data_fields(&self) -> impl Iterator<Item = &EventField> {
        self.fields.iter().filter(|f| !f.indexed)
    }

    /// Persisted column names: metadata columns then fields in order.
    pub fn column_names(&self) -> Vec<String> {
        RESERVED_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.fields.iter().map(|f| f.name.clone()))
            .collect()
    }

    /// Parse the first `event Name(type [indexed] name, ...);` declaration in
    /// a Solidity source snippet.
    pub fn from_solidity(src: &str) -> Result<Self, SchemaError> {
        let src = strip_comments(src);
        let (name, params) = find_event_decl(&src).ok_or(SchemaError::NoEvent)?;

        let mut fields = Vec::new();
        for (i, param) in split_params(params).into_iter().enumerate() {
            let tokens: Vec<&str> = param.split_whitespace().collect();
            let (ty, rest) = match tokens.split_first() {
                Some(parts) => parts,
                None => return Err(SchemaError::Invalid(format!("empty parameter #{i}"))),
            };
            let (indexed, rest) = match rest.split_first() {
                Some((&"indexed", rest)) => (true, rest),
                _ => (false, rest),
            };
            let field_name = match rest {
                [] => format!("arg{i}"),
                [n] if is_identifier(n) => n.to_string(),
                _ => {
                    return Err(SchemaError::Invalid(format!(
                        "cannot parse parameter '{param}'"
                    )))
                }
            };
            fields.push(EventField::new(field_name, FieldType::parse(ty)?, indexed));
        }
        Self::new(name, fields)
    }

    /// Select event `name` from a contract ABI JSON document.
    ///
    /// Accepts a bare ABI array or an artifact object with an `abi` key.
    pub fn from_json_abi(json: &str, name: &str) -> Result<Self, SchemaError> {
        // JsonAbi borrows from its input, so an artifact's `abi` member is
        // re-serialised rather than deserialised from the Value.
        let abi: JsonAbi = match serde_json::from_str::<serde_json::Value>(json)? {
            serde_json::Value::Object(mut obj) => {
                let inner = obj
                    .remove("abi")
                    .ok_or_else(|| SchemaError::Invalid("object has no 'abi' key".into()))?;
                serde_json::from_str(&serde_json::to_string(&inner)?)?
            }
            _ => serde_json::from_str(json)?,
        };

        let event = abi
            .events()
            .find(|e| e.name == name)
            .ok_or_else(|| SchemaError::EventNotFound(name.to_string()))?;
        if event.anonymous {
            return Err(SchemaError::Invalid(format!(
                "event '{name}' is anonymous and has no signature topic"
            )));
        }

        let fields = event
            .inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                let field_name = if input.name.is_empty() {
                    format!("arg{i}")
                } else {
                    input.name.clone()
                };
                let ty = FieldType::parse(&input.selector_type())?;
                Ok(EventField::new(field_name, ty, input.indexed))
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;
        let schema = Self::new(name, fields)?;

        if schema.signature_hash() != event.selector().0 {
            return Err(SchemaError::Invalid(format!(
                "signature mismatch for '{}': ABI declares {}",
                schema.signature(),
                event.signature()
            )));
        }
        Ok(schema)
    }
}

impl std::fmt::Display for EventSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.signature())
    }
}

/// Load a schema from a `.sol` snippet or a `.json` ABI file.
///
/// `event` is required for ABI files and, when given for a `.sol` file, must
/// match the declared event name.
pub fn load_schema(path: &Path, event: Option<&str>) -> Result<EventSchema, SchemaError> {
    let src = std::fs::read_to_string(path)?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    match ext {
        "json" => {
            let name = event.ok_or_else(|| {
                SchemaError::Invalid("an event name is required for ABI JSON files".into())
            })?;
            EventSchema::from_json_abi(&src, name)
        }
        _ => {
            let schema = EventSchema::from_solidity(&src)?;
            match event {
                Some(name) if name != schema.name => Err(SchemaError::EventNotFound(name.into())),
                _ => Ok(schema),
            }
        }
    }
}

/// keccak256 of arbitrary bytes.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}

// ─── Solidity snippet helpers ────────────────────────────────────────────────

fn strip_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    loop {
        let line = rest.find("//");
        let block = rest.find("/*");
        match (line, block) {
            (Some(l), b) if b.map_or(true, |b| l < b) => {
                out.push_str(&rest[..l]);
                match rest[l..].find('\n') {
                    Some(nl) => rest = &rest[l + nl..],
                    None => break,
                }
            }
            (_, Some(b)) => {
                out.push_str(&rest[..b]);
                match rest[b + 2..].find("*/") {
                    Some(close) => {
                        out.push(' ');
                        rest = &rest[b + 2 + close + 2..];
                    }
                    None => break,
                }
            }
            _ => {
                out.push_str(rest);
                break;
            }
        }
    }
    out
}

/// Locate `event Name ( ... )` and return the name and raw parameter list.
fn find_event_decl(src: &str) -> Option<(&str, &str)> {
    let mut search_from = 0;
    while let Some(pos) = src[search_from..].find("event") {
        let at = search_from + pos;
        search_from = at + "event".len();

        let preceded_ok = src[..at]
            .chars()
            .next_back()
            .map_or(true, |c| !is_ident_char(c));
        let after = &src[search_from..];
        if !preceded_ok || !after.starts_with(char::is_whitespace) {
            continue;
        }

        let after = after.trim_start();
        let name_len = after.find(|c: char| !is_ident_char(c)).unwrap_or(after.len());
        let name = &after[..name_len];
        if !is_identifier(name) {
            continue;
        }
        let tail = after[name_len..].trim_start();
        let Some(body) = tail.strip_prefix('(') else {
            continue;
        };
        let close = body.find(')')?;
        return Some((name, &body[..close]));
    }
    None
}

fn split_params(params: &str) -> Vec<&str> {
    if params.trim().is_empty() {
        return Vec::new();
    }
    params.split(',').map(str::trim).collect()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(is_ident_char)
        && !s.starts_with(|c: char| c.is_ascii_digit())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
