//! Shared fixtures for the coordinator integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_core::dyn_abi::DynSolValue;
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use chainshard_core::schema::{EventField, EventSchema, FieldType};
use chainshard_evm::{LogQuery, LogSource, RawLog, RpcError};

pub const TOKEN: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

pub fn transfer() -> EventSchema {
    EventSchema::new(
        "Transfer",
        vec![
            EventField::new("from", FieldType::Address, true),
            EventField::new("to", FieldType::Address, true),
            EventField::new("value", FieldType::Uint(256), false),
        ],
    )
    .unwrap()
}

fn address_topic(n: u64) -> String {
    let mut raw = [0u8; 20];
    raw[12..].copy_from_slice(&n.to_be_bytes());
    let encoded = DynSolValue::Address(Address::from(raw)).abi_encode();
    format!("0x{}", hex::encode(encoded))
}

/// A `Transfer` log at `block`; `value` doubles as a unique payload.
pub fn transfer_log(block: u64, value: u64) -> RawLog {
    let data = DynSolValue::Tuple(vec![DynSolValue::Uint(U256::from(value), 256)]).abi_encode_params();
    RawLog {
        address: TOKEN.into(),
        topics: vec![transfer().signature_hex(), address_topic(block), address_topic(value)],
        data: format!("0x{}", hex::encode(data)),
        block_number: Some(format!("0x{block:x}")),
        block_hash: None,
        tx_hash: Some(format!("0x{:032x}{:032x}", block, value)),
        log_index: Some("0x0".into()),
        removed: None,
    }
}

/// Scripted chain: serves logs by block, records every query and tracks how
/// many calls are in flight at once.
#[derive(Default)]
pub struct MockChain {
    logs: Mutex<BTreeMap<u64, Vec<RawLog>>>,
    queries: Mutex<Vec<(u64, u64)>>,
    failing: Mutex<Vec<(u64, u64)>>,
    panic_at: Mutex<Option<u64>>,
    cancel_at: Mutex<Option<(u64, CancellationToken)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    head: u64,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_logs(logs: impl IntoIterator<Item = RawLog>) -> Arc<Self> {
        let chain = Self::default();
        {
            let mut map = chain.logs.lock().unwrap();
            for log in logs {
                let block = log.block_number_u64().unwrap();
                map.entry(block).or_insert_with(Vec::new).push(log);
            }
        }
        Arc::new(chain)
    }

    /// Every query touching `[start, end)` fails with HTTP 503.
    pub fn fail_range(&self, start: u64, end: u64) {
        self.failing.lock().unwrap().push((start, end));
    }

    /// Panic on the query that covers `block`.
    pub fn panic_at(&self, block: u64) {
        *self.panic_at.lock().unwrap() = Some(block);
    }

    /// Cancel `token` on the first query starting at or after `block`.
    pub fn cancel_at(&self, block: u64, token: CancellationToken) {
        *self.cancel_at.lock().unwrap() = Some((block, token));
    }

    /// Inclusive `(from, to)` bounds of every query, in call order.
    pub fn queries(&self) -> Vec<(u64, u64)> {
        self.queries.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogSource for MockChain {
    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<RawLog>, RpcError> {
        let (from, to) = (query.from_block, query.to_block);
        self.queries.lock().unwrap().push((from, to));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let should_panic = matches!(*self.panic_at.lock().unwrap(), Some(b) if from <= b && b <= to);
        if should_panic {
            panic!("injected panic at block {from}");
        }
        if let Some((block, token)) = self.cancel_at.lock().unwrap().as_ref() {
            if from >= *block {
                token.cancel();
            }
        }
        let failing = self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|&(s, e)| from < e && to >= s);
        if failing {
            return Err(RpcError::Http {
                status: Some(503),
                message: "service unavailable".into(),
            });
        }

        let logs = self
            .logs
            .lock()
            .unwrap()
            .range(from..=to)
            .flat_map(|(_, logs)| logs.iter().cloned())
            .collect();
        Ok(logs)
    }

    async fn head_block(&self) -> Result<u64, RpcError> {
        Ok(self.head)
    }
}
