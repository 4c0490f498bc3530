//! In-memory storage engine.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;
use shardgate_types::{PartitionKey, Record};
use tracing::debug;

use crate::error::StoreError;
use crate::message::Command;

/// In-memory record table keyed by partition key.
///
/// Rows under one partition key keep insertion order. Inserting a row whose
/// (partition key, entity key) already exists replaces its value in place.
#[derive(Default)]
pub struct MemoryEngine {
    rows: RwLock<HashMap<PartitionKey, Vec<Record>>>,
}

impl MemoryEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute a command with positional parameters.
    pub fn execute(&self, command: Command, params: &[Bytes]) -> Result<Vec<Record>, StoreError> {
        if params.len() != command.arity() {
            return Err(StoreError::BadParams {
                command,
                reason: format!("expected {} params, got {}", command.arity(), params.len()),
            });
        }

        match command {
            Command::Insert => {
                let record = Record {
                    partition_key: PartitionKey::new(utf8_param(command, &params[0])?),
                    entity_key: utf8_param(command, &params[1])?,
                    value: params[2].to_vec(),
                };
                self.insert(record);
                Ok(Vec::new())
            }
            Command::SelectByPartitionKey => {
                let pk = PartitionKey::new(utf8_param(command, &params[0])?);
                Ok(self.select(&pk))
            }
            Command::Ping => Ok(Vec::new()),
        }
    }

    /// Store a record.
    pub fn insert(&self, record: Record) {
        let mut rows = self.rows.write();
        let bucket = rows.entry(record.partition_key.clone()).or_default();
        debug!(
            partition_key = %record.partition_key,
            size = record.value.len(),
            "storing record in memory"
        );
        match bucket
            .iter_mut()
            .find(|r| r.entity_key == record.entity_key)
        {
            Some(existing) => existing.value = record.value,
            None => bucket.push(record),
        }
    }

    /// All rows stored under `partition_key`, in insertion order.
    pub fn select(&self, partition_key: &PartitionKey) -> Vec<Record> {
        self.rows
            .read()
            .get(partition_key)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of stored rows.
    pub fn record_count(&self) -> usize {
        self.rows.read().values().map(Vec::len).sum()
    }
}

fn utf8_param(command: Command, param: &Bytes) -> Result<String, StoreError> {
    String::from_utf8(param.to_vec()).map_err(|_| StoreError::BadParams {
        command,
        reason: "key parameter is not valid UTF-8".to_string(),
    })
}
