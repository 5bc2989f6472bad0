//! In-process lease store.
//!
//! Backs single-node deployments and deterministic tests with the same
//! batch-atomicity contract as the Redis adapter: a batch applies under one
//! write guard, so concurrent readers observe all of it or none of it.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{BatchOp, LeaseStore};
use crate::LeasepoolError;

/// Lease store held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    groups: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseStore for MemoryStore {
    async fn get_group(&self, group: &str) -> Result<HashMap<String, String>, LeasepoolError> {
        let groups = self
            .groups
            .read()
            .map_err(|_| LeasepoolError::StoreFailure("store lock poisoned".to_string()))?;
        Ok(groups.get(group).cloned().unwrap_or_default())
    }

    async fn get_field(
        &self,
        group: &str,
        field: &str,
    ) -> Result<Option<String>, LeasepoolError> {
        let groups = self
            .groups
            .read()
            .map_err(|_| LeasepoolError::StoreFailure("store lock poisoned".to_string()))?;
        Ok(groups.get(group).and_then(|g| g.get(field).cloned()))
    }

    async fn execute_batch(&self, ops: Vec<BatchOp>) -> Result<(), LeasepoolError> {
        let mut groups = self
            .groups
            .write()
            .map_err(|_| LeasepoolError::StoreFailure("store lock poisoned".to_string()))?;
        for op in ops {
            match op {
                BatchOp::SetField {
                    group,
                    field,
                    value,
                } => {
                    groups.entry(group).or_default().insert(field, value);
                }
                BatchOp::DeleteField { group, field } => {
                    if let Some(fields) = groups.get_mut(&group) {
                        fields.remove(&field);
                        // Empty groups vanish, matching Redis hash semantics.
                        if fields.is_empty() {
                            groups.remove(&group);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
