//! Redis-backed lease store.
//!
//! Each lease group maps onto one Redis hash: the group key (namespaced)
//! is the hash key, user IDs are hash fields, and serialized lease records
//! are the field values. Batches run as a `MULTI`/`EXEC` pipeline, which is
//! what gives the engine its all-or-visibly-none write unit.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use super::{BatchOp, LeaseStore};
use crate::LeasepoolError;

/// Lease store over a remote Redis instance.
///
/// Cheap to clone per call: the underlying connection manager multiplexes
/// one connection across concurrent requests and reconnects on failure.
pub struct RedisStore {
    conn: ConnectionManager,
    namespace: String,
}

impl RedisStore {
    /// Connect to Redis and probe the connection.
    ///
    /// The `PING` probe fails fast at process start instead of surfacing a
    /// dead store on the first request. `namespace` is prefixed to every
    /// group key.
    ///
    /// # Errors
    /// `StoreFailure` if the URL is malformed or the instance is
    /// unreachable.
    pub async fn connect(url: &str, namespace: &str) -> Result<Self, LeasepoolError> {
        let client = redis::Client::open(url)
            .map_err(|e| LeasepoolError::StoreFailure(format!("Invalid redis url: {}", e)))?;
        let mut conn = ConnectionManager::new(client).await.map_err(|e| {
            LeasepoolError::StoreFailure(format!("Failed to connect to redis: {}", e))
        })?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| LeasepoolError::StoreFailure(format!("Redis ping failed: {}", e)))?;
        debug!(url, namespace, "connected to redis");

        Ok(Self {
            conn,
            namespace: namespace.to_string(),
        })
    }

    fn group_key(&self, group: &str) -> String {
        namespaced(&self.namespace, group)
    }
}

fn namespaced(namespace: &str, group: &str) -> String {
    format!("{}{}", namespace, group)
}

#[async_trait]
impl LeaseStore for RedisStore {
    async fn get_group(&self, group: &str) -> Result<HashMap<String, String>, LeasepoolError> {
        let mut conn = self.conn.clone();
        // HGETALL on an absent key yields an empty map, per the contract.
        let entries: HashMap<String, String> = conn
            .hgetall(self.group_key(group))
            .await
            .map_err(|e| LeasepoolError::StoreFailure(format!("HGETALL failed: {}", e)))?;
        Ok(entries)
    }

    async fn get_field(
        &self,
        group: &str,
        field: &str,
    ) -> Result<Option<String>, LeasepoolError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn
            .hget(self.group_key(group), field)
            .await
            .map_err(|e| LeasepoolError::StoreFailure(format!("HGET failed: {}", e)))?;
        Ok(value)
    }

    async fn execute_batch(&self, ops: Vec<BatchOp>) -> Result<(), LeasepoolError> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &ops {
            match op {
                BatchOp::SetField {
                    group,
                    field,
                    value,
                } => {
                    pipe.hset(self.group_key(group), field, value).ignore();
                }
                BatchOp::DeleteField { group, field } => {
                    pipe.hdel(self.group_key(group), field).ignore();
                }
            }
        }

        let mut conn = self.conn.clone();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| LeasepoolError::StoreFailure(format!("Batch exec failed: {}", e)))?;
        Ok(())
    }
}
