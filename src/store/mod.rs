//! Lease store adapter.
//!
//! The engine never talks to a concrete store directly. It sees this thin
//! contract: read a whole lease group, read one field, and submit an ordered
//! batch of field writes that the store applies all-or-visibly-none. The
//! batch is the engine's only atomicity unit — there is no lock manager.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::LeasepoolError;

pub mod memory;
pub mod redis;

/// One mutation inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Set `field` of the group at `group` to `value`, creating the group
    /// if absent and overwriting the field unconditionally.
    SetField {
        /// Lease group key.
        group: String,
        /// Field (user ID) within the group.
        field: String,
        /// Serialized lease record.
        value: String,
    },

    /// Remove `field` from the group at `group`. Removing an absent field
    /// is not an error.
    DeleteField {
        /// Lease group key.
        group: String,
        /// Field (user ID) within the group.
        field: String,
    },
}

/// Contract over the backing key-value store.
///
/// Implementations must uphold two guarantees the engine relies on:
///
/// - [`get_group`](LeaseStore::get_group) on an absent group returns an
///   empty mapping, not an error.
/// - [`execute_batch`](LeaseStore::execute_batch) applies its operations as
///   one unit: other readers observe either all of them or none of them,
///   and a transport/store failure fails the batch as a whole.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Read every field of a lease group.
    async fn get_group(&self, group: &str) -> Result<HashMap<String, String>, LeasepoolError>;

    /// Read a single field of a lease group. Absent field is `None`.
    async fn get_field(&self, group: &str, field: &str)
        -> Result<Option<String>, LeasepoolError>;

    /// Apply an ordered sequence of writes atomically.
    async fn execute_batch(&self, ops: Vec<BatchOp>) -> Result<(), LeasepoolError>;
}
