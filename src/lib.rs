//! # Leasepool
//!
//! **Time-limited software license leases over a Redis-backed lease table.**
//!
//! Leasepool manages a pool of license leases: a client claims a license
//! for an (account, application, user) triple, holds it for a bounded
//! lifetime, has it silently renewed on access, and releases it when done.
//! Expired leases are reclaimed lazily — removed when a read encounters
//! them, never by a background sweeper.
//!
//! ## How it works
//!
//! - **One lease group per (account, app) pair** — a single store key
//!   mapping user IDs to serialized lease records
//! - **Sliding expiration** — each successful access extends the lease by
//!   one lease duration from its current expiry
//! - **Lazy eviction** — expired records are filtered out of reads and
//!   deleted in one best-effort batch afterwards
//! - **Batch-write atomicity** — every logical mutation rides one atomic
//!   store batch; there is no lock manager and no cross-operation locking
//!
//! ## Quickstart
//!
//! ```no_run
//! use leasepool::{LeaseManager, License, MemoryStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), leasepool::LeasepoolError> {
//!     let store = Arc::new(MemoryStore::new());
//!     let manager = LeaseManager::new(store, Duration::from_secs(30))?;
//!
//!     let claim = License {
//!         account_id: "acme".to_string(),
//!         app_id: "studio".to_string(),
//!         user_id: "u-100".to_string(),
//!         features: "render,export".to_string(),
//!         expires_at: String::new(), // engine-owned, ignored on claim
//!     };
//!     let lease = manager.create_reservation(&claim).await?;
//!     println!("lease held until {}", lease.expires_at);
//!     Ok(())
//! }
//! ```
//!
//! Production deployments use [`RedisStore`] instead of [`MemoryStore`];
//! the engine is oblivious to which one it was handed.
//!
//! ## Known limitations
//!
//! - A claim is last-write-wins, not compare-and-swap: two concurrent
//!   claims for the same user both succeed and the later one sticks.
//! - The renewal read-modify-write is unprotected; a concurrent write to
//!   the same lease between the read and the write is overwritten.
//!
//! Both are accepted trade-offs of leaning on the store's batch write as
//! the only atomicity unit.

#![deny(missing_docs)]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Data model
pub mod record;

// Store adapter layer
pub mod store;

// Lifecycle engine (main public API)
pub mod manager;

// Request surface
pub mod http;

// Re-exports for public API
pub use clock::{Clock, SystemClock};
pub use config::LeasepoolConfig;
pub use errors::LeasepoolError;
pub use manager::{LeaseGrant, LeaseManager};
pub use record::{AccountReserved, License};
pub use store::memory::MemoryStore;
pub use store::redis::RedisStore;
pub use store::{BatchOp, LeaseStore};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
