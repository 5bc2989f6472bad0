//! Lease Manager - the lifecycle engine and main public API.
//!
//! The `LeaseManager` owns the rules of a lease's life: how a claim is
//! created, how expiry is detected, how a live lease slides forward on
//! access, and how dead leases are reclaimed lazily during reads. It holds
//! no shared mutable state of its own — every piece of shared state lives
//! in the injected store, and each single logical mutation rides one atomic
//! store batch. There is deliberately no cross-operation locking: the
//! renewal read-modify-write can lose to a concurrent writer, and the later
//! write wins.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::record::{AccountReserved, License};
use crate::store::{BatchOp, LeaseStore};
use crate::LeasepoolError;

/// Outcome of a successful user lease fetch.
///
/// Both variants carry a live lease, but they are distinct events: a
/// `Renewed` lease existed and had its lifetime extended, while a
/// `Reissued` lease had expired and was replaced with a brand-new claim for
/// the same identity. Callers that want to stop treating expiry as a free
/// re-claim can branch on the variant without re-threading the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseGrant {
    /// The stored lease was alive; its expiry slid forward by one lease
    /// duration from its previous value.
    Renewed(License),

    /// The stored lease had expired; it was evicted and a fresh lease with
    /// the same identity and features was created in its place.
    Reissued(License),
}

impl LeaseGrant {
    /// The granted lease, whichever way it was obtained.
    pub fn license(&self) -> &License {
        match self {
            LeaseGrant::Renewed(license) | LeaseGrant::Reissued(license) => license,
        }
    }

    /// Consume the grant, yielding the lease.
    pub fn into_license(self) -> License {
        match self {
            LeaseGrant::Renewed(license) | LeaseGrant::Reissued(license) => license,
        }
    }
}

/// Lifecycle engine for the lease pool.
///
/// Create one instance per process and share it across request tasks; all
/// methods take `&self`.
pub struct LeaseManager {
    store: Arc<dyn LeaseStore>,
    clock: Arc<dyn Clock>,
    lease_duration: ChronoDuration,
}

impl LeaseManager {
    /// Create a manager over the given store with a fixed lease lifetime.
    ///
    /// Uses the system clock for expiry decisions.
    ///
    /// # Errors
    /// `ConfigError` if `lease_duration` is zero or out of range.
    pub fn new(store: Arc<dyn LeaseStore>, lease_duration: Duration) -> Result<Self, LeasepoolError> {
        Self::with_clock(store, lease_duration, Arc::new(SystemClock))
    }

    /// Create a manager with a custom clock (for testing).
    #[cfg(any(test, feature = "test-seams"))]
    pub fn new_with_clock(
        store: Arc<dyn LeaseStore>,
        lease_duration: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LeasepoolError> {
        Self::with_clock(store, lease_duration, clock)
    }

    fn with_clock(
        store: Arc<dyn LeaseStore>,
        lease_duration: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LeasepoolError> {
        if lease_duration.is_zero() {
            return Err(LeasepoolError::ConfigError(
                "lease_duration must be non-zero".to_string(),
            ));
        }
        let lease_duration = ChronoDuration::from_std(lease_duration).map_err(|e| {
            LeasepoolError::ConfigError(format!("lease_duration out of range: {}", e))
        })?;

        Ok(Self {
            store,
            clock,
            lease_duration,
        })
    }

    /// Claim a license for the record's (account, app, user) triple.
    ///
    /// Any caller-supplied expiry is overwritten with `now + lease_duration`.
    /// The write overwrites an existing record for the same user
    /// unconditionally — a last-write-wins claim, not a compare-and-swap;
    /// two concurrent claims for the same user are not protected against
    /// each other.
    ///
    /// # Errors
    /// - `InvalidRecord` - a required field is empty
    /// - `StoreFailure` - the store batch failed
    pub async fn create_reservation(&self, license: &License) -> Result<License, LeasepoolError> {
        license.validate()?;

        let mut stored = license.clone();
        stored.set_expires_at(self.clock.now_utc() + self.lease_duration);
        let value = stored.to_json()?;

        self.store
            .execute_batch(vec![BatchOp::SetField {
                group: stored.primary_record_key(),
                field: stored.user_id.clone(),
                value,
            }])
            .await?;

        debug!(
            group = %stored.primary_record_key(),
            user = %stored.user_id,
            expires = %stored.expires_at,
            "lease claimed"
        );
        Ok(stored)
    }

    /// Fetch every live lease for an (account, app) pair.
    ///
    /// Expired records encountered during the scan are never returned;
    /// after the scan completes they are removed in one best-effort delete
    /// batch. A failure of that cleanup batch is logged and swallowed: the
    /// read already has its correct filtered view, and the stale fields
    /// will be reaped by a later read.
    ///
    /// # Errors
    /// - `NotFound` - the group holds no live records
    /// - `Corrupt` - any single field failed to deserialize or parse; the
    ///   whole call aborts rather than returning a partial group
    /// - `StoreFailure` - the group read failed
    pub async fn fetch_account_reservations(
        &self,
        account_id: &str,
        app_id: &str,
    ) -> Result<AccountReserved, LeasepoolError> {
        let group = License::record_key(account_id, app_id);
        let entries = self.store.get_group(&group).await?;

        let mut live = Vec::new();
        let mut expired = Vec::new();
        for (user_id, raw) in &entries {
            let license = License::from_json(raw)?;
            if license.is_expired(self.clock.as_ref())? {
                expired.push(user_id.clone());
            } else {
                live.push(license);
            }
        }

        if !expired.is_empty() {
            let ops = expired
                .iter()
                .map(|field| BatchOp::DeleteField {
                    group: group.clone(),
                    field: field.clone(),
                })
                .collect();
            if let Err(err) = self.store.execute_batch(ops).await {
                warn!(group = %group, error = %err, "failed to evict expired leases");
            } else {
                debug!(group = %group, evicted = expired.len(), "evicted expired leases");
            }
        }

        if live.is_empty() {
            return Err(LeasepoolError::NotFound);
        }
        Ok(AccountReserved {
            count: live.len(),
            licenses: live,
        })
    }

    /// Fetch one user's lease, extending it on access.
    ///
    /// A live lease has its expiry bumped by one lease duration *from its
    /// current stored value* (sliding expiration) and is returned as
    /// [`LeaseGrant::Renewed`]. An expired lease is evicted and immediately
    /// replaced with a fresh claim carrying the same identity and features,
    /// returned as [`LeaseGrant::Reissued`].
    ///
    /// The bump is an unprotected read-modify-write: a concurrent write to
    /// the same field between our read and our write is simply overwritten.
    ///
    /// # Errors
    /// - `NotFound` - no record stored for this user
    /// - `Corrupt` - the stored record failed to deserialize or parse
    /// - `StoreFailure` - a store call failed; on the expired path this
    ///   includes failures of the replacement claim
    pub async fn fetch_user_reservation(
        &self,
        user_id: &str,
        app_id: &str,
        account_id: &str,
    ) -> Result<LeaseGrant, LeasepoolError> {
        let group = License::record_key(account_id, app_id);
        let raw = match self.store.get_field(&group, user_id).await? {
            Some(value) if !value.is_empty() => value,
            _ => return Err(LeasepoolError::NotFound),
        };

        let mut license = License::from_json(&raw)?;

        if license.is_expired(self.clock.as_ref())? {
            // Stale claim: reclaim the slot, then hand the same identity a
            // fresh lease. The replacement write overwrites the field either
            // way, so the eviction itself is best-effort.
            let evict = vec![BatchOp::DeleteField {
                group: group.clone(),
                field: user_id.to_string(),
            }];
            if let Err(err) = self.store.execute_batch(evict).await {
                warn!(group = %group, user = %user_id, error = %err, "failed to evict expired lease");
            }

            let fresh = self.create_reservation(&license).await?;
            debug!(group = %group, user = %user_id, "expired lease reissued");
            return Ok(LeaseGrant::Reissued(fresh));
        }

        let renewed_until = license.expires_at_utc()? + self.lease_duration;
        license.set_expires_at(renewed_until);
        let value = license.to_json()?;
        self.store
            .execute_batch(vec![BatchOp::SetField {
                group,
                field: user_id.to_string(),
                value,
            }])
            .await?;

        Ok(LeaseGrant::Renewed(license))
    }

    /// Release a user's lease.
    ///
    /// The stored value is deserialized first, purely to recover the
    /// canonical group key and user ID for the delete; a value that fails
    /// to deserialize errors rather than being silently deleted.
    ///
    /// # Errors
    /// - `NotFound` - no record stored for this user (a second release of
    ///   the same lease lands here)
    /// - `Corrupt` - the stored record failed to deserialize
    /// - `StoreFailure` - a store call failed
    pub async fn return_user_license(
        &self,
        user_id: &str,
        app_id: &str,
        account_id: &str,
    ) -> Result<(), LeasepoolError> {
        let group = License::record_key(account_id, app_id);
        let raw = match self.store.get_field(&group, user_id).await? {
            Some(value) if !value.is_empty() => value,
            _ => return Err(LeasepoolError::NotFound),
        };

        let license = License::from_json(&raw)?;
        self.store
            .execute_batch(vec![BatchOp::DeleteField {
                group: license.primary_record_key(),
                field: license.user_id.clone(),
            }])
            .await?;

        debug!(group = %license.primary_record_key(), user = %license.user_id, "lease released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::store::memory::MemoryStore;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    const LEASE_SECS: u64 = 10;

    fn claim(user_id: &str) -> License {
        License {
            account_id: "A".to_string(),
            app_id: "B".to_string(),
            user_id: user_id.to_string(),
            features: "f".to_string(),
            expires_at: String::new(),
        }
    }

    fn setup() -> (Arc<MemoryStore>, Arc<MockClock>, LeaseManager) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(MockClock::new(
            Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(),
        ));
        let manager = LeaseManager::new_with_clock(
            store.clone(),
            Duration::from_secs(LEASE_SECS),
            clock.clone(),
        )
        .unwrap();
        (store, clock, manager)
    }

    #[tokio::test]
    async fn create_sets_expiry_one_duration_from_now() {
        let (_, clock, manager) = setup();
        let lease = manager.create_reservation(&claim("U1")).await.unwrap();
        assert_eq!(
            lease.expires_at_utc().unwrap(),
            clock.now_utc() + ChronoDuration::seconds(LEASE_SECS as i64)
        );
    }

    #[tokio::test]
    async fn create_ignores_caller_supplied_expiry() {
        let (_, clock, manager) = setup();
        let mut request = claim("U1");
        request.expires_at = "2099-12-31T00:00:00.000000+00:00".to_string();
        let lease = manager.create_reservation(&request).await.unwrap();
        assert_eq!(
            lease.expires_at_utc().unwrap(),
            clock.now_utc() + ChronoDuration::seconds(LEASE_SECS as i64)
        );
    }

    #[tokio::test]
    async fn create_rejects_missing_fields() {
        let (_, _, manager) = setup();
        let mut request = claim("U1");
        request.features = String::new();
        assert!(matches!(
            manager.create_reservation(&request).await,
            Err(LeasepoolError::InvalidRecord(_))
        ));
    }

    #[tokio::test]
    async fn repeated_claims_keep_one_record_per_user() {
        let (store, _, manager) = setup();
        let mut request = claim("U1");
        request.features = "first".to_string();
        manager.create_reservation(&request).await.unwrap();
        request.features = "second".to_string();
        manager.create_reservation(&request).await.unwrap();

        let group = store.get_group("A#B").await.unwrap();
        assert_eq!(group.len(), 1);
        let stored = License::from_json(group.get("U1").unwrap()).unwrap();
        // Last write wins.
        assert_eq!(stored.features, "second");
    }

    #[tokio::test]
    async fn fetch_user_slides_expiry_from_stored_value() {
        let (store, clock, manager) = setup();
        let created = manager.create_reservation(&claim("U1")).await.unwrap();
        let created_expiry = created.expires_at_utc().unwrap();

        // Advance a little so "now + duration" and "stored + duration"
        // would disagree if the bump used the wrong base.
        clock.advance(ChronoDuration::seconds(3));

        let grant = manager.fetch_user_reservation("U1", "B", "A").await.unwrap();
        let renewed = match grant {
            LeaseGrant::Renewed(license) => license,
            other => panic!("expected Renewed, got {:?}", other),
        };
        assert_eq!(
            renewed.expires_at_utc().unwrap(),
            created_expiry + ChronoDuration::seconds(LEASE_SECS as i64)
        );

        // The bump is persisted, not just in the returned copy.
        let raw = store.get_field("A#B", "U1").await.unwrap().unwrap();
        assert_eq!(
            License::from_json(&raw).unwrap().expires_at,
            renewed.expires_at
        );
    }

    #[tokio::test]
    async fn fetch_user_reissues_expired_lease() {
        let (store, clock, manager) = setup();
        manager.create_reservation(&claim("U1")).await.unwrap();

        clock.advance(ChronoDuration::seconds(LEASE_SECS as i64 + 1));

        let grant = manager.fetch_user_reservation("U1", "B", "A").await.unwrap();
        let fresh = match grant {
            LeaseGrant::Reissued(license) => license,
            other => panic!("expected Reissued, got {:?}", other),
        };
        // Identity and features carry over; expiry is computed from "now".
        assert_eq!(fresh.user_id, "U1");
        assert_eq!(fresh.features, "f");
        assert_eq!(
            fresh.expires_at_utc().unwrap(),
            clock.now_utc() + ChronoDuration::seconds(LEASE_SECS as i64)
        );

        let raw = store.get_field("A#B", "U1").await.unwrap().unwrap();
        assert_eq!(License::from_json(&raw).unwrap(), fresh);
    }

    #[tokio::test]
    async fn fetch_user_absent_is_not_found() {
        let (_, _, manager) = setup();
        assert!(matches!(
            manager.fetch_user_reservation("ghost", "B", "A").await,
            Err(LeasepoolError::NotFound)
        ));
    }

    #[tokio::test]
    async fn fetch_user_corrupt_record_is_surfaced() {
        let (store, _, manager) = setup();
        store
            .execute_batch(vec![BatchOp::SetField {
                group: "A#B".to_string(),
                field: "U1".to_string(),
                value: "not json".to_string(),
            }])
            .await
            .unwrap();
        assert!(matches!(
            manager.fetch_user_reservation("U1", "B", "A").await,
            Err(LeasepoolError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn fetch_account_filters_and_evicts_expired() {
        let (store, clock, manager) = setup();
        manager.create_reservation(&claim("old")).await.unwrap();
        clock.advance(ChronoDuration::seconds(LEASE_SECS as i64 + 1));
        manager.create_reservation(&claim("young")).await.unwrap();

        let reserved = manager.fetch_account_reservations("A", "B").await.unwrap();
        assert_eq!(reserved.count, 1);
        assert_eq!(reserved.licenses[0].user_id, "young");

        // The expired sub-key is physically gone after the read.
        assert!(store.get_field("A#B", "old").await.unwrap().is_none());
        assert!(store.get_field("A#B", "young").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn fetch_account_empty_group_is_not_found() {
        let (_, _, manager) = setup();
        assert!(matches!(
            manager.fetch_account_reservations("A", "B").await,
            Err(LeasepoolError::NotFound)
        ));
    }

    #[tokio::test]
    async fn fetch_account_all_expired_is_not_found_and_reaps() {
        let (store, clock, manager) = setup();
        manager.create_reservation(&claim("U1")).await.unwrap();
        clock.advance(ChronoDuration::seconds(LEASE_SECS as i64 + 1));

        assert!(matches!(
            manager.fetch_account_reservations("A", "B").await,
            Err(LeasepoolError::NotFound)
        ));
        assert!(store.get_group("A#B").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_account_corrupt_entry_aborts_whole_call() {
        let (store, clock, manager) = setup();
        manager.create_reservation(&claim("U1")).await.unwrap();
        clock.advance(ChronoDuration::seconds(LEASE_SECS as i64 + 1));
        store
            .execute_batch(vec![BatchOp::SetField {
                group: "A#B".to_string(),
                field: "broken".to_string(),
                value: "{".to_string(),
            }])
            .await
            .unwrap();

        assert!(matches!(
            manager.fetch_account_reservations("A", "B").await,
            Err(LeasepoolError::Corrupt(_))
        ));
        // Nothing was evicted: the expired record is still present.
        assert!(store.get_field("A#B", "U1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_records_persist_until_a_read_touches_them() {
        let (store, clock, manager) = setup();
        manager.create_reservation(&claim("U1")).await.unwrap();
        clock.advance(ChronoDuration::seconds(LEASE_SECS as i64 * 5));

        // No background sweep exists; the stale record sits in the store
        // until the next read encounters it.
        assert!(store.get_field("A#B", "U1").await.unwrap().is_some());

        let _ = manager.fetch_account_reservations("A", "B").await;
        assert!(store.get_field("A#B", "U1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn release_succeeds_once_then_not_found() {
        let (_, _, manager) = setup();
        manager.create_reservation(&claim("U1")).await.unwrap();

        assert!(manager.return_user_license("U1", "B", "A").await.is_ok());
        assert!(matches!(
            manager.return_user_license("U1", "B", "A").await,
            Err(LeasepoolError::NotFound)
        ));
    }

    #[tokio::test]
    async fn release_corrupt_record_errors_without_deleting() {
        let (store, _, manager) = setup();
        store
            .execute_batch(vec![BatchOp::SetField {
                group: "A#B".to_string(),
                field: "U1".to_string(),
                value: "garbage".to_string(),
            }])
            .await
            .unwrap();

        assert!(matches!(
            manager.return_user_license("U1", "B", "A").await,
            Err(LeasepoolError::Corrupt(_))
        ));
        assert!(store.get_field("A#B", "U1").await.unwrap().is_some());
    }

    /// Store double whose batches can be switched to fail, for exercising
    /// the best-effort eviction path.
    struct BrownoutStore {
        inner: MemoryStore,
        fail_batches: AtomicBool,
    }

    #[async_trait::async_trait]
    impl LeaseStore for BrownoutStore {
        async fn get_group(&self, group: &str) -> Result<HashMap<String, String>, LeasepoolError> {
            self.inner.get_group(group).await
        }

        async fn get_field(
            &self,
            group: &str,
            field: &str,
        ) -> Result<Option<String>, LeasepoolError> {
            self.inner.get_field(group, field).await
        }

        async fn execute_batch(&self, ops: Vec<BatchOp>) -> Result<(), LeasepoolError> {
            if self.fail_batches.load(Ordering::SeqCst) {
                return Err(LeasepoolError::StoreFailure("brownout".to_string()));
            }
            self.inner.execute_batch(ops).await
        }
    }

    #[tokio::test]
    async fn eviction_batch_failure_does_not_fail_the_read() {
        let store = Arc::new(BrownoutStore {
            inner: MemoryStore::new(),
            fail_batches: AtomicBool::new(false),
        });
        let clock = Arc::new(MockClock::new(
            Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(),
        ));
        let manager = LeaseManager::new_with_clock(
            store.clone(),
            Duration::from_secs(LEASE_SECS),
            clock.clone(),
        )
        .unwrap();

        manager.create_reservation(&claim("old")).await.unwrap();
        clock.advance(ChronoDuration::seconds(LEASE_SECS as i64 + 1));
        manager.create_reservation(&claim("young")).await.unwrap();

        store.fail_batches.store(true, Ordering::SeqCst);
        let reserved = manager.fetch_account_reservations("A", "B").await.unwrap();
        assert_eq!(reserved.count, 1);
        assert_eq!(reserved.licenses[0].user_id, "young");

        // Cleanup never happened, but the read was correct anyway.
        assert!(store.get_field("A#B", "old").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reissue_propagates_replacement_write_failure() {
        let store = Arc::new(BrownoutStore {
            inner: MemoryStore::new(),
            fail_batches: AtomicBool::new(false),
        });
        let clock = Arc::new(MockClock::new(
            Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(),
        ));
        let manager = LeaseManager::new_with_clock(
            store.clone(),
            Duration::from_secs(LEASE_SECS),
            clock.clone(),
        )
        .unwrap();

        manager.create_reservation(&claim("U1")).await.unwrap();
        clock.advance(ChronoDuration::seconds(LEASE_SECS as i64 + 1));

        store.fail_batches.store(true, Ordering::SeqCst);
        // Eviction failure is swallowed; the replacement claim's failure is
        // an ordinary error, not NotFound.
        assert!(matches!(
            manager.fetch_user_reservation("U1", "B", "A").await,
            Err(LeasepoolError::StoreFailure(_))
        ));
    }

    #[tokio::test]
    async fn zero_duration_is_rejected_at_construction() {
        let store: Arc<dyn LeaseStore> = Arc::new(MemoryStore::new());
        assert!(matches!(
            LeaseManager::new(store, Duration::ZERO),
            Err(LeasepoolError::ConfigError(_))
        ));
    }
}
