//! Lease record model and expiration predicate.
//!
//! A [`License`] is a time-bounded claim on a feature set by one user within
//! one account+application scope. All leases for an (account, app) pair live
//! under a single store key — the lease group — with the user ID as the
//! field inside that group.
//!
//! Liveness is never implied by presence: a record counts as alive only if
//! its `expires` timestamp is still in the future at read time.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::LeasepoolError;

/// A reserved software license for one (account, app, user) triple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct License {
    /// Owning account identifier. Opaque to the engine.
    pub account_id: String,

    /// Application identifier. Opaque to the engine.
    pub app_id: String,

    /// User holding the lease. Unique within a lease group.
    pub user_id: String,

    /// Entitlement payload. Opaque to the engine; carried verbatim.
    pub features: String,

    /// Absolute expiry instant, RFC 3339 UTC. Written only by the engine;
    /// anything a caller supplies here is overwritten on claim.
    #[serde(rename = "expires", skip_serializing_if = "String::is_empty")]
    pub expires_at: String,
}

impl License {
    /// Derive the store key for the lease group holding all of an
    /// account+app pair's leases.
    pub fn record_key(account_id: &str, app_id: &str) -> String {
        format!("{}#{}", account_id, app_id)
    }

    /// The store key for this record's lease group.
    pub fn primary_record_key(&self) -> String {
        Self::record_key(&self.account_id, &self.app_id)
    }

    /// Check that all caller-supplied fields are present.
    ///
    /// `expires` is deliberately not checked: it is engine-owned.
    pub fn validate(&self) -> Result<(), LeasepoolError> {
        for (name, value) in [
            ("accountId", &self.account_id),
            ("appId", &self.app_id),
            ("userId", &self.user_id),
            ("features", &self.features),
        ] {
            if value.is_empty() {
                return Err(LeasepoolError::InvalidRecord(format!(
                    "{} is required",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Parse the stored expiry timestamp back into an absolute instant.
    ///
    /// # Errors
    /// `Corrupt` if the timestamp is missing or does not parse; a record
    /// whose expiry cannot be read is never treated as merely expired.
    pub fn expires_at_utc(&self) -> Result<DateTime<Utc>, LeasepoolError> {
        DateTime::parse_from_rfc3339(&self.expires_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                LeasepoolError::Corrupt(format!(
                    "unparseable expiry '{}': {}",
                    self.expires_at, e
                ))
            })
    }

    /// Stamp the record with a new expiry instant.
    pub fn set_expires_at(&mut self, instant: DateTime<Utc>) {
        self.expires_at = format_timestamp(instant);
    }

    /// Whether this lease has expired as of the clock's "now".
    ///
    /// Alive iff `now < expires`; an expiry exactly equal to "now" counts
    /// as expired.
    ///
    /// # Errors
    /// `Corrupt` if the expiry timestamp does not parse. Callers must treat
    /// that as an error, not as an expired lease.
    pub fn is_expired(&self, clock: &dyn Clock) -> Result<bool, LeasepoolError> {
        let expires_at = self.expires_at_utc()?;
        Ok(clock.now_utc() >= expires_at)
    }

    /// Serialize the record for storage.
    pub fn to_json(&self) -> Result<String, LeasepoolError> {
        serde_json::to_string(self)
            .map_err(|e| LeasepoolError::Corrupt(format!("Failed to serialize license: {}", e)))
    }

    /// Deserialize a stored record.
    ///
    /// # Errors
    /// `Corrupt` — the stored bytes are not a valid record.
    pub fn from_json(raw: &str) -> Result<Self, LeasepoolError> {
        serde_json::from_str(raw)
            .map_err(|e| LeasepoolError::Corrupt(format!("Failed to deserialize license: {}", e)))
    }
}

/// All currently live leases for one (account, app) pair.
///
/// A read-only projection computed on demand by the engine; never persisted.
/// Ordering follows store iteration order and is not stable across calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountReserved {
    /// Number of live (non-expired) leases in the group.
    pub count: usize,

    /// The live lease records themselves.
    pub licenses: Vec<License>,
}

/// Serialize an instant as fixed-width RFC 3339 UTC.
///
/// Microsecond precision keeps the format constant-width and lexically
/// sortable, and round-trips through [`DateTime::parse_from_rfc3339`] to the
/// identical instant.
pub(crate) fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}
