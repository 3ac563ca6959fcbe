// src/eligibility.rs
//! Per-visitor record of which categories were already voted on, and until when.
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::models::{Choice, EligibilityRecord, VoteCategory};
use crate::storage::KeyValueStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    AlreadyVoted { choice: Choice },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

#[derive(Clone)]
pub struct EligibilityStore {
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
}

impl EligibilityStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Reads the live record for `category`. Expired or unparsable records are
    /// purged and count as absent. Storage failures degrade to eligible.
    pub async fn is_eligible(&self, category: VoteCategory) -> Eligibility {
        let key = category.storage_key();
        let raw = match self.storage.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Eligibility::Eligible,
            Err(e) => {
                warn!(%category, error = %e, "Eligibility storage unavailable, treating visitor as eligible");
                return Eligibility::Eligible;
            }
        };

        match serde_json::from_str::<EligibilityRecord>(&raw) {
            Ok(record) if !record.is_expired(self.clock.now_ms()) => Eligibility::AlreadyVoted {
                choice: record.choice,
            },
            Ok(record) => {
                debug!(%category, expires_at = record.expires_at, "Purging expired eligibility record");
                self.purge(category).await;
                Eligibility::Eligible
            }
            Err(e) => {
                warn!(%category, error = %e, "Discarding malformed eligibility record");
                self.purge(category).await;
                Eligibility::Eligible
            }
        }
    }

    /// Overwrites the record for `category`. Failures are logged and swallowed.
    pub async fn record_vote(&self, category: VoteCategory, choice: Choice, window: Duration) {
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        let record = EligibilityRecord {
            choice,
            expires_at: self.clock.now_ms().saturating_add(window_ms),
        };

        let result = match serde_json::to_string(&record) {
            Ok(json) => self
                .storage
                .set(category.storage_key(), &json)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        if let Err(error) = result {
            warn!(%category, %choice, %error, "Failed to persist eligibility record");
        }
    }

    async fn purge(&self, category: VoteCategory) {
        if let Err(e) = self.storage.remove(category.storage_key()).await {
            warn!(%category, error = %e, "Failed to purge eligibility record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::Reaction;
    use crate::storage::{DisabledStorage, MemoryStorage};

    const NOW: i64 = 1_700_000_000_000;

    fn store() -> (EligibilityStore, Arc<MemoryStorage>, Arc<ManualClock>) {
        let storage = Arc::new(MemoryStorage::new());
        let clock = Arc::new(ManualClock::new(NOW));
        (
            EligibilityStore::new(storage.clone(), clock.clone()),
            storage,
            clock,
        )
    }

    #[tokio::test]
    async fn fresh_visitor_is_eligible() {
        let (store, _, _) = store();
        assert_eq!(store.is_eligible(VoteCategory::Reaction).await, Eligibility::Eligible);
    }

    #[tokio::test]
    async fn recorded_vote_blocks_until_window_passes() {
        let (store, storage, clock) = store();
        let choice = Choice::Reaction(Reaction::Okay);
        store
            .record_vote(VoteCategory::Reaction, choice, Duration::from_millis(86_400_000))
            .await;

        assert_eq!(
            store.is_eligible(VoteCategory::Reaction).await,
            Eligibility::AlreadyVoted { choice }
        );
        assert_eq!(store.is_eligible(VoteCategory::Poll).await, Eligibility::Eligible);

        // Expiry is exclusive: still blocked exactly at expiresAt.
        clock.advance(86_400_000);
        assert!(!store.is_eligible(VoteCategory::Reaction).await.is_eligible());

        clock.advance(1);
        assert!(store.is_eligible(VoteCategory::Reaction).await.is_eligible());
        assert_eq!(storage.get("keci_reaction_voted").await.unwrap(), None);
    }

    #[tokio::test]
    async fn stale_record_is_purged_on_read() {
        let (store, storage, _) = store();
        let stale = format!(r#"{{"choice":"worried","expiresAt":{}}}"#, NOW - 1);
        storage.set("keci_reaction_voted", &stale).await.unwrap();

        assert!(store.is_eligible(VoteCategory::Reaction).await.is_eligible());
        assert_eq!(storage.get("keci_reaction_voted").await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_record_counts_as_absent() {
        let (store, storage, _) = store();
        storage.set("keci_poll_voted", "{\"index\":").await.unwrap();

        assert!(store.is_eligible(VoteCategory::Poll).await.is_eligible());
        assert_eq!(storage.get("keci_poll_voted").await.unwrap(), None);
    }

    #[tokio::test]
    async fn poll_record_uses_weekly_expiry() {
        let (store, storage, _) = store();
        store
            .record_vote(VoteCategory::Poll, Choice::Poll(1), Duration::from_millis(604_800_000))
            .await;

        let raw = storage.get("keci_poll_voted").await.unwrap().unwrap();
        let record: EligibilityRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.choice, Choice::Poll(1));
        assert_eq!(record.expires_at, NOW + 604_800_000);
    }

    #[tokio::test]
    async fn disabled_storage_degrades_to_eligible() {
        let store = EligibilityStore::new(Arc::new(DisabledStorage), Arc::new(ManualClock::new(NOW)));
        store
            .record_vote(
                VoteCategory::Reaction,
                Choice::Reaction(Reaction::Worried),
                Duration::from_millis(86_400_000),
            )
            .await;
        assert!(store.is_eligible(VoteCategory::Reaction).await.is_eligible());
    }
}
