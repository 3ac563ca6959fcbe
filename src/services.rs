// src/services.rs
//! Boot-time wiring: feed, backend selection, visitor storage and sessions.
use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::backend::{AggregateBackend, BackendKind, ChoiceCatalog, LocalBackend, SharedBackend};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, DatabaseConfig, StorageLocation};
use crate::db::{create_pool, ensure_schema, PgDocumentStore};
use crate::eligibility::EligibilityStore;
use crate::feed::{load_feed, Feed};
use crate::models::{ChoiceSet, PollDefinition};
use crate::storage::{DisabledStorage, FileStorage, KeyValueStorage, MemoryStorage, ScopedStorage};
use crate::vote::{InFlightVotes, VoteController};

/// One visitor's controllers for a single request. Poll is absent when no poll is running.
pub struct Session {
    pub reaction: VoteController,
    pub poll: Option<VoteController>,
}

pub struct VoteService {
    backend: Arc<dyn AggregateBackend>,
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    poll: Option<PollDefinition>,
    in_flight: InFlightVotes,
}

impl VoteService {
    pub fn new(
        backend: Arc<dyn AggregateBackend>,
        storage: Arc<dyn KeyValueStorage>,
        clock: Arc<dyn Clock>,
        poll: Option<PollDefinition>,
    ) -> Self {
        Self {
            backend,
            storage,
            clock,
            poll,
            in_flight: InFlightVotes::new(),
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn poll(&self) -> Option<&PollDefinition> {
        self.poll.as_ref()
    }

    /// Votes still being processed, across all visitors.
    pub fn in_flight(&self) -> &InFlightVotes {
        &self.in_flight
    }

    /// Builds controllers over the visitor's scoped storage. Nothing is kept
    /// per visitor beyond their stored records and any vote still in flight.
    pub fn session(&self, visitor: Uuid) -> Session {
        let eligibility = EligibilityStore::new(
            Arc::new(ScopedStorage::new(self.storage.clone(), visitor)),
            self.clock.clone(),
        );

        Session {
            reaction: VoteController::new(
                ChoiceSet::reaction(),
                eligibility.clone(),
                self.backend.clone(),
            )
            .with_in_flight(visitor, self.in_flight.clone()),
            poll: self.poll.as_ref().map(|poll| {
                VoteController::new(poll.choices(), eligibility, self.backend.clone())
                    .with_in_flight(visitor, self.in_flight.clone())
            }),
        }
    }
}

pub struct Dashboard {
    pub feed: Feed,
    pub votes: VoteService,
}

pub struct AppState {
    /// `Err` carries the reason the feed could not be loaded.
    pub dashboard: Result<Dashboard, String>,
}

impl AppState {
    pub async fn build(config: &Config) -> Arc<Self> {
        let dashboard = match load_feed(&config.feed_source).await {
            Ok(feed) => {
                let poll = feed.active_poll().cloned();
                let catalog = ChoiceCatalog::new(poll.as_ref().map(PollDefinition::choices));
                let backend = select_backend(config.database.as_ref(), catalog).await;
                let storage = open_storage(&config.visitor_storage).await;
                let votes = VoteService::new(backend, storage, Arc::new(SystemClock), poll);
                Ok(Dashboard { feed, votes })
            }
            Err(e) => {
                error!(source = %config.feed_source, error = %e, "Feed unavailable, dashboard disabled");
                Err(e.to_string())
            }
        };

        Arc::new(Self { dashboard })
    }
}

/// Shared backend when a database is configured and reachable, local otherwise.
pub async fn select_backend(
    database: Option<&DatabaseConfig>,
    catalog: ChoiceCatalog,
) -> Arc<dyn AggregateBackend> {
    let Some(database) = database else {
        info!("Using local vote totals");
        return Arc::new(LocalBackend::new(catalog));
    };

    let pool = match create_pool(&database.url, database.max_connections).await {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "Failed to connect to the database, falling back to local vote totals");
            return Arc::new(LocalBackend::new(catalog));
        }
    };

    if let Err(e) = ensure_schema(&pool).await {
        error!(error = %e, "Failed to prepare vote_documents, falling back to local vote totals");
        return Arc::new(LocalBackend::new(catalog));
    }

    info!("Using shared vote totals");
    Arc::new(SharedBackend::new(catalog, Arc::new(PgDocumentStore::new(pool))))
}

pub async fn open_storage(location: &StorageLocation) -> Arc<dyn KeyValueStorage> {
    match location {
        StorageLocation::Memory => Arc::new(MemoryStorage::new()),
        StorageLocation::File(path) => match FileStorage::open(path).await {
            Ok(storage) => Arc::new(storage),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Visitor storage unavailable, repeat votes will not be blocked");
                Arc::new(DisabledStorage)
            }
        },
    }
}
