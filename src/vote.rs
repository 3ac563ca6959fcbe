// src/vote.rs
//! Vote controller: one per category per visitor request.
//!
//! A vote is counted in the aggregate backend first and only then recorded in
//! the eligibility store, so a failed write never burns the visitor's vote.
//! Once dispatched, that pair runs on its own task and finishes even if the
//! caller goes away.
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::backend::{AggregateBackend, BackendError};
use crate::eligibility::{Eligibility, EligibilityStore};
use crate::models::{Choice, ChoiceSet, Totals, VoteCategory};

pub const REACTION_WINDOW: Duration = Duration::from_millis(86_400_000);
pub const POLL_WINDOW: Duration = Duration::from_millis(604_800_000);

pub fn eligibility_window(category: VoteCategory) -> Duration {
    match category {
        VoteCategory::Reaction => REACTION_WINDOW,
        VoteCategory::Poll => POLL_WINDOW,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "choice", rename_all = "lowercase")]
pub enum VoteState {
    Unvoted,
    Voted(Choice),
}

impl VoteState {
    pub fn choice(&self) -> Option<Choice> {
        match self {
            VoteState::Unvoted => None,
            VoteState::Voted(choice) => Some(*choice),
        }
    }
}

impl From<Eligibility> for VoteState {
    fn from(eligibility: Eligibility) -> Self {
        match eligibility {
            Eligibility::Eligible => VoteState::Unvoted,
            Eligibility::AlreadyVoted { choice } => VoteState::Voted(choice),
        }
    }
}

/// Totals as last read; `available` is false when the backend could not be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TotalsSnapshot {
    pub totals: Totals,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    Recorded { state: VoteState, totals: TotalsSnapshot },
    AlreadyVoted { state: VoteState },
}

impl VoteOutcome {
    pub fn state(&self) -> VoteState {
        match self {
            VoteOutcome::Recorded { state, .. } | VoteOutcome::AlreadyVoted { state } => *state,
        }
    }
}

#[derive(Error, Debug)]
pub enum VoteError {
    #[error("choice {choice} is not valid for {category}")]
    InvalidChoice { category: VoteCategory, choice: Choice },

    #[error("a {0} vote is already being processed")]
    InFlight(VoteCategory),

    #[error("vote could not be counted: {0}")]
    BackendUnavailable(String),
}

/// Votes currently being processed, keyed by visitor and category.
///
/// Entries exist only while a vote is in flight, so the set stays as small as
/// the number of concurrent votes.
#[derive(Debug, Clone, Default)]
pub struct InFlightVotes {
    active: Arc<Mutex<HashSet<(Uuid, VoteCategory)>>>,
}

impl InFlightVotes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `(visitor, category)`; `None` when a vote for it is already running.
    pub fn try_acquire(&self, visitor: Uuid, category: VoteCategory) -> Option<InFlightGuard> {
        self.lock().insert((visitor, category)).then(|| InFlightGuard {
            votes: self.clone(),
            key: (visitor, category),
        })
    }

    pub fn contains(&self, visitor: Uuid, category: VoteCategory) -> bool {
        self.lock().contains(&(visitor, category))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<(Uuid, VoteCategory)>> {
        // The set is always left consistent, so a poisoned lock is still usable.
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases its claim on drop.
pub struct InFlightGuard {
    votes: InFlightVotes,
    key: (Uuid, VoteCategory),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.votes.lock().remove(&self.key);
    }
}

pub struct VoteController {
    visitor: Uuid,
    choices: ChoiceSet,
    eligibility: EligibilityStore,
    backend: Arc<dyn AggregateBackend>,
    in_flight: InFlightVotes,
}

impl VoteController {
    /// Controller with its own in-flight tracking.
    pub fn new(
        choices: ChoiceSet,
        eligibility: EligibilityStore,
        backend: Arc<dyn AggregateBackend>,
    ) -> Self {
        Self {
            visitor: Uuid::nil(),
            choices,
            eligibility,
            backend,
            in_flight: InFlightVotes::new(),
        }
    }

    /// Shares in-flight tracking with every other controller built for `visitor`.
    pub fn with_in_flight(mut self, visitor: Uuid, in_flight: InFlightVotes) -> Self {
        self.visitor = visitor;
        self.in_flight = in_flight;
        self
    }

    pub fn category(&self) -> VoteCategory {
        self.choices.category()
    }

    /// Current state, reconstructed from the eligibility store on every call.
    pub async fn state(&self) -> VoteState {
        self.eligibility.is_eligible(self.category()).await.into()
    }

    /// True while a vote is being processed; callers disable the vote control.
    pub fn is_busy(&self) -> bool {
        self.in_flight.contains(self.visitor, self.category())
    }

    pub async fn totals(&self) -> TotalsSnapshot {
        match self.backend.read(self.category()).await {
            Ok(totals) => TotalsSnapshot {
                totals,
                available: true,
            },
            Err(e) => {
                error!(category = %self.category(), error = %e, "Failed to read totals");
                TotalsSnapshot {
                    totals: self.choices.zeroed(),
                    available: false,
                }
            }
        }
    }

    pub async fn cast_vote(&self, choice: Choice) -> Result<VoteOutcome, VoteError> {
        let category = self.category();
        if !self.choices.contains(&choice) {
            return Err(VoteError::InvalidChoice { category, choice });
        }

        let guard = self
            .in_flight
            .try_acquire(self.visitor, category)
            .ok_or(VoteError::InFlight(category))?;

        if let Eligibility::AlreadyVoted { choice: previous } =
            self.eligibility.is_eligible(category).await
        {
            info!(%category, %previous, "Ignoring repeat vote inside eligibility window");
            return Ok(VoteOutcome::AlreadyVoted {
                state: VoteState::Voted(previous),
            });
        }

        let write = tokio::spawn(record(
            guard,
            self.backend.clone(),
            self.eligibility.clone(),
            category,
            choice,
        ));

        match write.await {
            Ok(result) => result,
            Err(e) => {
                error!(%category, %choice, error = %e, "Vote task failed");
                Err(VoteError::BackendUnavailable(e.to_string()))
            }
        }
    }
}

/// Counts the vote and records eligibility; the guard is held until both settle.
async fn record(
    _guard: InFlightGuard,
    backend: Arc<dyn AggregateBackend>,
    eligibility: EligibilityStore,
    category: VoteCategory,
    choice: Choice,
) -> Result<VoteOutcome, VoteError> {
    let counted = match backend.increment(category, &choice).await {
        Ok(totals) => totals,
        Err(BackendError::InvalidChoice { category, choice }) => {
            return Err(VoteError::InvalidChoice { category, choice });
        }
        Err(e) => {
            error!(%category, %choice, error = %e, "Failed to count vote");
            return Err(VoteError::BackendUnavailable(e.to_string()));
        }
    };

    eligibility
        .record_vote(category, choice, eligibility_window(category))
        .await;
    info!(%category, %choice, "Vote recorded");

    let totals = match backend.read(category).await {
        Ok(totals) => totals,
        Err(e) => {
            warn!(%category, error = %e, "Re-read after vote failed, using increment result");
            counted
        }
    };

    Ok(VoteOutcome::Recorded {
        state: VoteState::Voted(choice),
        totals: TotalsSnapshot {
            totals,
            available: true,
        },
    })
}
