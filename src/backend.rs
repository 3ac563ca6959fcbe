// src/backend.rs
//! Where vote totals live.
//!
//! [`LocalBackend`] keeps counts in process memory. [`SharedBackend`] delegates
//! to a transactional [`DocumentStore`] so concurrent visitors never lose an
//! increment. The composition root picks one at boot and hands it to every
//! vote controller as `Arc<dyn AggregateBackend>`.
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::{Choice, ChoiceSet, Totals, VoteCategory};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("no {0} choices are configured")]
    UnknownCategory(VoteCategory),

    #[error("choice {choice} is not valid for {category}")]
    InvalidChoice { category: VoteCategory, choice: Choice },
}

impl From<sqlx::Error> for BackendError {
    fn from(e: sqlx::Error) -> Self {
        BackendError::Unavailable(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Shared,
    Local,
}

#[async_trait]
pub trait AggregateBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn read(&self, category: VoteCategory) -> Result<Totals, BackendError>;

    /// Adds one vote and returns the post-increment totals.
    async fn increment(&self, category: VoteCategory, choice: &Choice)
        -> Result<Totals, BackendError>;
}

/// The choice sets known to a backend, one per category.
#[derive(Debug, Clone)]
pub struct ChoiceCatalog {
    reaction: ChoiceSet,
    poll: Option<ChoiceSet>,
}

impl ChoiceCatalog {
    pub fn new(poll: Option<ChoiceSet>) -> Self {
        Self {
            reaction: ChoiceSet::reaction(),
            poll,
        }
    }

    pub fn get(&self, category: VoteCategory) -> Result<&ChoiceSet, BackendError> {
        match category {
            VoteCategory::Reaction => Ok(&self.reaction),
            VoteCategory::Poll => self
                .poll
                .as_ref()
                .ok_or(BackendError::UnknownCategory(category)),
        }
    }

    fn validate(&self, category: VoteCategory, choice: &Choice) -> Result<&ChoiceSet, BackendError> {
        let choices = self.get(category)?;
        if !choices.contains(choice) {
            return Err(BackendError::InvalidChoice {
                category,
                choice: *choice,
            });
        }
        Ok(choices)
    }
}

pub struct LocalBackend {
    catalog: ChoiceCatalog,
    totals: Mutex<HashMap<VoteCategory, Totals>>,
}

impl LocalBackend {
    pub fn new(catalog: ChoiceCatalog) -> Self {
        Self {
            catalog,
            totals: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl AggregateBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn read(&self, category: VoteCategory) -> Result<Totals, BackendError> {
        let choices = self.catalog.get(category)?;
        let totals = self.totals.lock().await;
        Ok(totals
            .get(&category)
            .cloned()
            .unwrap_or_else(|| choices.zeroed()))
    }

    async fn increment(
        &self,
        category: VoteCategory,
        choice: &Choice,
    ) -> Result<Totals, BackendError> {
        let choices = self.catalog.validate(category, choice)?;
        let mut totals = self.totals.lock().await;
        let entry = totals.entry(category).or_insert_with(|| choices.zeroed());
        entry.increment(&choice.key());
        Ok(entry.clone())
    }
}

/// Address of a totals document in the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    pub collection: &'static str,
    pub document: &'static str,
}

impl DocumentRef {
    pub fn for_category(category: VoteCategory) -> Self {
        match category {
            VoteCategory::Reaction => Self {
                collection: "reactions",
                document: "counts",
            },
            VoteCategory::Poll => Self {
                collection: "polls",
                document: "current",
            },
        }
    }
}

pub type Counts = BTreeMap<String, u64>;

/// Partial update produced by one increment: only the incremented key, at its new value.
pub fn increment_patch(current: Option<&Counts>, key: &str) -> Counts {
    let next = current
        .and_then(|counts| counts.get(key))
        .copied()
        .unwrap_or(0)
        + 1;
    BTreeMap::from([(key.to_string(), next)])
}

/// A document store offering single-document reads and a transactional
/// increment. Implementations must read, patch with [`increment_patch`] and
/// merge-write inside one transaction, so no concurrent increment is lost.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn fetch(&self, doc: DocumentRef) -> Result<Option<Counts>, BackendError>;

    /// Returns the whole document after the merge.
    async fn increment(&self, doc: DocumentRef, key: &str) -> Result<Counts, BackendError>;
}

pub struct SharedBackend {
    catalog: ChoiceCatalog,
    store: Arc<dyn DocumentStore>,
}

impl SharedBackend {
    pub fn new(catalog: ChoiceCatalog, store: Arc<dyn DocumentStore>) -> Self {
        Self { catalog, store }
    }
}

#[async_trait]
impl AggregateBackend for SharedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Shared
    }

    async fn read(&self, category: VoteCategory) -> Result<Totals, BackendError> {
        let choices = self.catalog.get(category)?;
        let stored = self
            .store
            .fetch(DocumentRef::for_category(category))
            .await?
            .unwrap_or_default();
        Ok(Totals::merged_over(choices, stored))
    }

    async fn increment(
        &self,
        category: VoteCategory,
        choice: &Choice,
    ) -> Result<Totals, BackendError> {
        let choices = self.catalog.validate(category, choice)?;
        let doc = DocumentRef::for_category(category);
        let merged = self.store.increment(doc, &choice.key()).await?;
        debug!(%category, %choice, collection = doc.collection, "Merged increment into shared totals");
        Ok(Totals::merged_over(choices, merged))
    }
}

/// In-process [`DocumentStore`]; one lock serializes every transaction.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<HashMap<DocumentRef, Counts>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, doc: DocumentRef, counts: Counts) {
        self.documents.lock().await.insert(doc, counts);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn fetch(&self, doc: DocumentRef) -> Result<Option<Counts>, BackendError> {
        Ok(self.documents.lock().await.get(&doc).cloned())
    }

    async fn increment(&self, doc: DocumentRef, key: &str) -> Result<Counts, BackendError> {
        let mut documents = self.documents.lock().await;
        let patch = increment_patch(documents.get(&doc), key);
        let document = documents.entry(doc).or_default();
        document.extend(patch);
        Ok(document.clone())
    }
}
