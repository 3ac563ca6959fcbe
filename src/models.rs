// src/models.rs
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteCategory {
    Reaction,
    Poll,
}

impl VoteCategory {
    pub fn storage_key(self) -> &'static str {
        match self {
            VoteCategory::Reaction => "keci_reaction_voted",
            VoteCategory::Poll => "keci_poll_voted",
        }
    }
}

impl fmt::Display for VoteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteCategory::Reaction => f.write_str("reaction"),
            VoteCategory::Poll => f.write_str("poll"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reaction {
    Worried,
    Neutral,
    Okay,
}

impl Reaction {
    pub const ALL: [Reaction; 3] = [Reaction::Worried, Reaction::Neutral, Reaction::Okay];

    pub fn as_str(self) -> &'static str {
        match self {
            Reaction::Worried => "worried",
            Reaction::Neutral => "neutral",
            Reaction::Okay => "okay",
        }
    }
}

/// A vote selection: a reaction name or a poll option index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Choice {
    Reaction(Reaction),
    Poll(usize),
}

impl Choice {
    /// Identifier used as the key in totals documents.
    pub fn key(&self) -> String {
        match self {
            Choice::Reaction(reaction) => reaction.as_str().to_string(),
            Choice::Poll(index) => index.to_string(),
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// The valid choices of one category, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceSet {
    category: VoteCategory,
    keys: Vec<String>,
}

impl ChoiceSet {
    pub fn reaction() -> Self {
        Self {
            category: VoteCategory::Reaction,
            keys: Reaction::ALL.iter().map(|r| r.as_str().to_string()).collect(),
        }
    }

    pub fn poll(option_count: usize) -> Self {
        Self {
            category: VoteCategory::Poll,
            keys: (0..option_count).map(|i| i.to_string()).collect(),
        }
    }

    pub fn category(&self) -> VoteCategory {
        self.category
    }

    pub fn contains(&self, choice: &Choice) -> bool {
        match (self.category, choice) {
            (VoteCategory::Reaction, Choice::Reaction(_)) => true,
            (VoteCategory::Poll, Choice::Poll(index)) => *index < self.keys.len(),
            _ => false,
        }
    }

    pub fn zeroed(&self) -> Totals {
        Totals {
            counts: self.keys.iter().map(|k| (k.clone(), 0)).collect(),
        }
    }
}

/// Vote counts keyed by choice identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Totals {
    counts: BTreeMap<String, u64>,
}

impl Totals {
    pub fn from_counts(counts: BTreeMap<String, u64>) -> Self {
        Self { counts }
    }

    /// Overlays stored counts on a zeroed choice set. Keys outside the set are kept.
    pub fn merged_over(choices: &ChoiceSet, stored: BTreeMap<String, u64>) -> Self {
        let mut totals = choices.zeroed();
        totals.counts.extend(stored);
        totals
    }

    pub fn get(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn count(&self, choice: &Choice) -> u64 {
        self.get(&choice.key())
    }

    pub fn increment(&mut self, key: &str) -> u64 {
        let count = self.counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn counts(&self) -> &BTreeMap<String, u64> {
        &self.counts
    }
}

/// Persisted form of a visitor's vote, stored under the category's storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityRecord {
    pub choice: Choice,
    pub expires_at: i64,
}

impl EligibilityRecord {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms > self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollDefinition {
    pub question: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub active: bool,
}

impl PollDefinition {
    pub fn choices(&self) -> ChoiceSet {
        ChoiceSet::poll(self.options.len())
    }
}
