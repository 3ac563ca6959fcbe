// src/feed.rs
//! The static indicator feed, fetched once at boot.
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tracing::info;

use crate::models::PollDefinition;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("failed to fetch feed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to read feed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("feed is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskClass {
    Safe,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallRisk {
    pub class: RiskClass,
    pub text: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub name: String,
    #[serde(default)]
    pub unit: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub risk_class: RiskClass,
    pub risk_text: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: String,
}

/// Indicators keyed by identifier, kept in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Indicators(pub Vec<(String, Indicator)>);

impl Indicators {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Indicator)> {
        self.0.iter().map(|(id, indicator)| (id.as_str(), indicator))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Indicators {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, indicator) in &self.0 {
            map.serialize_entry(id, indicator)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Indicators {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IndicatorsVisitor;

        impl<'de> Visitor<'de> for IndicatorsVisitor {
            type Value = Indicators;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of indicator id to indicator")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry::<String, Indicator>()? {
                    entries.push(entry);
                }
                Ok(Indicators(entries))
            }
        }

        deserializer.deserialize_map(IndicatorsVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub updated_date: String,
    pub overall_risk: OverallRisk,
    #[serde(default)]
    pub indicators: Indicators,
    #[serde(default)]
    pub poll: Option<PollDefinition>,
}

impl Feed {
    /// The poll, if the feed carries one and it is running.
    pub fn active_poll(&self) -> Option<&PollDefinition> {
        self.poll.as_ref().filter(|poll| poll.active)
    }
}

/// Loads the feed from an `http(s)://` URL or a file path.
pub async fn load_feed(source: &str) -> Result<Feed, FeedError> {
    let feed: Feed = if source.starts_with("http://") || source.starts_with("https://") {
        reqwest::get(source)
            .await?
            .error_for_status()?
            .json()
            .await?
    } else {
        let contents = tokio::fs::read_to_string(source).await?;
        serde_json::from_str(&contents)?
    };

    info!(
        source,
        updated = %feed.updated_date,
        indicators = feed.indicators.len(),
        poll = feed.active_poll().is_some(),
        "Loaded indicator feed"
    );
    Ok(feed)
}
