//! The structured request handed to the external crawler for one invocation.

use std::collections::BTreeMap;

use redlens_core::profile_url;
use serde::{Deserialize, Serialize};

/// Which crawler mode to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlMode {
    /// Fetch notes (or profiles) of specific creators.
    Creator,
    /// Keyword search, used by discovery.
    Search,
}

impl CrawlMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CrawlMode::Creator => "creator",
            CrawlMode::Search => "search",
        }
    }
}

/// Everything the crawler needs for one invocation.
///
/// Serialized as JSON and passed by path, so no shared crawler state has to
/// be touched to parameterize a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRequest {
    pub mode: CrawlMode,
    /// Canonical profile URLs of the target creators, in submission order.
    pub creator_urls: Vec<String>,
    pub keywords: Vec<String>,
    /// Notes to fetch per creator (or per keyword in search mode).
    pub max_notes: u32,
    /// Creator id to note ids already stored for that creator.
    pub exclude_note_ids: BTreeMap<String, Vec<String>>,
    pub enable_comments: bool,
}

impl CrawlRequest {
    /// Request for up to `max_notes` notes from each creator.
    #[must_use]
    pub fn creators(user_ids: &[String], max_notes: u32) -> Self {
        Self {
            mode: CrawlMode::Creator,
            creator_urls: user_ids.iter().map(|id| profile_url(id)).collect(),
            keywords: Vec::new(),
            max_notes,
            exclude_note_ids: BTreeMap::new(),
            enable_comments: false,
        }
    }

    /// Profile lookup for the given creators: a budget of one note and no
    /// exclusions.
    #[must_use]
    pub fn profiles(user_ids: &[String]) -> Self {
        Self::creators(user_ids, 1)
    }

    #[must_use]
    pub fn search(keywords: &[String], max_notes: u32) -> Self {
        Self {
            mode: CrawlMode::Search,
            creator_urls: Vec::new(),
            keywords: keywords.to_vec(),
            max_notes,
            exclude_note_ids: BTreeMap::new(),
            enable_comments: false,
        }
    }

    /// Attaches exclusion sets. Creators with nothing to exclude are dropped
    /// from the map.
    #[must_use]
    pub fn with_exclusions(mut self, exclusions: BTreeMap<String, Vec<String>>) -> Self {
        self.exclude_note_ids = exclusions
            .into_iter()
            .filter(|(_, ids)| !ids.is_empty())
            .collect();
        self
    }

    /// Number of creators this request targets.
    #[must_use]
    pub fn creator_count(&self) -> usize {
        self.creator_urls.len()
    }
}
