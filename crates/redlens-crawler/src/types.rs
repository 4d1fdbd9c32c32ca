//! Record shapes as the external crawler writes them to its JSON artifacts.
//!
//! Every field is optional: the crawler omits or nulls fields freely, and a
//! record that lacks something essential is rejected later, one record at a
//! time, by [`crate::normalize`].

use serde::{Deserialize, Serialize};

use crate::parse::parse_count;

/// An engagement or follower count. The crawler emits display strings such
/// as `"2.1万"` but occasionally plain numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCount {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawCount {
    /// The count as a non-negative integer, or `None` if it cannot be read.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn value(&self) -> Option<i64> {
        match self {
            RawCount::Int(n) if *n >= 0 => Some(*n),
            RawCount::Float(f) if f.is_finite() && *f >= 0.0 => Some(f.round() as i64),
            RawCount::Text(s) => parse_count(s),
            _ => None,
        }
    }
}

impl From<&str> for RawCount {
    fn from(value: &str) -> Self {
        RawCount::Text(value.to_string())
    }
}

/// One note from a `creator_contents_*` or `search_contents_*` artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawNote {
    #[serde(default)]
    pub note_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
    /// `"normal"` for image notes, `"video"` for video notes.
    #[serde(default, rename = "type")]
    pub note_type: Option<String>,
    #[serde(default)]
    pub liked_count: Option<RawCount>,
    #[serde(default)]
    pub collected_count: Option<RawCount>,
    #[serde(default)]
    pub comment_count: Option<RawCount>,
    /// Publish time, milliseconds since the Unix epoch.
    #[serde(default)]
    pub time: Option<i64>,
    /// Comma-joined image URLs; the first one is the cover.
    #[serde(default)]
    pub image_list: Option<String>,
    #[serde(default)]
    pub note_url: Option<String>,
    #[serde(default)]
    pub source_keyword: Option<String>,
}

/// One creator profile from a `creator_creators_*` artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCreator {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub fans: Option<RawCount>,
}
