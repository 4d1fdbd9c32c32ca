use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

const NOTE_URL_BASE: &str = "https://www.xiaohongshu.com/explore/";
const PROFILE_URL_BASE: &str = "https://www.xiaohongshu.com/user/profile/";

/// Content classification of a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteKind {
    Image,
    Video,
}

impl NoteKind {
    /// Maps the crawler's raw `type` field. Only `"video"` is a video; the
    /// crawler reports image posts as `"normal"` and anything unknown is
    /// treated as an image post too.
    #[must_use]
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw {
            Some("video") => NoteKind::Video,
            _ => NoteKind::Image,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            NoteKind::Image => "image",
            NoteKind::Video => "video",
        }
    }
}

impl std::fmt::Display for NoteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for NoteKind {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "image" => Ok(NoteKind::Image),
            "video" => Ok(NoteKind::Video),
            _ => Err(CoreError::InvalidNoteKind(value)),
        }
    }
}

/// A note parsed from crawler output, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedNote {
    pub note_id: String,
    /// Owning blogger; immutable once stored.
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub kind: NoteKind,
    pub likes: i64,
    pub collects: i64,
    pub comments: i64,
    pub create_time: Option<DateTime<Utc>>,
    pub cover_url: Option<String>,
    pub note_url: String,
}

/// Permalink for a note id.
#[must_use]
pub fn note_url(note_id: &str) -> String {
    format!("{NOTE_URL_BASE}{note_id}")
}

/// Canonical profile URL the crawler expects for a blogger id.
#[must_use]
pub fn profile_url(user_id: &str) -> String {
    format!("{PROFILE_URL_BASE}{user_id}")
}
