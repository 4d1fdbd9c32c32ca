//! Conversion from raw crawler records to [`redlens_core`] domain types.
//!
//! Count parsing is delegated to [`crate::parse`]; this module only does the
//! structural mapping and decides which records are unusable.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use redlens_core::{note_url, DiscoveredBlogger, NormalizedNote, NoteKind};

use crate::error::NormalizeError;
use crate::types::{RawCount, RawCreator, RawNote};

/// Normalizes one raw note.
///
/// # Errors
///
/// Returns [`NormalizeError`] if the note id or owner is missing, a count
/// cannot be parsed, or the timestamp is out of range.
pub fn normalize_note(raw: &RawNote) -> Result<NormalizedNote, NormalizeError> {
    let note_id = required(raw.note_id.as_deref(), "note_id")?;
    let user_id = required(raw.user_id.as_deref(), "user_id")?;

    let likes = count(raw.liked_count.as_ref(), "liked_count")?;
    let collects = count(raw.collected_count.as_ref(), "collected_count")?;
    let comments = count(raw.comment_count.as_ref(), "comment_count")?;

    let create_time = match raw.time {
        Some(ms) if ms > 0 => Some(
            DateTime::<Utc>::from_timestamp_millis(ms)
                .ok_or(NormalizeError::InvalidTimestamp(ms))?,
        ),
        _ => None,
    };

    let cover_url = raw
        .image_list
        .as_deref()
        .and_then(|list| list.split(',').map(str::trim).find(|url| !url.is_empty()))
        .map(str::to_string);

    let permalink = raw
        .note_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map_or_else(|| note_url(note_id), str::to_string);

    Ok(NormalizedNote {
        note_id: note_id.to_string(),
        user_id: user_id.to_string(),
        title: raw.title.clone().unwrap_or_default(),
        description: raw.desc.clone().unwrap_or_default(),
        kind: NoteKind::from_raw(raw.note_type.as_deref()),
        likes,
        collects,
        comments,
        create_time,
        cover_url,
        note_url: permalink,
    })
}

/// Picks one blogger per `user_id` from search results, keeping only those
/// whose note reached `min_likes`. The first qualifying note wins; output
/// order follows the input.
///
/// Records with no owner or an unreadable like count are skipped.
#[must_use]
pub fn extract_bloggers(notes: &[RawNote], min_likes: i64) -> Vec<DiscoveredBlogger> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut bloggers = Vec::new();

    for note in notes {
        let Some(user_id) = non_empty(note.user_id.as_deref()) else {
            continue;
        };
        let Ok(likes) = count(note.liked_count.as_ref(), "liked_count") else {
            tracing::warn!(user_id, "skipping search result with unreadable like count");
            continue;
        };
        if likes < min_likes || !seen.insert(user_id) {
            continue;
        }

        bloggers.push(DiscoveredBlogger {
            user_id: user_id.to_string(),
            nickname: non_empty(note.nickname.as_deref())
                .unwrap_or(user_id)
                .to_string(),
            avatar_url: non_empty(note.avatar.as_deref()).map(str::to_string),
            source_keyword: non_empty(note.source_keyword.as_deref()).map(str::to_string),
            sample_likes: likes,
        });
    }

    bloggers
}

/// Maps creator id to follower count. Creators with no id or an unreadable
/// count are left out, so callers see them as "no data".
#[must_use]
pub fn fans_by_user(creators: &[RawCreator]) -> HashMap<String, i64> {
    creators
        .iter()
        .filter_map(|creator| {
            let user_id = non_empty(creator.user_id.as_deref())?;
            match count(creator.fans.as_ref(), "fans") {
                Ok(fans) => Some((user_id.to_string(), fans)),
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "ignoring unreadable follower count");
                    None
                }
            }
        })
        .collect()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, NormalizeError> {
    non_empty(value).ok_or(NormalizeError::MissingField { field })
}

fn count(value: Option<&RawCount>, field: &'static str) -> Result<i64, NormalizeError> {
    match value {
        None => Ok(0),
        Some(raw) => raw.value().ok_or_else(|| NormalizeError::InvalidCount {
            field,
            value: match raw {
                RawCount::Text(s) => s.clone(),
                other => format!("{other:?}"),
            },
        }),
    }
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
