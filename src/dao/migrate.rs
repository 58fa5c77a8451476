//! One-time migration of legacy persisted shapes to the current schema.
//!
//! Two earlier generations exist in the wild. Neither carried a version tag,
//! so they are detected by sniffing fields absent from the current schema:
//! generation 1 entries carry a raw `url`, generation 2 entries carry
//! `videoId` with split `upvotes`/`downvotes` counters. Migration is pure
//! and all-or-nothing: the whole loaded collection maps under one detected
//! generation or the document is rejected as corrupt.

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    identity::{Performance, PerformanceOutcome},
    queue::{CURRENT_SCHEMA_VERSION, Entry, MAX_NAME_CHARS, MAX_TITLE_CHARS, QueueState},
};

/// A persisted document that matches no known generation.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The queue state document is unreadable under every known shape.
    #[error("unrecognized queue state shape: {0}")]
    UnrecognizedState(String),
    /// The performance history document is unreadable under every known shape.
    #[error("unrecognized performance history shape: {0}")]
    UnrecognizedHistory(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Generation {
    UrlOnly,
    SplitVotes,
    Current,
}

fn sniff_entry(entry: &Value) -> Generation {
    if entry.get("url").is_some() {
        Generation::UrlOnly
    } else if entry.get("videoId").is_some() {
        Generation::SplitVotes
    } else {
        Generation::Current
    }
}

/// Migrate a persisted queue state document to the current schema.
pub fn migrate_state(document: Value) -> Result<QueueState, MigrationError> {
    // The oldest deployments persisted a bare entry array.
    let (entries_value, current_epoch, now_playing_value) = match &document {
        Value::Array(entries) => (entries.clone(), 0, None),
        Value::Object(map) => {
            if map.get("schemaVersion").and_then(Value::as_u64) == Some(CURRENT_SCHEMA_VERSION as u64) {
                return serde_json::from_value(document.clone())
                    .map_err(|err| MigrationError::UnrecognizedState(err.to_string()));
            }
            let entries = map
                .get("entries")
                .or_else(|| map.get("queue"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let epoch = map.get("currentEpoch").and_then(Value::as_u64).unwrap_or(0);
            let playing = map.get("nowPlaying").filter(|v| !v.is_null()).cloned();
            (entries, epoch, playing)
        }
        _ => {
            return Err(MigrationError::UnrecognizedState(
                "expected object or array".into(),
            ));
        }
    };

    // All-or-nothing: the generation detected on the first record governs
    // the whole collection.
    let generation = entries_value
        .first()
        .or(now_playing_value.as_ref())
        .map(sniff_entry)
        .unwrap_or(Generation::Current);

    let mut entries = Vec::with_capacity(entries_value.len());
    for (index, value) in entries_value.iter().enumerate() {
        entries.push(migrate_entry(value, generation, index)?);
    }
    let now_playing = now_playing_value
        .as_ref()
        .map(|value| migrate_entry(value, generation, 0))
        .transpose()?;

    Ok(QueueState {
        entries,
        current_epoch,
        now_playing,
        schema_version: CURRENT_SCHEMA_VERSION,
    })
}

fn migrate_entry(
    value: &Value,
    generation: Generation,
    index: usize,
) -> Result<Entry, MigrationError> {
    match generation {
        Generation::Current => serde_json::from_value(value.clone())
            .map_err(|err| MigrationError::UnrecognizedState(err.to_string())),
        Generation::UrlOnly => {
            let url = string_field(value, &["url"]).ok_or_else(|| {
                MigrationError::UnrecognizedState("generation-1 entry without url".into())
            })?;
            let name = string_field(value, &["singer", "name", "displayName"]).unwrap_or_default();
            let title = string_field(value, &["title", "songTitle"]).unwrap_or_else(|| url.clone());
            Ok(Entry {
                id: entry_id(value),
                display_name: clamp(&name, MAX_NAME_CHARS),
                media_id: media_id_from_url(&url),
                title: clamp(&title, MAX_TITLE_CHARS),
                source: "youtube".to_string(),
                vote_total: 0,
                order_epoch: index as u64,
                joined_at_ms: int_field(value, &["addedAt", "joinedAt"]).unwrap_or(index as i64),
                owner_user_id: None,
            })
        }
        Generation::SplitVotes => {
            let media_id = string_field(value, &["videoId"]).ok_or_else(|| {
                MigrationError::UnrecognizedState("generation-2 entry without videoId".into())
            })?;
            let upvotes = int_field(value, &["upvotes"]).unwrap_or(0);
            let downvotes = int_field(value, &["downvotes"]).unwrap_or(0);
            let name = string_field(value, &["singer", "name", "displayName"]).unwrap_or_default();
            Ok(Entry {
                id: entry_id(value),
                display_name: clamp(&name, MAX_NAME_CHARS),
                media_id,
                title: clamp(
                    &string_field(value, &["title"]).unwrap_or_default(),
                    MAX_TITLE_CHARS,
                ),
                source: string_field(value, &["source"]).unwrap_or_else(|| "youtube".into()),
                vote_total: upvotes - downvotes,
                order_epoch: int_field(value, &["epoch", "orderEpoch"]).unwrap_or(0).max(0) as u64,
                joined_at_ms: int_field(value, &["addedAt", "joinedAt", "joinedAtMillis"])
                    .unwrap_or(index as i64),
                owner_user_id: string_field(value, &["userId", "ownerUserId"]),
            })
        }
    }
}

/// Migrate a persisted performance history document to the current schema.
pub fn migrate_performances(document: Value) -> Result<Vec<Performance>, MigrationError> {
    let records = match document {
        Value::Array(records) => records,
        Value::Object(ref map) => map
            .get("performances")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| MigrationError::UnrecognizedHistory("expected array".into()))?,
        _ => return Err(MigrationError::UnrecognizedHistory("expected array".into())),
    };

    let legacy = records
        .first()
        .is_some_and(|record| record.get("url").is_some() || record.get("songUrl").is_some());

    records
        .iter()
        .map(|record| {
            if legacy {
                migrate_legacy_performance(record)
            } else {
                serde_json::from_value(record.clone())
                    .map_err(|err| MigrationError::UnrecognizedHistory(err.to_string()))
            }
        })
        .collect()
}

fn migrate_legacy_performance(value: &Value) -> Result<Performance, MigrationError> {
    let url = string_field(value, &["url", "songUrl"]).ok_or_else(|| {
        MigrationError::UnrecognizedHistory("legacy performance without url".into())
    })?;
    let skipped = value
        .get("skipped")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Ok(Performance {
        id: entry_id(value),
        name: string_field(value, &["singer", "name"]).unwrap_or_default(),
        media_id: media_id_from_url(&url),
        title: string_field(value, &["title", "songTitle"]).unwrap_or_else(|| url.clone()),
        performed_at_ms: int_field(value, &["performedAt", "sungAt", "at"]).unwrap_or(0),
        vote_total: int_field(value, &["votes", "voteTotal"]).unwrap_or(0),
        outcome: if skipped {
            PerformanceOutcome::SkippedBySinger
        } else {
            PerformanceOutcome::Completed
        },
    })
}

/// Pull a media id out of a raw watch URL: the `v=` query parameter when
/// present, otherwise the last path segment.
fn media_id_from_url(url: &str) -> String {
    if let Some(start) = url.find("v=") {
        let tail = &url[start + 2..];
        return tail
            .split(['&', '#'])
            .next()
            .unwrap_or(tail)
            .to_string();
    }
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(url)
        .split(['?', '#'])
        .next()
        .unwrap_or("")
        .to_string()
}

fn entry_id(value: &Value) -> Uuid {
    string_field(value, &["id"])
        .and_then(|raw| Uuid::parse_str(&raw).ok())
        .unwrap_or_else(Uuid::new_v4)
}

fn string_field(value: &Value, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| value.get(name).and_then(Value::as_str))
        .map(str::to_string)
}

fn int_field(value: &Value, names: &[&str]) -> Option<i64> {
    names.iter().find_map(|name| value.get(name).and_then(Value::as_i64))
}

fn clamp(value: &str, max: usize) -> String {
    value.trim().chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn current_state_passes_through() {
        let state = QueueState::default();
        let document = serde_json::to_value(&state).unwrap();
        assert_eq!(migrate_state(document).unwrap(), state);
    }

    #[test]
    fn generation_one_bare_array_migrates() {
        let document = json!([
            {"singer": "Amy", "url": "https://www.youtube.com/watch?v=abc123&t=9", "title": "Song A", "addedAt": 1000},
            {"singer": "Bob", "url": "https://youtu.be/def456", "title": "Song B"}
        ]);

        let state = migrate_state(document).unwrap();
        assert_eq!(state.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(state.current_epoch, 0);
        assert_eq!(state.entries.len(), 2);
        assert_eq!(state.entries[0].media_id, "abc123");
        assert_eq!(state.entries[0].joined_at_ms, 1000);
        assert_eq!(state.entries[0].vote_total, 0);
        assert_eq!(state.entries[1].media_id, "def456");
        assert_eq!(state.entries[1].order_epoch, 1);
    }

    #[test]
    fn generation_two_split_votes_migrate() {
        let document = json!({
            "entries": [
                {"singer": "Amy", "videoId": "abc", "title": "A", "upvotes": 5, "downvotes": 2, "addedAt": 500}
            ],
            "currentEpoch": 7,
            "nowPlaying": {"singer": "Bob", "videoId": "xyz", "title": "B", "upvotes": 1, "downvotes": 0}
        });

        let state = migrate_state(document).unwrap();
        assert_eq!(state.current_epoch, 7);
        assert_eq!(state.entries[0].vote_total, 3);
        assert_eq!(state.entries[0].media_id, "abc");
        let playing = state.now_playing.unwrap();
        assert_eq!(playing.media_id, "xyz");
        assert_eq!(playing.vote_total, 1);
    }

    #[test]
    fn unknown_shape_is_rejected_whole() {
        assert!(migrate_state(json!("nonsense")).is_err());
        // Mixed generations do not partially migrate: the first record
        // decides, and records that cannot map under it fail the load.
        let mixed = json!([
            {"singer": "Amy", "url": "https://youtu.be/a"},
            {"singer": "Bob", "videoId": "b"}
        ]);
        assert!(migrate_state(mixed).is_err());
    }

    #[test]
    fn legacy_performances_migrate() {
        let document = json!([
            {"singer": "Amy", "url": "https://www.youtube.com/watch?v=abc", "title": "A", "performedAt": 900, "votes": 4},
            {"singer": "Bob", "songUrl": "https://youtu.be/def", "skipped": true}
        ]);

        let history = migrate_performances(document).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].media_id, "abc");
        assert_eq!(history[0].vote_total, 4);
        assert_eq!(history[0].outcome, PerformanceOutcome::Completed);
        assert_eq!(history[1].outcome, PerformanceOutcome::SkippedBySinger);
    }

    #[test]
    fn current_performances_pass_through() {
        let record = Performance {
            id: Uuid::new_v4(),
            name: "Amy".into(),
            media_id: "abc".into(),
            title: "A".into(),
            performed_at_ms: 1,
            vote_total: 2,
            outcome: PerformanceOutcome::SkippedByAdmin,
        };
        let document = serde_json::to_value(vec![record.clone()]).unwrap();
        assert_eq!(migrate_performances(document).unwrap(), vec![record]);
    }

    #[test]
    fn media_id_extraction() {
        assert_eq!(media_id_from_url("https://x/watch?v=abc&t=1"), "abc");
        assert_eq!(media_id_from_url("https://youtu.be/def456"), "def456");
        assert_eq!(media_id_from_url("https://youtu.be/def456?t=3"), "def456");
    }
}
