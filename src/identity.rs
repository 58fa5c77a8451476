//! Pure identity algebra: salted PIN hashing, name normalization,
//! performance records and per-singer history aggregation.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::queue::Entry;

/// A claimed display name bound to a salted PIN hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Normalized (trimmed, lowercased) form of the claimed name.
    pub normalized_name: String,
    /// Hex SHA-256 of `salt ∥ pin`.
    pub pin_hash: String,
    /// Hex-encoded random salt.
    pub salt: String,
    /// Claim timestamp in Unix epoch milliseconds.
    pub created_at_ms: i64,
}

impl Identity {
    /// Claim a name by binding a fresh random salt and a one-way hash of the
    /// PIN to its normalized form. The PIN itself is never stored.
    pub fn claim(name: &str, pin: &str, now_ms: i64) -> Self {
        let salt = random_salt();
        Self {
            normalized_name: normalize_name(name),
            pin_hash: hash_pin(&salt, pin),
            salt,
            created_at_ms: now_ms,
        }
    }

    /// Recompute the hash for the presented PIN and compare it to the stored
    /// value. PINs are never compared in plaintext.
    pub fn verify(&self, pin: &str) -> bool {
        hash_pin(&self.salt, pin) == self.pin_hash
    }
}

/// Normalize a display name for identity lookups and eligibility checks.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Hex SHA-256 over the salt concatenated with the PIN.
pub fn hash_pin(salt: &str, pin: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(pin.as_bytes());
    hex_encode(&hasher.finalize())
}

/// Generate a fresh 16-byte hex salt (used for identity and admin secrets).
pub fn random_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    hex_encode(&bytes)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// How a performance ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PerformanceOutcome {
    /// The song played to the end.
    Completed,
    /// The singer skipped their own turn.
    SkippedBySinger,
    /// An admin skipped the turn.
    SkippedByAdmin,
    /// Playback failed.
    Errored {
        /// Human-readable failure reason reported by the playback surface.
        reason: String,
    },
}

/// Immutable historical record of one performance. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    /// Identifier of the queue entry this record was made from.
    pub id: Uuid,
    /// Singer display name at performance time.
    pub name: String,
    /// Media identifier that was performed.
    pub media_id: String,
    /// Song title at performance time.
    pub title: String,
    /// When the performance ended, Unix epoch milliseconds.
    pub performed_at_ms: i64,
    /// Vote total snapshot taken when the entry left the stage.
    pub vote_total: i64,
    /// How the performance ended.
    pub outcome: PerformanceOutcome,
}

impl Performance {
    /// Snapshot a displaced queue entry into a historical record.
    pub fn record(entry: &Entry, outcome: PerformanceOutcome, now_ms: i64) -> Self {
        Self {
            id: entry.id,
            name: entry.display_name.clone(),
            media_id: entry.media_id.clone(),
            title: entry.title.clone(),
            performed_at_ms: now_ms,
            vote_total: entry.vote_total,
            outcome,
        }
    }
}

/// Aggregated statistics for one singer, case-insensitive by name.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SingerHistory {
    /// Name the history was requested for.
    pub name: String,
    /// Number of completed performances.
    pub songs_completed: usize,
    /// Number of skipped performances (by singer or admin).
    pub songs_skipped: usize,
    /// Sum of vote totals over completed performances.
    pub total_votes: i64,
    /// First completed performance timestamp, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_performed_at_ms: Option<i64>,
    /// Most recent completed performance timestamp, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_performed_at_ms: Option<i64>,
    /// Completed performances, most recent first.
    pub performances: Vec<Performance>,
}

/// Aggregate a singer's history from the room's performance log.
pub fn singer_history(performances: &[Performance], name: &str) -> SingerHistory {
    let wanted = normalize_name(name);
    let mut completed: Vec<Performance> = Vec::new();
    let mut skipped = 0usize;

    for record in performances {
        if normalize_name(&record.name) != wanted {
            continue;
        }
        match record.outcome {
            PerformanceOutcome::Completed => completed.push(record.clone()),
            PerformanceOutcome::SkippedBySinger | PerformanceOutcome::SkippedByAdmin => {
                skipped += 1;
            }
            PerformanceOutcome::Errored { .. } => {}
        }
    }

    let total_votes = completed.iter().map(|record| record.vote_total).sum();
    let first = completed.iter().map(|r| r.performed_at_ms).min();
    let last = completed.iter().map(|r| r.performed_at_ms).max();
    completed.sort_by_key(|record| std::cmp::Reverse(record.performed_at_ms));

    SingerHistory {
        name: name.trim().to_string(),
        songs_completed: completed.len(),
        songs_skipped: skipped,
        total_votes,
        first_performed_at_ms: first,
        last_performed_at_ms: last,
        performances: completed,
    }
}

/// One ranked song in the popularity listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PopularSong {
    /// Media identifier of the song.
    pub media_id: String,
    /// Title from the most recent completed performance.
    pub title: String,
    /// Number of completed performances of this song.
    pub play_count: usize,
    /// Most recent completed performance timestamp.
    pub last_performed_at_ms: i64,
}

/// Rank songs by completed play count, most played first. Ties break on the
/// most recent performance. `limit` is clamped into `1..=100`.
pub fn popular_songs(performances: &[Performance], limit: usize) -> Vec<PopularSong> {
    let limit = limit.clamp(1, 100);
    let mut by_media: indexmap::IndexMap<&str, PopularSong> = indexmap::IndexMap::new();

    for record in performances {
        if !matches!(record.outcome, PerformanceOutcome::Completed) {
            continue;
        }
        let slot = by_media
            .entry(record.media_id.as_str())
            .or_insert_with(|| PopularSong {
                media_id: record.media_id.clone(),
                title: record.title.clone(),
                play_count: 0,
                last_performed_at_ms: record.performed_at_ms,
            });
        slot.play_count += 1;
        if record.performed_at_ms >= slot.last_performed_at_ms {
            slot.last_performed_at_ms = record.performed_at_ms;
            slot.title = record.title.clone();
        }
    }

    let mut ranked: Vec<PopularSong> = by_media.into_values().collect();
    ranked.sort_by_key(|song| (std::cmp::Reverse(song.play_count), std::cmp::Reverse(song.last_performed_at_ms)));
    ranked.truncate(limit);
    ranked
}

/// Whether the name has no completed performance yet. Skips and playback
/// errors do not count; the result only drives the claim-your-name prompt.
pub fn is_first_performance(performances: &[Performance], name: &str) -> bool {
    let wanted = normalize_name(name);
    !performances.iter().any(|record| {
        matches!(record.outcome, PerformanceOutcome::Completed)
            && normalize_name(&record.name) == wanted
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perf(name: &str, media: &str, at: i64, votes: i64, outcome: PerformanceOutcome) -> Performance {
        Performance {
            id: Uuid::new_v4(),
            name: name.to_string(),
            media_id: media.to_string(),
            title: format!("title-{media}"),
            performed_at_ms: at,
            vote_total: votes,
            outcome,
        }
    }

    #[test]
    fn claim_and_verify_round_trip() {
        let identity = Identity::claim("  Amy  ", "123456", 1000);
        assert_eq!(identity.normalized_name, "amy");
        assert_ne!(identity.pin_hash, "123456");
        assert!(identity.verify("123456"));
        assert!(!identity.verify("654321"));
    }

    #[test]
    fn claims_use_distinct_salts() {
        let a = Identity::claim("amy", "123456", 0);
        let b = Identity::claim("amy", "123456", 0);
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.pin_hash, b.pin_hash);
    }

    #[test]
    fn history_aggregates_case_insensitively() {
        let log = vec![
            perf("Amy", "m1", 1000, 3, PerformanceOutcome::Completed),
            perf("amy", "m2", 2000, 2, PerformanceOutcome::Completed),
            perf("AMY", "m3", 3000, 0, PerformanceOutcome::SkippedBySinger),
            perf("Bob", "m1", 4000, 9, PerformanceOutcome::Completed),
            perf(
                "amy",
                "m4",
                5000,
                1,
                PerformanceOutcome::Errored { reason: "playback failed".into() },
            ),
        ];

        let history = singer_history(&log, "aMy");
        assert_eq!(history.songs_completed, 2);
        assert_eq!(history.songs_skipped, 1);
        assert_eq!(history.total_votes, 5);
        assert_eq!(history.first_performed_at_ms, Some(1000));
        assert_eq!(history.last_performed_at_ms, Some(2000));
        assert_eq!(history.performances[0].media_id, "m2");
    }

    #[test]
    fn popular_ranks_by_completed_play_count() {
        let log = vec![
            perf("a", "m1", 1000, 0, PerformanceOutcome::Completed),
            perf("b", "m1", 2000, 0, PerformanceOutcome::Completed),
            perf("c", "m2", 3000, 0, PerformanceOutcome::Completed),
            perf("d", "m2", 4000, 0, PerformanceOutcome::SkippedByAdmin),
            perf("e", "m3", 5000, 0, PerformanceOutcome::Completed),
        ];

        let ranked = popular_songs(&log, 10);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].media_id, "m1");
        assert_eq!(ranked[0].play_count, 2);
        // m2 and m3 both have one completed play; the more recent wins.
        assert_eq!(ranked[1].media_id, "m3");

        assert_eq!(popular_songs(&log, 0).len(), 1);
        assert_eq!(popular_songs(&log, 2).len(), 2);
    }

    #[test]
    fn first_performance_ignores_skips_and_errors() {
        let log = vec![
            perf("Amy", "m1", 1000, 0, PerformanceOutcome::SkippedBySinger),
            perf(
                "Amy",
                "m2",
                2000,
                0,
                PerformanceOutcome::Errored { reason: "x".into() },
            ),
        ];
        assert!(is_first_performance(&log, "amy"));

        let mut log = log;
        log.push(perf("AMY", "m3", 3000, 1, PerformanceOutcome::Completed));
        assert!(!is_first_performance(&log, "amy"));
        assert!(is_first_performance(&log, "bob"));
    }
}
