//! Pure queue algebra: entry construction, ordering, voting, advancement and
//! positional reordering. No I/O happens here; the coordinator owns the
//! buffers and persists the results.

use std::cmp::Reverse;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Display names longer than this are truncated at construction.
pub const MAX_NAME_CHARS: usize = 30;
/// Titles longer than this are truncated at construction.
pub const MAX_TITLE_CHARS: usize = 100;
/// Version tag written into every freshly persisted queue state.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// One queued performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Stable identifier for the entry.
    pub id: Uuid,
    /// Singer display name as it should be shown (already clamped).
    pub display_name: String,
    /// Identifier of the media to play, opaque to the coordinator.
    pub media_id: String,
    /// Song title (already clamped).
    pub title: String,
    /// Media source tag (e.g. `youtube`).
    pub source: String,
    /// Signed sum of all per-voter directions recorded for this entry.
    pub vote_total: i64,
    /// Priority tier assigned at join time; lower sorts first.
    pub order_epoch: u64,
    /// Join timestamp in Unix epoch milliseconds; effectively unique.
    pub joined_at_ms: i64,
    /// Owning user account, present in contribution-scoped rooms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_user_id: Option<String>,
}

impl Entry {
    /// Build a new entry with clamped inputs and votes forced to zero.
    ///
    /// Malformed content is clamped rather than rejected; validation of
    /// whether the entry may join at all happens one layer up.
    pub fn new(
        name: &str,
        media_id: &str,
        title: &str,
        source: &str,
        current_epoch: u64,
        now_ms: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: clamp_chars(name.trim(), MAX_NAME_CHARS),
            media_id: media_id.trim().to_string(),
            title: clamp_chars(title.trim(), MAX_TITLE_CHARS),
            source: source.trim().to_string(),
            vote_total: 0,
            order_epoch: current_epoch,
            joined_at_ms: now_ms,
            owner_user_id: None,
        }
    }
}

fn clamp_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Live playback state of a room's queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueState {
    /// Queued entries, kept sorted per the room's active mode.
    pub entries: Vec<Entry>,
    /// Monotonic epoch counter; only ever increases.
    pub current_epoch: u64,
    /// Entry currently being performed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now_playing: Option<Entry>,
    /// Persisted schema generation tag.
    #[serde(default = "current_schema_version")]
    pub schema_version: u32,
}

fn current_schema_version() -> u32 {
    CURRENT_SCHEMA_VERSION
}

impl Default for QueueState {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            current_epoch: 0,
            now_playing: None,
            schema_version: CURRENT_SCHEMA_VERSION,
        }
    }
}

impl QueueState {
    /// Advance the queue: capture the displaced `now_playing`, promote the
    /// head of the (already ordered) queue, and bump the epoch counter.
    ///
    /// The epoch increments exactly once regardless of queue emptiness. The
    /// displaced entry is returned so the caller can archive it.
    pub fn advance(&mut self) -> Option<Entry> {
        let displaced = self.now_playing.take();
        self.now_playing = if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        };
        self.current_epoch += 1;
        displaced
    }

    /// Remove an entry from the queue by id.
    pub fn remove(&mut self, entry_id: Uuid) -> Result<Entry, EntryNotFound> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.id == entry_id)
            .ok_or(EntryNotFound(entry_id))?;
        Ok(self.entries.remove(index))
    }

    /// Check whether `name` may join, comparing case-insensitively against
    /// every queued entry and the current performer.
    pub fn can_join(&self, name: &str) -> Result<(), JoinRejection> {
        let candidate = name.trim().to_lowercase();
        if let Some(playing) = &self.now_playing
            && playing.display_name.to_lowercase() == candidate
        {
            return Err(JoinRejection::NamePlaying);
        }
        if self
            .entries
            .iter()
            .any(|entry| entry.display_name.to_lowercase() == candidate)
        {
            return Err(JoinRejection::NameInQueue);
        }
        Ok(())
    }
}

/// Reason a join attempt is ineligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinRejection {
    /// The name already has a queued entry.
    NameInQueue,
    /// The name is currently performing.
    NamePlaying,
}

/// An entry id that does not exist in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("entry `{0}` not found in queue")]
pub struct EntryNotFound(pub Uuid);

/// Error applying a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VoteError {
    /// Direction outside {-1, 0, 1} cannot be clamped meaningfully.
    #[error("vote direction must be -1, 0 or 1 (got {0})")]
    InvalidDirection(i8),
}

/// Per-entry, per-voter vote ledger. A direction of zero is never stored;
/// it is expressed by deleting the voter's key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoteLedger(pub IndexMap<Uuid, IndexMap<String, i8>>);

impl VoteLedger {
    /// Direction the voter currently has recorded for the entry (0 if none).
    pub fn direction_of(&self, entry_id: Uuid, voter_id: &str) -> i8 {
        self.0
            .get(&entry_id)
            .and_then(|voters| voters.get(voter_id).copied())
            .unwrap_or(0)
    }

    /// Drop every recorded vote for an entry (used when it leaves the queue).
    pub fn clear_entry(&mut self, entry_id: Uuid) {
        self.0.shift_remove(&entry_id);
    }

    /// Signed sum of the currently recorded directions for an entry.
    pub fn signed_sum(&self, entry_id: Uuid) -> i64 {
        self.0
            .get(&entry_id)
            .map(|voters| voters.values().map(|d| i64::from(*d)).sum())
            .unwrap_or(0)
    }
}

/// Apply a vote to an entry, updating the ledger and the aggregated total.
///
/// The new total is `previous_total - previous_direction + direction`, so
/// re-applying the same direction is a no-op and flipping a vote applies the
/// full delta. Direction 0 retracts the vote. Returns the new total.
pub fn apply_vote(
    entry: &mut Entry,
    ledger: &mut VoteLedger,
    voter_id: &str,
    direction: i8,
) -> Result<i64, VoteError> {
    if !(-1..=1).contains(&direction) {
        return Err(VoteError::InvalidDirection(direction));
    }

    let voters = ledger.0.entry(entry.id).or_default();
    let previous = voters.get(voter_id).copied().unwrap_or(0);
    if direction == 0 {
        voters.shift_remove(voter_id);
    } else {
        voters.insert(voter_id.to_string(), direction);
    }
    if ledger.0.get(&entry.id).is_some_and(IndexMap::is_empty) {
        ledger.0.shift_remove(&entry.id);
    }

    entry.vote_total = entry.vote_total - i64::from(previous) + i64::from(direction);
    Ok(entry.vote_total)
}

/// Primary (name-scoped) ordering: epoch ascending, then votes descending,
/// then join time ascending. Total because join times are effectively unique.
pub fn sort_queue(entries: &mut [Entry]) {
    entries.sort_by_key(|entry| (entry.order_epoch, Reverse(entry.vote_total), entry.joined_at_ms));
}

/// Vote-first (contribution-scoped) ordering: ignores epochs entirely.
pub fn sort_by_votes(entries: &mut [Entry]) {
    entries.sort_by_key(|entry| (Reverse(entry.vote_total), entry.joined_at_ms));
}

/// Move an entry to `target_index` (clamped into `[0, len]`) and rebase its
/// sort keys so the next sort reproduces the requested position.
///
/// The sort key, not the array index, is the source of truth: the moved
/// entry takes its new predecessor's epoch and a join timestamp one past it,
/// or, when placed first, its new successor's epoch and a timestamp one
/// before it.
pub fn reorder(
    queue: &mut Vec<Entry>,
    entry_id: Uuid,
    target_index: usize,
) -> Result<(), EntryNotFound> {
    let index = queue
        .iter()
        .position(|entry| entry.id == entry_id)
        .ok_or(EntryNotFound(entry_id))?;
    let mut moved = queue.remove(index);
    let target = target_index.min(queue.len());

    if target == 0 {
        if let Some(successor) = queue.first() {
            moved.order_epoch = successor.order_epoch;
            moved.joined_at_ms = successor.joined_at_ms - 1;
        }
    } else {
        let predecessor = &queue[target - 1];
        moved.order_epoch = predecessor.order_epoch;
        moved.joined_at_ms = predecessor.joined_at_ms + 1;
    }

    queue.insert(target, moved);
    Ok(())
}

/// Estimate the one-way clock offset between server and client from a single
/// round trip: `server − client − rtt/2`.
pub fn clock_offset(server_time_ms: i64, client_time_ms: i64, round_trip_ms: i64) -> i64 {
    server_time_ms - client_time_ms - round_trip_ms / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, epoch: u64, votes: i64, joined_at: i64) -> Entry {
        let mut entry = Entry::new(name, "m1", "title", "youtube", epoch, joined_at);
        entry.vote_total = votes;
        entry
    }

    #[test]
    fn new_entry_clamps_name_and_title() {
        let long_name = "x".repeat(80);
        let long_title = "y".repeat(400);
        let entry = Entry::new(&format!("  {long_name}  "), "m", &long_title, "youtube", 2, 5);
        assert_eq!(entry.display_name.chars().count(), MAX_NAME_CHARS);
        assert_eq!(entry.title.chars().count(), MAX_TITLE_CHARS);
        assert_eq!(entry.vote_total, 0);
        assert_eq!(entry.order_epoch, 2);
    }

    #[test]
    fn sort_queue_orders_epoch_votes_joined() {
        let bob = entry("Bob", 0, 0, 1000);
        let amy = entry("Amy", 0, 5, 2000);

        let mut single = vec![bob.clone()];
        sort_queue(&mut single);
        assert_eq!(single[0].display_name, "Bob");

        // Votes dominate the epoch tie even though Amy joined later.
        let mut queue = vec![bob.clone(), amy.clone()];
        sort_queue(&mut queue);
        assert_eq!(queue[0].display_name, "Amy");
        assert_eq!(queue[1].display_name, "Bob");

        // Sorting only rearranges, never rewrites.
        assert_eq!(queue[0], amy);
        assert_eq!(queue[1], bob);
    }

    #[test]
    fn sort_queue_epoch_dominates_votes() {
        let mut queue = vec![entry("late", 1, 100, 1000), entry("early", 0, 0, 2000)];
        sort_queue(&mut queue);
        assert_eq!(queue[0].display_name, "early");
    }

    #[test]
    fn sort_by_votes_ignores_epoch() {
        let mut queue = vec![entry("a", 0, 1, 1000), entry("b", 9, 7, 2000)];
        sort_by_votes(&mut queue);
        assert_eq!(queue[0].display_name, "b");
    }

    #[test]
    fn can_join_is_case_insensitive() {
        let mut state = QueueState::default();
        state.entries.push(entry("Bob", 0, 0, 1000));
        assert_eq!(state.can_join("  bOB "), Err(JoinRejection::NameInQueue));

        state.now_playing = Some(entry("Amy", 0, 0, 500));
        assert_eq!(state.can_join("AMY"), Err(JoinRejection::NamePlaying));
        assert_eq!(state.can_join("Carol"), Ok(()));
    }

    #[test]
    fn apply_vote_delta_and_retraction() {
        let mut ledger = VoteLedger::default();
        let mut target = entry("Bob", 0, 0, 1000);

        assert_eq!(apply_vote(&mut target, &mut ledger, "v1", 1), Ok(1));
        assert_eq!(ledger.direction_of(target.id, "v1"), 1);

        // Flipping applies the full delta of -2, not an additive -1.
        assert_eq!(apply_vote(&mut target, &mut ledger, "v1", -1), Ok(-1));

        // Re-applying the same direction is a no-op on the total.
        assert_eq!(apply_vote(&mut target, &mut ledger, "v1", -1), Ok(-1));

        // Direction 0 deletes the ledger key rather than storing a zero.
        assert_eq!(apply_vote(&mut target, &mut ledger, "v1", 0), Ok(0));
        assert_eq!(ledger.direction_of(target.id, "v1"), 0);
        assert!(ledger.0.get(&target.id).is_none());
    }

    #[test]
    fn apply_vote_conserves_signed_sum() {
        let mut ledger = VoteLedger::default();
        let mut target = entry("Bob", 0, 0, 1000);
        for (voter, direction) in [("a", 1), ("b", 1), ("c", -1), ("a", -1), ("b", 0)] {
            apply_vote(&mut target, &mut ledger, voter, direction).unwrap();
            assert_eq!(target.vote_total, ledger.signed_sum(target.id));
        }
        assert_eq!(target.vote_total, -2);
    }

    #[test]
    fn apply_vote_rejects_out_of_range_direction() {
        let mut ledger = VoteLedger::default();
        let mut target = entry("Bob", 0, 0, 1000);
        assert_eq!(
            apply_vote(&mut target, &mut ledger, "v1", 2),
            Err(VoteError::InvalidDirection(2))
        );
        assert_eq!(target.vote_total, 0);
    }

    #[test]
    fn advance_increments_epoch_and_returns_displaced() {
        let mut state = QueueState::default();
        state.now_playing = Some(entry("Amy", 0, 0, 500));
        state.entries.push(entry("Bob", 0, 0, 1000));

        let displaced = state.advance();
        assert_eq!(displaced.unwrap().display_name, "Amy");
        assert_eq!(state.now_playing.as_ref().unwrap().display_name, "Bob");
        assert_eq!(state.current_epoch, 1);

        // Advancing an empty queue still bumps the epoch by exactly one.
        let displaced = state.advance();
        assert_eq!(displaced.unwrap().display_name, "Bob");
        assert!(state.now_playing.is_none());
        assert_eq!(state.current_epoch, 2);

        assert!(state.advance().is_none());
        assert_eq!(state.current_epoch, 3);
    }

    #[test]
    fn remove_signals_not_found() {
        let mut state = QueueState::default();
        let queued = entry("Bob", 0, 0, 1000);
        let id = queued.id;
        state.entries.push(queued);

        assert!(state.remove(Uuid::new_v4()).is_err());
        assert_eq!(state.remove(id).unwrap().display_name, "Bob");
        assert!(state.entries.is_empty());
    }

    #[test]
    fn reorder_to_front_rebases_before_successor() {
        let e1 = entry("e1", 0, 0, 1000);
        let e2 = entry("e2", 1, 0, 2000);
        let e3 = entry("e3", 2, 0, 3000);
        let e3_id = e3.id;
        let mut queue = vec![e1, e2, e3];

        reorder(&mut queue, e3_id, 0).unwrap();
        assert_eq!(queue[0].id, e3_id);
        assert_eq!(queue[0].order_epoch, 0);
        assert_eq!(queue[0].joined_at_ms, 999);
    }

    #[test]
    fn reorder_after_predecessor_rebases_past_it() {
        let e1 = entry("e1", 0, 0, 1000);
        let e2 = entry("e2", 1, 0, 2000);
        let e3 = entry("e3", 2, 0, 3000);
        let e3_id = e3.id;
        let mut queue = vec![e1, e2, e3];

        reorder(&mut queue, e3_id, 1).unwrap();
        assert_eq!(queue[1].id, e3_id);
        assert_eq!(queue[1].order_epoch, 0);
        assert_eq!(queue[1].joined_at_ms, 1001);
    }

    #[test]
    fn reorder_round_trips_through_sort() {
        let entries: Vec<Entry> = (0..4)
            .map(|i| entry(&format!("s{i}"), i as u64, 0, 1000 * (i + 1) as i64))
            .collect();

        for target in 0..4 {
            let mut queue = entries.clone();
            let moved_id = queue[3].id;
            reorder(&mut queue, moved_id, target).unwrap();
            sort_queue(&mut queue);
            let position = queue.iter().position(|e| e.id == moved_id).unwrap();
            assert_eq!(position, target, "sort must reproduce requested position");
        }
    }

    #[test]
    fn reorder_clamps_out_of_range_target() {
        let e1 = entry("e1", 0, 0, 1000);
        let e2 = entry("e2", 1, 0, 2000);
        let e1_id = e1.id;
        let mut queue = vec![e1, e2];

        reorder(&mut queue, e1_id, 99).unwrap();
        assert_eq!(queue[1].id, e1_id);
        assert_eq!(queue[1].order_epoch, 1);
        assert_eq!(queue[1].joined_at_ms, 2001);
    }

    #[test]
    fn clock_offset_from_round_trip() {
        // Server 120ms ahead, 40ms round trip observed by the client.
        assert_eq!(clock_offset(10_120, 10_000, 40), 100);
        assert_eq!(clock_offset(10_000, 10_120, 40), -140);
    }
}
