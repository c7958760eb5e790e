//! Durable queue of user submissions awaiting delivery.
//!
//! Entries survive restarts (CBOR blob in the storage capability) and
//! retry with exponential backoff. At most one entry is in flight at a
//! time; the server deduplicates on the idempotency key, so a 409 on
//! retry counts as success.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{OpId, PeakId, TripReportDraft, UnixTimeMs};
use crate::{
    BASE_RETRY_DELAY_MS, JITTER_MAX_MS, MAX_OUTBOX_ENTRIES, MAX_RETRY_ATTEMPTS,
    MAX_RETRY_DELAY_MS,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutboxIntent {
    SubmitTripReport {
        peak_id: PeakId,
        draft: TripReportDraft,
    },
    LogManualSummit {
        peak_id: PeakId,
        summited_at: UnixTimeMs,
        notes: Option<String>,
    },
    #[cfg(feature = "camera")]
    UploadSummitPhoto {
        peak_id: PeakId,
        mime_type: String,
        data: Vec<u8>,
        /// Presigned URL from phase one of the upload, once obtained.
        upload_url: Option<String>,
        photo_id: Option<String>,
    },
    #[cfg(feature = "push")]
    SyncPushToken { token: String },
}

impl OutboxIntent {
    #[must_use]
    pub fn intent_type(&self) -> &'static str {
        match self {
            Self::SubmitTripReport { .. } => "submit_trip_report",
            Self::LogManualSummit { .. } => "log_manual_summit",
            #[cfg(feature = "camera")]
            Self::UploadSummitPhoto { .. } => "upload_summit_photo",
            #[cfg(feature = "push")]
            Self::SyncPushToken { .. } => "sync_push_token",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryState {
    Pending,
    InFlight,
    Completed,
    /// Transient failure, will retry after backoff.
    Failed,
    /// Server told us when to come back.
    RateLimited,
    /// Rejected for good; kept only so the UI can report it.
    PermanentlyFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitError {
    pub message: String,
    pub http_status: Option<u16>,
    pub is_permanent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub op_id: OpId,
    /// Sent as `Idempotency-Key` so retries never double-write.
    pub idempotency_key: String,
    pub intent: OutboxIntent,
    pub retry_state: RetryState,
    pub attempt_count: u32,
    pub created_at: UnixTimeMs,
    pub updated_at: UnixTimeMs,
    pub next_retry_at: Option<UnixTimeMs>,
    pub last_error: Option<SubmitError>,
}

impl OutboxEntry {
    #[must_use]
    pub fn new(intent: OutboxIntent, now: UnixTimeMs) -> Self {
        Self {
            op_id: OpId::generate(),
            idempotency_key: uuid::Uuid::new_v4().to_string(),
            intent,
            retry_state: RetryState::Pending,
            attempt_count: 0,
            created_at: now,
            updated_at: now,
            next_retry_at: None,
            last_error: None,
        }
    }

    #[must_use]
    pub fn is_ready(&self, now: UnixTimeMs) -> bool {
        match self.retry_state {
            RetryState::Pending => true,
            RetryState::Failed | RetryState::RateLimited => {
                self.next_retry_at.map_or(true, |at| at <= now)
            }
            RetryState::InFlight | RetryState::Completed | RetryState::PermanentlyFailed => false,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.retry_state,
            RetryState::Completed | RetryState::PermanentlyFailed
        )
    }

    pub fn mark_in_flight(&mut self, now: UnixTimeMs) {
        self.retry_state = RetryState::InFlight;
        self.attempt_count += 1;
        self.updated_at = now;
    }

    pub fn mark_completed(&mut self, now: UnixTimeMs) {
        self.retry_state = RetryState::Completed;
        self.updated_at = now;
        self.next_retry_at = None;
        self.last_error = None;
    }

    /// Transient failure: schedule the next attempt with backoff, or
    /// give up permanently once attempts run out.
    pub fn mark_failed(&mut self, error: SubmitError, now: UnixTimeMs) {
        self.updated_at = now;
        if error.is_permanent || self.attempt_count >= MAX_RETRY_ATTEMPTS {
            self.retry_state = RetryState::PermanentlyFailed;
            self.next_retry_at = None;
        } else {
            self.retry_state = RetryState::Failed;
            self.next_retry_at =
                Some(now.saturating_add(calculate_retry_delay(self.attempt_count, true)));
        }
        self.last_error = Some(error);
    }

    /// 429: retry when the server says, not on our own schedule. Does
    /// not consume an attempt beyond the one just made.
    pub fn mark_rate_limited(&mut self, retry_after_secs: Option<u64>, now: UnixTimeMs) {
        self.retry_state = RetryState::RateLimited;
        self.updated_at = now;
        let delay_ms = retry_after_secs
            .map_or(MAX_RETRY_DELAY_MS, |s| s.saturating_mul(1000))
            .min(MAX_RETRY_DELAY_MS.saturating_mul(5));
        self.next_retry_at = Some(now.saturating_add(delay_ms));
        self.attempt_count = self.attempt_count.saturating_sub(1);
    }
}

/// Exponential backoff with a cap, plus optional jitter so a burst of
/// queued entries doesn't retry in lockstep.
#[must_use]
pub fn calculate_retry_delay(attempt: u32, with_jitter: bool) -> u64 {
    let exponent = attempt.saturating_sub(1).min(16);
    let base = BASE_RETRY_DELAY_MS
        .saturating_mul(1_u64 << exponent)
        .min(MAX_RETRY_DELAY_MS);
    if with_jitter {
        base.saturating_add(generate_jitter())
    } else {
        base
    }
}

/// Pseudo-random jitter in `[0, JITTER_MAX_MS)` derived from hashing the
/// current time. Not cryptographic, and doesn't need to be.
#[must_use]
fn generate_jitter() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u128(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    );
    hasher.finish() % JITTER_MAX_MS
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OutboxError {
    #[error("outbox is full ({max} entries)")]
    Full { max: usize },
    #[error("duplicate operation {0}")]
    Duplicate(String),
    #[error("codec failure: {0}")]
    Codec(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outbox {
    entries: Vec<OutboxEntry>,
}

impl Outbox {
    pub fn push(&mut self, entry: OutboxEntry) -> Result<(), OutboxError> {
        if self.entries.iter().any(|e| e.op_id == entry.op_id) {
            return Err(OutboxError::Duplicate(entry.op_id.to_string()));
        }
        let live = self.entries.iter().filter(|e| !e.is_terminal()).count();
        if live >= MAX_OUTBOX_ENTRIES {
            return Err(OutboxError::Full {
                max: MAX_OUTBOX_ENTRIES,
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Oldest entry eligible to send. `None` while anything is in
    /// flight: delivery is strictly one at a time.
    #[must_use]
    pub fn next_ready(&self, now: UnixTimeMs) -> Option<&OutboxEntry> {
        if self.has_in_flight() {
            return None;
        }
        self.entries.iter().find(|e| e.is_ready(now))
    }

    #[must_use]
    pub fn entries(&self) -> &[OutboxEntry] {
        &self.entries
    }

    #[must_use]
    pub fn has_in_flight(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.retry_state == RetryState::InFlight)
    }

    #[must_use]
    pub fn get_mut(&mut self, op_id: &OpId) -> Option<&mut OutboxEntry> {
        self.entries.iter_mut().find(|e| &e.op_id == op_id)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_terminal()).count()
    }

    #[must_use]
    pub fn failed_entries(&self) -> Vec<&OutboxEntry> {
        self.entries
            .iter()
            .filter(|e| e.retry_state == RetryState::PermanentlyFailed)
            .collect()
    }

    /// Drop completed entries; they have no further use.
    pub fn gc(&mut self) {
        self.entries
            .retain(|e| e.retry_state != RetryState::Completed);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// An entry restored mid-flight was interrupted by a shutdown; put
    /// it back in the queue.
    pub fn recover_interrupted(&mut self) {
        for entry in &mut self.entries {
            if entry.retry_state == RetryState::InFlight {
                entry.retry_state = RetryState::Pending;
            }
        }
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, OutboxError> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| OutboxError::Codec(e.to_string()))?;
        Ok(buf)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, OutboxError> {
        ciborium::de::from_reader(bytes).map_err(|e| OutboxError::Codec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent() -> OutboxIntent {
        OutboxIntent::LogManualSummit {
            peak_id: PeakId::from("p1"),
            summited_at: UnixTimeMs(1_700_000_000_000),
            notes: None,
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(calculate_retry_delay(1, false), BASE_RETRY_DELAY_MS);
        assert_eq!(calculate_retry_delay(2, false), BASE_RETRY_DELAY_MS * 2);
        assert_eq!(calculate_retry_delay(3, false), BASE_RETRY_DELAY_MS * 4);
        assert_eq!(calculate_retry_delay(10, false), MAX_RETRY_DELAY_MS);
        assert_eq!(calculate_retry_delay(60, false), MAX_RETRY_DELAY_MS);

        let with_jitter = calculate_retry_delay(1, true);
        assert!(with_jitter >= BASE_RETRY_DELAY_MS);
        assert!(with_jitter < BASE_RETRY_DELAY_MS + JITTER_MAX_MS);
    }

    #[test]
    fn lifecycle_pending_to_completed() {
        let now = UnixTimeMs(1_000);
        let mut entry = OutboxEntry::new(intent(), now);
        assert!(entry.is_ready(now));

        entry.mark_in_flight(now);
        assert_eq!(entry.attempt_count, 1);
        assert!(!entry.is_ready(now));

        entry.mark_completed(UnixTimeMs(2_000));
        assert!(entry.is_terminal());
    }

    #[test]
    fn failure_schedules_backoff_then_gives_up() {
        let mut now = UnixTimeMs(1_000);
        let mut entry = OutboxEntry::new(intent(), now);

        let transient = SubmitError {
            message: "503".into(),
            http_status: Some(503),
            is_permanent: false,
        };

        for _ in 0..MAX_RETRY_ATTEMPTS {
            entry.mark_in_flight(now);
            entry.mark_failed(transient.clone(), now);
            if entry.retry_state == RetryState::Failed {
                let at = entry.next_retry_at.unwrap();
                assert!(at > now);
                assert!(!entry.is_ready(now));
                assert!(entry.is_ready(at));
                now = at;
            }
        }
        assert_eq!(entry.retry_state, RetryState::PermanentlyFailed);
        assert!(!entry.is_ready(UnixTimeMs(u64::MAX)));
    }

    #[test]
    fn permanent_error_fails_immediately() {
        let now = UnixTimeMs(1_000);
        let mut entry = OutboxEntry::new(intent(), now);
        entry.mark_in_flight(now);
        entry.mark_failed(
            SubmitError {
                message: "422".into(),
                http_status: Some(422),
                is_permanent: true,
            },
            now,
        );
        assert_eq!(entry.retry_state, RetryState::PermanentlyFailed);
    }

    #[test]
    fn rate_limit_honors_retry_after() {
        let now = UnixTimeMs(1_000);
        let mut entry = OutboxEntry::new(intent(), now);
        entry.mark_in_flight(now);
        entry.mark_rate_limited(Some(30), now);

        assert_eq!(entry.retry_state, RetryState::RateLimited);
        assert_eq!(entry.next_retry_at, Some(UnixTimeMs(31_000)));
        // The rate-limited attempt is not held against the entry.
        assert_eq!(entry.attempt_count, 0);
        assert!(!entry.is_ready(UnixTimeMs(30_000)));
        assert!(entry.is_ready(UnixTimeMs(31_000)));
    }

    #[test]
    fn queue_is_bounded_and_serial() {
        let now = UnixTimeMs(1_000);
        let mut outbox = Outbox::default();
        for _ in 0..MAX_OUTBOX_ENTRIES {
            outbox.push(OutboxEntry::new(intent(), now)).unwrap();
        }
        assert!(matches!(
            outbox.push(OutboxEntry::new(intent(), now)),
            Err(OutboxError::Full { .. })
        ));

        // One in flight blocks everything else.
        let first_id = outbox.next_ready(now).unwrap().op_id.clone();
        outbox.get_mut(&first_id).unwrap().mark_in_flight(now);
        assert!(outbox.next_ready(now).is_none());

        outbox
            .get_mut(&first_id)
            .unwrap()
            .mark_completed(UnixTimeMs(2_000));
        assert!(outbox.next_ready(now).is_some());

        // Completed entries free capacity.
        outbox.gc();
        assert_eq!(outbox.pending_count(), MAX_OUTBOX_ENTRIES - 1);
        outbox.push(OutboxEntry::new(intent(), now)).unwrap();
    }

    #[test]
    fn duplicate_op_ids_rejected() {
        let now = UnixTimeMs(1_000);
        let mut outbox = Outbox::default();
        let entry = OutboxEntry::new(intent(), now);
        outbox.push(entry.clone()).unwrap();
        assert!(matches!(
            outbox.push(entry),
            Err(OutboxError::Duplicate(_))
        ));
    }

    #[test]
    fn cbor_round_trip_and_recovery() {
        let now = UnixTimeMs(1_000);
        let mut outbox = Outbox::default();
        let mut entry = OutboxEntry::new(
            OutboxIntent::SubmitTripReport {
                peak_id: PeakId::from("p1"),
                draft: TripReportDraft {
                    text: "Icy near the summit".into(),
                    rating: Some(3),
                    hiked_on: Some(now),
                },
            },
            now,
        );
        entry.mark_in_flight(now);
        outbox.push(entry).unwrap();

        let bytes = outbox.to_cbor().unwrap();
        let mut restored = Outbox::from_cbor(&bytes).unwrap();
        assert_eq!(restored, outbox);

        // An in-flight entry from a previous run goes back to pending.
        restored.recover_interrupted();
        assert!(restored.next_ready(now).is_some());
    }
}
