//! In-memory retry queue with exponential backoff.
//!
//! Entry lifecycle:
//!
//! ```text
//! pending --success--> done
//! pending --failure--> retry(1) --failure--> retry(2) --failure--> retry(3) --failure--> dead letter
//! ```
//!
//! Nothing here is persisted; entries vanish with the process.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::events::Notification;
use super::routing::Channel;

/// Backoff schedule and retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: std::time::Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: std::time::Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt once `attempts` retries have failed:
    /// `base_delay * 2^attempts`.
    pub fn backoff(&self, attempts: u32) -> std::time::Duration {
        let factor = 2u32.saturating_pow(attempts);
        self.base_delay.saturating_mul(factor)
    }

    /// Instant of the next attempt.
    pub fn next_retry_at(&self, now: DateTime<Utc>, attempts: u32) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.backoff(attempts))
            .unwrap_or(chrono::Duration::MAX);
        now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// A failed delivery awaiting another attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryEntry {
    pub id: u64,
    pub channel: Channel,
    pub notification: Arc<Notification>,
    /// Retries already attempted and failed.
    pub attempts: u32,
    pub next_retry_at: DateTime<Utc>,
    pub last_error: String,
    pub enqueued_at: DateTime<Utc>,
}

impl RetryEntry {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at <= now
    }
}

/// What happened to an entry after a failed retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Reschedule(DateTime<Utc>),
    Exhausted,
}

/// Terminal failure record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: u64,
    pub notification_id: String,
    pub channel: Channel,
    pub attempts: u32,
    pub error: String,
    pub created_at: DateTime<Utc>,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn from_entry(id: u64, entry: &RetryEntry, now: DateTime<Utc>) -> Self {
        Self {
            id,
            notification_id: entry.notification.id.clone(),
            channel: entry.channel.clone(),
            attempts: entry.attempts,
            error: entry.last_error.clone(),
            created_at: entry.notification.created_at,
            dead_lettered_at: now,
        }
    }
}

/// Result of [`RetryQueue::record_failure`].
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub decision: RetryDecision,
    pub entry: RetryEntry,
    /// Oldest entry dropped to make room for the requeue.
    pub evicted: Option<RetryEntry>,
}

/// Bounded queue of [`RetryEntry`] values.
///
/// Entries handed out by [`take_due`](Self::take_due) count as in flight
/// until they are requeued through [`record_failure`](Self::record_failure)
/// or released through [`settle`](Self::settle).
#[derive(Debug)]
pub struct RetryQueue {
    policy: RetryPolicy,
    max_size: usize,
    next_id: u64,
    entries: VecDeque<RetryEntry>,
    in_flight: usize,
}

impl RetryQueue {
    pub fn new(policy: RetryPolicy, max_size: usize) -> Self {
        Self {
            policy,
            max_size: max_size.max(1),
            next_id: 1,
            entries: VecDeque::new(),
            in_flight: 0,
        }
    }

    /// Make room for one entry, returning the oldest one if it had to go.
    fn evict_if_full(&mut self) -> Option<RetryEntry> {
        if self.entries.len() < self.max_size {
            return None;
        }
        let oldest = self.entries.pop_front();
        if let Some(oldest) = &oldest {
            warn!(
                "Retry queue full, dropping oldest entry {} ({} -> {})",
                oldest.notification.id, oldest.channel.kind, oldest.channel.target
            );
        }
        oldest
    }

    /// Queue a first retry for a failed delivery.
    ///
    /// When the queue is full the oldest entry is dropped and returned.
    pub fn enqueue(
        &mut self,
        channel: Channel,
        notification: Arc<Notification>,
        error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> (RetryEntry, Option<RetryEntry>) {
        let evicted = self.evict_if_full();

        let entry = RetryEntry {
            id: self.next_id,
            channel,
            notification,
            attempts: 0,
            next_retry_at: self.policy.next_retry_at(now, 0),
            last_error: error.into(),
            enqueued_at: now,
        };
        self.next_id += 1;
        self.entries.push_back(entry.clone());
        (entry, evicted)
    }

    /// Remove and return every entry due at `now`, oldest first.
    ///
    /// The returned entries stay counted by [`outstanding`](Self::outstanding)
    /// until the caller reports back on each of them.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<RetryEntry> {
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.entries.drain(..).partition(|e| e.is_due(now));
        self.entries = waiting.into();
        self.in_flight += due.len();
        due
    }

    /// Record a failed retry on an entry obtained from `take_due`.
    ///
    /// The entry is put back when budget remains, evicting the oldest
    /// waiting entry if the queue filled up meanwhile. An exhausted entry
    /// is not requeued and the caller must dead-letter it.
    pub fn record_failure(
        &mut self,
        mut entry: RetryEntry,
        error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> FailureRecord {
        self.in_flight = self.in_flight.saturating_sub(1);
        entry.attempts += 1;
        entry.last_error = error.into();

        if entry.attempts >= self.policy.max_attempts {
            return FailureRecord {
                decision: RetryDecision::Exhausted,
                entry,
                evicted: None,
            };
        }

        entry.next_retry_at = self.policy.next_retry_at(now, entry.attempts);
        let evicted = self.evict_if_full();
        self.entries.push_back(entry.clone());
        FailureRecord {
            decision: RetryDecision::Reschedule(entry.next_retry_at),
            entry,
            evicted,
        }
    }

    /// Release an entry obtained from `take_due` that will not be requeued.
    pub fn settle(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Entries waiting in the queue.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries being retried right now.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Waiting plus in-flight entries.
    pub fn outstanding(&self) -> usize {
        self.entries.len() + self.in_flight
    }

    /// Earliest scheduled retry, if any.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().map(|e| e.next_retry_at).min()
    }

    pub fn entries(&self) -> Vec<RetryEntry> {
        self.entries.iter().cloned().collect()
    }
}
