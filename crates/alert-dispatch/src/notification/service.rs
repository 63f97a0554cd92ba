//! Notification dispatcher.
//!
//! The dispatcher is responsible for:
//! - Deriving a priority and channel set for each error report
//! - Delivering to every selected channel concurrently
//! - Enforcing per-channel send quotas
//! - Retrying failed deliveries with exponential backoff
//! - Keeping a bounded history and a dead letter list

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::channels::{ChannelConfig, DeliveryReceipt, NotificationChannel};
use super::events::{AnalysisResult, ErrorEvent, Notification, Priority};
use super::priority::determine_priority;
use super::rate_limit::{MAX_RATE_WINDOW_SECS, RateLimitConfig, RateLimiter};
use super::retry::{DeadLetter, RetryDecision, RetryEntry, RetryPolicy, RetryQueue};
use super::routing::{Channel, ChannelKind, select_channels};
use crate::clock::{Clock, SystemClock};
use crate::{Error, Result};

/// Configuration for the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Whether dispatching is enabled.
    pub enabled: bool,
    /// Delay before the first retry, doubled on every further failure.
    pub retry_base_delay_secs: u64,
    /// Failed retries before an entry is dead-lettered.
    pub max_retry_attempts: u32,
    /// Period of the background retry sweep.
    pub retry_interval_secs: u64,
    /// Upper bound on a single channel send.
    pub send_timeout_secs: u64,
    /// Maximum retry queue size.
    pub max_queue_size: usize,
    /// Notifications (and dead letters) kept for stats.
    pub history_limit: usize,
    /// Per-channel send quotas.
    pub rate_limits: RateLimitConfig,
    /// Channel configurations.
    pub channels: Vec<ChannelConfig>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retry_base_delay_secs: 30,
            max_retry_attempts: 3,
            retry_interval_secs: 30,
            send_timeout_secs: 10,
            max_queue_size: 1000,
            history_limit: 1000,
            rate_limits: RateLimitConfig::default(),
            channels: Vec::new(),
        }
    }
}

impl DispatcherConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_secs(self.retry_base_delay_secs),
            max_attempts: self.max_retry_attempts,
        }
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs.max(1))
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs.max(1))
    }

    /// Reject settings the dispatcher cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_retry_attempts == 0 {
            return Err(Error::validation("max_retry_attempts must be at least 1"));
        }
        if self.max_queue_size == 0 {
            return Err(Error::validation("max_queue_size must be at least 1"));
        }
        if self.history_limit == 0 {
            return Err(Error::validation("history_limit must be at least 1"));
        }
        for kind in ChannelKind::ALL {
            let limit = self.rate_limits.limit_for(kind);
            if limit.calls == 0 || limit.window_secs == 0 {
                return Err(Error::validation(format!(
                    "rate limit for {kind} must allow at least one call per non-empty window"
                )));
            }
            if limit.window_secs > MAX_RATE_WINDOW_SECS {
                return Err(Error::validation(format!(
                    "rate limit window for {kind} exceeds {MAX_RATE_WINDOW_SECS} seconds"
                )));
            }
        }
        for channel in &self.channels {
            channel.validate()?;
            // A request that outlives the send timeout gets the delivery
            // retried even though the provider may still accept it.
            if channel.is_enabled() && channel.timeout_secs() >= self.send_timeout().as_secs() {
                return Err(Error::validation(format!(
                    "{} channel timeout_secs ({}) must be below send_timeout_secs ({})",
                    channel.kind(),
                    channel.timeout_secs(),
                    self.send_timeout().as_secs()
                )));
            }
        }
        Ok(())
    }
}

/// Result of one channel attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Accepted by the provider.
    Delivered { receipt: DeliveryReceipt },
    /// Failed; a retry is queued.
    RetryScheduled {
        error: String,
        next_retry_at: DateTime<Utc>,
    },
    /// Failed in a way retrying cannot fix (missing credentials, unknown target).
    Rejected { error: String },
}

/// Per-channel delivery record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub channel: ChannelKind,
    pub target: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: DeliveryOutcome,
}

impl DeliveryReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, DeliveryOutcome::Delivered { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            DeliveryOutcome::Delivered { .. } => None,
            DeliveryOutcome::RetryScheduled { error, .. } | DeliveryOutcome::Rejected { error } => {
                Some(error)
            }
        }
    }
}

/// Everything that happened during one `dispatch` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReport {
    pub notification: Arc<Notification>,
    /// One entry per selected channel, in channel order.
    pub deliveries: Vec<DeliveryReport>,
}

impl DispatchReport {
    pub fn all_delivered(&self) -> bool {
        self.deliveries.iter().all(DeliveryReport::is_success)
    }

    /// Deliveries that failed without a retry being queued.
    pub fn hard_errors(&self) -> Vec<&DeliveryReport> {
        self.deliveries
            .iter()
            .filter(|d| matches!(d.outcome, DeliveryOutcome::Rejected { .. }))
            .collect()
    }
}

/// Dispatcher lifecycle events, broadcast to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchEvent {
    Delivered {
        notification_id: String,
        channel: Channel,
        /// 0 for the initial dispatch, n for the n-th retry.
        retry: u32,
    },
    RetryScheduled {
        notification_id: String,
        channel: Channel,
        attempts: u32,
        next_retry_at: DateTime<Utc>,
        error: String,
    },
    PermanentlyFailed(DeadLetter),
}

/// Outcome counts for one retry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySweepSummary {
    pub attempted: usize,
    pub delivered: usize,
    pub rescheduled: usize,
    pub dead_lettered: usize,
}

/// Statistics about the dispatcher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationStats {
    /// Notifications in history.
    pub total: usize,
    /// Selected channel count per kind, over history.
    pub by_channel: BTreeMap<ChannelKind, usize>,
    /// Notification count per priority, over history.
    pub by_priority: BTreeMap<Priority, usize>,
    /// Retries queued or in flight.
    pub pending_retries: usize,
    /// Terminal failures recorded.
    pub dead_letters: usize,
    /// Channel kinds with an adapter registered.
    pub channel_count: usize,
}

/// The notification dispatcher.
pub struct NotificationDispatcher {
    config: DispatcherConfig,
    clock: Arc<dyn Clock>,
    channels: DashMap<ChannelKind, Arc<dyn NotificationChannel>>,
    rate_limiter: Mutex<RateLimiter>,
    retry_queue: Mutex<RetryQueue>,
    history: Mutex<VecDeque<Arc<Notification>>>,
    dead_letters: Mutex<VecDeque<DeadLetter>>,
    next_dead_letter_id: AtomicU64,
    event_tx: broadcast::Sender<DispatchEvent>,
    cancellation_token: CancellationToken,
}

impl NotificationDispatcher {
    /// Create a dispatcher with default configuration and no channels.
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    /// Create a dispatcher on the wall clock.
    pub fn with_config(config: DispatcherConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a dispatcher with an explicit time source.
    pub fn with_clock(config: DispatcherConfig, clock: Arc<dyn Clock>) -> Self {
        let (event_tx, _) = broadcast::channel(256);

        let dispatcher = Self {
            clock,
            channels: DashMap::new(),
            rate_limiter: Mutex::new(RateLimiter::new(config.rate_limits.clone())),
            retry_queue: Mutex::new(RetryQueue::new(
                config.retry_policy(),
                config.max_queue_size,
            )),
            history: Mutex::new(VecDeque::new()),
            dead_letters: Mutex::new(VecDeque::new()),
            next_dead_letter_id: AtomicU64::new(1),
            event_tx,
            cancellation_token: CancellationToken::new(),
            config,
        };

        dispatcher.init_channels();
        dispatcher
    }

    /// Initialize channels from configuration.
    fn init_channels(&self) {
        for channel_config in &self.config.channels {
            if !channel_config.is_enabled() {
                continue;
            }
            let channel = channel_config.build();
            if channel.is_enabled() {
                self.register_channel(channel);
            } else {
                warn!(
                    "{} channel enabled but incomplete, deliveries to it will be rejected",
                    channel_config.kind()
                );
            }
        }

        info!(
            "Notification dispatcher initialized with {} channels",
            self.channels.len()
        );
    }

    /// Register (or replace) the adapter for its channel kind.
    pub fn register_channel(&self, channel: Arc<dyn NotificationChannel>) {
        let kind = channel.kind();
        if self.channels.insert(kind, channel).is_some() {
            debug!("Replaced {} channel adapter", kind);
        } else {
            info!("Registered {} channel adapter", kind);
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Subscribe to dispatch events.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.event_tx.subscribe()
    }

    /// Send an error report to every channel its priority selects.
    ///
    /// Channel attempts run concurrently and are isolated from each other.
    /// Only fails when dispatching is disabled; per-channel failures are in
    /// the returned report.
    pub async fn dispatch(
        &self,
        error: ErrorEvent,
        analysis: AnalysisResult,
    ) -> Result<DispatchReport> {
        if !self.config.enabled {
            return Err(Error::Disabled);
        }

        let priority = determine_priority(&error, &analysis);
        let channels = select_channels(priority);
        let notification = Arc::new(Notification::new(
            error,
            analysis,
            priority,
            channels,
            self.clock.now(),
        ));

        info!(
            "Dispatching notification {} ({}) to {} channels",
            notification.id,
            priority,
            notification.channels.len()
        );

        let deliveries = join_all(
            notification
                .channels
                .iter()
                .map(|channel| self.deliver_initial(channel, &notification)),
        )
        .await;

        self.record_history(notification.clone());

        Ok(DispatchReport {
            notification,
            deliveries,
        })
    }

    async fn deliver_initial(
        &self,
        channel: &Channel,
        notification: &Arc<Notification>,
    ) -> DeliveryReport {
        let result = self.attempt(channel, notification).await;
        let timestamp = self.clock.now();

        let outcome = match result {
            Ok(receipt) => {
                debug!(
                    "Notification {} sent via {} to {}",
                    notification.id, channel.kind, channel.target
                );
                self.emit(DispatchEvent::Delivered {
                    notification_id: notification.id.clone(),
                    channel: channel.clone(),
                    retry: 0,
                });
                DeliveryOutcome::Delivered { receipt }
            }
            Err(e) if e.is_retryable() => {
                warn!(
                    "Failed to send notification {} to {} ({}): {}",
                    notification.id, channel.kind, channel.target, e
                );
                let (entry, evicted) = self.retry_queue.lock().enqueue(
                    channel.clone(),
                    Arc::clone(notification),
                    e.to_string(),
                    timestamp,
                );
                if let Some(evicted) = evicted {
                    self.dead_letter(evicted, timestamp);
                }
                self.emit(DispatchEvent::RetryScheduled {
                    notification_id: notification.id.clone(),
                    channel: channel.clone(),
                    attempts: entry.attempts,
                    next_retry_at: entry.next_retry_at,
                    error: e.to_string(),
                });
                DeliveryOutcome::RetryScheduled {
                    error: e.to_string(),
                    next_retry_at: entry.next_retry_at,
                }
            }
            Err(e) => {
                warn!(
                    "Notification {} rejected by {} ({}): {}",
                    notification.id, channel.kind, channel.target, e
                );
                DeliveryOutcome::Rejected {
                    error: e.to_string(),
                }
            }
        };

        DeliveryReport {
            channel: channel.kind,
            target: channel.target.clone(),
            timestamp,
            outcome,
        }
    }

    /// One send: adapter lookup, quota check, bounded wait.
    async fn attempt(
        &self,
        channel: &Channel,
        notification: &Notification,
    ) -> Result<DeliveryReceipt> {
        let adapter = self
            .channels
            .get(&channel.kind)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| Error::config(format!("No {} channel configured", channel.kind)))?;

        self.rate_limiter
            .lock()
            .try_acquire(channel.kind, self.clock.now())?;

        let timeout = self.config.send_timeout();
        match tokio::time::timeout(timeout, adapter.deliver(channel, notification)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                channel: channel.kind.as_str().to_string(),
                after: timeout,
            }),
        }
    }

    /// Re-attempt every retry entry that is due.
    pub async fn process_retries(&self) -> RetrySweepSummary {
        let now = self.clock.now();
        self.rate_limiter.lock().prune(now);
        let due = self.retry_queue.lock().take_due(now);

        let mut summary = RetrySweepSummary {
            attempted: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            return summary;
        }

        debug!("Retrying {} queued deliveries", due.len());

        let results = join_all(due.into_iter().map(|entry| async move {
            let result = self.attempt(&entry.channel, &entry.notification).await;
            (entry, result)
        }))
        .await;

        for (mut entry, result) in results {
            let now = self.clock.now();
            match result {
                Ok(_) => {
                    self.retry_queue.lock().settle();
                    summary.delivered += 1;
                    info!(
                        "Notification {} delivered to {} on retry {}",
                        entry.notification.id,
                        entry.channel.kind,
                        entry.attempts + 1
                    );
                    self.emit(DispatchEvent::Delivered {
                        notification_id: entry.notification.id.clone(),
                        channel: entry.channel.clone(),
                        retry: entry.attempts + 1,
                    });
                }
                Err(e) if e.is_retryable() => {
                    let record = self
                        .retry_queue
                        .lock()
                        .record_failure(entry, e.to_string(), now);
                    if let Some(evicted) = record.evicted {
                        self.dead_letter(evicted, now);
                    }
                    let entry = record.entry;
                    match record.decision {
                        RetryDecision::Reschedule(next_retry_at) => {
                            summary.rescheduled += 1;
                            debug!(
                                "Retry {} for notification {} via {} failed, next at {}",
                                entry.attempts, entry.notification.id, entry.channel.kind, next_retry_at
                            );
                            self.emit(DispatchEvent::RetryScheduled {
                                notification_id: entry.notification.id.clone(),
                                channel: entry.channel.clone(),
                                attempts: entry.attempts,
                                next_retry_at,
                                error: e.to_string(),
                            });
                        }
                        RetryDecision::Exhausted => {
                            summary.dead_lettered += 1;
                            self.dead_letter(entry, now);
                        }
                    }
                }
                Err(e) => {
                    self.retry_queue.lock().settle();
                    entry.attempts += 1;
                    entry.last_error = e.to_string();
                    summary.dead_lettered += 1;
                    self.dead_letter(entry, now);
                }
            }
        }

        summary
    }

    fn dead_letter(&self, entry: RetryEntry, now: DateTime<Utc>) {
        let id = self.next_dead_letter_id.fetch_add(1, Ordering::SeqCst);
        let dead_letter = DeadLetter::from_entry(id, &entry, now);
        warn!(
            "Notification {} permanently failed for {} ({}) after {} retries: {}",
            dead_letter.notification_id,
            dead_letter.channel.kind,
            dead_letter.channel.target,
            dead_letter.attempts,
            dead_letter.error
        );

        {
            let mut dead_letters = self.dead_letters.lock();
            dead_letters.push_back(dead_letter.clone());
            while dead_letters.len() > self.config.history_limit.max(1) {
                dead_letters.pop_front();
            }
        }
        self.emit(DispatchEvent::PermanentlyFailed(dead_letter));
    }

    fn record_history(&self, notification: Arc<Notification>) {
        let mut history = self.history.lock();
        history.push_back(notification);
        while history.len() > self.config.history_limit.max(1) {
            history.pop_front();
        }
    }

    fn emit(&self, event: DispatchEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    /// Run [`process_retries`](Self::process_retries) periodically until
    /// [`stop`](Self::stop) is called.
    pub fn spawn_retry_worker(self: &Arc<Self>) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        let cancellation_token = self.cancellation_token.clone();
        let period = self.config.retry_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        debug!("Retry worker shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let summary = dispatcher.process_retries().await;
                        if summary.attempted > 0 {
                            info!(
                                "Retry sweep: {} attempted, {} delivered, {} rescheduled, {} dead-lettered",
                                summary.attempted,
                                summary.delivered,
                                summary.rescheduled,
                                summary.dead_lettered
                            );
                        }
                    }
                }
            }
        })
    }

    /// Stop background workers. Queued retries are abandoned.
    pub fn stop(&self) {
        info!(
            "Stopping notification dispatcher ({} retries pending)",
            self.pending_retry_count()
        );
        self.cancellation_token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Retry entries currently queued.
    pub fn pending_retries(&self) -> Vec<RetryEntry> {
        self.retry_queue.lock().entries()
    }

    /// Retries still owed: queued entries plus those a sweep is
    /// attempting right now.
    pub fn pending_retry_count(&self) -> usize {
        self.retry_queue.lock().outstanding()
    }

    /// Earliest queued retry time.
    pub fn next_retry_at(&self) -> Option<DateTime<Utc>> {
        self.retry_queue.lock().next_due()
    }

    /// Terminal failures, oldest first.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().iter().cloned().collect()
    }

    /// Recent notifications, oldest first.
    pub fn history(&self) -> Vec<Arc<Notification>> {
        self.history.lock().iter().cloned().collect()
    }

    /// Get dispatcher statistics.
    pub fn stats(&self) -> NotificationStats {
        let mut stats = NotificationStats::default();
        {
            let history = self.history.lock();
            stats.total = history.len();
            for notification in history.iter() {
                *stats.by_priority.entry(notification.priority).or_default() += 1;
                for channel in &notification.channels {
                    *stats.by_channel.entry(channel.kind).or_default() += 1;
                }
            }
        }
        stats.pending_retries = self.pending_retry_count();
        stats.dead_letters = self.dead_letters.lock().len();
        stats.channel_count = self.channels.len();
        stats
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
