use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use alert_dispatch::clock::{Clock, ManualClock};
use alert_dispatch::notification::{
    AnalysisResult, Channel, ChannelKind, DeliveryOutcome, DeliveryReceipt, DispatchEvent,
    DispatcherConfig, ErrorEvent, Notification, NotificationChannel, NotificationDispatcher,
    Priority, RateLimit,
};
use alert_dispatch::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Succeed,
    FailTransport,
    FailConfig,
    /// Fail with a transport error after five seconds.
    SlowFail,
    Hang,
}

struct FakeChannel {
    kind: ChannelKind,
    behavior: Mutex<Behavior>,
    calls: AtomicUsize,
    targets: Mutex<Vec<String>>,
}

impl FakeChannel {
    fn new(kind: ChannelKind, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            kind,
            behavior: Mutex::new(behavior),
            calls: AtomicUsize::new(0),
            targets: Mutex::new(Vec::new()),
        })
    }

    fn set(&self, behavior: Behavior) {
        *self.behavior.lock() = behavior;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationChannel for FakeChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn deliver(
        &self,
        channel: &Channel,
        notification: &Notification,
    ) -> Result<DeliveryReceipt> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().push(channel.target.clone());

        let behavior = *self.behavior.lock();
        match behavior {
            Behavior::Succeed => Ok(DeliveryReceipt::with_message_id(format!(
                "{}-{}",
                self.kind, notification.id
            ))),
            Behavior::FailTransport => Err(Error::transport(
                self.kind.as_str(),
                "503 Service Unavailable",
            )),
            Behavior::FailConfig => Err(Error::config("webhook URL rejected")),
            Behavior::SlowFail => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Err(Error::transport(self.kind.as_str(), "504 Gateway Timeout"))
            }
            Behavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

struct Harness {
    dispatcher: Arc<NotificationDispatcher>,
    clock: ManualClock,
    chat: Arc<FakeChannel>,
    team_chat: Arc<FakeChannel>,
    email: Arc<FakeChannel>,
    sms: Arc<FakeChannel>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    fn with_config(config: DispatcherConfig) -> Self {
        let clock = ManualClock::default();
        let dispatcher = Arc::new(NotificationDispatcher::with_clock(
            config,
            Arc::new(clock.clone()),
        ));

        let chat = FakeChannel::new(ChannelKind::Chat, Behavior::Succeed);
        let team_chat = FakeChannel::new(ChannelKind::TeamChat, Behavior::Succeed);
        let email = FakeChannel::new(ChannelKind::Email, Behavior::Succeed);
        let sms = FakeChannel::new(ChannelKind::Sms, Behavior::Succeed);
        dispatcher.register_channel(chat.clone());
        dispatcher.register_channel(team_chat.clone());
        dispatcher.register_channel(email.clone());
        dispatcher.register_channel(sms.clone());

        Self {
            dispatcher,
            clock,
            chat,
            team_chat,
            email,
            sms,
        }
    }

    fn advance_secs(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }
}

#[tokio::test]
async fn critical_keyword_fans_out_to_every_channel() {
    let h = Harness::new();

    // The analysis says low, but "fatal" is always critical.
    let report = h
        .dispatcher
        .dispatch(
            ErrorEvent::new("Fatal: checkout crashed"),
            AnalysisResult::new("Null deref in cart").with_priority(Priority::Low),
        )
        .await
        .unwrap();

    assert_eq!(report.notification.priority, Priority::Critical);
    assert!(report.all_delivered());
    let kinds: Vec<_> = report.deliveries.iter().map(|d| d.channel).collect();
    assert_eq!(kinds, ChannelKind::ALL.to_vec());
    assert_eq!(*h.chat.targets.lock(), vec!["#critical-errors"]);
    assert_eq!(*h.sms.targets.lock(), vec!["oncall"]);
}

#[tokio::test]
async fn database_timeout_is_medium() {
    let h = Harness::new();

    let report = h
        .dispatcher
        .dispatch(
            ErrorEvent::new("database connection timeout"),
            AnalysisResult::default(),
        )
        .await
        .unwrap();

    assert_eq!(report.notification.priority, Priority::Medium);
    let targets: Vec<_> = report
        .deliveries
        .iter()
        .map(|d| (d.channel, d.target.as_str()))
        .collect();
    assert_eq!(
        targets,
        vec![(ChannelKind::Chat, "#errors"), (ChannelKind::Email, "dev-team")]
    );
    assert_eq!(h.team_chat.calls(), 0);
    assert_eq!(h.sms.calls(), 0);
}

#[tokio::test]
async fn explicit_priorities_take_precedence_over_keywords() {
    let h = Harness::new();

    let report = h
        .dispatcher
        .dispatch(
            ErrorEvent::new("button misaligned").with_priority(Priority::Medium),
            AnalysisResult::new("cosmetic").with_priority(Priority::High),
        )
        .await
        .unwrap();
    assert_eq!(report.notification.priority, Priority::High);

    let report = h
        .dispatcher
        .dispatch(
            ErrorEvent::new("button misaligned").with_priority(Priority::Medium),
            AnalysisResult::default(),
        )
        .await
        .unwrap();
    assert_eq!(report.notification.priority, Priority::Medium);
}

#[tokio::test]
async fn retries_back_off_then_dead_letter() {
    let h = Harness::new();
    h.chat.set(Behavior::FailTransport);
    let start = h.clock.now();

    let report = h
        .dispatcher
        .dispatch(ErrorEvent::new("page loaded slowly"), AnalysisResult::default())
        .await
        .unwrap();
    match &report.deliveries[0].outcome {
        DeliveryOutcome::RetryScheduled { next_retry_at, .. } => {
            assert_eq!(*next_retry_at - start, chrono::Duration::seconds(30));
        }
        other => panic!("expected a retry, got {other:?}"),
    }

    // Not due yet.
    h.advance_secs(29);
    assert_eq!(h.dispatcher.process_retries().await.attempted, 0);

    // Retry 1 fails at t=30, next in 60s.
    h.advance_secs(1);
    let summary = h.dispatcher.process_retries().await;
    assert_eq!(summary.rescheduled, 1);
    let pending = h.dispatcher.pending_retries();
    assert_eq!(pending[0].attempts, 1);
    assert_eq!(
        pending[0].next_retry_at - start,
        chrono::Duration::seconds(30 + 60)
    );

    // Retry 2 fails at t=90, next in 120s.
    h.advance_secs(60);
    h.dispatcher.process_retries().await;
    let pending = h.dispatcher.pending_retries();
    assert_eq!(pending[0].attempts, 2);
    assert_eq!(
        pending[0].next_retry_at - start,
        chrono::Duration::seconds(90 + 120)
    );

    // Retry 3 fails at t=210 and exhausts the budget.
    h.advance_secs(120);
    let summary = h.dispatcher.process_retries().await;
    assert_eq!(summary.dead_lettered, 1);
    assert!(h.dispatcher.pending_retries().is_empty());

    let dead_letters = h.dispatcher.dead_letters();
    assert_eq!(dead_letters.len(), 1);
    assert_eq!(dead_letters[0].attempts, 3);
    assert_eq!(dead_letters[0].notification_id, report.notification.id);
    assert!(dead_letters[0].error.contains("503"));

    // No fourth retry, however long we wait.
    h.advance_secs(3600);
    assert_eq!(h.dispatcher.process_retries().await.attempted, 0);
    assert_eq!(h.chat.calls(), 4);
}

#[tokio::test]
async fn retry_success_clears_the_entry() {
    let h = Harness::new();
    h.email.set(Behavior::FailTransport);

    h.dispatcher
        .dispatch(ErrorEvent::new("request timeout"), AnalysisResult::default())
        .await
        .unwrap();
    assert_eq!(h.dispatcher.stats().pending_retries, 1);

    h.email.set(Behavior::Succeed);
    h.advance_secs(30);
    let summary = h.dispatcher.process_retries().await;

    assert_eq!(summary.delivered, 1);
    assert_eq!(h.dispatcher.stats().pending_retries, 0);
    assert!(h.dispatcher.dead_letters().is_empty());
    // Chat succeeded first time and is not re-sent.
    assert_eq!(h.chat.calls(), 1);
    assert_eq!(h.email.calls(), 2);
}

#[tokio::test]
async fn rate_limit_defers_then_recovers() {
    let mut config = DispatcherConfig::default();
    config.rate_limits.chat = RateLimit {
        calls: 2,
        window_secs: 60,
    };
    let h = Harness::with_config(config);

    for _ in 0..2 {
        let report = h
            .dispatcher
            .dispatch(ErrorEvent::new("page loaded"), AnalysisResult::default())
            .await
            .unwrap();
        assert!(report.all_delivered());
    }

    let report = h
        .dispatcher
        .dispatch(ErrorEvent::new("page loaded"), AnalysisResult::default())
        .await
        .unwrap();
    let delivery = &report.deliveries[0];
    assert!(matches!(
        delivery.outcome,
        DeliveryOutcome::RetryScheduled { .. }
    ));
    assert!(delivery.error().unwrap().contains("Rate limited"));
    // The limited attempt never reached the adapter.
    assert_eq!(h.chat.calls(), 2);

    // Once the window has passed the queued retry goes through.
    h.advance_secs(60);
    let summary = h.dispatcher.process_retries().await;
    assert_eq!(summary.delivered, 1);
    assert_eq!(h.chat.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn channel_failures_are_isolated() {
    let h = Harness::new();
    h.team_chat.set(Behavior::FailConfig);
    h.email.set(Behavior::FailTransport);
    h.sms.set(Behavior::Hang);

    let report = h
        .dispatcher
        .dispatch(ErrorEvent::new("critical: payments down"), AnalysisResult::default())
        .await
        .unwrap();

    let outcomes: Vec<_> = report.deliveries.iter().map(|d| &d.outcome).collect();
    assert!(matches!(outcomes[0], DeliveryOutcome::Delivered { .. }));
    assert!(matches!(outcomes[1], DeliveryOutcome::Rejected { .. }));
    assert!(matches!(outcomes[2], DeliveryOutcome::RetryScheduled { .. }));
    assert!(matches!(outcomes[3], DeliveryOutcome::RetryScheduled { .. }));
    assert!(report.deliveries[3].error().unwrap().contains("timed out"));

    assert_eq!(report.hard_errors().len(), 1);
    // Configuration errors are not retried.
    let queued: Vec<_> = h
        .dispatcher
        .pending_retries()
        .iter()
        .map(|e| e.channel.kind)
        .collect();
    assert_eq!(queued, vec![ChannelKind::Email, ChannelKind::Sms]);
}

#[tokio::test]
async fn config_error_during_retry_dead_letters_immediately() {
    let h = Harness::new();
    h.chat.set(Behavior::FailTransport);

    h.dispatcher
        .dispatch(ErrorEvent::new("page loaded"), AnalysisResult::default())
        .await
        .unwrap();

    h.chat.set(Behavior::FailConfig);
    h.advance_secs(30);
    let summary = h.dispatcher.process_retries().await;

    assert_eq!(summary.dead_lettered, 1);
    assert!(h.dispatcher.pending_retries().is_empty());
    assert_eq!(h.dispatcher.dead_letters()[0].attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn retries_in_flight_still_count_as_pending() {
    let h = Harness::new();
    h.chat.set(Behavior::FailTransport);
    h.dispatcher
        .dispatch(ErrorEvent::new("page loaded"), AnalysisResult::default())
        .await
        .unwrap();
    assert_eq!(h.dispatcher.pending_retry_count(), 1);

    h.chat.set(Behavior::SlowFail);
    h.advance_secs(30);
    let sweep = tokio::spawn({
        let dispatcher = Arc::clone(&h.dispatcher);
        async move { dispatcher.process_retries().await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Off the queue but not settled yet.
    assert!(h.dispatcher.pending_retries().is_empty());
    assert_eq!(h.dispatcher.pending_retry_count(), 1);
    assert_eq!(h.dispatcher.stats().pending_retries, 1);

    let summary = sweep.await.unwrap();
    assert_eq!(summary.rescheduled, 1);
    assert_eq!(h.dispatcher.pending_retry_count(), 1);

    h.chat.set(Behavior::Succeed);
    h.advance_secs(60);
    let summary = h.dispatcher.process_retries().await;
    assert_eq!(summary.delivered, 1);
    assert_eq!(h.dispatcher.pending_retry_count(), 0);
}

#[tokio::test]
async fn missing_adapter_is_rejected() {
    let clock = ManualClock::default();
    let dispatcher =
        NotificationDispatcher::with_clock(DispatcherConfig::default(), Arc::new(clock));
    dispatcher.register_channel(FakeChannel::new(ChannelKind::Chat, Behavior::Succeed));

    let report = dispatcher
        .dispatch(ErrorEvent::new("Unhandled exception"), AnalysisResult::default())
        .await
        .unwrap();

    assert_eq!(report.notification.priority, Priority::High);
    assert!(report.deliveries[0].is_success());
    assert_eq!(report.hard_errors().len(), 2);
    assert!(report.deliveries[1].error().unwrap().contains("No team_chat channel"));
    assert!(dispatcher.pending_retries().is_empty());
}

#[tokio::test]
async fn disabled_dispatcher_refuses() {
    let h = Harness::with_config(DispatcherConfig {
        enabled: false,
        ..Default::default()
    });

    let result = h
        .dispatcher
        .dispatch(ErrorEvent::new("fatal"), AnalysisResult::default())
        .await;
    assert!(matches!(result, Err(Error::Disabled)));
    assert_eq!(h.chat.calls(), 0);
}

#[tokio::test]
async fn full_queue_evicts_oldest_into_dead_letters() {
    let h = Harness::with_config(DispatcherConfig {
        max_queue_size: 2,
        ..Default::default()
    });
    h.chat.set(Behavior::FailTransport);

    let mut ids = Vec::new();
    for _ in 0..3 {
        let report = h
            .dispatcher
            .dispatch(ErrorEvent::new("page loaded"), AnalysisResult::default())
            .await
            .unwrap();
        ids.push(report.notification.id.clone());
    }

    let pending: Vec<_> = h
        .dispatcher
        .pending_retries()
        .iter()
        .map(|e| e.notification.id.clone())
        .collect();
    assert_eq!(pending, ids[1..].to_vec());
    let dead_letters = h.dispatcher.dead_letters();
    assert_eq!(dead_letters.len(), 1);
    assert_eq!(dead_letters[0].notification_id, ids[0]);
}

#[tokio::test]
async fn events_are_broadcast() {
    let h = Harness::new();
    h.email.set(Behavior::FailTransport);
    let mut events = h.dispatcher.subscribe();

    h.dispatcher
        .dispatch(ErrorEvent::new("warning: slow query"), AnalysisResult::default())
        .await
        .unwrap();

    let mut delivered = 0;
    let mut scheduled = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            DispatchEvent::Delivered { channel, retry, .. } => {
                assert_eq!(channel.kind, ChannelKind::Chat);
                assert_eq!(retry, 0);
                delivered += 1;
            }
            DispatchEvent::RetryScheduled {
                channel, attempts, ..
            } => {
                assert_eq!(channel.kind, ChannelKind::Email);
                assert_eq!(attempts, 0);
                scheduled += 1;
            }
            DispatchEvent::PermanentlyFailed(_) => panic!("nothing should fail permanently"),
        }
    }
    assert_eq!((delivered, scheduled), (1, 1));
}

#[tokio::test]
async fn stats_count_history() {
    let h = Harness::new();

    for message in ["fatal crash", "upload failed", "page loaded", "page loaded"] {
        h.dispatcher
            .dispatch(ErrorEvent::new(message), AnalysisResult::default())
            .await
            .unwrap();
    }

    let stats = h.dispatcher.stats();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.by_priority[&Priority::Critical], 1);
    assert_eq!(stats.by_priority[&Priority::High], 1);
    assert_eq!(stats.by_priority[&Priority::Low], 2);
    assert!(!stats.by_priority.contains_key(&Priority::Medium));
    // 1 + 1 + 1 + 1 chat, 1 + 1 team chat, 1 + 1 email, 1 sms.
    assert_eq!(stats.by_channel[&ChannelKind::Chat], 4);
    assert_eq!(stats.by_channel[&ChannelKind::TeamChat], 2);
    assert_eq!(stats.by_channel[&ChannelKind::Email], 2);
    assert_eq!(stats.by_channel[&ChannelKind::Sms], 1);
    assert_eq!(h.dispatcher.history().len(), 4);
}

#[tokio::test]
async fn history_is_bounded() {
    let h = Harness::with_config(DispatcherConfig {
        history_limit: 3,
        ..Default::default()
    });

    for _ in 0..5 {
        h.dispatcher
            .dispatch(ErrorEvent::new("page loaded"), AnalysisResult::default())
            .await
            .unwrap();
    }
    assert_eq!(h.dispatcher.stats().total, 3);
}

#[tokio::test(start_paused = true)]
async fn retry_worker_sweeps_until_stopped() {
    let h = Harness::new();
    h.chat.set(Behavior::FailTransport);

    let worker = h.dispatcher.spawn_retry_worker();
    h.dispatcher
        .dispatch(ErrorEvent::new("page loaded"), AnalysisResult::default())
        .await
        .unwrap();

    h.chat.set(Behavior::Succeed);
    h.advance_secs(30);
    // Let the worker's 30s tick fire.
    tokio::time::sleep(Duration::from_secs(31)).await;

    assert_eq!(h.chat.calls(), 2);
    assert!(h.dispatcher.pending_retries().is_empty());

    h.dispatcher.stop();
    worker.await.unwrap();
}
