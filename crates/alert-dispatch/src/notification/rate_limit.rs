//! Sliding-window send quotas per channel kind.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::routing::ChannelKind;
use crate::{Error, Result};

/// Longest accepted rate limit window, one day.
pub const MAX_RATE_WINDOW_SECS: u64 = 86_400;

/// Quota for one channel kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Calls allowed inside one window.
    pub calls: usize,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl RateLimit {
    pub const fn per_minute(calls: usize) -> Self {
        Self {
            calls,
            window_secs: 60,
        }
    }

    /// Start of the window ending at `now`. Saturates at the earliest
    /// representable instant for windows chrono cannot express.
    fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        i64::try_from(self.window_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Quotas for every channel kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub chat: RateLimit,
    pub team_chat: RateLimit,
    pub email: RateLimit,
    pub sms: RateLimit,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            chat: RateLimit::per_minute(50),
            team_chat: RateLimit::per_minute(30),
            email: RateLimit::per_minute(20),
            sms: RateLimit::per_minute(10),
        }
    }
}

impl RateLimitConfig {
    pub fn limit_for(&self, kind: ChannelKind) -> RateLimit {
        match kind {
            ChannelKind::Chat => self.chat,
            ChannelKind::TeamChat => self.team_chat,
            ChannelKind::Email => self.email,
            ChannelKind::Sms => self.sms,
        }
    }
}

/// Per-kind sliding window of recent send timestamps.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    calls: HashMap<ChannelKind, VecDeque<DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            calls: HashMap::new(),
        }
    }

    /// Reserve one send slot for `kind` at `now`.
    ///
    /// Fails with [`Error::RateLimited`] when the window is already full. A
    /// granted slot counts against the quota whether or not the send
    /// succeeds.
    pub fn try_acquire(&mut self, kind: ChannelKind, now: DateTime<Utc>) -> Result<()> {
        let limit = self.config.limit_for(kind);
        let calls = self.calls.entry(kind).or_default();
        evict_before(calls, limit.window_start(now));

        if calls.len() >= limit.calls {
            debug!(
                "Rate limit reached for {} ({} calls / {}s)",
                kind, limit.calls, limit.window_secs
            );
            return Err(Error::rate_limited(kind.as_str()));
        }

        calls.push_back(now);
        Ok(())
    }

    /// Slots left for `kind` at `now`.
    pub fn remaining(&self, kind: ChannelKind, now: DateTime<Utc>) -> usize {
        let limit = self.config.limit_for(kind);
        let cutoff = limit.window_start(now);
        let used = self
            .calls
            .get(&kind)
            .map(|calls| calls.iter().filter(|t| **t > cutoff).count())
            .unwrap_or(0);
        limit.calls.saturating_sub(used)
    }

    /// Drop every timestamp that has left its window.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        for (kind, calls) in self.calls.iter_mut() {
            evict_before(calls, self.config.limit_for(*kind).window_start(now));
        }
        self.calls.retain(|_, calls| !calls.is_empty());
    }
}

fn evict_before(calls: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) {
    while calls.front().is_some_and(|t| *t <= cutoff) {
        calls.pop_front();
    }
}
