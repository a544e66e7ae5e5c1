//! Per-key window state and admission decisions.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Tracking state for one key within its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRecord {
    /// Requests admitted in the current window. Starts at 1.
    pub count: u32,
    /// Epoch milliseconds at which the window expires.
    pub reset_at_ms: u64,
}

impl RateRecord {
    /// Open a new window at `now_ms`, counting the request that opened it.
    pub fn open(now_ms: u64, window_ms: u64) -> Self {
        Self {
            count: 1,
            reset_at_ms: now_ms.saturating_add(window_ms),
        }
    }

    /// A record is live only while `now < reset_at`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.reset_at_ms
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Quota of the policy that produced this decision.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Epoch milliseconds at which the window resets.
    #[serde(rename = "resetAt")]
    pub reset_at_ms: u64,
}

impl Decision {
    pub(crate) fn allowed(limit: u32, record: &RateRecord) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: limit.saturating_sub(record.count),
            reset_at_ms: record.reset_at_ms,
        }
    }

    pub(crate) fn rejected(limit: u32, record: &RateRecord) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset_at_ms: record.reset_at_ms,
        }
    }

    /// Whole seconds until the window resets, rounded up.
    pub fn retry_after_secs(&self, now_ms: u64) -> u64 {
        self.reset_at_ms.saturating_sub(now_ms).div_ceil(1000)
    }

    /// The reset time as an ISO-8601 timestamp, e.g. `2024-01-01T00:01:00.000Z`.
    pub fn reset_at_rfc3339(&self) -> String {
        let millis = i64::try_from(self.reset_at_ms).unwrap_or(i64::MAX);
        DateTime::<Utc>::from_timestamp_millis(millis)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}
