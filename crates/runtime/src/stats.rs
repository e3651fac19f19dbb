use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters exposed on `/stats`.
#[derive(Debug, Default)]
pub struct Stats {
    messages_parsed: AtomicU64,
    webhooks_called: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub messages_parsed: u64,
    pub webhooks_called: u64,
}

impl Stats {
    pub fn record_message(&self) {
        self.messages_parsed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_webhook(&self) {
        self.webhooks_called.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_parsed: self.messages_parsed.load(Ordering::Relaxed),
            webhooks_called: self.webhooks_called.load(Ordering::Relaxed),
        }
    }
}
