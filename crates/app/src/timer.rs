use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;

use prakhar_storage::{TimerId, now_unix_ms};

/// Cadence of the shared countdown tick.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// One named countdown started by a chat tool call.
///
/// `remaining_seconds` is always recomputed from `started_at_unix_ms`, never
/// decremented, so a stalled or backgrounded tick loop cannot drift it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppTimer {
    pub id: TimerId,
    pub label: String,
    pub duration_seconds: u64,
    pub remaining_seconds: u64,
    pub is_active: bool,
    pub started_at_unix_ms: u64,
}

/// Pure recompute of the seconds left on a timer at wall-clock `now`.
pub fn remaining_seconds(duration_seconds: u64, started_at_unix_ms: u64, now_unix_ms: u64) -> u64 {
    let elapsed_seconds = now_unix_ms.saturating_sub(started_at_unix_ms) / 1_000;
    duration_seconds.saturating_sub(elapsed_seconds)
}

/// The set of running countdowns, shared between the orchestrator (which
/// creates timers from tool calls) and the periodic tick task.
#[derive(Default)]
pub struct TimerService {
    timers: RwLock<Vec<AppTimer>>,
}

impl TimerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts an independent countdown. Duplicate labels are allowed.
    pub async fn create(&self, label: impl Into<String>, duration_seconds: u64) -> AppTimer {
        let timer = AppTimer {
            id: TimerId::new_v7(),
            label: label.into().trim().to_string(),
            duration_seconds,
            remaining_seconds: duration_seconds,
            is_active: duration_seconds > 0,
            started_at_unix_ms: now_unix_ms(),
        };

        self.timers.write().await.push(timer.clone());
        timer
    }

    /// Removes a timer immediately, whatever state it is in.
    pub async fn delete(&self, id: TimerId) {
        self.timers.write().await.retain(|timer| timer.id != id);
    }

    pub async fn list(&self) -> Vec<AppTimer> {
        self.timers.read().await.clone()
    }

    /// Recomputes every active timer against wall-clock `now`.
    ///
    /// Expired timers latch `is_active = false` and are never revisited, so
    /// the transition happens exactly once even if the clock jumps backwards.
    pub async fn tick(&self, now_unix_ms: u64) {
        let mut timers = self.timers.write().await;
        for timer in timers.iter_mut().filter(|timer| timer.is_active) {
            timer.remaining_seconds =
                remaining_seconds(timer.duration_seconds, timer.started_at_unix_ms, now_unix_ms);
            if timer.remaining_seconds == 0 {
                timer.is_active = false;
            }
        }
    }

    /// Spawns the 1-second cooperative tick task. Independent of any in-flight
    /// chat or image request.
    pub fn spawn_ticker(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let service = self;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_PERIOD);
            // Missed ticks are harmless: the next tick recomputes from
            // absolute time anyway.
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                service.tick(now_unix_ms()).await;
            }
        })
    }
}
