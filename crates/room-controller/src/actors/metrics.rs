//! Actor metrics and mailbox monitoring.
//!
//! Mailbox depth thresholds:
//!
//! | Actor Type | Normal | Warning | Critical |
//! |------------|--------|---------|----------|
//! | Manager    | < 100  | 100-500 | > 500    |
//! | Room       | < 100  | 100-500 | > 500    |
//!
//! [`ActorMetrics`] aggregates room, publisher and subscriber counts across
//! every room on this instance and mirrors them to the `rc_*_active` gauges.

use crate::observability::metrics as prom;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Mailbox depth thresholds for room actors.
pub const ROOM_MAILBOX_NORMAL: usize = 100;
pub const ROOM_MAILBOX_WARNING: usize = 500;

/// Mailbox depth thresholds for the manager actor.
pub const MANAGER_MAILBOX_NORMAL: usize = 100;
pub const MANAGER_MAILBOX_WARNING: usize = 500;

/// Actor type for metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// `RoomManagerActor` (singleton).
    Manager,
    /// `RoomActor` (one per room).
    Room,
}

impl ActorType {
    /// Returns the actor type as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Manager => "manager",
            ActorType::Room => "room",
        }
    }

    #[must_use]
    pub const fn warning_threshold(&self) -> usize {
        match self {
            ActorType::Manager => MANAGER_MAILBOX_WARNING,
            ActorType::Room => ROOM_MAILBOX_WARNING,
        }
    }

    #[must_use]
    pub const fn normal_threshold(&self) -> usize {
        match self {
            ActorType::Manager => MANAGER_MAILBOX_NORMAL,
            ActorType::Room => ROOM_MAILBOX_NORMAL,
        }
    }
}

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    Normal,
    Warning,
    Critical,
}

/// Mailbox monitor for tracking queue depth.
#[derive(Debug)]
pub struct MailboxMonitor {
    actor_type: ActorType,
    /// Room id, or the instance id for the manager.
    actor_id: String,
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
    messages_processed: AtomicU64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
        }
    }

    /// Record a message taken off the channel with `backlog` messages still
    /// queued behind it.
    pub fn record_received(&self, backlog: usize) {
        let previous = self.depth.swap(backlog, Ordering::Relaxed);
        self.peak_depth.fetch_max(backlog, Ordering::Relaxed);
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        prom::set_actor_mailbox_depth(self.actor_type.as_str(), backlog);

        match self.level_for_depth(backlog) {
            MailboxLevel::Critical => {
                warn!(
                    target: "rc.actor.mailbox",
                    actor_type = self.actor_type.as_str(),
                    actor_id = %self.actor_id,
                    depth = backlog,
                    threshold = self.actor_type.warning_threshold(),
                    "Mailbox depth critical"
                );
            }
            MailboxLevel::Warning if previous <= self.actor_type.normal_threshold() => {
                debug!(
                    target: "rc.actor.mailbox",
                    actor_type = self.actor_type.as_str(),
                    actor_id = %self.actor_id,
                    depth = backlog,
                    "Mailbox depth elevated"
                );
            }
            MailboxLevel::Warning | MailboxLevel::Normal => {}
        }
    }

    /// Backlog seen when the last message was received.
    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        self.level_for_depth(self.current_depth())
    }

    fn level_for_depth(&self, depth: usize) -> MailboxLevel {
        if depth > self.actor_type.warning_threshold() {
            MailboxLevel::Critical
        } else if depth > self.actor_type.normal_threshold() {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Aggregated counts for the actor system, shared by the manager and every room.
#[derive(Debug, Default)]
pub struct ActorMetrics {
    active_rooms: AtomicUsize,
    active_publishers: AtomicUsize,
    active_subscribers: AtomicUsize,
    /// Total actor panics (indicates bugs).
    actor_panics: AtomicU64,
    total_messages_processed: AtomicU64,
}

fn apply_delta(counter: &AtomicUsize, delta: isize) -> usize {
    let update = |current: usize| Some(current.saturating_add_signed(delta));
    let previous = counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, update)
        .unwrap_or(0);
    previous.saturating_add_signed(delta)
}

impl ActorMetrics {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn room_created(&self) {
        let count = apply_delta(&self.active_rooms, 1);
        prom::set_rooms_active(count);
    }

    pub fn room_removed(&self) {
        let count = apply_delta(&self.active_rooms, -1);
        prom::set_rooms_active(count);
    }

    /// Apply membership changes reported by one room.
    pub fn adjust_membership(&self, publishers_delta: isize, subscribers_delta: isize) {
        if publishers_delta != 0 {
            let count = apply_delta(&self.active_publishers, publishers_delta);
            prom::set_publishers_active(count);
        }
        if subscribers_delta != 0 {
            let count = apply_delta(&self.active_subscribers, subscribers_delta);
            prom::set_subscribers_active(count);
        }
    }

    /// Record an actor panic.
    pub fn record_panic(&self, actor_type: ActorType) {
        self.actor_panics.fetch_add(1, Ordering::Relaxed);
        prom::record_actor_panic(actor_type.as_str());
        tracing::error!(
            target: "rc.actor.panic",
            actor_type = actor_type.as_str(),
            total_panics = self.actor_panics.load(Ordering::Relaxed),
            "Actor panic detected - indicates bug, investigation required"
        );
    }

    pub fn record_message_processed(&self) {
        self.total_messages_processed
            .fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.active_rooms.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn publisher_count(&self) -> usize {
        self.active_publishers.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.active_subscribers.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn panic_count(&self) -> u64 {
        self.actor_panics.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.total_messages_processed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_type_labels_and_thresholds() {
        assert_eq!(ActorType::Manager.as_str(), "manager");
        assert_eq!(ActorType::Room.as_str(), "room");
        assert_eq!(ActorType::Room.normal_threshold(), 100);
        assert_eq!(ActorType::Room.warning_threshold(), 500);
    }

    #[test]
    fn test_mailbox_monitor_tracks_backlog() {
        let monitor = MailboxMonitor::new(ActorType::Room, "room-1");

        monitor.record_received(3);
        assert_eq!(monitor.current_depth(), 3);
        assert_eq!(monitor.peak_depth(), 3);

        monitor.record_received(0);
        assert_eq!(monitor.current_depth(), 0);
        assert_eq!(monitor.peak_depth(), 3);
        assert_eq!(monitor.messages_processed(), 2);
    }

    #[test]
    fn test_mailbox_monitor_levels() {
        let monitor = MailboxMonitor::new(ActorType::Room, "room-1");
        assert_eq!(monitor.current_level(), MailboxLevel::Normal);

        monitor.record_received(150);
        assert_eq!(monitor.current_level(), MailboxLevel::Warning);

        monitor.record_received(550);
        assert_eq!(monitor.current_level(), MailboxLevel::Critical);

        monitor.record_received(10);
        assert_eq!(monitor.current_level(), MailboxLevel::Normal);
    }

    #[test]
    fn test_actor_metrics_membership_deltas() {
        let metrics = ActorMetrics::new();

        metrics.adjust_membership(2, 3);
        assert_eq!(metrics.publisher_count(), 2);
        assert_eq!(metrics.subscriber_count(), 3);

        metrics.adjust_membership(-1, -3);
        assert_eq!(metrics.publisher_count(), 1);
        assert_eq!(metrics.subscriber_count(), 0);

        // Saturates rather than wrapping.
        metrics.adjust_membership(-5, 0);
        assert_eq!(metrics.publisher_count(), 0);
    }

    #[test]
    fn test_actor_metrics_rooms_and_panics() {
        let metrics = ActorMetrics::new();

        metrics.room_created();
        metrics.room_created();
        metrics.room_removed();
        assert_eq!(metrics.room_count(), 1);

        metrics.record_panic(ActorType::Room);
        assert_eq!(metrics.panic_count(), 1);

        metrics.record_message_processed();
        assert_eq!(metrics.messages_processed(), 1);
    }
}
