//! Run progress events
//!
//! An in-process broadcast bus. Emitting never blocks: with no subscribers the
//! event is dropped, and a lagging subscriber loses the oldest events.
//!
//! ```
//! use libpromocast::events::{Event, EventBus};
//!
//! # async fn example() {
//! let bus = EventBus::new(64);
//! let mut events = bus.subscribe();
//!
//! bus.emit(Event::RunStarted {
//!     run_id: "r1".to_string(),
//!     platforms: vec!["x".to_string()],
//!     dry_run: false,
//! });
//!
//! if let Ok(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{JobState, RunSummary};

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` is the per-subscriber buffer before lagging drops events
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // No receivers is not an error
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    RunStarted {
        run_id: String,
        platforms: Vec<String>,
        dry_run: bool,
    },

    /// A job moved to a new state
    JobStateChanged {
        run_id: String,
        platform: String,
        state: JobState,
        attempts: u32,
        /// Error or skip reason, when the new state carries one
        detail: Option<String>,
    },

    /// Every platform of the run reached a terminal state
    RunCompleted { run_id: String, summary: RunSummary },
}

impl Event {
    pub fn run_id(&self) -> &str {
        match self {
            Event::RunStarted { run_id, .. }
            | Event::JobStateChanged { run_id, .. }
            | Event::RunCompleted { run_id, .. } => run_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changed(platform: &str, state: JobState) -> Event {
        Event::JobStateChanged {
            run_id: "r1".to_string(),
            platform: platform.to_string(),
            state,
            attempts: 1,
            detail: None,
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_events() {
        let bus = EventBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(changed("x", JobState::Succeeded));

        assert_eq!(first.recv().await.unwrap(), changed("x", JobState::Succeeded));
        assert_eq!(second.recv().await.unwrap().run_id(), "r1");
    }

    #[test]
    fn test_emit_without_subscribers_is_dropped() {
        let bus = EventBus::new(10);
        bus.emit(changed("x", JobState::Failed));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_loses_oldest() {
        let bus = EventBus::new(2);
        let mut receiver = bus.subscribe();
        for platform in ["a", "b", "c"] {
            bus.emit(changed(platform, JobState::Pending));
        }

        assert!(matches!(
            receiver.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert_eq!(receiver.recv().await.unwrap(), changed("b", JobState::Pending));
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let json = serde_json::to_value(Event::RunCompleted {
            run_id: "r1".to_string(),
            summary: RunSummary::PartialFailure,
        })
        .unwrap();
        assert_eq!(json["type"], "run_completed");
        assert_eq!(json["summary"], "partial_failure");
    }
}
