//! Promocast - publish one piece of content to many platforms
//!
//! This library adapts a content bundle to each target platform's
//! constraints, schedules the resulting jobs, and dispatches them through
//! rate-limited, retrying publishers, collecting one outcome per platform.

pub mod adapters;
pub mod archive;
pub mod cancel;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod orchestrator;
pub mod publishers;
pub mod rate_limiter;
pub mod scheduling;
pub mod types;

// Re-export commonly used types
pub use adapters::AdapterKind;
pub use archive::{Archive, RunRecord};
pub use cancel::CancellationToken;
pub use config::{Config, PlatformRegistry, PlatformSpec};
pub use engine::{Adaptation, ContentAdaptationEngine};
pub use error::{PlatformError, PromocastError, Result};
pub use events::{Event, EventBus};
pub use orchestrator::{CancelOutcome, PublishOptions, PublishOrchestrator};
pub use publishers::{Publisher, PublisherRegistry};
pub use types::{
    ContentBundle, JobState, MediaKind, MediaRef, PlatformPayload, PublishJob, PublishReport,
    ReportEntry, RunSummary,
};
