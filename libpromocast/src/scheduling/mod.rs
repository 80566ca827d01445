//! Time-based holding of publish jobs
//!
//! - [`queue`]: jobs ordered by due time, released by `drain_due`
//! - [`clock`]: the time source, injectable for tests
//! - [`parse`]: turning user-supplied schedule strings into timestamps

pub mod clock;
pub mod parse;
pub mod queue;

pub use clock::{Clock, ManualClock, SystemClock};
pub use parse::parse_schedule;
pub use queue::{DrainDue, Enqueued, SchedulingQueue};
