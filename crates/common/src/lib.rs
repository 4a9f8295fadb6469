//! Shared plumbing for the validity proposer: logging setup and wall-clock access.

pub mod clock;
pub mod logging;

pub use clock::{Clock, ManualClock, SystemClock};
