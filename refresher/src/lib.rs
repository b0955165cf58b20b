//! refrate Refresher
//!
//! Long-running service that keeps one provider's rate cache warm, so hosts
//! reading the same cache directory always find recent committed rates.

pub mod config;
pub mod refresher;

pub use config::RefresherConfig;
pub use refresher::{CycleOutcome, Refresher};
