//! refrate Common Types
//!
//! This crate contains shared types used across the refrate workspace:
//! currency codes and the timestamp conventions exposed by converters.

pub mod currency;
pub mod time;

pub use currency::*;
pub use time::*;
