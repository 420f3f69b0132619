//! Shared utilities for classroll
//!
//! This crate provides:
//! - ID types (ParticipantToken, SessionKey, SubjectId)
//! - Time utilities (clock parsing, timestamp resolution, calendar days)
//! - Error types
//! - Default configuration path

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
