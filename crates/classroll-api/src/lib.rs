//! Plain-data contracts for classroll
//!
//! This crate defines the data exchanged between the core and its
//! collaborators:
//! - Inbound event batches from the capture agent
//! - Outbound per-participant results
//! - Schedule input and policy outputs
//! - Progress events

mod events;
mod types;

pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
