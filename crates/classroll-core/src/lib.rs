//! Core attendance engine for classroll
//!
//! This crate is the heart of classroll, containing:
//! - Participant normalization and roster merging across batches
//! - Raw status derivation and the final status state machine
//!   (Ongoing: present/late/pending, Finalized: present/absent)
//! - Instructor lateness and tardiness rules
//! - Policy thresholds, tardiness conversion and D/F eligibility
//! - Per-session trackers and the registry that routes batches to them

mod deriver;
mod engine;
mod events;
mod participant;
mod registry;
mod roster;
mod rules;
mod session;
mod status;

pub use deriver::*;
pub use engine::*;
pub use events::*;
pub use participant::*;
pub use registry::*;
pub use roster::*;
pub use rules::*;
pub use session::*;
pub use status::*;
