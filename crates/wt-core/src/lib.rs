//! Core domain logic for the work timer.
//!
//! This crate contains:
//! - Money: elapsed time, duration and money formatting
//! - Model: projects and their work records
//! - Store: the persistence port and an in-memory implementation
//! - Engine: the timer state machine with its background clock and autosave

pub mod clock;
pub mod engine;
pub mod model;
pub mod money;
pub mod store;
mod types;
pub mod update;
mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Engine, EngineConfig, EngineError, EngineState, Precondition};
pub use model::{Ledger, Project, Totals, WorkRecord};
pub use money::{
    InvalidInterval, elapsed_seconds, format_duration, format_money, format_status,
    format_timestamp, money,
};
pub use store::{MemoryStore, ProjectPatch, StorageError, Store};
pub use types::{ProjectId, Rate, RecordId, ValidationError, validate_name};
pub use update::{NullSink, Update, UpdateSink};
