//! Updates published by the engine to the presentation layer.

use std::sync::mpsc::Sender;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::Totals;
use crate::types::{ProjectId, Rate, RecordId};

/// A change the presentation layer should render.
///
/// Every update carries the ids it concerns and freshly derived display
/// values; consumers do no time arithmetic of their own.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Update {
    /// The clock advanced the open record.
    Tick {
        project_id: ProjectId,
        record_id: RecordId,
        end: DateTime<Utc>,
        record: Totals,
        project: Totals,
    },
    /// A record was opened.
    Started {
        project_id: ProjectId,
        record_id: RecordId,
        start: DateTime<Utc>,
    },
    /// The open record was closed with its final end.
    Paused {
        project_id: ProjectId,
        record_id: RecordId,
        end: DateTime<Utc>,
        record: Totals,
        project: Totals,
    },
    Selected {
        project_id: ProjectId,
    },
    Finished {
        project_id: ProjectId,
    },
    ProjectCreated {
        project_id: ProjectId,
        name: String,
        rate: Rate,
    },
    ProjectRenamed {
        project_id: ProjectId,
        name: String,
    },
    RateChanged {
        project_id: ProjectId,
        rate: Rate,
        project: Totals,
    },
    /// A periodic save failed. The session keeps running.
    AutosaveFailed {
        record_id: RecordId,
        message: String,
    },
}

impl Update {
    /// Whether the update came from the background clock.
    pub const fn is_tick(&self) -> bool {
        matches!(self, Self::Tick { .. })
    }
}

/// Receives engine updates. Called from the control thread and from the
/// background clock and autosave threads.
pub trait UpdateSink: Send + Sync {
    fn publish(&self, update: Update);
}

impl UpdateSink for Sender<Update> {
    fn publish(&self, update: Update) {
        // A dropped receiver just means nobody is rendering.
        let _ = self.send(update);
    }
}

/// A sink that discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl UpdateSink for NullSink {
    fn publish(&self, _update: Update) {}
}
