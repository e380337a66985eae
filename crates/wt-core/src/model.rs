//! Projects and their work records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::{InvalidInterval, elapsed_seconds, format_duration, format_money, money};
use crate::types::{ProjectId, Rate, RecordId};

/// One contiguous interval of timed work on a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRecord {
    pub id: RecordId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl WorkRecord {
    /// Creates a record whose end equals its start.
    pub const fn new(id: RecordId, start: DateTime<Utc>) -> Self {
        Self {
            id,
            start,
            end: start,
        }
    }

    /// Rebuilds a stored record. Fails if `end < start`.
    pub fn from_parts(
        id: RecordId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, InvalidInterval> {
        if end < start {
            return Err(InvalidInterval { start, end });
        }
        Ok(Self { id, start, end })
    }

    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Moves the end forward to `now`. Never moves it backwards, so a wall
    /// clock stepping back leaves the end where it was.
    pub fn advance(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        if now > self.end {
            self.end = now;
        }
        self.end
    }

    pub fn elapsed_seconds(&self) -> i64 {
        // end >= start holds for every constructed record
        elapsed_seconds(self.start, self.end).unwrap_or_default()
    }
}

/// A billable project with its work records in chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub rate: Rate,
    pub active: bool,
    pub records: Vec<WorkRecord>,
}

impl Project {
    /// Creates an active project with no records.
    pub const fn new(id: ProjectId, name: String, rate: Rate) -> Self {
        Self {
            id,
            name,
            rate,
            active: true,
            records: Vec::new(),
        }
    }

    /// Sum of the elapsed seconds of every record.
    pub fn elapsed_seconds(&self) -> i64 {
        self.records.iter().map(WorkRecord::elapsed_seconds).sum()
    }

    pub fn record(&self, id: RecordId) -> Option<&WorkRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn last_record(&self) -> Option<&WorkRecord> {
        self.records.last()
    }

    /// Start of the first record, if any.
    pub fn first_start(&self) -> Option<DateTime<Utc>> {
        self.records.first().map(WorkRecord::start)
    }

    /// End of the last record, if any.
    pub fn last_end(&self) -> Option<DateTime<Utc>> {
        self.records.last().map(WorkRecord::end)
    }

    pub fn totals(&self) -> Totals {
        Totals::new(self.elapsed_seconds(), self.rate)
    }

    pub fn record_totals(&self, record: &WorkRecord) -> Totals {
        Totals::new(record.elapsed_seconds(), self.rate)
    }
}

/// Derived display values for a span of work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Totals {
    pub seconds: i64,
    pub duration: String,
    pub money: f64,
    pub money_display: String,
}

impl Totals {
    pub fn new(seconds: i64, rate: Rate) -> Self {
        let amount = money(seconds, rate);
        Self {
            seconds,
            duration: format_duration(seconds),
            money: amount,
            money_display: format_money(amount),
        }
    }
}

/// In-memory project collection. Owns every project and record; everything
/// else refers into it by id.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    projects: Vec<Project>,
}

impl Ledger {
    pub const fn new(projects: Vec<Project>) -> Self {
        Self { projects }
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn get(&self, id: ProjectId) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: ProjectId) -> Option<&mut Project> {
        self.projects.iter_mut().find(|p| p.id == id)
    }

    pub fn push(&mut self, project: Project) {
        self.projects.push(project);
    }

    pub fn last(&self) -> Option<&Project> {
        self.projects.last()
    }

    /// Mutable access to a record of a project.
    pub fn record_mut(&mut self, project: ProjectId, record: RecordId) -> Option<&mut WorkRecord> {
        self.get_mut(project)?
            .records
            .iter_mut()
            .find(|r| r.id == record)
    }
}
