//! Persistence port used by the timer engine.
//!
//! The engine never assumes atomicity across calls; each call either
//! succeeds or fails on its own.

use std::error::Error as StdError;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Project, WorkRecord};
use crate::types::{ProjectId, Rate, RecordId};

/// Errors raised by a [`Store`] implementation.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The referenced row does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    /// The backend failed (I/O, corruption, unavailable).
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn StdError + Send + Sync>),
}

impl StorageError {
    /// Wraps any backend error.
    pub fn backend(err: impl StdError + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// Partial project update. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub rate: Option<Rate>,
    pub active: Option<bool>,
}

impl ProjectPatch {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn rate(rate: Rate) -> Self {
        Self {
            rate: Some(rate),
            ..Self::default()
        }
    }

    pub fn finished() -> Self {
        Self {
            active: Some(false),
            ..Self::default()
        }
    }

    fn apply(&self, project: &mut Project) {
        if let Some(name) = &self.name {
            project.name.clone_from(name);
        }
        if let Some(rate) = self.rate {
            project.rate = rate;
        }
        if let Some(active) = self.active {
            project.active = active;
        }
    }
}

/// Durable storage for projects, work records and the default rate.
pub trait Store: Send {
    /// All projects with their records, in creation order.
    fn load_all(&self) -> Result<Vec<Project>, StorageError>;

    fn load_default_rate(&self) -> Result<Rate, StorageError>;

    fn save_default_rate(&mut self, rate: Rate) -> Result<(), StorageError>;

    /// Creates an active project with no records.
    fn create_project(&mut self, name: &str, rate: Rate) -> Result<Project, StorageError>;

    fn update_project(&mut self, id: ProjectId, patch: &ProjectPatch) -> Result<(), StorageError>;

    /// Creates a record with `end == start`.
    fn create_work_record(
        &mut self,
        project: ProjectId,
        start: DateTime<Utc>,
    ) -> Result<WorkRecord, StorageError>;

    fn update_work_record_end(
        &mut self,
        id: RecordId,
        end: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}

/// A [`Store`] kept entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    projects: Vec<Project>,
    default_rate: Rate,
    next_project_id: i64,
    next_record_id: i64,
}

impl MemoryStore {
    pub fn new(default_rate: Rate) -> Self {
        Self {
            default_rate,
            ..Self::default()
        }
    }

    fn project_mut(&mut self, id: ProjectId) -> Result<&mut Project, StorageError> {
        self.projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StorageError::NotFound {
                entity: "project",
                id: id.get(),
            })
    }
}

impl Store for MemoryStore {
    fn load_all(&self) -> Result<Vec<Project>, StorageError> {
        Ok(self.projects.clone())
    }

    fn load_default_rate(&self) -> Result<Rate, StorageError> {
        Ok(self.default_rate)
    }

    fn save_default_rate(&mut self, rate: Rate) -> Result<(), StorageError> {
        self.default_rate = rate;
        Ok(())
    }

    fn create_project(&mut self, name: &str, rate: Rate) -> Result<Project, StorageError> {
        self.next_project_id += 1;
        let project = Project::new(ProjectId::from(self.next_project_id), name.to_string(), rate);
        self.projects.push(project.clone());
        Ok(project)
    }

    fn update_project(&mut self, id: ProjectId, patch: &ProjectPatch) -> Result<(), StorageError> {
        patch.apply(self.project_mut(id)?);
        Ok(())
    }

    fn create_work_record(
        &mut self,
        project: ProjectId,
        start: DateTime<Utc>,
    ) -> Result<WorkRecord, StorageError> {
        self.next_record_id += 1;
        let record = WorkRecord::new(RecordId::from(self.next_record_id), start);
        self.project_mut(project)?.records.push(record.clone());
        Ok(record)
    }

    fn update_work_record_end(
        &mut self,
        id: RecordId,
        end: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let record = self
            .projects
            .iter_mut()
            .flat_map(|p| p.records.iter_mut())
            .find(|r| r.id == id)
            .ok_or(StorageError::NotFound {
                entity: "work record",
                id: id.get(),
            })?;
        *record = WorkRecord::from_parts(id, record.start(), end).map_err(StorageError::backend)?;
        Ok(())
    }
}
