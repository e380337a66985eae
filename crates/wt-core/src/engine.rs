//! The timer engine: one open work record at a time.
//!
//! The engine is driven from a single control thread through `&mut self`.
//! While a record is open, a clock thread advances its end in memory and an
//! autosave thread persists it. [`Engine::pause`] stops and joins both
//! before writing the final end, so no background update can land after it
//! returns.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::model::{Ledger, Project, Totals, WorkRecord};
use crate::money::{InvalidInterval, elapsed_seconds};
use crate::store::{ProjectPatch, StorageError, Store};
use crate::types::{ProjectId, Rate, RecordId, ValidationError, validate_name};
use crate::update::{Update, UpdateSink};
use crate::worker::{SessionWorkers, Shared, lock};

/// A rejected operation. Nothing changed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// The operation is not allowed while the timer is running.
    #[error("the timer is running")]
    Busy,
    #[error("no project selected")]
    NoProject,
    #[error("the timer is already running")]
    AlreadyRunning,
    #[error("the timer is not running")]
    NotRunning,
    #[error("the project is finished")]
    ProjectFinished,
}

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Precondition(#[from] Precondition),
    #[error("project {0} not found")]
    UnknownProject(ProjectId),
    #[error(transparent)]
    InvalidInterval(#[from] InvalidInterval),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to spawn timer thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Periods of the background workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub tick_interval: Duration,
    pub autosave_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            autosave_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
}

struct Session {
    project: ProjectId,
    record: RecordId,
    workers: SessionWorkers,
}

/// Timer state machine over a project ledger and a [`Store`].
pub struct Engine {
    shared: Arc<Shared>,
    config: EngineConfig,
    default_rate: Rate,
    current_project: Option<ProjectId>,
    current_record: Option<RecordId>,
    session: Option<Session>,
}

impl Engine {
    /// Loads every project from `store` and builds an idle engine.
    ///
    /// The last project becomes current if it is still active.
    pub fn load(
        store: impl Store + 'static,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn UpdateSink>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let projects = store.load_all()?;
        let default_rate = store.load_default_rate()?;
        let ledger = Ledger::new(projects);
        let store: Box<dyn Store> = Box::new(store);
        let current_project = ledger.last().filter(|p| p.active).map(|p| p.id);
        info!(
            projects = ledger.projects().len(),
            current = ?current_project,
            "engine loaded"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                ledger: Mutex::new(ledger),
                store: Mutex::new(store),
                clock,
                sink,
            }),
            config,
            default_rate,
            current_project,
            current_record: None,
            session: None,
        })
    }

    pub const fn state(&self) -> EngineState {
        if self.session.is_some() {
            EngineState::Running
        } else {
            EngineState::Idle
        }
    }

    pub const fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub const fn current_project(&self) -> Option<ProjectId> {
        self.current_project
    }

    /// The open record while running, or the last record closed by `pause`.
    pub const fn current_record(&self) -> Option<RecordId> {
        self.current_record
    }

    pub const fn default_rate(&self) -> Rate {
        self.default_rate
    }

    /// Snapshot of all projects in creation order.
    pub fn projects(&self) -> Vec<Project> {
        lock(&self.shared.ledger).projects().to_vec()
    }

    /// Snapshot of one project.
    pub fn project(&self, id: ProjectId) -> Option<Project> {
        lock(&self.shared.ledger).get(id).cloned()
    }

    pub fn summary(&self, id: ProjectId) -> Option<Totals> {
        lock(&self.shared.ledger).get(id).map(Project::totals)
    }

    /// Makes `id` the current project. Finished projects may be selected but
    /// not started.
    pub fn select_project(&mut self, id: ProjectId) -> Result<(), EngineError> {
        if self.is_running() {
            return Err(Precondition::Busy.into());
        }
        self.ensure_known(id)?;
        self.current_project = Some(id);
        debug!(project = %id, "project selected");
        self.publish(Update::Selected { project_id: id });
        Ok(())
    }

    /// Opens a new record on the current project and starts the workers.
    pub fn start(&mut self) -> Result<WorkRecord, EngineError> {
        if self.is_running() {
            return Err(Precondition::AlreadyRunning.into());
        }
        let project_id = self.current_project.ok_or(Precondition::NoProject)?;
        let active = lock(&self.shared.ledger)
            .get(project_id)
            .map(|p| p.active)
            .ok_or(EngineError::UnknownProject(project_id))?;
        if !active {
            return Err(Precondition::ProjectFinished.into());
        }

        let now = self.shared.clock.now();
        let record = lock(&self.shared.store).create_work_record(project_id, now)?;
        lock(&self.shared.ledger)
            .get_mut(project_id)
            .ok_or(EngineError::UnknownProject(project_id))?
            .records
            .push(record.clone());

        let workers = match self.spawn_workers(project_id, record.id) {
            Ok(workers) => workers,
            Err(err) => {
                // The stored row stays behind as a zero-length record.
                if let Some(project) = lock(&self.shared.ledger).get_mut(project_id) {
                    project.records.retain(|r| r.id != record.id);
                }
                error!(record = %record.id, error = %err, "failed to start timer workers");
                return Err(err);
            }
        };
        self.session = Some(Session {
            project: project_id,
            record: record.id,
            workers,
        });
        self.current_record = Some(record.id);

        info!(project = %project_id, record = %record.id, start = %record.start(), "timer started");
        self.publish(Update::Started {
            project_id,
            record_id: record.id,
            start: record.start(),
        });
        Ok(record)
    }

    /// Stops the workers, then writes and persists the final end.
    ///
    /// If the final write fails the workers are restarted, the timer keeps
    /// running and the storage error is returned.
    pub fn pause(&mut self) -> Result<WorkRecord, EngineError> {
        let Some(session) = self.session.take() else {
            return Err(Precondition::NotRunning.into());
        };
        let Session {
            project: project_id,
            record: record_id,
            workers,
        } = session;
        workers.stop();

        let now = self.shared.clock.now();
        let (record, update) = {
            let mut ledger = lock(&self.shared.ledger);
            let project = ledger
                .get_mut(project_id)
                .ok_or(EngineError::UnknownProject(project_id))?;
            let rate = project.rate;
            let record = project
                .records
                .iter_mut()
                .find(|r| r.id == record_id)
                .ok_or(StorageError::NotFound {
                    entity: "work record",
                    id: record_id.get(),
                })?;
            let end = record.advance(now);
            let seconds = elapsed_seconds(record.start(), end).inspect_err(|err| {
                error!(record = %record_id, error = %err, "record interval invariant broken");
            })?;
            let record = record.clone();
            let update = Update::Paused {
                project_id,
                record_id,
                end,
                record: Totals::new(seconds, rate),
                project: project.totals(),
            };
            (record, update)
        };

        let persisted = lock(&self.shared.store).update_work_record_end(record_id, record.end());
        if let Err(err) = persisted {
            error!(record = %record_id, error = %err, "failed to persist final end, timer keeps running");
            let workers = self.spawn_workers(project_id, record_id)?;
            self.session = Some(Session {
                project: project_id,
                record: record_id,
                workers,
            });
            return Err(err.into());
        }

        info!(project = %project_id, record = %record_id, end = %record.end(), "timer paused");
        self.publish(update);
        Ok(record)
    }

    /// Closes a project for good. The running project cannot be finished.
    pub fn finish_project(&mut self, id: ProjectId) -> Result<(), EngineError> {
        if self.session.as_ref().is_some_and(|s| s.project == id) {
            return Err(Precondition::Busy.into());
        }
        let active = lock(&self.shared.ledger)
            .get(id)
            .map(|p| p.active)
            .ok_or(EngineError::UnknownProject(id))?;
        if !active {
            return Ok(());
        }

        lock(&self.shared.store).update_project(id, &ProjectPatch::finished())?;
        if let Some(project) = lock(&self.shared.ledger).get_mut(id) {
            project.active = false;
        }
        info!(project = %id, "project finished");
        self.publish(Update::Finished { project_id: id });
        Ok(())
    }

    /// Creates a project, using the default rate when none is given.
    ///
    /// The new project becomes current unless the timer is running.
    pub fn create_project(
        &mut self,
        name: &str,
        rate: Option<Rate>,
    ) -> Result<Project, EngineError> {
        let name = validate_name(name)?;
        let rate = rate.unwrap_or(self.default_rate);
        let project = lock(&self.shared.store).create_project(&name, rate)?;
        lock(&self.shared.ledger).push(project.clone());
        info!(project = %project.id, name = %project.name, "project created");
        self.publish(Update::ProjectCreated {
            project_id: project.id,
            name: project.name.clone(),
            rate: project.rate,
        });

        if !self.is_running() {
            self.current_project = Some(project.id);
            self.publish(Update::Selected {
                project_id: project.id,
            });
        }
        Ok(project)
    }

    pub fn rename_project(&mut self, id: ProjectId, name: &str) -> Result<(), EngineError> {
        let name = validate_name(name)?;
        self.ensure_known(id)?;
        lock(&self.shared.store).update_project(id, &ProjectPatch::name(name.clone()))?;
        if let Some(project) = lock(&self.shared.ledger).get_mut(id) {
            project.name.clone_from(&name);
        }
        info!(project = %id, %name, "project renamed");
        self.publish(Update::ProjectRenamed {
            project_id: id,
            name,
        });
        Ok(())
    }

    /// Changes a project's rate. Derived money everywhere follows the new
    /// rate, including the open record on the next tick.
    pub fn set_project_rate(&mut self, id: ProjectId, rate: Rate) -> Result<(), EngineError> {
        self.ensure_known(id)?;
        lock(&self.shared.store).update_project(id, &ProjectPatch::rate(rate))?;
        let totals = {
            let mut ledger = lock(&self.shared.ledger);
            let project = ledger.get_mut(id).ok_or(EngineError::UnknownProject(id))?;
            project.rate = rate;
            project.totals()
        };
        info!(project = %id, %rate, "project rate changed");
        self.publish(Update::RateChanged {
            project_id: id,
            rate,
            project: totals,
        });
        Ok(())
    }

    pub fn set_default_rate(&mut self, rate: Rate) -> Result<(), EngineError> {
        lock(&self.shared.store).save_default_rate(rate)?;
        self.default_rate = rate;
        info!(%rate, "default rate changed");
        Ok(())
    }

    /// Pauses if running. Call before exiting so the tail of the open
    /// record is not lost.
    pub fn shutdown(mut self) -> Result<(), EngineError> {
        if self.is_running() {
            self.pause()?;
        }
        Ok(())
    }

    fn ensure_known(&self, id: ProjectId) -> Result<(), EngineError> {
        if lock(&self.shared.ledger).get(id).is_none() {
            return Err(EngineError::UnknownProject(id));
        }
        Ok(())
    }

    fn spawn_workers(
        &self,
        project: ProjectId,
        record: RecordId,
    ) -> Result<SessionWorkers, EngineError> {
        SessionWorkers::spawn(
            &self.shared,
            project,
            record,
            self.config.tick_interval,
            self.config.autosave_interval,
        )
        .map_err(EngineError::Spawn)
    }

    fn publish(&self, update: Update) {
        self.shared.sink.publish(update);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if !self.is_running() {
            return;
        }
        if let Err(err) = self.pause() {
            error!(error = %err, "failed to pause timer on shutdown");
        }
    }
}
