//! Background clock and autosave threads for an open record.
//!
//! Each worker waits on its own stop channel with a timeout equal to its
//! period: a timeout fires the worker, a disconnect stops it. Dropping the
//! sender is the stop flag and joining the thread is the quiesce handshake.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::clock::Clock;
use crate::model::{Ledger, Totals, WorkRecord};
use crate::store::Store;
use crate::types::{ProjectId, RecordId};
use crate::update::{Update, UpdateSink};

/// State shared between the control thread and the workers.
pub(crate) struct Shared {
    pub(crate) ledger: Mutex<Ledger>,
    pub(crate) store: Mutex<Box<dyn Store>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) sink: Arc<dyn UpdateSink>,
}

/// Locks a mutex, recovering the data if a worker panicked while holding it.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A periodic thread that can be stopped and joined.
struct Worker {
    name: &'static str,
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn<F>(name: &'static str, period: Duration, mut fire: F) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        if period.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{name} period must be non-zero"),
            ));
        }
        let (stop, signal) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                loop {
                    match signal.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => fire(),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!(worker = name, "worker stopped");
            })?;
        Ok(Self { name, stop, handle })
    }

    /// Signals the worker and blocks until it has returned.
    fn stop(self) {
        drop(self.stop);
        if self.handle.join().is_err() {
            error!(worker = self.name, "worker panicked");
        }
    }
}

/// The clock and autosave workers of one open record.
pub(crate) struct SessionWorkers {
    clock: Worker,
    autosave: Worker,
}

impl SessionWorkers {
    pub(crate) fn spawn(
        shared: &Arc<Shared>,
        project: ProjectId,
        record: RecordId,
        tick_interval: Duration,
        autosave_interval: Duration,
    ) -> io::Result<Self> {
        let clock_shared = Arc::clone(shared);
        let clock = Worker::spawn("wt-clock", tick_interval, move || {
            tick(&clock_shared, project, record);
        })?;

        let autosave_shared = Arc::clone(shared);
        let autosave = match Worker::spawn("wt-autosave", autosave_interval, move || {
            autosave(&autosave_shared, record);
        }) {
            Ok(worker) => worker,
            Err(err) => {
                clock.stop();
                return Err(err);
            }
        };

        Ok(Self { clock, autosave })
    }

    /// Stops both workers. No update from either is published after this
    /// returns.
    pub(crate) fn stop(self) {
        self.clock.stop();
        self.autosave.stop();
    }
}

/// Advances the open record to now (in memory only) and publishes totals.
fn tick(shared: &Shared, project_id: ProjectId, record_id: RecordId) {
    let now = shared.clock.now();
    let update = {
        let mut ledger = lock(&shared.ledger);
        let Some(project) = ledger.get_mut(project_id) else {
            error!(project = %project_id, "clock tick for unknown project");
            return;
        };
        let rate = project.rate;
        let Some(record) = project.records.iter_mut().find(|r| r.id == record_id) else {
            error!(record = %record_id, "clock tick for unknown record");
            return;
        };
        let end = record.advance(now);
        let record_totals = Totals::new(record.elapsed_seconds(), rate);
        Update::Tick {
            project_id,
            record_id,
            end,
            record: record_totals,
            project: project.totals(),
        }
    };
    shared.sink.publish(update);
}

/// Persists the open record's current end. Failures are reported, never fatal.
fn autosave(shared: &Shared, record_id: RecordId) {
    let end = {
        let ledger = lock(&shared.ledger);
        ledger
            .projects()
            .iter()
            .find_map(|p| p.record(record_id))
            .map(WorkRecord::end)
    };
    let Some(end) = end else {
        error!(record = %record_id, "autosave for unknown record");
        return;
    };

    let result = lock(&shared.store).update_work_record_end(record_id, end);
    match result {
        Ok(()) => debug!(record = %record_id, %end, "autosaved"),
        Err(err) => {
            warn!(record = %record_id, error = %err, "autosave failed");
            shared.sink.publish(Update::AutosaveFailed {
                record_id,
                message: err.to_string(),
            });
        }
    }
}
