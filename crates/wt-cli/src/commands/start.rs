//! Start command: run the timer until input or a termination signal asks it to stop.

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use wt_core::{Engine, ProjectId, Update, UpdateSink, WorkRecord, format_timestamp};

struct Output<W> {
    out: W,
    /// A tick line is on screen without a trailing newline.
    mid_line: bool,
}

/// Renders engine updates to a writer, either as text or as JSON lines.
///
/// Text mode redraws the tick line in place with `\r`.
pub struct WriterSink<W, Tz = Local> {
    output: Mutex<Output<W>>,
    tz: Tz,
    json: bool,
}

impl<W: Write> WriterSink<W> {
    pub fn new(out: W, json: bool) -> Self {
        Self::with_timezone(out, Local, json)
    }
}

impl<W: Write, Tz: TimeZone> WriterSink<W, Tz>
where
    Tz::Offset: std::fmt::Display,
{
    pub fn with_timezone(out: W, tz: Tz, json: bool) -> Self {
        Self {
            output: Mutex::new(Output {
                out,
                mid_line: false,
            }),
            tz,
            json,
        }
    }

    fn output(&self) -> MutexGuard<'_, Output<W>> {
        self.output.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes everything written so far.
    pub fn take(&self) -> W
    where
        W: Default,
    {
        std::mem::take(&mut self.output().out)
    }

    fn render(&self, update: &Update) -> Option<String> {
        match update {
            Update::Started {
                project_id,
                record_id,
                start,
            } => Some(format!(
                "Started project {project_id} at {} (record #{record_id}). Press Enter or Ctrl-C to pause.",
                format_timestamp(*start, &self.tz)
            )),
            Update::Tick {
                record, project, ..
            } => Some(format!(
                "{} / {} (project {} / {})",
                record.duration, record.money_display, project.duration, project.money_display
            )),
            Update::Paused {
                project_id,
                record_id,
                end,
                record,
                project,
            } => Some(format!(
                "Paused project {project_id} at {}: record #{record_id} {} / {}, project total {} / {}",
                format_timestamp(*end, &self.tz),
                record.duration,
                record.money_display,
                project.duration,
                project.money_display
            )),
            Update::AutosaveFailed { record_id, message } => Some(format!(
                "warning: autosave of record #{record_id} failed: {message}"
            )),
            _ => None,
        }
    }

    fn write(&self, update: &Update) -> std::io::Result<()> {
        let mut output = self.output();
        if self.json {
            let line = serde_json::to_string(update).map_err(std::io::Error::other)?;
            writeln!(output.out, "{line}")?;
            return output.out.flush();
        }

        let Some(text) = self.render(update) else {
            return Ok(());
        };
        if update.is_tick() {
            write!(output.out, "\r{text}")?;
            output.mid_line = true;
        } else {
            if output.mid_line {
                writeln!(output.out)?;
                output.mid_line = false;
            }
            writeln!(output.out, "{text}")?;
        }
        output.out.flush()
    }
}

impl<W, Tz> UpdateSink for WriterSink<W, Tz>
where
    W: Write + Send,
    Tz: TimeZone + Send + Sync,
    Tz::Offset: std::fmt::Display,
{
    fn publish(&self, update: Update) {
        if let Err(err) = self.write(&update) {
            tracing::debug!(error = %err, "failed to render update");
        }
    }
}

/// Why a running timer was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A line or EOF arrived on the input.
    Input,
    /// SIGINT or SIGTERM.
    Signal,
}

/// Sends [`StopReason::Input`] once `input` yields a line or reaches EOF.
///
/// Only the arrival matters, so the bytes need not be UTF-8. A read error
/// also stops the timer.
pub fn watch_input<R>(mut input: R, stop: Sender<StopReason>) -> io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("wt-input".to_string())
        .spawn(move || {
            if let Err(err) = input.read_until(b'\n', &mut Vec::new()) {
                tracing::warn!(error = %err, "failed to read pause signal");
            }
            let _ = stop.send(StopReason::Input);
        })
}

/// Selects `project` if given, starts the timer and pauses once a reason
/// arrives on `stop`.
pub fn run(
    engine: &mut Engine,
    project: Option<ProjectId>,
    stop: &Receiver<StopReason>,
) -> Result<WorkRecord> {
    if let Some(id) = project {
        engine
            .select_project(id)
            .with_context(|| format!("failed to select project {id}"))?;
    }
    engine.start().context("failed to start timer")?;

    // Every sender gone means nothing can ask to stop any more.
    let reason = stop.recv().unwrap_or(StopReason::Input);
    tracing::debug!(?reason, "stopping timer");

    let record = engine.pause().context("failed to pause timer")?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::mpsc;

    use chrono::{Duration, Utc};
    use wt_core::{EngineConfig, EngineState, ManualClock, MemoryStore, Rate, RecordId, Totals};

    /// Renders through `inner`; once the timer starts, advances the clock and
    /// asks to stop.
    struct StopAfterStart {
        inner: Arc<WriterSink<Vec<u8>, Utc>>,
        clock: Arc<ManualClock>,
        seconds: i64,
        stop: Sender<StopReason>,
    }

    impl UpdateSink for StopAfterStart {
        fn publish(&self, update: Update) {
            let started = matches!(update, Update::Started { .. });
            self.inner.publish(update);
            if started {
                self.clock.advance(Duration::seconds(self.seconds));
                let _ = self.stop.send(StopReason::Signal);
            }
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
        ))
    }

    fn load(clock: Arc<ManualClock>, sink: Arc<dyn UpdateSink>) -> Engine {
        Engine::load(
            MemoryStore::new(Rate::new(500.0).unwrap()),
            clock,
            sink,
            EngineConfig::default(),
        )
        .unwrap()
    }

    fn setup(json: bool) -> (Engine, Arc<WriterSink<Vec<u8>, Utc>>) {
        let sink = Arc::new(WriterSink::with_timezone(Vec::new(), Utc, json));
        (load(clock(), sink.clone()), sink)
    }

    /// A stop channel that already holds one request.
    fn stop_now() -> Receiver<StopReason> {
        let (tx, rx) = mpsc::channel();
        tx.send(StopReason::Input).unwrap();
        rx
    }

    #[test]
    fn test_start_runs_until_stopped() {
        let clock = clock();
        let output = Arc::new(WriterSink::with_timezone(Vec::new(), Utc, false));
        let (tx, rx) = mpsc::channel();
        let sink = Arc::new(StopAfterStart {
            inner: output.clone(),
            clock: clock.clone(),
            seconds: 125,
            stop: tx,
        });
        let mut engine = load(clock, sink);
        let project = engine.create_project("Acme", None).unwrap();

        let record = run(&mut engine, Some(project.id), &rx).unwrap();

        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(record.elapsed_seconds(), 125);

        let output = String::from_utf8(output.take()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines[0],
            "Started project 1 at 09:00:00 10.03.25 (record #1). Press Enter or Ctrl-C to pause."
        );
        assert_eq!(
            lines.last().copied(),
            Some(
                "Paused project 1 at 09:02:05 10.03.25: record #1 2 м. 5 с. / 17.36 руб., \
                 project total 2 м. 5 с. / 17.36 руб."
            )
        );
    }

    #[test]
    fn test_start_pauses_on_eof() {
        let (mut engine, _sink) = setup(false);
        engine.create_project("Acme", None).unwrap();

        let (tx, rx) = mpsc::channel();
        watch_input(std::io::empty(), tx).unwrap();
        let record = run(&mut engine, None, &rx).unwrap();

        assert_eq!(record.elapsed_seconds(), 0);
        assert!(!engine.is_running());
        assert_eq!(engine.project(ProjectId::from(1)).unwrap().records.len(), 1);
    }

    #[test]
    fn test_non_utf8_input_still_pauses() {
        let (mut engine, _sink) = setup(false);
        engine.create_project("Acme", None).unwrap();

        let (tx, rx) = mpsc::channel();
        let input: &'static [u8] = &[0xff, 0xfe, b'\n'];
        watch_input(input, tx).unwrap();
        run(&mut engine, None, &rx).unwrap();

        assert!(!engine.is_running());
    }

    #[test]
    fn test_watch_input_reports_input() {
        let (tx, rx) = mpsc::channel();
        let input: &'static [u8] = &[0xc3, 0x28, b'\n', b'x'];
        watch_input(input, tx).unwrap().join().unwrap();
        assert_eq!(rx.recv(), Ok(StopReason::Input));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disconnected_stop_channel_pauses() {
        let (mut engine, _sink) = setup(false);
        engine.create_project("Acme", None).unwrap();

        let (tx, rx) = mpsc::channel::<StopReason>();
        drop(tx);
        run(&mut engine, None, &rx).unwrap();
        assert!(!engine.is_running());
    }

    #[test]
    fn test_start_without_project_fails() {
        let (mut engine, _sink) = setup(false);
        let err = run(&mut engine, None, &stop_now()).unwrap_err();
        assert_eq!(err.to_string(), "failed to start timer");
        assert!(!engine.is_running());
    }

    #[test]
    fn test_json_lines() {
        let (mut engine, sink) = setup(true);
        engine.create_project("Acme", None).unwrap();
        run(&mut engine, None, &stop_now()).unwrap();

        let output = String::from_utf8(sink.take()).unwrap();
        let types: Vec<String> = output
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["type"].as_str().unwrap().to_string()
            })
            .filter(|t| t != "tick")
            .collect();
        assert_eq!(types, ["project_created", "selected", "started", "paused"]);
    }

    #[test]
    fn test_tick_line_is_redrawn_in_place() {
        let sink = WriterSink::with_timezone(Vec::new(), Utc, false);
        let totals = Totals::new(3, Rate::new(3600.0).unwrap());
        let tick = Update::Tick {
            project_id: ProjectId::from(1),
            record_id: RecordId::from(1),
            end: Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 3).unwrap(),
            record: totals.clone(),
            project: totals.clone(),
        };
        sink.publish(tick.clone());
        sink.publish(tick);
        sink.publish(Update::AutosaveFailed {
            record_id: RecordId::from(1),
            message: "disk full".to_string(),
        });

        assert_eq!(
            String::from_utf8(sink.take()).unwrap(),
            "\r3 с. / 3.00 руб. (project 3 с. / 3.00 руб.)\
             \r3 с. / 3.00 руб. (project 3 с. / 3.00 руб.)\n\
             warning: autosave of record #1 failed: disk full\n"
        );
    }
}
