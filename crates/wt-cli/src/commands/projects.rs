//! Projects command: a table of projects and their work records.
//!
//! Projects and records are listed newest first. Every derived value comes
//! from `wt_core`; nothing here does time arithmetic.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone, Utc};
use serde::Serialize;
use wt_core::{
    Engine, Project, ProjectId, RecordId, Totals, format_money, format_status, format_timestamp,
};

/// A project row for JSON output.
#[derive(Debug, Serialize)]
pub struct ProjectEntry {
    pub id: ProjectId,
    pub name: String,
    pub active: bool,
    pub status: &'static str,
    pub rate: f64,
    pub current: bool,
    pub totals: Totals,
    pub records: Vec<RecordEntry>,
}

/// A work record row for JSON output.
#[derive(Debug, Serialize)]
pub struct RecordEntry {
    pub id: RecordId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub totals: Totals,
}

pub fn entries(projects: &[Project], current: Option<ProjectId>) -> Vec<ProjectEntry> {
    projects
        .iter()
        .rev()
        .map(|project| ProjectEntry {
            id: project.id,
            name: project.name.clone(),
            active: project.active,
            status: format_status(project.active),
            rate: project.rate.value(),
            current: current == Some(project.id),
            totals: project.totals(),
            records: project
                .records
                .iter()
                .rev()
                .map(|record| RecordEntry {
                    id: record.id,
                    start: record.start(),
                    end: record.end(),
                    totals: project.record_totals(record),
                })
                .collect(),
        })
        .collect()
}

fn optional_timestamp<Tz: TimeZone>(timestamp: Option<DateTime<Utc>>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    timestamp.map_or_else(String::new, |t| format_timestamp(t, tz))
}

/// Formats projects as a table, rendering timestamps in `tz`.
pub fn format_projects<Tz: TimeZone>(
    projects: &[Project],
    current: Option<ProjectId>,
    tz: &Tz,
) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut output = String::new();

    if projects.is_empty() {
        writeln!(output, "No projects yet.").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "Hint: Run 'wt project new <name>' to create one.").unwrap();
        return output;
    }

    writeln!(
        output,
        "{:<6}  {:<20}  {:<8}  {:>12}  {:<17}  {:<17}  {:>16}  {:>14}",
        "ID", "Name", "Status", "Rate", "Start", "End", "Time", "Money"
    )
    .unwrap();

    for project in projects.iter().rev() {
        let marker = if current == Some(project.id) { "*" } else { " " };
        let totals = project.totals();
        writeln!(
            output,
            "{:<6}  {:<20}  {:<8}  {:>12}  {:<17}  {:<17}  {:>16}  {:>14}",
            format!("{marker}{}", project.id),
            project.name,
            format_status(project.active),
            format_money(project.rate.value()),
            optional_timestamp(project.first_start(), tz),
            optional_timestamp(project.last_end(), tz),
            totals.duration,
            totals.money_display,
        )
        .unwrap();

        for record in project.records.iter().rev() {
            let totals = project.record_totals(record);
            writeln!(
                output,
                "{:<6}  {:<20}  {:<8}  {:>12}  {:<17}  {:<17}  {:>16}  {:>14}",
                "",
                format!("  #{}", record.id),
                "",
                "",
                format_timestamp(record.start(), tz),
                format_timestamp(record.end(), tz),
                totals.duration,
                totals.money_display,
            )
            .unwrap();
        }
    }

    output
}

/// Runs the projects command.
pub fn run<W: Write>(writer: &mut W, engine: &Engine, json: bool) -> Result<()> {
    let projects = engine.projects();
    if json {
        let entries = entries(&projects, engine.current_project());
        writeln!(writer, "{}", serde_json::to_string_pretty(&entries)?)?;
    } else {
        write!(
            writer,
            "{}",
            format_projects(&projects, engine.current_project(), &Local)
        )?;
    }
    Ok(())
}
