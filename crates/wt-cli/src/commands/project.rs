//! Project management: create, rename, change rate, finish.

use std::io::Write;

use anyhow::{Context, Result};
use wt_core::{Engine, ProjectId, Rate, format_money};

use crate::ProjectAction;

/// Runs a project action.
pub fn run<W: Write>(writer: &mut W, engine: &mut Engine, action: &ProjectAction) -> Result<()> {
    match action {
        ProjectAction::New { name, rate } => {
            let project = engine
                .create_project(name, *rate)
                .context("failed to create project")?;
            writeln!(
                writer,
                "Created project {} \"{}\" at {} per hour",
                project.id,
                project.name,
                format_money(project.rate.value())
            )?;
        }
        ProjectAction::Rename { id, name } => {
            let id = ProjectId::from(*id);
            engine
                .rename_project(id, name)
                .with_context(|| format!("failed to rename project {id}"))?;
            writeln!(writer, "Renamed project {id} to \"{}\"", name.trim())?;
        }
        ProjectAction::Rate { id, rate } => set_rate(writer, engine, ProjectId::from(*id), *rate)?,
        ProjectAction::Finish { id } => {
            let id = ProjectId::from(*id);
            engine
                .finish_project(id)
                .with_context(|| format!("failed to finish project {id}"))?;
            writeln!(writer, "Finished project {id}")?;
        }
    }
    Ok(())
}

fn set_rate<W: Write>(writer: &mut W, engine: &mut Engine, id: ProjectId, rate: Rate) -> Result<()> {
    engine
        .set_project_rate(id, rate)
        .with_context(|| format!("failed to change rate of project {id}"))?;
    let totals = engine
        .summary(id)
        .with_context(|| format!("project {id} disappeared"))?;
    writeln!(
        writer,
        "Project {id} rate is now {} per hour (earned {})",
        format_money(rate.value()),
        totals.money_display
    )?;
    Ok(())
}
