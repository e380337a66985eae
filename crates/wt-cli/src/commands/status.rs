//! Status command: database, default rate and current project.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use wt_core::{Engine, format_money, format_status};

pub fn run<W: Write>(writer: &mut W, engine: &Engine, database_path: &Path) -> Result<()> {
    writeln!(writer, "Work timer status")?;
    writeln!(writer, "Database: {}", database_path.display())?;
    writeln!(
        writer,
        "Default rate: {} per hour",
        format_money(engine.default_rate().value())
    )?;

    let projects = engine.projects();
    let active = projects.iter().filter(|p| p.active).count();
    writeln!(writer, "Projects: {} ({active} active)", projects.len())?;

    match engine
        .current_project()
        .and_then(|id| projects.iter().find(|p| p.id == id))
    {
        Some(project) => {
            let totals = project.totals();
            writeln!(
                writer,
                "Current project: {} \"{}\" ({}), {} / {}",
                project.id,
                project.name,
                format_status(project.active),
                totals.duration,
                totals.money_display
            )?;
        }
        None => writeln!(writer, "Current project: none")?,
    }

    Ok(())
}
