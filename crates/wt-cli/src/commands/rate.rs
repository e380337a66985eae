//! Rate command: show or set the default hourly rate.

use std::io::Write;

use anyhow::{Context, Result};
use wt_core::{Engine, Rate, format_money};

/// Prints the default rate, or saves a new one when given.
pub fn run<W: Write>(writer: &mut W, engine: &mut Engine, rate: Option<Rate>) -> Result<()> {
    if let Some(rate) = rate {
        engine
            .set_default_rate(rate)
            .context("failed to save default rate")?;
        writeln!(writer, "Default rate set to {} per hour", format_money(rate.value()))?;
    } else {
        writeln!(
            writer,
            "Default rate: {} per hour",
            format_money(engine.default_rate().value())
        )?;
    }
    Ok(())
}
