//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use wt_core::Rate;

/// Project work timer.
///
/// Times work sessions per project and derives money owed from each
/// project's hourly rate.
#[derive(Debug, Parser)]
#[command(name = "wt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List projects with their work records, newest first.
    Projects {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Create, rename, re-rate or finish a project.
    #[command(subcommand)]
    Project(ProjectAction),

    /// Show the default hourly rate, or set it.
    Rate {
        /// New default rate. Zero is allowed.
        rate: Option<Rate>,
    },

    /// Start the timer. Press Enter, close stdin, or send Ctrl-C to pause.
    Start {
        /// Project to time. Defaults to the last active project.
        project: Option<i64>,

        /// Print updates as JSON lines.
        #[arg(long)]
        json: bool,
    },

    /// Show database, default rate and current project.
    Status,
}

/// Project management actions.
#[derive(Debug, Subcommand)]
pub enum ProjectAction {
    /// Create a project.
    New {
        /// Project name.
        name: String,

        /// Hourly rate. Defaults to the default rate.
        #[arg(long)]
        rate: Option<Rate>,
    },

    /// Rename a project.
    Rename {
        /// Project ID.
        id: i64,

        /// New name.
        name: String,
    },

    /// Change a project's hourly rate.
    Rate {
        /// Project ID.
        id: i64,

        /// New hourly rate. Zero is allowed.
        rate: Rate,
    },

    /// Finish a project. Finished projects cannot be timed again.
    Finish {
        /// Project ID.
        id: i64,
    },
}
