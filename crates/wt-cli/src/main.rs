use std::io::{self, BufReader};
use std::path::Path;
use std::sync::{Arc, mpsc};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wt_cli::commands::{project, projects, rate, start, status};
use wt_cli::{Cli, Commands, Config};
use wt_core::{Engine, NullSink, ProjectId, SystemClock, UpdateSink};

/// Load config, open the database and build the engine on top of it.
fn open_engine(
    config_path: Option<&Path>,
    sink: Arc<dyn UpdateSink>,
) -> Result<(Engine, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = wt_db::Database::open(&config.database_path)
        .context("failed to open database")?
        .with_fallback_rate(config.fallback_rate);
    let engine = Engine::load(db, Arc::new(SystemClock), sink, config.engine_config())
        .context("failed to load projects")?;
    Ok((engine, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr, command output to stdout
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let config_path = cli.config.as_deref();

    match &cli.command {
        Some(Commands::Projects { json }) => {
            let (engine, _config) = open_engine(config_path, Arc::new(NullSink))?;
            projects::run(&mut io::stdout().lock(), &engine, *json)?;
        }
        Some(Commands::Project(action)) => {
            let (mut engine, _config) = open_engine(config_path, Arc::new(NullSink))?;
            project::run(&mut io::stdout().lock(), &mut engine, action)?;
        }
        Some(Commands::Rate { rate: new_rate }) => {
            let (mut engine, _config) = open_engine(config_path, Arc::new(NullSink))?;
            rate::run(&mut io::stdout().lock(), &mut engine, *new_rate)?;
        }
        Some(Commands::Start {
            project: project_id,
            json,
        }) => {
            let sink = Arc::new(start::WriterSink::new(io::stdout(), *json));
            let (mut engine, _config) = open_engine(config_path, sink)?;

            let (stop_tx, stop_rx) = mpsc::channel();
            let signal_tx = stop_tx.clone();
            ctrlc::set_handler(move || {
                let _ = signal_tx.send(start::StopReason::Signal);
            })
            .context("failed to install signal handler")?;
            start::watch_input(BufReader::new(io::stdin()), stop_tx)
                .context("failed to watch stdin")?;

            start::run(&mut engine, project_id.map(ProjectId::from), &stop_rx)?;
            engine.shutdown().context("failed to stop timer")?;
        }
        Some(Commands::Status) => {
            let (engine, config) = open_engine(config_path, Arc::new(NullSink))?;
            status::run(&mut io::stdout().lock(), &engine, &config.database_path)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
