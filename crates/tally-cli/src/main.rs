use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tally_cli::commands::{log, project, report, session, status, task, util};
use tally_cli::{
    Cli, Commands, Config, PeriodArgs, ProjectAction, ReportKind, SessionTarget, TaskAction, exit,
};
use tally_core::{Clock, SessionEngine, SystemClock, Transition};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(tally_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = tally_db::Database::open(&config.database_path).with_context(|| {
        format!("failed to open {}", config.database_path.display())
    })?;
    Ok((db, config))
}

const fn period_from(args: &PeriodArgs) -> report::Period {
    if args.last_week {
        report::Period::LastWeek
    } else if args.day {
        report::Period::Day
    } else if args.last_day {
        report::Period::LastDay
    } else {
        report::Period::Week
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit::code_for(&err))
        }
    }
}

#[allow(clippy::too_many_lines)]
fn run(cli: &Cli) -> Result<()> {
    let Some(command) = &cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let (mut db, config) = open_database(cli.config.as_deref())?;
    let engine = SessionEngine::new(SystemClock, config.start_policy());
    let now = engine.clock().now();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Commands::Project(action) => match action {
            ProjectAction::Add { name, description } => {
                project::add(&mut out, &mut db, name, description.as_deref(), now)?;
            }
            ProjectAction::List { json } => project::list(&mut out, &db, *json)?,
        },
        Commands::Task(action) => match action {
            TaskAction::Add {
                project,
                title,
                description,
                size,
                estimate,
                tags,
            } => {
                let args = task::AddArgs {
                    project,
                    title,
                    description: description.as_deref(),
                    size: *size,
                    estimate: estimate.as_deref(),
                    tags,
                };
                task::add(&mut out, &mut db, &args, now)?;
            }
            TaskAction::List {
                project,
                state,
                json,
            } => task::list(&mut out, &db, project.as_deref(), *state, *json)?,
            TaskAction::Show { task: id, json } => task::show(&mut out, &db, *id, *json, now)?,
            TaskAction::Edit {
                task: id,
                title,
                description,
                size,
                estimate,
            } => {
                let args = task::EditArgs {
                    title: title.as_deref(),
                    description: description.as_deref(),
                    size: *size,
                    estimate: estimate.as_deref(),
                };
                task::edit(&mut out, &mut db, *id, &args, now)?;
            }
            TaskAction::State { task: id, state } => {
                task::set_state(&mut out, &mut db, *id, *state, now)?;
            }
            TaskAction::Tag { task: id, tag } => task::tag(&mut out, &mut db, *id, tag)?,
            TaskAction::Untag { task: id, tag } => task::untag(&mut out, &mut db, *id, tag)?,
        },
        Commands::Start { task: id, at } => {
            let at = util::parse_at(at.as_deref(), now)?;
            session::start(&mut out, &mut db, &engine, *id, at)?;
        }
        Commands::Pause(target) => {
            transition(&mut out, &mut db, &engine, Transition::Pause, target, now)?;
        }
        Commands::Resume(target) => {
            transition(&mut out, &mut db, &engine, Transition::Resume, target, now)?;
        }
        Commands::Stop(target) => {
            transition(&mut out, &mut db, &engine, Transition::Stop, target, now)?;
        }
        Commands::Status { json } => status::run(&mut out, &db, &engine, &config, *json)?,
        Commands::Log {
            task: id,
            limit,
            json,
        } => log::run(&mut out, &db, *id, *limit, *json, now)?,
        Commands::Report(kind) => match kind {
            ReportKind::Spent { period, json } => {
                report::spent(&mut out, &db, period_from(period), *json, now)?;
            }
            ReportKind::Velocity { weeks, json } => {
                report::velocity(&mut out, &db, *weeks, *json, now)?;
            }
            ReportKind::Estimates { json } => report::estimates(&mut out, &db, *json, now)?,
        },
    }

    out.flush()?;
    Ok(())
}

fn transition<W: Write, C: Clock>(
    out: &mut W,
    db: &mut tally_db::Database,
    engine: &SessionEngine<C>,
    kind: Transition,
    target: &SessionTarget,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<()> {
    let at = util::parse_at(target.at.as_deref(), now)?;
    session::transition(out, db, engine, kind, target.task, at)
}
