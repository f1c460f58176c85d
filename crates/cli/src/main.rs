//! ignite CLI - resolve a command's units, enter them, run it, tear down.

mod commands;
mod demo;

use anyhow::{Context, Result};
use clap::{ArgAction, CommandFactory, FromArgMatches, Parser};
use commands::Catalog;
use ignite_core::{Config, VarRegistry};
use ignite_execution::{
    CommandArgs, ExecutionModel, Orchestrator, Outcome, PlanRequest, UnitRegistry,
};
use ignite_units::vars::{CONFIG_FILE, SYSTEMD_NOTIFY, VERBOSE, WORKERS};
use ignite_units::{LoggingNotifier, SystemdNotifier, SHOW_VARS};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "ignite")]
#[command(about = "Dependency-ordered setup and teardown around commands", long_about = None)]
struct Cli {
    /// Raise log level (repeatable)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (JSON object)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Additional unit to run (repeatable)
    #[arg(long = "target", global = true)]
    targets: Vec<String>,

    /// Keep a unit in the order but skip it (repeatable)
    #[arg(long = "disable-target", global = true)]
    disabled: Vec<String>,

    /// Show all config variables instead of running the command
    #[arg(short = 'V', long, global = true)]
    vars: bool,

    /// Inform systemd of startup and shutdown
    #[arg(long, global = true)]
    systemd_notify: bool,
}

fn variables() -> Result<VarRegistry> {
    let mut vars = VarRegistry::new();
    ignite_units::vars::register(&mut vars)?;
    vars.register(&demo::STARTED_AT)?;
    vars.register(&demo::HEARTBEAT_INTERVAL_MS)?;
    Ok(vars)
}

fn unit_registry(vars: Arc<VarRegistry>) -> Result<UnitRegistry> {
    let mut units = UnitRegistry::new();
    ignite_units::register_defaults(&mut units)?;
    units.register(ignite_units::show_vars(vars))?;
    demo::register(&mut units)?;
    Ok(units)
}

fn main() -> Result<()> {
    let commands = Arc::new(commands::registry()?);
    let matches = commands
        .augment(Cli::command())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .get_matches();
    let cli = Cli::from_arg_matches(&matches)?;
    let (name, sub_matches) = matches.subcommand().context("no command given")?;
    let command = commands
        .get(name)
        .with_context(|| format!("unknown command `{name}`"))?;

    let units = Arc::new(unit_registry(Arc::new(variables()?))?);

    // Command line values; a config file loaded by `parse_config` may
    // override them.
    let mut config = Config::new();
    VERBOSE.set(&mut config, cli.verbose)?;
    CONFIG_FILE.set(&mut config, cli.config.clone())?;
    if cli.systemd_notify {
        SYSTEMD_NOTIFY.set(&mut config, true)?;
    }
    config.insert_extension(CommandArgs(sub_matches.clone()));

    let mut request = PlanRequest::new()
        .targets(ignite_units::base_targets())
        .targets(cli.targets)
        .disable_all(cli.disabled);
    config.insert_extension(Catalog {
        units: Arc::clone(&units),
        commands: Arc::clone(&commands),
        request: request.clone(),
    });
    if cli.vars {
        request = request.target(SHOW_VARS);
    }

    let orchestrator = Orchestrator::new(units)
        .with_notifier(LoggingNotifier)
        .with_notifier(SystemdNotifier::from_env());
    let plan = orchestrator.plan(command, &request)?;

    if plan.requires_multi_worker() {
        info!(
            workers = WORKERS.get(&config)?,
            units = ?plan.multi_worker_units(),
            "Worker provisioning is left to the host"
        );
    }

    let outcome = match plan.model() {
        ExecutionModel::Synchronous => orchestrator.run_blocking(plan, &mut config)?,
        ExecutionModel::Cooperative => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(orchestrator.run(plan, &mut config))?,
    };

    if let Outcome::Stopped { unit } = outcome {
        debug!(%unit, "Stopped before running `{}`", name);
    }

    Ok(())
}
