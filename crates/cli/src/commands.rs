//! Demo commands.

use crate::demo::{Heartbeat, CLOCK, HEARTBEAT, STARTED_AT};
use anyhow::Context;
use async_trait::async_trait;
use ignite_core::{Config, UnitMode, UnitName};
use ignite_execution::{
    Command, CommandArgs, CommandRegistry, PlanRequest, RegistryError, ResolvedPlan, UnitRegistry,
};
use std::sync::Arc;
use std::time::Duration;

/// What the `plan` command needs to resolve other commands.
pub struct Catalog {
    /// Registered units
    pub units: Arc<UnitRegistry>,
    /// Registered commands
    pub commands: Arc<CommandRegistry>,
    /// Extra and disabled targets from the command line
    pub request: PlanRequest,
}

/// Show when the program started.
pub struct Status;

impl Command for Status {
    fn name(&self) -> &'static str {
        "status"
    }

    fn description(&self) -> &'static str {
        "Show status"
    }

    fn targets(&self) -> Vec<UnitName> {
        vec![CLOCK.into()]
    }

    fn run(&self, config: &mut Config) -> anyhow::Result<()> {
        let started = STARTED_AT.get(config)?.context("clock is not running")?;
        println!("ignite status");
        println!("  Started: {}", started.to_rfc3339());
        println!("  Config values: {}", config.len());
        Ok(())
    }
}

/// Run for a while with the heartbeat ticking.
pub struct Watch;

#[async_trait]
impl Command for Watch {
    fn name(&self) -> &'static str {
        "watch"
    }

    fn description(&self) -> &'static str {
        "Watch the heartbeat for a number of seconds"
    }

    fn targets(&self) -> Vec<UnitName> {
        vec![HEARTBEAT.into()]
    }

    fn mode(&self) -> UnitMode {
        UnitMode::Asynchronous
    }

    fn arguments(&self, command: clap::Command) -> clap::Command {
        command.arg(
            clap::Arg::new("seconds")
                .long("seconds")
                .help("How long to watch")
                .value_parser(clap::value_parser!(u64))
                .default_value("3"),
        )
    }

    async fn run_async(&self, config: &mut Config) -> anyhow::Result<()> {
        let seconds = CommandArgs::from_config(config)
            .and_then(|args| args.get_one::<u64>("seconds").copied())
            .unwrap_or(3);

        tokio::time::sleep(Duration::from_secs(seconds)).await;

        let beats = config
            .extension::<Heartbeat>()
            .context("heartbeat is not running")?
            .beats();
        println!("Watched {} heartbeats in {}s", beats, seconds);
        Ok(())
    }
}

/// Print the resolved plan of another command without running it.
pub struct Plan;

impl Command for Plan {
    fn name(&self) -> &'static str {
        "plan"
    }

    fn description(&self) -> &'static str {
        "Show the units another command would run"
    }

    fn emits_signals(&self) -> bool {
        false
    }

    fn arguments(&self, command: clap::Command) -> clap::Command {
        command.arg(
            clap::Arg::new("command")
                .help("Command to plan")
                .required(true),
        )
    }

    fn run(&self, config: &mut Config) -> anyhow::Result<()> {
        let name = CommandArgs::from_config(config)
            .and_then(|args| args.get_one::<String>("command"))
            .context("no command to plan")?;
        let catalog = config.extension::<Catalog>().context("no catalog available")?;
        let command = catalog
            .commands
            .get(name)
            .with_context(|| format!("unknown command `{name}`"))?;

        let plan = ResolvedPlan::resolve(&catalog.units, command, &catalog.request)?;
        print!("{}", render(&plan));
        Ok(())
    }
}

/// Render a plan for humans.
pub fn render(plan: &ResolvedPlan) -> String {
    let mut out = format!(
        "Plan for `{}` ({} model, {} units)\n",
        plan.command().name(),
        plan.model(),
        plan.len()
    );
    for (index, step) in plan.steps().iter().enumerate() {
        let mut line = format!("  {}. {}", index + 1, step.unit.name);
        if step.disabled {
            line.push_str(" [disabled]");
        }
        if !step.unit.description.is_empty() {
            line.push_str(&format!(" - {}", step.unit.description));
        }
        out.push_str(&line);
        out.push('\n');
    }
    if plan.requires_multi_worker() {
        let units: Vec<_> = plan.multi_worker_units().iter().map(UnitName::as_str).collect();
        out.push_str(&format!("  multi-worker: {}\n", units.join(", ")));
    }
    out
}

/// Register the demo commands.
pub fn registry() -> Result<CommandRegistry, RegistryError> {
    let mut commands = CommandRegistry::new();
    commands.register(Status)?;
    commands.register(Watch)?;
    commands.register(Plan)?;
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use ignite_execution::ExecutionModel;

    fn units() -> Arc<UnitRegistry> {
        let mut units = UnitRegistry::new();
        ignite_units::register_defaults(&mut units).unwrap();
        demo::register(&mut units).unwrap();
        Arc::new(units)
    }

    fn request() -> PlanRequest {
        PlanRequest::new().targets(ignite_units::base_targets())
    }

    #[test]
    fn test_status_plan_is_synchronous() {
        let commands = registry().unwrap();
        let plan = ResolvedPlan::resolve(&units(), commands.get("status").unwrap(), &request()).unwrap();

        assert_eq!(plan.model(), ExecutionModel::Synchronous);
        let names: Vec<_> = plan.names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["parse_config", "set_log_level", "clock"]);
    }

    #[test]
    fn test_watch_plan_is_cooperative() {
        let commands = registry().unwrap();
        let plan = ResolvedPlan::resolve(&units(), commands.get("watch").unwrap(), &request()).unwrap();

        assert_eq!(plan.model(), ExecutionModel::Cooperative);
        assert_eq!(
            render(&plan),
            "Plan for `watch` (cooperative model, 4 units)\n\
             \x20 1. parse_config - Parse a config file\n\
             \x20 2. set_log_level - Set log level using the -v option\n\
             \x20 3. clock - Record when the program started\n\
             \x20 4. heartbeat - Tick in the background while a command runs\n"
        );
    }

    #[test]
    fn test_plan_command_resolves_other_command() {
        let commands = Arc::new(registry().unwrap());
        let cli = commands.augment(clap::Command::new("ignite"));
        let matches = cli.try_get_matches_from(["ignite", "plan", "watch"]).unwrap();
        let (_, sub) = matches.subcommand().unwrap();

        let mut config = Config::new();
        config.insert_extension(CommandArgs(sub.clone()));
        config.insert_extension(Catalog {
            units: units(),
            commands: Arc::clone(&commands),
            request: request().disable(CLOCK),
        });

        Plan.run(&mut config).unwrap();
    }

    #[test]
    fn test_plan_command_unknown_target() {
        let commands = Arc::new(registry().unwrap());
        let matches = commands
            .augment(clap::Command::new("ignite"))
            .try_get_matches_from(["ignite", "plan", "deploy"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();

        let mut config = Config::new();
        config.insert_extension(CommandArgs(sub.clone()));
        config.insert_extension(Catalog {
            units: units(),
            commands,
            request: request(),
        });

        let err = Plan.run(&mut config).unwrap_err();
        assert!(err.to_string().contains("unknown command `deploy`"));
    }

    #[test]
    fn test_status_requires_clock() {
        let err = Status.run(&mut Config::new()).unwrap_err();
        assert!(err.to_string().contains("clock is not running"));
    }
}
