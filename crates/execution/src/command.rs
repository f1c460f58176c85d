//! Commands and the command registry.

use crate::error::RegistryError;
use async_trait::async_trait;
use ignite_core::{Config, Phase, UnitMode, UnitName};
use std::collections::HashMap;
use std::sync::Arc;

/// A named unit of work run inside a resolved plan.
///
/// Synchronous commands implement [`Command::run`]; asynchronous ones
/// return [`UnitMode::Asynchronous`] from [`Command::mode`] and implement
/// [`Command::run_async`].
#[async_trait]
pub trait Command: Send + Sync {
    /// Get command name.
    fn name(&self) -> &'static str;

    /// Get command description.
    fn description(&self) -> &'static str {
        ""
    }

    /// Units the command needs.
    fn targets(&self) -> Vec<UnitName> {
        Vec::new()
    }

    /// Protocol of the command body.
    fn mode(&self) -> UnitMode {
        UnitMode::Synchronous
    }

    /// Whether units requesting multi-worker execution may be planned.
    fn allows_multi_worker(&self) -> bool {
        false
    }

    /// Whether `ready`/`stopping` are dispatched around the body.
    fn emits_signals(&self) -> bool {
        true
    }

    /// Add command-specific arguments.
    fn arguments(&self, command: clap::Command) -> clap::Command {
        command
    }

    /// Run the body synchronously.
    fn run(&self, _config: &mut Config) -> anyhow::Result<()> {
        anyhow::bail!("command `{}` has no synchronous body", self.name())
    }

    /// Run the body under the cooperative model.
    async fn run_async(&self, config: &mut Config) -> anyhow::Result<()> {
        self.run(config)
    }
}

/// Start the body of `command` as a phase matching its mode.
pub(crate) fn start_body<'a>(command: &'a dyn Command, config: &'a mut Config) -> Phase<'a, anyhow::Result<()>> {
    match command.mode() {
        UnitMode::Synchronous => Phase::Ready(command.run(config)),
        UnitMode::Asynchronous => Phase::Suspended(command.run_async(config)),
    }
}

/// Parsed arguments of the selected command, stored as a config extension.
#[derive(Debug, Clone)]
pub struct CommandArgs(pub clap::ArgMatches);

impl CommandArgs {
    /// Read the parsed arguments from `config`.
    pub fn from_config(config: &Config) -> Option<&clap::ArgMatches> {
        config.extension::<Self>().map(|args| &args.0)
    }
}

/// Registry of commands.
#[derive(Default)]
pub struct CommandRegistry {
    commands: Vec<Arc<dyn Command>>,
    by_name: HashMap<&'static str, usize>,
}

impl CommandRegistry {
    /// Create a new registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command.
    pub fn register(&mut self, command: impl Command + 'static) -> Result<(), RegistryError> {
        let name = command.name();
        if self.by_name.contains_key(name) {
            return Err(RegistryError::DuplicateCommand(name.to_string()));
        }

        self.by_name.insert(name, self.commands.len());
        self.commands.push(Arc::new(command));
        Ok(())
    }

    /// Get a command by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.by_name
            .get(name)
            .map(|&index| Arc::clone(&self.commands[index]))
    }

    /// List all commands in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Command>> {
        self.commands.iter()
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether no command is registered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Add one subcommand per registered command to `cli`.
    pub fn augment(&self, cli: clap::Command) -> clap::Command {
        self.commands.iter().fold(cli, |cli, command| {
            let sub = clap::Command::new(command.name()).about(command.description());
            cli.subcommand(command.arguments(sub))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greet;

    impl Command for Greet {
        fn name(&self) -> &'static str {
            "greet"
        }

        fn description(&self) -> &'static str {
            "Say hello"
        }

        fn targets(&self) -> Vec<UnitName> {
            vec!["db".into()]
        }

        fn arguments(&self, command: clap::Command) -> clap::Command {
            command.arg(clap::Arg::new("who").long("who").default_value("world"))
        }

        fn run(&self, config: &mut Config) -> anyhow::Result<()> {
            let who = CommandArgs::from_config(config)
                .and_then(|args| args.get_one::<String>("who").cloned())
                .unwrap_or_default();
            config.set("greeted", who)?;
            Ok(())
        }
    }

    struct Empty;

    impl Command for Empty {
        fn name(&self) -> &'static str {
            "empty"
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = CommandRegistry::new();
        registry.register(Greet).unwrap();
        registry.register(Empty).unwrap();

        assert_eq!(registry.len(), 2);
        let greet = registry.get("greet").unwrap();
        assert_eq!(greet.targets(), vec![UnitName::from("db")]);
        assert_eq!(greet.mode(), UnitMode::Synchronous);
        assert!(greet.emits_signals());
        assert!(!greet.allows_multi_worker());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = CommandRegistry::new();
        registry.register(Greet).unwrap();

        let err = registry.register(Greet).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateCommand("greet".to_string()));
    }

    #[test]
    fn test_augment_and_args_extension() {
        let mut registry = CommandRegistry::new();
        registry.register(Greet).unwrap();

        let cli = registry.augment(clap::Command::new("app"));
        let matches = cli.try_get_matches_from(["app", "greet", "--who", "ops"]).unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "greet");

        let mut config = Config::new();
        config.insert_extension(CommandArgs(sub.clone()));
        registry.get(name).unwrap().run(&mut config).unwrap();
        assert_eq!(config.get_as::<String>("greeted").unwrap().as_deref(), Some("ops"));
    }

    #[test]
    fn test_default_body_fails() {
        let mut config = Config::new();
        let err = Empty.run(&mut config).unwrap_err();
        assert!(err.to_string().contains("no synchronous body"));
    }

    #[tokio::test]
    async fn test_body_phase_follows_mode() {
        let mut config = Config::new();
        let phase = start_body(&Empty, &mut config);
        assert!(!phase.suspends());
        assert!(phase.finish().await.is_err());
    }
}
