//! Typed, documented configuration variables.
//!
//! A [`ConfigVar`] names a key in the [`Config`] and knows its type and
//! default. Reading a variable is always an explicit lookup against the
//! config passed in; there is no ambient "current config".

use crate::config::{Config, ConfigError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A typed configuration variable.
///
/// Declared as a `static` so every unit reading it refers to the same
/// name and default:
///
/// ```
/// use ignite_core::ConfigVar;
///
/// static WORKERS: ConfigVar<u32> =
///     ConfigVar::new("WORKERS", "Number of workers", Some(1));
/// ```
#[derive(Debug)]
pub struct ConfigVar<T> {
    name: &'static str,
    description: &'static str,
    default: Option<T>,
}

impl<T> ConfigVar<T> {
    /// Declare a variable.
    pub const fn new(name: &'static str, description: &'static str, default: Option<T>) -> Self {
        Self {
            name,
            description,
            default,
        }
    }

    /// Key of the variable in the config.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Human-readable description.
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Default value, if any.
    pub fn default_value(&self) -> Option<&T> {
        self.default.as_ref()
    }

    /// Whether the config holds an explicit value.
    pub fn is_set(&self, config: &Config) -> bool {
        config.contains(self.name)
    }
}

impl<T: Serialize + DeserializeOwned + Clone> ConfigVar<T> {
    /// Read the current value, falling back to the default.
    pub fn get(&self, config: &Config) -> Result<T, ConfigError> {
        match config.get_as::<T>(self.name)? {
            Some(value) => Ok(value),
            None => self.default.clone().ok_or_else(|| ConfigError::Unset {
                name: self.name.to_string(),
            }),
        }
    }

    /// Set the value.
    pub fn set(&self, config: &mut Config, value: T) -> Result<(), ConfigError> {
        config.set(self.name, value)
    }
}

/// Type-erased view of a [`ConfigVar`] for listings.
pub trait Variable: Send + Sync {
    /// Key of the variable.
    fn name(&self) -> &'static str;

    /// Description.
    fn description(&self) -> &'static str;

    /// Rust type of the value.
    fn type_name(&self) -> &'static str;

    /// Default rendered as JSON.
    fn default_json(&self) -> Option<Value>;
}

impl<T: Serialize + Send + Sync> Variable for ConfigVar<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn default_json(&self) -> Option<Value> {
        self.default
            .as_ref()
            .and_then(|value| serde_json::to_value(value).ok())
    }
}

/// One row of a variable listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarReport {
    /// Key
    pub name: &'static str,
    /// Rust type
    pub type_name: &'static str,
    /// Default value
    pub default: Option<Value>,
    /// Value currently set in the config
    pub current: Option<Value>,
    /// Description
    pub description: &'static str,
}

/// Registry of known variables, in declaration order.
#[derive(Default)]
pub struct VarRegistry {
    vars: Vec<&'static dyn Variable>,
}

impl VarRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable. Names must be unique.
    pub fn register(&mut self, var: &'static dyn Variable) -> Result<(), ConfigError> {
        if self.get(var.name()).is_some() {
            return Err(ConfigError::DuplicateVariable {
                name: var.name().to_string(),
            });
        }
        self.vars.push(var);
        Ok(())
    }

    /// Find a variable by name.
    pub fn get(&self, name: &str) -> Option<&'static dyn Variable> {
        self.vars.iter().copied().find(|var| var.name() == name)
    }

    /// Iterate in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &'static dyn Variable> + '_ {
        self.vars.iter().copied()
    }

    /// Number of registered variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variable is registered.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Describe every variable against `config`.
    pub fn describe(&self, config: &Config) -> Vec<VarReport> {
        self.iter()
            .map(|var| VarReport {
                name: var.name(),
                type_name: var.type_name(),
                default: var.default_json(),
                current: config.get(var.name()).cloned(),
                description: var.description(),
            })
            .collect()
    }
}
