//! The configuration object threaded through setup, body and teardown.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading or writing configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was read with no value and no default.
    #[error("config variable `{name}` is not set and has no default value")]
    Unset {
        /// Variable name
        name: String,
    },

    /// A variable with the same name is already registered.
    #[error("config variable `{name}` is already registered")]
    DuplicateVariable {
        /// Variable name
        name: String,
    },

    /// A value could not be converted to JSON.
    #[error("failed to serialize value for `{key}`: {source}")]
    Serialize {
        /// Config key
        key: String,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// A stored value does not have the requested type.
    #[error("value of `{key}` has an unexpected type: {source}")]
    Deserialize {
        /// Config key
        key: String,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// A config file could not be read.
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A config file is not valid JSON.
    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// A config file holds JSON that is not an object.
    #[error("config file {} must contain a JSON object", .path.display())]
    NotAnObject {
        /// File path
        path: PathBuf,
    },
}

/// Mutable key/value configuration.
///
/// Values are JSON so they can be loaded from files and listed. Payloads
/// that cannot be serialized (parsed arguments, handles) go into the typed
/// extension map instead, keyed by their type.
#[derive(Default)]
pub struct Config {
    values: Map<String, Value>,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Config {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config preset with values.
    pub fn from_values(values: Map<String, Value>) -> Self {
        Self {
            values,
            extensions: HashMap::new(),
        }
    }

    /// Get a raw value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get a value deserialized into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.values
            .get(key)
            .map(|value| {
                T::deserialize(value).map_err(|source| ConfigError::Deserialize {
                    key: key.to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Set a value from anything serializable.
    pub fn set(&mut self, key: impl Into<String>, value: impl Serialize) -> Result<(), ConfigError> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|source| ConfigError::Serialize {
            key: key.clone(),
            source,
        })?;
        self.values.insert(key, value);
        Ok(())
    }

    /// Set a raw value, returning the previous one.
    pub fn set_value(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    /// Remove a value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Check whether a key is set.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of values set.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no values are set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All set keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// All values.
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Overwrite values with the entries of `other`.
    pub fn merge(&mut self, other: Map<String, Value>) {
        self.values.extend(other);
    }

    /// Merge the top-level keys of a JSON object file.
    ///
    /// Returns the number of keys loaded.
    pub fn load_json_file(&mut self, path: impl AsRef<Path>) -> Result<usize, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed: Value = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let Value::Object(map) = parsed else {
            return Err(ConfigError::NotAnObject {
                path: path.to_path_buf(),
            });
        };

        let loaded = map.len();
        self.merge(map);
        Ok(loaded)
    }

    /// Store a typed extension, returning the previous one of the same type.
    pub fn insert_extension<T: Any + Send + Sync>(&mut self, value: T) -> Option<T> {
        self.extensions
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Get a typed extension.
    pub fn extension<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Get a typed extension mutably.
    pub fn extension_mut<T: Any + Send + Sync>(&mut self) -> Option<&mut T> {
        self.extensions
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Remove a typed extension.
    pub fn remove_extension<T: Any + Send + Sync>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("values", &self.values)
            .field("extensions", &self.extensions.len())
            .finish()
    }
}
