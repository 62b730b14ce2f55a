//! Error types for soothsayer-core.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for prediction operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A model or vocabulary file could not be opened or read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A model or vocabulary file is malformed.
    #[error("{}:{line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Configuration lookup or format failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// `predict` was called before any combination policy was installed.
    #[error("no combination policy configured")]
    NoCombiner,

    /// The plugin registry was asked for a plugin it does not know.
    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    /// A plugin failed to initialise and must not be used.
    #[error("unable to init {plugin} predictive plugin: {reason}")]
    PluginInit { plugin: String, reason: String },

    /// Index construction failed.
    #[error("model error: {0}")]
    Model(String),

    /// Model snapshot (de)serialization failed.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] bincode::Error),

    /// The worker runtime used for concurrent prediction could not start.
    #[error("cannot start prediction runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// Configuration file is not valid TOML.
    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    /// Returns true for failures that happen while a plugin is being built.
    ///
    /// These are the only errors that reach callers of the prediction API;
    /// everything else is logged and recovered from.
    pub fn is_initialization(&self) -> bool {
        matches!(
            self,
            Error::Io { .. }
                | Error::Parse { .. }
                | Error::UnknownPlugin(_)
                | Error::PluginInit { .. }
                | Error::Model(_)
                | Error::Snapshot(_)
                | Error::Runtime(_)
        )
    }
}

/// Categorized configuration lookup/format error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No variable with this name was ever declared.
    #[error("configuration variable not found: {0}")]
    NotFound(String),

    /// The variable exists but has never been assigned a value.
    #[error("configuration variable has no value: {0}")]
    Unset(String),

    /// The value cannot be interpreted as required.
    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialization_errors_are_classified() {
        assert!(Error::UnknownPlugin("X".into()).is_initialization());
        assert!(Error::parse("model.arpa", 3, "bad").is_initialization());
        assert!(!Error::NoCombiner.is_initialization());
        assert!(!Error::Config(ConfigError::NotFound("a".into())).is_initialization());
    }

    #[test]
    fn parse_error_mentions_location() {
        let err = Error::parse("model.arpa", 12, "bad log probability");
        assert_eq!(err.to_string(), "model.arpa:12: bad log probability");
    }
}
