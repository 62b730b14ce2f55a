//! Per-component log levels driven by configuration.
//!
//! Components that own a `LOGGER` variable keep a `ComponentLevel` and only
//! emit their debug chatter when it is enabled. Output itself always goes
//! through `tracing`; the subscriber is installed by the binary.

use std::sync::atomic::{AtomicU8, Ordering};
use tracing::level_filters::LevelFilter;
use tracing::Level;

use crate::error::ConfigError;

/// Parse a level name as used in configuration files.
///
/// Accepts the tracing names plus `WARNING`, `NOTICE` (info) and `ALL`
/// (trace), case-insensitively.
pub fn parse_level(name: &str, value: &str) -> Result<LevelFilter, ConfigError> {
    let filter = match value.trim().to_ascii_uppercase().as_str() {
        "OFF" => LevelFilter::OFF,
        "ERROR" => LevelFilter::ERROR,
        "WARN" | "WARNING" => LevelFilter::WARN,
        "INFO" | "NOTICE" => LevelFilter::INFO,
        "DEBUG" => LevelFilter::DEBUG,
        "TRACE" | "ALL" => LevelFilter::TRACE,
        _ => {
            return Err(ConfigError::Invalid {
                name: name.to_string(),
                value: value.to_string(),
                reason: "unknown log level".to_string(),
            })
        }
    };
    Ok(filter)
}

fn to_u8(filter: LevelFilter) -> u8 {
    match filter.into_level() {
        None => 0,
        Some(Level::ERROR) => 1,
        Some(Level::WARN) => 2,
        Some(Level::INFO) => 3,
        Some(Level::DEBUG) => 4,
        Some(Level::TRACE) => 5,
    }
}

fn from_u8(raw: u8) -> LevelFilter {
    match raw {
        0 => LevelFilter::OFF,
        1 => LevelFilter::ERROR,
        2 => LevelFilter::WARN,
        3 => LevelFilter::INFO,
        4 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Lock-free level cell shared between a component and its config listener.
#[derive(Debug)]
pub struct ComponentLevel(AtomicU8);

impl ComponentLevel {
    pub fn new(filter: LevelFilter) -> Self {
        Self(AtomicU8::new(to_u8(filter)))
    }

    pub fn get(&self) -> LevelFilter {
        from_u8(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, filter: LevelFilter) {
        self.0.store(to_u8(filter), Ordering::Relaxed);
    }

    /// Whether messages at `level` should be emitted by this component.
    pub fn enabled(&self, level: Level) -> bool {
        level <= self.get()
    }
}

impl Default for ComponentLevel {
    fn default() -> Self {
        Self::new(LevelFilter::ERROR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!(parse_level("L", "debug").unwrap(), LevelFilter::DEBUG);
        assert_eq!(parse_level("L", "NOTICE").unwrap(), LevelFilter::INFO);
        assert_eq!(parse_level("L", " Warning ").unwrap(), LevelFilter::WARN);
        assert_eq!(parse_level("L", "ALL").unwrap(), LevelFilter::TRACE);
        assert!(parse_level("L", "LOUD").is_err());
    }

    #[test]
    fn level_gates_messages() {
        let level = ComponentLevel::default();
        assert!(level.enabled(Level::ERROR));
        assert!(!level.enabled(Level::DEBUG));
        level.set(LevelFilter::DEBUG);
        assert!(level.enabled(Level::DEBUG));
        assert!(!level.enabled(Level::TRACE));
        level.set(LevelFilter::OFF);
        assert!(!level.enabled(Level::ERROR));
    }
}
