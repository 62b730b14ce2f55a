//! Named-value configuration store with change notification.
//!
//! Values are plain strings addressed by dotted names such as
//! `Soothsayer.PredictorActivator.PREDICT_TIME`. Components parse what they
//! need and subscribe to the variables they react to; `Variable::set`
//! notifies subscribers synchronously, in subscription order.
//!
//! Files are TOML. Nested tables flatten into dotted names:
//!
//! ```toml
//! [Soothsayer.PredictorActivator]
//! PREDICT_TIME = 250
//! COMBINATION_POLICY = "Meritocracy"
//!
//! [Soothsayer.PluginRegistry]
//! PLUGINS = ["ARPAPlugin"]
//! ```

use ahash::AHashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use crate::error::{ConfigError, Error, Result};

/// Well-known variable names.
pub mod keys {
    pub const CONTEXT_TRACKER_LOGGER: &str = "Soothsayer.ContextTracker.LOGGER";
    pub const MAX_BUFFER_SIZE: &str = "Soothsayer.ContextTracker.MAX_BUFFER_SIZE";
    pub const WORD_CHARS: &str = "Soothsayer.ContextTracker.WORD_CHARS";
    pub const SEPARATOR_CHARS: &str = "Soothsayer.ContextTracker.SEPARATOR_CHARS";
    pub const BLANKSPACE_CHARS: &str = "Soothsayer.ContextTracker.BLANKSPACE_CHARS";
    pub const CONTROL_CHARS: &str = "Soothsayer.ContextTracker.CONTROL_CHARS";

    pub const ACTIVATOR_LOGGER: &str = "Soothsayer.PredictorActivator.LOGGER";
    pub const PREDICT_TIME: &str = "Soothsayer.PredictorActivator.PREDICT_TIME";
    pub const MAX_PARTIAL_PREDICTION_SIZE: &str =
        "Soothsayer.PredictorActivator.MAX_PARTIAL_PREDICTION_SIZE";
    pub const COMBINATION_POLICY: &str = "Soothsayer.PredictorActivator.COMBINATION_POLICY";

    pub const PLUGINS: &str = "Soothsayer.PluginRegistry.PLUGINS";

    pub const ARPA_LOGGER: &str = "Soothsayer.Plugins.ARPAPlugin.LOGGER";
    pub const ARPA_VOCAB_FILENAME: &str = "Soothsayer.Plugins.ARPAPlugin.VOCABFILENAME";
    pub const ARPA_FILENAME: &str = "Soothsayer.Plugins.ARPAPlugin.ARPAFILENAME";
    pub const ARPA_SNAPSHOT: &str = "Soothsayer.Plugins.ARPAPlugin.SNAPSHOT";
    pub const ARPA_CACHE_SIZE: &str = "Soothsayer.Plugins.ARPAPlugin.CACHE_SIZE";

    pub const DUMMY_LOGGER: &str = "Soothsayer.Plugins.DummyPlugin.LOGGER";
}

const DEFAULTS: &[(&str, &str)] = &[
    (keys::CONTEXT_TRACKER_LOGGER, "ERROR"),
    (keys::MAX_BUFFER_SIZE, "1024"),
    (keys::ACTIVATOR_LOGGER, "ERROR"),
    (keys::PREDICT_TIME, "1000"),
    (keys::MAX_PARTIAL_PREDICTION_SIZE, "6"),
    (keys::COMBINATION_POLICY, "Meritocracy"),
    (keys::PLUGINS, ""),
    (keys::ARPA_LOGGER, "ERROR"),
    (keys::ARPA_CACHE_SIZE, "128"),
    (keys::DUMMY_LOGGER, "ERROR"),
];

/// Identifies one subscription on a `Variable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static NEXT_LISTENER: AtomicU64 = AtomicU64::new(1);

type Listener = Arc<dyn Fn(&Variable) + Send + Sync>;

/// A named, observable configuration value.
pub struct Variable {
    name: String,
    value: RwLock<Option<String>>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
}

impl Variable {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: RwLock::new(None),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value, or `None` if never assigned.
    pub fn value(&self) -> Option<String> {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Assign a new value and notify every subscriber.
    pub fn set(&self, value: impl Into<String>) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = Some(value.into());
        self.notify();
    }

    /// Register `listener`, called after each `set`.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Variable) + Send + Sync + 'static,
    {
        let id = ListenerId(NEXT_LISTENER.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a subscription. Returns false if `id` was not registered here.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    fn notify(&self) {
        // Listeners may touch this variable again; call them unlocked.
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(self);
        }
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("name", &self.name)
            .field("value", &self.value())
            .finish()
    }
}

/// Thread-safe store of configuration variables.
#[derive(Debug, Default)]
pub struct Configuration {
    variables: RwLock<BTreeMap<String, Arc<Variable>>>,
}

impl Configuration {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with every built-in default.
    pub fn with_defaults() -> Self {
        let config = Self::new();
        for (name, value) in DEFAULTS {
            config.set(name, *value);
        }
        config
    }

    /// Defaults overlaid with the values from a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config = Self::with_defaults();
        config.merge_toml_str(content)?;
        Ok(config)
    }

    /// Defaults overlaid with the values from a TOML file.
    pub fn load_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Apply every value found in a TOML document, notifying subscribers.
    pub fn merge_toml_str(&self, content: &str) -> Result<()> {
        let table: toml::Table = content.parse()?;
        let mut flat = Vec::new();
        flatten("", &table, &mut flat);
        for (name, value) in flat {
            self.set(&name, value);
        }
        Ok(())
    }

    /// Value of `name`.
    pub fn get(&self, name: &str) -> std::result::Result<String, ConfigError> {
        let variable = self
            .lookup(name)
            .ok_or_else(|| ConfigError::NotFound(name.to_string()))?;
        variable
            .value()
            .ok_or_else(|| ConfigError::Unset(name.to_string()))
    }

    /// Value of `name` parsed as `T`.
    pub fn get_as<T>(&self, name: &str) -> std::result::Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let raw = self.get(name)?;
        raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name: name.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
    }

    /// Value of `name` if it is set, `None` if it is absent or unset.
    pub fn get_optional(&self, name: &str) -> Option<String> {
        self.lookup(name).and_then(|v| v.value())
    }

    /// Handle on `name`, declaring the variable if it does not exist yet.
    pub fn find(&self, name: &str) -> Arc<Variable> {
        if let Some(v) = self.lookup(name) {
            return v;
        }
        let mut vars = self.variables.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            vars.entry(name.to_string())
                .or_insert_with(|| Arc::new(Variable::new(name))),
        )
    }

    /// Assign `value` to `name`, notifying subscribers.
    pub fn set(&self, name: &str, value: impl Into<String>) {
        self.find(name).set(value);
    }

    /// Names of all declared variables, sorted.
    pub fn names(&self) -> Vec<String> {
        self.variables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn lookup(&self, name: &str) -> Option<Arc<Variable>> {
        self.variables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

fn flatten(prefix: &str, table: &toml::Table, out: &mut Vec<(String, String)>) {
    for (key, value) in table {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(inner) => flatten(&name, inner, out),
            other => out.push((name, scalar_to_string(other))),
        }
    }
}

fn scalar_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Array(items) => items
            .iter()
            .map(scalar_to_string)
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}

/// Handler invoked with the new raw value of a variable.
pub type Handler<T> = fn(&T, &str);

/// Routes change notifications of several variables to methods of `T`.
///
/// Each variable name maps to exactly one handler. Handlers only run while
/// the target is alive; dropping the dispatcher unsubscribes everything.
pub struct Dispatcher<T: Send + Sync + 'static> {
    target: Weak<T>,
    entries: AHashMap<String, (Arc<Variable>, ListenerId)>,
}

impl<T: Send + Sync + 'static> Dispatcher<T> {
    pub fn new(target: &Arc<T>) -> Self {
        Self {
            target: Arc::downgrade(target),
            entries: AHashMap::new(),
        }
    }

    /// Route changes of `variable` to `handler`, replacing any previous
    /// handler for the same name. The current value, if set, is applied
    /// immediately.
    pub fn map(&mut self, variable: Arc<Variable>, handler: Handler<T>) {
        if let Some((old, id)) = self.entries.remove(variable.name()) {
            old.unsubscribe(id);
        }

        let target = self.target.clone();
        let id = variable.subscribe(move |var| {
            if let (Some(target), Some(value)) = (target.upgrade(), var.value()) {
                handler(&target, &value);
            }
        });

        if let (Some(target), Some(value)) = (self.target.upgrade(), variable.value()) {
            handler(&target, &value);
        }

        self.entries
            .insert(variable.name().to_string(), (variable, id));
    }

    /// Number of mapped variables.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Send + Sync + 'static> Drop for Dispatcher<T> {
    fn drop(&mut self) {
        for (variable, id) in self.entries.values() {
            variable.unsubscribe(*id);
        }
    }
}
