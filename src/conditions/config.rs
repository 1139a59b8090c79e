// ============================================================================
// spark-dom - Configurations and Condition Tables
// ============================================================================
//
// A `Config` maps DOM-facing keys (`style`, `classList`, `setAttribute`,
// `addEventListener`, plain property names, method names) to instructions.
// Most instructions are JSON values. Event listeners carry Rust closures, so
// they get their own `Setting` variant. Numeric keys (`"0"`, `"-1"`) hold a
// nested `Config` that targets a single element of a collection.
//
// A `ConditionTable` maps condition keys to configs in declaration order,
// with `"default"` reserved for the fallback branch.
// ============================================================================

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::warn;

use super::coerce::type_name;
use crate::dom::element::{EventHandler, ListenerOptions};
use crate::error::ConfigError;

/// Reserved condition key for the fallback branch
pub const DEFAULT_KEY: &str = "default";

pub const ADD_LISTENER_KEY: &str = "addEventListener";
pub const REMOVE_LISTENER_KEY: &str = "removeEventListener";

/// Parse a collection index key: an optional `-` followed by digits.
pub fn parse_index_key(key: &str) -> Option<i64> {
    let digits = key.strip_prefix('-').unwrap_or(key);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

/// Resolve a possibly negative index against a collection of `len`
/// elements. Negative indices count from the end.
pub fn wrap_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let resolved = if index < 0 { len + index } else { index };
    (0..len).contains(&resolved).then_some(resolved as usize)
}

// =============================================================================
// SETTINGS
// =============================================================================

/// A listener plus its `addEventListener` options.
#[derive(Debug, Clone)]
pub struct ListenerSpec {
    pub handler: EventHandler,
    pub options: ListenerOptions,
}

/// The instruction stored under one configuration key.
#[derive(Debug, Clone)]
pub enum Setting {
    Value(Value),
    /// event name -> listener, for `addEventListener`/`removeEventListener`
    Listeners(IndexMap<String, ListenerSpec>),
    /// Per-element override under a numeric key
    Nested(Config),
}

impl Setting {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Setting::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Short description for log lines
    pub fn describe(&self) -> String {
        match self {
            Setting::Value(value) => value.to_string(),
            Setting::Listeners(listeners) => {
                format!("listeners[{}]", listeners.keys().cloned().collect::<Vec<_>>().join(","))
            }
            Setting::Nested(config) => format!("config({} keys)", config.len()),
        }
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// An ordered configuration object for one element.
#[derive(Debug, Clone, Default)]
pub struct Config {
    entries: IndexMap<String, Setting>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to a JSON instruction (property value, style map, method
    /// arguments, ...)
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(key.into(), Setting::Value(value.into()));
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, setting: Setting) {
        self.entries.insert(key.into(), setting);
    }

    /// Merge one property into `key`'s object value
    fn merge_into(mut self, key: &str, name: &str, value: Value) -> Self {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Setting::Value(Value::Object(Map::new())));
        match entry {
            Setting::Value(Value::Object(map)) => {
                map.insert(name.to_string(), value);
            }
            other => {
                let mut map = Map::new();
                map.insert(name.to_string(), value);
                *other = Setting::Value(Value::Object(map));
            }
        }
        self
    }

    /// `style: { property: value }`
    pub fn style(self, property: &str, value: impl Into<Value>) -> Self {
        self.merge_into("style", property, value.into())
    }

    /// `setAttribute: { name: value }`
    pub fn attr(self, name: &str, value: impl Into<Value>) -> Self {
        self.merge_into("setAttribute", name, value.into())
    }

    /// `dataset: { key: value }`
    pub fn data(self, key: &str, value: impl Into<Value>) -> Self {
        self.merge_into("dataset", key, value.into())
    }

    /// `classList: { add: [...] }`
    pub fn class_add(self, class: &str) -> Self {
        self.class_op("add", class)
    }

    /// `classList: { remove: [...] }`
    pub fn class_remove(self, class: &str) -> Self {
        self.class_op("remove", class)
    }

    /// `classList: { toggle: [...] }`
    pub fn class_toggle(self, class: &str) -> Self {
        self.class_op("toggle", class)
    }

    fn class_op(mut self, op: &str, class: &str) -> Self {
        let entry = self
            .entries
            .entry("classList".to_string())
            .or_insert_with(|| Setting::Value(Value::Object(Map::new())));
        if !matches!(entry, Setting::Value(Value::Object(_))) {
            *entry = Setting::Value(Value::Object(Map::new()));
        }
        if let Setting::Value(Value::Object(ops)) = entry {
            let list = ops
                .entry(op.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            match list {
                Value::Array(items) => items.push(Value::from(class)),
                other => {
                    let previous = other.take();
                    *other = Value::Array(vec![previous, Value::from(class)]);
                }
            }
        }
        self
    }

    /// `addEventListener: { event: handler }`
    pub fn on(self, event: &str, handler: impl Into<EventHandler>) -> Self {
        self.on_with(event, handler, ListenerOptions::default())
    }

    /// `addEventListener: { event: { handler, options } }`
    pub fn on_with(
        self,
        event: &str,
        handler: impl Into<EventHandler>,
        options: ListenerOptions,
    ) -> Self {
        self.listener_into(ADD_LISTENER_KEY, event, handler.into(), options)
    }

    /// `removeEventListener: { event: handler }`
    pub fn off(self, event: &str, handler: &EventHandler, options: ListenerOptions) -> Self {
        self.listener_into(REMOVE_LISTENER_KEY, event, handler.clone(), options)
    }

    fn listener_into(
        mut self,
        key: &str,
        event: &str,
        handler: EventHandler,
        options: ListenerOptions,
    ) -> Self {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Setting::Listeners(IndexMap::new()));
        if !matches!(entry, Setting::Listeners(_)) {
            *entry = Setting::Listeners(IndexMap::new());
        }
        if let Setting::Listeners(listeners) = entry {
            listeners.insert(event.to_string(), ListenerSpec { handler, options });
        }
        self
    }

    /// Call `method` with `args` (an array of arguments, or a single one)
    pub fn call(self, method: impl Into<String>, args: impl Into<Value>) -> Self {
        self.set(method, args)
    }

    /// Override for the element at `index` of a collection target
    /// (negative counts from the end)
    pub fn at(mut self, index: i64, config: Config) -> Self {
        self.entries
            .insert(index.to_string(), Setting::Nested(config));
        self
    }

    /// Build from a JSON object. Numeric keys holding objects become
    /// per-element overrides; any other value under a numeric key is logged
    /// and dropped, leaving the rest of the configuration intact.
    pub fn from_json(value: &Value) -> Result<Self, ConfigError> {
        let Value::Object(map) = value else {
            return Err(ConfigError::ConfigNotObject {
                found: type_name(value).to_string(),
            });
        };

        let mut config = Config::new();
        for (key, value) in map {
            if parse_index_key(key).is_some() {
                if !value.is_object() {
                    let err = ConfigError::IndexNotObject {
                        key: key.clone(),
                        found: type_name(value).to_string(),
                    };
                    warn!(error = %err, "[Conditions] Skipping index override");
                    continue;
                }
                config.insert(key.clone(), Setting::Nested(Config::from_json(value)?));
            } else {
                config.insert(key.clone(), Setting::Value(value.clone()));
            }
        }
        Ok(config)
    }

    pub fn get(&self, key: &str) -> Option<&Setting> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Setting)> {
        self.entries.iter().map(|(key, setting)| (key.as_str(), setting))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Separate shared keys from per-index overrides, both in declaration
    /// order.
    pub fn split_indexed(&self) -> (Config, Vec<(i64, &Config)>) {
        let mut shared = Config::new();
        let mut indexed = Vec::new();
        for (key, setting) in &self.entries {
            match (setting, parse_index_key(key)) {
                (Setting::Nested(config), Some(index)) => indexed.push((index, config)),
                _ => shared.insert(key.clone(), setting.clone()),
            }
        }
        (shared, indexed)
    }

    /// Split listener keys (applied by the engine itself) from the rest
    pub fn split_listeners(&self) -> (Config, Config) {
        let mut listeners = Config::new();
        let mut rest = Config::new();
        for (key, setting) in &self.entries {
            if key == ADD_LISTENER_KEY || key == REMOVE_LISTENER_KEY {
                listeners.insert(key.clone(), setting.clone());
            } else {
                rest.insert(key.clone(), setting.clone());
            }
        }
        (listeners, rest)
    }
}

// =============================================================================
// CONDITION TABLE
// =============================================================================

/// Condition keys mapped to configurations, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ConditionTable {
    branches: IndexMap<String, Config>,
}

impl ConditionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a branch
    pub fn when(mut self, condition: impl Into<String>, config: Config) -> Self {
        self.branches.insert(condition.into(), config);
        self
    }

    /// The `default` branch
    pub fn otherwise(self, config: Config) -> Self {
        self.when(DEFAULT_KEY, config)
    }

    pub fn from_json(value: &Value) -> Result<Self, ConfigError> {
        let Value::Object(map) = value else {
            return Err(ConfigError::TableNotObject {
                found: type_name(value).to_string(),
            });
        };

        let mut table = ConditionTable::new();
        for (condition, branch) in map {
            if !branch.is_object() {
                return Err(ConfigError::BranchNotObject {
                    condition: condition.clone(),
                    found: type_name(branch).to_string(),
                });
            }
            table
                .branches
                .insert(condition.clone(), Config::from_json(branch)?);
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn get(&self, condition: &str) -> Option<&Config> {
        self.branches.get(condition)
    }

    /// Keyed branches in order, plus the default branch if any
    pub fn split_default(&self) -> (Vec<(&str, &Config)>, Option<&Config>) {
        let mut keyed = Vec::with_capacity(self.branches.len());
        let mut default = None;
        for (condition, config) in &self.branches {
            if condition == DEFAULT_KEY {
                default = Some(config);
            } else {
                keyed.push((condition.as_str(), config));
            }
        }
        (keyed, default)
    }
}

// =============================================================================
// CONDITION SPEC
// =============================================================================

type TableFn = Rc<dyn Fn() -> Result<ConditionTable, ConfigError>>;

/// Where a binding gets its condition table from.
#[derive(Clone)]
pub enum ConditionSpec {
    Static(ConditionTable),
    /// Re-invoked on every evaluation (and tracked in reactive bindings)
    Dynamic(TableFn),
    /// Re-parsed on every evaluation
    Json(Value),
}

impl ConditionSpec {
    pub fn dynamic(f: impl Fn() -> ConditionTable + 'static) -> Self {
        ConditionSpec::Dynamic(Rc::new(move || Ok(f())))
    }

    pub fn dynamic_json(f: impl Fn() -> Value + 'static) -> Self {
        ConditionSpec::Dynamic(Rc::new(move || ConditionTable::from_json(&f())))
    }

    pub fn json(value: Value) -> Self {
        ConditionSpec::Json(value)
    }

    pub fn resolve(&self) -> Result<Cow<'_, ConditionTable>, ConfigError> {
        match self {
            ConditionSpec::Static(table) => Ok(Cow::Borrowed(table)),
            ConditionSpec::Dynamic(f) => f().map(Cow::Owned),
            ConditionSpec::Json(value) => ConditionTable::from_json(value).map(Cow::Owned),
        }
    }
}

impl fmt::Debug for ConditionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionSpec::Static(table) => f.debug_tuple("Static").field(table).finish(),
            ConditionSpec::Dynamic(_) => f.write_str("Dynamic(..)"),
            ConditionSpec::Json(value) => f.debug_tuple("Json").field(value).finish(),
        }
    }
}

impl From<ConditionTable> for ConditionSpec {
    fn from(table: ConditionTable) -> Self {
        ConditionSpec::Static(table)
    }
}

impl From<Value> for ConditionSpec {
    fn from(value: Value) -> Self {
        ConditionSpec::Json(value)
    }
}
