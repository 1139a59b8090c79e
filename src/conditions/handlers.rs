// ============================================================================
// spark-dom - Property Handlers
// Ordered strategies that apply one configuration key to one element
// ============================================================================
//
// Same shape as the matcher registry: the first handler whose `test` claims
// a key applies it. Plain property assignment is the fallback. Failures are
// scoped to one key on one element: `apply_config` logs them and moves on.
// ============================================================================

use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, warn};

use super::coerce::{to_js_string, type_name};
use super::config::{Config, Setting, ADD_LISTENER_KEY, REMOVE_LISTENER_KEY};
use crate::dom::element::Element;
use crate::dom::listeners::{attach_listener, detach_listener};
use crate::error::ApplyError;

/// A configuration-key strategy.
pub trait PropertyHandler {
    /// Whether this handler owns `key` for this element
    fn test(&self, element: &dyn Element, key: &str, setting: &Setting) -> bool;

    fn apply(&self, element: &dyn Element, setting: &Setting, key: &str) -> Result<(), ApplyError>;
}

/// A handler built from two closures.
pub struct FnHandler<T, A> {
    test: T,
    apply: A,
}

impl<T, A> FnHandler<T, A>
where
    T: Fn(&dyn Element, &str, &Setting) -> bool,
    A: Fn(&dyn Element, &Setting, &str) -> Result<(), ApplyError>,
{
    pub fn new(test: T, apply: A) -> Self {
        Self { test, apply }
    }
}

impl<T, A> PropertyHandler for FnHandler<T, A>
where
    T: Fn(&dyn Element, &str, &Setting) -> bool,
    A: Fn(&dyn Element, &Setting, &str) -> Result<(), ApplyError>,
{
    fn test(&self, element: &dyn Element, key: &str, setting: &Setting) -> bool {
        (self.test)(element, key, setting)
    }

    fn apply(&self, element: &dyn Element, setting: &Setting, key: &str) -> Result<(), ApplyError> {
        (self.apply)(element, setting, key)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn expect_value<'a>(
    handler: &str,
    key: &str,
    setting: &'a Setting,
    expected: &'static str,
) -> Result<&'a Value, ApplyError> {
    setting
        .as_value()
        .ok_or_else(|| ApplyError::invalid(handler, key, expected, setting.describe()))
}

/// A string, or an array of strings
fn string_list(
    handler: &str,
    key: &str,
    value: &Value,
) -> Result<Vec<String>, ApplyError> {
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(ApplyError::invalid(handler, key, "a string", type_name(other))),
            })
            .collect(),
        other => Err(ApplyError::invalid(
            handler,
            key,
            "a string or array of strings",
            type_name(other),
        )),
    }
}

/// Keep going after a failure, but report the first one
fn first_error(results: impl IntoIterator<Item = Result<(), ApplyError>>) -> Result<(), ApplyError> {
    let mut first = None;
    for result in results {
        if let Err(err) = result {
            first.get_or_insert(err);
        }
    }
    first.map_or(Ok(()), Err)
}

// =============================================================================
// BUILT-IN HANDLERS
// =============================================================================

/// `style: { property: value }`, or a `"a: b; c: d"` declaration string.
/// Null values are skipped.
pub struct StyleHandler;

impl PropertyHandler for StyleHandler {
    fn test(&self, _element: &dyn Element, key: &str, _setting: &Setting) -> bool {
        key == "style"
    }

    fn apply(&self, element: &dyn Element, setting: &Setting, key: &str) -> Result<(), ApplyError> {
        match expect_value("style", key, setting, "an object")? {
            Value::Object(styles) => first_error(
                styles
                    .iter()
                    .filter(|(_, value)| !value.is_null())
                    .map(|(property, value)| {
                        element
                            .set_style(property, &to_js_string(value))
                            .map_err(ApplyError::from)
                    }),
            ),
            Value::String(declarations) => first_error(
                declarations
                    .split(';')
                    .filter_map(|declaration| declaration.split_once(':'))
                    .map(|(property, value)| {
                        element
                            .set_style(property.trim(), value.trim())
                            .map_err(ApplyError::from)
                    }),
            ),
            other => Err(ApplyError::invalid("style", key, "an object", type_name(other))),
        }
    }
}

/// `classList: [..]` replaces every class; `classList: { add, remove,
/// toggle, replace }` edits them. Each operation takes a string or an
/// array; `replace` takes `[old, new]` pairs or an `{ old: new }` map.
pub struct ClassListHandler;

impl ClassListHandler {
    fn replace(element: &dyn Element, key: &str, value: &Value) -> Result<(), ApplyError> {
        let pair = |pair: &Value| -> Result<(), ApplyError> {
            match pair.as_array().map(Vec::as_slice) {
                Some([Value::String(old), Value::String(new)]) => {
                    element.replace_class(old, new);
                    Ok(())
                }
                _ => Err(ApplyError::invalid("classList", key, "an [old, new] pair", pair)),
            }
        };

        match value {
            Value::Array(items) if items.iter().all(Value::is_array) => {
                first_error(items.iter().map(pair))
            }
            Value::Array(_) => pair(value),
            Value::Object(map) => first_error(map.iter().map(|(old, new)| match new {
                Value::String(new) => {
                    element.replace_class(old, new);
                    Ok(())
                }
                other => Err(ApplyError::invalid("classList", key, "a class name", type_name(other))),
            })),
            other => Err(ApplyError::invalid(
                "classList",
                key,
                "an [old, new] pair or { old: new } map",
                type_name(other),
            )),
        }
    }
}

impl PropertyHandler for ClassListHandler {
    fn test(&self, _element: &dyn Element, key: &str, _setting: &Setting) -> bool {
        key == "classList"
    }

    fn apply(&self, element: &dyn Element, setting: &Setting, key: &str) -> Result<(), ApplyError> {
        let value = expect_value("classList", key, setting, "an array or object")?;
        match value {
            Value::Array(_) | Value::String(_) => {
                let classes = string_list("classList", key, value)?;
                element.set_class_name(&classes.join(" "));
                Ok(())
            }
            Value::Object(ops) => first_error(ops.iter().map(|(op, value)| {
                match op.as_str() {
                    "add" => string_list("classList", key, value)
                        .map(|classes| classes.iter().for_each(|c| element.add_class(c))),
                    "remove" => string_list("classList", key, value)
                        .map(|classes| classes.iter().for_each(|c| element.remove_class(c))),
                    "toggle" => string_list("classList", key, value).map(|classes| {
                        classes.iter().for_each(|c| {
                            element.toggle_class(c);
                        })
                    }),
                    "replace" => Self::replace(element, key, value),
                    other => Err(ApplyError::invalid(
                        "classList",
                        key,
                        "add, remove, toggle or replace",
                        other,
                    )),
                }
            })),
            other => Err(ApplyError::invalid(
                "classList",
                key,
                "an array or object",
                type_name(other),
            )),
        }
    }
}

/// `setAttribute: [name, value]` or `setAttribute: { name: value }`
pub struct SetAttributeHandler;

impl PropertyHandler for SetAttributeHandler {
    fn test(&self, _element: &dyn Element, key: &str, _setting: &Setting) -> bool {
        key == "setAttribute"
    }

    fn apply(&self, element: &dyn Element, setting: &Setting, key: &str) -> Result<(), ApplyError> {
        match expect_value("setAttribute", key, setting, "a [name, value] pair or object")? {
            Value::Array(pair) => match pair.as_slice() {
                [Value::String(name), value] => element
                    .set_attribute(name, &to_js_string(value))
                    .map_err(ApplyError::from),
                _ => Err(ApplyError::invalid(
                    "setAttribute",
                    key,
                    "a [name, value] pair",
                    format!("array of {}", pair.len()),
                )),
            },
            Value::Object(attributes) => first_error(
                attributes
                    .iter()
                    .filter(|(_, value)| !value.is_null())
                    .map(|(name, value)| {
                        element
                            .set_attribute(name, &to_js_string(value))
                            .map_err(ApplyError::from)
                    }),
            ),
            other => Err(ApplyError::invalid(
                "setAttribute",
                key,
                "a [name, value] pair or object",
                type_name(other),
            )),
        }
    }
}

/// `removeAttribute: "name"` or `removeAttribute: ["a", "b"]`
pub struct RemoveAttributeHandler;

impl PropertyHandler for RemoveAttributeHandler {
    fn test(&self, _element: &dyn Element, key: &str, _setting: &Setting) -> bool {
        key == "removeAttribute"
    }

    fn apply(&self, element: &dyn Element, setting: &Setting, key: &str) -> Result<(), ApplyError> {
        let value = expect_value("removeAttribute", key, setting, "a string or array")?;
        for name in string_list("removeAttribute", key, value)? {
            element.remove_attribute(&name);
        }
        Ok(())
    }
}

/// `dataset: { key: value }`
pub struct DatasetHandler;

impl PropertyHandler for DatasetHandler {
    fn test(&self, _element: &dyn Element, key: &str, _setting: &Setting) -> bool {
        key == "dataset"
    }

    fn apply(&self, element: &dyn Element, setting: &Setting, key: &str) -> Result<(), ApplyError> {
        match expect_value("dataset", key, setting, "an object")? {
            Value::Object(entries) => {
                for (name, value) in entries.iter().filter(|(_, value)| !value.is_null()) {
                    element.set_data(name, &to_js_string(value));
                }
                Ok(())
            }
            other => Err(ApplyError::invalid("dataset", key, "an object", type_name(other))),
        }
    }
}

/// `addEventListener: { event: handler }`. Every listener lands in the
/// element's listener registry so the next evaluation can remove it.
pub struct AddEventListenerHandler;

impl PropertyHandler for AddEventListenerHandler {
    fn test(&self, _element: &dyn Element, key: &str, _setting: &Setting) -> bool {
        key == ADD_LISTENER_KEY
    }

    fn apply(&self, element: &dyn Element, setting: &Setting, key: &str) -> Result<(), ApplyError> {
        let Setting::Listeners(listeners) = setting else {
            return Err(ApplyError::invalid(
                ADD_LISTENER_KEY,
                key,
                "event handlers",
                setting.describe(),
            ));
        };
        for (event, spec) in listeners {
            attach_listener(element, event, &spec.handler, spec.options);
        }
        debug!(count = listeners.len(), "[PropertyHandler] Attached listeners");
        Ok(())
    }
}

/// `removeEventListener: { event: handler }`
pub struct RemoveEventListenerHandler;

impl PropertyHandler for RemoveEventListenerHandler {
    fn test(&self, _element: &dyn Element, key: &str, _setting: &Setting) -> bool {
        key == REMOVE_LISTENER_KEY
    }

    fn apply(&self, element: &dyn Element, setting: &Setting, key: &str) -> Result<(), ApplyError> {
        let Setting::Listeners(listeners) = setting else {
            return Err(ApplyError::invalid(
                REMOVE_LISTENER_KEY,
                key,
                "event handlers",
                setting.describe(),
            ));
        };
        for (event, spec) in listeners {
            detach_listener(element, event, &spec.handler, spec.options);
        }
        Ok(())
    }
}

/// `method: [args..]` or `method: arg` for any method the element has
pub struct MethodCallHandler;

impl PropertyHandler for MethodCallHandler {
    fn test(&self, element: &dyn Element, key: &str, setting: &Setting) -> bool {
        matches!(setting, Setting::Value(_)) && element.has_method(key)
    }

    fn apply(&self, element: &dyn Element, setting: &Setting, key: &str) -> Result<(), ApplyError> {
        let args = match expect_value("method", key, setting, "method arguments")? {
            Value::Array(args) => args.clone(),
            single => vec![single.clone()],
        };
        element.call_method(key, &args)?;
        Ok(())
    }
}

/// Assign a known property, otherwise set an attribute with the
/// stringified value.
pub struct PlainPropertyHandler;

impl PropertyHandler for PlainPropertyHandler {
    fn test(&self, _element: &dyn Element, _key: &str, _setting: &Setting) -> bool {
        true
    }

    fn apply(&self, element: &dyn Element, setting: &Setting, key: &str) -> Result<(), ApplyError> {
        let value = expect_value("property", key, setting, "a value")?;
        if element.has_property(key) {
            element.set_property(key, value)?;
        } else {
            element.set_attribute(key, &to_js_string(value))?;
        }
        Ok(())
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// An ordered, owned table of property handlers.
#[derive(Clone)]
pub struct HandlerRegistry {
    entries: Vec<(String, Rc<dyn PropertyHandler>)>,
    fallback: Option<(String, Rc<dyn PropertyHandler>)>,
}

impl HandlerRegistry {
    /// The built-in handlers, with plain property assignment as fallback
    pub fn new() -> Self {
        let entries: Vec<(String, Rc<dyn PropertyHandler>)> = vec![
            ("style".into(), Rc::new(StyleHandler)),
            ("classList".into(), Rc::new(ClassListHandler)),
            ("setAttribute".into(), Rc::new(SetAttributeHandler)),
            ("removeAttribute".into(), Rc::new(RemoveAttributeHandler)),
            ("dataset".into(), Rc::new(DatasetHandler)),
            (ADD_LISTENER_KEY.into(), Rc::new(AddEventListenerHandler)),
            (REMOVE_LISTENER_KEY.into(), Rc::new(RemoveEventListenerHandler)),
            ("methodCall".into(), Rc::new(MethodCallHandler)),
        ];
        Self {
            entries,
            fallback: Some(("property".into(), Rc::new(PlainPropertyHandler))),
        }
    }

    /// No handlers; every key is unhandled
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            fallback: None,
        }
    }

    /// Add a handler ahead of the fallback, or replace one with the same name
    pub fn register(&mut self, name: impl Into<String>, handler: impl PropertyHandler + 'static) {
        self.register_rc(name, Rc::new(handler));
    }

    pub fn register_rc(&mut self, name: impl Into<String>, handler: Rc<dyn PropertyHandler>) {
        let name = name.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = handler;
            return;
        }
        if let Some(fallback) = self.fallback.as_mut().filter(|(n, _)| *n == name) {
            fallback.1 = handler;
            return;
        }
        self.entries.push((name, handler));
    }

    /// Apply one key with the first handler that claims it
    pub fn apply(&self, element: &dyn Element, key: &str, setting: &Setting) -> Result<(), ApplyError> {
        let handler = self
            .entries
            .iter()
            .chain(self.fallback.iter())
            .find(|(_, handler)| handler.test(element, key, setting));

        match handler {
            Some((_, handler)) => handler.apply(element, setting, key),
            None => Err(ApplyError::Unhandled {
                key: key.to_string(),
            }),
        }
    }

    /// Apply every key of `config`. A failing key is logged and skipped.
    /// Returns how many keys applied cleanly.
    pub fn apply_config(&self, element: &dyn Element, config: &Config) -> usize {
        let mut applied = 0;
        for (key, setting) in config.iter() {
            match self.apply(element, key, setting) {
                Ok(()) => applied += 1,
                Err(ApplyError::Unhandled { key }) => {
                    warn!(key = %key, element = ?element, "[PropertyHandler] No handler for key; ignoring");
                }
                Err(err) => {
                    warn!(key, element = ?element, error = %err, "[PropertyHandler] Failed to apply key");
                }
            }
        }
        applied
    }

    /// Handler names in evaluation order
    pub fn names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .chain(self.fallback.iter())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len() + usize::from(self.fallback.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
