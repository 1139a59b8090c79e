// ============================================================================
// spark-dom - Element Boundary
// What the conditions engine needs from a DOM element
// ============================================================================
//
// The engine never touches a real DOM directly. Everything it does to an
// element goes through this trait, so a browser binding, a server-side
// document or the in-memory implementation in `dom::memory` can sit behind
// it. All methods take `&self`: elements are shared handles with interior
// mutability, exactly like DOM nodes.
// ============================================================================

use std::fmt;
use std::rc::Rc;

use serde::Deserialize;
use serde_json::Value;

use super::listeners::ListenerRegistry;
use crate::conditions::config::Config;
use crate::error::DomError;

/// Shared handle to an element
pub type ElementRef = Rc<dyn Element>;

// =============================================================================
// EVENTS
// =============================================================================

/// A dispatched event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: String,
    pub detail: Value,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            detail: Value::Null,
        }
    }

    pub fn with_detail(kind: impl Into<String>, detail: Value) -> Self {
        Self {
            kind: kind.into(),
            detail,
        }
    }
}

/// An event callback. Two handlers are the same listener when they share
/// the same allocation (`ptr_eq`), mirroring function identity in the DOM.
#[derive(Clone)]
pub struct EventHandler(Rc<dyn Fn(&Event)>);

impl EventHandler {
    pub fn new(f: impl Fn(&Event) + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, event: &Event) {
        (self.0)(event)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::as_ptr(&self.0) as *const () == Rc::as_ptr(&other.0) as *const ()
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

impl<F: Fn(&Event) + 'static> From<F> for EventHandler {
    fn from(f: F) -> Self {
        Self::new(f)
    }
}

/// `addEventListener` options. Only `capture` takes part in listener
/// identity when removing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(default)]
pub struct ListenerOptions {
    pub capture: bool,
    pub once: bool,
    pub passive: bool,
}

impl ListenerOptions {
    pub fn capture() -> Self {
        Self {
            capture: true,
            ..Self::default()
        }
    }

    pub fn once() -> Self {
        Self {
            once: true,
            ..Self::default()
        }
    }
}

// =============================================================================
// ELEMENT
// =============================================================================

/// A DOM element as seen by the conditions engine.
pub trait Element {
    fn tag_name(&self) -> String;

    // --- style ---------------------------------------------------------------
    fn set_style(&self, property: &str, value: &str) -> Result<(), DomError>;
    fn style(&self, property: &str) -> Option<String>;

    // --- class list ------------------------------------------------------------
    fn add_class(&self, class: &str);
    fn remove_class(&self, class: &str);
    /// Returns whether the class is present afterwards
    fn toggle_class(&self, class: &str) -> bool;
    /// Returns whether `old` was present (and so replaced)
    fn replace_class(&self, old: &str, new: &str) -> bool;
    fn has_class(&self, class: &str) -> bool;
    fn set_class_name(&self, classes: &str);
    fn class_name(&self) -> String;

    // --- attributes ------------------------------------------------------------
    fn set_attribute(&self, name: &str, value: &str) -> Result<(), DomError>;
    fn get_attribute(&self, name: &str) -> Option<String>;
    fn remove_attribute(&self, name: &str);

    // --- dataset ---------------------------------------------------------------
    fn set_data(&self, key: &str, value: &str);
    fn data(&self, key: &str) -> Option<String>;

    // --- properties ------------------------------------------------------------
    fn has_property(&self, name: &str) -> bool;
    fn get_property(&self, name: &str) -> Option<Value>;
    fn set_property(&self, name: &str, value: &Value) -> Result<(), DomError>;

    // --- methods ---------------------------------------------------------------
    fn has_method(&self, name: &str) -> bool;
    fn call_method(&self, name: &str, args: &[Value]) -> Result<Value, DomError>;

    // --- events ----------------------------------------------------------------
    fn add_event_listener(&self, event: &str, handler: &EventHandler, options: ListenerOptions);
    fn remove_event_listener(&self, event: &str, handler: &EventHandler, options: ListenerOptions);
    fn listener_count(&self, event: &str) -> usize;
    /// Run the listeners for `event.kind`; returns how many ran
    fn dispatch_event(&self, event: &Event) -> usize;

    /// Listeners attached by the conditions engine (owned by the element)
    fn listeners(&self) -> &ListenerRegistry;

    /// The bulk `.update()` collaborator, when the element has one
    fn as_updatable(&self) -> Option<&dyn Updatable> {
        None
    }
}

/// An element-level bulk mutation helper (`element.update(config)`).
///
/// When present, the orchestrator prefers it over its own handler registry
/// for every key except listener registration.
pub trait Updatable {
    fn update(&self, config: &Config) -> Result<(), DomError>;
}

impl fmt::Debug for dyn Element + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag_name())?;
        if let Some(id) = self.get_attribute("id") {
            write!(f, " id={id:?}")?;
        }
        let classes = self.class_name();
        if !classes.is_empty() {
            write!(f, " class={classes:?}")?;
        }
        write!(f, ">")
    }
}
