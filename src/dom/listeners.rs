// ============================================================================
// spark-dom - Listener Registry
// Per-element bookkeeping of listeners attached by the conditions engine
// ============================================================================
//
// Before a binding applies a configuration to an element it clears the
// element's registry, removing every listener a previous evaluation added.
// Listeners attached by other code are never recorded here and never touched.
// ============================================================================

use std::cell::RefCell;

use tracing::debug;

use super::element::{Element, EventHandler, ListenerOptions};

/// One listener attached through the engine.
#[derive(Debug, Clone)]
pub struct TrackedListener {
    pub event: String,
    pub handler: EventHandler,
    pub options: ListenerOptions,
}

impl TrackedListener {
    fn same_listener(&self, event: &str, handler: &EventHandler, options: ListenerOptions) -> bool {
        self.event == event && self.handler.ptr_eq(handler) && self.options.capture == options.capture
    }
}

/// The listeners the engine attached to one element.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    entries: RefCell<Vec<TrackedListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a listener (the caller already attached it)
    pub fn record(&self, listener: TrackedListener) {
        self.entries.borrow_mut().push(listener);
    }

    /// Drop the record of one listener (the caller already detached it).
    /// Returns whether it was recorded.
    pub fn forget(&self, event: &str, handler: &EventHandler, options: ListenerOptions) -> bool {
        let mut entries = self.entries.borrow_mut();
        match entries
            .iter()
            .position(|entry| entry.same_listener(event, handler, options))
        {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Detach every recorded listener from `element` and empty the registry.
    /// Returns how many were removed.
    pub fn clear(&self, element: &dyn Element) -> usize {
        // Release the borrow before calling into the element
        let entries = self.entries.take();
        let count = entries.len();
        for entry in entries {
            element.remove_event_listener(&entry.event, &entry.handler, entry.options);
        }
        if count > 0 {
            debug!(count, "[Conditions] Removed tracked listeners");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Event names in attach order
    pub fn events(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .map(|entry| entry.event.clone())
            .collect()
    }
}

/// Attach a listener and record it in the element's registry
pub fn attach_listener(
    element: &dyn Element,
    event: &str,
    handler: &EventHandler,
    options: ListenerOptions,
) {
    element.add_event_listener(event, handler, options);
    element.listeners().record(TrackedListener {
        event: event.to_string(),
        handler: handler.clone(),
        options,
    });
}

/// Detach a listener and drop its record, if any
pub fn detach_listener(
    element: &dyn Element,
    event: &str,
    handler: &EventHandler,
    options: ListenerOptions,
) {
    element.remove_event_listener(event, handler, options);
    element.listeners().forget(event, handler, options);
}
