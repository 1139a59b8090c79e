// ============================================================================
// spark-dom - DOM Boundary
// ============================================================================

pub mod element;
pub mod listeners;
pub mod memory;
pub mod target;

pub use element::{Element, ElementRef, Event, EventHandler, ListenerOptions, Updatable};
pub use listeners::{attach_listener, detach_listener, ListenerRegistry, TrackedListener};
pub use memory::{MemoryDocument, MemoryElement, MemoryList};
pub use target::{safe_collect, ElementList, ElementResolver, Resolved, Target};
