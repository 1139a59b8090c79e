// ============================================================================
// spark-dom - Reactivity Module
// Dependency tracking, batching and effect scheduling
// ============================================================================

pub mod batching;
pub mod scheduling;
pub mod tracking;

// Re-export main tracking functions
pub use tracking::{mark_reactions, notify_write, remove_reactions, track_read, writes_allowed};

// Re-export scheduling functions
pub use scheduling::{flush_pending_reactions, flush_sync, MAX_FLUSH_COUNT};

// Re-export batching functions
pub use batching::{batch, peek, untrack};
