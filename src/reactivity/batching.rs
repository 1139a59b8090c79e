// ============================================================================
// spark-dom - Batching
// Coalescing many writes into a single effect pass
// ============================================================================

use crate::core::context::with_context;
use crate::reactivity::scheduling::flush_pending_reactions;

// =============================================================================
// BATCH
// =============================================================================

/// Batch multiple writes into a single reaction pass.
///
/// Every effect invalidated inside `f` runs exactly once, after `f` returns,
/// no matter how many of its dependencies were written. Batches nest; only the
/// outermost one flushes.
///
/// # Example
///
/// ```
/// use spark_dom::{batch, effect, state};
/// use serde_json::json;
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let s = state(json!({ "x": 1, "y": 2 }));
/// let runs = Rc::new(Cell::new(0));
///
/// let _effect = effect({
///     let (s, runs) = (s.clone(), runs.clone());
///     move || {
///         let _ = s.get("x").as_i64().unwrap_or(0) + s.get("y").as_i64().unwrap_or(0);
///         runs.set(runs.get() + 1);
///     }
/// });
/// assert_eq!(runs.get(), 1);
///
/// batch(|| {
///     s.set("x", 10);
///     s.set("y", 20);
/// });
///
/// assert_eq!(runs.get(), 2);
/// ```
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    with_context(|ctx| ctx.enter_batch());

    // Exit the batch even if `f` panics
    struct BatchGuard;

    impl Drop for BatchGuard {
        fn drop(&mut self) {
            let depth = with_context(|ctx| ctx.exit_batch());

            if depth == 0 {
                flush_pending_reactions();
            }
        }
    }

    let _guard = BatchGuard;
    f()
}

/// Check if currently inside a batch.
pub fn is_batching() -> bool {
    with_context(|ctx| ctx.is_batching())
}

// =============================================================================
// UNTRACK
// =============================================================================

/// Read reactive state without creating dependencies.
///
/// # Example
///
/// ```
/// use spark_dom::{effect, reactive_ref, untrack};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let a = reactive_ref(1);
/// let b = reactive_ref(2);
/// let runs = Rc::new(Cell::new(0));
///
/// let _effect = effect({
///     let (a, b, runs) = (a.clone(), b.clone(), runs.clone());
///     move || {
///         let _ = a.value();
///         let _ = untrack(|| b.value());
///         runs.set(runs.get() + 1);
///     }
/// });
///
/// b.set_value(20);
/// assert_eq!(runs.get(), 1);
///
/// a.set_value(10);
/// assert_eq!(runs.get(), 2);
/// ```
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let prev = with_context(|ctx| ctx.swap_untracked(true));

    struct UntrackGuard {
        prev: bool,
    }

    impl Drop for UntrackGuard {
        fn drop(&mut self) {
            with_context(|ctx| ctx.swap_untracked(self.prev));
        }
    }

    let _guard = UntrackGuard { prev };
    f()
}

/// Alias for `untrack()`.
pub fn peek<T>(f: impl FnOnce() -> T) -> T {
    untrack(f)
}

/// Check if currently in untrack mode.
pub fn is_untracking() -> bool {
    with_context(|ctx| ctx.is_untracked())
}

// =============================================================================
// TESTS
// =============================================================================
