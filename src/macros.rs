// ============================================================================
// spark-dom - Ergonomic Macros
// ============================================================================

/// Clone variables into a move closure.
///
/// Saves the `let x = x.clone();` lines before every closure that captures
/// a container, a ref or an element handle.
///
/// # Usage
///
/// ```rust
/// use spark_dom::{cloned, effect, state};
/// use serde_json::json;
///
/// let s = state(json!({ "n": 1 }));
/// let _e = effect(cloned!(s => move || {
///     let _ = s.get("n");
/// }));
/// s.set("n", 2);
/// ```
#[macro_export]
macro_rules! cloned {
    ($($n:ident),+ => $e:expr) => {
        {
            $( let $n = $n.clone(); )+
            $e
        }
    };
}

/// Create an effect with automatic variable capturing.
///
/// Wraps `effect(cloned!(... => move || ...))`.
///
/// # Usage
///
/// ```rust
/// use spark_dom::{effect, reactive_ref};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let count = reactive_ref(1);
/// let seen = Rc::new(Cell::new(0));
///
/// let _e = effect!(count, seen => seen.set(count.value()));
/// count.set_value(5);
/// assert_eq!(seen.get(), 5);
/// ```
#[macro_export]
macro_rules! effect {
    // Case 1: With dependencies
    ($($deps:ident),+ => $body:expr) => {
        $crate::effect($crate::cloned!($($deps),+ => move || { $body; }))
    };
    // Case 2: No dependencies
    ($body:expr) => {
        $crate::effect(move || { $body; })
    };
}
