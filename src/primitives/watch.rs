// ============================================================================
// spark-dom - Watchers
// Change callbacks built on effects
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::primitives::effect::{effect, Effect};
use crate::reactivity::batching::untrack;

/// Watch the value produced by `getter` and call `callback(new, old)` every
/// time it changes.
///
/// Only `getter` is tracked; the callback runs untracked, so the state it
/// reads or writes does not become a dependency. The callback does not run
/// for the initial value (see [`watch_immediate`]).
///
/// # Example
///
/// ```
/// use spark_dom::{reactive_ref, watch};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let count = reactive_ref(1);
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let _watcher = watch(
///     { let count = count.clone(); move || count.value() },
///     { let log = log.clone(); move |new: &i32, old: Option<&i32>| log.borrow_mut().push((*new, old.copied())) },
/// );
///
/// count.set_value(2);
/// count.set_value(2);
/// assert_eq!(*log.borrow(), vec![(2, Some(1))]);
/// ```
pub fn watch<T, G, C>(getter: G, callback: C) -> Effect
where
    T: PartialEq + Clone + 'static,
    G: Fn() -> T + 'static,
    C: FnMut(&T, Option<&T>) + 'static,
{
    create_watcher(getter, callback, false)
}

/// Like [`watch`], but also calls `callback(value, None)` once on creation.
pub fn watch_immediate<T, G, C>(getter: G, callback: C) -> Effect
where
    T: PartialEq + Clone + 'static,
    G: Fn() -> T + 'static,
    C: FnMut(&T, Option<&T>) + 'static,
{
    create_watcher(getter, callback, true)
}

fn create_watcher<T, G, C>(getter: G, callback: C, immediate: bool) -> Effect
where
    T: PartialEq + Clone + 'static,
    G: Fn() -> T + 'static,
    C: FnMut(&T, Option<&T>) + 'static,
{
    let previous: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
    let callback = Rc::new(RefCell::new(callback));
    let first = Rc::new(Cell::new(true));

    effect(move || {
        let next = getter();
        let old = previous.replace(Some(next.clone()));

        let is_first = first.replace(false);
        if is_first && !immediate {
            return;
        }
        if old.as_ref() == Some(&next) {
            return;
        }

        untrack(|| {
            if let Ok(mut cb) = callback.try_borrow_mut() {
                cb(&next, old.as_ref());
            }
        });
    })
}

// =============================================================================
// TESTS
// =============================================================================
