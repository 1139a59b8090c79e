// ============================================================================
// spark-dom - Reactive Ref
// A single-field container for primitive values
// ============================================================================

use std::fmt;
use std::rc::Rc;
use std::cell::RefCell;

use crate::core::types::{AnySource, Dep};
use crate::reactivity::tracking::{notify_write, track_read, writes_allowed};

// =============================================================================
// REF<T> - The public handle
// =============================================================================

struct RefInner<T> {
    value: RefCell<T>,
    dep: Rc<Dep>,
}

/// A reactive cell holding one value.
///
/// Reading `value()` inside an effect or computed records a dependency;
/// `set_value()` notifies every reader. Containers wrap objects and arrays;
/// a `Ref` is what primitives go in.
///
/// # Example
///
/// ```
/// use spark_dom::reactive_ref;
///
/// let count = reactive_ref(0);
/// assert_eq!(count.value(), 0);
///
/// count.set_value(5);
/// assert_eq!(count, 5);
/// assert_eq!(count.to_string(), "5");
/// ```
pub struct Ref<T> {
    inner: Rc<RefInner<T>>,
}

impl<T: 'static> Ref<T> {
    /// Create a new ref with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefInner {
                value: RefCell::new(value),
                dep: Dep::new(),
            }),
        }
    }

    fn track(&self) {
        track_read(self.inner.dep.clone() as Rc<dyn AnySource>);
    }

    fn notify(&self) {
        self.inner.dep.bump();
        notify_write(self.inner.dep.clone() as Rc<dyn AnySource>);
    }

    /// Get the current value (cloning), recording a dependency.
    pub fn value(&self) -> T
    where
        T: Clone,
    {
        self.track();
        self.inner.value.borrow().clone()
    }

    /// Access the current value with a closure (avoids cloning).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.borrow())
    }

    /// Get the current value without recording a dependency.
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Replace the value and notify readers.
    ///
    /// Equal values still notify.
    pub fn set_value(&self, value: T) {
        if !writes_allowed() {
            return;
        }
        *self.inner.value.borrow_mut() = value;
        self.notify();
    }

    /// Mutate the value in place and notify readers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        if !writes_allowed() {
            return;
        }
        f(&mut self.inner.value.borrow_mut());
        self.notify();
    }

    /// Number of effects/computeds currently reading this ref
    pub fn subscriber_count(&self) -> usize {
        self.inner.dep.cleanup_dead_reactions();
        self.inner.dep.reaction_count()
    }

    /// Number of writes so far
    pub fn write_count(&self) -> u64 {
        self.inner.dep.write_count()
    }

    /// Check whether two handles point at the same ref
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Display + 'static> fmt::Display for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with(|value| value.fmt(f))
    }
}

impl<T: fmt::Debug> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

impl<T: PartialEq + 'static> PartialEq<T> for Ref<T> {
    fn eq(&self, other: &T) -> bool {
        self.with(|value| value == other)
    }
}

/// Create a reactive ref.
pub fn reactive_ref<T: 'static>(value: T) -> Ref<T> {
    Ref::new(value)
}

// =============================================================================
// TESTS
// =============================================================================
