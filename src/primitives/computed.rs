// ============================================================================
// spark-dom - Computed Values
// Lazy derived values that cache until a dependency is written
// ============================================================================
//
// A computed is BOTH a source (effects read it, it has reactions) AND a
// reaction (it has deps and gets marked dirty). Writes never recompute it;
// they only mark it dirty and cascade to its readers. The function body runs
// on the next read.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::error;

use crate::core::constants::*;
use crate::core::context::{with_context, Frame};
use crate::core::types::{same_reaction, same_source, AnyReaction, AnySource};
use crate::reactivity::tracking::{remove_reactions, track_read};

// =============================================================================
// COMPUTED INNER
// =============================================================================

/// The internal data for a computed value.
pub struct ComputedInner<T> {
    /// Flags bitmask (COMPUTED | SOURCE | status)
    flags: Cell<u32>,

    /// The computation function
    func: Box<dyn Fn() -> T>,

    /// Cached value (None until the first read)
    value: RefCell<Option<T>>,

    /// Number of times the function body ran
    compute_count: Cell<u32>,

    /// Run version of the last recorded read (source side)
    read_version: Cell<u64>,

    /// Reactions that read this computed (source side)
    reactions: RefCell<Vec<Weak<dyn AnyReaction>>>,

    /// Sources read during the last computation (reaction side)
    deps: RefCell<Vec<Rc<dyn AnySource>>>,

    /// Self-reference for the trait object conversions
    self_weak: Weak<ComputedInner<T>>,
}

impl<T: Clone + 'static> ComputedInner<T> {
    /// Create a new computed. Starts dirty; nothing runs until the first read.
    pub fn new<F>(func: F) -> Rc<Self>
    where
        F: Fn() -> T + 'static,
    {
        Rc::new_cyclic(|self_weak| Self {
            flags: Cell::new(COMPUTED | SOURCE | DIRTY),
            func: Box::new(func),
            value: RefCell::new(None),
            compute_count: Cell::new(0),
            read_version: Cell::new(0),
            reactions: RefCell::new(Vec::new()),
            deps: RefCell::new(Vec::new()),
            self_weak: self_weak.clone(),
        })
    }

    /// Check if the value has been computed at least once
    pub fn is_initialized(&self) -> bool {
        self.value.borrow().is_some()
    }

    /// Number of times the function body ran
    pub fn compute_count(&self) -> u32 {
        self.compute_count.get()
    }

    /// Recompute if dirty. Dependencies are replaced, never merged.
    fn refresh(&self) {
        if !self.is_dirty() || self.flags.get() & REACTION_IS_UPDATING != 0 {
            return;
        }

        let Some(rc_self) = self.self_weak.upgrade() else {
            return;
        };
        let as_reaction: Rc<dyn AnyReaction> = rc_self;

        remove_reactions(&as_reaction);

        // A computed read inside `untrack` still records its own reads
        let frame = with_context(|ctx| ctx.enter(Rc::downgrade(&as_reaction), false));

        self.flags.set(self.flags.get() | REACTION_IS_UPDATING);

        struct ComputeGuard<'a, T> {
            inner: &'a ComputedInner<T>,
            frame: Option<Frame>,
        }

        impl<T> Drop for ComputeGuard<'_, T> {
            fn drop(&mut self) {
                self.inner
                    .flags
                    .set(self.inner.flags.get() & !REACTION_IS_UPDATING);
                if let Some(frame) = self.frame.take() {
                    with_context(|ctx| ctx.leave(frame));
                }
            }
        }

        let new_value = {
            let _guard = ComputeGuard {
                inner: self,
                frame: Some(frame),
            };
            (self.func)()
        };

        *self.value.borrow_mut() = Some(new_value);
        self.compute_count.set(self.compute_count.get() + 1);
        self.mark_clean();
    }

    /// Read the value, recomputing if needed and recording the read.
    ///
    /// Returns `None` only when the computed reads itself before it ever
    /// produced a value.
    pub fn read(&self) -> Option<T> {
        if self.flags.get() & REACTION_IS_UPDATING != 0 {
            error!("[ReactiveState] Computed value read itself while computing; returning the previous value");
            return self.value.borrow().clone();
        }

        self.refresh();

        if let Some(rc_self) = self.self_weak.upgrade() {
            track_read(rc_self as Rc<dyn AnySource>);
        }

        self.value.borrow().clone()
    }
}

// =============================================================================
// AnySource implementation for ComputedInner
// =============================================================================

impl<T: Clone + 'static> AnySource for ComputedInner<T> {
    fn flags(&self) -> u32 {
        self.flags.get()
    }

    fn set_flags(&self, flags: u32) {
        self.flags.set(flags);
    }

    fn read_version(&self) -> u64 {
        self.read_version.get()
    }

    fn set_read_version(&self, version: u64) {
        self.read_version.set(version);
    }

    fn reaction_count(&self) -> usize {
        self.reactions.borrow().len()
    }

    fn add_reaction(&self, reaction: Weak<dyn AnyReaction>) {
        self.reactions.borrow_mut().push(reaction);
    }

    fn cleanup_dead_reactions(&self) {
        self.reactions.borrow_mut().retain(|w| w.strong_count() > 0);
    }

    fn for_each_reaction(&self, f: &mut dyn FnMut(Rc<dyn AnyReaction>) -> bool) {
        let reactions = self.reactions.borrow();
        for weak in reactions.iter() {
            if let Some(rc) = weak.upgrade() {
                if !f(rc) {
                    break;
                }
            }
        }
    }

    fn remove_reaction(&self, reaction: &Rc<dyn AnyReaction>) {
        self.reactions.borrow_mut().retain(|weak| match weak.upgrade() {
            Some(rc) => !same_reaction(&rc, reaction),
            None => false,
        });
    }

    fn clear_reactions(&self) {
        self.reactions.borrow_mut().clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// AnyReaction implementation for ComputedInner
// =============================================================================

impl<T: Clone + 'static> AnyReaction for ComputedInner<T> {
    fn flags(&self) -> u32 {
        self.flags.get()
    }

    fn set_flags(&self, flags: u32) {
        self.flags.set(flags);
    }

    fn dep_count(&self) -> usize {
        self.deps.borrow().len()
    }

    fn add_dep(&self, source: Rc<dyn AnySource>) {
        self.deps.borrow_mut().push(source);
    }

    fn has_dep(&self, source: &Rc<dyn AnySource>) -> bool {
        self.deps.borrow().iter().any(|dep| same_source(dep, source))
    }

    fn take_deps(&self) -> Vec<Rc<dyn AnySource>> {
        self.deps.replace(Vec::new())
    }

    fn update(&self) {
        self.refresh();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_computed_source(&self) -> Option<Rc<dyn AnySource>> {
        self.self_weak
            .upgrade()
            .map(|rc| rc as Rc<dyn AnySource>)
    }
}

// =============================================================================
// COMPUTED - Public API
// =============================================================================

/// A cached value derived from reactive state.
///
/// Cloning is cheap (shared cache).
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    /// Read the value, recomputing only if a dependency was written since
    /// the last read.
    ///
    /// # Panics
    ///
    /// Panics if the computation reads its own value before producing one
    /// (a dependency cycle with no previous value to fall back on).
    pub fn get(&self) -> T {
        match self.inner.read() {
            Some(value) => value,
            None => panic!("computed value depends on itself"),
        }
    }

    /// Like [`Computed::get`] but returns `None` on a first-read cycle.
    pub fn try_get(&self) -> Option<T> {
        self.inner.read()
    }

    /// Apply `f` to the current value without cloning it.
    ///
    /// # Panics
    ///
    /// Same conditions as [`Computed::get`].
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let _ = self.inner.read();
        match self.inner.value.borrow().as_ref() {
            Some(value) => f(value),
            None => panic!("computed value depends on itself"),
        }
    }

    /// Whether the next read will run the function body
    pub fn is_dirty(&self) -> bool {
        self.inner.is_dirty()
    }

    /// Number of times the function body ran
    pub fn compute_count(&self) -> u32 {
        self.inner.compute_count()
    }

    /// Number of sources read during the last computation
    pub fn dep_count(&self) -> usize {
        AnyReaction::dep_count(&*self.inner)
    }

    /// Access the inner node
    pub fn inner(&self) -> &Rc<ComputedInner<T>> {
        &self.inner
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + std::fmt::Debug + 'static> std::fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("value", &self.inner.value.borrow())
            .field("dirty", &self.inner.is_dirty())
            .finish()
    }
}

/// Create a computed value.
///
/// # Example
///
/// ```
/// use spark_dom::{computed, reactive_ref};
///
/// let count = reactive_ref(2);
/// let doubled = computed({
///     let count = count.clone();
///     move || count.value() * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// count.set_value(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub fn computed<T, F>(f: F) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
{
    Computed {
        inner: ComputedInner::new(f),
    }
}

// =============================================================================
// TESTS
// =============================================================================
