// ============================================================================
// spark-dom - Effect System
// Side effects that re-run when the state they read changes
// ============================================================================
//
// Key features:
// - Dependencies are rebuilt from scratch on every run (dynamic tracking)
// - Cleanup/teardown functions run before each re-run and on disposal
// - Effects created while another effect runs are owned by it and disposed
//   when it re-runs or is disposed
// - RAII disposal of top-level effects through the `Effect` handle
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use crate::core::constants::*;
use crate::core::context::{with_context, Frame};
use crate::core::types::{same_source, AnyReaction, AnySource};
use crate::reactivity::scheduling::run_guarded;
use crate::reactivity::tracking::remove_reactions;

// =============================================================================
// TYPE ALIASES
// =============================================================================

/// Cleanup function returned by effects, runs before next execution
pub type CleanupFn = Box<dyn FnOnce()>;

/// Effect function signature - returns optional cleanup
pub type EffectFn = Box<dyn FnMut() -> Option<CleanupFn>>;

// =============================================================================
// EFFECT INNER
// =============================================================================

/// The inner effect implementation.
///
/// Implements AnyReaction (but not AnySource: nothing reads an effect).
pub struct EffectInner {
    /// Flags bitmask for state tracking
    flags: Cell<u32>,

    /// The effect function
    func: RefCell<Option<EffectFn>>,

    /// Sources read during the most recent run
    deps: RefCell<Vec<Rc<dyn AnySource>>>,

    /// Teardown/cleanup function from last run
    teardown: RefCell<Option<CleanupFn>>,

    /// Effect that was running when this one was created
    parent: RefCell<Option<Weak<EffectInner>>>,

    /// Effects created during the most recent run (owned)
    children: RefCell<Vec<Rc<EffectInner>>>,

    /// Number of completed runs
    run_count: Cell<u32>,

    /// Weak reference to self, for trait object conversion
    self_weak: Weak<EffectInner>,
}

impl EffectInner {
    /// Create a new effect inner (not yet run)
    pub fn new(effect_type: u32, func: Option<EffectFn>) -> Rc<Self> {
        Rc::new_cyclic(|self_weak| Self {
            flags: Cell::new(effect_type | DIRTY),
            func: RefCell::new(func),
            deps: RefCell::new(Vec::new()),
            teardown: RefCell::new(None),
            parent: RefCell::new(None),
            children: RefCell::new(Vec::new()),
            run_count: Cell::new(0),
            self_weak: self_weak.clone(),
        })
    }

    /// Get this effect as a weak reference to AnyReaction
    pub fn as_weak_reaction(&self) -> Weak<dyn AnyReaction> {
        self.self_weak.clone() as Weak<dyn AnyReaction>
    }

    /// Get parent effect
    pub fn parent(&self) -> Option<Rc<EffectInner>> {
        self.parent.borrow().as_ref().and_then(|w| w.upgrade())
    }

    /// Number of effects currently owned by this one
    pub fn child_count(&self) -> usize {
        self.children.borrow().len()
    }

    /// Number of completed runs
    pub fn run_count(&self) -> u32 {
        self.run_count.get()
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        if let Some(cleanup) = self.teardown.get_mut().take() {
            cleanup();
        }
    }
}

// =============================================================================
// AnyReaction IMPLEMENTATION
// =============================================================================

impl AnyReaction for EffectInner {
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
        if self.is_destroyed() {
            return;
        }

        if let Some(rc_self) = self.self_weak.upgrade() {
            update_effect(&rc_self);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_computed_source(&self) -> Option<Rc<dyn AnySource>> {
        None
    }
}

// =============================================================================
// EFFECT HANDLE
// =============================================================================

/// Handle to a scheduled effect.
///
/// Dropping the last handle of a top-level effect disposes it. Effects created
/// inside another effect are also owned by that effect, so dropping their
/// handle leaves them running until the parent re-runs or is disposed.
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    pub(crate) fn from_inner(inner: Rc<EffectInner>) -> Self {
        Self { inner }
    }

    /// Get access to the inner effect
    pub fn inner(&self) -> &Rc<EffectInner> {
        &self.inner
    }

    /// Check if this effect is destroyed
    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }

    /// Stop future re-runs, drop every dependency edge and run the teardown
    pub fn dispose(&self) {
        destroy_effect(&self.inner);
    }

    /// Alias for [`Effect::dispose`]
    pub fn destroy(&self) {
        self.dispose();
    }

    /// Re-run the effect now, regardless of whether anything changed
    pub fn run(&self) {
        if self.is_destroyed() {
            warn!("[Effect] Ignoring run() on a disposed effect");
            return;
        }
        run_guarded(|| update_effect(&self.inner));
    }

    /// Number of completed runs
    pub fn run_count(&self) -> u32 {
        self.inner.run_count()
    }

    /// Number of sources read during the most recent run
    pub fn dep_count(&self) -> usize {
        self.inner.dep_count()
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        // A parent (or another handle) still owns the effect otherwise
        if Rc::strong_count(&self.inner) == 1 {
            self.dispose();
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("destroyed", &self.is_destroyed())
            .field("runs", &self.run_count())
            .field("deps", &self.dep_count())
            .finish()
    }
}

// =============================================================================
// EFFECT TREE
// =============================================================================

/// Make `effect` a child of `parent`
pub(crate) fn push_effect(effect: &Rc<EffectInner>, parent: &Rc<EffectInner>) {
    *effect.parent.borrow_mut() = Some(Rc::downgrade(parent));
    parent.children.borrow_mut().push(effect.clone());
}

/// Remove `effect` from its parent's child list
fn unlink_effect(effect: &Rc<EffectInner>) {
    if let Some(parent) = effect.parent() {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, effect));
    }
    *effect.parent.borrow_mut() = None;
}

/// Run an effect's teardown function
pub(crate) fn execute_teardown(effect: &EffectInner) {
    let teardown = effect.teardown.borrow_mut().take();
    if let Some(cleanup) = teardown {
        cleanup();
    }
}

/// Destroy all children of an effect
pub(crate) fn destroy_effect_children(effect: &Rc<EffectInner>) {
    // Detach first: a child's teardown may touch the parent's list
    let children = effect.children.replace(Vec::new());
    for child in children {
        *child.parent.borrow_mut() = None;
        destroy_effect(&child);
    }
}

// =============================================================================
// DESTROY EFFECT
// =============================================================================

/// Destroy an effect and all its children.
///
/// Idempotent. Removes every dependency edge, runs the teardown and drops the
/// effect function.
pub fn destroy_effect(effect: &Rc<EffectInner>) {
    if effect.is_destroyed() {
        return;
    }

    debug!(deps = effect.dep_count(), "[Effect] Disposing effect");

    effect.set_flags(effect.flags() | DESTROYED);

    destroy_effect_children(effect);

    remove_reactions(&(effect.clone() as Rc<dyn AnyReaction>));

    execute_teardown(effect);

    unlink_effect(effect);

    // The function may be executing right now (an effect disposing itself);
    // it is dropped with the effect in that case
    if let Ok(mut func) = effect.func.try_borrow_mut() {
        *func = None;
    }
}

// =============================================================================
// UPDATE EFFECT - Run an effect
// =============================================================================

/// Restores the previous reaction and owner even if the effect body panics.
struct RunGuard<'a> {
    effect: &'a EffectInner,
    frame: Option<Frame>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.effect
            .set_flags(self.effect.flags() & !REACTION_IS_UPDATING);
        if let Some(frame) = self.frame.take() {
            with_context(|ctx| ctx.leave(frame));
        }
    }
}

/// Run an effect and rebuild its dependencies.
///
/// 1. Marks the effect clean
/// 2. Destroys child effects from the previous run
/// 3. Runs the previous teardown
/// 4. Drops every old dependency edge
/// 5. Executes the function with this effect as the active reaction
/// 6. Stores the new teardown
pub fn update_effect(effect: &Rc<EffectInner>) {
    if effect.is_destroyed() {
        return;
    }

    effect.mark_clean();

    destroy_effect_children(effect);

    execute_teardown(effect);

    remove_reactions(&(effect.clone() as Rc<dyn AnyReaction>));

    let frame = with_context(|ctx| ctx.enter(effect.as_weak_reaction(), true));

    effect.set_flags(effect.flags() | REACTION_IS_UPDATING);

    let teardown = {
        let _guard = RunGuard {
            effect,
            frame: Some(frame),
        };

        match effect.func.try_borrow_mut() {
            Ok(mut func_borrow) => match func_borrow.as_mut() {
                Some(func) => func(),
                None => None,
            },
            Err(_) => {
                warn!("[Effect] Effect re-entered itself; skipping nested run");
                None
            }
        }
    };

    effect.run_count.set(effect.run_count.get() + 1);
    effect.set_flags(effect.flags() | EFFECT_RAN);

    trace!(
        run = effect.run_count.get(),
        deps = effect.dep_count(),
        "[Effect] Effect ran"
    );

    if effect.is_destroyed() {
        // Disposed during its own run: nothing will call this teardown later
        if let Some(cleanup) = teardown {
            cleanup();
        }
        return;
    }

    *effect.teardown.borrow_mut() = teardown;
}

// =============================================================================
// PUBLIC API
// =============================================================================

/// Create an effect that runs now and again whenever the state it read changes.
///
/// # Example
///
/// ```
/// use spark_dom::{effect, reactive_ref};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let count = reactive_ref(0);
/// let seen = Rc::new(Cell::new(-1));
///
/// let handle = effect({
///     let (count, seen) = (count.clone(), seen.clone());
///     move || seen.set(count.value())
/// });
/// assert_eq!(seen.get(), 0);
///
/// count.set_value(3);
/// assert_eq!(seen.get(), 3);
///
/// handle.dispose();
/// count.set_value(4);
/// assert_eq!(seen.get(), 3);
/// ```
pub fn effect<F>(mut f: F) -> Effect
where
    F: FnMut() + 'static,
{
    effect_with_cleanup(move || {
        f();
        None
    })
}

/// Create an effect that can return a cleanup function.
///
/// The cleanup function runs before each re-execution and when disposed.
pub fn effect_with_cleanup<F>(f: F) -> Effect
where
    F: FnMut() -> Option<CleanupFn> + 'static,
{
    Effect::from_inner(create_effect(EFFECT, Box::new(f)))
}

/// Check if we're currently inside an effect or computed.
pub fn effect_tracking() -> bool {
    with_context(|ctx| ctx.has_reaction())
}

// =============================================================================
// CREATE EFFECT (Internal)
// =============================================================================

fn create_effect(effect_type: u32, func: EffectFn) -> Rc<EffectInner> {
    let effect = EffectInner::new(effect_type, Some(func));

    let parent = with_context(|ctx| ctx.owner());

    let parent_effect = parent.and_then(|parent_rc| {
        parent_rc
            .as_any()
            .downcast_ref::<EffectInner>()
            .and_then(|inner| inner.self_weak.upgrade())
    });

    match parent_effect {
        Some(parent_effect) => push_effect(&effect, &parent_effect),
        None => effect.set_flags(effect.flags() | ROOT_EFFECT),
    }

    run_guarded(|| update_effect(&effect));

    effect
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::reference::reactive_ref;

    #[test]
    fn effect_runs_on_creation_and_on_change() {
        let runs = Rc::new(Cell::new(0));
        let count = reactive_ref(0);

        let _effect = effect({
            let (count, runs) = (count.clone(), runs.clone());
            move || {
                let _ = count.value();
                runs.set(runs.get() + 1);
            }
        });
        assert_eq!(runs.get(), 1);

        count.set_value(1);
        assert_eq!(runs.get(), 2);

        count.set_value(2);
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn cleanup_runs_before_rerun_and_on_dispose() {
        let cleanups = Rc::new(Cell::new(0));
        let count = reactive_ref(0);

        let handle = effect_with_cleanup({
            let (count, cleanups) = (count.clone(), cleanups.clone());
            move || {
                let _ = count.value();
                let cleanups = cleanups.clone();
                Some(Box::new(move || cleanups.set(cleanups.get() + 1)) as CleanupFn)
            }
        });
        assert_eq!(cleanups.get(), 0);

        count.set_value(1);
        assert_eq!(cleanups.get(), 1);

        handle.dispose();
        assert_eq!(cleanups.get(), 2);

        count.set_value(2);
        assert_eq!(cleanups.get(), 2);
    }

    #[test]
    fn dispose_stops_reruns_and_drops_edges() {
        let runs = Rc::new(Cell::new(0));
        let count = reactive_ref(0);

        let handle = effect({
            let (count, runs) = (count.clone(), runs.clone());
            move || {
                let _ = count.value();
                runs.set(runs.get() + 1);
            }
        });
        assert_eq!(count.subscriber_count(), 1);

        handle.dispose();
        assert!(handle.is_destroyed());
        assert_eq!(handle.dep_count(), 0);
        assert_eq!(count.subscriber_count(), 0);

        count.set_value(1);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn dropping_top_level_handle_disposes() {
        let runs = Rc::new(Cell::new(0));
        let count = reactive_ref(0);

        {
            let _effect = effect({
                let (count, runs) = (count.clone(), runs.clone());
                move || {
                    let _ = count.value();
                    runs.set(runs.get() + 1);
                }
            });
        }

        count.set_value(1);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn nested_effects_are_owned_by_parent() {
        let outer_runs = Rc::new(Cell::new(0));
        let inner_runs = Rc::new(Cell::new(0));
        let outer_dep = reactive_ref(0);
        let inner_dep = reactive_ref(0);

        let outer = effect({
            let (outer_dep, inner_dep) = (outer_dep.clone(), inner_dep.clone());
            let (outer_runs, inner_runs) = (outer_runs.clone(), inner_runs.clone());
            move || {
                let _ = outer_dep.value();
                outer_runs.set(outer_runs.get() + 1);

                // Handle dropped at end of scope: the parent keeps it alive
                let _inner = effect({
                    let (inner_dep, inner_runs) = (inner_dep.clone(), inner_runs.clone());
                    move || {
                        let _ = inner_dep.value();
                        inner_runs.set(inner_runs.get() + 1);
                    }
                });
            }
        });
        assert_eq!(outer.inner().child_count(), 1);

        inner_dep.set_value(1);
        assert_eq!(inner_runs.get(), 2);
        assert_eq!(outer_runs.get(), 1);

        // Re-running the parent replaces the child instead of duplicating it
        outer_dep.set_value(1);
        assert_eq!(outer_runs.get(), 2);
        assert_eq!(inner_runs.get(), 3);
        assert_eq!(outer.inner().child_count(), 1);

        inner_dep.set_value(2);
        assert_eq!(inner_runs.get(), 4);

        outer.dispose();
        inner_dep.set_value(3);
        assert_eq!(inner_runs.get(), 4);
    }

    #[test]
    fn nested_effect_restores_active_reaction() {
        let a = reactive_ref(0);
        let b = reactive_ref(0);
        let outer_runs = Rc::new(Cell::new(0));

        let _outer = effect({
            let (a, b, outer_runs) = (a.clone(), b.clone(), outer_runs.clone());
            move || {
                let _inner = effect({
                    let b = b.clone();
                    move || {
                        let _ = b.value();
                    }
                });
                // Read after the nested effect: must be recorded on the outer one
                let _ = a.value();
                outer_runs.set(outer_runs.get() + 1);
            }
        });

        a.set_value(1);
        assert_eq!(outer_runs.get(), 2);

        b.set_value(1);
        assert_eq!(outer_runs.get(), 2);
    }

    #[test]
    fn effect_tracking_inside_and_outside() {
        assert!(!effect_tracking());

        let was_tracking = Rc::new(Cell::new(false));
        let _effect = effect({
            let was_tracking = was_tracking.clone();
            move || was_tracking.set(effect_tracking())
        });

        assert!(was_tracking.get());
    }

    #[test]
    fn self_triggering_effect_is_stopped_without_panicking() {
        let count = reactive_ref(0);

        let _effect = effect({
            let count = count.clone();
            move || {
                let current = count.value();
                count.set_value(current + 1);
            }
        });

        // The guard stopped the loop; state is still usable afterwards
        assert!(count.peek() > 1);
        count.set_value(0);
    }

    #[test]
    fn manual_run_reruns_body() {
        let runs = Rc::new(Cell::new(0));
        let handle = effect({
            let runs = runs.clone();
            move || runs.set(runs.get() + 1)
        });

        handle.run();
        assert_eq!(runs.get(), 2);
        assert_eq!(handle.run_count(), 2);

        handle.dispose();
        handle.run();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn effect_inner_starts_dirty() {
        let inner = EffectInner::new(EFFECT, None);
        assert!(inner.is_dirty());
        assert!(inner.is_effect());

        update_effect(&inner);
        assert!(inner.is_clean());
        assert_eq!(inner.run_count(), 1);
    }

    #[test]
    fn destroy_effect_marks_destroyed_and_runs_teardown() {
        let called = Rc::new(Cell::new(false));
        let inner = EffectInner::new(EFFECT, None);
        *inner.teardown.borrow_mut() = Some(Box::new({
            let called = called.clone();
            move || called.set(true)
        }));

        destroy_effect(&inner);

        assert!(inner.is_destroyed());
        assert!(called.get());
    }
}
