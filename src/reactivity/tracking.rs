// ============================================================================
// spark-dom - Dependency Tracking
// Recording reads into the active reaction and propagating writes
// ============================================================================
//
// The key challenge in Rust is borrow scoping: we must release RefCell borrows
// before mutating, using the "collect-then-mutate" pattern.
// ============================================================================

use std::rc::Rc;

use tracing::{trace, warn};

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::types::{AnyReaction, AnySource};
use crate::reactivity::scheduling::flush_pending_reactions;

// =============================================================================
// TRACK READ - Register dependency when reading
// =============================================================================

/// Record a read of `source` into the active reaction, if there is one.
///
/// No-op outside effects/computeds and inside `untrack`. A reaction that reads
/// the same source twice in one run keeps a single edge.
pub fn track_read(source: Rc<dyn AnySource>) {
    let active = with_context(|ctx| {
        if ctx.is_untracked() {
            return None;
        }
        ctx.reaction().map(|reaction| (reaction, ctx.read_version()))
    });

    let Some((reaction, version)) = active else {
        return;
    };

    if reaction.is_destroyed() {
        return;
    }

    // Deps are rebuilt every run, so an older stamp means "not read yet".
    // A newer one was left by a nested run and proves nothing either way.
    let stamp = source.read_version();
    if stamp == version || (stamp > version && reaction.has_dep(&source)) {
        return;
    }

    source.set_read_version(version);
    reaction.add_dep(source.clone());
    source.add_reaction(Rc::downgrade(&reaction));
}

// =============================================================================
// WRITE GUARD
// =============================================================================

/// Check whether a write may proceed.
///
/// Computeds are pure: a write attempted while one is evaluating is refused
/// with a warning instead of corrupting the graph mid-evaluation.
pub fn writes_allowed() -> bool {
    let inside_computed = with_context(|ctx| {
        ctx.reaction()
            .is_some_and(|reaction| reaction.flags() & COMPUTED != 0)
    });

    if inside_computed {
        warn!("[ReactiveState] Ignoring write performed inside a computed; computeds must not have side effects");
        return false;
    }
    true
}

// =============================================================================
// NOTIFY WRITE
// =============================================================================

/// Notify the graph that `source` was written.
///
/// Outside a batch, every effect that read `source` re-runs before this
/// returns. Inside a batch they are queued once each and run when the
/// outermost batch closes.
pub fn notify_write(source: Rc<dyn AnySource>) {
    mark_reactions(source);
}

// =============================================================================
// MARK REACTIONS - Propagate dirty state through the graph
// =============================================================================

/// Mark every reaction of `source` dirty and schedule the effects among them.
///
/// Computeds cascade: a dirty computed marks its own readers dirty. A reaction
/// that is already dirty is skipped, which is what deduplicates batched
/// invalidations: it is already queued (effect) or will recompute on its next
/// read (computed).
///
/// Uses an explicit stack so deep computed chains do not recurse.
pub fn mark_reactions(source: Rc<dyn AnySource>) {
    let mut effects_to_schedule: Vec<Rc<dyn AnyReaction>> = Vec::new();
    let mut stack: Vec<Rc<dyn AnySource>> = vec![source];

    while let Some(current) = stack.pop() {
        current.cleanup_dead_reactions();

        // BORROW SAFETY: collect first, the reactions list borrow ends here
        let reactions: Vec<Rc<dyn AnyReaction>> = {
            let mut collected = Vec::new();
            current.for_each_reaction(&mut |reaction| {
                collected.push(reaction);
                true
            });
            collected
        };

        for reaction in reactions {
            let flags = reaction.flags();
            if flags & (DIRTY | DESTROYED) != 0 {
                continue;
            }

            reaction.mark_dirty();

            if flags & COMPUTED != 0 {
                if let Some(computed_source) = reaction.as_computed_source() {
                    stack.push(computed_source);
                }
            } else if flags & EFFECT != 0 {
                effects_to_schedule.push(reaction);
            }
        }
    }

    if effects_to_schedule.is_empty() {
        return;
    }

    trace!(count = effects_to_schedule.len(), "[Effect] Scheduling invalidated effects");

    let should_flush = with_context(|ctx| {
        for effect in &effects_to_schedule {
            ctx.enqueue(Rc::downgrade(effect));
        }
        ctx.can_flush()
    });

    if should_flush {
        flush_pending_reactions();
    }
}

// =============================================================================
// REMOVE REACTIONS - Drop every edge of a reaction
// =============================================================================

/// Remove `reaction` from every source it depends on and clear its deps.
///
/// Called before each re-run (dependencies are rebuilt from scratch) and on
/// disposal.
pub fn remove_reactions(reaction: &Rc<dyn AnyReaction>) {
    // Take the deps first so the reaction's list borrow is released
    let deps = reaction.take_deps();
    for dep in deps {
        dep.remove_reaction(reaction);
    }
}

// =============================================================================
// TESTS
// =============================================================================
