// ============================================================================
// spark-dom - Effect Scheduling
// Draining the queue of invalidated effects
// ============================================================================
//
// There are no microtasks here: invalidated effects run synchronously, either
// right after the write that invalidated them or when the outermost batch
// closes. While the queue drains, further invalidations are appended to it and
// picked up by the next round instead of recursing.
// ============================================================================

use tracing::error;

use crate::core::context::with_context;

// =============================================================================
// FLUSH PENDING REACTIONS
// =============================================================================

/// Maximum flush rounds before we consider it an infinite loop
pub const MAX_FLUSH_COUNT: u32 = 1000;

/// Restores the flushing flag even if an effect panics.
struct FlushGuard {
    prev: bool,
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        with_context(|ctx| ctx.swap_flushing(self.prev));
    }
}

/// Run every queued effect that is still dirty.
///
/// No-op while a batch is open (the batch flushes on close) or while another
/// flush is already draining the queue (it will pick new entries up).
///
/// An effect that keeps invalidating itself would loop forever; after
/// `MAX_FLUSH_COUNT` rounds the remaining queue is dropped and an error is
/// logged.
pub fn flush_pending_reactions() {
    let can_flush = with_context(|ctx| ctx.can_flush());
    if !can_flush {
        return;
    }

    let _guard = FlushGuard {
        prev: with_context(|ctx| ctx.swap_flushing(true)),
    };

    let mut rounds = 0u32;

    loop {
        let pending = with_context(|ctx| ctx.drain_queue());
        if pending.is_empty() {
            break;
        }

        rounds += 1;
        if rounds > MAX_FLUSH_COUNT {
            error!(
                dropped = pending.len(),
                "[Effect] Maximum update depth exceeded. An effect keeps writing to state it reads; dropping the remaining queue"
            );
            break;
        }

        for reaction_weak in pending {
            let Some(reaction) = reaction_weak.upgrade() else {
                continue;
            };

            if reaction.is_destroyed() || !reaction.is_effect() || !reaction.is_dirty() {
                continue;
            }

            reaction.update();
        }
    }
}

/// Run `f` as if it were part of a flush, then drain whatever it queued.
///
/// Used for the first run of an effect and for manual re-runs: writes made by
/// the effect body are queued instead of re-entering it.
pub(crate) fn run_guarded<R>(f: impl FnOnce() -> R) -> R {
    let prev = with_context(|ctx| ctx.swap_flushing(true));

    let result = {
        let _guard = FlushGuard { prev };
        f()
    };

    if !prev {
        flush_pending_reactions();
    }

    result
}

/// Synchronously drain the queue (no-op inside a batch).
pub fn flush_sync() {
    flush_pending_reactions();
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::*;
    use crate::core::types::{AnyReaction, AnySource};
    use std::any::Any;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Counter {
        flags: Cell<u32>,
        runs: Cell<u32>,
    }

    impl AnyReaction for Counter {
        fn flags(&self) -> u32 {
            self.flags.get()
        }

        fn set_flags(&self, flags: u32) {
            self.flags.set(flags);
        }

        fn dep_count(&self) -> usize {
            0
        }

        fn add_dep(&self, _source: Rc<dyn AnySource>) {}

        fn has_dep(&self, _source: &Rc<dyn AnySource>) -> bool {
            false
        }

        fn take_deps(&self) -> Vec<Rc<dyn AnySource>> {
            Vec::new()
        }

        fn update(&self) {
            self.runs.set(self.runs.get() + 1);
            self.mark_clean();
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_computed_source(&self) -> Option<Rc<dyn AnySource>> {
            None
        }
    }

    fn counter(flags: u32) -> Rc<Counter> {
        Rc::new(Counter {
            flags: Cell::new(flags),
            runs: Cell::new(0),
        })
    }

    fn enqueue(reaction: &Rc<Counter>) {
        let as_reaction: Rc<dyn AnyReaction> = reaction.clone();
        with_context(|ctx| ctx.enqueue(Rc::downgrade(&as_reaction)));
    }

    #[test]
    fn flush_runs_dirty_effects_once() {
        let effect = counter(EFFECT | DIRTY);
        enqueue(&effect);
        enqueue(&effect);

        flush_sync();

        assert_eq!(effect.runs.get(), 1);
    }

    #[test]
    fn flush_skips_destroyed_and_clean() {
        let destroyed = counter(EFFECT | DIRTY | DESTROYED);
        let clean = counter(EFFECT | CLEAN);
        enqueue(&destroyed);
        enqueue(&clean);

        flush_sync();

        assert_eq!(destroyed.runs.get(), 0);
        assert_eq!(clean.runs.get(), 0);
    }

    #[test]
    fn flush_waits_for_batch() {
        let effect = counter(EFFECT | DIRTY);
        enqueue(&effect);

        with_context(|ctx| ctx.enter_batch());
        flush_sync();
        assert_eq!(effect.runs.get(), 0);
        with_context(|ctx| ctx.exit_batch());

        flush_sync();
        assert_eq!(effect.runs.get(), 1);
    }

    #[test]
    fn run_guarded_defers_and_then_drains() {
        let effect = counter(EFFECT | DIRTY);

        run_guarded(|| {
            enqueue(&effect);
            flush_sync();
            assert_eq!(effect.runs.get(), 0);
        });

        assert_eq!(effect.runs.get(), 1);
        assert!(!with_context(|ctx| ctx.is_flushing()));
    }
}
