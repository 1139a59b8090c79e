// ============================================================================
// spark-dom - Reactive Context
// Thread-local state for the currently running reaction and the batch queue
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::types::AnyReaction;

type WeakReaction = Weak<dyn AnyReaction>;

// =============================================================================
// FRAME
// =============================================================================

/// What a running reaction displaced from the context. Hand it back to
/// [`ReactiveContext::leave`] when the reaction finishes.
#[must_use = "a frame must be handed back to `leave`"]
pub struct Frame {
    reaction: Option<WeakReaction>,
    owner: Option<WeakReaction>,
    untracked: bool,
    read_version: u64,
}

// =============================================================================
// REACTIVE CONTEXT
// =============================================================================

/// Per-thread bookkeeping for the reactive graph.
///
/// One reaction is current at a time. Runners swap themselves in with
/// [`enter`](Self::enter) and restore what they displaced with
/// [`leave`](Self::leave), so nesting lives in the runners' call frames.
/// The owner is the innermost running effect: effects created while it is
/// set become its children. Computeds record reads but own nothing.
///
/// Every run gets a fresh read version, strictly greater than any handed out
/// before. Sources stamp the version of the run that last recorded them, so a
/// repeated read within one run is recognised without scanning its deps.
#[derive(Default)]
pub struct ReactiveContext {
    reaction: RefCell<Option<WeakReaction>>,
    owner: RefCell<Option<WeakReaction>>,
    untracked: Cell<bool>,
    read_version: Cell<u64>,
    last_version: Cell<u64>,

    batch_depth: Cell<u32>,
    queue: RefCell<Vec<WeakReaction>>,
    flushing: Cell<bool>,
}

impl ReactiveContext {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // CURRENT REACTION
    // =========================================================================

    /// Make `reaction` current. With `owns_children` it also becomes the
    /// owner of effects created while it runs. Reads are tracked again even
    /// if the caller was inside `untrack`.
    pub fn enter(&self, reaction: WeakReaction, owns_children: bool) -> Frame {
        let owner = if owns_children {
            self.owner.replace(Some(reaction.clone()))
        } else {
            self.owner.borrow().clone()
        };
        let version = self.last_version.get() + 1;
        self.last_version.set(version);
        Frame {
            reaction: self.reaction.replace(Some(reaction)),
            owner,
            untracked: self.untracked.replace(false),
            read_version: self.read_version.replace(version),
        }
    }

    /// Restore what [`enter`](Self::enter) displaced
    pub fn leave(&self, frame: Frame) {
        *self.reaction.borrow_mut() = frame.reaction;
        *self.owner.borrow_mut() = frame.owner;
        self.untracked.set(frame.untracked);
        self.read_version.set(frame.read_version);
    }

    /// The reaction whose reads are being recorded right now
    pub fn reaction(&self) -> Option<Rc<dyn AnyReaction>> {
        self.reaction.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Version of the run currently recording reads (0 outside any run)
    pub fn read_version(&self) -> u64 {
        self.read_version.get()
    }

    pub fn has_reaction(&self) -> bool {
        self.reaction.borrow().is_some()
    }

    /// The effect that owns effects created right now
    pub fn owner(&self) -> Option<Rc<dyn AnyReaction>> {
        self.owner.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Turn read tracking off (or back on), returning the previous setting
    pub fn swap_untracked(&self, untracked: bool) -> bool {
        self.untracked.replace(untracked)
    }

    pub fn is_untracked(&self) -> bool {
        self.untracked.get()
    }

    // =========================================================================
    // BATCHING AND THE QUEUE
    // =========================================================================

    /// Open a batch level, returning the new depth
    pub fn enter_batch(&self) -> u32 {
        let depth = self.batch_depth.get() + 1;
        self.batch_depth.set(depth);
        depth
    }

    /// Close a batch level, returning the new depth
    pub fn exit_batch(&self) -> u32 {
        let depth = self.batch_depth.get().saturating_sub(1);
        self.batch_depth.set(depth);
        depth
    }

    pub fn batch_depth(&self) -> u32 {
        self.batch_depth.get()
    }

    pub fn is_batching(&self) -> bool {
        self.batch_depth.get() > 0
    }

    /// Queue an invalidated effect for the next flush
    pub fn enqueue(&self, reaction: WeakReaction) {
        self.queue.borrow_mut().push(reaction);
    }

    /// Take everything queued so far, in invalidation order
    pub fn drain_queue(&self) -> Vec<WeakReaction> {
        self.queue.take()
    }

    pub fn queued(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Mark the queue as being drained (or not), returning the previous mark
    pub fn swap_flushing(&self, flushing: bool) -> bool {
        self.flushing.replace(flushing)
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.get()
    }

    /// Neither batching nor already draining
    pub fn can_flush(&self) -> bool {
        !self.is_batching() && !self.is_flushing()
    }
}

// =============================================================================
// THREAD-LOCAL ACCESS
// =============================================================================

thread_local! {
    static CONTEXT: ReactiveContext = ReactiveContext::new();
}

/// Run `f` against this thread's reactive context
pub fn with_context<R>(f: impl FnOnce(&ReactiveContext) -> R) -> R {
    CONTEXT.with(f)
}

/// Whether a read right now would be recorded
pub fn is_tracking() -> bool {
    with_context(|ctx| ctx.has_reaction() && !ctx.is_untracked())
}

// =============================================================================
// TESTS
// =============================================================================
