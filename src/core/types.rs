// ============================================================================
// spark-dom - Type Definitions
// Type-erased traits and the per-key dependency node
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::constants::*;

// =============================================================================
// TYPE-ERASED TRAITS
// =============================================================================
//
// Graph operations (mark dirty, record an edge, drop an edge) never need the
// value type. A container key, a ref and a computed are all "sources"; effects
// and computeds are "reactions". Edges are stored on both ends:
// - a source holds Weak<dyn AnyReaction> (no cycles, dead reactions are skipped)
// - a reaction holds Rc<dyn AnySource> (keeps what it read alive)
// =============================================================================

/// Type-erased source interface: something that can be read and written.
pub trait AnySource: Any {
    /// Get the flags bitmask
    fn flags(&self) -> u32;

    /// Set the flags bitmask
    fn set_flags(&self, flags: u32);

    /// Version of the reaction run that last recorded a read of this source
    fn read_version(&self) -> u64;

    /// Stamp this source as read by the run with `version`
    fn set_read_version(&self, version: u64);

    /// Get the number of reactions depending on this source
    fn reaction_count(&self) -> usize;

    /// Add a reaction that depends on this source
    fn add_reaction(&self, reaction: Weak<dyn AnyReaction>);

    /// Remove dead (dropped) reactions from the list
    fn cleanup_dead_reactions(&self);

    /// Iterate over live reactions. The callback returns false to stop.
    fn for_each_reaction(&self, f: &mut dyn FnMut(Rc<dyn AnyReaction>) -> bool);

    /// Remove a specific reaction (pointer identity)
    fn remove_reaction(&self, reaction: &Rc<dyn AnyReaction>);

    /// Clear all reactions from this source
    fn clear_reactions(&self);

    /// Check if this is a computed
    fn is_computed(&self) -> bool {
        self.flags() & COMPUTED != 0
    }

    /// Upcast to Any for downcasting
    fn as_any(&self) -> &dyn Any;
}

/// Type-erased reaction interface: something that re-runs when its sources change.
pub trait AnyReaction: Any {
    /// Get the flags bitmask
    fn flags(&self) -> u32;

    /// Set the flags bitmask
    fn set_flags(&self, flags: u32);

    /// Get the number of dependencies
    fn dep_count(&self) -> usize;

    /// Add a dependency (a source this reaction read)
    fn add_dep(&self, source: Rc<dyn AnySource>);

    /// Check whether this reaction already depends on `source`
    fn has_dep(&self, source: &Rc<dyn AnySource>) -> bool;

    /// Remove and return all dependencies
    fn take_deps(&self) -> Vec<Rc<dyn AnySource>>;

    /// Execute the reaction (re-run effect, recompute computed)
    fn update(&self);

    /// Check if this is a computed
    fn is_computed(&self) -> bool {
        self.flags() & COMPUTED != 0
    }

    /// Check if this is an effect
    fn is_effect(&self) -> bool {
        self.flags() & EFFECT != 0
    }

    /// Check if this reaction is dirty
    fn is_dirty(&self) -> bool {
        self.flags() & DIRTY != 0
    }

    /// Check if this reaction is clean
    fn is_clean(&self) -> bool {
        self.flags() & CLEAN != 0
    }

    /// Check if this reaction is destroyed
    fn is_destroyed(&self) -> bool {
        self.flags() & DESTROYED != 0
    }

    /// Mark as dirty
    fn mark_dirty(&self) {
        self.set_flags((self.flags() & STATUS_MASK) | DIRTY);
    }

    /// Mark as clean
    fn mark_clean(&self) {
        self.set_flags((self.flags() & STATUS_MASK) | CLEAN);
    }

    /// Upcast to Any for downcasting
    fn as_any(&self) -> &dyn Any;

    /// If this reaction is also a source (a computed), return that side so
    /// invalidation can cascade to whoever read the computed.
    fn as_computed_source(&self) -> Option<Rc<dyn AnySource>>;
}

/// Compare two trait objects by allocation, ignoring vtables.
pub(crate) fn same_source(a: &Rc<dyn AnySource>, b: &Rc<dyn AnySource>) -> bool {
    Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
}

/// Compare two reactions by allocation, ignoring vtables.
pub(crate) fn same_reaction(a: &Rc<dyn AnyReaction>, b: &Rc<dyn AnyReaction>) -> bool {
    Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
}

// =============================================================================
// DEP (one edge target: a container key or a ref)
// =============================================================================

/// A value-less dependency node.
///
/// Containers keep one `Dep` per key that has been read under tracking; refs
/// keep one for their `value`. The node only knows who read it and how many
/// times it was written.
pub struct Dep {
    /// Flags bitmask (SOURCE | status)
    flags: Cell<u32>,

    /// Number of notified writes
    write_count: Cell<u64>,

    /// Run version of the last recorded read
    read_version: Cell<u64>,

    /// Reactions that read this node (weak refs to avoid cycles)
    reactions: RefCell<Vec<Weak<dyn AnyReaction>>>,
}

impl Dep {
    /// Create a new dependency node
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            flags: Cell::new(SOURCE | CLEAN),
            write_count: Cell::new(0),
            read_version: Cell::new(0),
            reactions: RefCell::new(Vec::new()),
        })
    }

    /// Record one write
    pub fn bump(&self) {
        self.write_count.set(self.write_count.get() + 1);
    }

    /// Number of writes seen so far
    pub fn write_count(&self) -> u64 {
        self.write_count.get()
    }
}

impl AnySource for Dep {
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
// TESTS
// =============================================================================
