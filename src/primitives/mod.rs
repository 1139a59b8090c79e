// ============================================================================
// spark-dom - Primitives Module
// Core reactive primitives: effect, computed, ref, watch
// ============================================================================

pub mod computed;
pub mod effect;
pub mod reference;
pub mod watch;

// Re-export for convenience
pub use computed::{computed, Computed, ComputedInner};
pub use effect::{
    destroy_effect, effect, effect_tracking, effect_with_cleanup, update_effect, CleanupFn,
    Effect, EffectFn, EffectInner,
};
pub use reference::{reactive_ref, Ref};
pub use watch::{watch, watch_immediate};
