// ============================================================================
// spark-dom - Constants
// Flag bits for dependency nodes, computeds and effects
// ============================================================================

// =============================================================================
// NODE TYPE FLAGS
// =============================================================================

/// Plain dependency node (a container key or a ref)
pub const SOURCE: u32 = 1 << 0;

/// Node is a computed value (both a source and a reaction)
pub const COMPUTED: u32 = 1 << 1;

/// Node is an effect
pub const EFFECT: u32 = 1 << 2;

/// Effect was created while no other effect was running
pub const ROOT_EFFECT: u32 = 1 << 3;

// =============================================================================
// STATUS FLAGS
// =============================================================================

/// Node is up to date
pub const CLEAN: u32 = 1 << 10;

/// Node must re-run (effect) or recompute on next read (computed)
pub const DIRTY: u32 = 1 << 11;

/// Reaction is currently executing its function
pub const REACTION_IS_UPDATING: u32 = 1 << 13;

/// Effect has been disposed
pub const DESTROYED: u32 = 1 << 14;

/// Effect has run at least once
pub const EFFECT_RAN: u32 = 1 << 16;

// =============================================================================
// STATUS MASK
// =============================================================================

/// Mask to clear the status bits (CLEAN, DIRTY)
pub const STATUS_MASK: u32 = !(DIRTY | CLEAN);

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_distinct() {
        let all_flags = [
            SOURCE,
            COMPUTED,
            EFFECT,
            ROOT_EFFECT,
            CLEAN,
            DIRTY,
            REACTION_IS_UPDATING,
            DESTROYED,
            EFFECT_RAN,
        ];

        for (i, &a) in all_flags.iter().enumerate() {
            for (j, &b) in all_flags.iter().enumerate() {
                if i != j {
                    assert_eq!(a & b, 0, "Flags at index {} and {} overlap", i, j);
                }
            }
        }
    }

    #[test]
    fn status_mask_keeps_type_bits() {
        let flags = COMPUTED | DIRTY | EFFECT_RAN;
        let cleared = flags & STATUS_MASK;

        assert_eq!(cleared & DIRTY, 0);
        assert_ne!(cleared & COMPUTED, 0);
        assert_ne!(cleared & EFFECT_RAN, 0);
    }
}
