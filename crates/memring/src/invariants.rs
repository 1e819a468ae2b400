//! Debug assertion macros for ring structure invariants.
//!
//! These are only active in debug builds (`#[cfg(debug_assertions)]`), so
//! there is zero overhead in release builds. They are checked at the points
//! where the structure was just mutated under the ring lock.

// =============================================================================
// Root consistency: an empty ring has no root, a non-empty ring has a root
// whose position is 0.
// =============================================================================

/// Assert that `root` presence matches the element count and that the root
/// sits at position 0 once numbering is current.
macro_rules! debug_assert_root_consistent {
    ($root:expr, $len:expr) => {
        debug_assert!(
            ($len == 0) == $root.is_none(),
            "root/len mismatch: len {} with root present = {}",
            $len,
            $root.is_some()
        )
    };
}

// =============================================================================
// Count consistency: the tail position must be len - 1 after renumbering.
// =============================================================================

/// Assert that the tail item carries the last position.
macro_rules! debug_assert_tail_nr {
    ($tail_nr:expr, $len:expr) => {
        debug_assert!(
            $tail_nr as usize == ($len as usize).wrapping_sub(1),
            "tail nr {} does not match len {}",
            $tail_nr,
            $len
        )
    };
}

// =============================================================================
// Map consistency: a key map may never outgrow the ring it indexes.
// =============================================================================

/// Assert that a key map holds at most one entry per item.
macro_rules! debug_assert_map_bounded {
    ($map_len:expr, $len:expr) => {
        debug_assert!(
            $map_len <= $len,
            "key map holds {} entries for {} items",
            $map_len,
            $len
        )
    };
}

pub(crate) use debug_assert_map_bounded;
pub(crate) use debug_assert_root_consistent;
pub(crate) use debug_assert_tail_nr;
