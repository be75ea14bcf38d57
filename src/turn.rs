//! Turn sequencing
//!
//! Computes whose turn comes next given the stable turn order. The rules
//! are deliberately small: turns cycle through the order, and a current
//! id that is no longer part of the order (for instance because that
//! player just left) falls back to the first player.

use crate::participant::Id;

/// Returns the player whose turn follows `current` in `ordered`
///
/// Wraps around at the end of the order. If `current` is not present in
/// `ordered`, its would-be position is treated as just before the start,
/// so the result is the first entry; this is the documented fallback for
/// a current player that has already been removed.
///
/// Returns `None` only when `ordered` is empty.
pub fn next_player(current: Id, ordered: &[Id]) -> Option<Id> {
    if ordered.is_empty() {
        return None;
    }

    let next_index = ordered
        .iter()
        .position(|id| *id == current)
        .map_or(0, |index| (index + 1) % ordered.len());

    Some(ordered[next_index])
}
