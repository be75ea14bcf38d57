//! Game configuration options
//!
//! This module defines the tunable options for a room's game: how many
//! pairs are dealt, how many participants are required before the owner
//! may start, and the timing of the animation-gated transitions. Options
//! are validated before a room is created so that a running game never
//! observes an out-of-bounds configuration.

use std::time::Duration;

use garde::Validate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::{constants, deck};

type ValidationResult = garde::Result;

/// Validates that a duration falls within specified millisecond bounds
fn validate_duration<const MIN_MS: u64, const MAX_MS: u64>(
    field: &'static str,
    val: &Duration,
) -> ValidationResult {
    if (MIN_MS..=MAX_MS).contains(&(val.as_millis() as u64)) {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "{field} is outside of the bounds [{MIN_MS}ms,{MAX_MS}ms]",
        )))
    }
}

/// Validates the delay before match/mismatch animation and sound start
fn validate_animation_start_delay(val: &Duration) -> ValidationResult {
    validate_duration::<
        { constants::timing::MIN_ANIMATION_START_DELAY_MS },
        { constants::timing::MAX_ANIMATION_START_DELAY_MS },
    >("animation_start_delay", val)
}

/// Validates the window before a completed pick is resolved
fn validate_resolution_window(val: &Duration) -> ValidationResult {
    validate_duration::<
        { constants::timing::MIN_RESOLUTION_WINDOW_MS },
        { constants::timing::MAX_RESOLUTION_WINDOW_MS },
    >("resolution_window", val)
}

/// Validates that no image reference is used for more than one pair
fn validate_image_refs(refs: &[String]) -> ValidationResult {
    if refs.iter().all_unique() {
        Ok(())
    } else {
        Err(garde::Error::new("image references must be distinct"))
    }
}

/// Configuration for one room's game
///
/// The defaults reproduce the classic setup: 32 pairs on the grid, two
/// players required to start, a 450ms animation lead-in and a 1.5s
/// resolution window.
#[serde_with::serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GameOptions {
    /// Number of card pairs dealt at game start
    #[garde(range(
        min = constants::deck::MIN_PAIR_COUNT,
        max = constants::deck::MAX_PAIR_COUNT,
    ))]
    pub pair_count: u32,
    /// Minimum number of connected participants required to start a game
    #[garde(range(min = 2, max = constants::players::MAX_PARTICIPANT_COUNT))]
    pub minimum_players: usize,
    /// Delay before the match/mismatch highlight and sound are published
    #[garde(custom(|v, _| validate_animation_start_delay(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub animation_start_delay: Duration,
    /// Window after a completed pick before the selection is resolved
    /// and the board reopens
    #[garde(custom(|v, _| validate_resolution_window(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub resolution_window: Duration,
    /// Distinct image references handed out to pairs, in pair-id order
    #[garde(length(min = 1), custom(|v, _| validate_image_refs(v)))]
    pub image_refs: Vec<String>,
}

impl Default for GameOptions {
    fn default() -> Self {
        Self {
            pair_count: constants::deck::DEFAULT_PAIR_COUNT,
            minimum_players: constants::players::DEFAULT_MINIMUM_TO_START,
            animation_start_delay: Duration::from_millis(
                constants::timing::DEFAULT_ANIMATION_START_DELAY_MS,
            ),
            resolution_window: Duration::from_millis(
                constants::timing::DEFAULT_RESOLUTION_WINDOW_MS,
            ),
            image_refs: deck::default_image_refs(constants::deck::DEFAULT_PAIR_COUNT),
        }
    }
}

impl GameOptions {
    /// Checks that enough image references are supplied for the configured
    /// pair count
    ///
    /// This is a cross-field constraint that the derive-based validation
    /// cannot express; room creation checks it alongside `validate()`.
    pub fn has_images_for_deck(&self) -> bool {
        self.image_refs.len() >= self.pair_count as usize
    }
}
