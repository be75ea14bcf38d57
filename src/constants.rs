//! Configuration constants for the game system
//!
//! This module contains the configuration limits and defaults used
//! throughout the game system to ensure data integrity and provide
//! consistent boundaries for different game components.

/// Deck configuration constants
pub mod deck {
    /// Default number of card pairs in a deck
    pub const DEFAULT_PAIR_COUNT: u32 = 32;
    /// Minimum number of card pairs allowed in a deck
    pub const MIN_PAIR_COUNT: u32 = 1;
    /// Maximum number of card pairs allowed in a deck
    pub const MAX_PAIR_COUNT: u32 = 64;
}

/// Participant configuration constants
pub mod players {
    /// Default minimum number of connected participants required to start a game
    pub const DEFAULT_MINIMUM_TO_START: usize = 2;
    /// Maximum number of participants allowed in a single room
    pub const MAX_PARTICIPANT_COUNT: usize = 32;
}

/// Timing constants for animation-gated transitions
pub mod timing {
    /// Default delay before match/mismatch highlight and sound start, in milliseconds
    ///
    /// The card flip animation has to happen before the sound and highlight,
    /// otherwise they are not in sync on screen.
    pub const DEFAULT_ANIMATION_START_DELAY_MS: u64 = 450;
    /// Default window after a completed pick before selection reopens, in milliseconds
    pub const DEFAULT_RESOLUTION_WINDOW_MS: u64 = 1500;
    /// Minimum animation start delay, in milliseconds
    pub const MIN_ANIMATION_START_DELAY_MS: u64 = 0;
    /// Maximum animation start delay, in milliseconds
    pub const MAX_ANIMATION_START_DELAY_MS: u64 = 5_000;
    /// Minimum resolution window, in milliseconds
    pub const MIN_RESOLUTION_WINDOW_MS: u64 = 100;
    /// Maximum resolution window, in milliseconds
    pub const MAX_RESOLUTION_WINDOW_MS: u64 = 30_000;
}
