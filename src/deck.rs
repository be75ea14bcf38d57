//! Card deck generation
//!
//! This module produces the shuffled deck a game is played on: two cards
//! per pair id, each with a fresh unique id and a face image shared with
//! its partner. Shuffling is an unbiased Fisher-Yates driven by an
//! injected random source so that deck generation is deterministic under
//! test.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use uuid::Uuid;

/// A unique identifier for a single card
///
/// Card ids are opaque to clients; matching is decided by `pair_id`,
/// never by comparing card ids.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct CardId(Uuid);

impl CardId {
    /// Creates a new random card ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a card ID from the injected random source
    ///
    /// Keeps deck generation fully deterministic when the source is seeded.
    fn from_rng(rng: &mut fastrand::Rng) -> Self {
        let mut bytes = [0u8; 16];
        rng.fill(&mut bytes);
        Self(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }
}

impl Default for CardId {
    /// Creates a new random card ID (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CardId {
    /// Formats the ID as a UUID string
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CardId {
    type Err = uuid::Error;

    /// Parses a card ID from a UUID string
    ///
    /// # Errors
    ///
    /// Returns a `uuid::Error` if the string is not a valid UUID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// A single card on the grid
///
/// Cards are created in bulk at game start and replaced wholesale on the
/// next start or stop; only `is_matched` changes during play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    /// Unique identifier of this card
    pub id: CardId,
    /// Identifier shared by exactly two cards; matching both ends the pair
    pub pair_id: u32,
    /// Reference to the face image, shared with the pair partner
    pub image: String,
    /// Whether this card's pair has been matched
    pub is_matched: bool,
}

/// Builds the default image reference list for `pair_count` pairs
///
/// Follows the bundled asset naming, `images/image-1.png` onward, one
/// reference per pair id.
pub fn default_image_refs(pair_count: u32) -> Vec<String> {
    (1..=pair_count)
        .map(|index| format!("images/image-{index}.png"))
        .collect()
}

/// Generates a freshly shuffled deck of `2 * pair_count` cards
///
/// Pair ids run `1..=pair_count`; the image for a pair is
/// `image_refs[pair_id - 1]`, so `image_refs` must hold at least
/// `pair_count` entries. Every card starts unmatched with a fresh unique
/// id. The shuffle is an unbiased Fisher-Yates over the injected random
/// source, so two calls with identically seeded sources produce identical
/// decks.
///
/// # Examples
///
/// ```rust
/// use pairgrid::deck;
///
/// let refs = deck::default_image_refs(4);
/// let mut rng = fastrand::Rng::with_seed(7);
/// let cards = deck::generate(4, &refs, &mut rng);
/// assert_eq!(cards.len(), 8);
/// ```
pub fn generate(pair_count: u32, image_refs: &[String], rng: &mut fastrand::Rng) -> Vec<Card> {
    debug_assert!(image_refs.len() >= pair_count as usize);

    let mut cards: Vec<Card> = (1..=pair_count)
        .flat_map(|pair_id| {
            let image = image_refs
                .get(pair_id as usize - 1)
                .cloned()
                .unwrap_or_default();
            [
                Card {
                    id: CardId::from_rng(rng),
                    pair_id,
                    image: image.clone(),
                    is_matched: false,
                },
                Card {
                    id: CardId::from_rng(rng),
                    pair_id,
                    image,
                    is_matched: false,
                },
            ]
        })
        .collect();

    rng.shuffle(&mut cards);

    cards
}
