//! Participant management for a room
//!
//! This module tracks the connected participants of one room, their
//! display names and their role in the current game. Participants who
//! join while a game is in progress are observers until the next game
//! start re-derives the player set from everyone connected. The registry
//! also carries the fan-out helpers used to publish document diffs,
//! broadcast events and sync snapshots to every connected participant.

use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    str::FromStr,
};

use enum_map::{Enum, EnumMap};
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    constants,
    game::{DocumentDiff, RoomEvent, SyncMessage},
    session::{PresenceMessage, Tunnel},
};

/// A unique identifier for participants in a room
///
/// Identities are issued by the external account service; one id maps to
/// one connected participant for the lifetime of their connection.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct Id(Uuid);

impl Id {
    /// Creates a new random participant ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for Id {
    /// Creates a new random participant ID (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Id {
    /// Formats the ID as a UUID string
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Id {
    type Err = uuid::Error;

    /// Parses an ID from a UUID string
    ///
    /// # Errors
    ///
    /// Returns a `uuid::Error` if the string is not a valid UUID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// The role and state of a participant in the room
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    /// A participant eligible to play (or playing) in the current game
    Player {
        /// The participant's display name
        name: String,
    },
    /// A participant who joined mid-game and watches until the next start
    Observer {
        /// The participant's display name
        name: String,
    },
}

/// The kind of participant without associated data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
pub enum ValueKind {
    /// A playing (or play-eligible) participant
    Player,
    /// An observing participant
    Observer,
}

impl Value {
    /// Returns the kind of this value without the associated data
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Player { .. } => ValueKind::Player,
            Value::Observer { .. } => ValueKind::Observer,
        }
    }

    /// Gets the display name of the participant
    pub fn name(&self) -> &str {
        match self {
            Value::Player { name } | Value::Observer { name } => name,
        }
    }
}

/// A participant as carried in document snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantEntry {
    /// The participant's identity
    pub id: Id,
    /// The participant's display name
    pub name: String,
    /// The participant's current role
    pub kind: ValueKind,
}

/// Errors that can occur when managing participants
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The room has reached the maximum number of allowed participants
    #[error("maximum number of participants reached")]
    MaximumParticipants,
}

/// Manages all participants of one room
///
/// Join order is preserved: the player set built at game start follows it,
/// which makes it the turn order of the game.
#[derive(Debug, Default)]
pub struct Participants {
    /// Primary mapping from participant ID to their value/state
    mapping: HashMap<Id, Value>,

    /// Participant IDs in the order they joined the room
    join_order: Vec<Id>,

    /// Reverse mapping organized by participant kind for efficient filtering
    reverse_mapping: EnumMap<ValueKind, HashSet<Id>>,
}

impl Participants {
    /// Adds a new participant to the room
    ///
    /// Adding an id that is already registered is a no-op (reconnects keep
    /// the original join position and role).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MaximumParticipants`] if the room is full.
    pub fn add(&mut self, id: Id, value: Value) -> Result<(), Error> {
        if self.mapping.contains_key(&id) {
            return Ok(());
        }
        if self.mapping.len() >= constants::players::MAX_PARTICIPANT_COUNT {
            return Err(Error::MaximumParticipants);
        }

        self.reverse_mapping[value.kind()].insert(id);
        self.mapping.insert(id, value);
        self.join_order.push(id);

        Ok(())
    }

    /// Removes a participant, returning their value if they were present
    pub fn remove(&mut self, id: Id) -> Option<Value> {
        let value = self.mapping.remove(&id)?;
        self.reverse_mapping[value.kind()].remove(&id);
        self.join_order.retain(|other| *other != id);
        Some(value)
    }

    /// Gets the value of a specific participant
    pub fn get(&self, id: Id) -> Option<&Value> {
        self.mapping.get(&id)
    }

    /// Gets the display name of a participant
    pub fn name(&self, id: Id) -> Option<&str> {
        self.mapping.get(&id).map(Value::name)
    }

    /// Checks if a participant is registered
    pub fn contains(&self, id: Id) -> bool {
        self.mapping.contains_key(&id)
    }

    /// Number of connected participants, observers included
    pub fn count(&self) -> usize {
        self.mapping.len()
    }

    /// Number of participants of a specific kind
    pub fn specific_count(&self, filter: ValueKind) -> usize {
        self.reverse_mapping[filter].len()
    }

    /// Participant IDs in the order they joined the room
    pub fn ids_in_join_order(&self) -> impl Iterator<Item = Id> + '_ {
        self.join_order.iter().copied()
    }

    /// Turns every observer into a player
    ///
    /// Runs at game start, when the player set is re-derived from everyone
    /// connected at that moment.
    pub fn promote_observers(&mut self) {
        let observers: Vec<Id> = self.reverse_mapping[ValueKind::Observer]
            .iter()
            .copied()
            .collect();
        for id in observers {
            if let Some(value) = self.mapping.get_mut(&id) {
                if let Value::Observer { name } = value {
                    *value = Value::Player {
                        name: std::mem::take(name),
                    };
                }
            }
            self.reverse_mapping[ValueKind::Observer].remove(&id);
            self.reverse_mapping[ValueKind::Player].insert(id);
        }
    }

    /// Snapshot of all participants in join order
    pub fn entries(&self) -> Vec<ParticipantEntry> {
        self.join_order
            .iter()
            .filter_map(|id| {
                self.mapping.get(id).map(|value| ParticipantEntry {
                    id: *id,
                    name: value.name().to_owned(),
                    kind: value.kind(),
                })
            })
            .collect()
    }

    /// Publishes a document diff to every connected participant
    pub fn announce_diff<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        diff: &DocumentDiff,
        tunnel_finder: F,
    ) {
        for id in &self.join_order {
            if let Some(tunnel) = tunnel_finder(*id) {
                tunnel.send_diff(diff);
            }
        }
    }

    /// Publishes a broadcast event to every connected participant
    pub fn announce_event<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        event: &RoomEvent,
        tunnel_finder: F,
    ) {
        for id in &self.join_order {
            if let Some(tunnel) = tunnel_finder(*id) {
                tunnel.send_event(event);
            }
        }
    }

    /// Publishes a presence message to every participant except `skip`
    pub fn announce_presence<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        message: &PresenceMessage,
        skip: Option<Id>,
        tunnel_finder: F,
    ) {
        for id in &self.join_order {
            if Some(*id) == skip {
                continue;
            }
            if let Some(tunnel) = tunnel_finder(*id) {
                tunnel.send_presence(message);
            }
        }
    }

    /// Sends a state synchronization message to a specific participant
    pub fn send_state<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        message: &SyncMessage,
        id: Id,
        tunnel_finder: F,
    ) {
        let Some(tunnel) = tunnel_finder(id) else {
            return;
        };

        tunnel.send_state(message);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn player(name: &str) -> Value {
        Value::Player {
            name: name.to_string(),
        }
    }

    #[test]
    fn test_add_and_lookup() {
        let mut participants = Participants::default();
        let id = Id::new();
        participants.add(id, player("ada")).unwrap();

        assert!(participants.contains(id));
        assert_eq!(participants.name(id), Some("ada"));
        assert_eq!(participants.count(), 1);
        assert_eq!(participants.specific_count(ValueKind::Player), 1);
    }

    #[test]
    fn test_join_order_is_preserved() {
        let mut participants = Participants::default();
        let ids: Vec<Id> = (0..4).map(|_| Id::new()).collect();
        for (index, id) in ids.iter().enumerate() {
            participants.add(*id, player(&format!("p{index}"))).unwrap();
        }

        let order: Vec<Id> = participants.ids_in_join_order().collect();
        assert_eq!(order, ids);
    }

    #[test]
    fn test_duplicate_add_is_a_noop() {
        let mut participants = Participants::default();
        let id = Id::new();
        participants.add(id, player("ada")).unwrap();
        participants
            .add(
                id,
                Value::Observer {
                    name: "imposter".to_string(),
                },
            )
            .unwrap();

        assert_eq!(participants.count(), 1);
        assert_eq!(participants.name(id), Some("ada"));
        assert_eq!(participants.get(id).unwrap().kind(), ValueKind::Player);
    }

    #[test]
    fn test_remove_clears_all_tracking() {
        let mut participants = Participants::default();
        let id = Id::new();
        participants.add(id, player("ada")).unwrap();

        let removed = participants.remove(id).unwrap();
        assert_eq!(removed.name(), "ada");
        assert!(!participants.contains(id));
        assert_eq!(participants.count(), 0);
        assert_eq!(participants.specific_count(ValueKind::Player), 0);
        assert_eq!(participants.ids_in_join_order().count(), 0);

        assert!(participants.remove(id).is_none());
    }

    #[test]
    fn test_promote_observers() {
        let mut participants = Participants::default();
        let playing = Id::new();
        let watching = Id::new();
        participants.add(playing, player("ada")).unwrap();
        participants
            .add(
                watching,
                Value::Observer {
                    name: "grace".to_string(),
                },
            )
            .unwrap();

        assert_eq!(participants.specific_count(ValueKind::Observer), 1);

        participants.promote_observers();

        assert_eq!(participants.specific_count(ValueKind::Observer), 0);
        assert_eq!(participants.specific_count(ValueKind::Player), 2);
        assert_eq!(participants.name(watching), Some("grace"));
    }

    #[test]
    fn test_capacity_limit() {
        let mut participants = Participants::default();
        for index in 0..constants::players::MAX_PARTICIPANT_COUNT {
            participants
                .add(Id::new(), player(&format!("p{index}")))
                .unwrap();
        }

        assert_eq!(
            participants.add(Id::new(), player("late")),
            Err(Error::MaximumParticipants)
        );
    }

    #[test]
    fn test_entries_snapshot() {
        let mut participants = Participants::default();
        let first = Id::new();
        let second = Id::new();
        participants.add(first, player("ada")).unwrap();
        participants
            .add(
                second,
                Value::Observer {
                    name: "grace".to_string(),
                },
            )
            .unwrap();

        let entries = participants.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, first);
        assert_eq!(entries[0].kind, ValueKind::Player);
        assert_eq!(entries[1].id, second);
        assert_eq!(entries[1].kind, ValueKind::Observer);
    }
}
