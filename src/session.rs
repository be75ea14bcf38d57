//! Communication session management
//!
//! This module defines the trait for tunneling messages between the game
//! engine and connected clients. The tunnel abstraction allows for
//! different communication mechanisms while maintaining a consistent
//! interface; implementations are expected to enqueue without blocking
//! (for instance into a per-connection channel drained by a writer task),
//! so that fan-out never performs I/O inside a room's critical section.

use serde::{Deserialize, Serialize};

use crate::{
    game::{DocumentDiff, RoomEvent, SyncMessage},
    participant::Id,
};

/// A cursor position on the shared board, in client coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
}

/// Ephemeral per-connection presence traffic
///
/// Presence is fire-and-forget and last-value-wins; it never flows
/// through the room's document mutation path and carries no invariants
/// linking it to the document.
#[derive(Debug, Clone, Serialize)]
pub enum PresenceMessage {
    /// A participant joined the room
    Joined {
        /// Identity of the participant who joined
        participant: Id,
        /// Display name of the participant who joined
        name: String,
    },
    /// A participant left the room
    Left {
        /// Identity of the participant who left
        participant: Id,
        /// Display name of the participant who left
        name: String,
    },
    /// A participant moved (or hid) their cursor
    Cursor {
        /// Identity of the participant the cursor belongs to
        participant: Id,
        /// The new position, or `None` when the cursor left the board
        cursor: Option<CursorPosition>,
    },
}

impl PresenceMessage {
    /// Converts the presence message to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

/// Trait for sending messages through a communication tunnel
///
/// This trait abstracts the communication mechanism used to send messages
/// to connected clients. Implementations might use WebSockets, Server-Sent
/// Events, or other real-time communication protocols.
pub trait Tunnel {
    /// Sends a document diff to the client
    ///
    /// Diffs reflect every committed mutation of the room document, in
    /// commit order.
    fn send_diff(&self, diff: &DocumentDiff);

    /// Sends a broadcast event to the client
    ///
    /// Events are discrete cues (sounds, countdowns) that the presentation
    /// layer interprets; they carry no document state.
    fn send_event(&self, event: &RoomEvent);

    /// Sends a state synchronization message to the client
    ///
    /// Sync messages carry the full document and are sent when a client
    /// connects, so its view starts from the current authoritative state.
    fn send_state(&self, state: &SyncMessage);

    /// Sends an ephemeral presence message to the client
    fn send_presence(&self, presence: &PresenceMessage);

    /// Closes the communication tunnel
    ///
    /// This method should be called when the client disconnects or
    /// when the communication is no longer needed.
    fn close(self);
}
