//! Room coordination and per-room serialization
//!
//! This module owns the live rooms of the process. Each room holds one
//! [`Game`] document behind a mutex; every engine call for that room
//! (participant commands, join/leave notifications, and the alarms that
//! close animation windows) runs under that mutex, so all committed
//! transitions of one room are totally ordered while different rooms
//! proceed fully in parallel.
//!
//! Delayed follow-ups are armed as tokio timers *after* the scheduling
//! transition commits; when a timer fires it re-acquires the room's
//! mutex and re-enters the engine exactly like an externally triggered
//! call. Fan-out inside the critical section is a non-blocking enqueue
//! into per-connection tunnels; the host's writer tasks perform the
//! actual I/O outside.
//!
//! Ephemeral cursor presence deliberately bypasses the document path: it
//! lives with the connection registry under its own lock and is
//! fire-and-forget, last-value-wins.

use std::{collections::HashMap, sync::Arc, time::Duration};

use garde::Validate;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    config::GameOptions,
    game::{AlarmMessage, DocumentSnapshot, Game, IncomingMessage},
    participant::{self, Id},
    room_code::RoomCode,
    session::{CursorPosition, PresenceMessage, Tunnel},
};

/// Errors surfaced by room coordination
#[derive(Debug, Error)]
pub enum Error {
    /// No live room carries the given code
    #[error("room not found")]
    RoomNotFound,
    /// A live room already carries the given code
    #[error("room code already in use")]
    RoomCodeTaken,
    /// The supplied game options failed validation
    #[error("invalid game options: {0}")]
    InvalidOptions(garde::Report),
    /// The supplied options carry fewer image references than pairs
    #[error("not enough image references for {pair_count} pairs")]
    InsufficientImages {
        /// The configured pair count
        pair_count: u32,
    },
    /// The room is at its participant capacity
    #[error(transparent)]
    Participant(#[from] participant::Error),
}

/// Connection-scoped state: tunnels and last-known cursors
struct Connections<T> {
    tunnels: HashMap<Id, T>,
    cursors: HashMap<Id, Option<CursorPosition>>,
}

impl<T> Default for Connections<T> {
    fn default() -> Self {
        Self {
            tunnels: HashMap::new(),
            cursors: HashMap::new(),
        }
    }
}

/// Document-scoped state: the game plus disposal bookkeeping
struct RoomState {
    game: Game,
    /// Alarms armed but not yet fired; a room with pending alarms is
    /// never disposed, so a resolution window always finds its document
    pending_alarms: usize,
    /// Once set, the room accepts no further operations
    disposed: bool,
}

/// One live room
///
/// Lock order is `state` before `connections`; cursor updates take only
/// `connections` and therefore never contend with document mutations.
struct Room<T> {
    code: RoomCode,
    state: Mutex<RoomState>,
    connections: Mutex<Connections<T>>,
}

impl<T: Tunnel + Clone> Room<T> {
    /// Tunnel lookup used by the engine for fan-out
    fn finder(&self) -> impl Fn(Id) -> Option<T> + '_ {
        move |id| self.connections.lock().tunnels.get(&id).cloned()
    }
}

/// Owns every live room and serializes engine access per room
///
/// The coordinator must live inside a tokio runtime; arming a delayed
/// follow-up spawns a timer task.
pub struct Coordinator<T> {
    rooms: Mutex<HashMap<RoomCode, Arc<Room<T>>>>,
}

impl<T> Coordinator<T>
where
    T: Tunnel + Clone + Send + 'static,
{
    /// Creates an empty coordinator
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rooms: Mutex::new(HashMap::new()),
        })
    }

    /// Creates a room for `code`, owned by `owner`
    ///
    /// The code comes from the external room registry; the coordinator
    /// only refuses codes already live in this process. The owner joins
    /// like any other participant afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error when the options fail validation, the image
    /// supply cannot cover the configured pair count, or the code is
    /// already taken.
    pub fn create_room(&self, code: RoomCode, owner: Id, options: GameOptions) -> Result<(), Error> {
        self.create_room_with_rng(code, owner, options, fastrand::Rng::new())
    }

    /// Creates a room with an explicit random source
    ///
    /// Seeding the source makes the room's dealing, starting-player
    /// choice and tie-breaks reproducible.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Coordinator::create_room`].
    pub fn create_room_with_rng(
        &self,
        code: RoomCode,
        owner: Id,
        options: GameOptions,
        rng: fastrand::Rng,
    ) -> Result<(), Error> {
        options.validate().map_err(Error::InvalidOptions)?;
        if !options.has_images_for_deck() {
            return Err(Error::InsufficientImages {
                pair_count: options.pair_count,
            });
        }

        let mut rooms = self.rooms.lock();
        if rooms.contains_key(&code) {
            return Err(Error::RoomCodeTaken);
        }
        rooms.insert(
            code,
            Arc::new(Room {
                code,
                state: Mutex::new(RoomState {
                    game: Game::with_rng(options, owner, rng),
                    pending_alarms: 0,
                    disposed: false,
                }),
                connections: Mutex::new(Connections::default()),
            }),
        );

        info!(room = %code, "room created");
        Ok(())
    }

    /// Whether a live room carries `code`
    pub fn contains_room(&self, code: RoomCode) -> bool {
        self.rooms.lock().contains_key(&code)
    }

    /// A copy of the room's current document, if the room is live
    pub fn snapshot(&self, code: RoomCode) -> Option<DocumentSnapshot> {
        let room = self.get_room(code)?;
        let state = room.state.lock();
        if state.disposed {
            return None;
        }
        Some(state.game.snapshot())
    }

    /// Connects a participant to a room
    ///
    /// The joiner immediately receives a full document snapshot through
    /// their tunnel, and everyone else is notified of the join.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RoomNotFound`] for unknown or disposed rooms, or
    /// a participant error when the room is full.
    pub fn join(&self, code: RoomCode, id: Id, name: &str, tunnel: T) -> Result<(), Error> {
        let room = self.get_room(code).ok_or(Error::RoomNotFound)?;

        let mut state = room.state.lock();
        if state.disposed {
            return Err(Error::RoomNotFound);
        }

        {
            let mut connections = room.connections.lock();
            connections.tunnels.insert(id, tunnel);
            connections.cursors.insert(id, None);
        }

        if let Err(error) = state.game.add_participant(id, name, room.finder()) {
            let mut connections = room.connections.lock();
            connections.tunnels.remove(&id);
            connections.cursors.remove(&id);
            return Err(error.into());
        }

        state.game.participants.announce_presence(
            &PresenceMessage::Joined {
                participant: id,
                name: name.to_owned(),
            },
            Some(id),
            room.finder(),
        );

        Ok(())
    }

    /// Disconnects a participant from a room
    ///
    /// Translates the transport-level leave into the engine's departure
    /// handling, notifies the remaining participants, and disposes the
    /// room once it is empty and no alarm remains pending.
    pub fn leave(&self, code: RoomCode, id: Id) {
        let Some(room) = self.get_room(code) else {
            return;
        };

        let mut state = room.state.lock();
        if state.disposed {
            return;
        }

        let name = state.game.participants.name(id).map(str::to_owned);

        let tunnel = {
            let mut connections = room.connections.lock();
            connections.cursors.remove(&id);
            connections.tunnels.remove(&id)
        };
        if let Some(tunnel) = tunnel {
            tunnel.close();
        }

        state.game.participant_left(id, room.finder());

        if let Some(name) = name {
            state.game.participants.announce_presence(
                &PresenceMessage::Left {
                    participant: id,
                    name,
                },
                None,
                room.finder(),
            );
        }

        self.dispose_if_abandoned(&room, state);
    }

    /// Routes a participant command into the room's engine
    ///
    /// Commands are fire-and-forget: guard violations and unknown rooms
    /// change nothing, and the caller observes results through the
    /// diff/event streams. Delayed follow-ups scheduled by the transition
    /// are armed as timers after the mutation commits.
    pub fn command(self: &Arc<Self>, code: RoomCode, sender: Id, message: IncomingMessage) {
        let Some(room) = self.get_room(code) else {
            debug!(room = %code, "dropping command for unknown room");
            return;
        };

        let mut scheduled: Vec<(AlarmMessage, Duration)> = Vec::new();
        {
            let mut state = room.state.lock();
            if state.disposed {
                return;
            }
            state.game.receive_message(
                sender,
                message,
                |alarm, delay| scheduled.push((alarm, delay)),
                room.finder(),
            );
            state.pending_alarms += scheduled.len();
        }

        for (alarm, delay) in scheduled {
            let coordinator = Arc::clone(self);
            let room = Arc::clone(&room);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                coordinator.fire_alarm(&room, alarm);
            });
        }
    }

    /// Publishes a participant's cursor to the rest of the room
    ///
    /// Last value wins; the update never touches the document lock.
    pub fn update_cursor(&self, code: RoomCode, id: Id, cursor: Option<CursorPosition>) {
        let Some(room) = self.get_room(code) else {
            return;
        };

        let mut connections = room.connections.lock();
        if !connections.tunnels.contains_key(&id) {
            return;
        }
        connections.cursors.insert(id, cursor);

        let message = PresenceMessage::Cursor {
            participant: id,
            cursor,
        };
        for (other, tunnel) in &connections.tunnels {
            if *other != id {
                tunnel.send_presence(&message);
            }
        }
    }

    /// Last-known cursors of a room's connections
    pub fn cursors(&self, code: RoomCode) -> Option<Vec<(Id, Option<CursorPosition>)>> {
        let room = self.get_room(code)?;
        let connections = room.connections.lock();
        Some(connections.cursors.iter().map(|(id, c)| (*id, *c)).collect())
    }

    /// Delivers a fired alarm back into the room's engine
    ///
    /// Re-acquires the room's serialization first; staleness is decided
    /// by the engine, which drops alarms belonging to a superseded game.
    fn fire_alarm(&self, room: &Room<T>, alarm: AlarmMessage) {
        let mut state = room.state.lock();
        state.pending_alarms = state.pending_alarms.saturating_sub(1);
        if state.disposed {
            return;
        }

        state.game.receive_alarm(alarm, room.finder());

        self.dispose_if_abandoned(room, state);
    }

    /// Disposes the room if it is empty and no alarm is pending
    fn dispose_if_abandoned(
        &self,
        room: &Room<T>,
        mut state: parking_lot::MutexGuard<'_, RoomState>,
    ) {
        let empty = room.connections.lock().tunnels.is_empty();
        if !empty || state.pending_alarms > 0 || state.disposed {
            return;
        }

        state.disposed = true;
        drop(state);
        self.rooms.lock().remove(&room.code);
        info!(room = %room.code, "room disposed");
    }

    fn get_room(&self, code: RoomCode) -> Option<Arc<Room<T>>> {
        self.rooms.lock().get(&code).cloned()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::{Arc as StdArc, Mutex as StdMutex};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        deck,
        game::{
            DocumentDiff, IncomingOwnerMessage, IncomingPlayerMessage, Lifecycle, RoomEvent,
            SyncMessage,
        },
    };

    #[derive(Debug, Clone, Default)]
    struct MockTunnel {
        diffs: StdArc<StdMutex<Vec<DocumentDiff>>>,
        events: StdArc<StdMutex<Vec<RoomEvent>>>,
        states: StdArc<StdMutex<Vec<SyncMessage>>>,
        presence: StdArc<StdMutex<Vec<PresenceMessage>>>,
        closed: StdArc<StdMutex<bool>>,
    }

    impl MockTunnel {
        fn events(&self) -> Vec<RoomEvent> {
            self.events.lock().unwrap().clone()
        }

        fn presence(&self) -> Vec<PresenceMessage> {
            self.presence.lock().unwrap().clone()
        }

        fn is_closed(&self) -> bool {
            *self.closed.lock().unwrap()
        }
    }

    impl Tunnel for MockTunnel {
        fn send_diff(&self, diff: &DocumentDiff) {
            self.diffs.lock().unwrap().push(diff.clone());
        }

        fn send_event(&self, event: &RoomEvent) {
            self.events.lock().unwrap().push(*event);
        }

        fn send_state(&self, state: &SyncMessage) {
            self.states.lock().unwrap().push(state.clone());
        }

        fn send_presence(&self, presence: &PresenceMessage) {
            self.presence.lock().unwrap().push(presence.clone());
        }

        fn close(self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    fn options_with_pairs(pair_count: u32) -> GameOptions {
        GameOptions {
            pair_count,
            image_refs: deck::default_image_refs(pair_count),
            ..GameOptions::default()
        }
    }

    struct TestRoom {
        coordinator: Arc<Coordinator<MockTunnel>>,
        code: RoomCode,
        owner: Id,
        guest: Id,
        owner_tunnel: MockTunnel,
        guest_tunnel: MockTunnel,
    }

    fn set_up(pair_count: u32, seed: u64) -> TestRoom {
        let coordinator = Coordinator::new();
        let code = RoomCode::new();
        let owner = Id::new();
        let guest = Id::new();

        coordinator
            .create_room_with_rng(
                code,
                owner,
                options_with_pairs(pair_count),
                fastrand::Rng::with_seed(seed),
            )
            .unwrap();

        let owner_tunnel = MockTunnel::default();
        let guest_tunnel = MockTunnel::default();
        coordinator
            .join(code, owner, "owner", owner_tunnel.clone())
            .unwrap();
        coordinator
            .join(code, guest, "guest", guest_tunnel.clone())
            .unwrap();

        TestRoom {
            coordinator,
            code,
            owner,
            guest,
            owner_tunnel,
            guest_tunnel,
        }
    }

    #[tokio::test]
    async fn test_join_unknown_room_is_not_found() {
        let coordinator: Arc<Coordinator<MockTunnel>> = Coordinator::new();

        let result = coordinator.join(RoomCode::new(), Id::new(), "ada", MockTunnel::default());

        assert!(matches!(result, Err(Error::RoomNotFound)));
    }

    #[tokio::test]
    async fn test_create_room_validates_inputs() {
        let coordinator: Arc<Coordinator<MockTunnel>> = Coordinator::new();
        let code = RoomCode::new();

        let mut bad_options = options_with_pairs(4);
        bad_options.minimum_players = 1;
        assert!(matches!(
            coordinator.create_room(code, Id::new(), bad_options),
            Err(Error::InvalidOptions(_))
        ));

        let mut starved_options = options_with_pairs(4);
        starved_options.image_refs.truncate(2);
        assert!(matches!(
            coordinator.create_room(code, Id::new(), starved_options),
            Err(Error::InsufficientImages { pair_count: 4 })
        ));

        coordinator
            .create_room(code, Id::new(), options_with_pairs(4))
            .unwrap();
        assert!(matches!(
            coordinator.create_room(code, Id::new(), options_with_pairs(4)),
            Err(Error::RoomCodeTaken)
        ));
    }

    #[tokio::test]
    async fn test_join_syncs_and_announces_presence() {
        let room = set_up(4, 1);

        // The guest got exactly one snapshot on join
        let states = room.guest_tunnel.states.lock().unwrap().clone();
        assert_eq!(states.len(), 1);

        // The owner heard about the guest joining, not about themselves
        let presence = room.owner_tunnel.presence();
        assert!(presence.iter().any(
            |message| matches!(message, PresenceMessage::Joined { participant, .. } if *participant == room.guest)
        ));
        assert!(room.guest_tunnel.presence().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_flow_resolves_through_timers() {
        let room = set_up(4, 2);
        room.coordinator.command(
            room.code,
            room.owner,
            IncomingOwnerMessage::StartGame.into(),
        );

        let snapshot = room.coordinator.snapshot(room.code).unwrap();
        assert_eq!(snapshot.state, Lifecycle::InProgress);
        let current = snapshot.current_turn_player_id.unwrap();
        let first = &snapshot.cards[0];
        let partner = snapshot
            .cards
            .iter()
            .find(|card| card.pair_id == first.pair_id && card.id != first.id)
            .unwrap();

        room.coordinator.command(
            room.code,
            current,
            IncomingPlayerMessage::SelectCard(first.id).into(),
        );
        room.coordinator.command(
            room.code,
            current,
            IncomingPlayerMessage::SelectCard(partner.id).into(),
        );

        let snapshot = room.coordinator.snapshot(room.code).unwrap();
        assert!(!snapshot.can_select);
        assert_eq!(snapshot.total_pairs_matched, 1);

        // Paused time auto-advances through both scheduled windows
        tokio::time::sleep(Duration::from_millis(1600)).await;

        let snapshot = room.coordinator.snapshot(room.code).unwrap();
        assert!(snapshot.can_select);
        assert_eq!(snapshot.first_selected_id, None);
        assert!(snapshot.animating_match_ids.is_empty());
        assert_eq!(snapshot.current_turn_player_id, Some(current));
        assert!(room.guest_tunnel.events().contains(&RoomEvent::MatchSound));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_pair_game_finishes_over_timers() {
        let room = set_up(1, 3);
        room.coordinator.command(
            room.code,
            room.owner,
            IncomingOwnerMessage::StartGame.into(),
        );

        let snapshot = room.coordinator.snapshot(room.code).unwrap();
        let current = snapshot.current_turn_player_id.unwrap();
        for card in &snapshot.cards {
            room.coordinator.command(
                room.code,
                current,
                IncomingPlayerMessage::SelectCard(card.id).into(),
            );
        }

        tokio::time::sleep(Duration::from_millis(1600)).await;

        let snapshot = room.coordinator.snapshot(room.code).unwrap();
        assert_eq!(snapshot.state, Lifecycle::Finished);
        assert_eq!(snapshot.winning_player_id, Some(current));
        assert!(
            room.owner_tunnel
                .events()
                .contains(&RoomEvent::GameFinished)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disposal_waits_for_pending_alarms() {
        let room = set_up(4, 4);
        room.coordinator.command(
            room.code,
            room.owner,
            IncomingOwnerMessage::StartGame.into(),
        );

        let snapshot = room.coordinator.snapshot(room.code).unwrap();
        let current = snapshot.current_turn_player_id.unwrap();
        let first = &snapshot.cards[0];
        let other = snapshot
            .cards
            .iter()
            .find(|card| card.pair_id != first.pair_id)
            .unwrap();
        room.coordinator.command(
            room.code,
            current,
            IncomingPlayerMessage::SelectCard(first.id).into(),
        );
        room.coordinator.command(
            room.code,
            current,
            IncomingPlayerMessage::SelectCard(other.id).into(),
        );

        // Everyone leaves while the resolution window is still pending;
        // the room must survive until the timers have fired
        room.coordinator.leave(room.code, room.guest);
        room.coordinator.leave(room.code, room.owner);
        assert!(room.coordinator.contains_room(room.code));
        assert!(room.guest_tunnel.is_closed());

        tokio::time::sleep(Duration::from_millis(1600)).await;

        assert!(!room.coordinator.contains_room(room.code));
        assert!(room.coordinator.snapshot(room.code).is_none());
        assert!(matches!(
            room.coordinator
                .join(room.code, Id::new(), "late", MockTunnel::default()),
            Err(Error::RoomNotFound)
        ));
    }

    #[tokio::test]
    async fn test_empty_lobby_room_is_disposed_immediately() {
        let room = set_up(4, 5);

        room.coordinator.leave(room.code, room.guest);
        room.coordinator.leave(room.code, room.owner);

        assert!(!room.coordinator.contains_room(room.code));
    }

    #[tokio::test]
    async fn test_leave_mid_game_forces_stop_for_the_remaining_player() {
        let room = set_up(4, 6);
        room.coordinator.command(
            room.code,
            room.owner,
            IncomingOwnerMessage::StartGame.into(),
        );

        room.coordinator.leave(room.code, room.guest);

        let snapshot = room.coordinator.snapshot(room.code).unwrap();
        assert_eq!(snapshot.state, Lifecycle::Lobby);
        assert!(snapshot.cards.is_empty());

        // The remaining participant heard about the departure
        assert!(room.owner_tunnel.presence().iter().any(
            |message| matches!(message, PresenceMessage::Left { participant, .. } if *participant == room.guest)
        ));
    }

    #[tokio::test]
    async fn test_cursor_updates_fan_out_and_stick() {
        let room = set_up(4, 7);

        let position = CursorPosition { x: 12.5, y: 40.0 };
        room.coordinator
            .update_cursor(room.code, room.guest, Some(position));

        assert!(room.owner_tunnel.presence().iter().any(|message| matches!(
            message,
            PresenceMessage::Cursor {
                participant,
                cursor: Some(cursor),
            } if *participant == room.guest && cursor.x == 12.5
        )));

        let cursors = room.coordinator.cursors(room.code).unwrap();
        let stored = cursors
            .iter()
            .find(|(id, _)| *id == room.guest)
            .unwrap()
            .1
            .unwrap();
        assert_eq!(stored, position);

        // Unknown connections are ignored
        room.coordinator
            .update_cursor(room.code, Id::new(), Some(position));
    }

    #[tokio::test]
    async fn test_commands_for_unknown_rooms_are_dropped() {
        let coordinator: Arc<Coordinator<MockTunnel>> = Coordinator::new();

        coordinator.command(
            RoomCode::new(),
            Id::new(),
            IncomingOwnerMessage::StartGame.into(),
        );

        assert_eq!(coordinator.rooms.lock().len(), 0);
    }
}
