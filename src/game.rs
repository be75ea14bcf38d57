//! Core game logic and state management
//!
//! This module contains the authoritative room document for one memory
//! matching game and the guarded transitions that mutate it: starting and
//! stopping a game, selecting cards, resolving matched and mismatched
//! pairs, and handling participant departures. Every committed mutation
//! is published to all connected participants as a field-level document
//! diff, and time-gated follow-ups (the animation and resolution windows)
//! are scheduled through an injected callback and re-enter the engine via
//! [`Game::receive_alarm`].

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    config::GameOptions,
    deck::{self, Card, CardId},
    participant::{self, Id, ParticipantEntry, Participants, Value},
    scoreboard::{ScoreEntry, Scoreboard},
    session::Tunnel,
    turn,
};

/// The lifecycle phase of a room's game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Lifecycle {
    /// Waiting for the owner to start a game
    Lobby,
    /// A game is being played
    InProgress,
    /// The last game ended; scores and winner are on display
    Finished,
}

/// Messages received from participants, split by the sender's authority
#[derive(Debug, Deserialize, Clone, Copy, derive_more::From)]
pub enum IncomingMessage {
    /// Messages only the room owner may send
    Owner(IncomingOwnerMessage),
    /// Messages any participant may send
    Player(IncomingPlayerMessage),
}

impl IncomingMessage {
    /// Validates that a message matches the sender's authority
    fn follows(&self, sender_is_owner: bool) -> bool {
        match self {
            IncomingMessage::Owner(_) => sender_is_owner,
            IncomingMessage::Player(_) => true,
        }
    }
}

/// Messages that can be sent by the room owner
#[derive(Debug, Deserialize, Clone, Copy)]
pub enum IncomingOwnerMessage {
    /// Start a fresh game with everyone currently connected
    StartGame,
    /// Abandon the current game and return the room to the lobby
    StopGame,
}

/// Messages that can be sent by any participant
#[derive(Debug, Deserialize, Clone, Copy)]
pub enum IncomingPlayerMessage {
    /// Reveal a card as part of the sender's current turn
    SelectCard(CardId),
}

/// The outcome of comparing the two selected cards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairOutcome {
    /// The cards share a pair id
    Match {
        /// The two selected card ids, in selection order
        cards: [CardId; 2],
    },
    /// The cards belong to different pairs
    Mismatch {
        /// The two selected card ids, in selection order
        cards: [CardId; 2],
    },
}

impl PairOutcome {
    /// The two selected card ids, in selection order
    pub fn cards(&self) -> [CardId; 2] {
        match self {
            PairOutcome::Match { cards } | PairOutcome::Mismatch { cards } => *cards,
        }
    }
}

/// Alarm messages for the time-gated phases of pair resolution
///
/// Alarms carry the epoch of the game that scheduled them; an alarm whose
/// epoch no longer matches the document (because a start or stop replaced
/// the game in the meantime) is stale and must be dropped unapplied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum AlarmMessage {
    /// Begin the match/mismatch highlight and publish the sound cue
    AnimationStart {
        /// Epoch of the game this alarm belongs to
        epoch: u64,
        /// The outcome being animated
        outcome: PairOutcome,
    },
    /// Close the resolution window: clear the selection, reopen the board
    /// and apply the turn/finish consequences of the outcome
    ResolveSelection {
        /// Epoch of the game this alarm belongs to
        epoch: u64,
        /// The outcome being resolved
        outcome: PairOutcome,
    },
}

/// Broadcast events consumed by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomEvent {
    /// A game is starting; drives the pre-game countdown and sound
    GameStarting,
    /// The game finished; drives the end-of-game sound
    GameFinished,
    /// A pair was matched; drives the match sound
    MatchSound,
    /// A pair was mismatched; drives the error sound
    ErrorSound,
}

impl RoomEvent {
    /// Converts the event to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

/// A single committed mutation of the room document
///
/// One variant per document field; the diff stream replays every committed
/// mutation in order, so a client holding a previous snapshot can apply
/// diffs and stay consistent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentDiff {
    /// The lifecycle phase changed
    State(Lifecycle),
    /// The deck was replaced wholesale
    Cards(Vec<Card>),
    /// The listed cards became matched
    CardsMatched(Vec<CardId>),
    /// The total pair count for the current game
    TotalPairs(usize),
    /// The number of matched pairs changed
    TotalPairsMatched(usize),
    /// The turn moved to another player (or to nobody)
    CurrentTurnPlayerId(Option<Id>),
    /// The first selection slot changed
    FirstSelectedId(Option<CardId>),
    /// The second selection slot changed
    SecondSelectedId(Option<CardId>),
    /// The set of cards in the match highlight changed
    AnimatingMatchIds(Vec<CardId>),
    /// The set of cards in the mismatch highlight changed
    AnimatingErrorIds(Vec<CardId>),
    /// Whether selection is currently open
    CanSelect(bool),
    /// The winner was decided (or cleared)
    WinningPlayerId(Option<Id>),
    /// The scoreboard was replaced wholesale
    PlayerStates(Vec<ScoreEntry>),
    /// One player's score changed
    PlayerStateUpdated(ScoreEntry),
    /// A player's score entry was removed
    PlayerStateRemoved(Id),
}

impl DocumentDiff {
    /// Converts the diff to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

/// A complete copy of the room document, sent to joining participants
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    /// Current lifecycle phase
    pub state: Lifecycle,
    /// The deck, in grid order
    pub cards: Vec<Card>,
    /// Total pairs in the current game
    pub total_pairs: usize,
    /// Pairs matched so far
    pub total_pairs_matched: usize,
    /// Whose turn it is, if a game is running
    pub current_turn_player_id: Option<Id>,
    /// First selection slot
    pub first_selected_id: Option<CardId>,
    /// Second selection slot
    pub second_selected_id: Option<CardId>,
    /// Cards currently in the match highlight
    pub animating_match_ids: Vec<CardId>,
    /// Cards currently in the mismatch highlight
    pub animating_error_ids: Vec<CardId>,
    /// Whether selection is currently open
    pub can_select: bool,
    /// The winner of the finished game, if any
    pub winning_player_id: Option<Id>,
    /// Scoreboard rows in turn order
    pub player_states: Vec<ScoreEntry>,
    /// Connected participants in join order
    pub participants: Vec<ParticipantEntry>,
}

/// Messages that synchronize a participant's view with the room state
#[derive(Debug, Clone, PartialEq, Serialize, derive_more::From)]
pub enum SyncMessage {
    /// The full room document
    Document(Box<DocumentSnapshot>),
}

impl SyncMessage {
    /// Converts the sync message to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

/// The authoritative room document and its transition engine
///
/// One `Game` exists per room. It is mutated exclusively through
/// [`Game::receive_message`], [`Game::receive_alarm`],
/// [`Game::add_participant`] and [`Game::participant_left`]; the caller is
/// responsible for serializing those calls per room (see the coordinator).
pub struct Game {
    /// Configuration for this room's games
    options: GameOptions,
    /// The participant allowed to start and stop games
    owner: Id,
    /// Manager for all connected participants
    pub participants: Participants,
    /// Current lifecycle phase
    lifecycle: Lifecycle,
    /// The deck, in grid order; empty outside a game
    cards: Vec<Card>,
    /// Total pairs in the current game
    total_pairs: usize,
    /// Pairs matched so far
    total_pairs_matched: usize,
    /// Per-player scores; insertion order is the turn order
    scoreboard: Scoreboard,
    /// Whose turn it is
    current_turn: Option<Id>,
    /// First selection slot
    first_selected: Option<CardId>,
    /// Second selection slot; set only while the first slot is set
    second_selected: Option<CardId>,
    /// False only between a completed pick and its resolution alarm
    can_select: bool,
    /// Cards currently in the match highlight
    animating_match_ids: Vec<CardId>,
    /// Cards currently in the mismatch highlight
    animating_error_ids: Vec<CardId>,
    /// The winner of the finished game
    winning_player: Option<Id>,
    /// Identity of the current game; bumped by every start and stop so
    /// that alarms scheduled against an earlier game detect staleness
    epoch: u64,
    /// Injected random source for shuffling, starting player and tie-break
    rng: fastrand::Rng,
}

impl Debug for Game {
    /// Custom debug implementation that avoids printing the full deck
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("lifecycle", &self.lifecycle)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

impl Game {
    /// Creates a new room document in the lobby phase
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pairgrid::{config::GameOptions, game::Game, participant::Id};
    ///
    /// let owner = Id::new();
    /// let game = Game::new(GameOptions::default(), owner);
    /// ```
    pub fn new(options: GameOptions, owner: Id) -> Self {
        Self::with_rng(options, owner, fastrand::Rng::new())
    }

    /// Creates a new room document with an explicit random source
    ///
    /// Seeding the source makes dealing, starting-player choice and
    /// tie-breaks reproducible.
    pub fn with_rng(options: GameOptions, owner: Id, rng: fastrand::Rng) -> Self {
        Self {
            options,
            owner,
            participants: Participants::default(),
            lifecycle: Lifecycle::Lobby,
            cards: Vec::new(),
            total_pairs: 0,
            total_pairs_matched: 0,
            scoreboard: Scoreboard::default(),
            current_turn: None,
            first_selected: None,
            second_selected: None,
            can_select: true,
            animating_match_ids: Vec::new(),
            animating_error_ids: Vec::new(),
            winning_player: None,
            epoch: 0,
            rng,
        }
    }

    /// The participant allowed to start and stop games
    pub fn owner(&self) -> Id {
        self.owner
    }

    /// Current lifecycle phase
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Builds a complete copy of the room document
    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            state: self.lifecycle,
            cards: self.cards.clone(),
            total_pairs: self.total_pairs,
            total_pairs_matched: self.total_pairs_matched,
            current_turn_player_id: self.current_turn,
            first_selected_id: self.first_selected,
            second_selected_id: self.second_selected,
            animating_match_ids: self.animating_match_ids.clone(),
            animating_error_ids: self.animating_error_ids.clone(),
            can_select: self.can_select,
            winning_player_id: self.winning_player,
            player_states: self.scoreboard.entries().to_vec(),
            participants: self.participants.entries(),
        }
    }

    /// Registers a newly connected participant and syncs them
    ///
    /// Participants joining while a game is in progress become observers;
    /// they are folded into the player set by the next game start. The
    /// joiner immediately receives a full document snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the room is at its participant capacity.
    pub fn add_participant<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        id: Id,
        name: &str,
        tunnel_finder: F,
    ) -> Result<(), participant::Error> {
        let value = match self.lifecycle {
            Lifecycle::InProgress => Value::Observer {
                name: name.to_owned(),
            },
            Lifecycle::Lobby | Lifecycle::Finished => Value::Player {
                name: name.to_owned(),
            },
        };
        self.participants.add(id, value)?;

        self.participants
            .send_state(&SyncMessage::from(Box::new(self.snapshot())), id, &tunnel_finder);

        Ok(())
    }

    /// Handles the departure of a participant
    ///
    /// Removes their score entry, hands the turn to the player after them
    /// (computed against the turn order as it was before removal), and
    /// forcibly stops an in-progress game that no longer has anyone to
    /// play against.
    pub fn participant_left<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        id: Id,
        tunnel_finder: F,
    ) {
        if self.participants.remove(id).is_none() {
            return;
        }

        if self.scoreboard.contains(id) {
            // The seat passes to whoever sat after the leaver, so the next
            // player is computed before the entry disappears.
            let order_before = self.scoreboard.turn_order();
            let successor = turn::next_player(id, &order_before).filter(|next| *next != id);

            self.scoreboard.remove(id);
            self.announce(DocumentDiff::PlayerStateRemoved(id), &tunnel_finder);

            if self.current_turn == Some(id) {
                self.current_turn = successor;
                self.announce(
                    DocumentDiff::CurrentTurnPlayerId(self.current_turn),
                    &tunnel_finder,
                );
            }
        }

        if matches!(self.lifecycle, Lifecycle::InProgress) && self.participants.count() <= 1 {
            info!(participant = %id, "room abandoned mid-game, stopping");
            self.stop_game(&tunnel_finder);
        }
    }

    /// Handles an incoming message from a participant
    ///
    /// Guard violations (wrong sender, wrong turn, wrong phase) are
    /// expected races between client prediction and the authoritative
    /// state, and are silently ignored; a well-behaved client treats
    /// "nothing changed" as the answer.
    pub fn receive_message<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, web_time::Duration),
    >(
        &mut self,
        sender: Id,
        message: IncomingMessage,
        schedule_message: S,
        tunnel_finder: F,
    ) {
        if !self.participants.contains(sender) {
            return;
        }

        if !message.follows(sender == self.owner) {
            debug!(%sender, "ignoring message outside sender's authority");
            return;
        }

        match message {
            IncomingMessage::Owner(IncomingOwnerMessage::StartGame) => {
                self.start_game(&tunnel_finder);
            }
            IncomingMessage::Owner(IncomingOwnerMessage::StopGame) => {
                self.stop_game(&tunnel_finder);
            }
            IncomingMessage::Player(IncomingPlayerMessage::SelectCard(card_id)) => {
                self.select_card(sender, card_id, schedule_message, &tunnel_finder);
            }
        }
    }

    /// Handles a scheduled alarm for a time-gated transition
    ///
    /// Alarms re-enter the engine through the same per-room serialization
    /// as direct calls. A stale alarm (epoch mismatch, or the selection it
    /// expects to act on is gone) is dropped without touching the
    /// document.
    pub fn receive_alarm<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        message: AlarmMessage,
        tunnel_finder: F,
    ) {
        match message {
            AlarmMessage::AnimationStart { epoch, outcome } => {
                if !self.alarm_is_current(epoch, &outcome) {
                    debug!(epoch, "dropping stale animation alarm");
                    return;
                }

                match outcome {
                    PairOutcome::Match { cards } => {
                        self.animating_match_ids = cards.to_vec();
                        self.announce(
                            DocumentDiff::AnimatingMatchIds(self.animating_match_ids.clone()),
                            &tunnel_finder,
                        );
                        self.publish(RoomEvent::MatchSound, &tunnel_finder);
                    }
                    PairOutcome::Mismatch { cards } => {
                        self.animating_error_ids = cards.to_vec();
                        self.announce(
                            DocumentDiff::AnimatingErrorIds(self.animating_error_ids.clone()),
                            &tunnel_finder,
                        );
                        self.publish(RoomEvent::ErrorSound, &tunnel_finder);
                    }
                }
            }
            AlarmMessage::ResolveSelection { epoch, outcome } => {
                if !self.alarm_is_current(epoch, &outcome) {
                    debug!(epoch, "dropping stale resolution alarm");
                    return;
                }

                match outcome {
                    PairOutcome::Match { .. } => {
                        self.animating_match_ids.clear();
                        self.announce(DocumentDiff::AnimatingMatchIds(Vec::new()), &tunnel_finder);
                        self.clear_selection(&tunnel_finder);
                        self.reopen_selection(&tunnel_finder);

                        // Matching grants another turn, so the turn pointer
                        // stays put; a completed board ends the game here.
                        if self.total_pairs > 0 && self.total_pairs_matched == self.total_pairs {
                            self.finish_game(&tunnel_finder);
                        }
                    }
                    PairOutcome::Mismatch { .. } => {
                        self.animating_error_ids.clear();
                        self.announce(DocumentDiff::AnimatingErrorIds(Vec::new()), &tunnel_finder);
                        self.clear_selection(&tunnel_finder);
                        self.reopen_selection(&tunnel_finder);

                        if let Some(current) = self.current_turn {
                            if let Some(next) =
                                turn::next_player(current, &self.scoreboard.turn_order())
                            {
                                self.current_turn = Some(next);
                                self.announce(
                                    DocumentDiff::CurrentTurnPlayerId(Some(next)),
                                    &tunnel_finder,
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    /// Starts a fresh game with everyone currently connected
    fn start_game<T: Tunnel, F: Fn(Id) -> Option<T>>(&mut self, tunnel_finder: &F) {
        if matches!(self.lifecycle, Lifecycle::InProgress) {
            debug!("ignoring start while a game is in progress");
            return;
        }
        if self.participants.count() < self.options.minimum_players {
            debug!(
                connected = self.participants.count(),
                required = self.options.minimum_players,
                "ignoring start without enough players"
            );
            return;
        }

        self.epoch += 1;
        self.participants.promote_observers();
        let players: Vec<Id> = self.participants.ids_in_join_order().collect();

        self.lifecycle = Lifecycle::InProgress;
        self.cards = deck::generate(
            self.options.pair_count,
            &self.options.image_refs,
            &mut self.rng,
        );
        self.total_pairs = self.options.pair_count as usize;
        self.total_pairs_matched = 0;
        self.current_turn = Some(players[self.rng.usize(0..players.len())]);
        self.first_selected = None;
        self.second_selected = None;
        self.animating_match_ids.clear();
        self.animating_error_ids.clear();
        self.can_select = true;
        self.winning_player = None;
        self.scoreboard.rebuild(players);

        info!(epoch = self.epoch, players = self.scoreboard.len(), "game started");

        self.announce(DocumentDiff::State(self.lifecycle), tunnel_finder);
        self.announce(DocumentDiff::TotalPairs(self.total_pairs), tunnel_finder);
        self.announce(DocumentDiff::TotalPairsMatched(0), tunnel_finder);
        self.announce(
            DocumentDiff::CurrentTurnPlayerId(self.current_turn),
            tunnel_finder,
        );
        self.announce(DocumentDiff::FirstSelectedId(None), tunnel_finder);
        self.announce(DocumentDiff::SecondSelectedId(None), tunnel_finder);
        self.announce(DocumentDiff::AnimatingMatchIds(Vec::new()), tunnel_finder);
        self.announce(DocumentDiff::AnimatingErrorIds(Vec::new()), tunnel_finder);
        self.announce(DocumentDiff::CanSelect(true), tunnel_finder);
        self.announce(DocumentDiff::WinningPlayerId(None), tunnel_finder);
        self.announce(
            DocumentDiff::PlayerStates(self.scoreboard.entries().to_vec()),
            tunnel_finder,
        );
        self.announce(DocumentDiff::Cards(self.cards.clone()), tunnel_finder);
        self.publish(RoomEvent::GameStarting, tunnel_finder);
    }

    /// Returns the room to the lobby, zeroing scores but keeping players
    fn stop_game<T: Tunnel, F: Fn(Id) -> Option<T>>(&mut self, tunnel_finder: &F) {
        self.epoch += 1;
        self.lifecycle = Lifecycle::Lobby;
        self.cards.clear();
        self.current_turn = None;
        self.first_selected = None;
        self.second_selected = None;
        self.animating_match_ids.clear();
        self.animating_error_ids.clear();
        self.can_select = true;
        self.total_pairs_matched = 0;
        self.winning_player = None;
        self.scoreboard.reset_all();

        info!(epoch = self.epoch, "game stopped");

        self.announce(DocumentDiff::State(self.lifecycle), tunnel_finder);
        self.announce(DocumentDiff::Cards(Vec::new()), tunnel_finder);
        self.announce(DocumentDiff::CurrentTurnPlayerId(None), tunnel_finder);
        self.announce(DocumentDiff::FirstSelectedId(None), tunnel_finder);
        self.announce(DocumentDiff::SecondSelectedId(None), tunnel_finder);
        self.announce(DocumentDiff::AnimatingMatchIds(Vec::new()), tunnel_finder);
        self.announce(DocumentDiff::AnimatingErrorIds(Vec::new()), tunnel_finder);
        self.announce(DocumentDiff::CanSelect(true), tunnel_finder);
        self.announce(DocumentDiff::TotalPairsMatched(0), tunnel_finder);
        self.announce(DocumentDiff::WinningPlayerId(None), tunnel_finder);
        self.announce(
            DocumentDiff::PlayerStates(self.scoreboard.entries().to_vec()),
            tunnel_finder,
        );
    }

    /// Applies a card selection for the current player
    fn select_card<T: Tunnel, F: Fn(Id) -> Option<T>, S: FnMut(AlarmMessage, web_time::Duration)>(
        &mut self,
        player: Id,
        card_id: CardId,
        schedule_message: S,
        tunnel_finder: &F,
    ) {
        if !self.can_select {
            return;
        }
        if self.current_turn != Some(player) {
            return;
        }
        if self.first_selected.is_some() && self.second_selected.is_some() {
            return;
        }

        let Some(card) = self.cards.iter().find(|card| card.id == card_id) else {
            return;
        };
        if card.is_matched || self.first_selected == Some(card_id) {
            return;
        }

        match self.first_selected {
            None => {
                self.first_selected = Some(card_id);
                self.announce(DocumentDiff::FirstSelectedId(Some(card_id)), tunnel_finder);
            }
            Some(first_id) => {
                self.second_selected = Some(card_id);
                self.announce(DocumentDiff::SecondSelectedId(Some(card_id)), tunnel_finder);

                // The pick is complete; the board stays closed until the
                // resolution alarm reopens it.
                self.can_select = false;
                self.announce(DocumentDiff::CanSelect(false), tunnel_finder);

                self.resolve_selection(first_id, card_id, schedule_message, tunnel_finder);
            }
        }
    }

    /// Compares the completed pick and schedules its time-gated follow-ups
    fn resolve_selection<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, web_time::Duration),
    >(
        &mut self,
        first_id: CardId,
        second_id: CardId,
        mut schedule_message: S,
        tunnel_finder: &F,
    ) {
        let pair_of = |cards: &[Card], id: CardId| {
            cards.iter().find(|card| card.id == id).map(|card| card.pair_id)
        };
        let (Some(first_pair), Some(second_pair)) = (
            pair_of(&self.cards, first_id),
            pair_of(&self.cards, second_id),
        ) else {
            warn!("selection referenced cards missing from the deck");
            return;
        };

        let cards = [first_id, second_id];
        let outcome = if first_pair == second_pair {
            // Should never be absent here: selection is only reachable by
            // the player holding the turn.
            let Some(player) = self.current_turn else {
                return;
            };

            for card in self
                .cards
                .iter_mut()
                .filter(|card| cards.contains(&card.id))
            {
                card.is_matched = true;
            }
            self.announce(DocumentDiff::CardsMatched(cards.to_vec()), tunnel_finder);

            let updated = self.scoreboard.record_match(player, first_pair).cloned();
            if let Some(entry) = updated {
                self.announce(DocumentDiff::PlayerStateUpdated(entry), tunnel_finder);
            }

            self.total_pairs_matched += 1;
            self.announce(
                DocumentDiff::TotalPairsMatched(self.total_pairs_matched),
                tunnel_finder,
            );

            PairOutcome::Match { cards }
        } else {
            PairOutcome::Mismatch { cards }
        };

        schedule_message(
            AlarmMessage::AnimationStart {
                epoch: self.epoch,
                outcome,
            },
            self.options.animation_start_delay,
        );
        schedule_message(
            AlarmMessage::ResolveSelection {
                epoch: self.epoch,
                outcome,
            },
            self.options.resolution_window,
        );
    }

    /// Ends the game: records the winner and announces the finish
    fn finish_game<T: Tunnel, F: Fn(Id) -> Option<T>>(&mut self, tunnel_finder: &F) {
        self.lifecycle = Lifecycle::Finished;
        self.announce(DocumentDiff::State(self.lifecycle), tunnel_finder);

        self.winning_player = self.scoreboard.winner(&mut self.rng);
        self.announce(
            DocumentDiff::WinningPlayerId(self.winning_player),
            tunnel_finder,
        );

        info!(winner = ?self.winning_player, "game finished");
        self.publish(RoomEvent::GameFinished, tunnel_finder);
    }

    /// Whether an alarm still targets the current game and selection
    fn alarm_is_current(&self, epoch: u64, outcome: &PairOutcome) -> bool {
        let [first, second] = outcome.cards();
        epoch == self.epoch
            && matches!(self.lifecycle, Lifecycle::InProgress)
            && self.first_selected == Some(first)
            && self.second_selected == Some(second)
    }

    /// Empties both selection slots and announces the change
    fn clear_selection<T: Tunnel, F: Fn(Id) -> Option<T>>(&mut self, tunnel_finder: &F) {
        self.first_selected = None;
        self.second_selected = None;
        self.announce(DocumentDiff::FirstSelectedId(None), tunnel_finder);
        self.announce(DocumentDiff::SecondSelectedId(None), tunnel_finder);
    }

    /// Reopens the board for the next pick
    fn reopen_selection<T: Tunnel, F: Fn(Id) -> Option<T>>(&mut self, tunnel_finder: &F) {
        self.can_select = true;
        self.announce(DocumentDiff::CanSelect(true), tunnel_finder);
    }

    /// Publishes a document diff to every connected participant
    fn announce<T: Tunnel, F: Fn(Id) -> Option<T>>(&self, diff: DocumentDiff, tunnel_finder: &F) {
        self.participants.announce_diff(&diff, tunnel_finder);
    }

    /// Publishes a broadcast event to every connected participant
    fn publish<T: Tunnel, F: Fn(Id) -> Option<T>>(&self, event: RoomEvent, tunnel_finder: &F) {
        self.participants.announce_event(&event, tunnel_finder);
    }
}
