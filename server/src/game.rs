//! One running four-player game: the deal/bid/trick/score state machine.
//!
//! A session runs on its own task and exclusively owns its four player
//! connections, so nothing here needs locking. Any read failure (timeout,
//! oversized input, disconnect) drops the running flag and the whole game
//! unwinds to cleanup; partial hands are never salvaged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use four99_protocol::{beats, evaluate_bid, play_is_legal, Bid, BidOutcome, Card, ServerMessage, Suit};

use crate::conn::{PlayerConn, PLAY_TIMEOUT};
use crate::deck::DeckStore;
use crate::lobby::ServerState;

/// Seats per game; seats 0 and 2 are Team 1, seats 1 and 3 are Team 2.
pub const SEATS: usize = 4;
/// Tricks per hand; four seats times thirteen tricks consumes the deck.
pub const TRICKS_PER_HAND: usize = 13;
/// A team crossing +499 (or the other dropping below -499) wins the game.
pub const WIN_SCORE: i32 = 499;

pub struct GameSession {
    name: String,
    players: Vec<PlayerConn>,
    scores: [i32; 2],
    deck: usize,
    lead_player: usize,
    bid: Option<Bid>,
    trumps: Option<Suit>,
    bid_team: usize,
    running: Arc<AtomicBool>,
    decks: Arc<DeckStore>,
}

impl GameSession {
    /// `players` must already be seated (sorted) by the lobby.
    pub fn new(
        name: String,
        players: Vec<PlayerConn>,
        decks: Arc<DeckStore>,
        running: Arc<AtomicBool>,
    ) -> Self {
        debug_assert_eq!(players.len(), SEATS);
        GameSession {
            name,
            players,
            scores: [0, 0],
            deck: 0,
            lead_player: 0,
            bid: None,
            trumps: None,
            bid_team: 0,
            running,
            decks,
        }
    }

    /// Drives the session to completion, then tears it down and removes it
    /// from the server's registry.
    pub async fn run(mut self, state: Arc<ServerState>) {
        info!("game {:?}: started", self.name);
        self.send_team_names().await;

        while self.running.load(Ordering::Relaxed) {
            self.play_hand().await;
            if !self.running.load(Ordering::Relaxed) {
                break;
            }
            if let Some(winner) = self.winning_team() {
                let notice = format!("Winner is Team {}", winner + 1);
                self.broadcast(&ServerMessage::Info(notice), None).await;
                break;
            }
            self.deck = (self.deck + 1) % self.decks.len();
        }

        self.finish(&state).await;
    }

    async fn finish(mut self, state: &ServerState) {
        info!("game {:?}: ending", self.name);
        self.running.store(false, Ordering::Relaxed);
        self.broadcast(&ServerMessage::GameOver, None).await;
        for player in &mut self.players {
            player.close().await;
        }
        state
            .games
            .lock()
            .retain(|handle| !Arc::ptr_eq(&handle.running, &self.running));
    }

    fn winning_team(&self) -> Option<usize> {
        if self.scores[0] > WIN_SCORE || self.scores[1] < -WIN_SCORE {
            Some(0)
        } else if self.scores[1] > WIN_SCORE || self.scores[0] < -WIN_SCORE {
            Some(1)
        } else {
            None
        }
    }

    async fn send_team_names(&mut self) {
        let team1 = format!("Team1: {}, {}", self.players[0].name, self.players[2].name);
        let team2 = format!("Team2: {}, {}", self.players[1].name, self.players[3].name);
        self.broadcast(&ServerMessage::Info(team1), None).await;
        self.broadcast(&ServerMessage::Info(team2), None).await;
    }

    /// Sends to every seat except `skip`. Observers always hear an event
    /// before the next prompt goes out, because all sends happen inline on
    /// the session task.
    async fn broadcast(&mut self, msg: &ServerMessage, skip: Option<usize>) {
        for (seat, player) in self.players.iter_mut().enumerate() {
            if Some(seat) == skip {
                continue;
            }
            player.send(msg).await;
        }
    }

    /// Reads one response from `seat`. Any failure kicks the player,
    /// notifies everyone and aborts the game; `None` always means the
    /// session is done.
    async fn read_from(&mut self, seat: usize) -> Option<String> {
        if !self.running.load(Ordering::Relaxed) {
            return None;
        }
        match self.players[seat].recv(PLAY_TIMEOUT).await {
            Ok(line) => Some(line),
            Err(err) => {
                warn!(
                    "game {:?}: kicking {:?} ({err})",
                    self.name, self.players[seat].name
                );
                let notice = format!("{} disconnected early", self.players[seat].name);
                self.broadcast(&ServerMessage::Info(notice), None).await;
                self.running.store(false, Ordering::Relaxed);
                None
            }
        }
    }

    /// One full deal-bid-play-score cycle with the active deck.
    async fn play_hand(&mut self) {
        self.deal().await;

        self.run_bidding().await;
        if !self.running.load(Ordering::Relaxed) {
            return;
        }

        let mut tricks_won = [0usize; 2];
        for _ in 0..TRICKS_PER_HAND {
            let Some(team) = self.play_trick().await else {
                return;
            };
            tricks_won[team] += 1;
        }

        let Some(bid) = self.bid else {
            return;
        };
        if tricks_won[self.bid_team] < bid.number as usize {
            self.scores[self.bid_team] -= bid.points();
        } else {
            self.scores[self.bid_team] += bid.points();
        }

        let scores = format!("Team 1={}, Team 2={}", self.scores[0], self.scores[1]);
        self.broadcast(&ServerMessage::Info(scores), None).await;
    }

    /// Deals the active deck round-robin and announces each hand to its
    /// owner only.
    async fn deal(&mut self) {
        let deck = self.decks.get(self.deck);
        for (position, card) in deck.cards().iter().enumerate() {
            self.players[position % SEATS].hand.push(*card);
        }
        for player in &mut self.players {
            let msg = ServerMessage::Hand(player.hand.clone());
            player.send(&msg).await;
        }
    }

    /// Runs the auction: seats in order, passed seats skipped, invalid
    /// tokens re-prompted forever. Ends when one eligible seat remains or
    /// the maximum bid lands. The winner's suit becomes trumps and the
    /// winner leads the first trick.
    async fn run_bidding(&mut self) {
        let mut eligible = [true; SEATS];
        let mut remaining = SEATS;
        let mut current: Option<Bid> = None;
        let mut holder: Option<usize> = None;

        let auction_over =
            |remaining: usize, current: Option<Bid>| remaining <= 1 || current.is_some_and(|b| b.is_max());

        while !auction_over(remaining, current) {
            for seat in 0..SEATS {
                if !eligible[seat] || auction_over(remaining, current) {
                    continue;
                }
                loop {
                    self.players[seat].send(&ServerMessage::BidPrompt(current)).await;
                    let Some(token) = self.read_from(seat).await else {
                        return;
                    };
                    debug!("game {:?}: bid {:?} from {:?}", self.name, token, self.players[seat].name);
                    match evaluate_bid(current, &token) {
                        BidOutcome::Invalid => continue,
                        BidOutcome::Pass => {
                            eligible[seat] = false;
                            remaining -= 1;
                            let notice = format!("{} passes", self.players[seat].name);
                            self.broadcast(&ServerMessage::Info(notice), Some(seat)).await;
                        }
                        BidOutcome::Valid(bid) => {
                            current = Some(bid);
                            holder = Some(seat);
                            let notice = format!("{} bids {}", self.players[seat].name, bid);
                            self.broadcast(&ServerMessage::Info(notice), Some(seat)).await;
                        }
                    }
                    break;
                }
            }
        }

        // Seat 0 cannot pass first, so a finished auction always has a bid.
        let (Some(bid), Some(holder)) = (current, holder) else {
            return;
        };
        self.broadcast(&ServerMessage::Trumps(bid), None).await;
        self.bid = Some(bid);
        self.trumps = Some(bid.suit);
        self.lead_player = holder;
        self.bid_team = holder % 2;
    }

    /// Plays one trick and returns the winning team, or `None` if the game
    /// aborted mid-trick. The winner becomes the next lead.
    async fn play_trick(&mut self) -> Option<usize> {
        let trumps = self.trumps?;
        let mut lead: Option<Suit> = None;
        let mut winning: Option<(Card, usize)> = None;

        for turn in 0..SEATS {
            let seat = (self.lead_player + turn) % SEATS;
            loop {
                let prompt = match lead {
                    None => ServerMessage::LeadPrompt,
                    Some(suit) => ServerMessage::PlayPrompt(suit),
                };
                self.players[seat].send(&prompt).await;

                let token = self.read_from(seat).await?;
                let Ok(card) = token.parse::<Card>() else {
                    debug!("game {:?}: bad play token {:?}", self.name, token);
                    continue;
                };
                if !play_is_legal(lead, card, &self.players[seat].hand) {
                    debug!("game {:?}: illegal play {} from {:?}", self.name, card, self.players[seat].name);
                    continue;
                }

                let notice = format!("{} plays {}", self.players[seat].name, card);
                self.broadcast(&ServerMessage::Info(notice), Some(seat)).await;
                self.players[seat].send(&ServerMessage::PlayAccepted).await;

                let hand = &mut self.players[seat].hand;
                if let Some(pos) = hand.iter().position(|c| *c == card) {
                    hand.remove(pos);
                }

                let lead_suit = *lead.get_or_insert(card.suit);
                if beats(card, winning.map(|(c, _)| c), lead_suit, trumps) {
                    winning = Some((card, seat));
                }
                break;
            }
        }

        let (_, winner) = winning?;
        let notice = format!("{} won", self.players[winner].name);
        self.broadcast(&ServerMessage::Info(notice), None).await;
        self.lead_player = winner;
        Some(winner % 2)
    }
}
