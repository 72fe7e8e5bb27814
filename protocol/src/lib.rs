//! Shared game-domain types for four99: cards, bids, decks and the wire
//! messages exchanged between server and players.
//!
//! The wire format is one message per line. Server lines carry a one
//! character tag followed by the payload; player lines are raw bid or play
//! tokens with no tag.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lowest number a player may bid.
pub const MIN_BID: u8 = 4;
/// Highest number a player may bid; a bid of 9H ends the auction outright.
pub const MAX_BID: u8 = 9;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed card token")]
    BadCard,
    #[error("malformed bid token")]
    BadBid,
    #[error("malformed message line")]
    BadMessage,
}

/// ---- Cards ----

/// Suits in bid-priority order: spades lowest, hearts highest. The priority
/// only matters when comparing bids; trick play never ranks one suit above
/// another except through trumps and the lead suit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Suit {
    Spades,
    Clubs,
    Diamonds,
    Hearts,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Spades, Suit::Clubs, Suit::Diamonds, Suit::Hearts];

    /// Bid tie-break priority, 1 (spades) through 4 (hearts).
    pub fn priority(self) -> u8 {
        match self {
            Suit::Spades => 1,
            Suit::Clubs => 2,
            Suit::Diamonds => 3,
            Suit::Hearts => 4,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Suit::Spades => 'S',
            Suit::Clubs => 'C',
            Suit::Diamonds => 'D',
            Suit::Hearts => 'H',
        }
    }

    pub fn from_char(c: char) -> Option<Suit> {
        match c {
            'S' => Some(Suit::Spades),
            'C' => Some(Suit::Clubs),
            'D' => Some(Suit::Diamonds),
            'H' => Some(Suit::Hearts),
            _ => None,
        }
    }
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Ranks in trick order, two lowest through ace highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rank {
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
    ];

    pub fn as_char(self) -> char {
        match self {
            Rank::Two => '2',
            Rank::Three => '3',
            Rank::Four => '4',
            Rank::Five => '5',
            Rank::Six => '6',
            Rank::Seven => '7',
            Rank::Eight => '8',
            Rank::Nine => '9',
            Rank::Ten => 'T',
            Rank::Jack => 'J',
            Rank::Queen => 'Q',
            Rank::King => 'K',
            Rank::Ace => 'A',
        }
    }

    pub fn from_char(c: char) -> Option<Rank> {
        match c {
            '2' => Some(Rank::Two),
            '3' => Some(Rank::Three),
            '4' => Some(Rank::Four),
            '5' => Some(Rank::Five),
            '6' => Some(Rank::Six),
            '7' => Some(Rank::Seven),
            '8' => Some(Rank::Eight),
            '9' => Some(Rank::Nine),
            'T' => Some(Rank::Ten),
            'J' => Some(Rank::Jack),
            'Q' => Some(Rank::Queen),
            'K' => Some(Rank::King),
            'A' => Some(Rank::Ace),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rank.as_char(), self.suit.as_char())
    }
}

impl FromStr for Card {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some(r), Some(su), None) => {
                let rank = Rank::from_char(r).ok_or(ParseError::BadCard)?;
                let suit = Suit::from_char(su).ok_or(ParseError::BadCard)?;
                Ok(Card { rank, suit })
            }
            _ => Err(ParseError::BadCard),
        }
    }
}

/// ---- Decks ----

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeckParseError {
    #[error("deck line must encode exactly 52 cards")]
    WrongLength,
    #[error("malformed card token {0:?}")]
    BadCard(String),
    #[error("duplicate card {0}")]
    Duplicate(Card),
}

/// A pre-shuffled 52-card deck, dealt front to back. Decks are parsed once
/// at startup and never mutated.
#[derive(Debug, Clone)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    /// Parses one deck-file line: 52 two-character card tokens
    /// concatenated. Every one of the 52 (rank, suit) combinations must
    /// appear exactly once.
    pub fn parse(line: &str) -> Result<Deck, DeckParseError> {
        if line.chars().count() != 104 {
            return Err(DeckParseError::WrongLength);
        }
        let tokens: Vec<char> = line.chars().collect();
        let mut cards = Vec::with_capacity(52);
        let mut seen = [false; 52];
        for pair in tokens.chunks(2) {
            let token: String = pair.iter().collect();
            let card: Card = token.parse().map_err(|_| DeckParseError::BadCard(token))?;
            let slot = (card.suit.priority() as usize - 1) * 13 + card.rank as usize;
            if seen[slot] {
                return Err(DeckParseError::Duplicate(card));
            }
            seen[slot] = true;
            cards.push(card);
        }
        Ok(Deck { cards })
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }
}

/// ---- Bids ----

/// A claim to win at least `number` tricks with `suit` as trumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bid {
    pub number: u8,
    pub suit: Suit,
}

impl Bid {
    /// True when this bid outranks `current`: higher number wins, equal
    /// numbers fall back to suit priority.
    pub fn beats(&self, current: &Bid) -> bool {
        self.number > current.number
            || (self.number == current.number && self.suit.priority() > current.suit.priority())
    }

    /// True for 9H, the highest possible bid.
    pub fn is_max(&self) -> bool {
        self.number == MAX_BID && self.suit == Suit::Hearts
    }

    /// Point value from the published schedule: 20 for 4S up to 300 for 9H.
    pub fn points(&self) -> i32 {
        20 + ((self.number - MIN_BID) % 6) as i32 * 50 + (self.suit.priority() - 1) as i32 * 10
    }
}

impl fmt::Display for Bid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.number, self.suit.as_char())
    }
}

impl FromStr for Bid {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some(n), Some(su), None) => {
                let number = n.to_digit(10).ok_or(ParseError::BadBid)? as u8;
                if !(MIN_BID..=MAX_BID).contains(&number) {
                    return Err(ParseError::BadBid);
                }
                let suit = Suit::from_char(su).ok_or(ParseError::BadBid)?;
                Ok(Bid { number, suit })
            }
            _ => Err(ParseError::BadBid),
        }
    }
}

/// Result of judging one bid token against the current bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidOutcome {
    /// Malformed token, or a bid that fails to beat the current one.
    Invalid,
    /// A well-formed bid that becomes the new current bid.
    Valid(Bid),
    /// "PP"; only legal once somebody has bid.
    Pass,
}

/// Judges a raw bid token from a player. The first bidder may not pass.
pub fn evaluate_bid(current: Option<Bid>, token: &str) -> BidOutcome {
    if token == "PP" {
        return if current.is_some() {
            BidOutcome::Pass
        } else {
            BidOutcome::Invalid
        };
    }
    let Ok(bid) = token.parse::<Bid>() else {
        return BidOutcome::Invalid;
    };
    match current {
        None => BidOutcome::Valid(bid),
        Some(cur) if bid.beats(&cur) => BidOutcome::Valid(bid),
        Some(_) => BidOutcome::Invalid,
    }
}

/// ---- Trick play ----

/// Whether `card` may be played from `hand`. With a lead suit established
/// the player must follow it while they still hold any card of that suit.
pub fn play_is_legal(lead: Option<Suit>, card: Card, hand: &[Card]) -> bool {
    if !hand.contains(&card) {
        return false;
    }
    if let Some(lead) = lead {
        if card.suit != lead && hand.iter().any(|c| c.suit == lead) {
            return false;
        }
    }
    true
}

/// Whether `candidate` takes the trick from the current winner. Trumps beat
/// everything else; otherwise ranks compare only within the trump or lead
/// suit. With no current winner the candidate always takes it.
pub fn beats(candidate: Card, current: Option<Card>, lead: Suit, trumps: Suit) -> bool {
    let Some(cur) = current else {
        return true;
    };
    (candidate.suit == trumps && cur.suit != trumps)
        || (candidate.suit == cur.suit
            && (cur.suit == trumps || cur.suit == lead)
            && candidate.rank > cur.rank)
}

/// ---- Wire messages ----

/// Every line the server sends, one variant per tag character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// `M`: informational text (greetings, announcements, scores).
    Info(String),
    /// `H`: the 13 cards dealt to this player.
    Hand(Vec<Card>),
    /// `B`: bid prompt carrying the current bid, empty if nobody has bid.
    BidPrompt(Option<Bid>),
    /// `T`: the auction is over; payload is the winning bid.
    Trumps(Bid),
    /// `L`: prompt to lead the trick.
    LeadPrompt,
    /// `P`: prompt to follow; payload is the lead suit.
    PlayPrompt(Suit),
    /// `A`: the submitted play was accepted.
    PlayAccepted,
    /// `O`: the game is over and the connection is about to close.
    GameOver,
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Info(text) => write!(f, "M{}", text),
            ServerMessage::Hand(cards) => {
                write!(f, "H")?;
                for card in cards {
                    write!(f, "{}", card)?;
                }
                Ok(())
            }
            ServerMessage::BidPrompt(None) => write!(f, "B"),
            ServerMessage::BidPrompt(Some(bid)) => write!(f, "B{}", bid),
            ServerMessage::Trumps(bid) => write!(f, "T{}", bid),
            ServerMessage::LeadPrompt => write!(f, "L"),
            ServerMessage::PlayPrompt(suit) => write!(f, "P{}", suit.as_char()),
            ServerMessage::PlayAccepted => write!(f, "A"),
            ServerMessage::GameOver => write!(f, "O"),
        }
    }
}

impl FromStr for ServerMessage {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let tag = chars.next().ok_or(ParseError::BadMessage)?;
        let payload = chars.as_str();
        match tag {
            'M' => Ok(ServerMessage::Info(payload.to_string())),
            'H' => {
                let tokens: Vec<char> = payload.chars().collect();
                if tokens.len() % 2 != 0 {
                    return Err(ParseError::BadMessage);
                }
                let mut cards = Vec::with_capacity(tokens.len() / 2);
                for pair in tokens.chunks(2) {
                    let token: String = pair.iter().collect();
                    cards.push(token.parse().map_err(|_| ParseError::BadMessage)?);
                }
                Ok(ServerMessage::Hand(cards))
            }
            'B' if payload.is_empty() => Ok(ServerMessage::BidPrompt(None)),
            'B' => Ok(ServerMessage::BidPrompt(Some(
                payload.parse().map_err(|_| ParseError::BadMessage)?,
            ))),
            'T' => Ok(ServerMessage::Trumps(
                payload.parse().map_err(|_| ParseError::BadMessage)?,
            )),
            'L' if payload.is_empty() => Ok(ServerMessage::LeadPrompt),
            'P' => {
                let mut p = payload.chars();
                match (p.next().and_then(Suit::from_char), p.next()) {
                    (Some(suit), None) => Ok(ServerMessage::PlayPrompt(suit)),
                    _ => Err(ParseError::BadMessage),
                }
            }
            'A' if payload.is_empty() => Ok(ServerMessage::PlayAccepted),
            'O' if payload.is_empty() => Ok(ServerMessage::GameOver),
            _ => Err(ParseError::BadMessage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(s: &str) -> Card {
        s.parse().unwrap()
    }

    fn bid(s: &str) -> Bid {
        s.parse().unwrap()
    }

    fn ordered_deck_line() -> String {
        let mut line = String::with_capacity(104);
        for suit in Suit::ALL {
            for rank in Rank::ALL {
                line.push(rank.as_char());
                line.push(suit.as_char());
            }
        }
        line
    }

    #[test]
    fn card_tokens_round_trip() {
        for token in ["2S", "TC", "JD", "AH"] {
            assert_eq!(card(token).to_string(), token);
        }
        assert!("1S".parse::<Card>().is_err());
        assert!("AX".parse::<Card>().is_err());
        assert!("ASS".parse::<Card>().is_err());
        assert!("A".parse::<Card>().is_err());
    }

    #[test]
    fn deck_parse_accepts_a_full_deck() {
        let deck = Deck::parse(&ordered_deck_line()).unwrap();
        assert_eq!(deck.cards().len(), 52);
        assert_eq!(deck.cards()[0], card("2S"));
        assert_eq!(deck.cards()[51], card("AH"));
    }

    #[test]
    fn deck_parse_rejects_bad_lines() {
        assert_eq!(Deck::parse("").unwrap_err(), DeckParseError::WrongLength);
        assert_eq!(
            Deck::parse(&ordered_deck_line()[..102]).unwrap_err(),
            DeckParseError::WrongLength
        );

        // Replace the last card with a repeat of the first.
        let mut dup = ordered_deck_line();
        dup.replace_range(102..104, "2S");
        assert_eq!(
            Deck::parse(&dup).unwrap_err(),
            DeckParseError::Duplicate(card("2S"))
        );

        let mut junk = ordered_deck_line();
        junk.replace_range(0..2, "1S");
        assert!(matches!(Deck::parse(&junk), Err(DeckParseError::BadCard(_))));
    }

    #[test]
    fn first_bidder_cannot_pass() {
        assert_eq!(evaluate_bid(None, "PP"), BidOutcome::Invalid);
        assert_eq!(evaluate_bid(None, "4S"), BidOutcome::Valid(bid("4S")));
    }

    #[test]
    fn later_bids_must_beat_the_current_one() {
        let current = Some(bid("4S"));
        assert_eq!(evaluate_bid(current, "PP"), BidOutcome::Pass);
        assert_eq!(evaluate_bid(current, "4S"), BidOutcome::Invalid);
        assert_eq!(evaluate_bid(current, "4H"), BidOutcome::Valid(bid("4H")));
        assert_eq!(evaluate_bid(current, "5C"), BidOutcome::Valid(bid("5C")));
        assert_eq!(evaluate_bid(Some(bid("4H")), "4C"), BidOutcome::Invalid);
    }

    #[test]
    fn malformed_bid_tokens_are_invalid() {
        for token in ["", "4", "4X", "3S", "0H", "10S", "pp", "P P"] {
            assert_eq!(evaluate_bid(None, token), BidOutcome::Invalid, "{token:?}");
            assert_eq!(
                evaluate_bid(Some(bid("4S")), token),
                BidOutcome::Invalid,
                "{token:?}"
            );
        }
    }

    #[test]
    fn bid_points_match_the_schedule() {
        assert_eq!(bid("4S").points(), 20);
        assert_eq!(bid("4H").points(), 50);
        assert_eq!(bid("5S").points(), 70);
        assert_eq!(bid("9H").points(), 300);
    }

    #[test]
    fn must_follow_the_lead_suit_when_able() {
        let hand = vec![card("3S"), card("7H")];
        // hand holds a spade, so an off-suit play on a spade lead is illegal
        assert!(!play_is_legal(Some(Suit::Spades), card("7H"), &hand));
        assert!(play_is_legal(Some(Suit::Spades), card("3S"), &hand));
        // with no lead established any held card may be played
        assert!(play_is_legal(None, card("7H"), &hand));

        let no_spades = vec![card("7H"), card("4D")];
        assert!(play_is_legal(Some(Suit::Spades), card("7H"), &no_spades));
    }

    #[test]
    fn cards_not_in_hand_are_illegal() {
        let hand = vec![card("3S"), card("4D")];
        assert!(!play_is_legal(None, card("AS"), &hand));
        assert!(play_is_legal(None, card("4D"), &hand));
    }

    #[test]
    fn trick_comparison() {
        // same suit, higher rank wins on the lead suit
        assert!(beats(card("AS"), Some(card("KS")), Suit::Spades, Suit::Hearts));
        assert!(!beats(card("KS"), Some(card("AS")), Suit::Spades, Suit::Hearts));
        // any trump beats any non-trump
        assert!(beats(card("2H"), Some(card("AS")), Suit::Spades, Suit::Hearts));
        assert!(!beats(card("AS"), Some(card("2H")), Suit::Spades, Suit::Hearts));
        // off-suit, non-trump cards never take the trick
        assert!(!beats(card("AD"), Some(card("2S")), Suit::Spades, Suit::Hearts));
        // first card of the trick always wins so far
        assert!(beats(card("2C"), None, Suit::Clubs, Suit::Hearts));
    }

    #[test]
    fn server_message_encoding() {
        assert_eq!(ServerMessage::Info("hello".into()).to_string(), "Mhello");
        assert_eq!(
            ServerMessage::Hand(vec![card("2S"), card("AH")]).to_string(),
            "H2SAH"
        );
        assert_eq!(ServerMessage::BidPrompt(None).to_string(), "B");
        assert_eq!(ServerMessage::BidPrompt(Some(bid("4S"))).to_string(), "B4S");
        assert_eq!(ServerMessage::Trumps(bid("9H")).to_string(), "T9H");
        assert_eq!(ServerMessage::LeadPrompt.to_string(), "L");
        assert_eq!(ServerMessage::PlayPrompt(Suit::Clubs).to_string(), "PC");
        assert_eq!(ServerMessage::PlayAccepted.to_string(), "A");
        assert_eq!(ServerMessage::GameOver.to_string(), "O");
    }

    #[test]
    fn server_message_parsing() {
        for line in ["Mhello", "H2SAH", "B", "B4S", "T9H", "L", "PC", "A", "O"] {
            let msg: ServerMessage = line.parse().unwrap();
            assert_eq!(msg.to_string(), line);
        }
        assert!("".parse::<ServerMessage>().is_err());
        assert!("X".parse::<ServerMessage>().is_err());
        assert!("Lx".parse::<ServerMessage>().is_err());
        assert!("H2S3".parse::<ServerMessage>().is_err());
        assert!("P?".parse::<ServerMessage>().is_err());
    }
}
