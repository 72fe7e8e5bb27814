//! Deck store: the pre-shuffled decks loaded at startup, one 104-character
//! line per deck, shared read-only across every game session.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

use four99_protocol::{Deck, DeckParseError};

#[derive(Debug, Error)]
pub enum DeckError {
    #[error("cannot read deck file: {0}")]
    Unreadable(#[from] std::io::Error),
    #[error("deck file line {line}: {source}")]
    Malformed {
        line: usize,
        source: DeckParseError,
    },
    #[error("deck file contains no decks")]
    Empty,
}

#[derive(Debug)]
pub struct DeckStore {
    decks: Vec<Deck>,
}

impl DeckStore {
    /// Loads every deck from `path`. Any malformed line, or an empty file,
    /// rejects the whole source; the server must not start without a clean
    /// set of decks.
    pub fn load(path: &Path) -> Result<DeckStore, DeckError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader(reader: impl BufRead) -> Result<DeckStore, DeckError> {
        let mut decks = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let deck = Deck::parse(line.trim_end()).map_err(|source| DeckError::Malformed {
                line: index + 1,
                source,
            })?;
            decks.push(deck);
        }
        if decks.is_empty() {
            return Err(DeckError::Empty);
        }
        Ok(DeckStore { decks })
    }

    /// Returns the deck at `index` modulo the deck count, so sessions can
    /// step through decks forever.
    pub fn get(&self, index: usize) -> &Deck {
        &self.decks[index % self.decks.len()]
    }

    // emptiness is rejected at load time, so no is_empty pairing
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.decks.len()
    }
}
