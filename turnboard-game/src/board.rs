//! Board layout, square classification, and path arithmetic.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ConfigError;
use crate::constants::{BOARD_SIZE, START_SQUARE};
use crate::data::CardKind;

/// Square types printed on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SquareKind {
    /// Start square; passing or landing here grants the lap bonus.
    Start,
    /// Competency square named after a city.
    City,
    Chance,
    Fund,
    Challenge,
    Tour,
    Burnout,
}

impl SquareKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::City => "city",
            Self::Chance => "chance",
            Self::Fund => "fund",
            Self::Challenge => "challenge",
            Self::Tour => "tour",
            Self::Burnout => "burnout",
        }
    }

    /// Card pool a landing on this square draws from, if any.
    #[must_use]
    pub const fn card_kind(self) -> Option<CardKind> {
        match self {
            Self::Start => None,
            Self::City => Some(CardKind::Competency),
            Self::Chance => Some(CardKind::Event),
            Self::Fund => Some(CardKind::Fund),
            Self::Challenge => Some(CardKind::Challenge),
            Self::Tour => Some(CardKind::Tour),
            Self::Burnout => Some(CardKind::Burnout),
        }
    }
}

impl fmt::Display for SquareKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chance draws are split into a rewarding and a punishing flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChanceKind {
    Lottery,
    Risk,
}

impl ChanceKind {
    /// Chance squares alternate lottery/risk in board order.
    #[must_use]
    pub const fn from_ordinal(ordinal: usize) -> Self {
        if ordinal % 2 == 0 {
            Self::Lottery
        } else {
            Self::Risk
        }
    }
}

const STANDARD_LAYOUT: [SquareKind; BOARD_SIZE] = {
    use SquareKind::{Burnout, Challenge, Chance, City, Fund, Start, Tour};
    [
        Start, City, City, Chance, City, Fund, City, City, //
        Challenge, City, City, Chance, City, Tour, City, City, //
        Burnout, City, City, Chance, City, Fund, City, City, //
        Tour, City, City, Chance, City, Challenge, City, City,
    ]
};

/// Ordered ring of squares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    squares: Vec<SquareKind>,
}

impl Board {
    /// The 32-square board used by every shipped game mode.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            squares: STANDARD_LAYOUT.to_vec(),
        }
    }

    /// Build a custom ring.
    ///
    /// # Errors
    ///
    /// Returns an error if the ring is empty or square 0 is not the start square.
    pub fn from_squares(squares: Vec<SquareKind>) -> Result<Self, ConfigError> {
        if squares.is_empty() {
            return Err(ConfigError::EmptyBoard);
        }
        if squares[START_SQUARE] != SquareKind::Start {
            return Err(ConfigError::MissingStartSquare);
        }
        Ok(Self { squares })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.squares.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.squares.is_empty()
    }

    /// Square type at `index`, taken modulo the board size.
    #[must_use]
    pub fn kind_at(&self, index: usize) -> SquareKind {
        self.squares[index % self.squares.len()]
    }

    /// Position of a chance square among all chance squares.
    #[must_use]
    pub fn chance_ordinal(&self, index: usize) -> Option<usize> {
        let index = index % self.squares.len();
        if self.squares[index] != SquareKind::Chance {
            return None;
        }
        Some(
            self.squares[..index]
                .iter()
                .filter(|kind| **kind == SquareKind::Chance)
                .count(),
        )
    }

    #[must_use]
    pub fn chance_kind_at(&self, index: usize) -> Option<ChanceKind> {
        self.chance_ordinal(index).map(ChanceKind::from_ordinal)
    }

    /// Indexes of every competency square.
    pub fn city_squares(&self) -> impl Iterator<Item = usize> + '_ {
        self.squares
            .iter()
            .enumerate()
            .filter(|(_, kind)| **kind == SquareKind::City)
            .map(|(idx, _)| idx)
    }

    #[must_use]
    pub fn plan(&self, start: usize, steps: u8) -> Path {
        Path::new(start, steps, self.len())
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::standard()
    }
}

/// Precomputed result of moving `steps` squares from `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    pub start: usize,
    pub steps: u8,
    pub final_position: usize,
    /// True when the walk crosses or lands on the start square.
    pub wraps: bool,
}

impl Path {
    #[must_use]
    pub fn new(start: usize, steps: u8, board_size: usize) -> Self {
        let start = start % board_size;
        let travelled = start + usize::from(steps);
        Self {
            start,
            steps,
            final_position: travelled % board_size,
            wraps: travelled >= board_size,
        }
    }
}
