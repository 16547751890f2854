use serde::{Deserialize, Serialize};
use std::fmt;

use crate::state::GameMode;

const STANDARD_DECK_DATA: &str = include_str!("../assets/cards.json");

/// Card pools. Every card-bearing square type draws from exactly one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardKind {
    Competency,
    Event,
    Fund,
    Challenge,
    Tour,
    Burnout,
}

impl CardKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Competency => "competency",
            Self::Event => "event",
            Self::Fund => "fund",
            Self::Challenge => "challenge",
            Self::Tour => "tour",
            Self::Burnout => "burnout",
        }
    }
}

impl fmt::Display for CardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A selectable answer on a situation card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardOption {
    pub id: String,
    pub text: String,
}

/// A situation card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub kind: CardKind,
    pub title: String,
    pub situation: String,
    /// Cards without options are answered with free text only.
    #[serde(default)]
    pub options: Vec<CardOption>,
    /// Game modes a competency card belongs to. Empty means every mode.
    #[serde(default)]
    pub modes: Vec<GameMode>,
    /// Competency squares this card is printed for.
    #[serde(default)]
    pub squares: Vec<usize>,
}

impl Card {
    #[must_use]
    pub fn option(&self, option_id: &str) -> Option<&CardOption> {
        self.options.iter().find(|option| option.id == option_id)
    }

    #[must_use]
    pub fn supports_mode(&self, mode: GameMode) -> bool {
        self.modes.is_empty() || self.modes.contains(&mode)
    }
}

/// Container for the base card catalogue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CardDeck {
    pub cards: Vec<Card>,
}

impl CardDeck {
    /// Create an empty deck (useful for tests)
    #[must_use]
    pub fn empty() -> Self {
        Self { cards: Vec::new() }
    }

    /// Load a deck from a JSON string
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed into valid card data.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn from_cards(cards: Vec<Card>) -> Self {
        Self { cards }
    }

    /// Deck bundled with the crate.
    #[must_use]
    pub fn standard() -> Self {
        Self::from_json(STANDARD_DECK_DATA).unwrap_or_default()
    }

    pub fn of_kind(&self, kind: CardKind) -> impl Iterator<Item = &Card> + '_ {
        self.cards.iter().filter(move |card| card.kind == kind)
    }

    #[must_use]
    pub fn by_id(&self, id: &str) -> Option<&Card> {
        self.cards.iter().find(|card| card.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_deck_from_json() {
        let json = r#"{
            "cards": [
                {
                    "id": "c1",
                    "kind": "competency",
                    "title": "Listening Tour",
                    "situation": "A stakeholder feels unheard.",
                    "modes": ["foundation"],
                    "squares": [1],
                    "options": [
                        { "id": "a", "text": "Schedule a listening session" }
                    ]
                },
                {
                    "id": "e1",
                    "kind": "event",
                    "title": "Windfall",
                    "situation": "A grant arrives early."
                }
            ]
        }"#;

        let deck = CardDeck::from_json(json).unwrap();
        assert_eq!(deck.cards.len(), 2);
        assert_eq!(deck.of_kind(CardKind::Event).count(), 1);
        let card = deck.by_id("c1").unwrap();
        assert!(card.supports_mode(GameMode::Foundation));
        assert!(!card.supports_mode(GameMode::Leadership));
        assert_eq!(card.option("a").unwrap().text, "Schedule a listening session");
        assert!(deck.by_id("e1").unwrap().supports_mode(GameMode::Leadership));
    }

    #[test]
    fn standard_deck_covers_every_pool() {
        let deck = CardDeck::standard();
        for kind in [
            CardKind::Competency,
            CardKind::Event,
            CardKind::Fund,
            CardKind::Challenge,
            CardKind::Tour,
            CardKind::Burnout,
        ] {
            assert!(deck.of_kind(kind).count() > 0, "missing {kind} cards");
        }
    }
}
