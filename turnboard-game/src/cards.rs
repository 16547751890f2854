//! Landing resolution: which card a square shows and which modifiers it arms.

use log::debug;

use crate::board::{Board, ChanceKind, SquareKind};
use crate::config::{EngineConfig, ZoneEffect};
use crate::data::{Card, CardDeck, CardKind};
use crate::resources::{Resources, ScoreDelta};
use crate::rng::RngBundle;
use crate::state::{ActiveCard, GameMode, Session};

/// Modifiers a landing arms for the upcoming decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Arming {
    pub risk: bool,
    pub multiplier: Option<u8>,
    pub broadcast: bool,
}

/// Everything a landing changes before the decision phase.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    /// Card to decide on. `None` means the square is a pass-through.
    pub card: Option<ActiveCard>,
    /// Flat zone delta applied immediately.
    pub flat_delta: Option<ScoreDelta>,
    pub arming: Arming,
    /// Landing puts the team into burnout.
    pub burnout: bool,
}

impl Resolution {
    #[must_use]
    pub const fn is_pass_through(&self) -> bool {
        self.card.is_none()
    }
}

/// Inputs for resolving one landing.
#[derive(Debug, Clone, Copy)]
pub struct LandingContext<'a> {
    pub board: &'a Board,
    pub deck: &'a CardDeck,
    pub session: &'a Session,
    pub config: &'a EngineConfig,
}

impl LandingContext<'_> {
    /// Resolve a landing on `square`.
    pub fn resolve(&self, square: usize, rng: &mut RngBundle) -> Resolution {
        let square = square % self.board.len();
        let kind = self.board.kind_at(square);
        let mut resolution = Resolution::default();

        if self.session.mode.is_free_form()
            && let Some(effect) = self.config.freeform.effect_at(square)
        {
            match effect {
                ZoneEffect::Penalty => {
                    resolution.flat_delta = Some(Resources::uniform(self.config.flat_penalty));
                    return resolution;
                }
                ZoneEffect::Bonus => {
                    resolution.flat_delta = Some(Resources::uniform(self.config.flat_bonus));
                    return resolution;
                }
                ZoneEffect::Multiplier { factor } => resolution.arming.multiplier = Some(factor),
                ZoneEffect::Broadcast => resolution.arming.broadcast = true,
            }
        }

        let chance_kind = self.board.chance_kind_at(square);
        let card = match kind {
            SquareKind::Start => None,
            SquareKind::City => self.competency_card(square),
            SquareKind::Chance => self.draw(CardKind::Event, rng, false),
            SquareKind::Fund => self.draw(CardKind::Fund, rng, true),
            SquareKind::Challenge => self.draw(CardKind::Challenge, rng, true),
            SquareKind::Tour => self.draw(CardKind::Tour, rng, true),
            SquareKind::Burnout => {
                resolution.burnout = true;
                self.draw(CardKind::Burnout, rng, true)
            }
        };

        if card.is_none() {
            resolution.arming = Arming::default();
        } else if kind == SquareKind::Chance {
            resolution.arming.risk = chance_kind == Some(ChanceKind::Risk);
        }

        debug!(
            "square {square} ({kind}) resolved to {:?}",
            card.map(|card| card.id.as_str())
        );
        resolution.card = card.map(|card| ActiveCard {
            card: card.clone(),
            square,
            square_kind: kind,
            chance_kind,
        });
        resolution
    }

    fn competency_card(&self, square: usize) -> Option<&Card> {
        match self.session.mode {
            GameMode::FreeForm => self.session.assigned_card(square, self.deck),
            mode @ (GameMode::Foundation | GameMode::Leadership) => {
                let tagged = self
                    .deck
                    .of_kind(CardKind::Competency)
                    .filter(move |card| card.supports_mode(mode));
                let mut fallback = None;
                for card in tagged {
                    if card.squares.contains(&square) {
                        return Some(card);
                    }
                    fallback.get_or_insert(card);
                }
                fallback
            }
        }
    }

    /// Random draw from session overrides of `kind`; otherwise the base deck,
    /// either uniformly or its first card when `first_fallback` is set.
    fn draw(&self, kind: CardKind, rng: &mut RngBundle, first_fallback: bool) -> Option<&Card> {
        let overrides: Vec<&Card> = self.session.overrides_of_kind(kind).collect();
        if !overrides.is_empty() {
            return rng.pick_index(overrides.len()).map(|idx| overrides[idx]);
        }
        if first_fallback {
            return self.deck.of_kind(kind).next();
        }
        let base: Vec<&Card> = self.deck.of_kind(kind).collect();
        rng.pick_index(base.len()).map(|idx| base[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessCode;
    use crate::data::CardOption;

    fn session(mode: GameMode) -> Session {
        let code: AccessCode = "111111".parse().unwrap();
        Session::new("s", "Demo", mode, code, 0)
    }

    fn card(id: &str, kind: CardKind) -> Card {
        Card {
            id: id.into(),
            kind,
            title: id.into(),
            situation: format!("situation {id}"),
            options: vec![CardOption {
                id: "a".into(),
                text: "Option A".into(),
            }],
            modes: Vec::new(),
            squares: Vec::new(),
        }
    }

    fn resolve(session: &Session, deck: &CardDeck, square: usize) -> Resolution {
        let board = Board::standard();
        let config = EngineConfig::default();
        let ctx = LandingContext {
            board: &board,
            deck,
            session,
            config: &config,
        };
        ctx.resolve(square, &mut RngBundle::from_user_seed(1))
    }

    #[test]
    fn start_square_is_pass_through() {
        let out = resolve(&session(GameMode::Foundation), &CardDeck::standard(), 0);
        assert!(out.is_pass_through());
        assert_eq!(out.arming, Arming::default());
    }

    #[test]
    fn city_uses_mode_mapping_then_falls_back() {
        let mut mapped = card("mapped", CardKind::Competency);
        mapped.modes = vec![GameMode::Leadership];
        mapped.squares = vec![4];
        let mut first = card("first", CardKind::Competency);
        first.modes = vec![GameMode::Leadership];
        first.squares = vec![1];
        let mut other_mode = card("other", CardKind::Competency);
        other_mode.modes = vec![GameMode::Foundation];
        other_mode.squares = vec![6];
        let deck = CardDeck::from_cards(vec![first, mapped, other_mode]);
        let session = session(GameMode::Leadership);

        let hit = resolve(&session, &deck, 4).card.unwrap();
        assert_eq!(hit.card.id, "mapped");
        let fallback = resolve(&session, &deck, 6).card.unwrap();
        assert_eq!(fallback.card.id, "first");
    }

    #[test]
    fn free_form_city_needs_an_assignment() {
        let deck = CardDeck::from_cards(vec![card("assigned", CardKind::Competency)]);
        let mut session = session(GameMode::FreeForm);
        assert!(resolve(&session, &deck, 1).is_pass_through());
        session.square_assignments.insert(1, "assigned".into());
        assert_eq!(resolve(&session, &deck, 1).card.unwrap().card.id, "assigned");
    }

    #[test]
    fn chance_sub_type_follows_ordinal() {
        let deck = CardDeck::from_cards(vec![card("e1", CardKind::Event)]);
        let session = session(GameMode::Foundation);
        let lottery = resolve(&session, &deck, 3);
        assert_eq!(
            lottery.card.as_ref().unwrap().chance_kind,
            Some(ChanceKind::Lottery)
        );
        assert!(!lottery.arming.risk);
        let risk = resolve(&session, &deck, 11);
        assert_eq!(risk.card.as_ref().unwrap().chance_kind, Some(ChanceKind::Risk));
        assert!(risk.arming.risk);
    }

    #[test]
    fn overrides_replace_base_fund_cards() {
        let deck = CardDeck::from_cards(vec![
            card("base-1", CardKind::Fund),
            card("base-2", CardKind::Fund),
        ]);
        let plain = session(GameMode::Foundation);
        assert_eq!(resolve(&plain, &deck, 5).card.unwrap().card.id, "base-1");

        let mut custom = session(GameMode::Foundation);
        custom.card_overrides.push(card("custom", CardKind::Fund));
        assert_eq!(resolve(&custom, &deck, 5).card.unwrap().card.id, "custom");
    }

    #[test]
    fn burnout_flags_the_team() {
        let out = resolve(&session(GameMode::Foundation), &CardDeck::standard(), 16);
        assert!(out.burnout);
        assert_eq!(out.card.unwrap().square_kind, SquareKind::Burnout);
    }

    #[test]
    fn free_form_zones_arm_or_short_circuit() {
        let deck = CardDeck::standard();
        let session = session(GameMode::FreeForm);

        let penalty = resolve(&session, &deck, 16);
        assert!(penalty.is_pass_through());
        assert_eq!(penalty.flat_delta, Some(Resources::uniform(-2)));
        assert!(!penalty.burnout);

        let doubled = resolve(&session, &deck, 5);
        assert_eq!(doubled.arming.multiplier, Some(2));
        assert!(doubled.card.is_some());

        let broadcast = resolve(&session, &deck, 13);
        assert!(broadcast.arming.broadcast);
    }

    #[test]
    fn missing_pool_is_pass_through() {
        let out = resolve(&session(GameMode::Foundation), &CardDeck::empty(), 21);
        assert!(out.is_pass_through());
    }
}
