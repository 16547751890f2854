//! Turnboard Game Engine
//!
//! Platform-agnostic core for facilitated Turnboard board sessions: the turn
//! state machine, movement and card resolution, scoring modifiers, and the
//! synchronization rules every console applies to the shared session document.
//! With the default `async` feature the crate also ships the tokio client
//! runtime and the channel, repository, and scoring seams it drives.

pub mod access;
pub mod board;
pub mod cards;
pub mod clock;
pub mod config;
pub mod constants;
pub mod data;
pub mod engine;
pub mod movement;
pub mod participant;
#[cfg(feature = "async")]
pub mod repository;
pub mod resources;
pub mod rng;
#[cfg(feature = "async")]
pub mod runtime;
pub mod scoring;
pub mod state;
pub mod sync;
pub mod turn;

// Re-export commonly used types
pub use access::{AccessCode, AccessCodeError};
pub use board::{Board, ChanceKind, SquareKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EngineConfig, FreeFormZones, LapBonus, SyncConfig, ZoneEffect};
pub use data::{Card, CardDeck, CardKind, CardOption};
pub use engine::{Command, Effect, EffectList, ManualRoll, TurnEngine};
pub use participant::{KeyValueStore, MemoryStore, Participant, ParticipantError, ParticipantStore};
#[cfg(feature = "async")]
pub use repository::{InMemorySessionRepository, RepositoryError, SessionRepository};
pub use resources::{Dimension, Resources, ScoreDelta};
pub use rng::RngBundle;
#[cfg(feature = "async")]
pub use runtime::{ClientRole, ClientRuntime, RuntimeOptions, RuntimeOutcome, RuntimeReport};
#[cfg(feature = "async")]
pub use scoring::ScoringService;
pub use scoring::{ArmedModifiers, ScoringError, ScoringRequest, ScoringResponse, StubScoringService};
pub use state::{
    ActiveCard, ChosenOption, GameMode, GameState, Phase, ScoringOutcome, Session, SessionStatus,
    Standing, StatePatch, Team, TurnRecord,
};
pub use sync::{AuthorityGuard, DiscardReason, GuardDecision, GuardStats};
pub use turn::CommandError;

/// Name under which [`TurnboardEngine`] asks its loader for the engine tuning.
pub const ENGINE_CONFIG_NAME: &str = "engine";

/// Trait for abstracting data loading operations.
/// Platform-specific implementations should provide this.
pub trait DataLoader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the base card deck.
    ///
    /// # Errors
    ///
    /// Returns an error if the deck cannot be loaded.
    fn load_card_deck(&self) -> Result<CardDeck, Self::Error>;

    /// Load configuration data by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or parsed.
    fn load_config<T>(&self, config_name: &str) -> Result<T, Self::Error>
    where
        T: serde::de::DeserializeOwned;
}

/// Loader backed by the deck compiled into the crate; every config resolves
/// to its serde defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledData;

impl DataLoader for BundledData {
    type Error = serde_json::Error;

    fn load_card_deck(&self) -> Result<CardDeck, Self::Error> {
        Ok(CardDeck::standard())
    }

    fn load_config<T>(&self, _config_name: &str) -> Result<T, Self::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_str("{}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SetupError<E: std::error::Error + 'static> {
    #[error("loading session data failed: {0}")]
    Data(#[source] E),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Builds turn engines for sessions from one data source.
pub struct TurnboardEngine<L>
where
    L: DataLoader,
{
    data_loader: L,
}

impl<L> TurnboardEngine<L>
where
    L: DataLoader,
{
    /// Create a new engine factory with the provided data loader
    pub const fn new(data_loader: L) -> Self {
        Self { data_loader }
    }

    /// Open a session on the standard board.
    ///
    /// # Errors
    ///
    /// Returns an error if the deck or configuration cannot be loaded, or the
    /// configuration is invalid.
    pub fn open(&self, session: Session) -> Result<TurnEngine, SetupError<L::Error>> {
        let deck = self
            .data_loader
            .load_card_deck()
            .map_err(SetupError::Data)?;
        let config: EngineConfig = self
            .data_loader
            .load_config(ENGINE_CONFIG_NAME)
            .map_err(SetupError::Data)?;
        Ok(TurnEngine::new(session, deck, config)?)
    }
}
