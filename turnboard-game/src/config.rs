//! Engine and synchronization configuration.
//!
//! Every field has a serde default so facilitators can ship partial JSON
//! overrides; `validate` enforces the invariants the engine relies on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::board::Board;
use crate::constants::{
    DECISION_TIMER_UNITS, FREEFORM_FLAT_BONUS, FREEFORM_FLAT_PENALTY, GUARD_WINDOW_MS,
    LAP_BONUS_POINTS, LAP_RESOURCE_CREDIT, MAX_CONSECUTIVE_REROLLS, STEP_DELAY_MS,
};
use crate::resources::Resources;

/// Errors raised when configuration invariants are violated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("board must contain at least one square")]
    EmptyBoard,
    #[error("square 0 must be the start square")]
    MissingStartSquare,
    #[error("decision timer must be at least one unit")]
    ZeroDecisionTimer,
    #[error("re-roll cap must be at least one")]
    ZeroRerollCap,
    #[error("guard window must not be negative (got {value} ms)")]
    NegativeGuardWindow { value: i64 },
    #[error("{field} has the wrong sign (got {value})")]
    FlatSign { field: &'static str, value: i32 },
    #[error("square {square} arms an unsupported multiplier x{factor}")]
    InvalidMultiplier { square: usize, factor: u8 },
    #[error("zone on square {square} is outside a {board_size}-square board")]
    ZoneOutOfBounds { square: usize, board_size: usize },
}

/// Square-indexed side effects that only apply in free-form mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ZoneEffect {
    /// Flat penalty on every dimension; no card is shown.
    Penalty,
    /// Flat bonus on every dimension; no card is shown.
    Bonus,
    /// Arms a multiplier for the next scored decision.
    Multiplier { factor: u8 },
    /// Arms broadcast mode for the next scored decision.
    Broadcast,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeFormZones {
    #[serde(default)]
    pub zones: BTreeMap<usize, ZoneEffect>,
}

impl FreeFormZones {
    #[must_use]
    pub fn effect_at(&self, square: usize) -> Option<ZoneEffect> {
        self.zones.get(&square).copied()
    }

    fn validate(&self, board_size: usize) -> Result<(), ConfigError> {
        for (&square, effect) in &self.zones {
            if square >= board_size {
                return Err(ConfigError::ZoneOutOfBounds { square, board_size });
            }
            if let ZoneEffect::Multiplier { factor } = effect
                && !matches!(factor, 2 | 3)
            {
                return Err(ConfigError::InvalidMultiplier {
                    square,
                    factor: *factor,
                });
            }
        }
        Ok(())
    }
}

impl Default for FreeFormZones {
    fn default() -> Self {
        Self {
            zones: BTreeMap::from([
                (5, ZoneEffect::Multiplier { factor: 2 }),
                (13, ZoneEffect::Broadcast),
                (16, ZoneEffect::Penalty),
                (21, ZoneEffect::Multiplier { factor: 3 }),
                (24, ZoneEffect::Bonus),
            ]),
        }
    }
}

/// Reward for passing or landing on the start square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LapBonus {
    /// Added to all five dimensions.
    #[serde(default = "LapBonus::default_points")]
    pub points: i32,
    /// Extra resource/time credit on top of `points`.
    #[serde(default = "LapBonus::default_resource_credit")]
    pub resource_credit: i32,
}

impl LapBonus {
    const fn default_points() -> i32 {
        LAP_BONUS_POINTS
    }

    const fn default_resource_credit() -> i32 {
        LAP_RESOURCE_CREDIT
    }

    #[must_use]
    pub fn delta(&self) -> Resources {
        let mut delta = Resources::uniform(self.points);
        delta.resource = delta.resource.saturating_add(self.resource_credit);
        delta
    }
}

impl Default for LapBonus {
    fn default() -> Self {
        Self {
            points: Self::default_points(),
            resource_credit: Self::default_resource_credit(),
        }
    }
}

/// Authority guard tuning. Both knobs are heuristics, not correctness guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "SyncConfig::default_guard_window_ms")]
    pub guard_window_ms: i64,
    #[serde(default = "SyncConfig::default_dedupe")]
    pub dedupe_equal_timestamps: bool,
}

impl SyncConfig {
    const fn default_guard_window_ms() -> i64 {
        GUARD_WINDOW_MS
    }

    const fn default_dedupe() -> bool {
        true
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            guard_window_ms: Self::default_guard_window_ms(),
            dedupe_equal_timestamps: Self::default_dedupe(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "EngineConfig::default_step_delay_ms")]
    pub step_delay_ms: u64,
    #[serde(default = "EngineConfig::default_decision_timer_units")]
    pub decision_timer_units: u32,
    #[serde(default = "EngineConfig::default_max_consecutive_rerolls")]
    pub max_consecutive_rerolls: u8,
    #[serde(default)]
    pub lap_bonus: LapBonus,
    #[serde(default = "EngineConfig::default_flat_penalty")]
    pub flat_penalty: i32,
    #[serde(default = "EngineConfig::default_flat_bonus")]
    pub flat_bonus: i32,
    #[serde(default)]
    pub freeform: FreeFormZones,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl EngineConfig {
    const fn default_step_delay_ms() -> u64 {
        STEP_DELAY_MS
    }

    const fn default_decision_timer_units() -> u32 {
        DECISION_TIMER_UNITS
    }

    const fn default_max_consecutive_rerolls() -> u8 {
        MAX_CONSECUTIVE_REROLLS
    }

    const fn default_flat_penalty() -> i32 {
        FREEFORM_FLAT_PENALTY
    }

    const fn default_flat_bonus() -> i32 {
        FREEFORM_FLAT_BONUS
    }

    /// Load configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check the configuration against the board it will drive.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self, board: &Board) -> Result<(), ConfigError> {
        if board.is_empty() {
            return Err(ConfigError::EmptyBoard);
        }
        if self.decision_timer_units == 0 {
            return Err(ConfigError::ZeroDecisionTimer);
        }
        if self.max_consecutive_rerolls == 0 {
            return Err(ConfigError::ZeroRerollCap);
        }
        if self.sync.guard_window_ms < 0 {
            return Err(ConfigError::NegativeGuardWindow {
                value: self.sync.guard_window_ms,
            });
        }
        if self.flat_penalty > 0 {
            return Err(ConfigError::FlatSign {
                field: "flat_penalty",
                value: self.flat_penalty,
            });
        }
        if self.flat_bonus < 0 {
            return Err(ConfigError::FlatSign {
                field: "flat_bonus",
                value: self.flat_bonus,
            });
        }
        self.freeform.validate(board.len())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: Self::default_step_delay_ms(),
            decision_timer_units: Self::default_decision_timer_units(),
            max_consecutive_rerolls: Self::default_max_consecutive_rerolls(),
            lap_bonus: LapBonus::default(),
            flat_penalty: Self::default_flat_penalty(),
            flat_bonus: Self::default_flat_bonus(),
            freeform: FreeFormZones::default(),
            sync: SyncConfig::default(),
        }
    }
}
