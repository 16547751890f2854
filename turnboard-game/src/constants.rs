//! Centralized board rules and tuning defaults for Turnboard sessions.
//!
//! Facilitator-tunable values are surfaced through [`crate::config::EngineConfig`];
//! the constants here are the defaults it falls back to plus the fixed rules of
//! the board that every client must agree on.

// Board ------------------------------------------------------------------
pub const BOARD_SIZE: usize = 32;
pub const START_SQUARE: usize = 0;
pub const DIE_FACES: u8 = 6;
pub const MANUAL_TOTAL_MIN: u8 = 2;
pub const MANUAL_TOTAL_MAX: u8 = 12;

// Turn pacing ------------------------------------------------------------
pub const DECISION_TIMER_UNITS: u32 = 120;
pub const STEP_DELAY_MS: u64 = 350;
pub const MAX_CONSECUTIVE_REROLLS: u8 = 12;

// Lap bonus --------------------------------------------------------------
pub const LAP_BONUS_POINTS: i32 = 2;
pub const LAP_RESOURCE_CREDIT: i32 = 3;

// Scoring ----------------------------------------------------------------
pub const SCORE_DELTA_MIN: i32 = -10;
pub const SCORE_DELTA_MAX: i32 = 10;
pub const FREEFORM_FLAT_PENALTY: i32 = -2;
pub const FREEFORM_FLAT_BONUS: i32 = 2;

// Starting resources ------------------------------------------------------
pub const STARTING_RESOURCE: i32 = 10;
pub const STARTING_DIMENSION: i32 = 5;

// Synchronization --------------------------------------------------------
pub const GUARD_WINDOW_MS: i64 = 2_000;

// Bootstrap and client persistence ----------------------------------------
pub const ACCESS_CODE_LEN: usize = 6;
pub const PARTICIPANT_KEY: &str = "turnboard.participant";

// Game log ---------------------------------------------------------------
pub const LOG_HISTORY_LIMIT: usize = 200;
