//! Client-local record of which team this device joined.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;

use crate::constants::PARTICIPANT_KEY;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub session_id: String,
    pub team_id: String,
    pub name: String,
}

/// Key-value storage available on the client (browser storage, a file, memory).
pub trait KeyValueStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn set(&mut self, key: &str, value: String) -> Result<(), Self::Error>;

    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn remove(&mut self, key: &str) -> Result<(), Self::Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum ParticipantError<E: std::error::Error + 'static> {
    #[error("participant store failed: {0}")]
    Store(#[source] E),
    #[error("stored participant is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Participant persistence under the fixed `turnboard.participant` key.
///
/// A missing key means the device has not joined a team. A corrupt value is
/// reported as an error rather than silently treated as "not joined".
#[derive(Debug, Default)]
pub struct ParticipantStore<S> {
    store: S,
}

impl<S: KeyValueStore> ParticipantStore<S> {
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// # Errors
    ///
    /// Returns an error if the store fails or the value cannot be parsed.
    pub fn load(&self) -> Result<Option<Participant>, ParticipantError<S::Error>> {
        let Some(raw) = self.store.get(PARTICIPANT_KEY).map_err(ParticipantError::Store)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn save(&mut self, participant: &Participant) -> Result<(), ParticipantError<S::Error>> {
        let raw = serde_json::to_string(participant)?;
        self.store
            .set(PARTICIPANT_KEY, raw)
            .map_err(ParticipantError::Store)
    }

    /// Forget the joined team.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn clear(&mut self) -> Result<(), ParticipantError<S::Error>> {
        self.store
            .remove(PARTICIPANT_KEY)
            .map_err(ParticipantError::Store)
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

/// In-process key-value store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl KeyValueStore for MemoryStore {
    type Error = Infallible;

    fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), Self::Error> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), Self::Error> {
        self.values.remove(key);
        Ok(())
    }
}
