//! Deterministic random streams for dice, card draws, and stub scoring.

use hmac::{Hmac, Mac};
use rand::rngs::SmallRng;
use rand::{Rng, RngCore, SeedableRng};
use sha2::Sha256;

use crate::constants::DIE_FACES;

/// Independent RNG streams derived from one session seed.
///
/// Each stream is keyed by its domain tag, so drawing extra cards never shifts
/// the dice sequence and vice versa.
#[derive(Debug, Clone)]
pub struct RngBundle {
    dice: CountingRng<SmallRng>,
    cards: CountingRng<SmallRng>,
    scoring: CountingRng<SmallRng>,
}

impl RngBundle {
    /// Construct the bundle from a user-visible seed.
    #[must_use]
    pub fn from_user_seed(seed: u64) -> Self {
        Self {
            dice: CountingRng::new(derive_stream_seed(seed, b"dice")),
            cards: CountingRng::new(derive_stream_seed(seed, b"cards")),
            scoring: CountingRng::new(derive_stream_seed(seed, b"scoring")),
        }
    }

    pub const fn dice(&mut self) -> &mut CountingRng<SmallRng> {
        &mut self.dice
    }

    pub const fn cards(&mut self) -> &mut CountingRng<SmallRng> {
        &mut self.cards
    }

    pub const fn scoring(&mut self) -> &mut CountingRng<SmallRng> {
        &mut self.scoring
    }

    /// Roll two fair dice from the dice stream.
    pub fn roll_pair(&mut self) -> (u8, u8) {
        let first = self.dice.gen_range(1..=DIE_FACES);
        let second = self.dice.gen_range(1..=DIE_FACES);
        (first, second)
    }

    /// Uniform index into a pool of `len` items from the card stream.
    pub fn pick_index(&mut self, len: usize) -> Option<usize> {
        (len > 0).then(|| self.cards.gen_range(0..len))
    }
}

/// Counting wrapper so tests can assert how many draws a stream served.
#[derive(Debug, Clone)]
pub struct CountingRng<R> {
    rng: R,
    draws: u64,
}

impl CountingRng<SmallRng> {
    fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            draws: 0,
        }
    }
}

impl<R: RngCore> CountingRng<R> {
    #[must_use]
    pub const fn draws(&self) -> u64 {
        self.draws
    }
}

impl<R: RngCore> RngCore for CountingRng<R> {
    fn next_u32(&mut self) -> u32 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.draws = self.draws.saturating_add(1);
        self.rng.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.draws = self.draws.saturating_add(1);
        self.rng.try_fill_bytes(dest)
    }
}

fn derive_stream_seed(user_seed: u64, domain_tag: &[u8]) -> u64 {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(&user_seed.to_le_bytes()) else {
        return user_seed;
    };
    mac.update(domain_tag);
    let digest = mac.finalize().into_bytes();
    let mut seed_bytes = [0_u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed_bytes)
}
