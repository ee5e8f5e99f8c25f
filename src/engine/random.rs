//! Cryptographically secure integer sampling for draws.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{AppError, Result};

/// Uniform integers in `[0, n)`.
///
/// Implementations must report entropy failures as
/// [`AppError::RandomnessUnavailable`] instead of falling back to a weaker source.
pub trait SecureRandom {
    fn next_below(&mut self, n: u64) -> Result<u64>;
}

/// Operating-system entropy via `OsRng`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom {
    rng: OsRng,
}

impl OsRandom {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureRandom for OsRandom {
    fn next_below(&mut self, n: u64) -> Result<u64> {
        if n == 0 {
            return Err(AppError::InvalidRange(n));
        }
        // Largest multiple of n that fits; values at or above it are rejected
        // so every residue is equally likely.
        let zone = u64::MAX - (u64::MAX % n);
        loop {
            let mut buf = [0u8; 8];
            self.rng
                .try_fill_bytes(&mut buf)
                .map_err(|e| AppError::RandomnessUnavailable(e.to_string()))?;
            let v = u64::from_le_bytes(buf);
            if v < zone {
                return Ok(v % n);
            }
        }
    }
}
