// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use rand::{rngs::StdRng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Seed used by the reference experiments when nothing else is configured.
pub const DEFAULT_SEED: u64 = 123;

/// Seeding policy for every random draw made while building a landscape.
///
/// The configuration is passed explicitly to the components that sample
/// (direction generation, reference probes) instead of living in a global.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeterminismConfig {
    /// Whether RNGs are derived from `base_seed`. When disabled they are
    /// seeded from operating-system entropy.
    pub enabled: bool,
    /// Base seed used to derive per-component seeds.
    pub base_seed: u64,
}

impl Default for DeterminismConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_seed: DEFAULT_SEED,
        }
    }
}

impl DeterminismConfig {
    /// Deterministic configuration rooted at `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self {
            enabled: true,
            base_seed: seed,
        }
    }

    /// Reads `LANDSCAPE_DETERMINISTIC` and `LANDSCAPE_SEED`.
    ///
    /// Setting only `LANDSCAPE_SEED` implies determinism; an explicit falsy
    /// `LANDSCAPE_DETERMINISTIC` wins over it.
    pub fn from_env() -> Self {
        let seed = std::env::var("LANDSCAPE_SEED")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok());

        let enabled = match std::env::var("LANDSCAPE_DETERMINISTIC") {
            Ok(v) => !matches!(v.trim(), "0" | "false" | "False" | "off" | "OFF"),
            Err(_) => seed.is_some(),
        };

        Self {
            enabled,
            base_seed: seed.unwrap_or(DEFAULT_SEED),
        }
    }

    /// Derives a stable seed for a component label.
    pub fn seed_for<L: Hash>(&self, label: L) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.base_seed.hash(&mut hasher);
        label.hash(&mut hasher);
        hasher.finish()
    }

    /// Returns an RNG for `label`, falling back to entropy when determinism
    /// is disabled.
    pub fn rng_for(&self, label: &str) -> StdRng {
        if self.enabled {
            StdRng::seed_from_u64(self.seed_for(label))
        } else {
            StdRng::from_entropy()
        }
    }

    /// Returns an RNG seeded from an explicit seed when one is provided,
    /// otherwise defers to [`DeterminismConfig::rng_for`].
    pub fn rng_from_optional(&self, seed: Option<u64>, label: &str) -> StdRng {
        match seed {
            Some(value) => StdRng::seed_from_u64(value),
            None => self.rng_for(label),
        }
    }
}
