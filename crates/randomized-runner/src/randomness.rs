//! Deterministic randomness source and seed-chain encoding.
//!
//! Every level of a run (suite, test method, iteration) owns a
//! [`Randomness`]: a 64-bit seed plus a ChaCha8 generator seeded from it.
//! Child seeds are derived with [`derive`], a pure function of the parent
//! seed and a stable discriminant, so reordering methods never changes the
//! seed a method receives.
//!
//! Seed chains are rendered as uppercase hex values joined by `:` and
//! wrapped in brackets, e.g. `[DEADBEEF:1A2B]`.

use std::fmt;
use std::str::FromStr;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::result::{RunnerError, RunnerResult};

/// Finalization step of MurmurHash3 (64-bit).
#[must_use]
pub const fn mix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Stable 64-bit hash of a string (FNV-1a followed by [`mix64`]).
///
/// Unlike `std`'s `DefaultHasher` this is identical across processes,
/// platforms and compiler versions.
#[must_use]
pub fn hash_str(s: &str) -> u64 {
    let mut h = FNV_OFFSET;
    for b in s.bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(FNV_PRIME);
    }
    mix64(h)
}

/// Derive a child seed from a base seed and a discriminant.
#[must_use]
pub const fn derive(base: u64, discriminant: u64) -> u64 {
    base ^ mix64(discriminant)
}

/// Seed assigned to a method when no annotation says otherwise.
#[must_use]
pub fn method_seed(runner_seed: u64, method_name: &str) -> u64 {
    runner_seed ^ hash_str(method_name)
}

/// Seed of one iteration of a (method, seed) family.
#[must_use]
pub const fn iteration_seed(base: u64, iteration: u32, fixed: bool) -> u64 {
    if fixed {
        base
    } else {
        derive(base, iteration as u64)
    }
}

/// A seed plus the generator derived from it.
///
/// Identity is the seed: two instances with equal seeds produce identical
/// output sequences from the point of construction.
#[derive(Clone)]
pub struct Randomness {
    seed: u64,
    rng: ChaCha8Rng,
}

impl Randomness {
    /// Create a randomness source for a seed
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// The seed this source was created from
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// A fresh source with the same seed (generator rewound to the start)
    #[must_use]
    pub fn fork(&self) -> Self {
        Self::new(self.seed)
    }

    /// Mutable access to the underlying generator
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }
}

impl fmt::Debug for Randomness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Randomness[seed={}]", format_seed(self.seed))
    }
}

impl PartialEq for Randomness {
    fn eq(&self, other: &Self) -> bool {
        self.seed == other.seed
    }
}

impl Eq for Randomness {}

impl RngCore for Randomness {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}

/// Format a single seed as uppercase hex.
#[must_use]
pub fn format_seed(seed: u64) -> String {
    format!("{seed:X}")
}

/// Format a chain of seeds: `[A:B:...]`.
#[must_use]
pub fn format_seed_chain(seeds: &[u64]) -> String {
    let parts: Vec<String> = seeds.iter().map(|s| format_seed(*s)).collect();
    format!("[{}]", parts.join(":"))
}

/// Parse one hex seed.
pub fn parse_seed(text: &str) -> RunnerResult<u64> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.len() > 16 {
        return Err(RunnerError::config(format!(
            "Expected a 64-bit hexadecimal seed: '{text}'"
        )));
    }
    u64::from_str_radix(trimmed, 16)
        .map_err(|e| RunnerError::config(format!("Invalid seed '{text}': {e}")))
}

/// Parse a colon-separated seed chain of any positive length.
///
/// Surrounding brackets are optional.
pub fn parse_seed_chain(text: &str) -> RunnerResult<Vec<u64>> {
    let mut body = text.trim();
    if let Some(stripped) = body.strip_prefix('[') {
        body = stripped
            .strip_suffix(']')
            .ok_or_else(|| RunnerError::config(format!("Unbalanced brackets in seed chain: {text}")))?;
    }
    if body.trim().is_empty() {
        return Err(RunnerError::config("Empty seed chain"));
    }
    body.split(':').map(parse_seed).collect()
}

/// A validated one- or two-element seed chain: `suite-seed[:method-seed]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeedChain {
    /// Seed of the runner (suite level)
    pub runner: u64,
    /// Optional method-level seed; when present it is applied to every method
    pub method: Option<u64>,
}

impl SeedChain {
    /// Chain holding only a runner seed
    #[must_use]
    pub const fn runner(seed: u64) -> Self {
        Self {
            runner: seed,
            method: None,
        }
    }

    /// Chain with both runner and method seeds
    #[must_use]
    pub const fn with_method(runner: u64, method: u64) -> Self {
        Self {
            runner,
            method: Some(method),
        }
    }

    /// Parse and validate the element count.
    pub fn parse(text: &str) -> RunnerResult<Self> {
        let seeds = parse_seed_chain(text)?;
        match seeds.as_slice() {
            [runner] => Ok(Self::runner(*runner)),
            [runner, method] => Ok(Self::with_method(*runner, *method)),
            _ => Err(RunnerError::config(format!(
                "Seed chain must have one or two elements, got {}: {text}",
                seeds.len()
            ))),
        }
    }

    /// The chain as a seed list
    #[must_use]
    pub fn seeds(&self) -> Vec<u64> {
        let mut seeds = vec![self.runner];
        seeds.extend(self.method);
        seeds
    }
}

impl FromStr for SeedChain {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SeedChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_seed_chain(&self.seeds()))
    }
}
