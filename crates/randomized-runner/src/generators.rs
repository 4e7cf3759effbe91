//! Random value helpers bound to the current randomized context.
//!
//! The context-bound functions draw from the innermost [`Randomness`] of
//! the calling thread, so values are reproducible from the reported seed.
//! The `*_from` functions take an explicit generator instead.

use rand::seq::{IteratorRandom, SliceRandom};
use rand::Rng;

use crate::context::RandomizedContext;
use crate::result::{RunnerError, RunnerResult};

/// Next random `u64` of the current context
pub fn random_u64() -> RunnerResult<u64> {
    RandomizedContext::current()?.with_random(|r| r.gen())
}

/// Next random `bool` of the current context
pub fn random_bool() -> RunnerResult<bool> {
    RandomizedContext::current()?.with_random(|r| r.gen())
}

/// Random integer in `min..=max` from the current context
pub fn random_int_between(min: i64, max: i64) -> RunnerResult<i64> {
    if min > max {
        return Err(RunnerError::invalid_argument(format!(
            "min must be <= max: {min} > {max}"
        )));
    }
    RandomizedContext::current()?.with_random(|r| r.gen_range(min..=max))
}

/// Seed chain of the calling thread, bottom first
pub fn current_seed_chain() -> RunnerResult<Vec<u64>> {
    RandomizedContext::current()?.seed_chain()
}

/// Pick a random element of a slice
pub fn random_from<'a, T, R: Rng + ?Sized>(rng: &mut R, items: &'a [T]) -> RunnerResult<&'a T> {
    items
        .choose(rng)
        .ok_or_else(|| RunnerError::invalid_argument("Can't pick a random object from an empty slice"))
}

/// Pick a random element of an iterator
pub fn random_from_iter<I, R>(rng: &mut R, items: I) -> RunnerResult<I::Item>
where
    I: IntoIterator,
    R: Rng + ?Sized,
{
    items
        .into_iter()
        .choose(rng)
        .ok_or_else(|| RunnerError::invalid_argument("Can't pick a random object from an empty collection"))
}

/// Pick a random element of a slice using the current context
pub fn random_pick<T: Clone>(items: &[T]) -> RunnerResult<T> {
    RandomizedContext::current()?.with_random(|r| random_from(r, items).cloned())?
}
