//! Parameter generation for templated requests.
//!
//! A [`ParamStrategy`] supplies the randomized values a [`crate::RequestBuilder`]
//! interpolates into each request. Strategies are owned by a single virtual user
//! (the scheduler creates one per worker), so implementations need `Send` but
//! never have to synchronize internally.
use std::collections::VecDeque;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::error::ParamError;

/// Characters used by [`ParamStrategy::alphanumeric`].
pub const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Source of per-iteration request parameters.
pub trait ParamStrategy: Send {
    /// Integer in the inclusive range `[min, max]`.
    fn int_between(&mut self, min: i64, max: i64) -> Result<i64, ParamError>;

    /// String of `len` characters drawn from [`ALPHANUMERIC`].
    fn alphanumeric(&mut self, len: usize) -> Result<String, ParamError>;

    /// Index into a collection of `len` elements.
    fn choose(&mut self, len: usize) -> Result<usize, ParamError>;
}

/// [`ParamStrategy`] backed by a seedable [`StdRng`].
#[derive(Debug, Clone)]
pub struct RandomParams {
    rng: StdRng,
}

impl RandomParams {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Generator for one worker. With a base seed every worker gets its own
    /// reproducible stream; without one each worker is entropy-seeded.
    pub fn for_worker(seed: Option<u64>, worker: usize) -> Self {
        match seed {
            Some(seed) => Self::seeded(worker_seed(seed, worker)),
            None => Self::from_entropy(),
        }
    }
}

fn worker_seed(seed: u64, worker: usize) -> u64 {
    (worker as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ seed.rotate_left(17)
}

impl ParamStrategy for RandomParams {
    fn int_between(&mut self, min: i64, max: i64) -> Result<i64, ParamError> {
        if min > max {
            return Err(ParamError::EmptyRange { min, max });
        }
        Ok(self.rng.gen_range(min..=max))
    }

    fn alphanumeric(&mut self, len: usize) -> Result<String, ParamError> {
        Ok((0..len)
            .map(|_| ALPHANUMERIC[self.rng.gen_range(0..ALPHANUMERIC.len())] as char)
            .collect())
    }

    fn choose(&mut self, len: usize) -> Result<usize, ParamError> {
        if len == 0 {
            return Err(ParamError::EmptyChoice);
        }
        Ok(self.rng.gen_range(0..len))
    }
}

/// Deterministic [`ParamStrategy`] that replays fixed sequences of values.
///
/// Each kind of value has its own queue. Once a queue runs dry calls fail with
/// [`ParamError::Exhausted`], unless the strategy was built with
/// [`ScriptedParams::cycle`] in which case values are replayed from the start.
#[derive(Debug, Clone, Default)]
pub struct ScriptedParams {
    ints: VecDeque<i64>,
    strings: VecDeque<String>,
    choices: VecDeque<usize>,
    cycle: bool,
}

impl ScriptedParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ints(mut self, values: impl IntoIterator<Item = i64>) -> Self {
        self.ints.extend(values);
        self
    }

    pub fn strings<S: Into<String>>(mut self, values: impl IntoIterator<Item = S>) -> Self {
        self.strings.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn choices(mut self, values: impl IntoIterator<Item = usize>) -> Self {
        self.choices.extend(values);
        self
    }

    pub fn cycle(mut self) -> Self {
        self.cycle = true;
        self
    }
}

fn next<T: Clone>(queue: &mut VecDeque<T>, cycle: bool) -> Result<T, ParamError> {
    let value = queue.pop_front().ok_or(ParamError::Exhausted)?;
    if cycle {
        queue.push_back(value.clone());
    }
    Ok(value)
}

impl ParamStrategy for ScriptedParams {
    fn int_between(&mut self, min: i64, max: i64) -> Result<i64, ParamError> {
        if min > max {
            return Err(ParamError::EmptyRange { min, max });
        }
        next(&mut self.ints, self.cycle)
    }

    fn alphanumeric(&mut self, _len: usize) -> Result<String, ParamError> {
        next(&mut self.strings, self.cycle)
    }

    fn choose(&mut self, len: usize) -> Result<usize, ParamError> {
        if len == 0 {
            return Err(ParamError::EmptyChoice);
        }
        next(&mut self.choices, self.cycle).map(|i| i % len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_between_is_inclusive() {
        let mut params = RandomParams::seeded(1);
        let mut seen = [false; 2];
        for _ in 0..200 {
            let v = params.int_between(0, 1).unwrap();
            seen[v as usize] = true;
        }
        assert_eq!(seen, [true, true]);
    }

    #[test]
    fn inverted_range_is_an_error() {
        let mut params = RandomParams::seeded(1);
        assert_eq!(
            params.int_between(5, 4),
            Err(ParamError::EmptyRange { min: 5, max: 4 })
        );
    }

    #[test]
    fn alphanumeric_uses_charset_and_length() {
        let mut params = RandomParams::seeded(3);
        let s = params.alphanumeric(64).unwrap();
        assert_eq!(s.len(), 64);
        assert!(s.bytes().all(|b| ALPHANUMERIC.contains(&b)));
        assert_eq!(params.alphanumeric(0).unwrap(), "");
    }

    #[test]
    fn same_seed_same_stream() {
        let mut a = RandomParams::for_worker(Some(42), 3);
        let mut b = RandomParams::for_worker(Some(42), 3);
        for _ in 0..16 {
            assert_eq!(a.int_between(0, 1_000_000), b.int_between(0, 1_000_000));
            assert_eq!(a.alphanumeric(8), b.alphanumeric(8));
        }
    }

    #[test]
    fn workers_get_distinct_streams() {
        let mut a = RandomParams::for_worker(Some(42), 0);
        let mut b = RandomParams::for_worker(Some(42), 1);
        let xs: Vec<_> = (0..8).map(|_| a.int_between(0, i64::MAX).unwrap()).collect();
        let ys: Vec<_> = (0..8).map(|_| b.int_between(0, i64::MAX).unwrap()).collect();
        assert_ne!(xs, ys);
    }

    #[test]
    fn choose_from_nothing_fails() {
        assert_eq!(
            RandomParams::seeded(0).choose(0),
            Err(ParamError::EmptyChoice)
        );
    }

    #[test]
    fn scripted_values_replay_in_order_then_exhaust() {
        let mut params = ScriptedParams::new().ints([1, 0]).strings(["x"]);
        assert_eq!(params.int_between(0, 1), Ok(1));
        assert_eq!(params.int_between(0, 1), Ok(0));
        assert_eq!(params.int_between(0, 1), Err(ParamError::Exhausted));
        assert_eq!(params.alphanumeric(1).as_deref(), Ok("x"));
        assert_eq!(params.alphanumeric(1), Err(ParamError::Exhausted));
    }

    #[test]
    fn scripted_cycle_never_exhausts() {
        let mut params = ScriptedParams::new().ints([1, 2]).choices([5]).cycle();
        let got: Vec<_> = (0..5).map(|_| params.int_between(0, 10).unwrap()).collect();
        assert_eq!(got, [1, 2, 1, 2, 1]);
        assert_eq!(params.choose(3), Ok(2));
    }
}
