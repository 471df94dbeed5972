//! Sampling strategies for hyperparameter optimization

use super::config::OptimizeDirection;
use super::search_space::{SearchSpace, TrialParams};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Type of sampler to use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SamplerType {
    /// Random sampling
    Random,
    /// Tree-structured Parzen Estimator
    TPE,
}

/// Trait for hyperparameter samplers
pub trait Sampler: Send {
    /// Sample the next set of hyperparameters
    fn sample(
        &mut self,
        search_space: &SearchSpace,
        history: &[(TrialParams, f64)],
    ) -> TrialParams;
}

fn seeded_rng(seed: Option<u64>) -> Xoshiro256PlusPlus {
    match seed {
        Some(s) => Xoshiro256PlusPlus::seed_from_u64(s),
        None => Xoshiro256PlusPlus::from_entropy(),
    }
}

/// Random sampler
#[derive(Debug)]
pub struct RandomSampler {
    rng: Xoshiro256PlusPlus,
}

impl RandomSampler {
    /// Create a new random sampler
    pub fn new(seed: Option<u64>) -> Self {
        Self { rng: seeded_rng(seed) }
    }
}

impl Sampler for RandomSampler {
    fn sample(
        &mut self,
        search_space: &SearchSpace,
        _history: &[(TrialParams, f64)],
    ) -> TrialParams {
        search_space.sample(&mut self.rng)
    }
}

/// Tree-structured Parzen Estimator sampler.
///
/// Simplified: after the startup trials, a batch of random candidates is
/// scored by how much closer it sits to the best [`GOOD_FRACTION`] of the
/// history than to the rest, and the top-scoring candidate is returned.
/// Share of the history, best first, treated as the good group
const GOOD_FRACTION: f64 = 0.25;

#[derive(Debug)]
pub struct TPESampler {
    rng: Xoshiro256PlusPlus,
    n_startup_trials: usize,
    n_candidates: usize,
    direction: OptimizeDirection,
}

impl TPESampler {
    /// Create a new TPE sampler
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: seeded_rng(seed),
            n_startup_trials: 10,
            n_candidates: 24,
            direction: OptimizeDirection::Maximize,
        }
    }

    /// Set number of startup trials
    pub fn with_n_startup(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    /// Set which end of the objective counts as good
    pub fn with_direction(mut self, direction: OptimizeDirection) -> Self {
        self.direction = direction;
        self
    }

    fn similarity(
        search_space: &SearchSpace,
        candidate: &TrialParams,
        group: &[&TrialParams],
    ) -> f64 {
        if group.is_empty() {
            return 0.0;
        }

        let mut total_sim = 0.0;
        for other in group {
            let mut dist = 0.0;
            let mut count = 0;

            for param in search_space.parameters() {
                if let (Some(a), Some(b)) = (candidate.get(&param.name), other.get(&param.name)) {
                    let d = param.distance(a, b);
                    dist += d * d;
                    count += 1;
                }
            }

            if count > 0 {
                dist = (dist / count as f64).sqrt();
                total_sim += 1.0 / (1.0 + dist);
            }
        }

        total_sim / group.len() as f64
    }
}

impl Sampler for TPESampler {
    fn sample(
        &mut self,
        search_space: &SearchSpace,
        history: &[(TrialParams, f64)],
    ) -> TrialParams {
        // Use random sampling for startup trials
        if history.len() < self.n_startup_trials.max(1) {
            return search_space.sample(&mut self.rng);
        }

        let mut sorted: Vec<&(TrialParams, f64)> = history.iter().collect();
        match self.direction {
            OptimizeDirection::Minimize => sorted.sort_by(|a, b| a.1.total_cmp(&b.1)),
            OptimizeDirection::Maximize => sorted.sort_by(|a, b| b.1.total_cmp(&a.1)),
        }

        let n_good = ((sorted.len() as f64 * GOOD_FRACTION).ceil() as usize).clamp(1, sorted.len());
        let good: Vec<&TrialParams> = sorted[..n_good].iter().map(|(p, _)| p).collect();
        let bad: Vec<&TrialParams> = sorted[n_good..].iter().map(|(p, _)| p).collect();

        let mut best_params = search_space.sample(&mut self.rng);
        let mut best_score = f64::NEG_INFINITY;

        for _ in 0..self.n_candidates {
            let candidate = search_space.sample(&mut self.rng);
            let score = Self::similarity(search_space, &candidate, &good)
                - Self::similarity(search_space, &candidate, &bad);

            if score > best_score {
                best_score = score;
                best_params = candidate;
            }
        }

        best_params
    }
}

/// Create a sampler from type
pub fn create_sampler(
    sampler_type: SamplerType,
    seed: Option<u64>,
    n_startup_trials: usize,
    direction: OptimizeDirection,
) -> Box<dyn Sampler> {
    match sampler_type {
        SamplerType::Random => Box::new(RandomSampler::new(seed)),
        SamplerType::TPE => Box::new(
            TPESampler::new(seed)
                .with_n_startup(n_startup_trials)
                .with_direction(direction),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::ParameterValue;

    fn space() -> SearchSpace {
        SearchSpace::new()
            .int("n_estimators", 50, 200)
            .categorical(
                "max_depth",
                vec![ParameterValue::Int(10), ParameterValue::Int(20), ParameterValue::None],
            )
    }

    #[test]
    fn test_random_sampler() {
        let mut sampler = RandomSampler::new(Some(42));
        let params = sampler.sample(&space(), &[]);

        assert!(params.contains_key("n_estimators"));
        assert!(params.contains_key("max_depth"));
    }

    #[test]
    fn test_seeded_samplers_repeat() {
        let mut a = RandomSampler::new(Some(9));
        let mut b = RandomSampler::new(Some(9));
        for _ in 0..5 {
            assert_eq!(a.sample(&space(), &[]), b.sample(&space(), &[]));
        }
    }

    #[test]
    fn test_tpe_sampler_with_history() {
        let space = SearchSpace::new().int("n", 0, 100);

        // Higher n scored better
        let history: Vec<(TrialParams, f64)> = (0..20)
            .map(|i| {
                let mut params = TrialParams::new();
                params.insert("n".to_string(), ParameterValue::Int(i * 5));
                (params, i as f64)
            })
            .collect();

        let mut sampler = TPESampler::new(Some(42)).with_n_startup(5);
        let picks: Vec<i64> = (0..20)
            .map(|_| sampler.sample(&space, &history)["n"].as_int().unwrap())
            .collect();

        let mean = picks.iter().sum::<i64>() as f64 / picks.len() as f64;
        assert!(mean > 50.0, "TPE should favour high n, mean pick {}", mean);
    }

    #[test]
    fn test_create_sampler() {
        let mut sampler = create_sampler(SamplerType::TPE, Some(1), 3, OptimizeDirection::Maximize);
        let params = sampler.sample(&space(), &[]);
        assert_eq!(params.len(), 2);
    }
}
