use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::api::GenerationSample;

const PI: f64 = std::f64::consts::PI;
const E: f64 = std::f64::consts::E;

/// 1-D benchmark objectives, minimized. All have their optimum at or near
/// the origin within the default -5.12..5.12 search box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    Rastrigin,
    Sphere,
    Rosenbrock,
    Ackley,
}

impl Objective {
    pub const NAMES: [&'static str; 4] = ["rastrigin", "sphere", "rosenbrock", "ackley"];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "rastrigin" => Some(Self::Rastrigin),
            "sphere" => Some(Self::Sphere),
            "rosenbrock" => Some(Self::Rosenbrock),
            "ackley" => Some(Self::Ackley),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Rastrigin => "rastrigin",
            Self::Sphere => "sphere",
            Self::Rosenbrock => "rosenbrock",
            Self::Ackley => "ackley",
        }
    }

    pub fn eval(&self, x: f64) -> f64 {
        match self {
            Self::Rastrigin => x * x - 10.0 * (2.0 * PI * x).cos() + 10.0,
            Self::Sphere => x * x,
            // Simplified 1-D Rosenbrock.
            Self::Rosenbrock => (1.0 - x) * (1.0 - x) + 100.0 * x * x,
            Self::Ackley => {
                -20.0 * (-0.2 * x.abs()).exp() - (2.0 * PI * x).cos().exp() + 20.0 + E
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct GaParams {
    pub objective: Objective,
    pub pop_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub elite_ratio: f64,
    pub min_bound: f64,
    pub max_bound: f64,
}

/// A stepwise genetic-algorithm run. Each `step` evaluates the current
/// population, emits one progress sample, and breeds the next generation;
/// the caller owns the pacing (per-generation delay) and the stop decision.
pub struct Optimizer {
    params: GaParams,
    population: Vec<f64>,
    generation: usize,
    rng: StdRng,
}

impl Optimizer {
    pub fn new(params: GaParams) -> Self {
        Self::with_rng(params, StdRng::from_os_rng())
    }

    pub fn with_rng(params: GaParams, mut rng: StdRng) -> Self {
        let population = (0..params.pop_size)
            .map(|_| rng.random_range(params.min_bound..params.max_bound))
            .collect();
        Self {
            params,
            population,
            generation: 0,
            rng,
        }
    }

    pub fn population(&self) -> &[f64] {
        &self.population
    }

    pub fn is_done(&self) -> bool {
        self.generation >= self.params.generations
    }

    pub fn step(&mut self) -> Option<GenerationSample> {
        if self.is_done() {
            return None;
        }
        let p = &self.params;

        // Score and rank ascending (minimization).
        let mut scored: Vec<(f64, f64)> = self
            .population
            .iter()
            .map(|&x| (p.objective.eval(x), x))
            .collect();
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let best = scored[0].0;
        let worst = scored[scored.len() - 1].0;
        let avg = scored.iter().map(|s| s.0).sum::<f64>() / scored.len() as f64;

        // Diversity: standard deviation of the population positions.
        let mean_pos = scored.iter().map(|s| s.1).sum::<f64>() / scored.len() as f64;
        let variance = scored
            .iter()
            .map(|s| (s.1 - mean_pos) * (s.1 - mean_pos))
            .sum::<f64>()
            / scored.len() as f64;
        let diversity = variance.sqrt();

        let sample = GenerationSample {
            generation: self.generation as u64,
            best_fitness: best,
            avg_fitness: avg,
            worst_fitness: worst,
            diversity,
        };

        // Elitism: carry the top performers unchanged.
        let elite_count = ((p.pop_size as f64 * p.elite_ratio) as usize).min(p.pop_size);
        let mut next: Vec<f64> = scored.iter().take(elite_count).map(|s| s.1).collect();

        // Tournament selection over the better half, blend crossover,
        // adaptive mutation that cools as the run progresses.
        let half = (p.pop_size / 2).max(1);
        while next.len() < p.pop_size {
            let t1 = self.rng.random_range(0..half);
            let t2 = self.rng.random_range(0..half);
            let t3 = self.rng.random_range(0..half);
            let t4 = self.rng.random_range(0..half);
            let p1 = if scored[t1].0 < scored[t2].0 { t1 } else { t2 };
            let p2 = if scored[t3].0 < scored[t4].0 { t3 } else { t4 };

            let mut child = if self.rng.random_range(0.0..1.0) < p.crossover_rate {
                let alpha: f64 = self.rng.random_range(0.0..1.0);
                alpha * scored[p1].1 + (1.0 - alpha) * scored[p2].1
            } else {
                scored[p1].1
            };

            if self.rng.random_range(0.0..1.0) < p.mutation_rate {
                let strength = 0.5 * (1.0 - self.generation as f64 / p.generations as f64);
                child += self.rng.random_range(-1.0..1.0) * strength;
                child = child.clamp(p.min_bound, p.max_bound);
            }

            next.push(child);
        }

        self.population = next;
        self.generation += 1;
        Some(sample)
    }
}
