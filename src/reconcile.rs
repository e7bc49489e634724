use crate::api::{GenerationSample, StepSample};

/// Chart state for the generation view: one x-label list plus one point
/// series per metric, and a cursor counting how many server rows have
/// already been rendered.
///
/// Ingest is strictly additive. The server's list is cumulative and never
/// shrinks mid-run, so a fetched list no longer than the cursor means no new
/// data and is a no-op; rows already appended are never revisited.
#[derive(Debug, Default, Clone)]
pub struct FitnessCharts {
    pub labels: Vec<f64>,
    pub best: Vec<(f64, f64)>,
    pub avg: Vec<(f64, f64)>,
    pub worst: Vec<(f64, f64)>,
    pub diversity: Vec<(f64, f64)>,
    latest: Option<GenerationSample>,
    seen: usize,
}

impl FitnessCharts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends exactly `samples[seen..]` to every series and advances the
    /// cursor to `samples.len()`. Returns how many rows were appended.
    pub fn ingest(&mut self, samples: &[GenerationSample]) -> usize {
        if samples.len() <= self.seen {
            return 0;
        }
        let new = &samples[self.seen..];
        for s in new {
            let x = s.generation as f64;
            self.labels.push(x);
            self.best.push((x, s.best_fitness));
            self.avg.push((x, s.avg_fitness));
            self.worst.push((x, s.worst_fitness));
            self.diversity.push((x, s.diversity));
        }
        self.latest = new.last().copied();
        self.seen = samples.len();
        new.len()
    }

    /// Wholesale clear: empties every series and zeroes the cursor.
    pub fn reset(&mut self) {
        self.labels.clear();
        self.best.clear();
        self.avg.clear();
        self.worst.clear();
        self.diversity.clear();
        self.latest = None;
        self.seen = 0;
    }

    /// Re-baselines the cursor without rendering anything. Used after a
    /// server reset: rows the server kept despite resetting are skipped
    /// instead of re-appended.
    pub fn skip_to(&mut self, len: usize) {
        debug_assert!(self.labels.is_empty());
        self.seen = len;
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.seen
    }

    pub fn latest(&self) -> Option<&GenerationSample> {
        self.latest.as_ref()
    }
}

/// Chart state for the step/value view. Same cursor rule as
/// `FitnessCharts`, deliberately kept as its own type: the two views model
/// different sample schemas and are not unified.
#[derive(Debug, Default, Clone)]
pub struct StepChart {
    pub points: Vec<(f64, f64)>,
    latest: Option<StepSample>,
    seen: usize,
}

impl StepChart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&mut self, samples: &[StepSample]) -> usize {
        if samples.len() <= self.seen {
            return 0;
        }
        let new = &samples[self.seen..];
        for s in new {
            self.points.push((s.step as f64, s.value));
        }
        self.latest = new.last().copied();
        self.seen = samples.len();
        new.len()
    }

    pub fn reset(&mut self) {
        self.points.clear();
        self.latest = None;
        self.seen = 0;
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<&StepSample> {
        self.latest.as_ref()
    }
}
