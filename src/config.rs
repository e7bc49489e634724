use std::env;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

fn get_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn get_env_f64(key: &str, default: f64) -> Result<f64> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<f64>()
            .map_err(|e| anyhow!("{key} invalid float: {e}"))?),
    }
}

fn get_env_usize(key: &str, default: usize) -> Result<usize> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<usize>()
            .map_err(|e| anyhow!("{key} invalid int: {e}"))?),
    }
}

fn get_env_string(key: &str, default: &str) -> String {
    get_env(key).unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Server the dashboard polls.
    pub server_url: String,
    pub request_timeout_ms: u64,

    // Poll cadences. The generation view and the step view deliberately keep
    // their own knobs; they model different sample schemas.
    pub poll_ms: u64,
    pub steps_poll_ms: u64,

    // Run parameters sent with /start.
    pub pop_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub delay_ms: u64,
    pub function: String,
    pub min_bound: f64,
    pub max_bound: f64,

    // Demo backend.
    pub serve_host: String,
    pub serve_port: u16,
    pub elite_ratio: f64,

    // TUI modes pipe the logger here; raw mode owns stderr.
    pub log_path: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let s = Self {
            server_url: get_env_string("EVOSCOPE_SERVER_URL", "http://127.0.0.1:5000"),
            request_timeout_ms: get_env_usize("EVOSCOPE_REQUEST_TIMEOUT_MS", 5000)? as u64,
            poll_ms: get_env_usize("EVOSCOPE_POLL_MS", 300)? as u64,
            steps_poll_ms: get_env_usize("EVOSCOPE_STEPS_POLL_MS", 500)? as u64,
            pop_size: get_env_usize("EVOSCOPE_POP_SIZE", 50)?,
            generations: get_env_usize("EVOSCOPE_GENERATIONS", 100)?,
            mutation_rate: get_env_f64("EVOSCOPE_MUTATION_RATE", 0.1)?,
            crossover_rate: get_env_f64("EVOSCOPE_CROSSOVER_RATE", 0.8)?,
            delay_ms: get_env_usize("EVOSCOPE_DELAY_MS", 100)? as u64,
            function: get_env_string("EVOSCOPE_FUNCTION", "rastrigin"),
            min_bound: get_env_f64("EVOSCOPE_MIN_BOUND", -5.12)?,
            max_bound: get_env_f64("EVOSCOPE_MAX_BOUND", 5.12)?,
            serve_host: get_env_string("EVOSCOPE_SERVE_HOST", "127.0.0.1"),
            serve_port: get_env_usize("EVOSCOPE_SERVE_PORT", 5000)? as u16,
            elite_ratio: get_env_f64("EVOSCOPE_ELITE_RATIO", 0.2)?,
            log_path: get_env_string("EVOSCOPE_LOG_PATH", "evoscope.log"),
        };

        s.validate()?;
        Ok(s)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_ms < 50 {
            return Err(anyhow!("EVOSCOPE_POLL_MS must be >= 50 (got {})", self.poll_ms));
        }
        if self.steps_poll_ms < 50 {
            return Err(anyhow!(
                "EVOSCOPE_STEPS_POLL_MS must be >= 50 (got {})",
                self.steps_poll_ms
            ));
        }
        if self.pop_size < 2 {
            return Err(anyhow!("EVOSCOPE_POP_SIZE must be >= 2 (got {})", self.pop_size));
        }
        if self.generations < 1 {
            return Err(anyhow!(
                "EVOSCOPE_GENERATIONS must be >= 1 (got {})",
                self.generations
            ));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(anyhow!(
                "EVOSCOPE_MUTATION_RATE must be in [0, 1] (got {})",
                self.mutation_rate
            ));
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            return Err(anyhow!(
                "EVOSCOPE_CROSSOVER_RATE must be in [0, 1] (got {})",
                self.crossover_rate
            ));
        }
        if !(0.0..=1.0).contains(&self.elite_ratio) {
            return Err(anyhow!(
                "EVOSCOPE_ELITE_RATIO must be in [0, 1] (got {})",
                self.elite_ratio
            ));
        }
        if !self.min_bound.is_finite()
            || !self.max_bound.is_finite()
            || self.min_bound >= self.max_bound
        {
            return Err(anyhow!(
                "search bounds must satisfy min < max (got {}..{})",
                self.min_bound,
                self.max_bound
            ));
        }
        if self.request_timeout_ms < 100 {
            return Err(anyhow!(
                "EVOSCOPE_REQUEST_TIMEOUT_MS must be >= 100 (got {})",
                self.request_timeout_ms
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Settings {
        Settings {
            server_url: "http://127.0.0.1:5000".into(),
            request_timeout_ms: 5000,
            poll_ms: 300,
            steps_poll_ms: 500,
            pop_size: 50,
            generations: 100,
            mutation_rate: 0.1,
            crossover_rate: 0.8,
            delay_ms: 100,
            function: "rastrigin".into(),
            min_bound: -5.12,
            max_bound: 5.12,
            serve_host: "127.0.0.1".into(),
            serve_port: 5000,
            elite_ratio: 0.2,
            log_path: "evoscope.log".into(),
        }
    }

    #[test]
    fn default_settings_validate() {
        base().validate().unwrap();
    }

    #[test]
    fn rejects_tiny_population() {
        let mut s = base();
        s.pop_size = 1;
        assert!(s.validate().is_err());
    }

    #[test]
    fn rejects_rate_out_of_range() {
        let mut s = base();
        s.mutation_rate = 1.5;
        assert!(s.validate().is_err());
    }

    #[test]
    fn rejects_inverted_bounds() {
        let mut s = base();
        s.min_bound = 5.12;
        s.max_bound = -5.12;
        assert!(s.validate().is_err());
    }

    #[test]
    fn rejects_hot_poll_interval() {
        let mut s = base();
        s.poll_ms = 10;
        assert!(s.validate().is_err());
    }
}
