use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::config::Settings;

/// One row of optimization progress, as served by `/data` on the
/// generation-oriented backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationSample {
    pub generation: u64,
    pub best_fitness: f64,
    pub avg_fitness: f64,
    pub worst_fitness: f64,
    pub diversity: f64,
}

/// Row shape of the simpler step/value backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepSample {
    pub step: i64,
    pub value: f64,
}

/// Body of `POST /start`. Field names are part of the wire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(rename = "popSize")]
    pub pop_size: usize,
    pub generations: usize,
    #[serde(rename = "mutationRate")]
    pub mutation_rate: f64,
    #[serde(rename = "crossoverRate")]
    pub crossover_rate: f64,
    /// Per-generation delay in milliseconds.
    pub delay: u64,
    pub function: String,
    #[serde(rename = "minBound")]
    pub min_bound: f64,
    #[serde(rename = "maxBound")]
    pub max_bound: f64,
}

impl RunConfig {
    pub fn from_settings(s: &Settings) -> Self {
        Self {
            pop_size: s.pop_size,
            generations: s.generations,
            mutation_rate: s.mutation_rate,
            crossover_rate: s.crossover_rate,
            delay: s.delay_ms,
            function: s.function.clone(),
            min_bound: s.min_bound,
            max_bound: s.max_bound,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunStatus {
    pub running: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionList {
    pub functions: Vec<String>,
}

/// Structured non-2xx body. `hint` and `compile_command` are optional
/// remediation fields and are surfaced to the user verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_command: Option<String>,
}

impl Rejection {
    /// The user-facing banner text: error, then hint, then compile command,
    /// each on its own block.
    pub fn banner_text(&self) -> String {
        let mut msg = self.error.clone();
        if let Some(hint) = &self.hint {
            msg.push_str("\n\n");
            msg.push_str(hint);
        }
        if let Some(cmd) = &self.compile_command {
            msg.push_str("\n\nCompile with:\n");
            msg.push_str(cmd);
        }
        msg
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.error)
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Server answered with a non-2xx status and (possibly) a structured body.
    #[error("server rejected request: {0}")]
    Rejected(Rejection),
    /// Connection, timeout, or body-decode failure.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl ApiError {
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            ApiError::Rejected(r) => Some(r),
            ApiError::Transport(_) => None,
        }
    }
}

/// Thin typed client over the optimization server's REST surface.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn functions(&self) -> Result<Vec<String>, ApiError> {
        let resp = self.http.get(self.url("/functions")).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json::<FunctionList>().await?.functions)
    }

    /// 2xx returns the server's status object untouched; the caller only
    /// cares that the request was accepted.
    pub async fn start(&self, cfg: &RunConfig) -> Result<JsonValue, ApiError> {
        let resp = self.http.post(self.url("/start")).json(cfg).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn stop(&self) -> Result<JsonValue, ApiError> {
        let resp = self.http.post(self.url("/stop")).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn reset(&self) -> Result<JsonValue, ApiError> {
        let resp = self.http.post(self.url("/reset")).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn data(&self) -> Result<Vec<GenerationSample>, ApiError> {
        let resp = self.http.get(self.url("/data")).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn step_data(&self) -> Result<Vec<StepSample>, ApiError> {
        let resp = self.http.get(self.url("/data")).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn status(&self) -> Result<RunStatus, ApiError> {
        let resp = self.http.get(self.url("/status")).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }
}

/// Non-2xx responses are decoded into a `Rejection`; an undecodable body
/// degrades to a bare HTTP-status error so the caller still gets something
/// meaningful to show.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let rejection = match resp.json::<Rejection>().await {
        Ok(r) => r,
        Err(_) => Rejection {
            error: format!("HTTP {status}"),
            hint: None,
            compile_command: None,
        },
    };
    Err(ApiError::Rejected(rejection))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_config_uses_wire_field_names() {
        let cfg = RunConfig {
            pop_size: 50,
            generations: 100,
            mutation_rate: 0.1,
            crossover_rate: 0.8,
            delay: 100,
            function: "rastrigin".into(),
            min_bound: -5.12,
            max_bound: 5.12,
        };
        let v = serde_json::to_value(&cfg).unwrap();
        assert_eq!(v["popSize"], 50);
        assert_eq!(v["mutationRate"], 0.1);
        assert_eq!(v["crossoverRate"], 0.8);
        assert_eq!(v["minBound"], -5.12);
        assert_eq!(v["maxBound"], 5.12);
        assert_eq!(v["function"], "rastrigin");
    }

    #[test]
    fn banner_text_appends_hint_and_compile_command() {
        let r = Rejection {
            error: "engine binary not found".into(),
            hint: Some("build the engine first".into()),
            compile_command: Some("g++ -O2 optimizer.cpp -o optimizer".into()),
        };
        let text = r.banner_text();
        assert!(text.starts_with("engine binary not found"));
        assert!(text.contains("build the engine first"));
        assert!(text.contains("Compile with:\ng++ -O2"));
    }

    #[test]
    fn generation_sample_decodes_from_wire_shape() {
        let s: GenerationSample = serde_json::from_str(
            r#"{"generation":0,"best_fitness":10.0,"avg_fitness":15.0,"worst_fitness":20.0,"diversity":2.0}"#,
        )
        .unwrap();
        assert_eq!(s.generation, 0);
        assert_eq!(s.best_fitness, 10.0);
        assert_eq!(s.diversity, 2.0);
    }
}
