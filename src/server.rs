use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use parking_lot::Mutex;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::api::{GenerationSample, Rejection, RunConfig};
use crate::config::Settings;
use crate::engine::{GaParams, Objective, Optimizer};
use crate::utils::now_ts;

/// Demo optimization backend. Serves the same REST surface the dashboard
/// polls, backed by an in-process genetic-algorithm run. Sample history is
/// cumulative: `/start` appends a fresh run, only `/reset` clears.
#[derive(Clone)]
pub struct ServerState {
    inner: Arc<Inner>,
}

struct Inner {
    settings: Settings,
    run: Mutex<RunState>,
}

#[derive(Default)]
struct RunState {
    samples: Vec<GenerationSample>,
    running: bool,
    run_id: Option<Uuid>,
    cancel: Option<Arc<AtomicBool>>,
}

impl ServerState {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                run: Mutex::new(RunState::default()),
            }),
        }
    }
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/functions", get(api_functions))
        .route("/start", post(api_start))
        .route("/stop", post(api_stop))
        .route("/reset", post(api_reset))
        .route("/data", get(api_data))
        .route("/status", get(api_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(settings: Settings) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", settings.serve_host, settings.serve_port).parse()?;
    let app = router(ServerState::new(settings));

    log::info!("server.listen url=http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    log::info!("server.shutdown");
}

async fn api_functions() -> impl IntoResponse {
    Json(serde_json::json!({ "functions": Objective::NAMES }))
}

async fn api_start(State(st): State<ServerState>, Json(cfg): Json<RunConfig>) -> Response {
    let objective = match validate_config(&cfg) {
        Ok(o) => o,
        Err(r) => return (StatusCode::BAD_REQUEST, Json(r)).into_response(),
    };

    let run_id = Uuid::new_v4();
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let mut run = st.inner.run.lock();
        if run.running {
            return reject(
                StatusCode::BAD_REQUEST,
                "optimization already running",
                Some("stop the current run before starting another"),
            );
        }
        run.running = true;
        run.run_id = Some(run_id);
        run.cancel = Some(cancel.clone());
    }

    let params = GaParams {
        objective,
        pop_size: cfg.pop_size,
        generations: cfg.generations,
        mutation_rate: cfg.mutation_rate,
        crossover_rate: cfg.crossover_rate,
        elite_ratio: st.inner.settings.elite_ratio,
        min_bound: cfg.min_bound,
        max_bound: cfg.max_bound,
    };
    let delay_ms = cfg.delay;

    log::info!(
        "server.run_start id={} function={} pop={} gens={} delay_ms={}",
        run_id,
        objective.name(),
        params.pop_size,
        params.generations,
        delay_ms
    );

    tokio::spawn(run_ga(st.clone(), params, delay_ms, cancel, run_id));

    Json(serde_json::json!({
        "status": "started",
        "run_id": run_id.to_string(),
        "function": objective.name(),
        "ts": now_ts(),
    }))
    .into_response()
}

/// The engine loop. The run-state lock is only held per generation, never
/// across the pacing sleep.
async fn run_ga(
    st: ServerState,
    params: GaParams,
    delay_ms: u64,
    cancel: Arc<AtomicBool>,
    run_id: Uuid,
) {
    let mut optimizer = Optimizer::new(params);
    let mut emitted = 0usize;

    loop {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let Some(sample) = optimizer.step() else {
            break;
        };
        emitted += 1;
        st.inner.run.lock().samples.push(sample);

        if delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }
    }

    // A newer run may already own the state; only this run's id clears it.
    let mut run = st.inner.run.lock();
    if run.run_id == Some(run_id) {
        run.running = false;
        run.cancel = None;
    }
    log::info!("server.run_finished id={} generations={}", run_id, emitted);
}

async fn api_stop(State(st): State<ServerState>) -> impl IntoResponse {
    let mut run = st.inner.run.lock();
    if let Some(cancel) = run.cancel.take() {
        cancel.store(true, Ordering::Relaxed);
        run.running = false;
        log::info!("server.run_stopped id={:?}", run.run_id);
        Json(serde_json::json!({ "status": "stopped", "ts": now_ts() }))
    } else {
        Json(serde_json::json!({ "status": "idle", "ts": now_ts() }))
    }
}

/// Clears the sample history. Guaranteed contract: a 2xx response means the
/// very next `/data` is empty. Refused while a run is live.
async fn api_reset(State(st): State<ServerState>) -> Response {
    let mut run = st.inner.run.lock();
    if run.running {
        return reject(
            StatusCode::BAD_REQUEST,
            "optimization still running",
            Some("stop it before resetting"),
        );
    }
    let cleared = run.samples.len();
    run.samples.clear();
    log::info!("server.reset cleared={}", cleared);
    Json(serde_json::json!({ "status": "reset", "cleared": cleared, "ts": now_ts() })).into_response()
}

async fn api_data(State(st): State<ServerState>) -> impl IntoResponse {
    Json(st.inner.run.lock().samples.clone())
}

async fn api_status(State(st): State<ServerState>) -> impl IntoResponse {
    Json(serde_json::json!({ "running": st.inner.run.lock().running }))
}

fn reject(status: StatusCode, error: &str, hint: Option<&str>) -> Response {
    (
        status,
        Json(Rejection {
            error: error.to_string(),
            hint: hint.map(|s| s.to_string()),
            compile_command: None,
        }),
    )
        .into_response()
}

fn validate_config(cfg: &RunConfig) -> Result<Objective, Rejection> {
    let objective = Objective::from_name(&cfg.function).ok_or_else(|| Rejection {
        error: format!("unknown objective function '{}'", cfg.function),
        hint: Some(format!("available: {}", Objective::NAMES.join(", "))),
        compile_command: None,
    })?;
    if cfg.pop_size < 2 {
        return Err(invalid(format!("popSize must be >= 2 (got {})", cfg.pop_size)));
    }
    if cfg.generations < 1 {
        return Err(invalid(format!(
            "generations must be >= 1 (got {})",
            cfg.generations
        )));
    }
    if !(0.0..=1.0).contains(&cfg.mutation_rate) {
        return Err(invalid(format!(
            "mutationRate must be in [0, 1] (got {})",
            cfg.mutation_rate
        )));
    }
    if !(0.0..=1.0).contains(&cfg.crossover_rate) {
        return Err(invalid(format!(
            "crossoverRate must be in [0, 1] (got {})",
            cfg.crossover_rate
        )));
    }
    if !cfg.min_bound.is_finite() || !cfg.max_bound.is_finite() || cfg.min_bound >= cfg.max_bound {
        return Err(invalid(format!(
            "bounds must satisfy minBound < maxBound (got {}..{})",
            cfg.min_bound, cfg.max_bound
        )));
    }
    Ok(objective)
}

fn invalid(error: String) -> Rejection {
    Rejection {
        error,
        hint: Some("invalid config".to_string()),
        compile_command: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiClient;
    use crate::session::{RunPhase, Session};
    use std::time::Duration;

    fn cfg() -> RunConfig {
        RunConfig {
            pop_size: 50,
            generations: 100,
            mutation_rate: 0.1,
            crossover_rate: 0.8,
            delay: 100,
            function: "rastrigin".into(),
            min_bound: -5.12,
            max_bound: 5.12,
        }
    }

    #[test]
    fn accepts_default_config() {
        assert_eq!(validate_config(&cfg()).unwrap(), Objective::Rastrigin);
    }

    #[test]
    fn rejects_unknown_function_with_hint() {
        let mut c = cfg();
        c.function = "himmelblau".into();
        let r = validate_config(&c).unwrap_err();
        assert!(r.error.contains("himmelblau"));
        assert!(r.hint.unwrap().contains("rastrigin"));
    }

    #[test]
    fn rejects_out_of_range_rates() {
        let mut c = cfg();
        c.crossover_rate = 1.2;
        let r = validate_config(&c).unwrap_err();
        assert!(r.error.contains("crossoverRate"));
    }

    #[test]
    fn rejects_inverted_bounds() {
        let mut c = cfg();
        c.min_bound = 1.0;
        c.max_bound = -1.0;
        assert!(validate_config(&c).is_err());
    }

    fn test_settings() -> Settings {
        Settings {
            server_url: "http://127.0.0.1:5000".into(),
            request_timeout_ms: 2000,
            poll_ms: 300,
            steps_poll_ms: 500,
            pop_size: 20,
            generations: 5,
            mutation_rate: 0.1,
            crossover_rate: 0.8,
            delay_ms: 0,
            function: "sphere".into(),
            min_bound: -5.12,
            max_bound: 5.12,
            serve_host: "127.0.0.1".into(),
            serve_port: 0,
            elite_ratio: 0.2,
            log_path: "test.log".into(),
        }
    }

    async fn spawn_server() -> String {
        let app = router(ServerState::new(test_settings()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn dashboard(url: &str) -> (Session, RunConfig) {
        let client = ApiClient::new(url, Duration::from_millis(2000)).unwrap();
        let mut c = cfg();
        c.pop_size = 20;
        c.generations = 5;
        c.delay = 0;
        c.function = "sphere".into();
        (Session::new(client), c)
    }

    async fn poll_until_complete(session: &mut Session) {
        for _ in 0..200 {
            session.poll_once().await;
            if session.phase() == RunPhase::Completed {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run never completed");
    }

    #[tokio::test]
    async fn start_poll_and_complete_against_live_server() {
        let url = spawn_server().await;
        let (mut session, run_cfg) = dashboard(&url);
        session.bootstrap().await;
        assert_eq!(session.functions, Objective::NAMES.map(str::to_string).to_vec());
        assert_eq!(session.phase(), RunPhase::Ready);

        assert!(session.start(&run_cfg).await);
        assert!(session.is_polling());
        poll_until_complete(&mut session).await;

        assert_eq!(session.charts.len(), 5);
        assert!(session.charts.latest().unwrap().generation == 4);

        // Re-polling the finished run appends nothing.
        let len = session.charts.len();
        session.poll_once().await;
        assert_eq!(session.charts.len(), len);
    }

    #[tokio::test]
    async fn rejected_start_leaves_the_dashboard_ready() {
        let url = spawn_server().await;
        let (mut session, mut run_cfg) = dashboard(&url);
        run_cfg.function = "himmelblau".into();

        assert!(!session.start(&run_cfg).await);
        assert_eq!(session.phase(), RunPhase::Ready);
        assert!(!session.is_polling());
        let banner = session.banner.as_deref().unwrap();
        assert!(banner.contains("himmelblau"));
        assert!(banner.contains("rastrigin"));
    }

    #[tokio::test]
    async fn second_start_while_running_is_rejected() {
        let url = spawn_server().await;
        let (mut session, mut run_cfg) = dashboard(&url);
        run_cfg.generations = 500;
        run_cfg.delay = 20;

        assert!(session.start(&run_cfg).await);

        // The guard also holds server-side, for a client that missed the
        // running state.
        let (mut other, other_cfg) = dashboard(&url);
        assert!(!other.start(&other_cfg).await);
        assert_eq!(other.phase(), RunPhase::Ready);
        assert!(other
            .banner
            .as_deref()
            .unwrap()
            .contains("already running"));

        // The live run is untouched by the rejected attempt.
        assert_eq!(session.phase(), RunPhase::Running);
        session.stop().await;
        assert_eq!(session.phase(), RunPhase::Ready);
    }

    #[tokio::test]
    async fn reset_clears_server_and_rebaselines_the_client() {
        let url = spawn_server().await;
        let (mut session, run_cfg) = dashboard(&url);

        assert!(session.start(&run_cfg).await);
        poll_until_complete(&mut session).await;
        assert!(!session.charts.is_empty());

        session.reset().await;
        assert_eq!(session.phase(), RunPhase::Ready);
        assert!(session.charts.is_empty());
        assert_eq!(session.charts.cursor(), 0);

        // Server side really is empty, and a fresh run charts from scratch.
        session.poll_once().await;
        assert!(session.charts.is_empty());
        assert!(session.start(&run_cfg).await);
        poll_until_complete(&mut session).await;
        assert_eq!(session.charts.latest().unwrap().generation, 4);
    }

    #[tokio::test]
    async fn reset_is_refused_while_running() {
        let url = spawn_server().await;
        let (mut session, mut run_cfg) = dashboard(&url);
        run_cfg.generations = 500;
        run_cfg.delay = 20;

        assert!(session.start(&run_cfg).await);
        session.reset().await;
        assert_eq!(session.phase(), RunPhase::Running);
        assert!(session
            .banner
            .as_deref()
            .unwrap()
            .contains("stop the optimization first"));
        session.stop().await;
    }

    #[tokio::test]
    async fn unreachable_server_sets_a_connection_banner() {
        let (mut session, run_cfg) = dashboard("http://127.0.0.1:9");
        assert!(!session.start(&run_cfg).await);
        assert_eq!(session.phase(), RunPhase::Ready);
        assert!(session
            .banner
            .as_deref()
            .unwrap()
            .contains("Is the optimization server running?"));
    }
}
