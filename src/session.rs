use crate::api::{ApiClient, ApiError, RunConfig};
use crate::reconcile::{FitnessCharts, StepChart};

/// Local mirror of the server's run state. Not guaranteed synchronized; the
/// status check in `poll_once` is the only place the server's view wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Ready,
    Running,
    Completed,
}

impl RunPhase {
    pub fn label(&self) -> &'static str {
        match self {
            RunPhase::Ready => "Ready",
            RunPhase::Running => "Running...",
            RunPhase::Completed => "Completed",
        }
    }
}

/// One dashboard instance: phase machine, chart state, and the banner shown
/// for start/stop/reset failures. Owned by a single task; polling, key
/// handling, and redraw all go through `&mut self`, so there is never more
/// than one fetch cycle in flight.
pub struct Session {
    client: ApiClient,
    pub charts: FitnessCharts,
    pub functions: Vec<String>,
    pub banner: Option<String>,
    phase: RunPhase,
    epoch: u64,
    run_started: Option<std::time::Instant>,
}

impl Session {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            charts: FitnessCharts::new(),
            functions: Vec::new(),
            banner: None,
            phase: RunPhase::Ready,
            epoch: 0,
            run_started: None,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Data polling runs only while a run is live.
    pub fn is_polling(&self) -> bool {
        self.phase == RunPhase::Running
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn server_url(&self) -> &str {
        self.client.base_url()
    }

    /// Seconds since the last accepted `/start`, while a run is live or
    /// just finished. Cleared by reset.
    pub fn run_elapsed(&self) -> Option<f64> {
        self.run_started.map(|t| t.elapsed().as_secs_f64())
    }

    /// Startup handshake: fetch the objective-function list and adopt the
    /// server's run state if an optimization is already in progress.
    pub async fn bootstrap(&mut self) {
        match self.client.functions().await {
            Ok(fns) => {
                log::info!("session.functions count={}", fns.len());
                self.functions = fns;
            }
            Err(e) => log::warn!("session.functions_failed {}", e),
        }
        match self.client.status().await {
            Ok(st) if st.running => {
                log::info!("session.adopt_running_run");
                self.phase = RunPhase::Running;
            }
            Ok(_) => {}
            Err(e) => log::warn!("session.status_failed {}", e),
        }
    }

    /// Sends `/start`. Returns true when the server accepted the run. On
    /// rejection or connection failure the phase is unchanged and the
    /// banner carries the message (error + hint + compile command verbatim).
    pub async fn start(&mut self, cfg: &RunConfig) -> bool {
        if self.phase == RunPhase::Running {
            return false;
        }
        match self.client.start(cfg).await {
            Ok(status) => {
                log::info!(
                    "session.start function={} pop={} gens={} status={}",
                    cfg.function,
                    cfg.pop_size,
                    cfg.generations,
                    status
                );
                self.banner = None;
                self.phase = RunPhase::Running;
                self.epoch += 1;
                self.run_started = Some(std::time::Instant::now());
                true
            }
            Err(ApiError::Rejected(r)) => {
                log::warn!("session.start_rejected {}", r);
                self.banner = Some(r.banner_text());
                false
            }
            Err(ApiError::Transport(e)) => {
                log::warn!("session.start_unreachable {}", e);
                self.banner = Some(format!(
                    "Failed to connect to {}. Is the optimization server running?\n\n{e}",
                    self.client.base_url()
                ));
                false
            }
        }
    }

    /// Sends `/stop`. On success polling halts and the phase returns to
    /// `Ready`. A connection failure is logged and swallowed; the next
    /// status check reconciles with the server.
    pub async fn stop(&mut self) {
        if self.phase != RunPhase::Running {
            return;
        }
        match self.client.stop().await {
            Ok(status) => {
                log::info!("session.stop status={}", status);
                self.banner = None;
                self.phase = RunPhase::Ready;
                self.epoch += 1;
            }
            Err(ApiError::Rejected(r)) => {
                log::warn!("session.stop_rejected {}", r);
                self.banner = Some(r.banner_text());
            }
            Err(ApiError::Transport(e)) => {
                log::warn!("session.stop_unreachable {}", e);
            }
        }
    }

    /// Sends `/reset` and clears local chart state. Refused while running.
    /// After a successful reset the server must serve an empty `/data`; we
    /// re-fetch once and adopt any leftover length as the cursor baseline so
    /// stale rows are skipped rather than re-rendered.
    pub async fn reset(&mut self) {
        if self.phase == RunPhase::Running {
            self.banner = Some("Please stop the optimization first".to_string());
            return;
        }
        match self.client.reset().await {
            Ok(status) => {
                log::info!("session.reset status={}", status);
                self.banner = None;
                self.charts.reset();
                self.phase = RunPhase::Ready;
                self.epoch += 1;
                self.run_started = None;
                match self.client.data().await {
                    Ok(list) if !list.is_empty() => {
                        log::warn!("session.reset_stale_rows count={}", list.len());
                        self.charts.skip_to(list.len());
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("session.reset_verify_failed {}", e),
                }
            }
            Err(ApiError::Rejected(r)) => {
                log::warn!("session.reset_rejected {}", r);
                self.banner = Some(r.banner_text());
            }
            Err(ApiError::Transport(e)) => {
                log::warn!("session.reset_unreachable {}", e);
            }
        }
    }

    /// One poll cycle: check the run status, then fetch the cumulative list
    /// and reconcile the new tail. Status-before-data matters: when the
    /// server reports idle, the data fetch that follows was issued after the
    /// run ended, so the final generations are already in the list and
    /// nothing is lost by halting the poll loop. Failures are logged and
    /// retried on the next tick; nothing here touches the banner.
    pub async fn poll_once(&mut self) {
        let epoch = self.epoch;
        let server_running = match self.client.status().await {
            Ok(st) => Some(st.running),
            Err(e) => {
                log::warn!("poll.status_failed {}", e);
                None
            }
        };

        match self.client.data().await {
            Ok(samples) => {
                let appended = self.ingest_if_current(epoch, &samples);
                if appended > 0 {
                    log::debug!(
                        "poll.appended rows={} total={}",
                        appended,
                        self.charts.len()
                    );
                }
            }
            Err(e) => log::warn!("poll.fetch_failed {}", e),
        }

        if let Some(running) = server_running {
            if epoch == self.epoch {
                self.apply_status(running);
            }
        }
    }

    /// Epoch-guarded reconciliation: a response issued before a stop or
    /// reset is discarded instead of appended.
    fn ingest_if_current(&mut self, epoch: u64, samples: &[crate::api::GenerationSample]) -> usize {
        if epoch != self.epoch {
            log::debug!("poll.stale_epoch issued={} current={}", epoch, self.epoch);
            return 0;
        }
        self.charts.ingest(samples)
    }

    /// `Running` + server-not-running is the completion signal; every other
    /// combination leaves the phase alone.
    fn apply_status(&mut self, server_running: bool) {
        if self.phase == RunPhase::Running && !server_running {
            log::info!("session.completed generations={}", self.charts.len());
            self.phase = RunPhase::Completed;
        }
    }
}

/// The step/value watcher. No control panel, no status checker: it polls
/// `/data` unconditionally at its own cadence and renders whatever the
/// server has.
pub struct StepWatcher {
    client: ApiClient,
    pub chart: StepChart,
}

impl StepWatcher {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            chart: StepChart::new(),
        }
    }

    pub fn server_url(&self) -> &str {
        self.client.base_url()
    }

    pub async fn poll_once(&mut self) {
        match self.client.step_data().await {
            Ok(samples) => {
                self.chart.ingest(&samples);
            }
            Err(e) => log::warn!("poll.fetch_failed {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::GenerationSample;
    use std::time::Duration;

    fn session() -> Session {
        // Nothing in these tests performs I/O; the client just needs to exist.
        let client = ApiClient::new("http://127.0.0.1:1", Duration::from_millis(100)).unwrap();
        Session::new(client)
    }

    fn gen(generation: u64) -> GenerationSample {
        GenerationSample {
            generation,
            best_fitness: 10.0,
            avg_fitness: 15.0,
            worst_fitness: 20.0,
            diversity: 2.0,
        }
    }

    #[test]
    fn completion_requires_running_phase_and_idle_server() {
        let mut s = session();

        // Ready + idle server: no transition.
        s.apply_status(false);
        assert_eq!(s.phase(), RunPhase::Ready);

        // Running + running server: no transition.
        s.phase = RunPhase::Running;
        s.apply_status(true);
        assert_eq!(s.phase(), RunPhase::Running);

        // Running + idle server: completed, polling stops.
        s.apply_status(false);
        assert_eq!(s.phase(), RunPhase::Completed);
        assert!(!s.is_polling());

        // Completed is terminal for the status checker.
        s.apply_status(false);
        assert_eq!(s.phase(), RunPhase::Completed);
    }

    #[test]
    fn stale_epoch_response_is_discarded() {
        let mut s = session();
        s.phase = RunPhase::Running;
        let issued = s.epoch();

        // A stop lands while the poll response is in flight.
        s.phase = RunPhase::Ready;
        s.epoch += 1;

        assert_eq!(s.ingest_if_current(issued, &[gen(0), gen(1)]), 0);
        assert!(s.charts.is_empty());

        // The next cycle's epoch matches and appends normally.
        let current = s.epoch();
        assert_eq!(s.ingest_if_current(current, &[gen(0), gen(1)]), 2);
        assert_eq!(s.charts.len(), 2);
    }

    #[test]
    fn polling_is_gated_on_phase() {
        let mut s = session();
        assert!(!s.is_polling());
        s.phase = RunPhase::Running;
        assert!(s.is_polling());
        s.phase = RunPhase::Completed;
        assert!(!s.is_polling());
    }
}
