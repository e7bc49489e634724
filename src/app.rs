use std::io::{self, Stdout};
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::api::{ApiClient, RunConfig};
use crate::config::Settings;
use crate::session::{Session, StepWatcher};
use crate::ui;

/// Restores the terminal even on early return or panic unwind.
struct TerminalCleanup;

impl Drop for TerminalCleanup {
    fn drop(&mut self) {
        disable_raw_mode().ok();
        execute!(io::stdout(), LeaveAlternateScreen).ok();
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    execute!(io::stdout(), EnterAlternateScreen)?;
    Ok(Terminal::new(CrosstermBackend::new(io::stdout()))?)
}

/// Crossterm reads block, so key input gets its own thread; the loop task
/// receives over a channel and stays select-friendly. The thread exits when
/// the receiver is dropped.
fn spawn_input_thread() -> mpsc::UnboundedReceiver<KeyEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || loop {
        match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                if tx.send(key).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                log::error!("input.read_failed {}", e);
                break;
            }
        }
    });
    rx
}

/// The generation dashboard: 300ms poll cadence, start/stop/reset controls.
pub async fn run_watch(settings: Settings) -> Result<()> {
    let client = ApiClient::new(
        &settings.server_url,
        Duration::from_millis(settings.request_timeout_ms),
    )?;
    let mut session = Session::new(client);
    let mut cfg = RunConfig::from_settings(&settings);
    session.bootstrap().await;
    if !session.functions.is_empty() && !session.functions.contains(&cfg.function) {
        cfg.function = session.functions[0].clone();
    }

    let _cleanup = TerminalCleanup;
    let mut terminal = setup_terminal()?;
    let mut keys = spawn_input_thread();

    let mut poll = tokio::time::interval(Duration::from_millis(settings.poll_ms));
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Redraw on a slower heartbeat so the clock and banner stay fresh even
    // when no data is flowing.
    let mut redraw = tokio::time::interval(Duration::from_millis(250));
    redraw.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log::info!(
        "app.watch url={} poll_ms={}",
        session.server_url(),
        settings.poll_ms
    );

    loop {
        terminal.draw(|f| ui::draw_watch(f, &session, &cfg))?;

        tokio::select! {
            _ = poll.tick(), if session.is_polling() => {
                session.poll_once().await;
            }
            _ = redraw.tick() => {}
            key = keys.recv() => {
                let Some(key) = key else { break };
                if handle_key(key, &mut session, &mut cfg).await {
                    break;
                }
            }
        }
    }

    log::info!("app.watch_exit generations={}", session.charts.len());
    Ok(())
}

/// Returns true when the app should quit.
async fn handle_key(key: KeyEvent, session: &mut Session, cfg: &mut RunConfig) -> bool {
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') => return true,
        KeyCode::Char('s') => {
            session.start(cfg).await;
        }
        KeyCode::Char('x') => {
            session.stop().await;
        }
        KeyCode::Char('r') => {
            session.reset().await;
        }
        KeyCode::Char('f') | KeyCode::Right => cycle_function(session, cfg, 1),
        KeyCode::Left => cycle_function(session, cfg, -1),
        KeyCode::Esc => session.banner = None,
        _ => {}
    }
    false
}

/// Steps through the server-advertised objective list. Locked while a run is
/// live; the selection only applies to the next `/start`.
fn cycle_function(session: &Session, cfg: &mut RunConfig, dir: i64) {
    if session.is_polling() || session.functions.is_empty() {
        return;
    }
    let n = session.functions.len() as i64;
    let at = session
        .functions
        .iter()
        .position(|f| *f == cfg.function)
        .unwrap_or(0) as i64;
    let next = (at + dir).rem_euclid(n) as usize;
    cfg.function = session.functions[next].clone();
}

/// The step/value view: a bare chart on a 500ms cadence, no controls.
pub async fn run_steps(settings: Settings) -> Result<()> {
    let client = ApiClient::new(
        &settings.server_url,
        Duration::from_millis(settings.request_timeout_ms),
    )?;
    let mut watcher = StepWatcher::new(client);

    let _cleanup = TerminalCleanup;
    let mut terminal = setup_terminal()?;
    let mut keys = spawn_input_thread();

    let mut poll = tokio::time::interval(Duration::from_millis(settings.steps_poll_ms));
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log::info!(
        "app.steps url={} poll_ms={}",
        watcher.server_url(),
        settings.steps_poll_ms
    );

    loop {
        terminal.draw(|f| ui::draw_steps(f, &watcher))?;

        tokio::select! {
            _ = poll.tick() => {
                watcher.poll_once().await;
            }
            key = keys.recv() => {
                match key {
                    Some(k) if matches!(k.code, KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc) => break,
                    Some(_) => {}
                    None => break,
                }
            }
        }
    }

    log::info!("app.steps_exit points={}", watcher.chart.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_functions(fns: &[&str]) -> Session {
        let client = ApiClient::new("http://127.0.0.1:1", Duration::from_millis(100)).unwrap();
        let mut s = Session::new(client);
        s.functions = fns.iter().map(|f| f.to_string()).collect();
        s
    }

    #[test]
    fn function_cycling_wraps_both_ways() {
        let s = session_with_functions(&["rastrigin", "sphere", "ackley"]);
        let mut cfg = RunConfig {
            pop_size: 50,
            generations: 100,
            mutation_rate: 0.1,
            crossover_rate: 0.8,
            delay: 100,
            function: "rastrigin".into(),
            min_bound: -5.12,
            max_bound: 5.12,
        };

        cycle_function(&s, &mut cfg, 1);
        assert_eq!(cfg.function, "sphere");
        cycle_function(&s, &mut cfg, -1);
        assert_eq!(cfg.function, "rastrigin");
        cycle_function(&s, &mut cfg, -1);
        assert_eq!(cfg.function, "ackley");
    }

    #[test]
    fn unknown_selection_cycles_from_the_start() {
        let s = session_with_functions(&["rastrigin", "sphere"]);
        let mut cfg = RunConfig {
            pop_size: 50,
            generations: 100,
            mutation_rate: 0.1,
            crossover_rate: 0.8,
            delay: 100,
            function: "himmelblau".into(),
            min_bound: -5.12,
            max_bound: 5.12,
        };
        cycle_function(&s, &mut cfg, 1);
        assert_eq!(cfg.function, "sphere");
    }
}
