use chrono::Local;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph, Wrap},
    Frame,
};

use crate::api::RunConfig;
use crate::session::{RunPhase, Session, StepWatcher};
use crate::utils::fmt_elapsed;

const BEST: Color = Color::Green;
const AVG: Color = Color::Blue;
const WORST: Color = Color::Red;
const DIVERSITY: Color = Color::Magenta;
const VALUE: Color = Color::Cyan;
const MUTED: Color = Color::Gray;

pub fn draw_watch(f: &mut Frame, session: &Session, cfg: &RunConfig) {
    let banner_height = if session.banner.is_some() { 5 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),             // header
            Constraint::Length(4),             // stats
            Constraint::Min(10),               // charts
            Constraint::Length(banner_height), // error banner
            Constraint::Length(1),             // key help
        ])
        .split(f.area());

    draw_header(f, chunks[0], session, cfg);
    draw_stats(f, chunks[1], session);
    draw_charts(f, chunks[2], session);
    if let Some(msg) = &session.banner {
        draw_banner(f, chunks[3], msg);
    }
    let help = " s start · x stop · r reset · f function · esc dismiss · q quit";
    f.render_widget(
        Paragraph::new(help).style(Style::default().fg(MUTED)),
        chunks[4],
    );
}

fn phase_style(phase: RunPhase) -> (Style, &'static str) {
    match phase {
        RunPhase::Ready => (Style::default().fg(MUTED), "○"),
        RunPhase::Running => (
            Style::default().fg(BEST).add_modifier(Modifier::BOLD),
            "●",
        ),
        RunPhase::Completed => (
            Style::default().fg(AVG).add_modifier(Modifier::BOLD),
            "◆",
        ),
    }
}

fn draw_header(f: &mut Frame, area: Rect, session: &Session, cfg: &RunConfig) {
    let (style, dot) = phase_style(session.phase());
    let clock = Local::now().format("%H:%M:%S").to_string();

    let left = Paragraph::new(Line::from(vec![
        Span::styled(format!("{dot} {}", session.phase().label()), style),
        Span::styled(
            format!("  {}", session.server_url()),
            Style::default().fg(MUTED),
        ),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(Span::styled(
                " evoscope ",
                Style::default().add_modifier(Modifier::BOLD),
            )),
    );

    let right = Paragraph::new(Line::from(vec![
        Span::raw(format!(
            "{} pop={} gens={} mut={} xover={} ",
            cfg.function, cfg.pop_size, cfg.generations, cfg.mutation_rate, cfg.crossover_rate
        )),
        Span::styled(clock, Style::default().fg(MUTED)),
    ]))
    .alignment(Alignment::Right)
    .block(Block::default().borders(Borders::ALL));

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(30), Constraint::Length(60)])
        .split(area);
    f.render_widget(left, cols[0]);
    f.render_widget(right, cols[1]);
}

fn draw_stats(f: &mut Frame, area: Rect, session: &Session) {
    let lines = match session.charts.latest() {
        Some(s) => vec![
            Line::from(vec![
                Span::styled(" Generation ", Style::default().fg(MUTED)),
                Span::styled(
                    format!("{}", s.generation),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::styled("   Best ", Style::default().fg(MUTED)),
                Span::styled(format!("{:.4}", s.best_fitness), Style::default().fg(BEST)),
                Span::styled("   Avg ", Style::default().fg(MUTED)),
                Span::styled(format!("{:.4}", s.avg_fitness), Style::default().fg(AVG)),
                Span::styled("   Worst ", Style::default().fg(MUTED)),
                Span::styled(format!("{:.4}", s.worst_fitness), Style::default().fg(WORST)),
                Span::styled("   Diversity ", Style::default().fg(MUTED)),
                Span::styled(format!("{:.4}", s.diversity), Style::default().fg(DIVERSITY)),
            ]),
            Line::from(Span::styled(
                match session.run_elapsed() {
                    Some(e) => format!(
                        " {} generations charted · {} elapsed",
                        session.charts.len(),
                        fmt_elapsed(e)
                    ),
                    None => format!(" {} generations charted", session.charts.len()),
                },
                Style::default().fg(MUTED),
            )),
        ],
        None => vec![Line::from(vec![
            Span::styled(" Generation ", Style::default().fg(MUTED)),
            Span::raw("0"),
            Span::styled("   Best ", Style::default().fg(MUTED)),
            Span::raw("—"),
            Span::styled("   Avg ", Style::default().fg(MUTED)),
            Span::raw("—"),
            Span::styled("   Diversity ", Style::default().fg(MUTED)),
            Span::raw("—"),
        ])],
    };

    let para = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Stats "));
    f.render_widget(para, area);
}

fn draw_charts(f: &mut Frame, area: Rect, session: &Session) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
        .split(area);

    let charts = &session.charts;
    if charts.is_empty() {
        let msg = Paragraph::new("Waiting for optimization data...")
            .style(Style::default().fg(MUTED))
            .block(Block::default().borders(Borders::ALL).title(" Fitness "));
        f.render_widget(msg, cols[0]);
        let msg = Paragraph::new("")
            .block(Block::default().borders(Borders::ALL).title(" Diversity "));
        f.render_widget(msg, cols[1]);
        return;
    }

    // Fitness chart: best/avg/worst share one y-range.
    let (x_min, x_max) = x_bounds(&charts.best);
    let (y_min, y_max) = y_bounds(&[&charts.best, &charts.avg, &charts.worst]);
    let datasets = vec![
        line_dataset("Best", BEST, &charts.best),
        line_dataset("Avg", AVG, &charts.avg),
        line_dataset("Worst", WORST, &charts.worst),
    ];
    f.render_widget(
        chart_widget(" Fitness ", datasets, (x_min, x_max), (y_min, y_max)),
        cols[0],
    );

    let (dy_min, dy_max) = y_bounds(&[&charts.diversity]);
    let datasets = vec![line_dataset("Diversity", DIVERSITY, &charts.diversity)];
    f.render_widget(
        chart_widget(" Diversity ", datasets, (x_min, x_max), (dy_min.min(0.0), dy_max)),
        cols[1],
    );
}

pub fn draw_steps(f: &mut Frame, watcher: &StepWatcher) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(1),
        ])
        .split(f.area());

    let latest = watcher
        .chart
        .latest()
        .map(|s| format!("step {}  value {:.4}", s.step, s.value))
        .unwrap_or_else(|| "waiting for data".to_string());
    let header = Paragraph::new(Line::from(vec![
        Span::styled(latest, Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(
            format!("  {}", watcher.server_url()),
            Style::default().fg(MUTED),
        ),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(" evoscope · steps "),
    );
    f.render_widget(header, chunks[0]);

    if watcher.chart.is_empty() {
        let msg = Paragraph::new("Waiting for data...")
            .style(Style::default().fg(MUTED))
            .block(Block::default().borders(Borders::ALL).title(" Value "));
        f.render_widget(msg, chunks[1]);
    } else {
        let (x_min, x_max) = x_bounds(&watcher.chart.points);
        let (y_min, y_max) = y_bounds(&[&watcher.chart.points]);
        let datasets = vec![line_dataset("Value", VALUE, &watcher.chart.points)];
        f.render_widget(
            chart_widget(" Value ", datasets, (x_min, x_max), (y_min, y_max)),
            chunks[1],
        );
    }

    f.render_widget(
        Paragraph::new(" q quit").style(Style::default().fg(MUTED)),
        chunks[2],
    );
}

fn draw_banner(f: &mut Frame, area: Rect, msg: &str) {
    let para = Paragraph::new(msg)
        .wrap(Wrap { trim: false })
        .style(Style::default().fg(WORST))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(WORST))
                .title(" Error (esc to dismiss) "),
        );
    f.render_widget(para, area);
}

fn line_dataset<'a>(name: &'a str, color: Color, data: &'a [(f64, f64)]) -> Dataset<'a> {
    Dataset::default()
        .name(name)
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(color))
        .data(data)
}

fn chart_widget<'a>(
    title: &'a str,
    datasets: Vec<Dataset<'a>>,
    (x_min, x_max): (f64, f64),
    (y_min, y_max): (f64, f64),
) -> Chart<'a> {
    Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title(title))
        .x_axis(
            Axis::default()
                .title("generation")
                .style(Style::default().fg(MUTED))
                .bounds([x_min, x_max])
                .labels(vec![
                    Span::raw(format!("{x_min:.0}")),
                    Span::raw(format!("{x_max:.0}")),
                ]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(MUTED))
                .bounds([y_min, y_max])
                .labels(vec![
                    Span::raw(format!("{y_min:.2}")),
                    Span::raw(format!("{y_max:.2}")),
                ]),
        )
}

fn x_bounds(series: &[(f64, f64)]) -> (f64, f64) {
    let min = series.first().map(|p| p.0).unwrap_or(0.0);
    let max = series.last().map(|p| p.0).unwrap_or(1.0);
    if (max - min).abs() < f64::EPSILON {
        (min, min + 1.0)
    } else {
        (min, max)
    }
}

fn y_bounds(series: &[&[(f64, f64)]]) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for s in series {
        for &(_, y) in s.iter() {
            min = min.min(y);
            max = max.max(y);
        }
    }
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    let margin = (max - min).max(0.1) * 0.1;
    (min - margin, max + margin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x_bounds_degenerate_single_point() {
        assert_eq!(x_bounds(&[(3.0, 1.0)]), (3.0, 4.0));
        assert_eq!(x_bounds(&[]), (0.0, 1.0));
    }

    #[test]
    fn y_bounds_pad_the_data_range() {
        let (lo, hi) = y_bounds(&[&[(0.0, 1.0), (1.0, 3.0)]]);
        assert!(lo < 1.0);
        assert!(hi > 3.0);
    }
}
