use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::SpeciesKey;
use crate::error::KiraError;

const EVENTS_MAX: usize = 8;
const LOGS_MAX: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Operational,
    Logs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Resolve,
    Prepare,
    Connect,
    Query,
    Verify,
    Store,
    Done,
    Failed,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Resolve => "Resolve",
            Phase::Prepare => "Prepare",
            Phase::Connect => "Connect",
            Phase::Query => "Query",
            Phase::Verify => "Verify",
            Phase::Store => "Store",
            Phase::Done => "Done",
            Phase::Failed => "Failed",
        }
    }

    fn progress(self) -> u8 {
        match self {
            Phase::Resolve => 5,
            Phase::Prepare => 10,
            Phase::Connect => 25,
            Phase::Query => 50,
            Phase::Verify => 75,
            Phase::Store => 90,
            Phase::Done | Phase::Failed => 100,
        }
    }
}

#[derive(Debug)]
struct AppState {
    status: String,
    phase: Phase,
    latency_ms: Option<u128>,
    retries: u32,
    fallback: bool,
    request_count: u64,
    events: VecDeque<String>,
    logs: VecDeque<String>,
    view: View,
    started: Instant,
    active: bool,
}

pub struct Tui {
    species: SpeciesKey,
    state: Arc<Mutex<AppState>>,
    log_scroll: u16,
}

struct TuiProgress {
    state: Arc<Mutex<AppState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            let message = event.message.trim().to_string();
            if let Some((phase, payload)) = parse_phase(&message) {
                state.phase = phase;
                state.status = payload.to_string();
            } else if let Some(latency) = parse_latency(&message) {
                state.latency_ms = Some(latency);
            } else if message.starts_with("retry") {
                state.retries = state.retries.saturating_add(1);
                state.status = message.clone();
            } else if message.starts_with("fallback") {
                state.fallback = true;
                state.status = message.clone();
            }

            if message.starts_with("biomart.request") {
                state.request_count = state.request_count.saturating_add(1);
            }

            push_bounded(&mut state.events, message.clone(), EVENTS_MAX);
            push_bounded(&mut state.logs, format!("[{}] {message}", timestamp()), LOGS_MAX);
        }
    }
}

impl Tui {
    pub fn new(species: SpeciesKey) -> Self {
        Self {
            species,
            state: Arc::new(Mutex::new(AppState {
                status: "ready".to_string(),
                phase: Phase::Resolve,
                latency_ms: None,
                retries: 0,
                fallback: false,
                request_count: 0,
                events: VecDeque::new(),
                logs: VecDeque::new(),
                view: View::Operational,
                started: Instant::now(),
                active: false,
            })),
            log_scroll: 0,
        }
    }

    /// Runs `f` on a worker thread while drawing its progress. `Esc` leaves
    /// the dashboard early; the fetch is then reported as aborted.
    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, KiraError> + Send + 'static,
        R: Send + 'static,
    {
        self.set_active(true);

        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let (tx, rx) = std::sync::mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let mut tick = 0usize;
        loop {
            if let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_ui(frame, self, &state, tick))
                    .into_diagnostic()?;
            }

            if let Ok(result) = rx.try_recv() {
                self.set_active(false);
                restore_terminal()?;
                handle.join().ok();
                return result.map_err(miette::Report::new);
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if self.handle_key(key) {
                        break;
                    }
                }
            }

            tick = tick.wrapping_add(1);
        }

        self.set_active(false);
        restore_terminal()?;
        Err(miette::Report::msg("aborted"))
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        match key.code {
            KeyCode::Esc => return true,
            KeyCode::Tab | KeyCode::F(4) => {
                if let Ok(mut state) = self.state.lock() {
                    state.view = match state.view {
                        View::Operational => View::Logs,
                        View::Logs => View::Operational,
                    };
                }
            }
            KeyCode::PageUp => self.scroll_logs(-5),
            KeyCode::PageDown => self.scroll_logs(5),
            _ => {}
        }
        false
    }

    fn set_active(&self, active: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.active = active;
            if active {
                state.started = Instant::now();
                state.request_count = 0;
                state.retries = 0;
                state.latency_ms = None;
                state.phase = Phase::Resolve;
            }
        }
    }

    fn scroll_logs(&mut self, delta: i16) {
        let max = self.state.lock().map(|state| state.logs.len()).unwrap_or(0);
        let max_scroll = max.saturating_sub(1) as i16;
        let next = (self.log_scroll as i16 + delta).clamp(0, max_scroll);
        self.log_scroll = next as u16;
    }
}

fn restore_terminal() -> miette::Result<()> {
    disable_raw_mode().into_diagnostic()?;
    let mut stdout = io::stdout();
    stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
    Ok(())
}

fn draw_ui(frame: &mut ratatui::Frame, tui: &Tui, state: &AppState, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(2),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(tui.species, state, tick), chunks[0]);

    match state.view {
        View::Operational => {
            let main = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
                .split(chunks[1]);
            frame.render_widget(draw_status_panel(state), main[0]);
            frame.render_widget(draw_events_panel(state), main[1]);
        }
        View::Logs => {
            frame.render_widget(draw_logs_view(state, tui.log_scroll), chunks[1]);
        }
    }

    let footer = Paragraph::new(Line::from(Span::styled(
        "Tab logs · PgUp/PgDn scroll · Esc abort",
        Style::default().fg(Color::Gray),
    )))
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(footer, chunks[2]);
}

fn draw_header(species: SpeciesKey, state: &AppState, tick: usize) -> Paragraph<'static> {
    let hb = if state.active && tick % 2 == 0 { "*" } else { " " };
    let header_line = Line::from(vec![
        Span::styled(
            "KIRA-GA",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("   Species: "),
        Span::styled(species.as_str(), Style::default().fg(Color::Cyan)),
        Span::raw("   Dataset: "),
        Span::styled(species.dataset_id(), Style::default().fg(Color::Cyan)),
        Span::raw("   "),
        Span::styled(hb, Style::default().fg(Color::Green)),
    ]);
    Paragraph::new(vec![header_line])
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_status_panel(state: &AppState) -> Paragraph<'static> {
    let progress = state.phase.progress();
    let phase_color = match state.phase {
        Phase::Failed => Color::Red,
        Phase::Done => Color::Green,
        _ if state.active => Color::Cyan,
        _ => Color::Yellow,
    };
    let latency = state
        .latency_ms
        .map(|v| format!("{v} ms"))
        .unwrap_or_else(|| "--".to_string());
    let attributes = if state.fallback {
        Span::styled("reduced (no UniProt)", Style::default().fg(Color::Yellow))
    } else {
        Span::raw("full")
    };
    let lines = vec![
        Line::from(Span::styled(
            "STATUS / PROGRESS",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            Span::styled("Phase: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{:<8} ", state.phase.label()),
                Style::default().fg(phase_color),
            ),
            Span::raw(progress_bar(progress)),
            Span::raw(format!(" {progress:>3}%")),
        ]),
        Line::from(vec![
            Span::styled("Elapsed: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{}s", state.started.elapsed().as_secs())),
            Span::styled("   Requests: ", Style::default().fg(Color::Gray)),
            Span::raw(state.request_count.to_string()),
        ]),
        Line::from(vec![
            Span::styled("Latency: ", Style::default().fg(Color::Gray)),
            Span::raw(latency),
            Span::styled("   Retries: ", Style::default().fg(Color::Gray)),
            Span::raw(state.retries.to_string()),
        ]),
        Line::from(vec![
            Span::styled("Attributes: ", Style::default().fg(Color::Gray)),
            attributes,
        ]),
        Line::from(""),
        Line::from(state.status.clone()),
    ];

    Paragraph::new(lines)
        .block(Block::default().borders(Borders::RIGHT))
        .wrap(Wrap { trim: true })
}

fn draw_events_panel(state: &AppState) -> Paragraph<'static> {
    let mut lines = vec![Line::from(Span::styled(
        "RECENT EVENTS",
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    ))];
    for event in state.events.iter().rev() {
        lines.push(Line::from(format!("- {event}")));
    }
    Paragraph::new(lines).wrap(Wrap { trim: true })
}

fn draw_logs_view(state: &AppState, scroll: u16) -> Paragraph<'static> {
    let lines = state
        .logs
        .iter()
        .map(|line| Line::from(line.clone()))
        .collect::<Vec<_>>();
    Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Logs"))
        .scroll((scroll, 0))
        .wrap(Wrap { trim: false })
}

fn progress_bar(percent: u8) -> String {
    let total = 10;
    let filled = (percent as usize * total) / 100;
    let mut out = String::from("[");
    for i in 0..total {
        out.push(if i < filled { '#' } else { '.' });
    }
    out.push(']');
    out
}

fn parse_phase(message: &str) -> Option<(Phase, &str)> {
    let rest = message.strip_prefix("phase=")?;
    let (label, payload) = rest.split_once(';')?;
    let phase = match label {
        "Resolve" => Phase::Resolve,
        "Prepare" => Phase::Prepare,
        "Connect" => Phase::Connect,
        "Query" => Phase::Query,
        "Verify" => Phase::Verify,
        "Store" => Phase::Store,
        "Done" => Phase::Done,
        "Failed" => Phase::Failed,
        _ => return None,
    };
    Some((phase, payload.trim()))
}

fn parse_latency(message: &str) -> Option<u128> {
    message
        .split("latency_ms=")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|value| value.parse::<u128>().ok())
}

fn push_bounded(buffer: &mut VecDeque<String>, item: String, max: usize) {
    buffer.push_back(item);
    while buffer.len() > max {
        buffer.pop_front();
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_messages_are_recognised() {
        assert_eq!(
            parse_phase("phase=Connect; resolving x"),
            Some((Phase::Connect, "resolving x"))
        );
        assert_eq!(parse_phase("phase=Unknown; x"), None);
        assert_eq!(parse_phase("retry attempt=1"), None);
    }

    #[test]
    fn latency_is_extracted() {
        assert_eq!(parse_latency("biomart.response latency_ms=412"), Some(412));
        assert_eq!(parse_latency("biomart.response"), None);
    }

    #[test]
    fn progress_events_update_state() {
        let tui = Tui::new("gallus-gallus".parse().unwrap());
        let sink = TuiProgress {
            state: tui.state.clone(),
        };
        sink.event(ProgressEvent {
            message: "retry attempt=1 failed: timeout; waiting 10s".to_string(),
            elapsed: None,
        });
        sink.event(ProgressEvent {
            message: "fallback: full query failed".to_string(),
            elapsed: None,
        });
        sink.event(ProgressEvent {
            message: "phase=Store; writing csv".to_string(),
            elapsed: None,
        });
        let state = tui.state.lock().unwrap();
        assert_eq!(state.retries, 1);
        assert!(state.fallback);
        assert_eq!(state.phase, Phase::Store);
        assert_eq!(state.events.len(), 3);
    }

    #[test]
    fn bar_fills_proportionally() {
        assert_eq!(progress_bar(50), "[#####.....]");
        assert_eq!(progress_bar(100), "[##########]");
    }
}
