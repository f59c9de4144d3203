use std::collections::VecDeque;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, List, ListItem, Paragraph};

use arena::{Identity, Team};

use crate::server::{PlayerInfo, ServerStats};

const MAX_LOG_LINES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn color(self) -> Color {
        match self {
            LogLevel::Info => Color::White,
            LogLevel::Warn => Color::Yellow,
            LogLevel::Error => Color::Red,
        }
    }
}

pub struct TuiState {
    log: VecDeque<(LogLevel, String)>,
    selected: usize,
    pending_kick: Option<Identity>,
    end_round_requested: bool,
}

impl TuiState {
    pub fn new() -> Self {
        Self {
            log: VecDeque::with_capacity(MAX_LOG_LINES),
            selected: 0,
            pending_kick: None,
            end_round_requested: false,
        }
    }

    fn push(&mut self, level: LogLevel, line: String) {
        if self.log.len() == MAX_LOG_LINES {
            self.log.pop_front();
        }
        self.log.push_back((level, line));
    }

    pub fn log_info(&mut self, line: impl Into<String>) {
        self.push(LogLevel::Info, line.into());
    }

    pub fn log_warn(&mut self, line: impl Into<String>) {
        self.push(LogLevel::Warn, line.into());
    }

    pub fn log_error(&mut self, line: impl Into<String>) {
        self.push(LogLevel::Error, line.into());
    }

    pub fn select_prev(&mut self, count: usize) {
        if count == 0 {
            self.selected = 0;
        } else {
            self.selected = (self.selected + count - 1) % count;
        }
    }

    pub fn select_next(&mut self, count: usize) {
        if count == 0 {
            self.selected = 0;
        } else {
            self.selected = (self.selected + 1) % count;
        }
    }

    pub fn request_kick(&mut self, players: &[PlayerInfo]) {
        if let Some(player) = players.get(self.selected) {
            self.pending_kick = Some(player.identity);
        }
    }

    pub fn take_pending_kick(&mut self) -> Option<Identity> {
        self.pending_kick.take()
    }

    pub fn request_end_round(&mut self) {
        self.end_round_requested = true;
    }

    pub fn take_end_round(&mut self) -> bool {
        std::mem::take(&mut self.end_round_requested)
    }
}

pub fn render(frame: &mut Frame, state: &TuiState, stats: &ServerStats, players: &[PlayerInfo]) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Min(6),
            Constraint::Length(8),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], stats);
    render_capacity(frame, chunks[1], stats);
    render_network(frame, chunks[2], stats);
    render_players(frame, chunks[3], state.selected, players);
    render_log(frame, chunks[4], state);
    render_help(frame, chunks[5]);
}

fn render_header(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let title = format!(" Arena Server - Uptime: {} ", format_duration(stats.uptime_secs));

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let text = format!(
        "Tick: {}  |  Vehicles: {}  |  Pickups: {}",
        stats.tick, stats.vehicle_count, stats.pickup_count
    );

    let paragraph = Paragraph::new(text)
        .block(block)
        .style(Style::default().fg(Color::White));

    frame.render_widget(paragraph, area);
}

fn render_capacity(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let block = Block::default()
        .title(" Players ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let ratio = if stats.max_players == 0 {
        0.0
    } else {
        stats.player_count as f64 / stats.max_players as f64
    };
    let gauge = Gauge::default()
        .block(block)
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio.min(1.0))
        .label(format!("{}/{} players", stats.player_count, stats.max_players));

    frame.render_widget(gauge, area);
}

fn render_network(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let block = Block::default()
        .title(" Network ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let net = &stats.network_stats;
    let dropped = net.dropped_inbound + net.dropped_outbound;
    let lines = vec![
        Line::from(vec![
            Span::styled("Packets: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{} sent / {} recv", net.packets_sent, net.packets_received),
                Style::default().fg(Color::White),
            ),
        ]),
        Line::from(vec![
            Span::styled("Bytes: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!(
                    "{} sent / {} recv",
                    format_bytes(net.bytes_sent),
                    format_bytes(net.bytes_received)
                ),
                Style::default().fg(Color::White),
            ),
        ]),
        Line::from(vec![
            Span::styled("RTT: ", Style::default().fg(Color::Gray)),
            Span::styled(format!("{:.1}ms", net.rtt_ms), Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::styled("Dropped / malformed: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{} / {}", dropped, net.malformed),
                Style::default().fg(if dropped + net.malformed > 0 {
                    Color::Red
                } else {
                    Color::White
                }),
            ),
        ]),
    ];

    let paragraph = Paragraph::new(lines).block(block);
    frame.render_widget(paragraph, area);
}

fn team_color(team: Team) -> Color {
    match team {
        Team::None => Color::Gray,
        Team::Blue => Color::Blue,
        Team::Red => Color::Red,
    }
}

fn render_players(frame: &mut Frame, area: Rect, selected: usize, players: &[PlayerInfo]) {
    let block = Block::default()
        .title(" Scoreboard ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));

    let items: Vec<ListItem> = players
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let marker = if i == selected { "> " } else { "  " };
            let rtt = p
                .rtt_ms
                .map(|ms| format!("{:.0}ms", ms))
                .unwrap_or_else(|| "-".to_string());
            let status = if p.alive {
                format!("{:>3.0}hp", p.health)
            } else {
                "dead".to_string()
            };
            let mut style = Style::default().fg(team_color(p.team));
            if i == selected {
                style = style.add_modifier(Modifier::BOLD);
            }

            ListItem::new(Line::from(vec![
                Span::styled(marker, style),
                Span::styled(
                    format!(
                        "{:<10} {:<24}{:<4} {:<5} {:>6} round {:>3}  game {:>4}  {}",
                        p.identity.to_string(),
                        p.nickname,
                        if p.is_vip { "VIP" } else { "" },
                        p.team.as_str(),
                        status,
                        p.round_score,
                        p.game_score,
                        rtt
                    ),
                    style,
                ),
            ]))
        })
        .collect();

    frame.render_widget(List::new(items).block(block), area);
}

fn render_log(frame: &mut Frame, area: Rect, state: &TuiState) {
    let block = Block::default()
        .title(" Events ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));

    let visible = area.height.saturating_sub(2) as usize;
    let skip = state.log.len().saturating_sub(visible);
    let lines: Vec<Line> = state
        .log
        .iter()
        .skip(skip)
        .map(|(level, text)| Line::styled(text.clone(), Style::default().fg(level.color())))
        .collect();

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .title(" Controls ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let text = Paragraph::new("q/ESC quit  |  Up/Down select  |  k kick  |  r end round")
        .block(block)
        .style(
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        );

    frame.render_widget(text, area);
}

fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, mins, secs)
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
