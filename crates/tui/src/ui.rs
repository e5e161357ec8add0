use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use xxscript_core::script::{self, Severity};
use xxscript_core::types::{Outcome, RunState};

use crate::app::View;
use crate::App;

fn key(k: &'static str) -> Span<'static> {
    Span::styled(k, Style::default().fg(Color::Yellow))
}

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = if app.log_visible {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(f.area())
    } else {
        Layout::default()
            .constraints([Constraint::Percentage(100)])
            .split(f.area())
    };

    let status = app.runtime.engine.status();
    let recorder = app.runtime.recorder.status();
    let listening = app.runtime.detector.is_running();

    let (banner_label, banner_bg) = match status.status {
        RunState::Idle => ("IDLE".to_string(), Color::DarkGray),
        RunState::Running | RunState::Paused => {
            let what = status.script_name.as_deref().unwrap_or("?");
            let mut line = status.current_line.map(|l| format!(" line {}", l)).unwrap_or_default();
            let (word, color) = if status.status == RunState::Running {
                ("RUNNING", Color::Green)
            } else {
                if let Ok((x, y)) = app.runtime.engine.mouse_position() {
                    line.push_str(&format!(" @ ({}, {})", x, y));
                }
                ("PAUSED", Color::Yellow)
            };
            (format!("{} {}{}", word, what, line), color)
        }
    };

    let mut lines: Vec<Line> = vec![
        Line::from(vec![
            key(" enter"),
            Span::raw(" run, "),
            key("space"),
            Span::raw(" enable, "),
            key("s"),
            Span::raw("top, "),
            key("p"),
            Span::raw("ause, "),
            key("r"),
            Span::raw("ecord, "),
            key("h"),
            Span::raw("otkeys, "),
            key("d"),
            Span::raw("elete, "),
            key("tab"),
            Span::raw(" history"),
        ]),
        Line::from(vec![
            Span::styled(
                if listening { " hotkeys on" } else { " hotkeys off" },
                Style::default().fg(if listening { Color::Green } else { Color::DarkGray }),
            ),
            Span::raw("   "),
            Span::styled(
                if recorder.recording {
                    format!("recording {} event(s), {:.1}s", recorder.event_count, recorder.duration)
                } else {
                    String::new()
                },
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(""),
    ];

    match app.view {
        View::Scripts => {
            for (i, s) in app.runtime.store.all().iter().enumerate() {
                let prefix = if i == app.selected { "> " } else { "  " };
                let checkbox = if s.enabled { "[●]" } else { "[ ]" };
                let active = status.script_id.as_deref() == Some(s.id.as_str());
                let mut spans = vec![
                    Span::raw(prefix),
                    Span::styled(checkbox, Style::default().fg(if active { banner_bg } else { Color::Cyan })),
                    Span::raw(" "),
                    Span::styled(s.name.clone(), Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
                ];
                if let Some(hk) = s.hotkey.as_deref().filter(|h| !h.is_empty()) {
                    spans.push(Span::styled(format!("  {}", hk), Style::default().fg(Color::Yellow)));
                }
                spans.push(Span::styled(format!("  {}", s.id), Style::default().fg(Color::DarkGray)));
                if let Some(issue) = script::check(&s.content).first() {
                    let color = if issue.severity == Severity::Error { Color::Red } else { Color::Yellow };
                    spans.push(Span::styled(
                        format!("  ! line {}: {}", issue.line, issue.message),
                        Style::default().fg(color),
                    ));
                }
                lines.push(Line::from(spans));
            }
        }
        View::History => {
            for (i, r) in app.runtime.history.all().iter().rev().enumerate() {
                let prefix = if i == app.selected { "> " } else { "  " };
                let color = match r.status {
                    Outcome::Success => Color::Green,
                    Outcome::Stopped => Color::Yellow,
                    Outcome::Error => Color::Red,
                };
                let mut spans = vec![
                    Span::raw(prefix),
                    Span::styled(format!("{:<8}", format!("{:?}", r.status).to_lowercase()), Style::default().fg(color)),
                    Span::styled(r.script_id.clone(), Style::default().fg(Color::White)),
                    Span::styled(format!("  {:.3}s  {}", r.duration, r.timestamp), Style::default().fg(Color::DarkGray)),
                ];
                if let Some(e) = &r.error {
                    spans.push(Span::styled(format!("  {}", e), Style::default().fg(Color::Red)));
                }
                lines.push(Line::from(spans));
            }
        }
    }

    // banner (1 line) + list
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(chunks[0]);

    let banner_width = left_chunks[0].width as usize;
    let pad_total = banner_width.saturating_sub(banner_label.chars().count());
    let pad_left = pad_total / 2;
    let pad_right = pad_total - pad_left;
    let centered_banner = format!("{}{}{}", " ".repeat(pad_left), banner_label, " ".repeat(pad_right));
    let banner = Paragraph::new(Line::from(Span::styled(
        centered_banner,
        Style::default().fg(Color::Black).bg(banner_bg).add_modifier(Modifier::BOLD),
    )));
    f.render_widget(banner, left_chunks[0]);

    let list = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(list, left_chunks[1]);

    if app.log_visible && chunks.len() > 1 {
        let visible_height = chunks[1].height.saturating_sub(2) as usize;
        let total = app.log_messages.len();
        let max_scroll = total.saturating_sub(visible_height);
        let scroll = app.log_scroll.min(max_scroll);
        let start = total.saturating_sub(visible_height + scroll);
        let end = total.saturating_sub(scroll);
        let log_lines: Vec<Line> = app.log_messages[start..end].iter().map(|m| parse_log_line(m)).collect();

        let log_panel = Paragraph::new(log_lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Logs ")
                    .border_style(Style::default().fg(Color::Yellow)),
            )
            .wrap(Wrap { trim: false });
        f.render_widget(log_panel, chunks[1]);
    }

    if let Some((dialog, _)) = &app.confirm {
        dialog.render(f);
    }
}

/// Parse a structured log line (level\x1fprefix\x1fcolor\x1ftimestamp\x1fmessage)
/// into a colored Line for TUI rendering.
fn parse_log_line(raw: &str) -> Line<'_> {
    let parts: Vec<&str> = raw.splitn(5, '\x1f').collect();
    if parts.len() < 5 {
        return Line::from(raw);
    }

    let level = parts[0];
    let prefix = parts[1];
    let color_idx: u8 = parts[2].parse().unwrap_or(0);
    let timestamp = parts[3];
    let message = parts[4];

    let color = match color_idx {
        1 => Color::DarkGray,
        2 => Color::LightBlue,
        3 => Color::LightGreen,
        4 => Color::LightMagenta,
        _ => Color::White,
    };

    let mut spans = vec![
        Span::styled(timestamp, Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
    ];
    match level {
        "ERROR" => spans.push(Span::styled("error ", Style::default().fg(Color::Red))),
        "WARN" => spans.push(Span::styled("warn ", Style::default().fg(Color::Yellow))),
        _ => {}
    }
    if !prefix.is_empty() {
        spans.push(Span::styled(prefix, Style::default().fg(color).add_modifier(Modifier::BOLD)));
        spans.push(Span::raw(" "));
    }
    spans.push(Span::styled(message, Style::default().fg(color)));

    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_line_gets_level_tag() {
        let line = parse_log_line("WARN\x1fengine\x1f3\x1f12:00:00\x1fbusy");
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "12:00:00 warn engine busy");
    }

    #[test]
    fn plain_line_passes_through() {
        let line = parse_log_line("hello");
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "hello");
    }
}
