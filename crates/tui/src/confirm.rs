use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

/// Yes/No dialog guarding destructive commands. Defaults to No.
pub struct ConfirmDialog {
    pub message: String,
    pub selected: bool, // true = Yes
}

impl ConfirmDialog {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), selected: false }
    }

    pub fn toggle(&mut self) {
        self.selected = !self.selected;
    }

    pub fn render(&self, f: &mut Frame) {
        let area = f.area();
        let area = centered_rect(dialog_width(&self.message, area.width), 7, area);

        f.render_widget(Clear, area);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Confirm ");

        let inner = block.inner(area);
        f.render_widget(block, area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1); 4])
            .split(inner);

        let msg = Paragraph::new(Line::from(Span::styled(
            &self.message,
            Style::default().fg(Color::White),
        )))
        .alignment(ratatui::layout::Alignment::Center);
        f.render_widget(msg, chunks[1]);

        let yes_style = if self.selected {
            Style::default().fg(Color::Black).bg(Color::Green).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let no_style = if !self.selected {
            Style::default().fg(Color::Black).bg(Color::Red).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        let buttons = Line::from(vec![
            Span::styled("  [Yes]  ", yes_style),
            Span::raw("   "),
            Span::styled("  [No]  ", no_style),
        ]);
        let buttons_para = Paragraph::new(buttons)
            .alignment(ratatui::layout::Alignment::Center);
        f.render_widget(buttons_para, chunks[3]);
    }
}

/// Message width plus padding, at least 32 columns and never wider than the frame.
fn dialog_width(message: &str, max: u16) -> u16 {
    let text = u16::try_from(message.chars().count()).unwrap_or(u16::MAX);
    text.saturating_add(8).max(32).min(max)
}

/// Return a centered `Rect` of `width` columns and `height` rows inside `area`.
fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialog_defaults_to_no() {
        let mut d = ConfirmDialog::new("Delete?");
        assert!(!d.selected);
        d.toggle();
        assert!(d.selected);
    }

    #[test]
    fn centered_rect_is_clamped() {
        let r = centered_rect(50, 10, Rect::new(0, 0, 40, 8));
        assert_eq!(r, Rect::new(0, 0, 40, 8));
        let r = centered_rect(10, 2, Rect::new(0, 0, 40, 8));
        assert_eq!(r, Rect::new(15, 3, 10, 2));
    }

    #[test]
    fn width_fits_message_and_frame() {
        assert_eq!(dialog_width("Delete?", 120), 32);
        assert_eq!(dialog_width(&"x".repeat(40), 120), 48);
        assert_eq!(dialog_width(&"x".repeat(70_000), 120), 120);
        assert_eq!(dialog_width("Delete?", 20), 20);
    }
}
