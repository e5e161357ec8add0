use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, MouseEventKind};
use ratatui::{backend::CrosstermBackend, Terminal};
use xxscript_core::types::Command;

use crate::ui;
use crate::App;

pub fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> anyhow::Result<()> {
    loop {
        if app.should_quit {
            return Ok(());
        }

        app.drain_logs();
        terminal.draw(|f| ui::draw(f, app))?;

        // 100ms poll keeps the engine banner fresh
        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        match event::read()? {
            Event::Key(key) => {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if let Some((dialog, _)) = app.confirm.as_mut() {
                    match key.code {
                        KeyCode::Left | KeyCode::Right | KeyCode::Tab | KeyCode::Char('h') | KeyCode::Char('l') => {
                            dialog.toggle()
                        }
                        KeyCode::Enter => app.answer_confirm(true),
                        KeyCode::Esc | KeyCode::Char('n') => app.answer_confirm(false),
                        KeyCode::Char('y') => {
                            dialog.selected = true;
                            app.answer_confirm(true);
                        }
                        _ => {}
                    }
                    continue;
                }
                match key.code {
                    KeyCode::Char('q') | KeyCode::Char('Q') => app.quit(),
                    KeyCode::Up | KeyCode::Char('k') | KeyCode::Char('K') => app.move_up(),
                    KeyCode::Down | KeyCode::Char('j') | KeyCode::Char('J') => app.move_down(),
                    KeyCode::Enter => app.run_selected(),
                    KeyCode::Char(' ') => app.toggle_selected(),
                    KeyCode::Char('s') | KeyCode::Char('S') => app.send(Command::Stop),
                    KeyCode::Char('p') | KeyCode::Char('P') => app.send(Command::TogglePause),
                    KeyCode::Char('h') | KeyCode::Char('H') => app.send(Command::ToggleListener),
                    KeyCode::Char('r') | KeyCode::Char('R') => app.send(Command::ToggleRecording),
                    KeyCode::Char('d') | KeyCode::Char('D') => app.delete_selected(),
                    KeyCode::Tab => app.switch_view(),
                    KeyCode::Char('l') | KeyCode::Char('L') => app.toggle_log(),
                    _ => {}
                }
            }
            Event::Mouse(mouse) => match mouse.kind {
                MouseEventKind::ScrollUp => app.scroll_log_up(3),
                MouseEventKind::ScrollDown => app.scroll_log_down(3),
                _ => {}
            },
            _ => {}
        }
    }
}
