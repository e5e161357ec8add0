use std::sync::{mpsc, Arc};

use xxscript_core::runtime::Runtime;
use xxscript_core::types::{Command, Script};

use crate::confirm::ConfirmDialog;

/// Which list the left panel shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Scripts,
    History,
}

pub struct App {
    pub runtime: Arc<Runtime>,
    pub view: View,
    pub selected: usize,
    pub log_visible: bool,
    pub log_messages: Vec<String>,
    pub log_scroll: usize, // scroll offset from bottom (0 = latest)
    pub log_rx: mpsc::Receiver<String>,
    pub cmd_tx: mpsc::Sender<Command>,
    pub confirm: Option<(ConfirmDialog, Command)>,
    pub should_quit: bool,
}

impl App {
    pub fn new(runtime: Arc<Runtime>, log_rx: mpsc::Receiver<String>, cmd_tx: mpsc::Sender<Command>) -> Self {
        Self {
            runtime,
            view: View::Scripts,
            selected: 0,
            log_visible: true,
            log_messages: Vec::new(),
            log_scroll: 0,
            log_rx,
            cmd_tx,
            confirm: None,
            should_quit: false,
        }
    }

    pub fn drain_logs(&mut self) {
        while let Ok(msg) = self.log_rx.try_recv() {
            self.log_messages.push(msg);
        }
    }

    pub fn scroll_log_up(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_add(n);
    }

    pub fn scroll_log_down(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(n);
    }

    fn selected_script(&self) -> Option<Script> {
        self.runtime.store.all().into_iter().nth(self.selected)
    }

    pub fn move_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn move_down(&mut self) {
        let len = match self.view {
            View::Scripts => self.runtime.store.all().len(),
            View::History => self.runtime.history.all().len(),
        };
        if self.selected + 1 < len {
            self.selected += 1;
        }
    }

    pub fn switch_view(&mut self) {
        self.view = match self.view {
            View::Scripts => View::History,
            View::History => View::Scripts,
        };
        self.selected = 0;
    }

    pub fn run_selected(&mut self) {
        if let Some(s) = self.selected_script() {
            self.send(Command::Run(s.id));
        }
    }

    pub fn toggle_selected(&mut self) {
        if let Some(s) = self.selected_script() {
            self.send(Command::ToggleEnabled(s.id));
        }
    }

    /// Ask before deleting the selected script, or clearing history in the history view.
    pub fn delete_selected(&mut self) {
        let pending = match self.view {
            View::Scripts => self
                .selected_script()
                .map(|s| (ConfirmDialog::new(format!("Delete {}?", s.name)), Command::Delete(s.id))),
            View::History => Some((ConfirmDialog::new("Clear all history?"), Command::ClearHistory)),
        };
        self.confirm = pending;
    }

    /// Close the open dialog, sending its command if Yes was chosen.
    pub fn answer_confirm(&mut self, accept: bool) {
        if let Some((dialog, cmd)) = self.confirm.take() {
            if accept && dialog.selected {
                self.send(cmd);
                self.selected = self.selected.saturating_sub(1);
            }
        }
    }

    pub fn send(&mut self, cmd: Command) {
        self.cmd_tx.send(cmd).ok();
    }

    pub fn toggle_log(&mut self) {
        self.log_visible = !self.log_visible;
    }

    pub fn quit(&mut self) {
        self.cmd_tx.send(Command::Quit).ok();
        self.should_quit = true;
    }
}
