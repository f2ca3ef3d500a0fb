//! Terminal UI for the VNC Bridge setup wizard.
//!
//! Renders a classic installer window inside the terminal:
//! - centered fixed-size frame titled "VNC Bridge Setup"
//! - ASCII logo banner column on the left
//! - wizard page content on the right
//! - bottom-right button row: [ Back ] [ Next ] [ Cancel ]
//!
//! The wizard flow itself (steps, gates, progress milestones) lives in
//! `crate::wizard`; this module renders that state and translates key presses
//! into controller calls. The installation runs on a worker thread and
//! reports back through an mpsc channel drained once per tick.
//!
//! Note: Logging is file-only in TUI mode. Writing log lines to stdout would
//! corrupt the alternate-screen drawing.

use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use log::info;
use ratatui::backend::{CrosstermBackend, TestBackend};
use ratatui::buffer::Buffer;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Margin, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use uuid::Uuid;

use crate::installer::{self, InstallArtifacts, InstallMode, ProgressEmitter, ProgressPayload};
use crate::wizard::{AdvanceOutcome, Step, WizardController};

const ASCII_LOGO: &str = r#"██╗   ██╗███╗   ██╗ ██████╗
██║   ██║████╗  ██║██╔════╝
██║   ██║██╔██╗ ██║██║
╚██╗ ██╔╝██║╚██╗██║██║
 ╚████╔╝ ██║ ╚████║╚██████╗
  ╚═══╝  ╚═╝  ╚═══╝ ╚═════╝

  Browser Extension Bridge
  for VNC Viewer"#;

/// Single-line text input with a cursor, edited in place by key events.
#[derive(Debug, Clone)]
struct TextInput {
    value: String,
    cursor: usize,
}

impl TextInput {
    fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let cursor = value.chars().count();
        TextInput { value, cursor }
    }

    /// Apply an editing key. Returns false when the key is not an editing key
    /// so the caller can treat it as navigation instead.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char(c) => {
                let byte_idx = self.byte_index();
                self.value.insert(byte_idx, c);
                self.cursor += 1;
                true
            }
            KeyCode::Backspace => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    let byte_idx = self.byte_index();
                    self.value.remove(byte_idx);
                }
                true
            }
            KeyCode::Delete => {
                if self.cursor < self.value.chars().count() {
                    let byte_idx = self.byte_index();
                    self.value.remove(byte_idx);
                }
                true
            }
            KeyCode::Left => {
                self.cursor = self.cursor.saturating_sub(1);
                true
            }
            KeyCode::Right => {
                self.cursor = (self.cursor + 1).min(self.value.chars().count());
                true
            }
            KeyCode::Home => {
                self.cursor = 0;
                true
            }
            KeyCode::End => {
                self.cursor = self.value.chars().count();
                true
            }
            _ => false,
        }
    }

    fn byte_index(&self) -> usize {
        self.value
            .char_indices()
            .nth(self.cursor)
            .map(|(i, _)| i)
            .unwrap_or(self.value.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonFocus {
    Back,
    Reinstall,
    Next,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FocusTarget {
    Field(usize),
    Button(ButtonFocus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Modal {
    ConfirmCancel,
    Message { title: String, body: String },
}

/// Messages sent from the install worker thread back to the UI loop.
#[derive(Debug, Clone)]
enum UiMsg {
    InstallProgress(ProgressPayload),
    InstallFinished {
        success: bool,
        message: String,
        correlation_id: String,
        artifacts: Option<InstallArtifacts>,
    },
}

#[derive(Debug)]
struct WizardState {
    ctrl: WizardController,
    id_input: TextInput,
    modal: Option<Modal>,
    focus: FocusTarget,
    quit: bool,
    install_started: bool,
    install_progress: Option<ProgressPayload>,
    install_detail: Vec<String>,
    install_correlation_id: Option<String>,
    install_artifacts: Option<InstallArtifacts>,
}

impl WizardState {
    /// Real interactive run: do not seed any sample or demo values here.
    /// Only `smoke(...)` is allowed to stage pages with sample state.
    fn new(install_root: PathBuf, dist_source: PathBuf) -> Self {
        Self::from_controller(WizardController::new(install_root, dist_source))
    }

    fn from_controller(ctrl: WizardController) -> Self {
        WizardState {
            ctrl,
            id_input: TextInput::new(""),
            modal: None,
            focus: FocusTarget::Button(ButtonFocus::Next),
            quit: false,
            install_started: false,
            install_progress: None,
            install_detail: Vec::new(),
            install_correlation_id: None,
            install_artifacts: None,
        }
    }
}

/// Run the interactive wizard until the user finishes or cancels.
pub fn run(install_root: PathBuf, dist_source: PathBuf) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let result = run_loop(&mut terminal, install_root, dist_source);
    restore_terminal(&mut terminal)?;
    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    install_root: PathBuf,
    dist_source: PathBuf,
) -> Result<()> {
    let (tx, rx) = mpsc::channel::<UiMsg>();
    let mut state = WizardState::new(install_root, dist_source);
    info!(
        "[PHASE: tui] [STEP: startup] wizard UI started (mode={:?})",
        state.ctrl.mode()
    );

    let tick = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    while !state.quit {
        drain_messages(&mut state, &rx);
        terminal.draw(|f| draw(f.size(), f, &state))?;

        let timeout = tick.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(&mut state, key.code, &tx);
                }
            }
        }
        if last_tick.elapsed() >= tick {
            last_tick = Instant::now();
        }
    }
    info!("[PHASE: tui] [STEP: shutdown] wizard UI closed");
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Render one staged page to an in-memory backend and verify the frame came
/// out. No terminal, no key handling, no filesystem writes.
pub fn smoke(target: Option<String>) -> Result<()> {
    let name = target.unwrap_or_else(|| "welcome".to_string());
    let state = new_smoke_wizard_state(&name)?;

    let backend = TestBackend::new(100, 30);
    let mut terminal = Terminal::new(backend)?;
    terminal.draw(|f| draw(f.size(), f, &state))?;

    let rendered = buffer_to_string(terminal.backend().buffer());
    anyhow::ensure!(
        rendered.contains("VNC Bridge Setup"),
        "window frame missing from smoke render of {:?}",
        name
    );
    anyhow::ensure!(
        rendered.contains(state.ctrl.title()),
        "page title {:?} missing from smoke render of {:?}",
        state.ctrl.title(),
        name
    );
    info!(
        "[PHASE: smoke] [STEP: tui] rendered {:?} page ({:?}, progress={}%)",
        name,
        state.ctrl.step(),
        state.ctrl.progress()
    );
    Ok(())
}

/// Sample values are allowed here only; `WizardState::new` must stay clean.
fn new_smoke_wizard_state(target: &str) -> Result<WizardState> {
    let smoke_root = std::env::temp_dir().join("vnc-bridge-smoke");
    let install_root = smoke_root.join("extension");
    let dist_source = smoke_root.join("dist");
    let fresh = || {
        WizardController::with_mode(install_root.clone(), dist_source.clone(), InstallMode::Fresh)
    };
    let update = || {
        WizardController::with_mode(install_root.clone(), dist_source.clone(), InstallMode::Update)
    };
    let staged = |mut ctrl: WizardController, step: Step| {
        ctrl.seed_step_for_preview(step);
        WizardState::from_controller(ctrl)
    };

    let state = match target {
        "welcome" => WizardState::from_controller(fresh()),
        "install" => {
            let mut ctrl = fresh();
            ctrl.seed_step_for_preview(Step::InstallFiles);
            ctrl.raise_progress_to(10);
            let mut state = WizardState::from_controller(ctrl);
            state.install_started = true;
            state.install_correlation_id =
                Some("00000000-0000-0000-0000-000000000000".to_string());
            state.install_progress = Some(ProgressPayload {
                correlation_id: "00000000-0000-0000-0000-000000000000".to_string(),
                step: "extract".to_string(),
                severity: "info".to_string(),
                phase: "install".to_string(),
                percent: 10,
                message: "Installing files...".to_string(),
                elapsed_ms: Some(120),
            });
            state.install_detail = vec![
                "Starting installation...".to_string(),
                "Installing files...".to_string(),
            ];
            state
        }
        "developer-mode" => staged(fresh(), Step::GuideDeveloperMode),
        "load-extension" => staged(fresh(), Step::GuideLoadExtension),
        "copy-id" => staged(fresh(), Step::GuideCopyId),
        "enter-id" => {
            let mut state = staged(fresh(), Step::GuideEnterId);
            state.id_input = TextInput::new("abcdefghijklmnop");
            state.ctrl.set_extension_id(state.id_input.value.clone());
            state.focus = FocusTarget::Field(0);
            state
        }
        "refresh" => staged(fresh(), Step::GuideRefresh),
        "update-refresh" => staged(update(), Step::GuideRefresh),
        "cancel" => {
            let mut state = WizardState::from_controller(fresh());
            state.modal = Some(Modal::ConfirmCancel);
            state.focus = FocusTarget::Button(ButtonFocus::Next);
            state
        }
        "error" => {
            let mut state = staged(fresh(), Step::GuideEnterId);
            state.modal = Some(Modal::Message {
                title: "Error".to_string(),
                body: crate::wizard::BIND_FAILED_MESSAGE.to_string(),
            });
            state.focus = FocusTarget::Button(ButtonFocus::Next);
            state
        }
        other => anyhow::bail!("Unknown smoke target: {}", other),
    };
    Ok(state)
}

fn buffer_to_string(buffer: &Buffer) -> String {
    let mut out = String::new();
    for y in 0..buffer.area.height {
        for x in 0..buffer.area.width {
            out.push_str(buffer.get(x, y).symbol());
        }
        out.push('\n');
    }
    out
}

// ---------------------------------------------------------------------------
// Install worker
// ---------------------------------------------------------------------------

/// Kick off the installation on a worker thread. The UI keeps drawing while
/// the worker reports progress through the channel.
fn start_install(state: &mut WizardState, tx: &mpsc::Sender<UiMsg>) {
    if state.install_started {
        return;
    }
    state.install_started = true;
    state.install_detail.clear();
    state.install_progress = Some(ProgressPayload {
        correlation_id: "pending".to_string(),
        step: "start".to_string(),
        severity: "info".to_string(),
        phase: "install".to_string(),
        percent: 0,
        message: "Installing files...".to_string(),
        elapsed_ms: None,
    });

    let req = state.ctrl.install_request();
    let tx = tx.clone();
    thread::spawn(move || {
        let correlation_id = Uuid::new_v4().to_string();
        let tx_progress = tx.clone();
        let emit: ProgressEmitter = Arc::new(move |payload: ProgressPayload| {
            let _ = tx_progress.send(UiMsg::InstallProgress(payload));
        });

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build();
        match rt {
            Ok(rt) => {
                match rt.block_on(installer::run_installation(req, correlation_id.clone(), emit)) {
                    Ok(artifacts) => {
                        let _ = tx.send(UiMsg::InstallFinished {
                            success: true,
                            message: "File installation completed!".to_string(),
                            correlation_id,
                            artifacts: Some(artifacts),
                        });
                    }
                    Err(e) => {
                        let _ = tx.send(UiMsg::InstallFinished {
                            success: false,
                            message: e.to_string(),
                            correlation_id,
                            artifacts: None,
                        });
                    }
                }
            }
            Err(e) => {
                let _ = tx.send(UiMsg::InstallFinished {
                    success: false,
                    message: format!("Internal error starting installer: {}", e),
                    correlation_id,
                    artifacts: None,
                });
            }
        }
    });
}

fn drain_messages(state: &mut WizardState, rx: &mpsc::Receiver<UiMsg>) {
    while let Ok(msg) = rx.try_recv() {
        match msg {
            UiMsg::InstallProgress(payload) => {
                if state.ctrl.step() != Step::InstallFiles {
                    continue;
                }
                if state.install_correlation_id.is_none() {
                    state.install_correlation_id = Some(payload.correlation_id.clone());
                }
                state.ctrl.raise_progress_to(payload.percent);
                if !payload.message.is_empty() {
                    state.install_detail.push(payload.message.clone());
                    if state.install_detail.len() > 20 {
                        let start = state.install_detail.len() - 20;
                        state.install_detail = state.install_detail[start..].to_vec();
                    }
                }
                state.install_progress = Some(payload);
            }
            UiMsg::InstallFinished {
                success,
                message,
                correlation_id,
                artifacts,
            } => {
                state.install_correlation_id = Some(correlation_id);
                if success {
                    if let Some(artifacts) = artifacts.as_ref() {
                        state.ctrl.record_install_success(artifacts);
                    }
                    state.install_artifacts = artifacts;
                } else {
                    state.ctrl.record_install_failure(&message);
                    state.modal = Some(Modal::Message {
                        title: "Installation failed".to_string(),
                        body: message,
                    });
                    state.focus = FocusTarget::Button(ButtonFocus::Next);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Key handling
// ---------------------------------------------------------------------------

fn focused_button(state: &WizardState) -> ButtonFocus {
    match state.focus {
        FocusTarget::Button(b) => b,
        FocusTarget::Field(_) => ButtonFocus::Next,
    }
}

fn set_focused_button(state: &mut WizardState, button: ButtonFocus) {
    state.focus = FocusTarget::Button(button);
}

fn page_field_count(state: &WizardState) -> usize {
    match state.ctrl.step() {
        Step::GuideEnterId => 1,
        _ => 0,
    }
}

fn reset_focus_for_page(state: &mut WizardState) {
    if page_field_count(state) > 0 {
        state.focus = FocusTarget::Field(0);
    } else {
        set_focused_button(state, ButtonFocus::Next);
    }
}

/// Whether the worker thread is still installing (a confirmed cancel must be
/// forwarded to it instead of quitting outright).
fn install_running(state: &WizardState) -> bool {
    state.install_started
        && state.ctrl.step() == Step::InstallFiles
        && !state.ctrl.session.install_done
        && state.ctrl.session.install_error.is_none()
}

fn focused_text_input_mut(state: &mut WizardState) -> Option<&mut TextInput> {
    if state.ctrl.step() == Step::GuideEnterId && matches!(state.focus, FocusTarget::Field(0)) {
        Some(&mut state.id_input)
    } else {
        None
    }
}

fn handle_key(state: &mut WizardState, code: KeyCode, tx: &mpsc::Sender<UiMsg>) {
    // Modals swallow all input until dismissed.
    if let Some(modal) = state.modal.clone() {
        match modal {
            Modal::ConfirmCancel => match code {
                KeyCode::Left | KeyCode::Right | KeyCode::Tab => {
                    let toggled = if focused_button(state) == ButtonFocus::Cancel {
                        ButtonFocus::Next
                    } else {
                        ButtonFocus::Cancel
                    };
                    set_focused_button(state, toggled);
                }
                KeyCode::Enter => {
                    let confirmed = focused_button(state) == ButtonFocus::Cancel;
                    state.modal = None;
                    if confirmed {
                        if install_running(state) {
                            installer::request_cancel();
                            state
                                .install_detail
                                .push("Cancelling installation...".to_string());
                            set_focused_button(state, ButtonFocus::Cancel);
                        } else {
                            state.quit = true;
                        }
                    }
                }
                KeyCode::Esc => {
                    state.modal = None;
                }
                _ => {}
            },
            Modal::Message { .. } => {
                if matches!(code, KeyCode::Enter | KeyCode::Esc) {
                    state.modal = None;
                    reset_focus_for_page(state);
                }
            }
        }
        return;
    }

    // Esc asks for confirmation instead of quitting outright; "No" is the
    // preselected answer.
    if code == KeyCode::Esc {
        state.modal = Some(Modal::ConfirmCancel);
        set_focused_button(state, ButtonFocus::Next);
        return;
    }

    if let Some(input) = focused_text_input_mut(state) {
        if input.handle_key(code) {
            let value = state.id_input.value.clone();
            state.ctrl.set_extension_id(value);
            return;
        }
    }

    if code == KeyCode::Tab {
        let fields = page_field_count(state);
        let next = match state.focus {
            FocusTarget::Button(ButtonFocus::Back) => {
                if state.ctrl.can_reinstall() {
                    FocusTarget::Button(ButtonFocus::Reinstall)
                } else {
                    FocusTarget::Button(ButtonFocus::Next)
                }
            }
            FocusTarget::Button(ButtonFocus::Reinstall) => FocusTarget::Button(ButtonFocus::Next),
            FocusTarget::Button(ButtonFocus::Next) => FocusTarget::Button(ButtonFocus::Cancel),
            FocusTarget::Button(ButtonFocus::Cancel) => {
                if fields > 0 {
                    FocusTarget::Field(0)
                } else {
                    FocusTarget::Button(ButtonFocus::Back)
                }
            }
            FocusTarget::Field(i) => {
                if i + 1 < fields {
                    FocusTarget::Field(i + 1)
                } else {
                    FocusTarget::Button(ButtonFocus::Back)
                }
            }
        };
        state.focus = next;
        return;
    }

    if code == KeyCode::Enter {
        match focused_button(state) {
            ButtonFocus::Back => {
                if state.ctrl.can_go_back() {
                    state.ctrl.go_back();
                    reset_focus_for_page(state);
                }
            }
            ButtonFocus::Reinstall => {
                if state.ctrl.can_reinstall() {
                    state.ctrl.reinstall();
                    state.id_input = TextInput::new("");
                    state.install_started = false;
                    state.install_progress = None;
                    state.install_detail.clear();
                    state.install_correlation_id = None;
                    state.install_artifacts = None;
                    set_focused_button(state, ButtonFocus::Next);
                }
            }
            ButtonFocus::Next => {
                activate_next(state, tx);
            }
            ButtonFocus::Cancel => {
                state.modal = Some(Modal::ConfirmCancel);
                set_focused_button(state, ButtonFocus::Next);
            }
        }
    }
}

fn activate_next(state: &mut WizardState, tx: &mpsc::Sender<UiMsg>) {
    match state.ctrl.advance() {
        AdvanceOutcome::Moved(step) => {
            if step == Step::InstallFiles {
                start_install(state, tx);
            }
            reset_focus_for_page(state);
        }
        AdvanceOutcome::Finished => {
            state.quit = true;
        }
        AdvanceOutcome::Blocked => {}
        AdvanceOutcome::BindFailed(message) => {
            state.modal = Some(Modal::Message {
                title: "Error".to_string(),
                body: message,
            });
            state.focus = FocusTarget::Button(ButtonFocus::Next);
        }
    }
}

// ---------------------------------------------------------------------------
// Drawing
// ---------------------------------------------------------------------------

fn draw(area: Rect, f: &mut Frame<'_>, state: &WizardState) {
    let window_area = centered_window(area, 100, 30);
    let window = Block::default()
        .borders(Borders::ALL)
        .title(" VNC Bridge Setup ");
    f.render_widget(window, window_area);

    let inner = window_area.inner(&Margin {
        vertical: 1,
        horizontal: 1,
    });
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(inner);
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(34), Constraint::Min(0)])
        .split(rows[0]);

    draw_banner(f, cols[0]);
    draw_page(f, cols[1], state);
    draw_buttons(f, rows[1], state);

    if let Some(modal) = state.modal.as_ref() {
        match modal {
            Modal::ConfirmCancel => draw_cancel_modal(f, window_area, state),
            Modal::Message { title, body } => draw_message_modal(f, window_area, title, body),
        }
    }
}

fn centered_window(area: Rect, width: u16, height: u16) -> Rect {
    let w = width
        .min(area.width.saturating_sub(2))
        .max(60)
        .min(area.width);
    let h = height
        .min(area.height.saturating_sub(2))
        .max(20)
        .min(area.height);
    Rect {
        x: area.x + area.width.saturating_sub(w) / 2,
        y: area.y + area.height.saturating_sub(h) / 2,
        width: w,
        height: h,
    }
}

fn draw_banner(f: &mut Frame<'_>, area: Rect) {
    let logo = Paragraph::new(ASCII_LOGO)
        .block(Block::default().borders(Borders::ALL))
        .wrap(Wrap { trim: false });
    f.render_widget(logo, area);
}

fn draw_page(f: &mut Frame<'_>, area: Rect, state: &WizardState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", state.ctrl.title()));
    f.render_widget(block, area);
    let inner = area.inner(&Margin {
        vertical: 1,
        horizontal: 1,
    });
    let para = Paragraph::new(page_text(state)).wrap(Wrap { trim: false });
    f.render_widget(para, inner);
}

fn mode_label(mode: InstallMode) -> &'static str {
    match mode {
        InstallMode::Fresh => "Fresh installation",
        InstallMode::Update => "Update mode",
    }
}

fn progress_bar_line(percent: i32) -> String {
    let width = 30usize;
    let pct = percent.clamp(0, 100) as usize;
    let filled = pct * width / 100;
    format!(
        "[{}{}] {}%",
        "#".repeat(filled),
        " ".repeat(width - filled),
        pct
    )
}

fn page_text(state: &WizardState) -> Text<'static> {
    let session = &state.ctrl.session;
    match state.ctrl.step() {
        Step::Welcome => Text::from(vec![
            Line::from("This wizard installs the Chrome browser extension and"),
            Line::from("registers the VNC Viewer native messaging host."),
            Line::from(""),
            Line::from(format!("Installation mode: {}", mode_label(session.mode))),
            Line::from(format!(
                "Installation path: {}",
                session.install_root.display()
            )),
            Line::from(""),
            Line::from("⚠ If the directory already exists, it will be cleaned up"),
            Line::from("  before the new files are copied."),
            Line::from(""),
            Line::from("Press Start Installation to begin."),
        ]),
        Step::InstallFiles => {
            let mut lines = vec![
                Line::from("This step performs:"),
                Line::from("• Chrome browser extension file installation"),
                Line::from("• VNC Viewer native messaging host registration"),
                Line::from(""),
                Line::from(format!("Installation mode: {}", mode_label(session.mode))),
                Line::from(format!(
                    "Installation path: {}",
                    session.install_root.display()
                )),
                Line::from(""),
                Line::from(progress_bar_line(state.ctrl.progress())),
            ];

            let status = if let Some(err) = session.install_error.as_ref() {
                err.clone()
            } else if session.install_done {
                "File installation completed!".to_string()
            } else if let Some(p) = state.install_progress.as_ref() {
                p.message.clone()
            } else {
                "Waiting to start...".to_string()
            };
            lines.push(Line::from(format!("Current action: {}", status)));
            lines.push(Line::from(""));

            if state.install_detail.is_empty() {
                lines.push(Line::from("(no details yet)"));
            } else {
                for detail in state.install_detail.iter().rev().take(10).rev() {
                    lines.push(Line::from(detail.clone()));
                }
            }

            if session.install_done {
                if let Some(artifacts) = state.install_artifacts.as_ref() {
                    lines.push(Line::from(""));
                    lines.push(Line::from(format!(
                        "Files copied: {} ({} bytes)",
                        artifacts.files_copied, artifacts.bytes_copied
                    )));
                }
                lines.push(Line::from("Press Next to continue."));
            }
            if session.install_error.is_some() {
                if let Some(id) = state.install_correlation_id.as_ref() {
                    lines.push(Line::from(""));
                    lines.push(Line::from(format!("Run id: {}", id)));
                }
            }
            Text::from(lines)
        }
        Step::GuideDeveloperMode => Text::from(vec![
            Line::from("1. Open Chrome browser"),
            Line::from("2. Type in address bar: chrome://extensions/"),
            Line::from("3. Find the \"Developer mode\" switch in the top right corner"),
            Line::from("4. Click to enable developer mode"),
            Line::from(""),
            Line::from("After enabling, you will see the \"Load unpacked\" button."),
        ]),
        Step::GuideLoadExtension => Text::from(vec![
            Line::from("1. Click the \"Load unpacked\" button"),
            Line::from("2. Select the installation folder:"),
            Line::from(format!("   {}", session.install_root.display())),
            Line::from("3. Confirm to load the extension"),
            Line::from(""),
            Line::from("The extension now appears in the extension list."),
        ]),
        Step::GuideCopyId => Text::from(vec![
            Line::from("1. Find the newly loaded extension in the list"),
            Line::from("2. The ID is shown on the extension card"),
            Line::from("3. Select the full ID and copy it"),
            Line::from(""),
            Line::from("A Chrome extension ID is 32 lowercase letters."),
        ]),
        Step::GuideEnterId => {
            let prefix = if matches!(state.focus, FocusTarget::Field(0)) {
                ">"
            } else {
                " "
            };
            let mut lines = vec![
                Line::from("Please paste the extension ID copied in the previous step"),
                Line::from("into the input box below:"),
                Line::from(""),
                Line::from(format!("{} Extension ID: {}", prefix, state.id_input.value)),
            ];
            let entered = session.extension_id.trim();
            if !entered.is_empty() {
                if !crate::utils::validation::extension_id_meets_gate(entered) {
                    lines.push(Line::from("The extension ID looks too short."));
                } else if matches!(
                    crate::utils::validation::looks_like_chrome_extension_id(entered),
                    Ok(false)
                ) {
                    lines.push(Line::from(
                        "Hint: a Chrome extension ID is 32 letters from a to p.",
                    ));
                }
            }
            lines.push(Line::from(""));
            lines.push(Line::from("Tab to edit the field."));
            Text::from(lines)
        }
        Step::GuideRefresh => match session.mode {
            InstallMode::Update => {
                let mut lines = vec![
                    Line::from("1. Open chrome://extensions/ in Chrome"),
                    Line::from("2. Find the extension card"),
                    Line::from("3. Click the refresh button on the card"),
                    Line::from(""),
                    Line::from("Note: Since this is an update installation, you need to"),
                    Line::from("refresh the extension for the changes to take effect."),
                    Line::from(""),
                ];
                if state.ctrl.can_reinstall() {
                    lines.push(Line::from(
                        "Reinstall starts over with a fresh installation.",
                    ));
                    lines.push(Line::from(""));
                }
                lines.push(Line::from("Press Finish to close the wizard."));
                Text::from(lines)
            }
            InstallMode::Fresh => Text::from(vec![
                Line::from("1. Return to chrome://extensions/"),
                Line::from("2. Click the refresh button on the extension card"),
                Line::from(""),
                Line::from("The entered extension ID is now bound to the native"),
                Line::from("messaging host; refreshing applies it."),
                Line::from(""),
                Line::from("Press Finish to close the wizard."),
            ]),
        },
    }
}

fn draw_buttons(f: &mut Frame<'_>, area: Rect, state: &WizardState) {
    let focused = |b: ButtonFocus| matches!(state.focus, FocusTarget::Button(fb) if fb == b);
    let mut spans: Vec<Span> = Vec::new();
    spans.push(button_text(
        "Back",
        focused(ButtonFocus::Back),
        state.ctrl.can_go_back(),
    ));
    spans.push(Span::raw(" "));
    if state.ctrl.can_reinstall() {
        spans.push(button_text(
            "Reinstall",
            focused(ButtonFocus::Reinstall),
            true,
        ));
        spans.push(Span::raw(" "));
    }
    spans.push(button_text(
        state.ctrl.next_label(),
        focused(ButtonFocus::Next),
        state.ctrl.can_advance(),
    ));
    spans.push(Span::raw(" "));
    spans.push(button_text("Cancel", focused(ButtonFocus::Cancel), true));

    let row = Paragraph::new(Line::from(spans)).alignment(Alignment::Right);
    f.render_widget(row, area);
}

fn button_text(label: &str, focused: bool, enabled: bool) -> Span<'static> {
    let text = format!("[ {} ]", label);
    let mut style = Style::default();
    if !enabled {
        style = style.fg(Color::DarkGray);
    }
    if focused && enabled {
        style = style.add_modifier(Modifier::REVERSED);
    }
    Span::styled(text, style)
}

fn draw_cancel_modal(f: &mut Frame<'_>, window_area: Rect, state: &WizardState) {
    let w = 56.min(window_area.width.saturating_sub(4)).max(40);
    let h = 7u16;
    let area = Rect {
        x: window_area.x + window_area.width.saturating_sub(w) / 2,
        y: window_area.y + window_area.height.saturating_sub(h) / 2,
        width: w,
        height: h,
    };
    f.render_widget(Clear, area);
    f.render_widget(
        Block::default()
            .borders(Borders::ALL)
            .title(" Cancel Setup? "),
        area,
    );
    let inner = area.inner(&Margin {
        vertical: 1,
        horizontal: 1,
    });
    let body = Paragraph::new("If you cancel now, the installation may be incomplete.")
        .wrap(Wrap { trim: false });
    f.render_widget(body, inner);

    let buttons_area = Rect {
        x: area.x + 1,
        y: area.y + area.height - 2,
        width: area.width - 2,
        height: 1,
    };
    let yes = button_text(
        "Yes, cancel",
        focused_button(state) == ButtonFocus::Cancel,
        true,
    );
    let no = button_text("No", focused_button(state) == ButtonFocus::Next, true);
    let row =
        Paragraph::new(Line::from(vec![yes, Span::raw(" "), no])).alignment(Alignment::Right);
    f.render_widget(row, buttons_area);
}

fn draw_message_modal(f: &mut Frame<'_>, window_area: Rect, title: &str, body: &str) {
    let w = 70.min(window_area.width.saturating_sub(4)).max(40);
    let h = 10.min(window_area.height.saturating_sub(4)).max(7);
    let area = Rect {
        x: window_area.x + window_area.width.saturating_sub(w) / 2,
        y: window_area.y + window_area.height.saturating_sub(h) / 2,
        width: w,
        height: h,
    };
    f.render_widget(Clear, area);
    f.render_widget(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" {} ", title)),
        area,
    );
    let inner = area.inner(&Margin {
        vertical: 1,
        horizontal: 1,
    });
    let text = Paragraph::new(body.to_string()).wrap(Wrap { trim: false });
    f.render_widget(text, inner);

    let buttons_area = Rect {
        x: area.x + 1,
        y: area.y + area.height - 2,
        width: area.width - 2,
        height: 1,
    };
    let ok = button_text("OK", true, true);
    let row = Paragraph::new(Line::from(vec![ok])).alignment(Alignment::Right);
    f.render_widget(row, buttons_area);
}
