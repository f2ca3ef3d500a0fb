// Wizard flow control for the extension installer.
//
// The controller is a pure state machine: a fixed step sequence with
// update-vs-fresh branching, a monotonic progress percentage, and gates that
// block advancement until a step's exit condition holds. Rendering lives in
// the TUI layer; installation I/O lives in `installer` and runs on a worker
// thread that reports back through progress events.

use log::{error, info};
use std::path::PathBuf;

use crate::installer::{self, InstallArtifacts, InstallMode, InstallRequest};
use crate::template;
use crate::utils::validation;

/// Error text surfaced when binding the entered id into the manifest fails.
pub const BIND_FAILED_MESSAGE: &str =
    "Extension ID replacement failed, please check if configuration file exists";

/// Ordered wizard steps. Update mode skips the three in-browser guide steps
/// between InstallFiles and GuideRefresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Welcome,
    InstallFiles,
    GuideDeveloperMode,
    GuideLoadExtension,
    GuideCopyId,
    GuideEnterId,
    GuideRefresh,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::Welcome,
        Step::InstallFiles,
        Step::GuideDeveloperMode,
        Step::GuideLoadExtension,
        Step::GuideCopyId,
        Step::GuideEnterId,
        Step::GuideRefresh,
    ];

    /// Position in the fixed sequence (0-based).
    pub fn index(self) -> usize {
        match self {
            Step::Welcome => 0,
            Step::InstallFiles => 1,
            Step::GuideDeveloperMode => 2,
            Step::GuideLoadExtension => 3,
            Step::GuideCopyId => 4,
            Step::GuideEnterId => 5,
            Step::GuideRefresh => 6,
        }
    }
}

fn next_step(step: Step) -> Option<Step> {
    Step::ALL.get(step.index() + 1).copied()
}

fn prev_step(step: Step) -> Option<Step> {
    step.index()
        .checked_sub(1)
        .and_then(|i| Step::ALL.get(i).copied())
}

pub fn step_title(step: Step, mode: InstallMode) -> &'static str {
    match step {
        Step::Welcome => "Welcome to Chrome Browser Extension Installer",
        Step::InstallFiles => "File Installation",
        Step::GuideDeveloperMode => "Enable Developer Mode",
        Step::GuideLoadExtension => "Load Extension",
        Step::GuideCopyId => "Copy Extension ID",
        Step::GuideEnterId => "Enter Extension ID",
        Step::GuideRefresh => match mode {
            InstallMode::Update => "Refresh Extension",
            InstallMode::Fresh => "Apply Extension",
        },
    }
}

pub fn next_label(step: Step) -> &'static str {
    match step {
        Step::Welcome => "Start Installation",
        Step::GuideRefresh => "Finish",
        _ => "Next",
    }
}

/// Back navigation is offered only on the in-browser guide steps; the
/// install step's filesystem effects cannot be walked back.
pub fn can_go_back(step: Step) -> bool {
    matches!(
        step,
        Step::GuideDeveloperMode
            | Step::GuideLoadExtension
            | Step::GuideCopyId
            | Step::GuideEnterId
    )
}

/// Progress milestones the install run reports after extraction and after
/// registration. Update runs show larger jumps because the guide steps that
/// would normally fill the bar are skipped.
pub fn install_milestones(mode: InstallMode) -> (i32, i32) {
    match mode {
        InstallMode::Fresh => (10, 20),
        InstallMode::Update => (25, 50),
    }
}

/// Milestone applied when a step is entered. Steps without an entry here keep
/// whatever the bar already shows.
fn entry_milestone(step: Step, mode: InstallMode) -> Option<i32> {
    match step {
        Step::GuideDeveloperMode => Some(40),
        Step::GuideLoadExtension => Some(60),
        Step::GuideCopyId => Some(80),
        Step::GuideEnterId => Some(95),
        // The update branch lands here straight from InstallFiles; fresh runs
        // arrive already at 95 via GuideEnterId.
        Step::GuideRefresh => match mode {
            InstallMode::Update => Some(95),
            InstallMode::Fresh => None,
        },
        Step::Welcome | Step::InstallFiles => None,
    }
}

/// Mutable session state owned by the controller for one wizard run.
#[derive(Debug, Clone)]
pub struct InstallSession {
    pub install_root: PathBuf,
    pub dist_source: PathBuf,
    pub mode: InstallMode,
    /// Monotonic percentage for user feedback only; never drives control flow.
    pub progress: i32,
    pub extension_id: String,
    /// Manifest body captured by the install run; consumed by the bind step.
    pub template_body: Option<String>,
    pub install_done: bool,
    pub install_error: Option<String>,
}

/// What a call to [`WizardController::advance`] decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Moved(Step),
    Finished,
    Blocked,
    BindFailed(String),
}

#[derive(Debug)]
pub struct WizardController {
    step: Step,
    pub session: InstallSession,
}

impl WizardController {
    /// Build a controller, deciding update-vs-fresh once by probing for the
    /// installed manifest. The decision is immutable for the session except
    /// via [`WizardController::reinstall`].
    pub fn new(install_root: PathBuf, dist_source: PathBuf) -> Self {
        let manifest = installer::registration::manifest_path(&install_root);
        let mode = if manifest.is_file() {
            InstallMode::Update
        } else {
            InstallMode::Fresh
        };
        info!(
            "[PHASE: wizard] [STEP: startup] session mode decided (mode={:?}, manifest={:?})",
            mode, manifest
        );
        Self::with_mode(install_root, dist_source, mode)
    }

    /// Build a controller with a caller-chosen mode, skipping the manifest
    /// probe.
    pub fn with_mode(install_root: PathBuf, dist_source: PathBuf, mode: InstallMode) -> Self {
        Self {
            step: Step::Welcome,
            session: InstallSession {
                install_root,
                dist_source,
                mode,
                progress: 0,
                extension_id: String::new(),
                template_body: None,
                install_done: false,
                install_error: None,
            },
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn mode(&self) -> InstallMode {
        self.session.mode
    }

    pub fn progress(&self) -> i32 {
        self.session.progress
    }

    pub fn title(&self) -> &'static str {
        step_title(self.step, self.session.mode)
    }

    pub fn next_label(&self) -> &'static str {
        next_label(self.step)
    }

    pub fn can_go_back(&self) -> bool {
        can_go_back(self.step)
    }

    /// Whether the current step's exit condition is satisfied.
    pub fn can_advance(&self) -> bool {
        match self.step {
            Step::InstallFiles => self.session.install_done,
            Step::GuideEnterId => {
                validation::extension_id_meets_gate(self.session.extension_id.trim())
            }
            _ => true,
        }
    }

    /// Advance out of the current step.
    ///
    /// GuideEnterId binds the entered id into the deployed manifest before
    /// moving; a bind failure blocks on the step and surfaces
    /// [`BIND_FAILED_MESSAGE`]. In update mode, advancing past InstallFiles
    /// jumps straight to GuideRefresh.
    pub fn advance(&mut self) -> AdvanceOutcome {
        if !self.can_advance() {
            info!(
                "[PHASE: wizard] [STEP: advance] advance blocked at {:?}",
                self.step
            );
            return AdvanceOutcome::Blocked;
        }

        if self.step == Step::GuideEnterId {
            let entered = self.session.extension_id.trim().to_string();
            if let Err(detail) = self.bind_extension_id(&entered) {
                error!(
                    "[PHASE: wizard] [STEP: bind] extension id bind failed: {}",
                    detail
                );
                return AdvanceOutcome::BindFailed(BIND_FAILED_MESSAGE.to_string());
            }
            info!(
                "[PHASE: wizard] [STEP: bind] extension id bound ({} chars)",
                entered.chars().count()
            );
        }

        let target = if self.step == Step::GuideRefresh {
            None
        } else if self.step == Step::InstallFiles && self.session.mode == InstallMode::Update {
            // The browser already has the extension loaded from the prior
            // install; the in-browser guide steps are skipped.
            Some(Step::GuideRefresh)
        } else {
            next_step(self.step)
        };

        match target {
            Some(next) => {
                self.move_to(next);
                AdvanceOutcome::Moved(next)
            }
            None => {
                info!(
                    "[PHASE: wizard] [STEP: advance] wizard finished (mode={:?})",
                    self.session.mode
                );
                AdvanceOutcome::Finished
            }
        }
    }

    pub fn go_back(&mut self) {
        if !self.can_go_back() {
            return;
        }
        if let Some(prev) = prev_step(self.step) {
            info!(
                "[PHASE: wizard] [STEP: navigate] back {:?} -> {:?}",
                self.step, prev
            );
            self.step = prev;
        }
    }

    fn move_to(&mut self, next: Step) {
        info!(
            "[PHASE: wizard] [STEP: navigate] {:?} -> {:?} (mode={:?})",
            self.step, next, self.session.mode
        );
        self.step = next;
        if let Some(pct) = entry_milestone(next, self.session.mode) {
            self.raise_progress_to(pct);
        }
    }

    /// Raise the progress bar to `target`, never lowering it.
    pub fn raise_progress_to(&mut self, target: i32) {
        let clamped = target.clamp(0, 100);
        if clamped > self.session.progress {
            self.session.progress = clamped;
        }
    }

    /// Build the request the install worker runs for this session.
    pub fn install_request(&self) -> InstallRequest {
        let (extracted, registered) = install_milestones(self.session.mode);
        InstallRequest {
            install_root: self.session.install_root.clone(),
            dist_source: self.session.dist_source.clone(),
            mode: self.session.mode,
            extracted_percent: extracted,
            registered_percent: registered,
            manifest_dirs: None,
        }
    }

    pub fn record_install_success(&mut self, artifacts: &InstallArtifacts) {
        self.session.install_done = true;
        self.session.install_error = None;
        self.session.template_body = Some(artifacts.template_body.clone());
        info!(
            "[PHASE: wizard] [STEP: install] install recorded ok (files={}, correlation_id={})",
            artifacts.files_copied, artifacts.correlation_id
        );
    }

    pub fn record_install_failure(&mut self, message: &str) {
        self.session.install_done = false;
        self.session.install_error = Some(message.to_string());
        error!(
            "[PHASE: wizard] [STEP: install] install recorded failed: {}",
            message
        );
    }

    pub fn set_extension_id(&mut self, id: String) {
        self.session.extension_id = id;
    }

    /// The update-mode Refresh page offers a full reinstall.
    pub fn can_reinstall(&self) -> bool {
        self.step == Step::GuideRefresh && self.session.mode == InstallMode::Update
    }

    /// Reset the session, force fresh-install semantics, and start over from
    /// Welcome. Files already deployed stay on disk until the fresh run
    /// replaces them.
    pub fn reinstall(&mut self) {
        info!("[PHASE: wizard] [STEP: reinstall] reinstall requested; resetting session");
        self.session.mode = InstallMode::Fresh;
        self.session.progress = 0;
        self.session.extension_id.clear();
        self.session.template_body = None;
        self.session.install_done = false;
        self.session.install_error = None;
        self.step = Step::Welcome;
    }

    /// Position the controller at an arbitrary step with the milestones the
    /// normal flow would have applied on the way there. Only the TUI smoke
    /// renderer stages pages this way; interactive runs always move through
    /// [`WizardController::advance`] and [`WizardController::go_back`].
    pub(crate) fn seed_step_for_preview(&mut self, step: Step) {
        for visited in Step::ALL {
            if let Some(pct) = entry_milestone(visited, self.session.mode) {
                self.raise_progress_to(pct);
            }
            if visited == step {
                break;
            }
        }
        self.session.install_done = step.index() > Step::InstallFiles.index();
        self.step = step;
    }

    /// Bind the entered id into the deployed manifest using the body captured
    /// by the install run.
    fn bind_extension_id(&self, entered: &str) -> Result<(), String> {
        validation::validate_extension_id(entered).map_err(|e| e.to_string())?;
        let body = self
            .session
            .template_body
            .as_deref()
            .ok_or_else(|| "no configuration body captured by the install run".to_string())?;
        let manifest = installer::registration::manifest_path(&self.session.install_root);
        template::bind_body(body, template::EXTENSION_ID_PLACEHOLDER, entered, &manifest)
            .map_err(|e| e.to_string())
    }
}
