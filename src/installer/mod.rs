// Installation engine for the browser extension payload and native host.
//
// The wizard drives one installation run per session: deploy the
// distributable tree into the install root, register the native messaging
// manifest with the OS, then preserve or capture the manifest body for the
// extension-id binding step. Shared utilities for running external commands
// with timeouts/retries live here too.
//
// IMPORTANT:
// - All I/O is async.
// - Never fail silently (log with context).

pub mod files;
pub mod registration;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

static INSTALL_CANCEL_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Fresh deploy vs. refresh of a prior install.
///
/// Decided once at wizard startup by probing for the installed manifest and
/// immutable for the rest of the session (a Reinstall resets the session and
/// forces `Fresh`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    Fresh,
    Update,
}

/// One installation run, as requested by the wizard.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub install_root: PathBuf,
    pub dist_source: PathBuf,
    pub mode: InstallMode,
    /// Progress milestone reported once extraction completes.
    pub extracted_percent: i32,
    /// Progress milestone reported once registration completes.
    pub registered_percent: i32,
    /// Unix only: directories that receive manifest links. `None` uses the
    /// per-user browser directories.
    pub manifest_dirs: Option<Vec<PathBuf>>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    pub correlation_id: String,
    pub step: String,
    pub severity: String, // "info" | "error"
    pub phase: String,
    pub percent: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u128>,
}

pub type ProgressEmitter = Arc<dyn Fn(ProgressPayload) + Send + Sync>;

/// What a successful run produced, echoed back to the wizard session.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallArtifacts {
    pub correlation_id: String,
    pub files_copied: usize,
    pub bytes_copied: u64,
    pub manifest_path: String,
    /// Manifest body for the binding step. Session state, not display output.
    #[serde(skip_serializing)]
    pub template_body: String,
    pub duration_ms: u128,
}

/// Installation failures surfaced to the wizard. Each blocks step
/// advancement; none of them crash the wizard process.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FilesystemError {
    #[error("File extraction failed: {0}")]
    Extraction(String),
    #[error("Host registration failed: {0}")]
    Registration(String),
    #[error("Failed to read configuration file: {0}")]
    ConfigCapture(String),
    #[error("Failed to restore configuration file: {0}")]
    ConfigRestore(String),
    #[error("Installation cancelled.")]
    Cancelled,
}

/// Best-effort cancel request for an in-progress installation.
pub fn request_cancel() {
    info!("[PHASE: install] [STEP: cancel] install cancel requested");
    INSTALL_CANCEL_REQUESTED.store(true, Ordering::SeqCst);
}

fn cancel_requested() -> bool {
    INSTALL_CANCEL_REQUESTED.load(Ordering::SeqCst)
}

fn check_cancel() -> Result<(), FilesystemError> {
    if cancel_requested() {
        Err(FilesystemError::Cancelled)
    } else {
        Ok(())
    }
}

/// Run one installation: extract, register, then preserve/capture the
/// manifest body.
///
/// Update mode reads the installed manifest before extraction wipes it and
/// writes that exact body back after registration, so a previously bound
/// extension id survives the refresh. Fresh mode instead reads the freshly
/// extracted template into the returned artifacts for later binding; a
/// missing template is a failure, not a silent empty capture.
pub async fn run_installation(
    req: InstallRequest,
    correlation_id: String,
    emit_progress: ProgressEmitter,
) -> Result<InstallArtifacts, FilesystemError> {
    let started = Instant::now();
    INSTALL_CANCEL_REQUESTED.store(false, Ordering::SeqCst);
    info!(
        "[PHASE: install] [STEP: run] run_installation entered (mode={:?}, install_root={:?}, dist={:?}, correlation_id={})",
        req.mode, req.install_root, req.dist_source, correlation_id
    );

    let emit = |step: &str, severity: &str, percent: i32, message: String| {
        emit_progress(ProgressPayload {
            correlation_id: correlation_id.clone(),
            step: step.to_string(),
            severity: severity.to_string(),
            phase: "install".to_string(),
            percent,
            message,
            elapsed_ms: Some(started.elapsed().as_millis()),
        });
    };
    let fail = |step: &str, percent: i32, err: FilesystemError| -> FilesystemError {
        error!("[PHASE: install] [STEP: {}] {}", step, err);
        emit(step, "error", percent, err.to_string());
        err
    };

    emit("start", "info", 1, "Starting installation...".to_string());
    let manifest = registration::manifest_path(&req.install_root);

    // Update: the installed manifest may carry a bound extension id. Capture
    // it before the wholesale replace wipes the tree.
    let mut preserved_body: Option<String> = None;
    if req.mode == InstallMode::Update {
        check_cancel().map_err(|e| fail("capture", 1, e))?;
        emit(
            "capture",
            "info",
            2,
            "Reading existing configuration...".to_string(),
        );
        match tokio::fs::read_to_string(&manifest).await {
            Ok(body) => preserved_body = Some(body),
            Err(e) => {
                warn!(
                    "[PHASE: install] [STEP: capture] existing configuration unreadable; continuing without restore (path={:?}, err={})",
                    manifest, e
                );
            }
        }
    }

    check_cancel().map_err(|e| fail("extract", 2, e))?;
    emit("extract", "info", 3, "Installing files...".to_string());
    let copied = files::replace_tree(
        &req.dist_source,
        &req.install_root,
        &INSTALL_CANCEL_REQUESTED,
    )
    .await
    .map_err(|e| {
        let err = if cancel_requested() {
            FilesystemError::Cancelled
        } else {
            FilesystemError::Extraction(format!("{:#}", e))
        };
        fail("extract", 3, err)
    })?;
    emit(
        "extract",
        "info",
        req.extracted_percent,
        "File installation completed!".to_string(),
    );

    check_cancel().map_err(|e| fail("register", req.extracted_percent, e))?;
    emit(
        "register",
        "info",
        req.extracted_percent,
        "Registering native messaging host...".to_string(),
    );
    let registered = registration::register_host(&req.install_root, req.manifest_dirs.as_deref())
        .await
        .map_err(|e| {
            fail(
                "register",
                req.extracted_percent,
                FilesystemError::Registration(format!("{:#}", e)),
            )
        })?;
    emit(
        "register",
        "info",
        req.registered_percent,
        "Registration completed!".to_string(),
    );

    check_cancel().map_err(|e| fail("preserve", req.registered_percent, e))?;
    let template_body = match preserved_body {
        Some(body) if !body.is_empty() => {
            emit(
                "preserve",
                "info",
                req.registered_percent,
                "Restoring existing configuration...".to_string(),
            );
            tokio::fs::write(&manifest, &body).await.map_err(|e| {
                fail(
                    "preserve",
                    req.registered_percent,
                    FilesystemError::ConfigRestore(e.to_string()),
                )
            })?;
            body
        }
        _ => {
            emit(
                "preserve",
                "info",
                req.registered_percent,
                "Reading configuration template...".to_string(),
            );
            tokio::fs::read_to_string(&manifest).await.map_err(|e| {
                fail(
                    "preserve",
                    req.registered_percent,
                    FilesystemError::ConfigCapture(e.to_string()),
                )
            })?
        }
    };

    let bytes_copied = copied.iter().map(|f| f.bytes).sum::<u64>();
    let artifacts = InstallArtifacts {
        correlation_id: correlation_id.clone(),
        files_copied: copied.len(),
        bytes_copied,
        manifest_path: registered.manifest_path.to_string_lossy().to_string(),
        template_body,
        duration_ms: started.elapsed().as_millis(),
    };
    info!(
        "[PHASE: install] [STEP: run] run_installation exit ok (files={}, bytes={}, locations={}, duration_ms={})",
        artifacts.files_copied,
        artifacts.bytes_copied,
        registered.locations.len(),
        artifacts.duration_ms
    );
    Ok(artifacts)
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u128,
}

fn is_transient_exec_error(e: &anyhow::Error) -> bool {
    let msg = e.to_string().to_ascii_lowercase();
    msg.contains("timed out")
        || msg.contains("timeout")
        || msg.contains("temporarily")
        || msg.contains("temporary")
        || msg.contains("busy")
        || msg.contains("in use")
        || msg.contains("used by another process")
        || msg.contains("resource")
        || msg.contains("i/o")
        || msg.contains("io error")
}

async fn run_cmd_with_timeout_once(
    program: &str,
    args: &[String],
    timeout_dur: Duration,
    operation: &str,
) -> Result<CommandOutput> {
    let started = Instant::now();

    debug!(
        "[PHASE: install] [STEP: cmd] run_cmd_with_timeout_once entered (operation={}, program={}, args=[{}], timeout_ms={})",
        operation,
        program,
        args.join(", "),
        timeout_dur.as_millis()
    );

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().with_context(|| {
        format!(
            "Failed to spawn command '{}' (operation={})",
            program, operation
        )
    })?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("Failed to capture stdout (operation={})", operation))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("Failed to capture stderr (operation={})", operation))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).await?;
        Ok::<String, std::io::Error>(String::from_utf8_lossy(&buf).to_string())
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr.read_to_end(&mut buf).await?;
        Ok::<String, std::io::Error>(String::from_utf8_lossy(&buf).to_string())
    });

    let status = match timeout(timeout_dur, child.wait()).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => {
            return Err(anyhow::Error::new(e)).with_context(|| {
                format!(
                    "Command wait failed (operation={}, program={})",
                    operation, program
                )
            });
        }
        Err(_) => {
            warn!(
                "[PHASE: install] [STEP: cmd] Timeout reached (operation={}, program={}, timeout_ms={}); attempting to kill process",
                operation,
                program,
                timeout_dur.as_millis()
            );

            if let Err(e) = child.kill().await {
                warn!(
                    "[PHASE: install] [STEP: cmd] Failed to kill timed-out process (operation={}, program={}): {}",
                    operation, program, e
                );
            }

            // Best-effort reap (avoid zombies)
            let _ = timeout(Duration::from_secs(5), child.wait()).await;

            return Err(anyhow::anyhow!(
                "Command timed out after {}ms (operation={}, program={})",
                timeout_dur.as_millis(),
                operation,
                program
            ));
        }
    };

    let stdout_str = stdout_task
        .await
        .context("stdout join failed")?
        .context("stdout read failed")?;
    let stderr_str = stderr_task
        .await
        .context("stderr join failed")?
        .context("stderr read failed")?;

    let duration_ms = started.elapsed().as_millis();
    let out = CommandOutput {
        exit_code: status.code(),
        stdout: stdout_str,
        stderr: stderr_str,
        duration_ms,
    };

    debug!(
        "[PHASE: install] [STEP: cmd] run_cmd_with_timeout_once exit (operation={}, program={}, exit_code={:?}, duration_ms={}, stdout_len={}, stderr_len={})",
        operation,
        program,
        out.exit_code,
        out.duration_ms,
        out.stdout.len(),
        out.stderr.len()
    );

    Ok(out)
}

/// Run an external command with a timeout and up to 3 retries for transient failures.
///
/// Returns captured stdout/stderr even when exit code is non-zero (caller decides success).
pub async fn run_cmd_with_timeout(
    program: &str,
    args: &[String],
    timeout_dur: Duration,
    operation: &str,
) -> Result<CommandOutput> {
    let started = Instant::now();
    info!(
        "[PHASE: install] [STEP: cmd] run_cmd_with_timeout entered (operation={}, program={}, args_count={}, timeout_ms={})",
        operation,
        program,
        args.len(),
        timeout_dur.as_millis()
    );

    let program_owned = program.to_string();
    let args_owned = args.to_vec();
    let operation_owned = operation.to_string();

    let attempt = move || {
        let program = program_owned.clone();
        let args = args_owned.clone();
        let op = operation_owned.clone();
        async move { run_cmd_with_timeout_once(&program, &args, timeout_dur, &op).await }
    };

    let retry_strategy = ExponentialBackoff::from_millis(200)
        .factor(2)
        .max_delay(Duration::from_secs(2))
        .take(3)
        .map(jitter);

    let result = RetryIf::spawn(retry_strategy, attempt, |e: &anyhow::Error| {
        let transient = is_transient_exec_error(e);
        if transient {
            warn!(
                "[PHASE: install] [STEP: cmd] Transient command failure detected; will retry (operation={}, program={}, err={})",
                operation,
                program,
                e
            );
        }
        transient
    })
    .await;

    match &result {
        Ok(out) => {
            info!(
                "[PHASE: install] [STEP: cmd] run_cmd_with_timeout exit (operation={}, program={}, exit_code={:?}, duration_ms={})",
                operation,
                program,
                out.exit_code,
                started.elapsed().as_millis()
            );
        }
        Err(e) => {
            error!(
                "[PHASE: install] [STEP: cmd] run_cmd_with_timeout error (operation={}, program={}, duration_ms={}, err={:?})",
                operation,
                program,
                started.elapsed().as_millis(),
                e
            );
        }
    }

    result
}
