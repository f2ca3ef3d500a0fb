// VNC Bridge: Chrome extension installer and native messaging host
// Library entry points for the setup and host binaries

mod host;
mod installer;
mod template;
mod tui;
mod utils;
mod wizard;

use log::{error, info};
use std::path::PathBuf;

/// Initialize logging system with dual format (JSON + human-readable)
fn init_logging(file_prefix: &str, with_stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = utils::path_resolver::resolve_log_folder()?;
    std::fs::create_dir_all(&log_dir)?;

    let timestamp = chrono::Utc::now().format("%Y-%m-%d-%H%M%S");

    // JSON log file for structured parsing
    let json_log_file = log_dir.join(format!("{}-{}.log", file_prefix, timestamp));

    // Human-readable log file (.txt)
    let txt_log_file = log_dir.join(format!("{}-{}.txt", file_prefix, timestamp));

    // Configure dual-format logging:
    // - JSON format to .log file
    // - Human-readable format to .txt file
    // - Optional: human-readable to stdout (disabled in TUI mode to avoid
    //   corrupting the terminal UI, and in host mode where stdout carries
    //   the message frames)
    let mut dispatch = fern::Dispatch::new().level(log::LevelFilter::Debug);

    if with_stdout {
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let txt_line = utils::logging::format_human_readable_log(
                        &timestamp_local.to_string(),
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}", txt_line));
                })
                .chain(std::io::stdout()),
        );
    }

    dispatch = dispatch
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_utc = chrono::Utc::now().to_rfc3339();
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let json_line = utils::logging::format_json_log(
                        &timestamp_utc,
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                        None, // details - can be extended later
                    );
                    out.finish(format_args!("{}\n", json_line));
                })
                .chain(fern::log_file(json_log_file)?),
        )
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let txt_line = utils::logging::format_human_readable_log(
                        &timestamp_local.to_string(),
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}\n", txt_line));
                })
                .chain(fern::log_file(txt_log_file)?),
        );

    dispatch.apply()?;

    log::info!(
        "[PHASE: initialization] Logging initialized, log directory: {:?}",
        log_dir
    );
    Ok(())
}

/// Deployment folder (absolute), falling back to the current directory.
fn deployment_folder_or_cwd() -> PathBuf {
    utils::path_resolver::resolve_deployment_folder().unwrap_or_else(|_| PathBuf::from("."))
}

/// OS suffix for proof-mode log file names.
fn os_suffix() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        "other"
    }
}

/// Interactive setup wizard (terminal UI).
///
/// Logging is file-only: the alternate screen owns stdout for the whole run.
pub fn run_setup_tui() {
    if let Err(e) = init_logging("setup", false) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!(
        "[PHASE: initialization] Setup wizard starting at {}",
        chrono::Utc::now()
    );

    let deployment_folder = deployment_folder_or_cwd();
    info!(
        "[PHASE: initialization] Deployment folder: {:?}",
        deployment_folder
    );

    let install_root = utils::path_resolver::default_install_root();
    info!(
        "[PHASE: initialization] Install root: {:?}",
        install_root
    );

    let dist_source = match utils::path_resolver::resolve_dist_folder() {
        Ok(p) => p,
        Err(e) => {
            error!(
                "[PHASE: initialization] Distributable folder not found: {:?}",
                e
            );
            eprintln!("Installer error: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        "[PHASE: initialization] Distributable folder: {:?}",
        dist_source
    );

    if let Err(e) = tui::run(install_root, dist_source) {
        error!("[PHASE: tui] Wizard exited with error: {:?}", e);
        eprintln!("Installer error: {}", e);
        std::process::exit(1);
    }
}

/// Native messaging host: framed stdin/stdout loop driven by the browser.
///
/// Logging is file-only; stdout carries the message frames and a single stray
/// byte on it breaks the channel.
pub fn run_host() {
    if let Err(e) = init_logging("host", false) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!(
        "[PHASE: initialization] Native host v{} starting at {}",
        host::HOST_VERSION,
        chrono::Utc::now()
    );
    let platform = utils::os_detection::detect_platform();
    info!(
        "[PHASE: initialization] Platform: {}",
        utils::os_detection::platform_name()
    );

    let install_dir = deployment_folder_or_cwd();
    info!(
        "[PHASE: initialization] Install directory: {:?}",
        install_dir
    );

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let channel = host::FramedChannel::new(stdin.lock(), stdout.lock());
    let dispatcher = host::Dispatcher::new(host::ViewerLauncher::new(platform), install_dir);

    if let Err(e) = host::NativeHost::new(channel, dispatcher).run() {
        error!("[PHASE: host] Host exited with protocol error: {:?}", e);
        eprintln!("Host error: {}", e);
        std::process::exit(1);
    }
}

/// Wizard render smoke - draws staged wizard pages on an in-memory backend.
/// Writes `wizard_smoke_<os>.log` under `vnc-bridge-logs/` and exits 0/1.
pub fn run_wizard_smoke(target: Option<String>) {
    use std::io::Write;
    use std::time::Instant;

    // Initialize logging (stdout for immediate feedback)
    if let Err(e) = init_logging("smoke", true) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let start_time = Instant::now();
    info!(
        "[PHASE: smoke] [STEP: start] Wizard render smoke starting at {}",
        chrono::Utc::now()
    );

    let deployment_folder = deployment_folder_or_cwd();
    let log_dir = match utils::path_resolver::resolve_log_folder() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to resolve log folder: {}", e);
            deployment_folder.join("vnc-bridge-logs")
        }
    };

    let log_path = log_dir.join(format!("wizard_smoke_{}.log", os_suffix()));
    let mut log_file = match std::fs::File::create(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to create log file: {}", e);
            std::process::exit(1);
        }
    };

    let mut all_passed = true;
    let mut results: Vec<(String, String, i32, u128)> = Vec::new();

    macro_rules! log_step {
        ($msg:expr) => {{
            let msg = format!("{}\n", $msg);
            let _ = log_file.write_all(msg.as_bytes());
            print!("{}", msg);
        }};
    }

    log_step!(format!(
        "=== Wizard Render Smoke ({}) ===",
        os_suffix().to_uppercase()
    ));
    log_step!(format!("Started: {}", chrono::Utc::now()));
    log_step!(format!("Log Dir: {:?}", log_dir));
    log_step!("");

    let targets: Vec<String> = match target {
        Some(t) => vec![t],
        None => [
            "welcome",
            "install",
            "developer-mode",
            "load-extension",
            "copy-id",
            "enter-id",
            "refresh",
            "update-refresh",
            "cancel",
            "error",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    };

    log_step!("--- Wizard Pages ---");
    for target in &targets {
        let step_start = Instant::now();
        log_step!(format!("Running: wizard page ({})", target));

        let result = tui::smoke(Some(target.clone()));
        let elapsed_ms = step_start.elapsed().as_millis();
        let (status, exit_code) = match result {
            Ok(()) => ("PASS", 0),
            Err(ref e) => {
                log_step!(format!("  Error: {}", e));
                all_passed = false;
                ("FAIL", 1)
            }
        };
        log_step!(format!(
            "  [{}] wizard page: {} (ExitCode={}, {}ms)",
            status, target, exit_code, elapsed_ms
        ));
        results.push((
            format!("wizard-smoke-{}", target),
            status.to_string(),
            exit_code,
            elapsed_ms,
        ));
    }

    let total_elapsed = start_time.elapsed();
    log_step!("");
    log_step!("=== Summary ===");
    log_step!(format!("Total steps: {}", results.len()));
    log_step!(format!(
        "Passed: {}",
        results.iter().filter(|r| r.1 == "PASS").count()
    ));
    log_step!(format!(
        "Failed: {}",
        results.iter().filter(|r| r.1 == "FAIL").count()
    ));
    log_step!(format!("Total time: {}ms", total_elapsed.as_millis()));
    log_step!("");

    if all_passed {
        log_step!("========================================");
        log_step!("ALL WIZARD SMOKE TESTS PASSED");
        log_step!("========================================");
        log_step!("ExitCode=0");
        info!("[PHASE: smoke] [STEP: complete] All wizard pages rendered");
    } else {
        log_step!("========================================");
        log_step!("WIZARD SMOKE TESTS FAILED");
        log_step!("========================================");
        log_step!("ExitCode=1");
        error!("[PHASE: smoke] [STEP: complete] Some wizard pages failed to render");
        std::process::exit(1);
    }
}

/// Host protocol smoke - scripted native-messaging session over in-memory
/// buffers. Writes `host_smoke_<os>.log` under `vnc-bridge-logs/` and exits
/// 0/1.
pub fn run_host_smoke() {
    use std::io::Write;
    use std::time::Instant;

    // Initialize logging (stdout for immediate feedback)
    if let Err(e) = init_logging("smoke", true) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let start_time = Instant::now();
    info!(
        "[PHASE: smoke] [STEP: start] Host protocol smoke starting at {}",
        chrono::Utc::now()
    );

    let deployment_folder = deployment_folder_or_cwd();
    let log_dir = match utils::path_resolver::resolve_log_folder() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to resolve log folder: {}", e);
            deployment_folder.join("vnc-bridge-logs")
        }
    };

    let log_path = log_dir.join(format!("host_smoke_{}.log", os_suffix()));
    let mut log_file = match std::fs::File::create(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to create log file: {}", e);
            std::process::exit(1);
        }
    };

    macro_rules! log_step {
        ($msg:expr) => {{
            let msg = format!("{}\n", $msg);
            let _ = log_file.write_all(msg.as_bytes());
            print!("{}", msg);
        }};
    }

    log_step!(format!(
        "=== Host Protocol Smoke ({}) ===",
        os_suffix().to_uppercase()
    ));
    log_step!(format!("Started: {}", chrono::Utc::now()));
    log_step!(format!("Log Dir: {:?}", log_dir));
    log_step!("");

    let result = host_smoke_session();
    let elapsed_ms = start_time.elapsed().as_millis();

    match result {
        Ok(evidence) => {
            for line in &evidence {
                log_step!(line);
            }
            log_step!("");
            log_step!(format!(
                "  [PASS] host-smoke (ExitCode=0, {}ms)",
                elapsed_ms
            ));
            log_step!("");
            log_step!("========================================");
            log_step!("ALL HOST SMOKE TESTS PASSED");
            log_step!("========================================");
            log_step!("ExitCode=0");
            info!("[PHASE: smoke] [STEP: complete] Host protocol smoke passed");
        }
        Err(e) => {
            log_step!(format!("  Error: {}", e));
            log_step!(format!(
                "  [FAIL] host-smoke (ExitCode=1, {}ms)",
                elapsed_ms
            ));
            log_step!("");
            log_step!("========================================");
            log_step!("HOST SMOKE TESTS FAILED");
            log_step!("========================================");
            log_step!("ExitCode=1");
            error!(
                "[PHASE: smoke] [STEP: complete] Host protocol smoke failed: {:?}",
                e
            );
            std::process::exit(1);
        }
    }
}

/// Drive a scripted session through the real framed channel, dispatcher and
/// host loop, then decode the responses as evidence lines.
///
/// The launcher gets an empty candidate table so no real viewer can resolve
/// or spawn; the `launch` request still proves the connection-file write.
fn host_smoke_session() -> anyhow::Result<Vec<String>> {
    use host::{Dispatcher, FramedChannel, Message, NativeHost, ViewerLauncher};

    let scratch = std::env::temp_dir().join("vnc-bridge-smoke").join("host");
    std::fs::create_dir_all(&scratch)?;

    let requests = vec![
        serde_json::json!({"action": "ping"}),
        serde_json::json!({"action": "check_vnc"}),
        serde_json::json!({
            "action": "launch",
            "connectionFile": "conn/session.vnc",
            "svnContent": "[connection]\nhost=127.0.0.1",
        }),
        serde_json::json!({"action": "no_such_action"}),
    ];

    let mut wire = Vec::new();
    for value in &requests {
        let message = Message::from_value(value.clone());
        wire.extend_from_slice(&host::protocol::encode_frame(&message)?);
    }

    let mut output = Vec::new();
    let dispatcher = Dispatcher::new(
        ViewerLauncher::with_candidates(utils::os_detection::detect_platform(), Vec::new()),
        scratch.clone(),
    );
    NativeHost::new(
        FramedChannel::new(std::io::Cursor::new(wire), &mut output),
        dispatcher,
    )
    .run()?;

    let mut responses = Vec::new();
    let mut reader: &[u8] = &output;
    let mut channel = FramedChannel::new(&mut reader, Vec::new());
    while let Some(response) = channel.read_frame()? {
        responses.push(response);
    }

    anyhow::ensure!(
        responses.len() == requests.len(),
        "expected {} responses, got {}",
        requests.len(),
        responses.len()
    );
    anyhow::ensure!(
        responses[0].get_str("message") == Some("pong"),
        "ping must answer pong"
    );
    anyhow::ensure!(
        responses[3].get_str("error") == Some("Unknown action: no_such_action"),
        "unknown action must report the exact error string"
    );
    let written = scratch.join("conn/session.vnc");
    anyhow::ensure!(
        written.is_file(),
        "launch must materialize the connection file at {:?}",
        written
    );

    let mut evidence = Vec::new();
    for (i, response) in responses.iter().enumerate() {
        evidence.push(format!("Response[{}]: {}", i, serde_json::to_string(response)?));
    }
    evidence.push(format!("Connection file: {:?}", written));
    Ok(evidence)
}

/// Install+bind smoke - full fresh install into a scratch folder followed by
/// an extension-id bind into the deployed manifest. Writes
/// `bind_smoke_<os>.log` under `vnc-bridge-logs/` and exits 0/1.
pub fn run_bind_smoke() {
    use std::io::Write;
    use std::time::Instant;

    // Initialize logging (stdout for immediate feedback)
    if let Err(e) = init_logging("smoke", true) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let start_time = Instant::now();
    info!(
        "[PHASE: smoke] [STEP: start] Install+bind smoke starting at {}",
        chrono::Utc::now()
    );

    let deployment_folder = deployment_folder_or_cwd();
    let log_dir = match utils::path_resolver::resolve_log_folder() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to resolve log folder: {}", e);
            deployment_folder.join("vnc-bridge-logs")
        }
    };

    let log_path = log_dir.join(format!("bind_smoke_{}.log", os_suffix()));
    let mut log_file = match std::fs::File::create(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to create log file: {}", e);
            std::process::exit(1);
        }
    };

    macro_rules! log_step {
        ($msg:expr) => {{
            let msg = format!("{}\n", $msg);
            let _ = log_file.write_all(msg.as_bytes());
            print!("{}", msg);
        }};
    }

    log_step!(format!(
        "=== Install+Bind Smoke ({}) ===",
        os_suffix().to_uppercase()
    ));
    log_step!(format!("Started: {}", chrono::Utc::now()));
    log_step!(format!("Log Dir: {:?}", log_dir));
    log_step!("");

    let result: anyhow::Result<Vec<String>> = {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build();
        match rt {
            Ok(rt) => rt.block_on(bind_smoke_run()),
            Err(e) => Err(anyhow::anyhow!(
                "Failed to create async runtime for bind smoke: {}",
                e
            )),
        }
    };
    let elapsed_ms = start_time.elapsed().as_millis();

    match result {
        Ok(evidence) => {
            for line in &evidence {
                log_step!(line);
            }
            log_step!("");
            log_step!(format!(
                "  [PASS] bind-smoke (ExitCode=0, {}ms)",
                elapsed_ms
            ));
            log_step!("");
            log_step!("========================================");
            log_step!("ALL BIND SMOKE TESTS PASSED");
            log_step!("========================================");
            log_step!("ExitCode=0");
            info!("[PHASE: smoke] [STEP: complete] Install+bind smoke passed");
        }
        Err(e) => {
            log_step!(format!("  Error: {}", e));
            log_step!(format!(
                "  [FAIL] bind-smoke (ExitCode=1, {}ms)",
                elapsed_ms
            ));
            log_step!("");
            log_step!("========================================");
            log_step!("BIND SMOKE TESTS FAILED");
            log_step!("========================================");
            log_step!("ExitCode=1");
            error!(
                "[PHASE: smoke] [STEP: complete] Install+bind smoke failed: {:?}",
                e
            );
            std::process::exit(1);
        }
    }
}

/// Fresh install into a scratch folder, then bind a sample extension id the
/// way the wizard's id-entry step does, and verify the deployed manifest.
///
/// Registration links go to a scratch directory, never into real browser
/// configuration.
async fn bind_smoke_run() -> anyhow::Result<Vec<String>> {
    use std::sync::{Arc, Mutex};

    let scratch = std::env::temp_dir().join("vnc-bridge-smoke").join("bind");
    // Clean slate so the fresh-install path is deterministic across runs.
    if scratch.exists() {
        std::fs::remove_dir_all(&scratch)?;
    }
    let dist = scratch.join("dist");
    let install_root = scratch.join("extension");

    std::fs::create_dir_all(dist.join("native-host"))?;
    std::fs::write(
        dist.join("manifest.json"),
        r#"{"name": "VNC Bridge", "manifest_version": 3}"#,
    )?;
    let host_binary = install_root.join("native-host").join(if cfg!(windows) {
        "vnc-bridge-host.exe"
    } else {
        "vnc-bridge-host"
    });
    let manifest_template =
        installer::registration::NativeMessagingManifest::template(&host_binary);
    std::fs::write(
        dist.join("native-host")
            .join(format!("{}.json", installer::registration::HOST_NAME)),
        serde_json::to_string_pretty(&manifest_template)?,
    )?;

    let (extracted_percent, registered_percent) =
        wizard::install_milestones(installer::InstallMode::Fresh);
    let req = installer::InstallRequest {
        install_root: install_root.clone(),
        dist_source: dist,
        mode: installer::InstallMode::Fresh,
        extracted_percent,
        registered_percent,
        manifest_dirs: Some(vec![scratch.join("browser-hosts")]),
    };

    let payloads: Arc<Mutex<Vec<installer::ProgressPayload>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = payloads.clone();
    let emit: installer::ProgressEmitter = Arc::new(move |payload| {
        if let Ok(mut collected) = sink.lock() {
            collected.push(payload);
        }
    });

    let correlation_id = uuid::Uuid::new_v4().to_string();
    let artifacts =
        installer::run_installation(req, correlation_id.clone(), emit).await?;

    let sample_id = "abcdefghijklmnopabcdefghijklmnop";
    let manifest = installer::registration::manifest_path(&install_root);
    template::bind_body(
        &artifacts.template_body,
        template::EXTENSION_ID_PLACEHOLDER,
        sample_id,
        &manifest,
    )?;

    let bound = std::fs::read_to_string(&manifest)?;
    anyhow::ensure!(
        bound.contains(sample_id),
        "bound manifest must contain the sample id"
    );
    anyhow::ensure!(
        !bound.contains(template::EXTENSION_ID_PLACEHOLDER),
        "placeholder must be fully replaced"
    );

    let mut evidence = Vec::new();
    evidence.push(format!("Artifacts: {}", serde_json::to_string(&artifacts)?));
    let collected = payloads
        .lock()
        .map_err(|_| anyhow::anyhow!("progress sink poisoned"))?;
    for payload in collected.iter() {
        evidence.push(format!("Progress: {}", serde_json::to_string(payload)?));
    }
    evidence.push(format!("Manifest: {:?}", manifest));
    evidence.push(format!("Bound id: {}", sample_id));

    // A retry after a successful bind must report the consumed placeholder.
    match template::bind(&manifest, template::EXTENSION_ID_PLACEHOLDER, sample_id) {
        Err(template::ConfigBindError::PlaceholderNotFound { .. }) => {
            evidence.push("Re-bind: placeholder already consumed (expected)".to_string());
        }
        other => anyhow::bail!(
            "re-bind must report the consumed placeholder, got {:?}",
            other
        ),
    }
    Ok(evidence)
}
