//! Request dispatch for the native messaging host.
//!
//! Every request produces exactly one response. Action failures never
//! escape as errors; they fold into a `success=false` response so the
//! channel's request/response pairing stays 1:1.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::host::protocol::Message;
use crate::host::viewer::{LaunchError, ViewerLauncher};
use crate::utils::os_detection::platform_name;

/// Version string reported by `ping`.
pub const HOST_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("Failed to create SVN file: {0}")]
    ConnectionFile(std::io::Error),
    #[error("Failed to launch RealVNC: {0}")]
    Launch(#[from] LaunchError),
}

pub struct Dispatcher {
    launcher: ViewerLauncher,
    /// Anchors relative connection-file paths. The extension may pass a bare
    /// filename; resolving against the host's own install directory (not the
    /// process CWD, which the browser controls) keeps that working.
    install_dir: PathBuf,
}

impl Dispatcher {
    pub fn new(launcher: ViewerLauncher, install_dir: PathBuf) -> Self {
        Dispatcher {
            launcher,
            install_dir,
        }
    }

    /// Map one request to one response. Never fails; internal errors become
    /// `success=false` responses.
    pub fn dispatch(&self, request: &Message) -> Message {
        let action = request.action().unwrap_or("(none)").to_string();
        match self.dispatch_inner(&action, request) {
            Ok(response) => response,
            Err(err) => {
                log::error!("{}", err);
                Message::from_value(json!({
                    "success": false,
                    "error": err.to_string(),
                }))
            }
        }
    }

    fn dispatch_inner(&self, action: &str, request: &Message) -> Result<Message, DispatchError> {
        match action {
            "ping" => Ok(Message::from_value(json!({
                "success": true,
                "message": "pong",
                "version": HOST_VERSION,
                "platform": platform_name(),
            }))),
            "check_vnc" => {
                let found = self.launcher.resolve_path();
                Ok(Message::from_value(json!({
                    "success": found.is_some(),
                    "vnc_path": found.map(|p| p.to_string_lossy().into_owned()),
                    "platform": platform_name(),
                })))
            }
            "launch" => self.handle_launch(request),
            other => Err(DispatchError::UnknownAction(other.to_string())),
        }
    }

    fn handle_launch(&self, request: &Message) -> Result<Message, DispatchError> {
        let mut connection_file = request.get_str("connectionFile").unwrap_or("").to_string();
        let vnc_path = request.get_str("vncPath").unwrap_or("");
        let svn_content = request.get_str("svnContent").unwrap_or("");

        // Content arrives inline; write it out before any launch attempt. A
        // failed write short-circuits with no spawn.
        if !svn_content.is_empty() && !connection_file.is_empty() {
            let written = self.materialize_connection_file(&connection_file, svn_content)?;
            connection_file = written.to_string_lossy().into_owned();
        }

        let launched = self.launcher.launch(vnc_path, &connection_file)?;
        Ok(Message::from_value(json!({
            "success": true,
            "message": "RealVNC Viewer launched successfully",
            "pid": launched.pid,
            "command": launched.command,
        })))
    }

    fn materialize_connection_file(
        &self,
        connection_file: &str,
        content: &str,
    ) -> Result<PathBuf, DispatchError> {
        let raw = Path::new(connection_file);
        let absolute = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.install_dir.join(raw)
        };

        if let Some(parent) = absolute.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(DispatchError::ConnectionFile)?;
            }
        }
        fs::write(&absolute, content).map_err(DispatchError::ConnectionFile)?;
        log::info!("SVN file created: {}", absolute.display());
        Ok(absolute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::os_detection::Platform;
    use serde_json::json;

    fn dispatcher_without_viewer(install_dir: &Path) -> Dispatcher {
        Dispatcher::new(
            ViewerLauncher::with_candidates(Platform::Linux, Vec::new()),
            install_dir.to_path_buf(),
        )
    }

    fn request(value: serde_json::Value) -> Message {
        Message::from_value(value)
    }

    #[test]
    fn ping_answers_pong_regardless_of_viewer_state() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher_without_viewer(dir.path());

        let response = dispatcher.dispatch(&request(json!({"action": "ping"})));

        assert_eq!(response.get_bool("success"), Some(true));
        assert_eq!(response.get_str("message"), Some("pong"));
        assert_eq!(response.get_str("version"), Some(HOST_VERSION));
        assert!(
            response.get_str("platform").is_some(),
            "platform must always be reported"
        );
    }

    #[test]
    fn unknown_action_reports_exact_error_string() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher_without_viewer(dir.path());

        let response = dispatcher.dispatch(&request(json!({"action": "unknown_x"})));

        assert_eq!(response.get_bool("success"), Some(false));
        assert_eq!(
            response.get_str("error"),
            Some("Unknown action: unknown_x")
        );
    }

    #[test]
    fn missing_action_is_treated_as_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher_without_viewer(dir.path());

        let response = dispatcher.dispatch(&request(json!({"payload": 1})));

        assert_eq!(response.get_bool("success"), Some(false));
        assert_eq!(response.get_str("error"), Some("Unknown action: (none)"));
    }

    #[test]
    fn check_vnc_reports_absent_viewer_with_null_path() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher_without_viewer(dir.path());

        let response = dispatcher.dispatch(&request(json!({"action": "check_vnc"})));

        assert_eq!(response.get_bool("success"), Some(false));
        assert!(
            response.get("vnc_path").map(|v| v.is_null()).unwrap_or(false),
            "vnc_path must be present and null when nothing resolves"
        );
    }

    #[test]
    fn check_vnc_reports_resolved_path() {
        let dir = tempfile::tempdir().unwrap();
        let viewer = dir.path().join("vncviewer");
        fs::write(&viewer, "").unwrap();
        let dispatcher = Dispatcher::new(
            ViewerLauncher::with_candidates(Platform::Linux, vec![viewer.clone()]),
            dir.path().to_path_buf(),
        );

        let response = dispatcher.dispatch(&request(json!({"action": "check_vnc"})));

        assert_eq!(response.get_bool("success"), Some(true));
        assert_eq!(
            response.get_str("vnc_path"),
            viewer.to_str(),
            "resolved path must be echoed back"
        );
    }

    #[test]
    fn launch_with_no_viewer_fails_with_error_and_no_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher_without_viewer(dir.path());

        let response = dispatcher.dispatch(&request(json!({"action": "launch"})));

        assert_eq!(response.get_bool("success"), Some(false));
        let error = response.get_str("error").unwrap_or("");
        assert!(
            error.contains("not found"),
            "error must explain the missing viewer: {}",
            error
        );
        assert!(
            response.get("pid").is_none(),
            "no spawn may happen without a viewer"
        );
    }

    #[test]
    fn launch_materializes_relative_connection_file_under_install_dir() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher_without_viewer(dir.path());

        // Viewer resolution fails afterwards, but the file write comes first.
        let response = dispatcher.dispatch(&request(json!({
            "action": "launch",
            "connectionFile": "conn/session.vnc",
            "svnContent": "[connection]\nhost=10.0.0.5",
        })));

        assert_eq!(response.get_bool("success"), Some(false));
        let written = dir.path().join("conn/session.vnc");
        assert!(
            written.exists(),
            "relative connection file must land under the install dir"
        );
        assert_eq!(
            fs::read_to_string(&written).unwrap(),
            "[connection]\nhost=10.0.0.5"
        );
    }

    #[test]
    fn launch_overwrites_existing_connection_file() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher_without_viewer(dir.path());
        let target = dir.path().join("session.vnc");
        fs::write(&target, "stale").unwrap();

        dispatcher.dispatch(&request(json!({
            "action": "launch",
            "connectionFile": target.to_str().unwrap(),
            "svnContent": "fresh",
        })));

        assert_eq!(
            fs::read_to_string(&target).unwrap(),
            "fresh",
            "existing file must be overwritten"
        );
    }

    #[test]
    fn launch_write_failure_short_circuits_before_launcher() {
        let dir = tempfile::tempdir().unwrap();
        // A plain file where a directory component must go makes the write fail.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let dispatcher = dispatcher_without_viewer(dir.path());

        let response = dispatcher.dispatch(&request(json!({
            "action": "launch",
            "connectionFile": "blocker/session.vnc",
            "svnContent": "content",
        })));

        assert_eq!(response.get_bool("success"), Some(false));
        let error = response.get_str("error").unwrap_or("");
        assert!(
            error.starts_with("Failed to create SVN file:"),
            "write failure must be reported, not the launch: {}",
            error
        );
    }

    #[test]
    fn launch_without_content_skips_materialization() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher_without_viewer(dir.path());

        let response = dispatcher.dispatch(&request(json!({
            "action": "launch",
            "connectionFile": "never-written.vnc",
        })));

        assert_eq!(response.get_bool("success"), Some(false));
        assert!(
            !dir.path().join("never-written.vnc").exists(),
            "no svnContent means no file write"
        );
    }

    #[cfg(unix)]
    #[test]
    fn launch_with_trusted_override_spawns_and_reports_pid() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher_without_viewer(dir.path());

        let response = dispatcher.dispatch(&request(json!({
            "action": "launch",
            "vncPath": "/bin/sh",
        })));

        assert_eq!(response.get_bool("success"), Some(true));
        assert!(
            response.get("pid").and_then(|v| v.as_u64()).unwrap_or(0) > 0,
            "pid must be captured at spawn"
        );
        assert_eq!(response.get_str("command"), Some("/bin/sh"));
    }
}
