//! Viewer resolution and launch.
//!
//! Well-known install locations are a per-platform table picked once at
//! construction; resolution returns the first candidate that exists. Launch
//! shapes differ per platform: Windows goes through `cmd /c start` so the
//! call never blocks the host, macOS `.app` bundles go through `open`,
//! everything else execs the viewer directly. The spawned process is fully
//! detached; the host only records its pid.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::utils::os_detection::Platform;

#[derive(thiserror::Error, Debug)]
pub enum LaunchError {
    #[error("RealVNC Viewer not found. Please install RealVNC Viewer or specify custom path.")]
    ViewerNotFound,
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
}

/// Outcome of a successful spawn.
#[derive(Debug, Clone)]
pub struct Launched {
    pub pid: u32,
    pub command: String,
}

/// The command line a launch will run, before any process is spawned.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ViewerCommand {
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Well-known viewer install locations, most specific first.
pub fn candidate_paths(platform: Platform) -> Vec<PathBuf> {
    match platform {
        Platform::Windows => {
            let mut paths = vec![
                PathBuf::from(r"C:\Program Files\RealVNC\VNC Viewer\vncviewer.exe"),
                PathBuf::from(r"C:\Program Files (x86)\RealVNC\VNC Viewer\vncviewer.exe"),
            ];
            if let Some(local) = dirs::data_local_dir() {
                paths.push(local.join(r"RealVNC\VNC Viewer\vncviewer.exe"));
            }
            paths
        }
        Platform::MacOs => {
            let mut paths = vec![
                PathBuf::from("/Applications/VNC Viewer.app/Contents/MacOS/vncviewer"),
                PathBuf::from("/Applications/VNC Viewer.app"),
            ];
            if let Some(home) = dirs::home_dir() {
                paths.push(home.join("Applications/VNC Viewer.app"));
            }
            paths
        }
        Platform::Linux | Platform::Unknown => vec![
            PathBuf::from("/usr/bin/vncviewer"),
            PathBuf::from("/usr/local/bin/vncviewer"),
            PathBuf::from("/opt/VNC/bin/vncviewer"),
        ],
    }
}

/// Build the platform-appropriate command line. `connection_file` must
/// already be filtered for existence by the caller.
pub fn build_command(
    platform: Platform,
    vnc_path: &Path,
    connection_file: Option<&Path>,
) -> ViewerCommand {
    let path_str = vnc_path.to_string_lossy().into_owned();
    match platform {
        Platform::Windows => {
            let mut args = vec![
                "/c".to_string(),
                "start".to_string(),
                String::new(),
                path_str,
            ];
            if let Some(file) = connection_file {
                args.push(file.to_string_lossy().into_owned());
            }
            ViewerCommand {
                program: "cmd".to_string(),
                args,
            }
        }
        Platform::MacOs if path_str.ends_with(".app") => {
            let mut args = vec![path_str];
            if let Some(file) = connection_file {
                args.push("--args".to_string());
                args.push(file.to_string_lossy().into_owned());
            }
            ViewerCommand {
                program: "open".to_string(),
                args,
            }
        }
        _ => {
            let mut args = Vec::new();
            if let Some(file) = connection_file {
                args.push(file.to_string_lossy().into_owned());
            }
            ViewerCommand {
                program: path_str,
                args,
            }
        }
    }
}

pub struct ViewerLauncher {
    platform: Platform,
    candidates: Vec<PathBuf>,
    path_lookup: bool,
}

impl ViewerLauncher {
    pub fn new(platform: Platform) -> Self {
        ViewerLauncher {
            candidates: candidate_paths(platform),
            // PATH fallback only where viewers are routinely package-managed.
            path_lookup: platform == Platform::Linux,
            platform,
        }
    }

    /// Launcher with an explicit candidate table and no PATH fallback.
    /// Used by tests and by callers that fully control resolution.
    pub fn with_candidates(platform: Platform, candidates: Vec<PathBuf>) -> Self {
        ViewerLauncher {
            platform,
            candidates,
            path_lookup: false,
        }
    }

    /// First existing well-known location, or a PATH hit on Linux. `None` is
    /// the normal "not installed" signal, never an error.
    pub fn resolve_path(&self) -> Option<PathBuf> {
        for path in &self.candidates {
            if path.exists() {
                log::info!("Found RealVNC at: {}", path.display());
                return Some(path.clone());
            }
        }
        if self.path_lookup {
            if let Ok(found) = which::which("vncviewer") {
                log::info!("Found RealVNC on PATH: {}", found.display());
                return Some(found);
            }
        }
        log::warn!("RealVNC Viewer not found in default locations");
        None
    }

    /// Resolve (honoring a non-empty override) and spawn, detached.
    ///
    /// A non-empty `override_path` is trusted as-is; a failed spawn reports
    /// the failure rather than falling back to the table.
    pub fn launch(
        &self,
        override_path: &str,
        connection_file: &str,
    ) -> Result<Launched, LaunchError> {
        let vnc_path = if override_path.is_empty() {
            self.resolve_path().ok_or(LaunchError::ViewerNotFound)?
        } else {
            PathBuf::from(override_path)
        };

        // A connection file that is missing on disk is silently omitted.
        let file = Path::new(connection_file);
        let file = (!connection_file.is_empty() && file.exists()).then_some(file);

        let command = build_command(self.platform, &vnc_path, file);
        self.spawn_detached(&command)
    }

    fn spawn_detached(&self, command: &ViewerCommand) -> Result<Launched, LaunchError> {
        let display = command.display();
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        let child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            command: display.clone(),
            source,
        })?;

        log::info!("RealVNC launched with command: {}", display);
        Ok(Launched {
            pid: child.id(),
            command: display,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn windows_command_goes_through_start() {
        let cmd = build_command(
            Platform::Windows,
            Path::new(r"C:\Program Files\RealVNC\VNC Viewer\vncviewer.exe"),
            Some(Path::new(r"C:\temp\session.vnc")),
        );

        assert_eq!(cmd.program, "cmd");
        assert_eq!(cmd.args[0], "/c");
        assert_eq!(cmd.args[1], "start");
        assert_eq!(cmd.args[2], "", "start needs an empty title argument");
        assert!(cmd.args[3].ends_with("vncviewer.exe"));
        assert_eq!(cmd.args[4], r"C:\temp\session.vnc");
    }

    #[test]
    fn macos_bundle_goes_through_open_with_args() {
        let cmd = build_command(
            Platform::MacOs,
            Path::new("/Applications/VNC Viewer.app"),
            Some(Path::new("/tmp/session.vnc")),
        );

        assert_eq!(cmd.program, "open");
        assert_eq!(
            cmd.args,
            vec![
                "/Applications/VNC Viewer.app".to_string(),
                "--args".to_string(),
                "/tmp/session.vnc".to_string()
            ]
        );
    }

    #[test]
    fn macos_plain_executable_execs_directly() {
        let cmd = build_command(
            Platform::MacOs,
            Path::new("/Applications/VNC Viewer.app/Contents/MacOS/vncviewer"),
            None,
        );

        assert_eq!(
            cmd.program,
            "/Applications/VNC Viewer.app/Contents/MacOS/vncviewer"
        );
        assert!(cmd.args.is_empty());
    }

    #[test]
    fn linux_command_is_direct_exec_with_optional_file() {
        let with_file = build_command(
            Platform::Linux,
            Path::new("/usr/bin/vncviewer"),
            Some(Path::new("/tmp/session.vnc")),
        );
        assert_eq!(with_file.program, "/usr/bin/vncviewer");
        assert_eq!(with_file.args, vec!["/tmp/session.vnc".to_string()]);

        let without = build_command(Platform::Linux, Path::new("/usr/bin/vncviewer"), None);
        assert!(without.args.is_empty());
    }

    #[test]
    fn candidate_tables_are_nonempty_for_each_platform() {
        for platform in [Platform::Windows, Platform::MacOs, Platform::Linux] {
            assert!(
                !candidate_paths(platform).is_empty(),
                "no candidates for {:?}",
                platform
            );
        }
        assert!(candidate_paths(Platform::Linux)
            .contains(&PathBuf::from("/usr/bin/vncviewer")));
    }

    #[test]
    fn resolve_returns_first_existing_candidate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = dir.path().join("viewer-a");
        let second = dir.path().join("viewer-b");
        fs::write(&first, "").unwrap();
        fs::write(&second, "").unwrap();

        let launcher = ViewerLauncher::with_candidates(
            Platform::Linux,
            vec![dir.path().join("missing"), first.clone(), second],
        );

        assert_eq!(
            launcher.resolve_path(),
            Some(first),
            "first existing candidate wins"
        );
    }

    #[test]
    fn resolve_with_no_candidates_is_none() {
        let launcher = ViewerLauncher::with_candidates(Platform::Linux, Vec::new());
        assert_eq!(launcher.resolve_path(), None);
    }

    #[test]
    fn launch_without_viewer_fails_before_spawn() {
        let launcher = ViewerLauncher::with_candidates(Platform::Linux, Vec::new());
        let result = launcher.launch("", "");

        assert!(
            matches!(result, Err(LaunchError::ViewerNotFound)),
            "no resolvable path must fail with ViewerNotFound, got {:?}",
            result.map(|l| l.command)
        );
    }

    #[cfg(unix)]
    #[test]
    fn launch_spawns_detached_and_reports_pid() {
        let launcher = ViewerLauncher::with_candidates(Platform::Linux, Vec::new());
        let launched = launcher
            .launch("/bin/sh", "/definitely/not/present.vnc")
            .expect("spawning /bin/sh must succeed");

        assert!(launched.pid > 0, "pid must be captured at spawn");
        assert_eq!(
            launched.command, "/bin/sh",
            "missing connection file must be omitted from the command"
        );
    }

    #[cfg(unix)]
    #[test]
    fn launch_spawn_failure_is_reported() {
        let launcher = ViewerLauncher::with_candidates(Platform::Linux, Vec::new());
        let result = launcher.launch("/definitely/not/a/binary", "");

        assert!(matches!(result, Err(LaunchError::Spawn { .. })));
    }
}
