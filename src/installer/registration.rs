//! OS registration of the native messaging host.
//!
//! The browser discovers the host through a manifest file. Windows finds it
//! via a registry value under `HKLM\SOFTWARE\Google\Chrome\NativeMessagingHosts`;
//! Chrome and Chromium on Unix look for the manifest inside per-user
//! `NativeMessagingHosts` directories. On Unix we symlink the installed
//! manifest into those directories so a later in-place placeholder bind is
//! visible to the browser without re-registering.

use anyhow::{Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::template;

/// Protocol name the browser extension connects to.
pub const HOST_NAME: &str = "com.realvnc.vncviewer";

/// Informational record dropped beside the installed files.
pub const INSTALL_INFO_FILE: &str = "install-info.json";

const PRODUCT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Absolute path of the native messaging manifest under `install_root`.
pub fn manifest_path(install_root: &Path) -> PathBuf {
    install_root
        .join("native-host")
        .join(format!("{}.json", HOST_NAME))
}

/// Chrome native messaging manifest document.
///
/// The distributable ships this with the `${EXTENSION_ID}` placeholder still
/// inside `allowed_origins`; the wizard binds the real id in place later.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NativeMessagingManifest {
    pub name: String,
    pub description: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub allowed_origins: Vec<String>,
}

impl NativeMessagingManifest {
    /// Unbound manifest template pointing at `host_binary`.
    pub fn template(host_binary: &Path) -> Self {
        Self {
            name: HOST_NAME.to_string(),
            description: "RealVNC Viewer launcher for the browser extension".to_string(),
            path: host_binary.to_string_lossy().to_string(),
            kind: "stdio".to_string(),
            allowed_origins: vec![format!(
                "chrome-extension://{}/",
                template::EXTENSION_ID_PLACEHOLDER
            )],
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct InstallInfoRecord {
    install_path: String,
    version: String,
    installed_at: chrono::DateTime<chrono::Utc>,
}

/// Outcome of [`register_host`]: where the OS now points for the manifest.
#[derive(Debug, Clone)]
pub struct RegistrationSummary {
    pub manifest_path: PathBuf,
    pub locations: Vec<String>,
}

/// Register the native messaging manifest with the OS.
///
/// Windows writes registry values (browser lookup + informational product
/// keys); Unix symlinks the manifest into each per-user browser directory,
/// or into `manifest_dirs` when given. Both paths also drop
/// [`INSTALL_INFO_FILE`] under the install root. The manifest itself is part
/// of the extracted payload and is not validated here; a missing manifest
/// surfaces later when the wizard captures the template body.
pub async fn register_host(
    install_root: &Path,
    manifest_dirs: Option<&[PathBuf]>,
) -> Result<RegistrationSummary> {
    let started = Instant::now();
    info!(
        "[PHASE: install] [STEP: register] register_host entered (install_root={:?})",
        install_root
    );

    let manifest = manifest_path(install_root);

    #[cfg(windows)]
    let locations = {
        let _ = manifest_dirs;
        register_host_windows(install_root, &manifest).await?
    };

    #[cfg(unix)]
    let locations = {
        let dirs = match manifest_dirs {
            Some(d) => d.to_vec(),
            None => browser_manifest_dirs(),
        };
        let links = register_manifest_links(&manifest, &dirs)?;
        links
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect::<Vec<_>>()
    };

    write_install_info(install_root).await?;

    info!(
        "[PHASE: install] [STEP: register] register_host exit ok (locations={}, duration_ms={})",
        locations.len(),
        started.elapsed().as_millis()
    );
    Ok(RegistrationSummary {
        manifest_path: manifest,
        locations,
    })
}

#[cfg(windows)]
async fn register_host_windows(install_root: &Path, manifest: &Path) -> Result<Vec<String>> {
    use tokio::time::Duration;

    let browser_key = format!(
        "HKLM\\SOFTWARE\\Google\\Chrome\\NativeMessagingHosts\\{}",
        HOST_NAME
    );
    let product_key = "HKLM\\SOFTWARE\\ECChromeExtension".to_string();

    let adds: Vec<Vec<String>> = vec![
        vec![
            "add".to_string(),
            browser_key.clone(),
            "/ve".to_string(),
            "/t".to_string(),
            "REG_SZ".to_string(),
            "/d".to_string(),
            manifest.to_string_lossy().to_string(),
            "/f".to_string(),
        ],
        vec![
            "add".to_string(),
            product_key.clone(),
            "/v".to_string(),
            "InstallPath".to_string(),
            "/t".to_string(),
            "REG_SZ".to_string(),
            "/d".to_string(),
            install_root.to_string_lossy().to_string(),
            "/f".to_string(),
        ],
        vec![
            "add".to_string(),
            product_key.clone(),
            "/v".to_string(),
            "Version".to_string(),
            "/t".to_string(),
            "REG_SZ".to_string(),
            "/d".to_string(),
            PRODUCT_VERSION.to_string(),
            "/f".to_string(),
        ],
    ];

    for args in &adds {
        let out = super::run_cmd_with_timeout(
            "reg",
            args,
            Duration::from_secs(10),
            "register_native_host",
        )
        .await?;
        if out.exit_code != Some(0) {
            anyhow::bail!(
                "reg add failed (exit_code={:?}, stderr={})",
                out.exit_code,
                out.stderr.trim()
            );
        }
    }

    Ok(vec![browser_key, product_key])
}

/// Per-user manifest directories Chrome-family browsers scan on this platform.
#[cfg(unix)]
pub fn browser_manifest_dirs() -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(cfg) = dirs::config_dir() {
        #[cfg(target_os = "macos")]
        {
            out.push(cfg.join("Google/Chrome/NativeMessagingHosts"));
            out.push(cfg.join("Chromium/NativeMessagingHosts"));
        }
        #[cfg(not(target_os = "macos"))]
        {
            out.push(cfg.join("google-chrome/NativeMessagingHosts"));
            out.push(cfg.join("chromium/NativeMessagingHosts"));
        }
    }
    out
}

/// Symlink `manifest` into each browser directory, replacing stale links.
///
/// Returns the links created. Symlinks (not copies) keep the registered
/// manifest identical to the one the wizard later binds in place.
#[cfg(unix)]
pub fn register_manifest_links(manifest: &Path, dirs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut created = Vec::with_capacity(dirs.len());
    for dir in dirs {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create_dir_all failed: {:?}", dir))?;
        let link = dir.join(format!("{}.json", HOST_NAME));
        match std::fs::remove_file(&link) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("remove stale manifest link failed: {:?}", link));
            }
        }
        std::os::unix::fs::symlink(manifest, &link)
            .with_context(|| format!("symlink failed: {:?} -> {:?}", link, manifest))?;
        debug!(
            "[PHASE: install] [STEP: register] manifest link created (link={:?}, target={:?})",
            link, manifest
        );
        created.push(link);
    }
    Ok(created)
}

/// Write the informational install record under `install_root`.
pub async fn write_install_info(install_root: &Path) -> Result<PathBuf> {
    let record = InstallInfoRecord {
        install_path: install_root.to_string_lossy().to_string(),
        version: PRODUCT_VERSION.to_string(),
        installed_at: chrono::Utc::now(),
    };
    let body = serde_json::to_string_pretty(&record).context("serialize install info")?;
    let path = install_root.join(INSTALL_INFO_FILE);
    tokio::fs::write(&path, body)
        .await
        .with_context(|| format!("write install info failed: {:?}", path))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_path_is_fixed_relative_location() {
        let p = manifest_path(Path::new("/opt/ec-chrome-extension"));
        assert_eq!(
            p,
            PathBuf::from("/opt/ec-chrome-extension/native-host/com.realvnc.vncviewer.json")
        );
    }

    #[test]
    fn manifest_template_keeps_placeholder_in_allowed_origins() {
        let m = NativeMessagingManifest::template(Path::new("/opt/host/vnc-bridge-host"));
        let v = serde_json::to_value(&m).expect("manifest should serialize");
        assert_eq!(v["name"], "com.realvnc.vncviewer");
        assert_eq!(v["type"], "stdio", "wire field is `type`, not `kind`");
        assert_eq!(v["allowed_origins"][0], "chrome-extension://${EXTENSION_ID}/");
    }

    #[cfg(unix)]
    #[test]
    fn register_manifest_links_creates_and_replaces_symlinks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifest = dir.path().join("native-host/com.realvnc.vncviewer.json");
        std::fs::create_dir_all(manifest.parent().expect("parent")).expect("mkdir");
        std::fs::write(&manifest, "{}").expect("write manifest");

        let targets = vec![dir.path().join("chrome/NativeMessagingHosts")];
        let links = register_manifest_links(&manifest, &targets).expect("first register");
        assert_eq!(links.len(), 1);
        let resolved = std::fs::read_link(&links[0]).expect("link should be a symlink");
        assert_eq!(resolved, manifest);

        // Re-registering over an existing link must not fail.
        let links = register_manifest_links(&manifest, &targets).expect("second register");
        assert_eq!(std::fs::read_link(&links[0]).expect("still a symlink"), manifest);
    }

    #[tokio::test]
    async fn install_info_record_is_written_with_version() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_install_info(dir.path()).await.expect("write info");

        let body = std::fs::read_to_string(path).expect("read info");
        let v: serde_json::Value = serde_json::from_str(&body).expect("info should be JSON");
        assert_eq!(v["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(
            v["installPath"],
            dir.path().to_string_lossy().to_string(),
            "record fields are camelCase on disk"
        );
    }
}
