use anyhow::Result;
use std::path::PathBuf;

/// Resolve deployment folder (absolute path): the directory this binary runs
/// from. The host also uses it to anchor relative connection-file paths.
pub fn resolve_deployment_folder() -> Result<PathBuf> {
    // Prefer the folder where the EXE is running from (works in dev and deployed)
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(dir) = exe_path.parent() {
            return Ok(dir.to_path_buf());
        }
    }

    // Fallback: current working directory
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    Ok(cwd)
}

/// Default install root for the extension bundle and native host.
///
/// Windows keeps the fixed drive-root path earlier releases used, so update
/// detection keeps finding prior installs. Elsewhere installs are per-user.
pub fn default_install_root() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        PathBuf::from("C:\\ec-chrome-extension")
    }
    #[cfg(not(target_os = "windows"))]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ec-chrome-extension")
    }
}

/// Resolve the distributable tree to install from.
///
/// Walks up from the deployment folder looking for a `dist/` directory; when
/// running from nested build dirs like `target/debug` the tree lives a few
/// levels up.
pub fn resolve_dist_folder() -> Result<PathBuf> {
    let mut dir = resolve_deployment_folder()?;
    for _ in 0..6 {
        let candidate = dir.join("dist");
        if candidate.is_dir() {
            return Ok(candidate);
        }
        if let Some(parent) = dir.parent() {
            dir = parent.to_path_buf();
        } else {
            break;
        }
    }
    anyhow::bail!("Distributable folder not found near {:?}", dir)
}

/// Resolve log folder (absolute path)
pub fn resolve_log_folder() -> Result<PathBuf> {
    // Prefer an existing log folder walking up from CWD; when running from
    // nested dirs like `target/debug` we MUST NOT scatter log folders inside
    // those subdirectories.
    if let Ok(mut dir) = std::env::current_dir() {
        for _ in 0..12 {
            let candidate = dir.join("vnc-bridge-logs");
            if candidate.exists() {
                return Ok(candidate);
            }

            if let Some(parent) = dir.parent() {
                dir = parent.to_path_buf();
            } else {
                break;
            }
        }
    }

    // Fallback: base off the deployment folder (best-effort).
    let base = resolve_deployment_folder()?;
    let log_dir = base.join("vnc-bridge-logs");
    std::fs::create_dir_all(&log_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create log folder: {}", e))?;
    Ok(log_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_folder_is_absolute() {
        let dir = resolve_deployment_folder().expect("deployment folder must resolve");
        assert!(dir.is_absolute(), "expected absolute path, got {:?}", dir);
    }

    #[test]
    fn default_install_root_ends_with_product_dir() {
        let root = default_install_root();
        assert_eq!(
            root.file_name().and_then(|n| n.to_str()),
            Some("ec-chrome-extension"),
            "install root must end with the product directory: {:?}",
            root
        );
    }
}
