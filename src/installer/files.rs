//! Payload deployment helpers.
//!
//! Goals:
//! - Async I/O only (tokio)
//! - Retry transient file lock errors (Windows AV/indexers, etc.)
//! - Timeout all operations (scaled to file size)
//! - Preserve permissions on Unix best-effort
//! - Never fail silently (log with context)

use anyhow::{Context, Result};
use log::{debug, warn};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Duration};

/// One deployed file, relative to the install root.
#[derive(Debug, Clone)]
pub struct CopiedFile {
    pub relative_path: String,
    pub bytes: u64,
    pub sha256: String,
}

/// Recursively collect all regular files under `root`.
///
/// Returns absolute paths.
pub async fn collect_files_recursive(root: &Path) -> Result<Vec<PathBuf>> {
    let started = Instant::now();
    debug!(
        "[PHASE: install] [STEP: files] collect_files_recursive entered (root={:?})",
        root
    );

    let mut out: Vec<PathBuf> = Vec::new();
    let mut stack: Vec<PathBuf> = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut rd = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("read_dir failed: {:?}", dir))?;
        while let Some(ent) = rd.next_entry().await? {
            let p = ent.path();
            let meta = ent.metadata().await?;
            if meta.is_dir() {
                stack.push(p);
            } else if meta.is_file() {
                out.push(p);
            }
        }
    }

    debug!(
        "[PHASE: install] [STEP: files] collect_files_recursive exit (files={}, duration_ms={})",
        out.len(),
        started.elapsed().as_millis()
    );
    Ok(out)
}

fn is_transient_fs_error(e: &anyhow::Error) -> bool {
    let msg = e.to_string().to_ascii_lowercase();
    msg.contains("used by another process")
        || msg.contains("in use")
        || msg.contains("access is denied")
        || msg.contains("permission denied")
        || msg.contains("resource busy")
        || msg.contains("temporarily")
        || msg.contains("temporary")
        || msg.contains("timed out")
        || msg.contains("timeout")
}

/// Replace `dst_root` wholesale with a copy of the tree under `src_root`.
///
/// The destination is deleted first so no stale file from a prior install
/// survives, then every regular file is copied with its relative path
/// preserved. Returns per-file stats in copy order. `cancel` is checked
/// between files; a requested cancel aborts with an error mid-tree.
pub async fn replace_tree(
    src_root: &Path,
    dst_root: &Path,
    cancel: &AtomicBool,
) -> Result<Vec<CopiedFile>> {
    let started = Instant::now();
    debug!(
        "[PHASE: install] [STEP: files] replace_tree entered (src={:?}, dst={:?})",
        src_root, dst_root
    );

    if tokio::fs::metadata(dst_root).await.is_ok() {
        tokio::fs::remove_dir_all(dst_root)
            .await
            .with_context(|| format!("remove_dir_all failed: {:?}", dst_root))?;
    }
    tokio::fs::create_dir_all(dst_root)
        .await
        .with_context(|| format!("create_dir_all failed: {:?}", dst_root))?;

    let files = collect_files_recursive(src_root).await?;
    let mut out: Vec<CopiedFile> = Vec::with_capacity(files.len());
    for src in &files {
        if cancel.load(Ordering::SeqCst) {
            anyhow::bail!("Installation cancelled.");
        }

        let rel = src
            .strip_prefix(src_root)
            .with_context(|| format!("path escapes source root: {:?}", src))?;
        let dst = dst_root.join(rel);
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create_dir_all failed: {:?}", parent))?;
        }

        let label = rel.to_string_lossy().to_string();
        let (bytes, sha256) = copy_file_with_retries_and_sha256(src, &dst, &label).await?;
        out.push(CopiedFile {
            relative_path: label,
            bytes,
            sha256,
        });
    }

    debug!(
        "[PHASE: install] [STEP: files] replace_tree exit ok (files={}, bytes={}, duration_ms={})",
        out.len(),
        out.iter().map(|f| f.bytes).sum::<u64>(),
        started.elapsed().as_millis()
    );
    Ok(out)
}

/// Copy one file with retries + timeout, returning `(bytes_written, sha256_hex)`.
///
/// - Hash is computed over the bytes copied (source contents).
/// - Caller must create parent directory.
pub async fn copy_file_with_retries_and_sha256(
    src: &Path,
    dst: &Path,
    label: &str,
) -> Result<(u64, String)> {
    let started = Instant::now();
    debug!(
        "[PHASE: install] [STEP: files] copy_file_with_retries_and_sha256 entered (label={}, src={:?}, dst={:?})",
        label, src, dst
    );

    let mut last_err: Option<anyhow::Error> = None;
    for attempt in 1..=3 {
        let timeout_dur = match tokio::fs::metadata(src).await {
            Ok(m) => {
                // Dynamic timeout: base 60s + 1s per MiB, capped at 10 minutes.
                let mib = (m.len() / (1024 * 1024)).min(10_000);
                let secs = (60_u64).saturating_add(mib).min(600);
                Duration::from_secs(secs)
            }
            Err(_) => Duration::from_secs(60),
        };

        let res = timeout(timeout_dur, copy_file_once_and_sha256(src, dst)).await;
        match res {
            Ok(Ok((n, sha))) => {
                debug!(
                    "[PHASE: install] [STEP: files] copy_file_with_retries_and_sha256 exit ok (label={}, bytes={}, sha256={}, attempt={}, duration_ms={})",
                    label,
                    n,
                    sha,
                    attempt,
                    started.elapsed().as_millis()
                );
                return Ok((n, sha));
            }
            Ok(Err(e)) => {
                let transient = is_transient_fs_error(&e);
                warn!(
                    "[PHASE: install] [STEP: files] copy+sha failed (label={}, attempt={}, transient={}, src={:?}, dst={:?}, err={})",
                    label,
                    attempt,
                    transient,
                    src,
                    dst,
                    e
                );
                last_err = Some(e);
                if !transient {
                    break;
                }
            }
            Err(_) => {
                let err = anyhow::anyhow!(
                    "copy+sha timed out (timeout_ms={})",
                    timeout_dur.as_millis()
                );
                warn!(
                    "[PHASE: install] [STEP: files] copy+sha timeout (label={}, attempt={}, src={:?}, dst={:?}, timeout_ms={})",
                    label,
                    attempt,
                    src,
                    dst,
                    timeout_dur.as_millis()
                );
                last_err = Some(err);
            }
        }

        let backoff_ms = 200_u64.saturating_mul(1_u64 << ((attempt - 1) as u32));
        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("copy+sha failed")))
}

async fn copy_file_once_and_sha256(src: &Path, dst: &Path) -> Result<(u64, String)> {
    let mut src_f = tokio::fs::File::open(src)
        .await
        .with_context(|| format!("open src failed: {:?}", src))?;
    let mut dst_f = tokio::fs::File::create(dst)
        .await
        .with_context(|| format!("create dst failed: {:?}", dst))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut total: u64 = 0;

    loop {
        let n = src_f.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        dst_f.write_all(&buf[..n]).await?;
        total = total.saturating_add(n as u64);
    }
    dst_f.flush().await?;

    // Best-effort permissions preservation.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = tokio::fs::metadata(src).await {
            let mode = meta.permissions().mode();
            let _ = tokio::fs::set_permissions(dst, std::fs::Permissions::from_mode(mode)).await;
        }
    }

    let digest = hasher.finalize();
    let sha256 = digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>();
    Ok((total, sha256))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn write_fixture(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("fixture mkdir should succeed");
        }
        std::fs::write(path, content).expect("fixture write should succeed");
    }

    #[tokio::test]
    async fn collect_files_recursive_finds_nested_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_fixture(dir.path(), "top.txt", "a");
        write_fixture(dir.path(), "sub/inner.txt", "b");
        write_fixture(dir.path(), "sub/deeper/leaf.txt", "c");

        let mut files = collect_files_recursive(dir.path()).await.expect("collect");
        files.sort();
        assert_eq!(files.len(), 3, "expected every nested file to be found");
        assert!(files.iter().any(|p| p.ends_with("sub/deeper/leaf.txt")));
    }

    #[tokio::test]
    async fn copy_reports_sha256_of_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_fixture(dir.path(), "src.bin", "hello world");
        let dst = dir.path().join("dst.bin");

        let (bytes, sha) =
            copy_file_with_retries_and_sha256(&dir.path().join("src.bin"), &dst, "src.bin")
                .await
                .expect("copy should succeed");
        assert_eq!(bytes, 11);
        assert_eq!(
            sha, "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9",
            "sha256 should match the copied bytes"
        );
        let copied = std::fs::read_to_string(&dst).expect("read dst");
        assert_eq!(copied, "hello world");
    }

    #[tokio::test]
    async fn replace_tree_removes_stale_destination_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("dist");
        let dst = dir.path().join("install");
        write_fixture(&src, "manifest.json", "{}");
        write_fixture(&src, "assets/icon.png", "png");
        write_fixture(&dst, "leftover-from-last-install.txt", "stale");

        let cancel = AtomicBool::new(false);
        let copied = replace_tree(&src, &dst, &cancel).await.expect("replace");

        assert_eq!(copied.len(), 2, "both payload files should be copied");
        assert!(dst.join("manifest.json").is_file());
        assert!(dst.join("assets/icon.png").is_file());
        assert!(
            !dst.join("leftover-from-last-install.txt").exists(),
            "stale files must not survive a reinstall"
        );
    }

    #[tokio::test]
    async fn replace_tree_stops_when_cancel_requested() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("dist");
        let dst = dir.path().join("install");
        write_fixture(&src, "a.txt", "a");

        let cancel = AtomicBool::new(true);
        let err = replace_tree(&src, &dst, &cancel)
            .await
            .expect_err("pre-set cancel flag should abort the copy");
        assert!(err.to_string().contains("cancelled"));
        assert!(
            !dst.join("a.txt").exists(),
            "no file should be copied after cancel"
        );
    }

    #[test]
    fn transient_classifier_matches_lock_errors_only() {
        assert!(is_transient_fs_error(&anyhow::anyhow!(
            "The process cannot access the file because it is being used by another process"
        )));
        assert!(is_transient_fs_error(&anyhow::anyhow!("copy timed out")));
        assert!(!is_transient_fs_error(&anyhow::anyhow!(
            "No such file or directory"
        )));
    }
}
