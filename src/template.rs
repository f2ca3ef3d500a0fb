//! Placeholder binding for the persisted native-messaging configuration.
//!
//! The extracted manifest template carries a literal `${EXTENSION_ID}` token
//! inside its `allowed_origins` entry. Binding replaces every occurrence with
//! the user-entered id and overwrites the file. A file without the token is
//! either stale or already bound; binding refuses to touch it so callers can
//! tell the difference.

use std::fs;
use std::path::{Path, PathBuf};

/// Literal token the extracted configuration template carries.
pub const EXTENSION_ID_PLACEHOLDER: &str = "${EXTENSION_ID}";

#[derive(thiserror::Error, Debug)]
pub enum ConfigBindError {
    #[error("placeholder '{placeholder}' not found in {path}")]
    PlaceholderNotFound { placeholder: String, path: PathBuf },
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write config at {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Replace every occurrence of `placeholder` in the file at `path` with
/// `value`, overwriting the file.
///
/// Fails with [`ConfigBindError::PlaceholderNotFound`] without modifying the
/// file when the token is absent. A second call after a successful bind
/// therefore always fails; user-triggered retries (the reinstall path) treat
/// that as "already bound", not as a fault.
pub fn bind(path: &Path, placeholder: &str, value: &str) -> Result<(), ConfigBindError> {
    let body = fs::read_to_string(path).map_err(|source| ConfigBindError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    bind_body(&body, placeholder, value, path)
}

/// Bind against an already-captured body instead of re-reading the file.
///
/// The wizard caches the template body in session state at extraction time
/// and binds that copy; the placeholder check runs against the cached body,
/// so a manifest rewritten on disk since capture does not change the outcome.
pub fn bind_body(
    body: &str,
    placeholder: &str,
    value: &str,
    path: &Path,
) -> Result<(), ConfigBindError> {
    let bound = body.replace(placeholder, value);
    if bound == body {
        return Err(ConfigBindError::PlaceholderNotFound {
            placeholder: placeholder.to_string(),
            path: path.to_path_buf(),
        });
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigBindError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, bound).map_err(|source| ConfigBindError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fixture(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("com.realvnc.vncviewer.json");
        fs::write(&path, body).expect("fixture write must succeed");
        path
    }

    #[test]
    fn bind_replaces_placeholder_and_rewrites_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_fixture(
            &dir,
            r#"{"allowed_origins": ["chrome-extension://${EXTENSION_ID}/"]}"#,
        );

        bind(&path, EXTENSION_ID_PLACEHOLDER, "abc123").expect("bind must succeed");

        let after = fs::read_to_string(&path).unwrap();
        assert!(
            after.contains("abc123"),
            "bound value missing from file: {}",
            after
        );
        assert!(
            !after.contains(EXTENSION_ID_PLACEHOLDER),
            "placeholder must be fully consumed: {}",
            after
        );
    }

    #[test]
    fn second_bind_fails_with_placeholder_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_fixture(
            &dir,
            r#"{"allowed_origins": ["chrome-extension://${EXTENSION_ID}/"]}"#,
        );

        bind(&path, EXTENSION_ID_PLACEHOLDER, "abc123").expect("first bind must succeed");
        let second = bind(&path, EXTENSION_ID_PLACEHOLDER, "abc123");

        assert!(
            matches!(second, Err(ConfigBindError::PlaceholderNotFound { .. })),
            "second bind must report the consumed placeholder, got {:?}",
            second
        );
    }

    #[test]
    fn bind_without_placeholder_leaves_file_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let body = r#"{"allowed_origins": ["chrome-extension://already-bound/"]}"#;
        let path = write_fixture(&dir, body);

        let result = bind(&path, EXTENSION_ID_PLACEHOLDER, "abc123");

        assert!(matches!(
            result,
            Err(ConfigBindError::PlaceholderNotFound { .. })
        ));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            body,
            "failed bind must not modify the file"
        );
    }

    #[test]
    fn bind_replaces_every_occurrence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_fixture(&dir, "${EXTENSION_ID} and again ${EXTENSION_ID}");

        bind(&path, EXTENSION_ID_PLACEHOLDER, "xyz").expect("bind must succeed");

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "xyz and again xyz",
            "all occurrences must be replaced"
        );
    }

    #[test]
    fn bind_body_writes_cached_copy_over_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        // File on disk was rewritten after capture; the cached body wins.
        let path = write_fixture(&dir, "rewritten on disk");
        let cached = r#"{"allowed_origins": ["chrome-extension://${EXTENSION_ID}/"]}"#;

        bind_body(cached, EXTENSION_ID_PLACEHOLDER, "ext42xxxxxxxx", &path)
            .expect("bind_body must succeed");

        let after = fs::read_to_string(&path).unwrap();
        assert!(after.contains("ext42xxxxxxxx"));
        assert!(!after.contains("rewritten"), "cached body must replace the file");
    }

    #[test]
    fn bind_missing_file_reports_read_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent.json");

        let result = bind(&path, EXTENSION_ID_PLACEHOLDER, "abc123");

        assert!(
            matches!(result, Err(ConfigBindError::Read { .. })),
            "missing file must surface as a read error, got {:?}",
            result
        );
    }
}
