// Input validation utilities

use anyhow::Result;
use regex::Regex;

/// Minimum length (exclusive) for a user-entered extension id. Cheap
/// structural gate, not a checksum.
pub const EXTENSION_ID_MIN_LEN: usize = 10;

/// Gate for the wizard's id entry step: the entered identifier must be longer
/// than [`EXTENSION_ID_MIN_LEN`] characters.
pub fn extension_id_meets_gate(id: &str) -> bool {
    id.chars().count() > EXTENSION_ID_MIN_LEN
}

/// Validate a user-entered extension id before binding it into the manifest.
pub fn validate_extension_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(anyhow::anyhow!("Extension id is required"));
    }
    if !extension_id_meets_gate(id) {
        return Err(anyhow::anyhow!(
            "Extension id must be longer than {} characters",
            EXTENSION_ID_MIN_LEN
        ));
    }
    Ok(())
}

/// Advisory format check: Chrome extension ids are 32 chars drawn from a-p.
/// Never gates advancement; the wizard only shows a hint when this fails.
pub fn looks_like_chrome_extension_id(id: &str) -> Result<bool> {
    let re = Regex::new(r"^[a-p]{32}$")
        .map_err(|e| anyhow::anyhow!("Internal error: failed to compile id regex: {}", e))?;
    Ok(re.is_match(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_rejects_short_input() {
        assert!(
            !extension_id_meets_gate("short"),
            "5-char input must not pass the gate"
        );
    }

    #[test]
    fn gate_accepts_long_input() {
        assert!(
            extension_id_meets_gate("extension-id-123"),
            "16-char input must pass the gate"
        );
    }

    #[test]
    fn gate_boundary_is_exclusive() {
        assert!(
            !extension_id_meets_gate("abcdefghij"),
            "exactly 10 chars must not pass"
        );
        assert!(
            extension_id_meets_gate("abcdefghijk"),
            "11 chars must pass"
        );
    }

    #[test]
    fn validate_extension_id_mirrors_gate() {
        assert!(validate_extension_id("short").is_err());
        assert!(validate_extension_id("").is_err());
        assert!(validate_extension_id("extension-id-123").is_ok());
    }

    #[test]
    fn chrome_id_hint_matches_real_shape() {
        let real = "abcdefghijklmnopabcdefghijklmnop";
        assert!(looks_like_chrome_extension_id(real).unwrap());
        assert!(
            !looks_like_chrome_extension_id("extension-id-123").unwrap(),
            "hyphenated id is valid for the gate but fails the advisory hint"
        );
        assert!(!looks_like_chrome_extension_id("ABCDEFGHIJKLMNOPABCDEFGHIJKLMNOP").unwrap());
    }
}
