// Logging utilities
// Structured logging with JSON and human-readable formats

use log::Level;
use serde_json::json;
use std::collections::HashMap;

/// Parse phase and step from log message
/// Extracts [PHASE: ...] and [STEP: ...] patterns
pub fn parse_log_metadata(message: &str) -> (Option<String>, Option<String>, String) {
    let mut phase = None;
    let mut step = None;
    let mut cleaned_message = message.to_string();

    // Extract [PHASE: ...]
    if let Some(start) = message.find("[PHASE:") {
        if let Some(end) = message[start..].find(']') {
            let phase_str = &message[start + 7..start + end].trim();
            phase = Some(phase_str.to_string());
            cleaned_message = format!("{} {}", &message[..start], &message[start + end + 1..])
                .trim()
                .to_string();
        }
    }

    // Extract [STEP: ...]
    if let Some(start) = cleaned_message.find("[STEP:") {
        if let Some(end) = cleaned_message[start..].find(']') {
            let step_str = &cleaned_message[start + 6..start + end].trim();
            step = Some(step_str.to_string());
            cleaned_message = format!(
                "{} {}",
                &cleaned_message[..start],
                &cleaned_message[start + end + 1..]
            )
            .trim()
            .to_string();
        }
    }

    (phase, step, cleaned_message)
}

/// Format log entry as JSON for structured logging
pub fn format_json_log(
    timestamp: &str,
    level: Level,
    target: &str,
    message: &str,
    phase: Option<&str>,
    step: Option<&str>,
    details: Option<&HashMap<String, serde_json::Value>>,
) -> String {
    let mut log_entry = json!({
        "timestamp": timestamp,
        "level": level.as_str(),
        "target": target,
        "message": message,
    });

    if let Some(phase) = phase {
        log_entry["phase"] = json!(phase);
    }

    if let Some(step) = step {
        log_entry["step"] = json!(step);
    }

    if let Some(details) = details {
        log_entry["details"] = json!(details);
    }

    serde_json::to_string(&log_entry).unwrap_or_else(|_| "{}".to_string())
}

/// Format log entry as human-readable text
pub fn format_human_readable_log(
    timestamp: &str,
    level: Level,
    target: &str,
    message: &str,
    phase: Option<&str>,
    step: Option<&str>,
) -> String {
    let mut log_line = format!("[{}] [{}]", timestamp, level.as_str());

    if let Some(phase) = phase {
        log_line.push_str(&format!(" [PHASE: {}]", phase));
    }

    if let Some(step) = step {
        log_line.push_str(&format!(" [STEP: {}]", step));
    }

    log_line.push_str(&format!(" [{}] {}", target, message));
    log_line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_log_metadata_extracts_phase_and_step() {
        let (phase, step, message) =
            parse_log_metadata("[PHASE: install] [STEP: extract_files] copying tree");

        assert_eq!(phase.as_deref(), Some("install"), "phase should be parsed");
        assert_eq!(
            step.as_deref(),
            Some("extract_files"),
            "step should be parsed"
        );
        assert_eq!(
            message, "copying tree",
            "cleaned message should drop both tags"
        );
    }

    #[test]
    fn parse_log_metadata_phase_only() {
        let (phase, step, message) = parse_log_metadata("[PHASE: host] loop entered");

        assert_eq!(phase.as_deref(), Some("host"));
        assert!(step.is_none(), "no step tag present: {:?}", step);
        assert_eq!(message, "loop entered");
    }

    #[test]
    fn parse_log_metadata_plain_message_passes_through() {
        let raw = "nothing structured here";
        let (phase, step, message) = parse_log_metadata(raw);

        assert!(phase.is_none());
        assert!(step.is_none());
        assert_eq!(message, raw, "plain messages must come back unchanged");
    }

    #[test]
    fn format_json_log_includes_parsed_fields() {
        let line = format_json_log(
            "2026-01-01T00:00:00Z",
            Level::Info,
            "vnc_bridge",
            "files extracted",
            Some("install"),
            Some("extract_files"),
            None,
        );

        let parsed: serde_json::Value =
            serde_json::from_str(&line).expect("JSON log line must parse");
        assert_eq!(parsed["level"], "INFO");
        assert_eq!(parsed["phase"], "install");
        assert_eq!(parsed["step"], "extract_files");
        assert_eq!(parsed["message"], "files extracted");
    }

    #[test]
    fn format_json_log_omits_absent_metadata() {
        let line = format_json_log(
            "2026-01-01T00:00:00Z",
            Level::Warn,
            "vnc_bridge",
            "viewer not found",
            None,
            None,
            None,
        );

        let parsed: serde_json::Value =
            serde_json::from_str(&line).expect("JSON log line must parse");
        assert!(
            parsed.get("phase").is_none(),
            "phase key must be absent when not tagged: {}",
            line
        );
        assert!(parsed.get("step").is_none());
    }

    #[test]
    fn format_human_readable_log_orders_tags() {
        let line = format_human_readable_log(
            "2026-01-01 00:00:00",
            Level::Info,
            "vnc_bridge",
            "entered",
            Some("wizard"),
            Some("install_files"),
        );

        assert_eq!(
            line,
            "[2026-01-01 00:00:00] [INFO] [PHASE: wizard] [STEP: install_files] [vnc_bridge] entered"
        );
    }
}
