use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Unknown,
}

/// Detect the platform this binary was built for.
pub fn detect_platform() -> Platform {
    #[cfg(target_os = "windows")]
    return Platform::Windows;

    #[cfg(target_os = "macos")]
    return Platform::MacOs;

    #[cfg(target_os = "linux")]
    return Platform::Linux;

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    return Platform::Unknown;
}

/// Platform name as the wire protocol reports it (`ping`/`check_vnc` responses).
/// macOS reports as "Darwin" to match what extensions already key on.
pub fn platform_name() -> &'static str {
    match detect_platform() {
        Platform::Windows => "Windows",
        Platform::MacOs => "Darwin",
        Platform::Linux => "Linux",
        Platform::Unknown => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_name_matches_detected_platform() {
        let name = platform_name();
        match detect_platform() {
            Platform::Windows => assert_eq!(name, "Windows"),
            Platform::MacOs => assert_eq!(name, "Darwin"),
            Platform::Linux => assert_eq!(name, "Linux"),
            Platform::Unknown => assert_eq!(name, "Unknown"),
        }
    }
}
