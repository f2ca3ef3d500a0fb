fn main() {
    let args: Vec<String> = std::env::args().collect();

    // Non-interactive host protocol smoke (deterministic proof runner).
    // Writes `host_smoke_<os>.log` under `vnc-bridge-logs/` and exits 0/1.
    if args.iter().any(|a| a == "--host-smoke") {
        vnc_bridge::run_host_smoke();
        return;
    }

    // Non-interactive install + extension-id bind smoke (scratch folder only).
    // Writes `bind_smoke_<os>.log` under `vnc-bridge-logs/` and exits 0/1.
    if args.iter().any(|a| a == "--bind-smoke") {
        vnc_bridge::run_bind_smoke();
        return;
    }

    // Non-interactive wizard render smoke (for automated checks).
    // Renders a single frame for a specific page and exits 0.
    // Usage: --wizard-smoke or --wizard-smoke=welcome|install|developer-mode|
    //        load-extension|copy-id|enter-id|refresh|update-refresh|cancel|error
    if let Some(arg) = args
        .iter()
        .find(|a| a.as_str() == "--wizard-smoke" || a.starts_with("--wizard-smoke="))
    {
        let target = arg
            .split_once('=')
            .map(|(_, v)| v.to_string())
            .filter(|v| !v.trim().is_empty());
        vnc_bridge::run_wizard_smoke(target);
        return;
    }

    // Default: interactive setup wizard in the terminal.
    vnc_bridge::run_setup_tui();
}
