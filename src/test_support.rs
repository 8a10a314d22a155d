use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_path(prefix: &str) -> PathBuf {
    let now_ns = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "dora_birdview_{prefix}_{}_{}",
        std::process::id(),
        now_ns
    ))
}

pub fn remove_dir_if_exists(path: &Path) {
    let _ = std::fs::remove_dir_all(path);
}

/// Points a CLI invocation at isolated state and analyzer locations.
pub fn apply_cli_test_env(command: &mut Command, state_dir: &Path, scripts_dir: &Path) {
    command.env("VIEW_STATE_FILE", state_dir.join("view-state.json"));
    command.env("ANALYZER_SCRIPTS_DIR", scripts_dir.as_os_str());
    command.env("ANALYZER_PYTHON", "sh");
    command.env("FULL_ANALYSIS_TIMEOUT_MS", "2000");
    command.env("QUICK_ANALYSIS_TIMEOUT_MS", "2000");
    command.env("RUST_LOG", "error");
    command.env_remove("DORA_LOG_DIR");
}
