use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, ensure};

use crate::layout::Viewport;
use crate::render::RenderOptions;

pub const DEFAULT_ANALYZER_PYTHON: &str = "python3";
pub const DEFAULT_ANALYZER_SCRIPTS_DIR: &str = "analyzer";
pub const DEFAULT_VIEW_STATE_FILE: &str = ".doracodebirdview/view-state.json";
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 800;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 600;
pub const DEFAULT_FULL_ANALYSIS_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_QUICK_ANALYSIS_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RENDER_MAX_ELEMENTS: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BirdviewSettings {
    pub analyzer_python: String,
    pub analyzer_scripts_dir: PathBuf,
    pub view_state_file: PathBuf,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub full_analysis_timeout_ms: u64,
    pub quick_analysis_timeout_ms: u64,
    pub render_max_elements: u32,
}

impl Default for BirdviewSettings {
    fn default() -> Self {
        Self {
            analyzer_python: DEFAULT_ANALYZER_PYTHON.to_owned(),
            analyzer_scripts_dir: PathBuf::from(DEFAULT_ANALYZER_SCRIPTS_DIR),
            view_state_file: PathBuf::from(DEFAULT_VIEW_STATE_FILE),
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            full_analysis_timeout_ms: DEFAULT_FULL_ANALYSIS_TIMEOUT_MS,
            quick_analysis_timeout_ms: DEFAULT_QUICK_ANALYSIS_TIMEOUT_MS,
            render_max_elements: DEFAULT_RENDER_MAX_ELEMENTS,
        }
    }
}

impl BirdviewSettings {
    pub fn from_env() -> Result<Self> {
        // Load .env if present, but do not fail if file does not exist.
        let _ = dotenvy::dotenv();

        let analyzer_python = read_optional_env("ANALYZER_PYTHON")
            .unwrap_or_else(|| DEFAULT_ANALYZER_PYTHON.to_owned());
        let analyzer_scripts_dir = read_path_env("ANALYZER_SCRIPTS_DIR", DEFAULT_ANALYZER_SCRIPTS_DIR)?;
        let view_state_file = read_path_env("VIEW_STATE_FILE", DEFAULT_VIEW_STATE_FILE)?;

        let viewport_width = parse_u32_env("VIEWPORT_WIDTH", DEFAULT_VIEWPORT_WIDTH)?;
        ensure!(viewport_width > 0, "VIEWPORT_WIDTH must be greater than 0");
        let viewport_height = parse_u32_env("VIEWPORT_HEIGHT", DEFAULT_VIEWPORT_HEIGHT)?;
        ensure!(viewport_height > 0, "VIEWPORT_HEIGHT must be greater than 0");

        let full_analysis_timeout_ms =
            parse_u64_env("FULL_ANALYSIS_TIMEOUT_MS", DEFAULT_FULL_ANALYSIS_TIMEOUT_MS)?;
        ensure!(
            full_analysis_timeout_ms > 0,
            "FULL_ANALYSIS_TIMEOUT_MS must be greater than 0"
        );
        let quick_analysis_timeout_ms =
            parse_u64_env("QUICK_ANALYSIS_TIMEOUT_MS", DEFAULT_QUICK_ANALYSIS_TIMEOUT_MS)?;
        ensure!(
            quick_analysis_timeout_ms > 0,
            "QUICK_ANALYSIS_TIMEOUT_MS must be greater than 0"
        );

        let render_max_elements = parse_u32_env("RENDER_MAX_ELEMENTS", DEFAULT_RENDER_MAX_ELEMENTS)?;
        ensure!(
            render_max_elements > 0,
            "RENDER_MAX_ELEMENTS must be greater than 0"
        );

        Ok(Self {
            analyzer_python,
            analyzer_scripts_dir,
            view_state_file,
            viewport_width,
            viewport_height,
            full_analysis_timeout_ms,
            quick_analysis_timeout_ms,
            render_max_elements,
        })
    }

    pub fn full_analysis_timeout(&self) -> Duration {
        Duration::from_millis(self.full_analysis_timeout_ms)
    }

    pub fn quick_analysis_timeout(&self) -> Duration {
        Duration::from_millis(self.quick_analysis_timeout_ms)
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            viewport: Viewport {
                width: f64::from(self.viewport_width),
                height: f64::from(self.viewport_height),
            },
            max_elements: self.render_max_elements as usize,
        }
    }
}

fn read_optional_env(name: &str) -> Option<String> {
    env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        }
    })
}

fn read_path_env(name: &str, default: &str) -> Result<PathBuf> {
    let value = env::var(name).unwrap_or_else(|_| default.to_owned());
    ensure!(!value.trim().is_empty(), "{name} cannot be empty");
    Ok(PathBuf::from(value.trim()))
}

fn parse_u32_env(name: &str, default: u32) -> Result<u32> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u32>()
            .with_context(|| format!("failed to parse {name} as u32")),
        Err(_) => Ok(default),
    }
}

fn parse_u64_env(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("failed to parse {name} as u64")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::BirdviewSettings;

    #[test]
    fn default_settings_match_documented_defaults() {
        let settings = BirdviewSettings::default();
        assert_eq!(settings.analyzer_python, "python3");
        assert_eq!(settings.full_analysis_timeout(), Duration::from_secs(60));
        assert_eq!(settings.quick_analysis_timeout(), Duration::from_secs(30));

        let options = settings.render_options();
        assert_eq!(options.viewport.width, 800.0);
        assert_eq!(options.viewport.height, 600.0);
        assert_eq!(options.max_elements, 10_000);
    }
}
