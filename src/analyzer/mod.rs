//! Thin host-side plumbing around the external analyzer scripts: the result
//! envelope, the subprocess runner and the duplicate-run guard.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::BirdviewSettings;
use crate::graph::normalize::{NormalizeOptions, normalize};
use crate::graph::{AnalysisType, EnhancedGraphData};

const STDERR_PREVIEW_CHARS: usize = 2_000;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("{analysis} analysis is already running")]
    AlreadyRunning { analysis: AnalysisType },

    #[error("failed to start analyzer `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed while waiting for {analysis} analyzer")]
    Wait {
        analysis: AnalysisType,
        #[source]
        source: std::io::Error,
    },

    #[error("{analysis} analysis timed out after {timeout_ms} ms")]
    Timeout {
        analysis: AnalysisType,
        timeout_ms: u64,
    },

    #[error("analyzer exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("analyzer produced invalid output")]
    InvalidOutput(#[source] serde_json::Error),

    #[error("analyzer reported failure: {}", .messages.join("; "))]
    Reported { messages: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerMessage {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

/// `{success, data?, errors?}` as printed by every analyzer script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<AnalyzerMessage>,
}

impl AnalyzerEnvelope {
    pub fn parse(raw: &str) -> Result<Self, AnalyzerError> {
        serde_json::from_str(raw.trim()).map_err(AnalyzerError::InvalidOutput)
    }

    pub fn is_envelope(value: &Value) -> bool {
        value.get("success").is_some_and(Value::is_boolean)
    }

    /// The payload of a successful run; `{}` when the analyzer sent none.
    pub fn into_data(self) -> Result<Value, AnalyzerError> {
        if !self.success {
            let mut messages = self
                .errors
                .into_iter()
                .map(|error| match error.kind.as_str() {
                    "" => error.message,
                    kind => format!("{kind}: {}", error.message),
                })
                .collect::<Vec<_>>();
            if messages.is_empty() {
                messages.push("analyzer returned success=false without details".to_owned());
            }
            return Err(AnalyzerError::Reported { messages });
        }

        Ok(self
            .data
            .unwrap_or_else(|| Value::Object(serde_json::Map::new())))
    }
}

/// Unwraps `value` if it is an analyzer envelope, otherwise returns it as is.
pub fn analysis_data(value: Value) -> Result<Value, AnalyzerError> {
    if !AnalyzerEnvelope::is_envelope(&value) {
        return Ok(value);
    }
    serde_json::from_value::<AnalyzerEnvelope>(value)
        .map_err(AnalyzerError::InvalidOutput)?
        .into_data()
}

pub fn graph_from_value(
    value: Value,
    options: &NormalizeOptions,
) -> anyhow::Result<EnhancedGraphData> {
    let data = analysis_data(value)?;
    normalize(&data, options).context("failed to normalize analysis data")
}

pub fn graph_from_envelope(
    envelope: AnalyzerEnvelope,
    options: &NormalizeOptions,
) -> anyhow::Result<EnhancedGraphData> {
    let data = envelope.into_data()?;
    normalize(&data, options).context("failed to normalize analysis data")
}

pub fn script_name(analysis: AnalysisType) -> &'static str {
    match analysis {
        AnalysisType::FullCode => "analyzer.py",
        AnalysisType::CurrentFile => "current_file_analyzer.py",
        AnalysisType::CallHierarchy => "call_hierarchy_analyzer.py",
        AnalysisType::GitAnalytics => "git_analytics_runner.py",
        AnalysisType::TechStack => "tech_stack_analyzer.py",
    }
}

/// Whole-project analyses get the long timeout.
pub fn uses_full_timeout(analysis: AnalysisType) -> bool {
    matches!(
        analysis,
        AnalysisType::FullCode | AnalysisType::GitAnalytics
    )
}

/// Rejects a second concurrent run of the same analysis type. Clones share
/// the same set of running analyses.
#[derive(Debug, Clone, Default)]
pub struct InFlightGuard {
    running: Arc<Mutex<BTreeSet<AnalysisType>>>,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, analysis: AnalysisType) -> Result<InFlightTicket, AnalyzerError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if !running.insert(analysis) {
            return Err(AnalyzerError::AlreadyRunning { analysis });
        }
        Ok(InFlightTicket {
            running: Arc::clone(&self.running),
            analysis,
        })
    }

    pub fn is_running(&self, analysis: AnalysisType) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&analysis)
    }
}

/// Marks one analysis as in flight until dropped.
#[derive(Debug)]
pub struct InFlightTicket {
    running: Arc<Mutex<BTreeSet<AnalysisType>>>,
    analysis: AnalysisType,
}

impl InFlightTicket {
    pub fn analysis(&self) -> AnalysisType {
        self.analysis
    }
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.analysis);
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzerRunner {
    python: String,
    scripts_dir: PathBuf,
    full_timeout: Duration,
    quick_timeout: Duration,
    guard: InFlightGuard,
}

impl AnalyzerRunner {
    pub fn new(python: impl Into<String>, scripts_dir: impl Into<PathBuf>) -> Self {
        let defaults = BirdviewSettings::default();
        Self {
            python: python.into(),
            scripts_dir: scripts_dir.into(),
            full_timeout: defaults.full_analysis_timeout(),
            quick_timeout: defaults.quick_analysis_timeout(),
            guard: InFlightGuard::new(),
        }
    }

    pub fn from_settings(settings: &BirdviewSettings) -> Self {
        Self::new(
            settings.analyzer_python.clone(),
            settings.analyzer_scripts_dir.clone(),
        )
        .with_timeouts(
            settings.full_analysis_timeout(),
            settings.quick_analysis_timeout(),
        )
    }

    pub fn with_timeouts(mut self, full: Duration, quick: Duration) -> Self {
        self.full_timeout = full;
        self.quick_timeout = quick;
        self
    }

    pub fn guard(&self) -> &InFlightGuard {
        &self.guard
    }

    pub fn timeout_for(&self, analysis: AnalysisType) -> Duration {
        if uses_full_timeout(analysis) {
            self.full_timeout
        } else {
            self.quick_timeout
        }
    }

    pub fn script_path(&self, analysis: AnalysisType) -> PathBuf {
        self.scripts_dir.join(script_name(analysis))
    }

    /// Runs `<python> <scripts_dir>/<script> <target>` and returns the payload
    /// of its envelope. The child is killed if the timeout elapses.
    pub async fn run(
        &self,
        analysis: AnalysisType,
        target: &Path,
    ) -> Result<Value, AnalyzerError> {
        let _ticket = self.guard.acquire(analysis)?;
        let script = self.script_path(analysis);
        let limit = self.timeout_for(analysis);

        let child = Command::new(&self.python)
            .arg(&script)
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AnalyzerError::Spawn {
                program: self.python.clone(),
                source,
            })?;

        info!(
            analysis = %analysis,
            script = %script.display(),
            target = %target.display(),
            "started analyzer"
        );
        let started = Instant::now();

        let output = match timeout(limit, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| AnalyzerError::Wait { analysis, source })?,
            Err(_) => {
                let timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                warn!(analysis = %analysis, timeout_ms, "analyzer timed out");
                return Err(AnalyzerError::Timeout {
                    analysis,
                    timeout_ms,
                });
            }
        };

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr)
                .chars()
                .take(STDERR_PREVIEW_CHARS)
                .collect::<String>();
            warn!(
                analysis = %analysis,
                status = %output.status,
                elapsed_ms,
                "analyzer failed"
            );
            return Err(AnalyzerError::Exit {
                status: output.status.to_string(),
                stderr: stderr.trim().to_owned(),
            });
        }

        info!(analysis = %analysis, elapsed_ms, "analyzer finished");
        let stdout = String::from_utf8_lossy(&output.stdout);
        AnalyzerEnvelope::parse(&stdout)?.into_data()
    }
}
