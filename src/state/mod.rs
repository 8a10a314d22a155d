pub mod store;

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::graph::{AnalysisType, ComplexityLevel, DependencyType};
use crate::layout::LayoutAlgorithm;

use self::store::KeyValueStore;

pub const VIEW_STATE_KEY_PREFIX: &str = "doracodebirdview.viewState";
pub const MIN_ZOOM_LEVEL: f64 = 0.1;
pub const MAX_ZOOM_LEVEL: f64 = 5.0;
pub const DEFAULT_LAYOUT_SPACING: f64 = 50.0;

pub fn storage_key(view: AnalysisType) -> String {
    format!("{VIEW_STATE_KEY_PREFIX}.{view}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityFilter {
    #[default]
    All,
    Low,
    Medium,
    High,
}

impl ComplexityFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn matches(self, level: ComplexityLevel) -> bool {
        match self {
            Self::All => true,
            Self::Low => level == ComplexityLevel::Low,
            Self::Medium => level == ComplexityLevel::Medium,
            Self::High => level == ComplexityLevel::High,
        }
    }
}

impl Display for ComplexityFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplexityFilter {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(anyhow!(
                "invalid complexity filter `{other}`; expected all, low, medium or high"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DependencyFilter {
    #[default]
    All,
    Imports,
    Calls,
}

impl DependencyFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Imports => "imports",
            Self::Calls => "calls",
        }
    }

    /// Inheritance and composition edges only pass under `all`.
    pub fn matches(self, kind: DependencyType) -> bool {
        match self {
            Self::All => true,
            Self::Imports => kind == DependencyType::Import,
            Self::Calls => kind == DependencyType::Call,
        }
    }
}

impl Display for DependencyFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DependencyFilter {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "imports" | "import" => Ok(Self::Imports),
            "calls" | "call" => Ok(Self::Calls),
            other => Err(anyhow!(
                "invalid dependency filter `{other}`; expected all, imports or calls"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LayoutDirection {
    #[default]
    #[serde(rename = "TB")]
    TopBottom,
    #[serde(rename = "LR")]
    LeftRight,
    #[serde(rename = "BT")]
    BottomTop,
    #[serde(rename = "RL")]
    RightLeft,
}

impl LayoutDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TopBottom => "TB",
            Self::LeftRight => "LR",
            Self::BottomTop => "BT",
            Self::RightLeft => "RL",
        }
    }
}

impl Display for LayoutDirection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayoutDirection {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "TB" => Ok(Self::TopBottom),
            "LR" => Ok(Self::LeftRight),
            "BT" => Ok(Self::BottomTop),
            "RL" => Ok(Self::RightLeft),
            other => Err(anyhow!(
                "invalid layout direction `{other}`; expected TB, LR, BT or RL"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Grouping {
    #[default]
    Module,
    Complexity,
    None,
}

impl Grouping {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Complexity => "complexity",
            Self::None => "none",
        }
    }
}

impl Display for Grouping {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grouping {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "module" => Ok(Self::Module),
            "complexity" => Ok(Self::Complexity),
            "none" => Ok(Self::None),
            other => Err(anyhow!(
                "invalid grouping `{other}`; expected module, complexity or none"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterSettings {
    pub show_modules: bool,
    pub show_files: bool,
    pub complexity_filter: ComplexityFilter,
    pub dependency_filter: DependencyFilter,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            show_modules: true,
            show_files: true,
            complexity_filter: ComplexityFilter::All,
            dependency_filter: DependencyFilter::All,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutSettings {
    pub algorithm: LayoutAlgorithm,
    pub spacing: f64,
    pub direction: LayoutDirection,
    pub grouping: Grouping,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            algorithm: LayoutAlgorithm::Dagre,
            spacing: DEFAULT_LAYOUT_SPACING,
            direction: LayoutDirection::TopBottom,
            grouping: Grouping::Module,
        }
    }
}

/// Per-view UI state, persisted as one JSON blob per analysis type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewState {
    pub is_active: bool,
    pub zoom_level: f64,
    pub search_query: String,
    pub filter_settings: FilterSettings,
    pub layout_settings: LayoutSettings,
    pub selected_nodes: Vec<String>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            is_active: false,
            zoom_level: 1.0,
            search_query: String::new(),
            filter_settings: FilterSettings::default(),
            layout_settings: LayoutSettings::default(),
            selected_nodes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewStateOp {
    Activate,
    Deactivate,
    SetZoom { level: f64 },
    SetSearchQuery { query: String },
    SetFilters { filters: FilterSettings },
    SetLayout { layout: LayoutSettings },
    SelectNodes { node_ids: Vec<String> },
    ClearSelection,
    Reset,
}

impl ViewState {
    pub fn apply(&mut self, op: ViewStateOp) {
        match op {
            ViewStateOp::Activate => self.is_active = true,
            ViewStateOp::Deactivate => self.is_active = false,
            ViewStateOp::SetZoom { level } => {
                if level.is_finite() {
                    self.zoom_level = level.clamp(MIN_ZOOM_LEVEL, MAX_ZOOM_LEVEL);
                }
            }
            ViewStateOp::SetSearchQuery { query } => self.search_query = query.trim().to_owned(),
            ViewStateOp::SetFilters { filters } => self.filter_settings = filters,
            ViewStateOp::SetLayout { layout } => {
                let spacing = if layout.spacing.is_finite() && layout.spacing > 0.0 {
                    layout.spacing
                } else {
                    self.layout_settings.spacing
                };
                self.layout_settings = LayoutSettings { spacing, ..layout };
            }
            ViewStateOp::SelectNodes { node_ids } => {
                let mut seen = BTreeSet::new();
                self.selected_nodes = node_ids
                    .into_iter()
                    .filter(|node_id| seen.insert(node_id.clone()))
                    .collect();
            }
            ViewStateOp::ClearSelection => self.selected_nodes.clear(),
            ViewStateOp::Reset => {
                // Reset keeps activation; only the view's settings go back to defaults.
                *self = Self {
                    is_active: self.is_active,
                    ..Self::default()
                };
            }
        }
    }
}

/// Reads and writes view state through an injected store. At most one view
/// is active at a time.
#[derive(Debug)]
pub struct ViewStateManager<S> {
    store: S,
}

impl<S: KeyValueStore> ViewStateManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Stored state for `view`, or defaults when nothing readable is stored.
    pub fn get(&self, view: AnalysisType) -> Result<ViewState> {
        let key = storage_key(view);
        let stored = self
            .store
            .get(&key)
            .with_context(|| format!("failed to read view state `{key}`"))?;

        let Some(value) = stored else {
            return Ok(ViewState::default());
        };
        match serde_json::from_value(value) {
            Ok(state) => Ok(state),
            Err(error) => {
                warn!(key = %key, error = %error, "discarding unreadable view state");
                Ok(ViewState::default())
            }
        }
    }

    pub fn active_view(&self) -> Result<Option<AnalysisType>> {
        for view in AnalysisType::ALL {
            if self.get(view)?.is_active {
                return Ok(Some(view));
            }
        }
        Ok(None)
    }

    /// Applies `op` to `view` and persists the result immediately.
    pub fn apply(&mut self, view: AnalysisType, op: ViewStateOp) -> Result<ViewState> {
        let activating = matches!(op, ViewStateOp::Activate);
        let mut state = self.get(view)?;
        state.apply(op);

        if activating {
            for other in AnalysisType::ALL.into_iter().filter(|other| *other != view) {
                let mut other_state = self.get(other)?;
                if other_state.is_active {
                    other_state.apply(ViewStateOp::Deactivate);
                    self.save(other, &other_state)?;
                }
            }
        }

        self.save(view, &state)?;
        Ok(state)
    }

    fn save(&mut self, view: AnalysisType, state: &ViewState) -> Result<()> {
        let key = storage_key(view);
        let value = serde_json::to_value(state)
            .with_context(|| format!("failed to encode view state `{key}`"))?;
        self.store
            .set(&key, value)
            .with_context(|| format!("failed to persist view state `{key}`"))?;
        debug!(key = %key, active = state.is_active, "persisted view state");
        Ok(())
    }
}
