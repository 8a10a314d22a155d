use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::SystemTime;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub mod export;
pub mod normalize;

pub const ROOT_MODULE_ID: &str = "module_root";
pub const UNKNOWN_NODE_ID: &str = "unknown";

pub const LOW_COMPLEXITY_MAX: f64 = 5.0;
pub const MEDIUM_COMPLEXITY_MAX: f64 = 10.0;

pub const LOW_COMPLEXITY_COLOR: &str = "#4CAF50";
pub const MEDIUM_COMPLEXITY_COLOR: &str = "#FF9800";
pub const HIGH_COMPLEXITY_COLOR: &str = "#F44336";
pub const UNKNOWN_COMPLEXITY_COLOR: &str = "#9E9E9E";

pub const IMPORT_EDGE_COLOR: &str = "#4CAF50";
pub const CALL_EDGE_COLOR: &str = "#2196F3";
pub const INHERITANCE_EDGE_COLOR: &str = "#FF9800";
pub const COMPOSITION_EDGE_COLOR: &str = "#9C27B0";
pub const DEFAULT_EDGE_COLOR: &str = "#9E9E9E";

const FILE_MIN_SIZE: f64 = 20.0;
const FILE_MAX_SIZE: f64 = 80.0;
const EDGE_BASE_WIDTH: f64 = 1.0;
const EDGE_WIDTH_PER_WEIGHT: f64 = 0.5;
const EDGE_MAX_WIDTH: f64 = 6.0;

/// Kind of analysis a graph (and its persisted view state) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisType {
    FullCode,
    CurrentFile,
    CallHierarchy,
    GitAnalytics,
    TechStack,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 5] = [
        Self::FullCode,
        Self::CurrentFile,
        Self::CallHierarchy,
        Self::GitAnalytics,
        Self::TechStack,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullCode => "fullCode",
            Self::CurrentFile => "currentFile",
            Self::CallHierarchy => "callHierarchy",
            Self::GitAnalytics => "gitAnalytics",
            Self::TechStack => "techStack",
        }
    }
}

impl Display for AnalysisType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value
            .trim()
            .chars()
            .filter(|ch| *ch != '-' && *ch != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "fullcode" => Ok(Self::FullCode),
            "currentfile" => Ok(Self::CurrentFile),
            "callhierarchy" => Ok(Self::CallHierarchy),
            "gitanalytics" => Ok(Self::GitAnalytics),
            "techstack" => Ok(Self::TechStack),
            _ => Err(anyhow!(
                "invalid analysis type `{value}`; expected one of fullCode, currentFile, callHierarchy, gitAnalytics, techStack"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
    Unknown,
}

impl ComplexityLevel {
    /// Buckets a cyclomatic score. Boundaries are inclusive on the lower bucket.
    pub fn from_score(score: f64) -> Self {
        if score <= LOW_COMPLEXITY_MAX {
            Self::Low
        } else if score <= MEDIUM_COMPLEXITY_MAX {
            Self::Medium
        } else {
            Self::High
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Unknown => "unknown",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Self::Low => LOW_COMPLEXITY_COLOR,
            Self::Medium => MEDIUM_COMPLEXITY_COLOR,
            Self::High => HIGH_COMPLEXITY_COLOR,
            Self::Unknown => UNKNOWN_COMPLEXITY_COLOR,
        }
    }
}

impl Display for ComplexityLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    Import,
    Call,
    Inheritance,
    Composition,
}

impl DependencyType {
    /// Reads a type out of a free-form analyzer label, falling back to `Call`.
    pub fn from_label(label: &str) -> Self {
        let label = label.to_ascii_lowercase();
        if label.contains("import") {
            Self::Import
        } else if label.contains("inherit") || label.contains("extends") {
            Self::Inheritance
        } else if label.contains("compos") || label.contains("contains") {
            Self::Composition
        } else {
            Self::Call
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Call => "call",
            Self::Inheritance => "inheritance",
            Self::Composition => "composition",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Self::Import => IMPORT_EDGE_COLOR,
            Self::Call => CALL_EDGE_COLOR,
            Self::Inheritance => INHERITANCE_EDGE_COLOR,
            Self::Composition => COMPOSITION_EDGE_COLOR,
        }
    }

    pub fn line_style(self) -> &'static str {
        match self {
            Self::Import | Self::Call => "solid",
            Self::Inheritance => "dashed",
            Self::Composition => "dotted",
        }
    }

    pub fn arrow_shape(self) -> &'static str {
        match self {
            Self::Import => "triangle",
            Self::Call => "vee",
            Self::Inheritance => "triangle-tee",
            Self::Composition => "diamond",
        }
    }
}

impl Display for DependencyType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityMetrics {
    pub cyclomatic: f64,
    pub cognitive: f64,
    pub lines_of_code: u64,
    pub maintainability: f64,
    pub level: ComplexityLevel,
    pub color: String,
    pub score: f64,
}

impl ComplexityMetrics {
    pub fn new(cyclomatic: f64, cognitive: f64, lines_of_code: u64, maintainability: f64) -> Self {
        let level = ComplexityLevel::from_score(cyclomatic);
        Self {
            cyclomatic,
            cognitive,
            lines_of_code,
            maintainability,
            level,
            color: level.color().to_owned(),
            score: cyclomatic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub last_modified: Option<String>,
    pub author: Option<String>,
    pub function_count: u32,
    pub class_count: u32,
    pub import_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    pub id: String,
    pub name: String,
    pub path: String,
    pub module_id: Option<String>,
    pub complexity: ComplexityMetrics,
    pub position: Position,
    pub size: f64,
    pub language: String,
    pub highlighted: bool,
    pub metadata: FileMetadata,
}

/// Diameter of a file node, growing with the square root of its line count.
pub fn file_visual_size(lines_of_code: u64) -> f64 {
    (FILE_MIN_SIZE + (lines_of_code as f64).sqrt() * 2.0).min(FILE_MAX_SIZE)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleComplexity {
    pub file_count: usize,
    pub average: f64,
    pub max: f64,
    pub total_lines: u64,
    pub level: ComplexityLevel,
}

impl Default for ModuleComplexity {
    fn default() -> Self {
        Self {
            file_count: 0,
            average: 0.0,
            max: 0.0,
            total_lines: 0,
            level: ComplexityLevel::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleNode {
    pub id: String,
    pub name: String,
    pub path: String,
    pub file_ids: Vec<String>,
    pub child_ids: Vec<String>,
    pub parent_id: Option<String>,
    pub position: Position,
    pub size: Size,
    pub complexity: ModuleComplexity,
    /// Summary carried by the input node; used while the module owns no files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_complexity: Option<ModuleComplexity>,
    pub expanded: bool,
    pub level: u32,
}

impl ModuleNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            id: id.into(),
            name: name.into(),
            level: module_level(&path),
            path,
            file_ids: Vec::new(),
            child_ids: Vec::new(),
            parent_id: None,
            position: Position::default(),
            size: Size {
                width: 100.0,
                height: 60.0,
            },
            complexity: ModuleComplexity::default(),
            declared_complexity: None,
            expanded: true,
        }
    }
}

/// Hierarchy depth of a module: the number of path segments.
pub fn module_level(path: &str) -> u32 {
    path_segments(path).len() as u32
}

pub(crate) fn path_segments(path: &str) -> Vec<&str> {
    path.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect()
}

/// Builds a composite id `<prefix>_<sanitizedPath>`, replacing every character
/// outside `[A-Za-z0-9]` with `_`. Distinct paths that differ only in
/// punctuation (`a/b` and `a.b`) map to the same id.
pub fn generate_id(prefix: &str, path: &str) -> String {
    let sanitized = path
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect::<String>();
    format!("{prefix}_{sanitized}")
}

/// Tracks ids handed out during one graph-building pass.
#[derive(Debug, Clone, Default)]
pub struct IdRegistry {
    used: BTreeSet<String>,
}

impl IdRegistry {
    /// Returns `base` if unused, otherwise the first free `base_N` for N >= 2.
    pub fn unique(&mut self, base: String) -> String {
        if self.used.insert(base.clone()) {
            return base;
        }

        let mut suffix = 2_usize;
        loop {
            let candidate = format!("{base}_{suffix}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            suffix += 1;
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.used.contains(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeStyle {
    pub color: String,
    pub width: f64,
    pub line_style: String,
    pub arrow_shape: String,
    pub opacity: f64,
}

impl EdgeStyle {
    pub fn for_dependency(kind: DependencyType, weight: u32, placeholder_endpoint: bool) -> Self {
        let color = if placeholder_endpoint {
            DEFAULT_EDGE_COLOR
        } else {
            kind.color()
        };
        Self {
            color: color.to_owned(),
            width: (EDGE_BASE_WIDTH + f64::from(weight) * EDGE_WIDTH_PER_WEIGHT)
                .min(EDGE_MAX_WIDTH),
            line_style: kind.line_style().to_owned(),
            arrow_shape: kind.arrow_shape().to_owned(),
            opacity: if placeholder_endpoint { 0.5 } else { 0.8 },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyMetadata {
    pub strength: f64,
    pub frequency: u32,
    pub circular: bool,
    pub malformed: bool,
    pub path: [String; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: DependencyType,
    pub weight: u32,
    pub style: EdgeStyle,
    pub metadata: DependencyMetadata,
}

impl DependencyEdge {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        kind: DependencyType,
        weight: u32,
    ) -> Self {
        let source = source.into();
        let target = target.into();
        let weight = weight.max(1);
        let placeholder = source == UNKNOWN_NODE_ID || target == UNKNOWN_NODE_ID;
        Self {
            id: id.into(),
            style: EdgeStyle::for_dependency(kind, weight, placeholder),
            metadata: DependencyMetadata {
                strength: 1.0,
                frequency: weight,
                circular: false,
                malformed: false,
                path: [source.clone(), target.clone()],
            },
            source,
            target,
            kind,
            weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStatistics {
    pub total_modules: usize,
    pub max_depth: u32,
    pub average_files_per_module: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleHierarchy {
    pub root: ModuleNode,
    pub modules: Vec<ModuleNode>,
    pub statistics: ModuleStatistics,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatistics {
    pub total_files: usize,
    pub total_lines: u64,
    pub average_complexity: f64,
    pub max_complexity: f64,
    pub languages: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCollection {
    pub files: BTreeMap<String, FileNode>,
    pub by_module: BTreeMap<String, Vec<String>>,
    pub by_complexity: BTreeMap<ComplexityLevel, Vec<String>>,
    pub statistics: FileStatistics,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyStatistics {
    pub total_edges: usize,
    pub by_type: BTreeMap<DependencyType, usize>,
    pub circular_edges: usize,
    pub malformed_edges: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyNetwork {
    pub edges: Vec<DependencyEdge>,
    pub outgoing: BTreeMap<String, Vec<String>>,
    pub incoming: BTreeMap<String, Vec<String>>,
    pub statistics: DependencyStatistics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComplexityDistribution {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl ComplexityDistribution {
    pub fn total(self) -> usize {
        self.low + self.medium + self.high
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceCounters {
    pub processed_nodes: usize,
    pub processed_edges: usize,
    pub skipped_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetadata {
    pub analysis_type: AnalysisType,
    pub generated_at: SystemTime,
    pub project_path: Option<String>,
    pub total_nodes: usize,
    pub total_edges: usize,
    pub complexity_distribution: ComplexityDistribution,
    pub performance: PerformanceCounters,
}

/// Canonical graph produced by the normalizer for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedGraphData {
    pub modules: ModuleHierarchy,
    pub files: FileCollection,
    pub dependencies: DependencyNetwork,
    pub metadata: GraphMetadata,
}

impl EnhancedGraphData {
    pub fn is_empty(&self) -> bool {
        self.modules.modules.is_empty() && self.files.files.is_empty()
    }

    pub fn module(&self, id: &str) -> Option<&ModuleNode> {
        if id == ROOT_MODULE_ID {
            return Some(&self.modules.root);
        }
        self.modules.modules.iter().find(|module| module.id == id)
    }

    pub fn file(&self, id: &str) -> Option<&FileNode> {
        self.files.files.get(id)
    }

    /// Recomputes every derived index, aggregate and total from the current
    /// modules, files and edges. Only `statistics`-style fields, module
    /// summaries and metadata totals are written.
    pub fn recompute_statistics(&mut self) {
        self.reaggregate_modules();
        self.reindex_files();
        self.reindex_dependencies();

        let modules = &self.modules.modules;
        let owned_files = modules
            .iter()
            .map(|module| module.file_ids.len())
            .sum::<usize>();
        self.modules.statistics = ModuleStatistics {
            total_modules: modules.len(),
            max_depth: modules.iter().map(|module| module.level).max().unwrap_or(0),
            average_files_per_module: if modules.is_empty() {
                0.0
            } else {
                owned_files as f64 / modules.len() as f64
            },
        };

        let mut distribution = ComplexityDistribution::default();
        for file in self.files.files.values() {
            match file.complexity.level {
                ComplexityLevel::Low => distribution.low += 1,
                ComplexityLevel::Medium => distribution.medium += 1,
                ComplexityLevel::High | ComplexityLevel::Unknown => distribution.high += 1,
            }
        }

        self.metadata.total_nodes = self.modules.modules.len() + self.files.files.len();
        self.metadata.total_edges = self.dependencies.edges.len();
        self.metadata.complexity_distribution = distribution;
    }

    fn reaggregate_modules(&mut self) {
        let files = &self.files.files;
        for module in &mut self.modules.modules {
            let owned = module
                .file_ids
                .iter()
                .filter_map(|id| files.get(id))
                .collect::<Vec<_>>();
            module.complexity = summarize_files(&owned)
                .or_else(|| module.declared_complexity.clone())
                .unwrap_or_default();
        }

        let all_files = files.values().collect::<Vec<_>>();
        self.modules.root.complexity = summarize_files(&all_files).unwrap_or_default();
    }

    fn reindex_files(&mut self) {
        let mut by_module = BTreeMap::<String, Vec<String>>::new();
        let mut by_complexity = BTreeMap::<ComplexityLevel, Vec<String>>::new();
        let mut languages = BTreeMap::<String, usize>::new();
        let mut total_lines = 0_u64;
        let mut complexity_sum = 0.0;
        let mut max_complexity = 0.0_f64;

        for file in self.files.files.values() {
            if let Some(module_id) = &file.module_id {
                by_module
                    .entry(module_id.clone())
                    .or_default()
                    .push(file.id.clone());
            }
            by_complexity
                .entry(file.complexity.level)
                .or_default()
                .push(file.id.clone());
            *languages.entry(file.language.clone()).or_default() += 1;
            total_lines += file.complexity.lines_of_code;
            complexity_sum += file.complexity.cyclomatic;
            max_complexity = max_complexity.max(file.complexity.cyclomatic);
        }

        let total_files = self.files.files.len();
        self.files.by_module = by_module;
        self.files.by_complexity = by_complexity;
        self.files.statistics = FileStatistics {
            total_files,
            total_lines,
            average_complexity: if total_files == 0 {
                0.0
            } else {
                complexity_sum / total_files as f64
            },
            max_complexity,
            languages,
        };
    }

    fn reindex_dependencies(&mut self) {
        let mut outgoing = BTreeMap::<String, Vec<String>>::new();
        let mut incoming = BTreeMap::<String, Vec<String>>::new();
        let mut by_type = BTreeMap::<DependencyType, usize>::new();
        let mut circular_edges = 0;
        let mut malformed_edges = 0;

        for edge in &self.dependencies.edges {
            outgoing
                .entry(edge.source.clone())
                .or_default()
                .push(edge.target.clone());
            incoming
                .entry(edge.target.clone())
                .or_default()
                .push(edge.source.clone());
            *by_type.entry(edge.kind).or_default() += 1;
            if edge.metadata.circular {
                circular_edges += 1;
            }
            if edge.metadata.malformed {
                malformed_edges += 1;
            }
        }

        self.dependencies.outgoing = outgoing;
        self.dependencies.incoming = incoming;
        self.dependencies.statistics = DependencyStatistics {
            total_edges: self.dependencies.edges.len(),
            by_type,
            circular_edges,
            malformed_edges,
        };
    }
}

fn summarize_files(files: &[&FileNode]) -> Option<ModuleComplexity> {
    if files.is_empty() {
        return None;
    }

    let total = files
        .iter()
        .map(|file| file.complexity.cyclomatic)
        .sum::<f64>();
    let max = files
        .iter()
        .map(|file| file.complexity.cyclomatic)
        .fold(0.0_f64, f64::max);
    let average = total / files.len() as f64;
    Some(ModuleComplexity {
        file_count: files.len(),
        average,
        max,
        total_lines: files
            .iter()
            .map(|file| file.complexity.lines_of_code)
            .sum(),
        level: ComplexityLevel::from_score(average),
    })
}

/// Accumulates modules, files and edges for one normalization pass and links
/// them into an [`EnhancedGraphData`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    modules: Vec<ModuleNode>,
    files: Vec<FileNode>,
    edges: Vec<DependencyEdge>,
    node_ids: BTreeSet<String>,
    edge_ids: IdRegistry,
    performance: PerformanceCounters,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module. Modules and files share one id space; a repeated id
    /// keeps the first node.
    pub fn add_module(&mut self, module: ModuleNode) -> bool {
        self.performance.processed_nodes += 1;
        if !self.claim_node_id(&module.id, "module") {
            return false;
        }
        self.modules.push(module);
        true
    }

    /// Adds a file under the same id rules as [`GraphBuilder::add_module`].
    pub fn add_file(&mut self, file: FileNode) -> bool {
        self.performance.processed_nodes += 1;
        if !self.claim_node_id(&file.id, "file") {
            return false;
        }
        self.files.push(file);
        true
    }

    fn claim_node_id(&mut self, id: &str, kind: &'static str) -> bool {
        if id != ROOT_MODULE_ID && self.node_ids.insert(id.to_owned()) {
            return true;
        }
        warn!(id, kind, "skipping node whose id is already taken");
        self.performance.skipped_entries += 1;
        false
    }

    /// Adds an edge, renaming its id if it collides with one already issued.
    pub fn add_edge(&mut self, mut edge: DependencyEdge) {
        self.performance.processed_edges += 1;
        edge.id = self.edge_ids.unique(edge.id);
        self.edges.push(edge);
    }

    pub fn skip_entry(&mut self) {
        self.performance.skipped_entries += 1;
    }

    pub fn finish(
        self,
        analysis_type: AnalysisType,
        generated_at: SystemTime,
        project_path: Option<String>,
    ) -> EnhancedGraphData {
        let Self {
            mut modules,
            files,
            mut edges,
            performance,
            ..
        } = self;

        let mut root = ModuleNode::new(ROOT_MODULE_ID, "root", "");
        link_module_tree(&mut root, &mut modules);
        let files = assign_files_to_modules(&mut modules, files);
        mark_circular_edges(&mut edges);

        let mut graph = EnhancedGraphData {
            modules: ModuleHierarchy {
                root,
                modules,
                statistics: ModuleStatistics::default(),
            },
            files: FileCollection {
                files: files
                    .into_iter()
                    .map(|file| (file.id.clone(), file))
                    .collect(),
                ..FileCollection::default()
            },
            dependencies: DependencyNetwork {
                edges,
                ..DependencyNetwork::default()
            },
            metadata: GraphMetadata {
                analysis_type,
                generated_at,
                project_path,
                total_nodes: 0,
                total_edges: 0,
                complexity_distribution: ComplexityDistribution::default(),
                performance,
            },
        };
        graph.recompute_statistics();
        graph
    }
}

fn link_module_tree(root: &mut ModuleNode, modules: &mut [ModuleNode]) {
    let segments = modules
        .iter()
        .map(|module| {
            path_segments(&module.path)
                .into_iter()
                .map(str::to_owned)
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let mut parents = Vec::with_capacity(modules.len());
    for (index, own) in segments.iter().enumerate() {
        let parent = segments
            .iter()
            .enumerate()
            .filter(|(candidate, other)| {
                *candidate != index
                    && !other.is_empty()
                    && other.len() < own.len()
                    && own.starts_with(other)
            })
            .max_by_key(|(_, other)| other.len())
            .map(|(candidate, _)| candidate);
        parents.push(parent);
    }

    for (index, parent) in parents.into_iter().enumerate() {
        let child_id = modules[index].id.clone();
        match parent {
            Some(parent_index) => {
                modules[index].parent_id = Some(modules[parent_index].id.clone());
                modules[parent_index].child_ids.push(child_id);
            }
            None => {
                modules[index].parent_id = Some(ROOT_MODULE_ID.to_owned());
                root.child_ids.push(child_id);
            }
        }
    }
}

fn assign_files_to_modules(modules: &mut [ModuleNode], files: Vec<FileNode>) -> Vec<FileNode> {
    let mut assigned = Vec::with_capacity(files.len());
    for mut file in files {
        let explicit = file.module_id.as_deref().and_then(|reference| {
            modules
                .iter()
                .position(|module| module.id == reference)
                .or_else(|| modules.iter().position(|module| module.name == reference))
        });
        let owner = explicit.or_else(|| owning_module_by_path(modules, &file.path));

        file.module_id = owner.map(|index| modules[index].id.clone());
        if let Some(index) = owner {
            modules[index].file_ids.push(file.id.clone());
        }
        assigned.push(file);
    }
    assigned
}

fn owning_module_by_path(modules: &[ModuleNode], file_path: &str) -> Option<usize> {
    let mut directory = path_segments(file_path);
    directory.pop();

    modules
        .iter()
        .enumerate()
        .filter_map(|(index, module)| {
            let module_segments = path_segments(&module.path);
            (!module_segments.is_empty() && directory.starts_with(&module_segments))
                .then_some((index, module_segments.len()))
        })
        .max_by_key(|(_, depth)| *depth)
        .map(|(index, _)| index)
}

fn mark_circular_edges(edges: &mut [DependencyEdge]) {
    let pairs = edges
        .iter()
        .map(|edge| (edge.source.clone(), edge.target.clone()))
        .collect::<BTreeSet<_>>();
    for edge in edges {
        edge.metadata.circular = edge.source == edge.target
            || pairs.contains(&(edge.target.clone(), edge.source.clone()));
    }
}
