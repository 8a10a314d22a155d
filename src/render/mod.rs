//! View-filtered projection of the canonical graph.
//!
//! [`GraphElementRenderer::project`] applies a [`ViewState`] to an
//! [`EnhancedGraphData`] and returns everything a rendering surface needs:
//! the visible elements, style rules, a legend and layout parameters. It
//! performs no drawing itself.

pub mod style;

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::debug;

use crate::graph::export::{ElementGroup, GraphElement};
use crate::graph::{
    ComplexityLevel, DependencyEdge, DependencyType, EnhancedGraphData, FileNode, ModuleNode,
    Position, ROOT_MODULE_ID,
};
use crate::layout::{LayoutAlgorithm, LayoutNode, Viewport, apply_layout, normalize_to_viewport};
use crate::state::{Grouping, ViewState};

use self::style::{LayoutConfig, Legend, StyleRule, layout_config, legend, stylesheet};

pub const DEFAULT_MAX_ELEMENTS: usize = 10_000;

const MODULE_BASE_WIDTH: f64 = 120.0;
const MODULE_WIDTH_PER_FILE: f64 = 12.0;
const MODULE_MAX_WIDTH: f64 = 480.0;
const MODULE_BASE_HEIGHT: f64 = 80.0;
const MODULE_HEIGHT_PER_CHILD: f64 = 20.0;
const MODULE_MAX_HEIGHT: f64 = 320.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderErrorKind {
    Data,
    /// Failure raised by the rendering surface itself.
    #[serde(rename = "cytoscape")]
    Surface,
    Performance,
    Memory,
}

impl RenderErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Surface => "cytoscape",
            Self::Performance => "performance",
            Self::Memory => "memory",
        }
    }
}

impl Display for RenderErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{kind} error while projecting graph ({node_count} nodes, {edge_count} edges): {message}")]
pub struct RenderError {
    #[serde(rename = "type")]
    pub kind: RenderErrorKind,
    pub message: String,
    pub node_count: usize,
    pub edge_count: usize,
}

impl RenderError {
    fn new(
        kind: RenderErrorKind,
        message: impl Into<String>,
        node_count: usize,
        edge_count: usize,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            node_count,
            edge_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    pub viewport: Viewport,
    pub max_elements: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            max_elements: DEFAULT_MAX_ELEMENTS,
        }
    }
}

pub struct GraphProjectionInput<'a> {
    pub graph: &'a EnhancedGraphData,
    pub view: &'a ViewState,
    pub options: RenderOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleShape {
    pub id: String,
    pub label: String,
    pub parent: Option<String>,
    pub position: Position,
    pub width: f64,
    pub height: f64,
    pub complexity_level: ComplexityLevel,
    pub file_count: usize,
    pub child_count: usize,
    pub highlighted: bool,
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileShape {
    pub id: String,
    pub label: String,
    pub parent: Option<String>,
    pub position: Position,
    pub diameter: f64,
    pub fill_color: String,
    pub complexity_level: ComplexityLevel,
    pub complexity: f64,
    pub lines_of_code: u64,
    pub language: String,
    pub highlighted: bool,
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyArrow {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: DependencyType,
    pub weight: u32,
    pub color: String,
    pub width: f64,
    pub line_style: String,
    pub arrow_shape: String,
    pub opacity: f64,
    pub circular: bool,
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum VisualElement {
    Module(ModuleShape),
    File(FileShape),
    Dependency(DependencyArrow),
}

impl VisualElement {
    pub fn id(&self) -> &str {
        match self {
            Self::Module(shape) => &shape.id,
            Self::File(shape) => &shape.id,
            Self::Dependency(arrow) => &arrow.id,
        }
    }

    pub fn is_node(&self) -> bool {
        !matches!(self, Self::Dependency(_))
    }

    pub fn classes(&self) -> &[String] {
        match self {
            Self::Module(shape) => &shape.classes,
            Self::File(shape) => &shape.classes,
            Self::Dependency(arrow) => &arrow.classes,
        }
    }

    fn position_mut(&mut self) -> Option<&mut Position> {
        match self {
            Self::Module(shape) => Some(&mut shape.position),
            Self::File(shape) => Some(&mut shape.position),
            Self::Dependency(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionStats {
    pub modules: usize,
    pub files: usize,
    pub edges: usize,
    pub hidden_files: usize,
    pub hidden_edges: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub elements: Vec<VisualElement>,
    pub styles: Vec<StyleRule>,
    pub legend: Legend,
    pub layout: LayoutConfig,
    pub is_empty: bool,
    pub stats: ProjectionStats,
}

impl Projection {
    fn empty(view: &ViewState) -> Self {
        Self {
            elements: Vec::new(),
            styles: stylesheet(),
            legend: legend(),
            layout: layout_config(&view.layout_settings),
            is_empty: true,
            stats: ProjectionStats::default(),
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &VisualElement> {
        self.elements.iter().filter(|element| element.is_node())
    }

    pub fn files(&self) -> impl Iterator<Item = &FileShape> {
        self.elements.iter().filter_map(|element| match element {
            VisualElement::File(shape) => Some(shape),
            _ => None,
        })
    }

    pub fn edges(&self) -> impl Iterator<Item = &DependencyArrow> {
        self.elements.iter().filter_map(|element| match element {
            VisualElement::Dependency(arrow) => Some(arrow),
            _ => None,
        })
    }

    /// The projected elements in the `{group, data, position, classes}`
    /// interchange shape.
    pub fn to_graph_elements(&self) -> Vec<GraphElement> {
        self.elements.iter().map(graph_element).collect()
    }
}

pub struct GraphElementRenderer;

impl GraphElementRenderer {
    pub fn project(input: GraphProjectionInput<'_>) -> Result<Projection, RenderError> {
        let GraphProjectionInput {
            graph,
            view,
            options,
        } = input;
        if graph.is_empty() {
            debug!("graph has no data; returning empty projection");
            return Ok(Projection::empty(view));
        }

        let filters = &view.filter_settings;
        let query = view.search_query.trim().to_lowercase();
        let selected = view
            .selected_nodes
            .iter()
            .map(String::as_str)
            .collect::<BTreeSet<_>>();
        let grouping = view.layout_settings.grouping;

        let modules = graph
            .modules
            .modules
            .iter()
            .filter(|module| filters.show_modules && matches_query(&module.name, &query))
            .collect::<Vec<_>>();
        let module_ids = modules
            .iter()
            .map(|module| module.id.as_str())
            .collect::<BTreeSet<_>>();

        let files = graph
            .files
            .files
            .values()
            .filter(|file| {
                filters.show_files
                    && filters.complexity_filter.matches(file.complexity.level)
                    && matches_query(&file.name, &query)
            })
            .collect::<Vec<_>>();

        let node_ids = module_ids
            .iter()
            .copied()
            .chain(files.iter().map(|file| file.id.as_str()))
            .collect::<BTreeSet<_>>();
        let edges = graph
            .dependencies
            .edges
            .iter()
            .filter(|edge| {
                filters.dependency_filter.matches(edge.kind)
                    && node_ids.contains(edge.source.as_str())
                    && node_ids.contains(edge.target.as_str())
            })
            .collect::<Vec<_>>();

        let node_count = modules.len() + files.len();
        let edge_count = edges.len();
        let element_count = node_count + edge_count;
        if element_count > options.max_elements {
            return Err(RenderError::new(
                RenderErrorKind::Performance,
                format!(
                    "{element_count} elements exceed the limit of {}; narrow the filters",
                    options.max_elements
                ),
                node_count,
                edge_count,
            ));
        }

        let mut elements: Vec<VisualElement> = Vec::new();
        elements.try_reserve_exact(element_count).map_err(|error| {
            RenderError::new(
                RenderErrorKind::Memory,
                format!("failed to allocate projection: {error}"),
                node_count,
                edge_count,
            )
        })?;

        let highlight = |id: &str, name: &str, flagged: bool| {
            flagged || selected.contains(id) || (!query.is_empty() && matches_query(name, &query))
        };
        for module in &modules {
            let highlighted = highlight(module.id.as_str(), module.name.as_str(), false);
            elements.push(VisualElement::Module(module_shape(
                module,
                &module_ids,
                highlighted,
            )));
        }
        for file in &files {
            let highlighted = highlight(file.id.as_str(), file.name.as_str(), file.highlighted);
            elements.push(VisualElement::File(file_shape(
                file,
                &module_ids,
                grouping,
                highlighted,
            )));
        }
        for edge in &edges {
            elements.push(VisualElement::Dependency(dependency_arrow(edge)));
        }

        validate(&elements).map_err(|message| {
            RenderError::new(RenderErrorKind::Data, message, node_count, edge_count)
        })?;

        let algorithm = view.layout_settings.algorithm;
        if !algorithm.is_delegated() && algorithm != LayoutAlgorithm::Preset {
            position_nodes(&mut elements, algorithm, view.layout_settings.spacing, &options);
        }

        let stats = ProjectionStats {
            modules: modules.len(),
            files: files.len(),
            edges: edges.len(),
            hidden_files: graph.files.files.len() - files.len(),
            hidden_edges: graph.dependencies.edges.len() - edges.len(),
        };
        debug!(
            modules = stats.modules,
            files = stats.files,
            edges = stats.edges,
            layout = %algorithm,
            "projected graph"
        );

        Ok(Projection {
            is_empty: node_count == 0,
            elements,
            styles: stylesheet(),
            legend: legend(),
            layout: layout_config(&view.layout_settings),
            stats,
        })
    }
}

fn matches_query(name: &str, query: &str) -> bool {
    query.is_empty() || name.to_lowercase().contains(query)
}

fn module_shape(module: &ModuleNode, visible: &BTreeSet<&str>, highlighted: bool) -> ModuleShape {
    let file_count = module.file_ids.len();
    let child_count = module.child_ids.len();
    let width = module
        .size
        .width
        .max(MODULE_BASE_WIDTH + MODULE_WIDTH_PER_FILE * file_count as f64)
        .min(MODULE_MAX_WIDTH);
    let height = module
        .size
        .height
        .max(MODULE_BASE_HEIGHT + MODULE_HEIGHT_PER_CHILD * child_count as f64)
        .min(MODULE_MAX_HEIGHT);

    let mut classes = vec!["module-node".to_owned()];
    if highlighted {
        classes.push("highlighted".to_owned());
    }

    ModuleShape {
        id: module.id.clone(),
        label: module.name.clone(),
        parent: module
            .parent_id
            .clone()
            .filter(|parent| parent != ROOT_MODULE_ID && visible.contains(parent.as_str())),
        position: module.position,
        width,
        height,
        complexity_level: module.complexity.level,
        file_count,
        child_count,
        highlighted,
        classes,
    }
}

fn file_shape(
    file: &FileNode,
    visible_modules: &BTreeSet<&str>,
    grouping: Grouping,
    highlighted: bool,
) -> FileShape {
    let level = file.complexity.level;
    let mut classes = vec![
        "file-node".to_owned(),
        format!("complexity-{level}"),
        format!("language-{}", file.language),
    ];
    if grouping == Grouping::Complexity {
        classes.push(format!("complexity-group-{level}"));
    }
    if highlighted {
        classes.push("highlighted".to_owned());
    }

    let parent = match grouping {
        Grouping::Module => file
            .module_id
            .clone()
            .filter(|module_id| visible_modules.contains(module_id.as_str())),
        Grouping::Complexity | Grouping::None => None,
    };

    FileShape {
        id: file.id.clone(),
        label: file.name.clone(),
        parent,
        position: file.position,
        diameter: file.size,
        fill_color: level.color().to_owned(),
        complexity_level: level,
        complexity: file.complexity.cyclomatic,
        lines_of_code: file.complexity.lines_of_code,
        language: file.language.clone(),
        highlighted,
        classes,
    }
}

fn dependency_arrow(edge: &DependencyEdge) -> DependencyArrow {
    let mut classes = vec![format!("dependency-{}", edge.kind)];
    if edge.metadata.circular {
        classes.push("circular".to_owned());
    }

    DependencyArrow {
        id: edge.id.clone(),
        source: edge.source.clone(),
        target: edge.target.clone(),
        kind: edge.kind,
        weight: edge.weight,
        color: edge.style.color.clone(),
        width: edge.style.width,
        line_style: edge.style.line_style.clone(),
        arrow_shape: edge.style.arrow_shape.clone(),
        opacity: edge.style.opacity,
        circular: edge.metadata.circular,
        classes,
    }
}

fn validate(elements: &[VisualElement]) -> Result<(), String> {
    let mut seen = BTreeSet::new();
    for element in elements {
        if !seen.insert(element.id()) {
            return Err(format!("duplicate element id `{}`", element.id()));
        }

        let finite = match element {
            VisualElement::Module(shape) => {
                shape.position.is_finite() && shape.width.is_finite() && shape.height.is_finite()
            }
            VisualElement::File(shape) => {
                shape.position.is_finite()
                    && shape.diameter.is_finite()
                    && shape.complexity.is_finite()
            }
            VisualElement::Dependency(arrow) => arrow.width.is_finite() && arrow.opacity.is_finite(),
        };
        if !finite {
            return Err(format!("element `{}` has a non-finite value", element.id()));
        }
    }
    Ok(())
}

fn position_nodes(
    elements: &mut [VisualElement],
    algorithm: LayoutAlgorithm,
    spacing: f64,
    options: &RenderOptions,
) {
    let mut nodes = elements
        .iter()
        .filter(|element| element.is_node())
        .map(|element| LayoutNode {
            id: element.id().to_owned(),
            position: Position::default(),
        })
        .collect::<Vec<_>>();
    if !apply_layout(&mut nodes, algorithm, spacing) {
        return;
    }
    normalize_to_viewport(&mut nodes, &options.viewport);

    let mut positions = nodes.into_iter().map(|node| node.position);
    for element in elements.iter_mut() {
        if let Some(position) = element.position_mut() {
            if let Some(next) = positions.next() {
                *position = next;
            }
        }
    }
}

fn graph_element(element: &VisualElement) -> GraphElement {
    let (group, data, position) = match element {
        VisualElement::Module(shape) => (
            ElementGroup::Nodes,
            json!({
                "id": shape.id,
                "label": shape.label,
                "type": "module",
                "parent": shape.parent,
                "width": shape.width,
                "height": shape.height,
                "fileCount": shape.file_count,
                "complexityLevel": shape.complexity_level,
            }),
            Some(shape.position),
        ),
        VisualElement::File(shape) => (
            ElementGroup::Nodes,
            json!({
                "id": shape.id,
                "label": shape.label,
                "type": "file",
                "parent": shape.parent,
                "size": shape.diameter,
                "color": shape.fill_color,
                "complexity": shape.complexity,
                "complexityLevel": shape.complexity_level,
                "lines": shape.lines_of_code,
                "language": shape.language,
            }),
            Some(shape.position),
        ),
        VisualElement::Dependency(arrow) => (
            ElementGroup::Edges,
            json!({
                "id": arrow.id,
                "source": arrow.source,
                "target": arrow.target,
                "type": arrow.kind,
                "weight": arrow.weight,
                "width": arrow.width,
                "color": arrow.color,
                "circular": arrow.circular,
            }),
            None,
        ),
    };

    let mut data = match data {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    data.retain(|_, value| !value.is_null());
    GraphElement {
        group,
        data,
        position,
        classes: element.classes().to_vec(),
    }
}
