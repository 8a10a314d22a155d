//! Deterministic position assignment for graph nodes.
//!
//! Each algorithm has a pure form returning a [`PositionMap`] keyed by node id
//! and an `apply_*` form that writes those positions into the nodes in place.
//! Hierarchical (`dagre`) and force-directed (`cose`) layouts belong to the
//! rendering surface; [`apply_layout`] reports them as delegated.

use std::collections::BTreeMap;
use std::f64::consts::TAU;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use anyhow::{Result, anyhow};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::graph::{FileNode, ModuleNode, Position};

pub const DEFAULT_GRID_SPACING: f64 = 100.0;
pub const DEFAULT_CIRCLE_RADIUS: f64 = 200.0;
pub const DEFAULT_RANDOM_WIDTH: f64 = 800.0;
pub const DEFAULT_RANDOM_HEIGHT: f64 = 600.0;
const VIEWPORT_FILL_RATIO: f64 = 0.8;

pub type PositionMap = BTreeMap<String, Position>;

pub trait Positioned {
    fn node_id(&self) -> &str;
    fn position(&self) -> Position;
    fn set_position(&mut self, position: Position);
}

impl Positioned for ModuleNode {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> Position {
        self.position
    }

    fn set_position(&mut self, position: Position) {
        self.position = position;
    }
}

impl Positioned for FileNode {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> Position {
        self.position
    }

    fn set_position(&mut self, position: Position) {
        self.position = position;
    }
}

/// Minimal id + position pair, for laying out heterogeneous node sets.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode {
    pub id: String,
    pub position: Position,
}

impl Positioned for LayoutNode {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> Position {
        self.position
    }

    fn set_position(&mut self, position: Position) {
        self.position = position;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LayoutAlgorithm {
    Grid,
    Circle,
    Random,
    #[default]
    Dagre,
    Cose,
    Preset,
}

impl LayoutAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grid => "grid",
            Self::Circle => "circle",
            Self::Random => "random",
            Self::Dagre => "dagre",
            Self::Cose => "cose",
            Self::Preset => "preset",
        }
    }

    /// Whether positions are computed by the rendering surface instead of here.
    pub fn is_delegated(self) -> bool {
        matches!(self, Self::Dagre | Self::Cose)
    }
}

impl Display for LayoutAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayoutAlgorithm {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "grid" => Ok(Self::Grid),
            "circle" => Ok(Self::Circle),
            "random" => Ok(Self::Random),
            "dagre" | "hierarchical" => Ok(Self::Dagre),
            "cose" | "force" | "force-directed" => Ok(Self::Cose),
            "preset" => Ok(Self::Preset),
            other => Err(anyhow!(
                "invalid layout `{other}`; expected grid, circle, random, dagre, cose or preset"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridOptions {
    pub cols: Option<usize>,
    pub spacing: f64,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            cols: None,
            spacing: DEFAULT_GRID_SPACING,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleOptions {
    pub radius: f64,
    pub center_x: f64,
    pub center_y: f64,
}

impl Default for CircleOptions {
    fn default() -> Self {
        Self {
            radius: DEFAULT_CIRCLE_RADIUS,
            center_x: 0.0,
            center_y: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomOptions {
    pub width: f64,
    pub height: f64,
}

impl Default for RandomOptions {
    fn default() -> Self {
        Self {
            width: DEFAULT_RANDOM_WIDTH,
            height: DEFAULT_RANDOM_HEIGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
        }
    }
}

/// Row-major grid; `cols` defaults to `ceil(sqrt(n))`.
pub fn grid_positions<T: Positioned>(nodes: &[T], options: &GridOptions) -> PositionMap {
    if nodes.is_empty() {
        return PositionMap::new();
    }

    let cols = options
        .cols
        .filter(|cols| *cols > 0)
        .unwrap_or_else(|| (nodes.len() as f64).sqrt().ceil() as usize)
        .max(1);
    nodes
        .iter()
        .enumerate()
        .map(|(index, node)| {
            let column = (index % cols) as f64;
            let row = (index / cols) as f64;
            (
                node.node_id().to_owned(),
                Position::new(column * options.spacing, row * options.spacing),
            )
        })
        .collect()
}

/// Evenly spaced around a circle, node `i` at angle `i / n * 2π`.
pub fn circle_positions<T: Positioned>(nodes: &[T], options: &CircleOptions) -> PositionMap {
    let count = nodes.len() as f64;
    nodes
        .iter()
        .enumerate()
        .map(|(index, node)| {
            let angle = index as f64 / count * TAU;
            (
                node.node_id().to_owned(),
                Position::new(
                    options.center_x + options.radius * angle.cos(),
                    options.center_y + options.radius * angle.sin(),
                ),
            )
        })
        .collect()
}

/// Uniform samples within `[-w/2, w/2] × [-h/2, h/2]`.
pub fn random_positions<T: Positioned, R: Rng + ?Sized>(
    nodes: &[T],
    options: &RandomOptions,
    rng: &mut R,
) -> PositionMap {
    let half_width = options.width.abs() / 2.0;
    let half_height = options.height.abs() / 2.0;
    nodes
        .iter()
        .map(|node| {
            (
                node.node_id().to_owned(),
                Position::new(
                    rng.gen_range(-half_width..=half_width),
                    rng.gen_range(-half_height..=half_height),
                ),
            )
        })
        .collect()
}

/// Scales uniformly into 80% of the viewport and centers the content.
/// Degenerate extents are treated as 1 so single rows/columns still scale.
pub fn viewport_positions<T: Positioned>(nodes: &[T], viewport: &Viewport) -> PositionMap {
    let Some(first) = nodes.first().map(Positioned::position) else {
        return PositionMap::new();
    };

    let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
    for position in nodes.iter().map(Positioned::position) {
        min_x = min_x.min(position.x);
        max_x = max_x.max(position.x);
        min_y = min_y.min(position.y);
        max_y = max_y.max(position.y);
    }

    let width = extent(max_x - min_x);
    let height = extent(max_y - min_y);
    let scale = (viewport.width * VIEWPORT_FILL_RATIO / width)
        .min(viewport.height * VIEWPORT_FILL_RATIO / height);
    let center_x = (min_x + max_x) / 2.0;
    let center_y = (min_y + max_y) / 2.0;

    nodes
        .iter()
        .map(|node| {
            let position = node.position();
            (
                node.node_id().to_owned(),
                Position::new(
                    (position.x - center_x) * scale + viewport.width / 2.0,
                    (position.y - center_y) * scale + viewport.height / 2.0,
                ),
            )
        })
        .collect()
}

fn extent(span: f64) -> f64 {
    if span > 0.0 { span } else { 1.0 }
}

pub fn apply_positions<T: Positioned>(nodes: &mut [T], positions: &PositionMap) {
    for node in nodes {
        if let Some(position) = positions.get(node.node_id()) {
            node.set_position(*position);
        }
    }
}

pub fn apply_grid<T: Positioned>(nodes: &mut [T], options: &GridOptions) {
    let positions = grid_positions(nodes, options);
    apply_positions(nodes, &positions);
}

pub fn apply_circle<T: Positioned>(nodes: &mut [T], options: &CircleOptions) {
    let positions = circle_positions(nodes, options);
    apply_positions(nodes, &positions);
}

pub fn apply_random<T: Positioned>(nodes: &mut [T], options: &RandomOptions) {
    let positions = random_positions(nodes, options, &mut rand::thread_rng());
    apply_positions(nodes, &positions);
}

pub fn normalize_to_viewport<T: Positioned>(nodes: &mut [T], viewport: &Viewport) {
    let positions = viewport_positions(nodes, viewport);
    apply_positions(nodes, &positions);
}

/// Runs an engine-owned algorithm using `spacing` as its scale. Returns
/// `false` without touching positions for delegated or preset layouts.
pub fn apply_layout<T: Positioned>(
    nodes: &mut [T],
    algorithm: LayoutAlgorithm,
    spacing: f64,
) -> bool {
    match algorithm {
        LayoutAlgorithm::Grid => apply_grid(
            nodes,
            &GridOptions {
                cols: None,
                spacing,
            },
        ),
        LayoutAlgorithm::Circle => apply_circle(
            nodes,
            &CircleOptions {
                radius: (nodes.len() as f64 * spacing / TAU).max(DEFAULT_CIRCLE_RADIUS),
                ..CircleOptions::default()
            },
        ),
        LayoutAlgorithm::Random => apply_random(nodes, &RandomOptions::default()),
        LayoutAlgorithm::Dagre | LayoutAlgorithm::Cose | LayoutAlgorithm::Preset => return false,
    }
    true
}
