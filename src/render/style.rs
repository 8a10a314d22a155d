use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::graph::{
    ComplexityLevel, DependencyType, HIGH_COMPLEXITY_COLOR, LOW_COMPLEXITY_COLOR,
    MEDIUM_COMPLEXITY_COLOR, UNKNOWN_COMPLEXITY_COLOR,
};
use crate::layout::LayoutAlgorithm;
use crate::state::{LayoutDirection, LayoutSettings};

pub const HIGHLIGHT_COLOR: &str = "#FFD600";
const RANK_SEPARATION_FACTOR: f64 = 1.5;
const NODE_REPULSION_FACTOR: f64 = 1000.0;
const PRESET_PADDING: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRule {
    pub selector: String,
    pub style: Map<String, Value>,
}

impl StyleRule {
    fn new(selector: &str, style: Value) -> Self {
        let style = match style {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            selector: selector.to_owned(),
            style,
        }
    }
}

/// Selector-based style rules keyed on the classes the renderer assigns.
pub fn stylesheet() -> Vec<StyleRule> {
    let mut rules = vec![
        StyleRule::new(
            "node.module-node",
            json!({
                "shape": "round-rectangle",
                "label": "data(label)",
                "width": "data(width)",
                "height": "data(height)",
                "background-opacity": 0.15,
                "border-width": 2,
                "text-valign": "top",
            }),
        ),
        StyleRule::new(
            "node.file-node",
            json!({
                "shape": "ellipse",
                "label": "data(label)",
                "width": "data(size)",
                "height": "data(size)",
                "background-color": UNKNOWN_COMPLEXITY_COLOR,
            }),
        ),
    ];

    for level in [
        ComplexityLevel::Low,
        ComplexityLevel::Medium,
        ComplexityLevel::High,
    ] {
        rules.push(StyleRule::new(
            &format!("node.complexity-{level}"),
            json!({ "background-color": level.color() }),
        ));
    }

    for kind in [
        DependencyType::Import,
        DependencyType::Call,
        DependencyType::Inheritance,
        DependencyType::Composition,
    ] {
        rules.push(StyleRule::new(
            &format!("edge.dependency-{kind}"),
            json!({
                "line-color": kind.color(),
                "target-arrow-color": kind.color(),
                "line-style": kind.line_style(),
                "target-arrow-shape": kind.arrow_shape(),
                "width": "data(width)",
                "curve-style": "bezier",
            }),
        ));
    }

    rules.push(StyleRule::new(
        "edge.circular",
        json!({ "line-color": HIGH_COMPLEXITY_COLOR, "target-arrow-color": HIGH_COMPLEXITY_COLOR }),
    ));
    rules.push(StyleRule::new(
        ".highlighted",
        json!({ "border-width": 4, "border-color": HIGHLIGHT_COLOR }),
    ));
    rules
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegendEntry {
    pub label: String,
    pub color: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Legend {
    pub complexity: Vec<LegendEntry>,
    pub dependencies: Vec<LegendEntry>,
}

pub fn legend() -> Legend {
    let entry = |label: &str, color: &str, description: &str| LegendEntry {
        label: label.to_owned(),
        color: color.to_owned(),
        description: description.to_owned(),
    };

    Legend {
        complexity: vec![
            entry("low", LOW_COMPLEXITY_COLOR, "complexity 0-5"),
            entry("medium", MEDIUM_COMPLEXITY_COLOR, "complexity 6-10"),
            entry("high", HIGH_COMPLEXITY_COLOR, "complexity 11+"),
            entry("unknown", UNKNOWN_COMPLEXITY_COLOR, "no complexity data"),
        ],
        dependencies: [
            DependencyType::Import,
            DependencyType::Call,
            DependencyType::Inheritance,
            DependencyType::Composition,
        ]
        .into_iter()
        .map(|kind| entry(kind.as_str(), kind.color(), kind.line_style()))
        .collect(),
    }
}

/// Parameters handed to the rendering surface's layout engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "camelCase")]
pub enum LayoutConfig {
    #[serde(rename_all = "camelCase")]
    Dagre {
        node_sep: f64,
        rank_sep: f64,
        rank_dir: LayoutDirection,
    },
    #[serde(rename_all = "camelCase")]
    Cose {
        node_repulsion: f64,
        ideal_edge_length: f64,
    },
    /// Positions are final; the surface only fits them into view.
    Preset { fit: bool, padding: f64 },
}

pub fn layout_config(settings: &LayoutSettings) -> LayoutConfig {
    let spacing = settings.spacing;
    match settings.algorithm {
        LayoutAlgorithm::Dagre => LayoutConfig::Dagre {
            node_sep: spacing,
            rank_sep: spacing * RANK_SEPARATION_FACTOR,
            rank_dir: settings.direction,
        },
        LayoutAlgorithm::Cose => LayoutConfig::Cose {
            node_repulsion: spacing * NODE_REPULSION_FACTOR,
            ideal_edge_length: spacing,
        },
        LayoutAlgorithm::Grid
        | LayoutAlgorithm::Circle
        | LayoutAlgorithm::Random
        | LayoutAlgorithm::Preset => LayoutConfig::Preset {
            fit: true,
            padding: PRESET_PADDING,
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{LayoutConfig, layout_config, legend, stylesheet};
    use crate::layout::LayoutAlgorithm;
    use crate::state::{LayoutDirection, LayoutSettings};

    #[test]
    fn dagre_and_cose_derive_parameters_from_spacing() {
        let dagre = layout_config(&LayoutSettings {
            spacing: 40.0,
            direction: LayoutDirection::LeftRight,
            ..LayoutSettings::default()
        });
        assert_eq!(
            dagre,
            LayoutConfig::Dagre {
                node_sep: 40.0,
                rank_sep: 60.0,
                rank_dir: LayoutDirection::LeftRight,
            }
        );

        let cose = layout_config(&LayoutSettings {
            algorithm: LayoutAlgorithm::Cose,
            spacing: 40.0,
            ..LayoutSettings::default()
        });
        assert_eq!(
            cose,
            LayoutConfig::Cose {
                node_repulsion: 40_000.0,
                ideal_edge_length: 40.0,
            }
        );
    }

    #[test]
    fn engine_owned_layouts_hand_off_preset_positions() {
        let config = layout_config(&LayoutSettings {
            algorithm: LayoutAlgorithm::Grid,
            ..LayoutSettings::default()
        });
        assert!(matches!(config, LayoutConfig::Preset { fit: true, .. }));
    }

    #[test]
    fn layout_config_serializes_with_name_tag() {
        let value = serde_json::to_value(layout_config(&LayoutSettings::default()))
            .expect("layout config should serialize");
        assert_eq!(
            value,
            json!({"name": "dagre", "nodeSep": 50.0, "rankSep": 75.0, "rankDir": "TB"})
        );
    }

    #[test]
    fn stylesheet_covers_every_complexity_and_dependency_class() {
        let selectors = stylesheet()
            .into_iter()
            .map(|rule| rule.selector)
            .collect::<Vec<_>>();
        for selector in [
            "node.complexity-low",
            "node.complexity-medium",
            "node.complexity-high",
            "edge.dependency-import",
            "edge.dependency-call",
            "edge.dependency-inheritance",
            "edge.dependency-composition",
        ] {
            assert!(selectors.iter().any(|s| s == selector), "missing {selector}");
        }
    }

    #[test]
    fn legend_uses_fixed_palette() {
        let legend = legend();
        let colors = legend
            .complexity
            .iter()
            .map(|entry| entry.color.as_str())
            .collect::<Vec<_>>();
        assert_eq!(colors, ["#4CAF50", "#FF9800", "#F44336", "#9E9E9E"]);
        assert_eq!(legend.dependencies[2].description, "dashed");
    }
}
