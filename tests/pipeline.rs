use std::time::UNIX_EPOCH;

use dora_birdview::graph::export::{GraphElement, to_element_list};
use dora_birdview::graph::normalize::{NormalizeOptions, normalize};
use dora_birdview::graph::{AnalysisType, ComplexityLevel, generate_id};
use dora_birdview::layout::{LayoutAlgorithm, LayoutNode, Viewport, apply_grid, normalize_to_viewport};
use dora_birdview::render::{GraphElementRenderer, GraphProjectionInput, RenderOptions};
use dora_birdview::state::store::MemoryStore;
use dora_birdview::state::{
    ComplexityFilter, FilterSettings, LayoutSettings, ViewStateManager, ViewStateOp,
};
use serde_json::json;

fn options(analysis: AnalysisType) -> NormalizeOptions {
    NormalizeOptions::new(analysis).at(UNIX_EPOCH)
}

#[test]
fn legacy_scenario_normalizes_to_single_module_file_and_self_edge() {
    let input = json!({
        "modules": {"nodes": [{"id": "m1", "name": "core", "path": "core"}]},
        "functions": {"nodes": [{"id": "f1", "name": "foo", "file": "core/foo.py", "complexity": 3}]},
        "dependencies": {"edges": [{"source": "f1", "target": "f1"}]}
    });

    let graph = normalize(&input, &options(AnalysisType::FullCode)).expect("input should normalize");

    assert_eq!(graph.modules.modules.len(), 1);
    assert_eq!(graph.modules.modules[0].level, 1);
    let file = graph.file("f1").expect("file should exist");
    assert_eq!(file.complexity.level, ComplexityLevel::Low);
    assert_eq!(file.complexity.color, "#4CAF50");
    assert_eq!(graph.dependencies.edges.len(), 1);
    assert_eq!(graph.dependencies.edges[0].kind.as_str(), "call");
    assert!(graph.dependencies.edges[0].metadata.circular);
    assert_eq!(graph.metadata.total_nodes, 2);
    assert_eq!(graph.metadata.total_edges, 1);
}

#[test]
fn analyzer_envelope_flows_through_normalize_export_and_render() {
    let envelope = json!({
        "success": true,
        "data": {
            "modules": {"nodes": [
                {"id": "m_app", "name": "app", "path": "app"},
                {"id": "m_db", "name": "db", "path": "app/db"}
            ]},
            "functions": {"nodes": [
                {"id": "f_main", "name": "main.py", "file": "app/main.py", "complexity": 4},
                {"id": "f_models", "name": "models.py", "file": "app/db/models.py", "complexity": 12},
                {"id": "f_util", "name": "util.ts", "file": "app/util.ts", "complexity": 7}
            ]},
            "dependencies": {"edges": [
                {"source": "f_main", "target": "f_models", "type": "import"},
                {"source": "f_main", "target": "f_util", "type": "call", "weight": 3},
                {"source": "f_models", "target": "f_util", "type": "extends"}
            ]}
        }
    });

    let graph = normalize(&envelope, &options(AnalysisType::FullCode)).expect("envelope should normalize");
    assert_eq!(graph.metadata.total_nodes, 5);
    assert_eq!(graph.metadata.total_edges, 3);
    assert_eq!(graph.metadata.complexity_distribution.high, 1);

    let elements = to_element_list(&graph);
    let reparsed: Vec<GraphElement> = serde_json::from_value(
        serde_json::to_value(&elements).expect("elements should serialize"),
    )
    .expect("elements should deserialize");
    assert_eq!(reparsed.len(), 8);

    let mut manager = ViewStateManager::new(MemoryStore::new());
    manager
        .apply(AnalysisType::FullCode, ViewStateOp::Activate)
        .expect("activate should succeed");
    let view = manager
        .apply(
            AnalysisType::FullCode,
            ViewStateOp::SetFilters {
                filters: FilterSettings {
                    complexity_filter: ComplexityFilter::Medium,
                    ..FilterSettings::default()
                },
            },
        )
        .expect("filters should apply");

    let projection = GraphElementRenderer::project(GraphProjectionInput {
        graph: &graph,
        view: &view,
        options: RenderOptions::default(),
    })
    .expect("projection should succeed");

    let files = projection.files().map(|file| file.id.as_str()).collect::<Vec<_>>();
    assert_eq!(files, vec!["f_util"]);
    assert_eq!(projection.stats.modules, 2);
    assert_eq!(projection.edges().count(), 0);
}

#[test]
fn tech_stack_input_builds_synthetic_modules_and_capped_edges() {
    let input = json!({
        "tech_stack": {
            "frameworks": [{"name": "Django", "version": "4.2"}],
            "libraries": ["requests", "celery", "numpy", "pandas", "redis"]
        }
    });

    let graph = normalize(&input, &options(AnalysisType::TechStack)).expect("tech stack should normalize");

    let module_ids = graph
        .modules
        .modules
        .iter()
        .map(|module| module.id.as_str())
        .collect::<Vec<_>>();
    assert!(module_ids.contains(&"module_frameworks"));
    assert!(module_ids.contains(&"module_libraries"));
    assert_eq!(graph.files.files.len(), 6);
    assert_eq!(graph.dependencies.edges.len(), 3);
    assert!(graph.file(&generate_id("framework", "Django")).is_some());
}

#[test]
fn empty_input_is_an_empty_graph_and_an_empty_projection() {
    let graph = normalize(&json!({}), &options(AnalysisType::FullCode)).expect("{} should normalize");
    assert!(graph.is_empty());
    assert_eq!(graph.metadata.total_nodes, 0);

    let view = dora_birdview::state::ViewState {
        layout_settings: LayoutSettings {
            algorithm: LayoutAlgorithm::Grid,
            ..LayoutSettings::default()
        },
        ..Default::default()
    };
    let projection = GraphElementRenderer::project(GraphProjectionInput {
        graph: &graph,
        view: &view,
        options: RenderOptions::default(),
    })
    .expect("empty graph should not be an error");
    assert!(projection.is_empty);
}

#[test]
fn grid_then_viewport_normalization_stays_in_bounds() {
    let mut nodes = (0..9)
        .map(|index| LayoutNode {
            id: format!("n{index}"),
            position: Default::default(),
        })
        .collect::<Vec<_>>();
    apply_grid(&mut nodes, &Default::default());
    assert_eq!(nodes[8].position.x, 200.0);
    assert_eq!(nodes[8].position.y, 200.0);

    normalize_to_viewport(
        &mut nodes,
        &Viewport {
            width: 800.0,
            height: 600.0,
        },
    );
    assert!(nodes.iter().all(|node| {
        (0.0..=800.0).contains(&node.position.x) && (0.0..=600.0).contains(&node.position.y)
    }));
}

#[test]
fn colliding_ids_and_non_finite_metrics_still_project() {
    let input = json!({
        "modules": {"nodes": [{"id": "parser", "name": "parser", "path": "parser"}]},
        "functions": {"nodes": [
            {"id": "parser", "name": "parser.py", "file": "parser/parser.py", "complexity": 4},
            {"id": "lexer", "name": "lexer.py", "file": "parser/lexer.py", "complexity": "NaN"}
        ]}
    });

    let graph = normalize(&input, &options(AnalysisType::FullCode)).expect("input should normalize");
    assert_eq!(graph.metadata.total_nodes, 2);

    let projection = GraphElementRenderer::project(GraphProjectionInput {
        graph: &graph,
        view: &Default::default(),
        options: RenderOptions::default(),
    })
    .expect("projection should not fail on one bad node");
    assert_eq!(projection.stats.modules, 1);
    assert_eq!(projection.stats.files, 1);
}
