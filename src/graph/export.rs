use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};

use super::{EnhancedGraphData, Position, ROOT_MODULE_ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementGroup {
    Nodes,
    Edges,
}

/// Interchange element consumed by rendering surfaces:
/// `{group, data, position?, classes}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphElement {
    pub group: ElementGroup,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, deserialize_with = "deserialize_classes")]
    pub classes: Vec<String>,
}

impl GraphElement {
    pub fn id(&self) -> Option<&str> {
        self.data.get("id").and_then(Value::as_str)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ClassList {
    Joined(String),
    List(Vec<String>),
}

fn deserialize_classes<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let classes = match Option::<ClassList>::deserialize(deserializer)? {
        Some(ClassList::Joined(joined)) => joined.split_whitespace().map(str::to_owned).collect(),
        Some(ClassList::List(list)) => list,
        None => Vec::new(),
    };
    Ok(classes)
}

/// Flattens the canonical graph into modules, then files, then edges.
pub fn to_element_list(graph: &EnhancedGraphData) -> Vec<GraphElement> {
    let mut elements = Vec::with_capacity(
        graph.modules.modules.len() + graph.files.files.len() + graph.dependencies.edges.len(),
    );

    for module in &graph.modules.modules {
        let mut data = object(json!({
            "id": module.id,
            "label": module.name,
            "name": module.name,
            "path": module.path,
            "type": "module",
            "level": module.level,
            "fileCount": module.file_ids.len(),
            "complexity": module.complexity.average,
            "complexityLevel": module.complexity.level,
            "width": module.size.width,
            "height": module.size.height,
        }));
        if let Some(parent) = module
            .parent_id
            .as_deref()
            .filter(|parent| *parent != ROOT_MODULE_ID)
        {
            data.insert("parent".to_owned(), Value::String(parent.to_owned()));
        }
        elements.push(GraphElement {
            group: ElementGroup::Nodes,
            data,
            position: Some(module.position),
            classes: vec!["module-node".to_owned()],
        });
    }

    for file in graph.files.files.values() {
        let mut data = object(json!({
            "id": file.id,
            "label": file.name,
            "name": file.name,
            "path": file.path,
            "type": "file",
            "complexity": file.complexity.cyclomatic,
            "cognitive": file.complexity.cognitive,
            "maintainability": file.complexity.maintainability,
            "lines": file.complexity.lines_of_code,
            "complexityLevel": file.complexity.level,
            "color": file.complexity.color,
            "language": file.language,
            "size": file.size,
        }));
        if let Some(module_id) = &file.module_id {
            data.insert("parent".to_owned(), Value::String(module_id.clone()));
        }
        elements.push(GraphElement {
            group: ElementGroup::Nodes,
            data,
            position: Some(file.position),
            classes: vec![
                "file-node".to_owned(),
                format!("complexity-{}", file.complexity.level),
                format!("language-{}", file.language),
            ],
        });
    }

    for edge in &graph.dependencies.edges {
        elements.push(GraphElement {
            group: ElementGroup::Edges,
            data: object(json!({
                "id": edge.id,
                "source": edge.source,
                "target": edge.target,
                "type": edge.kind,
                "weight": edge.weight,
                "color": edge.style.color,
                "circular": edge.metadata.circular,
            })),
            position: None,
            classes: vec![format!("dependency-{}", edge.kind)],
        });
    }

    elements
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
