//! Transforms loosely typed analyzer output into [`EnhancedGraphData`].
//!
//! Every transform is total over object-shaped input: missing or mistyped
//! optional fields fall back to defaults instead of failing the whole pass.

use std::path::Path;
use std::time::SystemTime;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::export::{ElementGroup, GraphElement};
use crate::analyzer::{AnalyzerEnvelope, AnalyzerError};
use super::{
    AnalysisType, ComplexityLevel, ComplexityMetrics, DependencyEdge, DependencyType,
    EnhancedGraphData, FileMetadata, FileNode, GraphBuilder, ModuleComplexity, ModuleNode,
    Position, Size, UNKNOWN_NODE_ID, file_visual_size, generate_id, module_level,
};

/// Anti-clutter cap on synthetic framework → library edges.
// TODO: expose through `BirdviewSettings` once the tech-stack view gets its own settings panel.
pub const MAX_LIBRARIES_PER_FRAMEWORK: usize = 3;

const DEFAULT_FUNCTION_LINES: f64 = 10.0;
const TECH_ITEM_COMPLEXITY: f64 = 1.0;
const TECH_ITEM_LINES: u64 = 10;

/// Top-level keys that mark an object as carrying a code graph.
const CODE_SECTIONS: [&str; 4] = ["modules", "functions", "dependencies", "calls"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("analysis input must be a JSON object or element array, found {found}")]
    NotAnObject { found: &'static str },

    #[error("analyzer envelope is malformed: {reason}")]
    InvalidEnvelope { reason: String },

    #[error("analysis reported failure: {}", .messages.join("; "))]
    AnalysisFailed { messages: Vec<String> },
}

/// The input shapes the normalizer understands.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisInput {
    Legacy(Map<String, Value>),
    GenericElements(Vec<GraphElement>),
    TechStack(TechStackInput),
}

impl AnalysisInput {
    /// Classifies raw analyzer JSON. Analyzer envelopes are unwrapped through
    /// their `data` field first; a `success = false` envelope is an error.
    pub fn from_value(value: &Value) -> Result<Self, NormalizeError> {
        let object = match value {
            Value::Array(items) => return Ok(Self::GenericElements(parse_elements(items))),
            Value::Object(object) => object,
            other => {
                return Err(NormalizeError::NotAnObject {
                    found: json_kind(other),
                });
            }
        };

        // `{success: true}` without `data` keeps its top-level sections.
        let failed = object.get("success") == Some(&Value::Bool(false));
        if AnalyzerEnvelope::is_envelope(value) && (failed || object.contains_key("data")) {
            return Self::from_value(&envelope_data(value)?);
        }

        match object.get("elements") {
            Some(Value::Array(items)) => return Ok(Self::GenericElements(parse_elements(items))),
            Some(Value::Object(grouped)) => {
                return Ok(Self::GenericElements(parse_grouped_elements(grouped)));
            }
            _ => {}
        }

        // A code graph that also reports its stack stays a code graph; the
        // legacy transform folds the stack in.
        if CODE_SECTIONS.iter().any(|key| object.contains_key(*key)) {
            return Ok(Self::Legacy(object.clone()));
        }
        if let Some(section) = tech_stack_section(object) {
            return Ok(Self::TechStack(TechStackInput::from_value(section)));
        }
        if object.contains_key("frameworks") || object.contains_key("libraries") {
            return Ok(Self::TechStack(TechStackInput::from_value(value)));
        }

        Ok(Self::Legacy(object.clone()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeOptions {
    pub analysis_type: AnalysisType,
    pub generated_at: SystemTime,
    pub project_path: Option<String>,
}

impl NormalizeOptions {
    pub fn new(analysis_type: AnalysisType) -> Self {
        Self {
            analysis_type,
            generated_at: SystemTime::now(),
            project_path: None,
        }
    }

    pub fn at(mut self, generated_at: SystemTime) -> Self {
        self.generated_at = generated_at;
        self
    }

    pub fn project_path(mut self, project_path: impl Into<String>) -> Self {
        self.project_path = Some(project_path.into());
        self
    }
}

/// Classifies `value` and runs the matching transform.
pub fn normalize(
    value: &Value,
    options: &NormalizeOptions,
) -> Result<EnhancedGraphData, NormalizeError> {
    let input = AnalysisInput::from_value(value)?;
    let graph = match &input {
        AnalysisInput::Legacy(object) => transform_legacy_with(object, options),
        AnalysisInput::GenericElements(elements) => {
            transform_generic_elements_with(elements, options)
        }
        AnalysisInput::TechStack(stack) => transform_tech_stack_with(stack, options),
    };
    debug!(
        analysis = %options.analysis_type,
        total_nodes = graph.metadata.total_nodes,
        total_edges = graph.metadata.total_edges,
        "normalized analysis input"
    );
    Ok(graph)
}

pub fn transform_legacy(input: &Map<String, Value>) -> EnhancedGraphData {
    transform_legacy_with(input, &NormalizeOptions::new(AnalysisType::FullCode))
}

pub fn transform_legacy_with(
    input: &Map<String, Value>,
    options: &NormalizeOptions,
) -> EnhancedGraphData {
    let mut builder = GraphBuilder::new();

    for (index, node) in section_items(input, "modules", &["nodes"]).iter().enumerate() {
        match node.as_object() {
            Some(data) => {
                builder.add_module(module_from_data(data, index, None));
            }
            None => builder.skip_entry(),
        }
    }

    for (index, node) in section_items(input, "functions", &["nodes"]).iter().enumerate() {
        match node.as_object() {
            Some(data) => {
                builder.add_file(file_from_data(data, index, None));
            }
            None => builder.skip_entry(),
        }
    }

    let mut edges = section_items(input, "dependencies", &["edges", "links"]);
    if edges.is_empty() {
        edges = section_items(input, "calls", &["edges", "links"]);
    }
    for edge in edges {
        match edge.as_object() {
            Some(data) => builder.add_edge(dependency_from_data(data)),
            None => builder.skip_entry(),
        }
    }

    if let Some(section) = tech_stack_section(input) {
        add_tech_stack(&mut builder, &TechStackInput::from_value(section));
    }

    let project_path = options
        .project_path
        .clone()
        .or_else(|| string_field(input, &["project_path", "projectPath"]));
    builder.finish(options.analysis_type, options.generated_at, project_path)
}

pub fn transform_generic_elements(elements: &[GraphElement]) -> EnhancedGraphData {
    transform_generic_elements_with(elements, &NormalizeOptions::new(AnalysisType::FullCode))
}

pub fn transform_generic_elements_with(
    elements: &[GraphElement],
    options: &NormalizeOptions,
) -> EnhancedGraphData {
    let mut builder = GraphBuilder::new();

    for (index, element) in elements.iter().enumerate() {
        match element.group {
            ElementGroup::Nodes if is_module_element(element) => {
                builder.add_module(module_from_data(&element.data, index, element.position));
            }
            ElementGroup::Nodes => {
                builder.add_file(file_from_data(&element.data, index, element.position));
            }
            ElementGroup::Edges => builder.add_edge(dependency_from_data(&element.data)),
        }
    }

    builder.finish(
        options.analysis_type,
        options.generated_at,
        options.project_path.clone(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "TechItemRepr")]
pub struct TechItem {
    pub name: String,
    pub version: Option<String>,
    pub category: Option<String>,
    pub framework: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TechItemRepr {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        category: Option<String>,
        #[serde(default)]
        framework: Option<String>,
    },
}

impl From<TechItemRepr> for TechItem {
    fn from(value: TechItemRepr) -> Self {
        match value {
            TechItemRepr::Name(name) => Self {
                name,
                version: None,
                category: None,
                framework: None,
            },
            TechItemRepr::Detailed {
                name,
                version,
                category,
                framework,
            } => Self {
                name,
                version,
                category,
                framework,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TechStackInput {
    pub frameworks: Vec<TechItem>,
    pub libraries: Vec<TechItem>,
    /// Entries dropped while reading the section.
    pub skipped: usize,
}

impl TechStackInput {
    /// Reads `frameworks` and `libraries` item by item. A section that is not
    /// an object, or a list that is not an array, reads as empty.
    pub fn from_value(value: &Value) -> Self {
        let mut input = Self::default();
        let Some(section) = value.as_object() else {
            return input;
        };
        input.frameworks = tech_items(section, "frameworks", &mut input.skipped);
        input.libraries = tech_items(section, "libraries", &mut input.skipped);
        input
    }
}

fn tech_items(section: &Map<String, Value>, key: &str, skipped: &mut usize) -> Vec<TechItem> {
    let Some(Value::Array(items)) = section.get(key) else {
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match TechItem::deserialize(item) {
            Ok(item) if !item.name.trim().is_empty() => Some(item),
            Ok(_) => {
                warn!(section = key, index, "skipping tech stack entry with a blank name");
                *skipped += 1;
                None
            }
            Err(error) => {
                warn!(section = key, index, error = %error, "skipping unreadable tech stack entry");
                *skipped += 1;
                None
            }
        })
        .collect()
}

fn tech_stack_section(object: &Map<String, Value>) -> Option<&Value> {
    object
        .get("tech_stack")
        .or_else(|| object.get("techStack"))
        .filter(|section| section.is_object())
}

pub fn transform_tech_stack(input: &TechStackInput) -> EnhancedGraphData {
    transform_tech_stack_with(input, &NormalizeOptions::new(AnalysisType::TechStack))
}

pub fn transform_tech_stack_with(
    input: &TechStackInput,
    options: &NormalizeOptions,
) -> EnhancedGraphData {
    let mut builder = GraphBuilder::new();
    add_tech_stack(&mut builder, input);
    builder.finish(
        options.analysis_type,
        options.generated_at,
        options.project_path.clone(),
    )
}

fn add_tech_stack(builder: &mut GraphBuilder, input: &TechStackInput) {
    for _ in 0..input.skipped {
        builder.skip_entry();
    }

    if !input.frameworks.is_empty() {
        builder.add_module(ModuleNode::new("module_frameworks", "Frameworks", "frameworks"));
    }
    if !input.libraries.is_empty() {
        builder.add_module(ModuleNode::new("module_libraries", "Libraries", "libraries"));
    }

    for framework in &input.frameworks {
        builder.add_file(tech_file("framework", framework, "module_frameworks"));
    }
    for library in &input.libraries {
        builder.add_file(tech_file("library", library, "module_libraries"));
    }

    for framework in &input.frameworks {
        let framework_id = generate_id("framework", &framework.name);
        for library in associated_libraries(framework, &input.libraries) {
            let library_id = generate_id("library", &library.name);
            builder.add_edge(DependencyEdge::new(
                generate_id("edge", &format!("{framework_id}_{library_id}")),
                framework_id.clone(),
                library_id,
                DependencyType::Composition,
                1,
            ));
        }
    }
}

fn associated_libraries<'a>(framework: &TechItem, libraries: &'a [TechItem]) -> Vec<&'a TechItem> {
    let named = libraries
        .iter()
        .filter(|library| {
            library
                .framework
                .as_deref()
                .is_some_and(|owner| owner.eq_ignore_ascii_case(&framework.name))
        })
        .take(MAX_LIBRARIES_PER_FRAMEWORK)
        .collect::<Vec<_>>();
    if !named.is_empty() {
        return named;
    }

    libraries
        .iter()
        .take(MAX_LIBRARIES_PER_FRAMEWORK)
        .collect()
}

fn tech_file(kind: &str, item: &TechItem, module_id: &str) -> FileNode {
    FileNode {
        id: generate_id(kind, &item.name),
        name: match &item.version {
            Some(version) => format!("{} {version}", item.name),
            None => item.name.clone(),
        },
        path: item.name.clone(),
        module_id: Some(module_id.to_owned()),
        complexity: ComplexityMetrics::new(TECH_ITEM_COMPLEXITY, 0.0, TECH_ITEM_LINES, 100.0),
        position: Position::default(),
        size: file_visual_size(TECH_ITEM_LINES),
        language: item.category.clone().unwrap_or_else(|| kind.to_owned()),
        highlighted: false,
        metadata: FileMetadata::default(),
    }
}

fn module_from_data(
    data: &Map<String, Value>,
    index: usize,
    position: Option<Position>,
) -> ModuleNode {
    let name = string_field(data, &["name", "label", "id"]);
    let path = string_field(data, &["path"]).or_else(|| name.clone());
    let id = string_field(data, &["id"])
        .or_else(|| name.clone())
        .unwrap_or_else(|| generate_id("module", &index.to_string()));
    let name = name.unwrap_or_else(|| id.clone());
    let path = path.unwrap_or_default();

    let size = number_field(data, &["size"]).unwrap_or(0.0);
    let width = number_field(data, &["width"]).unwrap_or((size * 50.0).max(100.0));
    let height = number_field(data, &["height"]).unwrap_or((size * 30.0).max(60.0));

    let declared = number_field(data, &["complexity", "average_complexity", "averageComplexity"]);
    let average = declared.unwrap_or(0.0);

    let complexity = ModuleComplexity {
        file_count: count_field(data, &["file_count", "fileCount"])
            .try_into()
            .unwrap_or(usize::MAX),
        average,
        max: number_field(data, &["max_complexity", "maxComplexity"]).unwrap_or(average),
        total_lines: number_field(data, &["lines", "total_lines", "totalLines"])
            .map(to_count)
            .unwrap_or(0),
        level: declared
            .map(ComplexityLevel::from_score)
            .unwrap_or(ComplexityLevel::Unknown),
    };

    ModuleNode {
        level: module_level(&path),
        id,
        name,
        path,
        file_ids: Vec::new(),
        child_ids: Vec::new(),
        parent_id: None,
        position: position.unwrap_or_else(|| position_from_data(data)),
        size: Size { width, height },
        declared_complexity: (complexity != ModuleComplexity::default())
            .then(|| complexity.clone()),
        complexity,
        expanded: data
            .get("expanded")
            .and_then(Value::as_bool)
            .unwrap_or(true),
    }
}

fn file_from_data(data: &Map<String, Value>, index: usize, position: Option<Position>) -> FileNode {
    let cyclomatic = metric_field(
        data,
        &["complexity", "cyclomatic", "cyclomatic_complexity"],
        &["cyclomatic", "score", "value"],
    )
    .unwrap_or(0.0);
    let cognitive =
        metric_field(data, &["cognitive", "cognitive_complexity"], &["cognitive"]).unwrap_or(0.0);
    let lines = metric_field(
        data,
        &["lines", "size", "lines_of_code", "linesOfCode", "loc"],
        &["lines_of_code", "linesOfCode", "lines"],
    )
    .map(to_count)
    .unwrap_or(DEFAULT_FUNCTION_LINES as u64);
    let maintainability = metric_field(
        data,
        &["maintainability", "maintainability_index"],
        &["maintainability", "maintainability_index"],
    )
    .unwrap_or(100.0 - cyclomatic * 5.0);

    let path = string_field(data, &["file", "path", "file_path", "filePath"]);
    let name = string_field(data, &["name", "label"])
        .or_else(|| path.as_deref().and_then(file_name))
        .or_else(|| string_field(data, &["id"]));
    let path = path.or_else(|| name.clone()).unwrap_or_default();
    let id = string_field(data, &["id"])
        .or_else(|| (!path.is_empty()).then(|| generate_id("file", &path)))
        .unwrap_or_else(|| generate_id("file", &index.to_string()));
    let name = name.unwrap_or_else(|| id.clone());

    let language = detect_language(&path)
        .map(str::to_owned)
        .or_else(|| string_field(data, &["language"]))
        .unwrap_or_else(|| "unknown".to_owned());

    FileNode {
        module_id: string_field(data, &["module", "parent", "module_id", "moduleId"]),
        complexity: ComplexityMetrics::new(cyclomatic, cognitive, lines, maintainability),
        position: position.unwrap_or_else(|| position_from_data(data)),
        size: file_visual_size(lines),
        language,
        highlighted: data
            .get("highlighted")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        metadata: FileMetadata {
            last_modified: string_field(data, &["last_modified", "lastModified"]),
            author: string_field(data, &["author"]),
            function_count: count_u32(data, &["function_count", "functionCount", "functions"]),
            class_count: count_u32(data, &["class_count", "classCount", "classes"]),
            import_count: count_u32(data, &["import_count", "importCount", "imports"]),
        },
        id,
        name,
        path,
    }
}

fn dependency_from_data(data: &Map<String, Value>) -> DependencyEdge {
    let source = string_field(data, &["source", "from"]);
    let target = string_field(data, &["target", "to"]);
    let malformed = source.is_none() || target.is_none();

    let id = string_field(data, &["id"]).unwrap_or_else(|| match (&source, &target) {
        (None, None) => UNKNOWN_NODE_ID.to_owned(),
        _ => generate_id(
            "edge",
            &format!(
                "{}_{}",
                source.as_deref().unwrap_or(UNKNOWN_NODE_ID),
                target.as_deref().unwrap_or(UNKNOWN_NODE_ID)
            ),
        ),
    });
    if malformed {
        warn!(
            edge = %id,
            has_source = source.is_some(),
            has_target = target.is_some(),
            "edge is missing an endpoint; substituting `unknown`"
        );
    }

    let kind = string_field(data, &["type", "relation", "kind", "label"])
        .map(|label| DependencyType::from_label(&label))
        .unwrap_or(DependencyType::Call);
    let weight = number_field(data, &["weight", "count", "frequency"])
        .map(to_count)
        .unwrap_or(1)
        .clamp(1, u64::from(u32::MAX)) as u32;

    let mut edge = DependencyEdge::new(
        id,
        source.unwrap_or_else(|| UNKNOWN_NODE_ID.to_owned()),
        target.unwrap_or_else(|| UNKNOWN_NODE_ID.to_owned()),
        kind,
        weight,
    );
    edge.metadata.malformed = malformed;
    if let Some(strength) = number_field(data, &["strength"]) {
        edge.metadata.strength = strength;
    }
    if let Some(frequency) = number_field(data, &["frequency"]) {
        edge.metadata.frequency = to_count(frequency).min(u64::from(u32::MAX)) as u32;
    }
    edge
}

fn is_module_element(element: &GraphElement) -> bool {
    element.data.get("type").and_then(Value::as_str) == Some("module")
        || element
            .classes
            .iter()
            .any(|class| class == "module" || class == "module-node")
}

fn parse_elements(items: &[Value]) -> Vec<GraphElement> {
    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match GraphElement::deserialize(item) {
            Ok(element) => Some(element),
            Err(error) => {
                warn!(index, error = %error, "skipping unparseable graph element");
                None
            }
        })
        .collect()
}

fn parse_grouped_elements(grouped: &Map<String, Value>) -> Vec<GraphElement> {
    let mut items = Vec::new();
    for (key, group) in [("nodes", "nodes"), ("edges", "edges")] {
        let Some(Value::Array(entries)) = grouped.get(key) else {
            continue;
        };
        for entry in entries {
            let mut entry = entry.clone();
            if let Value::Object(object) = &mut entry {
                object
                    .entry("group")
                    .or_insert_with(|| Value::String(group.to_owned()));
            }
            items.push(entry);
        }
    }
    parse_elements(&items)
}

fn envelope_data(value: &Value) -> Result<Value, NormalizeError> {
    let envelope =
        AnalyzerEnvelope::deserialize(value).map_err(|error| NormalizeError::InvalidEnvelope {
            reason: error.to_string(),
        })?;
    envelope.into_data().map_err(|error| match error {
        AnalyzerError::Reported { messages } => NormalizeError::AnalysisFailed { messages },
        other => NormalizeError::InvalidEnvelope {
            reason: other.to_string(),
        },
    })
}

fn section_items<'a>(input: &'a Map<String, Value>, section: &str, keys: &[&str]) -> &'a [Value] {
    let Some(Value::Object(section)) = input.get(section) else {
        return &[];
    };
    keys.iter()
        .find_map(|key| match section.get(*key) {
            Some(Value::Array(items)) if !items.is_empty() => Some(items.as_slice()),
            _ => None,
        })
        .unwrap_or(&[])
}

fn string_field(data: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match data.get(*key) {
        Some(Value::String(value)) if !value.trim().is_empty() => Some(value.clone()),
        Some(Value::Number(value)) => Some(value.to_string()),
        _ => None,
    })
}

fn number_field(data: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| {
        let number = match data.get(*key) {
            Some(Value::Number(value)) => value.as_f64(),
            Some(Value::String(value)) => value.trim().parse::<f64>().ok(),
            _ => None,
        };
        // "NaN" and "inf" parse; treat them as absent.
        number.filter(|value| value.is_finite())
    })
}

/// Reads a metric from a flat field or from a nested `complexity` object.
fn metric_field(data: &Map<String, Value>, flat: &[&str], nested: &[&str]) -> Option<f64> {
    number_field(data, flat).or_else(|| {
        data.get("complexity")
            .and_then(Value::as_object)
            .and_then(|object| number_field(object, nested))
    })
}

fn count_field(data: &Map<String, Value>, keys: &[&str]) -> u64 {
    keys.iter()
        .find_map(|key| match data.get(*key) {
            Some(Value::Array(items)) => Some(items.len() as u64),
            Some(Value::Number(value)) => value.as_f64().map(to_count),
            _ => None,
        })
        .unwrap_or(0)
}

fn count_u32(data: &Map<String, Value>, keys: &[&str]) -> u32 {
    u32::try_from(count_field(data, keys)).unwrap_or(u32::MAX)
}

fn position_from_data(data: &Map<String, Value>) -> Position {
    if let Some(Value::Object(position)) = data.get("position") {
        return Position::new(
            number_field(position, &["x"]).unwrap_or(0.0),
            number_field(position, &["y"]).unwrap_or(0.0),
        );
    }
    Position::new(
        number_field(data, &["x"]).unwrap_or(0.0),
        number_field(data, &["y"]).unwrap_or(0.0),
    )
}

fn to_count(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

fn file_name(path: &str) -> Option<String> {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
}

/// Maps a file extension to a language tag.
pub fn detect_language(path: &str) -> Option<&'static str> {
    let extension = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    let language = match extension.as_str() {
        "py" | "pyi" => "python",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "rs" => "rust",
        "java" => "java",
        "go" => "go",
        "rb" => "ruby",
        "cs" => "csharp",
        "cpp" | "cc" | "cxx" | "hpp" | "h" => "cpp",
        "c" => "c",
        "php" => "php",
        _ => return None,
    };
    Some(language)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use std::time::UNIX_EPOCH;

    use serde_json::{Value, json};

    use super::{
        AnalysisInput, MAX_LIBRARIES_PER_FRAMEWORK, NormalizeError, NormalizeOptions, TechItem,
        TechStackInput, detect_language, normalize, transform_legacy, transform_tech_stack,
    };
    use crate::graph::{AnalysisType, ComplexityLevel, DependencyType, ROOT_MODULE_ID};

    fn object(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().cloned().expect("fixture should be an object")
    }

    #[test]
    fn legacy_single_module_function_and_self_edge() {
        let graph = transform_legacy(&object(json!({
            "modules": {"nodes": [{"id": "m1", "name": "core", "path": "core"}]},
            "functions": {"nodes": [{"id": "f1", "name": "foo", "file": "core/foo.py", "complexity": 3}]},
            "dependencies": {"edges": [{"source": "f1", "target": "f1"}]}
        })));

        assert_eq!(graph.modules.modules.len(), 1);
        let module = &graph.modules.modules[0];
        assert_eq!(module.level, 1);
        assert_eq!(module.parent_id.as_deref(), Some(ROOT_MODULE_ID));
        assert_eq!(module.file_ids, vec!["f1"]);

        let file = graph.file("f1").expect("f1 should be present");
        assert_eq!(file.complexity.level, ComplexityLevel::Low);
        assert_eq!(file.complexity.color, "#4CAF50");
        assert_eq!(file.complexity.lines_of_code, 10);
        assert_eq!(file.complexity.maintainability, 85.0);
        assert_eq!(file.language, "python");
        assert_eq!(file.module_id.as_deref(), Some("m1"));

        assert_eq!(graph.dependencies.edges.len(), 1);
        let edge = &graph.dependencies.edges[0];
        assert_eq!(edge.kind, DependencyType::Call);
        assert_eq!((edge.source.as_str(), edge.target.as_str()), ("f1", "f1"));
        assert_eq!(edge.id, "edge_f1_f1");
        assert!(edge.metadata.circular);

        assert_eq!(graph.metadata.total_nodes, 2);
        assert_eq!(graph.metadata.total_edges, 1);
    }

    #[test]
    fn legacy_medium_and_high_complexity_functions() {
        let graph = transform_legacy(&object(json!({
            "functions": {"nodes": [
                {"id": "mid", "name": "mid", "complexity": 8},
                {"id": "hot", "name": "hot", "complexity": 12, "lines": 400}
            ]}
        })));

        let mid = graph.file("mid").expect("mid should be present");
        assert_eq!(mid.complexity.level, ComplexityLevel::Medium);
        assert_eq!(mid.complexity.color, "#FF9800");
        let hot = graph.file("hot").expect("hot should be present");
        assert_eq!(hot.complexity.level, ComplexityLevel::High);
        assert_eq!(hot.complexity.color, "#F44336");
        assert_eq!(hot.complexity.lines_of_code, 400);
        assert!(hot.size > mid.size);
    }

    #[test]
    fn empty_object_yields_empty_graph() {
        let graph = normalize(&json!({}), &NormalizeOptions::new(AnalysisType::FullCode))
            .expect("empty object should normalize");
        assert!(graph.is_empty());
        assert_eq!(graph.metadata.total_nodes, 0);
        assert_eq!(graph.metadata.total_edges, 0);
        assert!(graph.dependencies.edges.is_empty());
    }

    #[test]
    fn non_object_input_is_rejected() {
        let error = normalize(&json!("nope"), &NormalizeOptions::new(AnalysisType::FullCode))
            .expect_err("string input should fail");
        assert_eq!(error, NormalizeError::NotAnObject { found: "a string" });
    }

    #[test]
    fn legacy_module_defaults_are_applied() {
        let graph = transform_legacy(&object(json!({
            "modules": {"nodes": [
                {"name": "pkg"},
                {"id": "big", "name": "big", "path": "pkg/big", "size": 4, "complexity": 7}
            ]}
        })));

        let pkg = graph.module("pkg").expect("id should fall back to name");
        assert_eq!(pkg.path, "pkg");
        assert_eq!((pkg.size.width, pkg.size.height), (100.0, 60.0));
        assert_eq!(pkg.complexity.level, ComplexityLevel::Unknown);

        let big = graph.module("big").expect("big should be present");
        assert_eq!((big.size.width, big.size.height), (200.0, 120.0));
        assert_eq!(big.complexity.level, ComplexityLevel::Medium);
        assert_eq!(big.parent_id.as_deref(), Some("pkg"));
    }

    #[test]
    fn malformed_edges_are_kept_with_unknown_endpoints() {
        let graph = transform_legacy(&object(json!({
            "calls": {"links": [
                {"weight": 3},
                {"source": "a"},
                {"from": "a", "to": "b", "relation": "imports"}
            ]}
        })));

        let edges = &graph.dependencies.edges;
        assert_eq!(edges.len(), 3);
        assert_eq!(edges[0].id, "unknown");
        assert_eq!((edges[0].source.as_str(), edges[0].target.as_str()), ("unknown", "unknown"));
        assert!(edges[0].metadata.malformed);
        assert_eq!(edges[0].weight, 3);
        assert_eq!(edges[1].target, "unknown");
        assert_eq!(edges[1].id, "edge_a_unknown");
        assert_eq!(edges[2].kind, DependencyType::Import);
        assert!(!edges[2].metadata.malformed);
        assert_eq!(graph.dependencies.statistics.malformed_edges, 2);
    }

    #[test]
    fn calls_section_is_used_only_when_dependencies_are_absent() {
        let graph = transform_legacy(&object(json!({
            "dependencies": {"edges": [{"source": "a", "target": "b"}]},
            "calls": {"edges": [{"source": "c", "target": "d"}]}
        })));
        assert_eq!(graph.dependencies.edges.len(), 1);
        assert_eq!(graph.dependencies.edges[0].source, "a");
    }

    #[test]
    fn envelope_is_unwrapped_before_classification() {
        let options = NormalizeOptions::new(AnalysisType::FullCode).at(UNIX_EPOCH);
        let graph = normalize(
            &json!({
                "success": true,
                "data": {"functions": {"nodes": [{"id": "f", "complexity": 2}]}}
            }),
            &options,
        )
        .expect("envelope should normalize");
        assert_eq!(graph.files.files.len(), 1);
        assert_eq!(graph.metadata.generated_at, UNIX_EPOCH);
    }

    #[test]
    fn generic_elements_split_modules_files_and_edges() {
        let value = json!([
            {"group": "nodes", "data": {"id": "m", "label": "core", "type": "module", "path": "core"}},
            {"group": "nodes", "data": {"id": "pkg", "path": "pkg"}, "classes": "module highlighted"},
            {"group": "nodes", "data": {"id": "f", "label": "a.ts", "path": "core/a.ts", "complexity": {"cyclomatic": 9}}, "position": {"x": 5, "y": 7}},
            {"group": "edges", "data": {"id": "e", "source": "f", "target": "m", "type": "inheritance"}},
            {"bogus": true}
        ]);

        let input = AnalysisInput::from_value(&value).expect("array should classify");
        let AnalysisInput::GenericElements(elements) = &input else {
            panic!("expected generic elements");
        };
        assert_eq!(elements.len(), 4);

        let graph = normalize(&value, &NormalizeOptions::new(AnalysisType::FullCode))
            .expect("elements should normalize");
        assert_eq!(graph.modules.modules.len(), 2);
        let file = graph.file("f").expect("file should be present");
        assert_eq!(file.complexity.level, ComplexityLevel::Medium);
        assert_eq!(file.language, "typescript");
        assert_eq!((file.position.x, file.position.y), (5.0, 7.0));
        assert_eq!(file.module_id.as_deref(), Some("m"));
        assert_eq!(graph.dependencies.edges[0].kind, DependencyType::Inheritance);
    }

    #[test]
    fn grouped_elements_object_is_flattened() {
        let value = json!({"elements": {
            "nodes": [{"data": {"id": "a"}}, {"data": {"id": "b"}}],
            "edges": [{"data": {"source": "a", "target": "b"}}]
        }});
        let graph = normalize(&value, &NormalizeOptions::new(AnalysisType::CallHierarchy))
            .expect("grouped elements should normalize");
        assert_eq!(graph.files.files.len(), 2);
        assert_eq!(graph.dependencies.edges.len(), 1);
        assert_eq!(graph.metadata.analysis_type, AnalysisType::CallHierarchy);
    }

    #[test]
    fn tech_stack_caps_library_edges_per_framework() {
        let input = TechStackInput {
            frameworks: vec![item("Django"), item("Flask")],
            libraries: ["requests", "numpy", "pandas", "celery", "redis"]
                .into_iter()
                .map(item)
                .collect(),
            skipped: 0,
        };
        let graph = transform_tech_stack(&input);

        assert_eq!(graph.files.files.len(), 7);
        assert_eq!(graph.modules.modules.len(), 2);
        assert!(graph.files.files.values().all(|f| f.complexity.level == ComplexityLevel::Low));
        assert_eq!(graph.dependencies.edges.len(), 2 * MAX_LIBRARIES_PER_FRAMEWORK);
        assert!(
            graph
                .dependencies
                .edges
                .iter()
                .all(|e| e.kind == DependencyType::Composition)
        );
        let django = graph
            .dependencies
            .outgoing
            .get("framework_Django")
            .expect("django should have edges");
        assert_eq!(
            django,
            &vec!["library_requests", "library_numpy", "library_pandas"]
        );
    }

    #[test]
    fn tech_stack_prefers_libraries_naming_their_framework() {
        let value = json!({"techStack": {
            "frameworks": ["React", {"name": "Express", "version": "4.18"}],
            "libraries": [
                "lodash",
                {"name": "redux", "framework": "react"},
                {"name": "cors", "framework": "Express", "category": "middleware"}
            ]
        }});
        let graph = normalize(&value, &NormalizeOptions::new(AnalysisType::TechStack))
            .expect("tech stack should normalize");

        assert_eq!(
            graph.dependencies.outgoing.get("framework_React"),
            Some(&vec!["library_redux".to_owned()])
        );
        assert_eq!(
            graph.dependencies.outgoing.get("framework_Express"),
            Some(&vec!["library_cors".to_owned()])
        );
        let express = graph.file("framework_Express").expect("express should exist");
        assert_eq!(express.name, "Express 4.18");
        let cors = graph.file("library_cors").expect("cors should exist");
        assert_eq!(cors.language, "middleware");
    }

    #[test]
    fn tech_stack_with_wrong_shape_reads_as_empty() {
        let graph = normalize(
            &json!({"tech_stack": {"frameworks": 12, "libraries": "requests"}}),
            &NormalizeOptions::new(AnalysisType::TechStack),
        )
        .expect("mistyped lists should read as empty");
        assert!(graph.is_empty());
    }

    #[test]
    fn unreadable_tech_items_are_skipped_individually() {
        let graph = normalize(
            &json!({"tech_stack": {
                "frameworks": ["django", {"version": "1.0"}, 7],
                "libraries": ["requests", {"name": "  "}]
            }}),
            &NormalizeOptions::new(AnalysisType::TechStack),
        )
        .expect("bad entries should not fail the pass");

        assert!(graph.file("framework_django").is_some());
        assert!(graph.file("library_requests").is_some());
        assert_eq!(graph.files.files.len(), 2);
        assert_eq!(graph.dependencies.edges.len(), 1);
        assert_eq!(graph.metadata.performance.skipped_entries, 3);
    }

    #[test]
    fn null_tech_stack_next_to_code_sections_is_ignored() {
        let graph = normalize(
            &json!({
                "modules": {"nodes": [{"id": "m1", "name": "core", "path": "core"}]},
                "tech_stack": null
            }),
            &NormalizeOptions::new(AnalysisType::FullCode),
        )
        .expect("null section should be treated as absent");
        assert_eq!(graph.modules.modules.len(), 1);
        assert!(graph.files.files.is_empty());

        let bare = normalize(&json!({"tech_stack": null}), &NormalizeOptions::new(AnalysisType::TechStack))
            .expect("bare null section should normalize");
        assert!(bare.is_empty());
    }

    #[test]
    fn code_graph_reporting_its_stack_keeps_both() {
        let value = json!({
            "success": true,
            "data": {
                "modules": {"nodes": [{"id": "m1", "name": "core", "path": "core"}]},
                "functions": {"nodes": [{"id": "f1", "name": "foo", "file": "core/foo.py", "complexity": 3}]},
                "dependencies": {"edges": [{"source": "f1", "target": "f1"}]},
                "tech_stack": {"frameworks": ["django"]}
            }
        });

        let input = AnalysisInput::from_value(&value).expect("envelope should classify");
        assert!(matches!(input, AnalysisInput::Legacy(_)));

        let graph = normalize(&value, &NormalizeOptions::new(AnalysisType::FullCode))
            .expect("mixed input should normalize");
        assert!(graph.file("f1").is_some());
        assert!(graph.module("m1").is_some());
        assert!(graph.file("framework_django").is_some());
        assert!(graph.module("module_frameworks").is_some());
        assert_eq!(graph.dependencies.edges.len(), 1);
        assert_eq!(graph.metadata.total_nodes, 4);
    }

    #[test]
    fn non_finite_numeric_strings_fall_back_to_defaults() {
        let graph = transform_legacy(&object(json!({
            "functions": {"nodes": [
                {"id": "a", "complexity": "NaN", "lines": "inf", "x": "-inf"},
                {"id": "b", "complexity": " 7 "}
            ]}
        })));

        let a = graph.file("a").expect("a should be present");
        assert_eq!(a.complexity.cyclomatic, 0.0);
        assert_eq!(a.complexity.level, ComplexityLevel::Low);
        assert_eq!(a.complexity.lines_of_code, 10);
        assert_eq!(a.position.x, 0.0);
        let b = graph.file("b").expect("b should be present");
        assert_eq!(b.complexity.level, ComplexityLevel::Medium);
    }

    #[test]
    fn oversized_counts_saturate() {
        let graph = transform_legacy(&object(json!({
            "functions": {"nodes": [{"id": "big", "function_count": 5.0e9, "classes": ["A", "B"]}]}
        })));
        let big = graph.file("big").expect("big should be present");
        assert_eq!(big.metadata.function_count, u32::MAX);
        assert_eq!(big.metadata.class_count, 2);
    }

    #[test]
    fn success_flag_without_data_keeps_top_level_sections() {
        let graph = normalize(
            &json!({"success": true, "functions": {"nodes": [{"id": "f"}]}}),
            &NormalizeOptions::new(AnalysisType::FullCode),
        )
        .expect("flat result should normalize");
        assert!(graph.file("f").is_some());
    }

    #[test]
    fn failed_envelope_is_an_error() {
        let error = normalize(
            &json!({
                "success": false,
                "data": {"functions": {"nodes": [{"id": "f"}]}},
                "errors": [{"type": "parse", "message": "syntax error in a.py"}]
            }),
            &NormalizeOptions::new(AnalysisType::FullCode),
        )
        .expect_err("success=false should not normalize");
        assert_eq!(
            error,
            NormalizeError::AnalysisFailed {
                messages: vec!["parse: syntax error in a.py".to_owned()]
            }
        );
    }

    #[test]
    fn language_detection_covers_common_extensions() {
        assert_eq!(detect_language("a/b.py"), Some("python"));
        assert_eq!(detect_language("App.TSX"), Some("typescript"));
        assert_eq!(detect_language("lib.rs"), Some("rust"));
        assert_eq!(detect_language("Makefile"), None);
    }

    fn item(name: &str) -> TechItem {
        TechItem {
            name: name.to_owned(),
            version: None,
            category: None,
            framework: None,
        }
    }
}
