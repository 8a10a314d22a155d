use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use dora_birdview::test_support::{apply_cli_test_env, remove_dir_if_exists, temp_path};
use serde_json::{Value, json};

struct Workspace {
    root: PathBuf,
}

impl Workspace {
    fn new(label: &str) -> Self {
        let root = temp_path(label);
        fs::create_dir_all(root.join("scripts")).expect("workspace should be creatable");
        Self { root }
    }

    fn scripts_dir(&self) -> PathBuf {
        self.root.join("scripts")
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.root.join(name);
        fs::write(&path, contents).expect("fixture should be writable");
        path
    }

    fn run(&self, args: &[&str]) -> Output {
        let mut command = Command::new(bin_path());
        command.args(args).current_dir(&self.root);
        apply_cli_test_env(&mut command, &self.root, &self.scripts_dir());
        command.output().expect("CLI should run")
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        remove_dir_if_exists(&self.root);
    }
}

fn bin_path() -> &'static str {
    env!("CARGO_BIN_EXE_dora_birdview")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "CLI should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn legacy_fixture(workspace: &Workspace) -> PathBuf {
    let input = json!({
        "modules": {"nodes": [{"id": "m1", "name": "core", "path": "core"}]},
        "functions": {"nodes": [
            {"id": "f1", "name": "foo.py", "file": "core/foo.py", "complexity": 3},
            {"id": "f2", "name": "bar.py", "file": "core/bar.py", "complexity": 14}
        ]},
        "dependencies": {"edges": [{"source": "f1", "target": "f2", "type": "import"}]}
    });
    workspace.write("analysis.json", &input.to_string())
}

#[test]
fn normalize_prints_element_list() {
    let workspace = Workspace::new("cli_normalize");
    let input = legacy_fixture(&workspace);

    let elements = stdout_json(&workspace.run(&["normalize", path_arg(&input)]));
    let elements = elements.as_array().expect("output should be an array");
    assert_eq!(elements.len(), 4);
    assert_eq!(elements[0]["group"], json!("nodes"));
    assert_eq!(elements[0]["classes"], json!(["module-node"]));
    assert_eq!(elements[3]["group"], json!("edges"));
}

#[test]
fn view_state_persists_and_drives_render() {
    let workspace = Workspace::new("cli_view");
    let input = legacy_fixture(&workspace);

    let state = stdout_json(&workspace.run(&[
        "view",
        "fullCode",
        "--activate",
        "--complexity",
        "high",
        "--select",
        "f2",
        "f2",
    ]));
    assert_eq!(state["isActive"], json!(true));
    assert_eq!(state["filterSettings"]["complexityFilter"], json!("high"));
    assert_eq!(state["selectedNodes"], json!(["f2"]));

    let projection = stdout_json(&workspace.run(&["render", path_arg(&input), "--view", "fullCode"]));
    assert_eq!(projection["isEmpty"], json!(false));
    assert_eq!(projection["stats"]["files"], json!(1));
    let file = projection["elements"]
        .as_array()
        .expect("elements should be an array")
        .iter()
        .find(|element| element["kind"] == json!("file"))
        .expect("one file should be projected");
    assert_eq!(file["id"], json!("f2"));
    assert_eq!(file["highlighted"], json!(true));

    let other = stdout_json(&workspace.run(&["view", "gitAnalytics", "--activate"]));
    assert_eq!(other["isActive"], json!(true));
    let first = stdout_json(&workspace.run(&["view", "fullCode"]));
    assert_eq!(first["isActive"], json!(false));
}

#[test]
fn render_rejects_non_object_input() {
    let workspace = Workspace::new("cli_bad_input");
    let input = workspace.write("bad.json", "42");

    let output = workspace.run(&["render", path_arg(&input)]);
    assert!(!output.status.success(), "numeric input should be rejected");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("must be a JSON object"),
        "expected normalization error, got: {stderr}"
    );
}

#[cfg(unix)]
#[test]
fn analyze_runs_script_and_renders_its_output() {
    let workspace = Workspace::new("cli_analyze");
    fs::write(
        workspace.scripts_dir().join("tech_stack_analyzer.py"),
        "echo '{\"success\": true, \"data\": {\"frameworks\": [\"flask\"], \"libraries\": [\"jinja2\"]}}'\n",
    )
    .expect("script should be writable");

    let projection = stdout_json(&workspace.run(&["analyze", ".", "--analysis", "tech-stack"]));
    assert_eq!(projection["stats"]["files"], json!(2));
    assert_eq!(projection["stats"]["edges"], json!(1));
    assert_eq!(projection["layout"]["name"], json!("dagre"));
}

#[cfg(unix)]
#[test]
fn analyze_surfaces_reported_failure() {
    let workspace = Workspace::new("cli_analyze_fail");
    fs::write(
        workspace.scripts_dir().join("analyzer.py"),
        "echo '{\"success\": false, \"errors\": [{\"type\": \"parse\", \"message\": \"no python files\"}]}'\n",
    )
    .expect("script should be writable");

    let output = workspace.run(&["analyze", "."]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("no python files"),
        "expected analyzer message, got: {stderr}"
    );
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("temp paths should be UTF-8")
}
