use cucumber::{given, then, when, World};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

#[derive(Debug, World)]
#[world(init = Self::new)]
struct CliWorld {
    env: BTreeMap<String, String>,
    results: Option<TempDir>,
    status: Option<i32>,
    stdout: String,
    stderr: String,
}

impl CliWorld {
    fn new() -> Self {
        let test_data = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../test-data");
        let mut env = BTreeMap::new();
        env.insert("TEST_DATA_DIR".to_string(), test_data.display().to_string());
        env.insert("RUST_LOG".to_string(), "warn".to_string());
        Self {
            env,
            results: None,
            status: None,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    fn invoke(&mut self, args: Vec<String>) {
        let output = Command::new(env!("CARGO_BIN_EXE_probe"))
            .args(&args)
            .env_clear()
            .envs(&self.env)
            .output()
            .expect("failed to spawn probe");
        self.status = output.status.code();
        self.stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        self.stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    }

    fn output_json(&self) -> Value {
        serde_json::from_str(&self.stdout)
            .unwrap_or_else(|e| panic!("stdout is not JSON ({}): {}", e, self.stdout))
    }
}

fn split_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

#[given(expr = "the environment variable {string} is {string}")]
async fn environment_variable(world: &mut CliWorld, name: String, value: String) {
    world.env.insert(name, value);
}

#[given(expr = "Allure results with {int} passed and {int} failed tests")]
async fn allure_results(world: &mut CliWorld, passed: usize, failed: usize) {
    let dir = TempDir::new().expect("temp dir");
    let statuses = std::iter::repeat("passed")
        .take(passed)
        .chain(std::iter::repeat("failed").take(failed));
    for (index, status) in statuses.enumerate() {
        let result = json!({
            "uuid": format!("case-{}", index),
            "name": format!("Scenario {}", index),
            "status": status,
            "labels": [{ "name": "feature", "value": "Support Engagement" }]
        });
        std::fs::write(
            dir.path().join(format!("case-{}-result.json", index)),
            result.to_string(),
        )
        .expect("write result file");
    }
    world.results = Some(dir);
}

#[when(expr = "I run probe {string}")]
async fn run_probe(world: &mut CliWorld, raw: String) {
    world.invoke(split_args(&raw));
}

#[when(expr = "I run probe {string} on the results")]
async fn run_probe_on_results(world: &mut CliWorld, raw: String) {
    let dir = world
        .results
        .as_ref()
        .expect("no results directory")
        .path()
        .display()
        .to_string();
    let mut args = split_args(&raw);
    // Right after the subcommand, so it lands before any --sendCliq tail.
    args.splice(1..1, ["--results".to_string(), dir]);
    world.invoke(args);
}

#[then("the command should succeed")]
async fn command_succeeded(world: &mut CliWorld) {
    assert_eq!(world.status, Some(0), "stderr: {}", world.stderr);
}

#[then("the command should fail")]
async fn command_failed(world: &mut CliWorld) {
    assert_ne!(world.status, Some(0), "stdout: {}", world.stdout);
}

#[then(expr = "the output should contain {string}")]
async fn output_contains(world: &mut CliWorld, text: String) {
    assert!(world.stdout.contains(&text), "stdout: {}", world.stdout);
}

#[then(expr = "the error output should contain {string}")]
async fn error_output_contains(world: &mut CliWorld, text: String) {
    assert!(world.stderr.contains(&text), "stderr: {}", world.stderr);
}

#[then(expr = "the output JSON field {string} should be {string}")]
async fn output_json_field(world: &mut CliWorld, field: String, expected: String) {
    let body = world.output_json();
    assert_eq!(body[field.as_str()], json!(expected), "body: {}", body);
}

#[then(expr = "the output JSON should not contain {string}")]
async fn output_json_missing(world: &mut CliWorld, path: String) {
    let body = world.output_json();
    let pointer = format!("/{}", path.replace('.', "/"));
    assert!(body.pointer(&pointer).is_none(), "body: {}", body);
}

#[tokio::main]
async fn main() {
    CliWorld::run("tests/features").await;
}
