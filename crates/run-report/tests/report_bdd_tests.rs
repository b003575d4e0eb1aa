use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::routing::post;
use axum::{Json, Router};
use cucumber::gherkin::Step;
use cucumber::{given, then, when, World};
use parking_lot::Mutex;
use run_report::{AllureSummary, CliqNotifier, CliqOptions};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Debug, Clone)]
struct Captured {
    path: String,
    body: Value,
}

#[derive(Debug, Default)]
struct CliqServer {
    captured: Mutex<Vec<Captured>>,
}

impl CliqServer {
    fn received(&self, path: &str) -> Vec<Value> {
        self.captured
            .lock()
            .iter()
            .filter(|c| c.path == path)
            .map(|c| c.body.clone())
            .collect()
    }
}

async fn webhook(State(server): State<Arc<CliqServer>>, uri: Uri, Json(body): Json<Value>) -> StatusCode {
    let path = uri.path().to_string();
    let status = if path == "/rejecting-hook" && server.received(&path).is_empty() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    server.captured.lock().push(Captured { path, body });
    status
}

#[derive(Debug, World)]
#[world(init = Self::new)]
struct ReportWorld {
    results_dir: TempDir,
    report_dir: TempDir,
    server: Option<(String, Arc<CliqServer>)>,
    webhook_url: Option<String>,
    options: Option<CliqOptions>,
    summary: Option<AllureSummary>,
    summary_error: Option<String>,
    notified: Option<bool>,
}

impl ReportWorld {
    fn new() -> Self {
        Self {
            results_dir: TempDir::new().expect("temp dir"),
            report_dir: TempDir::new().expect("temp dir"),
            server: None,
            webhook_url: None,
            options: None,
            summary: None,
            summary_error: None,
            notified: None,
        }
    }

    fn base_url(&self) -> String {
        self.server.as_ref().expect("Cliq server not started").0.clone()
    }

    fn server(&self) -> Arc<CliqServer> {
        self.server.as_ref().expect("Cliq server not started").1.clone()
    }

    fn summarise(&mut self, dir: std::path::PathBuf) {
        match AllureSummary::from_dir(dir) {
            Ok(summary) => self.summary = Some(summary),
            Err(e) => self.summary_error = Some(e.to_string()),
        }
    }
}

fn split_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

#[given("an Allure results directory containing:")]
async fn results_directory(world: &mut ReportWorld, step: &Step) {
    let table = step.table.as_ref().expect("results table");
    for (index, row) in table.rows.iter().skip(1).enumerate() {
        let result = json!({
            "uuid": format!("case-{}", index),
            "name": row[0],
            "status": row[1],
            "labels": [{ "name": "feature", "value": row[2] }],
            "time": { "start": 1000, "stop": 1100 }
        });
        let path = world.results_dir.path().join(format!("case-{}-result.json", index));
        std::fs::write(path, result.to_string()).expect("write result file");
    }
}

#[given("a Cliq server is listening")]
async fn cliq_server(world: &mut ReportWorld) {
    let server = Arc::new(CliqServer::default());
    let app = Router::new()
        .route("/hook", post(webhook))
        .route("/rejecting-hook", post(webhook))
        .with_state(server.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind Cliq server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Cliq server");
    });
    world.server = Some((format!("http://{}", addr), server));
}

#[given(expr = "Cliq is reached through the webhook path {string}")]
async fn through_webhook_path(world: &mut ReportWorld, path: String) {
    world.webhook_url = Some(format!("{}{}", world.base_url(), path));
}

#[given(expr = "Cliq is reached through the webhook {string}")]
async fn through_webhook_at(world: &mut ReportWorld, url: String) {
    world.webhook_url = Some(url);
}

#[when("I summarise the results")]
async fn summarise(world: &mut ReportWorld) {
    let dir = world.results_dir.path().to_path_buf();
    world.summarise(dir);
}

#[when(expr = "I summarise results from {string}")]
async fn summarise_from(world: &mut ReportWorld, dir: String) {
    world.summarise(dir.into());
}

#[when(expr = "I parse the Cliq arguments {string}")]
async fn parse_arguments(world: &mut ReportWorld, raw: String) {
    world.options = Some(CliqOptions::parse_with_env(&split_args(&raw), &BTreeMap::new()));
}

#[when(expr = "I notify Cliq with {string}")]
async fn notify(world: &mut ReportWorld, raw: String) {
    let mut args = split_args(&raw);
    args.push(format!("reportDir:{}", world.report_dir.path().display()));
    let options = CliqOptions::parse_with_env(&args, &BTreeMap::new());
    let notifier = CliqNotifier::new(options, world.webhook_url.clone()).expect("notifier");
    let summary = world.summary.as_ref().expect("no summary built");
    world.notified = Some(notifier.notify(summary).await);
}

#[then(expr = "the summary should count {int} passed, {int} failed and {int} skipped")]
async fn summary_counts(world: &mut ReportWorld, passed: usize, failed: usize, skipped: usize) {
    let summary = world.summary.as_ref().expect("no summary built");
    assert_eq!((summary.passed, summary.failed, summary.skipped), (passed, failed, skipped));
}

#[then(expr = "feature {string} should have {int} tests")]
async fn feature_tests(world: &mut ReportWorld, name: String, count: usize) {
    let summary = world.summary.as_ref().expect("no summary built");
    let feature = summary
        .features
        .iter()
        .find(|f| f.name == name)
        .unwrap_or_else(|| panic!("feature {} not in summary", name));
    assert_eq!(feature.total(), count);
}

#[then(expr = "summarising should fail mentioning {string}")]
async fn summarise_failed(world: &mut ReportWorld, text: String) {
    let error = world.summary_error.as_ref().expect("summarising succeeded");
    assert!(error.contains(&text), "{}", error);
}

#[then(expr = "the Cliq channel should be {string}")]
async fn cliq_channel(world: &mut ReportWorld, channel: String) {
    assert_eq!(world.options.as_ref().expect("no options").channel, channel);
}

#[then(expr = "the Cliq environment should be {string}")]
async fn cliq_env(world: &mut ReportWorld, env: String) {
    assert_eq!(world.options.as_ref().expect("no options").env, env);
}

#[then(expr = "the report path should be {string}")]
async fn report_path(world: &mut ReportWorld, path: String) {
    let options = world.options.as_ref().expect("no options");
    assert_eq!(options.report_path(), std::path::PathBuf::from(path));
}

#[then("the notification should succeed")]
async fn notification_succeeded(world: &mut ReportWorld) {
    assert_eq!(world.notified, Some(true));
}

#[then("the notification should report failure")]
async fn notification_failed(world: &mut ReportWorld) {
    assert_eq!(world.notified, Some(false));
}

#[then(expr = "the webhook should receive a results table with {int} rows")]
async fn webhook_table(world: &mut ReportWorld, rows: usize) {
    let messages = world.server().received("/hook");
    let message = messages.first().expect("webhook not called");
    assert_eq!(message["text"], "Hi Team! Test execution results for staging");
    let table = message["slides"][0]["data"]["rows"]
        .as_array()
        .expect("results table");
    // One row per feature plus the total row.
    assert_eq!(table.len(), rows);
    assert_eq!(table[table.len() - 1]["Spec File Name"], "Total");
}

#[then(expr = "the webhook {string} should receive {int} messages")]
async fn webhook_messages(world: &mut ReportWorld, path: String, count: usize) {
    let messages = world.server().received(&path);
    assert_eq!(messages.len(), count, "{:?}", messages);
    let notice = messages[count - 1]["text"].as_str().unwrap_or_default();
    assert!(notice.starts_with("Failed to send test report"), "{}", notice);
}

#[tokio::main]
async fn main() {
    ReportWorld::run("tests/features").await;
}
