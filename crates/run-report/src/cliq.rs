//! Zoho Cliq notification of run results

use crate::allure::AllureSummary;
use probe_core::{ProbeError, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_CHANNEL: &str = "automationreports";
pub const DEFAULT_ENV: &str = "API Testing";
pub const DEFAULT_REPORT_DIR: &str = "./allure-single-file-report";
pub const DEFAULT_REPORT_FILE: &str = "index.html";
pub const DEFAULT_BOT_NAME: &str = "Probe API Test Automation Summary";
/// Incoming-webhook URL of the Cliq channel.
pub const WEBHOOK_URL_VAR: &str = "CLIQ_WEBHOOK_URL";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const TABLE_HEADERS: [&str; 6] = [
    "Sl No",
    "Spec File Name",
    "Total TC",
    "Total Passed TC",
    "Total Failed TC",
    "Total Skipped TC",
];

const USAGE: &str = "\
Cliq Integration Usage:
  probe report --sendCliq [key:value pairs]

Available parameters (key:value format):
  channel:<name>           Cliq channel name (default: automationreports)
  env:<environment>        Test environment name (default: API Testing)
  reportDir:<path>         Report directory path (default: ./allure-single-file-report)
  reportFile:<name>        Report file name (default: index.html)
  botName:<name>           Bot display name
  botImage:<url>           Bot avatar image URL

The message is posted to the incoming webhook in CLIQ_WEBHOOK_URL.

Examples:
  probe report --sendCliq channel:myteam env:staging
  probe report --sendCliq channel:qa-reports env:\"Production Tests\"
  probe report --sendCliq channel:automation env:prod reportDir:./reports

Legacy --key=value format is also supported:
  probe report --sendCliq --channel=myteam --env=staging
";

/// Raw `--sendCliq` argument tail as key/value pairs. Bare flags map to
/// `"true"`. Tokens that fit no form are ignored.
pub fn parse_pairs<S: AsRef<str>>(args: &[S]) -> BTreeMap<String, String> {
    let mut pairs = BTreeMap::new();
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_ref();
        if let Some(flag) = arg.strip_prefix("--") {
            if let Some((key, value)) = flag.split_once('=') {
                pairs.insert(key.to_string(), value.to_string());
            } else {
                match args.get(i + 1).map(AsRef::as_ref) {
                    Some(next) if !next.starts_with("--") && !next.contains(':') => {
                        pairs.insert(flag.to_string(), next.to_string());
                        i += 1;
                    }
                    _ => {
                        pairs.insert(flag.to_string(), "true".to_string());
                    }
                }
            }
        } else if let Some((key, value)) = arg.split_once(':') {
            let (key, value) = (key.trim(), value.trim());
            if !key.is_empty() && !value.is_empty() {
                pairs.insert(key.to_string(), value.to_string());
            }
        } else if arg == "help" || arg == "h" {
            pairs.insert(arg.to_string(), "true".to_string());
        }
        i += 1;
    }
    pairs
}

#[derive(Debug, Clone, PartialEq)]
pub struct CliqOptions {
    pub channel: String,
    pub env: String,
    pub report_dir: PathBuf,
    pub report_file: String,
    pub bot_name: String,
    pub bot_image: Option<String>,
    /// `help` or `h` was given; the caller prints [`CliqOptions::usage`].
    pub help: bool,
}

impl Default for CliqOptions {
    fn default() -> Self {
        Self::parse_with_env::<&str>(&[], &BTreeMap::new())
    }
}

impl CliqOptions {
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Self {
        let vars: BTreeMap<String, String> = std::env::vars().collect();
        Self::parse_with_env(args, &vars)
    }

    /// Arguments win over `ZOHO_CHANNEL_NAME`, which wins over the default.
    pub fn parse_with_env<S: AsRef<str>>(args: &[S], vars: &BTreeMap<String, String>) -> Self {
        let pairs = parse_pairs(args);
        let arg = |keys: &[&str]| keys.iter().find_map(|key| pairs.get(*key).cloned());
        let var = |key: &str| vars.get(key).filter(|v| !v.trim().is_empty()).cloned();

        Self {
            channel: arg(&["channel", "channelName"])
                .or_else(|| var("ZOHO_CHANNEL_NAME"))
                .unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
            env: arg(&["env", "testEnv", "environment"]).unwrap_or_else(|| DEFAULT_ENV.to_string()),
            report_dir: PathBuf::from(
                arg(&["reportDir"]).unwrap_or_else(|| DEFAULT_REPORT_DIR.to_string()),
            ),
            report_file: arg(&["reportFile"]).unwrap_or_else(|| DEFAULT_REPORT_FILE.to_string()),
            bot_name: arg(&["botName"]).unwrap_or_else(|| DEFAULT_BOT_NAME.to_string()),
            bot_image: arg(&["botImage"]),
            help: pairs.contains_key("help") || pairs.contains_key("h"),
        }
    }

    pub fn usage() -> &'static str {
        USAGE
    }

    pub fn report_path(&self) -> PathBuf {
        self.report_dir.join(&self.report_file)
    }
}

fn spec_name(feature: &str) -> String {
    if feature.contains('/') || feature.contains('\\') {
        Path::new(feature)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(feature)
            .to_string()
    } else {
        feature.to_string()
    }
}

/// Cliq message for a run. A run whose only result is one failure (besides
/// skips) is reported as a pre-validation alert instead of a table.
pub fn message_body(summary: &AllureSummary, options: &CliqOptions) -> Value {
    let mut bot = json!({ "name": options.bot_name });
    if let Some(image) = &options.bot_image {
        bot["image"] = json!(image);
    }

    if summary.failed == 1 && summary.total() == summary.failed + summary.skipped {
        return json!({
            "text": format!("Pre-validation failure for {}. Basic test scenario failed.", options.env),
            "bot": bot,
            "card": {
                "theme": "prompt",
                "title": format!("Alert! -- Test Failure in {}", options.env)
            }
        });
    }

    let mut rows: Vec<Value> = summary
        .features
        .iter()
        .enumerate()
        .map(|(index, feature)| {
            json!({
                "Sl No": index + 1,
                "Spec File Name": spec_name(&feature.name),
                "Total TC": feature.total(),
                "Total Passed TC": feature.passed,
                "Total Failed TC": feature.failed,
                "Total Skipped TC": feature.skipped
            })
        })
        .collect();
    rows.push(json!({
        "Sl No": "--",
        "Spec File Name": "Total",
        "Total TC": summary.total(),
        "Total Passed TC": summary.passed,
        "Total Failed TC": summary.failed,
        "Total Skipped TC": summary.skipped
    }));

    json!({
        "text": format!("Hi Team! Test execution results for {}", options.env),
        "bot": bot,
        "card": { "title": options.env, "theme": "modern-inline" },
        "slides": [{
            "type": "table",
            "title": "Details of Execution",
            "data": { "headers": TABLE_HEADERS, "rows": rows }
        }]
    })
}

pub fn summary_line(summary: &AllureSummary, env: &str) -> String {
    if summary.is_success() {
        format!("All {} tests passed! Environment: {}", summary.total(), env)
    } else {
        format!(
            "{} of {} tests failed in {}. {} passed, {} skipped.",
            summary.failed,
            summary.total(),
            env,
            summary.passed,
            summary.skipped
        )
    }
}

fn http_error(context: &str, e: reqwest::Error) -> ProbeError {
    ProbeError::Http {
        reason: format!("{}: {}", context, e),
    }
}

#[derive(Debug, Clone)]
pub struct CliqNotifier {
    http: reqwest::Client,
    options: CliqOptions,
    webhook_url: Option<String>,
}

impl CliqNotifier {
    pub fn new(options: CliqOptions, webhook_url: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| http_error("failed to build HTTP client", e))?;
        Ok(Self {
            http,
            options,
            webhook_url,
        })
    }

    /// Webhook from `CLIQ_WEBHOOK_URL`; unset or blank leaves the notifier
    /// unconfigured.
    pub fn from_env(options: CliqOptions) -> Result<Self> {
        let webhook_url = std::env::var(WEBHOOK_URL_VAR)
            .ok()
            .filter(|url| !url.trim().is_empty());
        Self::new(options, webhook_url)
    }

    pub fn options(&self) -> &CliqOptions {
        &self.options
    }

    /// Sends the summary. Never fails the run: errors are logged and the
    /// return value only says whether the message went out.
    #[instrument(skip(self, summary), fields(channel = %self.options.channel))]
    pub async fn notify(&self, summary: &AllureSummary) -> bool {
        info!("Sending test results to Cliq channel {}", self.options.channel);
        match self.deliver(summary).await {
            Ok(()) => {
                info!("Test results sent to Cliq");
                true
            }
            Err(e) => {
                warn!("Failed to send message to Cliq: {}", e);
                self.send_failure_notice(&e).await;
                false
            }
        }
    }

    async fn deliver(&self, summary: &AllureSummary) -> Result<()> {
        let Some(url) = &self.webhook_url else {
            return Err(ProbeError::Config {
                reason: format!("{} is not set", WEBHOOK_URL_VAR),
            });
        };
        self.post_message(url, &message_body(summary, &self.options))
            .await?;

        let report = self.options.report_path();
        if report.is_file() {
            info!("HTML report available at {}", report.display());
        } else {
            warn!("Report file not found: {}", report.display());
        }
        Ok(())
    }

    async fn post_message(&self, url: &str, body: &Value) -> Result<()> {
        debug!("Posting Cliq message: {}", body);
        self.http
            .post(url)
            .json(body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| http_error("Cliq message request failed", e))?;
        Ok(())
    }

    async fn send_failure_notice(&self, cause: &ProbeError) {
        let Some(url) = &self.webhook_url else {
            return;
        };
        let notice = json!({ "text": format!("Failed to send test report: {}", cause) });
        if let Err(e) = self.post_message(url, &notice).await {
            debug!("Failure notice not delivered: {}", e);
        }
    }
}
