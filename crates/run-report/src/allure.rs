//! Summaries rebuilt from raw Allure result files

use probe_core::{ProbeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Feature name used when a result carries no label and no container.
pub const UNKNOWN_FEATURE: &str = "Unknown Feature";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Passed,
    Failed,
    Skipped,
    /// Any status Allure reports that is none of the above.
    Unknown,
}

impl TestOutcome {
    pub fn from_status(status: &str) -> Self {
        match status {
            "passed" => TestOutcome::Passed,
            "failed" | "broken" => TestOutcome::Failed,
            "skipped" | "pending" => TestOutcome::Skipped,
            _ => TestOutcome::Unknown,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AllureResult {
    uuid: Option<String>,
    name: Option<String>,
    status: Option<String>,
    #[serde(default)]
    labels: Vec<AllureLabel>,
    time: Option<AllureTime>,
}

impl AllureResult {
    fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|label| label.name == name)
            .map(|label| label.value.as_str())
            .filter(|value| !value.trim().is_empty())
    }

    fn duration_ms(&self) -> u64 {
        let Some(time) = &self.time else { return 0 };
        match (time.duration, time.start, time.stop) {
            (Some(duration), _, _) => duration.max(0) as u64,
            (None, Some(start), Some(stop)) if stop >= start => (stop - start) as u64,
            _ => 0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AllureLabel {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct AllureTime {
    start: Option<i64>,
    stop: Option<i64>,
    duration: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AllureContainer {
    name: Option<String>,
    #[serde(default)]
    children: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestCaseSummary {
    pub name: String,
    pub outcome: TestOutcome,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureSummary {
    pub name: String,
    pub tests: Vec<TestCaseSummary>,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl FeatureSummary {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    fn record(&mut self, test: TestCaseSummary) {
        match test.outcome {
            TestOutcome::Passed => self.passed += 1,
            TestOutcome::Failed => self.failed += 1,
            TestOutcome::Skipped => self.skipped += 1,
            TestOutcome::Unknown => {}
        }
        self.tests.push(test);
    }

    /// Every recorded test, unknown statuses included.
    pub fn total(&self) -> usize {
        self.tests.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AllureSummary {
    pub features: Vec<FeatureSummary>,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
}

impl AllureSummary {
    /// Reads every `*-result.json` under `dir`. Features come from the
    /// `feature` label, then `suite`, then the parent container's name.
    /// Unreadable files are skipped with a warning.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ProbeError::Config {
                reason: format!("Allure results directory not found: {}", dir.display()),
            });
        }

        let mut result_files = Vec::new();
        let mut container_files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.ends_with("-result.json") {
                result_files.push(path);
            } else if file_name.ends_with("-container.json") {
                container_files.push(path);
            }
        }
        result_files.sort();
        container_files.sort();

        let mut parent_feature: HashMap<String, String> = HashMap::new();
        for path in &container_files {
            match read_json::<AllureContainer>(path) {
                Ok(container) => {
                    let name = container
                        .name
                        .filter(|n| !n.trim().is_empty())
                        .unwrap_or_else(|| UNKNOWN_FEATURE.to_string());
                    for child in container.children {
                        parent_feature.insert(child, name.clone());
                    }
                }
                Err(e) => warn!("Skipping container file {}: {}", path.display(), e),
            }
        }

        let mut features: BTreeMap<String, FeatureSummary> = BTreeMap::new();
        let mut summary = AllureSummary::default();
        for path in &result_files {
            let result = match read_json::<AllureResult>(path) {
                Ok(result) => result,
                Err(e) => {
                    warn!("Skipping result file {}: {}", path.display(), e);
                    continue;
                }
            };

            let feature_name = result
                .label("feature")
                .or_else(|| result.label("suite"))
                .map(str::to_string)
                .or_else(|| {
                    result
                        .uuid
                        .as_ref()
                        .and_then(|uuid| parent_feature.get(uuid).cloned())
                })
                .unwrap_or_else(|| UNKNOWN_FEATURE.to_string());

            let test = TestCaseSummary {
                name: result.name.clone().unwrap_or_else(|| "Unknown test".to_string()),
                outcome: TestOutcome::from_status(result.status.as_deref().unwrap_or_default()),
                duration_ms: result.duration_ms(),
            };
            debug!("{} -> {} ({:?})", test.name, feature_name, test.outcome);

            match test.outcome {
                TestOutcome::Passed => summary.passed += 1,
                TestOutcome::Failed => summary.failed += 1,
                TestOutcome::Skipped => summary.skipped += 1,
                TestOutcome::Unknown => {}
            }
            summary.duration_ms += test.duration_ms;
            features
                .entry(feature_name.clone())
                .or_insert_with(|| FeatureSummary::new(&feature_name))
                .record(test);
        }

        summary.features = features.into_values().collect();
        info!(
            "Built summary from {} result files: {} passed, {} failed, {} skipped",
            result_files.len(),
            summary.passed,
            summary.failed,
            summary.skipped
        );
        Ok(summary)
    }

    /// Passed, failed and skipped tests across every feature.
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
