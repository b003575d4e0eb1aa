//! # Scenario
//!
//! State that lives for one scenario: the last response and its latency,
//! the auth token, resources created so far, and the snapshots taken
//! around an update. Step definitions drive everything through
//! [`ScenarioContext`].

pub mod context;
pub mod registry;
pub mod target;

pub use context::ScenarioContext;
pub use registry::{payload_of, primary_record, ResourceRegistry, PRIMARY_ID};
pub use target::{live_record_source, Target, TARGET_VAR};
