//! # Probe Core
//!
//! Core types for the Probe API verification suite.
//!
//! ## What lives here
//! - Fixture store for request-body templates, global test data and users
//! - The closed set of resource kinds and their endpoint / id / table config
//! - Environment-driven settings shared by every step
//! - The error taxonomy used across the workspace

pub mod error;
pub mod fixtures;
pub mod resource;
pub mod settings;

pub use error::{ProbeError, Result};
pub use fixtures::{FixtureStore, TestData, UserDirectory};
pub use resource::{normalize_type_name, ResourceConfig, ResourceKind};
pub use settings::{DbSettings, Settings};

/// Current Probe version for compatibility checks
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Probe build information for logs and reports
pub const BUILD_INFO: &str = concat!(
    "Probe ",
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CARGO_PKG_NAME"),
    ")"
);

/// Override value that deletes the targeted field instead of setting it.
pub const REMOVE_SENTINEL: &str = "__REMOVE__";

/// Environment variables that are not resource collection endpoints
pub mod env {
    pub const BASE_URL: &str = "BASE_URL";
    pub const ACCESS_TOKEN: &str = "ACCESS_TOKEN";
    pub const LOGIN_ENDPOINT: &str = "LOGIN_ENDPOINT";
    pub const MAP_DEVICE_ENDPOINT: &str = "MAP_DEVICE_ENDPOINT";
    pub const GET_DEVICE_DETAILS_ENDPOINT: &str = "GET_DEVICE_DETAILS_ENDPOINT";
    pub const ISSUES_BY_USER_ENDPOINT: &str = "ISSUES_BY_USER_ENDPOINT";
    pub const TODAY_QUOTE_ENDPOINT: &str = "TODAY_QUOTE_ENDPOINT";
}
