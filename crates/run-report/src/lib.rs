//! # Run Report
//!
//! Publishes the outcome of a Probe run.
//!
//! - [`AllureSummary`] rebuilds pass/fail/skip counts from an
//!   `allure-results` directory, grouped per feature.
//! - [`CliqOptions`] parses the `--sendCliq` argument tail.
//! - [`CliqNotifier`] posts the summary table to a Zoho Cliq webhook. It is
//!   best-effort: a delivery failure is logged, never returned.

pub mod allure;
pub mod cliq;

pub use allure::{AllureSummary, FeatureSummary, TestCaseSummary, TestOutcome};
pub use cliq::{message_body, summary_line, CliqNotifier, CliqOptions};

/// Directory the Allure adapter writes results into by default.
pub const DEFAULT_RESULTS_DIR: &str = "./allure-results";
