//! # HTTP Facade
//!
//! One place where requests leave the suite: method validation, URL
//! joining, the `Authorization` header, latency measurement and folding of
//! transport failures into a sentinel response.

pub mod client;
pub mod method;
pub mod response;
pub mod retry;

pub use client::ApiClient;
pub use method::HttpMethod;
pub use response::{
    ApiResponse, TimedResponse, NETWORK_ERROR_CODE, NETWORK_ERROR_STATUS, TIMEOUT_CODE,
};
pub use retry::{retry_operation, wait_for};
