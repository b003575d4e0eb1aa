//! # Request Engine
//!
//! Builds the bodies and URLs that scenario steps send: request-body
//! templates with table overrides applied, `{placeholder}` resolution over
//! previously stored values, and endpoint templating with query strings.

pub mod endpoint;
pub mod overrides;
pub mod params;
pub mod resolver;

pub use endpoint::{add_query_params, build_endpoint, encode_component, BuiltEndpoint};
pub use overrides::{apply_overrides, final_request_body, is_remove_sentinel, OverrideSet};
pub use params::{is_path_param_key, split_params, ParamMode, SplitParams};
pub use resolver::{placeholder_name, MapSource, Resolver, Source, ValueSource};
