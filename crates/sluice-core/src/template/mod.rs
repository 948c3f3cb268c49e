//! Template engine
//!
//! Three stages, applied in this order for every trigger invocation:
//!
//! 1. [`apply_event_values_to_params`] resolves `$(body...)`,
//!    `$(header...)` and `$(extensions...)` expressions in binding params.
//! 2. [`merge_in_default_params`] fills in template defaults.
//! 3. [`render_resources`] substitutes `$(params.<name>)` and `$(uid)` into
//!    every resource template.

pub mod jsonpath;
pub mod params;
pub mod render;

pub use jsonpath::{parse_json_path, JsonPath};
pub use params::{
    apply_event_values_to_params, event_document, find_expressions, merge_binding_params,
    merge_in_default_params, Expression,
};
pub use render::{
    apply_params_to_resource_template, apply_uid_to_resource_template, escape_json_string, new_uid,
    render_resources, substitute,
};
