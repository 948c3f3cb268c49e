//! Resource rendering
//!
//! Rendering is textual: placeholders are replaced inside the JSON text of
//! each resource template rather than in a parsed document. This lets a
//! placeholder outside a string literal splice in any JSON fragment (a
//! number, an object). A placeholder inside a string literal has its value
//! JSON-escaped, so quotes and backslashes in param values cannot break the
//! document. The rendered text must parse as JSON.

use rand::Rng;
use serde_json::Value;

use crate::error::TemplateError;
use crate::types::{Param, TemplateSpec};

const UID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const UID_LENGTH: usize = 5;

/// Placeholder replaced by the per-invocation UID
pub const UID_PLACEHOLDER: &str = "$(uid)";

/// A fresh random identifier for one trigger invocation
pub fn new_uid() -> String {
    let mut rng = rand::thread_rng();
    (0..UID_LENGTH)
        .map(|_| UID_CHARSET[rng.gen_range(0..UID_CHARSET.len())] as char)
        .collect()
}

/// Escape a value for use inside a JSON string literal (without the quotes)
pub fn escape_json_string(value: &str) -> String {
    let quoted = Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

/// Replace every occurrence of `placeholder` in JSON text `template`,
/// escaping the value when the occurrence is inside a string literal.
pub fn substitute(template: &str, placeholder: &str, value: &str) -> String {
    if placeholder.is_empty() || !template.contains(placeholder) {
        return template.to_string();
    }

    let escaped = escape_json_string(value);
    let mut out = String::with_capacity(template.len());
    let mut in_string = false;
    let mut escape_next = false;
    let mut rest = template;

    while let Some(c) = rest.chars().next() {
        if rest.starts_with(placeholder) {
            out.push_str(if in_string { &escaped } else { value });
            rest = &rest[placeholder.len()..];
            continue;
        }

        if in_string {
            if escape_next {
                escape_next = false;
            } else if c == '\\' {
                escape_next = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        }

        out.push(c);
        rest = &rest[c.len_utf8()..];
    }

    out
}

/// Substitute every param into one resource template's JSON text.
/// Both `$(params.<name>)` and `$(tt.params.<name>)` are recognised.
pub fn apply_params_to_resource_template(params: &[Param], template: &str) -> String {
    params.iter().fold(template.to_string(), |text, param| {
        let text = substitute(&text, &format!("$(params.{})", param.name), &param.value);
        substitute(&text, &format!("$(tt.params.{})", param.name), &param.value)
    })
}

/// Replace `$(uid)` everywhere in `template`
pub fn apply_uid_to_resource_template(template: &str, uid: &str) -> String {
    template.replace(UID_PLACEHOLDER, uid)
}

/// Render every resource template of `spec` in declaration order, sharing
/// one `uid` across all of them.
pub fn render_resources(spec: &TemplateSpec, params: &[Param], uid: &str) -> Result<Vec<Value>, TemplateError> {
    spec.resource_templates
        .iter()
        .enumerate()
        .map(|(index, template)| {
            let text = apply_params_to_resource_template(params, &template.as_text());
            let text = apply_uid_to_resource_template(&text, uid);
            serde_json::from_str(&text).map_err(|e| TemplateError::Render {
                index,
                reason: e.to_string(),
            })
        })
        .collect()
}
