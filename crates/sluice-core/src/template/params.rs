//! Event value extraction and param merging

use std::collections::{BTreeMap, HashSet};

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::error::TemplateError;
use crate::template::jsonpath::parse_json_path;
use crate::types::{Extensions, Headers, Param, ParamSpec};

lazy_static! {
    // Expressions that read from the event; anything else inside $() is left alone
    static ref EVENT_EXPRESSION: Regex = Regex::new(
        r"^(body|header|extensions)(\.|\[|$)"
    ).unwrap();
}

/// A `$(...)` occurrence inside a string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression<'a> {
    /// The full text including `$(` and `)`
    pub original: &'a str,
    /// The text between the parentheses
    pub inner: &'a str,
}

/// Find every balanced `$( ... )` expression in `value`.
///
/// Parentheses inside single or double quotes do not count toward nesting,
/// so `$(body.a['x)'])` is one expression. An unterminated `$(` ends the scan.
pub fn find_expressions(value: &str) -> Vec<Expression<'_>> {
    let bytes = value.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;

    while i + 1 < bytes.len() {
        if bytes[i] != b'$' || bytes[i + 1] != b'(' {
            i += 1;
            continue;
        }

        let start = i;
        let mut depth = 1;
        let mut quote: Option<u8> = None;
        let mut j = i + 2;
        let mut end = None;

        while j < bytes.len() {
            let b = bytes[j];
            match quote {
                Some(q) if b == q => quote = None,
                Some(_) => {}
                None => match b {
                    b'\'' | b'"' => quote = Some(b),
                    b'(' => depth += 1,
                    b')' => {
                        depth -= 1;
                        if depth == 0 {
                            end = Some(j);
                            break;
                        }
                    }
                    _ => {}
                },
            }
            j += 1;
        }

        match end {
            Some(end) => {
                found.push(Expression {
                    original: &value[start..=end],
                    inner: &value[start + 2..end],
                });
                i = end + 1;
            }
            None => break,
        }
    }

    found
}

/// Build the document that event expressions are evaluated against:
/// `{ "body": ..., "header": {...}, "extensions": {...} }`.
///
/// Header names are lower-cased and repeated values joined with `,`. An empty
/// body is `null`; a body that is not JSON is an error.
pub fn event_document(body: &[u8], headers: &Headers, extensions: &Extensions) -> Result<Value, TemplateError> {
    let body_value = if body.iter().all(|b| b.is_ascii_whitespace()) {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(body).map_err(|e| TemplateError::InvalidBody(e.to_string()))?
    };

    let header_value: Map<String, Value> = headers
        .iter()
        .map(|(name, values)| (name.to_ascii_lowercase(), Value::String(values.join(","))))
        .collect();

    Ok(json!({
        "body": body_value,
        "header": header_value,
        "extensions": extensions,
    }))
}

/// Replace every event expression in the params' values with the value it
/// selects from the event.
///
/// A missing path fails the whole call; the caller treats that as a failure
/// of the owning trigger only.
pub fn apply_event_values_to_params(
    params: &[Param],
    body: &[u8],
    headers: &Headers,
    extensions: &Extensions,
) -> Result<Vec<Param>, TemplateError> {
    let mut event: Option<Value> = None;
    let mut resolved = Vec::with_capacity(params.len());

    for param in params {
        let mut value = param.value.clone();
        for expression in find_expressions(&param.value) {
            if !EVENT_EXPRESSION.is_match(expression.inner) {
                continue;
            }

            if event.is_none() {
                event = Some(event_document(body, headers, extensions)?);
            }
            let Some(document) = event.as_ref() else {
                continue;
            };

            let path = if expression.inner.starts_with("header") {
                expression.inner.to_ascii_lowercase()
            } else {
                expression.inner.to_string()
            };

            let replacement = parse_json_path(document, &path).map_err(|e| TemplateError::ParamValue {
                param: param.name.clone(),
                value: param.value.clone(),
                source: Box::new(e),
            })?;
            value = value.replace(expression.original, &replacement);
        }
        resolved.push(Param::new(param.name.clone(), value));
    }

    Ok(resolved)
}

/// Concatenate the params of several bindings, failing on any name that
/// appears twice. Duplicates are an error here, never an override.
pub fn merge_binding_params(sources: &[Vec<Param>]) -> Result<Vec<Param>, TemplateError> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for param in sources.iter().flatten() {
        if !seen.insert(param.name.as_str()) {
            return Err(TemplateError::DuplicateParam(param.name.clone()));
        }
        merged.push(param.clone());
    }
    Ok(merged)
}

/// Add every declared default that no param overrides. Supplied params win
/// over defaults; the result is sorted by name.
pub fn merge_in_default_params(params: &[Param], specs: &[ParamSpec]) -> Vec<Param> {
    let mut all: BTreeMap<&str, &str> = BTreeMap::new();
    for spec in specs {
        if let Some(default) = &spec.default {
            all.insert(&spec.name, default);
        }
    }
    for param in params {
        all.insert(&param.name, &param.value);
    }
    all.into_iter().map(|(name, value)| Param::new(name, value)).collect()
}
