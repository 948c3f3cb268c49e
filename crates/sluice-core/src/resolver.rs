//! Trigger resolution
//!
//! Turns a trigger's binding and template references into concrete params
//! and a template spec. Lookups go through caller supplied getters so the
//! resolver does not care where configuration lives.

use std::fmt::Display;

use serde_json::Value;

use crate::error::{ResolveError, TemplateError};
use crate::template::{apply_event_values_to_params, merge_binding_params, merge_in_default_params, render_resources};
use crate::types::{Binding, BindingKind, BindingSource, Extensions, Headers, Param, Template, TemplateSpec, Trigger};

/// A trigger with every reference looked up
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedTrigger {
    /// Unevaluated binding params, in binding order
    pub binding_params: Vec<Param>,
    /// The template to render
    pub template: TemplateSpec,
}

/// Look up every binding and the template of `trigger`.
///
/// Binding params are concatenated in the order the bindings are listed; a
/// name supplied twice is an error. An inline template spec wins over a
/// template reference.
pub fn resolve_trigger<FB, FC, FT, E>(
    trigger: &Trigger,
    get_binding: FB,
    get_cluster_binding: FC,
    get_template: FT,
) -> Result<ResolvedTrigger, ResolveError>
where
    FB: Fn(&str) -> Result<Binding, E>,
    FC: Fn(&str) -> Result<Binding, E>,
    FT: Fn(&str) -> Result<Template, E>,
    E: Display,
{
    let mut sources = Vec::with_capacity(trigger.bindings.len());
    for binding in &trigger.bindings {
        match binding.source()? {
            BindingSource::Inline(param) => sources.push(vec![param]),
            BindingSource::Ref { kind, name } => {
                let fetched = match kind {
                    BindingKind::Namespaced => get_binding(name),
                    BindingKind::Cluster => get_cluster_binding(name),
                };
                let fetched = fetched.map_err(|e| ResolveError::Lookup {
                    kind: kind.to_string(),
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;
                sources.push(fetched.params);
            }
        }
    }
    let binding_params = merge_binding_params(&sources)?;

    let template = match (&trigger.template.spec, &trigger.template.template_ref) {
        (Some(spec), _) => spec.clone(),
        (None, Some(name)) => {
            get_template(name)
                .map_err(|e| ResolveError::Lookup {
                    kind: "TriggerTemplate".to_string(),
                    name: name.clone(),
                    reason: e.to_string(),
                })?
                .spec
        }
        (None, None) => return Err(ResolveError::MissingTemplate),
    };

    Ok(ResolvedTrigger {
        binding_params,
        template,
    })
}

/// Evaluate the binding params against the event, then fill in defaults
pub fn resolve_params(
    resolved: &ResolvedTrigger,
    body: &[u8],
    headers: &Headers,
    extensions: &Extensions,
) -> Result<Vec<Param>, TemplateError> {
    let params = apply_event_values_to_params(&resolved.binding_params, body, headers, extensions)?;
    Ok(merge_in_default_params(&params, &resolved.template.params))
}

/// Render the resolved template with `params`, sharing one `uid`
pub fn resolve_resources(resolved: &ResolvedTrigger, params: &[Param], uid: &str) -> Result<Vec<Value>, TemplateError> {
    render_resources(&resolved.template, params, uid)
}
