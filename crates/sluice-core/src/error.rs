use thiserror::Error;

/// Errors raised while evaluating template expressions or rendering resources
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// The event body could not be decoded as JSON
    #[error("failed to parse event body: {0}")]
    InvalidBody(String),

    /// A JSONPath expression could not be parsed
    #[error("invalid JSONPath expression {expression}: {reason}")]
    InvalidPath {
        /// The expression as written
        expression: String,
        /// Why it was rejected
        reason: String,
    },

    /// A JSONPath expression selected nothing
    #[error("{expression} not found")]
    NotFound {
        /// The expression as written
        expression: String,
    },

    /// A binding param value could not be resolved against the event
    #[error("failed to replace JSONPath value for param {param}: {value}: {source}")]
    ParamValue {
        /// Param name
        param: String,
        /// Unresolved param value
        value: String,
        /// Underlying failure
        #[source]
        source: Box<TemplateError>,
    },

    /// The same param name was supplied by more than one binding
    #[error("duplicate param name: {0}")]
    DuplicateParam(String),

    /// A rendered resource template is not valid JSON
    #[error("failed to render resource template {index}: {reason}")]
    Render {
        /// Position of the template in the template spec
        index: usize,
        /// Parser message
        reason: String,
    },
}

/// Errors raised while resolving a trigger's bindings and template
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// A binding entry is neither a reference nor an inline name/value pair
    #[error("invalid binding: {0}")]
    InvalidBinding(String),

    /// A referenced binding or template could not be fetched
    #[error("error getting {kind} {name}: {reason}")]
    Lookup {
        /// Kind of the object being fetched
        kind: String,
        /// Name of the object
        name: String,
        /// Message from the getter
        reason: String,
    },

    /// The trigger has neither a template reference nor an inline template
    #[error("trigger template has neither ref nor spec")]
    MissingTemplate,

    /// Param merging failed
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Errors raised by the secret cache and its sources
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    /// No secret with this `namespace/name` key is cached
    #[error("secret {0} not found")]
    NotFound(String),

    /// The secret exists but has no such data field
    #[error("key {key} not found in secret {secret}")]
    KeyNotFound {
        /// `namespace/name` of the secret
        secret: String,
        /// Missing data field
        key: String,
    },

    /// The backing source failed to list secrets
    #[error("secret source error: {0}")]
    Source(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            (
                TemplateError::NotFound { expression: "$(body.a)".to_string() }.to_string(),
                "$(body.a) not found",
            ),
            (
                TemplateError::DuplicateParam("a".to_string()).to_string(),
                "duplicate param name: a",
            ),
            (
                ResolveError::Lookup {
                    kind: "TriggerBinding".to_string(),
                    name: "tb".to_string(),
                    reason: "not found".to_string(),
                }
                .to_string(),
                "error getting TriggerBinding tb: not found",
            ),
            (
                SecretError::KeyNotFound { secret: "ns/s".to_string(), key: "token".to_string() }
                    .to_string(),
                "key token not found in secret ns/s",
            ),
        ];

        for (actual, expected) in errors {
            assert_eq!(actual, expected);
        }
    }

    #[test]
    fn test_param_value_wraps_source() {
        let err = TemplateError::ParamValue {
            param: "sha".to_string(),
            value: "$(body.head)".to_string(),
            source: Box::new(TemplateError::NotFound { expression: "body.head".to_string() }),
        };
        assert_eq!(
            err.to_string(),
            "failed to replace JSONPath value for param sha: $(body.head): body.head not found"
        );
    }
}
