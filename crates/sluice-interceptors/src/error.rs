use sluice_core::{InterceptorCode, InterceptorResponse, InterceptorStatus, SecretError};
use thiserror::Error;

/// Failures raised inside an interceptor.
///
/// Every variant maps to a status code; interceptors never return errors to
/// the chain, they return a rejecting response built from one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterceptorError {
    /// Interceptor params are missing or malformed
    #[error("invalid interceptor params: {0}")]
    InvalidParams(String),

    /// The event body is not what the interceptor needs
    #[error("invalid event body: {0}")]
    InvalidBody(String),

    /// The event content type cannot be intercepted
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// A filter or overlay expression failed
    #[error("{0}")]
    Expression(String),

    /// A filter evaluated to false
    #[error("expression {0} did not return true")]
    FilterRejected(String),

    /// No interceptor is registered under this ref name
    #[error("interceptor {0} not found")]
    NotFound(String),

    /// The remote call did not complete
    #[error("request to {url} failed: {reason}")]
    Transport {
        /// Target URL
        url: String,
        /// Client error
        reason: String,
    },

    /// The remote service answered with a non-success status
    #[error("interceptor {url} returned HTTP status {status}")]
    HttpStatus {
        /// Target URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// The remote response is not an interceptor response
    #[error("failed to decode interceptor response: {0}")]
    Decode(String),

    /// A credential could not be read
    #[error(transparent)]
    Secret(#[from] SecretError),
}

impl InterceptorError {
    /// Status code reported for this failure
    pub fn code(&self) -> InterceptorCode {
        match self {
            InterceptorError::InvalidParams(_)
            | InterceptorError::InvalidBody(_)
            | InterceptorError::UnsupportedContentType(_)
            | InterceptorError::Expression(_) => InterceptorCode::InvalidArgument,
            InterceptorError::FilterRejected(_) | InterceptorError::HttpStatus { .. } => {
                InterceptorCode::FailedPrecondition
            }
            InterceptorError::NotFound(_) => InterceptorCode::NotFound,
            InterceptorError::Transport { .. } => InterceptorCode::Aborted,
            InterceptorError::Decode(_) | InterceptorError::Secret(_) => InterceptorCode::Internal,
        }
    }

    /// Convert into a status
    pub fn into_status(self) -> InterceptorStatus {
        InterceptorStatus::new(self.code(), self.to_string())
    }
}

impl From<InterceptorError> for InterceptorResponse {
    fn from(error: InterceptorError) -> Self {
        InterceptorResponse::reject(error.code(), error.to_string())
    }
}

/// Result type used inside interceptors
pub type InterceptorResult<T> = Result<T, InterceptorError>;
