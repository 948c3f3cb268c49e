//! Interceptor chain runtime
//!
//! Runs a trigger's interceptors in order. Each interceptor sees the body,
//! headers and extensions left by the previous one; the first rejection
//! halts the chain.

use std::fmt;

use sluice_core::{
    header_value, Extensions, Headers, InterceptorCode, InterceptorRequest, InterceptorStatus, TriggerContext,
    TriggerInterceptor,
};
use tracing::{debug, info};

use crate::error::InterceptorError;
use crate::{Interceptor, InterceptorClients};

const FORM_CONTENT_TYPES: [&str; 2] = ["application/x-www-form-urlencoded", "multipart/form-data"];

/// Event data entering the chain
#[derive(Debug, Clone, Default)]
pub struct ChainInput {
    /// Raw event body
    pub body: Vec<u8>,
    /// Event headers
    pub headers: Headers,
    /// Namespace of the listener, used to resolve secrets and services
    pub namespace: String,
}

/// Event data after every interceptor continued
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainOutput {
    /// Possibly rewritten body
    pub body: Vec<u8>,
    /// Possibly rewritten headers
    pub headers: Headers,
    /// Extensions merged from every interceptor
    pub extensions: Extensions,
}

/// Why the chain stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHalt {
    /// Display name of the halting interceptor
    pub interceptor: String,
    /// Status it reported
    pub status: InterceptorStatus,
}

impl fmt::Display for ChainHalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interceptor {} stopped trigger processing: {}", self.interceptor, self.status)
    }
}

impl std::error::Error for ChainHalt {}

/// Runs interceptor chains with shared clients
#[derive(Clone)]
pub struct ChainRunner {
    clients: InterceptorClients,
}

impl ChainRunner {
    /// Create a runner
    pub fn new(clients: InterceptorClients) -> Self {
        Self { clients }
    }

    /// Run `interceptors` in order over `input`
    pub async fn run(
        &self,
        context: &TriggerContext,
        interceptors: &[TriggerInterceptor],
        input: ChainInput,
    ) -> Result<ChainOutput, ChainHalt> {
        let mut output = ChainOutput {
            body: input.body,
            headers: input.headers,
            extensions: Extensions::new(),
        };
        if interceptors.is_empty() {
            return Ok(output);
        }

        if let Some(content_type) = form_content_type(&output.headers) {
            let first = &interceptors[0];
            return Err(halt(
                context,
                first.display_name(),
                InterceptorError::UnsupportedContentType(content_type).into_status(),
            ));
        }

        for entry in interceptors {
            let name = entry.display_name();
            let Some(interceptor) = Interceptor::lookup(&entry.interceptor_ref.name, &self.clients, &input.namespace)
            else {
                return Err(halt(
                    context,
                    name,
                    InterceptorError::NotFound(entry.interceptor_ref.name.clone()).into_status(),
                ));
            };

            let request = InterceptorRequest {
                body: String::from_utf8_lossy(&output.body).into_owned(),
                header: output.headers.clone(),
                extensions: output.extensions.clone(),
                interceptor_params: entry.params_map(),
                context: context.clone(),
            };

            debug!(
                event_id = %context.event_id,
                trigger_id = %context.trigger_id,
                interceptor = %name,
                "running interceptor"
            );
            let response = interceptor.process(&request).await;
            if !response.continue_chain {
                return Err(halt(context, name, response.status));
            }

            for (key, value) in response.extensions {
                output.extensions.insert(key, value);
            }
            if let Some(body) = response.body {
                output.body = serde_json::to_vec(&body).map_err(|e| {
                    halt(context, name, InterceptorStatus::new(InterceptorCode::Internal, e.to_string()))
                })?;
            }
            if let Some(headers) = response.header {
                for (header, values) in headers {
                    let header = header.to_ascii_lowercase();
                    output.headers.retain(|existing, _| !existing.eq_ignore_ascii_case(&header));
                    output.headers.insert(header, values);
                }
            }
        }

        Ok(output)
    }
}

fn form_content_type(headers: &Headers) -> Option<String> {
    let content_type = header_value(headers, "content-type")?;
    let lowered = content_type.to_ascii_lowercase();
    FORM_CONTENT_TYPES
        .iter()
        .any(|form| lowered.starts_with(form))
        .then_some(content_type)
}

fn halt(context: &TriggerContext, interceptor: &str, status: InterceptorStatus) -> ChainHalt {
    info!(
        event_id = %context.event_id,
        trigger_id = %context.trigger_id,
        interceptor = %interceptor,
        code = %status.code,
        message = %status.message,
        "interceptor stopped trigger processing"
    );
    ChainHalt {
        interceptor: interceptor.to_string(),
        status,
    }
}
