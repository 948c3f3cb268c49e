use sluice_core::{Extensions, InterceptorRequest, InterceptorResponse};
use tracing::debug;

/// Logs every request it sees and lets the chain continue
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugInterceptor;

impl DebugInterceptor {
    /// Log the request at debug level
    pub fn process(&self, request: &InterceptorRequest) -> InterceptorResponse {
        debug!(
            event_id = %request.context.event_id,
            trigger_id = %request.context.trigger_id,
            event_url = %request.context.event_url,
            body = %request.body,
            header = ?request.header,
            extensions = ?request.extensions,
            "debug interceptor"
        );
        InterceptorResponse::proceed(Extensions::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_continues() {
        let response = DebugInterceptor.process(&InterceptorRequest::default());
        assert!(response.continue_chain);
        assert!(response.extensions.is_empty());
    }
}
