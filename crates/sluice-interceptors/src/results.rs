use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use sluice_core::{Extensions, InterceptorRequest, InterceptorResponse};
use tracing::{debug, instrument, warn};

#[derive(Debug, Default, Deserialize)]
struct ResultsParams {
    #[serde(default)]
    url: Option<String>,
}

/// Records every event it sees in a results store.
///
/// Recording is best effort: failures are logged and the chain always
/// continues.
#[derive(Debug, Clone)]
pub struct ResultsInterceptor {
    client: Client,
    default_url: Option<String>,
}

impl ResultsInterceptor {
    /// Create an interceptor posting to `default_url` unless a `url` param
    /// overrides it
    pub fn new(client: Client, default_url: Option<String>) -> Self {
        Self { client, default_url }
    }

    /// Post the request to the results store
    #[instrument(skip(self, request), fields(event_id = %request.context.event_id))]
    pub async fn process(&self, request: &InterceptorRequest) -> InterceptorResponse {
        let params: ResultsParams = match serde_json::from_value(Value::Object(request.interceptor_params.clone())) {
            Ok(params) => params,
            Err(e) => {
                warn!(error = %e, "invalid results params, using the default store");
                ResultsParams::default()
            }
        };

        match params.url.or_else(|| self.default_url.clone()) {
            Some(url) => self.record(&url, request).await,
            None => warn!("no results store configured, event not recorded"),
        }

        InterceptorResponse::proceed(Extensions::new())
    }

    async fn record(&self, url: &str, request: &InterceptorRequest) {
        match self.client.post(url).json(request).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(url = %url, "event recorded");
            }
            Ok(response) => {
                warn!(url = %url, status = response.status().as_u16(), "results store rejected event");
            }
            Err(e) => {
                warn!(url = %url, error = %e, "failed to record event");
            }
        }
    }
}
