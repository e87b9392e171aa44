use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use vmview::NavigationRequest;
use vmview::NetworkError;
use vmview::platform::Transport;

/// Posts navigation requests with `reqwest`.
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

impl Transport for HttpTransport {
    fn post(&self, request: &NavigationRequest) -> LocalBoxFuture<'static, Result<Value, NetworkError>> {
        log::debug!("POST {} ref={}", self.endpoint, request.reference);
        send(self.client.post(&self.endpoint).json(request)).boxed_local()
    }
}

async fn send(request: RequestBuilder) -> Result<Value, NetworkError> {
    let response = request.send().await.map_err(network_error)?;
    let response = response.error_for_status().map_err(network_error)?;
    response.json().await.map_err(network_error)
}

fn network_error(error: reqwest::Error) -> NetworkError {
    NetworkError(error.to_string())
}
