use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde_json::Value;
use thiserror::Error;

use crate::config::RuntimeConfig;

pub mod nominatim;
pub mod weather_gov;

#[cfg(test)]
pub(crate) mod test_support;

const ACCEPT_GEO_JSON: &str = "application/geo+json, application/json";
const UNKNOWN_ERROR_DETAIL: &str = "Unknown error";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking GET against an absolute URL. Only transport failures are errors;
/// any HTTP status comes back as a response.
pub trait HttpTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, ProviderError>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for &T {
    fn get(&self, url: &str) -> Result<HttpResponse, ProviderError> {
        (**self).get(url)
    }
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|error| ProviderError::Transport(error.to_string()))?;

        Ok(Self { client })
    }

    pub fn from_config(config: &RuntimeConfig) -> Result<Self, ProviderError> {
        Self::new(&config.user_agent(), config.timeout())
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, ProviderError> {
        tracing::debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .header(ACCEPT, ACCEPT_GEO_JSON)
            .send()
            .map_err(|error| ProviderError::Transport(error.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|error| ProviderError::Transport(error.to_string()))?;

        Ok(HttpResponse { status, body })
    }
}

/// Parses the body as JSON, then rejects non-success statuses.
///
/// The parse runs first, so an unparseable error page reports
/// [`ProviderError::InvalidJson`] rather than the HTTP status.
pub fn validate_response(response: &HttpResponse) -> Result<Value, ProviderError> {
    let json: Value =
        serde_json::from_str(&response.body).map_err(|_| ProviderError::InvalidJson)?;

    if !response.is_success() {
        return Err(ProviderError::Http {
            status: response.status,
            detail: extract_detail(&json),
        });
    }

    Ok(json)
}

/// `detail` rendered as-is; only a missing, `null` or `false` value falls
/// back to "Unknown error".
fn extract_detail(json: &Value) -> String {
    match json.get("detail") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => UNKNOWN_ERROR_DETAIL.to_string(),
        Some(Value::String(detail)) => detail.clone(),
        Some(other) => other.to_string(),
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{0}")]
    Transport(String),
    #[error("HTTP Error: {status} - {detail}")]
    Http { status: u16, detail: String },
    #[error("Invalid JSON response from API")]
    InvalidJson,
    #[error("Unexpected response from API: {0}")]
    UnexpectedShape(String),
}
