//! reqwest-backed client with latency measurement and error folding

use crate::method::HttpMethod;
use crate::response::{ApiResponse, TimedResponse, NETWORK_ERROR_CODE, TIMEOUT_CODE};
use probe_core::{ProbeError, Result, Settings};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Http {
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            http,
            base_url: base_url.map(|url| url.trim_end_matches('/').to_string()),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.base_url.clone(), settings.http_timeout)
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Absolute URLs pass through; relative ones are joined to the base URL.
    pub fn resolve_url(&self, endpoint: &str) -> Result<String> {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return Ok(endpoint.to_string());
        }
        let base = self.base_url.as_deref().ok_or_else(|| ProbeError::Config {
            reason: "BASE_URL environment variable is not defined".to_string(),
        })?;
        if endpoint.starts_with('/') {
            Ok(format!("{}{}", base, endpoint))
        } else {
            Ok(format!("{}/{}", base, endpoint))
        }
    }

    /// Sends one request. HTTP error statuses come back as ordinary
    /// responses and transport failures as the 600 sentinel, so the only
    /// errors are invalid arguments.
    #[instrument(skip(self, body, headers, authorization), fields(method = %method))]
    pub async fn send(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: Option<&Value>,
        headers: &[(String, String)],
        authorization: Option<&str>,
    ) -> Result<TimedResponse> {
        if endpoint.trim().is_empty() {
            return Err(ProbeError::invalid("Endpoint must be a non-empty string"));
        }
        let url = self.resolve_url(endpoint)?;
        info!("Making {} request to: {}", method, url);

        let mut request = self
            .http
            .request(method.into(), &url)
            .headers(header_map(headers)?);
        if let Some(token) = authorization {
            request = request.header(AUTHORIZATION, token);
        }
        if let Some(body) = body {
            if method.carries_body() {
                debug!("Request body: {}", body);
                request = request.json(body);
            }
        }

        let started = Instant::now();
        let response = match request.send().await {
            Ok(raw) => read_response(raw).await,
            Err(e) => transport_failure(&method, &url, e),
        };
        let elapsed = started.elapsed();

        info!(
            "{} {} -> {} in {}ms",
            method,
            url,
            response.status,
            elapsed.as_millis()
        );
        debug!("Response: {}", response.data);
        Ok(TimedResponse { response, elapsed })
    }
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ProbeError::invalid(format!("Invalid header name: {}", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| ProbeError::invalid(format!("Invalid header value for {}", name)))?;
        map.insert(name, value);
    }
    Ok(map)
}

async fn read_response(raw: reqwest::Response) -> ApiResponse {
    let status = raw.status().as_u16();
    let headers: BTreeMap<String, String> = raw
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or("<binary>").to_string(),
            )
        })
        .collect();

    match raw.text().await {
        Ok(text) => {
            if !(200..300).contains(&status) {
                warn!("Status {}: {}", status, text);
            }
            ApiResponse::from_body(status, &text, headers)
        }
        Err(e) => {
            error!("Failed to read response body: {}", e);
            ApiResponse::network_error(e.to_string(), code_for(&e))
        }
    }
}

fn transport_failure(method: &HttpMethod, url: &str, e: reqwest::Error) -> ApiResponse {
    error!("{} {} failed: {}", method, url, e);
    ApiResponse::network_error(e.to_string(), code_for(&e))
}

fn code_for(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        TIMEOUT_CODE
    } else {
        NETWORK_ERROR_CODE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use serde_json::json;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base: Option<String>) -> ApiClient {
        ApiClient::new(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_resolve_url() {
        let client = client(Some("http://api.local/".to_string()));
        assert_eq!(client.resolve_url("/faq").unwrap(), "http://api.local/faq");
        assert_eq!(client.resolve_url("faq").unwrap(), "http://api.local/faq");
        assert_eq!(
            client.resolve_url("https://other.local/x").unwrap(),
            "https://other.local/x"
        );
        assert!(self::client(None).resolve_url("/faq").is_err());
    }

    #[tokio::test]
    async fn test_error_statuses_are_ordinary_responses() {
        let router = Router::new().route(
            "/missing",
            get(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "status": false, "message": "Not found" })),
                )
            }),
        );
        let base = serve(router).await;

        let timed = client(Some(base))
            .send(HttpMethod::Get, "/missing", None, &[], None)
            .await
            .unwrap();
        assert_eq!(timed.response.status, 404);
        assert_eq!(timed.response.message(), Some("Not found"));
    }

    #[tokio::test]
    async fn test_authorization_is_sent_verbatim() {
        let router = Router::new().route(
            "/whoami",
            get(|headers: axum::http::HeaderMap| async move {
                let token = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({ "token": token }))
            }),
        );
        let base = serve(router).await;

        let timed = client(Some(base))
            .send(HttpMethod::Get, "/whoami", None, &[], Some("raw-token-123"))
            .await
            .unwrap();
        assert_eq!(timed.response.data["token"], json!("raw-token-123"));
    }

    #[tokio::test]
    async fn test_unreachable_host_becomes_network_error() {
        let timed = client(None)
            .send(HttpMethod::Post, "http://127.0.0.1:1/devices", Some(&json!({})), &[], None)
            .await
            .unwrap();
        assert_eq!(timed.response.status, 600);
        assert_eq!(timed.response.data["code"], json!("NETWORK_ERROR"));
        assert_eq!(timed.response.data["status"], json!(false));
    }

    #[tokio::test]
    async fn test_empty_endpoint_is_rejected() {
        let err = client(None)
            .send(HttpMethod::Get, "  ", None, &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::InvalidArgument { .. }));
    }
}
