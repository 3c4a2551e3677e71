//! reqwest-backed transport
//!
//! Talks JSON to the catalog server. Non-success responses are mapped to
//! `CatalogError::Remote` using the `message` (or `error`) field of the body
//! when the server provides one.

use crate::catalog::filter::FilterQuery;
use crate::catalog::models::{Product, ProductDraft};
use crate::core::config::ApiConfig;
use crate::core::error::{CatalogError, Result};
use crate::session::models::{Credentials, Registration, RegistrationReceipt, Session};
use crate::transport::{Ack, AuthTransport, ProductTransport};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, instrument};
use url::Url;

/// HTTP client for the catalog API
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    session: Option<watch::Receiver<Option<Session>>>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| CatalogError::Configuration(format!("Invalid base_url: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .user_agent(concat!("catalog-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CatalogError::Initialization(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            session: None,
        })
    }

    /// Attach the bearer token of the current session to every request
    pub fn with_session(mut self, session: watch::Receiver<Option<Session>>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join path segments onto the base URL, percent-encoding each segment
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| CatalogError::Configuration("base_url cannot be a base".to_string()))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .session
            .as_ref()
            .and_then(|rx| rx.borrow().as_ref().map(|s| s.token.clone()));

        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| CatalogError::Remote(describe_transport_error(&e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(status = %status, body = %body, "Server returned an error");
        Err(CatalogError::Remote(remote_message(status, &body)))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| CatalogError::Remote(format!("Unexpected response from server: {}", e)))
    }
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "The server did not respond in time".to_string()
    } else if err.is_connect() {
        "Could not connect to the server".to_string()
    } else {
        format!("Request failed: {}", err)
    }
}

/// Pick the most useful message out of an error response
fn remote_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed.message.or(parsed.error) {
            if !message.trim().is_empty() {
                return message;
            }
        }
    }

    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()))
}

#[async_trait]
impl ProductTransport for HttpTransport {
    #[instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<Product>> {
        let url = self.endpoint(&["api", "products"])?;
        self.send_json(self.client.get(url)).await
    }

    #[instrument(skip(self))]
    async fn list_filtered(&self, query: &FilterQuery) -> Result<Vec<Product>> {
        let url = self.endpoint(&["api", "products", "filter"])?;
        self.send_json(self.client.get(url).query(&query.to_pairs())).await
    }

    #[instrument(skip(self, draft), fields(name = %draft.name))]
    async fn create(&self, draft: &ProductDraft) -> Result<Product> {
        let url = self.endpoint(&["api", "products"])?;
        self.send_json(self.client.post(url).json(draft)).await
    }

    #[instrument(skip(self, draft))]
    async fn update(&self, id: &str, draft: &ProductDraft) -> Result<Product> {
        let url = self.endpoint(&["api", "products", id])?;
        self.send_json(self.client.put(url).json(draft)).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<Ack> {
        let url = self.endpoint(&["api", "products", id])?;
        let response = self.send(self.client.delete(url)).await?;
        // Some servers answer 204 with no body
        let body = response.text().await.unwrap_or_default();
        if body.trim().is_empty() {
            return Ok(Ack::default());
        }
        Ok(serde_json::from_str(&body).unwrap_or_default())
    }
}

#[async_trait]
impl AuthTransport for HttpTransport {
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    async fn login(&self, credentials: &Credentials) -> Result<Session> {
        let url = self.endpoint(&["api", "auth", "login"])?;
        self.send_json(self.client.post(url).json(credentials)).await
    }

    #[instrument(skip(self, registration), fields(username = %registration.username))]
    async fn register(&self, registration: &Registration) -> Result<RegistrationReceipt> {
        let url = self.endpoint(&["api", "auth", "register"])?;
        self.send_json(self.client.post(url).json(registration)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(base_url: &str) -> HttpTransport {
        HttpTransport::new(&ApiConfig {
            base_url: base_url.to_string(),
            request_timeout: 5,
            connect_timeout: 1,
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let local = transport("http://localhost:5000/");
        assert_eq!(
            local.endpoint(&["api", "products"]).unwrap().as_str(),
            "http://localhost:5000/api/products"
        );

        let nested = transport("https://shop.example.com/v1");
        assert_eq!(
            nested.endpoint(&["api", "products", "a b/c"]).unwrap().as_str(),
            "https://shop.example.com/v1/api/products/a%20b%2Fc"
        );
    }

    #[test]
    fn test_remote_message_prefers_body() {
        assert_eq!(
            remote_message(StatusCode::NOT_FOUND, r#"{"message":"Product not found"}"#),
            "Product not found"
        );
        assert_eq!(
            remote_message(StatusCode::BAD_REQUEST, r#"{"error":"Invalid price"}"#),
            "Invalid price"
        );
        assert_eq!(remote_message(StatusCode::NOT_FOUND, "<html>"), "Not Found");
        assert_eq!(
            remote_message(StatusCode::INTERNAL_SERVER_ERROR, r#"{"message":"  "}"#),
            "Internal Server Error"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = HttpTransport::new(&ApiConfig {
            base_url: "nope".to_string(),
            request_timeout: 5,
            connect_timeout: 1,
        });
        assert!(matches!(result, Err(CatalogError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_remote_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let transport = transport("http://127.0.0.1:9");
        let err = transport.list_all().await.unwrap_err();
        assert!(matches!(err, CatalogError::Remote(_)));
    }
}
