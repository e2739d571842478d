//! Network abstraction for testability.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::message::{Request, Response};

/// The host's network fetch primitive.
///
/// Any response the network produces, whatever its status, is `Ok`. `Err`
/// means no response could be obtained at all.
#[async_trait]
pub trait Network: Send + Sync {
    /// Sends the request and buffers the complete response.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Default network implementation using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
}

/// Builds a configured HTTP client.
fn build_http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .tcp_keepalive(Duration::from_secs(30))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
}

impl HttpNetwork {
    /// Creates a network backed by a freshly configured client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
        })
    }

    /// Creates a network backed by an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(format!("{}: {e}", request.url)))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        // A body that cannot be read completely is no response at all.
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("{}: {e}", request.url)))?;

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
