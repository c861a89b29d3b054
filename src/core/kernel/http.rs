use crate::core::errors::ChannelError;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::{StreamExt, TryStreamExt};
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use tracing::{instrument, trace};

/// Response body as a stream of chunks, consumed incrementally by the decoders
pub type BodyStream = BoxStream<'static, Result<Bytes, ChannelError>>;

/// Minimal HTTP response handed to the channel backends
pub struct HttpResponse {
    pub status: StatusCode,
    pub content_length: Option<u64>,
    pub body: BodyStream,
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl HttpResponse {
    pub fn new(status: StatusCode, content_length: Option<u64>, body: BodyStream) -> Self {
        Self {
            status,
            content_length,
            body,
        }
    }

    /// Build a fully buffered response
    pub fn from_bytes(status: StatusCode, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let len = body.len() as u64;
        Self::from_chunks(status, Some(len), vec![body])
    }

    /// Build a response whose body arrives in the given chunks
    pub fn from_chunks(status: StatusCode, content_length: Option<u64>, chunks: Vec<Bytes>) -> Self {
        let body = stream::iter(chunks.into_iter().map(Ok)).boxed();
        Self::new(status, content_length, body)
    }

    /// Read the whole body
    pub async fn bytes(self) -> Result<Vec<u8>, ChannelError> {
        self.body
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
    }

    /// Read the whole body as (lossy) UTF-8
    pub async fn text(self) -> Result<String, ChannelError> {
        let raw = self.bytes().await?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }
}

/// HTTP seam between the channel backends and the network
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a GET request
    async fn get(&self, url: Url) -> Result<HttpResponse, ChannelError>;

    /// Issue a POST request with an `application/x-www-form-urlencoded` body
    async fn post_form(
        &self,
        url: Url,
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, ChannelError>;
}

/// Configuration for the reqwest transport
#[derive(Clone, Debug)]
pub struct TransportConfig {
    pub user_agent: String,
    /// Whole-request timeout. Unset by default: the gateway's long poll
    /// decides how long a request stays open.
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("gae-channel/{}", env!("CARGO_PKG_VERSION")),
            timeout: None,
            connect_timeout: None,
        }
    }
}

impl TransportConfig {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Builder for [`ReqwestTransport`]
#[derive(Debug, Default)]
pub struct TransportBuilder {
    config: TransportConfig,
}

impl TransportBuilder {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    pub fn build(self) -> Result<ReqwestTransport, ChannelError> {
        let mut builder = Client::builder().user_agent(&self.config.user_agent);
        if let Some(timeout) = self.config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = self.config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            ChannelError::NetworkError(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(ReqwestTransport {
            client,
            config: self.config,
        })
    }
}

/// Implementation of [`HttpTransport`] using reqwest
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
    config: TransportConfig,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, ChannelError> {
        TransportBuilder::default().build()
    }

    /// Settings the underlying client was built with
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn into_response(response: reqwest::Response) -> HttpResponse {
        let status = response.status();
        let content_length = response.content_length();
        trace!(%status, ?content_length, "response headers received");
        let body = response.bytes_stream().map_err(ChannelError::from).boxed();
        HttpResponse::new(status, content_length, body)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[instrument(skip(self, url), fields(path = %url.path()))]
    async fn get(&self, url: Url) -> Result<HttpResponse, ChannelError> {
        let response = self.client.get(url).send().await?;
        Ok(Self::into_response(response))
    }

    #[instrument(skip(self, url, form), fields(path = %url.path(), field_count = form.len()))]
    async fn post_form(
        &self,
        url: Url,
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, ChannelError> {
        let response = self.client.post(url).form(form).send().await?;
        Ok(Self::into_response(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chunked_body_is_collected_in_order() {
        let response = HttpResponse::from_chunks(
            StatusCode::OK,
            None,
            vec![Bytes::from_static(b"hel"), Bytes::from_static(b"lo")],
        );
        assert_eq!(response.text().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_body_error_surfaces() {
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(ChannelError::NetworkError("reset".to_string())),
        ])
        .boxed();
        let response = HttpResponse::new(StatusCode::OK, None, body);
        assert!(matches!(
            response.bytes().await,
            Err(ChannelError::NetworkError(_))
        ));
    }

    #[test]
    fn test_default_transport_has_no_timeout() {
        let config = TransportConfig::default();
        assert!(config.timeout.is_none());
        assert!(config.user_agent.starts_with("gae-channel/"));
        assert!(TransportBuilder::new(config).build().is_ok());
    }

    #[test]
    fn test_built_transport_keeps_its_settings() {
        let config = TransportConfig::default()
            .with_connect_timeout(Duration::from_secs(3))
            .with_user_agent("gopaste-client/1.0".to_string());
        let transport = TransportBuilder::new(config).build().unwrap();
        assert_eq!(transport.config().connect_timeout, Some(Duration::from_secs(3)));
        assert_eq!(transport.config().user_agent, "gopaste-client/1.0");
        assert!(transport.config().timeout.is_none());
    }
}
