//! Top-level connector facade.
//!
//! A [`Connector`] owns one session slot and exposes the full operation
//! surface: eager initialization, API calls, file transfer, the realtime
//! channel, redacted diagnostics, and teardown. Independent connectors never
//! share negotiated state.

use reqwest::{Client, Response};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::{ConfigError, ConfigInfo, ConnectorConfig};
use crate::gateway::{GatewayError, RequestGateway, RequestOptions};
use crate::negotiate::{NegotiateError, SessionCell, SessionInfo};
use crate::stream::client::{self as stream_client, StreamCloser, StreamError, StreamHandle};

/// Errors produced while constructing a connector.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Configuration could not be assembled.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The shared HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Client for the Airlift file-deployment service.
#[derive(Debug)]
pub struct Connector {
    gateway: RequestGateway,
    session: SessionCell,
    active_stream: Mutex<Option<StreamCloser>>,
}

impl Connector {
    /// Creates a connector from explicit configuration.
    pub fn new(config: ConnectorConfig) -> Result<Self, SetupError> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        let session = SessionCell::new();

        Ok(Self {
            gateway: RequestGateway::new(http, config, session.clone()),
            session,
            active_stream: Mutex::new(None),
        })
    }

    /// Creates a connector with credentials sourced from the environment.
    pub fn from_env() -> Result<Self, SetupError> {
        Self::new(ConnectorConfig::from_env()?)
    }

    /// Negotiates a session now instead of on first use.
    ///
    /// Safe to call more than once; an already-resolved session is returned
    /// as-is.
    pub async fn initialize(&self) -> Result<SessionInfo, NegotiateError> {
        let session = self.gateway.ensure_session().await?;
        Ok(session.describe())
    }

    /// Issues an authenticated API call against the resolved API address.
    ///
    /// Negotiates lazily on first use.
    pub async fn api_request(
        &self,
        route_suffix: &str,
        options: RequestOptions,
    ) -> Result<Value, GatewayError> {
        self.gateway.call(route_suffix, options).await
    }

    /// Uploads file content to a destination path on the service.
    pub async fn upload_file(
        &self,
        file_bytes: Vec<u8>,
        file_name: &str,
        destination: &str,
    ) -> Result<Value, GatewayError> {
        self.gateway.upload(file_bytes, file_name, destination).await
    }

    /// Issues an authenticated read for a file path, returning the raw
    /// response for the caller to stream.
    pub async fn download_file(&self, file_path: &str) -> Result<Response, GatewayError> {
        self.gateway.download(file_path).await
    }

    /// Opens the realtime event channel.
    ///
    /// Requires an already-negotiated session: unlike the request
    /// operations, this never negotiates lazily. The connector manages a
    /// single streaming connection, so a previously opened channel is closed
    /// before the new one connects.
    pub async fn connect_stream(&self) -> Result<StreamHandle, StreamError> {
        let session = self
            .session
            .current()
            .await
            .ok_or(StreamError::NotNegotiated)?;

        let mut active = self.active_stream.lock().await;
        if let Some(previous) = active.take() {
            previous.close();
        }

        let handle = stream_client::open(&session).await?;
        *active = Some(handle.closer());
        Ok(handle)
    }

    /// Whether a negotiated session currently exists.
    pub async fn is_connected(&self) -> bool {
        self.session.is_connected().await
    }

    /// Describes the resolved session, if any. The secret is redacted.
    pub async fn describe(&self) -> Option<SessionInfo> {
        Some(self.session.current().await?.describe())
    }

    /// Returns the connector configuration with secrets redacted.
    pub fn config(&self) -> ConfigInfo {
        self.gateway.config().describe()
    }

    /// Closes the realtime channel (if open) and clears the session.
    ///
    /// Disconnecting an already-disconnected connector is a no-op.
    pub async fn disconnect(&self) {
        if let Some(stream) = self.active_stream.lock().await.take() {
            stream.close();
        }
        self.session.teardown().await;
        info!(event = "disconnected");
    }
}
