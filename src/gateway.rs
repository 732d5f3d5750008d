//! Authenticated request gateway for the deploy API.
//!
//! Every operation lazily negotiates a session on first use through the
//! shared [`SessionCell`], then issues its request against the resolved
//! addresses with Basic-style authorization. Nothing is retried; failures
//! surface to the caller with enough detail to act on.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::{ConnectorConfig, Credential};
use crate::negotiate::{NegotiateError, Session, SessionCell};

/// Fixed upload route, relative to the resolved base origin.
pub const UPLOAD_ROUTE: &str = "/api/v1/upload";

/// Errors produced by gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Lazy negotiation failed; the operation never reached the wire.
    #[error("negotiation failed: {0}")]
    Negotiation(#[from] NegotiateError),

    /// The service answered an API call with a non-success status.
    #[error("request failed: http {status} {status_text}")]
    RequestFailed {
        status: StatusCode,
        status_text: String,
    },

    /// The service rejected an upload.
    #[error("upload failed: http {status} {status_text}")]
    UploadFailed {
        status: StatusCode,
        status_text: String,
    },

    /// The service rejected a download.
    #[error("download failed: http {status} {status_text}")]
    DownloadFailed {
        status: StatusCode,
        status_text: String,
    },

    /// The response body was not valid JSON.
    #[error("failed to parse response body: {0}")]
    ResponseParse(#[source] serde_json::Error),

    /// The credential could not be converted to a valid header value.
    #[error("invalid authorization header: {0}")]
    InvalidAuthHeader(#[from] InvalidHeaderValue),

    /// The request could not be sent or the body could not be read.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Options for one gateway API call.
///
/// Header precedence: caller-supplied headers override the gateway's
/// authorization and content-type defaults on conflicting names.
#[derive(Clone, Debug)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

impl RequestOptions {
    /// A plain GET with no body.
    pub fn get() -> Self {
        Self::default()
    }

    /// A POST carrying a JSON body.
    pub fn post(body: Value) -> Self {
        Self {
            method: Method::POST,
            headers: HeaderMap::new(),
            body: Some(body),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Adds a header that overrides the gateway default of the same name.
    pub fn header(mut self, name: reqwest::header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Issues authenticated request/response calls against the resolved session.
#[derive(Clone, Debug)]
pub struct RequestGateway {
    http: Client,
    config: ConnectorConfig,
    session: SessionCell,
}

impl RequestGateway {
    pub fn new(http: Client, config: ConnectorConfig, session: SessionCell) -> Self {
        Self {
            http,
            config,
            session,
        }
    }

    pub(crate) fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Returns the resolved session, negotiating on first use.
    pub(crate) async fn ensure_session(&self) -> Result<Arc<Session>, NegotiateError> {
        self.session.get_or_negotiate(&self.http, &self.config).await
    }

    /// Issues an authenticated API call and parses the JSON response body.
    ///
    /// `route_suffix` is appended to the resolved API address verbatim, even
    /// when empty; the service is the source of truth for path validity.
    pub async fn call(
        &self,
        route_suffix: &str,
        options: RequestOptions,
    ) -> Result<Value, GatewayError> {
        let session = self.ensure_session().await?;
        let url = format!("{}{}", session.endpoints().api_url, route_suffix);
        debug!(event = "api_call", method = %options.method, url = %url);

        let headers = merged_headers(session.credential(), &options.headers)?;
        let mut request = self.http.request(options.method, url.as_str()).headers(headers);
        if let Some(body) = options.body.as_ref() {
            request = request.body(body.to_string());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::RequestFailed {
                status,
                status_text: status_text(status),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(GatewayError::ResponseParse)
    }

    /// Uploads file content to a destination path on the service.
    ///
    /// The multipart form carries the bytes as the `file` part and the
    /// destination as the `path` field.
    pub async fn upload(
        &self,
        file_bytes: Vec<u8>,
        file_name: &str,
        destination: &str,
    ) -> Result<Value, GatewayError> {
        let session = self.ensure_session().await?;
        let url = format!("{}{}", session.endpoints().base_url, UPLOAD_ROUTE);
        debug!(
            event = "upload",
            url = %url,
            file_name,
            destination,
            size = file_bytes.len(),
        );

        let form = Form::new()
            .part("file", Part::bytes(file_bytes).file_name(file_name.to_string()))
            .text("path", destination.to_string());

        let response = self
            .http
            .post(url.as_str())
            .header(
                AUTHORIZATION,
                HeaderValue::from_str(&session.credential().authorization_value())?,
            )
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::UploadFailed {
                status,
                status_text: status_text(status),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(GatewayError::ResponseParse)
    }

    /// Issues an authenticated read for a file path.
    ///
    /// Returns the raw response so large bodies can be streamed by the
    /// caller instead of buffered here. `file_path` is appended to the
    /// resolved base address verbatim.
    pub async fn download(&self, file_path: &str) -> Result<Response, GatewayError> {
        let session = self.ensure_session().await?;
        let url = format!("{}{}", session.endpoints().base_url, file_path);
        debug!(event = "download", url = %url);

        let response = self
            .http
            .get(url.as_str())
            .header(
                AUTHORIZATION,
                HeaderValue::from_str(&session.credential().authorization_value())?,
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::DownloadFailed {
                status,
                status_text: status_text(status),
            });
        }
        Ok(response)
    }
}

/// Builds the final header set for an API call: authorization and JSON
/// content-type first, then caller headers replacing any default with the
/// same name.
fn merged_headers(
    credential: &Credential,
    caller: &HeaderMap,
) -> Result<HeaderMap, InvalidHeaderValue> {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&credential.authorization_value())?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (name, value) in caller {
        headers.insert(name.clone(), value.clone());
    }
    Ok(headers)
}

fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("unknown status")
        .to_string()
}

#[cfg(test)]
mod tests {
    use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
    use reqwest::{Method, StatusCode};
    use secrecy::SecretString;
    use serde_json::json;

    use super::{merged_headers, status_text, RequestOptions, UPLOAD_ROUTE};
    use crate::config::Credential;

    fn credential() -> Credential {
        Credential::new("user", SecretString::new("pw".to_string()))
    }

    #[test]
    fn default_options_are_a_bare_get() {
        let options = RequestOptions::get();
        assert_eq!(options.method, Method::GET);
        assert!(options.headers.is_empty());
        assert!(options.body.is_none());
    }

    #[test]
    fn post_options_carry_the_body() {
        let options = RequestOptions::post(json!({"name": "release-7"}));
        assert_eq!(options.method, Method::POST);
        assert_eq!(options.body, Some(json!({"name": "release-7"})));
    }

    #[test]
    fn merged_headers_attach_authorization_and_content_type() {
        let headers = merged_headers(&credential(), &Default::default()).expect("valid header");
        assert_eq!(
            headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
            Some("Basic dXNlcjpwdw==")
        );
        assert_eq!(
            headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
    }

    #[test]
    fn caller_headers_win_on_conflicting_names() {
        let options = RequestOptions::get().header(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-ndjson"),
        );
        let headers = merged_headers(&credential(), &options.headers).expect("valid header");
        assert_eq!(
            headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("application/x-ndjson")
        );
        // The non-conflicting default survives.
        assert!(headers.contains_key(AUTHORIZATION));
    }

    #[test]
    fn status_text_uses_the_canonical_reason() {
        assert_eq!(status_text(StatusCode::UNAUTHORIZED), "Unauthorized");
        assert_eq!(status_text(StatusCode::NOT_FOUND), "Not Found");
    }

    #[test]
    fn upload_route_is_anchored_at_the_base_origin() {
        assert!(UPLOAD_ROUTE.starts_with('/'));
    }
}
