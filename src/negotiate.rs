//! Endpoint negotiation and session state.
//!
//! Negotiation walks the priority-ordered candidate list, probing each
//! endpoint with that candidate's own credential, and resolves the first
//! reachable candidate into a [`Session`]. A [`SessionCell`] shares the
//! resolved session between the request gateway and the realtime channel and
//! funnels concurrent first uses through a single in-flight negotiation.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{Candidate, ConnectorConfig, Credential, EndpointSet};

/// Route probed to decide whether a candidate is reachable. Relative to the
/// candidate's API address, so a probe success also proves the credential is
/// accepted.
const PROBE_ROUTE: &str = "health";

/// Errors produced by session negotiation.
#[derive(Debug, Error)]
pub enum NegotiateError {
    /// Every candidate failed its reachability probe.
    #[error("no reachable endpoint among {attempted} candidate(s)")]
    NoReachableEndpoint { attempted: usize },
}

/// Probes one candidate for reachability.
///
/// Probe failure is ordinary, not exceptional: transport errors, timeouts,
/// and non-success statuses all report `false` and are logged, never raised.
pub async fn probe_candidate(http: &Client, candidate: &Candidate, timeout: Duration) -> bool {
    let url = format!("{}{}", candidate.endpoints.api_url, PROBE_ROUTE);
    let result = http
        .get(url.as_str())
        .timeout(timeout)
        .header(AUTHORIZATION, candidate.credential.authorization_value())
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => true,
        Ok(response) => {
            warn!(event = "probe_failed", url = %url, status = %response.status());
            false
        }
        Err(err) => {
            warn!(event = "probe_failed", url = %url, error = %err);
            false
        }
    }
}

/// Resolves the first reachable candidate into a session.
///
/// Candidates are probed strictly in list order; the first success
/// short-circuits the remaining candidates, so an earlier candidate always
/// wins regardless of a later one's reachability.
pub async fn negotiate(http: &Client, config: &ConnectorConfig) -> Result<Session, NegotiateError> {
    for (index, candidate) in config.candidates.iter().enumerate() {
        if probe_candidate(http, candidate, config.probe_timeout).await {
            let role = if index == 0 { "primary" } else { "fallback" };
            info!(
                event = "candidate_selected",
                role,
                index,
                base_url = %candidate.endpoints.base_url,
                username = %candidate.credential.username,
            );
            return Ok(Session::resolved(
                candidate.endpoints.clone(),
                candidate.credential.clone(),
            ));
        }
    }

    Err(NegotiateError::NoReachableEndpoint {
        attempted: config.candidates.len(),
    })
}

/// Resolved connection state consumed by all operations.
///
/// Created only by successful negotiation; the endpoint set and credential
/// are populated together or not at all.
#[derive(Clone, Debug)]
pub struct Session {
    endpoints: EndpointSet,
    credential: Credential,
    connected: bool,
}

impl Session {
    fn resolved(endpoints: EndpointSet, credential: Credential) -> Self {
        Self {
            endpoints,
            credential,
            connected: true,
        }
    }

    pub fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Diagnostic view of the resolved session. The secret never appears
    /// here.
    pub fn describe(&self) -> SessionInfo {
        SessionInfo {
            base_url: self.endpoints.base_url.clone(),
            api_url: self.endpoints.api_url.clone(),
            stream_url: self.endpoints.stream_url.clone(),
            username: self.credential.username.clone(),
            connected: self.connected,
        }
    }
}

/// Redacted description of a resolved session.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SessionInfo {
    pub base_url: String,
    pub api_url: String,
    pub stream_url: String,
    pub username: String,
    pub connected: bool,
}

/// Shared session slot with a single-flight negotiation guard.
///
/// The lock is held across the in-flight negotiation, so operations that
/// observe "not yet negotiated" concurrently all await the same attempt and
/// resolve to the same session. The slot is written once per successful
/// negotiation; [`SessionCell::teardown`] is the only other writer.
#[derive(Clone, Debug, Default)]
pub struct SessionCell {
    slot: Arc<Mutex<Option<Arc<Session>>>>,
}

impl SessionCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the resolved session, negotiating first if none exists yet.
    pub async fn get_or_negotiate(
        &self,
        http: &Client,
        config: &ConnectorConfig,
    ) -> Result<Arc<Session>, NegotiateError> {
        let mut slot = self.slot.lock().await;
        if let Some(session) = slot.as_ref() {
            return Ok(Arc::clone(session));
        }

        let session = Arc::new(negotiate(http, config).await?);
        *slot = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Returns the current session without negotiating.
    pub async fn current(&self) -> Option<Arc<Session>> {
        self.slot.lock().await.as_ref().map(Arc::clone)
    }

    /// Whether a resolved, connected session currently exists.
    pub async fn is_connected(&self) -> bool {
        self.current().await.is_some_and(|session| session.is_connected())
    }

    /// Clears the resolved session. Tearing down an empty cell is a no-op.
    pub async fn teardown(&self) {
        self.slot.lock().await.take();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::Client;
    use secrecy::SecretString;

    use super::{negotiate, probe_candidate, NegotiateError, SessionCell};
    use crate::config::{Candidate, ConnectorConfig, Credential, EndpointSet};

    fn refused_endpoints() -> EndpointSet {
        // Nothing listens on the discard port; connections are refused
        // immediately.
        EndpointSet {
            base_url: "http://127.0.0.1:9".to_string(),
            api_url: "http://127.0.0.1:9/api/v1/".to_string(),
            stream_url: "ws://127.0.0.1:9/api/v1/ws".to_string(),
        }
    }

    fn refused_candidate(username: &str) -> Candidate {
        Candidate::new(
            refused_endpoints(),
            Credential::new(username, SecretString::new("secret".to_string())),
        )
    }

    fn config(candidates: Vec<Candidate>) -> ConnectorConfig {
        ConnectorConfig::builder()
            .candidates(candidates)
            .probe_timeout(Duration::from_millis(500))
            .build()
            .expect("candidates supplied")
    }

    #[tokio::test]
    async fn probe_reports_false_for_refused_connection() {
        let http = Client::new();
        let candidate = refused_candidate("probe-user");
        assert!(!probe_candidate(&http, &candidate, Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn negotiate_fails_when_every_candidate_is_unreachable() {
        let http = Client::new();
        let config = config(vec![
            refused_candidate("primary"),
            refused_candidate("fallback"),
        ]);

        let error = negotiate(&http, &config)
            .await
            .expect_err("no candidate is reachable");
        assert!(matches!(
            error,
            NegotiateError::NoReachableEndpoint { attempted: 2 }
        ));
    }

    #[tokio::test]
    async fn cell_starts_empty_and_teardown_is_idempotent() {
        let cell = SessionCell::new();
        assert!(cell.current().await.is_none());
        assert!(!cell.is_connected().await);

        cell.teardown().await;
        cell.teardown().await;
        assert!(!cell.is_connected().await);
    }

    #[tokio::test]
    async fn failed_negotiation_leaves_the_cell_empty() {
        let http = Client::new();
        let config = config(vec![refused_candidate("primary")]);
        let cell = SessionCell::new();

        let error = cell
            .get_or_negotiate(&http, &config)
            .await
            .expect_err("negotiation cannot succeed");
        assert!(matches!(
            error,
            NegotiateError::NoReachableEndpoint { attempted: 1 }
        ));
        assert!(cell.current().await.is_none());
    }
}
