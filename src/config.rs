//! Connector configuration: candidate endpoints, credentials, and defaults.
//!
//! The hosted and local endpoint addresses ship as constants; the matching
//! secrets never live in source. Callers either pass credentials explicitly
//! through the builder or load them from the environment with
//! [`ConnectorConfig::from_env`].

use std::env;
use std::fmt;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;

/// Hosted origin used for uploads and raw file downloads.
pub const HOSTED_BASE_URL: &str = "https://deploy.airlift.dev";
/// Hosted REST prefix. Route suffixes are appended verbatim.
pub const HOSTED_API_URL: &str = "https://deploy.airlift.dev/api/v1/";
/// Hosted realtime websocket endpoint.
pub const HOSTED_STREAM_URL: &str = "wss://deploy.airlift.dev/api/v1/ws";

/// Local development origin.
pub const LOCAL_BASE_URL: &str = "http://localhost:8420";
/// Local development REST prefix.
pub const LOCAL_API_URL: &str = "http://localhost:8420/api/v1/";
/// Local development websocket endpoint.
pub const LOCAL_STREAM_URL: &str = "ws://localhost:8420/api/v1/ws";

/// Environment variable carrying the hosted username.
pub const ENV_USERNAME: &str = "AIRLIFT_USERNAME";
/// Environment variable carrying the hosted secret.
pub const ENV_SECRET: &str = "AIRLIFT_SECRET";
/// Environment variable carrying the local-candidate username.
pub const ENV_LOCAL_USERNAME: &str = "AIRLIFT_LOCAL_USERNAME";
/// Environment variable carrying the local-candidate secret.
pub const ENV_LOCAL_SECRET: &str = "AIRLIFT_LOCAL_SECRET";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConnectorDefaults;

impl ConnectorDefaults {
    /// Upper bound for a single reachability probe. One unreachable
    /// candidate must not stall negotiation indefinitely.
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
    /// TCP connect timeout for the shared HTTP client.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Set of service addresses used by one candidate.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct EndpointSet {
    /// Origin for uploads and raw file downloads.
    pub base_url: String,
    /// REST prefix; route suffixes are appended without validation.
    pub api_url: String,
    /// Realtime websocket endpoint.
    pub stream_url: String,
}

impl EndpointSet {
    /// The hosted deploy-service addresses.
    pub fn hosted() -> Self {
        Self {
            base_url: HOSTED_BASE_URL.to_string(),
            api_url: HOSTED_API_URL.to_string(),
            stream_url: HOSTED_STREAM_URL.to_string(),
        }
    }

    /// The local development addresses.
    pub fn local() -> Self {
        Self {
            base_url: LOCAL_BASE_URL.to_string(),
            api_url: LOCAL_API_URL.to_string(),
            stream_url: LOCAL_STREAM_URL.to_string(),
        }
    }
}

/// Username/secret pair for Basic-style authorization.
#[derive(Clone)]
pub struct Credential {
    /// Account name; appears in diagnostics.
    pub username: String,
    /// Account secret; never appears in diagnostics or `Debug` output.
    pub secret: SecretString,
}

impl Credential {
    pub fn new(username: impl Into<String>, secret: SecretString) -> Self {
        Self {
            username: username.into(),
            secret,
        }
    }

    /// Encodes `username:secret` the way the service expects it, both in the
    /// `Authorization` header and in the stream auth query parameter.
    pub fn basic_token(&self) -> String {
        BASE64_STANDARD.encode(format!(
            "{}:{}",
            self.username,
            self.secret.expose_secret()
        ))
    }

    /// Full `Authorization` header value.
    pub fn authorization_value(&self) -> String {
        format!("Basic {}", self.basic_token())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// One endpoint set plus the credential used to probe and operate it.
///
/// Every candidate is probed with its own credential; nothing special-cases
/// primary versus fallback beyond list order.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub endpoints: EndpointSet,
    pub credential: Credential,
}

impl Candidate {
    pub fn new(endpoints: EndpointSet, credential: Credential) -> Self {
        Self {
            endpoints,
            credential,
        }
    }

    /// Candidate for the hosted service addresses.
    pub fn hosted(credential: Credential) -> Self {
        Self::new(EndpointSet::hosted(), credential)
    }

    /// Candidate for the local development addresses.
    pub fn local(credential: Credential) -> Self {
        Self::new(EndpointSet::local(), credential)
    }
}

/// Connector configuration produced by [`ConnectorConfigBuilder`].
///
/// The candidate list is priority-ordered and non-empty; negotiation tries
/// earlier entries first.
#[derive(Clone, Debug)]
pub struct ConnectorConfig {
    pub candidates: Vec<Candidate>,
    pub probe_timeout: Duration,
    pub connect_timeout: Duration,
}

impl ConnectorConfig {
    pub fn builder() -> ConnectorConfigBuilder {
        ConnectorConfigBuilder::default()
    }

    /// Builds the default hosted-then-local candidate pair with credentials
    /// sourced from the environment.
    ///
    /// `AIRLIFT_USERNAME`/`AIRLIFT_SECRET` are required and cover the hosted
    /// candidate. `AIRLIFT_LOCAL_USERNAME`/`AIRLIFT_LOCAL_SECRET` override
    /// the local candidate's credential; when unset the hosted credential is
    /// reused.
    pub fn from_env() -> Result<Self, ConfigError> {
        let username = env::var(ENV_USERNAME).map_err(|_| ConfigError::MissingEnv(ENV_USERNAME))?;
        let secret = env::var(ENV_SECRET).map_err(|_| ConfigError::MissingEnv(ENV_SECRET))?;
        let hosted = Credential::new(username, SecretString::new(secret));

        let local = match (env::var(ENV_LOCAL_USERNAME), env::var(ENV_LOCAL_SECRET)) {
            (Ok(username), Ok(secret)) => Credential::new(username, SecretString::new(secret)),
            _ => hosted.clone(),
        };

        Self::builder()
            .candidate(Candidate::hosted(hosted))
            .candidate(Candidate::local(local))
            .build()
    }

    /// Redacted view of the configuration for diagnostics.
    pub fn describe(&self) -> ConfigInfo {
        ConfigInfo {
            candidates: self
                .candidates
                .iter()
                .map(|candidate| CandidateInfo {
                    base_url: candidate.endpoints.base_url.clone(),
                    api_url: candidate.endpoints.api_url.clone(),
                    stream_url: candidate.endpoints.stream_url.clone(),
                    username: candidate.credential.username.clone(),
                })
                .collect(),
            probe_timeout_ms: self.probe_timeout.as_millis() as u64,
            connect_timeout_ms: self.connect_timeout.as_millis() as u64,
        }
    }
}

/// Builder for [`ConnectorConfig`].
///
/// Caller-supplied values win over defaults; unset fields fall back to
/// [`ConnectorDefaults`].
#[derive(Debug, Default)]
pub struct ConnectorConfigBuilder {
    candidates: Vec<Candidate>,
    probe_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
}

impl ConnectorConfigBuilder {
    /// Appends one candidate; earlier candidates take negotiation priority.
    pub fn candidate(mut self, candidate: Candidate) -> Self {
        self.candidates.push(candidate);
        self
    }

    /// Appends candidates in iteration order.
    pub fn candidates(mut self, candidates: impl IntoIterator<Item = Candidate>) -> Self {
        self.candidates.extend(candidates);
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Validates and produces the configuration.
    pub fn build(self) -> Result<ConnectorConfig, ConfigError> {
        if self.candidates.is_empty() {
            return Err(ConfigError::NoCandidates);
        }
        Ok(ConnectorConfig {
            candidates: self.candidates,
            probe_timeout: self.probe_timeout.unwrap_or(ConnectorDefaults::PROBE_TIMEOUT),
            connect_timeout: self
                .connect_timeout
                .unwrap_or(ConnectorDefaults::CONNECT_TIMEOUT),
        })
    }
}

/// Errors produced while assembling configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The candidate list is empty; at least the primary candidate is
    /// required.
    #[error("candidate list is empty; at least one candidate is required")]
    NoCandidates,

    /// A required environment variable is unset.
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),
}

/// Redacted view of one candidate.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CandidateInfo {
    pub base_url: String,
    pub api_url: String,
    pub stream_url: String,
    pub username: String,
}

/// Redacted view of the whole configuration.
#[derive(Clone, Debug, Serialize)]
pub struct ConfigInfo {
    pub candidates: Vec<CandidateInfo>,
    pub probe_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use secrecy::SecretString;

    use super::{
        Candidate, ConfigError, ConnectorConfig, ConnectorDefaults, Credential, EndpointSet,
        HOSTED_API_URL, LOCAL_STREAM_URL,
    };

    fn credential() -> Credential {
        Credential::new("user", SecretString::new("pw".to_string()))
    }

    #[test]
    fn basic_token_encodes_username_and_secret() {
        assert_eq!(credential().basic_token(), "dXNlcjpwdw==");
    }

    #[test]
    fn authorization_value_carries_basic_scheme() {
        assert_eq!(credential().authorization_value(), "Basic dXNlcjpwdw==");
    }

    #[test]
    fn credential_debug_never_prints_the_secret() {
        let formatted = format!("{:?}", credential());
        assert!(formatted.contains("user"));
        assert!(!formatted.contains("pw\""));
        assert!(formatted.contains("[REDACTED]"));
    }

    #[test]
    fn hosted_and_local_candidates_use_fixed_endpoints() {
        let hosted = Candidate::hosted(credential());
        assert_eq!(hosted.endpoints.api_url, HOSTED_API_URL);

        let local = Candidate::local(credential());
        assert_eq!(local.endpoints.stream_url, LOCAL_STREAM_URL);
    }

    #[test]
    fn builder_rejects_empty_candidate_list() {
        let result = ConnectorConfig::builder().build();
        assert!(matches!(result, Err(ConfigError::NoCandidates)));
    }

    #[test]
    fn builder_applies_defaults_when_unset() {
        let config = ConnectorConfig::builder()
            .candidate(Candidate::hosted(credential()))
            .build()
            .expect("one candidate suffices");
        assert_eq!(config.probe_timeout, ConnectorDefaults::PROBE_TIMEOUT);
        assert_eq!(config.connect_timeout, ConnectorDefaults::CONNECT_TIMEOUT);
    }

    #[test]
    fn builder_prefers_caller_values_over_defaults() {
        let config = ConnectorConfig::builder()
            .candidate(Candidate::local(credential()))
            .probe_timeout(Duration::from_millis(250))
            .build()
            .expect("one candidate suffices");
        assert_eq!(config.probe_timeout, Duration::from_millis(250));
        assert_eq!(config.connect_timeout, ConnectorDefaults::CONNECT_TIMEOUT);
    }

    #[test]
    fn candidate_order_is_preserved() {
        let config = ConnectorConfig::builder()
            .candidates([Candidate::hosted(credential()), Candidate::local(credential())])
            .build()
            .expect("two candidates");
        assert_eq!(config.candidates[0].endpoints, EndpointSet::hosted());
        assert_eq!(config.candidates[1].endpoints, EndpointSet::local());
    }

    #[test]
    fn describe_redacts_the_secret() {
        let config = ConnectorConfig::builder()
            .candidate(Candidate::hosted(credential()))
            .build()
            .expect("one candidate suffices");

        let info = config.describe();
        assert_eq!(info.candidates[0].username, "user");

        let serialized = serde_json::to_string(&info).expect("serialize config info");
        assert!(!serialized.contains("pw"));

        let debug = format!("{config:?}");
        assert!(!debug.contains("pw\""));
    }
}
