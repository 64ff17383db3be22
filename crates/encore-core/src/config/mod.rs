//! Engine and backend configuration.
//!
//! `EngineConfig` carries every timing knob of the sync engine (cache TTLs,
//! debounce windows, retry policy, optimistic grace windows). `BackendConfig`
//! locates the managed backend. `SessionIdentity` says who this client is.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::gateway::Collection;
use crate::retry::RetryPolicy;
use crate::util::{is_http_url, millis, normalize_text_option};

/// Tunables for one sync session. Durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub requests_ttl_ms: u64,
    pub songs_ttl_ms: u64,
    pub settings_ttl_ms: u64,
    pub requests_debounce_ms: u64,
    pub requesters_debounce_ms: u64,
    pub songs_debounce_ms: u64,
    pub settings_debounce_ms: u64,
    pub votes_debounce_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    /// How long a confirmed vote keeps its speculative value on screen
    pub vote_grace_ms: u64,
    /// Upper bound on the lifetime of any pending mutation
    pub pending_max_age_ms: u64,
    /// Fixed timeout for settings reads
    pub settings_timeout_ms: u64,
    pub reconcile_interval_ms: u64,
    /// Change-feed poll interval for gateways without a push channel
    pub poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            requests_ttl_ms: 30_000,
            songs_ttl_ms: 300_000,
            settings_ttl_ms: 60_000,
            requests_debounce_ms: 300,
            requesters_debounce_ms: 300,
            songs_debounce_ms: 500,
            settings_debounce_ms: 500,
            votes_debounce_ms: 200,
            retry_max_attempts: 3,
            retry_base_delay_ms: 1_000,
            vote_grace_ms: 1_500,
            pending_max_age_ms: 15_000,
            settings_timeout_ms: 4_000,
            reconcile_interval_ms: 1_000,
            poll_interval_ms: 2_000,
        }
    }
}

impl EngineConfig {
    /// Reject settings that would disable a bounded-time guarantee.
    pub fn validate(&self) -> Result<()> {
        if self.retry_max_attempts == 0 {
            return Err(Error::InvalidConfiguration(
                "retry_max_attempts must be at least 1".to_string(),
            ));
        }

        let windows = [
            ("requests_debounce_ms", self.requests_debounce_ms),
            ("requesters_debounce_ms", self.requesters_debounce_ms),
            ("songs_debounce_ms", self.songs_debounce_ms),
            ("settings_debounce_ms", self.settings_debounce_ms),
            ("votes_debounce_ms", self.votes_debounce_ms),
            ("pending_max_age_ms", self.pending_max_age_ms),
            ("settings_timeout_ms", self.settings_timeout_ms),
            ("reconcile_interval_ms", self.reconcile_interval_ms),
            ("poll_interval_ms", self.poll_interval_ms),
        ];
        if let Some((field, _)) = windows.iter().find(|(_, value)| *value == 0) {
            return Err(Error::InvalidConfiguration(format!(
                "{field} must be greater than zero"
            )));
        }

        if self.vote_grace_ms >= self.pending_max_age_ms {
            return Err(Error::InvalidConfiguration(
                "vote_grace_ms must be shorter than pending_max_age_ms".to_string(),
            ));
        }

        Ok(())
    }

    pub fn ttl_for(&self, collection: Collection) -> Duration {
        millis(match collection {
            Collection::Requests | Collection::Requesters | Collection::UserVotes => {
                self.requests_ttl_ms
            }
            Collection::Songs => self.songs_ttl_ms,
            Collection::QueueSettings => self.settings_ttl_ms,
        })
    }

    pub fn debounce_for(&self, collection: Collection) -> Duration {
        millis(match collection {
            Collection::Requests => self.requests_debounce_ms,
            Collection::Requesters => self.requesters_debounce_ms,
            Collection::UserVotes => self.votes_debounce_ms,
            Collection::Songs => self.songs_debounce_ms,
            Collection::QueueSettings => self.settings_debounce_ms,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_max_attempts, millis(self.retry_base_delay_ms))
    }
}

/// Location and credentials of the managed backend.
#[derive(Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub supabase_url: String,
    pub anon_key: String,
    /// Signed-in user's access token; operators need one for lock changes
    pub access_token: Option<String>,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("BackendConfig")
            .field("supabase_url", &self.supabase_url)
            .field("anon_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl BackendConfig {
    pub fn new(
        supabase_url: impl Into<String>,
        anon_key: impl Into<String>,
        access_token: Option<String>,
    ) -> Result<Self> {
        let supabase_url = normalize_required_http_url(supabase_url.into(), "supabase_url")?;
        let anon_key = normalize_text_option(Some(anon_key.into())).ok_or_else(|| {
            Error::InvalidConfiguration("supabase_anon_key is required".to_string())
        })?;

        Ok(Self {
            supabase_url,
            anon_key,
            access_token: normalize_text_option(access_token),
        })
    }

    /// Read `SUPABASE_URL`, `SUPABASE_ANON_KEY` and `SUPABASE_ACCESS_TOKEN`.
    ///
    /// Returns `Ok(None)` when neither URL nor key is set.
    pub fn from_env() -> Result<Option<Self>> {
        let url = normalize_text_option(std::env::var("SUPABASE_URL").ok());
        let anon_key = normalize_text_option(std::env::var("SUPABASE_ANON_KEY").ok());
        let access_token = std::env::var("SUPABASE_ACCESS_TOKEN").ok();

        match (url, anon_key) {
            (None, None) => Ok(None),
            (Some(url), Some(anon_key)) => Self::new(url, anon_key, access_token).map(Some),
            _ => Err(Error::InvalidConfiguration(
                "SUPABASE_URL and SUPABASE_ANON_KEY must be set together".to_string(),
            )),
        }
    }

    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.supabase_url)
    }
}

/// What a session is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Guest,
    Operator,
}

/// Identity of the client driving one sync session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    /// Stable voter id used for vote uniqueness on the backend
    pub voter_id: String,
    #[serde(default)]
    pub role: Role,
}

impl SessionIdentity {
    pub fn guest(voter_id: impl Into<String>) -> Self {
        Self {
            voter_id: voter_id.into(),
            role: Role::Guest,
        }
    }

    pub fn operator(voter_id: impl Into<String>) -> Self {
        Self {
            voter_id: voter_id.into(),
            role: Role::Operator,
        }
    }

    pub const fn is_operator(&self) -> bool {
        matches!(self.role, Role::Operator)
    }
}

fn normalize_required_http_url(raw: String, field: &str) -> Result<String> {
    let value = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::InvalidConfiguration(format!("{field} is required")))?;
    if is_http_url(&value) {
        Ok(value.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidConfiguration(format!(
            "{field} must include http:// or https://"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn validate_rejects_zero_attempts_and_windows() {
        let config = EngineConfig {
            retry_max_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            requests_debounce_ms: 0,
            ..Default::default()
        };
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("requests_debounce_ms"));
    }

    #[test]
    fn config_parses_partial_json_with_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"requests_ttl_ms": 5000, "vote_grace_ms": 500}"#).unwrap();
        assert_eq!(config.requests_ttl_ms, 5_000);
        assert_eq!(config.vote_grace_ms, 500);
        assert_eq!(config.retry_max_attempts, 3);
    }

    #[test]
    fn config_rejects_unknown_fields() {
        let error = serde_json::from_str::<EngineConfig>(r#"{"unexpected": 1}"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn collections_have_independent_ttls() {
        let config = EngineConfig::default();
        assert_eq!(config.ttl_for(Collection::Requests), Duration::from_secs(30));
        assert_eq!(config.ttl_for(Collection::Songs), Duration::from_secs(300));
        assert_eq!(
            config.ttl_for(Collection::QueueSettings),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn backend_config_normalizes_url() {
        let config = BackendConfig::new(" https://demo.supabase.co/ ", " anon ", None).unwrap();
        assert_eq!(config.supabase_url, "https://demo.supabase.co");
        assert_eq!(config.rest_url(), "https://demo.supabase.co/rest/v1");
        assert_eq!(config.anon_key, "anon");
    }

    #[test]
    fn backend_config_rejects_invalid_values() {
        assert!(BackendConfig::new("demo.supabase.co", "anon", None).is_err());
        assert!(BackendConfig::new("https://demo.supabase.co", "  ", None).is_err());
    }

    #[test]
    fn backend_config_debug_redacts_keys() {
        let config = BackendConfig::new(
            "https://demo.supabase.co",
            "secret-anon",
            Some("secret-token".to_string()),
        )
        .unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-anon"));
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
