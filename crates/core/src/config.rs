use std::time::Duration;

use serde::Deserialize;

use crate::retry::ReconnectPolicy;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub supabase_url: String,
    pub anon_key: String,
    pub access_token: Option<String>,
    pub heartbeat_secs: u64,
    pub join_timeout_secs: u64,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    pub regenerate_function: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let supabase_url = lookup("SUPABASE_URL")
            .or_else(|| lookup("TRUSTLINK_SUPABASE_URL"))
            .ok_or(ConfigError::Missing("SUPABASE_URL"))?
            .trim_end_matches('/')
            .to_string();
        let anon_key = lookup("SUPABASE_ANON_KEY")
            .or_else(|| lookup("TRUSTLINK_ANON_KEY"))
            .ok_or(ConfigError::Missing("SUPABASE_ANON_KEY"))?;
        let access_token = lookup("TRUSTLINK_ACCESS_TOKEN").filter(|v| !v.is_empty());
        let heartbeat_secs = lookup("TRUSTLINK_HEARTBEAT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);
        let join_timeout_secs = lookup("TRUSTLINK_JOIN_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);
        let max_reconnect_attempts = lookup("TRUSTLINK_MAX_RECONNECT_ATTEMPTS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);
        let reconnect_base_ms = lookup("TRUSTLINK_RECONNECT_BASE_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1000);
        let reconnect_max_ms = lookup("TRUSTLINK_RECONNECT_MAX_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(10_000);
        let regenerate_function = lookup("TRUSTLINK_REGENERATE_FUNCTION")
            .unwrap_or_else(|| "generate-invoice-pdf".to_string());

        Ok(Self {
            supabase_url,
            anon_key,
            access_token,
            heartbeat_secs,
            join_timeout_secs,
            max_reconnect_attempts,
            reconnect_base_ms,
            reconnect_max_ms,
            regenerate_function,
        })
    }

    pub fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.supabase_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.supabase_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.supabase_url.clone()
        };
        format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            ws_base, self.anon_key
        )
    }

    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.supabase_url)
    }

    pub fn storage_url(&self) -> String {
        format!("{}/storage/v1", self.supabase_url)
    }

    pub fn functions_url(&self) -> String {
        format!("{}/functions/v1", self.supabase_url)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.max_reconnect_attempts,
            Duration::from_millis(self.reconnect_base_ms),
            Duration::from_millis(self.reconnect_max_ms),
        )
    }
}
