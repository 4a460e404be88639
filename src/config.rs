//! Runtime configuration with defaults for every tunable.
//!
//! Durations are expressed in whole seconds or milliseconds so the JSON form stays
//! readable; accessor methods convert them into [`std::time::Duration`] or
//! [`time::Duration`] as needed.

// self
use crate::{_prelude::*, auth::Secret, error::ConfigError};

const MAX_TRIAL_DAYS: i64 = 3_650;
const MAX_LIFETIME_SECS: i64 = 86_400;

/// Top-level configuration consumed by [`crate::flows::Bridge`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
	/// Token refresh tuning.
	pub refresh: RefreshConfig,
	/// Settings cache and demo trial tuning.
	pub settings: SettingsConfig,
	/// Operator-provided demo document server, if any.
	pub demo: Option<DemoServerConfig>,
	/// Editor config builder tuning.
	pub editor: EditorOptions,
	/// Upload pipeline tuning.
	pub upload: UploadConfig,
}
impl BrokerConfig {
	/// Parses a JSON document, reporting the path of the first invalid value.
	pub fn from_json(raw: &str) -> Result<Self> {
		let de = &mut serde_json::Deserializer::from_str(raw);
		let config: Self = serde_path_to_error::deserialize(de).map_err(|e| ConfigError::Parse {
			path: e.path().to_string(),
			message: e.inner().to_string(),
		})?;

		config.validate()?;

		Ok(config)
	}

	/// Rejects values that would make the system unusable.
	pub fn validate(&self) -> Result<()> {
		if !(0..=MAX_LIFETIME_SECS).contains(&self.refresh.safety_margin_secs) {
			return Err(invalid("refresh.safety_margin_secs", "must be between 0 and one day"));
		}
		if self.refresh.timeout_secs == 0 {
			return Err(invalid("refresh.timeout_secs", "must be positive"));
		}
		if self.settings.cache_ttl_secs == 0 || self.settings.cache_ttl_secs > MAX_LIFETIME_SECS as u64
		{
			return Err(invalid("settings.cache_ttl_secs", "must be between 1 second and one day"));
		}
		if !(1..=MAX_TRIAL_DAYS).contains(&self.settings.trial_days) {
			return Err(invalid("settings.trial_days", "must be between 1 and 3650"));
		}
		if self.upload.workers == 0 {
			return Err(invalid("upload.workers", "must be at least 1"));
		}
		if self.upload.max_size == 0 {
			return Err(invalid("upload.max_size", "must be positive"));
		}
		if self.upload.topic.trim().is_empty() {
			return Err(invalid("upload.topic", "must not be empty"));
		}
		if self.upload.token_attempts == 0 {
			return Err(invalid("upload.token_attempts", "must be at least 1"));
		}
		if self.editor.fanout_timeout_ms == 0 || self.editor.download_timeout_ms == 0 {
			return Err(invalid("editor", "timeouts must be positive"));
		}
		if !(1..=MAX_LIFETIME_SECS).contains(&self.editor.config_ttl_secs) {
			return Err(invalid("editor.config_ttl_secs", "must be between 1 second and one day"));
		}

		Url::parse(&self.editor.callback_url)
			.map_err(|source| ConfigError::InvalidUrl { field: "editor.callback_url", source })?;

		if let Some(demo) = &self.demo {
			Url::parse(&demo.address)
				.map_err(|source| ConfigError::InvalidUrl { field: "demo.address", source })?;

			if demo.secret.is_blank() || demo.header.trim().is_empty() {
				return Err(invalid("demo", "secret and header are required"));
			}
		}

		Ok(())
	}
}

/// Token refresh tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
	/// Seconds subtracted from the provider's `expires_in`.
	pub safety_margin_secs: i64,
	/// Deadline for one shared refresh, in seconds.
	pub timeout_secs: u64,
}
impl RefreshConfig {
	/// Returns the margin as a signed duration.
	pub fn safety_margin(&self) -> Duration {
		Duration::seconds(self.safety_margin_secs)
	}

	/// Returns the deadline for one shared refresh.
	pub fn timeout(&self) -> StdDuration {
		StdDuration::from_secs(self.timeout_secs)
	}
}
impl Default for RefreshConfig {
	fn default() -> Self {
		Self { safety_margin_secs: 700, timeout_secs: 30 }
	}
}

/// Settings cache and demo trial tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
	/// Cache entry lifetime in seconds.
	pub cache_ttl_secs: u64,
	/// Demo trial length in days.
	pub trial_days: i64,
}
impl SettingsConfig {
	/// Returns the cache entry lifetime.
	pub fn cache_ttl(&self) -> StdDuration {
		StdDuration::from_secs(self.cache_ttl_secs)
	}

	/// Returns the demo trial window.
	pub fn trial_window(&self) -> Duration {
		Duration::seconds(self.trial_days.saturating_mul(86_400))
	}
}
impl Default for SettingsConfig {
	fn default() -> Self {
		Self { cache_ttl_secs: 60, trial_days: 30 }
	}
}

/// Operator-provided demo document server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DemoServerConfig {
	/// Base address.
	pub address: String,
	/// Shared signing secret.
	pub secret: Secret,
	/// Authorization header name.
	pub header: String,
}

/// Editor config builder tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorOptions {
	/// Deadline for the identity and settings fan-out, in milliseconds.
	pub fanout_timeout_ms: u64,
	/// Deadline for resolving the document download URL, in milliseconds.
	pub download_timeout_ms: u64,
	/// Lifetime of a signed config, in seconds.
	pub config_ttl_secs: i64,
	/// Base URL the document server posts save callbacks to.
	pub callback_url: String,
	/// Language used when the CRM profile has none.
	pub default_language: String,
	/// Country used when the CRM profile has none.
	pub default_country: String,
}
impl EditorOptions {
	/// Returns the fan-out deadline.
	pub fn fanout_timeout(&self) -> StdDuration {
		StdDuration::from_millis(self.fanout_timeout_ms)
	}

	/// Returns the download URL resolution deadline.
	pub fn download_timeout(&self) -> StdDuration {
		StdDuration::from_millis(self.download_timeout_ms)
	}

	/// Returns the signed config lifetime.
	pub fn config_ttl(&self) -> Duration {
		Duration::seconds(self.config_ttl_secs)
	}
}
impl Default for EditorOptions {
	fn default() -> Self {
		Self {
			fanout_timeout_ms: 4_000,
			download_timeout_ms: 4_000,
			config_ttl_secs: 240,
			callback_url: "http://localhost:8080/callback".into(),
			default_language: "en".into(),
			default_country: "US".into(),
		}
	}
}

/// Upload pipeline tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
	/// Largest accepted file in bytes.
	pub max_size: u64,
	/// Per-job deadline in seconds.
	pub timeout_secs: u64,
	/// Deadline for the size probe in seconds.
	pub probe_timeout_secs: u64,
	/// Redeliveries allowed before a job is dead-lettered.
	pub max_retries: u32,
	/// Number of concurrent workers.
	pub workers: usize,
	/// Queue topic carrying upload jobs.
	pub topic: String,
	/// Attempts at resolving a token before the job fails.
	pub token_attempts: u32,
	/// First backoff delay between token attempts, in milliseconds.
	pub backoff_initial_ms: u64,
	/// Backoff ceiling, in milliseconds.
	pub backoff_max_ms: u64,
}
impl UploadConfig {
	/// Returns the per-job deadline.
	pub fn timeout(&self) -> StdDuration {
		StdDuration::from_secs(self.timeout_secs)
	}

	/// Returns the size probe deadline.
	pub fn probe_timeout(&self) -> StdDuration {
		StdDuration::from_secs(self.probe_timeout_secs)
	}

	/// Returns the delay before token attempt `attempt` (1-based), doubling up to the ceiling.
	pub fn backoff(&self, attempt: u32) -> StdDuration {
		let factor = 1_u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
		let millis = self.backoff_initial_ms.saturating_mul(factor).min(self.backoff_max_ms);

		StdDuration::from_millis(millis)
	}
}
impl Default for UploadConfig {
	fn default() -> Self {
		Self {
			max_size: 20_000_000,
			timeout_secs: 120,
			probe_timeout_secs: 7,
			max_retries: 3,
			workers: 3,
			topic: "docbridge-upload".into(),
			token_attempts: 3,
			backoff_initial_ms: 100,
			backoff_max_ms: 5_000,
		}
	}
}

fn invalid(field: &'static str, reason: &str) -> Error {
	ConfigError::InvalidValue { field, reason: reason.into() }.into()
}
