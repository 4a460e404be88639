//! Typed messages for credential and settings changes published on the queue.
//!
//! Each topic carries exactly one tagged enum. Payloads are decoded once, at the
//! queue boundary, and everything past [`MessageRouter::dispatch`] works with
//! typed values only.

// self
use crate::{
	_prelude::*,
	auth::{Credential, Secret, TenantId, UserKey},
	obs::{self, FlowKind},
	queue::{self, QueueError},
	service::{SettingsService, TokenService},
	settings::Settings,
};

/// Topic carrying [`CredentialMessage`]s.
pub const CREDENTIAL_TOPIC: &str = "docbridge-credentials";
/// Topic carrying [`SettingsMessage`]s.
pub const SETTINGS_TOPIC: &str = "docbridge-settings";
/// Topic carrying [`LifecycleMessage`]s.
pub const LIFECYCLE_TOPIC: &str = "docbridge-lifecycle";

/// Credential changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialMessage {
	/// Stores or replaces a credential.
	Upsert(CredentialPayload),
	/// Removes a credential.
	Delete {
		/// Composite user key.
		user: String,
	},
}

/// Wire form of a credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPayload {
	/// Composite user key.
	pub user: String,
	/// Access token.
	pub access_token: Secret,
	/// Refresh token.
	pub refresh_token: Secret,
	/// Token type.
	pub token_type: String,
	/// Granted scope.
	pub scope: String,
	/// CRM API base URL.
	pub api_domain: String,
	/// Expiry as a unix timestamp.
	pub expires_at_unix: i64,
}
impl CredentialPayload {
	fn into_credential(self) -> Result<Credential> {
		let expires_at = OffsetDateTime::from_unix_timestamp(self.expires_at_unix)
			.map_err(|e| Error::validation("expires_at_unix", e.to_string()))?;

		Ok(Credential::builder(UserKey::new(self.user.trim())?)
			.access_token(self.access_token.into_inner())
			.refresh_token(self.refresh_token.into_inner())
			.token_type(self.token_type)
			.scope(self.scope)
			.api_domain(self.api_domain)
			.expires_at(expires_at)
			.build()?)
	}
}

/// Settings changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettingsMessage {
	/// Stores or replaces a tenant's settings.
	Upsert(SettingsPayload),
	/// Removes a tenant's settings.
	Delete {
		/// Tenant id.
		tenant: String,
	},
}

/// Wire form of tenant settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPayload {
	/// Tenant id.
	pub tenant: String,
	/// Document server address.
	#[serde(default)]
	pub address: Option<String>,
	/// Document server secret.
	#[serde(default)]
	pub secret: Option<Secret>,
	/// Document server auth header.
	#[serde(default)]
	pub header: Option<String>,
	/// Demo trial switch.
	#[serde(default)]
	pub demo_enabled: bool,
}
impl SettingsPayload {
	fn into_settings(self) -> Result<Settings> {
		let mut settings = Settings::new(TenantId::new(self.tenant.trim())?).with_demo(self.demo_enabled);

		settings.address = self.address;
		settings.secret = self.secret;
		settings.header = self.header;

		Ok(settings)
	}
}

/// Installation lifecycle events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleMessage {
	/// The app was removed for a user.
	Uninstall {
		/// CRM user id.
		user: String,
		/// CRM company id.
		tenant: String,
	},
}

/// Routes decoded messages to the owning service.
#[derive(Clone, Debug)]
pub struct MessageRouter {
	tokens: TokenService,
	settings: Arc<SettingsService>,
}
impl MessageRouter {
	/// Creates a router over the two services.
	pub fn new(tokens: TokenService, settings: Arc<SettingsService>) -> Self {
		Self { tokens, settings }
	}

	/// Decodes `payload` according to `topic` and applies it.
	///
	/// Undecodable payloads and unknown topics fail with [`Error::Queue`] before any
	/// service is touched.
	pub async fn dispatch(&self, ctx: &Context, topic: &str, payload: &[u8]) -> Result<()> {
		obs::observe(FlowKind::Message, "dispatch", async {
			match topic {
				CREDENTIAL_TOPIC => self.on_credential(ctx, queue::decode(topic, payload)?).await,
				SETTINGS_TOPIC => self.on_settings(ctx, queue::decode(topic, payload)?).await,
				LIFECYCLE_TOPIC => self.on_lifecycle(ctx, queue::decode(topic, payload)?).await,
				_ => Err(QueueError::UnknownTopic { topic: topic.into() }.into()),
			}
		})
		.await
	}

	/// Applies a credential change.
	pub async fn on_credential(&self, ctx: &Context, message: CredentialMessage) -> Result<()> {
		match message {
			CredentialMessage::Upsert(payload) => {
				let credential = payload.into_credential()?;

				tracing::debug!(user = %credential.id, "applying credential upsert");

				self.tokens.update(ctx, credential).await.map(|_| ())
			},
			CredentialMessage::Delete { user } => self.tokens.delete(ctx, &user).await,
		}
	}

	/// Applies a settings change.
	pub async fn on_settings(&self, ctx: &Context, message: SettingsMessage) -> Result<()> {
		match message {
			SettingsMessage::Upsert(payload) => {
				let settings = payload.into_settings()?;

				tracing::debug!(tenant = %settings.tenant, "applying settings upsert");

				self.settings.update(ctx, settings).await.map(|_| ())
			},
			SettingsMessage::Delete { tenant } => self.settings.delete(ctx, &tenant).await,
		}
	}

	/// Applies a lifecycle event.
	///
	/// Uninstall is idempotent: records that are already gone are not an error.
	pub async fn on_lifecycle(&self, ctx: &Context, message: LifecycleMessage) -> Result<()> {
		match message {
			LifecycleMessage::Uninstall { user, tenant } => {
				let tenant = TenantId::new(tenant.trim())?;
				let user = UserKey::compose(user.trim(), &tenant)?;

				tracing::debug!(user = %user, "uninstalling");

				tolerate_missing(self.tokens.delete(ctx, &user).await)?;
				tolerate_missing(self.settings.delete(ctx, &tenant).await)
			},
		}
	}
}

fn tolerate_missing(result: Result<()>) -> Result<()> {
	match result {
		Err(Error::NotFound { .. }) => Ok(()),
		result => result,
	}
}
