//! Decrypted CRM credentials, their builder, and the provider's token set.

// self
use crate::{_prelude::*, auth::{Secret, UserKey}, error::TransientError};

/// Errors produced by [`CredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CredentialBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no refresh token value was provided.
	#[error("Refresh token is required.")]
	MissingRefreshToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// Issued when the relative expiry lands outside the representable range.
	#[error("Expiry is out of range.")]
	ExpiryOutOfRange,
}
impl From<CredentialBuilderError> for Error {
	fn from(e: CredentialBuilderError) -> Self {
		let field = match e {
			CredentialBuilderError::MissingAccessToken => "access_token",
			CredentialBuilderError::MissingRefreshToken => "refresh_token",
			CredentialBuilderError::MissingExpiry | CredentialBuilderError::ExpiryOutOfRange =>
				"expires_at",
		};

		Error::validation(field, e.to_string())
	}
}

/// OAuth credential for one CRM user, held in decrypted form.
///
/// Only [`crate::service::TokenService`] turns this into a persisted record, and it
/// always encrypts both tokens on the way.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	/// Composite user key.
	pub id: UserKey,
	/// Bearer token for CRM API calls.
	pub access_token: Secret,
	/// Token used to obtain a new access token.
	pub refresh_token: Secret,
	/// Token type reported by the provider, usually `Bearer`.
	pub token_type: String,
	/// Granted scope string as reported by the provider.
	pub scope: String,
	/// Base URL of the tenant's CRM API.
	pub api_domain: String,
	/// Instant after which the access token must be refreshed.
	pub expires_at: OffsetDateTime,
}
impl Credential {
	/// Returns a builder for the provided user key.
	pub fn builder(id: UserKey) -> CredentialBuilder {
		CredentialBuilder::new(id)
	}

	/// Builds a credential from a freshly issued token set.
	///
	/// The expiry is pulled forward by `safety_margin` so refreshes happen before the
	/// provider starts rejecting the token.
	pub fn from_token_set(
		id: UserKey,
		tokens: TokenSet,
		issued_at: OffsetDateTime,
		safety_margin: Duration,
	) -> Result<Self> {
		tokens.validate()?;

		let expires_at = issued_at
			.checked_add(Duration::seconds(tokens.expires_in))
			.and_then(|instant| instant.checked_sub(safety_margin))
			.ok_or_else(|| TransientError::TokenEndpoint {
				message: format!("token response carries expires_in={}", tokens.expires_in),
				status: None,
				retry_after: None,
			})?;

		Ok(Self {
			id,
			access_token: tokens.access_token,
			refresh_token: tokens.refresh_token,
			token_type: tokens.token_type,
			scope: tokens.scope,
			api_domain: tokens.api_domain,
			expires_at,
		})
	}

	/// Returns `true` while the access token is still usable at `now`.
	pub fn is_fresh_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at > now
	}

	/// Returns `true` once the access token must be refreshed.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		!self.is_fresh_at(now)
	}

	/// Checks that every required field carries a value.
	pub fn validate(&self) -> Result<()> {
		if self.access_token.is_blank() {
			return Err(Error::validation("access_token", "must not be empty"));
		}
		if self.refresh_token.is_blank() {
			return Err(Error::validation("refresh_token", "must not be empty"));
		}
		if self.token_type.trim().is_empty() {
			return Err(Error::validation("token_type", "must not be empty"));
		}
		if self.scope.trim().is_empty() {
			return Err(Error::validation("scope", "must not be empty"));
		}
		if self.api_domain.trim().is_empty() {
			return Err(Error::validation("api_domain", "must not be empty"));
		}

		Ok(())
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("id", &self.id)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("token_type", &self.token_type)
			.field("scope", &self.scope)
			.field("api_domain", &self.api_domain)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`Credential`].
#[derive(Clone, Debug)]
pub struct CredentialBuilder {
	id: UserKey,
	access_token: Option<Secret>,
	refresh_token: Option<Secret>,
	token_type: String,
	scope: String,
	api_domain: String,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl CredentialBuilder {
	fn new(id: UserKey) -> Self {
		Self {
			id,
			access_token: None,
			refresh_token: None,
			token_type: "Bearer".into(),
			scope: String::new(),
			api_domain: String::new(),
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(Secret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(Secret::new(token));

		self
	}

	/// Overrides the token type (defaults to `Bearer`).
	pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = token_type.into();

		self
	}

	/// Sets the granted scope string.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = scope.into();

		self
	}

	/// Sets the tenant's CRM API base URL.
	pub fn api_domain(mut self, api_domain: impl Into<String>) -> Self {
		self.api_domain = api_domain.into();

		self
	}

	/// Sets the instant the tokens were issued; relative expiries count from here.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces a [`Credential`].
	pub fn build(self) -> Result<Credential, CredentialBuilderError> {
		let access_token = self.access_token.ok_or(CredentialBuilderError::MissingAccessToken)?;
		let refresh_token =
			self.refresh_token.ok_or(CredentialBuilderError::MissingRefreshToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) =>
				issued_at.checked_add(delta).ok_or(CredentialBuilderError::ExpiryOutOfRange)?,
			(None, None) => return Err(CredentialBuilderError::MissingExpiry),
		};

		Ok(Credential {
			id: self.id,
			access_token,
			refresh_token,
			token_type: self.token_type,
			scope: self.scope,
			api_domain: self.api_domain,
			expires_at,
		})
	}
}

/// Token set returned by the CRM's OAuth endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
	/// New access token.
	pub access_token: Secret,
	/// New (possibly rotated) refresh token.
	pub refresh_token: Secret,
	/// Token type, usually `Bearer`.
	pub token_type: String,
	/// Granted scope string.
	pub scope: String,
	/// Base URL of the tenant's CRM API.
	pub api_domain: String,
	/// Lifetime of the access token in seconds.
	pub expires_in: i64,
}
impl TokenSet {
	/// Rejects responses with missing fields or a non-positive lifetime.
	pub fn validate(&self) -> Result<()> {
		let missing = if self.access_token.is_blank() {
			Some("access_token")
		} else if self.refresh_token.is_blank() {
			Some("refresh_token")
		} else if self.token_type.trim().is_empty() {
			Some("token_type")
		} else if self.scope.trim().is_empty() {
			Some("scope")
		} else if self.api_domain.trim().is_empty() {
			Some("api_domain")
		} else {
			None
		};

		if let Some(field) = missing {
			return Err(TransientError::TokenEndpoint {
				message: format!("token response is missing {field}"),
				status: None,
				retry_after: None,
			}
			.into());
		}
		if self.expires_in < 1 {
			return Err(TransientError::TokenEndpoint {
				message: format!("token response carries expires_in={}", self.expires_in),
				status: None,
				retry_after: None,
			}
			.into());
		}

		Ok(())
	}
}
impl Debug for TokenSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenSet")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("token_type", &self.token_type)
			.field("scope", &self.scope)
			.field("api_domain", &self.api_domain)
			.field("expires_in", &self.expires_in)
			.finish()
	}
}
