//! Crate-level error types shared across services, flows, providers, and stores.

// self
use crate::{_prelude::*, auth::IdentifierError, crypto::CryptoError, queue::QueueError};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Arc<dyn StdError + Send + Sync>;

/// Canonical error exposed by public APIs.
///
/// Every variant is cheap to clone so a single coalesced result can be handed to
/// all callers waiting on the same operation.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Encryption or decryption failure.
	#[error(transparent)]
	Crypto(#[from] CryptoError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Queue failure while publishing or decoding a message.
	#[error(transparent)]
	Queue(#[from] QueueError),

	/// Caller-supplied input failed validation.
	#[error("Invalid {field}: {reason}.")]
	Validation {
		/// Name of the offending field.
		field: &'static str,
		/// Human-readable reason.
		reason: String,
	},
	/// Requested record does not exist.
	#[error("No {entity} found for `{id}`.")]
	NotFound {
		/// Entity kind (credential, settings).
		entity: &'static str,
		/// Identifier that was looked up.
		id: String,
	},
	/// The operation's context was cancelled.
	#[error("Operation was cancelled.")]
	Cancelled,
	/// The operation's deadline elapsed.
	#[error("Operation deadline exceeded.")]
	DeadlineExceeded,
	/// Provider rejected the refresh token.
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider- or crate-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider- or crate-supplied reason string.
		reason: String,
	},
	/// The CRM rejected the bearer token.
	#[error("CRM rejected the access token: {reason}.")]
	Unauthorized {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// A signed payload could not be produced or verified.
	#[error("Signature failure: {reason}.")]
	Signature {
		/// Underlying reason.
		reason: String,
	},
	/// File extension is not a known document format.
	#[error("File extension `{extension}` is not supported.")]
	UnsupportedFormat {
		/// Lowercased extension without the leading dot.
		extension: String,
	},
	/// No usable document server settings exist for the tenant.
	#[error("No document server settings found for tenant `{tenant}`.")]
	NoSettings {
		/// Tenant identifier.
		tenant: String,
	},
	/// File exceeds the configured upload ceiling.
	#[error("File size {size} exceeds the {limit} byte limit.")]
	FileTooLarge {
		/// Reported size in bytes.
		size: u64,
		/// Configured ceiling in bytes.
		limit: u64,
	},
}
impl Error {
	/// Builds a [`Error::Validation`] value.
	pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
		Self::Validation { field, reason: reason.into() }
	}

	/// Returns the coarse category of the error.
	pub fn class(&self) -> ErrorClass {
		match self {
			Self::Validation { .. } | Self::UnsupportedFormat { .. } | Self::FileTooLarge { .. } =>
				ErrorClass::Validation,
			Self::Cancelled | Self::DeadlineExceeded => ErrorClass::Timeout,
			Self::InvalidGrant { .. }
			| Self::InvalidClient { .. }
			| Self::Unauthorized { .. }
			| Self::Signature { .. } => ErrorClass::Authorization,
			Self::NotFound { .. } | Self::NoSettings { .. } => ErrorClass::NotFound,
			Self::Storage(crate::store::StoreError::NotFound { .. }) => ErrorClass::NotFound,
			Self::Storage(crate::store::StoreError::Backend { .. })
			| Self::Transient(_)
			| Self::Transport(_) => ErrorClass::Upstream,
			Self::Storage(_) | Self::Crypto(_) | Self::Config(_) | Self::Queue(_) =>
				ErrorClass::Internal,
		}
	}

	/// Returns `true` for cancellation and deadline errors.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Cancelled | Self::DeadlineExceeded)
	}

	/// Returns `true` when retrying the same operation later may succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(self.class(), ErrorClass::Upstream | ErrorClass::Timeout)
	}
}
impl From<IdentifierError> for Error {
	fn from(e: IdentifierError) -> Self {
		Self::Validation { field: e.kind(), reason: e.to_string() }
	}
}

/// Coarse error categories used for logging and for mapping onto HTTP responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
	/// Malformed or out-of-range input.
	Validation,
	/// Cancellation or deadline expiry.
	Timeout,
	/// Authentication or authorization failure.
	Authorization,
	/// Missing record.
	NotFound,
	/// Upstream service or transport failure.
	Upstream,
	/// Local failure.
	Internal,
}
impl ErrorClass {
	/// Returns the HTTP status code an outer surface should answer with.
	pub const fn http_status(self) -> u16 {
		match self {
			Self::Validation => 400,
			Self::Timeout => 408,
			Self::Authorization => 403,
			Self::NotFound => 404,
			Self::Upstream => 502,
			Self::Internal => 500,
		}
	}

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Validation => "validation",
			Self::Timeout => "timeout",
			Self::Authorization => "authorization",
			Self::NotFound => "not_found",
			Self::Upstream => "upstream",
			Self::Internal => "internal",
		}
	}
}

/// Configuration and wiring failures.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error("HTTP request could not be constructed.")]
	HttpRequest {
		/// Underlying request builder failure.
		#[source]
		source: BoxError,
	},
	/// A configured URL could not be parsed.
	#[error("Configured {field} is not a valid URL.")]
	InvalidUrl {
		/// Name of the offending setting.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A configuration value is out of range or inconsistent.
	#[error("Configuration value {field} is invalid: {reason}.")]
	InvalidValue {
		/// Name of the offending setting.
		field: &'static str,
		/// Human-readable reason.
		reason: String,
	},
	/// The configuration document could not be decoded.
	#[error("Configuration could not be parsed at `{path}`: {message}.")]
	Parse {
		/// JSON path of the failing value.
		path: String,
		/// Decoder message.
		message: String,
	},
	/// The demo trial is active but the operator never configured demo credentials.
	#[error("Demo mode is active but no demo document server is configured.")]
	MissingDemoServer,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}

	/// Wraps a request construction failure inside [`ConfigError`].
	pub fn http_request(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpRequest { source: Arc::new(src) }
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Clone, Debug, ThisError)]
pub enum TransientError {
	/// Token endpoint returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or crate-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with a body that could not be parsed.
	#[error("Token endpoint returned malformed JSON: {message}.")]
	TokenResponseParse {
		/// Parser message including the failing path.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// A CRM or document server call failed with a retryable status.
	#[error("Upstream call `{action}` failed with status {status}.")]
	Upstream {
		/// Short label for the failing call.
		action: &'static str,
		/// HTTP status code.
		status: u16,
	},
	/// A CRM response body did not match the expected shape.
	#[error("Upstream call `{action}` returned a malformed response: {message}.")]
	MalformedResponse {
		/// Short label for the failing call.
		action: &'static str,
		/// Decoder message.
		message: String,
	},
}

/// Transport-level failures (network, TLS).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling an upstream service.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Arc::new(src) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::StoreError;

	#[test]
	fn classes_map_to_expected_statuses() {
		let cases = [
			(Error::validation("id", "blank"), 400),
			(Error::DeadlineExceeded, 408),
			(Error::InvalidGrant { reason: "revoked".into() }, 403),
			(Error::NotFound { entity: "credential", id: "u-1".into() }, 404),
			(TransientError::Upstream { action: "users.me", status: 503 }.into(), 502),
			(ConfigError::MissingDemoServer.into(), 500),
		];

		for (error, status) in cases {
			assert_eq!(error.class().http_status(), status, "Unexpected status for {error}.");
		}
	}

	#[test]
	fn retryability_follows_class() {
		assert!(Error::from(TransientError::Upstream { action: "files", status: 502 }).is_retryable());
		assert!(Error::Cancelled.is_retryable());
		assert!(Error::from(StoreError::Backend { message: "down".into() }).is_retryable());
		assert!(!Error::FileTooLarge { size: 30, limit: 20 }.is_retryable());
		assert!(!Error::InvalidGrant { reason: "expired".into() }.is_retryable());
		assert!(!Error::from(StoreError::Serialization { message: "bad".into() }).is_retryable());
	}

	#[test]
	fn store_not_found_is_classified_as_not_found() {
		let error = Error::from(StoreError::NotFound { key: "tenant-1".into() });

		assert_eq!(error.class(), ErrorClass::NotFound);
		assert!(!error.is_timeout());
	}

	#[test]
	fn identifier_errors_become_validation_errors() {
		let error = Error::from(IdentifierError::Empty { kind: "User" });

		assert!(matches!(error, Error::Validation { field: "User", .. }));
	}
}
