//! Provider strategy hooks that classify upstream failures.
//!
//! Implementations normalize error mapping without tying callers to any
//! particular HTTP client.

// self
use crate::{_prelude::*, error::TransientError};

/// Strategy hook that lets deployments override failure classification.
pub trait ProviderStrategy: Send + Sync {
	/// Maps a token endpoint failure into the crate taxonomy.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;
}

/// Canonical provider error categories used by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Provider rejected the refresh token.
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Failure is temporary and should be retried.
	Transient,
}

/// Context passed to provider strategies when classifying token errors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Preview of the response body for non-JSON payloads.
	pub body_preview: Option<String>,
	/// Indicates whether the failure originated from the network/transport layer.
	pub network_error: bool,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Convenience constructor for transport-level/network failures.
	pub fn network_failure() -> Self {
		Self { network_error: true, ..Self::default() }
	}

	/// Adds an HTTP status code (e.g., 400, 401, 500).
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string returned by the provider.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a body preview for providers that return non-JSON payloads.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}
}

/// Default strategy: structured OAuth fields first, then body hints, then status.
///
/// Network failures are always treated as transient.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if ctx.network_error {
			return ProviderErrorKind::Transient;
		}

		if let Some(kind) =
			classify_oauth_error(ctx.oauth_error.as_deref(), ctx.error_description.as_deref())
		{
			return kind;
		}
		if let Some(kind) = classify_body(ctx.body_preview.as_deref()) {
			return kind;
		}

		classify_status(ctx.http_status)
	}
}

/// Maps a non-success CRM API status onto the crate taxonomy.
///
/// 401 and 403 mean the bearer token was refused; 404 names a missing resource;
/// everything else is treated as a retryable upstream failure.
pub fn classify_api_status(action: &'static str, status: u16) -> Error {
	match status {
		401 | 403 => Error::Unauthorized { reason: format!("{action} answered {status}") },
		404 => Error::NotFound { entity: "resource", id: action.into() },
		400 | 405..=428 | 430..=499 =>
			Error::validation("request", format!("{action} rejected the request with {status}")),
		_ => TransientError::Upstream { action, status }.into(),
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= ProviderErrorContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf: String = body.chars().take(ProviderErrorContext::BODY_PREVIEW_LIMIT).collect();

	buf.push('…');

	buf
}

fn classify_oauth_error(
	oauth_error: Option<&str>,
	error_description: Option<&str>,
) -> Option<ProviderErrorKind> {
	oauth_error
		.and_then(match_exact_value)
		.or_else(|| error_description.and_then(match_exact_value))
		.or_else(|| classify_body(error_description))
}

fn match_exact_value(value: &str) -> Option<ProviderErrorKind> {
	if value.eq_ignore_ascii_case("invalid_grant")
		|| value.eq_ignore_ascii_case("invalid_code")
		|| value.eq_ignore_ascii_case("access_denied")
	{
		Some(ProviderErrorKind::InvalidGrant)
	} else if value.eq_ignore_ascii_case("invalid_client")
		|| value.eq_ignore_ascii_case("unauthorized_client")
	{
		Some(ProviderErrorKind::InvalidClient)
	} else if value.eq_ignore_ascii_case("temporarily_unavailable")
		|| value.eq_ignore_ascii_case("server_error")
	{
		Some(ProviderErrorKind::Transient)
	} else {
		None
	}
}

fn classify_body(body: Option<&str>) -> Option<ProviderErrorKind> {
	let lowered = body?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") || text.contains("invalid_code") =>
			Some(ProviderErrorKind::InvalidGrant),
		text if text.contains("invalid_client") => Some(ProviderErrorKind::InvalidClient),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(ProviderErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400 | 404 | 410) => ProviderErrorKind::InvalidGrant,
		Some(401 | 403) => ProviderErrorKind::InvalidClient,
		_ => ProviderErrorKind::Transient,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn oauth_fields_take_precedence_over_status() {
		let ctx = ProviderErrorContext::default()
			.with_http_status(503)
			.with_oauth_error("invalid_grant");

		assert_eq!(DefaultProviderStrategy.classify_token_error(&ctx), ProviderErrorKind::InvalidGrant);
	}

	#[test]
	fn status_fallback_covers_common_codes() {
		let strategy = DefaultProviderStrategy;
		let kind = |status| {
			strategy.classify_token_error(&ProviderErrorContext::default().with_http_status(status))
		};

		assert_eq!(kind(400), ProviderErrorKind::InvalidGrant);
		assert_eq!(kind(401), ProviderErrorKind::InvalidClient);
		assert_eq!(kind(429), ProviderErrorKind::Transient);
		assert_eq!(kind(502), ProviderErrorKind::Transient);
	}

	#[test]
	fn network_failures_are_transient() {
		let ctx = ProviderErrorContext::network_failure().with_oauth_error("invalid_grant");

		assert_eq!(DefaultProviderStrategy.classify_token_error(&ctx), ProviderErrorKind::Transient);
	}

	#[test]
	fn body_previews_are_truncated() {
		let ctx = ProviderErrorContext::default().with_body_preview("x".repeat(1_000));

		assert_eq!(
			ctx.body_preview.map(|body| body.chars().count()),
			Some(ProviderErrorContext::BODY_PREVIEW_LIMIT + 1)
		);
	}

	#[test]
	fn api_statuses_map_onto_taxonomy() {
		assert!(matches!(classify_api_status("users.me", 401), Error::Unauthorized { .. }));
		assert!(matches!(classify_api_status("files.get", 404), Error::NotFound { .. }));
		assert!(matches!(classify_api_status("files.add", 422), Error::Validation { .. }));
		assert!(classify_api_status("files.add", 429).is_retryable());
		assert!(classify_api_status("files.add", 503).is_retryable());
	}

	#[test]
	fn success_bodies_carrying_invalid_code_revoke_the_grant() {
		let ctx = ProviderErrorContext::default()
			.with_http_status(200)
			.with_body_preview(r#"{"error":"invalid_code"}"#);

		assert_eq!(DefaultProviderStrategy.classify_token_error(&ctx), ProviderErrorKind::InvalidGrant);
	}
}
