//! OAuth refresh-token exchange against the CRM token endpoint.
//!
//! The CRM answers refresh requests with a standard token response plus an
//! `api_domain` field naming the tenant's API host; [`CrmTokenFields`] carries
//! that extra field through the `oauth2` client.

pub use oauth2;

// crates.io
use oauth2::{
	ClientId, ClientSecret, EndpointNotSet, EndpointSet, ExtraTokenFields, HttpClientError,
	RefreshToken, RequestTokenError, StandardRevocableToken, StandardTokenResponse, TokenResponse,
	TokenUrl,
	basic::{
		BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
		BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::{Secret, TokenSet},
	error::{ConfigError, TransientError, TransportError},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot},
	provider::{
		DefaultProviderStrategy, ProviderErrorContext, ProviderErrorKind, ProviderFuture,
		ProviderStrategy, TokenRefreshProvider,
	},
};

/// Token response returned by the CRM token endpoint.
pub type CrmTokenResponse = StandardTokenResponse<CrmTokenFields, BasicTokenType>;

type CrmOAuthClient = oauth2::Client<
	BasicErrorResponse,
	CrmTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type RefreshError = RequestTokenError<HttpClientError<ReqwestError>, BasicErrorResponse>;

/// Non-standard fields the CRM adds to token responses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmTokenFields {
	/// Base URL of the tenant's CRM API.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub api_domain: Option<String>,
}
impl ExtraTokenFields for CrmTokenFields {}

/// [`TokenRefreshProvider`] backed by the `oauth2` crate and reqwest.
#[derive(Clone)]
pub struct OAuthRefreshProvider {
	client: CrmOAuthClient,
	http: ReqwestHttpClient,
	strategy: Arc<dyn ProviderStrategy>,
}
impl OAuthRefreshProvider {
	/// Builds a provider for `token_url` authenticating as `client_id`.
	pub fn new(token_url: &Url, client_id: &str, client_secret: &Secret) -> Result<Self> {
		Ok(Self::with_http_client(token_url, client_id, client_secret, ReqwestHttpClient::new()?))
	}

	/// Builds a provider that sends requests through `http`.
	pub fn with_http_client(
		token_url: &Url,
		client_id: &str,
		client_secret: &Secret,
		http: ReqwestHttpClient,
	) -> Self {
		let client = oauth2::Client::new(ClientId::new(client_id.to_owned()))
			.set_client_secret(ClientSecret::new(client_secret.expose().to_owned()))
			.set_token_uri(TokenUrl::from_url(token_url.clone()));

		Self { client, http, strategy: Arc::new(DefaultProviderStrategy) }
	}

	/// Replaces the error classification strategy.
	pub fn with_strategy(mut self, strategy: Arc<dyn ProviderStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	async fn exchange(&self, refresh_token: &Secret) -> Result<TokenSet> {
		let meta = ResponseMetadataSlot::default();
		let handle = self.http.instrumented(meta.clone());
		let secret = RefreshToken::new(refresh_token.expose().to_owned());
		let response = self
			.client
			.exchange_refresh_token(&secret)
			.request_async(&handle)
			.await
			.map_err(|e| map_request_error(self.strategy.as_ref(), meta.take(), e))?;

		map_token_response(refresh_token, response, meta.take())
	}
}
impl TokenRefreshProvider for OAuthRefreshProvider {
	fn refresh<'a>(
		&'a self,
		ctx: &'a Context,
		refresh_token: &'a Secret,
	) -> ProviderFuture<'a, TokenSet> {
		Box::pin(async move {
			if refresh_token.is_blank() {
				return Err(Error::validation("refresh_token", "must not be blank"));
			}

			ctx.run(self.exchange(refresh_token)).await
		})
	}
}
impl Debug for OAuthRefreshProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthRefreshProvider")
			.field("client_id", self.client.client_id())
			.field("token_url", &self.client.token_uri().as_str())
			.finish()
	}
}

fn map_token_response(
	previous: &Secret,
	response: CrmTokenResponse,
	meta: Option<ResponseMetadata>,
) -> Result<TokenSet> {
	let expires_in = response.expires_in().ok_or_else(|| TransientError::TokenEndpoint {
		message: "token response is missing expires_in".into(),
		status: meta_status(meta.as_ref()),
		retry_after: None,
	})?;
	let expires_in = i64::try_from(expires_in.as_secs()).map_err(|_| {
		TransientError::TokenEndpoint {
			message: "token response carries an out-of-range expires_in".into(),
			status: meta_status(meta.as_ref()),
			retry_after: None,
		}
	})?;
	// The CRM only rotates refresh tokens occasionally; keep the old one otherwise.
	let refresh_token = response
		.refresh_token()
		.map(|token| Secret::new(token.secret().to_owned()))
		.unwrap_or_else(|| previous.clone());
	let scope = response
		.scopes()
		.map(|scopes| scopes.iter().map(|scope| scope.as_str()).collect::<Vec<_>>().join(" "))
		.unwrap_or_default();
	let tokens = TokenSet {
		access_token: Secret::new(response.access_token().secret().to_owned()),
		refresh_token,
		token_type: response.token_type().as_ref().to_owned(),
		scope,
		api_domain: response.extra_fields().api_domain.clone().unwrap_or_default(),
		expires_in,
	};

	tokens.validate()?;

	Ok(tokens)
}

fn map_request_error(
	strategy: &dyn ProviderStrategy,
	meta: Option<ResponseMetadata>,
	err: RefreshError,
) -> Error {
	let meta = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(strategy, response, meta),
		RequestTokenError::Request(error) => map_transport_error(meta, error),
		RequestTokenError::Parse(error, body) => {
			let ctx = ProviderErrorContext::default()
				.with_body_preview(String::from_utf8_lossy(&body).into_owned());
			let ctx = match meta_status(meta) {
				Some(status) => ctx.with_http_status(status),
				None => ctx,
			};

			match strategy.classify_token_error(&ctx) {
				ProviderErrorKind::InvalidGrant => Error::InvalidGrant { reason: error.to_string() },
				ProviderErrorKind::InvalidClient =>
					Error::InvalidClient { reason: error.to_string() },
				ProviderErrorKind::Transient => TransientError::TokenResponseParse {
					message: format!("{} at `{}`", error.inner(), error.path()),
					status: meta_status(meta),
				}
				.into(),
			}
		},
		RequestTokenError::Other(message) => TransientError::TokenEndpoint {
			message,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

fn map_server_response_error(
	strategy: &dyn ProviderStrategy,
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let mut ctx = ProviderErrorContext::default().with_oauth_error(response.error().as_ref());

	if let Some(description) = response.error_description() {
		ctx = ctx.with_error_description(description.clone());
	}
	if let Some(status) = meta_status(meta) {
		ctx = ctx.with_http_status(status);
	}

	let message = match response.error_description() {
		Some(description) => format!("{}: {description}", response.error().as_ref()),
		None => response.error().as_ref().to_owned(),
	};

	match strategy.classify_token_error(&ctx) {
		ProviderErrorKind::InvalidGrant => Error::InvalidGrant { reason: message },
		ProviderErrorKind::InvalidClient => Error::InvalidClient { reason: message },
		ProviderErrorKind::Transient => TransientError::TokenEndpoint {
			message,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

fn map_transport_error(
	meta: Option<&ResponseMetadata>,
	err: HttpClientError<ReqwestError>,
) -> Error {
	match err {
		HttpClientError::Reqwest(inner) => map_reqwest_error(meta, *inner),
		HttpClientError::Http(inner) => ConfigError::http_request(inner).into(),
		HttpClientError::Io(inner) => TransportError::network(inner).into(),
		HttpClientError::Other(message) => TransientError::TokenEndpoint {
			message,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
		_ => TransientError::TokenEndpoint {
			message: "HTTP client error while calling the token endpoint".into(),
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

fn map_reqwest_error(
	meta: Option<&ResponseMetadata>,
	err: ReqwestError,
) -> Error {
	if err.is_builder() {
		return ConfigError::http_request(err).into();
	}
	if err.is_timeout() {
		return TransientError::TokenEndpoint {
			message: "request to the token endpoint timed out".into(),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	tracing::debug!(error = %err, "token endpoint unreachable");

	TransportError::network(err).into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}
