//! CRM REST client implementing identity lookup and file transfer.

// crates.io
use bytes::{Bytes, BytesMut};
use reqwest::{
	RequestBuilder, Response,
	header::{CONTENT_LENGTH, LOCATION},
	multipart::{Form, Part},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::Credential,
	error::{ConfigError, TransientError, TransportError},
	http::ReqwestHttpClient,
	provider::{self, FileTransfer, IdentityLookup, ProviderFuture, UploadTarget, UserIdentity},
};

const USERS_ME: &str = "/api/v1/users/me";
const FILES: &str = "/api/v1/files";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
	data: T,
}

#[derive(Debug, Deserialize)]
struct CrmUser {
	id: i64,
	company_id: i64,
	name: String,
	#[serde(default)]
	email: String,
	#[serde(default)]
	language: Option<CrmLanguage>,
}

#[derive(Debug, Deserialize)]
struct CrmLanguage {
	#[serde(default)]
	language_code: Option<String>,
	#[serde(default)]
	country_code: Option<String>,
}

/// Reqwest-backed CRM client.
///
/// API calls go through a client that never follows redirects so the download
/// endpoint's `Location` can be read; document bytes are fetched with a second,
/// default client.
#[derive(Clone, Debug)]
pub struct CrmHttpClient {
	api: ReqwestHttpClient,
	files: ReqwestClient,
}
impl CrmHttpClient {
	/// Builds both underlying clients.
	pub fn new() -> Result<Self> {
		let files = ReqwestClient::builder().build().map_err(ConfigError::http_client_build)?;

		Ok(Self { api: ReqwestHttpClient::new()?, files })
	}

	/// Uses caller-provided clients; `api` should not follow redirects.
	pub fn with_clients(api: ReqwestHttpClient, files: ReqwestClient) -> Self {
		Self { api, files }
	}

	fn endpoint(credential: &Credential, path: &str) -> Result<Url> {
		let mut url = Url::parse(credential.api_domain.trim()).map_err(|e| {
			Error::validation("api_domain", format!("`{}` is not a valid URL: {e}", credential.api_domain))
		})?;

		url.set_path(path);

		Ok(url)
	}

	async fn send(action: &'static str, request: RequestBuilder) -> Result<Response> {
		let response = request.send().await.map_err(|e| map_send_error(action, e))?;
		let status = response.status();

		if status.is_success() || status.is_redirection() {
			return Ok(response);
		}

		tracing::debug!(action, status = status.as_u16(), "CRM call failed");

		Err(provider::classify_api_status(action, status.as_u16()))
	}

	async fn decode<T>(action: &'static str, response: Response) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let body = response.bytes().await.map_err(|e| map_send_error(action, e))?;
		let de = &mut serde_json::Deserializer::from_slice(&body);

		serde_path_to_error::deserialize(de).map_err(|e| {
			TransientError::MalformedResponse {
				action,
				message: format!("{} at `{}`", e.inner(), e.path()),
			}
			.into()
		})
	}
}
impl IdentityLookup for CrmHttpClient {
	fn lookup<'a>(
		&'a self,
		ctx: &'a Context,
		credential: &'a Credential,
	) -> ProviderFuture<'a, UserIdentity> {
		Box::pin(async move {
			const ACTION: &str = "users.me";

			let url = Self::endpoint(credential, USERS_ME)?;
			let user: Envelope<CrmUser> = ctx
				.run(async {
					let request = self.api.get(url).bearer_auth(credential.access_token.expose());
					let response = Self::send(ACTION, request).await?;

					Self::decode(ACTION, response).await
				})
				.await?;
			let CrmUser { id, company_id, name, email, language } = user.data;
			let (language, country) = match language {
				Some(language) => (language.language_code, language.country_code),
				None => (None, None),
			};

			Ok(UserIdentity {
				id: id.to_string(),
				tenant: company_id.to_string(),
				name,
				email,
				language,
				country,
			})
		})
	}
}
impl FileTransfer for CrmHttpClient {
	fn resolve_download_url<'a>(
		&'a self,
		ctx: &'a Context,
		credential: &'a Credential,
		file_id: &'a str,
	) -> ProviderFuture<'a, Url> {
		Box::pin(async move {
			const ACTION: &str = "files.download";

			let url = Self::endpoint(credential, &format!("{FILES}/{}/download", file_id.trim()))?;
			let response = ctx
				.run(Self::send(
					ACTION,
					self.api.get(url.clone()).bearer_auth(credential.access_token.expose()),
				))
				.await?;
			let location = response
				.headers()
				.get(LOCATION)
				.and_then(|value| value.to_str().ok())
				.ok_or_else(|| TransientError::MalformedResponse {
					action: ACTION,
					message: format!("status {} carried no Location header", response.status()),
				})?;

			url.join(location).map_err(|e| {
				TransientError::MalformedResponse { action: ACTION, message: e.to_string() }.into()
			})
		})
	}

	fn probe_size<'a>(&'a self, ctx: &'a Context, url: &'a Url) -> ProviderFuture<'a, u64> {
		Box::pin(async move {
			const ACTION: &str = "files.probe";

			let response = ctx.run(Self::send(ACTION, self.files.head(url.clone()))).await?;

			response
				.headers()
				.get(CONTENT_LENGTH)
				.and_then(|value| value.to_str().ok())
				.and_then(|value| value.trim().parse::<u64>().ok())
				.ok_or_else(|| {
					TransientError::MalformedResponse {
						action: ACTION,
						message: "response carried no usable Content-Length".into(),
					}
					.into()
				})
		})
	}

	fn download<'a>(
		&'a self,
		ctx: &'a Context,
		url: &'a Url,
		limit: u64,
	) -> ProviderFuture<'a, Bytes> {
		Box::pin(async move {
			const ACTION: &str = "files.fetch";

			ctx.run(async {
				let mut response = Self::send(ACTION, self.files.get(url.clone())).await?;

				if let Some(size) = response.content_length().filter(|size| *size > limit) {
					return Err(Error::FileTooLarge { size, limit });
				}

				let mut body = BytesMut::new();

				while let Some(chunk) =
					response.chunk().await.map_err(|e| map_send_error(ACTION, e))?
				{
					body.extend_from_slice(&chunk);

					let size = body.len() as u64;

					if size > limit {
						tracing::debug!(size, limit, "download exceeded the size limit");

						return Err(Error::FileTooLarge { size, limit });
					}
				}

				Ok(body.freeze())
			})
			.await
		})
	}

	fn upload<'a>(
		&'a self,
		ctx: &'a Context,
		credential: &'a Credential,
		file: Bytes,
		target: &'a UploadTarget,
	) -> ProviderFuture<'a, ()> {
		Box::pin(async move {
			let token = credential.access_token.expose();
			let rename = Self::endpoint(credential, &format!("{FILES}/{}", target.file_id.trim()))?;
			let attach = Self::endpoint(credential, FILES)?;

			ctx.run(Self::send(
				"files.rename",
				self.api.put(rename).bearer_auth(token).form(&[("name", target.filename.as_str())]),
			))
			.await?;

			let part = Part::bytes(Vec::from(file)).file_name(target.filename.clone());
			let form = Form::new().part("file", part).text("deal_id", target.deal_id.clone());

			ctx.run(Self::send("files.add", self.api.post(attach).bearer_auth(token).multipart(form)))
				.await?;

			tracing::debug!(deal = %target.deal_id, file = %target.file_id, "file attached");

			Ok(())
		})
	}
}

fn map_send_error(action: &'static str, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::http_request(err).into();
	}
	if let Some(status) = err.status() {
		return provider::classify_api_status(action, status.as_u16());
	}

	TransportError::network(err).into()
}
