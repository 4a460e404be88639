//! Token and configuration orchestration core for bridging a CRM with a document-editing
//! server: encrypted OAuth credentials, coalesced refreshes, signed editor configs, verified
//! save callbacks, and a retrying upload pipeline.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod context;
pub mod crypto;
pub mod error;
pub mod flows;
pub mod format;
#[cfg(feature = "reqwest")] pub mod http;
pub mod message;
#[cfg(feature = "reqwest")] pub mod oauth;
pub mod obs;
pub mod provider;
pub mod queue;
pub mod service;
pub mod settings;
pub mod store;
#[cfg(any(test, feature = "test"))]
#[doc(hidden)]
pub mod _preludet {
	//! Fakes and fixtures shared by the integration tests.

	pub use crate::_prelude::*;

	// std
	use std::{
		collections::VecDeque,
		sync::atomic::{AtomicUsize, Ordering},
	};
	// crates.io
	use bytes::Bytes;
	// self
	use crate::{
		auth::{Credential, Secret, TenantId, TokenSet, UserKey},
		config::BrokerConfig,
		crypto::{AesGcmEncryptor, Encryptor, JwtSigner},
		flows::{Bridge, Collaborators},
		provider::{
			FileTransfer, IdentityLookup, ProviderFuture, TokenRefreshProvider, UploadTarget,
			UserIdentity,
		},
		queue::MemoryQueue,
		settings::Settings,
		store::MemoryStore,
	};

	/// CRM user id used by fixtures.
	pub const USER: &str = "42";
	/// CRM company id used by fixtures.
	pub const TENANT: &str = "7700";
	/// Document server secret used by fixtures.
	pub const DOC_SECRET: &str = "doc-server-secret";

	/// Builds the encryptor shared by every fixture.
	pub fn test_encryptor() -> Arc<dyn Encryptor> {
		Arc::new(
			AesGcmEncryptor::new("integration-test-encryption-secret")
				.expect("Test encryptor should build."),
		)
	}

	/// Returns the composite key of the fixture user.
	pub fn user_key() -> UserKey {
		let tenant = TenantId::new(TENANT).expect("Tenant fixture should be valid.");

		UserKey::compose(USER, &tenant).expect("User key fixture should be valid.")
	}

	/// Builds a credential for `id` expiring `expires_in` from now.
	pub fn credential(id: &UserKey, access: &str, expires_in: Duration) -> Credential {
		Credential::builder(id.clone())
			.access_token(access)
			.refresh_token("refresh-original")
			.token_type("Bearer")
			.scope("ZohoCRM.modules.ALL")
			.api_domain("https://www.zohoapis.example.com")
			.expires_at(OffsetDateTime::now_utc() + expires_in)
			.build()
			.expect("Credential fixture should build.")
	}

	/// Builds tenant settings pointing at a fixture document server.
	pub fn doc_server_settings() -> Settings {
		Settings::new(TenantId::new(TENANT).expect("Tenant fixture should be valid."))
			.with_doc_server("https://docs.example.com", Secret::new(DOC_SECRET), "AuthorizationJwt")
	}

	/// Refresh provider that counts calls and answers with a fixed outcome.
	#[derive(Debug, Default)]
	pub struct FakeRefreshProvider {
		calls: AtomicUsize,
		delay: StdDuration,
		failures: Mutex<VecDeque<Error>>,
		seen: Mutex<Vec<String>>,
	}
	impl FakeRefreshProvider {
		/// Delays every refresh by `delay`.
		pub fn with_delay(mut self, delay: StdDuration) -> Self {
			self.delay = delay;

			self
		}

		/// Fails the next refreshes with `errors`, in order.
		pub fn failing(self, errors: impl IntoIterator<Item = Error>) -> Self {
			self.failures.lock().extend(errors);

			self
		}

		/// Returns the number of refreshes that reached the provider.
		pub fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}

		/// Returns the refresh tokens presented so far.
		pub fn seen(&self) -> Vec<String> {
			self.seen.lock().clone()
		}
	}
	impl TokenRefreshProvider for FakeRefreshProvider {
		fn refresh<'a>(
			&'a self,
			ctx: &'a Context,
			refresh_token: &'a Secret,
		) -> ProviderFuture<'a, TokenSet> {
			Box::pin(async move {
				if refresh_token.is_blank() {
					return Err(Error::validation("refresh_token", "must not be blank"));
				}

				let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

				self.seen.lock().push(refresh_token.expose().to_owned());

				if !self.delay.is_zero() {
					ctx.sleep(self.delay).await?;
				}
				if let Some(err) = self.failures.lock().pop_front() {
					return Err(err);
				}

				Ok(TokenSet {
					access_token: Secret::new(format!("access-refreshed-{call}")),
					refresh_token: Secret::new("refresh-rotated"),
					token_type: "Bearer".into(),
					scope: "ZohoCRM.modules.ALL".into(),
					api_domain: "https://www.zohoapis.example.com".into(),
					expires_in: 3_600,
				})
			})
		}
	}

	/// Identity lookup answering with a fixed profile.
	#[derive(Debug)]
	pub struct FakeIdentity {
		identity: UserIdentity,
		delay: StdDuration,
		error: Option<Error>,
		tokens: Mutex<Vec<String>>,
	}
	impl FakeIdentity {
		/// Delays every lookup by `delay`.
		pub fn with_delay(mut self, delay: StdDuration) -> Self {
			self.delay = delay;

			self
		}

		/// Fails every lookup with `error`.
		pub fn failing(mut self, error: Error) -> Self {
			self.error = Some(error);

			self
		}

		/// Overrides the language and country of the profile.
		pub fn with_locale(mut self, language: Option<&str>, country: Option<&str>) -> Self {
			self.identity.language = language.map(Into::into);
			self.identity.country = country.map(Into::into);

			self
		}

		/// Returns the access tokens presented so far.
		pub fn tokens(&self) -> Vec<String> {
			self.tokens.lock().clone()
		}
	}
	impl Default for FakeIdentity {
		fn default() -> Self {
			Self {
				identity: UserIdentity {
					id: USER.into(),
					tenant: TENANT.into(),
					name: "Ada Lovelace".into(),
					email: "ada@example.com".into(),
					language: Some("de".into()),
					country: Some("at".into()),
				},
				delay: StdDuration::ZERO,
				error: None,
				tokens: Default::default(),
			}
		}
	}
	impl IdentityLookup for FakeIdentity {
		fn lookup<'a>(
			&'a self,
			ctx: &'a Context,
			credential: &'a Credential,
		) -> ProviderFuture<'a, UserIdentity> {
			Box::pin(async move {
				self.tokens.lock().push(credential.access_token.expose().to_owned());

				if !self.delay.is_zero() {
					ctx.sleep(self.delay).await?;
				}
				if let Some(err) = &self.error {
					return Err(err.clone());
				}

				Ok(self.identity.clone())
			})
		}
	}

	/// One upload observed by [`FakeFiles`].
	#[derive(Clone, Debug, PartialEq, Eq)]
	pub struct RecordedUpload {
		/// Where the file was stored.
		pub target: UploadTarget,
		/// Bytes uploaded.
		pub body: Bytes,
		/// Access token used.
		pub access_token: String,
	}

	/// File transfer backed by a fixed body.
	#[derive(Debug)]
	pub struct FakeFiles {
		body: Bytes,
		reported_size: Option<u64>,
		download_url: Url,
		upload_failures: Mutex<VecDeque<Error>>,
		uploads: Mutex<Vec<RecordedUpload>>,
		downloads: AtomicUsize,
	}
	impl FakeFiles {
		/// Serves `body` and reports its length as the probed size.
		pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
			self.body = body.into();

			self
		}

		/// Reports `size` from the probe regardless of the body.
		pub fn reporting_size(mut self, size: u64) -> Self {
			self.reported_size = Some(size);

			self
		}

		/// Fails the next uploads with `errors`, in order.
		pub fn failing_uploads(self, errors: impl IntoIterator<Item = Error>) -> Self {
			self.upload_failures.lock().extend(errors);

			self
		}

		/// Returns the URL handed out by `resolve_download_url`.
		pub fn download_url(&self) -> &Url {
			&self.download_url
		}

		/// Returns every successful upload.
		pub fn uploads(&self) -> Vec<RecordedUpload> {
			self.uploads.lock().clone()
		}

		/// Returns the number of downloads performed.
		pub fn downloads(&self) -> usize {
			self.downloads.load(Ordering::SeqCst)
		}
	}
	impl Default for FakeFiles {
		fn default() -> Self {
			Self {
				body: Bytes::from_static(b"edited document"),
				reported_size: None,
				download_url: Url::parse("https://files.example.com/download/file-1")
					.expect("Download URL fixture should parse."),
				upload_failures: Default::default(),
				uploads: Default::default(),
				downloads: AtomicUsize::new(0),
			}
		}
	}
	impl FileTransfer for FakeFiles {
		fn resolve_download_url<'a>(
			&'a self,
			_: &'a Context,
			_: &'a Credential,
			_: &'a str,
		) -> ProviderFuture<'a, Url> {
			Box::pin(async move { Ok(self.download_url.clone()) })
		}

		fn probe_size<'a>(&'a self, _: &'a Context, _: &'a Url) -> ProviderFuture<'a, u64> {
			Box::pin(async move { Ok(self.reported_size.unwrap_or(self.body.len() as u64)) })
		}

		fn download<'a>(
			&'a self,
			_: &'a Context,
			_: &'a Url,
			limit: u64,
		) -> ProviderFuture<'a, Bytes> {
			Box::pin(async move {
				self.downloads.fetch_add(1, Ordering::SeqCst);

				let size = self.body.len() as u64;

				if size > limit {
					return Err(Error::FileTooLarge { size, limit });
				}

				Ok(self.body.clone())
			})
		}

		fn upload<'a>(
			&'a self,
			_: &'a Context,
			credential: &'a Credential,
			file: Bytes,
			target: &'a UploadTarget,
		) -> ProviderFuture<'a, ()> {
			Box::pin(async move {
				if let Some(err) = self.upload_failures.lock().pop_front() {
					return Err(err);
				}

				self.uploads.lock().push(RecordedUpload {
					target: target.clone(),
					body: file,
					access_token: credential.access_token.expose().to_owned(),
				});

				Ok(())
			})
		}
	}

	/// A [`Bridge`] plus handles on every fake behind it.
	#[derive(Debug)]
	pub struct TestBridge {
		/// Bridge under test.
		pub bridge: Bridge,
		/// Backing store for credentials and settings.
		pub store: Arc<MemoryStore>,
		/// Message substrate.
		pub queue: Arc<MemoryQueue>,
		/// Refresh provider.
		pub refresh: Arc<FakeRefreshProvider>,
		/// Identity lookup.
		pub identity: Arc<FakeIdentity>,
		/// File transfer.
		pub files: Arc<FakeFiles>,
	}

	/// Configuration with short timeouts and backoff suited to tests.
	pub fn test_config() -> BrokerConfig {
		let mut config = BrokerConfig::default();

		config.upload.backoff_initial_ms = 5;
		config.upload.backoff_max_ms = 20;
		config.upload.timeout_secs = 5;
		config.upload.workers = 2;
		config.editor.callback_url = "https://bridge.example.com/callback".into();

		config
	}

	/// Wires a [`Bridge`] over in-memory stores and the given fakes.
	pub fn build_test_bridge(
		config: BrokerConfig,
		refresh: FakeRefreshProvider,
		identity: FakeIdentity,
		files: FakeFiles,
	) -> TestBridge {
		let store = Arc::new(MemoryStore::default());
		let queue = Arc::new(MemoryQueue::default());
		let refresh = Arc::new(refresh);
		let identity = Arc::new(identity);
		let files = Arc::new(files);
		let bridge = Bridge::new(
			config,
			Collaborators {
				credentials: store.clone(),
				settings: store.clone(),
				encryptor: test_encryptor(),
				refresh: refresh.clone(),
				identity: identity.clone(),
				files: files.clone(),
				signer: Arc::new(JwtSigner),
				queue: queue.clone(),
			},
		)
		.expect("Test bridge should build.");

		TestBridge { bridge, store, queue, refresh, identity, files }
	}

	/// Wires a [`Bridge`] with default fakes.
	pub fn default_test_bridge() -> TestBridge {
		build_test_bridge(
			test_config(),
			FakeRefreshProvider::default(),
			FakeIdentity::default(),
			FakeFiles::default(),
		)
	}

	/// Stores the fixture user's credential with the given lifetime.
	pub async fn seed_credential(bridge: &Bridge, access: &str, expires_in: Duration) {
		bridge
			.tokens()
			.create(&Context::background(), credential(&user_key(), access, expires_in))
			.await
			.expect("Credential fixture should be stored.");
	}

	/// Stores the fixture tenant's settings.
	pub async fn seed_settings(bridge: &Bridge, settings: Settings) {
		bridge
			.settings()
			.create(&Context::background(), settings)
			.await
			.expect("Settings fixture should be stored.");
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::Hash,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::{
		context::Context,
		error::{Error, Result},
	};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {docbridge_core as _, httpmock as _};
