//! High-level orchestrators and the [`Bridge`] facade that wires them together.

pub mod access;
pub mod callback;
pub mod editor;
pub mod singleflight;
pub mod upload;

pub use access::*;
pub use callback::*;
pub use editor::*;
pub use singleflight::*;
pub use upload::*;

// crates.io
use tokio::task::JoinHandle;
// self
use crate::{
	_prelude::*,
	config::BrokerConfig,
	crypto::{Encryptor, Signer},
	format::FormatRegistry,
	message::MessageRouter,
	provider::{FileTransfer, IdentityLookup, TokenRefreshProvider},
	queue::Queue,
	service::{SettingsService, TokenService},
	settings::DemoPolicy,
	store::{CredentialStore, SettingsStore},
};

/// External collaborators the bridge is built from.
#[derive(Clone)]
pub struct Collaborators {
	/// Credential persistence.
	pub credentials: Arc<dyn CredentialStore>,
	/// Settings persistence.
	pub settings: Arc<dyn SettingsStore>,
	/// Field-level encryption for secrets at rest.
	pub encryptor: Arc<dyn Encryptor>,
	/// OAuth refresh endpoint.
	pub refresh: Arc<dyn TokenRefreshProvider>,
	/// CRM profile lookup.
	pub identity: Arc<dyn IdentityLookup>,
	/// CRM file access.
	pub files: Arc<dyn FileTransfer>,
	/// Config and callback signing.
	pub signer: Arc<dyn Signer>,
	/// Message substrate.
	pub queue: Arc<dyn Queue>,
}
impl Debug for Collaborators {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Collaborators").finish_non_exhaustive()
	}
}

/// Owns one instance of every service and flow.
///
/// Services hold no hidden global state; the coalescing table and the settings
/// cache live inside the instances created here, so every consumer shares them by
/// going through the same bridge.
#[derive(Clone)]
pub struct Bridge {
	config: BrokerConfig,
	tokens: TokenService,
	settings: Arc<SettingsService>,
	access: Arc<TokenAccess>,
	editor: Arc<ConfigBuilder>,
	uploads: Arc<UploadPipeline>,
	callbacks: Arc<CallbackHandler>,
	messages: Arc<MessageRouter>,
}
impl Bridge {
	/// Validates `config` and wires every component over `collaborators`.
	pub fn new(config: BrokerConfig, collaborators: Collaborators) -> Result<Self> {
		config.validate()?;

		let Collaborators { credentials, settings, encryptor, refresh, identity, files, signer, queue } =
			collaborators;
		let demo = DemoPolicy::new(config.settings.trial_window(), config.demo.as_ref())?;
		let tokens = TokenService::new(credentials, encryptor.clone());
		let settings =
			Arc::new(SettingsService::new(settings, encryptor, config.settings.cache_ttl()));
		let access =
			Arc::new(TokenAccess::new(tokens.clone(), refresh, &config.refresh));
		let editor = Arc::new(ConfigBuilder::new(
			access.clone(),
			settings.clone(),
			demo.clone(),
			identity,
			files.clone(),
			signer.clone(),
			FormatRegistry::default(),
			config.editor.clone(),
		));
		let uploads =
			Arc::new(UploadPipeline::new(access.clone(), files, queue, config.upload.clone()));
		let callbacks =
			Arc::new(CallbackHandler::new(settings.clone(), demo, signer, uploads.clone()));
		let messages = Arc::new(MessageRouter::new(tokens.clone(), settings.clone()));

		Ok(Self { config, tokens, settings, access, editor, uploads, callbacks, messages })
	}

	/// Returns the active configuration.
	pub fn config(&self) -> &BrokerConfig {
		&self.config
	}

	/// Returns the credential service.
	pub fn tokens(&self) -> &TokenService {
		&self.tokens
	}

	/// Returns the settings service.
	pub fn settings(&self) -> &SettingsService {
		&self.settings
	}

	/// Returns the refresh-coalescing access layer.
	pub fn access(&self) -> &TokenAccess {
		&self.access
	}

	/// Returns the editor config builder.
	pub fn editor(&self) -> &ConfigBuilder {
		&self.editor
	}

	/// Returns the upload pipeline.
	pub fn uploads(&self) -> &Arc<UploadPipeline> {
		&self.uploads
	}

	/// Returns the callback handler.
	pub fn callbacks(&self) -> &CallbackHandler {
		&self.callbacks
	}

	/// Returns the message router.
	pub fn messages(&self) -> &MessageRouter {
		&self.messages
	}

	/// Starts the upload workers; they stop when `ctx` ends or the queue closes.
	pub fn start_workers(&self, ctx: &Context) -> Vec<JoinHandle<()>> {
		self.uploads.start(ctx)
	}
}
impl Debug for Bridge {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Bridge")
			.field("config", &self.config)
			.field("settings", &self.settings)
			.field("access", &self.access)
			.finish()
	}
}
