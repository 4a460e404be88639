//! Signed editor config assembly under a shared fan-out deadline.
//!
//! The identity branch (coalesced token + CRM profile) and the settings branch
//! (cached settings + demo substitution) run concurrently and are both awaited
//! before either is inspected. A failure in either branch, or the fan-out
//! deadline, yields an error and never a partially filled config.

// self
use crate::{
	_prelude::*,
	auth::{Credential, TenantId, UserKey},
	config::EditorOptions,
	context,
	crypto::Signer,
	error::ConfigError,
	flows::TokenAccess,
	format::{self, FormatRegistry},
	obs::{self, FlowKind},
	provider::{FileTransfer, IdentityLookup, UserIdentity},
	service::SettingsService,
	settings::{DemoPolicy, DocServer},
};

const MOBILE_MARKERS: &[&str] = &["mobi", "android", "iphone", "ipad", "tablet"];

/// Parameters for one editor session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfigRequest {
	/// CRM user id of the requester.
	pub user: String,
	/// CRM company id of the requester.
	pub tenant: String,
	/// Deal the file belongs to.
	pub deal_id: String,
	/// CRM file id.
	pub file_id: String,
	/// Original file name.
	pub filename: String,
	/// Document key shared by every co-editor of the same revision.
	pub doc_key: String,
	/// Browser user agent, used to choose the editor layout.
	#[serde(default)]
	pub user_agent: String,
}
impl BuildConfigRequest {
	fn validate(&self) -> Result<()> {
		for (field, value) in [
			("deal_id", &self.deal_id),
			("file_id", &self.file_id),
			("filename", &self.filename),
			("doc_key", &self.doc_key),
		] {
			if value.trim().is_empty() {
				return Err(Error::validation(field, "must not be empty"));
			}
		}

		Ok(())
	}
}

/// Signed configuration handed to the document editor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfig {
	/// Document descriptor.
	pub document: DocumentDescriptor,
	/// Editor family label (`word`, `cell`, `slide`).
	pub document_type: String,
	/// Editor session settings.
	pub editor_config: EditorSettings,
	/// Layout, `desktop` or `mobile`.
	#[serde(rename = "type")]
	pub device: String,
	/// Document server base address the editor loads from.
	pub server_url: String,
	/// Absolute expiry as a unix timestamp.
	pub exp: i64,
	/// Signature over every other field.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub token: Option<String>,
}

/// Document part of an [`EditorConfig`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDescriptor {
	/// Lowercased extension.
	pub file_type: String,
	/// Revision key.
	pub key: String,
	/// Escaped title.
	pub title: String,
	/// URL the document server downloads the file from.
	pub url: String,
	/// Capabilities granted to the user.
	pub permissions: Permissions,
}

/// Capabilities granted inside the editor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
	/// Editing is allowed.
	pub edit: bool,
	/// Comments are allowed.
	pub comment: bool,
	/// Downloading is allowed.
	pub download: bool,
	/// Printing is allowed.
	pub print: bool,
	/// Review mode is allowed.
	pub review: bool,
	/// Copying to the clipboard is allowed.
	pub copy: bool,
	/// Content controls can be modified.
	pub modify_content_control: bool,
	/// Spreadsheet filters can be modified.
	pub modify_filter: bool,
}
impl Permissions {
	/// Returns the fixed permission set, with editing gated on `editable`.
	pub const fn for_format(editable: bool) -> Self {
		Self {
			edit: editable,
			comment: true,
			download: true,
			print: false,
			review: false,
			copy: true,
			modify_content_control: true,
			modify_filter: true,
		}
	}
}

/// Editor session part of an [`EditorConfig`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSettings {
	/// Editing user.
	pub user: EditorUser,
	/// Save callback target.
	pub callback_url: String,
	/// UI flags.
	pub customization: Customization,
	/// Interface language.
	pub lang: String,
	/// Locale used for number and date formats.
	pub region: String,
}

/// User shown to co-editors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorUser {
	/// Stable id, the composite user key.
	pub id: String,
	/// Display name.
	pub name: String,
}

/// UI flags passed to the editor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customization {
	/// "Go back" button behavior.
	pub goback: Goback,
	/// Plugins are shown.
	pub plugins: bool,
	/// Right-hand menu is hidden.
	pub hide_right_menu: bool,
}

/// "Go back" button behavior.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goback {
	/// Closing asks the host page instead of navigating.
	pub request_close: bool,
}

/// Builds signed editor configs.
pub struct ConfigBuilder {
	access: Arc<TokenAccess>,
	settings: Arc<SettingsService>,
	demo: DemoPolicy,
	identity: Arc<dyn IdentityLookup>,
	files: Arc<dyn FileTransfer>,
	signer: Arc<dyn Signer>,
	formats: FormatRegistry,
	options: EditorOptions,
}
impl ConfigBuilder {
	/// Wires a builder over its collaborators.
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		access: Arc<TokenAccess>,
		settings: Arc<SettingsService>,
		demo: DemoPolicy,
		identity: Arc<dyn IdentityLookup>,
		files: Arc<dyn FileTransfer>,
		signer: Arc<dyn Signer>,
		formats: FormatRegistry,
		options: EditorOptions,
	) -> Self {
		Self { access, settings, demo, identity, files, signer, formats, options }
	}

	/// Produces a signed config for `request`.
	///
	/// Timeouts and cancellation surface as [`Error::DeadlineExceeded`] or
	/// [`Error::Cancelled`]; missing tenant settings as [`Error::NoSettings`].
	pub async fn build_config(&self, ctx: &Context, request: BuildConfigRequest) -> Result<EditorConfig> {
		obs::observe(FlowKind::EditorConfig, "build_config", self.build(ctx, request)).await
	}

	async fn build(&self, ctx: &Context, request: BuildConfigRequest) -> Result<EditorConfig> {
		request.validate()?;

		let title = escape_filename(request.filename.trim());
		let extension = format::extension_of(&title).unwrap_or_default().to_ascii_lowercase();
		let format = self
			.formats
			.lookup(&extension)
			.ok_or_else(|| Error::UnsupportedFormat { extension: extension.clone() })?;
		let tenant = TenantId::new(request.tenant.trim())?;
		let user = UserKey::compose(request.user.trim(), &tenant)?;
		let fanout = ctx.with_timeout(self.options.fanout_timeout());

		tracing::debug!(user = %user, file = %request.file_id, "resolving identity and settings");

		let (identity, server) = tokio::join!(
			fanout.run(self.resolve_identity(&fanout, &user)),
			fanout.run(self.resolve_server(&fanout, &tenant)),
		);
		let ((credential, identity), server) = context::settle(&fanout, identity, server)?;
		let download = ctx.with_timeout(self.options.download_timeout());
		let url = download
			.run(self.files.resolve_download_url(&download, &credential, &request.file_id))
			.await?;
		let mut config = EditorConfig {
			document: DocumentDescriptor {
				file_type: extension,
				key: request.doc_key.clone(),
				title: title.clone(),
				url: url.into(),
				permissions: Permissions::for_format(format.editable),
			},
			document_type: format.kind.as_str().into(),
			editor_config: EditorSettings {
				user: EditorUser { id: user.to_string(), name: identity.name.clone() },
				callback_url: self.callback_url(&tenant, &request, &title)?,
				customization: Customization::default(),
				lang: self.language(&identity),
				region: self.region(&identity),
			},
			device: device_type(&request.user_agent).into(),
			server_url: server.address.clone(),
			exp: OffsetDateTime::now_utc()
				.checked_add(self.options.config_ttl())
				.ok_or_else(|| ConfigError::InvalidValue {
					field: "editor.config_ttl_secs",
					reason: "expiry is out of range".into(),
				})?
				.unix_timestamp(),
			token: None,
		};

		config.token = Some(self.signer.sign_json(server.secret.expose(), &config)?);

		tracing::debug!(user = %user, kind = %format.kind, "editor config signed");

		Ok(config)
	}

	async fn resolve_identity(
		&self,
		ctx: &Context,
		user: &UserKey,
	) -> Result<(Credential, UserIdentity)> {
		let credential = self.access.access_token(ctx, user).await?;
		let identity = self.identity.lookup(ctx, &credential).await?;

		Ok((credential, identity))
	}

	async fn resolve_server(&self, ctx: &Context, tenant: &TenantId) -> Result<DocServer> {
		let settings = self.settings.get(ctx, tenant).await.map_err(|e| match e {
			Error::NotFound { .. } => Error::NoSettings { tenant: tenant.to_string() },
			e => e,
		})?;

		self.demo.resolve(&settings, OffsetDateTime::now_utc())
	}

	fn callback_url(
		&self,
		tenant: &TenantId,
		request: &BuildConfigRequest,
		title: &str,
	) -> Result<String> {
		let mut url = Url::parse(&self.options.callback_url)
			.map_err(|source| ConfigError::InvalidUrl { field: "editor.callback_url", source })?;

		url.query_pairs_mut()
			.append_pair("cid", tenant)
			.append_pair("did", &request.deal_id)
			.append_pair("fid", &request.file_id)
			.append_pair("filename", title);

		Ok(url.into())
	}

	fn language(&self, identity: &UserIdentity) -> String {
		identity
			.language
			.as_deref()
			.filter(|lang| !lang.trim().is_empty())
			.unwrap_or(self.options.default_language.as_str())
			.to_owned()
	}

	fn region(&self, identity: &UserIdentity) -> String {
		let country = identity
			.country
			.as_deref()
			.filter(|country| !country.trim().is_empty())
			.unwrap_or(self.options.default_country.as_str());

		format!("{}-{}", self.language(identity), country.to_ascii_uppercase())
	}
}
impl Debug for ConfigBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ConfigBuilder").field("options", &self.options).finish()
	}
}

/// Replaces path separators in a title with `:`.
pub fn escape_filename(filename: &str) -> String {
	filename.replace(['\\', '/'], ":")
}

/// Chooses the editor layout from a browser user agent.
pub fn device_type(user_agent: &str) -> &'static str {
	let lowered = user_agent.to_ascii_lowercase();

	if MOBILE_MARKERS.iter().any(|marker| lowered.contains(marker)) { "mobile" } else { "desktop" }
}
