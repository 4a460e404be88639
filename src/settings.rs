//! Per-tenant document server settings and the demo trial policy.

// self
use crate::{
	_prelude::*,
	auth::{Secret, TenantId},
	config::DemoServerConfig,
	error::ConfigError,
};

/// Document server settings for one tenant, with the signing secret decrypted.
///
/// The address, secret, and header are either all set or all unset; a tenant with
/// none of them relies on the operator's demo server while its trial lasts.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
	/// Tenant the settings belong to.
	pub tenant: TenantId,
	/// Document server base address, normalized to end with `/`.
	pub address: Option<String>,
	/// Shared signing secret.
	pub secret: Option<Secret>,
	/// Authorization header name expected by the document server.
	pub header: Option<String>,
	/// Whether the tenant opted into the demo trial.
	pub demo_enabled: bool,
	/// First instant the demo trial was activated; set once and never reset.
	pub demo_started: Option<OffsetDateTime>,
}
impl Settings {
	/// Creates empty settings for `tenant`.
	pub fn new(tenant: TenantId) -> Self {
		Self {
			tenant,
			address: None,
			secret: None,
			header: None,
			demo_enabled: false,
			demo_started: None,
		}
	}

	/// Sets the document server credentials.
	pub fn with_doc_server(
		mut self,
		address: impl Into<String>,
		secret: impl Into<Secret>,
		header: impl Into<String>,
	) -> Self {
		self.address = Some(address.into());
		self.secret = Some(secret.into());
		self.header = Some(header.into());

		self
	}

	/// Toggles the demo trial.
	pub fn with_demo(mut self, enabled: bool) -> Self {
		self.demo_enabled = enabled;

		self
	}

	/// Trims every field, normalizes the address, and enforces the all-or-nothing rule.
	pub fn validate(&mut self) -> Result<()> {
		self.address = non_blank(self.address.take());
		self.header = non_blank(self.header.take());
		self.secret = self
			.secret
			.take()
			.map(|secret| Secret::new(secret.expose().trim()))
			.filter(|secret| !secret.is_blank());

		let present = [self.address.is_some(), self.secret.is_some(), self.header.is_some()];

		if present.iter().any(|set| *set) && !present.iter().all(|set| *set) {
			return Err(Error::validation(
				"settings",
				"address, secret, and header must be provided together",
			));
		}
		if let Some(address) = &self.address {
			self.address = Some(normalize_address(address)?);
		}

		Ok(())
	}

	/// Returns the tenant's own document server, when fully configured.
	pub fn doc_server(&self) -> Option<DocServer> {
		match (&self.address, &self.secret, &self.header) {
			(Some(address), Some(secret), Some(header)) => Some(DocServer {
				address: address.clone(),
				secret: secret.clone(),
				header: header.clone(),
			}),
			_ => None,
		}
	}

	/// Returns `true` while the demo trial is usable at `now`.
	pub fn demo_is_valid(&self, now: OffsetDateTime, window: Duration) -> bool {
		demo_is_valid(self.demo_enabled, self.demo_started, now, window)
	}
}
impl Debug for Settings {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Settings")
			.field("tenant", &self.tenant)
			.field("address", &self.address)
			.field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
			.field("header", &self.header)
			.field("demo_enabled", &self.demo_enabled)
			.field("demo_started", &self.demo_started)
			.finish()
	}
}

/// Fully resolved document server endpoint used for one operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocServer {
	/// Base address ending with `/`.
	pub address: String,
	/// Shared signing secret.
	pub secret: Secret,
	/// Authorization header name.
	pub header: String,
}

/// Decides which document server a tenant uses right now.
#[derive(Clone, Debug)]
pub struct DemoPolicy {
	window: Duration,
	server: Option<DocServer>,
}
impl DemoPolicy {
	/// Builds a policy from the trial window and the operator's optional demo server.
	pub fn new(window: Duration, demo: Option<&DemoServerConfig>) -> Result<Self> {
		let server = match demo {
			Some(config) => Some(DocServer {
				address: normalize_address(&config.address)?,
				secret: config.secret.clone(),
				header: config.header.clone(),
			}),
			None => None,
		};

		Ok(Self { window, server })
	}

	/// Returns the trial window.
	pub fn window(&self) -> Duration {
		self.window
	}

	/// Substitutes the demo server while the trial is valid, otherwise the tenant's own.
	///
	/// Fails closed: an active trial without operator demo credentials is a
	/// configuration error, and a tenant with neither yields [`Error::NoSettings`].
	pub fn resolve(&self, settings: &Settings, now: OffsetDateTime) -> Result<DocServer> {
		if settings.demo_is_valid(now, self.window) {
			return self.server.clone().ok_or_else(|| ConfigError::MissingDemoServer.into());
		}

		settings.doc_server().ok_or_else(|| Error::NoSettings { tenant: settings.tenant.to_string() })
	}
}

/// Returns `true` when the demo is enabled and either never started or started
/// less than `window` before `now`.
pub fn demo_is_valid(
	enabled: bool,
	started: Option<OffsetDateTime>,
	now: OffsetDateTime,
	window: Duration,
) -> bool {
	if !enabled {
		return false;
	}

	match started {
		None => true,
		Some(started) => now - started < window,
	}
}

/// Reduces an address to `scheme://host[:port]/path/` with exactly one trailing slash.
pub fn normalize_address(raw: &str) -> Result<String> {
	let url = Url::parse(raw.trim())
		.map_err(|e| Error::validation("address", format!("`{raw}` is not a valid URL: {e}")))?;

	if !matches!(url.scheme(), "http" | "https") {
		return Err(Error::validation("address", format!("unsupported scheme `{}`", url.scheme())));
	}

	let host = url
		.host_str()
		.ok_or_else(|| Error::validation("address", format!("`{raw}` has no host")))?;
	let authority = match url.port() {
		Some(port) => format!("{host}:{port}"),
		None => host.to_owned(),
	};
	let path = url.path().trim_end_matches('/');

	Ok(format!("{}://{authority}{path}/", url.scheme()))
}

fn non_blank(value: Option<String>) -> Option<String> {
	value.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}
