//! Document server save callbacks.
//!
//! The document server posts a signed notification whenever an editing session
//! changes state. Only "ready for saving" (2) and "force save" (6) produce work:
//! the handler verifies the signature with the tenant's resolved secret and hands
//! an [`UploadJob`] to the [`UploadPipeline`].

// self
use crate::{
	_prelude::*,
	auth::TenantId,
	crypto::Signer,
	flows::{UploadJob, UploadPipeline},
	obs::{self, FlowKind},
	service::SettingsService,
	settings::DemoPolicy,
};

const STATUS_READY: i64 = 2;
const STATUS_FORCE_SAVE: i64 = 6;

/// Query parameters carried by the callback URL built into the editor config.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackQuery {
	/// Tenant id.
	pub cid: String,
	/// Deal id.
	pub did: String,
	/// CRM file id.
	pub fid: String,
	/// Escaped file name.
	pub filename: String,
}
impl CallbackQuery {
	fn validate(&self) -> Result<()> {
		for (field, value) in [("cid", &self.cid), ("did", &self.did), ("fid", &self.fid)] {
			if value.trim().is_empty() {
				return Err(Error::validation(field, "missing from callback query"));
			}
		}

		Ok(())
	}
}

/// Raw callback body; everything of interest lives inside the signed token.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackBody {
	/// Signed notification.
	pub token: String,
}

/// Verified notification claims.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackClaims {
	/// Document revision key.
	pub key: String,
	/// Session status code.
	pub status: i64,
	/// Location of the edited file, present for save statuses.
	#[serde(default)]
	pub url: Option<Url>,
	/// Editor user ids, most recent first.
	#[serde(default)]
	pub users: Vec<String>,
}
impl CallbackClaims {
	fn validate(&self) -> Result<()> {
		if self.key.trim().is_empty() {
			return Err(Error::validation("key", "must not be empty"));
		}
		if !(0..=7).contains(&self.status) {
			return Err(Error::validation("status", format!("unknown status {}", self.status)));
		}

		Ok(())
	}
}

/// What the handler did with a callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackOutcome {
	/// A save was queued.
	Enqueued(UploadJob),
	/// The status needs no work.
	Ignored {
		/// Status code received.
		status: i64,
	},
}

/// Body the document server expects in reply; `error` is 0 on success.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackResponse {
	/// 0 when the callback was accepted, 1 otherwise.
	pub error: u8,
}
impl CallbackResponse {
	/// Maps a handler result onto the HTTP status and reply body.
	pub fn for_result(result: &Result<CallbackOutcome>) -> (u16, Self) {
		match result {
			Ok(_) => (200, Self { error: 0 }),
			Err(e) => (e.class().http_status(), Self { error: 1 }),
		}
	}
}

/// Verifies callbacks and produces upload jobs.
pub struct CallbackHandler {
	settings: Arc<SettingsService>,
	demo: DemoPolicy,
	signer: Arc<dyn Signer>,
	pipeline: Arc<UploadPipeline>,
}
impl CallbackHandler {
	/// Wires a handler over its collaborators.
	pub fn new(
		settings: Arc<SettingsService>,
		demo: DemoPolicy,
		signer: Arc<dyn Signer>,
		pipeline: Arc<UploadPipeline>,
	) -> Self {
		Self { settings, demo, signer, pipeline }
	}

	/// Verifies one callback and queues a save when its status asks for one.
	///
	/// A bad signature is [`Error::Signature`]; an enqueue failure, including an
	/// oversized file, is returned so the responder can report it.
	pub async fn handle(
		&self,
		ctx: &Context,
		query: CallbackQuery,
		body: CallbackBody,
	) -> Result<CallbackOutcome> {
		obs::observe(FlowKind::Callback, "handle", self.verify_and_dispatch(ctx, query, body)).await
	}

	async fn verify_and_dispatch(
		&self,
		ctx: &Context,
		query: CallbackQuery,
		body: CallbackBody,
	) -> Result<CallbackOutcome> {
		query.validate()?;

		if body.token.trim().is_empty() {
			return Err(Error::validation("token", "missing from callback body"));
		}

		let tenant = TenantId::new(query.cid.trim())?;
		let settings = self.settings.get(ctx, &tenant).await.map_err(|e| match e {
			Error::NotFound { .. } => Error::NoSettings { tenant: tenant.to_string() },
			e => e,
		})?;
		let server = self.demo.resolve(&settings, OffsetDateTime::now_utc())?;
		let claims: CallbackClaims = self.signer.verify_json(server.secret.expose(), &body.token)?;

		claims.validate()?;

		tracing::debug!(tenant = %tenant, key = %claims.key, status = claims.status, "callback verified");

		if !matches!(claims.status, STATUS_READY | STATUS_FORCE_SAVE) {
			return Ok(CallbackOutcome::Ignored { status: claims.status });
		}

		let filename = query.filename.trim();

		if filename.is_empty() {
			return Err(Error::validation("filename", "missing from callback query"));
		}

		let user = claims
			.users
			.first()
			.filter(|user| !user.trim().is_empty())
			.ok_or_else(|| Error::validation("users", "save callback names no user"))?;
		let url = claims.url.clone().ok_or_else(|| Error::validation("url", "save callback has no url"))?;
		let job = UploadJob {
			user: user.trim().to_owned(),
			deal_id: query.did.trim().to_owned(),
			file_id: query.fid.trim().to_owned(),
			filename: filename.to_owned(),
			url,
		};

		self.pipeline.enqueue(ctx, job.clone()).await?;

		Ok(CallbackOutcome::Enqueued(job))
	}
}
impl Debug for CallbackHandler {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CallbackHandler").field("demo_window", &self.demo.window()).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn query_requires_routing_fields() {
		let query = CallbackQuery { cid: "7700".into(), did: " ".into(), ..Default::default() };

		assert!(matches!(query.validate(), Err(Error::Validation { field: "did", .. })));
	}

	#[test]
	fn claims_reject_unknown_status() {
		let claims =
			CallbackClaims { key: "k".into(), status: 42, url: None, users: Vec::new() };

		assert!(matches!(claims.validate(), Err(Error::Validation { field: "status", .. })));
	}

	#[test]
	fn responses_follow_error_class() {
		let ok = Ok(CallbackOutcome::Ignored { status: 1 });
		let forged = Err(Error::Signature { reason: "bad mac".into() });

		assert_eq!(CallbackResponse::for_result(&ok), (200, CallbackResponse { error: 0 }));
		assert_eq!(CallbackResponse::for_result(&forged), (403, CallbackResponse { error: 1 }));
	}
}
