//! Coalesced access-token resolution with transparent refresh.
//!
//! [`TokenAccess::access_token`] returns the stored credential while it is fresh.
//! Once it expires, exactly one caller per user refreshes it through the
//! [`TokenRefreshProvider`] and persists the result; every concurrent caller for
//! the same user receives that same credential or that same error. Nothing is
//! retried here; retry policy belongs to the caller.
//!
//! The shared refresh runs under a context owned by the layer and bounded by the
//! configured refresh timeout. A caller's own context only bounds how long that
//! caller waits, so one caller giving up never fails the rest of its group.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{Credential, UserKey},
	config::RefreshConfig,
	flows::SingleFlight,
	obs::{self, FlowKind},
	provider::TokenRefreshProvider,
	service::TokenService,
};

/// Refresh-coalescing layer over [`TokenService`].
pub struct TokenAccess {
	tokens: TokenService,
	provider: Arc<dyn TokenRefreshProvider>,
	flights: SingleFlight<UserKey, Result<Credential>>,
	safety_margin: Duration,
	timeout: StdDuration,
	metrics: Arc<RefreshMetrics>,
}
impl TokenAccess {
	/// Creates an access layer tuned by `config`.
	pub fn new(
		tokens: TokenService,
		provider: Arc<dyn TokenRefreshProvider>,
		config: &RefreshConfig,
	) -> Self {
		Self {
			tokens,
			provider,
			flights: SingleFlight::new(),
			safety_margin: config.safety_margin(),
			timeout: config.timeout(),
			metrics: Default::default(),
		}
	}

	/// Returns the shared refresh counters.
	pub fn metrics(&self) -> Arc<RefreshMetrics> {
		self.metrics.clone()
	}

	/// Returns the underlying token service.
	pub fn tokens(&self) -> &TokenService {
		&self.tokens
	}

	/// Returns a usable credential for `user`, refreshing it at most once per coalesced group.
	pub async fn access_token(&self, ctx: &Context, user: &str) -> Result<Credential> {
		let id = UserKey::new(user.trim())?;

		obs::observe(FlowKind::Refresh, "access_token", async {
			ctx.run(self.flights.run(id.clone(), || async {
				let shared = Context::background().with_timeout(self.timeout);

				self.resolve(&shared, &id).await
			}))
			.await
		})
		.await
	}

	async fn resolve(&self, ctx: &Context, id: &UserKey) -> Result<Credential> {
		self.metrics.record_attempt();

		let result = self.refresh_if_stale(ctx, id).await;

		match &result {
			Ok(_) => self.metrics.record_success(),
			Err(_) => self.metrics.record_failure(),
		}

		result
	}

	async fn refresh_if_stale(&self, ctx: &Context, id: &UserKey) -> Result<Credential> {
		let current = self.tokens.get(ctx, id).await?;

		if current.is_fresh_at(OffsetDateTime::now_utc()) {
			tracing::debug!(user = %id, "credential is fresh");

			return Ok(current);
		}

		tracing::debug!(user = %id, expired_at = %current.expires_at, "refreshing credential");
		self.metrics.record_refresh();

		let tokens = self.provider.refresh(ctx, &current.refresh_token).await?;
		let refreshed = Credential::from_token_set(
			current.id,
			tokens,
			OffsetDateTime::now_utc(),
			self.safety_margin,
		)?;

		self.tokens.update(ctx, refreshed).await
	}
}
impl Debug for TokenAccess {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenAccess")
			.field("safety_margin", &self.safety_margin)
			.field("timeout", &self.timeout)
			.field("in_flight", &self.flights.in_flight())
			.finish()
	}
}
