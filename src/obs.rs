//! Observability helpers shared by every orchestrated flow.
//!
//! Flows emit spans named `docbridge.flow` carrying `flow` and `stage` fields. With the
//! `metrics` feature enabled, every attempt/success/failure also increments the
//! `docbridge_flow_total` counter labeled by `flow`, `outcome` and the error `class`.

mod metrics;
mod span;

pub use metrics::*;
pub use span::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Coalesced access-token resolution, including refreshes.
	Refresh,
	/// Editor config assembly.
	EditorConfig,
	/// Upload job processing.
	Upload,
	/// Document server save callbacks.
	Callback,
	/// Queue message dispatch.
	Message,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Refresh => "refresh",
			FlowKind::EditorConfig => "editor_config",
			FlowKind::Upload => "upload",
			FlowKind::Callback => "callback",
			FlowKind::Message => "message",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Runs `fut` inside a flow span and records attempt plus final outcome.
pub(crate) async fn observe<Fut, T>(kind: FlowKind, stage: &'static str, fut: Fut) -> Result<T>
where
	Fut: Future<Output = Result<T>>,
{
	let span = FlowSpan::new(kind, stage);

	record_flow_outcome(kind, FlowOutcome::Attempt, None);

	let result = span.instrument(fut).await;

	match &result {
		Ok(_) => record_flow_outcome(kind, FlowOutcome::Success, None),
		Err(err) => {
			span.in_scope(|| tracing::warn!(error = %err, class = err.class().as_str(), "flow failed"));
			record_flow_outcome(kind, FlowOutcome::Failure, Some(err.class()));
		},
	}

	result
}
