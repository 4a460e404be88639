// self
use crate::{
	error::ErrorClass,
	obs::{FlowKind, FlowOutcome},
};

/// Counts one flow event; failures also carry the error class.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome, class: Option<ErrorClass>) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"docbridge_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str(),
			"class" => class.map_or("none", ErrorClass::as_str)
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome, class);
	}
}

/// Counts an upload job settling in the state labeled `state`.
pub fn record_job_state(state: &'static str) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("docbridge_upload_jobs_total", "state" => state).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = state;
	}
}
