//! Cancellation and deadline propagation for orchestrated operations.
//!
//! A [`Context`] is passed by reference through every service call. Child contexts
//! inherit cancellation from their parent and can only tighten the deadline.

// crates.io
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
// self
use crate::_prelude::*;

/// Cancellation handle plus an optional absolute deadline.
#[derive(Clone, Debug)]
pub struct Context {
	cancel: CancellationToken,
	deadline: Option<Instant>,
}
impl Context {
	/// Creates a root context that never expires on its own.
	pub fn background() -> Self {
		Self { cancel: CancellationToken::new(), deadline: None }
	}

	/// Derives a child context that expires after `timeout` or at the parent's deadline,
	/// whichever comes first.
	///
	/// A timeout too large to represent as an instant leaves only the parent's deadline.
	pub fn with_timeout(&self, timeout: StdDuration) -> Self {
		match Instant::now().checked_add(timeout) {
			Some(deadline) => self.with_deadline(deadline),
			None => self.child(),
		}
	}

	/// Derives a child context bounded by `deadline` and the parent's deadline.
	pub fn with_deadline(&self, deadline: Instant) -> Self {
		let deadline = match self.deadline {
			Some(parent) if parent < deadline => parent,
			_ => deadline,
		};

		Self { cancel: self.cancel.child_token(), deadline: Some(deadline) }
	}

	/// Derives a child context that can be cancelled independently of its parent.
	pub fn child(&self) -> Self {
		Self { cancel: self.cancel.child_token(), deadline: self.deadline }
	}

	/// Cancels this context and every context derived from it.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Returns the absolute deadline, if any.
	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	/// Returns the time left before the deadline, if any.
	pub fn remaining(&self) -> Option<StdDuration> {
		self.deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
	}

	/// Returns the context error once cancelled or past the deadline.
	pub fn err(&self) -> Option<Error> {
		if self.cancel.is_cancelled() {
			return Some(Error::Cancelled);
		}

		match self.deadline {
			Some(deadline) if Instant::now() >= deadline => Some(Error::DeadlineExceeded),
			_ => None,
		}
	}

	/// Fails with the context error when the context is already done.
	pub fn check(&self) -> Result<()> {
		match self.err() {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}

	/// Resolves once the context is cancelled or its deadline passes.
	pub async fn done(&self) -> Error {
		match self.deadline {
			Some(deadline) => tokio::select! {
				biased;
				_ = self.cancel.cancelled() => Error::Cancelled,
				_ = time::sleep_until(deadline) => Error::DeadlineExceeded,
			},
			None => {
				self.cancel.cancelled().await;

				Error::Cancelled
			},
		}
	}

	/// Drives `fut` to completion unless the context finishes first.
	pub async fn run<F, T>(&self, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		self.check()?;

		tokio::select! {
			biased;
			result = fut => result,
			err = self.done() => Err(err),
		}
	}

	/// Sleeps for `duration` unless the context finishes first.
	pub async fn sleep(&self, duration: StdDuration) -> Result<()> {
		self.run(async {
			time::sleep(duration).await;

			Ok(())
		})
		.await
	}
}
impl Default for Context {
	fn default() -> Self {
		Self::background()
	}
}

/// Combines the outcomes of two concurrently awaited branches.
///
/// A branch's own failure wins over the context's state; the context error is
/// reported only when neither branch failed for another reason.
pub(crate) fn settle<A, B>(ctx: &Context, first: Result<A>, second: Result<B>) -> Result<(A, B)> {
	let failure = first
		.as_ref()
		.err()
		.filter(|err| !err.is_timeout())
		.or_else(|| second.as_ref().err().filter(|err| !err.is_timeout()));

	if let Some(err) = failure {
		return Err(err.clone());
	}

	ctx.check()?;

	Ok((first?, second?))
}
