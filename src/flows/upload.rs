//! Queue-backed upload of edited documents into the CRM.
//!
//! The producer side ([`UploadPipeline::enqueue`]) probes the file size and rejects
//! oversized files before anything reaches the queue. Workers started with
//! [`UploadPipeline::start`] consume jobs, classify every failure, and settle each
//! delivery with the matching [`Ack`]; they never re-enqueue on their own.

// crates.io
use tokio::task::JoinHandle;
// self
use crate::{
	_prelude::*,
	auth::Credential,
	config::UploadConfig,
	context,
	flows::TokenAccess,
	obs::{self, FlowKind},
	provider::{FileTransfer, UploadTarget},
	queue::{self, Ack, Delivery, Queue},
};

/// One document waiting to be saved into the CRM.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadJob {
	/// Composite user key whose token performs the upload.
	pub user: String,
	/// Deal the file is attached to.
	pub deal_id: String,
	/// CRM file being replaced.
	pub file_id: String,
	/// Name the edited file is stored under.
	pub filename: String,
	/// Location of the edited bytes on the document server.
	pub url: Url,
}
impl UploadJob {
	fn target(&self) -> UploadTarget {
		UploadTarget {
			deal_id: self.deal_id.clone(),
			file_id: self.file_id.clone(),
			filename: self.filename.clone(),
		}
	}
}

/// Lifecycle of one upload job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobState {
	/// Waiting on the queue.
	Queued,
	/// Picked up by a worker.
	Running,
	/// Uploaded.
	Succeeded,
	/// Failed in a way a later attempt may fix.
	FailedRetryable,
	/// Failed in a way no retry can fix.
	FailedTerminal,
}
impl JobState {
	/// Classifies a processing error.
	///
	/// Size violations, rejected grants, and other non-retryable errors are terminal
	/// regardless of the queue's remaining retry budget.
	pub fn from_error(err: &Error) -> Self {
		if err.is_retryable() { Self::FailedRetryable } else { Self::FailedTerminal }
	}

	/// Returns the queue verdict for a finished state.
	pub const fn ack(self) -> Ack {
		match self {
			Self::Succeeded => Ack::Ack,
			Self::FailedTerminal => Ack::DeadLetter,
			Self::Queued | Self::Running | Self::FailedRetryable => Ack::Retry,
		}
	}

	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Queued => "queued",
			Self::Running => "running",
			Self::Succeeded => "succeeded",
			Self::FailedRetryable => "failed_retryable",
			Self::FailedTerminal => "failed_terminal",
		}
	}
}
impl Display for JobState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Producer and worker pool for [`UploadJob`]s.
pub struct UploadPipeline {
	access: Arc<TokenAccess>,
	files: Arc<dyn FileTransfer>,
	queue: Arc<dyn Queue>,
	config: UploadConfig,
}
impl UploadPipeline {
	/// Wires a pipeline over its collaborators.
	pub fn new(
		access: Arc<TokenAccess>,
		files: Arc<dyn FileTransfer>,
		queue: Arc<dyn Queue>,
		config: UploadConfig,
	) -> Self {
		Self { access, files, queue, config }
	}

	/// Returns the pipeline configuration.
	pub fn config(&self) -> &UploadConfig {
		&self.config
	}

	/// Probes the file size and publishes `job`.
	///
	/// Oversized files fail with [`Error::FileTooLarge`] and never reach the queue.
	/// Publishing failures are returned to the caller.
	pub async fn enqueue(&self, ctx: &Context, job: UploadJob) -> Result<()> {
		let probe = ctx.with_timeout(self.config.probe_timeout());
		let size = probe.run(self.files.probe_size(&probe, &job.url)).await?;

		self.check_size(size)?;

		let payload = queue::encode(&self.config.topic, &job)?;

		ctx.run(async {
			self.queue
				.enqueue(&self.config.topic, payload, self.config.max_retries)
				.await
				.map_err(Error::from)
		})
		.await?;

		tracing::debug!(user = %job.user, file = %job.file_id, size, state = %JobState::Queued, "upload job queued");

		Ok(())
	}

	/// Spawns the configured number of workers consuming until `ctx` ends or the queue closes.
	pub fn start(self: &Arc<Self>, ctx: &Context) -> Vec<JoinHandle<()>> {
		(0..self.config.workers)
			.map(|slot| {
				let pipeline = self.clone();
				let ctx = ctx.clone();

				tokio::spawn(async move { pipeline.work(slot, ctx).await })
			})
			.collect()
	}

	/// Processes one delivery and settles it with the queue.
	pub async fn handle(&self, ctx: &Context, delivery: Delivery) -> Result<JobState> {
		let state = match queue::decode::<UploadJob>(&delivery.topic, &delivery.payload) {
			Ok(job) => {
				tracing::debug!(
					id = delivery.id,
					attempt = delivery.attempt,
					user = %job.user,
					state = %JobState::Running,
					"upload job picked up"
				);

				let job_ctx = ctx.with_timeout(self.config.timeout());

				match self.process(&job_ctx, &job).await {
					Ok(()) => JobState::Succeeded,
					Err(e) => JobState::from_error(&e),
				}
			},
			Err(e) => {
				tracing::warn!(id = delivery.id, error = %e, "discarding undecodable upload job");

				JobState::FailedTerminal
			},
		};
		let id = delivery.id;

		self.queue.settle(delivery, state.ack()).await?;
		obs::record_job_state(state.as_str());

		tracing::debug!(id, state = %state, "upload job settled");

		Ok(state)
	}

	/// Runs one job: token and size probe concurrently, then download and upload.
	pub async fn process(&self, ctx: &Context, job: &UploadJob) -> Result<()> {
		obs::observe(FlowKind::Upload, "process", async {
			let (credential, size) = tokio::join!(
				self.token_with_backoff(ctx, &job.user),
				ctx.run(self.files.probe_size(ctx, &job.url)),
			);
			let (credential, size) = context::settle(ctx, credential, size)?;

			self.check_size(size)?;

			let file = ctx.run(self.files.download(ctx, &job.url, self.config.max_size)).await?;
			let target = job.target();

			ctx.run(self.files.upload(ctx, &credential, file, &target)).await
		})
		.await
	}

	async fn work(&self, slot: usize, ctx: Context) {
		tracing::debug!(slot, topic = %self.config.topic, "upload worker started");

		loop {
			let received = ctx
				.run(async { self.queue.receive(&self.config.topic).await.map_err(Error::from) })
				.await;
			let delivery = match received {
				Ok(Some(delivery)) => delivery,
				Ok(None) => break,
				Err(e) => {
					if !e.is_timeout() {
						tracing::warn!(slot, error = %e, "upload worker stopped");
					}

					break;
				},
			};

			if let Err(e) = self.handle(&ctx, delivery).await {
				tracing::warn!(slot, error = %e, "could not settle upload job");
			}
		}

		tracing::debug!(slot, "upload worker finished");
	}

	async fn token_with_backoff(&self, ctx: &Context, user: &str) -> Result<Credential> {
		let mut attempt = 1;

		loop {
			match self.access.access_token(ctx, user).await {
				Ok(credential) => return Ok(credential),
				Err(e) if e.is_retryable() && attempt < self.config.token_attempts => {
					let delay = self.config.backoff(attempt);

					tracing::debug!(user, attempt, ?delay, error = %e, "retrying token resolution");
					ctx.sleep(delay).await?;

					attempt += 1;
				},
				Err(e) => return Err(e),
			}
		}
	}

	fn check_size(&self, size: u64) -> Result<()> {
		if size > self.config.max_size {
			return Err(Error::FileTooLarge { size, limit: self.config.max_size });
		}

		Ok(())
	}
}
impl Debug for UploadPipeline {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("UploadPipeline").field("config", &self.config).finish()
	}
}
