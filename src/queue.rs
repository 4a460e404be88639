//! At-least-once topic queue used by the upload pipeline and message router.
//!
//! The queue never interprets payloads. Producers encode a typed message once with
//! [`encode`] and consumers decode it once with [`decode`]; everything in between
//! moves opaque bytes. Delivery acknowledgement is explicit: a consumer settles
//! each [`Delivery`] with an [`Ack`] and the queue applies the retry policy.

// std
use std::collections::VecDeque;
// crates.io
use serde::de::DeserializeOwned;
use tokio::sync::Notify;
// self
use crate::_prelude::*;

/// Boxed future returned by queue operations.
pub type QueueFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, QueueError>> + 'a + Send>>;

/// Errors raised by queue backends and payload codecs.
#[derive(Clone, Debug, ThisError)]
pub enum QueueError {
	/// The queue was closed and accepts no further work.
	#[error("Queue is closed.")]
	Closed,
	/// A message could not be encoded for publishing.
	#[error("Message for `{topic}` could not be encoded: {message}.")]
	Encode {
		/// Destination topic.
		topic: String,
		/// Encoder message.
		message: String,
	},
	/// A payload did not match the schema expected on its topic.
	#[error("Message on `{topic}` could not be decoded: {message}.")]
	Decode {
		/// Source topic.
		topic: String,
		/// Decoder message including the failing path.
		message: String,
	},
	/// No handler is registered for the topic.
	#[error("No handler is registered for topic `{topic}`.")]
	UnknownTopic {
		/// Unrecognized topic.
		topic: String,
	},
}

/// Consumer verdict for one delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ack {
	/// Work finished; drop the message.
	Ack,
	/// Work failed temporarily; redeliver while retries remain.
	Retry,
	/// Work failed permanently; park the message without retrying.
	DeadLetter,
}

/// One message handed to a consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
	/// Queue-assigned identifier, stable across redeliveries.
	pub id: u64,
	/// Topic the message was published on.
	pub topic: String,
	/// Opaque payload.
	pub payload: Vec<u8>,
	/// Delivery attempt, starting at 1.
	pub attempt: u32,
	/// Redeliveries allowed after the first attempt.
	pub max_retries: u32,
}

/// Publish/consume contract for the message substrate.
pub trait Queue
where
	Self: Send + Sync,
{
	/// Publishes `payload` on `topic`; failures are reported to the caller.
	fn enqueue<'a>(
		&'a self,
		topic: &'a str,
		payload: Vec<u8>,
		max_retries: u32,
	) -> QueueFuture<'a, ()>;

	/// Waits for the next message on `topic`; `None` once the queue is closed and drained.
	fn receive<'a>(&'a self, topic: &'a str) -> QueueFuture<'a, Option<Delivery>>;

	/// Applies the consumer's verdict for `delivery`.
	fn settle<'a>(&'a self, delivery: Delivery, ack: Ack) -> QueueFuture<'a, ()>;
}

/// Serializes a typed message for `topic`.
pub fn encode<T>(topic: &str, message: &T) -> Result<Vec<u8>, QueueError>
where
	T: Serialize,
{
	serde_json::to_vec(message)
		.map_err(|e| QueueError::Encode { topic: topic.into(), message: e.to_string() })
}

/// Deserializes the payload of a message received on `topic`.
pub fn decode<T>(topic: &str, payload: &[u8]) -> Result<T, QueueError>
where
	T: DeserializeOwned,
{
	let de = &mut serde_json::Deserializer::from_slice(payload);

	serde_path_to_error::deserialize(de).map_err(|e| QueueError::Decode {
		topic: topic.into(),
		message: format!("{} at `{}`", e.inner(), e.path()),
	})
}

#[derive(Debug, Default)]
struct TopicState {
	ready: VecDeque<Delivery>,
	dead: Vec<Delivery>,
	notify: Arc<Notify>,
}

#[derive(Debug, Default)]
struct QueueState {
	topics: HashMap<String, TopicState>,
	next_id: u64,
	closed: bool,
}

/// In-process [`Queue`] with per-topic FIFO order and a dead-letter list.
#[derive(Clone, Debug, Default)]
pub struct MemoryQueue {
	state: Arc<Mutex<QueueState>>,
}
impl MemoryQueue {
	/// Stops accepting messages and wakes every waiting consumer.
	///
	/// Messages already queued are still delivered.
	pub fn close(&self) {
		let mut state = self.state.lock();

		state.closed = true;

		for topic in state.topics.values() {
			topic.notify.notify_waiters();
		}
	}

	/// Returns the number of messages waiting on `topic`.
	pub fn pending(&self, topic: &str) -> usize {
		self.state.lock().topics.get(topic).map_or(0, |state| state.ready.len())
	}

	/// Returns the messages parked on `topic`.
	pub fn dead_letters(&self, topic: &str) -> Vec<Delivery> {
		self.state.lock().topics.get(topic).map(|state| state.dead.clone()).unwrap_or_default()
	}

	fn notifier(&self, topic: &str) -> Arc<Notify> {
		self.state.lock().topics.entry(topic.to_owned()).or_default().notify.clone()
	}

	fn try_pop(&self, topic: &str) -> Result<Option<Delivery>, QueueError> {
		let mut state = self.state.lock();
		let closed = state.closed;
		let topic_state = state.topics.entry(topic.to_owned()).or_default();

		match topic_state.ready.pop_front() {
			Some(delivery) => Ok(Some(delivery)),
			None if closed => Err(QueueError::Closed),
			None => Ok(None),
		}
	}
}
impl Queue for MemoryQueue {
	fn enqueue<'a>(
		&'a self,
		topic: &'a str,
		payload: Vec<u8>,
		max_retries: u32,
	) -> QueueFuture<'a, ()> {
		Box::pin(async move {
			let mut state = self.state.lock();

			if state.closed {
				return Err(QueueError::Closed);
			}

			state.next_id += 1;

			let id = state.next_id;
			let topic_state = state.topics.entry(topic.to_owned()).or_default();

			topic_state.ready.push_back(Delivery {
				id,
				topic: topic.to_owned(),
				payload,
				attempt: 1,
				max_retries,
			});
			topic_state.notify.notify_one();

			Ok(())
		})
	}

	fn receive<'a>(&'a self, topic: &'a str) -> QueueFuture<'a, Option<Delivery>> {
		Box::pin(async move {
			let notify = self.notifier(topic);

			loop {
				let notified = notify.notified();

				tokio::pin!(notified);
				notified.as_mut().enable();

				match self.try_pop(topic) {
					Ok(Some(delivery)) => return Ok(Some(delivery)),
					Ok(None) => notified.await,
					Err(QueueError::Closed) => return Ok(None),
					Err(e) => return Err(e),
				}
			}
		})
	}

	fn settle<'a>(&'a self, mut delivery: Delivery, ack: Ack) -> QueueFuture<'a, ()> {
		Box::pin(async move {
			let mut state = self.state.lock();
			let topic_state = state.topics.entry(delivery.topic.clone()).or_default();

			match ack {
				Ack::Ack => {},
				Ack::Retry if delivery.attempt <= delivery.max_retries => {
					tracing::debug!(
						topic = %delivery.topic,
						id = delivery.id,
						attempt = delivery.attempt,
						"redelivering message"
					);

					delivery.attempt += 1;
					topic_state.ready.push_back(delivery);
					topic_state.notify.notify_one();
				},
				Ack::Retry | Ack::DeadLetter => {
					tracing::warn!(
						topic = %delivery.topic,
						id = delivery.id,
						attempt = delivery.attempt,
						"dead-lettering message"
					);

					topic_state.dead.push(delivery);
				},
			}

			Ok(())
		})
	}
}
