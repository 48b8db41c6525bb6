use std::sync::{
	atomic::{AtomicUsize, Ordering},
	Arc,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

#[derive(Debug, Error)]
pub enum TransportError {
	#[error("transport closed")]
	Closed,
}

/// Best-effort broadcast shared by every peer of one execution context.
///
/// Implementations may lose or duplicate posts and give no ordering guarantee across
/// senders, but they must deliver to one listener serially and never echo a post back to its
/// sender.
#[async_trait]
pub trait Transport: Send + 'static {
	fn post(&self, payload: Vec<u8>) -> Result<(), TransportError>;

	/// Next payload from another peer, `None` once the transport is closed.
	async fn recv(&mut self) -> Option<Vec<u8>>;

	fn close(&mut self);
}

#[derive(Debug, Clone)]
struct Envelope {
	origin: usize,
	payload: Arc<[u8]>,
}

/// In-process bus, every [`LocalTransport`] connected to it sees every other one's posts.
#[derive(Debug, Clone)]
pub struct LocalBus {
	tx: broadcast::Sender<Envelope>,
	next_id: Arc<AtomicUsize>,
}

impl LocalBus {
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		let (tx, _) = broadcast::channel(capacity);

		Self {
			tx,
			next_id: Arc::default(),
		}
	}

	#[must_use]
	pub fn connect(&self) -> LocalTransport {
		LocalTransport {
			id: self.next_id.fetch_add(1, Ordering::Relaxed),
			tx: self.tx.clone(),
			rx: Some(self.tx.subscribe()),
		}
	}
}

#[derive(Debug)]
pub struct LocalTransport {
	id: usize,
	tx: broadcast::Sender<Envelope>,
	rx: Option<broadcast::Receiver<Envelope>>,
}

#[async_trait]
impl Transport for LocalTransport {
	fn post(&self, payload: Vec<u8>) -> Result<(), TransportError> {
		if self.rx.is_none() {
			return Err(TransportError::Closed);
		}

		// Nobody listening is not an error for a broadcast
		let _ = self.tx.send(Envelope {
			origin: self.id,
			payload: payload.into(),
		});

		Ok(())
	}

	async fn recv(&mut self) -> Option<Vec<u8>> {
		let rx = self.rx.as_mut()?;

		loop {
			match rx.recv().await {
				Ok(Envelope { origin, .. }) if origin == self.id => continue,
				Ok(Envelope { payload, .. }) => return Some(payload.to_vec()),
				Err(broadcast::error::RecvError::Lagged(skipped)) => {
					warn!(skipped, connection = self.id, "Transport lagged, messages lost");
				}
				Err(broadcast::error::RecvError::Closed) => return None,
			}
		}
	}

	fn close(&mut self) {
		self.rx = None;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn posts_reach_everyone_but_the_sender() {
		let bus = LocalBus::new(16);
		let mut a = bus.connect();
		let mut b = bus.connect();
		let mut c = bus.connect();

		a.post(b"hello".to_vec()).unwrap();
		b.post(b"world".to_vec()).unwrap();

		assert_eq!(b.recv().await.as_deref(), Some(&b"hello"[..]));
		assert_eq!(c.recv().await.as_deref(), Some(&b"hello"[..]));
		assert_eq!(c.recv().await.as_deref(), Some(&b"world"[..]));
		assert_eq!(a.recv().await.as_deref(), Some(&b"world"[..]));
	}

	#[tokio::test]
	async fn closed_transport_refuses_posts() {
		let bus = LocalBus::new(4);
		let mut a = bus.connect();
		a.close();

		assert!(matches!(a.post(vec![1]), Err(TransportError::Closed)));
		assert_eq!(a.recv().await, None);
	}

	#[tokio::test]
	async fn lagging_listener_skips_lost_messages() {
		let bus = LocalBus::new(2);
		let a = bus.connect();
		let mut b = bus.connect();

		for i in 0..5_u8 {
			a.post(vec![i]).unwrap();
		}

		assert_eq!(b.recv().await, Some(vec![3]));
		assert_eq!(b.recv().await, Some(vec![4]));
	}
}
