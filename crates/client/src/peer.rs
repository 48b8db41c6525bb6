use std::future::Future;

use mt_election::{ElectionEvent, PeerCoordinator, PeerIdentity, Token, Transport};
use mt_store::{StoreHandle, TabScopedStore};
use tokio::{
	spawn,
	sync::broadcast::{self, error::RecvError},
	task::JoinHandle,
};
use tracing::{debug, info, instrument, warn};

use crate::{config::ClientConfig, error::Error};

/// One running client instance.
///
/// Owns its election coordinator and its state store, both created once here and reached
/// through this value rather than through globals. Slices of peers that leave are dropped
/// from the store as their departure is observed.
pub struct Peer<S, T, Tr: Transport> {
	coordinator: PeerCoordinator<Tr>,
	store: StoreHandle<S, T>,
	store_task: JoinHandle<()>,
	reaper: Option<JoinHandle<()>>,
}

impl<S, T, Tr> Peer<S, T, Tr>
where
	S: Send + Sync + 'static,
	T: Default + Send + Sync + 'static,
	Tr: Transport,
{
	pub fn new(config: &ClientConfig, identity: &PeerIdentity, transport: Tr, shared: S) -> Self {
		let coordinator = PeerCoordinator::new(config.election.clone(), identity, transport);
		let (store, store_task) =
			StoreHandle::spawn(TabScopedStore::with_shared(identity.token(), shared));

		Self {
			coordinator,
			store,
			store_task,
			reaper: None,
		}
	}

	/// Joins the election and starts reaping departed peers' slices.
	#[instrument(skip(self), fields(token = %self.token()), err)]
	pub async fn start(&mut self) -> Result<Token, Error> {
		// Subscribe first so no departure slips through while we join
		let events = self.coordinator.subscribe();
		let master = self.coordinator.start().await?;

		self.reaper = Some(spawn(reap_departed(events, self.store.clone())));
		info!(%master, is_leader = self.coordinator.is_leader(), "Peer started");

		Ok(master)
	}

	#[must_use]
	pub fn token(&self) -> Token {
		self.coordinator.current_peer_id()
	}

	#[must_use]
	pub fn is_leader(&self) -> bool {
		self.coordinator.is_leader()
	}

	#[must_use]
	pub const fn election(&self) -> &PeerCoordinator<Tr> {
		&self.coordinator
	}

	pub fn election_mut(&mut self) -> &mut PeerCoordinator<Tr> {
		&mut self.coordinator
	}

	#[must_use]
	pub const fn store(&self) -> &StoreHandle<S, T> {
		&self.store
	}

	/// Runs `side_effect` only while this peer leads, so exactly one peer talks to the
	/// backend for the whole client.
	pub async fn if_leader<F, Fut, R>(&self, side_effect: F) -> Option<R>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = R>,
	{
		if self.is_leader() {
			Some(side_effect().await)
		} else {
			debug!(token = %self.token(), "Skipping leader-only work");
			None
		}
	}

	/// Announces our departure and winds down every task this peer owns.
	#[instrument(skip(self), fields(token = %self.token()))]
	pub async fn shutdown(mut self) {
		self.coordinator.signal_departure().await;

		if let Some(reaper) = self.reaper.take() {
			reaper.abort();
		}

		self.store.close();
		if let Err(e) = self.store_task.await {
			warn!(?e, "Store task did not finish cleanly");
		}

		info!("Peer shut down");
	}
}

async fn reap_departed<S, T>(
	mut events: broadcast::Receiver<ElectionEvent>,
	store: StoreHandle<S, T>,
) where
	S: Send + Sync + 'static,
	T: Default + Send + Sync + 'static,
{
	loop {
		match events.recv().await {
			Ok(ElectionEvent::PeerDied(token)) => match store.remove_tab(token).await {
				Ok(true) => debug!(%token, "Dropped state of departed peer"),
				Ok(false) => {}
				Err(e) => {
					debug!(?e, "Store gone, stopping reaper");
					break;
				}
			},
			Ok(_) => {}
			Err(RecvError::Lagged(skipped)) => {
				warn!(skipped, "Reaper lagged behind election events, some slices may linger");
			}
			Err(RecvError::Closed) => break,
		}
	}
}
