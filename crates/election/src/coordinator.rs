use std::{collections::BTreeSet, time::Duration};

use async_channel as chan;
use tokio::{
	spawn,
	sync::{broadcast, oneshot, watch},
	task::JoinHandle,
	time::{sleep_until, timeout, Instant},
};
use tracing::{debug, error, info, instrument, warn};

use crate::{
	config::ElectionConfig,
	election::{Effect, Election, ElectionSnapshot},
	error::Error,
	event::ElectionEvent,
	identity::{PeerIdentity, Token},
	message,
	transport::Transport,
};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

enum Command {
	RequestHandoff,
	CancelHandoff,
	SetSecret(Option<Vec<u8>>),
	Depart(oneshot::Sender<()>),
}

/// Runs one peer's side of the leader election.
///
/// The protocol itself lives in a task spawned by [`PeerCoordinator::start`], which owns the
/// transport and the establishment timer. This handle only reads published snapshots and
/// forwards commands, so every query here is cheap and never blocks on the network.
///
/// Dropping the coordinator announces the departure like [`PeerCoordinator::signal_departure`]
/// would, but without waiting for the task to wind down.
pub struct PeerCoordinator<T: Transport> {
	config: ElectionConfig,
	transport: Option<T>,
	state_tx: Option<watch::Sender<ElectionSnapshot>>,
	state: watch::Receiver<ElectionSnapshot>,
	events: broadcast::Sender<ElectionEvent>,
	commands: Option<chan::Sender<Command>>,
	handle: Option<JoinHandle<()>>,
	secret: Option<Vec<u8>>,
}

impl<T: Transport> PeerCoordinator<T> {
	pub fn new(config: ElectionConfig, identity: &PeerIdentity, transport: T) -> Self {
		let (state_tx, state) = watch::channel(Election::new(identity.token()).snapshot());
		let (events, _) = broadcast::channel(config.event_capacity.max(1));

		Self {
			config,
			transport: Some(transport),
			state_tx: Some(state_tx),
			state,
			events,
			commands: None,
			handle: None,
			secret: None,
		}
	}

	/// Joins the election and resolves with the first leader this peer learns about.
	#[instrument(skip(self), fields(token = %self.current_peer_id()), err)]
	pub async fn start(&mut self) -> Result<Token, Error> {
		let (Some(transport), Some(state_tx)) = (self.transport.take(), self.state_tx.take())
		else {
			return Err(Error::AlreadyStarted);
		};

		let (commands_tx, commands_rx) = chan::bounded(16);

		let mut election = Election::new(self.current_peer_id());
		election.set_handoff_secret(self.secret.take());

		let runner = Runner {
			election,
			transport,
			commands: commands_rx,
			state: state_tx,
			events: self.events.clone(),
			establish_timeout: self.config.establish_timeout(),
			deadline: None,
		};

		self.handle = Some(spawn(runner.run()));
		self.commands = Some(commands_tx);

		let mut state = self.state.clone();
		let master = state
			.wait_for(|snapshot| snapshot.is_established)
			.await
			.map_err(|_| Error::Stopped)?
			.master;

		master.ok_or(Error::Stopped)
	}

	/// Broadcasts our departure, closes the transport and waits for the election task.
	#[instrument(skip(self), fields(token = %self.current_peer_id()))]
	pub async fn signal_departure(&mut self) {
		let Some(commands) = self.commands.take() else {
			return;
		};

		let (ack_tx, ack_rx) = oneshot::channel();
		if commands.send(Command::Depart(ack_tx)).await.is_ok() {
			// A dropped ack means the task already exited on its own
			let _ = ack_rx.await;
		} else {
			warn!("Election task already gone, departure not announced");
		}

		wait_stop_or_abort(self.handle.take()).await;
	}

	#[must_use]
	pub fn is_leader(&self) -> bool {
		self.state.borrow().is_leader()
	}

	#[must_use]
	pub fn master(&self) -> Option<Token> {
		self.state.borrow().master
	}

	#[must_use]
	pub fn current_peer_id(&self) -> Token {
		self.state.borrow().token
	}

	#[must_use]
	pub fn all_known_peer_ids(&self) -> BTreeSet<Token> {
		self.state.borrow().collected.clone()
	}

	#[must_use]
	pub fn snapshot(&self) -> ElectionSnapshot {
		self.state.borrow().clone()
	}

	/// Snapshot stream, updated after every input the election task handles.
	#[must_use]
	pub fn watch(&self) -> watch::Receiver<ElectionSnapshot> {
		self.state.clone()
	}

	#[must_use]
	pub fn subscribe(&self) -> broadcast::Receiver<ElectionEvent> {
		self.events.subscribe()
	}

	/// Calls `callback` with our leadership status on every leader transition.
	pub fn on_leader_change<F>(&self, mut callback: F) -> JoinHandle<()>
	where
		F: FnMut(bool) + Send + 'static,
	{
		let mut events = self.events.subscribe();

		spawn(async move {
			loop {
				match events.recv().await {
					Ok(ElectionEvent::LeaderChanged { is_leader, .. }) => callback(is_leader),
					Ok(_) => {}
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						warn!(skipped, "Leader change listener lagged behind");
					}
					Err(broadcast::error::RecvError::Closed) => break,
				}
			}
		})
	}

	/// Asks the current leader to cede leadership to this peer.
	#[instrument(skip(self), fields(token = %self.current_peer_id()), err)]
	pub async fn request_handoff_to_self(&self) -> Result<(), Error> {
		let Some(commands) = &self.commands else {
			return Err(Error::NotStarted);
		};

		{
			let snapshot = self.state.borrow();
			if snapshot.is_leader() {
				return Ok(());
			}
			if snapshot.master.is_none() {
				return Err(Error::NotEstablished);
			}
		}

		commands
			.send(Command::RequestHandoff)
			.await
			.map_err(|_| Error::Stopped)?;

		let handoff_timeout = self.config.handoff_timeout();
		let mut state = self.state.clone();

		let outcome = timeout(handoff_timeout, state.wait_for(ElectionSnapshot::is_leader))
			.await
			.map(|res| res.map(|_| ()));

		match outcome {
			Ok(Ok(())) => Ok(()),
			Ok(Err(_)) => Err(Error::Stopped),
			Err(_) => {
				warn!(?handoff_timeout, "No leader answered our handoff request");
				if commands.send(Command::CancelHandoff).await.is_ok() {
					// Leave only once the task stopped waiting, so callers see a settled state
					let _ = state.wait_for(|snapshot| !snapshot.is_waiting_for_master).await;
				}
				Err(Error::HandoffTimedOut(handoff_timeout))
			}
		}
	}

	/// Replaces the secret handed over together with leadership.
	pub async fn set_handoff_secret(&mut self, secret: Option<Vec<u8>>) -> Result<(), Error> {
		match &self.commands {
			Some(commands) => commands
				.send(Command::SetSecret(secret))
				.await
				.map_err(|_| Error::Stopped),
			None if self.transport.is_some() => {
				self.secret = secret;
				Ok(())
			}
			None => Err(Error::Stopped),
		}
	}
}

async fn wait_stop_or_abort(maybe_handle: Option<JoinHandle<()>>) {
	if let Some(handle) = maybe_handle {
		let abort_handle = handle.abort_handle();

		match timeout(STOP_TIMEOUT, handle).await {
			Ok(Ok(())) => {}
			Ok(Err(e)) => {
				if e.is_panic() {
					error!(?e, "Election task panicked");
				}
			}
			Err(_) => {
				error!("Election task failed to stop in the allotted time, will force abortion");
				abort_handle.abort();
			}
		}
	}
}

struct Runner<T> {
	election: Election,
	transport: T,
	commands: chan::Receiver<Command>,
	state: watch::Sender<ElectionSnapshot>,
	events: broadcast::Sender<ElectionEvent>,
	establish_timeout: Duration,
	deadline: Option<Instant>,
}

impl<T: Transport> Runner<T> {
	async fn run(mut self) {
		let effects = self.election.start();
		self.apply(effects);

		loop {
			let deadline = self.deadline;

			tokio::select! {
				payload = self.transport.recv() => {
					let Some(payload) = payload else {
						warn!(token = %self.election.token(), "Transport closed under us, leaving election");
						break;
					};

					if let Some(signal) = message::decode(&payload) {
						let effects = self.election.handle(signal);
						self.apply(effects);
					}
				}

				command = self.commands.recv() => match command {
					Ok(Command::RequestHandoff) => {
						let effects = self.election.request_handoff();
						self.apply(effects);
					}
					Ok(Command::CancelHandoff) => {
						self.election.cancel_handoff();
						self.publish();
					}
					Ok(Command::SetSecret(secret)) => self.election.set_handoff_secret(secret),
					Ok(Command::Depart(ack)) => {
						self.depart();
						let _ = ack.send(());
						break;
					}
					Err(chan::RecvError) => {
						debug!(token = %self.election.token(), "Coordinator dropped");
						self.depart();
						break;
					}
				},

				() = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
					self.deadline = None;
					let effects = self.election.timer_fired();
					self.apply(effects);
				}
			}
		}

		info!(token = %self.election.token(), "Election task stopped");
	}

	fn depart(&mut self) {
		let effects = self.election.depart();
		self.apply(effects);
		self.deadline = None;
		self.transport.close();
	}

	fn apply(&mut self, effects: Vec<Effect>) {
		for effect in effects {
			match effect {
				Effect::Broadcast(signal) => match message::encode(signal) {
					Ok(payload) => {
						if let Err(e) = self.transport.post(payload) {
							warn!(?e, token = %self.election.token(), "Failed to post election message");
						}
					}
					Err(e) => error!(?e, "Failed to encode election message"),
				},
				Effect::ArmTimer => {
					self.deadline = Some(Instant::now() + self.establish_timeout);
				}
				Effect::Emit(event) => {
					// No subscribers is fine
					let _ = self.events.send(event);
				}
			}
		}

		self.publish();
	}

	fn publish(&self) {
		self.state.send_if_modified(|current| {
			let next = self.election.snapshot();
			if *current == next {
				false
			} else {
				*current = next;
				true
			}
		});
	}
}
