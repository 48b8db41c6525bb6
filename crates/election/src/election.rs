//! The election protocol as a synchronous state machine.
//!
//! [`Election`] owns all the peer local state and never performs I/O: every input returns
//! the [`Effect`]s the driver must carry out. The driver is the
//! [`PeerCoordinator`](crate::PeerCoordinator) in production and a plain message shuffler
//! in the simulation tests.
//!
//! Leader is the numerically largest token a peer knows about. Membership converges by
//! gossiping collected token snapshots until a sender and a receiver agree, or the
//! establishment timer fires. Departed tokens are tombstoned so late duplicates of a dead
//! peer's gossip can never bring it back.
//!
//! Snapshots sent in reply to gossip are never repeated: once a peer told everyone what it
//! knows, a sender that still lacks some of it gets no second copy. Peers whose tombstones
//! disagree after a lost death notice would otherwise answer each other forever.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, info, trace, warn};

use crate::{event::ElectionEvent, identity::Token, message::Signal};

/// What the driver must do after feeding an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
	Broadcast(Signal),
	/// (Re)arm the establishment timer, replacing any pending deadline.
	ArmTimer,
	Emit(ElectionEvent),
}

/// Observable part of the election state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionSnapshot {
	pub token: Token,
	pub master: Option<Token>,
	pub reestablish: Option<Token>,
	pub collected: BTreeSet<Token>,
	pub is_established: bool,
	pub is_waiting_for_master: bool,
}

impl ElectionSnapshot {
	#[must_use]
	pub fn is_leader(&self) -> bool {
		self.master == Some(self.token)
	}
}

#[derive(Debug)]
pub struct Election {
	token: Token,
	collected: BTreeSet<Token>,
	departed: HashSet<Token>,
	master: Option<Token>,
	reestablish: Option<Token>,
	is_established: bool,
	is_waiting_for_master: bool,
	/// Set once we ceded leadership through a handoff, cleared when we lead again.
	has_given_up: bool,
	has_departed: bool,
	secret: Option<Vec<u8>>,
	/// Last snapshot we broadcast, replies identical to it are suppressed.
	last_shared: Option<Signal>,
	effects: Vec<Effect>,
}

impl Election {
	#[must_use]
	pub fn new(token: Token) -> Self {
		Self {
			token,
			collected: BTreeSet::from([token]),
			departed: HashSet::new(),
			master: None,
			reestablish: None,
			is_established: false,
			is_waiting_for_master: false,
			has_given_up: false,
			has_departed: false,
			secret: None,
			last_shared: None,
			effects: Vec::new(),
		}
	}

	#[must_use]
	pub const fn token(&self) -> Token {
		self.token
	}

	#[must_use]
	pub const fn master(&self) -> Option<Token> {
		self.master
	}

	#[must_use]
	pub fn is_leader(&self) -> bool {
		self.master == Some(self.token)
	}

	#[must_use]
	pub const fn is_established(&self) -> bool {
		self.is_established
	}

	#[must_use]
	pub const fn is_waiting_for_master(&self) -> bool {
		self.is_waiting_for_master
	}

	#[must_use]
	pub const fn collected(&self) -> &BTreeSet<Token> {
		&self.collected
	}

	#[must_use]
	pub fn snapshot(&self) -> ElectionSnapshot {
		ElectionSnapshot {
			token: self.token,
			master: self.master,
			reestablish: self.reestablish,
			collected: self.collected.clone(),
			is_established: self.is_established,
			is_waiting_for_master: self.is_waiting_for_master,
		}
	}

	/// Secret state that travels with leadership on a handoff.
	pub fn set_handoff_secret(&mut self, secret: Option<Vec<u8>>) {
		self.secret = secret;
	}

	#[must_use]
	pub fn handoff_secret(&self) -> Option<&[u8]> {
		self.secret.as_deref()
	}

	/// Joins the election by announcing ourselves.
	pub fn start(&mut self) -> Vec<Effect> {
		info!(token = %self.token, "Joining election");

		self.share_snapshot();
		self.effects.push(Effect::ArmTimer);

		self.drain()
	}

	pub fn handle(&mut self, signal: Signal) -> Vec<Effect> {
		if self.has_departed {
			return Vec::new();
		}

		match signal {
			Signal::Collected {
				tokens,
				master,
				reestablish,
			} => self.on_snapshot(Some(tokens), master, reestablish),
			Signal::MasterElected {
				master,
				reestablish,
			} => self.on_snapshot(None, Some(master), reestablish),
			Signal::TokenDied(token) => self.on_token_died(token),
			Signal::ShouldGiveUpMaster { target } => self.on_give_up_request(target),
			Signal::HasGaveUpMaster { target, secret } => self.on_gave_up(target, secret),
		}

		self.drain()
	}

	/// The establishment timer elapsed, elect with whatever we know.
	pub fn timer_fired(&mut self) -> Vec<Effect> {
		if !self.has_departed && self.master.is_none() {
			debug!(token = %self.token, collected = ?self.collected, "Establishment timer fired");
			self.decide();
		}

		self.drain()
	}

	/// Asks the current leader to cede to us. A no-op if we already lead.
	pub fn request_handoff(&mut self) -> Vec<Effect> {
		if self.has_departed || self.is_leader() {
			return Vec::new();
		}

		info!(token = %self.token, master = ?self.master, "Requesting leadership handoff");
		self.is_waiting_for_master = true;
		self.broadcast(Signal::ShouldGiveUpMaster { target: self.token });

		self.drain()
	}

	/// Stops waiting for a handoff that never came.
	pub fn cancel_handoff(&mut self) {
		self.is_waiting_for_master = false;
	}

	/// Announces our departure, after which every input is ignored.
	pub fn depart(&mut self) -> Vec<Effect> {
		if self.has_departed {
			return Vec::new();
		}

		info!(token = %self.token, was_leader = self.is_leader(), "Leaving election");
		self.broadcast(Signal::TokenDied(self.token));
		self.has_departed = true;
		self.is_waiting_for_master = false;

		if let Some(previous) = self.master.take() {
			self.emit(ElectionEvent::LeaderChanged {
				previous: Some(previous),
				current: None,
				is_leader: false,
			});
		}

		self.drain()
	}

	fn on_snapshot(
		&mut self,
		tokens: Option<BTreeSet<Token>>,
		master: Option<Token>,
		reestablish: Option<Token>,
	) {
		if let Some(died) = reestablish {
			// The sender saw `died` leave before we did
			if died != self.token && !self.departed.contains(&died) {
				self.on_token_died(died);
			}
		}

		if master.is_none() {
			if let Some(active) = self.reestablish {
				if reestablish != Some(active) {
					debug!(token = %self.token, %active, "Ignoring stale snapshot during re-election");
					return;
				}
			}
		}

		let incoming = tokens.map(|tokens| {
			tokens
				.into_iter()
				.filter(|token| !self.departed.contains(token))
				.collect::<BTreeSet<_>>()
		});

		let before = self.collected.len();
		if let Some(incoming) = &incoming {
			self.collected.extend(incoming.iter().copied());
		}
		let grew = self.collected.len() > before;
		let sender_lacks = incoming
			.as_ref()
			.is_some_and(|incoming| !self.collected.is_subset(incoming));

		if grew {
			debug!(token = %self.token, collected = ?self.collected, "Membership grew");
		}

		if let Some(master) = master {
			let announced = self.on_master_claim(master);
			if !announced && (grew || sender_lacks) {
				self.answer_snapshot();
			}
			return;
		}

		if grew || sender_lacks {
			self.answer_snapshot();
		} else if self.master.is_none() && incoming.is_some() {
			// Sender and us agree on membership, nothing left to wait for
			self.decide();
		}
	}

	/// Returns whether we broadcast our own claim in response.
	fn on_master_claim(&mut self, claimed: Token) -> bool {
		if self.departed.contains(&claimed) {
			debug!(token = %self.token, %claimed, "Ignoring claim of a departed peer");
			return false;
		}

		self.collected.insert(claimed);

		if self.master == Some(claimed) {
			return false;
		}

		let top = self.top();
		if top == Some(self.token) && claimed < self.token && !self.has_given_up {
			info!(token = %self.token, %claimed, "Outranking lower master claim");
			self.claim_leadership();
			return true;
		}

		match self.master {
			None => self.set_master(claimed),
			Some(current) if claimed > current => self.set_master(claimed),
			Some(current) if current == self.token => {
				// We lead through a handoff and a lower peer raced us, remind everyone
				self.share_snapshot();
				return true;
			}
			Some(current) => {
				debug!(token = %self.token, %claimed, %current, "Ignoring lower master claim");
			}
		}

		false
	}

	fn on_token_died(&mut self, died: Token) {
		if died == self.token {
			warn!(token = %self.token, "Received our own death notice, ignoring");
			return;
		}

		if !self.departed.insert(died) {
			return;
		}

		self.collected.remove(&died);
		info!(token = %self.token, %died, remaining = self.collected.len(), "Peer left");
		self.emit(ElectionEvent::PeerDied(died));

		if self.master != Some(died) {
			return;
		}

		self.master = None;
		self.reestablish = Some(died);
		self.emit(ElectionEvent::LeaderChanged {
			previous: Some(died),
			current: None,
			is_leader: false,
		});

		if self.collected.len() == 1 {
			// Nobody left to negotiate with
			self.decide();
		} else {
			self.share_snapshot();
			self.effects.push(Effect::ArmTimer);
		}
	}

	fn on_give_up_request(&mut self, target: Token) {
		if target == self.token || !self.is_leader() || self.departed.contains(&target) {
			return;
		}

		info!(token = %self.token, %target, "Giving up leadership");
		self.collected.insert(target);
		self.has_given_up = true;
		let secret = self.secret.take();
		self.set_master(target);
		self.broadcast(Signal::HasGaveUpMaster {
			target: Some(target),
			secret,
		});
	}

	fn on_gave_up(&mut self, target: Option<Token>, secret: Option<Vec<u8>>) {
		match target {
			Some(target) if target != self.token => {
				if !self.departed.contains(&target) && self.master != Some(target) {
					self.collected.insert(target);
					self.set_master(target);
				}
			}
			_ => {
				if !self.is_waiting_for_master {
					debug!(token = %self.token, "Ignoring handoff we did not ask for");
					return;
				}

				info!(token = %self.token, "Took over leadership from handoff");
				self.is_waiting_for_master = false;
				self.secret.clone_from(&secret);
				self.set_master(self.token);
				self.emit(ElectionEvent::HandoffReceived { secret });
				self.share_snapshot();
			}
		}
	}

	fn decide(&mut self) {
		let Some(top) = self.top() else {
			return;
		};

		let reestablish = self.reestablish;
		info!(token = %self.token, master = %top, collected = ?self.collected, "Elected master");
		self.set_master(top);
		self.broadcast(Signal::Collected {
			tokens: self.collected.clone(),
			master: Some(top),
			reestablish,
		});
	}

	fn claim_leadership(&mut self) {
		self.set_master(self.token);
		self.share_snapshot();
	}

	fn set_master(&mut self, master: Token) {
		let previous = self.master.replace(master);
		self.reestablish = None;
		self.is_established = true;

		if master == self.token {
			self.has_given_up = false;
			self.is_waiting_for_master = false;
		}

		if previous != Some(master) {
			self.emit(ElectionEvent::LeaderChanged {
				previous,
				current: Some(master),
				is_leader: master == self.token,
			});
		}
	}

	fn current_snapshot(&self) -> Signal {
		Signal::Collected {
			tokens: self.collected.clone(),
			master: self.master,
			reestablish: self.reestablish,
		}
	}

	fn share_snapshot(&mut self) {
		self.broadcast(self.current_snapshot());
	}

	/// Shares our snapshot unless it is exactly what we broadcast last.
	fn answer_snapshot(&mut self) {
		let snapshot = self.current_snapshot();

		if self.last_shared.as_ref() == Some(&snapshot) {
			trace!(token = %self.token, "Snapshot already shared, not repeating it");
			return;
		}

		self.broadcast(snapshot);
	}

	fn top(&self) -> Option<Token> {
		self.collected.iter().next_back().copied()
	}

	fn broadcast(&mut self, signal: Signal) {
		if matches!(signal, Signal::Collected { .. }) {
			self.last_shared = Some(signal.clone());
		}

		self.effects.push(Effect::Broadcast(signal));
	}

	fn emit(&mut self, event: ElectionEvent) {
		self.effects.push(Effect::Emit(event));
	}

	fn drain(&mut self) -> Vec<Effect> {
		std::mem::take(&mut self.effects)
	}
}
