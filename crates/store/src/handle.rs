use std::sync::Arc;

use async_channel as chan;
use mt_election::Token;
use tokio::{
	spawn,
	sync::{oneshot, watch},
	task::JoinHandle,
};
use tracing::{debug, instrument};

use crate::{
	error::Error,
	state::{GlobalState, Subscriber, SubscriptionId, TabScopedStore},
};

type Snapshot<S, T> = Arc<GlobalState<S, T>>;

enum Command<S, T> {
	Dispatch {
		tab_id: Option<Token>,
		update: Box<dyn FnOnce(&T) -> T + Send>,
		ack: oneshot::Sender<Snapshot<S, T>>,
	},
	DispatchShared {
		update: Box<dyn FnOnce(&S) -> S + Send>,
		ack: oneshot::Sender<Snapshot<S, T>>,
	},
	RemoveTab {
		tab_id: Token,
		ack: oneshot::Sender<bool>,
	},
	Subscribe {
		callback: Subscriber<S, T>,
		ack: oneshot::Sender<SubscriptionId>,
	},
	Unsubscribe {
		id: SubscriptionId,
		ack: oneshot::Sender<bool>,
	},
}

/// Cloneable entry point to a [`TabScopedStore`] owned by its own task.
///
/// Every write is a command processed one at a time by the owning task, so dispatches from
/// any number of threads are serialized without locks. Readers never wait on writers, they
/// get the latest snapshot from a watch channel.
pub struct StoreHandle<S, T> {
	own_id: Token,
	commands: chan::Sender<Command<S, T>>,
	state: watch::Receiver<Snapshot<S, T>>,
}

impl<S, T> Clone for StoreHandle<S, T> {
	fn clone(&self) -> Self {
		Self {
			own_id: self.own_id,
			commands: self.commands.clone(),
			state: self.state.clone(),
		}
	}
}

impl<S, T> StoreHandle<S, T>
where
	S: Send + Sync + 'static,
	T: Default + Send + Sync + 'static,
{
	/// Moves `store` into a new task. The task ends once every handle is dropped or
	/// [`StoreHandle::close`] is called, after draining the commands already queued.
	pub fn spawn(store: TabScopedStore<S, T>) -> (Self, JoinHandle<()>) {
		let own_id = store.own_id();
		let (commands_tx, commands_rx) = chan::unbounded();
		let (state_tx, state) = watch::channel(store.current_state());

		let handle = spawn(run(store, commands_rx, state_tx));

		(
			Self {
				own_id,
				commands: commands_tx,
				state,
			},
			handle,
		)
	}

	#[must_use]
	pub const fn own_id(&self) -> Token {
		self.own_id
	}

	/// Latest snapshot, without waiting for queued writes.
	#[must_use]
	pub fn current_state(&self) -> Snapshot<S, T> {
		self.state.borrow().clone()
	}

	#[must_use]
	pub fn watch(&self) -> watch::Receiver<Snapshot<S, T>> {
		self.state.clone()
	}

	pub async fn dispatch(
		&self,
		tab_id: Option<Token>,
		update: impl FnOnce(&T) -> T + Send + 'static,
	) -> Result<Snapshot<S, T>, Error> {
		self.request(|ack| Command::Dispatch {
			tab_id,
			update: Box::new(update),
			ack,
		})
		.await
	}

	pub async fn dispatch_shared(
		&self,
		update: impl FnOnce(&S) -> S + Send + 'static,
	) -> Result<Snapshot<S, T>, Error> {
		self.request(|ack| Command::DispatchShared {
			update: Box::new(update),
			ack,
		})
		.await
	}

	pub async fn remove_tab(&self, tab_id: Token) -> Result<bool, Error> {
		self.request(|ack| Command::RemoveTab { tab_id, ack }).await
	}

	/// Registers `callback` on the owning task, it runs there after every change.
	pub async fn subscribe(
		&self,
		callback: impl FnMut(&Snapshot<S, T>) + Send + 'static,
	) -> Result<SubscriptionId, Error> {
		self.request(|ack| Command::Subscribe {
			callback: Box::new(callback),
			ack,
		})
		.await
	}

	pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<bool, Error> {
		self.request(|ack| Command::Unsubscribe { id, ack }).await
	}

	/// Stops accepting commands. Queued ones still run.
	pub fn close(&self) {
		self.commands.close();
	}

	async fn request<R>(
		&self,
		command: impl FnOnce(oneshot::Sender<R>) -> Command<S, T>,
	) -> Result<R, Error> {
		let (ack_tx, ack_rx) = oneshot::channel();

		self.commands
			.send(command(ack_tx))
			.await
			.map_err(|_| Error::StoreClosed)?;

		ack_rx.await.map_err(|_| Error::StoreClosed)
	}
}

#[instrument(skip_all, fields(own_id = %store.own_id()))]
async fn run<S: 'static, T: Default + 'static>(
	mut store: TabScopedStore<S, T>,
	commands: chan::Receiver<Command<S, T>>,
	state: watch::Sender<Snapshot<S, T>>,
) {
	while let Ok(command) = commands.recv().await {
		match command {
			Command::Dispatch {
				tab_id,
				update,
				ack,
			} => {
				let next = store.dispatch(tab_id, update);
				state.send_replace(Arc::clone(&next));
				// The caller may have stopped waiting, the write stands regardless
				let _ = ack.send(next);
			}
			Command::DispatchShared { update, ack } => {
				let next = store.dispatch_shared(update);
				state.send_replace(Arc::clone(&next));
				let _ = ack.send(next);
			}
			Command::RemoveTab { tab_id, ack } => {
				let removed = store.remove_tab(tab_id);
				if removed {
					state.send_replace(store.current_state());
				}
				let _ = ack.send(removed);
			}
			Command::Subscribe { callback, ack } => {
				let _ = ack.send(store.subscribe(callback));
			}
			Command::Unsubscribe { id, ack } => {
				let _ = ack.send(store.unsubscribe(id));
			}
		}
	}

	debug!("Store closed");
}
