use std::{collections::BTreeMap, fmt, sync::Arc};

use mt_election::Token;
use tracing::trace;

/// One immutable snapshot of the whole client state.
///
/// `S` is shared by every peer, `T` is the per-peer slice. Snapshots are never mutated, a
/// dispatch builds a new one that shares every untouched part with its predecessor.
pub struct GlobalState<S, T> {
	shared: Arc<S>,
	by_tab_id: BTreeMap<Token, Arc<T>>,
}

impl<S, T> GlobalState<S, T> {
	#[must_use]
	pub fn new(shared: S) -> Self {
		Self {
			shared: Arc::new(shared),
			by_tab_id: BTreeMap::new(),
		}
	}

	#[must_use]
	pub fn shared(&self) -> &Arc<S> {
		&self.shared
	}

	#[must_use]
	pub fn tab(&self, tab_id: Token) -> Option<&Arc<T>> {
		self.by_tab_id.get(&tab_id)
	}

	pub fn tabs(&self) -> impl Iterator<Item = (Token, &Arc<T>)> + '_ {
		self.by_tab_id.iter().map(|(id, tab)| (*id, tab))
	}

	#[must_use]
	pub fn tab_count(&self) -> usize {
		self.by_tab_id.len()
	}

	fn with_shared(&self, shared: S) -> Self {
		Self {
			shared: Arc::new(shared),
			by_tab_id: self.by_tab_id.clone(),
		}
	}

	fn with_tab(&self, tab_id: Token, tab: T) -> Self {
		let mut by_tab_id = self.by_tab_id.clone();
		by_tab_id.insert(tab_id, Arc::new(tab));

		Self {
			shared: Arc::clone(&self.shared),
			by_tab_id,
		}
	}

	fn without_tab(&self, tab_id: Token) -> Option<Self> {
		if !self.by_tab_id.contains_key(&tab_id) {
			return None;
		}

		let mut by_tab_id = self.by_tab_id.clone();
		by_tab_id.remove(&tab_id);

		Some(Self {
			shared: Arc::clone(&self.shared),
			by_tab_id,
		})
	}
}

impl<S: Default, T> Default for GlobalState<S, T> {
	fn default() -> Self {
		Self::new(S::default())
	}
}

impl<S: fmt::Debug, T: fmt::Debug> fmt::Debug for GlobalState<S, T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("GlobalState")
			.field("shared", &self.shared)
			.field("by_tab_id", &self.by_tab_id)
			.finish()
	}
}

/// Identifies a subscription so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type Subscriber<S, T> = Box<dyn FnMut(&Arc<GlobalState<S, T>>) + Send>;

/// Global state with one slice per peer, written by a single owner.
///
/// Updates are plain functions from the old value to the new one. Rust's struct update
/// syntax gives the usual "merge these fields over the old value" shape:
///
/// ```
/// # use mt_election::Token;
/// # use mt_store::TabScopedStore;
/// #[derive(Debug, Clone, Default)]
/// struct Tab {
/// 	is_panel_open: bool,
/// 	chat: Option<u64>,
/// }
///
/// let me = Token::new(1).unwrap();
/// let mut store = TabScopedStore::<(), Tab>::new(me);
/// let state = store.dispatch(None, |tab: &Tab| Tab {
/// 	is_panel_open: true,
/// 	..tab.clone()
/// });
///
/// assert!(state.tab(me).unwrap().is_panel_open);
/// ```
pub struct TabScopedStore<S, T> {
	own_id: Token,
	state: Arc<GlobalState<S, T>>,
	subscribers: Vec<(SubscriptionId, Subscriber<S, T>)>,
	next_subscription: u64,
}

impl<S: Default, T> TabScopedStore<S, T> {
	#[must_use]
	pub fn new(own_id: Token) -> Self {
		Self::with_shared(own_id, S::default())
	}
}

impl<S, T> TabScopedStore<S, T> {
	#[must_use]
	pub fn with_shared(own_id: Token, shared: S) -> Self {
		Self {
			own_id,
			state: Arc::new(GlobalState::new(shared)),
			subscribers: Vec::new(),
			next_subscription: 0,
		}
	}

	#[must_use]
	pub const fn own_id(&self) -> Token {
		self.own_id
	}

	#[must_use]
	pub fn current_state(&self) -> Arc<GlobalState<S, T>> {
		Arc::clone(&self.state)
	}

	/// Replaces the shared part with `update(old)`.
	pub fn dispatch_shared(
		&mut self,
		update: impl FnOnce(&S) -> S,
	) -> Arc<GlobalState<S, T>> {
		let shared = update(&*self.state.shared);
		self.replace(self.state.with_shared(shared))
	}

	/// Drops the slice of a peer, typically one that left. Returns whether it existed.
	pub fn remove_tab(&mut self, tab_id: Token) -> bool {
		let Some(next) = self.state.without_tab(tab_id) else {
			return false;
		};

		trace!(%tab_id, "Removing tab slice");
		self.replace(next);

		true
	}

	/// Calls `callback` after every change, in registration order.
	pub fn subscribe(
		&mut self,
		callback: impl FnMut(&Arc<GlobalState<S, T>>) + Send + 'static,
	) -> SubscriptionId {
		let id = SubscriptionId(self.next_subscription);
		self.next_subscription += 1;
		self.subscribers.push((id, Box::new(callback)));

		id
	}

	pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
		let before = self.subscribers.len();
		self.subscribers.retain(|(subscribed, _)| *subscribed != id);

		self.subscribers.len() != before
	}

	fn replace(&mut self, next: GlobalState<S, T>) -> Arc<GlobalState<S, T>> {
		self.state = Arc::new(next);

		for (_, subscriber) in &mut self.subscribers {
			subscriber(&self.state);
		}

		Arc::clone(&self.state)
	}
}

impl<S, T: Default> TabScopedStore<S, T> {
	/// Replaces the slice of `tab_id` (ourselves when `None`) with `update(old)`.
	///
	/// A slice that does not exist yet starts from `T::default()`.
	pub fn dispatch(
		&mut self,
		tab_id: Option<Token>,
		update: impl FnOnce(&T) -> T,
	) -> Arc<GlobalState<S, T>> {
		let tab_id = tab_id.unwrap_or(self.own_id);

		let next = match self.state.by_tab_id.get(&tab_id) {
			Some(tab) => update(tab.as_ref()),
			None => update(&T::default()),
		};

		self.replace(self.state.with_tab(tab_id, next))
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex;

	use super::*;

	#[derive(Debug, Clone, Default, PartialEq, Eq)]
	struct Tab {
		is_panel_open: bool,
		chat: Option<u64>,
	}

	#[derive(Debug, Clone, Default, PartialEq, Eq)]
	struct Shared {
		theme: &'static str,
	}

	fn t(raw: u64) -> Token {
		Token::new(raw).unwrap()
	}

	fn open_panel(tab: &Tab) -> Tab {
		Tab {
			is_panel_open: true,
			..tab.clone()
		}
	}

	#[test]
	fn dispatch_creates_slice_on_first_write() {
		let mut store = TabScopedStore::<Shared, Tab>::new(t(1));
		let state = store.dispatch(None, open_panel);

		assert_eq!(
			state.tab(t(1)).map(|tab| &**tab),
			Some(&Tab {
				is_panel_open: true,
				chat: None,
			})
		);
		assert!(Arc::ptr_eq(&state, &store.current_state()));
	}

	#[test]
	fn partial_update_keeps_other_fields() {
		let mut store = TabScopedStore::<Shared, Tab>::new(t(1));
		store.dispatch(None, |tab: &Tab| Tab {
			chat: Some(7),
			..tab.clone()
		});
		let state = store.dispatch(None, open_panel);

		assert_eq!(
			state.tab(t(1)).map(|tab| &**tab),
			Some(&Tab {
				is_panel_open: true,
				chat: Some(7),
			})
		);
	}

	#[test]
	fn snapshots_are_never_mutated() {
		let mut store = TabScopedStore::<Shared, Tab>::new(t(1));
		let before = store.dispatch(Some(t(2)), open_panel);
		let after = store.dispatch(None, open_panel);

		assert!(before.tab(t(1)).is_none());
		assert!(after.tab(t(1)).is_some());
		// Untouched slices are shared, not copied
		assert!(Arc::ptr_eq(
			before.tab(t(2)).unwrap(),
			after.tab(t(2)).unwrap()
		));
		assert!(Arc::ptr_eq(before.shared(), after.shared()));
	}

	#[test]
	fn shared_dispatch_leaves_tabs_alone() {
		let mut store = TabScopedStore::<Shared, Tab>::new(t(1));
		let before = store.dispatch(None, open_panel);
		let after = store.dispatch_shared(|_| Shared { theme: "dark" });

		assert_eq!(after.shared().theme, "dark");
		assert!(Arc::ptr_eq(
			before.tab(t(1)).unwrap(),
			after.tab(t(1)).unwrap()
		));
	}

	#[test]
	fn removing_a_tab() {
		let mut store = TabScopedStore::<Shared, Tab>::new(t(1));
		store.dispatch(Some(t(2)), open_panel);

		assert!(store.remove_tab(t(2)));
		assert_eq!(store.current_state().tab_count(), 0);
		assert!(!store.remove_tab(t(2)));
	}

	#[test]
	fn subscribers_run_in_registration_order() {
		let calls = Arc::new(Mutex::new(Vec::new()));
		let mut store = TabScopedStore::<Shared, Tab>::new(t(1));

		let first = {
			let calls = Arc::clone(&calls);
			store.subscribe(move |_| calls.lock().unwrap().push("first"))
		};
		{
			let calls = Arc::clone(&calls);
			store.subscribe(move |state| {
				assert!(state.tab(t(1)).is_some());
				calls.lock().unwrap().push("second");
			});
		}

		store.dispatch(None, open_panel);
		assert_eq!(*calls.lock().unwrap(), ["first", "second"]);

		assert!(store.unsubscribe(first));
		assert!(!store.unsubscribe(first));
		store.dispatch(None, open_panel);
		assert_eq!(*calls.lock().unwrap(), ["first", "second", "second"]);
	}

	#[test]
	fn removing_a_missing_tab_does_not_notify() {
		let calls = Arc::new(Mutex::new(0));
		let mut store = TabScopedStore::<Shared, Tab>::new(t(1));
		{
			let calls = Arc::clone(&calls);
			store.subscribe(move |_| *calls.lock().unwrap() += 1);
		}

		assert!(!store.remove_tab(t(9)));
		assert_eq!(*calls.lock().unwrap(), 0);
	}
}
