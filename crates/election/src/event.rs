use crate::identity::Token;

/// Notifications emitted by the election, in the order the peer observed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionEvent {
	/// The known master changed. `current` is `None` while a re-election runs.
	LeaderChanged {
		previous: Option<Token>,
		current: Option<Token>,
		is_leader: bool,
	},
	/// A peer announced its departure and was evicted from the collected tokens.
	PeerDied(Token),
	/// This peer took over leadership from a handoff, with whatever the previous leader
	/// piggybacked on it.
	HandoffReceived { secret: Option<Vec<u8>> },
}
