use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Largest token we hand out. Keeps tokens exactly representable as an IEEE double, so peers
/// that store them as plain JS numbers agree with us bit for bit.
pub const MAX_TOKEN: u64 = (1 << 53) - 1;

/// Random identity of a peer, also the tie-break value during elections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(u64);

impl Token {
	/// Wraps a raw value, rejecting zero which is never generated.
	#[must_use]
	pub const fn new(raw: u64) -> Option<Self> {
		if raw == 0 {
			None
		} else {
			Some(Self(raw))
		}
	}

	#[must_use]
	pub const fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Identity of this peer for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerIdentity {
	token: Token,
}

impl PeerIdentity {
	/// Draws a fresh random token.
	#[must_use]
	pub fn generate() -> Self {
		Self::with_token(Token(rand::thread_rng().gen_range(1..=MAX_TOKEN)))
	}

	/// Fixed identity, mostly useful for tests and simulations.
	#[must_use]
	pub const fn with_token(token: Token) -> Self {
		Self { token }
	}

	#[must_use]
	pub const fn token(&self) -> Token {
		self.token
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn zero_is_not_a_token() {
		assert!(Token::new(0).is_none());
		assert_eq!(Token::new(7).map(Token::get), Some(7));
	}

	#[test]
	fn generated_tokens_stay_in_range() {
		for _ in 0..1_000 {
			let token = PeerIdentity::generate().token().get();
			assert!((1..=MAX_TOKEN).contains(&token));
		}
	}

	#[test]
	fn tokens_order_numerically() {
		let small = Token::new(5).unwrap();
		let big = Token::new(42).unwrap();
		assert!(big > small);
		assert_eq!([small, big].into_iter().max(), Some(big));
	}
}
