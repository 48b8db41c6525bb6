//! Wire format of the election protocol.
//!
//! Every message is a flat record of optional fields where presence carries meaning, so
//! older or foreign peers can talk to us as long as they agree on field names. On the wire
//! it is a MessagePack map. [`Signal`] is the validated view the state machine works with.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::identity::Token;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionMessage {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub collected_tokens: Option<BTreeSet<u64>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub master_token: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_died: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reestablish_token: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub should_give_up_master: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub has_gave_up_master: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub auxiliary_secret: Option<Vec<u8>>,
}

/// A validated election message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
	/// Membership snapshot, optionally carrying an election decision.
	Collected {
		tokens: BTreeSet<Token>,
		master: Option<Token>,
		reestablish: Option<Token>,
	},
	/// Election decision without a membership snapshot.
	MasterElected {
		master: Token,
		reestablish: Option<Token>,
	},
	TokenDied(Token),
	/// `target` asks the current leader to cede to it.
	ShouldGiveUpMaster { target: Token },
	/// The previous leader ceded, handing `secret` along with leadership.
	HasGaveUpMaster {
		target: Option<Token>,
		secret: Option<Vec<u8>>,
	},
}

fn token(raw: Option<u64>) -> Result<Option<Token>, ()> {
	raw.map_or(Ok(None), |raw| Token::new(raw).map(Some).ok_or(()))
}

impl TryFrom<ElectionMessage> for Signal {
	type Error = ElectionMessage;

	fn try_from(msg: ElectionMessage) -> Result<Self, Self::Error> {
		let (Ok(master), Ok(reestablish), Ok(died)) = (
			token(msg.master_token),
			token(msg.reestablish_token),
			token(msg.token_died),
		) else {
			return Err(msg);
		};

		if let Some(died) = died {
			return Ok(Self::TokenDied(died));
		}

		if msg.should_give_up_master == Some(true) {
			return master
				.map(|target| Self::ShouldGiveUpMaster { target })
				.ok_or(msg);
		}

		if msg.has_gave_up_master == Some(true) {
			return Ok(Self::HasGaveUpMaster {
				target: master,
				secret: msg.auxiliary_secret,
			});
		}

		if let Some(raw_tokens) = &msg.collected_tokens {
			let tokens = raw_tokens
				.iter()
				.map(|raw| Token::new(*raw))
				.collect::<Option<BTreeSet<_>>>();

			return match tokens {
				Some(tokens) if !tokens.is_empty() => Ok(Self::Collected {
					tokens,
					master,
					reestablish,
				}),
				_ => Err(msg),
			};
		}

		master
			.map(|master| Self::MasterElected {
				master,
				reestablish,
			})
			.ok_or(msg)
	}
}

impl From<Signal> for ElectionMessage {
	fn from(signal: Signal) -> Self {
		match signal {
			Signal::Collected {
				tokens,
				master,
				reestablish,
			} => Self {
				collected_tokens: Some(tokens.into_iter().map(Token::get).collect()),
				master_token: master.map(Token::get),
				reestablish_token: reestablish.map(Token::get),
				..Default::default()
			},
			Signal::MasterElected {
				master,
				reestablish,
			} => Self {
				master_token: Some(master.get()),
				reestablish_token: reestablish.map(Token::get),
				..Default::default()
			},
			Signal::TokenDied(token) => Self {
				token_died: Some(token.get()),
				..Default::default()
			},
			Signal::ShouldGiveUpMaster { target } => Self {
				master_token: Some(target.get()),
				should_give_up_master: Some(true),
				..Default::default()
			},
			Signal::HasGaveUpMaster { target, secret } => Self {
				master_token: target.map(Token::get),
				has_gave_up_master: Some(true),
				auxiliary_secret: secret,
				..Default::default()
			},
		}
	}
}

pub fn encode(signal: Signal) -> Result<Vec<u8>, rmp_serde::encode::Error> {
	rmp_serde::to_vec_named(&ElectionMessage::from(signal))
}

/// Decodes and validates a payload. Anything malformed is dropped here.
pub fn decode(payload: &[u8]) -> Option<Signal> {
	let msg = match rmp_serde::from_slice::<ElectionMessage>(payload) {
		Ok(msg) => msg,
		Err(e) => {
			debug!(?e, len = payload.len(), "Dropping undecodable election message");
			return None;
		}
	};

	match Signal::try_from(msg) {
		Ok(signal) => Some(signal),
		Err(msg) => {
			debug!(?msg, "Dropping malformed election message");
			None
		}
	}
}
