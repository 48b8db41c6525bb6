//! Leader election between peers of one client sharing a best-effort broadcast channel.
//!
//! Every peer draws a random [`Token`] at startup and gossips the tokens it knows about.
//! The numerically largest known token leads. Peers announce their departure so the
//! remainder can re-elect, and a follower may ask the leader to hand leadership over.
//!
//! ```no_run
//! # async fn demo() -> Result<(), mt_election::Error> {
//! use mt_election::{ElectionConfig, LocalBus, PeerCoordinator, PeerIdentity};
//!
//! let bus = LocalBus::new(256);
//! let mut peer = PeerCoordinator::new(
//! 	ElectionConfig::default(),
//! 	&PeerIdentity::generate(),
//! 	bus.connect(),
//! );
//!
//! let master = peer.start().await?;
//! println!("{master} leads, is it us? {}", peer.is_leader());
//!
//! peer.signal_departure().await;
//! # Ok(())
//! # }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod config;
mod coordinator;
mod election;
mod error;
mod event;
mod identity;
pub mod message;
mod transport;

pub use config::ElectionConfig;
pub use coordinator::PeerCoordinator;
pub use election::{Effect, Election, ElectionSnapshot};
pub use error::Error;
pub use event::ElectionEvent;
pub use identity::{PeerIdentity, Token, MAX_TOKEN};
pub use message::{ElectionMessage, Signal};
pub use transport::{LocalBus, LocalTransport, Transport, TransportError};
