use std::{env, time::Duration};

use anyhow::{bail, Context};
use mt_client::{init_logging, ClientConfig, Peer};
use mt_election::{LocalBus, LocalTransport, PeerIdentity};
use tokio::time::sleep;
use tracing::{info, warn};

type SimPeer = Peer<(), (), LocalTransport>;

const DEFAULT_PEERS: usize = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let config = match env::var("MT_SIM_CONFIG") {
		Ok(path) => ClientConfig::load_from(&path).with_context(|| format!("loading {path}"))?,
		Err(_) => ClientConfig::default(),
	};

	init_logging(&config.log)?;

	let peer_count = match env::var("MT_SIM_PEERS") {
		Ok(count) => count.parse().context("MT_SIM_PEERS must be a number")?,
		Err(_) => DEFAULT_PEERS,
	};
	if peer_count == 0 {
		bail!("need at least one peer");
	}

	let settle = Duration::from_millis(config.election.establish_timeout_ms * 4);
	let bus = LocalBus::new(config.bus_capacity);

	let mut peers = Vec::with_capacity(peer_count);
	for _ in 0..peer_count {
		let mut peer: SimPeer =
			Peer::new(&config, &PeerIdentity::generate(), bus.connect(), ());
		peer.start().await?;
		peers.push(peer);
	}

	sleep(settle).await;
	report(&peers);

	let Some(leader_idx) = peers.iter().position(Peer::is_leader) else {
		bail!("no peer considers itself the leader");
	};
	let leader = peers.swap_remove(leader_idx);
	info!(token = %leader.token(), "Leader departs");
	leader.shutdown().await;

	sleep(settle).await;
	report(&peers);

	for peer in peers {
		peer.shutdown().await;
	}

	Ok(())
}

fn report(peers: &[SimPeer]) {
	if peers.is_empty() {
		info!("No peers left");
		return;
	}

	for peer in peers {
		info!(
			token = %peer.token(),
			is_leader = peer.is_leader(),
			master = ?peer.election().master(),
			known = ?peer.election().all_known_peer_ids(),
			"Peer view",
		);
	}

	let leaders = peers.iter().filter(|peer| peer.is_leader()).count();
	let agreed = peers
		.windows(2)
		.all(|pair| pair[0].election().master() == pair[1].election().master());

	if leaders == 1 && agreed {
		info!(peers = peers.len(), "Peers agree on a single leader");
	} else {
		warn!(leaders, agreed, "Peers have not converged");
	}
}
