use mt_client::{ClientConfig, Peer};
use mt_election::{ElectionEvent, LocalBus, LocalTransport, PeerIdentity, Token};

use std::time::Duration;

use tokio::time::timeout;
use tracing_test::traced_test;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Tab {
	open_chat: Option<i64>,
}

type TestPeer = Peer<(), Tab, LocalTransport>;

fn t(raw: u64) -> Token {
	Token::new(raw).unwrap()
}

fn peer(bus: &LocalBus, raw: u64) -> TestPeer {
	Peer::new(
		&ClientConfig::default(),
		&PeerIdentity::with_token(t(raw)),
		bus.connect(),
		(),
	)
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn departed_peer_slice_is_reaped() {
	let bus = LocalBus::new(256);
	let mut a = peer(&bus, 5);
	let mut b = peer(&bus, 42);

	a.start().await.unwrap();
	b.start().await.unwrap();

	// Pretend a global update from the other peer landed in our store
	a.store()
		.dispatch(Some(b.token()), |tab: &Tab| Tab {
			open_chat: Some(7),
			..tab.clone()
		})
		.await
		.unwrap();
	a.store().dispatch(None, Clone::clone).await.unwrap();
	assert_eq!(a.store().current_state().tab_count(), 2);

	b.shutdown().await;

	let mut state = a.store().watch();
	timeout(
		Duration::from_secs(1),
		state.wait_for(|state| state.tab(t(42)).is_none()),
	)
	.await
	.unwrap()
	.unwrap();

	assert!(a.store().current_state().tab(t(5)).is_some());

	let mut election = a.election().watch();
	timeout(
		Duration::from_secs(1),
		election.wait_for(|snapshot| snapshot.is_leader()),
	)
	.await
	.unwrap()
	.unwrap();

	a.shutdown().await;
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn only_the_leader_runs_side_effects() {
	let bus = LocalBus::new(256);
	let mut leader = peer(&bus, 42);
	let mut follower = peer(&bus, 5);

	leader.start().await.unwrap();
	assert_eq!(follower.start().await.unwrap(), t(42));

	assert_eq!(leader.if_leader(|| async { "fetched" }).await, Some("fetched"));
	assert_eq!(follower.if_leader(|| async { "fetched" }).await, None);

	follower.shutdown().await;
	leader.shutdown().await;
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn handoff_through_the_peer() {
	let bus = LocalBus::new(256);
	let mut leader = peer(&bus, 42);
	let mut follower = peer(&bus, 5);

	leader
		.election_mut()
		.set_handoff_secret(Some(b"session".to_vec()))
		.await
		.unwrap();
	leader.start().await.unwrap();
	follower.start().await.unwrap();

	let mut events = follower.election().subscribe();
	follower.election().request_handoff_to_self().await.unwrap();
	assert!(follower.is_leader());

	let secret = loop {
		if let ElectionEvent::HandoffReceived { secret } = events.recv().await.unwrap() {
			break secret;
		}
	};
	assert_eq!(secret.as_deref(), Some(&b"session"[..]));

	let mut election = leader.election().watch();
	timeout(
		Duration::from_secs(1),
		election.wait_for(|snapshot| snapshot.master == Some(t(5))),
	)
	.await
	.unwrap()
	.unwrap();
	assert!(!leader.is_leader());

	leader.shutdown().await;
	follower.shutdown().await;
}
