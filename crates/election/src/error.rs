use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("coordinator already started")]
	AlreadyStarted,
	#[error("coordinator was not started")]
	NotStarted,
	#[error("coordinator stopped")]
	Stopped,
	#[error("no leader is known yet")]
	NotEstablished,
	#[error("leader did not give up mastership within {0:?}")]
	HandoffTimedOut(std::time::Duration),
}
