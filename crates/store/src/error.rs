#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("store task is no longer running")]
	StoreClosed,
}
