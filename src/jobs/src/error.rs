use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("invalid pool configuration: {0}")]
	InvalidConfig(&'static str),

	#[error("failed to spawn worker thread {index} ({name:?})")]
	SpawnWorker {
		index: usize,
		name: String,
		#[source]
		source: io::Error,
	},
}
