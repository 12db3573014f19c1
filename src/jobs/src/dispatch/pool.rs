use std::{
	collections::VecDeque,
	fmt,
	panic::{self, AssertUnwindSafe},
	sync::Arc,
	thread::{self, JoinHandle},
};

use parking_lot::{Condvar, Mutex};
use tally_util::debug::error::PanicPayloadExt;

use crate::{config::PoolConfig, error::Error, unit::TrackedUnit};

use super::JobDispatcher;

// === WorkerPool === //

/// A fixed set of worker threads processing units in the order they were started.
///
/// Every queued unit holds its [`JobContext`](super::JobContext), and with it the pool, so the pool
/// can only be dropped once its queue is empty. Dropping it stops the workers and joins them.
pub struct WorkerPool {
	shared: Arc<PoolShared>,
	workers: Vec<JoinHandle<()>>,
}

struct PoolShared {
	queue: Mutex<PoolQueue>,
	work_available: Condvar,
}

struct PoolQueue {
	units: VecDeque<TrackedUnit>,
	shutting_down: bool,
}

impl fmt::Debug for WorkerPool {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WorkerPool")
			.field("workers", &self.workers.len())
			.field("queued_units", &self.queued_units())
			.finish()
	}
}

impl WorkerPool {
	pub fn new(config: &PoolConfig) -> Result<Self, Error> {
		config.validate()?;

		let worker_count = config.resolved_workers();
		let mut pool = Self {
			shared: Arc::new(PoolShared {
				queue: Mutex::new(PoolQueue {
					units: VecDeque::new(),
					shutting_down: false,
				}),
				work_available: Condvar::new(),
			}),
			workers: Vec::with_capacity(worker_count),
		};

		for index in 0..worker_count {
			let name = format!("{}-{index}", config.thread_name);
			let mut builder = thread::Builder::new().name(name.clone());

			if let Some(stack_size) = config.stack_size {
				builder = builder.stack_size(stack_size);
			}

			let shared = Arc::clone(&pool.shared);

			// On failure, dropping `pool` shuts down the workers spawned so far.
			let worker = builder
				.spawn(move || shared.run_worker(index))
				.map_err(|source| Error::SpawnWorker {
					index,
					name,
					source,
				})?;

			pool.workers.push(worker);
		}

		log::debug!("Spawned {worker_count} worker thread(s) named {:?}", config.thread_name);

		Ok(pool)
	}

	pub fn worker_count(&self) -> usize {
		self.workers.len()
	}

	/// The number of units waiting for a worker at the instant of the check.
	pub fn queued_units(&self) -> usize {
		self.shared.queue.lock().units.len()
	}
}

impl JobDispatcher for WorkerPool {
	fn start(&self, unit: TrackedUnit) {
		self.shared.queue.lock().units.push_back(unit);
		self.shared.work_available.notify_one();
	}
}

impl Drop for WorkerPool {
	fn drop(&mut self) {
		let mut queue = self.shared.queue.lock();
		debug_assert!(queue.units.is_empty());
		queue.shutting_down = true;
		drop(queue);

		self.shared.work_available.notify_all();

		let current = thread::current().id();

		for worker in self.workers.drain(..) {
			// The last handle to a pool can be dropped by one of the pool's own jobs.
			if worker.thread().id() == current {
				continue;
			}

			if worker.join().is_err() {
				log::error!("A worker thread exited by panicking");
			}
		}
	}
}

impl PoolShared {
	fn next_unit(&self) -> Option<TrackedUnit> {
		let mut queue = self.queue.lock();

		loop {
			if let Some(unit) = queue.units.pop_front() {
				return Some(unit);
			}

			if queue.shutting_down {
				return None;
			}

			self.work_available.wait(&mut queue);
		}
	}

	fn run_worker(&self, index: usize) {
		log::trace!("Worker {index} started");

		while let Some(unit) = self.next_unit() {
			let handle = unit.handle();

			// The unit reports its completion while unwinding so only the worker needs saving.
			if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| unit.process())) {
				log::error!(
					"Unit {handle} panicked on worker {index}: {}",
					payload.panic_message()
				);
			}
		}

		log::trace!("Worker {index} exiting");
	}
}
