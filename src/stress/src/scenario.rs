use std::{
	sync::{
		atomic::{AtomicUsize, Ordering},
		mpsc, Arc,
	},
	thread,
	time::{Duration, Instant},
};

use parking_lot::Mutex;
use tally_jobs::{JobContext, JobExecutor};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScenarioError {
	#[error("expected {expected} job(s) to run but {actual} did")]
	LostJobs { expected: usize, actual: usize },

	#[error("chain of {depth} executor(s) stalled after {reached} link(s)")]
	ChainStalled { depth: usize, reached: usize },

	#[error("chain links ran out of order: {order:?}")]
	ChainOutOfOrder { order: Vec<usize> },
}

// === Stress === //

#[derive(Debug, Clone)]
pub struct StressReport {
	pub units: usize,
	pub threads: usize,
	pub elapsed: Duration,
}

impl StressReport {
	pub fn units_per_sec(&self) -> f64 {
		self.units as f64 / self.elapsed.as_secs_f64().max(f64::EPSILON)
	}
}

/// Starts `units` jobs on a single executor from `threads` submitting threads and waits for all of
/// them. Each submitter holds a completion fence while submitting so the executor cannot drain
/// before every submitter is done.
pub fn run_stress(cx: &JobContext, units: usize, threads: usize) -> Result<StressReport, ScenarioError> {
	let threads = threads.max(1);
	let executor = JobExecutor::with_label("stress");
	let completed = Arc::new(AtomicUsize::new(0));
	let start = Instant::now();

	thread::scope(|s| {
		for submitter in 0..threads {
			let share = units / threads + usize::from(submitter < units % threads);
			let executor = &executor;
			let completed = &completed;

			s.spawn(move || {
				let _fence = executor.completion_fence();

				for _ in 0..share {
					let completed = Arc::clone(completed);
					executor.start_job(cx, move || {
						completed.fetch_add(1, Ordering::Relaxed);
					});
				}
			});
		}
	});

	executor.wait_for_completion();

	let elapsed = start.elapsed();
	let actual = completed.load(Ordering::SeqCst);

	if actual != units {
		return Err(ScenarioError::LostJobs {
			expected: units,
			actual,
		});
	}

	Ok(StressReport {
		units,
		threads,
		elapsed,
	})
}

// === Chain === //

#[derive(Debug, Clone)]
pub struct ChainReport {
	pub depth: usize,
	pub elapsed: Duration,
}

/// Links `depth` executors so that each one's post job runs on the next. Only the first executor
/// is started directly; every other link runs as the post job of its predecessor.
pub fn run_chain(cx: &JobContext, depth: usize, timeout: Duration) -> Result<ChainReport, ScenarioError> {
	if depth == 0 {
		return Ok(ChainReport {
			depth,
			elapsed: Duration::ZERO,
		});
	}

	let executors = (0..depth)
		.map(|link| JobExecutor::with_label(format!("chain link {link}")))
		.collect::<Vec<_>>();

	let order = Arc::new(Mutex::new(Vec::with_capacity(depth)));
	let (done_tx, done_rx) = mpsc::channel();

	// Post jobs must be set before anything is started on their executors.
	for link in 1..depth {
		let order = Arc::clone(&order);
		let done_tx = (link == depth - 1).then(|| done_tx.clone());

		executors[link - 1].set_post_job(&executors[link], cx, move || {
			order.lock().push(link);
			if let Some(done_tx) = done_tx {
				let _ = done_tx.send(());
			}
		});
	}

	let start = Instant::now();

	{
		let order = Arc::clone(&order);
		let done_tx = (depth == 1).then_some(done_tx);

		executors[0].start_job(cx, move || {
			order.lock().push(0);
			if let Some(done_tx) = done_tx {
				let _ = done_tx.send(());
			}
		});
	}

	if done_rx.recv_timeout(timeout).is_err() {
		let reached = order.lock().len();
		log::error!("Chain stalled; the remaining executors will be leaked");

		// Dropping an executor whose chain never finished would block forever.
		for executor in executors {
			std::mem::forget(executor);
		}

		return Err(ScenarioError::ChainStalled { depth, reached });
	}

	for executor in &executors {
		executor.wait_for_completion();
	}

	let elapsed = start.elapsed();
	let order = std::mem::take(&mut *order.lock());

	if !order.iter().copied().eq(0..depth) {
		return Err(ScenarioError::ChainOutOfOrder { order });
	}

	Ok(ChainReport { depth, elapsed })
}
