use std::{
	fmt,
	num::NonZeroU64,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
};

use parking_lot::{Condvar, Mutex};
use tally_util::debug::label::{DebugLabel, LabelDisplay, ReifiedDebugLabel, NO_LABEL};

use crate::{dispatch::JobContext, event::CompletionBus, unit::TrackedUnit};

// === ExecutorId === //

/// The address of a [`JobExecutor`], unique for the lifetime of the process.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ExecutorId(NonZeroU64);

impl ExecutorId {
	fn new() -> Self {
		static ID_ALLOC: AtomicU64 = AtomicU64::new(1);

		let id = ID_ALLOC.fetch_add(1, Ordering::Relaxed);
		Self(NonZeroU64::new(id).unwrap_or_else(|| panic!("allocated too many executors")))
	}

	pub fn get(self) -> NonZeroU64 {
		self.0
	}
}

impl fmt::Display for ExecutorId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "executor#{}", self.0)
	}
}

// === ExecutorShared === //

pub(crate) struct ExecutorShared {
	id: ExecutorId,
	label: ReifiedDebugLabel,
	state: Mutex<ExecutorState>,
	completion_condition: Condvar,
	observers: Option<Arc<CompletionBus>>,
}

struct ExecutorState {
	/// Jobs started but not yet reported complete, plus pushed completion fences.
	job_count: u32,

	/// Started on its own executor once `job_count` next drops to zero. Its executor's count is not
	/// incremented until then.
	post_job: Option<TrackedUnit>,
}

impl ExecutorShared {
	pub(crate) fn id(&self) -> ExecutorId {
		self.id
	}

	fn name(&self) -> LabelDisplay<'_> {
		LabelDisplay::with_fallback(&self.label, "<unnamed executor>")
	}

	fn increment(&self, what: &str) {
		let mut state = self.state.lock();
		state.job_count = state
			.job_count
			.checked_add(1)
			.unwrap_or_else(|| panic!("{}: too many outstanding jobs while {what}", self.name()));
	}

	pub(crate) fn start_unit(&self, unit: TrackedUnit) {
		self.increment("starting a job");

		// Outside the lock: the dispatcher may run the unit to completion before returning.
		log::trace!("{} ({}) starting unit {}", self.name(), self.id, unit.handle());
		unit.start();
	}

	pub(crate) fn complete_job(&self) {
		let post_job = {
			let mut state = self.state.lock();

			assert!(
				state.job_count != 0,
				"{}: completion reported with no outstanding jobs (unbalanced completion fence?)",
				self.name(),
			);

			state.job_count -= 1;
			if state.job_count != 0 {
				return;
			}

			self.completion_condition.notify_all();
			state.post_job.take()
		};

		// Outside the lock...
		if let Some(bus) = &self.observers {
			bus.broadcast(&self.id, |listener| listener.on_drained(self.id));
		}

		if let Some(post_job) = post_job {
			log::debug!(
				"{} drained; handing its post job to {}",
				self.name(),
				post_job.owner_id(),
			);

			if let Some(bus) = &self.observers {
				bus.broadcast(&self.id, |listener| listener.on_post_job_dispatched(self.id));
			}

			post_job.start_on_owner();
		}
	}
}

// === JobExecutor === //

/// Tracks a group of asynchronous jobs so that callers can wait for all of them to finish.
///
/// Jobs are started with [`start_job`](Self::start_job) and counted until their dispatcher has run
/// them. [`wait_for_completion`](Self::wait_for_completion) blocks until the count is zero. External
/// work can hold the executor open with completion fences.
///
/// Dropping an executor waits for every outstanding job.
pub struct JobExecutor {
	shared: Arc<ExecutorShared>,
}

impl Default for JobExecutor {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for JobExecutor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("JobExecutor")
			.field("id", &self.shared.id)
			.field("label", &self.shared.label)
			.field("job_count", &self.outstanding_jobs())
			.finish_non_exhaustive()
	}
}

impl JobExecutor {
	pub fn new() -> Self {
		Self::with_label(NO_LABEL)
	}

	pub fn with_label(label: impl DebugLabel) -> Self {
		Self::build(label.reify(), None)
	}

	/// Creates an executor which reports its drains and post job hand-offs to `bus`, addressed by
	/// the executor's [`id`](Self::id).
	pub fn with_observers(label: impl DebugLabel, bus: Arc<CompletionBus>) -> Self {
		Self::build(label.reify(), Some(bus))
	}

	fn build(label: ReifiedDebugLabel, observers: Option<Arc<CompletionBus>>) -> Self {
		Self {
			shared: Arc::new(ExecutorShared {
				id: ExecutorId::new(),
				label,
				state: Mutex::new(ExecutorState {
					job_count: 0,
					post_job: None,
				}),
				completion_condition: Condvar::new(),
				observers,
			}),
		}
	}

	pub fn id(&self) -> ExecutorId {
		self.shared.id
	}

	pub fn label(&self) -> Option<&str> {
		self.shared.label.as_deref()
	}

	pub fn start_job<F>(&self, cx: &JobContext, job: F)
	where
		F: 'static + Send + FnOnce(),
	{
		let unit = cx.allocate_unit(Arc::clone(&self.shared), Box::new(job));
		self.shared.start_unit(unit);
	}

	/// Registers a job to be started on `post_executor` once every job of this executor has
	/// completed. The post job is counted by `post_executor`, not by this executor, and only from
	/// the moment it is started.
	///
	/// This exists for porting older job graphs. New code should express the dependency directly.
	///
	/// # Panics
	///
	/// Panics if a post job is already registered or if any job or completion fence is outstanding.
	pub fn set_post_job<F>(&self, post_executor: &JobExecutor, cx: &JobContext, job: F)
	where
		F: 'static + Send + FnOnce(),
	{
		// Allocate outside the lock.
		let post_job = cx.allocate_unit(Arc::clone(&post_executor.shared), Box::new(job));

		let mut state = self.shared.state.lock();

		assert!(
			state.post_job.is_none(),
			"{}: post job already set",
			self.shared.name(),
		);
		assert!(
			state.job_count == 0,
			"{}: set_post_job must be called before starting any jobs",
			self.shared.name(),
		);

		state.post_job = Some(post_job);
	}

	/// Discards the registered post job, if any, without running it.
	pub fn clear_post_job(&self) -> bool {
		let post_job = self.shared.state.lock().post_job.take();

		match post_job {
			Some(post_job) => {
				log::debug!(
					"{} discarded its post job for {}",
					self.shared.name(),
					post_job.owner_id(),
				);
				true
			}
			None => false,
		}
	}

	pub fn has_post_job(&self) -> bool {
		self.shared.state.lock().post_job.is_some()
	}

	/// Asserts that the executor can be reused.
	///
	/// # Panics
	///
	/// Panics if any job or completion fence is outstanding.
	pub fn reset(&self) {
		assert!(
			!self.is_running(),
			"{}: reset called while jobs in flight",
			self.shared.name(),
		);
	}

	/// Blocks until no job or completion fence is outstanding.
	///
	/// A post job chained onto this executor may still be in the process of being started on its
	/// own executor when this returns.
	pub fn wait_for_completion(&self) {
		let mut state = self.shared.state.lock();

		if state.job_count != 0 {
			log::trace!(
				"{} stalled waiting on {} outstanding job(s)",
				self.shared.name(),
				state.job_count,
			);
		}

		while state.job_count != 0 {
			self.shared.completion_condition.wait(&mut state);
		}
	}

	/// Pushes a logical fence which keeps [`wait_for_completion`](Self::wait_for_completion) blocked
	/// until the matching [`pop_completion_fence`](Self::pop_completion_fence). This does not order
	/// jobs relative to one another.
	pub fn push_completion_fence(&self) {
		self.shared.increment("pushing a completion fence");
	}

	/// Pops a fence pushed by [`push_completion_fence`](Self::push_completion_fence).
	///
	/// # Panics
	///
	/// Panics if nothing is outstanding.
	pub fn pop_completion_fence(&self) {
		self.shared.complete_job();
	}

	/// Pushes a completion fence which is popped when the returned guard is dropped.
	pub fn completion_fence(&self) -> CompletionFence<'_> {
		self.push_completion_fence();
		CompletionFence { executor: self }
	}

	/// Whether any job or fence was outstanding at the instant of the check. The answer may be stale
	/// by the time it is returned so this must not be used to synchronize with job completion.
	pub fn is_running(&self) -> bool {
		self.outstanding_jobs() != 0
	}

	/// The number of outstanding jobs and fences at the instant of the check. Like
	/// [`is_running`](Self::is_running), this is a snapshot.
	pub fn outstanding_jobs(&self) -> u32 {
		self.shared.state.lock().job_count
	}
}

impl Drop for JobExecutor {
	fn drop(&mut self) {
		self.wait_for_completion();

		// A post job targeting this executor would otherwise keep it alive.
		self.clear_post_job();
	}
}

// === CompletionFence === //

/// An RAII completion fence created by [`JobExecutor::completion_fence`].
#[derive(Debug)]
#[must_use = "the fence is popped as soon as the guard is dropped"]
pub struct CompletionFence<'a> {
	executor: &'a JobExecutor,
}

impl CompletionFence<'_> {
	pub fn executor(&self) -> &JobExecutor {
		self.executor
	}
}

impl Drop for CompletionFence<'_> {
	fn drop(&mut self) {
		self.executor.pop_completion_fence();
	}
}
