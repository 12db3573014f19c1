use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tally_util::mem::free_list::{FreeList, FreeListHandle};

use crate::{
	dispatch::JobContext,
	executor::{ExecutorId, ExecutorShared},
};

pub(crate) type JobFn = Box<dyn FnOnce() + Send + 'static>;

// === UnitArena === //

/// Storage for the closures of every unit allocated through a [`JobContext`]. A slot is occupied
/// from the moment a unit is created until it has run and reported completion (or was discarded
/// without ever being started).
#[derive(Default)]
pub struct UnitArena {
	slots: Mutex<FreeList<UnitSlot>>,
}

struct UnitSlot {
	job: Option<JobFn>,
}

impl fmt::Debug for UnitArena {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("UnitArena")
			.field("live_units", &self.live_units())
			.finish()
	}
}

impl UnitArena {
	pub fn new() -> Self {
		Self::default()
	}

	pub(crate) fn allocate(&self, job: JobFn) -> FreeListHandle {
		self.slots.lock().add(UnitSlot { job: Some(job) })
	}

	fn take_job(&self, handle: FreeListHandle) -> Option<JobFn> {
		self.slots.lock().try_get_mut(handle)?.job.take()
	}

	fn release(&self, handle: FreeListHandle) {
		// The slot (and a closure that never ran) must be dropped outside the lock since its
		// captures may do anything on drop.
		let slot = self.slots.lock().try_remove(handle);

		if slot.is_none() {
			log::error!("released unit {handle} which is not in the arena");
		}
	}

	pub fn live_units(&self) -> usize {
		self.slots.lock().len()
	}

	pub fn slot_capacity(&self) -> usize {
		self.slots.lock().capacity()
	}
}

// === TrackedUnit === //

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum UnitState {
	/// Allocated but not handed to a dispatcher. Only post jobs linger in this state.
	Pending,

	/// Counted by its owner and handed to a dispatcher.
	Started,

	/// Its closure has been taken out of the arena and is running.
	Running,
}

/// A single job that reports its completion to the executor which started it.
///
/// Dispatchers receive units through [`JobDispatcher::start`](crate::dispatch::JobDispatcher::start)
/// and must eventually call [`process`](Self::process) on each of them. Completion is reported when
/// the unit is dropped after processing, so a job that panics still releases its executor.
pub struct TrackedUnit {
	cx: JobContext,
	handle: FreeListHandle,
	owner: Arc<ExecutorShared>,
	state: UnitState,
}

impl fmt::Debug for TrackedUnit {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TrackedUnit")
			.field("handle", &self.handle)
			.field("owner", &self.owner.id())
			.field("state", &self.state)
			.finish_non_exhaustive()
	}
}

impl TrackedUnit {
	pub(crate) fn new(cx: JobContext, handle: FreeListHandle, owner: Arc<ExecutorShared>) -> Self {
		Self {
			cx,
			handle,
			owner,
			state: UnitState::Pending,
		}
	}

	pub fn handle(&self) -> FreeListHandle {
		self.handle
	}

	pub fn owner_id(&self) -> ExecutorId {
		self.owner.id()
	}

	/// Hands the unit to its context's dispatcher. The owner must already have counted it.
	pub(crate) fn start(mut self) {
		debug_assert_eq!(self.state, UnitState::Pending);
		self.state = UnitState::Started;

		let cx = self.cx.clone();
		cx.dispatcher().start(self);
	}

	/// Counts the unit on its owning executor and starts it.
	pub(crate) fn start_on_owner(self) {
		let owner = Arc::clone(&self.owner);
		owner.start_unit(self);
	}

	/// Runs the job and reports its completion.
	pub fn process(mut self) {
		assert_eq!(
			self.state,
			UnitState::Started,
			"unit {} was processed without being started",
			self.handle,
		);

		let job = self.cx.arena().take_job(self.handle);
		self.state = UnitState::Running;

		match job {
			Some(job) => job(),
			None => log::error!("unit {} of {} has no job to run", self.handle, self.owner.id()),
		}

		// `Drop` reports completion and releases the arena slot.
	}
}

impl Drop for TrackedUnit {
	fn drop(&mut self) {
		match self.state {
			UnitState::Pending => {}
			UnitState::Started => {
				log::error!(
					"unit {} of {} was dropped by its dispatcher without being processed",
					self.handle,
					self.owner.id(),
				);
				self.owner.complete_job();
			}
			UnitState::Running => self.owner.complete_job(),
		}

		self.cx.arena().release(self.handle);
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use crate::{dispatch::JobDispatcher, executor::JobExecutor};

	use super::*;

	#[derive(Default)]
	struct StashDispatcher {
		units: Mutex<Vec<TrackedUnit>>,
	}

	impl JobDispatcher for StashDispatcher {
		fn start(&self, unit: TrackedUnit) {
			self.units.lock().push(unit);
		}
	}

	#[test]
	fn slots_are_released_after_completion() {
		let stash = Arc::new(StashDispatcher::default());
		let cx = JobContext::from_shared(stash.clone());
		let executor = JobExecutor::new();
		let counter = Arc::new(AtomicUsize::new(0));

		for _ in 0..3 {
			let counter = Arc::clone(&counter);
			executor.start_job(&cx, move || {
				counter.fetch_add(1, Ordering::SeqCst);
			});
		}

		assert_eq!(cx.live_units(), 3);
		assert_eq!(executor.outstanding_jobs(), 3);

		let units = std::mem::take(&mut *stash.units.lock());
		for (index, unit) in units.into_iter().enumerate() {
			assert_eq!(unit.owner_id(), executor.id());
			unit.process();

			assert_eq!(counter.load(Ordering::SeqCst), index + 1);
			assert_eq!(cx.live_units(), 2 - index);
			assert_eq!(executor.outstanding_jobs() as usize, 2 - index);
		}

		executor.wait_for_completion();
	}

	#[test]
	fn pending_post_job_holds_a_slot_until_cleared() {
		let cx = JobContext::inline();
		let executor = JobExecutor::new();
		let post_executor = JobExecutor::new();

		executor.set_post_job(&post_executor, &cx, || {});
		assert_eq!(cx.live_units(), 1);
		assert_eq!(post_executor.outstanding_jobs(), 0);

		executor.clear_post_job();
		assert_eq!(cx.live_units(), 0);
	}

	#[test]
	fn arena_reuses_released_slots() {
		let cx = JobContext::inline();
		let executor = JobExecutor::new();

		for _ in 0..100 {
			executor.start_job(&cx, || {});
		}

		assert_eq!(cx.live_units(), 0);
		assert_eq!(cx.arena().slot_capacity(), 1);
	}
}
