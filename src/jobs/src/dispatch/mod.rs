use std::{fmt, sync::Arc};

use tally_util::debug::label::{DebugLabel, LabelDisplay, ReifiedDebugLabel, NO_LABEL};

use crate::{
	executor::ExecutorShared,
	unit::{JobFn, TrackedUnit, UnitArena},
};

mod pool;

pub use pool::WorkerPool;

// === JobDispatcher === //

/// Runs [`TrackedUnit`]s asynchronously.
///
/// Every unit passed to [`start`](Self::start) must eventually be [processed](TrackedUnit::process)
/// exactly once, on any thread, possibly before `start` returns.
pub trait JobDispatcher: 'static + Send + Sync {
	fn start(&self, unit: TrackedUnit);
}

/// Runs every unit on the thread that started it.
///
/// A post job is started from inside the completion of the job that drained its predecessor, so a
/// chain of `n` post jobs nests `n` unit completions on the stack. Long chains belong on a
/// [`WorkerPool`], whose `start` only queues the unit.
#[derive(Debug, Copy, Clone, Default)]
pub struct InlineDispatcher;

impl JobDispatcher for InlineDispatcher {
	fn start(&self, unit: TrackedUnit) {
		unit.process();
	}
}

// === JobContext === //

/// The dispatcher jobs are started on along with the arena their units are allocated from.
#[derive(Clone)]
pub struct JobContext {
	inner: Arc<ContextInner>,
}

struct ContextInner {
	label: ReifiedDebugLabel,
	dispatcher: Arc<dyn JobDispatcher>,
	arena: UnitArena,
}

impl fmt::Debug for JobContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("JobContext")
			.field("label", &LabelDisplay::new(&self.inner.label).to_string())
			.field("arena", &self.inner.arena)
			.finish_non_exhaustive()
	}
}

impl JobContext {
	pub fn new(dispatcher: impl JobDispatcher) -> Self {
		Self::from_shared(Arc::new(dispatcher))
	}

	pub fn from_shared(dispatcher: Arc<dyn JobDispatcher>) -> Self {
		Self::with_label(NO_LABEL, dispatcher)
	}

	pub fn with_label(label: impl DebugLabel, dispatcher: Arc<dyn JobDispatcher>) -> Self {
		Self {
			inner: Arc::new(ContextInner {
				label: label.reify(),
				dispatcher,
				arena: UnitArena::new(),
			}),
		}
	}

	pub fn inline() -> Self {
		Self::with_label("inline", Arc::new(InlineDispatcher))
	}

	pub fn label(&self) -> Option<&str> {
		self.inner.label.as_deref()
	}

	pub fn dispatcher(&self) -> &Arc<dyn JobDispatcher> {
		&self.inner.dispatcher
	}

	pub fn arena(&self) -> &UnitArena {
		&self.inner.arena
	}

	/// The number of units allocated from this context which have not been released yet.
	pub fn live_units(&self) -> usize {
		self.inner.arena.live_units()
	}

	pub(crate) fn allocate_unit(&self, owner: Arc<ExecutorShared>, job: JobFn) -> TrackedUnit {
		let handle = self.inner.arena.allocate(job);
		TrackedUnit::new(self.clone(), handle, owner)
	}
}
