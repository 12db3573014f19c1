use std::{fmt, hash::Hash, sync::Arc};

use derive_where::derive_where;
use hashbrown::HashMap;
use parking_lot::RwLock;
use tally_util::mem::free_list::{FreeList, FreeListHandle};

use crate::executor::ExecutorId;

// === EventBus === //

/// A registry of listeners keyed by the address they subscribed to.
///
/// Listeners are invoked synchronously by [`broadcast`](Self::broadcast) on a snapshot taken when
/// the broadcast starts, with no lock held. They may therefore subscribe and unsubscribe (themselves
/// included) while being invoked; such changes apply from the next broadcast onward.
#[derive_where(Default)]
pub struct EventBus<A, L: ?Sized> {
	state: RwLock<BusState<A, L>>,
}

#[derive_where(Default)]
struct BusState<A, L: ?Sized> {
	/// Every listener of the bus lives in this one list so that handles are never reissued, even
	/// after an address loses its last listener.
	listeners: FreeList<BusEntry<A, L>>,
	by_address: HashMap<A, Vec<FreeListHandle>>,
}

struct BusEntry<A, L: ?Sized> {
	address: A,
	listener: Arc<L>,
}

/// Returned by [`EventBus::subscribe`] and needed to unsubscribe.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Subscription<A> {
	address: A,
	handle: FreeListHandle,
}

impl<A> Subscription<A> {
	pub fn address(&self) -> &A {
		&self.address
	}
}

impl<A: fmt::Debug, L: ?Sized> fmt::Debug for EventBus<A, L> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.read();

		f.debug_map()
			.entries(state.by_address.iter().map(|(address, handles)| (address, handles.len())))
			.finish()
	}
}

impl<A: Clone + Hash + Eq, L: ?Sized> EventBus<A, L> {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn subscribe(&self, address: A, listener: Arc<L>) -> Subscription<A> {
		let mut state = self.state.write();

		let handle = state.listeners.add(BusEntry {
			address: address.clone(),
			listener,
		});
		state
			.by_address
			.entry(address.clone())
			.or_default()
			.push(handle);

		Subscription { address, handle }
	}

	/// Removes a listener. Returns `false` if it was already removed.
	pub fn unsubscribe(&self, subscription: &Subscription<A>) -> bool {
		let mut state = self.state.write();

		let Some(entry) = state.listeners.try_remove(subscription.handle) else {
			return false;
		};
		debug_assert!(entry.address == subscription.address);

		if let Some(handles) = state.by_address.get_mut(&subscription.address) {
			handles.retain(|&handle| handle != subscription.handle);

			if handles.is_empty() {
				state.by_address.remove(&subscription.address);
			}
		}

		drop(state);

		// `entry` is dropped here, outside the lock.
		true
	}

	pub fn listener_count(&self, address: &A) -> usize {
		self.state.read().by_address.get(address).map_or(0, Vec::len)
	}

	pub fn is_empty(&self) -> bool {
		self.state.read().listeners.is_empty()
	}

	/// Invokes `handler` on every listener of `address` and returns how many were invoked.
	pub fn broadcast(&self, address: &A, mut handler: impl FnMut(&L)) -> usize {
		let snapshot = {
			let state = self.state.read();
			let Some(handles) = state.by_address.get(address) else {
				return 0;
			};

			handles
				.iter()
				.map(|&handle| Arc::clone(&state.listeners.get(handle).listener))
				.collect::<Vec<_>>()
		};

		for listener in &snapshot {
			handler(listener);
		}

		snapshot.len()
	}
}

// === CompletionListener === //

/// Observes the executors it is subscribed to on a [`CompletionBus`].
pub trait CompletionListener: Send + Sync {
	/// The executor's outstanding count has just dropped to zero.
	fn on_drained(&self, executor: ExecutorId) {
		let _ = executor;
	}

	/// The executor has just handed its post job over to the post job's executor.
	fn on_post_job_dispatched(&self, executor: ExecutorId) {
		let _ = executor;
	}
}

pub type CompletionBus = EventBus<ExecutorId, dyn CompletionListener>;

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use parking_lot::Mutex;

	use crate::{dispatch::JobContext, executor::JobExecutor};

	use super::*;

	#[derive(Default)]
	struct Recorder {
		drained: Mutex<Vec<ExecutorId>>,
		handed_off: AtomicUsize,
	}

	impl CompletionListener for Recorder {
		fn on_drained(&self, executor: ExecutorId) {
			self.drained.lock().push(executor);
		}

		fn on_post_job_dispatched(&self, _executor: ExecutorId) {
			self.handed_off.fetch_add(1, Ordering::SeqCst);
		}
	}

	#[test]
	fn subscribe_and_unsubscribe() {
		let bus = EventBus::<&'static str, AtomicUsize>::new();
		let a = Arc::new(AtomicUsize::new(0));
		let b = Arc::new(AtomicUsize::new(0));

		let sub_a = bus.subscribe("tick", a.clone());
		let _sub_b = bus.subscribe("tick", b.clone());
		assert_eq!(bus.listener_count(&"tick"), 2);
		assert_eq!(bus.listener_count(&"tock"), 0);

		let invoked = bus.broadcast(&"tick", |counter| {
			counter.fetch_add(1, Ordering::SeqCst);
		});
		assert_eq!(invoked, 2);

		assert!(bus.unsubscribe(&sub_a));
		assert!(!bus.unsubscribe(&sub_a));

		bus.broadcast(&"tick", |counter| {
			counter.fetch_add(1, Ordering::SeqCst);
		});
		assert_eq!(bus.broadcast(&"tock", |_| unreachable!()), 0);

		assert_eq!(a.load(Ordering::SeqCst), 1);
		assert_eq!(b.load(Ordering::SeqCst), 2);
	}

	#[test]
	fn empty_addresses_are_pruned() {
		let bus = EventBus::<u32, AtomicUsize>::new();
		let sub = bus.subscribe(7, Arc::new(AtomicUsize::new(0)));
		assert!(!bus.is_empty());

		bus.unsubscribe(&sub);
		assert!(bus.is_empty());
		assert_eq!(bus.listener_count(&7), 0);
	}

	#[test]
	fn stale_subscriptions_do_not_remove_newer_listeners() {
		let bus = EventBus::<u32, AtomicUsize>::new();
		let first = Arc::new(AtomicUsize::new(0));
		let second = Arc::new(AtomicUsize::new(0));

		let stale = bus.subscribe(7, first);
		assert!(bus.unsubscribe(&stale));

		// Same address, same freed slot.
		let fresh = bus.subscribe(7, second.clone());
		assert_ne!(stale, fresh);

		assert!(!bus.unsubscribe(&stale));
		assert_eq!(bus.listener_count(&7), 1);

		bus.broadcast(&7, |counter| {
			counter.fetch_add(1, Ordering::SeqCst);
		});
		assert_eq!(second.load(Ordering::SeqCst), 1);

		assert!(bus.unsubscribe(&fresh));
		assert!(bus.is_empty());
	}

	#[test]
	fn listeners_may_unsubscribe_during_broadcast() {
		let bus = Arc::new(EventBus::<u32, Mutex<Option<Subscription<u32>>>>::new());
		let slot = Arc::new(Mutex::new(None));
		let sub = bus.subscribe(1, slot.clone());
		*slot.lock() = Some(sub);

		let invoked = bus.broadcast(&1, |listener| {
			if let Some(sub) = listener.lock().take() {
				assert!(bus.unsubscribe(&sub));
			}
		});

		assert_eq!(invoked, 1);
		assert_eq!(bus.listener_count(&1), 0);
	}

	#[test]
	fn executors_report_drains_and_hand_offs() {
		let bus = Arc::new(CompletionBus::new());
		let recorder = Arc::new(Recorder::default());
		let cx = JobContext::inline();

		let executor = JobExecutor::with_observers("observed", bus.clone());
		let post_executor = JobExecutor::with_observers("observed post", bus.clone());
		let unobserved = JobExecutor::with_observers("unobserved", bus.clone());

		let sub = bus.subscribe(executor.id(), recorder.clone());
		bus.subscribe(post_executor.id(), recorder.clone());

		executor.set_post_job(&post_executor, &cx, || {});
		executor.start_job(&cx, || {});
		unobserved.start_job(&cx, || {});

		assert_eq!(
			*recorder.drained.lock(),
			[executor.id(), post_executor.id()]
		);
		assert_eq!(recorder.handed_off.load(Ordering::SeqCst), 1);

		// Fences drain the executor too.
		drop(executor.completion_fence());
		assert_eq!(recorder.drained.lock().len(), 3);

		bus.unsubscribe(&sub);
		executor.start_job(&cx, || {});
		assert_eq!(recorder.drained.lock().len(), 3);
	}
}
