use std::{fmt, num::NonZeroU64};

use derive_where::derive_where;

// === FreeListHandle === //

/// A generational handle into a [`FreeList`]. Handles to removed entries never alias entries added
/// later into the same slot.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub struct FreeListHandle {
	slot: usize,
	gen: NonZeroU64,
}

impl FreeListHandle {
	pub fn slot(&self) -> usize {
		self.slot
	}
}

impl fmt::Display for FreeListHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}v{}", self.slot, self.gen)
	}
}

// === FreeList === //

#[derive(Debug)]
#[derive_where(Default)]
pub struct FreeList<T> {
	slots: Vec<Slot<T>>,
	free: Vec<usize>,
	len: usize,
	gen_alloc: u64,
}

#[derive(Debug)]
struct Slot<T> {
	gen: NonZeroU64,
	value: Option<T>,
}

impl<T> FreeList<T> {
	pub const fn new() -> Self {
		Self {
			slots: Vec::new(),
			free: Vec::new(),
			len: 0,
			gen_alloc: 0,
		}
	}

	fn next_gen(&mut self) -> NonZeroU64 {
		self.gen_alloc += 1;
		NonZeroU64::new(self.gen_alloc).unwrap_or_else(|| panic!("allocated too many free list entries"))
	}

	pub fn add(&mut self, value: T) -> FreeListHandle {
		let gen = self.next_gen();
		self.len += 1;

		if let Some(slot) = self.free.pop() {
			let slot_data = &mut self.slots[slot];
			debug_assert!(slot_data.value.is_none());

			slot_data.gen = gen;
			slot_data.value = Some(value);

			FreeListHandle { slot, gen }
		} else {
			let slot = self.slots.len();
			self.slots.push(Slot {
				gen,
				value: Some(value),
			});

			FreeListHandle { slot, gen }
		}
	}

	fn slot_of(&self, handle: FreeListHandle) -> Option<&Slot<T>> {
		self.slots
			.get(handle.slot)
			.filter(|slot| slot.gen == handle.gen && slot.value.is_some())
	}

	fn slot_of_mut(&mut self, handle: FreeListHandle) -> Option<&mut Slot<T>> {
		self.slots
			.get_mut(handle.slot)
			.filter(|slot| slot.gen == handle.gen && slot.value.is_some())
	}

	pub fn try_remove(&mut self, handle: FreeListHandle) -> Option<T> {
		let value = self.slot_of_mut(handle)?.value.take()?;

		// TODO: shrink `slots` when the tail of the list is entirely free.
		self.free.push(handle.slot);
		self.len -= 1;

		Some(value)
	}

	pub fn remove(&mut self, handle: FreeListHandle) -> T {
		self.try_remove(handle)
			.unwrap_or_else(|| panic!("FreeList does not contain element with handle {handle}."))
	}

	pub fn try_get(&self, handle: FreeListHandle) -> Option<&T> {
		self.slot_of(handle)?.value.as_ref()
	}

	pub fn try_get_mut(&mut self, handle: FreeListHandle) -> Option<&mut T> {
		self.slot_of_mut(handle)?.value.as_mut()
	}

	pub fn get(&self, handle: FreeListHandle) -> &T {
		self.try_get(handle)
			.unwrap_or_else(|| panic!("FreeList does not contain element with handle {handle}."))
	}

	pub fn get_mut(&mut self, handle: FreeListHandle) -> &mut T {
		self.try_get_mut(handle)
			.unwrap_or_else(|| panic!("FreeList does not contain element with handle {handle}."))
	}

	pub fn contains(&self, handle: FreeListHandle) -> bool {
		self.slot_of(handle).is_some()
	}

	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub fn capacity(&self) -> usize {
		self.slots.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = (FreeListHandle, &T)> + '_ {
		self.slots.iter().enumerate().filter_map(|(slot, data)| {
			data.value
				.as_ref()
				.map(|value| (FreeListHandle { slot, gen: data.gen }, value))
		})
	}

	pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
		self.slots.iter().filter_map(|data| data.value.as_ref())
	}
}
