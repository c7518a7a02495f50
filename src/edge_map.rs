//! Immutable integer-keyed maps for automaton transitions.
//!
//! Most cached states have zero or one outgoing edge, a few have a handful,
//! and hot states over small vocabularies fill in densely; the four variants
//! cover that spectrum without a per-state allocation decision up front.
//! Every write produces a new map and leaves the old one fully usable, which
//! is what lets readers load a map with a single reference read while a
//! writer installs its successor.

use std::collections::BTreeMap;
use std::sync::Arc;

const INITIAL_SPARSE_CAPACITY: usize = 4;

#[derive(Debug)]
pub enum EdgeMap<T: Clone> {
	Empty {
		min: i32,
		max: i32,
	},
	Singleton {
		min: i32,
		max: i32,
		key: i32,
		value: T,
	},
	/// Open-addressed table, power-of-two capacity, linear probing from
	/// `key & (capacity - 1)`.
	Sparse {
		min: i32,
		max: i32,
		table: Vec<Option<(i32, T)>>,
		count: usize,
	},
	/// Direct indexing by `key - min` over the whole symbol span.
	Array {
		min: i32,
		max: i32,
		values: Vec<Option<T>>,
		count: usize,
	},
}

impl<T: Clone> EdgeMap<T> {
	pub fn new(min: i32, max: i32) -> Arc<Self> {
		assert!(min <= max);
		Arc::new(Self::Empty { min, max })
	}

	pub fn min(&self) -> i32 {
		match self {
			Self::Empty { min, .. }
			| Self::Singleton { min, .. }
			| Self::Sparse { min, .. }
			| Self::Array { min, .. } => *min,
		}
	}

	pub fn max(&self) -> i32 {
		match self {
			Self::Empty { max, .. }
			| Self::Singleton { max, .. }
			| Self::Sparse { max, .. }
			| Self::Array { max, .. } => *max,
		}
	}

	fn span(&self) -> usize {
		(i64::from(self.max()) - i64::from(self.min()) + 1) as usize
	}

	fn in_range(&self, key: i32) -> bool {
		self.min() <= key && key <= self.max()
	}

	pub fn size(&self) -> usize {
		match self {
			Self::Empty { .. } => 0,
			Self::Singleton { .. } => 1,
			Self::Sparse { count, .. } | Self::Array { count, .. } => *count,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.size() == 0
	}

	pub fn get(&self, key: i32) -> Option<&T> {
		if !self.in_range(key) {
			return None;
		}
		match self {
			Self::Empty { .. } => None,
			Self::Singleton {
				key: stored, value, ..
			} => (*stored == key).then_some(value),
			Self::Sparse { table, .. } => {
				let mask: usize = table.len() - 1;
				let mut slot: usize = (key as usize) & mask;
				for _ in 0..table.len() {
					match &table[slot] {
						None => return None,
						Some((stored, value)) if *stored == key => return Some(value),
						Some(_) => slot = (slot + 1) & mask,
					}
				}
				None
			},
			Self::Array { values, min, .. } => values[(key - min) as usize].as_ref(),
		}
	}

	/// Out-of-range keys are silently dropped; whatever would have been
	/// stored gets recomputed on demand instead.
	pub fn put(self: &Arc<Self>, key: i32, value: T) -> Arc<Self> {
		if !self.in_range(key) {
			return self.clone();
		}
		let min: i32 = self.min();
		let max: i32 = self.max();
		match &**self {
			Self::Empty { .. } => Arc::new(Self::Singleton { min, max, key, value }),
			Self::Singleton {
				key: stored,
				value: stored_value,
				..
			} => {
				if *stored == key {
					return Arc::new(Self::Singleton { min, max, key, value });
				}
				let mut next: Self = Self::sparse(min, max, INITIAL_SPARSE_CAPACITY);
				next.insert_grow([(*stored, stored_value.clone()), (key, value)]);
				Arc::new(next)
			},
			Self::Sparse { table, .. } => {
				let mut next: Self = Self::sparse(min, max, table.len());
				next.insert_grow(table.iter().flatten().cloned());
				next.insert_grow([(key, value)]);
				Arc::new(next)
			},
			Self::Array { values, count, .. } => {
				let mut values: Vec<Option<T>> = values.clone();
				let mut count: usize = *count;
				let slot: &mut Option<T> = &mut values[(key - min) as usize];
				if slot.is_none() {
					count += 1;
				}
				*slot = Some(value);
				Arc::new(Self::Array {
					min,
					max,
					values,
					count,
				})
			},
		}
	}

	pub fn remove(self: &Arc<Self>, key: i32) -> Arc<Self> {
		if !self.in_range(key) || self.get(key).is_none() {
			return self.clone();
		}
		let min: i32 = self.min();
		let max: i32 = self.max();
		let remaining: Vec<(i32, T)> = self
			.entries()
			.into_iter()
			.filter(|(stored, _)| *stored != key)
			.collect::<Vec<_>>();
		Arc::new(Self::from_entries(min, max, remaining))
	}

	pub fn clear(self: &Arc<Self>) -> Arc<Self> {
		if self.is_empty() {
			return self.clone();
		}
		Self::new(self.min(), self.max())
	}

	pub fn put_all(self: &Arc<Self>, other: &Self) -> Arc<Self> {
		let mut result: Arc<Self> = self.clone();
		for (key, value) in other.entries().into_iter() {
			result = result.put(key, value);
		}
		result
	}

	pub fn to_map(&self) -> BTreeMap<i32, T> {
		self.entries().into_iter().collect::<BTreeMap<_, _>>()
	}

	fn entries(&self) -> Vec<(i32, T)> {
		match self {
			Self::Empty { .. } => Vec::new(),
			Self::Singleton { key, value, .. } => vec![(*key, value.clone())],
			Self::Sparse { table, .. } => table.iter().flatten().cloned().collect::<Vec<_>>(),
			Self::Array { values, min, .. } => values
				.iter()
				.enumerate()
				.filter_map(|(i, value)| Some((min + i as i32, value.clone()?)))
				.collect::<Vec<_>>(),
		}
	}

	fn from_entries(min: i32, max: i32, entries: Vec<(i32, T)>) -> Self {
		match entries.len() {
			0 => Self::Empty { min, max },
			1 => {
				let (key, value): (i32, T) = entries.into_iter().next().unwrap();
				Self::Singleton { min, max, key, value }
			},
			_ => {
				let mut next: Self = Self::sparse(min, max, entries.len().next_power_of_two());
				next.insert_grow(entries);
				next
			},
		}
	}

	fn sparse(min: i32, max: i32, capacity: usize) -> Self {
		assert!(capacity.is_power_of_two());
		Self::Sparse {
			min,
			max,
			table: vec![None; capacity],
			count: 0,
		}
	}

	/// Inserts into a private (not yet published) map, doubling the table
	/// while collisions keep it too full and converting to the dense layout
	/// once the projected capacity reaches half the symbol span.
	fn insert_grow(&mut self, entries: impl IntoIterator<Item = (i32, T)>) {
		for (key, value) in entries {
			loop {
				// Keep the table at most half full so probe runs stay short.
				let doubled: usize = match &*self {
					Self::Sparse { table, count, .. } if (*count + 1) * 2 > table.len() => table.len() * 2,
					_ => break,
				};
				let min: i32 = self.min();
				let max: i32 = self.max();
				let span: usize = self.span();
				let old: Vec<(i32, T)> = self.entries();
				if doubled >= span / 2 {
					*self = Self::Array {
						min,
						max,
						values: vec![None; span],
						count: 0,
					};
				} else {
					*self = Self::sparse(min, max, doubled);
				}
				for (old_key, old_value) in old.into_iter() {
					self.insert_direct(old_key, old_value);
				}
			}
			self.insert_direct(key, value);
		}
	}

	fn insert_direct(&mut self, key: i32, value: T) {
		match self {
			Self::Sparse { table, count, .. } => {
				let mask: usize = table.len() - 1;
				let mut slot: usize = (key as usize) & mask;
				loop {
					match &mut table[slot] {
						Some((stored, value_slot)) if *stored == key => {
							*value_slot = value;
							break;
						},
						Some(_) => slot = (slot + 1) & mask,
						empty => {
							*empty = Some((key, value));
							*count += 1;
							break;
						},
					}
				}
			},
			Self::Array { values, count, min, .. } => {
				let slot: &mut Option<T> = &mut values[(key - *min) as usize];
				if slot.is_none() {
					*count += 1;
				}
				*slot = Some(value);
			},
			Self::Empty { .. } | Self::Singleton { .. } => unreachable!(),
		}
	}
}

impl<T: Clone + PartialEq> PartialEq for EdgeMap<T> {
	fn eq(&self, other: &Self) -> bool {
		self.min() == other.min() && self.max() == other.max() && self.to_map() == other.to_map()
	}
}

impl<T: Clone + PartialEq> Eq for EdgeMap<T> {}
