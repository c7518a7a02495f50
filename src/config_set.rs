//! Sets of configurations with in-place merging.
//!
//! Configurations that share a position and alternative differ only in how
//! they got there, so their invocation stacks are joined instead of the set
//! growing. Merging is keyed on `(state, alt)`; configurations colliding on
//! the key with an incompatible predicate land on an overflow list. A set is
//! mutable while closure and reach build it, then sealed by value into a
//! [`FrozenConfigSet`], which is the identity of a cached automaton state;
//! the type split is what makes mutating a sealed set unrepresentable.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use crate::atn::INVALID_ALT;
use crate::config::AtnConfig;
use crate::context::JoinCache;
use crate::context::PredictionContext;

/// The alternatives left standing after a conflict, and whether the tie is
/// provably exact (every conflicting state represents the same alternatives
/// with identical context unions).
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ConflictInfo {
	pub alts: BTreeSet<u32>,
	pub exact: bool,
}

impl ConflictInfo {
	pub fn min_alt(&self) -> u32 {
		*self.alts.first().unwrap()
	}
}

#[derive(Debug, Default)]
pub struct ConfigSet {
	configs: Vec<AtnConfig>,
	/// Merge key -> index of the representative in `configs`.
	merged: HashMap<u64, usize>,
	/// Indices of configurations that collide on key but cannot merge.
	unmerged: Vec<usize>,
	unique_alt: u32,
	has_semantic_context: bool,
	dips_into_outer_context: bool,
	outermost: bool,
	conflict_info: Option<ConflictInfo>,
}

impl ConfigSet {
	pub fn new(outermost: bool) -> Self {
		Self {
			unique_alt: INVALID_ALT,
			outermost,
			..Self::default()
		}
	}

	fn key(config: &AtnConfig) -> u64 {
		((config.state().0 as u64) << 12) | u64::from(config.alt() & 0xfff)
	}

	fn can_merge(a: &AtnConfig, b: &AtnConfig) -> bool {
		a.state() == b.state() && a.alt() == b.alt() && a.semantic_context() == b.semantic_context()
	}

	/// Adds `config`, merging into an existing entry when possible. Returns
	/// whether the set changed.
	pub fn add(&mut self, config: AtnConfig, cache: &mut JoinCache) -> bool {
		if self.configs.is_empty() {
			self.unique_alt = config.alt();
		} else if self.unique_alt != config.alt() {
			self.unique_alt = INVALID_ALT;
		}
		self.has_semantic_context = self.has_semantic_context || config.semantic_context().is_some();
		if config.outer_context_depth() > 0 && !self.outermost {
			self.dips_into_outer_context = true;
		}

		let key: u64 = Self::key(&config);

		if let Some(&index) = self.merged.get(&key) {
			if Self::can_merge(&config, &self.configs[index]) {
				return Self::merge(&mut self.configs[index], &config, cache);
			}
		}

		for position in 0..self.unmerged.len() {
			let index: usize = self.unmerged[position];
			if Self::key(&self.configs[index]) == key && Self::can_merge(&config, &self.configs[index]) {
				let changed: bool = Self::merge(&mut self.configs[index], &config, cache);
				if !self.merged.contains_key(&key) {
					self.merged.insert(key, index);
					self.unmerged.swap_remove(position);
				}
				return changed;
			}
		}

		let index: usize = self.configs.len();
		self.configs.push(config);
		if self.merged.contains_key(&key) {
			self.unmerged.push(index);
		} else {
			self.merged.insert(key, index);
		}
		true
	}

	fn merge(existing: &mut AtnConfig, config: &AtnConfig, cache: &mut JoinCache) -> bool {
		let mut changed: bool = false;
		if config.outer_context_depth() > existing.outer_context_depth() {
			existing.outer_context_depth = config.outer_context_depth();
		}
		if config.precedence_filter_suppressed() && !existing.precedence_filter_suppressed() {
			existing.precedence_filter_suppressed = true;
			changed = true;
		}
		let joined: Arc<PredictionContext> = PredictionContext::join(existing.context(), config.context(), cache);
		if !Arc::ptr_eq(&joined, existing.context()) {
			existing.context = joined;
			changed = true;
		}
		changed
	}

	pub fn set_conflict_info(&mut self, info: Option<ConflictInfo>) {
		self.conflict_info = info;
	}

	pub fn set_dips_into_outer_context(&mut self) {
		if !self.outermost {
			self.dips_into_outer_context = true;
		}
	}

	pub fn represented_alts(&self) -> BTreeSet<u32> {
		if let Some(info) = &self.conflict_info {
			return info.alts.clone();
		}
		self.configs.iter().map(AtnConfig::alt).collect::<BTreeSet<_>>()
	}

	/// Rewrites every configuration's stack, e.g. through an intern table.
	/// The mapping must be structure-preserving or the merge keys go stale.
	pub fn map_contexts(&mut self, mut map: impl FnMut(&Arc<PredictionContext>) -> Arc<PredictionContext>) {
		for config in self.configs.iter_mut() {
			config.context = map(&config.context);
		}
	}

	/// Discards the merge bookkeeping and freezes the membership. The frozen
	/// form carries a precomputed hash; all downstream comparisons use it.
	pub fn seal(self) -> FrozenConfigSet {
		debug_assert!(!self.outermost || !self.dips_into_outer_context);
		let cached_hash: u64 = {
			let mut hasher: std::hash::DefaultHasher = std::hash::DefaultHasher::new();
			self.configs.hash(&mut hasher);
			self.unique_alt.hash(&mut hasher);
			self.conflict_info.hash(&mut hasher);
			self.has_semantic_context.hash(&mut hasher);
			self.dips_into_outer_context.hash(&mut hasher);
			self.outermost.hash(&mut hasher);
			hasher.finish()
		};
		FrozenConfigSet {
			configs: self.configs,
			unique_alt: self.unique_alt,
			has_semantic_context: self.has_semantic_context,
			dips_into_outer_context: self.dips_into_outer_context,
			outermost: self.outermost,
			conflict_info: self.conflict_info,
			cached_hash,
		}
	}
}

// Accessors
impl ConfigSet {
	pub fn len(&self) -> usize {
		self.configs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.configs.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &AtnConfig> {
		self.configs.iter()
	}

	pub fn unique_alt(&self) -> u32 {
		self.unique_alt
	}

	pub fn has_semantic_context(&self) -> bool {
		self.has_semantic_context
	}

	pub fn dips_into_outer_context(&self) -> bool {
		self.dips_into_outer_context
	}

	pub fn outermost(&self) -> bool {
		self.outermost
	}

	pub fn conflict_info(&self) -> Option<&ConflictInfo> {
		self.conflict_info.as_ref()
	}
}

#[derive(Debug)]
pub struct FrozenConfigSet {
	configs: Vec<AtnConfig>,
	unique_alt: u32,
	has_semantic_context: bool,
	dips_into_outer_context: bool,
	outermost: bool,
	conflict_info: Option<ConflictInfo>,
	cached_hash: u64,
}

impl FrozenConfigSet {
	/// The sealed empty set; identity of the dead-end automaton state.
	pub fn empty() -> Self {
		ConfigSet::new(false).seal()
	}

	pub fn len(&self) -> usize {
		self.configs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.configs.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &AtnConfig> {
		self.configs.iter()
	}

	pub fn unique_alt(&self) -> u32 {
		self.unique_alt
	}

	pub fn has_semantic_context(&self) -> bool {
		self.has_semantic_context
	}

	pub fn dips_into_outer_context(&self) -> bool {
		self.dips_into_outer_context
	}

	pub fn outermost(&self) -> bool {
		self.outermost
	}

	pub fn conflict_info(&self) -> Option<&ConflictInfo> {
		self.conflict_info.as_ref()
	}

	pub fn represented_alts(&self) -> BTreeSet<u32> {
		if let Some(info) = &self.conflict_info {
			return info.alts.clone();
		}
		self.configs.iter().map(AtnConfig::alt).collect::<BTreeSet<_>>()
	}
}

impl PartialEq for FrozenConfigSet {
	fn eq(&self, other: &Self) -> bool {
		if std::ptr::eq(self, other) {
			return true;
		}
		self.cached_hash == other.cached_hash
			&& self.unique_alt == other.unique_alt
			&& self.has_semantic_context == other.has_semantic_context
			&& self.dips_into_outer_context == other.dips_into_outer_context
			&& self.outermost == other.outermost
			&& self.conflict_info == other.conflict_info
			&& self.configs == other.configs
	}
}

impl Eq for FrozenConfigSet {}

impl Hash for FrozenConfigSet {
	fn hash<H: Hasher>(&self, state: &mut H) {
		state.write_u64(self.cached_hash);
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::atn::AtnStateIdx;
	use crate::context::empty_full;
	use crate::semantics::SemanticContext;

	fn config(state: usize, alt: u32, return_state: u32) -> AtnConfig {
		AtnConfig::new(AtnStateIdx(state), alt, empty_full().child(return_state))
	}

	#[test]
	fn merging_keyed_on_state_and_alt() {
		let mut cache: JoinCache = JoinCache::new();
		let mut set: ConfigSet = ConfigSet::new(false);

		assert!(set.add(config(1, 1, 10), &mut cache));
		assert!(set.add(config(1, 1, 20), &mut cache));
		assert_eq!(set.len(), 1);
		let merged: &AtnConfig = set.iter().next().unwrap();
		assert_eq!(merged.context().size(), 2);

		// Same position, different alternative: a separate entry.
		assert!(set.add(config(1, 2, 10), &mut cache));
		assert_eq!(set.len(), 2);
		assert_eq!(set.unique_alt(), INVALID_ALT);
	}

	#[test]
	fn re_adding_is_unchanged() {
		let mut cache: JoinCache = JoinCache::new();
		let mut set: ConfigSet = ConfigSet::new(false);
		assert!(set.add(config(1, 1, 10), &mut cache));
		assert!(!set.add(config(1, 1, 10), &mut cache));
		assert_eq!(set.len(), 1);
	}

	#[test]
	fn semantic_context_splits_entries() {
		let mut cache: JoinCache = JoinCache::new();
		let mut set: ConfigSet = ConfigSet::new(false);

		let plain: AtnConfig = config(1, 1, 10);
		let mut guarded: AtnConfig = config(1, 1, 20);
		guarded.semantic_context = Some(Arc::new(SemanticContext::Predicate {
			rule: 0,
			pred: 0,
			is_ctx_dependent: false,
		}));

		set.add(plain, &mut cache);
		set.add(guarded.clone(), &mut cache);
		assert_eq!(set.len(), 2);
		assert!(set.has_semantic_context());

		// The overflow entry still merges with its own kind.
		let mut guarded2: AtnConfig = config(1, 1, 30);
		guarded2.semantic_context = guarded.semantic_context.clone();
		set.add(guarded2, &mut cache);
		assert_eq!(set.len(), 2);

		// Merging property: equal-keyed survivors have distinct predicates.
		let frozen: FrozenConfigSet = set.seal();
		let entries: Vec<&AtnConfig> = frozen.iter().collect::<Vec<_>>();
		for (i, a) in entries.iter().enumerate() {
			for b in entries[(i + 1)..].iter() {
				if a.state() == b.state() && a.alt() == b.alt() {
					assert_ne!(a.semantic_context(), b.semantic_context());
				}
			}
		}
	}

	#[test]
	fn unique_alt_tracking() {
		let mut cache: JoinCache = JoinCache::new();
		let mut set: ConfigSet = ConfigSet::new(false);
		set.add(config(1, 2, 10), &mut cache);
		set.add(config(2, 2, 10), &mut cache);
		assert_eq!(set.unique_alt(), 2);
		set.add(config(3, 1, 10), &mut cache);
		assert_eq!(set.unique_alt(), INVALID_ALT);
		assert_eq!(set.represented_alts(), BTreeSet::from([1, 2]));
	}

	#[test]
	fn sealed_equality_is_structural() {
		let mut cache: JoinCache = JoinCache::new();
		let build = |cache: &mut JoinCache| -> FrozenConfigSet {
			let mut set: ConfigSet = ConfigSet::new(false);
			set.add(config(1, 1, 10), cache);
			set.add(config(2, 2, 20), cache);
			set.seal()
		};
		let a: FrozenConfigSet = build(&mut cache);
		let b: FrozenConfigSet = build(&mut cache);
		assert_eq!(a, b);

		let mut set: ConfigSet = ConfigSet::new(false);
		set.add(config(1, 1, 10), &mut cache);
		assert_ne!(a, set.seal());
	}
}
