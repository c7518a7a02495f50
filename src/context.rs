//! The graph-structured stack of rule-return states.
//!
//! A single prediction explores many rule-invocation histories at once; the
//! histories share long suffixes, so they are kept as an immutable DAG in
//! which one node can serve as a parent frame for many children. Nodes are
//! never mutated after construction and their hash is computed exactly once,
//! so sharing them across configurations, config sets, and cached automaton
//! states is free.

use std::collections::HashMap;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::atn::Atn;
use crate::atn::AtnStateIdx;
use crate::atn::TransitionKind;

/// Return-state marker for "an invocation stack that is already exhausted".
/// It is `u32::MAX` so that, kept sorted, an empty alternative always sits
/// last in a node's frame list.
pub const EMPTY_RETURN_STATE: u32 = u32::MAX;

static EMPTY_LOCAL: Lazy<Arc<PredictionContext>> = Lazy::new(|| Arc::new(PredictionContext::empty(Node::EmptyLocal)));
static EMPTY_FULL: Lazy<Arc<PredictionContext>> = Lazy::new(|| Arc::new(PredictionContext::empty(Node::EmptyFull)));

/// The local terminator: "this stack bottoms out here and anything may
/// follow". Used when predicting without outer context; it absorbs joins.
pub fn empty_local() -> Arc<PredictionContext> {
	EMPTY_LOCAL.clone()
}

/// The full terminator: "this stack bottoms out at the outermost rule".
pub fn empty_full() -> Arc<PredictionContext> {
	EMPTY_FULL.clone()
}

#[derive(Debug)]
pub struct PredictionContext {
	node: Node,
	cached_hash: u64,
}

#[derive(Debug)]
enum Node {
	EmptyLocal,
	EmptyFull,
	/// Parallel lists of return states (strictly increasing) and the parent
	/// node continuing each history. An [`EMPTY_RETURN_STATE`] frame marks an
	/// empty alternative and always carries the full terminator as parent.
	Frames {
		return_states: Vec<u32>,
		parents: Vec<Arc<PredictionContext>>,
	},
}

impl PredictionContext {
	fn empty(node: Node) -> Self {
		let cached_hash: u64 = {
			let mut hasher: std::hash::DefaultHasher = std::hash::DefaultHasher::new();
			match node {
				Node::EmptyLocal => 0_u8.hash(&mut hasher),
				Node::EmptyFull => 1_u8.hash(&mut hasher),
				Node::Frames { .. } => unreachable!(),
			}
			hasher.finish()
		};
		Self { node, cached_hash }
	}

	fn frames(return_states: Vec<u32>, parents: Vec<Arc<PredictionContext>>) -> Self {
		assert_eq!(return_states.len(), parents.len());
		assert!(!return_states.is_empty());
		debug_assert!(return_states.windows(2).all(|w| w[0] < w[1]));
		let cached_hash: u64 = {
			let mut hasher: std::hash::DefaultHasher = std::hash::DefaultHasher::new();
			2_u8.hash(&mut hasher);
			for (return_state, parent) in std::iter::zip(return_states.iter(), parents.iter()) {
				return_state.hash(&mut hasher);
				parent.cached_hash.hash(&mut hasher);
			}
			hasher.finish()
		};
		Self {
			node: Node::Frames { return_states, parents },
			cached_hash,
		}
	}

	pub fn size(&self) -> usize {
		match &self.node {
			Node::EmptyLocal | Node::EmptyFull => 0,
			Node::Frames { return_states, .. } => return_states.len(),
		}
	}

	pub fn return_state(&self, i: usize) -> u32 {
		let Node::Frames { return_states, .. } = &self.node else {
			panic!("empty context has no frames");
		};
		return_states[i]
	}

	pub fn parent(&self, i: usize) -> &Arc<PredictionContext> {
		let Node::Frames { parents, .. } = &self.node else {
			panic!("empty context has no frames");
		};
		&parents[i]
	}

	pub fn find_return_state(&self, return_state: u32) -> Option<usize> {
		let Node::Frames { return_states, .. } = &self.node else {
			return None;
		};
		return_states.binary_search(&return_state).ok()
	}

	pub fn is_empty(&self) -> bool {
		matches!(self.node, Node::EmptyLocal | Node::EmptyFull)
	}

	pub fn is_empty_local(&self) -> bool {
		matches!(self.node, Node::EmptyLocal)
	}

	pub fn is_empty_full(&self) -> bool {
		matches!(self.node, Node::EmptyFull)
	}

	/// Whether some history represented here is already exhausted.
	pub fn has_empty(&self) -> bool {
		match &self.node {
			Node::EmptyLocal | Node::EmptyFull => true,
			Node::Frames { return_states, .. } => *return_states.last().unwrap() == EMPTY_RETURN_STATE,
		}
	}

	/// Pushes one frame: a new single-frame node whose sole parent is `self`.
	pub fn child(self: &Arc<Self>, return_state: u32) -> Arc<Self> {
		assert_ne!(return_state, EMPTY_RETURN_STATE);
		Arc::new(Self::frames(vec![return_state], vec![self.clone()]))
	}

	/// Lifts a parser rule-invocation chain into a context. Each frame pushes
	/// the state the invoking rule resumes at once the invoked rule returns.
	pub fn from_rule_context(atn: &Atn, ctx: &Arc<RuleContext>, full_context: bool) -> Arc<Self> {
		if ctx.is_outermost() {
			return if full_context { empty_full() } else { empty_local() };
		}
		let parent: Arc<Self> = Self::from_rule_context(atn, ctx.parent().unwrap(), full_context);
		let follow: AtnStateIdx = follow_of_invocation(atn, ctx.invoking_state());
		parent.child(follow.0 as u32)
	}
}

// Join
impl PredictionContext {
	/// Structural merge of two stacks, memoized per prediction call.
	///
	/// The two sorted frame lists are walked in lockstep like a merge sort.
	/// As long as every emitted frame is pointer-identical to the
	/// corresponding frame of one input, that input itself is returned,
	/// which is what keeps repeated joins from allocating.
	pub fn join(a: &Arc<Self>, b: &Arc<Self>, cache: &mut JoinCache) -> Arc<Self> {
		if Arc::ptr_eq(a, b) {
			return a.clone();
		}
		if a.is_empty_local() || b.is_empty_local() {
			return empty_local();
		}
		if a.is_empty_full() {
			return Self::with_empty_alternative(b);
		}
		if b.is_empty_full() {
			return Self::with_empty_alternative(a);
		}
		if a == b {
			return a.clone();
		}
		if let Some(hit) = cache.get(a, b) {
			return hit;
		}

		let result: Arc<Self> = Self::join_frames(a, b, cache);
		cache.put(a, b, result.clone());
		result
	}

	fn join_frames(a: &Arc<Self>, b: &Arc<Self>, cache: &mut JoinCache) -> Arc<Self> {
		let mut return_states: Vec<u32> = Vec::with_capacity(a.size() + b.size());
		let mut parents: Vec<Arc<Self>> = Vec::with_capacity(a.size() + b.size());

		let mut can_return_left: bool = true;
		let mut can_return_right: bool = true;

		let mut i: usize = 0;
		let mut j: usize = 0;
		while i < a.size() && j < b.size() {
			let left: u32 = a.return_state(i);
			let right: u32 = b.return_state(j);
			if left == right {
				let parent: Arc<Self> = Self::join(a.parent(i), b.parent(j), cache);
				can_return_left = can_return_left && Arc::ptr_eq(&parent, a.parent(i));
				can_return_right = can_return_right && Arc::ptr_eq(&parent, b.parent(j));
				return_states.push(left);
				parents.push(parent);
				i += 1;
				j += 1;
			} else if left < right {
				return_states.push(left);
				parents.push(a.parent(i).clone());
				can_return_right = false;
				i += 1;
			} else {
				return_states.push(right);
				parents.push(b.parent(j).clone());
				can_return_left = false;
				j += 1;
			}
		}
		if i < a.size() {
			can_return_right = false;
			while i < a.size() {
				return_states.push(a.return_state(i));
				parents.push(a.parent(i).clone());
				i += 1;
			}
		}
		if j < b.size() {
			can_return_left = false;
			while j < b.size() {
				return_states.push(b.return_state(j));
				parents.push(b.parent(j).clone());
				j += 1;
			}
		}

		if can_return_left {
			return a.clone();
		}
		if can_return_right {
			return b.clone();
		}
		Arc::new(Self::frames(return_states, parents))
	}

	/// Adds an exhausted-stack alternative unless one is already present.
	fn with_empty_alternative(ctx: &Arc<Self>) -> Arc<Self> {
		if ctx.has_empty() {
			return ctx.clone();
		}
		let Node::Frames { return_states, parents } = &ctx.node else {
			// Both terminators already report `has_empty`.
			unreachable!();
		};
		let mut return_states: Vec<u32> = return_states.clone();
		let mut parents: Vec<Arc<Self>> = parents.clone();
		return_states.push(EMPTY_RETURN_STATE);
		parents.push(empty_full());
		Arc::new(Self::frames(return_states, parents))
	}
}

// Append
impl PredictionContext {
	/// Replaces every exhausted terminator reachable from `ctx` with
	/// `suffix`, i.e. supplies one more layer of known outer context.
	/// `visited` memoizes shared sub-nodes by identity within one pass.
	pub fn append(
		ctx: &Arc<Self>,
		suffix: &Arc<Self>,
		cache: &mut JoinCache,
		visited: &mut HashMap<usize, Arc<Self>>,
	) -> Arc<Self> {
		match &ctx.node {
			Node::EmptyFull => suffix.clone(),
			// The local terminator is a wildcard; appending known frames to
			// "anything may follow" adds no information.
			Node::EmptyLocal => ctx.clone(),
			Node::Frames { return_states, parents } => {
				let key: usize = Arc::as_ptr(ctx) as usize;
				if let Some(hit) = visited.get(&key) {
					return hit.clone();
				}

				let mut new_states: Vec<u32> = Vec::with_capacity(return_states.len());
				let mut new_parents: Vec<Arc<Self>> = Vec::with_capacity(parents.len());
				let mut had_empty: bool = false;
				let mut changed: bool = false;
				for (return_state, parent) in std::iter::zip(return_states.iter(), parents.iter()) {
					if *return_state == EMPTY_RETURN_STATE {
						had_empty = true;
						continue;
					}
					let appended: Arc<Self> = Self::append(parent, suffix, cache, visited);
					changed = changed || !Arc::ptr_eq(&appended, parent);
					new_states.push(*return_state);
					new_parents.push(appended);
				}

				let result: Arc<Self> = if !had_empty {
					if changed {
						Arc::new(Self::frames(new_states, new_parents))
					} else {
						ctx.clone()
					}
				} else if new_states.is_empty() {
					// The node was nothing but the empty alternative.
					suffix.clone()
				} else {
					let reduced: Arc<Self> = Arc::new(Self::frames(new_states, new_parents));
					Self::join(&reduced, suffix, cache)
				};

				visited.insert(key, result.clone());
				result
			},
		}
	}
}

// Interning
impl PredictionContext {
	/// Hash-conses `ctx` and every reachable parent into `interned`, so that
	/// structurally equal nodes built on different threads collapse to one
	/// allocation and later joins hit the pointer fast path.
	pub fn cached(ctx: &Arc<Self>, interned: &ContextCache, visited: &mut HashMap<usize, Arc<Self>>) -> Arc<Self> {
		if ctx.is_empty() {
			return ctx.clone();
		}
		let key: usize = Arc::as_ptr(ctx) as usize;
		if let Some(hit) = visited.get(&key) {
			return hit.clone();
		}
		if let Some(existing) = interned.get(ctx) {
			visited.insert(key, existing.clone());
			return existing;
		}

		let Node::Frames { return_states, parents } = &ctx.node else {
			unreachable!();
		};
		let mut new_parents: Vec<Arc<Self>> = Vec::with_capacity(parents.len());
		let mut changed: bool = false;
		for parent in parents.iter() {
			let cached: Arc<Self> = Self::cached(parent, interned, visited);
			changed = changed || !Arc::ptr_eq(&cached, parent);
			new_parents.push(cached);
		}

		let updated: Arc<Self> = if changed {
			Arc::new(Self::frames(return_states.clone(), new_parents))
		} else {
			ctx.clone()
		};
		let result: Arc<Self> = interned.intern(updated);
		visited.insert(key, result.clone());
		result
	}
}

impl PartialEq for PredictionContext {
	fn eq(&self, other: &Self) -> bool {
		if std::ptr::eq(self, other) {
			return true;
		}
		if self.cached_hash != other.cached_hash {
			return false;
		}
		match (&self.node, &other.node) {
			(Node::EmptyLocal, Node::EmptyLocal) | (Node::EmptyFull, Node::EmptyFull) => true,
			(
				Node::Frames { return_states, parents },
				Node::Frames {
					return_states: other_states,
					parents: other_parents,
				},
			) => return_states == other_states && parents == other_parents,
			_ => false,
		}
	}
}

impl Eq for PredictionContext {}

impl Hash for PredictionContext {
	fn hash<H: Hasher>(&self, state: &mut H) {
		state.write_u64(self.cached_hash);
	}
}

/// Per-prediction-call memo for [`PredictionContext::join`], keyed by node
/// identity. Never shared across calls (joins in one call see a consistent
/// generation of nodes; a fresh call starts fresh).
#[derive(Debug, Default)]
pub struct JoinCache {
	map: HashMap<(usize, usize), Arc<PredictionContext>>,
}

impl JoinCache {
	pub fn new() -> Self {
		Self::default()
	}

	fn get(&self, a: &Arc<PredictionContext>, b: &Arc<PredictionContext>) -> Option<Arc<PredictionContext>> {
		let key: (usize, usize) = (Arc::as_ptr(a) as usize, Arc::as_ptr(b) as usize);
		self.map.get(&key).cloned()
	}

	fn put(&mut self, a: &Arc<PredictionContext>, b: &Arc<PredictionContext>, result: Arc<PredictionContext>) {
		let pa: usize = Arc::as_ptr(a) as usize;
		let pb: usize = Arc::as_ptr(b) as usize;
		self.map.insert((pa, pb), result.clone());
		self.map.insert((pb, pa), result);
	}
}

/// Shared structural intern table; safe to hand to any number of predictions
/// at once.
#[derive(Debug, Default)]
pub struct ContextCache {
	map: DashMap<Arc<PredictionContext>, Arc<PredictionContext>>,
}

impl ContextCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.map.len()
	}

	pub fn is_empty(&self) -> bool {
		self.map.is_empty()
	}

	fn get(&self, ctx: &Arc<PredictionContext>) -> Option<Arc<PredictionContext>> {
		self.map.get(ctx).map(|entry| entry.value().clone())
	}

	fn intern(&self, ctx: Arc<PredictionContext>) -> Arc<PredictionContext> {
		self.map.entry(ctx.clone()).or_insert(ctx).value().clone()
	}
}

/// The parser's actual rule-invocation chain at the moment of a decision,
/// outermost frame at the end. This is what the full-context phase lifts
/// into prediction contexts, one frame at a time.
#[derive(Debug)]
pub struct RuleContext {
	parent: Option<Arc<RuleContext>>,
	invoking_state: usize,
}

impl RuleContext {
	pub fn outermost() -> Arc<Self> {
		Arc::new(Self {
			parent: None,
			invoking_state: usize::MAX,
		})
	}

	pub fn invoked(parent: &Arc<Self>, invoking_state: usize) -> Arc<Self> {
		Arc::new(Self {
			parent: Some(parent.clone()),
			invoking_state,
		})
	}

	pub fn is_outermost(&self) -> bool {
		self.parent.is_none()
	}

	pub fn parent(&self) -> Option<&Arc<RuleContext>> {
		self.parent.as_ref()
	}

	pub fn invoking_state(&self) -> usize {
		self.invoking_state
	}
}

/// Conservative coverage over context DAGs: does every history in `sub`
/// appear, as a prefix, among the histories of `sup`? False negatives are
/// allowed, false positives are not.
pub fn covers(sup: &Arc<PredictionContext>, sub: &Arc<PredictionContext>) -> bool {
	let mut left: Vec<Arc<PredictionContext>> = vec![sup.clone()];
	let mut right: Vec<Arc<PredictionContext>> = vec![sub.clone()];
	while let (Some(l), Some(r)) = (left.pop(), right.pop()) {
		if Arc::ptr_eq(&l, &r) || l == r {
			continue;
		}
		if l.size() < r.size() {
			return false;
		}
		if r.is_empty() {
			if !l.has_empty() {
				return false;
			}
			continue;
		}
		for i in 0..r.size() {
			match l.find_return_state(r.return_state(i)) {
				Some(index) => {
					left.push(l.parent(index).clone());
					right.push(r.parent(i).clone());
				},
				None => return false,
			}
		}
	}
	true
}

/// The state an invocation recorded in a [`RuleContext`] resumes at.
pub fn follow_of_invocation(atn: &Atn, invoking_state: usize) -> AtnStateIdx {
	let state: &crate::atn::AtnState = &atn[AtnStateIdx(invoking_state)];
	for transition in state.transitions().iter() {
		if let TransitionKind::Rule { follow_state, .. } = transition.kind {
			return follow_state;
		}
	}
	panic!("invoking state {invoking_state} has no rule transition");
}
