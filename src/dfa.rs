//! The lazily built automaton shared across parser instances.
//!
//! States are interned by their sealed configuration set; the state number is
//! bookkeeping for diagnostics and deliberately excluded from identity (and
//! from the hash, so callers cannot accidentally fold it back in). Edges are
//! immutable maps swapped by reference: a reader that misses an in-flight
//! edge simply recomputes a state that interning collapses right back.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use parking_lot::Mutex;
use parking_lot::RwLock;

use crate::atn::Atn;
use crate::atn::AtnStateIdx;
use crate::config_set::FrozenConfigSet;
use crate::edge_map::EdgeMap;
use crate::lexer_actions::LexerActionExecutor;
use crate::semantics::SemanticContext;

/// Context edge key meaning "invoked from nowhere further out".
pub const OUTERMOST_CONTEXT_KEY: i32 = -1;

/// Precedence levels dispatchable through a precedence start state.
pub const MAX_PRECEDENCE: i32 = 200;

const ERROR_STATE_NUMBER: u32 = u32::MAX;

/// What a state that commits a prediction knows.
#[derive(Debug, Clone)]
pub struct AcceptInfo {
	/// The alternative (parser) or token type (lexer) this state predicts
	/// when no predicate disjunction applies.
	pub prediction: u32,
	/// Predicate disjunction evaluated in alternative order; first true
	/// entry wins. `None` entries are unconditional.
	pub predicates: Option<Vec<PredictedAlt>>,
	pub lexer_action: Option<Arc<LexerActionExecutor>>,
}

#[derive(Debug, Clone)]
pub struct PredictedAlt {
	pub alt: u32,
	pub semantic_context: Option<Arc<SemanticContext>>,
}

#[derive(Debug)]
pub struct DfaState {
	number: u32,
	configs: Arc<FrozenConfigSet>,
	edges: RwLock<Arc<EdgeMap<Arc<DfaState>>>>,
	context_edges: RwLock<Arc<EdgeMap<Arc<DfaState>>>>,
	accept: Option<AcceptInfo>,
	/// Symbols that have required a full-context retry from this state.
	/// Advisory diagnostics; prediction never reads it.
	context_symbols: Mutex<Option<std::collections::BTreeSet<i32>>>,
}

impl DfaState {
	fn new(
		number: u32,
		configs: Arc<FrozenConfigSet>,
		accept: Option<AcceptInfo>,
		symbol_range: (i32, i32),
		context_range: (i32, i32),
	) -> Self {
		Self {
			number,
			configs,
			edges: RwLock::new(EdgeMap::new(symbol_range.0, symbol_range.1)),
			context_edges: RwLock::new(EdgeMap::new(context_range.0, context_range.1)),
			accept,
			context_symbols: Mutex::new(None),
		}
	}

	pub fn number(&self) -> u32 {
		self.number
	}

	pub fn configs(&self) -> &Arc<FrozenConfigSet> {
		&self.configs
	}

	pub fn accept(&self) -> Option<&AcceptInfo> {
		self.accept.as_ref()
	}

	pub fn is_error(&self) -> bool {
		self.number == ERROR_STATE_NUMBER
	}

	pub fn target(&self, symbol: i32) -> Option<Arc<DfaState>> {
		self.edges.read().get(symbol).cloned()
	}

	pub fn set_target(&self, symbol: i32, target: Arc<DfaState>) {
		let mut edges = self.edges.write();
		*edges = edges.put(symbol, target);
	}

	/// Keyed by invoking network state, [`OUTERMOST_CONTEXT_KEY`] for the
	/// outermost frame.
	pub fn context_target(&self, key: i32) -> Option<Arc<DfaState>> {
		self.context_edges.read().get(key).cloned()
	}

	pub fn set_context_target(&self, key: i32, target: Arc<DfaState>) {
		let mut edges = self.context_edges.write();
		*edges = edges.put(key, target);
	}

	pub fn record_context_symbol(&self, symbol: i32) {
		let mut guard = self.context_symbols.lock();
		guard.get_or_insert_with(std::collections::BTreeSet::new).insert(symbol);
	}

	pub fn context_symbols(&self) -> std::collections::BTreeSet<i32> {
		self.context_symbols.lock().clone().unwrap_or_default()
	}

	pub fn edge_count(&self) -> usize {
		self.edges.read().size()
	}
}

/// State-number bookkeeping stays out of identity: two states are the same
/// state exactly when their sealed configuration sets are equal.
impl PartialEq for DfaState {
	fn eq(&self, other: &Self) -> bool {
		std::ptr::eq(self, other) || self.configs == other.configs
	}
}

impl Eq for DfaState {}

impl std::hash::Hash for DfaState {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.configs.hash(state);
	}
}

#[derive(Debug)]
pub struct Dfa {
	atn_start_state: AtnStateIdx,
	decision: usize,
	states: DashMap<Arc<FrozenConfigSet>, Arc<DfaState>>,
	next_state_number: AtomicU32,
	s0: RwLock<Option<Arc<DfaState>>>,
	s0_full: RwLock<Option<Arc<DfaState>>>,
	min_symbol: i32,
	max_symbol: i32,
	context_range: (i32, i32),
	precedence_dfa: bool,
	error_state: Arc<DfaState>,
}

impl Dfa {
	pub fn new(atn: &Atn, decision: usize, min_symbol: i32, max_symbol: i32) -> Self {
		let atn_start_state: AtnStateIdx = atn.decision_state(decision);
		let precedence_dfa: bool = atn[atn_start_state].precedence_rule_decision();
		let context_range: (i32, i32) = (OUTERMOST_CONTEXT_KEY, atn.num_states() as i32 - 1);

		let next_state_number: AtomicU32 = AtomicU32::new(0);
		let placeholder = |number: u32| -> Arc<DfaState> {
			Arc::new(DfaState::new(
				number,
				Arc::new(FrozenConfigSet::empty()),
				None,
				(0, MAX_PRECEDENCE),
				context_range,
			))
		};

		let (s0, s0_full): (Option<Arc<DfaState>>, Option<Arc<DfaState>>) = if precedence_dfa {
			(
				Some(placeholder(next_state_number.fetch_add(1, Ordering::Relaxed))),
				Some(placeholder(next_state_number.fetch_add(1, Ordering::Relaxed))),
			)
		} else {
			(None, None)
		};

		let error_state: Arc<DfaState> = Arc::new(DfaState::new(
			ERROR_STATE_NUMBER,
			Arc::new(FrozenConfigSet::empty()),
			None,
			(min_symbol, max_symbol),
			context_range,
		));

		Self {
			atn_start_state,
			decision,
			states: DashMap::new(),
			next_state_number,
			s0: RwLock::new(s0),
			s0_full: RwLock::new(s0_full),
			min_symbol,
			max_symbol,
			context_range,
			precedence_dfa,
			error_state,
		}
	}

	/// Interns a sealed set as a state. The first caller in wins and assigns
	/// the number; losers of the race adopt the winner, so a state number gap
	/// is possible and harmless.
	pub fn add_state(&self, configs: FrozenConfigSet, accept: Option<AcceptInfo>) -> Arc<DfaState> {
		let configs: Arc<FrozenConfigSet> = Arc::new(configs);
		self.states
			.entry(configs.clone())
			.or_insert_with(|| {
				let number: u32 = self.next_state_number.fetch_add(1, Ordering::Relaxed);
				trace!(decision = self.decision, number, "interned state");
				Arc::new(DfaState::new(
					number,
					configs,
					accept,
					(self.min_symbol, self.max_symbol),
					self.context_range,
				))
			})
			.value()
			.clone()
	}

	pub fn start_state(&self, full_context: bool) -> Option<Arc<DfaState>> {
		assert!(
			!self.precedence_dfa,
			"precedence automaton start states are keyed by precedence"
		);
		let slot = if full_context { &self.s0_full } else { &self.s0 };
		slot.read().clone()
	}

	/// One-shot install; returns whichever state ends up installed.
	pub fn install_start_state(&self, full_context: bool, state: Arc<DfaState>) -> Arc<DfaState> {
		assert!(
			!self.precedence_dfa,
			"precedence automaton start states are keyed by precedence"
		);
		let slot = if full_context { &self.s0_full } else { &self.s0 };
		let mut guard = slot.write();
		match &*guard {
			Some(existing) => existing.clone(),
			None => {
				*guard = Some(state.clone());
				state
			},
		}
	}

	pub fn precedence_start_state(&self, precedence: i32, full_context: bool) -> Option<Arc<DfaState>> {
		assert!(
			self.precedence_dfa,
			"start states of this automaton are not keyed by precedence"
		);
		let slot = if full_context { &self.s0_full } else { &self.s0 };
		let placeholder: Arc<DfaState> = slot.read().clone().unwrap();
		placeholder.target(precedence)
	}

	pub fn set_precedence_start_state(
		&self,
		precedence: i32,
		full_context: bool,
		target: Arc<DfaState>,
	) -> Arc<DfaState> {
		assert!(
			self.precedence_dfa,
			"start states of this automaton are not keyed by precedence"
		);
		let slot = if full_context { &self.s0_full } else { &self.s0 };
		let placeholder: Arc<DfaState> = slot.read().clone().unwrap();
		// First install wins; a racing caller adopts what it finds.
		let mut edges = placeholder.edges.write();
		if let Some(existing) = edges.get(precedence) {
			return existing.clone();
		}
		*edges = edges.put(precedence, target.clone());
		target
	}

	pub fn error_state(&self) -> &Arc<DfaState> {
		&self.error_state
	}

	pub fn state_count(&self) -> usize {
		self.states.len()
	}

	/// Multi-line rendering of the cached automaton for diagnostics. Format
	/// is for humans; no stability promised.
	pub fn dump(&self) -> String {
		use std::fmt::Write;

		let mut states: Vec<Arc<DfaState>> = self
			.states
			.iter()
			.map(|entry| entry.value().clone())
			.collect::<Vec<_>>();
		states.sort_by_key(|state| state.number);

		let mut out: String = String::new();
		let _ = writeln!(
			out,
			"decision {} (network state {}, {} states{})",
			self.decision,
			self.atn_start_state.0,
			states.len(),
			if self.precedence_dfa { ", precedence" } else { "" },
		);
		for state in states.iter() {
			let accept: String = match &state.accept {
				Some(info) if info.predicates.is_some() => format!(" => alt {} (predicated)", info.prediction),
				Some(info) => format!(" => alt {}", info.prediction),
				None => String::new(),
			};
			let _ = writeln!(out, "s{}[{} configs]{}", state.number, state.configs.len(), accept);
			let edges: BTreeMap<i32, Arc<DfaState>> = state.edges.read().to_map();
			for (symbol, target) in edges.iter() {
				let _ = writeln!(out, "\t{} -> s{}", symbol, target.number);
			}
			let context_edges: BTreeMap<i32, Arc<DfaState>> = state.context_edges.read().to_map();
			for (key, target) in context_edges.iter() {
				let _ = writeln!(out, "\tctx {} -> s{}", key, target.number);
			}
		}
		out
	}
}

// Accessors
impl Dfa {
	pub fn decision(&self) -> usize {
		self.decision
	}

	pub fn atn_start_state(&self) -> AtnStateIdx {
		self.atn_start_state
	}

	pub fn is_precedence_dfa(&self) -> bool {
		self.precedence_dfa
	}

	pub fn min_symbol(&self) -> i32 {
		self.min_symbol
	}

	pub fn max_symbol(&self) -> i32 {
		self.max_symbol
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::atn::AtnBuilder;
	use crate::atn::AtnStateKind;
	use crate::config::AtnConfig;
	use crate::config_set::ConfigSet;
	use crate::context::JoinCache;
	use crate::context::empty_full;
	use crate::stream::EOF;

	fn test_atn() -> Atn {
		let mut builder: AtnBuilder = AtnBuilder::new(3);
		let rule: usize = builder.add_rule("r", 0);
		let decision: AtnStateIdx = builder.add_decision_state(AtnStateKind::BlockStart, rule);
		let end: AtnStateIdx = builder.add_state(AtnStateKind::BlockEnd, rule);
		builder.epsilon(builder.rule_start(rule), decision);
		builder.atom(decision, end, 1);
		builder.epsilon(end, builder.rule_stop(rule));
		builder.freeze()
	}

	fn sealed(state: usize, alt: u32) -> FrozenConfigSet {
		let mut cache: JoinCache = JoinCache::new();
		let mut set: ConfigSet = ConfigSet::new(false);
		set.add(AtnConfig::new(AtnStateIdx(state), alt, empty_full()), &mut cache);
		set.seal()
	}

	#[test]
	fn interning_dedups_by_configs() {
		let atn: Atn = test_atn();
		let dfa: Dfa = Dfa::new(&atn, 0, EOF, 3);

		let a: Arc<DfaState> = dfa.add_state(sealed(1, 1), None);
		let b: Arc<DfaState> = dfa.add_state(sealed(1, 1), None);
		assert!(Arc::ptr_eq(&a, &b));
		assert_eq!(dfa.state_count(), 1);

		let c: Arc<DfaState> = dfa.add_state(sealed(2, 1), None);
		assert_ne!(a.number(), c.number());
		assert_eq!(dfa.state_count(), 2);
	}

	#[test]
	fn edges_and_start_states() {
		let atn: Atn = test_atn();
		let dfa: Dfa = Dfa::new(&atn, 0, EOF, 3);

		let a: Arc<DfaState> = dfa.add_state(sealed(1, 1), None);
		let b: Arc<DfaState> = dfa.add_state(sealed(2, 1), None);
		assert!(a.target(2).is_none());
		a.set_target(2, b.clone());
		assert!(Arc::ptr_eq(&a.target(2).unwrap(), &b));
		// Out of range is dropped, not stored.
		a.set_target(99, b.clone());
		assert!(a.target(99).is_none());

		assert!(dfa.start_state(false).is_none());
		let installed: Arc<DfaState> = dfa.install_start_state(false, a.clone());
		assert!(Arc::ptr_eq(&installed, &a));
		// Second install keeps the first.
		let installed: Arc<DfaState> = dfa.install_start_state(false, b.clone());
		assert!(Arc::ptr_eq(&installed, &a));

		a.set_context_target(OUTERMOST_CONTEXT_KEY, b.clone());
		assert!(Arc::ptr_eq(&a.context_target(OUTERMOST_CONTEXT_KEY).unwrap(), &b));
	}

	#[test]
	#[should_panic(expected = "not keyed by precedence")]
	fn precedence_lookup_on_plain_dfa_panics() {
		let atn: Atn = test_atn();
		let dfa: Dfa = Dfa::new(&atn, 0, EOF, 3);
		let _ = dfa.precedence_start_state(1, false);
	}

	#[test]
	fn concurrent_interning_converges() {
		let atn: Atn = test_atn();
		let dfa: Arc<Dfa> = Arc::new(Dfa::new(&atn, 0, EOF, 3));

		std::thread::scope(|scope| {
			for _ in 0..4 {
				let dfa: &Arc<Dfa> = &dfa;
				scope.spawn(move || {
					for state in 1..20 {
						let _ = dfa.add_state(sealed(state, 1), None);
					}
				});
			}
		});
		assert_eq!(dfa.state_count(), 19);
	}
}
