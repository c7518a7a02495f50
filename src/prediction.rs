//! Adaptive prediction over the shared automaton.
//!
//! A prediction call walks cached states symbol by symbol, filling holes by
//! subset construction over the network. The first pass runs without outer
//! context ("anything may follow" at the bottom of every stack); when that
//! pass cannot separate the alternatives it conflicts, and the call retries
//! with the real invocation chain supplied one frame at a time through the
//! context-edge chain hanging off the full-context start state. Ambiguity
//! and context sensitivity are reported, never errored.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use crate::atn::Atn;
use crate::atn::AtnState;
use crate::atn::AtnStateIdx;
use crate::atn::INVALID_ALT;
use crate::atn::TransitionKind;
use crate::config::AtnConfig;
use crate::config_set::ConfigSet;
use crate::config_set::ConflictInfo;
use crate::config_set::FrozenConfigSet;
use crate::context::ContextCache;
use crate::context::EMPTY_RETURN_STATE;
use crate::context::JoinCache;
use crate::context::PredictionContext;
use crate::context::RuleContext;
use crate::context::covers;
use crate::context::empty_full;
use crate::context::empty_local;
use crate::context::follow_of_invocation;
use crate::dfa::AcceptInfo;
use crate::dfa::Dfa;
use crate::dfa::DfaState;
use crate::dfa::OUTERMOST_CONTEXT_KEY;
use crate::dfa::PredictedAlt;
use crate::error::PredictionError;
use crate::listener::DecisionListener;
use crate::listener::ProxyListener;
use crate::semantics::PredicateEvaluator;
use crate::semantics::SemanticContext;
use crate::stream::EOF;
use crate::stream::SymbolStream;

/// Predicts alternatives for parser decisions. One instance per parser;
/// the automata and the context intern table are shared across instances.
pub struct AdaptivePredictor {
	atn: Arc<Atn>,
	dfas: Arc<Vec<Dfa>>,
	context_cache: Arc<ContextCache>,
	listeners: ProxyListener,
	exact_ambiguity: bool,
}

/// Per-call measurements, filled by [`AdaptivePredictor::predict_traced`].
#[derive(Debug, Default, Clone)]
pub struct PredictTrace {
	/// Deepest lookahead of the local phase, in symbols.
	pub sll_lookahead: usize,
	/// Deepest lookahead of the full-context phase, in symbols.
	pub ll_lookahead: usize,
	pub used_full_context: bool,
	/// Steps resolved from cached edges.
	pub dfa_transitions: u64,
	/// Network transitions examined while filling cache holes.
	pub atn_transitions: u64,
	pub events: Vec<TraceEvent>,
}

#[derive(Debug, Clone)]
pub enum TraceEvent {
	Conflict {
		alts: BTreeSet<u32>,
		stop_index: usize,
	},
	Ambiguity {
		alts: BTreeSet<u32>,
		exact: bool,
		stop_index: usize,
	},
	ContextSensitivity {
		prediction: u32,
		stop_index: usize,
	},
	PredicateEval {
		alt: u32,
		result: bool,
	},
	Error {
		stop_index: usize,
	},
}

impl AdaptivePredictor {
	pub fn new(atn: Arc<Atn>, dfas: Arc<Vec<Dfa>>) -> Self {
		assert_eq!(atn.num_decisions(), dfas.len());
		Self {
			atn,
			dfas,
			context_cache: Arc::new(ContextCache::new()),
			listeners: ProxyListener::new(),
			exact_ambiguity: false,
		}
	}

	/// One automaton per decision, over the parser symbol range
	/// `[EOF, max token type]`. Share the result across predictor instances
	/// to share prediction work.
	pub fn build_dfas(atn: &Atn) -> Arc<Vec<Dfa>> {
		let dfas: Vec<Dfa> = (0..atn.num_decisions())
			.map(|decision| Dfa::new(atn, decision, EOF, atn.max_token_type()))
			.collect::<Vec<_>>();
		Arc::new(dfas)
	}

	pub fn set_exact_ambiguity(&mut self, exact: bool) {
		self.exact_ambiguity = exact;
	}

	pub fn listeners(&self) -> &ProxyListener {
		&self.listeners
	}

	pub fn dfa(&self, decision: usize) -> &Dfa {
		&self.dfas[decision]
	}

	pub fn decision_count(&self) -> usize {
		self.dfas.len()
	}

	pub fn predict(
		&self,
		decision: usize,
		input: &mut dyn SymbolStream,
		outer_context: &Arc<RuleContext>,
		evaluator: &dyn PredicateEvaluator,
	) -> Result<u32, PredictionError> {
		let mut trace: PredictTrace = PredictTrace::default();
		self.predict_traced(decision, input, outer_context, evaluator, &mut trace)
	}

	/// [`Self::predict`] with measurements; the profiling layer is built on
	/// this entry point.
	pub fn predict_traced(
		&self,
		decision: usize,
		input: &mut dyn SymbolStream,
		outer_context: &Arc<RuleContext>,
		evaluator: &dyn PredicateEvaluator,
		trace: &mut PredictTrace,
	) -> Result<u32, PredictionError> {
		let dfa: &Dfa = &self.dfas[decision];
		let marker: usize = input.mark();
		let start_index: usize = input.index();

		let mut op: PredictOp<'_> = PredictOp {
			predictor: self,
			atn: &self.atn,
			dfa,
			input: &mut *input,
			outer_context: outer_context.clone(),
			evaluator,
			start_index,
			join_cache: JoinCache::new(),
			trace: &mut *trace,
		};
		let result: Result<u32, PredictionError> = op.run();

		input.seek(start_index);
		input.release(marker);

		if let Err(error) = &result {
			trace.events.push(TraceEvent::Error {
				stop_index: input.index(),
			});
			self.listeners
				.syntax_error(decision, start_index, input.index(), &error.to_string());
		}
		debug!(decision, start_index, ?result, "prediction finished");
		result
	}
}

impl std::fmt::Debug for AdaptivePredictor {
	fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		fmt.debug_struct("AdaptivePredictor")
			.field("decisions", &self.dfas.len())
			.field("exact_ambiguity", &self.exact_ambiguity)
			.finish()
	}
}

/// How one phase of the walk ended.
enum Walk {
	Alt(u32),
	/// Local-phase conflict; retry with full context.
	Conflict { state: Arc<DfaState>, info: ConflictInfo },
	/// Full-context conflict; genuine ambiguity, resolved to `resolved`.
	Ambiguous {
		state: Arc<DfaState>,
		info: ConflictInfo,
		resolved: u32,
	},
}

struct PredictOp<'a> {
	predictor: &'a AdaptivePredictor,
	atn: &'a Atn,
	dfa: &'a Dfa,
	input: &'a mut dyn SymbolStream,
	outer_context: Arc<RuleContext>,
	evaluator: &'a dyn PredicateEvaluator,
	start_index: usize,
	join_cache: JoinCache,
	trace: &'a mut PredictTrace,
}

impl PredictOp<'_> {
	fn run(&mut self) -> Result<u32, PredictionError> {
		let decision: usize = self.dfa.decision();
		let s0: Arc<DfaState> = self.local_start_state()?;
		debug!(decision, start = self.start_index, "local phase");

		match self.walk(s0, false)? {
			Walk::Alt(alt) => Ok(alt),
			Walk::Ambiguous { .. } => unreachable!("local phase never reports ambiguity"),
			Walk::Conflict { state, info } => {
				let stop_index: usize = self.input.index();
				self.trace.events.push(TraceEvent::Conflict {
					alts: info.alts.clone(),
					stop_index,
				});
				self.predictor.listeners.report_attempting_full_context(
					decision,
					&info.alts,
					self.start_index,
					stop_index,
					state.configs(),
				);
				state.record_context_symbol(self.input.la(1));
				self.trace.used_full_context = true;
				debug!(decision, conflicting = ?info.alts, "full-context phase");

				self.input.seek(self.start_index);
				let s0_full: Arc<DfaState> = self.full_start_state()?;
				match self.walk(s0_full, true)? {
					Walk::Alt(alt) => {
						if alt != info.min_alt() {
							let stop_index: usize = self.input.index();
							self.trace.events.push(TraceEvent::ContextSensitivity {
								prediction: alt,
								stop_index,
							});
							self.predictor.listeners.report_context_sensitivity(
								decision,
								alt,
								self.start_index,
								stop_index,
								state.configs(),
							);
						}
						Ok(alt)
					},
					Walk::Ambiguous {
						state: full_state,
						info: full_info,
						resolved,
					} => {
						let stop_index: usize = self.input.index();
						let exact: bool = full_info.exact && self.predictor.exact_ambiguity;
						self.trace.events.push(TraceEvent::Ambiguity {
							alts: full_info.alts.clone(),
							exact,
							stop_index,
						});
						self.predictor.listeners.report_ambiguity(
							decision,
							exact,
							&full_info.alts,
							self.start_index,
							stop_index,
							full_state.configs(),
						);
						Ok(resolved)
					},
					Walk::Conflict { .. } => unreachable!("full-context phase resolves conflicts in place"),
				}
			},
		}
	}

	/// Symbol-by-symbol walk from `start` until a state commits, conflicts,
	/// or dead-ends.
	fn walk(&mut self, start: Arc<DfaState>, full_context: bool) -> Result<Walk, PredictionError> {
		let mut current: Arc<DfaState> = start;
		loop {
			if let Some(outcome) = self.check_halt(&current, full_context)? {
				return Ok(outcome);
			}
			self.record_lookahead(full_context);

			let t: i32 = self.input.la(1);
			let next: Arc<DfaState> = match current.target(t) {
				Some(next) => {
					self.trace.dfa_transitions += 1;
					next
				},
				None => self.compute_target(&current, t, full_context)?,
			};
			if next.is_error() {
				return Err(self.no_viable_alt(Some(current.configs().clone())));
			}
			if t != EOF {
				self.input.consume();
			}
			current = next;
		}
	}

	/// Accept handling: predicates choose among alternatives first, then a
	/// recorded conflict either fails the local phase over or, under full
	/// context, is a terminal ambiguity.
	fn check_halt(&mut self, state: &Arc<DfaState>, full_context: bool) -> Result<Option<Walk>, PredictionError> {
		let Some(accept) = state.accept().cloned() else {
			return Ok(None);
		};

		if let Some(info) = state.configs().conflict_info() {
			if !full_context {
				return Ok(Some(Walk::Conflict {
					state: state.clone(),
					info: info.clone(),
				}));
			}
		}

		let chosen: u32 = match &accept.predicates {
			Some(predicates) => match self.evaluate_predicate_table(predicates)? {
				Some(alt) => alt,
				None => return Err(self.no_viable_alt(Some(state.configs().clone()))),
			},
			None => accept.prediction,
		};

		if let Some(info) = state.configs().conflict_info() {
			return Ok(Some(Walk::Ambiguous {
				state: state.clone(),
				info: info.clone(),
				resolved: chosen,
			}));
		}
		Ok(Some(Walk::Alt(chosen)))
	}

	fn record_lookahead(&mut self, full_context: bool) {
		let depth: usize = self.input.index() - self.start_index + 1;
		if full_context {
			self.trace.ll_lookahead = self.trace.ll_lookahead.max(depth);
		} else {
			self.trace.sll_lookahead = self.trace.sll_lookahead.max(depth);
		}
	}

	fn no_viable_alt(&mut self, configs: Option<Arc<FrozenConfigSet>>) -> PredictionError {
		PredictionError::NoViableAlternative {
			decision: self.dfa.decision(),
			start_index: self.start_index,
			stop_index: self.input.index(),
			configs,
		}
	}
}

// Start states
impl PredictOp<'_> {
	fn local_start_state(&mut self) -> Result<Arc<DfaState>, PredictionError> {
		if self.dfa.is_precedence_dfa() {
			let precedence: i32 = self.evaluator.precedence() as i32;
			if let Some(existing) = self.dfa.precedence_start_state(precedence, false) {
				return Ok(existing);
			}
			let state: Arc<DfaState> = self.compute_start_state(false)?;
			return Ok(self.dfa.set_precedence_start_state(precedence, false, state));
		}
		if let Some(existing) = self.dfa.start_state(false) {
			return Ok(existing);
		}
		let state: Arc<DfaState> = self.compute_start_state(false)?;
		Ok(self.dfa.install_start_state(false, state))
	}

	/// The full-context start is reached from the shared base state by
	/// appending the caller's invocation frames innermost-first, one context
	/// edge per frame; the chain ends on the outermost sentinel edge. Each
	/// link is cached, so other predictions from the same invocation site
	/// reuse the whole chain.
	fn full_start_state(&mut self) -> Result<Arc<DfaState>, PredictionError> {
		let mut previous: Arc<DfaState> = if self.dfa.is_precedence_dfa() {
			let precedence: i32 = self.evaluator.precedence() as i32;
			match self.dfa.precedence_start_state(precedence, true) {
				Some(existing) => existing,
				None => {
					let state: Arc<DfaState> = self.compute_start_state(true)?;
					self.dfa.set_precedence_start_state(precedence, true, state)
				},
			}
		} else {
			match self.dfa.start_state(true) {
				Some(existing) => existing,
				None => {
					let state: Arc<DfaState> = self.compute_start_state(true)?;
					self.dfa.install_start_state(true, state)
				},
			}
		};

		let mut remaining: Arc<RuleContext> = self.outer_context.clone();
		loop {
			let (key, suffix, outermost): (i32, Arc<PredictionContext>, bool) = if remaining.is_outermost() {
				(OUTERMOST_CONTEXT_KEY, empty_full(), true)
			} else {
				let invoking: usize = remaining.invoking_state();
				let follow: AtnStateIdx = follow_of_invocation(self.atn, invoking);
				(invoking as i32, empty_full().child(follow.0 as u32), false)
			};

			let next: Arc<DfaState> = match previous.context_target(key) {
				Some(next) => next,
				None => {
					let next: Arc<DfaState> = self.append_context_state(&previous, &suffix, outermost)?;
					previous.set_context_target(key, next.clone());
					next
				},
			};
			previous = next;

			if outermost {
				return Ok(previous);
			}
			remaining = remaining.parent().unwrap().clone();
		}
	}

	/// One configuration per alternative at the decision's entry states,
	/// closed over. Precedence decisions additionally run the left-recursion
	/// filter before sealing.
	fn compute_start_state(&mut self, full_context: bool) -> Result<Arc<DfaState>, PredictionError> {
		let atn: &Atn = self.atn;
		let decision_state: &AtnState = &atn[self.dfa.atn_start_state()];
		let initial_context: Arc<PredictionContext> = if full_context { empty_full() } else { empty_local() };

		let mut set: ConfigSet = ConfigSet::new(false);
		let mut busy: HashSet<AtnConfig> = HashSet::new();
		for (i, transition) in decision_state.transitions().iter().enumerate() {
			let alt: u32 = i as u32 + 1;
			let config: AtnConfig = AtnConfig::new(transition.target, alt, initial_context.clone());
			self.closure(config, &mut set, full_context, true, &mut busy);
		}

		if self.dfa.is_precedence_dfa() {
			set = self.apply_precedence_filter(set);
		}
		if set.is_empty() {
			return Err(self.no_viable_alt(None));
		}

		Ok(self.finish_set(set))
	}

	/// Rebuilds `previous` with `suffix` appended to every stack, i.e. with
	/// one more frame of the caller's context known, and re-closes so that
	/// configurations parked on rule stops can pop into the new frame.
	fn append_context_state(
		&mut self,
		previous: &Arc<DfaState>,
		suffix: &Arc<PredictionContext>,
		outermost: bool,
	) -> Result<Arc<DfaState>, PredictionError> {
		let mut set: ConfigSet = ConfigSet::new(outermost);
		let mut busy: HashSet<AtnConfig> = HashSet::new();
		let mut visited: HashMap<usize, Arc<PredictionContext>> = HashMap::new();
		for config in previous.configs().iter() {
			let appended: Arc<PredictionContext> =
				PredictionContext::append(config.context(), suffix, &mut self.join_cache, &mut visited);
			let seed: AtnConfig = AtnConfig {
				context: appended,
				..config.clone()
			};
			self.closure(seed, &mut set, true, !outermost, &mut busy);
		}
		Ok(self.finish_set(set))
	}

	/// Conflict analysis, accept info, context interning, seal, intern.
	fn finish_set(&mut self, mut set: ConfigSet) -> Arc<DfaState> {
		if set.unique_alt() == INVALID_ALT {
			let conflict: Option<ConflictInfo> = self.conflict_info(&set);
			set.set_conflict_info(conflict);
		}
		let accept: Option<AcceptInfo> = self.accept_info(&set);

		// Stacks in a cached state outlive this call; intern them so equal
		// stacks collapse across predictions and later joins hit the pointer
		// fast path.
		let interned: &ContextCache = &self.predictor.context_cache;
		let mut visited: HashMap<usize, Arc<PredictionContext>> = HashMap::new();
		set.map_contexts(|context| PredictionContext::cached(context, interned, &mut visited));

		self.dfa.add_state(set.seal(), accept)
	}
}

// Reach and closure
impl PredictOp<'_> {
	fn compute_target(
		&mut self,
		current: &Arc<DfaState>,
		t: i32,
		full_context: bool,
	) -> Result<Arc<DfaState>, PredictionError> {
		let atn: &Atn = self.atn;
		let mut reach: ConfigSet = ConfigSet::new(current.configs().outermost());
		let mut busy: HashSet<AtnConfig> = HashSet::new();
		let mut skipped_stops: Vec<AtnConfig> = Vec::new();

		for config in current.configs().iter() {
			let state: &AtnState = &atn[config.state()];
			if state.is_rule_stop() {
				// Stop-state configurations only move on end of input.
				if full_context || t == EOF {
					skipped_stops.push(config.clone());
				}
				continue;
			}
			for transition in state.transitions().iter() {
				self.trace.atn_transitions += 1;
				if transition.kind.matches(t, atn.max_token_type()) {
					let target: AtnConfig = config.transform(atn, transition.target);
					self.closure(target, &mut reach, full_context, false, &mut busy);
				}
			}
		}
		if t == EOF {
			for config in skipped_stops.into_iter() {
				reach.add(config, &mut self.join_cache);
			}
		}

		if reach.is_empty() {
			let error: Arc<DfaState> = self.dfa.error_state().clone();
			current.set_target(t, error.clone());
			return Ok(error);
		}

		let next: Arc<DfaState> = self.finish_set(reach);
		current.set_target(t, next.clone());
		Ok(next)
	}

	/// Epsilon completion. Rule transitions push the follow state; rule
	/// stops pop every frame of the stack; exhausted stacks either chase the
	/// frozen follow edges (local phase, counting outer-context depth) or
	/// stand as finished outermost parses (full context). `more_context`
	/// marks sets whose exhausted stacks could still be extended by caller
	/// frames not yet appended.
	fn closure(
		&mut self,
		start: AtnConfig,
		set: &mut ConfigSet,
		full_context: bool,
		more_context: bool,
		busy: &mut HashSet<AtnConfig>,
	) {
		let atn: &Atn = self.atn;
		let mut stack: Vec<AtnConfig> = vec![start];
		while let Some(config) = stack.pop() {
			if !busy.insert(config.clone()) {
				continue;
			}
			let state: &AtnState = &atn[config.state()];

			if state.is_rule_stop() {
				self.pop_rule_stop(config, state, set, full_context, more_context, &mut stack);
				continue;
			}

			let pass_through: bool =
				!state.transitions().is_empty() && state.transitions().iter().all(|t| t.kind.is_epsilon());
			if !pass_through {
				set.add(config.clone(), &mut self.join_cache);
			}

			for transition in state.transitions().iter() {
				match &transition.kind {
					TransitionKind::Epsilon | TransitionKind::Action { .. } => {
						stack.push(config.transform(atn, transition.target));
					},
					TransitionKind::Rule { follow_state, .. } => {
						let pushed: Arc<PredictionContext> = config.context().child(follow_state.0 as u32);
						stack.push(config.transform_with_context(atn, transition.target, pushed));
					},
					&TransitionKind::Predicate {
						rule,
						pred,
						is_ctx_dependent,
					} => {
						let predicate: Arc<SemanticContext> = Arc::new(SemanticContext::Predicate {
							rule,
							pred,
							is_ctx_dependent,
						});
						let mut next: AtnConfig = config.transform(atn, transition.target);
						next.semantic_context = Some(SemanticContext::and(config.semantic_context(), &predicate));
						stack.push(next);
					},
					&TransitionKind::PrecedencePredicate { precedence } => {
						let predicate: Arc<SemanticContext> =
							Arc::new(SemanticContext::PrecedencePredicate { precedence });
						let mut next: AtnConfig = config.transform(atn, transition.target);
						next.semantic_context = Some(SemanticContext::and(config.semantic_context(), &predicate));
						stack.push(next);
					},
					_ => (),
				}
			}
		}
	}

	fn pop_rule_stop(
		&mut self,
		config: AtnConfig,
		state: &AtnState,
		set: &mut ConfigSet,
		full_context: bool,
		more_context: bool,
		stack: &mut Vec<AtnConfig>,
	) {
		let atn: &Atn = self.atn;
		let context: Arc<PredictionContext> = config.context().clone();

		if context.is_empty_local() {
			if state.transitions().is_empty() {
				// This rule is never invoked: a genuine end.
				set.add(config, &mut self.join_cache);
				return;
			}
			// No stack knowledge: chase every follow site, one frame below
			// where this prediction started.
			set.set_dips_into_outer_context();
			for transition in state.transitions().iter() {
				let mut next: AtnConfig = config.transform(atn, transition.target);
				next.bump_outer_context_depth();
				stack.push(next);
			}
			return;
		}

		if context.is_empty_full() {
			if more_context {
				// Caller frames are still pending; remember that this set
				// wants them, and keep the finished parse as a candidate.
				set.set_dips_into_outer_context();
			}
			set.add(config, &mut self.join_cache);
			return;
		}

		for i in 0..context.size() {
			let return_state: u32 = context.return_state(i);
			if return_state == EMPTY_RETURN_STATE {
				// An exhausted alternative inside a merged stack; requeue it
				// under the appropriate terminator.
				let terminator: Arc<PredictionContext> = if full_context { empty_full() } else { empty_local() };
				stack.push(AtnConfig {
					context: terminator,
					..config.clone()
				});
				continue;
			}
			let popped: AtnConfig = config.transform_with_context(
				atn,
				AtnStateIdx(return_state as usize),
				context.parent(i).clone(),
			);
			stack.push(popped);
		}
	}
}

// Conflicts and predicates
impl PredictOp<'_> {
	/// Detects whether the alternatives can no longer be separated by more
	/// input: every occupied position must be able to produce the overall
	/// minimum alternative, and at each position the minimum alternative's
	/// joined stack must cover every competing alternative's. The tie is
	/// exact when the partitions are identical everywhere and no stack
	/// bottomed out below the decision.
	fn conflict_info(&mut self, set: &ConfigSet) -> Option<ConflictInfo> {
		if set.unique_alt() != INVALID_ALT || set.len() <= 1 {
			return None;
		}

		let mut by_state: BTreeMap<usize, BTreeMap<u32, Arc<PredictionContext>>> = BTreeMap::new();
		for config in set.iter() {
			let per_alt: &mut BTreeMap<u32, Arc<PredictionContext>> = by_state.entry(config.state().0).or_default();
			let joined: Arc<PredictionContext> = match per_alt.get(&config.alt()) {
				Some(existing) => PredictionContext::join(existing, config.context(), &mut self.join_cache),
				None => config.context().clone(),
			};
			per_alt.insert(config.alt(), joined);
		}

		let min_alt: u32 = set.iter().map(AtnConfig::alt).min().unwrap();
		for per_alt in by_state.values() {
			if !per_alt.contains_key(&min_alt) {
				return None;
			}
		}

		let first_alts: BTreeSet<u32> = by_state.values().next().unwrap().keys().copied().collect::<BTreeSet<_>>();
		let mut exact: bool = !set.dips_into_outer_context();
		for per_alt in by_state.values() {
			let alts: BTreeSet<u32> = per_alt.keys().copied().collect::<BTreeSet<_>>();
			if alts != first_alts {
				exact = false;
			}
			let min_context: &Arc<PredictionContext> = &per_alt[&min_alt];
			for (alt, context) in per_alt.iter() {
				if *alt == min_alt || min_context == context {
					continue;
				}
				if covers(min_context, context) {
					exact = false;
					continue;
				}
				// More input can still separate these.
				return None;
			}
		}

		let alts: BTreeSet<u32> = set.iter().map(AtnConfig::alt).collect::<BTreeSet<_>>();
		debug!(?alts, exact, "conflict detected");
		Some(ConflictInfo { alts, exact })
	}

	/// An accept commits either the unique alternative or a conflict's
	/// minimum; predicated sets additionally carry the disjunction table,
	/// one entry per alternative in order.
	fn accept_info(&self, set: &ConfigSet) -> Option<AcceptInfo> {
		let prediction: u32 = if set.unique_alt() != INVALID_ALT {
			set.unique_alt()
		} else if let Some(info) = set.conflict_info() {
			info.min_alt()
		} else {
			return None;
		};
		let predicates: Option<Vec<PredictedAlt>> = if set.has_semantic_context() {
			self.predicate_table(set)
		} else {
			None
		};
		Some(AcceptInfo {
			prediction,
			predicates,
			lexer_action: None,
		})
	}

	fn predicate_table(&self, set: &ConfigSet) -> Option<Vec<PredictedAlt>> {
		// Per alternative: `None` once any configuration is unconditional,
		// otherwise the disjunction of the guards seen.
		let mut per_alt: BTreeMap<u32, Option<Arc<SemanticContext>>> = BTreeMap::new();
		for config in set.iter() {
			let merged: Option<Arc<SemanticContext>> = match (per_alt.get(&config.alt()), config.semantic_context()) {
				(Some(None), _) | (_, None) => None,
				(Some(Some(existing)), Some(guard)) => Some(SemanticContext::or(Some(existing), guard)),
				(None, Some(guard)) => Some(guard.clone()),
			};
			per_alt.insert(config.alt(), merged);
		}

		if per_alt.values().all(Option::is_none) {
			return None;
		}
		Some(
			per_alt
				.into_iter()
				.map(|(alt, semantic_context)| PredictedAlt { alt, semantic_context })
				.collect::<Vec<_>>(),
		)
	}

	/// First alternative (in order) whose guard holds wins; an unconditional
	/// entry always holds.
	fn evaluate_predicate_table(&mut self, predicates: &[PredictedAlt]) -> Result<Option<u32>, PredictionError> {
		for entry in predicates.iter() {
			let Some(guard) = &entry.semantic_context else {
				return Ok(Some(entry.alt));
			};
			let result: bool = guard.evaluate(self.evaluator, Some(&self.outer_context));
			self.trace.events.push(TraceEvent::PredicateEval {
				alt: entry.alt,
				result,
			});
			if result {
				return Ok(Some(entry.alt));
			}
		}
		Ok(None)
	}

	/// The left-recursion start filter: at elevated precedence the primary
	/// alternative's configurations survive predicate resolution, and a
	/// recursive alternative is dropped where it merely duplicates the
	/// primary one at the same position with the same stack.
	fn apply_precedence_filter(&mut self, set: ConfigSet) -> ConfigSet {
		let mut from_primary: HashMap<usize, Arc<PredictionContext>> = HashMap::new();
		let mut filtered: ConfigSet = ConfigSet::new(set.outermost());

		for config in set.iter() {
			if config.alt() != 1 {
				continue;
			}
			let kept: Option<Option<Arc<SemanticContext>>> = match config.semantic_context() {
				None => Some(None),
				Some(guard) => guard.evaluate_precedence(self.evaluator),
			};
			let Some(remaining) = kept else {
				// Statically false at this precedence.
				continue;
			};
			from_primary.insert(config.state().0, config.context().clone());
			let mut updated: AtnConfig = config.clone();
			updated.semantic_context = remaining;
			filtered.add(updated, &mut self.join_cache);
		}

		for config in set.iter() {
			if config.alt() == 1 {
				continue;
			}
			if !config.precedence_filter_suppressed() {
				if let Some(primary_context) = from_primary.get(&config.state().0) {
					if primary_context == config.context() {
						continue;
					}
				}
			}
			filtered.add(config.clone(), &mut self.join_cache);
		}

		filtered
	}
}

#[cfg(test)]
mod test {
	use std::sync::Mutex;

	use super::*;
	use crate::atn::AtnBuilder;
	use crate::atn::AtnStateKind;
	use crate::semantics::NoPredicates;
	use crate::stream::TokenStream;

	const ID: i32 = 1;
	const EQ: i32 = 2;
	const INT: i32 = 3;
	const SEMI: i32 = 4;

	#[derive(Default)]
	struct Recording {
		ambiguities: Mutex<Vec<(BTreeSet<u32>, bool)>>,
		full_context_attempts: Mutex<usize>,
		context_sensitivities: Mutex<Vec<u32>>,
	}

	impl DecisionListener for Recording {
		fn report_ambiguity(
			&self,
			_decision: usize,
			exact: bool,
			alts: &BTreeSet<u32>,
			_start_index: usize,
			_stop_index: usize,
			_configs: &Arc<FrozenConfigSet>,
		) {
			self.ambiguities.lock().unwrap().push((alts.clone(), exact));
		}

		fn report_attempting_full_context(
			&self,
			_decision: usize,
			_conflicting_alts: &BTreeSet<u32>,
			_start_index: usize,
			_stop_index: usize,
			_configs: &Arc<FrozenConfigSet>,
		) {
			*self.full_context_attempts.lock().unwrap() += 1;
		}

		fn report_context_sensitivity(
			&self,
			_decision: usize,
			prediction: u32,
			_start_index: usize,
			_stop_index: usize,
			_configs: &Arc<FrozenConfigSet>,
		) {
			self.context_sensitivities.lock().unwrap().push(prediction);
		}
	}

	/// `a : (assign | .)+ EOF ; assign : ID '=' INT ';' ;`
	fn wildcard_skip_atn() -> Atn {
		let mut b: AtnBuilder = AtnBuilder::new(4);
		let a: usize = b.add_rule("a", 0);
		let assign: usize = b.add_rule("assign", 0);

		let decision: AtnStateIdx = b.add_decision_state(AtnStateKind::PlusBlockStart, a);
		b.epsilon(b.rule_start(a), decision);
		let end: AtnStateIdx = b.add_state(AtnStateKind::BlockEnd, a);
		let a1: AtnStateIdx = b.add_state(AtnStateKind::Basic, a);
		b.epsilon(decision, a1);
		b.rule_ref(a1, assign, end, 0);
		let a2: AtnStateIdx = b.add_state(AtnStateKind::Basic, a);
		b.epsilon(decision, a2);
		b.transition(a2, end, TransitionKind::Wildcard);
		let loopback: AtnStateIdx = b.add_decision_state(AtnStateKind::PlusLoopback, a);
		b.epsilon(end, loopback);
		b.epsilon(loopback, decision);
		let exit: AtnStateIdx = b.add_state(AtnStateKind::LoopEnd, a);
		b.epsilon(loopback, exit);
		let at_eof: AtnStateIdx = b.add_state(AtnStateKind::Basic, a);
		b.atom(exit, at_eof, EOF);
		b.epsilon(at_eof, b.rule_stop(a));

		let s1: AtnStateIdx = b.add_state(AtnStateKind::Basic, assign);
		let s2: AtnStateIdx = b.add_state(AtnStateKind::Basic, assign);
		let s3: AtnStateIdx = b.add_state(AtnStateKind::Basic, assign);
		let s4: AtnStateIdx = b.add_state(AtnStateKind::Basic, assign);
		let s5: AtnStateIdx = b.add_state(AtnStateKind::Basic, assign);
		b.epsilon(b.rule_start(assign), s1);
		b.atom(s1, s2, ID);
		b.atom(s2, s3, EQ);
		b.atom(s3, s4, INT);
		b.atom(s4, s5, SEMI);
		b.epsilon(s5, b.rule_stop(assign));

		b.freeze()
	}

	#[test]
	fn wildcard_alternation() {
		let atn: Arc<Atn> = Arc::new(wildcard_skip_atn());
		let dfas: Arc<Vec<Dfa>> = AdaptivePredictor::build_dfas(&atn);
		let predictor: AdaptivePredictor = AdaptivePredictor::new(atn.clone(), dfas);
		let recording: Arc<Recording> = Arc::new(Recording::default());
		predictor.listeners().attach(recording.clone());

		// x=10; abc;;;; y=99;
		let tokens: Vec<i32> = vec![ID, EQ, INT, SEMI, ID, SEMI, SEMI, SEMI, SEMI, ID, EQ, INT, SEMI];
		let outer: Arc<RuleContext> = RuleContext::outermost();
		let expected: Vec<(usize, u32)> = vec![(0, 1), (4, 2), (5, 2), (6, 2), (7, 2), (8, 2), (9, 1)];
		for (index, alt) in expected.into_iter() {
			let mut stream: TokenStream = TokenStream::new(tokens.clone());
			stream.seek(index);
			let got: u32 = predictor.predict(0, &mut stream, &outer, &NoPredicates).unwrap();
			assert_eq!(got, alt, "at index {index}");
			// Prediction restores the stream.
			assert_eq!(stream.index(), index);
		}

		// The assign-or-anything tie is reported, not errored.
		assert!(*recording.full_context_attempts.lock().unwrap() > 0);
		assert!(!recording.ambiguities.lock().unwrap().is_empty());
	}

	struct CtxAtn {
		atn: Arc<Atn>,
		e_decision: usize,
		invoke_a: usize,
		invoke_b: usize,
		s_invoke_a: usize,
		s_invoke_b: usize,
	}

	/// `s : '$' a | '@' b ; a : e ID ; b : e INT ID ; e : INT | ;`
	fn context_sensitive_atn() -> CtxAtn {
		const DOLLAR: i32 = 2;
		const AT: i32 = 4;

		let mut b: AtnBuilder = AtnBuilder::new(4);
		let s: usize = b.add_rule("s", 0);
		let a: usize = b.add_rule("a", 0);
		let bb: usize = b.add_rule("b", 0);
		let e: usize = b.add_rule("e", 0);

		let d_s: AtnStateIdx = b.add_decision_state(AtnStateKind::BlockStart, s);
		b.epsilon(b.rule_start(s), d_s);
		let s_end: AtnStateIdx = b.add_state(AtnStateKind::BlockEnd, s);
		b.epsilon(s_end, b.rule_stop(s));
		let p1: AtnStateIdx = b.add_state(AtnStateKind::Basic, s);
		b.epsilon(d_s, p1);
		let p2: AtnStateIdx = b.add_state(AtnStateKind::Basic, s);
		b.atom(p1, p2, DOLLAR);
		b.rule_ref(p2, a, s_end, 0);
		let q1: AtnStateIdx = b.add_state(AtnStateKind::Basic, s);
		b.epsilon(d_s, q1);
		let q2: AtnStateIdx = b.add_state(AtnStateKind::Basic, s);
		b.atom(q1, q2, AT);
		b.rule_ref(q2, bb, s_end, 0);

		let a1: AtnStateIdx = b.add_state(AtnStateKind::Basic, a);
		b.epsilon(b.rule_start(a), a1);
		let a2: AtnStateIdx = b.add_state(AtnStateKind::Basic, a);
		b.rule_ref(a1, e, a2, 0);
		let a3: AtnStateIdx = b.add_state(AtnStateKind::Basic, a);
		b.atom(a2, a3, ID);
		b.epsilon(a3, b.rule_stop(a));

		let b1: AtnStateIdx = b.add_state(AtnStateKind::Basic, bb);
		b.epsilon(b.rule_start(bb), b1);
		let b2: AtnStateIdx = b.add_state(AtnStateKind::Basic, bb);
		b.rule_ref(b1, e, b2, 0);
		let b3: AtnStateIdx = b.add_state(AtnStateKind::Basic, bb);
		b.atom(b2, b3, INT);
		let b4: AtnStateIdx = b.add_state(AtnStateKind::Basic, bb);
		b.atom(b3, b4, ID);
		b.epsilon(b4, b.rule_stop(bb));

		let d_e: AtnStateIdx = b.add_decision_state(AtnStateKind::BlockStart, e);
		b.epsilon(b.rule_start(e), d_e);
		let e_end: AtnStateIdx = b.add_state(AtnStateKind::BlockEnd, e);
		let e1: AtnStateIdx = b.add_state(AtnStateKind::Basic, e);
		b.epsilon(d_e, e1);
		b.atom(e1, e_end, INT);
		b.epsilon(d_e, e_end);
		b.epsilon(e_end, b.rule_stop(e));

		CtxAtn {
			atn: Arc::new(b.freeze()),
			e_decision: 1,
			invoke_a: a1.0,
			invoke_b: b1.0,
			s_invoke_a: p2.0,
			s_invoke_b: q2.0,
		}
	}

	#[test]
	fn full_context_resolves_local_conflict() {
		const DOLLAR: i32 = 2;
		const AT: i32 = 4;

		let g: CtxAtn = context_sensitive_atn();
		let dfas: Arc<Vec<Dfa>> = AdaptivePredictor::build_dfas(&g.atn);
		let predictor: AdaptivePredictor = AdaptivePredictor::new(g.atn.clone(), dfas);
		let recording: Arc<Recording> = Arc::new(Recording::default());
		predictor.listeners().attach(recording.clone());

		// "@ 34 abc": predicting e inside b; only the empty e parses.
		let mut stream: TokenStream = TokenStream::new(vec![AT, INT, ID]);
		stream.seek(1);
		let s_ctx: Arc<RuleContext> = RuleContext::outermost();
		let b_ctx: Arc<RuleContext> = RuleContext::invoked(&s_ctx, g.s_invoke_b);
		let e_ctx: Arc<RuleContext> = RuleContext::invoked(&b_ctx, g.invoke_b);
		let alt: u32 = predictor.predict(g.e_decision, &mut stream, &e_ctx, &NoPredicates).unwrap();
		assert_eq!(alt, 2);
		assert_eq!(*recording.full_context_attempts.lock().unwrap(), 1);
		assert_eq!(*recording.context_sensitivities.lock().unwrap(), vec![2]);
		assert!(recording.ambiguities.lock().unwrap().is_empty());

		// "$ 34 abc": the same local conflict, but the full-context answer
		// matches the local tie-break, so no sensitivity is reported.
		let mut stream: TokenStream = TokenStream::new(vec![DOLLAR, INT, ID]);
		stream.seek(1);
		let a_ctx: Arc<RuleContext> = RuleContext::invoked(&s_ctx, g.s_invoke_a);
		let e_ctx: Arc<RuleContext> = RuleContext::invoked(&a_ctx, g.invoke_a);
		let alt: u32 = predictor.predict(g.e_decision, &mut stream, &e_ctx, &NoPredicates).unwrap();
		assert_eq!(alt, 1);
		assert_eq!(*recording.context_sensitivities.lock().unwrap(), vec![2]);
	}

	#[test]
	fn dead_end_is_no_viable_alternative() {
		const DOLLAR: i32 = 2;

		let g: CtxAtn = context_sensitive_atn();
		let dfas: Arc<Vec<Dfa>> = AdaptivePredictor::build_dfas(&g.atn);
		let predictor: AdaptivePredictor = AdaptivePredictor::new(g.atn.clone(), dfas);

		let s_ctx: Arc<RuleContext> = RuleContext::outermost();
		let b_ctx: Arc<RuleContext> = RuleContext::invoked(&s_ctx, g.s_invoke_b);
		let e_ctx: Arc<RuleContext> = RuleContext::invoked(&b_ctx, g.invoke_b);
		for _ in 0..2 {
			// Second round hits the cached dead-end edge; same answer.
			let mut stream: TokenStream = TokenStream::new(vec![DOLLAR]);
			let error: PredictionError = predictor
				.predict(g.e_decision, &mut stream, &e_ctx, &NoPredicates)
				.unwrap_err();
			let PredictionError::NoViableAlternative { decision, start_index, .. } = error else {
				panic!("expected a dead end, got {error:?}");
			};
			assert_eq!(decision, g.e_decision);
			assert_eq!(start_index, 0);
		}
	}

	/// `p : ID | ID ;`
	fn twin_alternatives_atn() -> Atn {
		let mut b: AtnBuilder = AtnBuilder::new(1);
		let p: usize = b.add_rule("p", 0);
		let d: AtnStateIdx = b.add_decision_state(AtnStateKind::BlockStart, p);
		b.epsilon(b.rule_start(p), d);
		let end: AtnStateIdx = b.add_state(AtnStateKind::BlockEnd, p);
		b.epsilon(end, b.rule_stop(p));
		let x1: AtnStateIdx = b.add_state(AtnStateKind::Basic, p);
		b.epsilon(d, x1);
		b.atom(x1, end, ID);
		let x2: AtnStateIdx = b.add_state(AtnStateKind::Basic, p);
		b.epsilon(d, x2);
		b.atom(x2, end, ID);
		b.freeze()
	}

	#[test]
	fn exact_ambiguity_between_identical_alternatives() {
		let atn: Arc<Atn> = Arc::new(twin_alternatives_atn());
		let dfas: Arc<Vec<Dfa>> = AdaptivePredictor::build_dfas(&atn);
		let mut predictor: AdaptivePredictor = AdaptivePredictor::new(atn.clone(), dfas);
		predictor.set_exact_ambiguity(true);
		let recording: Arc<Recording> = Arc::new(Recording::default());
		predictor.listeners().attach(recording.clone());

		let mut stream: TokenStream = TokenStream::new(vec![ID]);
		let outer: Arc<RuleContext> = RuleContext::outermost();
		let alt: u32 = predictor.predict(0, &mut stream, &outer, &NoPredicates).unwrap();
		assert_eq!(alt, 1);
		assert_eq!(
			*recording.ambiguities.lock().unwrap(),
			vec![(BTreeSet::from([1, 2]), true)]
		);
	}

	struct AtPrecedence(u32);

	impl PredicateEvaluator for AtPrecedence {
		fn evaluate(&self, _rule: usize, _pred: usize, _ctx: Option<&RuleContext>) -> bool {
			unreachable!();
		}

		fn precedence(&self) -> u32 {
			self.0
		}
	}

	struct RecursiveAtn {
		atn: Arc<Atn>,
		invoke_expr: usize,
	}

	/// A left-recursive `expr` after transformation: the star-loop entry is
	/// the precedence decision and the operator alternative is guarded by a
	/// precedence level.
	fn left_recursive_atn() -> RecursiveAtn {
		const AT: i32 = 2;
		const X: i32 = 3;

		let mut b: AtnBuilder = AtnBuilder::new(3);
		let s: usize = b.add_rule("s", 0);
		let expr: usize = b.add_rule("expr", 0);

		let c1: AtnStateIdx = b.add_state(AtnStateKind::Basic, s);
		b.epsilon(b.rule_start(s), c1);
		let c2: AtnStateIdx = b.add_state(AtnStateKind::Basic, s);
		b.rule_ref(c1, expr, c2, 0);
		let c3: AtnStateIdx = b.add_state(AtnStateKind::Basic, s);
		b.atom(c2, c3, EOF);
		b.epsilon(c3, b.rule_stop(s));

		let prim1: AtnStateIdx = b.add_state(AtnStateKind::Basic, expr);
		b.epsilon(b.rule_start(expr), prim1);
		let entry: AtnStateIdx = b.add_decision_state(AtnStateKind::StarLoopEntry, expr);
		b.mark_precedence_decision(entry);
		b.atom(prim1, entry, ID);
		let it1: AtnStateIdx = b.add_state(AtnStateKind::StarBlockStart, expr);
		b.epsilon(entry, it1);
		let it2: AtnStateIdx = b.add_state(AtnStateKind::Basic, expr);
		b.transition(it1, it2, TransitionKind::PrecedencePredicate { precedence: 2 });
		let it3: AtnStateIdx = b.add_state(AtnStateKind::Basic, expr);
		b.atom(it2, it3, AT);
		let loopback: AtnStateIdx = b.add_state(AtnStateKind::StarLoopback, expr);
		b.atom(it3, loopback, X);
		b.epsilon(loopback, entry);
		let exit: AtnStateIdx = b.add_state(AtnStateKind::LoopEnd, expr);
		b.epsilon(entry, exit);
		b.epsilon(exit, b.rule_stop(expr));

		RecursiveAtn {
			atn: Arc::new(b.freeze()),
			invoke_expr: c1.0,
		}
	}

	#[test]
	fn precedence_dispatch_selects_recursion() {
		const AT: i32 = 2;
		const X: i32 = 3;

		let g: RecursiveAtn = left_recursive_atn();
		let dfas: Arc<Vec<Dfa>> = AdaptivePredictor::build_dfas(&g.atn);
		let predictor: AdaptivePredictor = AdaptivePredictor::new(g.atn.clone(), dfas.clone());
		assert!(dfas[0].is_precedence_dfa());

		let outer: Arc<RuleContext> = RuleContext::outermost();
		let expr_ctx: Arc<RuleContext> = RuleContext::invoked(&outer, g.invoke_expr);

		// "POINT AT X" at precedence 1: the operator binds, take the loop.
		let mut stream: TokenStream = TokenStream::new(vec![ID, AT, X]);
		stream.seek(1);
		let alt: u32 = predictor.predict(0, &mut stream, &expr_ctx, &AtPrecedence(1)).unwrap();
		assert_eq!(alt, 1);

		// At precedence 3 the guard fails and the loop exits instead.
		let mut stream: TokenStream = TokenStream::new(vec![ID, AT, X]);
		stream.seek(1);
		let alt: u32 = predictor.predict(0, &mut stream, &expr_ctx, &AtPrecedence(3)).unwrap();
		assert_eq!(alt, 2);

		// Each precedence level got its own cached start state.
		assert!(dfas[0].precedence_start_state(1, false).is_some());
		assert!(dfas[0].precedence_start_state(3, false).is_some());
		assert!(dfas[0].precedence_start_state(2, false).is_none());
	}

	struct AnswerIs(bool);

	impl PredicateEvaluator for AnswerIs {
		fn evaluate(&self, _rule: usize, _pred: usize, _ctx: Option<&RuleContext>) -> bool {
			self.0
		}
	}

	/// `p : {g}? ID | INT ;`
	fn predicated_atn() -> Atn {
		let mut b: AtnBuilder = AtnBuilder::new(3);
		let p: usize = b.add_rule("p", 0);
		let d: AtnStateIdx = b.add_decision_state(AtnStateKind::BlockStart, p);
		b.epsilon(b.rule_start(p), d);
		let end: AtnStateIdx = b.add_state(AtnStateKind::BlockEnd, p);
		b.epsilon(end, b.rule_stop(p));
		let g1: AtnStateIdx = b.add_state(AtnStateKind::Basic, p);
		b.epsilon(d, g1);
		let g2: AtnStateIdx = b.add_state(AtnStateKind::Basic, p);
		b.transition(
			g1,
			g2,
			TransitionKind::Predicate {
				rule: p,
				pred: 0,
				is_ctx_dependent: false,
			},
		);
		b.atom(g2, end, ID);
		let h1: AtnStateIdx = b.add_state(AtnStateKind::Basic, p);
		b.epsilon(d, h1);
		b.atom(h1, end, INT);
		b.freeze()
	}

	#[test]
	fn predicates_decide_at_accept() {
		let atn: Arc<Atn> = Arc::new(predicated_atn());
		let dfas: Arc<Vec<Dfa>> = AdaptivePredictor::build_dfas(&atn);
		let predictor: AdaptivePredictor = AdaptivePredictor::new(atn.clone(), dfas);
		let outer: Arc<RuleContext> = RuleContext::outermost();

		let mut stream: TokenStream = TokenStream::new(vec![ID]);
		let alt: u32 = predictor.predict(0, &mut stream, &outer, &AnswerIs(true)).unwrap();
		assert_eq!(alt, 1);

		// Same cached accept state, failing guard: the unique alternative
		// with a false predicate is a dead end.
		let mut stream: TokenStream = TokenStream::new(vec![ID]);
		let error: PredictionError = predictor.predict(0, &mut stream, &outer, &AnswerIs(false)).unwrap_err();
		assert!(matches!(error, PredictionError::NoViableAlternative { .. }));
	}

	#[test]
	fn repeat_predictions_are_deterministic_and_cached() {
		let atn: Arc<Atn> = Arc::new(wildcard_skip_atn());
		let dfas: Arc<Vec<Dfa>> = AdaptivePredictor::build_dfas(&atn);
		let predictor: AdaptivePredictor = AdaptivePredictor::new(atn.clone(), dfas.clone());
		let outer: Arc<RuleContext> = RuleContext::outermost();
		let tokens: Vec<i32> = vec![ID, EQ, INT, SEMI];

		let mut trace: PredictTrace = PredictTrace::default();
		let mut stream: TokenStream = TokenStream::new(tokens.clone());
		let first: u32 = predictor
			.predict_traced(0, &mut stream, &outer, &NoPredicates, &mut trace)
			.unwrap();
		assert!(trace.used_full_context);
		assert!(trace.sll_lookahead >= 4);
		assert!(trace.atn_transitions > 0);
		let states_after_first: usize = dfas[0].state_count();

		let mut trace: PredictTrace = PredictTrace::default();
		let mut stream: TokenStream = TokenStream::new(tokens);
		let second: u32 = predictor
			.predict_traced(0, &mut stream, &outer, &NoPredicates, &mut trace)
			.unwrap();
		assert_eq!(first, second);
		// The cache only grows; a repeat adds nothing.
		assert_eq!(dfas[0].state_count(), states_after_first);
		assert!(trace.dfa_transitions > 0);
	}

	#[test]
	fn shared_dfa_across_threads() {
		let atn: Arc<Atn> = Arc::new(wildcard_skip_atn());
		let dfas: Arc<Vec<Dfa>> = AdaptivePredictor::build_dfas(&atn);

		// Disjoint inputs exercising different edges of the same automaton.
		let inputs: [(Vec<i32>, u32); 2] = [(vec![ID, EQ, INT, SEMI], 1), (vec![SEMI, SEMI], 2)];
		std::thread::scope(|scope| {
			for (tokens, expected) in inputs.iter() {
				let atn: Arc<Atn> = atn.clone();
				let dfas: Arc<Vec<Dfa>> = dfas.clone();
				scope.spawn(move || {
					let predictor: AdaptivePredictor = AdaptivePredictor::new(atn, dfas);
					let outer: Arc<RuleContext> = RuleContext::outermost();
					for _ in 0..32 {
						let mut stream: TokenStream = TokenStream::new(tokens.clone());
						let alt: u32 = predictor.predict(0, &mut stream, &outer, &NoPredicates).unwrap();
						assert_eq!(alt, *expected);
					}
				});
			}
		});

		// The union automaton serves both inputs without growing further.
		let states: usize = dfas[0].state_count();
		let predictor: AdaptivePredictor = AdaptivePredictor::new(atn.clone(), dfas.clone());
		let outer: Arc<RuleContext> = RuleContext::outermost();
		for (tokens, expected) in inputs.iter() {
			let mut stream: TokenStream = TokenStream::new(tokens.clone());
			assert_eq!(
				predictor.predict(0, &mut stream, &outer, &NoPredicates).unwrap(),
				*expected
			);
		}
		assert_eq!(dfas[0].state_count(), states);
		assert!(dfas[0].dump().contains("decision 0"));
	}
}
