//! Tokenization over per-mode shared automata.
//!
//! The lexer walks one code point at a time, remembering the most recent
//! state whose configurations contain a finished rule; when it dead-ends it
//! backs up to that accept and emits. Rules compete by longest match, ties
//! going to the rule listed first. Side effects ride along as executors and
//! are replayed by the caller only after the match commits.

use std::collections::HashSet;
use std::sync::Arc;

use crate::atn::Atn;
use crate::atn::AtnState;
use crate::atn::AtnStateIdx;
use crate::atn::INVALID_ALT;
use crate::atn::TransitionKind;
use crate::config::AtnConfig;
use crate::config_set::ConfigSet;
use crate::context::EMPTY_RETURN_STATE;
use crate::context::JoinCache;
use crate::context::PredictionContext;
use crate::context::empty_local;
use crate::dfa::AcceptInfo;
use crate::dfa::Dfa;
use crate::dfa::DfaState;
use crate::error::PredictionError;
use crate::lexer_actions::LexerActionExecutor;
use crate::listener::DecisionListener;
use crate::listener::ProxyListener;
use crate::semantics::PredicateEvaluator;
use crate::stream::EOF;
use crate::stream::SymbolStream;

/// A committed token match.
#[derive(Debug, Clone)]
pub struct LexerMatch {
	pub token_type: i32,
	/// Length in code points.
	pub length: usize,
	/// Side effects of the winning rule, to be replayed against the span.
	pub executor: Option<Arc<LexerActionExecutor>>,
}

/// Matches tokens against the mode automata. Instances share the automata
/// and may run concurrently; mode switching is the caller's business (replay
/// the executor, then pass the new mode in).
pub struct LexerPredictor {
	atn: Arc<Atn>,
	dfas: Arc<Vec<Dfa>>,
	listeners: ProxyListener,
}

impl LexerPredictor {
	pub fn new(atn: Arc<Atn>, dfas: Arc<Vec<Dfa>>) -> Self {
		assert_eq!(atn.num_modes(), dfas.len());
		Self {
			atn,
			dfas,
			listeners: ProxyListener::new(),
		}
	}

	/// One automaton per lexer mode, over the whole code point range.
	pub fn build_dfas(atn: &Atn) -> Arc<Vec<Dfa>> {
		let dfas: Vec<Dfa> = (0..atn.num_modes())
			.map(|mode| {
				let decision: usize = atn[atn.mode_start(mode)].decision().unwrap();
				Dfa::new(atn, decision, 0, char::MAX as i32)
			})
			.collect::<Vec<_>>();
		Arc::new(dfas)
	}

	pub fn listeners(&self) -> &ProxyListener {
		&self.listeners
	}

	pub fn dfa(&self, mode: usize) -> &Dfa {
		&self.dfas[mode]
	}

	/// Matches one token starting at the stream's position. On success the
	/// stream is left after the token; on failure it is restored.
	pub fn match_token(
		&self,
		input: &mut dyn SymbolStream,
		mode: usize,
		evaluator: &dyn PredicateEvaluator,
	) -> Result<LexerMatch, PredictionError> {
		let dfa: &Dfa = &self.dfas[mode];
		let marker: usize = input.mark();
		let start_index: usize = input.index();

		let mut op: LexerOp<'_> = LexerOp {
			atn: &self.atn,
			dfa,
			evaluator,
			join_cache: JoinCache::new(),
			saw_predicate: false,
		};
		let result: Result<LexerMatch, PredictionError> = op.match_impl(&mut *input, start_index);

		match &result {
			Ok(matched) => input.seek(start_index + matched.length),
			Err(_) => input.seek(start_index),
		}
		input.release(marker);

		if let Err(error) = &result {
			self.listeners
				.syntax_error(dfa.decision(), start_index, input.index(), &error.to_string());
		}
		result
	}
}

impl std::fmt::Debug for LexerPredictor {
	fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		fmt.debug_struct("LexerPredictor").field("modes", &self.dfas.len()).finish()
	}
}

struct LexerOp<'a> {
	atn: &'a Atn,
	dfa: &'a Dfa,
	evaluator: &'a dyn PredicateEvaluator,
	join_cache: JoinCache,
	/// Set when a closure crossed a grammar predicate. States reached that
	/// way depend on the evaluator and must not be cached as edges or start
	/// states; they are recomputed per call.
	saw_predicate: bool,
}

impl LexerOp<'_> {
	fn match_impl(&mut self, input: &mut dyn SymbolStream, start_index: usize) -> Result<LexerMatch, PredictionError> {
		let s0: Arc<DfaState> = match self.dfa.start_state(false) {
			Some(existing) => existing,
			None => {
				self.saw_predicate = false;
				let state: Arc<DfaState> = self.compute_start_state();
				if self.saw_predicate {
					state
				} else {
					self.dfa.install_start_state(false, state)
				}
			},
		};

		let mut current: Arc<DfaState> = s0;
		let mut best: Option<(Arc<DfaState>, usize)> = None;
		if current.accept().is_some() {
			best = Some((current.clone(), input.index()));
		}

		loop {
			let t: i32 = input.la(1);
			if t == EOF {
				break;
			}
			let next: Arc<DfaState> = match current.target(t) {
				Some(next) => next,
				None => {
					let offset: usize = input.index() + 1 - start_index;
					self.compute_target(&current, t, offset)
				},
			};
			if next.is_error() {
				break;
			}
			input.consume();
			current = next;
			if current.accept().is_some() {
				best = Some((current.clone(), input.index()));
			}
		}

		let Some((accept_state, end_index)) = best else {
			debug!(mode_decision = self.dfa.decision(), start_index, "no rule matched");
			return Err(PredictionError::NoViableAlternative {
				decision: self.dfa.decision(),
				start_index,
				stop_index: input.index(),
				configs: Some(current.configs().clone()),
			});
		};
		let info: &AcceptInfo = accept_state.accept().unwrap();
		Ok(LexerMatch {
			token_type: info.prediction as i32,
			length: end_index - start_index,
			executor: info.lexer_action.clone(),
		})
	}

	/// One configuration per rule reachable from the mode's start, in rule
	/// order; the order is what breaks length ties.
	fn compute_start_state(&mut self) -> Arc<DfaState> {
		let atn: &Atn = self.atn;
		let mode_start: &AtnState = &atn[self.dfa.atn_start_state()];

		let mut set: ConfigSet = ConfigSet::new(false);
		let mut busy: HashSet<AtnConfig> = HashSet::new();
		for (i, transition) in mode_start.transitions().iter().enumerate() {
			let alt: u32 = i as u32 + 1;
			let config: AtnConfig = AtnConfig::new(transition.target, alt, empty_local());
			self.closure_into(config, &mut set, &mut busy, 0);
		}
		self.finish_set(set)
	}

	fn compute_target(&mut self, current: &Arc<DfaState>, t: i32, offset: usize) -> Arc<DfaState> {
		let atn: &Atn = self.atn;
		let mut set: ConfigSet = ConfigSet::new(false);
		let mut busy: HashSet<AtnConfig> = HashSet::new();
		self.saw_predicate = false;

		// Once an alternative has already produced an accept in this set,
		// its non-greedy configurations stop competing for longer matches.
		let mut accepted_alt: u32 = INVALID_ALT;
		for config in current.configs().iter() {
			if config.alt() == accepted_alt && config.passed_through_non_greedy() {
				continue;
			}
			let state: &AtnState = &atn[config.state()];
			if state.is_rule_stop() {
				continue;
			}
			for transition in state.transitions().iter() {
				if transition.kind.matches(t, self.dfa.max_symbol()) {
					let target: AtnConfig = config.transform(atn, transition.target);
					if self.closure_into(target, &mut set, &mut busy, offset) {
						accepted_alt = config.alt();
					}
				}
			}
		}

		if set.is_empty() {
			let error: Arc<DfaState> = self.dfa.error_state().clone();
			current.set_target(t, error.clone());
			return error;
		}
		let next: Arc<DfaState> = self.finish_set(set);
		if !self.saw_predicate {
			current.set_target(t, next.clone());
		}
		next
	}

	/// Epsilon completion for one seed. Rule stops with an exhausted stack
	/// are token accepts; frames pop back into the invoking rule. Grammar
	/// predicates are decided right here, anchored at the token start, and
	/// action transitions extend the configuration's executor. Returns
	/// whether an accept was reached.
	fn closure_into(
		&mut self,
		start: AtnConfig,
		set: &mut ConfigSet,
		busy: &mut HashSet<AtnConfig>,
		offset: usize,
	) -> bool {
		let atn: &Atn = self.atn;
		let mut reached_accept: bool = false;
		let mut stack: Vec<AtnConfig> = vec![start];
		while let Some(config) = stack.pop() {
			if !busy.insert(config.clone()) {
				continue;
			}
			let state: &AtnState = &atn[config.state()];

			if state.is_rule_stop() {
				let context: Arc<PredictionContext> = config.context().clone();
				if context.has_empty() {
					set.add(config.clone(), &mut self.join_cache);
					reached_accept = true;
				}
				if !context.is_empty() {
					for i in 0..context.size() {
						let return_state: u32 = context.return_state(i);
						if return_state == EMPTY_RETURN_STATE {
							continue;
						}
						stack.push(config.transform_with_context(
							atn,
							AtnStateIdx(return_state as usize),
							context.parent(i).clone(),
						));
					}
				}
				continue;
			}

			let pass_through: bool =
				!state.transitions().is_empty() && state.transitions().iter().all(|t| t.kind.is_epsilon());
			if !pass_through {
				set.add(config.clone(), &mut self.join_cache);
			}

			for transition in state.transitions().iter() {
				match &transition.kind {
					TransitionKind::Epsilon => {
						stack.push(config.transform(atn, transition.target));
					},
					TransitionKind::Rule { follow_state, .. } => {
						let pushed: Arc<PredictionContext> = config.context().child(follow_state.0 as u32);
						stack.push(config.transform_with_context(atn, transition.target, pushed));
					},
					&TransitionKind::Predicate { rule, pred, .. } => {
						self.saw_predicate = true;
						if self.evaluator.evaluate(rule, pred, None) {
							stack.push(config.transform(atn, transition.target));
						}
					},
					&TransitionKind::Action { action, .. } => {
						let executor: Arc<LexerActionExecutor> = LexerActionExecutor::append(
							config.lexer_action(),
							atn.lexer_action(action).clone(),
							offset,
						);
						let mut next: AtnConfig = config.transform(atn, transition.target);
						next.lexer_action = Some(executor);
						stack.push(next);
					},
					_ => (),
				}
			}
		}
		reached_accept
	}

	/// The first finished rule in the set decides the token type and carries
	/// the executor.
	fn finish_set(&mut self, set: ConfigSet) -> Arc<DfaState> {
		let atn: &Atn = self.atn;
		let accept: Option<AcceptInfo> = set
			.iter()
			.find(|config| atn[config.state()].is_rule_stop())
			.map(|config| AcceptInfo {
				prediction: atn.rules()[atn[config.state()].rule()].token_type as u32,
				predicates: None,
				lexer_action: config.lexer_action().cloned(),
			});
		self.dfa.add_state(set.seal(), accept)
	}
}
