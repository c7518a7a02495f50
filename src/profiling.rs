//! Per-decision measurement around the predictor.
//!
//! The profiler is a plain decorator: same entry points, same results, plus
//! counters and event snapshots per decision. Timing uses the monotonic
//! clock, so elapsed time never goes backwards even when the wall clock does.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::context::RuleContext;
use crate::error::PredictionError;
use crate::prediction::AdaptivePredictor;
use crate::prediction::PredictTrace;
use crate::prediction::TraceEvent;
use crate::semantics::PredicateEvaluator;
use crate::stream::SymbolStream;

#[derive(Debug, Clone, Default)]
pub struct DecisionStats {
	pub decision: usize,
	pub invocations: u64,
	pub time_ns: u64,
	pub sll_total_lookahead: u64,
	pub sll_min_lookahead: usize,
	pub sll_max_lookahead: usize,
	pub ll_total_lookahead: u64,
	pub ll_min_lookahead: usize,
	pub ll_max_lookahead: usize,
	pub full_context_fallbacks: u64,
	/// Steps answered by cached edges vs computed over the network.
	pub dfa_transitions: u64,
	pub atn_transitions: u64,
	pub predicate_evals: Vec<PredicateEvalEvent>,
	pub conflicts: Vec<DecisionEvent>,
	pub ambiguities: Vec<AmbiguityEvent>,
	pub context_sensitivities: Vec<DecisionEvent>,
	pub errors: Vec<DecisionEvent>,
}

/// Snapshot of the walk at the moment something happened.
#[derive(Debug, Clone)]
pub struct DecisionEvent {
	pub decision: usize,
	pub start_index: usize,
	pub stop_index: usize,
	pub full_context: bool,
	pub alts: Option<BTreeSet<u32>>,
	pub prediction: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct AmbiguityEvent {
	pub event: DecisionEvent,
	pub exact: bool,
}

#[derive(Debug, Clone)]
pub struct PredicateEvalEvent {
	pub decision: usize,
	pub alt: u32,
	pub result: bool,
}

/// Wraps an [`AdaptivePredictor`] transparently; predictions go through
/// unchanged while the per-decision ledger fills up.
#[derive(Debug)]
pub struct ProfilingPredictor {
	inner: AdaptivePredictor,
	decisions: Mutex<Vec<DecisionStats>>,
}

impl ProfilingPredictor {
	pub fn new(inner: AdaptivePredictor) -> Self {
		let decisions: Vec<DecisionStats> = (0..inner.decision_count())
			.map(|decision| DecisionStats {
				decision,
				..DecisionStats::default()
			})
			.collect::<Vec<_>>();
		Self {
			inner,
			decisions: Mutex::new(decisions),
		}
	}

	pub fn inner(&self) -> &AdaptivePredictor {
		&self.inner
	}

	pub fn predict(
		&self,
		decision: usize,
		input: &mut dyn SymbolStream,
		outer_context: &Arc<RuleContext>,
		evaluator: &dyn PredicateEvaluator,
	) -> Result<u32, PredictionError> {
		let start_index: usize = input.index();
		let mut trace: PredictTrace = PredictTrace::default();
		let started: Instant = Instant::now();
		let result: Result<u32, PredictionError> =
			self.inner
				.predict_traced(decision, input, outer_context, evaluator, &mut trace);
		let elapsed_ns: u64 = started.elapsed().as_nanos() as u64;

		let mut guard = self.decisions.lock();
		let stats: &mut DecisionStats = &mut guard[decision];
		stats.invocations += 1;
		stats.time_ns += elapsed_ns;
		stats.dfa_transitions += trace.dfa_transitions;
		stats.atn_transitions += trace.atn_transitions;
		record_lookahead(
			trace.sll_lookahead,
			&mut stats.sll_total_lookahead,
			&mut stats.sll_min_lookahead,
			&mut stats.sll_max_lookahead,
		);
		if trace.used_full_context {
			stats.full_context_fallbacks += 1;
			record_lookahead(
				trace.ll_lookahead,
				&mut stats.ll_total_lookahead,
				&mut stats.ll_min_lookahead,
				&mut stats.ll_max_lookahead,
			);
		}

		let prediction: Option<u32> = result.as_ref().ok().copied();
		for event in trace.events.iter() {
			let snapshot = |alts: Option<BTreeSet<u32>>, stop_index: usize, full_context: bool| DecisionEvent {
				decision,
				start_index,
				stop_index,
				full_context,
				alts,
				prediction,
			};
			match event {
				TraceEvent::Conflict { alts, stop_index } => {
					stats.conflicts.push(snapshot(Some(alts.clone()), *stop_index, false));
				},
				TraceEvent::Ambiguity { alts, exact, stop_index } => {
					stats.ambiguities.push(AmbiguityEvent {
						event: snapshot(Some(alts.clone()), *stop_index, true),
						exact: *exact,
					});
				},
				TraceEvent::ContextSensitivity { prediction, stop_index } => {
					let mut event: DecisionEvent = snapshot(None, *stop_index, true);
					event.prediction = Some(*prediction);
					stats.context_sensitivities.push(event);
				},
				TraceEvent::PredicateEval { alt, result } => {
					stats.predicate_evals.push(PredicateEvalEvent {
						decision,
						alt: *alt,
						result: *result,
					});
				},
				TraceEvent::Error { stop_index } => {
					stats.errors.push(snapshot(None, *stop_index, trace.used_full_context));
				},
			}
		}

		result
	}

	/// Snapshot of every decision's ledger.
	pub fn decisions(&self) -> Vec<DecisionStats> {
		self.decisions.lock().clone()
	}

	pub fn decision_stats(&self, decision: usize) -> DecisionStats {
		self.decisions.lock()[decision].clone()
	}
}

fn record_lookahead(lookahead: usize, total: &mut u64, min: &mut usize, max: &mut usize) {
	*total += lookahead as u64;
	if *max == 0 || lookahead < *min {
		*min = lookahead;
	}
	if lookahead > *max {
		*max = lookahead;
	}
}
