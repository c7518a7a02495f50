//! Semantic predicates gathered during closure and decided at accept states.

use std::sync::Arc;

use crate::context::RuleContext;

/// A predicate tree attached to a configuration. Grammar predicates are
/// opaque `(rule, pred)` indices resolved by the caller's [`PredicateEvaluator`];
/// precedence predicates compare a level against the parser's current
/// precedence. `and`/`or` keep the tree flat and duplicate-free.
#[derive(Debug, Clone, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub enum SemanticContext {
	Predicate {
		rule: usize,
		pred: usize,
		is_ctx_dependent: bool,
	},
	PrecedencePredicate {
		precedence: u32,
	},
	And(Vec<Arc<SemanticContext>>),
	Or(Vec<Arc<SemanticContext>>),
}

/// Host hooks consulted while predicting. Implementations must be free of
/// side effects visible to the parse; prediction may evaluate speculatively
/// and more than once.
pub trait PredicateEvaluator {
	fn evaluate(&self, rule: usize, pred: usize, ctx: Option<&RuleContext>) -> bool;

	/// The parser's current precedence level (0 outside any precedence rule).
	fn precedence(&self) -> u32 {
		0
	}
}

/// Evaluator for grammars without predicates; a grammar predicate showing up
/// anyway is a broken network.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPredicates;

impl PredicateEvaluator for NoPredicates {
	fn evaluate(&self, rule: usize, pred: usize, _ctx: Option<&RuleContext>) -> bool {
		panic!("no predicate evaluator configured, network references predicate ({rule}, {pred})");
	}
}

impl SemanticContext {
	pub fn and(a: Option<&Arc<Self>>, b: &Arc<Self>) -> Arc<Self> {
		let Some(a) = a else {
			return b.clone();
		};
		if a == b {
			return a.clone();
		}
		let mut operands: Vec<Arc<Self>> = Vec::new();
		Self::collect(a, &mut operands, true);
		Self::collect(b, &mut operands, true);
		operands.sort();
		operands.dedup();
		if operands.len() == 1 {
			return operands.pop().unwrap();
		}
		Arc::new(Self::And(operands))
	}

	pub fn or(a: Option<&Arc<Self>>, b: &Arc<Self>) -> Arc<Self> {
		let Some(a) = a else {
			return b.clone();
		};
		if a == b {
			return a.clone();
		}
		let mut operands: Vec<Arc<Self>> = Vec::new();
		Self::collect(a, &mut operands, false);
		Self::collect(b, &mut operands, false);
		operands.sort();
		operands.dedup();
		if operands.len() == 1 {
			return operands.pop().unwrap();
		}
		Arc::new(Self::Or(operands))
	}

	fn collect(ctx: &Arc<Self>, into: &mut Vec<Arc<Self>>, conjunction: bool) {
		match (&**ctx, conjunction) {
			(Self::And(operands), true) | (Self::Or(operands), false) => {
				into.extend(operands.iter().cloned());
			},
			_ => into.push(ctx.clone()),
		}
	}

	pub fn evaluate(&self, evaluator: &dyn PredicateEvaluator, ctx: Option<&RuleContext>) -> bool {
		match self {
			&Self::Predicate { rule, pred, .. } => evaluator.evaluate(rule, pred, ctx),
			&Self::PrecedencePredicate { precedence } => precedence >= evaluator.precedence(),
			Self::And(operands) => operands.iter().all(|operand| operand.evaluate(evaluator, ctx)),
			Self::Or(operands) => operands.iter().any(|operand| operand.evaluate(evaluator, ctx)),
		}
	}

	/// Resolves the precedence predicates in this tree against the current
	/// precedence, leaving grammar predicates for accept-time evaluation.
	///
	/// - `None`: the tree is statically false at this precedence.
	/// - `Some(None)`: statically true, nothing left to evaluate.
	/// - `Some(Some(ctx))`: grammar predicates remain.
	pub fn evaluate_precedence(
		self: &Arc<Self>,
		evaluator: &dyn PredicateEvaluator,
	) -> Option<Option<Arc<SemanticContext>>> {
		match &**self {
			Self::Predicate { .. } => Some(Some(self.clone())),
			&Self::PrecedencePredicate { precedence } => {
				if precedence >= evaluator.precedence() {
					Some(None)
				} else {
					None
				}
			},
			Self::And(operands) => {
				let mut remaining: Option<Arc<Self>> = None;
				let mut changed: bool = false;
				for operand in operands.iter() {
					match operand.evaluate_precedence(evaluator)? {
						None => changed = true,
						Some(operand) => remaining = Some(Self::and(remaining.as_ref(), &operand)),
					}
				}
				if !changed { Some(Some(self.clone())) } else { Some(remaining) }
			},
			Self::Or(operands) => {
				let mut remaining: Option<Arc<Self>> = None;
				let mut any_true: bool = false;
				let mut any_false: bool = false;
				for operand in operands.iter() {
					match operand.evaluate_precedence(evaluator) {
						None => any_false = true,
						Some(None) => any_true = true,
						Some(Some(operand)) => remaining = Some(Self::or(remaining.as_ref(), &operand)),
					}
				}
				if any_true {
					Some(None)
				} else if remaining.is_some() {
					Some(remaining)
				} else if any_false {
					None
				} else {
					Some(Some(self.clone()))
				}
			},
		}
	}
}
