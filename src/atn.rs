//! The frozen transition network a grammar compiles to.
//!
//! The network is consumed read-only by prediction; it is assembled once
//! through [`AtnBuilder`] and never mutated afterwards, which is what lets
//! any number of concurrent predictions walk it without coordination.

use crate::interval_set::IntervalSet;
use crate::lexer_actions::LexerAction;
use crate::stream::EOF;

/// Alternatives are numbered from 1; 0 is the "not decided" marker.
pub const INVALID_ALT: u32 = 0;

#[derive(Debug)]
pub struct Atn {
	states: Vec<AtnState>,
	/// Decision index -> decision state.
	decisions: Vec<AtnStateIdx>,
	rules: Vec<RuleInfo>,
	/// Lexer mode -> tokens-start state. Empty for parser networks.
	modes: Vec<AtnStateIdx>,
	/// Table of side effects referenced by action transitions (lexer networks).
	lexer_actions: Vec<LexerAction>,
	max_token_type: i32,
}

#[derive(Debug)]
pub struct AtnState {
	idx: AtnStateIdx,
	kind: AtnStateKind,
	rule: usize,
	/// Set iff this state heads a decision.
	decision: Option<usize>,
	non_greedy: bool,
	/// Only ever set on the star-loop-entry of a left-recursive rule.
	precedence_rule_decision: bool,
	transitions: Vec<Transition>,
}

#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub struct AtnStateIdx(pub usize);

impl std::fmt::Debug for AtnStateIdx {
	fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		fmt.debug_tuple("AtnStateIdx").field(&self.0).finish()
	}
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AtnStateKind {
	Basic,
	RuleStart,
	RuleStop,
	BlockStart,
	BlockEnd,
	PlusBlockStart,
	PlusLoopback,
	StarBlockStart,
	StarLoopback,
	StarLoopEntry,
	LoopEnd,
	TokensStart,
}

#[derive(Debug, Clone)]
pub struct Transition {
	pub target: AtnStateIdx,
	pub kind: TransitionKind,
}

#[derive(Debug, Clone)]
pub enum TransitionKind {
	Epsilon,
	Atom(i32),
	Range(i32, i32),
	Set(IntervalSet),
	NotSet(IntervalSet),
	Wildcard,
	Rule {
		rule: usize,
		/// Where the invoking rule resumes once the invoked rule completes.
		follow_state: AtnStateIdx,
		precedence: u32,
	},
	Predicate {
		rule: usize,
		pred: usize,
		is_ctx_dependent: bool,
	},
	Action {
		rule: usize,
		action: usize,
	},
	PrecedencePredicate {
		precedence: u32,
	},
}

#[derive(Debug)]
pub struct RuleInfo {
	pub name: String,
	pub start: AtnStateIdx,
	pub stop: AtnStateIdx,
	/// Token type emitted when this is a lexer rule; 0 for parser rules.
	pub token_type: i32,
}

impl Atn {
	pub fn decision_state(&self, decision: usize) -> AtnStateIdx {
		self.decisions[decision]
	}

	pub fn mode_start(&self, mode: usize) -> AtnStateIdx {
		self.modes[mode]
	}

	pub fn lexer_action(&self, action: usize) -> &LexerAction {
		&self.lexer_actions[action]
	}
}

// Accessors
impl Atn {
	pub fn num_states(&self) -> usize {
		self.states.len()
	}

	pub fn num_decisions(&self) -> usize {
		self.decisions.len()
	}

	pub fn num_modes(&self) -> usize {
		self.modes.len()
	}

	pub fn rules(&self) -> &[RuleInfo] {
		&self.rules
	}

	pub fn max_token_type(&self) -> i32 {
		self.max_token_type
	}
}

impl std::ops::Index<AtnStateIdx> for Atn {
	type Output = AtnState;

	fn index(&self, i: AtnStateIdx) -> &Self::Output {
		&self.states[i.0]
	}
}

impl AtnState {
	pub fn is_rule_stop(&self) -> bool {
		self.kind == AtnStateKind::RuleStop
	}

	pub fn is_non_greedy_decision(&self) -> bool {
		self.decision.is_some() && self.non_greedy
	}
}

// Accessors
impl AtnState {
	pub fn idx(&self) -> AtnStateIdx {
		self.idx
	}

	pub fn kind(&self) -> AtnStateKind {
		self.kind
	}

	pub fn rule(&self) -> usize {
		self.rule
	}

	pub fn decision(&self) -> Option<usize> {
		self.decision
	}

	pub fn precedence_rule_decision(&self) -> bool {
		self.precedence_rule_decision
	}

	pub fn transitions(&self) -> &[Transition] {
		&self.transitions
	}
}

impl TransitionKind {
	pub fn is_epsilon(&self) -> bool {
		match self {
			Self::Epsilon
			| Self::Rule { .. }
			| Self::Predicate { .. }
			| Self::Action { .. }
			| Self::PrecedencePredicate { .. } => true,
			Self::Atom(_) | Self::Range(..) | Self::Set(_) | Self::NotSet(_) | Self::Wildcard => false,
		}
	}

	/// Whether consuming `symbol` takes this transition. `max_symbol` bounds
	/// the complement-style labels; end-of-input only matches an explicit label.
	pub fn matches(&self, symbol: i32, max_symbol: i32) -> bool {
		match self {
			&Self::Atom(label) => label == symbol,
			&Self::Range(lo, hi) => lo <= symbol && symbol <= hi,
			Self::Set(set) => set.contains(symbol),
			Self::NotSet(set) => symbol != EOF && symbol <= max_symbol && !set.contains(symbol),
			Self::Wildcard => symbol != EOF && symbol <= max_symbol,
			_ => false,
		}
	}
}

/// Assembles a network and freezes it into an [`Atn`].
///
/// Freezing is where the rule-return plumbing happens: every rule transition
/// recorded during assembly contributes an epsilon edge from the invoked
/// rule's stop state back to the transition's follow state. Those edges are
/// the "anything could have called us" approximation chased when prediction
/// runs without outer context.
#[derive(Debug)]
pub struct AtnBuilder {
	states: Vec<AtnState>,
	decisions: Vec<AtnStateIdx>,
	rules: Vec<RuleInfo>,
	modes: Vec<AtnStateIdx>,
	lexer_actions: Vec<LexerAction>,
	max_token_type: i32,
}

impl AtnBuilder {
	pub fn new(max_token_type: i32) -> Self {
		Self {
			states: Vec::new(),
			decisions: Vec::new(),
			rules: Vec::new(),
			modes: Vec::new(),
			lexer_actions: Vec::new(),
			max_token_type,
		}
	}

	pub fn add_rule<LikeString>(&mut self, name: LikeString, token_type: i32) -> usize
	where
		LikeString: Into<String>,
	{
		let rule: usize = self.rules.len();
		let start: AtnStateIdx = self.add_state(AtnStateKind::RuleStart, rule);
		let stop: AtnStateIdx = self.add_state(AtnStateKind::RuleStop, rule);
		self.rules.push(RuleInfo {
			name: name.into(),
			start,
			stop,
			token_type,
		});
		rule
	}

	pub fn add_state(&mut self, kind: AtnStateKind, rule: usize) -> AtnStateIdx {
		let idx: AtnStateIdx = AtnStateIdx(self.states.len());
		self.states.push(AtnState {
			idx,
			kind,
			rule,
			decision: None,
			non_greedy: false,
			precedence_rule_decision: false,
			transitions: Vec::new(),
		});
		idx
	}

	pub fn add_decision_state(&mut self, kind: AtnStateKind, rule: usize) -> AtnStateIdx {
		let idx: AtnStateIdx = self.add_state(kind, rule);
		self.states[idx.0].decision = Some(self.decisions.len());
		self.decisions.push(idx);
		idx
	}

	pub fn add_mode(&mut self) -> AtnStateIdx {
		let idx: AtnStateIdx = self.add_decision_state(AtnStateKind::TokensStart, usize::MAX);
		self.modes.push(idx);
		idx
	}

	pub fn add_lexer_action(&mut self, action: LexerAction) -> usize {
		let idx: usize = self.lexer_actions.len();
		self.lexer_actions.push(action);
		idx
	}

	pub fn mark_non_greedy(&mut self, state: AtnStateIdx) {
		assert!(self.states[state.0].decision.is_some());
		self.states[state.0].non_greedy = true;
	}

	pub fn mark_precedence_decision(&mut self, state: AtnStateIdx) {
		assert_eq!(self.states[state.0].kind, AtnStateKind::StarLoopEntry);
		self.states[state.0].precedence_rule_decision = true;
	}

	pub fn transition(&mut self, from: AtnStateIdx, to: AtnStateIdx, kind: TransitionKind) {
		self.states[from.0].transitions.push(Transition { target: to, kind });
	}

	pub fn epsilon(&mut self, from: AtnStateIdx, to: AtnStateIdx) {
		self.transition(from, to, TransitionKind::Epsilon);
	}

	pub fn atom(&mut self, from: AtnStateIdx, to: AtnStateIdx, symbol: i32) {
		self.transition(from, to, TransitionKind::Atom(symbol));
	}

	pub fn rule_ref(&mut self, from: AtnStateIdx, rule: usize, follow_state: AtnStateIdx, precedence: u32) {
		let target: AtnStateIdx = self.rules[rule].start;
		self.transition(
			from,
			target,
			TransitionKind::Rule {
				rule,
				follow_state,
				precedence,
			},
		);
	}

	pub fn freeze(mut self) -> Atn {
		let mut follow_edges: Vec<(AtnStateIdx, AtnStateIdx)> = Vec::new();
		for state in self.states.iter() {
			for transition in state.transitions.iter() {
				if let TransitionKind::Rule { rule, follow_state, .. } = transition.kind {
					follow_edges.push((self.rules[rule].stop, follow_state));
				}
			}
		}
		for (stop, follow) in follow_edges.into_iter() {
			self.epsilon(stop, follow);
		}

		Atn {
			states: self.states,
			decisions: self.decisions,
			rules: self.rules,
			modes: self.modes,
			lexer_actions: self.lexer_actions,
			max_token_type: self.max_token_type,
		}
	}
}

// Accessors
impl AtnBuilder {
	pub fn rule_start(&self, rule: usize) -> AtnStateIdx {
		self.rules[rule].start
	}

	pub fn rule_stop(&self, rule: usize) -> AtnStateIdx {
		self.rules[rule].stop
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn follow_edges_linked_at_freeze() {
		let mut builder: AtnBuilder = AtnBuilder::new(2);
		let outer: usize = builder.add_rule("outer", 0);
		let inner: usize = builder.add_rule("inner", 0);

		let before: AtnStateIdx = builder.add_state(AtnStateKind::Basic, outer);
		let after: AtnStateIdx = builder.add_state(AtnStateKind::Basic, outer);
		builder.epsilon(builder.rule_start(outer), before);
		builder.rule_ref(before, inner, after, 0);
		builder.epsilon(after, builder.rule_stop(outer));
		builder.atom(builder.rule_start(inner), builder.rule_stop(inner), 1);

		let atn: Atn = builder.freeze();

		let inner_stop: &AtnState = &atn[atn.rules()[inner].stop];
		assert_eq!(inner_stop.transitions().len(), 1);
		assert_eq!(inner_stop.transitions()[0].target, after);
		assert!(inner_stop.transitions()[0].kind.is_epsilon());
	}

	#[test]
	fn label_matching() {
		let set: TransitionKind = TransitionKind::Set([(1, 3), (7, 7)].into_iter().collect::<IntervalSet>());
		assert!(set.matches(2, 10));
		assert!(!set.matches(4, 10));

		let not_set: TransitionKind = TransitionKind::NotSet([(1, 3)].into_iter().collect::<IntervalSet>());
		assert!(!not_set.matches(2, 10));
		assert!(not_set.matches(4, 10));
		assert!(!not_set.matches(EOF, 10));
		assert!(!not_set.matches(11, 10));

		assert!(TransitionKind::Wildcard.matches(5, 10));
		assert!(!TransitionKind::Wildcard.matches(EOF, 10));
		assert!(TransitionKind::Atom(EOF).matches(EOF, 10));
	}
}
