//! Side effects a lexer rule commits along with its token.
//!
//! Actions are collected while the automaton speculates and replayed only
//! once a match commits, so a rule that loses the longest-match race leaves
//! no trace. Position-dependent actions remember their offset inside the
//! token; everything else replays at the end of the matched span.

use std::sync::Arc;

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum LexerAction {
	Skip,
	More,
	PopMode,
	Mode(usize),
	PushMode(usize),
	Channel(i32),
	TokenType(i32),
	Custom { rule: usize, action: usize },
}

impl LexerAction {
	/// Whether replay must happen at the input position where the action was
	/// crossed rather than after the whole token.
	pub fn is_position_dependent(&self) -> bool {
		matches!(self, Self::Custom { .. })
	}
}

/// An ordered list of actions, accumulated immutably: crossing an action
/// transition produces a new executor sharing nothing with the old one, so
/// competing configurations never see each other's side effects.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Default)]
pub struct LexerActionExecutor {
	/// `(offset within the token, action)`; `None` replays at the end.
	actions: Vec<(Option<usize>, LexerAction)>,
}

impl LexerActionExecutor {
	pub fn single(action: LexerAction) -> Arc<Self> {
		Arc::new(Self {
			actions: vec![(None, action)],
		})
	}

	/// Extends with one more action crossed `offset` code points into the
	/// token. The offset is only recorded for position-dependent actions.
	pub fn append(maybe_existing: Option<&Arc<Self>>, action: LexerAction, offset: usize) -> Arc<Self> {
		let recorded: Option<usize> = (action.is_position_dependent() && offset > 0).then_some(offset);
		let mut actions: Vec<(Option<usize>, LexerAction)> = match maybe_existing {
			Some(existing) => existing.actions.clone(),
			None => Vec::new(),
		};
		actions.push((recorded, action));
		Arc::new(Self { actions })
	}

	pub fn len(&self) -> usize {
		self.actions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.actions.is_empty()
	}

	/// Replays against a committed token of `length` code points starting at
	/// `start_index`. The sink receives each action with the absolute input
	/// index it applies at.
	pub fn execute(&self, start_index: usize, length: usize, mut sink: impl FnMut(&LexerAction, usize)) {
		for (maybe_offset, action) in self.actions.iter() {
			let index: usize = match maybe_offset {
				Some(offset) => start_index + offset,
				None => start_index + length,
			};
			sink(action, index);
		}
	}
}
