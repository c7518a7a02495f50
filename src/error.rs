//! Error currency of the prediction core.
//!
//! Only dead ends are errors here. Ambiguity and context sensitivity are
//! reported through listeners and prediction still returns an alternative;
//! misuse of sealed state (such as precedence lookups on a non-precedence
//! automaton) is a programming error and panics instead of surfacing.

use std::sync::Arc;

use thiserror::Error;

use crate::config_set::FrozenConfigSet;

#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum PredictionError {
	/// The reach set went empty, or every predicate guarding the surviving
	/// alternatives evaluated false.
	#[error("no viable alternative at decision {decision}, input {start_index}..{stop_index}")]
	NoViableAlternative {
		decision: usize,
		start_index: usize,
		stop_index: usize,
		/// The configurations alive at the dead end, for diagnostics.
		configs: Option<Arc<FrozenConfigSet>>,
	},

	/// A symbol outside the expected set. The core never raises this itself;
	/// it is constructed by the consuming parser's error strategy, which
	/// shares this error type.
	#[error("mismatched input {found} at index {index}, expected one of {expected:?}")]
	InputMismatch {
		expected: Vec<i32>,
		found: i32,
		index: usize,
	},

	#[error(transparent)]
	Decode(#[from] DecodeError),
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum DecodeError {
	#[error("malformed {encoding} sequence at offset {offset}")]
	Malformed { encoding: &'static str, offset: usize },
}
