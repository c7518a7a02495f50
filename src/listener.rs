//! Reporting hooks for prediction outcomes.
//!
//! Listeners are advisory: they observe ambiguity, context sensitivity, and
//! dead ends, and they can never change what prediction returns. A panicking
//! listener is contained and the remaining delegates still run.

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config_set::FrozenConfigSet;

#[allow(unused_variables)]
pub trait DecisionListener: Send + Sync {
	fn syntax_error(&self, decision: usize, start_index: usize, stop_index: usize, message: &str) {}

	/// The full-context phase could not separate `alts`; prediction resolves
	/// to the smallest of them.
	fn report_ambiguity(
		&self,
		decision: usize,
		exact: bool,
		alts: &BTreeSet<u32>,
		start_index: usize,
		stop_index: usize,
		configs: &Arc<FrozenConfigSet>,
	) {
	}

	/// The local phase conflicted and prediction is retrying with full
	/// context.
	fn report_attempting_full_context(
		&self,
		decision: usize,
		conflicting_alts: &BTreeSet<u32>,
		start_index: usize,
		stop_index: usize,
		configs: &Arc<FrozenConfigSet>,
	) {
	}

	/// Full context settled on a single alternative where the local phase
	/// could not.
	fn report_context_sensitivity(
		&self,
		decision: usize,
		prediction: u32,
		start_index: usize,
		stop_index: usize,
		configs: &Arc<FrozenConfigSet>,
	) {
	}
}

/// Fans one report out to any number of registered delegates.
#[derive(Default)]
pub struct ProxyListener {
	delegates: RwLock<Vec<Arc<dyn DecisionListener>>>,
}

impl ProxyListener {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn attach(&self, listener: Arc<dyn DecisionListener>) {
		self.delegates.write().push(listener);
	}

	pub fn detach(&self, listener: &Arc<dyn DecisionListener>) {
		self.delegates
			.write()
			.retain(|delegate| !Arc::ptr_eq(delegate, listener));
	}

	pub fn detach_all(&self) {
		self.delegates.write().clear();
	}

	pub fn listeners(&self) -> Vec<Arc<dyn DecisionListener>> {
		self.delegates.read().clone()
	}

	fn dispatch(&self, call: impl Fn(&dyn DecisionListener)) {
		for delegate in self.listeners().into_iter() {
			if std::panic::catch_unwind(AssertUnwindSafe(|| call(&*delegate))).is_err() {
				debug!("listener panicked during dispatch, continuing");
			}
		}
	}
}

impl DecisionListener for ProxyListener {
	fn syntax_error(&self, decision: usize, start_index: usize, stop_index: usize, message: &str) {
		self.dispatch(|listener| listener.syntax_error(decision, start_index, stop_index, message));
	}

	fn report_ambiguity(
		&self,
		decision: usize,
		exact: bool,
		alts: &BTreeSet<u32>,
		start_index: usize,
		stop_index: usize,
		configs: &Arc<FrozenConfigSet>,
	) {
		self.dispatch(|listener| {
			listener.report_ambiguity(decision, exact, alts, start_index, stop_index, configs);
		});
	}

	fn report_attempting_full_context(
		&self,
		decision: usize,
		conflicting_alts: &BTreeSet<u32>,
		start_index: usize,
		stop_index: usize,
		configs: &Arc<FrozenConfigSet>,
	) {
		self.dispatch(|listener| {
			listener.report_attempting_full_context(decision, conflicting_alts, start_index, stop_index, configs);
		});
	}

	fn report_context_sensitivity(
		&self,
		decision: usize,
		prediction: u32,
		start_index: usize,
		stop_index: usize,
		configs: &Arc<FrozenConfigSet>,
	) {
		self.dispatch(|listener| {
			listener.report_context_sensitivity(decision, prediction, start_index, stop_index, configs);
		});
	}
}

impl std::fmt::Debug for ProxyListener {
	fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		fmt.debug_struct("ProxyListener")
			.field("delegates", &self.delegates.read().len())
			.finish()
	}
}
