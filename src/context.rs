//! Resolution contexts.
//!
//! A [`Context`] is the chain of aliases traversed to reach the current point
//! of a resolution. Every recursive injection extends the chain by value, so
//! sibling branches never observe each other's entries. The chain is what
//! makes cycle detection and readable error messages possible.

use std::sync::Arc;

/// One hop in a resolution chain.
#[derive(Debug, Clone)]
pub(crate) struct ContextItem {
	pub(crate) id: Arc<str>,
	/// Repeats of this item are ignored by cycle detection.
	pub(crate) cannot_cause_cycles: bool,
	/// The synthetic container root. Excluded from rendered chains.
	pub(crate) root: bool,
}

impl ContextItem {
	pub(crate) fn new(id: Arc<str>, cannot_cause_cycles: bool) -> Self {
		Self { id, cannot_cause_cycles, root: false }
	}
}

/// An append-only chain of aliases describing how a resolution got here.
#[derive(Debug, Clone)]
pub struct Context {
	items: Vec<ContextItem>,
}

impl Context {
	/// A fresh chain containing only the synthetic root of `container_id`.
	pub(crate) fn root(container_id: Arc<str>) -> Self {
		Self {
			items: vec![ContextItem { id: container_id, cannot_cause_cycles: true, root: true }],
		}
	}

	/// Returns a new chain with `item` appended. The receiver is untouched.
	pub(crate) fn extended(&self, item: ContextItem) -> Self {
		let mut items = self.items.clone();
		items.push(item);
		Self { items }
	}

	/// True when `id` already occurs in the chain and that occurrence is
	/// allowed to participate in cycle detection.
	pub(crate) fn would_cycle(&self, id: &str) -> bool {
		self.items
			.iter()
			.any(|item| !item.cannot_cause_cycles && item.id.as_ref() == id)
	}

	/// The ids of the chain with `last` appended, root excluded. This is the
	/// shape every chain-carrying error message renders.
	pub(crate) fn chain_with(&self, last: Arc<str>) -> Vec<Arc<str>> {
		let mut ids: Vec<Arc<str>> =
			self.items.iter().filter(|item| !item.root).map(|item| item.id.clone()).collect();
		ids.push(last);
		ids
	}

	/// Owned ids of the chain, root excluded, outermost first.
	pub(crate) fn lineage(&self) -> Vec<Arc<str>> {
		self.items.iter().filter(|item| !item.root).map(|item| item.id.clone()).collect()
	}

	/// The ids traversed so far, outermost first. The synthetic root is skipped.
	pub fn ids(&self) -> impl Iterator<Item = &str> {
		self.items.iter().filter(|item| !item.root).map(|item| item.id.as_ref())
	}

	/// Number of hops, root excluded.
	pub fn depth(&self) -> usize {
		self.items.iter().filter(|item| !item.root).count()
	}
}
