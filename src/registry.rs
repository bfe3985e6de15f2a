//! Bookkeeping for registered injectables, overrides, and cached instances.
//!
//! The registry is the synchronous heart of the container: every map lives
//! under one lock, and instance caches are handed out as independent `Arc`s so
//! no registry lock is ever held across an await point.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{DiError, DiResult};
use crate::injectable::{AliasRef, Definition, Instance, InstantiateRef};
use crate::lifecycle::InstanceKey;

pub(crate) type InstanceCache = Arc<RwLock<HashMap<InstanceKey, Instance>>>;

struct Entry {
	definition: Arc<Definition>,
	/// Mutable copy of the definition's flag so `permit_side_effects` can
	/// flip it without touching the shared definition.
	causes_side_effects: bool,
	order: u64,
}

#[derive(Default)]
struct RegistryInner {
	entries: HashMap<Arc<str>, Entry>,
	/// Token id to implementation ids, in registration order.
	token_members: HashMap<Arc<str>, Vec<Arc<str>>>,
	overrides: HashMap<Arc<str>, InstantiateRef>,
	instances: HashMap<Arc<str>, InstanceCache>,
	/// Injectable id to the injection chain that was active when it was
	/// registered from inside a build function.
	registration_contexts: HashMap<Arc<str>, Vec<Arc<str>>>,
	/// Injectable id to the ids of injectables that resolved it during their
	/// own build. Deregistering invalidates those cached instances.
	injection_dependents: HashMap<Arc<str>, HashSet<Arc<str>>>,
	already_injected: HashSet<Arc<str>>,
}

#[derive(Default)]
pub(crate) struct Registry {
	inner: RwLock<RegistryInner>,
	seq: AtomicU64,
}

impl Registry {
	pub(crate) fn register(
		&self,
		definition: Arc<Definition>,
		registered_by: Option<Vec<Arc<str>>>,
	) -> DiResult<()> {
		if definition.id.is_empty() {
			return Err(DiError::MissingId);
		}

		let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
		if inner.entries.contains_key(&definition.id) {
			return Err(DiError::DuplicateId(definition.id.clone()));
		}

		let id = definition.id.clone();
		if let Some(token) = &definition.token {
			inner.token_members.entry(token.id.clone()).or_default().push(id.clone());
		}
		if let Some(chain) = registered_by {
			inner.registration_contexts.insert(id.clone(), chain);
		}
		inner.instances.insert(id.clone(), InstanceCache::default());
		let order = self.seq.fetch_add(1, Ordering::Relaxed);
		inner.entries.insert(
			id.clone(),
			Entry { causes_side_effects: definition.causes_side_effects, definition, order },
		);
		drop(inner);

		tracing::debug!(id = %id, "registered injectable");
		Ok(())
	}

	/// Removes an injectable along with everything it registered from inside
	/// its build function, then drops its cached instances and override.
	pub(crate) fn deregister(&self, id: &Arc<str>) -> DiResult<()> {
		let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
		if !inner.entries.contains_key(id) {
			return Err(DiError::not_registered("deregister", format!("\"{id}\"")));
		}

		let mut queue = vec![id.clone()];
		let mut removed = Vec::new();
		while let Some(current) = queue.pop() {
			if !inner.entries.contains_key(&current) {
				continue;
			}
			let dependents: Vec<Arc<str>> = inner
				.registration_contexts
				.iter()
				.filter(|(dependent, chain)| **dependent != current && chain.contains(&current))
				.map(|(dependent, _)| dependent.clone())
				.collect();
			remove_single(&mut inner, &current);
			removed.push(current);
			queue.extend(dependents);
		}
		drop(inner);

		for id in &removed {
			tracing::debug!(id = %id, "deregistered injectable");
		}
		Ok(())
	}

	pub(crate) fn definition(&self, id: &str) -> Option<Arc<Definition>> {
		let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
		inner.entries.get(id).map(|entry| Arc::clone(&entry.definition))
	}

	/// The injectables an alias can resolve to: an exact id match first, then
	/// implementations of the token with that id, in registration order.
	pub(crate) fn related(&self, alias: &AliasRef) -> Vec<Arc<Definition>> {
		let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
		let mut out = Vec::new();
		if let Some(entry) = inner.entries.get(alias.id().as_ref()) {
			out.push(Arc::clone(&entry.definition));
		}
		if let Some(members) = inner.token_members.get(alias.id().as_ref()) {
			for member in members {
				if member == alias.id() {
					continue;
				}
				if let Some(entry) = inner.entries.get(member) {
					out.push(Arc::clone(&entry.definition));
				}
			}
		}
		out
	}

	pub(crate) fn causes_side_effects(&self, id: &Arc<str>) -> bool {
		let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
		inner.entries.get(id).is_some_and(|entry| entry.causes_side_effects)
	}

	pub(crate) fn permit_side_effects(&self, id: &Arc<str>) -> bool {
		let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
		match inner.entries.get_mut(id) {
			Some(entry) => {
				entry.causes_side_effects = false;
				true
			}
			None => false,
		}
	}

	/// Remembers every id in `ancestors` as a dependent of `id`, so a later
	/// deregistration of `id` can drop their stale cached instances.
	pub(crate) fn record_dependents(&self, id: &Arc<str>, ancestors: Vec<Arc<str>>) {
		if ancestors.is_empty() {
			return;
		}
		let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
		inner.injection_dependents.entry(id.clone()).or_default().extend(ancestors);
	}

	pub(crate) fn mark_injected(&self, id: &Arc<str>) {
		let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
		inner.already_injected.insert(id.clone());
	}

	pub(crate) fn was_injected(&self, id: &Arc<str>) -> bool {
		let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
		inner.already_injected.contains(id)
	}

	pub(crate) fn set_override(&self, id: Arc<str>, instantiate: InstantiateRef) {
		let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
		inner.overrides.insert(id, instantiate);
	}

	pub(crate) fn remove_override(&self, id: &Arc<str>) {
		let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
		inner.overrides.remove(id);
	}

	pub(crate) fn clear_overrides(&self) {
		let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
		inner.overrides.clear();
	}

	pub(crate) fn override_for(&self, id: &Arc<str>) -> Option<InstantiateRef> {
		let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
		inner.overrides.get(id).cloned()
	}

	/// The instance cache of an injectable, shared with in-flight resolutions.
	pub(crate) fn instance_cache(&self, id: &Arc<str>) -> InstanceCache {
		let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
		Arc::clone(inner.instances.entry(id.clone()).or_default())
	}

	pub(crate) fn purge(&self, id: &Arc<str>) {
		let cache = self.instance_cache(id);
		cache.write().unwrap_or_else(PoisonError::into_inner).clear();
	}

	/// All setuppables, in registration order.
	pub(crate) fn setuppables(&self) -> Vec<Arc<Definition>> {
		let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
		let mut setuppables: Vec<_> = inner
			.entries
			.values()
			.filter(|entry| entry.definition.setup.is_some())
			.map(|entry| (entry.order, Arc::clone(&entry.definition)))
			.collect();
		setuppables.sort_by_key(|(order, _)| *order);
		setuppables.into_iter().map(|(_, definition)| definition).collect()
	}

	pub(crate) fn setuppable(&self, id: &str) -> Option<Arc<Definition>> {
		self.definition(id).filter(|definition| definition.setup.is_some())
	}
}

fn remove_single(inner: &mut RegistryInner, id: &Arc<str>) {
	if let Some(entry) = inner.entries.remove(id)
		&& let Some(token) = &entry.definition.token
		&& let Some(members) = inner.token_members.get_mut(&token.id)
	{
		members.retain(|member| member != id);
	}
	// Instances built through the removed injectable are stale; drop them so
	// their next resolution observes the missing dependency.
	if let Some(dependents) = inner.injection_dependents.remove(id) {
		for dependent in dependents {
			if let Some(cache) = inner.instances.get(&dependent) {
				cache.write().unwrap_or_else(PoisonError::into_inner).clear();
			}
		}
	}
	inner.instances.remove(id);
	inner.overrides.remove(id);
	inner.registration_contexts.remove(id);
}
