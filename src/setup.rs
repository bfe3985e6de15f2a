//! The one-time setup pass.
//!
//! [`run_setups`](crate::Container::run_setups) walks every setuppable in
//! registration order and runs its hook exactly once. A hook that injects
//! another setuppable through its [`SetupDi`] handle awaits that target's
//! hook to completion first, so setup ordering follows the dependency graph
//! no matter the registration order. The edges observed while doing so are
//! checked for loops as they appear.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::container::ContainerState;
use crate::context::Context;
use crate::error::{DiError, DiResult};
use crate::injectable::{Alias, Definition, downcast_instance};
use crate::instantiate::inject_erased;

type SharedHook = Shared<BoxFuture<'static, DiResult<()>>>;

/// Shared state of one setup pass.
#[derive(Default)]
pub(crate) struct SetupPass {
	/// One shared completion future per hook; a hook runs at most once, and
	/// every requester awaits the same run to completion.
	hooks: Mutex<HashMap<Arc<str>, SharedHook>>,
	/// Setup-dependency edges observed so far.
	graph: Mutex<HashMap<Arc<str>, Vec<Arc<str>>>>,
}

impl SetupPass {
	pub(crate) fn new(setuppables: &[Arc<Definition>]) -> Self {
		let pass = Self::default();
		{
			let mut graph = pass.graph.lock().unwrap_or_else(PoisonError::into_inner);
			for definition in setuppables {
				graph.insert(definition.id.clone(), Vec::new());
			}
		}
		pass
	}

	/// Records `from -> to` and fails when the edge closes a loop. The error
	/// reports the longest loop in the graph, which names every participant.
	fn add_edge(&self, from: Arc<str>, to: Arc<str>) -> DiResult<()> {
		let mut graph = self.graph.lock().unwrap_or_else(PoisonError::into_inner);
		graph.entry(from).or_default().push(to);

		if let Some(cycle) = longest_cycle(&graph) {
			return Err(DiError::setup_cycle(cycle));
		}
		Ok(())
	}
}

/// Runs the hook of `definition`, or awaits the already-running hook. Either
/// way the hook has completed once this resolves.
pub(crate) fn run_setup_hook(
	state: Arc<ContainerState>,
	pass: Arc<SetupPass>,
	definition: Arc<Definition>,
) -> BoxFuture<'static, DiResult<()>> {
	Box::pin(async move {
		let Some(setup) = definition.setup.clone() else {
			return Ok(());
		};

		let hook = {
			let mut hooks = pass.hooks.lock().unwrap_or_else(PoisonError::into_inner);
			match hooks.get(&definition.id) {
				Some(hook) => hook.clone(),
				None => {
					tracing::debug!(id = %definition.id, "running setup hook");
					let handle = SetupDi {
						state,
						pass: Arc::clone(&pass),
						setuppable_id: definition.id.clone(),
					};
					let hook = setup(handle).shared();
					hooks.insert(definition.id.clone(), hook.clone());
					hook
				}
			}
		};
		hook.await
	})
}

/// The handle a setup hook injects through.
///
/// Injecting a setuppable completes that setuppable's own hook first, so a
/// hook always observes its dependencies fully set up. A hook may inject the
/// setuppable it belongs to without recursing.
#[derive(Clone)]
pub struct SetupDi {
	state: Arc<ContainerState>,
	pass: Arc<SetupPass>,
	setuppable_id: Arc<str>,
}

impl SetupDi {
	pub async fn inject<T, A>(&self, alias: &A) -> DiResult<Arc<T>>
	where
		T: Any + Send + Sync,
		A: Alias<T>,
	{
		self.prepare_target(&alias.alias_ref().id().clone()).await?;

		let alias = alias.alias_ref();
		let id = alias.id().clone();
		let context = Context::root(self.state.id.clone());
		let instance = inject_erased(Arc::clone(&self.state), alias, None, context).await?;
		downcast_instance::<T>(instance, &id)
	}

	pub async fn inject_with<T, A, P>(&self, alias: &A, param: P) -> DiResult<Arc<T>>
	where
		T: Any + Send + Sync,
		A: Alias<T>,
		P: Any + Send + Sync,
	{
		self.prepare_target(&alias.alias_ref().id().clone()).await?;

		let alias = alias.alias_ref();
		let id = alias.id().clone();
		let context = Context::root(self.state.id.clone());
		let instance = inject_erased(
			Arc::clone(&self.state),
			alias,
			Some(Arc::new(param)),
			context,
		)
		.await?;
		downcast_instance::<T>(instance, &id)
	}

	/// When the target is itself a setuppable, record the dependency edge and
	/// make sure its hook has completed.
	async fn prepare_target(&self, target_id: &Arc<str>) -> DiResult<()> {
		let Some(target) = self.state.registry.setuppable(target_id) else {
			return Ok(());
		};
		if target.id == self.setuppable_id {
			return Ok(());
		}

		self.pass.add_edge(self.setuppable_id.clone(), target.id.clone())?;
		run_setup_hook(Arc::clone(&self.state), Arc::clone(&self.pass), target).await
	}
}

/// The longest elementary loop in `graph`, start node repeated at the end.
fn longest_cycle(graph: &HashMap<Arc<str>, Vec<Arc<str>>>) -> Option<Vec<Arc<str>>> {
	let mut cycles: Vec<Vec<Arc<str>>> = Vec::new();
	let mut roots: Vec<Arc<str>> = graph.keys().cloned().collect();
	roots.sort();

	for root in &roots {
		let mut path = vec![root.clone()];
		collect_cycles(graph, root, root, &mut path, &mut cycles);
	}

	cycles.into_iter().max_by_key(Vec::len)
}

/// Enumerates loops rooted at their smallest node, which visits each loop
/// exactly once.
fn collect_cycles(
	graph: &HashMap<Arc<str>, Vec<Arc<str>>>,
	root: &Arc<str>,
	current: &Arc<str>,
	path: &mut Vec<Arc<str>>,
	cycles: &mut Vec<Vec<Arc<str>>>,
) {
	let Some(neighbours) = graph.get(current) else {
		return;
	};
	for next in neighbours {
		if next == root {
			let mut cycle = path.clone();
			cycle.push(root.clone());
			cycles.push(cycle);
		} else if next > root && !path.contains(next) {
			path.push(next.clone());
			collect_cycles(graph, root, next, path, cycles);
			path.pop();
		}
	}
}
