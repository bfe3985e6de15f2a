//! The resolution engine.
//!
//! Resolution runs in two layers. The outer layer, [`inject_erased`], performs
//! cycle detection against the incoming chain and folds any matching injection
//! decorators around the inner layer. The inner layer, [`base_inject`],
//! resolves the alias to a single definition, applies overrides and gates, and
//! hands off to [`get_instance`] which owns lifecycle keying, caching, and the
//! build call itself.

use std::sync::{Arc, PoisonError};
use std::sync::atomic::Ordering;

use futures::future::BoxFuture;

use crate::container::{ContainerState, Phase};
use crate::context::{Context, ContextItem};
use crate::decorator::{InjectFn, injection_decorators_for, instantiation_decorators_for};
use crate::error::{DiError, DiResult, render_chain};
use crate::injectable::{AliasRef, Definition, Instance, InstantiateRef, Param};
use crate::lifecycle::InstanceKey;
use crate::scoped::ScopedDi;

/// Resolves one alias to one instance, running the decorator pipeline.
pub(crate) fn inject_erased(
	state: Arc<ContainerState>,
	alias: AliasRef,
	param: Param,
	context: Context,
) -> BoxFuture<'static, DiResult<Instance>> {
	Box::pin(async move {
		if !alias.decorable() {
			return base_inject(state, alias, param, context).await;
		}

		if context.would_cycle(alias.id()) {
			return Err(DiError::cycle(context.chain_with(alias.id().clone())));
		}

		// Decorators are discovered through the non-decorated path; the
		// discovery token is exempt from cycle detection so the recursion
		// bottoms out.
		let discovery_context = context.extended(alias.context_item());
		let decorators = injection_decorators_for(&state, &alias, discovery_context).await?;

		if decorators.is_empty() {
			return base_inject(state, alias, param, context).await;
		}

		let base: InjectFn = {
			let state = Arc::clone(&state);
			Arc::new(move |alias, param, context| {
				Box::pin(base_inject(Arc::clone(&state), alias, param, context))
			})
		};
		// First registered decorator ends up innermost.
		let decorated = decorators
			.into_iter()
			.fold(base, |next, decorator| decorator.wrap(next));
		decorated(alias, param, context).await
	})
}

/// Resolves every implementation of an alias, in registration order.
pub(crate) fn inject_many_erased(
	state: Arc<ContainerState>,
	alias: AliasRef,
	param: Param,
	context: Context,
) -> BoxFuture<'static, DiResult<Vec<Instance>>> {
	Box::pin(async move {
		if context.would_cycle(alias.id()) {
			return Err(DiError::cycle(context.chain_with(alias.id().clone())));
		}

		let new_context = context.extended(alias.context_item());
		let definitions = state.registry.related(&alias);
		let mut instances = Vec::with_capacity(definitions.len());
		for definition in definitions {
			let instance = inject_erased(
				Arc::clone(&state),
				AliasRef::from_definition(definition),
				param.clone(),
				new_context.clone(),
			)
			.await?;
			instances.push(instance);
		}
		Ok(instances)
	})
}

async fn base_inject(
	state: Arc<ContainerState>,
	alias: AliasRef,
	param: Param,
	context: Context,
) -> DiResult<Instance> {
	let mut matches = state.registry.related(&alias);
	if matches.len() > 1 {
		return Err(DiError::too_many_matches(
			alias.id().clone(),
			matches.iter().map(|definition| definition.id.clone()),
		));
	}

	let original = match matches.pop() {
		Some(definition) => definition,
		None => match alias.ad_hoc_definition() {
			Some(definition) => {
				// Losing a registration race to a concurrent injection of the
				// same ad-hoc injectable is fine.
				match state.registry.register(Arc::clone(&definition), None) {
					Ok(()) | Err(DiError::DuplicateId(_)) => {}
					Err(error) => return Err(error),
				}
				definition
			}
			None => {
				return Err(DiError::not_registered(
					"inject",
					render_chain(context.chain_with(alias.id().clone())),
				));
			}
		},
	};

	state.registry.mark_injected(&original.id);
	state.registry.record_dependents(&original.id, context.lineage());

	if original.setup.is_some() && state.phase() == Phase::Building {
		return Err(DiError::SetupNotRun(original.id.clone()));
	}

	let override_fn = state.registry.override_for(&original.id);
	// Overrides are test doubles; they never count as side-effectful.
	let causes_side_effects =
		override_fn.is_none() && state.registry.causes_side_effects(&original.id);
	if causes_side_effects && state.side_effects_prevented.load(Ordering::SeqCst) {
		return Err(DiError::SideEffectsPrevented {
			chain: render_chain(context.chain_with(original.id.clone())),
		});
	}

	get_instance(state, original, override_fn, param, context).await
}

async fn get_instance(
	state: Arc<ContainerState>,
	original: Arc<Definition>,
	override_fn: Option<InstantiateRef>,
	param: Param,
	context: Context,
) -> DiResult<Instance> {
	if context.would_cycle(&original.id) {
		return Err(DiError::cycle(context.chain_with(original.id.clone())));
	}

	let instantiate = match override_fn.or_else(|| original.instantiate.clone()) {
		Some(instantiate) => instantiate,
		None => return Err(DiError::InstantiationNotDefined(original.id.clone())),
	};

	let new_context = context.extended(ContextItem::new(
		original.id.clone(),
		original.cannot_cause_cycles,
	));
	let scoped = ScopedDi { state: Arc::clone(&state), context: new_context.clone() };

	// The scope resolver of a keyed singleton injects through the scoped
	// handle, so whatever it pulls in participates in cycle detection.
	let key = original.lifecycle.instance_key(scoped.clone(), param.clone()).await?;

	let cache = state.registry.instance_cache(&original.id);
	if key != InstanceKey::NonStored {
		let cached = cache
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(&key)
			.cloned();
		if let Some(existing) = cached {
			return Ok(existing);
		}
	}

	let instantiate = if original.decorable {
		let decorators =
			instantiation_decorators_for(&state, &original, new_context.clone()).await?;
		decorators
			.into_iter()
			.fold(instantiate, |next, decorator| decorator.wrap(next))
	} else {
		instantiate
	};

	let instance = instantiate(scoped, param).settle().await?;

	if key == InstanceKey::NonStored {
		return Ok(instance);
	}

	// Concurrent resolutions of the same key may both reach here; the first
	// stored instance wins so identity stays stable.
	let mut cache = cache.write().unwrap_or_else(PoisonError::into_inner);
	Ok(Arc::clone(cache.entry(key).or_insert(instance)))
}
