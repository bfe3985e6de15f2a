//! The container: registration surface, typed injection API, overrides, and
//! the setup pass entry point.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;

use crate::context::Context;
use crate::decorator::{InjectFn, InjectionDecorator, injection_decorator_token};
use crate::error::{DiError, DiResult};
use crate::injectable::{
	Alias, AliasRef, Definition, Injectable, Instance, Instantiation, downcast_instance,
};
use crate::instantiate::{inject_erased, inject_many_erased};
use crate::lifecycle::Lifecycle;
use crate::registry::Registry;
use crate::scoped::ScopedDi;
use crate::setup::{SetupPass, run_setup_hook};

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
	Building,
	SettingUp,
	Ready,
}

const PHASE_BUILDING: u8 = 0;
const PHASE_SETTING_UP: u8 = 1;
const PHASE_READY: u8 = 2;

pub(crate) struct ContainerState {
	pub(crate) id: Arc<str>,
	pub(crate) registry: Registry,
	pub(crate) side_effects_prevented: AtomicBool,
	phase: AtomicU8,
	decorator_seq: AtomicU64,
}

impl ContainerState {
	pub(crate) fn phase(&self) -> Phase {
		match self.phase.load(Ordering::SeqCst) {
			PHASE_BUILDING => Phase::Building,
			PHASE_SETTING_UP => Phase::SettingUp,
			_ => Phase::Ready,
		}
	}

	fn try_begin_setup(&self) -> bool {
		self.phase
			.compare_exchange(
				PHASE_BUILDING,
				PHASE_SETTING_UP,
				Ordering::SeqCst,
				Ordering::SeqCst,
			)
			.is_ok()
	}

	fn finish_setup(&self) {
		self.phase.store(PHASE_READY, Ordering::SeqCst);
	}
}

/// A runtime dependency-injection container.
///
/// Cloning is cheap and every clone shares the same state, so a container can
/// be handed freely across tasks.
///
/// # Examples
///
/// ```
/// use ampoule::{Container, Injectable};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ampoule::DiResult<()> {
/// struct Config {
/// 	retries: u32,
/// }
///
/// let config: Injectable<Config> = Injectable::new("config")
/// 	.instantiate(|_di| Ok(Config { retries: 3 }))
/// 	.build();
///
/// let di = Container::new("app");
/// di.register(&config)?;
/// di.run_setups().await?;
///
/// assert_eq!(di.inject(&config).await?.retries, 3);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Container {
	state: Arc<ContainerState>,
}

impl Container {
	pub fn new(id: impl Into<Arc<str>>) -> Self {
		Self {
			state: Arc::new(ContainerState {
				id: id.into(),
				registry: Registry::default(),
				side_effects_prevented: AtomicBool::new(false),
				phase: AtomicU8::new(PHASE_BUILDING),
				decorator_seq: AtomicU64::new(0),
			}),
		}
	}

	pub fn id(&self) -> &Arc<str> {
		&self.state.id
	}

	/// Registers an injectable. Fails on an empty or duplicate id.
	pub fn register<T: Any + Send + Sync>(&self, injectable: &Injectable<T>) -> DiResult<()> {
		self.state.registry.register(Arc::clone(&injectable.definition), None)
	}

	/// Removes an injectable, its cached instances, its override, and every
	/// injectable it registered from inside its build function.
	pub fn deregister<T: Any + Send + Sync>(&self, injectable: &Injectable<T>) -> DiResult<()> {
		self.state.registry.deregister(injectable.id())
	}

	/// Injects a single instance for `alias`.
	pub async fn inject<T, A>(&self, alias: &A) -> DiResult<Arc<T>>
	where
		T: Any + Send + Sync,
		A: Alias<T>,
	{
		let alias = alias.alias_ref();
		let id = alias.id().clone();
		let context = Context::root(self.state.id.clone());
		let instance = inject_erased(Arc::clone(&self.state), alias, None, context).await?;
		downcast_instance::<T>(instance, &id)
	}

	/// Injects a single instance, passing `param` to the build function and
	/// the scope resolver.
	pub async fn inject_with<T, A, P>(&self, alias: &A, param: P) -> DiResult<Arc<T>>
	where
		T: Any + Send + Sync,
		A: Alias<T>,
		P: Any + Send + Sync,
	{
		let alias = alias.alias_ref();
		let id = alias.id().clone();
		let context = Context::root(self.state.id.clone());
		let instance =
			inject_erased(Arc::clone(&self.state), alias, Some(Arc::new(param)), context).await?;
		downcast_instance::<T>(instance, &id)
	}

	/// Injects every implementation of `alias`, in registration order. An
	/// alias with no implementations yields an empty vector.
	pub async fn inject_many<T, A>(&self, alias: &A) -> DiResult<Vec<Arc<T>>>
	where
		T: Any + Send + Sync,
		A: Alias<T>,
	{
		let alias = alias.alias_ref();
		let id = alias.id().clone();
		let context = Context::root(self.state.id.clone());
		let instances =
			inject_many_erased(Arc::clone(&self.state), alias, None, context).await?;
		instances
			.into_iter()
			.map(|instance| downcast_instance::<T>(instance, &id))
			.collect()
	}

	/// [`inject_many`](Self::inject_many) with an instantiation parameter
	/// passed to every implementation.
	pub async fn inject_many_with<T, A, P>(&self, alias: &A, param: P) -> DiResult<Vec<Arc<T>>>
	where
		T: Any + Send + Sync,
		A: Alias<T>,
		P: Any + Send + Sync,
	{
		let alias = alias.alias_ref();
		let id = alias.id().clone();
		let context = Context::root(self.state.id.clone());
		let instances = inject_many_erased(
			Arc::clone(&self.state),
			alias,
			Some(Arc::new(param)),
			context,
		)
		.await?;
		instances
			.into_iter()
			.map(|instance| downcast_instance::<T>(instance, &id))
			.collect()
	}

	/// Substitutes the build function of the injectable `alias` resolves to.
	///
	/// The substitute inherits the original's lifecycle and cache slot and is
	/// never treated as side-effectful. Overriding an injectable that already
	/// produced an instance fails with [`DiError::AlreadyInjected`].
	pub fn override_with<T, A, F>(&self, alias: &A, build: F) -> DiResult<()>
	where
		T: Any + Send + Sync,
		A: Alias<T>,
		F: Fn(&ScopedDi) -> DiResult<T> + Send + Sync + 'static,
	{
		self.set_override(
			&alias.alias_ref(),
			Arc::new(move |di, _param| {
				Instantiation::Ready(build(&di).map(|value| Arc::new(value) as Instance))
			}),
		)
	}

	/// Like [`override_with`](Self::override_with) with an async substitute.
	pub fn override_with_async<T, A, F, Fut>(&self, alias: &A, build: F) -> DiResult<()>
	where
		T: Any + Send + Sync,
		A: Alias<T>,
		F: Fn(ScopedDi) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = DiResult<T>> + Send + 'static,
	{
		self.set_override(
			&alias.alias_ref(),
			Arc::new(move |di, _param| {
				let future = build(di);
				Instantiation::Pending(Box::pin(async move {
					future.await.map(|value| Arc::new(value) as Instance)
				}))
			}),
		)
	}

	/// Removes the override of `alias`, restoring the registered behaviour.
	/// A missing override is not an error.
	pub fn unoverride<T, A>(&self, alias: &A)
	where
		T: Any + Send + Sync,
		A: Alias<T>,
	{
		let alias = alias.alias_ref();
		let related = self.state.registry.related(&alias);
		let id = match related.as_slice() {
			[single] => single.id.clone(),
			_ => alias.id().clone(),
		};
		self.state.registry.remove_override(&id);
	}

	/// Removes every override at once.
	pub fn reset(&self) {
		self.state.registry.clear_overrides();
	}

	/// Drops the cached instances of `alias` so the next injection rebuilds.
	/// Transient injectables cache nothing and cannot be purged.
	pub fn purge<T, A>(&self, alias: &A) -> DiResult<()>
	where
		T: Any + Send + Sync,
		A: Alias<T>,
	{
		let alias = alias.alias_ref();
		let definition = self.resolve_single(&alias, "purge")?;
		if definition.lifecycle.is_transient() {
			return Err(DiError::PurgeNotAllowed(definition.id.clone()));
		}
		self.state.registry.purge(&definition.id);
		Ok(())
	}

	/// Blocks injection of side-effectful injectables until individually
	/// permitted. Meant for tests that want pure wiring.
	pub fn prevent_side_effects(&self) {
		self.state.side_effects_prevented.store(true, Ordering::SeqCst);
	}

	/// Clears the side-effect flag of the injectable `alias` resolves to.
	pub fn permit_side_effects<T, A>(&self, alias: &A) -> DiResult<()>
	where
		T: Any + Send + Sync,
		A: Alias<T>,
	{
		let alias = alias.alias_ref();
		let definition = self.resolve_single(&alias, "permit side-effects for")?;
		self.state.registry.permit_side_effects(&definition.id);
		Ok(())
	}

	/// Runs every setup hook once and moves the container to its ready state.
	/// Calling again after a completed pass is a no-op; calling again after a
	/// failed or still-running pass is an error.
	pub async fn run_setups(&self) -> DiResult<()> {
		if !self.state.try_begin_setup() {
			return match self.state.phase() {
				Phase::Ready => Ok(()),
				_ => Err(DiError::SetupIncomplete),
			};
		}

		let setuppables = self.state.registry.setuppables();
		tracing::debug!(count = setuppables.len(), "running setup pass");

		let pass = Arc::new(SetupPass::new(&setuppables));
		for definition in setuppables {
			run_setup_hook(Arc::clone(&self.state), Arc::clone(&pass), definition).await?;
		}

		self.state.finish_setup();
		Ok(())
	}

	/// Registers an ad-hoc injection decorator around `alias`.
	pub fn decorate<T, A>(
		&self,
		alias: &A,
		decorate: impl Fn(InjectFn) -> InjectFn + Send + Sync + 'static,
	) -> DiResult<()>
	where
		T: Any + Send + Sync,
		A: Alias<T>,
	{
		let target = alias.alias_ref();
		let n = self.state.decorator_seq.fetch_add(1, Ordering::Relaxed);
		let id: Arc<str> = format!("{}-decorator-{n}", target.id()).into();

		let decorator = Arc::new(InjectionDecorator::targeting(alias, decorate));
		let definition = Arc::new(Definition {
			id,
			instantiate: Some(Arc::new(move |_di, _param| {
				Instantiation::Ready(Ok(Arc::clone(&decorator) as Instance))
			})),
			lifecycle: Lifecycle::Singleton,
			token: Some(Arc::clone(&injection_decorator_token().descriptor)),
			causes_side_effects: false,
			decorable: false,
			cannot_cause_cycles: true,
			ad_hoc: false,
			setup: None,
		});
		self.state.registry.register(definition, None)
	}

	/// Registers an ad-hoc decorator that maps the injected instance of
	/// `alias` through `map`.
	pub fn decorate_result<T, A>(
		&self,
		alias: &A,
		map: impl Fn(Arc<T>) -> Arc<T> + Send + Sync + 'static,
	) -> DiResult<()>
	where
		T: Any + Send + Sync,
		A: Alias<T>,
	{
		let map = Arc::new(map);
		self.decorate(alias, move |next: InjectFn| -> InjectFn {
			let map = Arc::clone(&map);
			Arc::new(move |alias, param, context| {
				let next = Arc::clone(&next);
				let map = Arc::clone(&map);
				Box::pin(async move {
					let id = alias.id().clone();
					let instance = next(alias, param, context).await?;
					let typed = downcast_instance::<T>(instance, &id)?;
					Ok(map(typed) as Instance)
				})
			})
		})
	}

	fn resolve_single(&self, alias: &AliasRef, operation: &'static str) -> DiResult<Arc<Definition>> {
		let mut related = self.state.registry.related(alias);
		match related.len() {
			1 => Ok(related.remove(0)),
			0 => Err(DiError::not_registered(operation, format!("\"{}\"", alias.id()))),
			_ => Err(DiError::too_many_matches(
				alias.id().clone(),
				related.iter().map(|definition| definition.id.clone()),
			)),
		}
	}

	fn set_override(&self, alias: &AliasRef, instantiate: crate::injectable::InstantiateRef) -> DiResult<()> {
		let related = self.state.registry.related(alias);
		let original = if alias.is_token() {
			match related.as_slice() {
				[] => return Err(DiError::token_without_implementations(alias.id().clone())),
				[single] => Arc::clone(single),
				_ => {
					return Err(DiError::token_with_multiple_implementations(
						alias.id().clone(),
						related.iter().map(|definition| definition.id.clone()),
					));
				}
			}
		} else {
			match related.first() {
				Some(definition) => Arc::clone(definition),
				None => {
					return Err(DiError::not_registered(
						"override",
						format!("\"{}\"", alias.id()),
					));
				}
			}
		};

		if self.state.registry.was_injected(&original.id) {
			return Err(DiError::AlreadyInjected(original.id.clone()));
		}

		tracing::debug!(id = %original.id, "overriding injectable");
		self.state.registry.set_override(original.id.clone(), instantiate);
		Ok(())
	}
}
