//! The scoped handle passed to build functions and scope resolvers.

use std::any::Any;
use std::sync::Arc;

use crate::container::ContainerState;
use crate::context::Context;
use crate::error::DiResult;
use crate::injectable::{Alias, Injectable, downcast_instance};
use crate::instantiate::{inject_erased, inject_many_erased};

/// A view of the container bound to the resolution chain of one injection.
///
/// Build functions must inject their dependencies through this handle rather
/// than through the container, otherwise cycle detection and chain-aware
/// error messages lose the path that led here.
#[derive(Clone)]
pub struct ScopedDi {
	pub(crate) state: Arc<ContainerState>,
	pub(crate) context: Context,
}

impl ScopedDi {
	/// Injects a single instance for `alias`, extending this handle's chain.
	pub async fn inject<T, A>(&self, alias: &A) -> DiResult<Arc<T>>
	where
		T: Any + Send + Sync,
		A: Alias<T>,
	{
		let alias = alias.alias_ref();
		let id = alias.id().clone();
		let instance =
			inject_erased(Arc::clone(&self.state), alias, None, self.context.clone()).await?;
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
		let instance = inject_erased(
			Arc::clone(&self.state),
			alias,
			Some(Arc::new(param)),
			self.context.clone(),
		)
		.await?;
		downcast_instance::<T>(instance, &id)
	}

	/// Injects every implementation of `alias`, in registration order.
	pub async fn inject_many<T, A>(&self, alias: &A) -> DiResult<Vec<Arc<T>>>
	where
		T: Any + Send + Sync,
		A: Alias<T>,
	{
		let alias = alias.alias_ref();
		let id = alias.id().clone();
		let instances =
			inject_many_erased(Arc::clone(&self.state), alias, None, self.context.clone()).await?;
		instances
			.into_iter()
			.map(|instance| downcast_instance::<T>(instance, &id))
			.collect()
	}

	/// The resolution chain this handle is bound to.
	pub fn context(&self) -> &Context {
		&self.context
	}

	/// Registers an injectable from inside a build function. The current
	/// chain is recorded so deregistering any injectable on it also removes
	/// this one.
	pub fn register<T: Any + Send + Sync>(&self, injectable: &Injectable<T>) -> DiResult<()> {
		let chain: Vec<Arc<str>> = self.context.ids().map(Arc::from).collect();
		self.state
			.registry
			.register(Arc::clone(&injectable.definition), Some(chain))
	}

	/// Deregisters an injectable from inside a build function.
	pub fn deregister<T: Any + Send + Sync>(&self, injectable: &Injectable<T>) -> DiResult<()> {
		self.state.registry.deregister(injectable.id())
	}
}
