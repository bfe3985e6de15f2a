//! The decorator pipeline.
//!
//! Decorators are plain injectables registered under one of two well-known
//! tokens. An [`InjectionDecorator`] wraps the resolution of an alias; an
//! [`InstantiationDecorator`] wraps the build function of an injectable.
//! Both are discovered with a non-decorated fan-out over their token, folded
//! left to right so the first registered decorator sits innermost, and can be
//! narrowed to a single alias or token with a target.

use std::sync::{Arc, LazyLock};

use futures::future::BoxFuture;

use crate::container::ContainerState;
use crate::context::Context;
use crate::error::DiResult;
use crate::injectable::{
	Alias, AliasRef, Definition, Instance, InstantiateRef, InjectionToken, Param, TokenDescriptor,
	downcast_instance,
};
use crate::instantiate::inject_many_erased;

/// The erased single-injection function an [`InjectionDecorator`] wraps.
pub type InjectFn =
	Arc<dyn Fn(AliasRef, Param, Context) -> BoxFuture<'static, DiResult<Instance>> + Send + Sync>;

static INJECTION_DECORATOR_TOKEN: LazyLock<Arc<TokenDescriptor>> = LazyLock::new(|| {
	Arc::new(TokenDescriptor {
		id: "injection-decorator-token".into(),
		decorable: false,
		cannot_cause_cycles: true,
	})
});

static INSTANTIATION_DECORATOR_TOKEN: LazyLock<Arc<TokenDescriptor>> = LazyLock::new(|| {
	Arc::new(TokenDescriptor {
		id: "instantiation-decorator-token".into(),
		decorable: false,
		cannot_cause_cycles: true,
	})
});

/// The token injection decorators register under.
///
/// Injectables implementing it should be built with
/// [`not_decorable`](crate::InjectableBuilder::not_decorable), otherwise the
/// decorator decorates its own discovery and resolution fails with a cycle.
pub fn injection_decorator_token() -> InjectionToken<InjectionDecorator> {
	InjectionToken::from_descriptor(Arc::clone(&INJECTION_DECORATOR_TOKEN))
}

/// The token instantiation decorators register under.
pub fn instantiation_decorator_token() -> InjectionToken<InstantiationDecorator> {
	InjectionToken::from_descriptor(Arc::clone(&INSTANTIATION_DECORATOR_TOKEN))
}

/// Wraps the resolution of aliases: sees the alias, the parameter, and the
/// chain, and decides what to pass down and what to return up.
pub struct InjectionDecorator {
	target: Option<AliasRef>,
	decorate: Arc<dyn Fn(InjectFn) -> InjectFn + Send + Sync>,
}

impl InjectionDecorator {
	/// A decorator applied to every decorable alias.
	pub fn new(decorate: impl Fn(InjectFn) -> InjectFn + Send + Sync + 'static) -> Self {
		Self { target: None, decorate: Arc::new(decorate) }
	}

	/// A decorator applied only to `target` and, when `target` is a token, to
	/// its implementations.
	pub fn targeting<T>(
		target: &impl Alias<T>,
		decorate: impl Fn(InjectFn) -> InjectFn + Send + Sync + 'static,
	) -> Self {
		Self { target: Some(target.alias_ref()), decorate: Arc::new(decorate) }
	}

	pub(crate) fn applies_to(&self, alias: &AliasRef) -> bool {
		match &self.target {
			None => true,
			Some(target) => alias.is_related_to(target),
		}
	}

	pub(crate) fn wrap(&self, next: InjectFn) -> InjectFn {
		(self.decorate)(next)
	}
}

/// Wraps the build function of injectables: sees the scoped handle and the
/// parameter, and can adjust either the inputs or the built instance.
pub struct InstantiationDecorator {
	target: Option<AliasRef>,
	decorate: Arc<dyn Fn(InstantiateRef) -> InstantiateRef + Send + Sync>,
}

impl InstantiationDecorator {
	/// A decorator applied to every decorable injectable.
	pub fn new(decorate: impl Fn(InstantiateRef) -> InstantiateRef + Send + Sync + 'static) -> Self {
		Self { target: None, decorate: Arc::new(decorate) }
	}

	/// A decorator applied only to `target` and, when `target` is a token, to
	/// its implementations.
	pub fn targeting<T>(
		target: &impl Alias<T>,
		decorate: impl Fn(InstantiateRef) -> InstantiateRef + Send + Sync + 'static,
	) -> Self {
		Self { target: Some(target.alias_ref()), decorate: Arc::new(decorate) }
	}

	fn applies_to(&self, definition: &Definition) -> bool {
		match &self.target {
			None => true,
			Some(target) => {
				&definition.id == target.id()
					|| definition.token.as_ref().map(|token| &token.id) == Some(target.id())
			}
		}
	}

	pub(crate) fn wrap(&self, next: InstantiateRef) -> InstantiateRef {
		(self.decorate)(next)
	}
}

pub(crate) async fn injection_decorators_for(
	state: &Arc<ContainerState>,
	alias: &AliasRef,
	context: Context,
) -> DiResult<Vec<Arc<InjectionDecorator>>> {
	let token = AliasRef::from_token(Arc::clone(&INJECTION_DECORATOR_TOKEN));
	let instances = inject_many_erased(Arc::clone(state), token, None, context).await?;

	let mut decorators = Vec::new();
	for instance in instances {
		let decorator =
			downcast_instance::<InjectionDecorator>(instance, &INJECTION_DECORATOR_TOKEN.id)?;
		if decorator.applies_to(alias) {
			decorators.push(decorator);
		}
	}
	Ok(decorators)
}

pub(crate) async fn instantiation_decorators_for(
	state: &Arc<ContainerState>,
	definition: &Definition,
	context: Context,
) -> DiResult<Vec<Arc<InstantiationDecorator>>> {
	let token = AliasRef::from_token(Arc::clone(&INSTANTIATION_DECORATOR_TOKEN));
	let instances = inject_many_erased(Arc::clone(state), token, None, context).await?;

	let mut decorators = Vec::new();
	for instance in instances {
		let decorator = downcast_instance::<InstantiationDecorator>(
			instance,
			&INSTANTIATION_DECORATOR_TOKEN.id,
		)?;
		if decorator.applies_to(definition) {
			decorators.push(decorator);
		}
	}
	Ok(decorators)
}
