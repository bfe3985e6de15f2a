//! Injectable definitions, injection tokens, and the alias abstraction.
//!
//! An [`Injectable`] is an inert description: an id, an optional build
//! function, a lifecycle, and a handful of flags. Nothing happens until it is
//! registered with a [`Container`](crate::Container) and injected. Instances
//! are stored type-erased (`Arc<dyn Any + Send + Sync>`) and downcast back to
//! the concrete type at the typed API boundary.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::context::ContextItem;
use crate::error::{DiError, DiResult};
use crate::lifecycle::Lifecycle;
use crate::scoped::ScopedDi;
use crate::setup::SetupDi;

/// A type-erased instance held by the container.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// A type-erased instantiation parameter.
pub type Param = Option<Arc<dyn Any + Send + Sync>>;

/// Result of invoking a build function: either settled synchronously or a
/// future still to be awaited.
pub enum Instantiation {
	Ready(DiResult<Instance>),
	Pending(BoxFuture<'static, DiResult<Instance>>),
}

impl Instantiation {
	/// Awaits the pending case; instantiation decorators use this to observe
	/// the instance built by the function they wrap.
	pub async fn settle(self) -> DiResult<Instance> {
		match self {
			Self::Ready(result) => result,
			Self::Pending(future) => future.await,
		}
	}
}

/// An erased build function, as stored in a definition and as seen by
/// instantiation decorators.
pub type InstantiateRef = Arc<dyn Fn(ScopedDi, Param) -> Instantiation + Send + Sync>;

pub(crate) type SetupRef = Arc<dyn Fn(SetupDi) -> BoxFuture<'static, DiResult<()>> + Send + Sync>;

/// Downcasts an erased instance back to `T`.
pub(crate) fn downcast_instance<T: Any + Send + Sync>(
	instance: Instance,
	id: &Arc<str>,
) -> DiResult<Arc<T>> {
	instance.downcast::<T>().map_err(|_| DiError::type_mismatch::<T>(id.clone()))
}

fn downcast_param<P: Any + Send + Sync>(param: Param, id: &Arc<str>) -> DiResult<Arc<P>> {
	param
		.ok_or_else(|| DiError::type_mismatch::<P>(id.clone()))?
		.downcast::<P>()
		.map_err(|_| DiError::type_mismatch::<P>(id.clone()))
}

/// Identity and flags of an injection token, shared by every typed handle
/// cloned from it.
#[derive(Debug)]
pub(crate) struct TokenDescriptor {
	pub(crate) id: Arc<str>,
	pub(crate) decorable: bool,
	pub(crate) cannot_cause_cycles: bool,
}

/// The erased form of a registered injectable.
pub(crate) struct Definition {
	pub(crate) id: Arc<str>,
	pub(crate) instantiate: Option<InstantiateRef>,
	pub(crate) lifecycle: Lifecycle,
	pub(crate) token: Option<Arc<TokenDescriptor>>,
	pub(crate) causes_side_effects: bool,
	pub(crate) decorable: bool,
	pub(crate) cannot_cause_cycles: bool,
	pub(crate) ad_hoc: bool,
	pub(crate) setup: Option<SetupRef>,
}

#[derive(Clone)]
enum AliasKind {
	Definition(Arc<Definition>),
	Token(Arc<TokenDescriptor>),
}

/// An erased reference to something injectable: a definition or a token.
///
/// This is what the resolution engine and decorators work with. Obtain one
/// through [`Alias::alias_ref`].
#[derive(Clone)]
pub struct AliasRef {
	kind: AliasKind,
}

impl AliasRef {
	pub(crate) fn from_definition(definition: Arc<Definition>) -> Self {
		Self { kind: AliasKind::Definition(definition) }
	}

	pub(crate) fn from_token(descriptor: Arc<TokenDescriptor>) -> Self {
		Self { kind: AliasKind::Token(descriptor) }
	}

	/// The id of the referenced injectable or token.
	pub fn id(&self) -> &Arc<str> {
		match &self.kind {
			AliasKind::Definition(definition) => &definition.id,
			AliasKind::Token(descriptor) => &descriptor.id,
		}
	}

	pub(crate) fn decorable(&self) -> bool {
		match &self.kind {
			AliasKind::Definition(definition) => definition.decorable,
			AliasKind::Token(descriptor) => descriptor.decorable,
		}
	}

	pub(crate) fn cannot_cause_cycles(&self) -> bool {
		match &self.kind {
			AliasKind::Definition(definition) => definition.cannot_cause_cycles,
			AliasKind::Token(descriptor) => descriptor.cannot_cause_cycles,
		}
	}

	/// Id of the token the referenced injectable belongs to, if any.
	pub(crate) fn token_id(&self) -> Option<&Arc<str>> {
		match &self.kind {
			AliasKind::Definition(definition) => definition.token.as_ref().map(|t| &t.id),
			AliasKind::Token(_) => None,
		}
	}

	pub(crate) fn is_token(&self) -> bool {
		matches!(self.kind, AliasKind::Token(_))
	}

	/// The definition to auto-register when the alias is ad-hoc and missing.
	pub(crate) fn ad_hoc_definition(&self) -> Option<Arc<Definition>> {
		match &self.kind {
			AliasKind::Definition(definition) if definition.ad_hoc => Some(Arc::clone(definition)),
			_ => None,
		}
	}

	pub(crate) fn context_item(&self) -> ContextItem {
		ContextItem::new(self.id().clone(), self.cannot_cause_cycles())
	}

	/// True when this alias refers to `target` either directly by id or
	/// through the token the alias belongs to.
	pub(crate) fn is_related_to(&self, target: &AliasRef) -> bool {
		self.id() == target.id() || self.token_id() == Some(target.id())
	}
}

/// Anything that can stand on the left-hand side of an injection: an
/// [`Injectable`] or an [`InjectionToken`], both resolving to instances of `T`.
pub trait Alias<T: ?Sized> {
	/// The erased reference used by the resolution engine.
	fn alias_ref(&self) -> AliasRef;
}

/// A typed handle to an injectable definition.
///
/// Cloning is cheap; all clones refer to the same definition.
///
/// # Examples
///
/// ```
/// use ampoule::{Container, Injectable};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ampoule::DiResult<()> {
/// let greeting: Injectable<String> = Injectable::new("greeting")
/// 	.instantiate(|_di| Ok("hello".to_owned()))
/// 	.build();
///
/// let di = Container::new("some-container");
/// di.register(&greeting)?;
///
/// assert_eq!(*di.inject(&greeting).await?, "hello");
/// # Ok(())
/// # }
/// ```
pub struct Injectable<T: ?Sized> {
	pub(crate) definition: Arc<Definition>,
	_marker: PhantomData<fn() -> T>,
}

impl<T: ?Sized> Clone for Injectable<T> {
	fn clone(&self) -> Self {
		Self { definition: Arc::clone(&self.definition), _marker: PhantomData }
	}
}

impl<T: Any + Send + Sync> Injectable<T> {
	/// Starts building an injectable with the given id.
	pub fn new(id: impl Into<Arc<str>>) -> InjectableBuilder<T> {
		InjectableBuilder {
			id: id.into(),
			instantiate: None,
			lifecycle: Lifecycle::Singleton,
			token: None,
			causes_side_effects: false,
			decorable: true,
			cannot_cause_cycles: false,
			ad_hoc: false,
			setup: None,
			_marker: PhantomData,
		}
	}

	pub fn id(&self) -> &Arc<str> {
		&self.definition.id
	}
}

impl<T: Any + Send + Sync> Alias<T> for Injectable<T> {
	fn alias_ref(&self) -> AliasRef {
		AliasRef::from_definition(Arc::clone(&self.definition))
	}
}

/// Builder for [`Injectable`]. Finish with [`build`](Self::build).
pub struct InjectableBuilder<T: ?Sized> {
	id: Arc<str>,
	instantiate: Option<InstantiateRef>,
	lifecycle: Lifecycle,
	token: Option<Arc<TokenDescriptor>>,
	causes_side_effects: bool,
	decorable: bool,
	cannot_cause_cycles: bool,
	ad_hoc: bool,
	setup: Option<SetupRef>,
	_marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> InjectableBuilder<T> {
	/// Synchronous build function. The scoped handle can be used for further
	/// injections by awaiting inside an async build function instead; here it
	/// is only useful for its non-injecting surface.
	pub fn instantiate<F>(mut self, build: F) -> Self
	where
		F: Fn(&ScopedDi) -> DiResult<T> + Send + Sync + 'static,
	{
		self.instantiate = Some(Arc::new(move |di: ScopedDi, _param: Param| {
			Instantiation::Ready(build(&di).map(|value| Arc::new(value) as Instance))
		}));
		self
	}

	/// Asynchronous build function. Transitive dependencies are injected
	/// through the scoped handle, which keeps the resolution chain intact.
	pub fn instantiate_async<F, Fut>(mut self, build: F) -> Self
	where
		F: Fn(ScopedDi) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = DiResult<T>> + Send + 'static,
	{
		self.instantiate = Some(Arc::new(move |di: ScopedDi, _param: Param| {
			let future = build(di);
			Instantiation::Pending(Box::pin(async move {
				future.await.map(|value| Arc::new(value) as Instance)
			}))
		}));
		self
	}

	/// Synchronous build function receiving the instantiation parameter of
	/// type `P`. Injecting without a parameter of that type fails with
	/// [`DiError::TypeMismatch`].
	pub fn instantiate_with<P, F>(mut self, build: F) -> Self
	where
		P: Any + Send + Sync,
		F: Fn(&ScopedDi, Arc<P>) -> DiResult<T> + Send + Sync + 'static,
	{
		let id = self.id.clone();
		self.instantiate = Some(Arc::new(move |di: ScopedDi, param: Param| {
			Instantiation::Ready(
				downcast_param::<P>(param, &id)
					.and_then(|param| build(&di, param))
					.map(|value| Arc::new(value) as Instance),
			)
		}));
		self
	}

	/// Asynchronous build function receiving the instantiation parameter.
	pub fn instantiate_with_async<P, F, Fut>(mut self, build: F) -> Self
	where
		P: Any + Send + Sync,
		F: Fn(ScopedDi, Arc<P>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = DiResult<T>> + Send + 'static,
	{
		let id = self.id.clone();
		let build = Arc::new(build);
		self.instantiate = Some(Arc::new(move |di: ScopedDi, param: Param| {
			let id = id.clone();
			let build = Arc::clone(&build);
			Instantiation::Pending(Box::pin(async move {
				let param = downcast_param::<P>(param, &id)?;
				build(di, param).await.map(|value| Arc::new(value) as Instance)
			}))
		}));
		self
	}

	pub fn lifecycle(mut self, lifecycle: Lifecycle) -> Self {
		self.lifecycle = lifecycle;
		self
	}

	/// Makes the injectable an implementation of `token`, discoverable via
	/// [`inject_many`](crate::Container::inject_many).
	pub fn injection_token(mut self, token: &InjectionToken<T>) -> Self {
		self.token = Some(Arc::clone(&token.descriptor));
		self
	}

	/// Marks the injectable as side-effectful. It refuses to inject while the
	/// container has side-effects prevented.
	pub fn causes_side_effects(mut self) -> Self {
		self.causes_side_effects = true;
		self
	}

	/// Excludes the injectable from the decorator pipeline.
	pub fn not_decorable(mut self) -> Self {
		self.decorable = false;
		self
	}

	/// Exempts the injectable from cycle detection. For infrastructure that
	/// legitimately re-enters itself.
	pub fn cannot_cause_cycles(mut self) -> Self {
		self.cannot_cause_cycles = true;
		self
	}

	/// Permits on-the-fly registration: injecting the unregistered injectable
	/// registers it instead of failing.
	pub fn ad_hoc(mut self) -> Self {
		self.ad_hoc = true;
		self
	}

	/// Attaches a setup hook, run once by
	/// [`run_setups`](crate::Container::run_setups) before the container
	/// becomes ready.
	pub fn setup<F, Fut>(mut self, setup: F) -> Self
	where
		F: Fn(SetupDi) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = DiResult<()>> + Send + 'static,
	{
		self.setup = Some(Arc::new(move |di: SetupDi| Box::pin(setup(di))));
		self
	}

	pub fn build(self) -> Injectable<T> {
		Injectable {
			definition: Arc::new(Definition {
				id: self.id,
				instantiate: self.instantiate,
				lifecycle: self.lifecycle,
				token: self.token,
				causes_side_effects: self.causes_side_effects,
				decorable: self.decorable,
				cannot_cause_cycles: self.cannot_cause_cycles,
				ad_hoc: self.ad_hoc,
				setup: self.setup,
			}),
			_marker: PhantomData,
		}
	}
}

/// A typed grouping token. Injectables naming it via
/// [`injection_token`](InjectableBuilder::injection_token) become its
/// implementations.
///
/// Injecting the token itself demands exactly one implementation;
/// [`inject_many`](crate::Container::inject_many) fans out to all of them in
/// registration order.
pub struct InjectionToken<T: ?Sized> {
	pub(crate) descriptor: Arc<TokenDescriptor>,
	_marker: PhantomData<fn() -> T>,
}

impl<T: ?Sized> Clone for InjectionToken<T> {
	fn clone(&self) -> Self {
		Self { descriptor: Arc::clone(&self.descriptor), _marker: PhantomData }
	}
}

impl<T: Any + Send + Sync> InjectionToken<T> {
	pub fn new(id: impl Into<Arc<str>>) -> Self {
		Self {
			descriptor: Arc::new(TokenDescriptor {
				id: id.into(),
				decorable: true,
				cannot_cause_cycles: false,
			}),
			_marker: PhantomData,
		}
	}

	pub(crate) fn from_descriptor(descriptor: Arc<TokenDescriptor>) -> Self {
		Self { descriptor, _marker: PhantomData }
	}

	pub fn id(&self) -> &Arc<str> {
		&self.descriptor.id
	}
}

impl<T: Any + Send + Sync> Alias<T> for InjectionToken<T> {
	fn alias_ref(&self) -> AliasRef {
		AliasRef::from_token(Arc::clone(&self.descriptor))
	}
}
