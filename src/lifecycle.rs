//! Lifecycles decide whether and under which key an instance is cached.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::DiResult;
use crate::injectable::Param;
use crate::scoped::ScopedDi;

/// Cache slot computed by a lifecycle for one resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstanceKey {
	/// One instance per container.
	Shared,
	/// Never cached. A fresh instance is built on every injection.
	NonStored,
	/// One instance per scope key.
	Keyed(ScopeKey),
}

/// Hashable key produced by a keyed-singleton scope resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
	Str(Arc<str>),
	Int(i64),
	Bool(bool),
}

impl From<&str> for ScopeKey {
	fn from(value: &str) -> Self {
		Self::Str(value.into())
	}
}

impl From<String> for ScopeKey {
	fn from(value: String) -> Self {
		Self::Str(value.into())
	}
}

impl From<i64> for ScopeKey {
	fn from(value: i64) -> Self {
		Self::Int(value)
	}
}

impl From<bool> for ScopeKey {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

impl fmt::Display for ScopeKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Str(value) => write!(f, "{value}"),
			Self::Int(value) => write!(f, "{value}"),
			Self::Bool(value) => write!(f, "{value}"),
		}
	}
}

type ScopeResolverFn =
	dyn Fn(ScopedDi, Param) -> BoxFuture<'static, DiResult<ScopeKey>> + Send + Sync;

/// Caching policy of an injectable.
///
/// The scope resolver of [`Lifecycle::KeyedSingleton`] runs through the same
/// resolution machinery as build functions, so anything it injects takes part
/// in cycle detection.
#[derive(Clone, Default)]
pub enum Lifecycle {
	/// One cached instance per container. The default.
	#[default]
	Singleton,
	/// A fresh instance on every injection, never cached, never purgeable.
	Transient,
	/// One cached instance per key computed by the scope resolver.
	KeyedSingleton(Arc<ScopeResolverFn>),
}

impl Lifecycle {
	/// A keyed-singleton lifecycle whose key is computed by `resolve_scope`.
	pub fn keyed_singleton<F, Fut, K>(resolve_scope: F) -> Self
	where
		F: Fn(ScopedDi) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = DiResult<K>> + Send + 'static,
		K: Into<ScopeKey>,
	{
		let resolve_scope = Arc::new(resolve_scope);
		Self::KeyedSingleton(Arc::new(move |di, _param| {
			let resolve_scope = Arc::clone(&resolve_scope);
			Box::pin(async move { resolve_scope(di).await.map(Into::into) })
		}))
	}

	/// Like [`Lifecycle::keyed_singleton`], but the resolver also receives the
	/// instantiation parameter of the injection.
	pub fn keyed_singleton_with_param<F, Fut, K>(resolve_scope: F) -> Self
	where
		F: Fn(ScopedDi, Param) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = DiResult<K>> + Send + 'static,
		K: Into<ScopeKey>,
	{
		let resolve_scope = Arc::new(resolve_scope);
		Self::KeyedSingleton(Arc::new(move |di, param| {
			let resolve_scope = Arc::clone(&resolve_scope);
			Box::pin(async move { resolve_scope(di, param).await.map(Into::into) })
		}))
	}

	pub(crate) async fn instance_key(&self, di: ScopedDi, param: Param) -> DiResult<InstanceKey> {
		match self {
			Self::Singleton => Ok(InstanceKey::Shared),
			Self::Transient => Ok(InstanceKey::NonStored),
			Self::KeyedSingleton(resolve_scope) => {
				resolve_scope(di, param).await.map(InstanceKey::Keyed)
			}
		}
	}

	pub(crate) fn is_transient(&self) -> bool {
		matches!(self, Self::Transient)
	}
}

impl fmt::Debug for Lifecycle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Singleton => f.write_str("Singleton"),
			Self::Transient => f.write_str("Transient"),
			Self::KeyedSingleton(_) => f.write_str("KeyedSingleton"),
		}
	}
}
