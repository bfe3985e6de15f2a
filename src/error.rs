//! Error types surfaced by the container.
//!
//! Every failure mode carries enough context to render the injection chain
//! that led to it, so a caller can tell *which* path through the graph broke.

use std::sync::Arc;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type DiResult<T> = Result<T, DiError>;

/// All errors the container can produce.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum DiError {
	/// An injectable was registered with an empty id.
	#[error("Tried to register injectable without ID.")]
	MissingId,

	/// Two injectables with the same id were registered in one container.
	#[error("Tried to register multiple injectables for ID \"{0}\"")]
	DuplicateId(Arc<str>),

	/// An alias resolved to nothing. The chain is the injection path from the
	/// first requested alias down to the one that was missing.
	#[error("Tried to {operation} non-registered injectable {chain}.")]
	NotRegistered {
		operation: &'static str,
		chain: String,
	},

	/// A single-result injection of a token matched more than one injectable.
	#[error("Tried to inject single injectable for injection token \"{token}\" but found multiple injectables: {ids}")]
	TooManyMatches { token: Arc<str>, ids: String },

	/// The dependency graph looped back on itself during instantiation.
	#[error("Cycle of injectables encountered: {chain}")]
	Cycle { chain: String },

	/// Setup hooks depend on each other in a loop.
	#[error("Cycle of setuppables encountered: {chain}")]
	SetupCycle { chain: String },

	/// A setuppable was injected before [`run_setups`](crate::Container::run_setups).
	#[error("Tried to inject setuppable \"{0}\" before setups are ran.")]
	SetupNotRun(Arc<str>),

	/// [`run_setups`](crate::Container::run_setups) was called again while an
	/// earlier pass is still running or has failed.
	#[error("Tried to run setups while an earlier setup pass has not completed.")]
	SetupIncomplete,

	/// A side-effectful injectable was injected while side-effects are prevented.
	#[error("Tried to inject {chain} when side-effects are prevented.")]
	SideEffectsPrevented { chain: String },

	/// An override was attempted after the target already produced an instance.
	#[error("Tried to override injectable \"{0}\", but it was already injected.")]
	AlreadyInjected(Arc<str>),

	/// An injection token was overridden while it had zero or several
	/// implementations, so there is no single one to substitute.
	#[error("Tried to override single implementation of injection token \"{token}\", but found {found}.")]
	AmbiguousToken { token: Arc<str>, found: String },

	/// Purge was called on a transient injectable, which never caches anything.
	#[error("Tried to purge injectable \"{0}\" with a transient lifecycle.")]
	PurgeNotAllowed(Arc<str>),

	/// An abstract injectable (no build function) was injected without an override.
	#[error("Tried to inject \"{0}\" when instantiation is not defined.")]
	InstantiationNotDefined(Arc<str>),

	/// The stored instance could not be downcast to the requested type.
	#[error("Tried to inject \"{id}\" as `{expected}` but the instance is of a different type.")]
	TypeMismatch { id: Arc<str>, expected: &'static str },
}

impl DiError {
	pub(crate) fn not_registered(operation: &'static str, chain: String) -> Self {
		Self::NotRegistered { operation, chain }
	}

	pub(crate) fn cycle(ids: impl IntoIterator<Item = Arc<str>>) -> Self {
		Self::Cycle { chain: render_chain(ids) }
	}

	pub(crate) fn setup_cycle(ids: impl IntoIterator<Item = Arc<str>>) -> Self {
		Self::SetupCycle { chain: render_chain(ids) }
	}

	pub(crate) fn too_many_matches(
		token: Arc<str>,
		ids: impl IntoIterator<Item = Arc<str>>,
	) -> Self {
		Self::TooManyMatches { token, ids: render_id_list(ids) }
	}

	pub(crate) fn token_with_multiple_implementations(
		token: Arc<str>,
		ids: impl IntoIterator<Item = Arc<str>>,
	) -> Self {
		Self::AmbiguousToken {
			token,
			found: format!("multiple registered implementations: {}", render_id_list(ids)),
		}
	}

	pub(crate) fn token_without_implementations(token: Arc<str>) -> Self {
		Self::AmbiguousToken { token, found: "no registered implementations".to_owned() }
	}

	pub(crate) fn type_mismatch<T: ?Sized>(id: Arc<str>) -> Self {
		Self::TypeMismatch { id, expected: std::any::type_name::<T>() }
	}
}

/// Renders ids as `"a" -> "b" -> "c"`.
pub(crate) fn render_chain(ids: impl IntoIterator<Item = Arc<str>>) -> String {
	ids.into_iter().map(|id| format!("\"{id}\"")).collect::<Vec<_>>().join(" -> ")
}

/// Renders ids as `"a", "b"`.
pub(crate) fn render_id_list(ids: impl IntoIterator<Item = Arc<str>>) -> String {
	ids.into_iter().map(|id| format!("\"{id}\"")).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cycle_message_quotes_every_hop() {
		let error = DiError::cycle(["a".into(), "b".into(), "a".into()]);

		assert_eq!(
			error.to_string(),
			"Cycle of injectables encountered: \"a\" -> \"b\" -> \"a\""
		);
	}

	#[test]
	fn too_many_matches_lists_all_candidates() {
		let error = DiError::too_many_matches("some-token".into(), ["a".into(), "b".into()]);

		assert_eq!(
			error.to_string(),
			"Tried to inject single injectable for injection token \"some-token\" but found multiple injectables: \"a\", \"b\""
		);
	}

	#[test]
	fn ambiguous_token_distinguishes_none_from_many() {
		let none = DiError::token_without_implementations("some-token".into());
		let many = DiError::token_with_multiple_implementations(
			"some-token".into(),
			["a".into(), "b".into()],
		);

		assert_eq!(
			none.to_string(),
			"Tried to override single implementation of injection token \"some-token\", but found no registered implementations."
		);
		assert_eq!(
			many.to_string(),
			"Tried to override single implementation of injection token \"some-token\", but found multiple registered implementations: \"a\", \"b\"."
		);
	}
}
