//! Runtime dependency injection.
//!
//! `ampoule` wires an application together at runtime: injectables are
//! registered into a [`Container`], injected by alias, cached according to
//! their [`Lifecycle`], and can be overridden, decorated, and set up before
//! the container becomes ready.
//!
//! # Overview
//!
//! - [`Injectable`] describes one buildable thing: an id, a build function,
//!   a lifecycle, and flags.
//! - [`InjectionToken`] groups implementations; [`Container::inject_many`]
//!   fans out to all of them.
//! - [`Container::override_with`] substitutes build functions for tests;
//!   [`Container::run_setups`] runs one-time setup hooks in dependency order.
//! - Cycles in the graph are detected per resolution chain and reported with
//!   the full path, e.g. `Cycle of injectables encountered: "a" -> "b" -> "a"`.
//!
//! # Examples
//!
//! ```
//! use ampoule::{Container, Injectable, Lifecycle};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ampoule::DiResult<()> {
//! struct Logger {
//! 	prefix: String,
//! }
//!
//! struct Service {
//! 	logger: std::sync::Arc<Logger>,
//! }
//!
//! let logger: Injectable<Logger> = Injectable::new("logger")
//! 	.instantiate(|_di| Ok(Logger { prefix: "app".to_owned() }))
//! 	.build();
//!
//! let service: Injectable<Service> = {
//! 	let logger = logger.clone();
//! 	Injectable::new("service")
//! 		.instantiate_async(move |di| {
//! 			let logger = logger.clone();
//! 			async move { Ok(Service { logger: di.inject(&logger).await? }) }
//! 		})
//! 		.lifecycle(Lifecycle::Singleton)
//! 		.build()
//! };
//!
//! let di = Container::new("app");
//! di.register(&logger)?;
//! di.register(&service)?;
//!
//! let service = di.inject(&service).await?;
//! assert_eq!(service.logger.prefix, "app");
//! # Ok(())
//! # }
//! ```

mod container;
mod context;
mod decorator;
mod error;
mod injectable;
mod instantiate;
mod lifecycle;
mod registry;
mod scoped;
mod setup;

pub use container::Container;
pub use context::Context;
pub use decorator::{
	InjectFn, InjectionDecorator, InstantiationDecorator, injection_decorator_token,
	instantiation_decorator_token,
};
pub use error::{DiError, DiResult};
pub use injectable::{
	Alias, AliasRef, Injectable, InjectableBuilder, InjectionToken, Instance, Instantiation,
	InstantiateRef, Param,
};
pub use lifecycle::{InstanceKey, Lifecycle, ScopeKey};
pub use scoped::ScopedDi;
pub use setup::SetupDi;
