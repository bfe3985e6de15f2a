//! Overriding injectables with substitute build functions.

use std::sync::Arc;

use ampoule::{Container, Injectable, InjectionToken};

fn leaf(id: &str, value: &str) -> Injectable<String> {
	let value = value.to_owned();
	Injectable::new(id).instantiate(move |_di| Ok(value.clone())).build()
}

#[tokio::test]
async fn override_takes_precedence_over_the_registered_build_function() {
	let di = Container::new("some-container");
	let greeting = leaf("some-injectable", "some-instance");
	di.register(&greeting).unwrap();

	di.override_with(&greeting, |_di| Ok("some-stub".to_owned())).unwrap();

	assert_eq!(*di.inject(&greeting).await.unwrap(), "some-stub");
}

#[tokio::test]
async fn latest_override_wins() {
	let di = Container::new("some-container");
	let greeting = leaf("some-injectable", "some-instance");
	di.register(&greeting).unwrap();

	di.override_with(&greeting, |_di| Ok("some-stub".to_owned())).unwrap();
	di.override_with(&greeting, |_di| Ok("some-other-stub".to_owned())).unwrap();

	assert_eq!(*di.inject(&greeting).await.unwrap(), "some-other-stub");
}

#[tokio::test]
async fn override_can_be_asynchronous() {
	let di = Container::new("some-container");
	let greeting = leaf("some-injectable", "some-instance");
	di.register(&greeting).unwrap();

	di.override_with_async(&greeting, |_di| async move {
		tokio::task::yield_now().await;
		Ok("some-stub".to_owned())
	})
	.unwrap();

	assert_eq!(*di.inject(&greeting).await.unwrap(), "some-stub");
}

#[tokio::test]
async fn overriding_a_non_registered_injectable_fails() {
	let di = Container::new("some-container");
	let greeting = leaf("some-injectable", "irrelevant");

	let error = di.override_with(&greeting, |_di| Ok("some-stub".to_owned())).unwrap_err();

	assert_eq!(
		error.to_string(),
		"Tried to override non-registered injectable \"some-injectable\"."
	);
}

#[tokio::test]
async fn overriding_after_injection_fails() {
	let di = Container::new("some-container");
	let greeting = leaf("some-injectable", "some-instance");
	di.register(&greeting).unwrap();
	di.inject(&greeting).await.unwrap();

	let error = di.override_with(&greeting, |_di| Ok("some-stub".to_owned())).unwrap_err();

	assert_eq!(
		error.to_string(),
		"Tried to override injectable \"some-injectable\", but it was already injected."
	);
}

#[tokio::test]
async fn unoverriding_restores_the_registered_behaviour() {
	let di = Container::new("some-container");
	let greeting = leaf("some-injectable", "some-instance");
	di.register(&greeting).unwrap();
	di.override_with(&greeting, |_di| Ok("some-stub".to_owned())).unwrap();

	di.unoverride(&greeting);

	assert_eq!(*di.inject(&greeting).await.unwrap(), "some-instance");
}

#[tokio::test]
async fn reset_removes_every_override() {
	let di = Container::new("some-container");
	let first = leaf("some-injectable", "some-instance");
	let second = leaf("some-other-injectable", "some-other-instance");
	di.register(&first).unwrap();
	di.register(&second).unwrap();
	di.override_with(&first, |_di| Ok("some-stub".to_owned())).unwrap();
	di.override_with(&second, |_di| Ok("some-other-stub".to_owned())).unwrap();

	di.reset();

	assert_eq!(*di.inject(&first).await.unwrap(), "some-instance");
	assert_eq!(*di.inject(&second).await.unwrap(), "some-other-instance");
}

#[tokio::test]
async fn deregistering_drops_the_override_of_a_reregistered_injectable() {
	let di = Container::new("some-container");
	let greeting = leaf("some-injectable", "some-instance");
	di.register(&greeting).unwrap();
	di.override_with(&greeting, |_di| Ok("some-stub".to_owned())).unwrap();

	di.deregister(&greeting).unwrap();
	di.register(&greeting).unwrap();

	assert_eq!(*di.inject(&greeting).await.unwrap(), "some-instance");
}

#[tokio::test]
async fn overriding_a_token_substitutes_its_single_implementation() {
	let di = Container::new("some-container");
	let token: InjectionToken<String> = InjectionToken::new("some-token");
	let implementation: Injectable<String> = Injectable::new("some-implementation")
		.instantiate(|_di| Ok("some-instance".to_owned()))
		.injection_token(&token)
		.build();
	di.register(&implementation).unwrap();

	di.override_with(&token, |_di| Ok("some-stub".to_owned())).unwrap();

	assert_eq!(*di.inject(&token).await.unwrap(), "some-stub");
	assert_eq!(*di.inject(&implementation).await.unwrap(), "some-stub");
}

#[tokio::test]
async fn overriding_a_token_with_multiple_implementations_fails() {
	let di = Container::new("some-container");
	let token: InjectionToken<String> = InjectionToken::new("some-token");
	for (id, value) in [("some-implementation", "a"), ("some-other-implementation", "b")] {
		let implementation: Injectable<String> = {
			let value = value.to_owned();
			Injectable::new(id)
				.instantiate(move |_di| Ok(value.clone()))
				.injection_token(&token)
				.build()
		};
		di.register(&implementation).unwrap();
	}

	let error = di.override_with(&token, |_di| Ok("some-stub".to_owned())).unwrap_err();

	assert_eq!(
		error.to_string(),
		"Tried to override single implementation of injection token \"some-token\", but found multiple registered implementations: \"some-implementation\", \"some-other-implementation\"."
	);
}

#[tokio::test]
async fn overriding_a_token_without_implementations_fails() {
	let di = Container::new("some-container");
	let token: InjectionToken<String> = InjectionToken::new("some-token");

	let error = di.override_with(&token, |_di| Ok("some-stub".to_owned())).unwrap_err();

	assert_eq!(
		error.to_string(),
		"Tried to override single implementation of injection token \"some-token\", but found no registered implementations."
	);
}

#[tokio::test]
async fn override_shares_the_cache_slot_of_the_original() {
	let di = Container::new("some-container");
	let greeting = leaf("some-injectable", "some-instance");
	di.register(&greeting).unwrap();
	di.override_with(&greeting, |_di| Ok("some-stub".to_owned())).unwrap();

	let first = di.inject(&greeting).await.unwrap();
	let second = di.inject(&greeting).await.unwrap();

	assert!(Arc::ptr_eq(&first, &second));
}
