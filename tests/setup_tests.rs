//! The one-time setup pass.

use std::sync::{Arc, Mutex};

use ampoule::{Container, DiError, Injectable};

type Log = Mutex<Vec<&'static str>>;

fn log_injectable() -> Injectable<Log> {
	Injectable::new("some-log").instantiate(|_di| Ok(Mutex::new(Vec::new()))).build()
}

/// A unit injectable whose setup hook appends its id to the log.
fn setuppable(id: &'static str, log: &Injectable<Log>) -> Injectable<()> {
	let log = log.clone();
	Injectable::new(id)
		.instantiate(|_di| Ok(()))
		.setup(move |setup_di| {
			let log = log.clone();
			async move {
				setup_di.inject(&log).await?.lock().unwrap().push(id);
				Ok(())
			}
		})
		.build()
}

#[tokio::test]
async fn injecting_a_setuppable_before_the_setup_pass_fails() {
	let di = Container::new("some-container");
	let log = log_injectable();
	let some_setuppable = setuppable("some-injectable", &log);
	di.register(&log).unwrap();
	di.register(&some_setuppable).unwrap();

	let error = di.inject(&some_setuppable).await.unwrap_err();

	assert_eq!(
		error.to_string(),
		"Tried to inject setuppable \"some-injectable\" before setups are ran."
	);
}

#[tokio::test]
async fn setup_pass_runs_every_hook_once_and_unblocks_injection() {
	let di = Container::new("some-container");
	let log = log_injectable();
	let some_setuppable = setuppable("some-injectable", &log);
	di.register(&log).unwrap();
	di.register(&some_setuppable).unwrap();

	di.run_setups().await.unwrap();
	di.run_setups().await.unwrap();

	di.inject(&some_setuppable).await.unwrap();
	assert_eq!(*di.inject(&log).await.unwrap().lock().unwrap(), ["some-injectable"]);
}

#[tokio::test]
async fn hooks_run_in_registration_order_when_independent() {
	let di = Container::new("some-container");
	let log = log_injectable();
	di.register(&log).unwrap();
	di.register(&setuppable("some-injectable", &log)).unwrap();
	di.register(&setuppable("some-other-injectable", &log)).unwrap();

	di.run_setups().await.unwrap();

	assert_eq!(
		*di.inject(&log).await.unwrap().lock().unwrap(),
		["some-injectable", "some-other-injectable"]
	);
}

#[tokio::test]
async fn injected_setuppable_completes_its_hook_first() {
	let di = Container::new("some-container");
	let log = log_injectable();
	let child = setuppable("some-child-injectable", &log);
	let parent: Injectable<()> = {
		let (log, child) = (log.clone(), child.clone());
		Injectable::new("some-injectable")
			.instantiate(|_di| Ok(()))
			.setup(move |setup_di| {
				let (log, child) = (log.clone(), child.clone());
				async move {
					setup_di.inject(&child).await?;
					setup_di.inject(&log).await?.lock().unwrap().push("some-injectable");
					Ok(())
				}
			})
			.build()
	};
	// Parent registered first, yet the child it depends on is set up first.
	di.register(&log).unwrap();
	di.register(&parent).unwrap();
	di.register(&child).unwrap();

	di.run_setups().await.unwrap();

	assert_eq!(
		*di.inject(&log).await.unwrap().lock().unwrap(),
		["some-child-injectable", "some-injectable"]
	);
}

#[tokio::test]
async fn shared_setup_dependency_runs_only_once() {
	let di = Container::new("some-container");
	let log = log_injectable();
	let child = setuppable("some-child-injectable", &log);

	let branch = |id: &'static str| -> Injectable<()> {
		let child = child.clone();
		Injectable::new(id)
			.instantiate(|_di| Ok(()))
			.setup(move |setup_di| {
				let child = child.clone();
				async move {
					setup_di.inject(&child).await?;
					Ok(())
				}
			})
			.build()
	};
	di.register(&log).unwrap();
	di.register(&branch("some-injectable")).unwrap();
	di.register(&branch("some-other-injectable")).unwrap();
	di.register(&child).unwrap();

	di.run_setups().await.unwrap();

	assert_eq!(
		*di.inject(&log).await.unwrap().lock().unwrap(),
		["some-child-injectable"]
	);
}

#[tokio::test]
async fn setup_hook_may_inject_its_own_setuppable() {
	let di = Container::new("some-container");
	let seen = Arc::new(Mutex::new(None::<u32>));
	let selfish_stub: Injectable<u32> = Injectable::new("some-injectable").build();
	let selfish: Injectable<u32> = {
		let (seen, stub) = (Arc::clone(&seen), selfish_stub.clone());
		Injectable::new("some-injectable")
			.instantiate(|_di| Ok(42u32))
			.setup(move |setup_di| {
				let (seen, stub) = (Arc::clone(&seen), stub.clone());
				async move {
					let value = setup_di.inject(&stub).await?;
					*seen.lock().unwrap() = Some(*value);
					Ok(())
				}
			})
			.build()
	};
	di.register(&selfish).unwrap();

	di.run_setups().await.unwrap();

	assert_eq!(*seen.lock().unwrap(), Some(42));
}

#[tokio::test]
async fn mutually_dependent_setup_hooks_fail_with_the_cycle() {
	let di = Container::new("some-container");

	let depending_setup = |id: &'static str, target_id: &'static str| -> Injectable<()> {
		let target_stub: Injectable<()> = Injectable::new(target_id).build();
		Injectable::new(id)
			.instantiate(|_di| Ok(()))
			.setup(move |setup_di| {
				let target_stub = target_stub.clone();
				async move {
					setup_di.inject(&target_stub).await?;
					Ok(())
				}
			})
			.build()
	};
	di.register(&depending_setup("some-injectable", "some-other-injectable")).unwrap();
	di.register(&depending_setup("some-other-injectable", "some-injectable")).unwrap();

	let error = di.run_setups().await.unwrap_err();

	assert_eq!(
		error.to_string(),
		"Cycle of setuppables encountered: \"some-injectable\" -> \"some-other-injectable\" -> \"some-injectable\""
	);
}

#[tokio::test]
async fn setuppable_respects_overrides_during_the_pass() {
	let di = Container::new("some-container");
	let seen = Arc::new(Mutex::new(None::<u32>));
	let answer: Injectable<u32> =
		Injectable::new("some-answer").instantiate(|_di| Ok(1u32)).build();
	let consumer: Injectable<()> = {
		let (seen, answer) = (Arc::clone(&seen), answer.clone());
		Injectable::new("some-injectable")
			.instantiate(|_di| Ok(()))
			.setup(move |setup_di| {
				let (seen, answer) = (Arc::clone(&seen), answer.clone());
				async move {
					*seen.lock().unwrap() = Some(*setup_di.inject(&answer).await?);
					Ok(())
				}
			})
			.build()
	};
	di.register(&answer).unwrap();
	di.register(&consumer).unwrap();
	di.override_with(&answer, |_di| Ok(42u32)).unwrap();

	di.run_setups().await.unwrap();

	assert_eq!(*seen.lock().unwrap(), Some(42));
}

#[tokio::test]
async fn failing_setup_hook_aborts_the_pass() {
	let di = Container::new("some-container");
	let failing: Injectable<()> = Injectable::new("some-injectable")
		.instantiate(|_di| Ok(()))
		.setup(|_setup_di| async move {
			Err(DiError::InstantiationNotDefined("some-upstream".into()))
		})
		.build();
	di.register(&failing).unwrap();

	let error = di.run_setups().await.unwrap_err();

	assert!(matches!(error, DiError::InstantiationNotDefined(_)));
}

#[tokio::test]
async fn concurrently_requested_hook_is_awaited_to_completion() {
	let di = Container::new("some-container");
	let finished = Arc::new(Mutex::new(false));
	let seen = Arc::new(Mutex::new(None::<bool>));

	let slow: Injectable<()> = {
		let finished = Arc::clone(&finished);
		Injectable::new("some-slow-injectable")
			.instantiate(|_di| Ok(()))
			.setup(move |_setup_di| {
				let finished = Arc::clone(&finished);
				async move {
					tokio::task::yield_now().await;
					tokio::task::yield_now().await;
					*finished.lock().unwrap() = true;
					Ok(())
				}
			})
			.build()
	};
	let middle: Injectable<()> = {
		let slow = slow.clone();
		Injectable::new("some-middle-injectable")
			.instantiate(|_di| Ok(()))
			.setup(move |setup_di| {
				let slow = slow.clone();
				async move {
					setup_di.inject(&slow).await?;
					Ok(())
				}
			})
			.build()
	};
	// The top hook requests the slow hook twice at once, through the middle
	// hook and directly. Both requests must observe it completed.
	let top: Injectable<()> = {
		let (middle, slow, finished, seen) =
			(middle.clone(), slow.clone(), Arc::clone(&finished), Arc::clone(&seen));
		Injectable::new("some-top-injectable")
			.instantiate(|_di| Ok(()))
			.setup(move |setup_di| {
				let (middle, slow, finished, seen) =
					(middle.clone(), slow.clone(), Arc::clone(&finished), Arc::clone(&seen));
				async move {
					let (through, direct) =
						futures::join!(setup_di.inject(&middle), setup_di.inject(&slow));
					through?;
					direct?;
					*seen.lock().unwrap() = Some(*finished.lock().unwrap());
					Ok(())
				}
			})
			.build()
	};
	di.register(&top).unwrap();
	di.register(&middle).unwrap();
	di.register(&slow).unwrap();

	di.run_setups().await.unwrap();

	assert_eq!(*seen.lock().unwrap(), Some(true));
}

#[tokio::test]
async fn rerunning_setups_after_a_failed_pass_is_an_error() {
	let di = Container::new("some-container");
	let failing: Injectable<()> = Injectable::new("some-injectable")
		.instantiate(|_di| Ok(()))
		.setup(|_setup_di| async move {
			Err(DiError::InstantiationNotDefined("some-upstream".into()))
		})
		.build();
	di.register(&failing).unwrap();
	di.run_setups().await.unwrap_err();

	let error = di.run_setups().await.unwrap_err();

	assert_eq!(
		error.to_string(),
		"Tried to run setups while an earlier setup pass has not completed."
	);
}
