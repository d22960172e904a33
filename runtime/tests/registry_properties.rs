//! Property and race tests for the correlation registry.

#![allow(clippy::expect_used)] // Tests can expect
#![allow(clippy::panic)] // Tests fail by panicking

use aether_core::CorrelationId;
use aether_runtime::{CorrelationRegistry, RegistryError};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::time::Duration;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime should build")
}

proptest! {
    /// Resolving any subset of pending ids leaves the others untouched.
    #[test]
    fn resolving_one_id_never_affects_another(
        ids in prop::collection::btree_set("[a-z0-9]{1,12}", 1..20),
        picks in prop::collection::vec(any::<bool>(), 20),
    ) {
        runtime().block_on(async {
            let registry = CorrelationRegistry::<usize>::new();
            let ids: Vec<CorrelationId> = ids.into_iter().map(CorrelationId::from).collect();
            let mut pending = Vec::new();
            for id in &ids {
                pending.push(registry.register(id.clone(), Duration::from_secs(60)).expect("ids are distinct"));
            }

            let resolved: BTreeSet<usize> = (0..ids.len()).filter(|i| picks[*i]).collect();
            for i in &resolved {
                prop_assert!(registry.resolve(&ids[*i], *i));
            }

            prop_assert_eq!(registry.pending_count(), ids.len() - resolved.len());
            for (i, id) in ids.iter().enumerate() {
                prop_assert_eq!(registry.contains(id), !resolved.contains(&i));
            }

            for (i, call) in pending.into_iter().enumerate() {
                if resolved.contains(&i) {
                    prop_assert_eq!(call.wait().await, Ok(i));
                } else {
                    prop_assert!(call.cancel());
                }
            }
            prop_assert_eq!(registry.pending_count(), 0);
            Ok(())
        })?;
    }
}

/// Races resolution against the deadline and checks exactly one outcome is seen.
#[test]
fn resolve_and_timeout_never_both_win() {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_time()
        .build()
        .expect("runtime should build");

    rt.block_on(async {
        for round in 0..200_u64 {
            let registry = CorrelationRegistry::<u64>::new();
            let id = CorrelationId::from(format!("race-{round}"));
            let timeout = Duration::from_micros(500 + (round % 7) * 100);
            let pending = registry
                .register(id.clone(), timeout)
                .expect("registration should succeed");

            let resolver = {
                let registry = registry.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    registry.resolve(&id, round)
                })
            };

            let waited = pending.wait().await;
            let resolved = resolver.await.expect("resolver should not panic");

            match waited {
                Ok(value) => {
                    assert!(resolved, "round {round}: value delivered but resolve reported a miss");
                    assert_eq!(value, round);
                },
                Err(RegistryError::ResponseTimeout { .. }) => {
                    assert!(!resolved, "round {round}: both resolve and timeout won");
                },
                Err(other) => panic!("round {round}: unexpected outcome {other}"),
            }
            assert_eq!(registry.pending_count(), 0);
        }
    });
}
