//! Property tests for generation ordering
//!
//! However `open()` calls interleave with partially completed async work,
//! no transition of an older generation is observed after a newer open, and
//! only the last request ends up bound to the engine.

mod common;

use common::{episode, Fixture};
use couch_core::MediaSource;
use couch_playback::SessionState;
use proptest::prelude::*;

fn source(choice: usize) -> MediaSource {
    match choice {
        0 => episode(1, "hd"),
        1 => episode(1, "sd"),
        _ => episode(2, "hd"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_only_latest_generation_settles(
        opens in prop::collection::vec((0usize..3, 0usize..48, any::<bool>()), 1..8)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();

        runtime.block_on(async move {
            let mut fx = Fixture::new();
            let mut last_generation = 0;
            let mut last_source = String::new();

            for (choice, yields, apply) in &opens {
                let source = source(*choice);
                last_source = source.id.as_str().to_string();
                last_generation = fx.controller.open(source, None);

                // Let spawned work run part of the way
                for _ in 0..*yields {
                    tokio::task::yield_now().await;
                }
                if *apply {
                    fx.controller.process_pending();
                }
            }
            fx.settle().await;

            let states = fx.drain_states();
            let mut previous = 0;
            for (generation, _) in &states {
                assert!(*generation >= previous, "generation went backwards: {:?}", states);
                previous = *generation;
            }

            assert_eq!(*fx.controller.state(), SessionState::Playing);
            assert_eq!(fx.controller.generation(), last_generation);
            assert_eq!(
                fx.controller.session().unwrap().source.id.as_str(),
                last_source
            );
            assert_eq!(fx.engine.loads().last(), Some(&last_source));
        });
    }
}
