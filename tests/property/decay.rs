//! Property-based tests for the decay formula

use proptest::prelude::*;
use stackmemory::attention::DecayModel;
use stackmemory::clock::{Clock, ManualClock};
use stackmemory::concurrency::Deadline;
use stackmemory::config::StackConfig;
use stackmemory::context::ContextType;
use stackmemory::MemoryEngine;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn model() -> impl Strategy<Value = DecayModel> {
    (1u64..=10_000_000, 0.0f64..=1.0)
        .prop_map(|(half_life_secs, weight)| DecayModel::new(Duration::from_secs(half_life_secs), weight))
}

/// Scores stay within [0, 1] for any finite or non-finite inputs.
#[test]
fn test_score_is_bounded_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(model(), any::<f64>(), any::<f64>(), any::<u64>()),
            |(model, base, age, accesses)| {
                let score = model.score(base, age, accesses);
                prop_assert!((0.0..=1.0).contains(&score), "score {} out of range", score);
                Ok(())
            },
        )
        .unwrap();
}

proptest! {
    /// Without new accesses, a score never grows as time passes.
    #[test]
    fn score_never_increases_with_age(
        model in model(),
        base in 0.0f64..=1.0,
        age in 0.0f64..1e9,
        extra in 0.0f64..1e9,
        accesses in 0u64..10_000,
    ) {
        let earlier = model.score(base, age, accesses);
        let later = model.score(base, age + extra, accesses);
        prop_assert!(later <= earlier + 1e-12);
    }

    /// At a fixed age, more accesses never lower a score.
    #[test]
    fn score_never_decreases_with_access(
        model in model(),
        base in 0.0f64..=1.0,
        age in 0.0f64..1e9,
        accesses in 0u64..1_000_000,
    ) {
        let fewer = model.score(base, age, accesses);
        let more = model.score(base, age, accesses + 1);
        prop_assert!(more + 1e-12 >= fewer);
    }

    /// One half-life halves the unreinforced score.
    #[test]
    fn half_life_halves_base(half_life_secs in 1u64..1_000_000, base in 0.01f64..=1.0) {
        let model = DecayModel::new(Duration::from_secs(half_life_secs), 0.0);
        let halved = model.score(base, half_life_secs as f64, 0);
        prop_assert!((halved - base / 2.0).abs() < 1e-9);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// After a full recompute every stored importance is in [0, 1] and
    /// matches the model at the sweep time.
    #[test]
    fn stored_importance_bounded_after_recompute(
        half_life_hours in 0.01f64..10_000.0,
        access_weight in 0.0f64..=1.0,
        batch_size in 1usize..4,
        items in prop::collection::vec((0.0f64..=1.0, 0u64..10_000_000_000), 1..12),
        final_gap_ms in 0u64..100_000_000_000,
    ) {
        let mut config = StackConfig::default();
        config.decay.half_life_hours = half_life_hours;
        config.decay.access_weight = access_weight;
        config.decay.batch_size = batch_size;
        let clock = ManualClock::new(1_700_000_000_000);
        let engine = MemoryEngine::temporary(Path::new("/project"), config, Arc::new(clock.clone())).unwrap();
        let frame = engine.frames().start("task", "task", None).unwrap();

        let mut ids = Vec::new();
        for (n, (importance, gap_ms)) in items.iter().enumerate() {
            clock.advance(Duration::from_millis(*gap_ms));
            let id = engine
                .contexts()
                .add_context(ContextType::Note, &format!("item {n}"), &frame, Some(*importance))
                .unwrap();
            ids.push(id);
        }
        clock.advance(Duration::from_millis(final_gap_ms));

        let report = engine.recompute_decay(&Deadline::none()).unwrap();
        prop_assert!(!report.interrupted);
        prop_assert_eq!(report.scanned, ids.len());

        let now = clock.now_ms();
        let model = engine.contexts().decay_model();
        for id in &ids {
            let item = engine.contexts().get_context(id).unwrap();
            prop_assert!((0.0..=1.0).contains(&item.importance), "importance {} out of range", item.importance);
            prop_assert_eq!(item.importance, model.score_item(&item, now));
        }
    }
}
