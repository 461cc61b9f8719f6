use std::collections::HashMap;
use std::sync::Arc;

use calclog::application::calculator::{
    CalculationService, CalculatorTimeouts, METRIC_CACHE_HIT, METRIC_CACHE_MISS,
    METRIC_CALCULATE_MS, METRIC_HISTORY_APPEND,
};
use calclog::application::repos::HistoryRepo;
use calclog::domain::calculation::InputPair;
use calclog::infra::cache::MemoryResultCache;
use calclog::infra::db::PostgresRepositories;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use sqlx::PgPool;

#[sqlx::test(migrations = false)]
async fn calculation_paths_emit_expected_metrics(pool: PgPool) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let repos = Arc::new(PostgresRepositories::new(pool));
    repos.ensure_schema().await.expect("create hist_log");

    let service = CalculationService::new(
        Arc::new(MemoryResultCache::new()),
        repos,
        CalculatorTimeouts::default(),
    );

    let pair = InputPair::new(2.0, 3.0).expect("valid pair");
    let miss = service.calculate(pair).await.expect("first calculation");
    let hit = service.calculate(pair).await.expect("second calculation");
    assert!(!miss.cache_hit);
    assert!(hit.cache_hit);

    let snapshot = snapshotter.snapshot().into_vec();
    let counters: HashMap<String, u64> = snapshot
        .iter()
        .filter_map(|(composite_key, _, _, value)| match value {
            DebugValue::Counter(count) => {
                Some((composite_key.key().name().to_string(), *count))
            }
            _ => None,
        })
        .collect();

    assert_eq!(counters.get(METRIC_CACHE_MISS), Some(&1));
    assert_eq!(counters.get(METRIC_CACHE_HIT), Some(&1));
    assert_eq!(counters.get(METRIC_HISTORY_APPEND), Some(&2));

    let histogram_recorded = snapshot.iter().any(|(composite_key, _, _, value)| {
        composite_key.key().name() == METRIC_CALCULATE_MS
            && matches!(value, DebugValue::Histogram(samples) if samples.len() == 2)
    });
    assert!(histogram_recorded, "missing {METRIC_CALCULATE_MS} samples");
}
