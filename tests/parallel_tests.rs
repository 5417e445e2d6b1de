use std::sync::Arc;

use pgaggregate::catalog::{AggRegistry, AggregateDescriptor};
use pgaggregate::datum::type_oid::*;
use pgaggregate::exec::{GroupedAggregate, ParallelAggregate, PartitionMode, StateBoundary};
use pgaggregate::{AggError, AggResult, Datum, EngineConfig, Oid};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn agg(name: &str, types: &[Oid]) -> Arc<AggregateDescriptor> {
    AggRegistry::builtin().unwrap().lookup_by_name(name, types).unwrap()
}

fn sequential<K>(desc: &Arc<AggregateDescriptor>, rows: Vec<(K, Vec<Datum>)>) -> Vec<(K, AggResult<Datum>)>
where
    K: std::hash::Hash + Eq + Clone + std::fmt::Debug,
{
    let mut g = GroupedAggregate::new(Arc::clone(desc));
    g.consume_all(rows);
    g.finish()
}

fn keyed_int8(rng: &mut StdRng, n: usize, groups: u32) -> Vec<(u32, Vec<Datum>)> {
    (0..n)
        .map(|_| {
            let v = if rng.gen_bool(0.05) { Datum::Null } else { Datum::Int8(rng.gen_range(-10_000..10_000)) };
            (rng.gen_range(0..groups), vec![v])
        })
        .collect()
}

#[tokio::test]
async fn every_mode_and_boundary_matches_sequential() {
    let mut rng = StdRng::seed_from_u64(0xA66_0001);
    for desc in [agg("sum", &[INT8]), agg("avg", &[INT8]), agg("max", &[INT8]), agg("var_samp", &[INT8])] {
        let rows = keyed_int8(&mut rng, 500, 12);
        let expected = sequential(&desc, rows.clone());
        for mode in [PartitionMode::ByGroup, PartitionMode::Split] {
            for boundary in [StateBoundary::InProcess, StateBoundary::Serialized] {
                let got = ParallelAggregate::new(Arc::clone(&desc)).workers(5).mode(mode).boundary(boundary).run(rows.clone()).await.unwrap();
                assert_eq!(got, expected, "aggregate {} {:?} {:?}", desc.aggfnoid, mode, boundary);
            }
        }
    }
}

#[tokio::test]
async fn worker_count_does_not_change_results() {
    let mut rng = StdRng::seed_from_u64(0xA66_0002);
    let sum = agg("sum", &[INT8]);
    let rows = keyed_int8(&mut rng, 300, 7);
    let expected = sequential(&sum, rows.clone());
    for workers in 1..=9 {
        let got = ParallelAggregate::new(Arc::clone(&sum)).workers(workers).mode(PartitionMode::Split).run(rows.clone()).await.unwrap();
        assert_eq!(got, expected, "{workers} workers");
    }
}

#[tokio::test]
async fn aggregates_without_combine_partition_by_group() {
    let array_agg = agg("array_agg", &[INT4]);
    let rows: Vec<(&str, Vec<Datum>)> = (0..40).map(|i| (if i % 2 == 0 { "even" } else { "odd" }, vec![Datum::Int4(i)])).collect();
    let p = ParallelAggregate::new(Arc::clone(&array_agg)).workers(3).mode(PartitionMode::Split).boundary(StateBoundary::Serialized);
    assert_eq!(p.effective_mode(), PartitionMode::ByGroup);
    // element order inside each group follows input order
    assert_eq!(p.run(rows.clone()).await.unwrap(), sequential(&array_agg, rows));
}

#[tokio::test]
async fn failed_groups_are_reported_in_place() {
    let sum = agg("sum", &[FLOAT8]);
    let rows = vec![
        ("bad", vec![Datum::Float8(f64::MAX)]),
        ("bad", vec![Datum::Float8(f64::MAX)]),
        ("ok", vec![Datum::Float8(1.0)]),
        ("ok", vec![Datum::Float8(2.0)]),
    ];
    for mode in [PartitionMode::ByGroup, PartitionMode::Split] {
        let out = ParallelAggregate::new(Arc::clone(&sum)).workers(2).mode(mode).run(rows.clone()).await.unwrap();
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], ("bad", Err(AggError::TransitionFailed { .. }))), "{mode:?}");
        assert_eq!(out[1], ("ok", Ok(Datum::Float8(3.0))));
    }
}

#[tokio::test]
async fn combine_failures_stay_in_their_group() {
    let sum = agg("sum", &[FLOAT8]);
    // each half is finite on its own; only merging the partials overflows
    let rows = vec![
        ("a", vec![Datum::Float8(1e308)]),
        ("b", vec![Datum::Float8(1.0)]),
        ("a", vec![Datum::Float8(1e308)]),
        ("b", vec![Datum::Float8(2.0)]),
    ];
    for boundary in [StateBoundary::InProcess, StateBoundary::Serialized] {
        let out = ParallelAggregate::new(Arc::clone(&sum)).workers(2).mode(PartitionMode::Split).boundary(boundary).run(rows.clone()).await.unwrap();
        assert_eq!(out.len(), 2, "{boundary:?}");
        match &out[0] {
            ("a", Err(AggError::TransitionFailed { proc_name, sqlstate, .. })) => {
                assert_eq!(proc_name, "float8pl");
                assert_eq!(*sqlstate, "22003");
            }
            other => panic!("{boundary:?}: unexpected {other:?}"),
        }
        assert_eq!(out[1], ("b", Ok(Datum::Float8(3.0))), "{boundary:?}");
    }
}

#[tokio::test]
async fn empty_input_yields_no_groups() {
    let cfg = EngineConfig { workers: 4, partition_mode: PartitionMode::Split, ..EngineConfig::default() };
    let out = ParallelAggregate::from_config(agg("count", &[INT4]), &cfg).run(Vec::<(u8, Vec<Datum>)>::new()).await.unwrap();
    assert!(out.is_empty());
}

#[tokio::test]
async fn groups_come_back_in_first_seen_order() {
    let count = agg("count", &[]);
    let keys = [9u16, 3, 9, 100, 3, 42, 7];
    let rows: Vec<(u16, Vec<Datum>)> = keys.iter().map(|k| (*k, vec![])).collect();
    for mode in [PartitionMode::ByGroup, PartitionMode::Split] {
        let out = ParallelAggregate::new(Arc::clone(&count)).workers(3).mode(mode).run(rows.clone()).await.unwrap();
        let order: Vec<u16> = out.iter().map(|(k, _)| *k).collect();
        assert_eq!(order, vec![9, 3, 100, 42, 7], "{mode:?}");
        assert_eq!(out[0].1, Ok(Datum::Int8(2)));
    }
}
