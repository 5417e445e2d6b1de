use super::*;
use crate::catalog::{AggRegistry, AggSignature, ExtraSeedEntry, RegistryBuilder};
use crate::datum::type_oid;

fn builtin(oid: Oid) -> Arc<AggregateDescriptor> { AggRegistry::builtin().unwrap().lookup(oid).unwrap() }

fn float_moving_sum() -> Arc<AggregateDescriptor> {
    let entry = ExtraSeedEntry {
        row: "9001 n 0 float8pl - float8pl - - float8_msum_accum float8_accum_inv_sum float8_msum f f 0 701 0 1022 0 _null_ \"{0,0,0}\"".into(),
        signature: AggSignature::new("msum", &[], &[type_oid::FLOAT8], type_oid::FLOAT8),
    };
    let reg = RegistryBuilder::new().extra_entries(vec![entry]).unwrap().build().unwrap();
    reg.lookup(9001).unwrap()
}

fn ints(vals: &[i32]) -> Vec<Vec<Datum>> { vals.iter().map(|v| vec![Datum::Int4(*v)]).collect() }

#[test]
fn slide_matches_recompute() {
    let sum = builtin(2108);
    let mut win = MovingAggregate::new(Arc::clone(&sum)).unwrap();
    assert!(win.is_moving());
    for v in [10, 20, 30] {
        win.push_back(vec![Datum::Int4(v)]).unwrap();
    }
    assert_eq!(win.evaluate().unwrap(), Datum::Int8(60));
    win.pop_front().unwrap();
    win.push_back(vec![Datum::Int4(40)]).unwrap();
    assert_eq!(win.evaluate().unwrap(), Datum::Int8(90));
    assert_eq!(win.stats(), WindowStats { forward: 4, inverse: 1, recomputes: 0 });

    let mut fresh = MovingAggregate::new(sum).unwrap();
    for v in [20, 30, 40] {
        fresh.push_back(vec![Datum::Int4(v)]).unwrap();
    }
    assert_eq!(fresh.evaluate().unwrap(), win.evaluate().unwrap());
}

#[test]
fn phases_follow_the_frame() {
    let mut win = MovingAggregate::new(builtin(2803)).unwrap();
    assert_eq!(win.phase(), MovingPhase::Empty);
    win.push_back(vec![]).unwrap();
    assert_eq!(win.phase(), MovingPhase::Accumulating);
    win.push_back(vec![]).unwrap();
    win.pop_front().unwrap();
    assert_eq!(win.phase(), MovingPhase::Sliding);
    assert_eq!(win.finish().unwrap(), Datum::Int8(1));
    assert_eq!(win.phase(), MovingPhase::Finalized);
    assert!(matches!(win.push_back(vec![]), Err(AggError::Finalized { .. })));
}

#[test]
fn without_inverse_the_frame_is_recomputed() {
    let mut win = MovingAggregate::new(builtin(2116)).unwrap();
    assert!(!win.is_moving());
    for v in [5, 9, 2] {
        win.push_back(vec![Datum::Int4(v)]).unwrap();
    }
    win.pop_front().unwrap();
    assert_eq!(win.evaluate().unwrap(), Datum::Int4(9));
    win.pop_front().unwrap();
    assert_eq!(win.evaluate().unwrap(), Datum::Int4(2));
    assert_eq!(win.stats().recomputes, 2);
}

#[test]
fn emptied_frame_returns_to_initial_state() {
    let mut win = MovingAggregate::new(builtin(2108)).unwrap();
    win.push_back(vec![Datum::Int4(7)]).unwrap();
    win.push_back(vec![Datum::Null]).unwrap();
    win.pop_front().unwrap();
    assert_eq!(win.evaluate().unwrap(), Datum::Null);
    win.pop_front().unwrap();
    assert_eq!(win.pop_front().unwrap(), None);
    assert_eq!(win.frame_len(), 0);
}

#[test]
fn unsafe_float_inverse_recomputes() {
    let mut win = MovingAggregate::new(float_moving_sum()).unwrap();
    for v in [1e17, -1e17, 1.0] {
        win.push_back(vec![Datum::Float8(v)]).unwrap();
    }
    // 1.0 - 1e17 + 1e17 != 1.0
    win.pop_front().unwrap();
    assert_eq!(win.evaluate().unwrap(), Datum::Float8(-1e17 + 1.0));
    assert_eq!(win.stats().recomputes, 1);

    win.push_back(vec![Datum::Float8(f64::INFINITY)]).unwrap();
    win.push_back(vec![Datum::Float8(4.0)]).unwrap();
    win.pop_front().unwrap();
    win.pop_front().unwrap();
    win.pop_front().unwrap();
    assert_eq!(win.evaluate().unwrap(), Datum::Float8(4.0));
    assert_eq!(win.stats().recomputes, 4);
}

#[test]
fn float_inverse_never_cancels_a_rounded_sum() {
    let msum = float_moving_sum();
    let rows: Vec<Vec<Datum>> = [1e16, 1.0, 1.0].into_iter().map(|v| vec![Datum::Float8(v)]).collect();
    let frame = FrameSpec::Rows { preceding: Some(1), following: Some(0) };
    let (values, stats) = sliding_window(&msum, &rows, frame).unwrap();
    // 1e16 + 1 rounds to 1e16, so subtracting 1e16 again would lose the 1
    assert_eq!(values, vec![Datum::Float8(1e16), Datum::Float8(1e16), Datum::Float8(2.0)]);
    assert_eq!(stats.recomputes, 1);
    assert_eq!(stats.inverse, 0);
}

#[test]
fn exact_float_removals_use_the_inverse() {
    let msum = float_moving_sum();
    let rows: Vec<Vec<Datum>> = [1.0, 2.0, 3.0, 4.0].into_iter().map(|v| vec![Datum::Float8(v)]).collect();
    let frame = FrameSpec::Rows { preceding: Some(1), following: Some(0) };
    let (values, stats) = sliding_window(&msum, &rows, frame).unwrap();
    assert_eq!(values, [1.0, 3.0, 5.0, 7.0].into_iter().map(Datum::Float8).collect::<Vec<_>>());
    assert_eq!(stats.inverse, 2);
    assert_eq!(stats.recomputes, 0);
}

#[test]
fn moving_forward_then_back_round_trips() {
    let mut win = MovingAggregate::new(builtin(2101)).unwrap();
    for v in [2, 4, 6] {
        win.push_back(vec![Datum::Int4(v)]).unwrap();
    }
    let before = win.evaluate().unwrap();
    let first = win.pop_front().unwrap().unwrap();
    win.push_back(vec![Datum::Int4(8)]).unwrap();
    assert_ne!(win.evaluate().unwrap(), before);
    win.pop_back().unwrap();
    win.push_front(first).unwrap();
    assert_eq!(win.evaluate().unwrap(), before);
}

#[test]
fn order_sensitive_push_front_rebuilds_in_frame_order() {
    let reg = AggRegistry::builtin().unwrap();
    let string_agg = reg.lookup_by_name("string_agg", &[type_oid::TEXT, type_oid::TEXT]).unwrap();
    let mut win = MovingAggregate::new(string_agg).unwrap();
    win.push_back(vec![Datum::from("b"), Datum::from(",")]).unwrap();
    win.push_front(vec![Datum::from("a"), Datum::from(",")]).unwrap();
    assert_eq!(win.evaluate().unwrap(), Datum::from("a,b"));
}

#[test]
fn ordered_set_aggregates_cannot_be_windowed() {
    assert!(matches!(MovingAggregate::new(builtin(3974)), Err(AggError::InvalidDescriptor { .. })));
}

#[test]
fn rows_frame_over_every_row() {
    let sum = builtin(2108);
    let rows = ints(&[1, 2, 3, 4, 5]);
    let frame = FrameSpec::Rows { preceding: Some(1), following: Some(1) };
    let (values, stats) = sliding_window(&sum, &rows, frame).unwrap();
    let expected: Vec<Datum> = [3, 6, 9, 12, 9].into_iter().map(Datum::Int8).collect();
    assert_eq!(values, expected);
    assert_eq!(stats.inverse, 3);

    let (running, _) = sliding_window(&sum, &rows, FrameSpec::running()).unwrap();
    assert_eq!(running.last(), Some(&Datum::Int8(15)));
}

#[test]
fn evaluator_counts_recomputes() {
    let max = builtin(2116);
    let rows = ints(&[3, 1, 4, 1, 5, 9, 2, 6]);
    let eval = WindowEvaluator { recompute_warn_threshold: 1 };
    let (values, stats) = eval.evaluate(&max, &rows, FrameSpec::Rows { preceding: Some(2), following: Some(0) }).unwrap();
    assert_eq!(values[7], Datum::Int4(9));
    assert_eq!(values[2], Datum::Int4(4));
    assert_eq!(stats.recomputes, 5);
}
