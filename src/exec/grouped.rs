//! GROUP BY driver: one accumulator per group key, failures isolated per group.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::catalog::AggregateDescriptor;
use crate::datum::{Datum, SortKey};
use crate::error::{AggError, AggResult};
use crate::exec::accumulator::AccumulatorStore;

/// Downstream consumer of finalized group results.
pub trait ResultSink<K> {
    fn emit(&mut self, key: K, result: AggResult<Datum>);
}

impl<K> ResultSink<K> for Vec<(K, AggResult<Datum>)> {
    fn emit(&mut self, key: K, result: AggResult<Datum>) { self.push((key, result)); }
}

#[derive(Debug)]
pub struct GroupedAggregate<K> {
    desc: Arc<AggregateDescriptor>,
    store: AccumulatorStore<K>,
    failed: HashMap<K, AggError>,
    sort_keys: Option<Vec<SortKey>>,
}

impl<K: Hash + Eq + Clone + Debug> GroupedAggregate<K> {
    pub fn new(desc: Arc<AggregateDescriptor>) -> Self {
        Self { desc, store: AccumulatorStore::new(), failed: HashMap::new(), sort_keys: None }
    }

    pub(crate) fn from_parts(desc: Arc<AggregateDescriptor>, store: AccumulatorStore<K>, failed: HashMap<K, AggError>) -> Self {
        Self { desc, store, failed, sort_keys: None }
    }

    /// Ordering for ordered-set groups, overriding the sort operator.
    pub fn with_sort_keys(mut self, keys: Vec<SortKey>) -> Self {
        self.sort_keys = Some(keys);
        self
    }

    pub fn descriptor(&self) -> &Arc<AggregateDescriptor> { &self.desc }

    /// Feed one row into its group. A failing row marks the group failed and
    /// returns the error; later rows of that group are ignored.
    pub fn consume(&mut self, key: K, row: &[Datum]) -> AggResult<()> {
        if self.failed.contains_key(&key) {
            trace!(target: "pgagg::exec", "group {:?} already failed; row ignored", key);
            return Ok(());
        }
        let acc = self.store.get_or_create(&key, &self.desc);
        if acc.inputs_seen() == 0 {
            if let Some(keys) = &self.sort_keys {
                acc.set_sort_keys(keys.clone());
            }
        }
        if let Err(e) = acc.apply(row) {
            debug!(target: "pgagg::exec", "aggregate {} group {:?} failed: {}", self.desc.aggfnoid, key, e);
            self.failed.insert(key, e.clone());
            return Err(e);
        }
        Ok(())
    }

    /// Feed every row; returns how many rows failed.
    pub fn consume_all<I>(&mut self, rows: I) -> usize
    where
        I: IntoIterator<Item = (K, Vec<Datum>)>,
    {
        rows.into_iter().filter(|(key, row)| self.consume(key.clone(), row).is_err()).count()
    }

    pub fn group_count(&self) -> usize { self.store.len() }

    pub fn failed_groups(&self) -> impl Iterator<Item = (&K, &AggError)> + '_ { self.failed.iter() }

    pub fn into_parts(self) -> (AccumulatorStore<K>, HashMap<K, AggError>) { (self.store, self.failed) }

    /// Finalize every group in first-seen order, releasing its state.
    pub fn finish_into<S: ResultSink<K>>(self, sink: &mut S) {
        let (mut store, mut failed) = self.into_parts();
        for (key, mut acc) in store.drain() {
            let result = match failed.remove(&key) {
                Some(err) => Err(err),
                None => acc.finalize(),
            };
            sink.emit(key, result);
        }
    }

    pub fn finish(self) -> Vec<(K, AggResult<Datum>)> {
        let mut out = Vec::with_capacity(self.store.len());
        self.finish_into(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AggRegistry;
    use crate::datum::Decimal;

    #[test]
    fn groups_finish_in_first_seen_order() {
        let reg = AggRegistry::builtin().unwrap();
        let mut g = GroupedAggregate::new(reg.lookup(2108).unwrap());
        let rows = vec![("x", vec![Datum::Int4(1)]), ("y", vec![Datum::Int4(10)]), ("x", vec![Datum::Int4(2)]), ("z", vec![Datum::Null])];
        assert_eq!(g.consume_all(rows), 0);
        assert_eq!(g.group_count(), 3);
        let out = g.finish();
        assert_eq!(out[0], ("x", Ok(Datum::Int8(3))));
        assert_eq!(out[1], ("y", Ok(Datum::Int8(10))));
        assert_eq!(out[2], ("z", Ok(Datum::Null)));
    }

    #[test]
    fn failing_group_does_not_abort_siblings() {
        let reg = AggRegistry::builtin().unwrap();
        let mut g = GroupedAggregate::new(reg.lookup(2107).unwrap());
        g.consume(1, &[Datum::Int8(i64::MAX)]).unwrap();
        g.consume(2, &[Datum::Int8(4)]).unwrap();
        let text = g.consume(1, &[Datum::from("oops")]);
        assert!(text.is_err());
        g.consume(1, &[Datum::Int8(1)]).unwrap();
        g.consume(2, &[Datum::Int8(5)]).unwrap();
        assert_eq!(g.failed_groups().count(), 1);
        let out = g.finish();
        assert!(matches!(out[0], (1, Err(AggError::TransitionFailed { .. }))));
        assert_eq!(out[1], (2, Ok(Datum::Numeric(Decimal::from(9i64)))));
    }

    #[test]
    fn sort_keys_reach_ordered_groups() {
        let reg = AggRegistry::builtin().unwrap();
        let mut g = GroupedAggregate::new(reg.lookup(3972).unwrap()).with_sort_keys(vec![SortKey::desc()]);
        for v in [1.0, 2.0, 3.0, 4.0] {
            g.consume('a', &[Datum::Float8(0.25), Datum::Float8(v)]).unwrap();
        }
        assert_eq!(g.finish(), vec![('a', Ok(Datum::Float8(4.0)))]);
    }
}
