//! Per-group transition state and the store that owns it.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use crate::catalog::AggregateDescriptor;
use crate::datum::{Datum, Oid, SortKey};
use crate::error::{AggError, AggResult};
use crate::exec::dispatch;
use crate::exec::ordered_set::OrderedSetBuffer;
use crate::procs::TransValue;

/// Transition state of one (aggregate, group) pair.
#[derive(Debug, Clone)]
pub struct GroupAccumulator {
    pub(crate) desc: Arc<AggregateDescriptor>,
    pub(crate) state: TransValue,
    pub(crate) ordered: Option<OrderedSetBuffer>,
    pub(crate) inputs_seen: u64,
    pub(crate) finalized: bool,
}

impl GroupAccumulator {
    pub fn new(desc: Arc<AggregateDescriptor>) -> Self {
        let ordered = desc.is_ordered_set().then(|| OrderedSetBuffer::new(desc.kind, desc.default_sort_keys()));
        Self { state: desc.initial_state(), ordered, desc, inputs_seen: 0, finalized: false }
    }

    pub(crate) fn from_parts(desc: Arc<AggregateDescriptor>, state: TransValue, inputs_seen: u64) -> Self {
        let mut acc = Self::new(desc);
        acc.state = state;
        acc.inputs_seen = inputs_seen;
        acc
    }

    /// Override the buffer ordering, as `WITHIN GROUP (ORDER BY ... DESC)` does.
    pub fn with_sort_keys(mut self, keys: Vec<SortKey>) -> Self {
        self.set_sort_keys(keys);
        self
    }

    pub fn set_sort_keys(&mut self, keys: Vec<SortKey>) {
        if let Some(buffer) = self.ordered.as_mut() {
            buffer.set_sort_keys(keys);
        }
    }

    pub fn descriptor(&self) -> &Arc<AggregateDescriptor> { &self.desc }

    pub fn aggfnoid(&self) -> Oid { self.desc.aggfnoid }

    /// Current transition value; `None` until the first contributing input.
    pub fn state(&self) -> &TransValue { &self.state }

    pub fn inputs_seen(&self) -> u64 { self.inputs_seen }

    pub fn is_finalized(&self) -> bool { self.finalized }

    pub fn ordered_buffer(&self) -> Option<&OrderedSetBuffer> { self.ordered.as_ref() }

    pub fn apply(&mut self, row: &[Datum]) -> AggResult<()> { dispatch::apply_input(self, row) }

    pub fn finalize(&mut self) -> AggResult<Datum> { dispatch::finalize(self) }
}

/// Accumulators keyed by (aggregate, group key), remembering first-seen order.
#[derive(Debug)]
pub struct AccumulatorStore<K> {
    groups: HashMap<(Oid, K), GroupAccumulator>,
    order: Vec<(Oid, K)>,
}

impl<K> Default for AccumulatorStore<K> {
    fn default() -> Self { Self { groups: HashMap::new(), order: Vec::new() } }
}

impl<K: Hash + Eq + Clone> AccumulatorStore<K> {
    pub fn new() -> Self { Self::default() }

    /// The group's accumulator, created from the descriptor's initial value
    /// on first sight.
    pub fn get_or_create(&mut self, key: &K, desc: &Arc<AggregateDescriptor>) -> &mut GroupAccumulator {
        match self.groups.entry((desc.aggfnoid, key.clone())) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => {
                self.order.push((desc.aggfnoid, key.clone()));
                v.insert(GroupAccumulator::new(Arc::clone(desc)))
            }
        }
    }

    pub fn get(&self, key: &K, aggfnoid: Oid) -> Option<&GroupAccumulator> { self.groups.get(&(aggfnoid, key.clone())) }

    pub fn get_mut(&mut self, key: &K, aggfnoid: Oid) -> Option<&mut GroupAccumulator> { self.groups.get_mut(&(aggfnoid, key.clone())) }

    /// Insert a ready-made accumulator, replacing any existing one.
    pub fn insert(&mut self, key: K, acc: GroupAccumulator) {
        let slot = (acc.aggfnoid(), key);
        if !self.groups.contains_key(&slot) {
            self.order.push(slot.clone());
        }
        self.groups.insert(slot, acc);
    }

    /// Drop a group's state.
    pub fn remove(&mut self, key: &K, aggfnoid: Oid) -> Option<GroupAccumulator> {
        let slot = (aggfnoid, key.clone());
        let removed = self.groups.remove(&slot);
        if removed.is_some() {
            self.order.retain(|s| s != &slot);
        }
        removed
    }

    /// Combine two accumulators of the same aggregate.
    pub fn merge(a: GroupAccumulator, b: GroupAccumulator) -> AggResult<GroupAccumulator> {
        let mut a = a;
        dispatch::combine(&mut a, &b)?;
        Ok(a)
    }

    /// Fold every group of `other` into this store. Groups unknown here are
    /// moved over as they are. Groups listed in `failed` are not combined; a
    /// combine error is recorded there and the other groups carry on.
    pub fn merge_store(&mut self, mut other: AccumulatorStore<K>, failed: &mut HashMap<K, AggError>) {
        for (key, acc) in other.drain() {
            match self.get_mut(&key, acc.aggfnoid()) {
                Some(_) if failed.contains_key(&key) => {}
                Some(mine) => {
                    if let Err(err) = dispatch::combine(mine, &acc) {
                        failed.insert(key, err);
                    }
                }
                None => self.insert(key, acc),
            }
        }
    }

    /// Remove every accumulator, in first-seen order.
    pub fn drain(&mut self) -> Vec<(K, GroupAccumulator)> {
        let order = std::mem::take(&mut self.order);
        let mut out = Vec::with_capacity(order.len());
        for slot in order {
            if let Some(acc) = self.groups.remove(&slot) {
                out.push((slot.1, acc));
            }
        }
        out
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ { self.order.iter().map(|(_, k)| k) }

    pub fn len(&self) -> usize { self.groups.len() }

    pub fn is_empty(&self) -> bool { self.groups.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AggRegistry;

    #[test]
    fn store_preserves_first_seen_order() {
        let reg = AggRegistry::builtin().unwrap();
        let sum = reg.lookup(2108).unwrap();
        let mut store: AccumulatorStore<&str> = AccumulatorStore::new();
        for (k, v) in [("b", 1), ("a", 2), ("b", 3), ("c", 4)] {
            store.get_or_create(&k, &sum).apply(&[Datum::Int4(v)]).unwrap();
        }
        assert_eq!(store.keys().copied().collect::<Vec<_>>(), vec!["b", "a", "c"]);
        assert_eq!(store.get(&"b", 2108).unwrap().state(), &Some(Datum::Int8(4)));
        assert!(store.remove(&"a", 2108).is_some());
        let drained: Vec<&str> = store.drain().into_iter().map(|(k, _)| k).collect();
        assert_eq!(drained, vec!["b", "c"]);
        assert!(store.is_empty());
    }

    #[test]
    fn fresh_accumulators_copy_the_initial_value() {
        let reg = AggRegistry::builtin().unwrap();
        let count = reg.lookup(2803).unwrap();
        let mut store: AccumulatorStore<u32> = AccumulatorStore::new();
        store.get_or_create(&1, &count).apply(&[]).unwrap();
        let fresh = store.get_or_create(&2, &count);
        assert_eq!(fresh.state(), &Some(Datum::Int8(0)));
        assert_eq!(count.initval, Some(Datum::Int8(0)));
    }

    #[test]
    fn merge_store_combines_shared_groups() {
        let reg = AggRegistry::builtin().unwrap();
        let sum = reg.lookup(2108).unwrap();
        let mut left: AccumulatorStore<u8> = AccumulatorStore::new();
        let mut right: AccumulatorStore<u8> = AccumulatorStore::new();
        left.get_or_create(&1, &sum).apply(&[Datum::Int4(5)]).unwrap();
        right.get_or_create(&1, &sum).apply(&[Datum::Int4(6)]).unwrap();
        right.get_or_create(&2, &sum).apply(&[Datum::Int4(7)]).unwrap();
        let mut failed = HashMap::new();
        left.merge_store(right, &mut failed);
        assert!(failed.is_empty());
        assert_eq!(left.get(&1, 2108).unwrap().state(), &Some(Datum::Int8(11)));
        assert_eq!(left.get(&1, 2108).unwrap().inputs_seen(), 2);
        assert_eq!(left.get(&2, 2108).unwrap().state(), &Some(Datum::Int8(7)));
    }

    #[test]
    fn merge_store_isolates_a_failing_combine() {
        let reg = AggRegistry::builtin().unwrap();
        let sum = reg.lookup(2111).unwrap();
        let mut left: AccumulatorStore<&str> = AccumulatorStore::new();
        let mut right: AccumulatorStore<&str> = AccumulatorStore::new();
        for (k, v) in [("a", 1e308), ("b", 1.0)] {
            left.get_or_create(&k, &sum).apply(&[Datum::Float8(v)]).unwrap();
        }
        for (k, v) in [("a", 1e308), ("b", 2.0)] {
            right.get_or_create(&k, &sum).apply(&[Datum::Float8(v)]).unwrap();
        }
        right.get_or_create(&"c", &sum).apply(&[Datum::Float8(4.0)]).unwrap();
        let mut failed = HashMap::new();
        left.merge_store(right, &mut failed);
        match failed.get(&"a") {
            Some(AggError::TransitionFailed { proc_name, sqlstate, .. }) => {
                assert_eq!(proc_name, "float8pl");
                assert_eq!(*sqlstate, "22003");
            }
            other => panic!("unexpected failure record {:?}", other),
        }
        assert_eq!(failed.len(), 1);
        assert_eq!(left.get(&"b", 2111).unwrap().state(), &Some(Datum::Float8(3.0)));
        assert_eq!(left.get(&"c", 2111).unwrap().state(), &Some(Datum::Float8(4.0)));
        assert_eq!(left.keys().copied().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn merge_store_skips_groups_already_failed() {
        let reg = AggRegistry::builtin().unwrap();
        let sum = reg.lookup(2108).unwrap();
        let mut left: AccumulatorStore<u8> = AccumulatorStore::new();
        let mut right: AccumulatorStore<u8> = AccumulatorStore::new();
        left.get_or_create(&1, &sum).apply(&[Datum::Int4(5)]).unwrap();
        right.get_or_create(&1, &sum).apply(&[Datum::Int4(6)]).unwrap();
        let mut failed = HashMap::from([(1u8, AggError::overflow("int4_sum", "bigint"))]);
        left.merge_store(right, &mut failed);
        assert_eq!(left.get(&1, 2108).unwrap().state(), &Some(Datum::Int8(5)));
        assert_eq!(failed.len(), 1);
    }
}
