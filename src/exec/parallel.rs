//!
//! Parallel partial aggregation
//! ----------------------------
//! Two ways to spread a grouped aggregation over blocking worker tasks:
//! - `ByGroup`: rows are routed to workers by an xxh3 hash of their group key,
//!   so every group lives in exactly one worker and no combine step is needed.
//! - `Split`: the input is cut into contiguous chunks, every worker builds
//!   partial states for whatever groups it sees, and the coordinator merges
//!   the partials pairwise with the combine function. Partials may cross a
//!   serialized boundary on the way back.
//!
//! Results come back in first-seen group order regardless of mode.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use xxhash_rust::xxh3::Xxh3;

use crate::catalog::AggregateDescriptor;
use crate::config::EngineConfig;
use crate::datum::Datum;
use crate::error::{AggError, AggResult};
use crate::exec::accumulator::AccumulatorStore;
use crate::exec::dispatch;
use crate::exec::grouped::GroupedAggregate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionMode {
    #[default]
    ByGroup,
    Split,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateBoundary {
    #[default]
    InProcess,
    Serialized,
}

pub type GroupResults<K> = Vec<(K, AggResult<Datum>)>;

/// Partial result of one `Split` worker.
enum Partial<K> {
    Live(AccumulatorStore<K>, HashMap<K, AggError>),
    Encoded(Vec<(K, Vec<u8>)>, HashMap<K, AggError>),
}

#[derive(Debug, Clone)]
pub struct ParallelAggregate {
    desc: Arc<AggregateDescriptor>,
    workers: usize,
    mode: PartitionMode,
    boundary: StateBoundary,
}

fn partition_of<K: Hash>(key: &K, workers: usize) -> usize {
    let mut h = Xxh3::new();
    key.hash(&mut h);
    (h.finish() % workers as u64) as usize
}

impl ParallelAggregate {
    pub fn new(desc: Arc<AggregateDescriptor>) -> Self {
        Self { desc, workers: 1, mode: PartitionMode::ByGroup, boundary: StateBoundary::InProcess }
    }

    pub fn from_config(desc: Arc<AggregateDescriptor>, cfg: &EngineConfig) -> Self {
        Self::new(desc).workers(cfg.workers).mode(cfg.partition_mode).boundary(cfg.state_boundary)
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn mode(mut self, mode: PartitionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn boundary(mut self, boundary: StateBoundary) -> Self {
        self.boundary = boundary;
        self
    }

    /// Mode actually used: `Split` needs a combine function.
    pub fn effective_mode(&self) -> PartitionMode {
        if self.mode == PartitionMode::Split && !self.desc.can_combine() {
            PartitionMode::ByGroup
        } else {
            self.mode
        }
    }

    pub async fn run<K>(&self, rows: Vec<(K, Vec<Datum>)>) -> AggResult<GroupResults<K>>
    where
        K: Hash + Eq + Clone + Debug + Send + 'static,
    {
        let mode = self.effective_mode();
        if mode != self.mode {
            info!(
                target: "pgagg::parallel",
                "aggregate {} has no combine function; partitioning by group instead",
                self.desc.aggfnoid
            );
        }
        debug!(target: "pgagg::parallel", "aggregate {} over {} rows, {} workers, {:?}", self.desc.aggfnoid, rows.len(), self.workers, mode);
        match mode {
            PartitionMode::ByGroup => self.run_by_group(rows).await,
            PartitionMode::Split => self.run_split(rows).await,
        }
    }

    async fn run_by_group<K>(&self, rows: Vec<(K, Vec<Datum>)>) -> AggResult<GroupResults<K>>
    where
        K: Hash + Eq + Clone + Debug + Send + 'static,
    {
        let mut first_seen: HashMap<K, usize> = HashMap::new();
        let mut parts: Vec<Vec<(K, Vec<Datum>)>> = (0..self.workers).map(|_| Vec::new()).collect();
        for (key, row) in rows {
            let next = first_seen.len();
            first_seen.entry(key.clone()).or_insert(next);
            parts[partition_of(&key, self.workers)].push((key, row));
        }

        let mut handles = Vec::with_capacity(parts.len());
        for part in parts.into_iter().filter(|p| !p.is_empty()) {
            let desc = Arc::clone(&self.desc);
            handles.push(tokio::task::spawn_blocking(move || {
                let mut grouped = GroupedAggregate::new(desc);
                grouped.consume_all(part);
                grouped.finish()
            }));
        }

        let mut slots: Vec<Option<(K, AggResult<Datum>)>> = (0..first_seen.len()).map(|_| None).collect();
        for handle in handles {
            for (key, result) in handle.await? {
                if let Some(idx) = first_seen.get(&key) {
                    slots[*idx] = Some((key, result));
                }
            }
        }
        Ok(slots.into_iter().flatten().collect())
    }

    async fn run_split<K>(&self, rows: Vec<(K, Vec<Datum>)>) -> AggResult<GroupResults<K>>
    where
        K: Hash + Eq + Clone + Debug + Send + 'static,
    {
        let chunk = rows.len().div_ceil(self.workers).max(1);
        let mut chunks: Vec<Vec<(K, Vec<Datum>)>> = Vec::new();
        let mut it = rows.into_iter().peekable();
        while it.peek().is_some() {
            chunks.push(it.by_ref().take(chunk).collect());
        }

        let boundary = self.boundary;
        let mut handles = Vec::with_capacity(chunks.len());
        for part in chunks {
            let desc = Arc::clone(&self.desc);
            handles.push(tokio::task::spawn_blocking(move || -> AggResult<Partial<K>> {
                let mut grouped = GroupedAggregate::new(desc);
                grouped.consume_all(part);
                let (mut store, failed) = grouped.into_parts();
                match boundary {
                    StateBoundary::InProcess => Ok(Partial::Live(store, failed)),
                    StateBoundary::Serialized => {
                        let encoded = store
                            .drain()
                            .into_iter()
                            .map(|(key, acc)| dispatch::serialize(&acc).map(|bytes| (key, bytes)))
                            .collect::<AggResult<Vec<_>>>()?;
                        Ok(Partial::Encoded(encoded, failed))
                    }
                }
            }));
        }

        // partials stay in chunk order so merged groups keep first-seen order
        let mut level: Vec<(AccumulatorStore<K>, HashMap<K, AggError>)> = Vec::with_capacity(handles.len());
        for handle in handles {
            level.push(match handle.await?? {
                Partial::Live(store, failed) => (store, failed),
                Partial::Encoded(encoded, failed) => {
                    let mut store = AccumulatorStore::new();
                    for (key, bytes) in encoded {
                        store.insert(key, dispatch::deserialize(&self.desc, &bytes)?);
                    }
                    (store, failed)
                }
            });
        }

        let mut rounds = 0;
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            let mut pairs = level.into_iter();
            while let Some((mut left, mut left_failed)) = pairs.next() {
                if let Some((right, right_failed)) = pairs.next() {
                    for (key, err) in right_failed {
                        left_failed.entry(key).or_insert(err);
                    }
                    left.merge_store(right, &mut left_failed);
                }
                next.push((left, left_failed));
            }
            level = next;
            rounds += 1;
        }
        debug!(target: "pgagg::parallel", "aggregate {} merged partials in {} rounds", self.desc.aggfnoid, rounds);

        let Some((store, failed)) = level.pop() else { return Ok(Vec::new()) };
        Ok(GroupedAggregate::from_parts(Arc::clone(&self.desc), store, failed).finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AggRegistry;

    fn rows(n: i32) -> Vec<(u8, Vec<Datum>)> { (0..n).map(|i| ((i % 3) as u8, vec![Datum::Int4(i)])).collect() }

    #[tokio::test]
    async fn split_and_by_group_agree() {
        let sum = AggRegistry::builtin().unwrap().lookup(2108).unwrap();
        let by_group = ParallelAggregate::new(Arc::clone(&sum)).workers(4).run(rows(100)).await.unwrap();
        let split = ParallelAggregate::new(Arc::clone(&sum)).workers(4).mode(PartitionMode::Split).run(rows(100)).await.unwrap();
        assert_eq!(by_group, split);
        assert_eq!(by_group.iter().map(|(k, _)| *k).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn split_without_combine_falls_back() {
        let agg = AggRegistry::builtin().unwrap().lookup(2335).unwrap();
        let p = ParallelAggregate::new(agg).mode(PartitionMode::Split);
        assert_eq!(p.effective_mode(), PartitionMode::ByGroup);
    }

    #[test]
    fn partitions_are_stable() {
        for k in 0..50u32 {
            assert_eq!(partition_of(&k, 7), partition_of(&k, 7));
            assert!(partition_of(&k, 7) < 7);
        }
    }
}
