use std::any::Any;
use std::iter::Peekable;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::vec;

use tracing::debug;

use crate::error::{Error, Phase, Result};
use crate::kv::{KeyValue, KvList};
use crate::partition::PartitionSet;
use crate::task::{Slice, TaskStats};

/// User map function: turns one input record into zero or more intermediate
/// pairs appended to `sink`.
pub trait Mapper: Sync {
    fn map(&self, record: &KeyValue, sink: &mut KvList) -> anyhow::Result<()>;
}

/// User reduce function: receives one key with every intermediate pair that
/// carries it (within one partition) and appends results to `sink`.
pub trait Reducer: Sync {
    fn reduce(&self, key: &str, group: &KvList, sink: &mut KvList) -> anyhow::Result<()>;
}

impl<F> Mapper for F
where
    F: Fn(&KeyValue, &mut KvList) -> anyhow::Result<()> + Sync,
{
    fn map(&self, record: &KeyValue, sink: &mut KvList) -> anyhow::Result<()> {
        self(record, sink)
    }
}

impl<F> Reducer for F
where
    F: Fn(&str, &KvList, &mut KvList) -> anyhow::Result<()> + Sync,
{
    fn reduce(&self, key: &str, group: &KvList, sink: &mut KvList) -> anyhow::Result<()> {
        self(key, group, sink)
    }
}

/// Splits a key-sorted list into maximal runs of equal keys.
///
/// Each group is its own `KvList`, so it can be dropped as soon as the
/// reducer returns. The input must already be sorted by key.
pub struct Groups {
    pairs: Peekable<vec::IntoIter<KeyValue>>,
}

impl Groups {
    pub fn new(sorted: KvList) -> Self {
        Groups {
            pairs: sorted.into_iter().peekable(),
        }
    }
}

impl Iterator for Groups {
    type Item = (String, KvList);

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.pairs.next()?;
        let key = first.key().to_owned();
        let mut group = KvList::new();
        group.append(first);
        while let Some(pair) = self.pairs.next_if(|p| p.key() == key) {
            group.append(pair);
        }
        Some((key, group))
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs one callback, turning both `Err` and panics into `Error::Callback`.
fn call_guarded<F>(phase: Phase, task_id: usize, f: F) -> Result<()>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(Error::Callback {
            phase,
            task_id,
            source,
        }),
        Err(payload) => Err(Error::Callback {
            phase,
            task_id,
            source: anyhow::anyhow!("callback panicked: {}", panic_message(payload)),
        }),
    }
}

/// One map task.
///
/// Walks the input once, calling the mapper only for records inside `slice`
/// and buffering emissions locally; then publishes the buffer into
/// `partitions`. Returns `Ok(None)` if the phase was aborted before the task
/// finished, in which case nothing is published.
pub fn do_map<M: Mapper + ?Sized>(
    mapper: &M,
    task_id: usize,
    input: &KvList,
    slice: Slice,
    partitions: &PartitionSet,
    aborted: &AtomicBool,
) -> Result<Option<TaskStats>> {
    debug!(task_id, start = slice.start, end = slice.end, "map task starting");
    let mut local = KvList::new();
    let mut stats = TaskStats::default();

    for (_, record) in input
        .iter()
        .enumerate()
        .skip(slice.start)
        .take_while(|(index, _)| slice.contains(*index))
    {
        if aborted.load(Ordering::Acquire) {
            debug!(task_id, "map task abandoned");
            return Ok(None);
        }
        call_guarded(Phase::Map, task_id, || mapper.map(record, &mut local))?;
        stats.records_in += 1;
    }

    stats.records_out = partitions.merge(task_id, local)?;
    debug!(
        task_id,
        records_in = stats.records_in,
        records_out = stats.records_out,
        "map task done"
    );
    Ok(Some(stats))
}

/// One reduce task, bound to a single partition.
///
/// Sorts the partition, hands each key group to the reducer, and appends the
/// reducer's output to `output` under its lock. Returns `Ok(None)` if the
/// phase was aborted before every group was reduced.
pub fn do_reduce<R: Reducer + ?Sized>(
    reducer: &R,
    task_id: usize,
    mut partition: KvList,
    output: &Mutex<&mut KvList>,
    aborted: &AtomicBool,
) -> Result<Option<TaskStats>> {
    debug!(task_id, pairs = partition.len(), "reduce task starting");
    let mut stats = TaskStats {
        records_in: partition.len(),
        ..TaskStats::default()
    };
    partition.sort_by_key();

    for (key, group) in Groups::new(partition) {
        if aborted.load(Ordering::Acquire) {
            debug!(task_id, "reduce task abandoned");
            return Ok(None);
        }
        let mut sink = KvList::new();
        call_guarded(Phase::Reduce, task_id, || {
            reducer.reduce(&key, &group, &mut sink)
        })?;
        stats.groups += 1;

        if !sink.is_empty() {
            stats.records_out += sink.len();
            let mut out = output.lock().unwrap_or_else(PoisonError::into_inner);
            out.try_reserve(sink.len())?;
            out.extend(sink);
        }
    }

    debug!(
        task_id,
        groups = stats.groups,
        records_out = stats.records_out,
        "reduce task done"
    );
    Ok(Some(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::Rng;
    use std::collections::BTreeMap;

    fn identity(record: &KeyValue, sink: &mut KvList) -> anyhow::Result<()> {
        sink.append(record.clone());
        Ok(())
    }

    fn join_values(key: &str, group: &KvList, sink: &mut KvList) -> anyhow::Result<()> {
        let joined: Vec<&str> = group.values().collect();
        sink.emit(key, joined.join(","));
        Ok(())
    }

    fn list(pairs: &[(&str, &str)]) -> KvList {
        pairs.iter().map(|&(k, v)| KeyValue::new(k, v)).collect()
    }

    #[test]
    fn test_groups_emits_final_group() {
        let sorted = list(&[("a", "1"), ("a", "2"), ("b", "3"), ("c", "4"), ("c", "5")]);
        let groups: Vec<(String, usize)> = Groups::new(sorted)
            .map(|(key, group)| (key, group.len()))
            .collect();
        assert_eq!(
            groups,
            vec![("a".to_string(), 2), ("b".to_string(), 1), ("c".to_string(), 2)]
        );
    }

    #[test]
    fn test_groups_on_empty_and_single() {
        assert_eq!(Groups::new(KvList::new()).count(), 0);
        let groups: Vec<_> = Groups::new(list(&[("only", "1")])).collect();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, "only");
    }

    #[test]
    fn test_groups_cover_partition_exactly() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let n = rng.gen_range(0..200);
            let mut partition: KvList = (0..n)
                .map(|i| KeyValue::new(format!("k{}", rng.gen_range(0..15)), i.to_string()))
                .collect();
            let mut expected: Vec<KeyValue> = partition.iter().cloned().collect();
            expected.sort();

            partition.sort_by_key();
            let mut seen_keys = vec![];
            let mut members = vec![];
            for (key, group) in Groups::new(partition) {
                assert!(group.iter().all(|kv| kv.key() == key));
                assert!(!seen_keys.contains(&key), "key {} split across groups", key);
                seen_keys.push(key);
                members.extend(group);
            }
            members.sort();
            assert_eq!(members, expected);
        }
    }

    #[test]
    fn test_do_map_only_touches_its_slice() {
        let input: KvList = (0..10).map(|i| KeyValue::new(format!("k{i}"), "v")).collect();
        let partitions = PartitionSet::new(2).unwrap();
        let aborted = AtomicBool::new(false);

        let stats = do_map(&identity, 1, &input, Slice::new(3, 7), &partitions, &aborted)
            .unwrap()
            .unwrap();
        assert_eq!(stats.records_in, 4);
        assert_eq!(stats.records_out, 4);

        let mut keys: Vec<String> = partitions
            .into_partitions()
            .into_iter()
            .flatten()
            .map(|kv| kv.key().to_string())
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["k3", "k4", "k5", "k6"]);
    }

    #[test]
    fn test_do_map_empty_slice_calls_nothing() {
        let input = list(&[("a", "1")]);
        let partitions = PartitionSet::new(1).unwrap();
        let aborted = AtomicBool::new(false);
        let failing = |_: &KeyValue, _: &mut KvList| -> anyhow::Result<()> {
            anyhow::bail!("should not be called")
        };

        let stats = do_map(&failing, 2, &input, Slice::new(1, 1), &partitions, &aborted)
            .unwrap()
            .unwrap();
        assert_eq!(stats, TaskStats::default());
    }

    #[test]
    fn test_do_map_reports_mapper_error() {
        let input = list(&[("a", "1"), ("b", "2")]);
        let partitions = PartitionSet::new(1).unwrap();
        let aborted = AtomicBool::new(false);
        let failing = |kv: &KeyValue, _: &mut KvList| -> anyhow::Result<()> {
            anyhow::ensure!(kv.key() != "b", "bad record {}", kv.key());
            Ok(())
        };

        let err = do_map(&failing, 7, &input, Slice::new(0, 2), &partitions, &aborted).unwrap_err();
        match err {
            Error::Callback {
                phase, task_id, source,
            } => {
                assert_eq!(phase, Phase::Map);
                assert_eq!(task_id, 7);
                assert_eq!(source.to_string(), "bad record b");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // nothing published on failure
        assert!(partitions.into_partitions()[0].is_empty());
    }

    #[test]
    fn test_do_map_stops_when_aborted() {
        let input = list(&[("a", "1")]);
        let partitions = PartitionSet::new(1).unwrap();
        let aborted = AtomicBool::new(true);
        let res = do_map(&identity, 1, &input, Slice::new(0, 1), &partitions, &aborted).unwrap();
        assert!(res.is_none());
    }

    #[test]
    fn test_do_reduce_groups_shuffled_partition() {
        let mut pairs = vec![
            KeyValue::new("b", "2"),
            KeyValue::new("a", "1"),
            KeyValue::new("a", "3"),
            KeyValue::new("c", "9"),
        ];
        pairs.shuffle(&mut rand::thread_rng());
        let partition: KvList = pairs.into();

        let mut out = KvList::new();
        let output = Mutex::new(&mut out);
        let aborted = AtomicBool::new(false);
        let stats = do_reduce(&join_values, 3, partition, &output, &aborted)
            .unwrap()
            .unwrap();
        assert_eq!(stats.records_in, 4);
        assert_eq!(stats.groups, 3);
        assert_eq!(stats.records_out, 3);

        let result: BTreeMap<String, String> = out
            .into_iter()
            .map(KeyValue::into_parts)
            .map(|(k, v)| {
                let mut parts: Vec<&str> = v.split(',').collect();
                parts.sort();
                (k, parts.join(","))
            })
            .collect();
        assert_eq!(result["a"], "1,3");
        assert_eq!(result["b"], "2");
        assert_eq!(result["c"], "9");
    }

    #[test]
    fn test_do_reduce_converts_panic() {
        let partition = list(&[("a", "1")]);
        let mut out = KvList::new();
        let output = Mutex::new(&mut out);
        let aborted = AtomicBool::new(false);
        let exploding = |_: &str, _: &KvList, _: &mut KvList| -> anyhow::Result<()> {
            panic!("boom");
        };

        let err = do_reduce(&exploding, 5, partition, &output, &aborted).unwrap_err();
        assert!(err.is_callback());
        let source = std::error::Error::source(&err).unwrap().to_string();
        assert!(source.contains("boom"), "{source}");
    }
}
