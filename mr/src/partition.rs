use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, PoisonError};

use crate::error::Result;
use crate::kv::KvList;

/// Routes a key to one of `num_partitions` buckets.
///
/// `DefaultHasher::new()` uses fixed keys, so the same key lands in the same
/// partition for every map worker of every run.
pub fn hash_to_partition(key: &str, num_partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % num_partitions as u64) as usize
}

/// Chunks contributed to one partition, tagged with the map task that
/// produced them.
type Chunks = Vec<(usize, KvList)>;

/// `num_reducer` intermediate buffers, each behind its own lock.
///
/// Owned by a single job; nothing here is process-wide. Chunks are kept per
/// map task and concatenated in task order when the partitions are taken,
/// so a partition's contents follow input order whatever order the workers
/// finished in.
#[derive(Debug)]
pub struct PartitionSet {
    partitions: Vec<Mutex<Chunks>>,
}

impl PartitionSet {
    pub fn new(num_partitions: usize) -> Result<Self> {
        let mut partitions = Vec::new();
        partitions.try_reserve_exact(num_partitions)?;
        partitions.extend((0..num_partitions).map(|_| Mutex::new(Chunks::new())));
        Ok(PartitionSet { partitions })
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn partition_for(&self, key: &str) -> usize {
        hash_to_partition(key, self.partitions.len())
    }

    /// Publishes a map worker's local buffer.
    ///
    /// Pairs are bucketed without any lock held; each target partition is
    /// then locked once, only for the append. Returns the number of pairs
    /// merged.
    pub fn merge(&self, task_id: usize, local: KvList) -> Result<usize> {
        let total = local.len();
        let mut buckets: Vec<KvList> = (0..self.partitions.len()).map(|_| KvList::new()).collect();
        for pair in local {
            let p = self.partition_for(pair.key());
            buckets[p].append(pair);
        }

        for (p, bucket) in buckets.into_iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            // appends never run user code, so a poisoned lock still holds consistent data
            let mut partition = self.partitions[p]
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            partition.try_reserve(1)?;
            partition.push((task_id, bucket));
        }
        Ok(total)
    }

    /// Consumes the set, handing each partition to its reduce worker.
    pub fn into_partitions(self) -> Vec<KvList> {
        self.partitions
            .into_iter()
            .map(|m| {
                let mut chunks = m.into_inner().unwrap_or_else(PoisonError::into_inner);
                chunks.sort_by_key(|(task_id, _)| *task_id);
                let total = chunks.iter().map(|(_, chunk)| chunk.len()).sum();
                let mut partition = KvList::with_capacity(total);
                for (_, chunk) in chunks {
                    partition.extend(chunk);
                }
                partition
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::KeyValue;

    #[test]
    fn test_hash_to_partition_is_stable() {
        for n in 1..8 {
            let p = hash_to_partition("apple", n);
            assert!(p < n);
            assert_eq!(p, hash_to_partition("apple", n));
        }
        assert_eq!(hash_to_partition("anything", 1), 0);
    }

    #[test]
    fn test_merge_routes_each_key_to_one_partition() {
        let set = PartitionSet::new(3).unwrap();
        let mut first = KvList::new();
        first.emit("a", "1");
        first.emit("b", "2");
        let mut second = KvList::new();
        second.emit("a", "3");
        second.emit("c", "4");

        assert_eq!(set.merge(1, first).unwrap(), 2);
        assert_eq!(set.merge(2, second).unwrap(), 2);

        let a_partition = set.partition_for("a");
        let partitions = set.into_partitions();
        assert_eq!(partitions.iter().map(KvList::len).sum::<usize>(), 4);

        for (i, partition) in partitions.iter().enumerate() {
            let a_count = partition.iter().filter(|kv| kv.key() == "a").count();
            if i == a_partition {
                assert_eq!(a_count, 2);
            } else {
                assert_eq!(a_count, 0);
            }
        }
    }

    #[test]
    fn test_partition_follows_task_order() {
        let set = PartitionSet::new(1).unwrap();
        let later: KvList = (3..5).map(|i| KeyValue::new("k", i.to_string())).collect();
        let earlier: KvList = (0..3).map(|i| KeyValue::new("k", i.to_string())).collect();
        // task 2 finishes first
        set.merge(2, later).unwrap();
        set.merge(1, earlier).unwrap();

        let partition = set.into_partitions().remove(0);
        let values: Vec<&str> = partition.values().collect();
        assert_eq!(values, vec!["0", "1", "2", "3", "4"]);
    }
}
