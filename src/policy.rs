//! Selection-policy collaborator for higher layers sharding writes across
//! several `BulkStorage` instances. Lives outside the core engine — a
//! `BulkStorage` has no notion of siblings.

use crate::storage::BulkStorage;

/// How `StorageSelector` picks a target storage for the next `add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Prefer the fullest storage that still fits the limits.
    Fill,
    /// Prefer the least full storage.
    Spread,
}

/// Per-storage capacity limits enforced by the selector. A storage that
/// would exceed either limit is excluded from selection.
#[derive(Debug, Clone, Copy)]
pub struct StorageLimits {
    pub max_size_bytes: u64,
    pub max_file_count: usize,
}

/// One shard under management: the limits it must respect and a snapshot
/// of its current usage. The selector does not own the `BulkStorage`
/// itself — callers report usage and receive back an index to act on.
pub struct ManagedShard {
    pub limits: StorageLimits,
    pub size_bytes: u64,
    pub file_count: usize,
}

impl ManagedShard {
    pub fn from_storage(storage: &BulkStorage, limits: StorageLimits) -> Self {
        let file_count = storage.records().iter().filter(|r| !r.is_deleted()).count();
        let size_bytes = storage
            .records()
            .iter()
            .filter(|r| !r.is_deleted())
            .map(|r| (r.end - r.start).max(0) as u64)
            .sum();
        Self {
            limits,
            size_bytes,
            file_count,
        }
    }

    fn fits(&self) -> bool {
        self.size_bytes < self.limits.max_size_bytes && self.file_count < self.limits.max_file_count
    }
}

/// Picks a target shard index for the next `add`, honoring the configured
/// policy and per-shard limits. Ties are broken by file count in the same
/// direction as the policy: `fill` prefers more files on a size tie, `spread`
/// prefers fewer.
pub struct StorageSelector {
    pub policy: SelectionPolicy,
}

impl StorageSelector {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self { policy }
    }

    /// Returns the index into `shards` that should receive the next write,
    /// or `None` if every shard is at its limit.
    pub fn select(&self, shards: &[ManagedShard]) -> Option<usize> {
        let candidates = shards
            .iter()
            .enumerate()
            .filter(|(_, s)| s.fits());

        match self.policy {
            SelectionPolicy::Fill => candidates
                .max_by(|(_, a), (_, b)| {
                    a.size_bytes
                        .cmp(&b.size_bytes)
                        .then_with(|| a.file_count.cmp(&b.file_count))
                })
                .map(|(i, _)| i),
            SelectionPolicy::Spread => candidates
                .min_by(|(_, a), (_, b)| {
                    a.size_bytes
                        .cmp(&b.size_bytes)
                        .then_with(|| a.file_count.cmp(&b.file_count))
                })
                .map(|(i, _)| i),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shard(size: u64, files: usize) -> ManagedShard {
        ManagedShard {
            limits: StorageLimits {
                max_size_bytes: 1000,
                max_file_count: 100,
            },
            size_bytes: size,
            file_count: files,
        }
    }

    #[test]
    fn fill_prefers_fullest_fitting_shard() {
        let shards = vec![shard(100, 1), shard(900, 5), shard(500, 2)];
        let selector = StorageSelector::new(SelectionPolicy::Fill);
        assert_eq!(selector.select(&shards), Some(1));
    }

    #[test]
    fn fill_breaks_size_tie_toward_more_files() {
        let shards = vec![shard(500, 2), shard(500, 5)];
        let selector = StorageSelector::new(SelectionPolicy::Fill);
        assert_eq!(selector.select(&shards), Some(1));
    }

    #[test]
    fn spread_prefers_emptiest_shard() {
        let shards = vec![shard(100, 1), shard(900, 5), shard(50, 2)];
        let selector = StorageSelector::new(SelectionPolicy::Spread);
        assert_eq!(selector.select(&shards), Some(2));
    }

    #[test]
    fn shards_at_limit_are_excluded() {
        let shards = vec![ManagedShard {
            limits: StorageLimits {
                max_size_bytes: 100,
                max_file_count: 10,
            },
            size_bytes: 100,
            file_count: 3,
        }];
        let selector = StorageSelector::new(SelectionPolicy::Fill);
        assert_eq!(selector.select(&shards), None);
    }
}
