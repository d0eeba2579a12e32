//! Key to partition routing.

use xxhash_rust::xxh64::xxh64;

/// Seed for the routing hash. Changing it remaps every key.
const ROUTING_SEED: u64 = 0;

/// Map key bytes to one of `partition_count` partitions.
///
/// XXH64 is stable across processes and platforms, so a key always lands in
/// the same partition for a fixed partition count. `partition_count` must be
/// non-zero; the store configuration rejects zero before any key is routed.
pub fn partition_of(key: &[u8], partition_count: usize) -> usize {
    debug_assert!(partition_count > 0, "partition count must be positive");
    (xxh64(key, ROUTING_SEED) % partition_count as u64) as usize
}
