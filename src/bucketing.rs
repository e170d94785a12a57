//! Deterministic key-to-bucket hashing.
//!
//! Buckets must match every other SDK bit for bit, so both hash functions are fixed.
use crate::models::{HashAlgorithm, Partition};

/// Number of buckets. Buckets are numbered `1..=BUCKETS`.
pub const BUCKETS: u32 = 100;

/// Compute the bucket of `key` under `seed` using murmur3.
pub fn bucket(key: &str, seed: i64) -> u32 {
    HashAlgorithm::Murmur3.bucket(key, seed)
}

impl HashAlgorithm {
    /// Hash `key` with `seed` and reduce it to a bucket in `[1, 100]`.
    pub fn bucket(&self, key: &str, seed: i64) -> u32 {
        match self {
            HashAlgorithm::Murmur3 => murmur3_hash(key, seed) % BUCKETS + 1,
            HashAlgorithm::Legacy => legacy_hash(key, seed).unsigned_abs() % BUCKETS + 1,
        }
    }
}

fn murmur3_hash(key: &str, seed: i64) -> u32 {
    // Seeds are 32-bit on the wire; truncation keeps negative seeds compatible.
    murmur3::murmur3_32(&mut key.as_bytes(), seed as u32)
        .expect("reading from a byte slice cannot fail")
}

fn legacy_hash(key: &str, seed: i64) -> i32 {
    let h = key
        .bytes()
        .fold(0i32, |h, b| h.wrapping_mul(31).wrapping_add(i32::from(b)));
    h ^ seed as i32
}

/// Pick the partition whose cumulative range contains `bucket`.
///
/// Returns `None` if partitions sum to less than `bucket`.
pub(crate) fn select_partition(partitions: &[Partition], bucket: u32) -> Option<&Partition> {
    let mut upper = 0;
    partitions.iter().find(|partition| {
        upper += partition.size;
        bucket <= upper
    })
}

/// Whether partitions need a bucket at all. A single full partition always wins.
pub(crate) fn needs_bucket(partitions: &[Partition]) -> bool {
    !matches!(partitions, [only] if only.size == BUCKETS)
}
