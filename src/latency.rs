//! Latency histogram buckets shared by every SDK.
use std::time::Duration;

/// Upper bounds (in microseconds) of the latency buckets. Each bound is 1.5x the previous one.
pub const BUCKET_BOUNDS: [u64; 23] = [
    1_000, 1_500, 2_250, 3_375, 5_063, 7_594, 11_391, 17_086, 25_629, 38_443, 57_665, 86_498,
    129_746, 194_620, 291_929, 437_894, 656_841, 985_261, 1_477_892, 2_216_838, 3_325_257,
    4_987_885, 7_481_828,
];

/// Index of the histogram bucket for `latency`. Latencies above the last bound go to the last
/// bucket.
pub fn bucket(latency: Duration) -> usize {
    let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
    BUCKET_BOUNDS
        .iter()
        .position(|&bound| micros <= bound)
        .unwrap_or(BUCKET_BOUNDS.len() - 1)
}
