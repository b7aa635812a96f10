//! Per-process monotone wall-clock timestamp generator.
//!
//! Event filenames embed a 17-character lexicographically sortable
//! timestamp (`YYYYMMDDhhmmssXXX`). The trailing three digits
//! are a per-process monotone counter rather than sub-second wall time, so
//! that two events produced within the same millisecond by one process
//! still sort in emission order.

use chrono::Local;
use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate the next timestamp string. Guaranteed to sort strictly after
/// any value previously returned by this process (within one calendar
/// second, the suffix increments; across seconds the prefix dominates).
#[must_use]
pub fn next_timestamp() -> String {
    let seq = COUNTER.fetch_add(1, Ordering::SeqCst) % 1000;
    let now = Local::now();
    format!("{}{seq:03}", now.format("%Y%m%d%H%M%S"))
}

/// Generate a short random suffix used to disambiguate filenames written
/// within the same timestamp.
#[must_use]
pub fn random_suffix() -> String {
    use rand::Rng;
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_seventeen_chars() {
        let ts = next_timestamp();
        assert_eq!(ts.len(), 17);
        assert!(ts.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn consecutive_timestamps_sort_increasing() {
        let mut prev = next_timestamp();
        for _ in 0..50 {
            let ts = next_timestamp();
            assert!(ts > prev, "{ts} should sort after {prev}");
            prev = ts;
        }
    }

    #[test]
    fn random_suffix_has_expected_length() {
        let s = random_suffix();
        assert_eq!(s.len(), 6);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
