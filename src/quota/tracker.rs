//! Per-user request counting with an atomic check-and-increment.

use dashmap::DashMap;

/// Result of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    /// Whether the request fits inside the quota.
    pub allowed: bool,
    /// The user's count after this call.
    pub count: u64,
}

/// Concurrency-safe per-username request counters.
///
/// The map is sharded by username hash. Each `check_and_increment` holds the
/// shard's write lock for the whole read, compare and write sequence, so two
/// calls for the same user never interleave while different users can
/// proceed in parallel. Counters only grow; there is no reset.
#[derive(Debug, Default)]
pub struct QuotaTracker {
    counts: DashMap<String, u64>,
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request for `username` if it is still below `threshold`.
    ///
    /// At or above the threshold the request is refused and nothing is
    /// written.
    pub fn check_and_increment(&self, username: &str, threshold: u64) -> QuotaDecision {
        if let Some(mut count) = self.counts.get_mut(username) {
            return bump(&mut *count, threshold);
        }

        if threshold == 0 {
            return QuotaDecision {
                allowed: false,
                count: 0,
            };
        }

        // First request for this user, or another caller raced us to insert it.
        let mut count = self.counts.entry(username.to_owned()).or_insert(0);
        bump(&mut *count, threshold)
    }

    /// Current count for `username` (0 if never seen).
    pub fn count(&self, username: &str) -> u64 {
        self.counts.get(username).map(|c| *c).unwrap_or(0)
    }

    /// Number of users with at least one counted request.
    pub fn tracked_users(&self) -> usize {
        self.counts.len()
    }
}

fn bump(count: &mut u64, threshold: u64) -> QuotaDecision {
    if *count >= threshold {
        return QuotaDecision {
            allowed: false,
            count: *count,
        };
    }
    *count += 1;
    QuotaDecision {
        allowed: true,
        count: *count,
    }
}
