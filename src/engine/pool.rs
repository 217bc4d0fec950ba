//! Connection slots and their partitioning across workers.
//!
//! The pool is a fixed set of slots addressed by index. Indices are split
//! into contiguous, disjoint ranges before any worker spawns, and each
//! worker is handed owned `ConnSlot` values for its range. Ownership is the
//! isolation boundary: no lock guards a slot because no slot ever has more
//! than one possible mutator.

use std::ops::Range;
use tokio::net::TcpStream;

/// One reusable connection lane, exclusively owned by a single worker.
#[derive(Debug)]
pub struct ConnSlot {
    /// Position in the global pool, recorded in every emitted record.
    pub index: usize,
    /// Live connection, if any. `None` means the slot is idle.
    pub stream: Option<TcpStream>,
    /// Successful sends on the current connection.
    pub sent: usize,
}

impl ConnSlot {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            stream: None,
            sent: 0,
        }
    }

    /// Whether the slot currently holds a live connection.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Drop any live connection and return the slot to idle.
    pub fn reset(&mut self) {
        self.stream = None;
        self.sent = 0;
    }
}

/// Split `[0, connections)` into `workers` contiguous ranges by ceiling
/// division. Worker `i` owns `[i*per, min((i+1)*per, connections))`.
///
/// The result is validated, not assumed: the ranges must be disjoint,
/// in order, and cover every index exactly once. Ceiling division can leave
/// trailing ranges empty (e.g. 4 slots over 3 workers); a worker handed an
/// empty range parks until shutdown instead of driving slots.
///
/// # Panics
/// Panics if `workers` is zero or the computed ranges fail validation;
/// both are unreachable for a validated configuration.
pub fn partition(connections: usize, workers: usize) -> Vec<Range<usize>> {
    assert!(workers > 0, "worker count must be positive");
    let per = connections.div_ceil(workers);

    let ranges: Vec<Range<usize>> = (0..workers)
        .map(|i| {
            let start = i * per;
            let end = ((i + 1) * per).min(connections);
            start.min(connections)..end
        })
        .collect();

    // Covering and disjoint: consecutive ranges must chain exactly.
    let mut next = 0;
    for (i, r) in ranges.iter().enumerate() {
        assert!(
            r.start == next && r.end >= r.start,
            "partition range {i} ({r:?}) does not chain at {next}"
        );
        next = r.end;
    }
    assert!(
        next == connections,
        "partition covers {next} of {connections} slots"
    );

    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_starts_idle() {
        let slot = ConnSlot::new(7);
        assert_eq!(slot.index, 7);
        assert!(!slot.is_connected());
        assert_eq!(slot.sent, 0);
    }

    #[test]
    fn slot_reset_clears_state() {
        let mut slot = ConnSlot::new(0);
        slot.sent = 5;
        slot.reset();
        assert!(!slot.is_connected());
        assert_eq!(slot.sent, 0);
    }

    #[test]
    fn partition_even_split() {
        // workers=2, connections=4 -> {0,1} and {2,3}
        let ranges = partition(4, 2);
        assert_eq!(ranges, vec![0..2, 2..4]);
    }

    #[test]
    fn partition_uneven_split() {
        // ceil(10/3) = 4 -> 0..4, 4..8, 8..10
        let ranges = partition(10, 3);
        assert_eq!(ranges, vec![0..4, 4..8, 8..10]);
    }

    #[test]
    fn partition_one_slot_per_worker() {
        let ranges = partition(3, 3);
        assert_eq!(ranges, vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn partition_covers_exactly_once() {
        for workers in 1..=8 {
            for connections in workers..=40 {
                let ranges = partition(connections, workers);
                assert_eq!(ranges.len(), workers);

                let mut seen = vec![0u8; connections];
                for r in &ranges {
                    for i in r.clone() {
                        seen[i] += 1;
                    }
                }
                assert!(
                    seen.iter().all(|&c| c == 1),
                    "workers={workers} connections={connections}: {seen:?}"
                );
            }
        }
    }

    #[test]
    fn partition_trailing_range_may_be_empty() {
        // Ceiling division can starve trailing workers: ceil(4/3) = 2 gives
        // 0..2, 2..4 and an empty 4..4. Coverage still holds; the worker
        // loop handles the empty range by parking until shutdown.
        let ranges = partition(4, 3);
        assert_eq!(ranges, vec![0..2, 2..4, 4..4]);
        assert!(ranges[2].is_empty());
    }
}
