//! Process-local dedupe of handled notifications

use dashmap::DashSet;
use xrelay_core::LogCoordinate;

/// Coordinates of logs this relayer has already picked up
///
/// Owned by one relayer instance. Losing it only costs repeated work; replay
/// protection lives on the destination.
#[derive(Debug, Default)]
pub struct SeenLogs {
    coordinates: DashSet<LogCoordinate>,
}

impl SeenLogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time a coordinate is marked
    pub fn mark(&self, coordinate: LogCoordinate) -> bool {
        self.coordinates.insert(coordinate)
    }

    pub fn contains(&self, coordinate: &LogCoordinate) -> bool {
        self.coordinates.contains(coordinate)
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xrelay_core::TxHash;

    fn coordinate(log_index: u32) -> LogCoordinate {
        LogCoordinate {
            chain_id: 1,
            block_number: 4,
            tx_hash: TxHash([2; 32]),
            log_index,
        }
    }

    #[test]
    fn test_mark_once() {
        let seen = SeenLogs::new();

        assert!(seen.mark(coordinate(0)));
        assert!(!seen.mark(coordinate(0)));
        assert!(seen.mark(coordinate(1)));

        assert!(seen.contains(&coordinate(1)));
        assert_eq!(seen.len(), 2);
    }
}
