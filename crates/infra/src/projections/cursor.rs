use std::collections::HashMap;
use std::sync::RwLock;

use forgecrm_core::AggregateId;

use super::ProjectionError;

/// Per-stream sequence tracking for idempotent projections.
///
/// `advance` returns whether the envelope is new for its stream; duplicates
/// and replays (at-least-once delivery, rebuilds) report `false` and must be
/// ignored by the caller.
#[derive(Debug, Default)]
pub struct SequenceCursors {
    inner: RwLock<HashMap<AggregateId, u64>>,
}

impl SequenceCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(
        &self,
        aggregate_id: AggregateId,
        sequence_number: u64,
    ) -> Result<bool, ProjectionError> {
        if sequence_number == 0 {
            return Err(ProjectionError::InvalidSequence {
                found: sequence_number,
            });
        }

        let mut cursors = self
            .inner
            .write()
            .map_err(|_| ProjectionError::Conflict("cursor lock poisoned".to_string()))?;

        let last = cursors.entry(aggregate_id).or_insert(0);
        if sequence_number <= *last {
            return Ok(false);
        }
        *last = sequence_number;
        Ok(true)
    }

    pub fn reset(&self) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_are_reported_stale() {
        let cursors = SequenceCursors::new();
        let id = AggregateId::new();

        assert!(cursors.advance(id, 1).unwrap());
        assert!(cursors.advance(id, 2).unwrap());
        assert!(!cursors.advance(id, 2).unwrap());
        assert!(!cursors.advance(id, 1).unwrap());
        assert!(cursors.advance(id, 3).unwrap());
    }

    #[test]
    fn zero_sequence_is_invalid() {
        let cursors = SequenceCursors::new();
        assert!(cursors.advance(AggregateId::new(), 0).is_err());
    }

    #[test]
    fn streams_are_independent() {
        let cursors = SequenceCursors::new();
        let a = AggregateId::new();
        let b = AggregateId::new();

        assert!(cursors.advance(a, 5).unwrap());
        assert!(cursors.advance(b, 1).unwrap());
    }
}
