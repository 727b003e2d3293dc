use serde::{Deserialize, Serialize};

/// Terminal result of asking a shard session to connect.
///
/// None of these is an error for the caller: every outcome either finishes
/// the attempt or sends the shard back to the connect queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectOutcome {
    /// A fresh identify succeeded; consumes identify quota
    Ready,
    /// An existing session was resumed; no identify quota used
    Resumed,
    /// The connection could not be established; the shard must be re-queued
    Failed,
    /// A reply the lifecycle does not know how to interpret
    Unrecognized(String),
}

impl ConnectOutcome {
    /// Whether the shard needs to go back into the connect queue
    pub fn needs_requeue(&self) -> bool {
        matches!(self, ConnectOutcome::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_classification() {
        assert!(!ConnectOutcome::Ready.needs_requeue());
        assert!(!ConnectOutcome::Resumed.needs_requeue());
        assert!(ConnectOutcome::Failed.needs_requeue());
        assert!(!ConnectOutcome::Unrecognized("ZOMBIE".into()).needs_requeue());
    }
}
