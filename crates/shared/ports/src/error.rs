use thiserror::Error;

/// Failure applying a payload to the entity cache
///
/// Always recoverable: the core logs it and still dispatches the event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Malformed payload for {event}: {reason}")]
    Malformed { event: String, reason: String },

    #[error("Cache backend failure: {0}")]
    Backend(String),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Failure evaluating a shard gating condition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    #[error("Condition unavailable: {0}")]
    Unavailable(String),

    #[error("Condition check failed: {0}")]
    Failed(String),
}
