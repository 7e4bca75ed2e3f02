use thiserror::Error;

/// Failure taxonomy for the automation engine.
///
/// Only `Transient` failures are retried by the call wrapper; everything
/// else propagates immediately. Resolution misses are not errors at all,
/// the resolver reports those as a plain `None`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The hierarchy dump could not be parsed as an element tree, even
    /// after the single escaping-repair pass.
    #[error("malformed hierarchy: {0}")]
    MalformedHierarchy(String),

    /// Timeout / rate-limit class failure on a device or planner call.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Anything else. Never retried.
    #[error("{0}")]
    Fatal(String),
}

impl EngineError {
    pub fn transient(msg: impl Into<String>) -> Self {
        EngineError::Transient(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        EngineError::Fatal(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }
}
