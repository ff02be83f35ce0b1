use thiserror::Error;

/// Step-level error kinds. A failure in one pipeline step is caught and
/// reported without stopping the independent steps that follow it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Referenced stage/match/tournament missing; aborts that step only.
    #[error("{0} not found")]
    NotFound(String),

    /// Bad stage wiring (e.g. a knockout config referencing a stage that
    /// does not exist). Logged and skipped, never thrown across steps.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A write that would break a lifecycle invariant (reseeding a bracket
    /// with finished matches, cross-round pointer). The specific write is
    /// rejected; prior state stays untouched.
    #[error("guard violated: {0}")]
    GuardViolated(String),

    /// Not enough data to produce a meaningful result.
    #[error("partial data: {0}")]
    PartialData(String),

    #[error("storage: {0}")]
    Storage(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
