//! Error Types
//!
//! One error enum for the whole compiler, with a variant per failure class:
//! caller mistakes (`Precondition`), documented absences (`NotImplemented`),
//! violated internal invariants (`Internal`), solver timeouts
//! (`DeadlineExceeded`), and solver-reported unsatisfiability of a system
//! that is satisfiable by construction (`Unsatisfiable`).
//!
//! Every fallible operation returns [`Result`]; callers propagate with `?`
//! and only render a diagnostic at module boundaries.

use thiserror::Error;

/// Compiler errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Caller violated an input constraint
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// An operator path that is intentionally absent
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// An invariant established upstream does not hold at the point of use
    #[error("internal error: {0}")]
    Internal(String),

    /// The numerical solver ran out of time or memory
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// The solver rejected a system that must be satisfiable by construction
    #[error("unsatisfiable: {0}")]
    Unsatisfiable(String),
}

/// Result type for compiler operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a `Precondition` error with a formatted message.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Error::Precondition(msg.into())
    }

    /// Shorthand for an `Internal` error with a formatted message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Shorthand for a `NotImplemented` error with a formatted message.
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Error::NotImplemented(msg.into())
    }
}
