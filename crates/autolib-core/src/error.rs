//! Common error taxonomy for all capability operations.
//!
//! Every OS-specific failure is mapped into one of these kinds at the
//! platform adapter boundary. The capability layer and the monitor never
//! invent new kinds, they only forward.

use thiserror::Error;

/// Uniform error kinds, independent of the origin OS.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The native capability layer is unavailable. Terminal for the
    /// process lifetime unless the backend is reloaded.
    #[error("native capability layer is not loaded")]
    NotLoaded,
    /// The OS declined due to a missing accessibility / input-monitoring
    /// grant. Recoverable by the user granting permission; never
    /// auto-retried.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The OS rejected or could not complete synthetic input.
    #[error("injection failed: {0}")]
    Injection(String),
    /// A window/process/selection query failed.
    #[error("query failed: {0}")]
    Query(String),
    /// Hook install/removal failed for a reason other than permission.
    #[error("monitor error: {0}")]
    Monitor(String),
}

/// Result type for capability operations.
pub type CapabilityResult<T> = Result<T, CapabilityError>;
