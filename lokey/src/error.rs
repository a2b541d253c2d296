//! Error kinds shared across the keymap engine.
//!
//! One flat enum rather than per-component error types, so that call sites
//! (in particular the management/inspection RPC boundary) can match
//! exhaustively without juggling several `From` conversions.

use derive_more::{Display, Error, From};

/// A layer index or key position fell outside its valid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
#[display("index {index} out of range (limit {limit})")]
pub struct DomainRange {
    pub index: u32,
    pub limit: u32,
}

/// Error kinds surfaced by the keymap engine.
///
/// Mirrors the error categories a caller outside this crate needs to react
/// to; it deliberately does not distinguish every internal failure mode.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// A layer or position index was out of range.
    #[display("{_0}")]
    DomainRange(DomainRange),
    /// A behavior name or local ID did not resolve to a registered behavior.
    #[display("unknown behavior")]
    UnknownBehavior,
    /// The validator rejected a binding's parameters.
    #[display("invalid parameters")]
    InvalidParameters,
    /// The operation is not supported in this build.
    #[display("unsupported in this build")]
    Unsupported,
    /// A scan source or behavior device failed a readiness check.
    #[display("device not ready")]
    DeviceNotReady,
    /// The underlying key-value store failed.
    #[display("persistence I/O error")]
    PersistenceIo,
}

impl Error {
    pub fn domain_range(index: u32, limit: u32) -> Self {
        Self::DomainRange(DomainRange { index, limit })
    }
}
