//! The error taxonomy of the engine (spec §7).
//!
//! Every fallible entry point returns [`Result<T, Error>`](Error). Errors
//! raised on one process are always treated as fatal for the whole
//! computation: there is no recovery from a lost or diverging process.

use thiserror::Error;

/// Errors the engine can return.
#[derive(Debug, Error)]
pub enum Error {
    /// An input-shape error: mismatched array lengths, `k > n`, a
    /// negative epsilon, a `hierLevels` product that doesn't equal
    /// `num_blocks`, and so on. Fails immediately, before any collective
    /// runs, so no partial state is produced.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A coordinate axis whose global range is zero; the Hilbert mapping
    /// is undefined on a degenerate extent.
    #[error("degenerate coordinate range on axis {axis}")]
    DegenerateRange {
        /// The axis (0-based) with zero global range.
        axis: usize,
    },

    /// NaN/infinite coordinate, negative/NaN weight, or a non-positive
    /// influence ratio.
    #[error("numeric anomaly: {0}")]
    Numeric(String),

    /// A collective operation failed, or returned data whose shape
    /// doesn't match what every process agreed to send/receive. Fatal:
    /// the core never retries a collective.
    #[error("collective communication failure: {0}")]
    Communication(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
