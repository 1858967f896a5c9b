//! Custom error types for the inspection core.
//!
//! This module defines the primary error type, `InspectError`, for the whole
//! crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different kinds of errors that can occur,
//! from configuration issues to lifecycle misuse of the dispatcher.
//!
//! Note that the expected runtime anomalies of the dispatch path
//! (overtriggering, missing frames, out-of-order frames) are deliberately
//! *not* errors. They are classified per frame as a
//! [`ProcessingMode`](crate::dispatcher::ProcessingMode) and surfaced as
//! ordinary results, so an operator sees inspection-quality impact rather
//! than a silent gap.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type InspectResult<T> = std::result::Result<T, InspectError>;

#[derive(Error, Debug)]
pub enum InspectError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No product has been activated")]
    NoActiveProduct,

    #[error("Unknown seam series {0}")]
    UnknownSeamSeries(i32),

    #[error("Unknown seam {seam} in seam series {series}")]
    UnknownSeam { series: i32, seam: i32 },

    #[error("Seam {0} has no seam intervals")]
    EmptySeam(i32),
}
