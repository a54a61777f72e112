//! Error types for the tuner control layer.

use thiserror::Error;

/// Errors reported by a signal pipeline implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The pipeline failed to retune to the requested frequency.
    #[error("Failed to tune to {frequency_hz} Hz: {reason}")]
    Tune { frequency_hz: f64, reason: String },

    /// The power probe could not be read.
    #[error("Failed to read signal power: {0}")]
    PowerRead(String),

    /// The underlying device is gone or misconfigured.
    #[error("Pipeline device error: {0}")]
    Device(String),

    /// The pipeline has been stopped and cannot serve the request.
    #[error("Pipeline is stopped")]
    Stopped,
}

/// Errors reported by the tuner control API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TunerError {
    /// A band scan is already running on this tuner.
    #[error("A band scan is already in progress")]
    ScanInProgress,

    /// The scan was cancelled between frequency steps.
    #[error("Band scan cancelled")]
    Cancelled,

    /// `run` was called while the pipeline is already being driven.
    #[error("Tuner is already running")]
    AlreadyRunning,

    /// The pipeline reported an error the tuner could not recover from.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}
