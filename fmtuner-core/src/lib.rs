//! Control core for an SDR FM broadcast receiver.
//!
//! This crate wraps a signal-processing pipeline (an external collaborator,
//! consumed through the [`SignalPipeline`] trait) with a small control
//! layer: frequency set/get, start/stop, and an automated band scan that
//! discovers which frequencies carry an active broadcast.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use fmtuner_core::{ScanConfig, SimulatedPipeline, Tuner};
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() -> Result<(), fmtuner_core::TunerError> {
//! let pipeline = Arc::new(SimulatedPipeline::new(101.9).with_station(95.5, 0.01));
//! let tuner = Tuner::new(pipeline, ScanConfig::default());
//!
//! tuner.set_frequency_mhz(95.5)?;
//! assert_eq!(tuner.frequency_mhz(), 95.5);
//!
//! let stations = tuner.scan_stations().await?;
//! assert_eq!(stations, vec![95.5]);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod tuner;

pub use config::{AudioSinkKind, ScanConfig, TunerConfig};
pub use error::{PipelineError, TunerError};
pub use pipeline::{SignalPipeline, SimulatedPipeline};
pub use tuner::{BandScanner, ScanEvent, ScanOutcome, Tuner};
