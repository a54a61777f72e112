//! Contract for the external signal-processing pipeline.
//!
//! The demodulation chain (down-conversion, filtering, FM demodulation,
//! audio output) is an external collaborator. The tuner consumes it through
//! [`SignalPipeline`] only: a tuning command plus a continuously updated
//! power probe. Nothing in this crate depends on how the chain is built.

mod simulated;

pub use simulated::SimulatedPipeline;

use crate::error::PipelineError;

/// A running signal-processing pipeline, as seen by the tuner.
///
/// Implementations wrap real SDR flowgraphs or, for tests and hardware-less
/// operation, a simulation. All methods are synchronous; [`run`] blocks the
/// calling thread until [`stop`] and is expected to be driven from a
/// dedicated blocking task. Resource release happens on drop.
///
/// [`run`]: SignalPipeline::run
/// [`stop`]: SignalPipeline::stop
pub trait SignalPipeline: Send + Sync {
    /// Command the pipeline to retune to the given center frequency.
    ///
    /// Returns as soon as the command is accepted; the chain settles
    /// asynchronously, so callers must wait out the settle delay before
    /// trusting [`read_power`](SignalPipeline::read_power).
    fn tune(&self, frequency_hz: f64) -> Result<(), PipelineError>;

    /// The center frequency the pipeline currently reports, in Hz.
    fn tuned_frequency_hz(&self) -> f64;

    /// Instantaneous smoothed power estimate of the tuned signal.
    ///
    /// Noisy; meaningful detection requires averaging over a window.
    fn read_power(&self) -> Result<f64, PipelineError>;

    /// Run the chain until [`stop`](SignalPipeline::stop) is called.
    ///
    /// Blocks the calling thread for the whole time. The pipeline never
    /// reaches a terminal state on its own.
    fn run(&self) -> Result<(), PipelineError>;

    /// Signal the chain to halt. Idempotent; safe on a pipeline that never
    /// started or already stopped.
    fn stop(&self);
}
