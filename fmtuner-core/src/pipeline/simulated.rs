//! Simulated signal pipeline for hardware-less operation and tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

use log::debug;

use crate::error::PipelineError;
use crate::pipeline::SignalPipeline;

/// Power reported off-station, well below any sensible detection threshold.
const NOISE_FLOOR: f64 = 0.00005;

/// How close a tuned frequency must be to a simulated station to pick up
/// its carrier (MHz). Half the standard 0.2 MHz channel spacing.
const CAPTURE_RANGE_MHZ: f64 = 0.1;

/// An in-process stand-in for a real demodulation chain.
///
/// Carries a table of synthetic stations; the power probe returns a
/// station's power when the pipeline is tuned within capture range of it and
/// the noise floor otherwise. `run` parks the calling thread until `stop`.
pub struct SimulatedPipeline {
    /// Tuned center frequency in Hz, stored as f64 bits.
    tuned_hz: AtomicU64,
    /// (frequency MHz, power) of each simulated carrier.
    stations: Vec<(f64, f64)>,
    /// Stop latch; `run` waits on it, `stop` sets it.
    stopped: Mutex<bool>,
    stop_signal: Condvar,
}

impl SimulatedPipeline {
    /// Create a pipeline with no carriers, tuned to the given frequency.
    pub fn new(initial_frequency_mhz: f64) -> Self {
        Self {
            tuned_hz: AtomicU64::new((initial_frequency_mhz * 1e6).to_bits()),
            stations: Vec::new(),
            stopped: Mutex::new(false),
            stop_signal: Condvar::new(),
        }
    }

    /// Add a synthetic carrier at `frequency_mhz` with the given probe power.
    #[must_use]
    pub fn with_station(mut self, frequency_mhz: f64, power: f64) -> Self {
        self.stations.push((frequency_mhz, power));
        self
    }
}

impl SignalPipeline for SimulatedPipeline {
    fn tune(&self, frequency_hz: f64) -> Result<(), PipelineError> {
        self.tuned_hz.store(frequency_hz.to_bits(), Ordering::SeqCst);
        Ok(())
    }

    fn tuned_frequency_hz(&self) -> f64 {
        f64::from_bits(self.tuned_hz.load(Ordering::SeqCst))
    }

    fn read_power(&self) -> Result<f64, PipelineError> {
        let tuned_mhz = self.tuned_frequency_hz() / 1e6;
        let carrier = self
            .stations
            .iter()
            .find(|(freq, _)| (freq - tuned_mhz).abs() <= CAPTURE_RANGE_MHZ)
            .map(|(_, power)| *power);
        Ok(carrier.unwrap_or(NOISE_FLOOR))
    }

    fn run(&self) -> Result<(), PipelineError> {
        debug!("SimulatedPipeline: running");
        let mut stopped = self
            .stopped
            .lock()
            .map_err(|_| PipelineError::Device("stop latch poisoned".into()))?;
        while !*stopped {
            stopped = self
                .stop_signal
                .wait(stopped)
                .map_err(|_| PipelineError::Device("stop latch poisoned".into()))?;
        }
        debug!("SimulatedPipeline: stopped");
        Ok(())
    }

    fn stop(&self) {
        if let Ok(mut stopped) = self.stopped.lock() {
            *stopped = true;
        }
        self.stop_signal.notify_all();
    }
}
