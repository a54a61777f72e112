//! Configuration for the tuner and the band scanner.
//!
//! All timing values carry explicit units in their field names. The defaults
//! are the empirically calibrated values for a stock RTL dongle; they are
//! hardware dependent and deliberately configurable rather than baked in.

use serde::Deserialize;

/// Band scan parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Lower edge of the scanned band (MHz, inclusive).
    pub band_start_mhz: f64,
    /// Upper edge of the scanned band (MHz, inclusive).
    pub band_stop_mhz: f64,
    /// Channel spacing between scan candidates (MHz).
    pub step_mhz: f64,
    /// Wait after retuning before power readings are considered valid (ms).
    /// Filters and AGC need this long to stabilize on the new frequency.
    pub settle_delay_ms: u64,
    /// Length of the power measurement window per frequency (ms).
    pub measure_window_ms: u64,
    /// Interval between power samples inside the measurement window (ms).
    pub sample_interval_ms: u64,
    /// Minimum mean power for a frequency to count as an active station.
    /// Unit-less, relative to the pipeline's power metric.
    pub power_threshold: f64,
    /// Retune attempts per frequency before the step is skipped.
    pub tune_retries: u32,
    /// Wait between retune attempts (ms).
    pub tune_retry_delay_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            band_start_mhz: 87.9,      // US FM band plan
            band_stop_mhz: 107.9,
            step_mhz: 0.2,
            settle_delay_ms: 1000,
            measure_window_ms: 200,
            sample_interval_ms: 10,
            power_threshold: 0.0002,
            tune_retries: 3,
            tune_retry_delay_ms: 200,
        }
    }
}

impl ScanConfig {
    /// Candidate frequencies for a sweep, ascending, both band edges
    /// inclusive. Generated from the step index so floating point drift
    /// cannot accumulate across the band, then snapped to a 100 Hz grid so
    /// published frequencies read cleanly in MHz.
    pub fn candidate_frequencies(&self) -> Vec<f64> {
        if self.step_mhz <= 0.0 || self.band_stop_mhz < self.band_start_mhz {
            return Vec::new();
        }
        let span = self.band_stop_mhz - self.band_start_mhz;
        let steps = (span / self.step_mhz + 1e-9).floor() as usize;
        (0..=steps)
            .map(|i| {
                let mhz = self.band_start_mhz + i as f64 * self.step_mhz;
                (mhz * 1e4).round() / 1e4
            })
            .collect()
    }

    /// Upper bound on the number of stations a scan can report.
    pub fn max_stations(&self) -> usize {
        self.candidate_frequencies().len()
    }
}

/// Tuner-level settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Frequency the pipeline starts on (MHz).
    pub initial_frequency_mhz: f64,
    /// Where demodulated audio is rendered.
    pub sink: AudioSinkKind,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            initial_frequency_mhz: 101.9,
            sink: AudioSinkKind::Null,
        }
    }
}

/// Audio sink selector handed to pipeline construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioSinkKind {
    /// ALSA output device.
    Alsa,
    /// PulseAudio output.
    Pulse,
    /// Discard audio (scan-only operation).
    Null,
}
