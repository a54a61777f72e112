//! Band scanner: sweeps the FM band and detects active stations.
//!
//! # How It Works
//!
//! 1. Candidate frequencies are generated from the configured band bounds
//!    and channel step, ascending.
//! 2. For each candidate the pipeline is retuned (with bounded retry), the
//!    settle delay is waited out, and power samples are accumulated on a
//!    fixed tick over the measurement window.
//! 3. A candidate whose mean power exceeds the detection threshold is
//!    recorded as a station.
//! 4. The sweep result is handed back to the caller; the tuner context
//!    publishes it atomically.
//!
//! A cancellation token is checked between frequency steps only, so an
//! uncancelled sweep behaves identically with or without a token attached.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::ScanConfig;
use crate::error::{PipelineError, TunerError};
use crate::pipeline::SignalPipeline;

/// Progress notifications emitted during a sweep.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A sweep started over this many candidate frequencies.
    Started { candidates: usize },
    /// A candidate exceeded the detection threshold.
    StationFound { frequency_mhz: f64, power: f64 },
    /// The sweep completed and found this many stations.
    Finished { station_count: usize },
}

/// Result of a completed sweep.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Discovered station frequencies in MHz, ascending.
    pub stations: Vec<f64>,
    /// Number of candidate frequencies visited.
    pub candidates: usize,
    /// Candidates skipped because retuning kept failing.
    pub skipped: usize,
    /// Wall-clock duration of the sweep.
    pub elapsed: Duration,
}

/// A single-sweep scanner over the configured band.
///
/// One sweep per scanner instance; the tuner context creates one per scan
/// request and serializes them.
pub struct BandScanner {
    config: ScanConfig,
    pipeline: Arc<dyn SignalPipeline>,
    events: broadcast::Sender<ScanEvent>,
}

impl BandScanner {
    pub fn new(
        config: ScanConfig,
        pipeline: Arc<dyn SignalPipeline>,
        events: broadcast::Sender<ScanEvent>,
    ) -> Self {
        Self {
            config,
            pipeline,
            events,
        }
    }

    /// Sweep the band once.
    ///
    /// Blocks the calling task for the whole sweep (settle delay plus
    /// measurement window per candidate, tens of seconds for a full band).
    /// Cancellation is honored between frequency steps; a cancelled sweep
    /// returns [`TunerError::Cancelled`] and reports nothing.
    pub async fn sweep(&self, cancel: &CancellationToken) -> Result<ScanOutcome, TunerError> {
        let candidates = self.config.candidate_frequencies();
        info!(
            "BandScanner: starting sweep of {} candidates, {:.1}-{:.1} MHz step {:.1} MHz",
            candidates.len(),
            self.config.band_start_mhz,
            self.config.band_stop_mhz,
            self.config.step_mhz,
        );
        let _ = self.events.send(ScanEvent::Started {
            candidates: candidates.len(),
        });

        let started = Instant::now();
        let mut stations = Vec::new();
        let mut skipped = 0usize;

        for &frequency_mhz in &candidates {
            if cancel.is_cancelled() {
                info!(
                    "BandScanner: sweep cancelled at {:.1} MHz after {} station(s)",
                    frequency_mhz,
                    stations.len()
                );
                return Err(TunerError::Cancelled);
            }

            if let Err(e) = self.tune_with_retry(frequency_mhz).await {
                warn!(
                    "BandScanner: skipping {:.1} MHz, retune failed after {} attempt(s): {}",
                    frequency_mhz,
                    self.config.tune_retries.max(1),
                    e
                );
                skipped += 1;
                continue;
            }

            // Filters and AGC need to stabilize on the new frequency before
            // the probe output means anything.
            tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;

            let Some(mean_power) = self.measure_mean_power().await else {
                debug!(
                    "BandScanner: no valid samples at {:.1} MHz, skipping",
                    frequency_mhz
                );
                continue;
            };

            if mean_power > self.config.power_threshold {
                info!(
                    "BandScanner: found station {:.1} MHz, mean power {:.6}",
                    frequency_mhz, mean_power
                );
                stations.push(frequency_mhz);
                let _ = self.events.send(ScanEvent::StationFound {
                    frequency_mhz,
                    power: mean_power,
                });
            } else {
                debug!(
                    "BandScanner: {:.1} MHz below threshold (mean power {:.6})",
                    frequency_mhz, mean_power
                );
            }
        }

        let outcome = ScanOutcome {
            candidates: candidates.len(),
            skipped,
            elapsed: started.elapsed(),
            stations,
        };
        info!(
            "BandScanner: sweep finished, {} station(s) found, {} candidate(s) skipped, {:.1}s",
            outcome.stations.len(),
            outcome.skipped,
            outcome.elapsed.as_secs_f64()
        );
        let _ = self.events.send(ScanEvent::Finished {
            station_count: outcome.stations.len(),
        });
        Ok(outcome)
    }

    /// Retune the pipeline, retrying transient failures a bounded number of
    /// times before giving up on this candidate.
    async fn tune_with_retry(&self, frequency_mhz: f64) -> Result<(), PipelineError> {
        let frequency_hz = frequency_mhz * 1e6;
        let attempts = self.config.tune_retries.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.pipeline.tune(frequency_hz) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!(
                        "BandScanner: tune to {:.1} MHz failed (attempt {}/{}): {}",
                        frequency_mhz, attempt, attempts, e
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_millis(self.config.tune_retry_delay_ms))
                            .await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or(PipelineError::Stopped))
    }

    /// Mean probe power over the measurement window, sampled on a fixed
    /// tick. Failed samples are dropped from the mean; returns `None` if no
    /// sample succeeded.
    async fn measure_mean_power(&self) -> Option<f64> {
        let window = Duration::from_millis(self.config.measure_window_ms);
        let mut ticker = interval(Duration::from_millis(self.config.sample_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let started = Instant::now();
        let mut sum = 0.0f64;
        let mut count = 0u32;

        loop {
            ticker.tick().await;
            match self.pipeline.read_power() {
                Ok(power) => {
                    sum += power;
                    count += 1;
                }
                Err(e) => {
                    debug!("BandScanner: dropping failed power sample: {}", e);
                }
            }
            if started.elapsed() >= window {
                break;
            }
        }

        if count == 0 {
            None
        } else {
            Some(sum / f64::from(count))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuner::test_support::MockPipeline;

    fn fast_config() -> ScanConfig {
        // Virtual-time friendly: the default timings, relied on by the
        // paused-clock tests to elapse instantly.
        ScanConfig::default()
    }

    fn scanner_for(pipeline: Arc<MockPipeline>, config: ScanConfig) -> BandScanner {
        let (events, _) = broadcast::channel(128);
        BandScanner::new(config, pipeline, events)
    }

    #[tokio::test(start_paused = true)]
    async fn test_constant_power_above_threshold_finds_every_candidate() {
        let pipeline = Arc::new(MockPipeline::with_power(|_| Ok(0.01)));
        let config = fast_config();
        let expected = config.candidate_frequencies();
        let scanner = scanner_for(pipeline, config);

        let outcome = scanner.sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.stations, expected);
        assert_eq!(outcome.candidates, expected.len());
        assert_eq!(outcome.skipped, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_constant_power_below_threshold_finds_nothing() {
        let pipeline = Arc::new(MockPipeline::with_power(|_| Ok(0.0001)));
        let scanner = scanner_for(pipeline, fast_config());

        let outcome = scanner.sweep(&CancellationToken::new()).await.unwrap();
        assert!(outcome.stations.is_empty());
        assert_eq!(outcome.skipped, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_strong_frequencies_are_reported() {
        let pipeline = Arc::new(MockPipeline::with_power(|mhz| {
            if (mhz - 95.5).abs() < 0.05 || (mhz - 101.1).abs() < 0.05 {
                Ok(0.004)
            } else {
                Ok(0.00005)
            }
        }));
        let config = fast_config();
        let scanner = scanner_for(pipeline, config.clone());

        let outcome = scanner.sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.stations.len(), 2);
        assert!((outcome.stations[0] - 95.5).abs() < 1e-6);
        assert!((outcome.stations[1] - 101.1).abs() < 1e-6);

        // Every reported station sits on the configured step grid inside
        // the band.
        for &station in &outcome.stations {
            assert!(station >= config.band_start_mhz - 1e-9);
            assert!(station <= config.band_stop_mhz + 1e-6);
            let steps = (station - config.band_start_mhz) / config.step_mhz;
            assert!((steps - steps.round()).abs() < 1e-6);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_station_count_never_exceeds_capacity() {
        let pipeline = Arc::new(MockPipeline::with_power(|_| Ok(1.0)));
        let config = fast_config();
        let max = config.max_stations();
        let scanner = scanner_for(pipeline, config);

        let outcome = scanner.sweep(&CancellationToken::new()).await.unwrap();
        assert!(outcome.stations.len() <= max);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_tune_skips_only_that_candidate() {
        let pipeline = Arc::new(MockPipeline::with_power(|_| Ok(0.01)));
        pipeline.fail_tuning_at(90.1);
        let config = fast_config();
        let expected: Vec<f64> = config
            .candidate_frequencies()
            .into_iter()
            .filter(|f| (f - 90.1).abs() > 1e-6)
            .collect();
        let retries = config.tune_retries;
        let scanner = scanner_for(pipeline.clone(), config);

        let outcome = scanner.sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.stations, expected);
        assert_eq!(outcome.skipped, 1);
        // The failing frequency was retried the configured number of times.
        assert_eq!(pipeline.tune_attempts_at(90.1), retries);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_power_samples_are_dropped_from_the_mean() {
        // Every other sample fails; the surviving samples still average
        // above the threshold.
        let flip = std::sync::atomic::AtomicBool::new(false);
        let pipeline = Arc::new(MockPipeline::with_power(move |_| {
            if flip.fetch_xor(true, std::sync::atomic::Ordering::SeqCst) {
                Err(crate::error::PipelineError::PowerRead("probe hiccup".into()))
            } else {
                Ok(0.01)
            }
        }));
        let scanner = scanner_for(pipeline, fast_config());

        let outcome = scanner.sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.candidates, outcome.stations.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_token_aborts_before_first_step() {
        let pipeline = Arc::new(MockPipeline::with_power(|_| Ok(0.01)));
        let scanner = scanner_for(pipeline.clone(), fast_config());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = scanner.sweep(&cancel).await;
        assert_eq!(result.unwrap_err(), TunerError::Cancelled);
        assert_eq!(pipeline.total_tune_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_events_bracket_the_sweep() {
        let pipeline = Arc::new(MockPipeline::with_power(|mhz| {
            if (mhz - 99.9).abs() < 0.05 {
                Ok(0.01)
            } else {
                Ok(0.00001)
            }
        }));
        let (events, mut rx) = broadcast::channel(256);
        let config = fast_config();
        let candidates = config.max_stations();
        let scanner = BandScanner::new(config, pipeline, events);

        scanner.sweep(&CancellationToken::new()).await.unwrap();

        match rx.try_recv().unwrap() {
            ScanEvent::Started { candidates: n } => assert_eq!(n, candidates),
            other => panic!("expected Started, got {:?}", other),
        }
        match rx.try_recv().unwrap() {
            ScanEvent::StationFound { frequency_mhz, power } => {
                assert!((frequency_mhz - 99.9).abs() < 1e-6);
                assert!(power > 0.0002);
            }
            other => panic!("expected StationFound, got {:?}", other),
        }
        match rx.try_recv().unwrap() {
            ScanEvent::Finished { station_count } => assert_eq!(station_count, 1),
            other => panic!("expected Finished, got {:?}", other),
        }
    }
}
