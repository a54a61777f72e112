//! Tuner context: the shared state and control API around one pipeline.
//!
//! The context is the single synchronization point between a running
//! pipeline, the band scanner, and control callers. It exclusively owns the
//! pipeline handle; nothing else may tune or stop it directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::ScanConfig;
use crate::error::{PipelineError, TunerError};
use crate::pipeline::SignalPipeline;
use crate::tuner::scanner::{BandScanner, ScanEvent};

/// Capacity of the scan progress broadcast channel. A full sweep emits one
/// event per discovery plus two bookends, so this never fills up in
/// practice; lagging subscribers just miss old events.
const SCAN_EVENT_CAPACITY: usize = 256;

/// Control surface over one signal pipeline.
///
/// Created once per tuner session and shared as an `Arc`. The pipeline is
/// stopped automatically when the last handle is dropped, so teardown is
/// idempotent by construction.
pub struct Tuner {
    /// Exclusively owned pipeline handle.
    pipeline: Arc<dyn SignalPipeline>,
    scan_config: ScanConfig,
    /// Stations found by the most recent completed scan, MHz ascending.
    /// Written only by the scanner, always by whole-list replacement.
    stations: RwLock<Vec<f64>>,
    /// Held for the entire duration of a sweep, not just the list swap, so
    /// two scans can never interleave.
    scan_guard: Mutex<()>,
    /// Token for the in-flight scan, if any.
    scan_cancel: std::sync::Mutex<Option<CancellationToken>>,
    running: AtomicBool,
    events: broadcast::Sender<ScanEvent>,
}

impl Tuner {
    /// Create a tuner context owning the given pipeline.
    pub fn new(pipeline: Arc<dyn SignalPipeline>, scan_config: ScanConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(SCAN_EVENT_CAPACITY);
        Arc::new(Self {
            pipeline,
            scan_config,
            stations: RwLock::new(Vec::new()),
            scan_guard: Mutex::new(()),
            scan_cancel: std::sync::Mutex::new(None),
            running: AtomicBool::new(false),
            events,
        })
    }

    /// Command the pipeline to the given frequency in MHz.
    ///
    /// Returns once the command is accepted; the pipeline settles
    /// asynchronously.
    pub fn set_frequency_mhz(&self, frequency_mhz: f64) -> Result<(), TunerError> {
        debug!("Tuner: set frequency {:.1} MHz", frequency_mhz);
        self.pipeline.tune(frequency_mhz * 1e6)?;
        Ok(())
    }

    /// The pipeline-reported center frequency in MHz.
    pub fn frequency_mhz(&self) -> f64 {
        self.pipeline.tuned_frequency_hz() / 1e6
    }

    /// Drive the pipeline until [`stop`](Tuner::stop).
    ///
    /// Blocks the calling task for as long as the pipeline runs; spawn it on
    /// a dedicated task. The other control methods stay usable concurrently.
    pub async fn run(&self) -> Result<(), TunerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(TunerError::AlreadyRunning);
        }
        info!("Tuner: pipeline starting");
        let pipeline = Arc::clone(&self.pipeline);
        let result = tokio::task::spawn_blocking(move || pipeline.run()).await;
        self.running.store(false, Ordering::SeqCst);
        match result {
            Ok(pipeline_result) => {
                info!("Tuner: pipeline stopped");
                pipeline_result.map_err(TunerError::from)
            }
            Err(e) => Err(TunerError::from(PipelineError::Device(format!(
                "pipeline task failed: {e}"
            )))),
        }
    }

    /// Signal the pipeline to halt. Idempotent; safe on a tuner that never
    /// started or already stopped.
    pub fn stop(&self) {
        self.pipeline.stop();
    }

    /// Whether [`run`](Tuner::run) is currently driving the pipeline.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run a full band scan and return the discovered stations in MHz.
    ///
    /// Synchronous with respect to the caller: the task blocks for the whole
    /// sweep (tens of seconds at default timings). On success the shared
    /// station list is replaced atomically with the new result, and the
    /// returned list is exactly what was published. A second scan requested
    /// while one is in flight is rejected with
    /// [`TunerError::ScanInProgress`].
    pub async fn scan_stations(&self) -> Result<Vec<f64>, TunerError> {
        let _guard = self
            .scan_guard
            .try_lock()
            .map_err(|_| TunerError::ScanInProgress)?;

        let token = CancellationToken::new();
        *self
            .scan_cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(token.clone());

        let scanner = BandScanner::new(
            self.scan_config.clone(),
            Arc::clone(&self.pipeline),
            self.events.clone(),
        );
        let result = scanner.sweep(&token).await;

        *self
            .scan_cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = None;

        let outcome = result?;
        {
            let mut stations = self.stations.write().await;
            *stations = outcome.stations.clone();
        }
        info!(
            "Tuner: published {} station(s) from scan",
            outcome.stations.len()
        );
        Ok(outcome.stations)
    }

    /// The most recently published scan result, without rescanning.
    pub async fn stations(&self) -> Vec<f64> {
        self.stations.read().await.clone()
    }

    /// Cancel the in-flight scan, if any. The scan aborts at its next
    /// frequency step without publishing a partial list.
    pub fn cancel_scan(&self) {
        let guard = self.scan_cancel.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = guard.as_ref() {
            info!("Tuner: cancelling band scan");
            token.cancel();
        }
    }

    /// Subscribe to scan progress notifications.
    pub fn subscribe_scan_events(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    /// The scan parameters this tuner was created with.
    pub fn scan_config(&self) -> &ScanConfig {
        &self.scan_config
    }
}

impl Drop for Tuner {
    fn drop(&mut self) {
        self.cancel_scan();
        self.pipeline.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuner::test_support::MockPipeline;
    use std::time::Duration;

    fn tuner_with(pipeline: Arc<MockPipeline>) -> Arc<Tuner> {
        Tuner::new(pipeline, ScanConfig::default())
    }

    #[tokio::test]
    async fn test_set_then_get_frequency_round_trips() {
        let tuner = tuner_with(Arc::new(MockPipeline::with_power(|_| Ok(0.0))));
        tuner.set_frequency_mhz(95.5).unwrap();
        assert!((tuner.frequency_mhz() - 95.5).abs() < 1e-9);

        tuner.set_frequency_mhz(107.9).unwrap();
        assert!((tuner.frequency_mhz() - 107.9).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_returns_exactly_what_it_publishes() {
        let pipeline = Arc::new(MockPipeline::with_power(|mhz| {
            if (mhz - 95.5).abs() < 0.05 || (mhz - 104.3).abs() < 0.05 {
                Ok(0.01)
            } else {
                Ok(0.00001)
            }
        }));
        let tuner = tuner_with(pipeline);

        let scanned = tuner.scan_stations().await.unwrap();
        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned, tuner.stations().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_scan_is_rejected_and_cancel_aborts_cleanly() {
        let pipeline = Arc::new(MockPipeline::with_power(|_| Ok(0.01)));
        let tuner = tuner_with(pipeline);

        let background = {
            let tuner = Arc::clone(&tuner);
            tokio::spawn(async move { tuner.scan_stations().await })
        };
        // Let the background scan take the guard and park on its first
        // settle delay.
        tokio::task::yield_now().await;

        assert_eq!(
            tuner.scan_stations().await.unwrap_err(),
            TunerError::ScanInProgress
        );

        tuner.cancel_scan();
        let result = background.await.unwrap();
        assert_eq!(result.unwrap_err(), TunerError::Cancelled);

        // A cancelled sweep publishes nothing.
        assert!(tuner.stations().await.is_empty());

        // The guard is released; a fresh scan succeeds.
        let stations = tuner.scan_stations().await.unwrap();
        assert_eq!(stations.len(), tuner.scan_config().max_stations());
    }

    #[tokio::test(start_paused = true)]
    async fn test_readers_never_observe_a_torn_station_list() {
        let phase = Arc::new(AtomicBool::new(false));
        let pipeline = {
            let phase = Arc::clone(&phase);
            Arc::new(MockPipeline::with_power(move |mhz| {
                let strong: &[f64] = if phase.load(Ordering::SeqCst) {
                    &[95.5, 99.9, 104.3]
                } else {
                    &[95.5]
                };
                if strong.iter().any(|f| (f - mhz).abs() < 0.05) {
                    Ok(0.01)
                } else {
                    Ok(0.00001)
                }
            }))
        };
        let tuner = tuner_with(pipeline);

        let first = tuner.scan_stations().await.unwrap();
        assert_eq!(first, vec![95.5]);

        phase.store(true, Ordering::SeqCst);
        let second_scan = {
            let tuner = Arc::clone(&tuner);
            tokio::spawn(async move { tuner.scan_stations().await })
        };

        // Interleave reads with the running scan; every snapshot must be
        // one of the two complete results, never a mixture.
        while !second_scan.is_finished() {
            let snapshot = tuner.stations().await;
            assert!(
                snapshot == [95.5] || snapshot == [95.5, 99.9, 104.3],
                "torn station list: {:?}",
                snapshot
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let second = second_scan.await.unwrap().unwrap();
        assert_eq!(second, vec![95.5, 99.9, 104.3]);
        assert_eq!(tuner.stations().await, second);
    }

    #[tokio::test]
    async fn test_run_and_idempotent_stop() {
        let pipeline = Arc::new(MockPipeline::with_power(|_| Ok(0.0)));
        let tuner = tuner_with(pipeline);

        let runner = {
            let tuner = Arc::clone(&tuner);
            tokio::spawn(async move { tuner.run().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(tuner.is_running());

        // A second run on the same context is rejected while one is active.
        assert_eq!(tuner.run().await.unwrap_err(), TunerError::AlreadyRunning);

        tuner.stop();
        tuner.stop();
        runner.await.unwrap().unwrap();
        assert!(!tuner.is_running());

        // Stopping an already-stopped tuner stays a no-op.
        tuner.stop();
    }

    #[tokio::test]
    async fn test_drop_stops_the_pipeline() {
        let pipeline = Arc::new(MockPipeline::with_power(|_| Ok(0.0)));
        {
            let tuner = tuner_with(Arc::clone(&pipeline));
            drop(tuner);
        }
        assert!(pipeline.is_stopped());
    }
}
