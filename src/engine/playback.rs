//! Playback Synchronizer
//!
//! Starts every track's playback handle back-to-back, waits for all of them
//! to end and reports how far each one drifted from where it should have
//! finished. Drift is diagnostic only; nothing is resynchronized.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{MultitakeError, Result};
use crate::platform::{PlaybackEnd, PlaybackHandle};

/// Default drift magnitude above which a warning is logged
pub const DEFAULT_DRIFT_TOLERANCE: Duration = Duration::from_millis(20);

/// Signed `a - b` in seconds
fn signed_secs(a: Instant, b: Instant) -> f64 {
    if a >= b {
        a.duration_since(b).as_secs_f64()
    } else {
        -b.duration_since(a).as_secs_f64()
    }
}

/// How one handle's playback went
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PlaybackOutcome {
    /// Ran to the end; `drift_secs = actual_end - (scheduled_start + duration)`
    Finished { drift_secs: f64 },
    /// Halted by `stop_all` before it finished
    Stopped,
}

/// Timing report for one handle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HandleReport {
    /// Position in the track list
    pub index: usize,
    /// Nominal duration reported by the handle
    pub duration_secs: f64,
    /// `actual_start - scheduled_start`; `None` if the handle never started
    pub start_offset_secs: Option<f64>,
    pub outcome: PlaybackOutcome,
}

impl HandleReport {
    pub fn drift_secs(&self) -> Option<f64> {
        match self.outcome {
            PlaybackOutcome::Finished { drift_secs } => Some(drift_secs),
            PlaybackOutcome::Stopped => None,
        }
    }
}

/// Result of one `play_all` run
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlaybackReport {
    pub handles: Vec<HandleReport>,
}

impl PlaybackReport {
    /// Largest absolute drift among handles that finished
    pub fn max_abs_drift_secs(&self) -> Option<f64> {
        self.handles
            .iter()
            .filter_map(|h| h.drift_secs())
            .map(f64::abs)
            .reduce(f64::max)
    }

    /// True if any handle was halted by `stop_all`
    pub fn was_stopped(&self) -> bool {
        self.handles
            .iter()
            .any(|h| h.outcome == PlaybackOutcome::Stopped)
    }
}

#[derive(Default)]
struct ActivePlayback {
    generation: u64,
    handles: Vec<Arc<dyn PlaybackHandle>>,
}

/// Fan-out scheduler for simultaneous multi-track playback
///
/// Cloning yields another handle to the same scheduler, so `stop_all` can be
/// called from a different task while `play_all` is awaiting.
#[derive(Clone)]
pub struct PlaybackSynchronizer {
    active: Arc<Mutex<ActivePlayback>>,
    drift_tolerance: Duration,
}

impl Default for PlaybackSynchronizer {
    fn default() -> Self {
        Self::new(DEFAULT_DRIFT_TOLERANCE)
    }
}

impl PlaybackSynchronizer {
    pub fn new(drift_tolerance: Duration) -> Self {
        Self {
            active: Arc::new(Mutex::new(ActivePlayback::default())),
            drift_tolerance,
        }
    }

    pub fn drift_tolerance(&self) -> Duration {
        self.drift_tolerance
    }

    /// Whether a `play_all` run currently owns handles
    pub fn is_playing(&self) -> bool {
        !self.active.lock().handles.is_empty()
    }

    /// Start all handles together and wait for every one to end
    ///
    /// Start commands are issued in order with nothing in between. Any
    /// playback already running is stopped first. If a handle fails to start,
    /// every handle is stopped and the error is returned.
    pub async fn play_all(&self, handles: Vec<Arc<dyn PlaybackHandle>>) -> Result<PlaybackReport> {
        if handles.is_empty() {
            debug!("play_all with no tracks");
            return Ok(PlaybackReport::default());
        }

        let generation = {
            let mut active = self.active.lock();
            for previous in active.handles.drain(..) {
                previous.stop();
            }
            active.generation += 1;
            active.handles = handles.clone();
            active.generation
        };

        let scheduled_start = Instant::now();
        // join_all polls in order on its first pass, so every start command
        // is issued before any of them is awaited to completion.
        let starts = join_all(handles.iter().map(|h| h.start())).await;

        let mut actual_starts = Vec::with_capacity(starts.len());
        let mut failure = None;
        for (index, start) in starts.into_iter().enumerate() {
            match start {
                Ok(at) => actual_starts.push(Some(at)),
                Err(e) => {
                    if failure.is_none() {
                        failure = Some((index, e));
                    }
                    actual_starts.push(None);
                }
            }
        }

        if let Some((index, e)) = failure {
            for handle in &handles {
                handle.stop();
            }

            // stop_all (or a newer run) raced a pending start
            if self.is_cancelled(generation) {
                info!(tracks = handles.len(), "playback stopped while starting");
                let reports = handles
                    .iter()
                    .zip(actual_starts)
                    .enumerate()
                    .map(|(index, (handle, started))| HandleReport {
                        index,
                        duration_secs: handle.duration().as_secs_f64(),
                        start_offset_secs: started.map(|at| signed_secs(at, scheduled_start)),
                        outcome: PlaybackOutcome::Stopped,
                    })
                    .collect();
                return Ok(PlaybackReport { handles: reports });
            }

            warn!(track = index, error = %e, "playback failed to start, stopping all");
            self.release(generation);
            let reason = match e {
                MultitakeError::Playback { reason } => reason,
                other => other.to_string(),
            };
            return Err(MultitakeError::Playback {
                reason: format!("track {} failed to start: {}", index, reason),
            });
        }
        let actual_starts: Vec<Instant> = actual_starts.into_iter().flatten().collect();
        info!(tracks = handles.len(), "playback started");

        let ends = join_all(handles.iter().map(|h| h.ended())).await;
        self.release(generation);

        let reports = handles
            .iter()
            .zip(actual_starts)
            .zip(ends)
            .enumerate()
            .map(|(index, ((handle, started), end))| {
                self.report(index, handle.duration(), scheduled_start, started, end)
            })
            .collect();

        Ok(PlaybackReport { handles: reports })
    }

    /// Halt every handle of the current run
    ///
    /// Safe at any time, including before anything started or after
    /// everything finished.
    pub fn stop_all(&self) {
        let handles = std::mem::take(&mut self.active.lock().handles);
        if handles.is_empty() {
            debug!("stop_all with nothing playing");
            return;
        }
        for handle in &handles {
            handle.stop();
        }
        info!(tracks = handles.len(), "playback stopped");
    }

    fn is_cancelled(&self, generation: u64) -> bool {
        let active = self.active.lock();
        active.generation != generation || active.handles.is_empty()
    }

    fn release(&self, generation: u64) {
        let mut active = self.active.lock();
        if active.generation == generation {
            active.handles.clear();
        }
    }

    fn report(
        &self,
        index: usize,
        duration: Duration,
        scheduled_start: Instant,
        started: Instant,
        end: PlaybackEnd,
    ) -> HandleReport {
        let outcome = match end {
            PlaybackEnd::Finished(at) => {
                let drift_secs = signed_secs(at, scheduled_start + duration);
                if drift_secs.abs() > self.drift_tolerance.as_secs_f64() {
                    warn!(track = index, drift_ms = drift_secs * 1000.0, "playback drift");
                } else {
                    debug!(track = index, drift_ms = drift_secs * 1000.0, "playback drift");
                }
                PlaybackOutcome::Finished { drift_secs }
            }
            PlaybackEnd::Stopped(_) => PlaybackOutcome::Stopped,
        };

        HandleReport {
            index,
            duration_secs: duration.as_secs_f64(),
            start_offset_secs: Some(signed_secs(started, scheduled_start)),
            outcome,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockHandle;

    fn handles(durations_ms: &[u64], lag: Duration) -> (Vec<Arc<MockHandle>>, Vec<Arc<dyn PlaybackHandle>>) {
        let concrete: Vec<Arc<MockHandle>> = durations_ms
            .iter()
            .map(|&ms| Arc::new(MockHandle::new(Duration::from_millis(ms), 1.0, lag)))
            .collect();
        let dynamic = concrete
            .iter()
            .map(|h| h.clone() as Arc<dyn PlaybackHandle>)
            .collect();
        (concrete, dynamic)
    }

    #[test]
    fn test_signed_secs() {
        let base = Instant::now();
        let later = base + Duration::from_millis(250);
        assert!((signed_secs(later, base) - 0.25).abs() < 1e-9);
        assert!((signed_secs(base, later) + 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_play_all_empty_is_ok() {
        let sync = PlaybackSynchronizer::default();
        let report = sync.play_all(Vec::new()).await.unwrap();
        assert!(report.handles.is_empty());
        assert_eq!(report.max_abs_drift_secs(), None);
    }

    #[tokio::test]
    async fn test_play_all_starts_together_and_reports_drift() {
        let (concrete, dynamic) = handles(&[30, 60, 45], Duration::ZERO);
        let sync = PlaybackSynchronizer::default();

        let report = sync.play_all(dynamic).await.unwrap();
        assert_eq!(report.handles.len(), 3);
        assert!(!report.was_stopped());
        assert!(!sync.is_playing());

        let starts: Vec<Instant> = concrete.iter().map(|h| h.started_at().unwrap()).collect();
        let spread = signed_secs(*starts.iter().max().unwrap(), *starts.iter().min().unwrap());
        assert!(spread < 0.01, "starts spread over {}s", spread);

        for (i, handle) in report.handles.iter().enumerate() {
            assert_eq!(handle.index, i);
            let drift = handle.drift_secs().unwrap();
            // Handles never end before their nominal duration.
            assert!(drift >= -0.005, "track {} ended early: {}", i, drift);
        }
    }

    #[tokio::test]
    async fn test_lagging_output_shows_positive_drift() {
        let (_, dynamic) = handles(&[20], Duration::from_millis(40));
        let sync = PlaybackSynchronizer::new(Duration::from_millis(5));

        let report = sync.play_all(dynamic).await.unwrap();
        let drift = report.handles[0].drift_secs().unwrap();
        assert!(drift >= 0.039, "expected ~40ms drift, got {}", drift);
        assert_eq!(report.max_abs_drift_secs(), Some(drift));
    }

    #[tokio::test]
    async fn test_stop_all_halts_running_playback() {
        let (concrete, dynamic) = handles(&[10_000, 10_000], Duration::ZERO);
        let sync = PlaybackSynchronizer::default();

        let runner = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.play_all(dynamic).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(sync.is_playing());
        sync.stop_all();

        let report = tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .expect("play_all did not return after stop_all")
            .unwrap()
            .unwrap();
        assert!(report.was_stopped());
        assert!(concrete.iter().all(|h| h.is_stopped()));
    }

    #[tokio::test]
    async fn test_stop_all_when_idle_is_noop() {
        let sync = PlaybackSynchronizer::default();
        sync.stop_all();

        let (_, dynamic) = handles(&[5], Duration::ZERO);
        sync.play_all(dynamic).await.unwrap();
        sync.stop_all();
        assert!(!sync.is_playing());
    }

    #[tokio::test]
    async fn test_start_failure_stops_everything() {
        let (concrete, dynamic) = handles(&[1000, 1000], Duration::ZERO);
        concrete[1].stop();

        let sync = PlaybackSynchronizer::default();
        let err = sync.play_all(dynamic).await.unwrap_err();
        assert_eq!(err.error_code(), "PLAYBACK_ERROR");
        assert_eq!(
            err.to_string(),
            "Playback device error: track 1 failed to start: handle already stopped"
        );
        assert!(concrete[0].is_stopped());
        assert!(!sync.is_playing());
    }

    #[tokio::test]
    async fn test_stop_all_during_slow_start_reports_stopped() {
        let fast = Arc::new(MockHandle::new(Duration::from_secs(5), 1.0, Duration::ZERO));
        let slow = Arc::new(
            MockHandle::new(Duration::from_secs(5), 1.0, Duration::ZERO)
                .with_start_delay(Duration::from_millis(50)),
        );
        let dynamic = vec![
            fast.clone() as Arc<dyn PlaybackHandle>,
            slow.clone() as Arc<dyn PlaybackHandle>,
        ];
        let sync = PlaybackSynchronizer::default();

        let runner = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.play_all(dynamic).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        sync.stop_all();

        let report = tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .expect("play_all did not return after stop_all")
            .unwrap()
            .unwrap();
        assert_eq!(report.handles.len(), 2);
        assert!(report
            .handles
            .iter()
            .all(|h| h.outcome == PlaybackOutcome::Stopped));
        assert!(report.handles[0].start_offset_secs.is_some());
        assert_eq!(report.handles[1].start_offset_secs, None);
        assert!(fast.is_stopped() && slow.is_stopped());
        assert!(!sync.is_playing());
    }
}
