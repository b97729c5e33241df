//! Recording Session State Machine
//!
//! Drives take recording, owns the track repository and exposes export and
//! synchronized playback to the UI layer.
//!
//! ```text
//!            start()               stop()
//!   Idle ─────────────▶ Recording ─────────▶ Stopped
//!    ▲                     ▲  │ start(): no-op   │
//!    │                     └──┼──────────────────┘ start()
//!    └──── clear() from any state
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::try_join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::engine::io::{write_export, ExportSummary};
use crate::engine::mixdown;
use crate::engine::playback::{PlaybackReport, PlaybackSynchronizer};
use crate::engine::tracks::{Track, TrackId, TrackRepository};
use crate::error::{MultitakeError, Result};
use crate::platform::{Platform, PlaybackHandle, RawAudio};

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Nothing recorded since the last clear (default state)
    #[default]
    Idle,
    /// A take is being captured
    Recording,
    /// At least one take has finished; ready for another
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Recording => write!(f, "Recording"),
            SessionState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    Stop,
    Clear,
}

impl SessionCommand {
    fn name(self) -> &'static str {
        match self {
            SessionCommand::Start => "start",
            SessionCommand::Stop => "stop",
            SessionCommand::Clear => "clear",
        }
    }
}

impl SessionState {
    /// Pure transition table
    ///
    /// # Example
    /// ```
    /// use multitake::engine::{SessionCommand, SessionState};
    ///
    /// let next = SessionState::Idle.transition(SessionCommand::Start).unwrap();
    /// assert_eq!(next, SessionState::Recording);
    /// assert!(next.transition(SessionCommand::Start).is_err());
    /// ```
    pub fn transition(self, command: SessionCommand) -> Result<SessionState> {
        use SessionCommand::*;
        use SessionState::*;

        match (self, command) {
            (Idle | Stopped, Start) => Ok(Recording),
            (Recording, Stop) => Ok(Stopped),
            (_, Clear) => Ok(Idle),
            (state, command) => Err(MultitakeError::InvalidState {
                operation: command.name(),
                state: state.to_string(),
            }),
        }
    }
}

/// The single recording session of a running application
pub struct Session {
    state: SessionState,
    tracks: TrackRepository,

    /// When the current take began (Recording only)
    take_started: Option<Instant>,

    /// Length of the most recent finished take
    last_take: Duration,

    platform: Platform,
    synchronizer: PlaybackSynchronizer,

    /// Cue playback of the previous take while recording
    monitor: Option<Arc<dyn PlaybackHandle>>,

    config: SessionConfig,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("tracks", &self.tracks.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Build a session around injected collaborators
    ///
    /// # Errors
    /// * `Config` - if the configuration is invalid
    pub fn new(platform: Platform, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: SessionState::Idle,
            tracks: TrackRepository::new(),
            take_started: None,
            last_take: Duration::ZERO,
            synchronizer: PlaybackSynchronizer::new(config.drift_tolerance()),
            platform,
            monitor: None,
            config,
        })
    }

    // ========================================================================
    // State Queries
    // ========================================================================

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    /// Running time of the current take, or length of the last one
    ///
    /// Zero when idle.
    pub fn elapsed(&self) -> Duration {
        match (self.state, self.take_started) {
            (SessionState::Recording, Some(started)) => started.elapsed(),
            (SessionState::Stopped, _) => self.last_take,
            _ => Duration::ZERO,
        }
    }

    pub fn tracks(&self) -> &TrackRepository {
        &self.tracks
    }

    /// Snapshot of tracks in append order
    pub fn track_list(&self) -> Vec<Track> {
        self.tracks.list()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Another handle to the playback scheduler, for `stop_all` from a
    /// different task
    pub fn synchronizer(&self) -> PlaybackSynchronizer {
        self.synchronizer.clone()
    }

    // ========================================================================
    // Recording Controls
    // ========================================================================

    /// Begin a new take
    ///
    /// Ignored while already recording. If the capture device refuses to
    /// start, the session returns to its previous state.
    pub async fn start(&mut self) -> Result<()> {
        let next = match self.state.transition(SessionCommand::Start) {
            Ok(next) => next,
            Err(e) => {
                debug!(reason = %e, "start ignored");
                return Ok(());
            }
        };

        let previous = (self.state, self.last_take);
        self.state = next;
        self.take_started = Some(Instant::now());
        self.last_take = Duration::ZERO;

        if let Err(e) = self.platform.capture.start().await {
            warn!(error = %e, "capture failed to start");
            (self.state, self.last_take) = previous;
            self.take_started = None;
            return Err(e);
        }

        info!(take = self.tracks.len() + 1, "recording started");

        if self.config.monitor_last_take {
            self.start_monitor().await;
        }
        Ok(())
    }

    /// Finish the current take: fetch its bytes and append it as a track
    ///
    /// Returns `Ok(None)` without touching the capture device when not
    /// recording. If the device fails to hand over the take, nothing is
    /// appended, the session moves to `Stopped` and the error is returned.
    pub async fn stop(&mut self) -> Result<Option<TrackId>> {
        if let Err(e) = self.state.transition(SessionCommand::Stop) {
            debug!(reason = %e, "stop ignored");
            return Ok(None);
        }

        match self.platform.capture.stop().await {
            Ok(captured) => Ok(self.stop_with(captured)),
            Err(e) => {
                warn!(error = %e, "capture failed to deliver the take");
                self.stop_monitor();
                self.take_started = None;
                self.state = SessionState::Stopped;
                Err(e)
            }
        }
    }

    /// Finish the current take with bytes already obtained from capture
    ///
    /// Appends a unity-gain track and moves to `Stopped`. Ignored (returns
    /// `None`) when not recording.
    pub fn stop_with(&mut self, captured: RawAudio) -> Option<TrackId> {
        let next = match self.state.transition(SessionCommand::Stop) {
            Ok(next) => next,
            Err(e) => {
                warn!(reason = %e, "captured audio discarded");
                return None;
            }
        };

        let take_duration = self
            .take_started
            .take()
            .map(|started| started.elapsed())
            .unwrap_or_default();
        self.stop_monitor();

        let id = self.tracks.append_take(captured, take_duration);
        self.last_take = take_duration;
        self.state = next;

        info!(
            track = %id,
            takes = self.tracks.len(),
            secs = take_duration.as_secs_f64(),
            "take recorded"
        );
        Some(id)
    }

    /// Drop every track and return to `Idle`
    ///
    /// Valid from any state. A take in progress is aborted; the session is
    /// reset even if the capture device reports an error, which is then
    /// returned.
    pub async fn clear(&mut self) -> Result<()> {
        let was_recording = self.is_recording();

        self.stop_monitor();
        self.synchronizer.stop_all();
        self.tracks.clear();
        self.take_started = None;
        self.last_take = Duration::ZERO;
        self.state = SessionState::Idle;
        info!(was_recording, "session cleared");

        if was_recording {
            self.platform.capture.abort().await?;
        }
        Ok(())
    }

    // ========================================================================
    // Track Editing
    // ========================================================================

    /// Remove a track; unknown ids are ignored
    ///
    /// Returns whether a track was removed.
    pub fn remove_track(&mut self, id: TrackId) -> bool {
        match self.tracks.remove(id) {
            Ok(_) => true,
            Err(e) => {
                debug!(reason = %e, "remove ignored");
                false
            }
        }
    }

    /// Set a track's gain (clamped to [0.0, 1.0])
    ///
    /// # Errors
    /// * `NotFound` - if the id is unknown
    pub fn set_gain(&mut self, id: TrackId, gain: f32) -> Result<f32> {
        self.tracks.set_gain(id, gain)
    }

    // ========================================================================
    // Export
    // ========================================================================

    /// Mix every track at its current gain into canonical WAV bytes
    ///
    /// # Errors
    /// * `EmptyMix` - if there are no tracks
    /// * `DecodeError` - if any take fails to decode (no partial mix)
    /// * `ChannelMismatch` - if takes disagree on channel count
    pub async fn export_mix(&self) -> Result<Vec<u8>> {
        if self.is_recording() {
            debug!("exporting finished takes while recording");
        }
        mixdown::render(self.platform.decoder.as_ref(), &self.tracks.list()).await
    }

    /// Export the mix to a file
    ///
    /// A directory target gets the configured export file name.
    pub async fn export_to(&self, target: &Path) -> Result<ExportSummary> {
        let path: PathBuf = if target.is_dir() {
            target.join(&self.config.export_file_name)
        } else {
            target.to_path_buf()
        };

        let bytes = self.export_mix().await?;
        write_export(&path, &bytes).await
    }

    // ========================================================================
    // Playback
    // ========================================================================

    /// Play every track from the start, together, at its gain
    ///
    /// Resolves when all tracks have ended or `stop_all` was called.
    pub async fn play_all(&self) -> Result<PlaybackReport> {
        let tracks = self.tracks.list();
        let handles = try_join_all(
            tracks
                .iter()
                .map(|t| self.platform.playback.load(t.source(), t.gain())),
        )
        .await?;

        self.synchronizer.play_all(handles).await
    }

    /// Halt all playback started by `play_all`
    pub fn stop_all(&self) {
        self.synchronizer.stop_all();
    }

    // ========================================================================
    // Cue Monitor
    // ========================================================================

    async fn start_monitor(&mut self) {
        let Some(last) = self.tracks.last() else {
            return;
        };

        let handle = match self.platform.playback.load(last.source(), last.gain()).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "could not load previous take for monitoring");
                return;
            }
        };

        match handle.start().await {
            Ok(_) => {
                debug!(track = %last.id(), "monitoring previous take");
                self.monitor = Some(handle);
            }
            Err(e) => warn!(error = %e, "could not start monitor playback"),
        }
    }

    fn stop_monitor(&mut self) {
        if let Some(handle) = self.monitor.take() {
            handle.stop();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_monitor();
        self.synchronizer.stop_all();
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::AudioBuffer;
    use crate::platform::mock::{float_wav, MockCapture, MockDecoder, MockPlayback};

    struct Rig {
        session: Session,
        capture: Arc<MockCapture>,
        playback: Arc<MockPlayback>,
    }

    fn rig(config: SessionConfig) -> Rig {
        let capture = Arc::new(MockCapture::new());
        let playback = Arc::new(MockPlayback::new());
        let platform = Platform::new(capture.clone(), Arc::new(MockDecoder::new()), playback.clone());
        Rig {
            session: Session::new(platform, config).unwrap(),
            capture,
            playback,
        }
    }

    fn take(samples: &[f32]) -> RawAudio {
        float_wav(&AudioBuffer::mono(samples, 8000)).unwrap()
    }

    // ------------------------------------------------------------------------
    // Transition Table
    // ------------------------------------------------------------------------

    #[test]
    fn test_transition_table() {
        use SessionCommand::*;
        use SessionState::*;

        assert_eq!(Idle.transition(Start).unwrap(), Recording);
        assert_eq!(Stopped.transition(Start).unwrap(), Recording);
        assert_eq!(Recording.transition(Stop).unwrap(), Stopped);
        for state in [Idle, Recording, Stopped] {
            assert_eq!(state.transition(Clear).unwrap(), Idle);
        }

        assert_eq!(Recording.transition(Start).unwrap_err().error_code(), "INVALID_STATE");
        assert!(Idle.transition(Stop).is_err());
        assert!(Stopped.transition(Stop).is_err());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(format!("{}", SessionState::Idle), "Idle");
        assert_eq!(format!("{}", SessionState::Recording), "Recording");
        assert_eq!(format!("{}", SessionState::Stopped), "Stopped");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let capture = Arc::new(MockCapture::new());
        let platform = Platform::new(capture, Arc::new(MockDecoder::new()), Arc::new(MockPlayback::new()));
        let config = SessionConfig {
            drift_tolerance_ms: f64::NAN,
            ..Default::default()
        };
        assert!(Session::new(platform, config).is_err());
    }

    // ------------------------------------------------------------------------
    // Recording Lifecycle
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_default_state_is_idle() {
        let rig = rig(SessionConfig::default());
        assert_eq!(rig.session.state(), SessionState::Idle);
        assert_eq!(rig.session.elapsed(), Duration::ZERO);
        assert!(rig.session.tracks().is_empty());
    }

    #[tokio::test]
    async fn test_start_stop_appends_track() {
        let mut rig = rig(SessionConfig::default());
        rig.capture.push_take(take(&[0.1, 0.2]));

        rig.session.start().await.unwrap();
        assert!(rig.session.is_recording());

        let id = rig.session.stop().await.unwrap().unwrap();
        assert_eq!(rig.session.state(), SessionState::Stopped);
        assert_eq!(rig.session.tracks().len(), 1);

        let track = rig.session.tracks().get(id).unwrap();
        assert_eq!(track.gain(), 1.0);
        assert_eq!(track.source(), &take(&[0.1, 0.2]));
    }

    #[tokio::test]
    async fn test_double_start_is_noop() {
        let mut rig = rig(SessionConfig::default());

        rig.session.start().await.unwrap();
        rig.session.start().await.unwrap();

        assert!(rig.session.is_recording());
        assert_eq!(rig.session.tracks().len(), 0);
        assert_eq!(rig.capture.starts(), 1);
    }

    #[tokio::test]
    async fn test_stop_while_idle_is_noop() {
        let mut rig = rig(SessionConfig::default());

        assert_eq!(rig.session.stop().await.unwrap(), None);
        assert_eq!(rig.session.stop_with(take(&[0.5])), None);
        assert_eq!(rig.session.state(), SessionState::Idle);
        assert_eq!(rig.capture.stops(), 0);
        assert!(rig.session.tracks().is_empty());
    }

    #[tokio::test]
    async fn test_capture_start_failure_rolls_back() {
        let mut rig = rig(SessionConfig::default());
        rig.capture.set_fail_start(true);

        let err = rig.session.start().await.unwrap_err();
        assert_eq!(err.error_code(), "CAPTURE_ERROR");
        assert_eq!(rig.session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_capture_stop_failure_appends_nothing() {
        let mut rig = rig(SessionConfig::default());
        rig.session.start().await.unwrap();

        // No take queued: the mock capture fails to deliver.
        assert!(rig.session.stop().await.is_err());
        assert_eq!(rig.session.state(), SessionState::Stopped);
        assert!(rig.session.tracks().is_empty());
    }

    #[tokio::test]
    async fn test_elapsed_tracks_take_duration() {
        let mut rig = rig(SessionConfig::default());
        rig.capture.push_take(take(&[0.0]));

        rig.session.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rig.session.elapsed() >= Duration::from_millis(20));

        let id = rig.session.stop().await.unwrap().unwrap();
        let recorded = rig.session.elapsed();
        assert!(recorded >= Duration::from_millis(20));
        assert_eq!(rig.session.tracks().get(id).unwrap().take_duration(), recorded);

        // A new take starts counting from zero.
        rig.session.start().await.unwrap();
        assert!(rig.session.elapsed() < recorded);
    }

    #[tokio::test]
    async fn test_clear_while_recording_aborts_capture() {
        let mut rig = rig(SessionConfig::default());
        rig.capture.push_take(take(&[0.3]));
        rig.session.start().await.unwrap();
        rig.session.stop().await.unwrap();
        rig.session.start().await.unwrap();

        rig.session.clear().await.unwrap();
        assert_eq!(rig.session.state(), SessionState::Idle);
        assert!(rig.session.tracks().is_empty());
        assert_eq!(rig.session.elapsed(), Duration::ZERO);
        assert_eq!(rig.capture.aborts(), 1);
    }

    #[tokio::test]
    async fn test_clear_when_idle_does_not_abort() {
        let mut rig = rig(SessionConfig::default());
        rig.session.clear().await.unwrap();
        assert_eq!(rig.capture.aborts(), 0);
    }

    // ------------------------------------------------------------------------
    // Track Editing
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_remove_unknown_track_is_noop() {
        let mut rig = rig(SessionConfig::default());
        rig.capture.push_take(take(&[0.3]));
        rig.capture.push_take(take(&[0.4]));

        rig.session.start().await.unwrap();
        let first = rig.session.stop().await.unwrap().unwrap();
        rig.session.start().await.unwrap();
        rig.session.stop().await.unwrap();

        assert!(rig.session.remove_track(first));
        assert!(!rig.session.remove_track(first));
        assert_eq!(rig.session.tracks().len(), 1);
    }

    #[tokio::test]
    async fn test_set_gain_clamps_and_reports_missing() {
        let mut rig = rig(SessionConfig::default());
        rig.capture.push_take(take(&[0.3]));
        rig.session.start().await.unwrap();
        let id = rig.session.stop().await.unwrap().unwrap();

        assert_eq!(rig.session.set_gain(id, 3.0).unwrap(), 1.0);
        assert_eq!(rig.session.set_gain(id, 0.25).unwrap(), 0.25);

        rig.session.remove_track(id);
        assert_eq!(rig.session.set_gain(id, 0.5).unwrap_err().error_code(), "NOT_FOUND");
    }

    // ------------------------------------------------------------------------
    // Cue Monitor
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_second_take_monitors_previous() {
        let mut rig = rig(SessionConfig::default());
        rig.capture.push_take(take(&vec![0.1; 8000]));
        rig.capture.push_take(take(&[0.2]));

        rig.session.start().await.unwrap();
        assert!(rig.playback.handles().is_empty(), "nothing to monitor on first take");
        rig.session.stop().await.unwrap();

        rig.session.start().await.unwrap();
        let handles = rig.playback.handles();
        assert_eq!(handles.len(), 1);
        assert!(handles[0].started_at().is_some());
        assert!(!handles[0].is_stopped());

        rig.session.stop().await.unwrap();
        assert!(handles[0].is_stopped());
    }

    #[tokio::test]
    async fn test_monitor_disabled() {
        let mut rig = rig(SessionConfig {
            monitor_last_take: false,
            ..Default::default()
        });
        rig.capture.push_take(take(&[0.1]));

        rig.session.start().await.unwrap();
        rig.session.stop().await.unwrap();
        rig.session.start().await.unwrap();
        assert!(rig.playback.handles().is_empty());
    }

    // ------------------------------------------------------------------------
    // Export / Playback
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_export_empty_session() {
        let rig = rig(SessionConfig::default());
        let err = rig.session.export_mix().await.unwrap_err();
        assert!(matches!(err, MultitakeError::EmptyMix));
    }

    #[tokio::test]
    async fn test_play_all_applies_gains() {
        let mut rig = rig(SessionConfig {
            monitor_last_take: false,
            ..Default::default()
        });
        rig.capture.push_take(take(&[0.1; 80]));
        rig.capture.push_take(take(&[0.1; 160]));

        rig.session.start().await.unwrap();
        let first = rig.session.stop().await.unwrap().unwrap();
        rig.session.start().await.unwrap();
        rig.session.stop().await.unwrap();
        rig.session.set_gain(first, 0.4).unwrap();

        let report = rig.session.play_all().await.unwrap();
        assert_eq!(report.handles.len(), 2);

        let handles = rig.playback.handles();
        assert_eq!(handles[0].gain(), 0.4);
        assert_eq!(handles[1].gain(), 1.0);
        assert!((report.handles[1].duration_secs - 0.02).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_stop_all_without_playback() {
        let rig = rig(SessionConfig::default());
        rig.session.stop_all();
        assert!(!rig.session.synchronizer().is_playing());
    }
}
