//! Transport State Machine for the resonance player
//!
//! Owns play/pause/seek state for one voice recording, builds and tears down
//! the effects graph (and the optional ambient drone) for every playback
//! session, and tracks elapsed time by polling the audio clock.
//!
//! ```text
//!            request_play (no buffer)
//!   Idle ──────────────────────────────> Loading
//!    ^  \                                  │ complete_synthesis
//!    │   \ request_play (buffer cached)    │ (failure -> Idle)
//!    │    v                                v
//!    │   Playing <──────────────────────> Paused
//!    │     │        pause / request_play
//!    └─────┘ stop, or the end of the buffer
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use super::buffer::AudioBuffer;
use super::context::AudioContext;
use super::frequency::TargetFrequency;
use super::pcm::decode_base64_pcm;
use super::sink::AudioSink;
use crate::config::EngineConfig;
use crate::dsp::chain::{clamp_start_offset, ResonanceChain};
use crate::dsp::drone::ZenDrone;
use crate::dsp::graph::GraphId;
use crate::error::{ResonanceError, Result};
use crate::speech::{SpeechSettings, SpeechSynthesizer, SynthesisRequest};

/// Transport states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// Nothing playing (default state)
    #[default]
    Idle,
    /// Waiting for the synthesis collaborator
    Loading,
    /// Effects graph running, progress polling active
    Playing,
    /// Graph torn down, offset kept for resume
    Paused,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Idle => write!(f, "Idle"),
            TransportState::Loading => write!(f, "Loading"),
            TransportState::Playing => write!(f, "Playing"),
            TransportState::Paused => write!(f, "Paused"),
        }
    }
}

/// Outcome of [`Resonator::request_play`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayRequest {
    /// Playback started from the cached buffer
    Started,
    /// No buffer yet; call [`Resonator::complete_synthesis`] with the payload
    NeedsSynthesis,
}

/// Notifications produced while the clock runs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportEvent {
    /// Playback reached the end of the buffer
    Ended {
        /// Playback position when the end was detected, in seconds
        position: f64,
    },
}

/// One run of the effects graph over the cached buffer
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub id: Uuid,
    pub buffer: Arc<AudioBuffer>,
    /// Buffer offset playback started from, in seconds
    pub start_offset: f64,
    /// Audio-clock time playback started at
    pub started_at: f64,
    pub voice: GraphId,
    pub drone: Option<GraphId>,
}

/// Format seconds as `m:ss` for the progress display
///
/// # Example
/// ```
/// use resonance::engine::format_clock;
/// assert_eq!(format_clock(75.9), "1:15");
/// assert_eq!(format_clock(3.0), "0:03");
/// ```
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

/// Playback controller for one resonance widget
///
/// Holds the audio context, the cached voice buffer and at most one
/// playback session. Every start resumes the context first.
#[derive(Debug)]
pub struct Resonator {
    context: AudioContext,
    config: EngineConfig,
    target: TargetFrequency,
    state: TransportState,
    buffer: Option<Arc<AudioBuffer>>,
    /// Stored playback offset in seconds, used while not playing
    offset: f64,
    session: Option<PlaybackSession>,
    /// Drone layers fading out after their session ended
    releasing: Vec<GraphId>,
    drone_enabled: bool,
    /// Start playing as soon as synthesis completes
    auto_play: bool,
}

impl Resonator {
    /// Create an idle controller with its own suspended context
    ///
    /// # Example
    /// ```
    /// use resonance::config::EngineConfig;
    /// use resonance::engine::{NullSink, Resonator, TargetFrequency, TransportState};
    ///
    /// let resonator = Resonator::new(
    ///     EngineConfig::default(),
    ///     TargetFrequency::parse("528Hz"),
    ///     Box::new(NullSink),
    /// );
    /// assert_eq!(resonator.state(), TransportState::Idle);
    /// assert_eq!(resonator.duration(), 0.0);
    /// ```
    pub fn new(config: EngineConfig, target: TargetFrequency, sink: Box<dyn AudioSink>) -> Self {
        let context =
            AudioContext::with_quantum(config.context.sample_rate, config.context.quantum, sink);
        let drone_enabled = config.transport.drone_enabled;
        Self {
            context,
            config,
            target,
            state: TransportState::Idle,
            buffer: None,
            offset: 0.0,
            session: None,
            releasing: Vec::new(),
            drone_enabled,
            auto_play: true,
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn is_loading(&self) -> bool {
        self.state == TransportState::Loading
    }

    pub fn target(&self) -> TargetFrequency {
        self.target
    }

    pub fn drone_enabled(&self) -> bool {
        self.drone_enabled
    }

    pub fn auto_play(&self) -> bool {
        self.auto_play
    }

    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Length of the cached buffer in seconds, 0 when nothing is loaded
    pub fn duration(&self) -> f64 {
        self.buffer.as_ref().map_or(0.0, |b| b.duration_secs())
    }

    /// Playback position in seconds
    ///
    /// While playing this is measured against the audio clock; otherwise it
    /// is the stored offset.
    pub fn current_time(&self) -> f64 {
        match &self.session {
            Some(session) if self.state == TransportState::Playing => {
                self.elapsed(session).min(self.duration())
            }
            _ => self.offset,
        }
    }

    /// Nodes still running across the voice, drone and fading tails
    pub fn active_node_count(&self) -> usize {
        self.context.active_node_count()
    }

    fn elapsed(&self, session: &PlaybackSession) -> f64 {
        self.context.current_time() - session.started_at + session.start_offset
    }

    fn ensure_not_loading(&self, operation: &str) -> Result<()> {
        if self.state == TransportState::Loading {
            return Err(ResonanceError::TransportBusy {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    fn transition(&mut self, to: TransportState) {
        if self.state != to {
            debug!(from = %self.state, to = %to, offset = self.offset, "transport transition");
            self.state = to;
        }
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Begin or resume playback
    ///
    /// With a cached buffer playback starts at the stored offset (from the
    /// top if the offset is at the end). Without one the controller moves to
    /// Loading and the caller must fetch speech and hand it to
    /// [`complete_synthesis`](Self::complete_synthesis).
    pub fn request_play(&mut self) -> Result<PlayRequest> {
        self.ensure_not_loading("play")?;

        if self.state == TransportState::Playing {
            return Ok(PlayRequest::Started);
        }

        match self.buffer.clone() {
            Some(buffer) => {
                if self.offset >= buffer.duration_secs() {
                    self.offset = 0.0;
                }
                self.start_session(self.offset)?;
                Ok(PlayRequest::Started)
            }
            None => {
                self.transition(TransportState::Loading);
                Ok(PlayRequest::NeedsSynthesis)
            }
        }
    }

    /// Finish a Loading transition with the synthesis result
    ///
    /// A payload that fails to decode is reported as a synthesis failure and
    /// leaves the controller Idle. A result arriving when nothing is loading
    /// (for example after [`release_all`](Self::release_all)) is discarded.
    /// With auto-play off the decoded audio waits Paused at the start.
    pub fn complete_synthesis(&mut self, result: Result<String>) -> Result<()> {
        if self.state != TransportState::Loading {
            warn!(state = %self.state, "discarding synthesis result that is no longer awaited");
            return Ok(());
        }

        let decoded = result.and_then(|payload| {
            decode_base64_pcm(
                &payload,
                self.config.speech.sample_rate,
                self.config.speech.channels,
            )
            .map_err(|e| ResonanceError::SynthesisFailed {
                reason: e.to_string(),
            })
        });

        let buffer = match decoded {
            Ok(buffer) => buffer,
            Err(e) => {
                self.transition(TransportState::Idle);
                return Err(e);
            }
        };

        debug!(
            duration = buffer.duration_secs(),
            sample_rate = buffer.sample_rate,
            "speech decoded"
        );
        self.buffer = Some(Arc::new(buffer));
        self.offset = 0.0;
        if !self.auto_play {
            self.transition(TransportState::Paused);
            return Ok(());
        }
        self.start_session(0.0)
    }

    /// Run a whole play request, synthesizing speech when none is cached
    pub fn play_with<S>(&mut self, synth: &mut S, request: &SynthesisRequest) -> Result<()>
    where
        S: SpeechSynthesizer + ?Sized,
    {
        match self.request_play()? {
            PlayRequest::Started => Ok(()),
            PlayRequest::NeedsSynthesis => {
                let result = synth.synthesize(request);
                self.complete_synthesis(result)
            }
        }
    }

    /// Replace the cached buffer with already decoded audio
    ///
    /// Any running session is stopped; the controller ends up Idle at 0.
    pub fn load_buffer(&mut self, buffer: AudioBuffer) -> Result<()> {
        self.ensure_not_loading("load")?;
        if buffer.is_empty() {
            return Err(ResonanceError::EmptyPayload);
        }
        self.end_session(false);
        self.buffer = Some(Arc::new(buffer));
        self.offset = 0.0;
        self.transition(TransportState::Idle);
        Ok(())
    }

    // ========================================================================
    // Transport Controls
    // ========================================================================

    /// Start playing from `offset` seconds, whatever the current state
    pub fn play_from(&mut self, offset: f64) -> Result<()> {
        self.ensure_not_loading("play")?;
        if self.buffer.is_none() {
            return Err(ResonanceError::NoAudioLoaded);
        }
        let offset = self.clamp_seek(offset);
        self.end_session(false);
        self.start_session(offset)
    }

    /// Pause playback and remember where it stopped
    ///
    /// Does nothing unless playing.
    pub fn pause(&mut self) -> Result<()> {
        self.ensure_not_loading("pause")?;
        if self.state != TransportState::Playing {
            return Ok(());
        }
        self.offset = self.current_time();
        self.end_session(true);
        self.transition(TransportState::Paused);
        Ok(())
    }

    /// Move the playback position to `time` seconds
    ///
    /// Out-of-range times are clamped to the buffer. While playing the graph
    /// is rebuilt at the new position; otherwise only the stored offset
    /// changes. Without a buffer this does nothing.
    pub fn seek(&mut self, time: f64) -> Result<()> {
        self.ensure_not_loading("seek")?;
        if self.buffer.is_none() {
            return Ok(());
        }

        let time = self.clamp_seek(time);
        if self.state == TransportState::Playing {
            self.end_session(false);
            self.start_session(time)
        } else {
            self.offset = time;
            debug!(offset = time, state = %self.state, "seek while not playing");
            Ok(())
        }
    }

    /// Turn the ambient drone layer on or off
    ///
    /// The graph topology changes, so a playing session is stopped and
    /// rebuilt at its current position.
    pub fn set_drone_enabled(&mut self, enabled: bool) -> Result<()> {
        self.ensure_not_loading("drone")?;
        if self.drone_enabled == enabled {
            return Ok(());
        }
        self.drone_enabled = enabled;
        debug!(enabled, "drone layer toggled");

        if self.state == TransportState::Playing {
            let at = self.current_time();
            self.end_session(false);
            self.start_session(at)?;
        }
        Ok(())
    }

    /// Choose whether synthesized speech starts playing on arrival
    pub fn set_auto_play(&mut self, enabled: bool) {
        self.auto_play = enabled;
    }

    /// Adopt the host's speech preferences
    ///
    /// Only auto-play affects the transport; the voice is carried by each
    /// [`SynthesisRequest`].
    pub fn apply_settings(&mut self, settings: &SpeechSettings) {
        self.set_auto_play(settings.auto_play);
    }

    /// Change the resonance target; a playing session is rebuilt in place
    pub fn set_target(&mut self, target: TargetFrequency) -> Result<()> {
        self.ensure_not_loading("retune")?;
        self.target = target;
        if self.state == TransportState::Playing {
            let at = self.current_time();
            self.end_session(false);
            self.start_session(at)?;
        }
        Ok(())
    }

    /// Stop playback and rewind; safe to call in any state but Loading
    pub fn stop(&mut self) -> Result<()> {
        self.ensure_not_loading("stop")?;
        self.end_session(true);
        self.offset = 0.0;
        self.transition(TransportState::Idle);
        Ok(())
    }

    /// Tear down every graph immediately and forget the cached buffer
    ///
    /// Works in every state, including Loading.
    pub fn release_all(&mut self) {
        self.session = None;
        self.releasing.clear();
        self.context.teardown_all();
        self.context.suspend();
        self.buffer = None;
        self.offset = 0.0;
        self.transition(TransportState::Idle);
        debug!("all playback resources released");
    }

    /// Release everything and close the audio context
    pub fn close(&mut self) -> Result<()> {
        self.release_all();
        self.context.close()
    }

    // ========================================================================
    // Clock
    // ========================================================================

    /// Sample the clock once, as a display-frame callback would
    ///
    /// Ends the session when the position reaches the end of the buffer or
    /// the voice graph has finished on its own.
    pub fn poll(&mut self) -> Option<TransportEvent> {
        if self.state != TransportState::Playing {
            return None;
        }
        let session = self.session.as_ref()?;
        let position = self.elapsed(session);
        let voice_done = !self.context.is_attached(session.voice);

        if position >= self.duration() || voice_done {
            debug!(position, voice_done, "playback reached the end");
            self.end_session(true);
            self.offset = 0.0;
            self.transition(TransportState::Idle);
            return Some(TransportEvent::Ended { position });
        }
        None
    }

    /// Run the audio clock forward by `seconds`, polling once per interval
    ///
    /// Nothing happens while the context is suspended. Non-finite durations
    /// are rejected.
    pub fn advance(&mut self, seconds: f64) -> Result<Vec<TransportEvent>> {
        if !seconds.is_finite() {
            return Err(ResonanceError::invalid_parameter(
                "seconds",
                seconds,
                "a finite duration",
            ));
        }
        let mut events = Vec::new();
        let interval = self.config.transport.poll_interval_secs;
        let target = self.context.current_time() + seconds.max(0.0);

        while self.context.is_running() && self.context.current_time() < target {
            let step_end = (self.context.current_time() + interval).min(target);
            let finished = self.context.render_until(step_end)?;
            if !finished.is_empty() {
                self.releasing.retain(|id| !finished.contains(id));
            }
            if let Some(event) = self.poll() {
                events.push(event);
            }
        }
        Ok(events)
    }

    // ========================================================================
    // Session Management
    // ========================================================================

    fn clamp_seek(&self, time: f64) -> f64 {
        if time.is_nan() {
            return 0.0;
        }
        time.clamp(0.0, self.duration())
    }

    /// Build the graphs for a new session at `offset`
    fn start_session(&mut self, offset: f64) -> Result<()> {
        let buffer = self.buffer.clone().ok_or(ResonanceError::NoAudioLoaded)?;

        self.end_session(false);
        for id in self.releasing.drain(..) {
            self.context.detach(id);
        }

        if let Err(e) = self.context.resume() {
            warn!(error = %e, "audio context could not be resumed");
            self.transition(TransportState::Idle);
            return Err(e);
        }

        let offset = clamp_start_offset(
            offset,
            buffer.duration_secs(),
            self.config.transport.start_epsilon_secs,
        );
        let when = self.context.current_time();
        let sample_rate = self.context.sample_rate();

        match self.attach_graphs(&buffer, offset, when, sample_rate) {
            Ok((voice, drone)) => {
                let session = PlaybackSession {
                    id: Uuid::new_v4(),
                    buffer,
                    start_offset: offset,
                    started_at: when,
                    voice,
                    drone,
                };
                debug!(
                    session = %session.id,
                    offset,
                    target = %self.target,
                    drone = drone.is_some(),
                    "playback session started"
                );
                self.session = Some(session);
                self.offset = offset;
                self.transition(TransportState::Playing);
                Ok(())
            }
            Err(e) => {
                self.transition(TransportState::Idle);
                Err(e)
            }
        }
    }

    /// Attach the voice chain and, if enabled, the drone at the same start time
    fn attach_graphs(
        &mut self,
        buffer: &Arc<AudioBuffer>,
        offset: f64,
        when: f64,
        sample_rate: u32,
    ) -> Result<(GraphId, Option<GraphId>)> {
        let hz = self.target.hz();
        let chain = ResonanceChain::build(
            Arc::clone(buffer),
            hz,
            offset,
            when,
            &self.config.resonance,
            sample_rate,
        )?;
        let voice = self.context.attach(Box::new(chain))?;

        if !self.drone_enabled {
            return Ok((voice, None));
        }

        let seed = self.config.seed.unwrap_or_else(rand::random);
        let drone = ZenDrone::build(hz, when, &self.config.drone, sample_rate, seed)
            .and_then(|drone| self.context.attach(Box::new(drone)));
        match drone {
            Ok(id) => Ok((voice, Some(id))),
            Err(e) => {
                self.context.detach(voice);
                Err(e)
            }
        }
    }

    /// Tear down the current session
    ///
    /// The voice stops at once. With `fade` the drone is released and keeps
    /// fading until the context reaps it; otherwise it stops at once too.
    fn end_session(&mut self, fade: bool) {
        let Some(session) = self.session.take() else {
            return;
        };

        self.context.detach(session.voice);
        if let Some(drone) = session.drone {
            if fade && self.context.release(drone) {
                self.releasing.push(drone);
            } else {
                self.context.detach(drone);
            }
        }
        debug!(session = %session.id, fade, "playback session ended");
    }
}

impl Drop for Resonator {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::ContextState;
    use crate::engine::sink::{MemorySink, NullSink};
    use approx::assert_abs_diff_eq;

    /// 16-bit LE mono PCM of a 0.5 amplitude sine, base64 encoded
    fn payload(seconds: f64, freq: f64) -> String {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine as _;

        let frames = (seconds * 24000.0) as usize;
        let mut bytes = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let s = 0.5 * (std::f64::consts::TAU * freq * i as f64 / 24000.0).sin();
            bytes.extend_from_slice(&((s * 32767.0) as i16).to_le_bytes());
        }
        STANDARD.encode(bytes)
    }

    fn resonator() -> Resonator {
        Resonator::new(
            EngineConfig::default(),
            TargetFrequency::parse("528Hz"),
            Box::new(NullSink),
        )
    }

    fn playing(seconds: f64) -> Resonator {
        let mut r = resonator();
        assert_eq!(r.request_play().unwrap(), PlayRequest::NeedsSynthesis);
        r.complete_synthesis(Ok(payload(seconds, 220.0))).unwrap();
        r
    }

    // ------------------------------------------------------------------------
    // Basic State Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_default_state_is_idle() {
        let r = resonator();
        assert_eq!(r.state(), TransportState::Idle);
        assert_eq!(r.current_time(), 0.0);
        assert!(!r.has_buffer());
        assert_eq!(r.active_node_count(), 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(TransportState::Loading.to_string(), "Loading");
        assert_eq!(TransportState::Paused.to_string(), "Paused");
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0.0), "0:00");
        assert_eq!(format_clock(59.99), "0:59");
        assert_eq!(format_clock(600.0), "10:00");
        assert_eq!(format_clock(-3.0), "0:00");
        assert_eq!(format_clock(f64::NAN), "0:00");
    }

    // ------------------------------------------------------------------------
    // Loading Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_loading_then_playing() {
        let r = playing(1.0);
        assert_eq!(r.state(), TransportState::Playing);
        assert_abs_diff_eq!(r.duration(), 1.0);
        assert!(r.session().is_some());
        assert!(r.context().is_running());
    }

    #[test]
    fn test_controls_busy_while_loading() {
        let mut r = resonator();
        r.request_play().unwrap();
        assert!(r.is_loading());

        for result in [r.pause(), r.seek(1.0), r.stop(), r.set_drone_enabled(true)] {
            assert!(matches!(result, Err(ResonanceError::TransportBusy { .. })));
        }
        assert!(matches!(
            r.request_play(),
            Err(ResonanceError::TransportBusy { .. })
        ));
        assert!(r.is_loading());
    }

    #[test]
    fn test_synthesis_failure_returns_to_idle() {
        let mut r = resonator();
        r.request_play().unwrap();
        let err = r
            .complete_synthesis(Err(ResonanceError::SynthesisFailed {
                reason: "quota".to_string(),
            }))
            .unwrap_err();
        assert_eq!(err.error_code(), "SYNTHESIS_FAILED");
        assert_eq!(r.state(), TransportState::Idle);
        assert!(!r.has_buffer());
    }

    #[test]
    fn test_bad_payload_is_synthesis_failure() {
        let mut r = resonator();
        r.request_play().unwrap();
        // Three bytes: not a whole 16-bit sample
        let err = r.complete_synthesis(Ok("AID/".to_string())).unwrap_err();
        assert_eq!(err.error_code(), "SYNTHESIS_FAILED");
        assert_eq!(r.state(), TransportState::Idle);
        assert_eq!(r.active_node_count(), 0);
    }

    #[test]
    fn test_late_result_discarded_after_release() {
        let mut r = resonator();
        r.request_play().unwrap();
        r.release_all();
        r.complete_synthesis(Ok(payload(1.0, 220.0))).unwrap();
        assert_eq!(r.state(), TransportState::Idle);
        assert!(!r.has_buffer());
    }

    #[test]
    fn test_auto_play_off_waits_paused() {
        let mut r = resonator();
        r.apply_settings(&SpeechSettings {
            auto_play: false,
            ..Default::default()
        });
        assert!(!r.auto_play());

        r.request_play().unwrap();
        r.complete_synthesis(Ok(payload(1.0, 220.0))).unwrap();
        assert_eq!(r.state(), TransportState::Paused);
        assert!(r.has_buffer());
        assert!(r.session().is_none());
        assert_eq!(r.active_node_count(), 0);
        assert_eq!(r.current_time(), 0.0);

        assert_eq!(r.request_play().unwrap(), PlayRequest::Started);
        assert!(r.is_playing());
        assert_eq!(r.session().unwrap().start_offset, 0.0);
    }

    #[test]
    fn test_play_with_synthesizer_called_once() {
        let mut calls = 0;
        let mut synth = |_: &SynthesisRequest| -> Result<String> {
            calls += 1;
            Ok(payload(1.0, 220.0))
        };
        let request = SynthesisRequest::new("luz", Default::default()).unwrap();

        let mut r = resonator();
        r.play_with(&mut synth, &request).unwrap();
        r.pause().unwrap();
        r.play_with(&mut synth, &request).unwrap();
        assert!(r.is_playing());
        drop(r);
        assert_eq!(calls, 1);
    }

    // ------------------------------------------------------------------------
    // Transport Control Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_pause_keeps_offset() {
        let mut r = playing(3.0);
        r.advance(1.0).unwrap();
        r.pause().unwrap();
        assert_eq!(r.state(), TransportState::Paused);
        let paused_at = r.current_time();
        assert!((1.0..1.05).contains(&paused_at), "paused at {}", paused_at);
        assert_eq!(r.active_node_count(), 0);

        // Clock keeps running, position does not
        r.advance(0.5).unwrap();
        assert_eq!(r.current_time(), paused_at);

        r.request_play().unwrap();
        assert_abs_diff_eq!(r.current_time(), paused_at, epsilon = 1e-9);
    }

    #[test]
    fn test_pause_when_idle_is_noop() {
        let mut r = resonator();
        r.pause().unwrap();
        assert_eq!(r.state(), TransportState::Idle);
    }

    #[test]
    fn test_seek_while_paused_only_moves_offset() {
        let mut r = playing(3.0);
        r.pause().unwrap();
        r.seek(2.5).unwrap();
        assert_eq!(r.state(), TransportState::Paused);
        assert_eq!(r.current_time(), 2.5);
        assert!(r.session().is_none());
    }

    #[test]
    fn test_seek_clamps() {
        let mut r = playing(3.0);
        r.pause().unwrap();
        r.seek(99.0).unwrap();
        assert_abs_diff_eq!(r.current_time(), 3.0);
        r.seek(-4.0).unwrap();
        assert_eq!(r.current_time(), 0.0);
    }

    #[test]
    fn test_resume_from_end_restarts() {
        let mut r = playing(3.0);
        r.pause().unwrap();
        r.seek(3.0).unwrap();
        r.request_play().unwrap();
        assert_eq!(r.current_time(), 0.0);
    }

    #[test]
    fn test_seek_without_buffer_is_noop() {
        let mut r = resonator();
        r.seek(1.0).unwrap();
        assert_eq!(r.current_time(), 0.0);
        assert!(matches!(r.play_from(1.0), Err(ResonanceError::NoAudioLoaded)));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut r = playing(1.0);
        r.stop().unwrap();
        r.stop().unwrap();
        assert_eq!(r.state(), TransportState::Idle);
        assert_eq!(r.current_time(), 0.0);
        assert!(r.has_buffer());
    }

    #[test]
    fn test_start_offset_kept_clear_of_end() {
        let mut r = playing(3.0);
        r.play_from(2.99).unwrap();
        assert_abs_diff_eq!(r.current_time(), 2.9, epsilon = 1e-9);
    }

    #[test]
    fn test_single_session_invariant() {
        let mut r = playing(3.0);
        r.set_drone_enabled(true).unwrap();
        r.seek(1.0).unwrap();
        r.seek(2.0).unwrap();
        // One voice chain plus one drone
        assert_eq!(r.context().graph_count(), 2);
    }

    #[test]
    fn test_drone_toggle_rebuilds_at_position() {
        let mut r = playing(3.0);
        r.advance(0.5).unwrap();
        let before = r.current_time();
        let first = r.session().map(|s| s.id);

        r.set_drone_enabled(true).unwrap();
        assert!(r.is_playing());
        assert_abs_diff_eq!(r.current_time(), before, epsilon = 1e-9);
        assert_ne!(r.session().map(|s| s.id), first);
        assert!(r.session().and_then(|s| s.drone).is_some());

        r.set_drone_enabled(false).unwrap();
        assert!(r.session().and_then(|s| s.drone).is_none());
        assert_eq!(r.context().graph_count(), 1);
    }

    #[test]
    fn test_drone_fades_after_stop() {
        let mut r = playing(3.0);
        r.set_drone_enabled(true).unwrap();
        r.advance(0.5).unwrap();
        r.stop().unwrap();

        // Voice is gone, drone tail still fading
        assert!(r.active_node_count() > 0);
        r.advance(2.2).unwrap();
        assert_eq!(r.active_node_count(), 0);
    }

    #[test]
    fn test_release_all_silences_immediately() {
        let mut r = playing(3.0);
        r.set_drone_enabled(true).unwrap();
        r.stop().unwrap();
        r.release_all();
        assert_eq!(r.active_node_count(), 0);
        assert!(!r.has_buffer());
        assert_eq!(r.state(), TransportState::Idle);
    }

    #[test]
    fn test_release_all_suspends_context() {
        let mut r = playing(1.0);
        assert!(r.context().is_running());

        r.release_all();
        assert_eq!(r.context().state(), ContextState::Suspended);
        assert!(r.advance(1.0).unwrap().is_empty());
        assert_eq!(r.context().current_time(), 0.0);

        r.request_play().unwrap();
        r.complete_synthesis(Ok(payload(1.0, 220.0))).unwrap();
        assert!(r.context().is_running());
    }

    // ------------------------------------------------------------------------
    // Clock Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_plays_to_end() {
        let mut r = playing(1.0);
        let events = r.advance(1.2).unwrap();
        assert_eq!(events.len(), 1);
        let TransportEvent::Ended { position } = events[0];
        assert!(position >= 1.0);
        assert_eq!(r.state(), TransportState::Idle);
        assert_eq!(r.current_time(), 0.0);
        assert_eq!(r.active_node_count(), 0);
    }

    #[test]
    fn test_advance_suspended_context_does_nothing() {
        let mut r = resonator();
        assert!(r.advance(1.0).unwrap().is_empty());
        assert_eq!(r.context().current_time(), 0.0);
    }

    #[test]
    fn test_advance_rejects_unbounded_duration() {
        let mut r = playing(0.1);
        for seconds in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let err = r.advance(seconds).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_PARAMETER");
        }
        assert_eq!(r.context().current_time(), 0.0);
        assert!(r.is_playing());

        // Finite runs still end playback and return
        assert_eq!(r.advance(0.5).unwrap().len(), 1);
    }

    #[test]
    fn test_output_reaches_sink() {
        let sink = MemorySink::new();
        let mut r = Resonator::new(
            EngineConfig::default(),
            TargetFrequency::parse("432Hz"),
            Box::new(sink.clone()),
        );
        r.request_play().unwrap();
        r.complete_synthesis(Ok(payload(0.5, 432.0))).unwrap();
        r.advance(0.5).unwrap();

        let captured = sink.snapshot();
        assert_eq!(captured.sample_rate, 48000);
        assert!(captured.duration_secs() >= 0.5);
        assert!(captured.peak() > 0.05);
    }
}
