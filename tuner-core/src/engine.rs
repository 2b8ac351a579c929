//! # Tuning Decision Engine
//!
//! Turns a stream of raw pitch observations into a stable tuning state for a
//! real-time meter. One engine serves one tuning session.
//!
//! ## Per-frame decision
//! 1. Quiet frames (amplitude below the gate) count towards a silence reset.
//!    The display is only cleared after `silence_reset_frames` in a row.
//! 2. Confident pitched frames are identified, relabelled by the harmonic
//!    corrector and matched against the active instrument (or the pinned
//!    string), producing a new state.
//! 3. Everything else is dropped without touching the state.
//!
//! A non-finite frequency or a confidence outside `[0, 1]` means "no pitch":
//! quiet such frames count as silence, loud ones are dropped. Only frames
//! with a non-finite amplitude are ignored outright.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::PitchObservation;
use crate::error::{Result, TunerError};
use crate::harmonic::HarmonicCorrector;
use crate::instrument::{self, InstrumentProfile, StringTarget};
use crate::note::{self, NoteIdentity};

/// Rounding allowance when comparing a cents offset to the tolerance band.
const TOLERANCE_EPSILON_CENTS: f64 = 1e-9;

/// Direction the player has to turn the peg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TuningDirection {
    /// Pitch is flat, tighten the string
    TooLow,
    InTune,
    /// Pitch is sharp, loosen the string
    TooHigh,
}

impl TuningDirection {
    /// Classifies a cents offset against a symmetric tolerance band.
    pub fn classify(cents_offset: f64, tolerance_cents: f64) -> Self {
        if cents_offset.abs() <= tolerance_cents + TOLERANCE_EPSILON_CENTS {
            TuningDirection::InTune
        } else if cents_offset > 0.0 {
            TuningDirection::TooHigh
        } else {
            TuningDirection::TooLow
        }
    }
}

/// Snapshot of what the meter should display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TuningState {
    /// String the pitch was matched to, `None` if no confident match
    pub matched_string: Option<StringTarget>,
    /// Deviation from the matched string target in cents (0 when unmatched)
    pub cents_offset: f64,
    pub direction: TuningDirection,
    pub is_silent: bool,
    /// The accepted pitch in Hz
    pub frequency_hz: Option<f64>,
    /// Chromatic note of the accepted pitch after harmonic correction
    pub detected_note: Option<NoteIdentity>,
    /// Whether `matched_string` comes from a manual pin
    pub is_pinned: bool,
}

impl Default for TuningState {
    fn default() -> Self {
        Self {
            matched_string: None,
            cents_offset: 0.0,
            direction: TuningDirection::InTune,
            is_silent: true,
            frequency_hz: None,
            detected_note: None,
            is_pinned: false,
        }
    }
}

/// Tunable thresholds of the decision engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frames quieter than this count as silence
    pub amplitude_threshold: f64,
    /// Consecutive silent frames before the display is cleared
    pub silence_reset_frames: u32,
    /// Detector confidence a frame must exceed to be accepted
    pub confidence_threshold: f64,
    /// Half-width of the in-tune band in cents
    pub tuning_tolerance_cents: f64,
    /// Maximum percentage deviation for a string match
    pub max_percent_deviation: f64,
    /// Number of readings averaged per string (1 disables smoothing)
    pub smoothing_window: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            amplitude_threshold: 0.01,
            silence_reset_frames: 10,
            confidence_threshold: 0.85,
            tuning_tolerance_cents: 10.0,
            max_percent_deviation: instrument::DEFAULT_MAX_PERCENT_DEVIATION,
            smoothing_window: 1,
        }
    }
}

impl EngineConfig {
    /// Validate the thresholds
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("amplitude_threshold", self.amplitude_threshold),
            ("tuning_tolerance_cents", self.tuning_tolerance_cents),
            ("max_percent_deviation", self.max_percent_deviation),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(TunerError::InvalidConfig(format!(
                    "{field} must be a finite non-negative number, got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(TunerError::InvalidConfig(format!(
                "confidence_threshold must be between 0.0 and 1.0, got {}",
                self.confidence_threshold
            )));
        }
        if self.silence_reset_frames == 0 {
            return Err(TunerError::InvalidConfig(
                "silence_reset_frames must be at least 1".to_string(),
            ));
        }
        if self.smoothing_window == 0 {
            return Err(TunerError::InvalidConfig(
                "smoothing_window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// How a single observation is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Malformed,
    Silent,
    Pitched,
    Ambiguous,
}

/// Stateful per-session decision engine.
#[derive(Debug)]
pub struct TuningDecisionEngine {
    config: EngineConfig,
    corrector: HarmonicCorrector,
    profile: Arc<InstrumentProfile>,
    pinned: Option<StringTarget>,
    state: TuningState,
    silent_frames: u32,
    last_accepted: Option<PitchObservation>,
    // Recent cents offsets against `smoothed_string`
    cents_history: VecDeque<f64>,
    smoothed_string: Option<StringTarget>,
    running: bool,
}

impl TuningDecisionEngine {
    /// Creates a stopped engine with the default harmonic corrections.
    ///
    /// Call [`start`](Self::start) before feeding observations.
    pub fn new(profile: Arc<InstrumentProfile>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            cents_history: VecDeque::with_capacity(config.smoothing_window),
            config,
            corrector: HarmonicCorrector::default(),
            profile,
            pinned: None,
            state: TuningState::default(),
            silent_frames: 0,
            last_accepted: None,
            smoothed_string: None,
            running: false,
        })
    }

    /// Resets counters and state and begins accepting observations.
    pub fn start(&mut self) {
        self.reset();
        self.running = true;
        log::debug!("[ENGINE] Started with instrument '{}'", self.profile.id());
    }

    /// Discards all state. Observations are ignored until the next `start`.
    pub fn stop(&mut self) {
        self.reset();
        self.running = false;
        log::debug!("[ENGINE] Stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn reset(&mut self) {
        self.state = TuningState::default();
        self.silent_frames = 0;
        self.last_accepted = None;
        self.clear_smoothing();
    }

    fn clear_smoothing(&mut self) {
        self.cents_history.clear();
        self.smoothed_string = None;
    }

    /// The current tuning state.
    pub fn state(&self) -> &TuningState {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn profile(&self) -> &Arc<InstrumentProfile> {
        &self.profile
    }

    pub fn corrector(&self) -> &HarmonicCorrector {
        &self.corrector
    }

    pub fn pinned(&self) -> Option<&StringTarget> {
        self.pinned.as_ref()
    }

    /// Number of consecutive silent frames seen so far.
    pub fn silent_frame_count(&self) -> u32 {
        self.silent_frames
    }

    pub fn last_accepted_observation(&self) -> Option<&PitchObservation> {
        self.last_accepted.as_ref()
    }

    /// Replaces the thresholds. Takes effect on the next observation.
    pub fn set_config(&mut self, config: EngineConfig) -> Result<()> {
        config.validate()?;
        if config.smoothing_window != self.config.smoothing_window {
            self.clear_smoothing();
        }
        self.config = config;
        Ok(())
    }

    pub fn set_corrector(&mut self, corrector: HarmonicCorrector) {
        self.corrector = corrector;
    }

    /// Switches the active instrument.
    ///
    /// A pinned string that does not belong to the new instrument is released.
    pub fn set_profile(&mut self, profile: Arc<InstrumentProfile>) {
        if let Some(pinned) = &self.pinned {
            if !profile.contains(pinned) {
                log::debug!(
                    "[ENGINE] Releasing pin on {} (not part of '{}')",
                    pinned.name,
                    profile.id()
                );
                self.pinned = None;
            }
        }
        self.clear_smoothing();
        self.profile = profile;
    }

    /// Pins the match to `target` regardless of the detected pitch.
    pub fn pin(&mut self, target: StringTarget) {
        log::debug!("[ENGINE] Pinned to {}", target.name);
        self.clear_smoothing();
        self.pinned = Some(target);
    }

    /// Returns to automatic string detection.
    pub fn unpin(&mut self) {
        if self.pinned.take().is_some() {
            log::debug!("[ENGINE] Pin released");
            self.clear_smoothing();
        }
    }

    /// Pins `target`, or releases the pin if `target` is already pinned.
    ///
    /// # Returns
    /// * `true` if a pin is active afterwards
    pub fn toggle_pin(&mut self, target: StringTarget) -> bool {
        if self.pinned.as_ref() == Some(&target) {
            self.unpin();
            false
        } else {
            self.pin(target);
            true
        }
    }

    fn classify(&self, observation: &PitchObservation) -> Frame {
        if !observation.is_well_formed() {
            Frame::Malformed
        } else if observation.amplitude < self.config.amplitude_threshold {
            // Quiet frames count as silence whatever the detector reported
            Frame::Silent
        } else if observation.has_pitch()
            && observation.confidence > self.config.confidence_threshold
        {
            Frame::Pitched
        } else {
            Frame::Ambiguous
        }
    }

    /// Processes one observation.
    ///
    /// # Returns
    /// * `Some(state)` - The state changed and should be published
    /// * `None` - The frame was dropped, debounced or the engine is stopped
    pub fn process(&mut self, observation: &PitchObservation) -> Option<TuningState> {
        if !self.running {
            return None;
        }

        match self.classify(observation) {
            Frame::Malformed => {
                log::trace!("[ENGINE] Ignoring malformed observation {:?}", observation);
                None
            }
            Frame::Ambiguous => None,
            Frame::Silent => self.on_silent_frame(),
            Frame::Pitched => Some(self.on_pitched_frame(observation)),
        }
    }

    fn on_silent_frame(&mut self) -> Option<TuningState> {
        self.silent_frames = self.silent_frames.saturating_add(1);
        if self.silent_frames >= self.config.silence_reset_frames && !self.state.is_silent {
            log::debug!(
                "[ENGINE] {} silent frames, clearing display",
                self.silent_frames
            );
            self.state = TuningState::default();
            self.clear_smoothing();
            return Some(self.state.clone());
        }
        None
    }

    fn on_pitched_frame(&mut self, observation: &PitchObservation) -> TuningState {
        let freq = observation.frequency_hz;
        self.silent_frames = 0;
        self.last_accepted = Some(*observation);

        let identity = self.corrector.correct(note::note_identity(freq), freq);

        let (matched, is_pinned) = match &self.pinned {
            Some(pinned) => (Some(pinned.clone()), true),
            None => (
                instrument::nearest_string(&self.profile, freq, self.config.max_percent_deviation)
                    .cloned(),
                false,
            ),
        };

        let (cents_offset, direction) = match &matched {
            Some(target) => {
                let raw = note::cents_between(freq, target.frequency_hz);
                let cents = self.smooth(target, raw);
                (
                    cents,
                    TuningDirection::classify(cents, self.config.tuning_tolerance_cents),
                )
            }
            None => {
                self.clear_smoothing();
                (0.0, TuningDirection::InTune)
            }
        };

        log::trace!(
            "[ENGINE] {:.2} Hz -> {} ({:?}, {:+.1} cents)",
            freq,
            identity.label(),
            matched.as_ref().map(|s| s.name.as_str()),
            cents_offset
        );

        self.state = TuningState {
            matched_string: matched,
            cents_offset,
            direction,
            is_silent: false,
            frequency_hz: Some(freq),
            detected_note: Some(identity),
            is_pinned,
        };
        self.state.clone()
    }

    /// Moving average over the last readings of one string.
    fn smooth(&mut self, target: &StringTarget, cents: f64) -> f64 {
        let window = self.config.smoothing_window;
        if window <= 1 {
            return cents;
        }
        if self.smoothed_string.as_ref() != Some(target) {
            self.cents_history.clear();
            self.smoothed_string = Some(target.clone());
        }
        if self.cents_history.len() == window {
            self.cents_history.pop_front();
        }
        self.cents_history.push_back(cents);
        self.cents_history.iter().sum::<f64>() / self.cents_history.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{guitar_standard, ukulele_standard};
    use crate::note::{NoteLabel, NoteName};
    use approx::assert_abs_diff_eq;

    fn running_engine() -> TuningDecisionEngine {
        let mut engine =
            TuningDecisionEngine::new(guitar_standard(), EngineConfig::default()).unwrap();
        engine.start();
        engine
    }

    fn pitched(freq: f64) -> PitchObservation {
        PitchObservation::new(freq, 0.95, 0.2)
    }

    fn quiet() -> PitchObservation {
        PitchObservation::new(-1.0, 0.0, 0.001)
    }

    fn cents_above(freq: f64, cents: f64) -> f64 {
        freq * 2.0_f64.powf(cents / 1200.0)
    }

    #[test]
    fn test_initial_state_is_silent() {
        let engine = running_engine();
        assert_eq!(engine.state(), &TuningState::default());
        assert!(engine.state().is_silent);
        assert!(engine.state().matched_string.is_none());
    }

    #[test]
    fn test_valid_pitch_matches_string() {
        let mut engine = running_engine();
        let state = engine.process(&pitched(146.83)).unwrap();

        assert_eq!(state.matched_string.as_ref().unwrap().name, "D3");
        assert_abs_diff_eq!(state.cents_offset, 0.0, epsilon = 1e-9);
        assert_eq!(state.direction, TuningDirection::InTune);
        assert!(!state.is_silent);
        assert!(!state.is_pinned);
        assert_eq!(state.frequency_hz, Some(146.83));
        assert_eq!(
            state.detected_note.unwrap().label(),
            NoteLabel::new(NoteName::D, 3)
        );
        assert_eq!(engine.state(), &state);
    }

    #[test]
    fn test_silence_debounce() {
        let mut engine = running_engine();
        let tuned = engine.process(&pitched(110.0)).unwrap();
        let threshold = engine.config().silence_reset_frames;

        for _ in 0..threshold - 1 {
            assert!(engine.process(&quiet()).is_none());
        }
        assert_eq!(engine.state(), &tuned);
        assert!(!engine.state().is_silent);

        let cleared = engine.process(&quiet()).unwrap();
        assert!(cleared.is_silent);
        assert!(cleared.matched_string.is_none());
        assert_eq!(engine.state(), &TuningState::default());

        // Further silence does not re-emit
        assert!(engine.process(&quiet()).is_none());
    }

    #[test]
    fn test_pitched_frame_resets_silence_count() {
        let mut engine = running_engine();
        engine.process(&pitched(110.0));
        for _ in 0..5 {
            engine.process(&quiet());
        }
        assert_eq!(engine.silent_frame_count(), 5);
        engine.process(&pitched(110.0));
        assert_eq!(engine.silent_frame_count(), 0);

        for _ in 0..9 {
            engine.process(&quiet());
        }
        assert!(!engine.state().is_silent);
    }

    #[test]
    fn test_tolerance_boundary() {
        let mut engine = running_engine();

        let at_upper = engine.process(&pitched(cents_above(110.0, 10.0))).unwrap();
        assert_eq!(at_upper.direction, TuningDirection::InTune);

        let at_lower = engine.process(&pitched(cents_above(110.0, -10.0))).unwrap();
        assert_eq!(at_lower.direction, TuningDirection::InTune);

        let sharp = engine.process(&pitched(cents_above(110.0, 11.0))).unwrap();
        assert_eq!(sharp.direction, TuningDirection::TooHigh);
        assert_abs_diff_eq!(sharp.cents_offset, 11.0, epsilon = 1e-6);

        let flat = engine.process(&pitched(cents_above(110.0, -11.0))).unwrap();
        assert_eq!(flat.direction, TuningDirection::TooLow);
        assert_eq!(flat.matched_string.unwrap().name, "A2");
    }

    #[test]
    fn test_repeated_observation_is_idempotent() {
        let mut engine = running_engine();
        let observation = pitched(197.3);
        let first = engine.process(&observation).unwrap();
        for _ in 0..20 {
            assert_eq!(engine.process(&observation).unwrap(), first);
        }
        assert_eq!(engine.last_accepted_observation(), Some(&observation));
    }

    #[test]
    fn test_low_confidence_dropped() {
        let mut engine = running_engine();
        let tuned = engine.process(&pitched(82.41)).unwrap();

        assert!(engine.process(&PitchObservation::new(300.0, 0.5, 0.2)).is_none());
        // Confidence equal to the threshold is not enough
        assert!(engine.process(&PitchObservation::new(300.0, 0.85, 0.2)).is_none());
        // Loud but unpitched
        assert!(engine.process(&PitchObservation::new(-1.0, 0.99, 0.2)).is_none());

        assert_eq!(engine.state(), &tuned);
        assert_eq!(engine.silent_frame_count(), 0);
    }

    #[test]
    fn test_loud_garbage_frames_dropped() {
        let mut engine = running_engine();
        let tuned = engine.process(&pitched(246.94)).unwrap();

        let garbage = [
            PitchObservation::new(f64::NAN, 0.9, 0.2),
            PitchObservation::new(f64::INFINITY, 0.9, 0.2),
            PitchObservation::new(200.0, 1.5, 0.2),
            PitchObservation::new(200.0, -0.1, 0.2),
            PitchObservation::new(200.0, f64::NAN, 0.2),
            PitchObservation::new(200.0, 0.9, f64::NAN),
        ];
        for observation in &garbage {
            assert!(engine.process(observation).is_none());
        }
        assert_eq!(engine.state(), &tuned);
        assert_eq!(engine.silent_frame_count(), 0);
    }

    #[test]
    fn test_quiet_garbage_frames_count_as_silence() {
        let mut engine = running_engine();
        engine.process(&pitched(110.0)).unwrap();
        let threshold = engine.config().silence_reset_frames;

        let garbage = [
            PitchObservation::new(f64::NAN, 0.0, 0.001),
            PitchObservation::new(f64::INFINITY, 0.9, 0.001),
            PitchObservation::new(110.0, 1.5, 0.001),
            PitchObservation::new(110.0, f64::NAN, 0.001),
        ];
        for observation in garbage.iter().cycle().take(threshold as usize - 1) {
            assert!(engine.process(observation).is_none());
        }
        assert_eq!(engine.silent_frame_count(), threshold - 1);

        let cleared = engine
            .process(&PitchObservation::new(f64::NAN, 0.0, 0.001))
            .unwrap();
        assert!(cleared.is_silent);
        assert_eq!(engine.state(), &TuningState::default());
    }

    #[test]
    fn test_harmonic_correction_relabels_detected_note() {
        let mut engine = running_engine();

        // 162 Hz is detected as E3, below 165 Hz it is taken as a low E harmonic
        let state = engine.process(&pitched(162.0)).unwrap();
        let detected = state.detected_note.unwrap();
        assert_eq!(detected.label(), NoteLabel::new(NoteName::E, 2));
        assert_eq!(detected.midi_note, 52);
        assert_abs_diff_eq!(
            detected.cents_from_exact,
            note::cents_between(162.0, note::exact_frequency(52)),
            epsilon = 1e-9
        );

        // Matching still works on the raw frequency
        assert_eq!(state.matched_string.as_ref().unwrap().name, "D3");
        assert_abs_diff_eq!(
            state.cents_offset,
            note::cents_between(162.0, 146.83),
            epsilon = 1e-9
        );
        assert_eq!(state.frequency_hz, Some(162.0));
    }

    #[test]
    fn test_disabled_corrector_keeps_raw_label() {
        let mut engine = running_engine();
        engine.set_corrector(HarmonicCorrector::disabled());

        let state = engine.process(&pitched(162.0)).unwrap();
        assert_eq!(
            state.detected_note.unwrap().label(),
            NoteLabel::new(NoteName::E, 3)
        );
        assert_eq!(engine.corrector(), &HarmonicCorrector::disabled());
    }

    #[test]
    fn test_pin_survives_silence_reset_and_restart() {
        let mut engine = running_engine();
        let e2 = guitar_standard().string_by_name("E2").unwrap().clone();
        engine.pin(e2.clone());

        engine.process(&pitched(110.0)).unwrap();
        for _ in 0..engine.config().silence_reset_frames {
            engine.process(&quiet());
        }
        assert!(engine.state().is_silent);
        assert_eq!(engine.pinned(), Some(&e2));

        engine.start();
        assert_eq!(engine.pinned(), Some(&e2));

        let state = engine.process(&pitched(110.0)).unwrap();
        assert_eq!(state.matched_string, Some(e2));
        assert!(state.is_pinned);
    }

    #[test]
    fn test_dropped_frames_do_not_interrupt_silence_count() {
        let mut engine = running_engine();
        engine.process(&pitched(110.0)).unwrap();
        let threshold = engine.config().silence_reset_frames;

        let dropped = [
            PitchObservation::new(300.0, 0.5, 0.2),
            PitchObservation::unpitched(0.2),
            PitchObservation::new(f64::NAN, 0.9, 0.2),
            PitchObservation::new(110.0, 0.9, f64::NAN),
        ];
        for i in 0..threshold - 1 {
            assert!(engine.process(&quiet()).is_none());
            assert!(engine.process(&dropped[i as usize % dropped.len()]).is_none());
        }
        assert_eq!(engine.silent_frame_count(), threshold - 1);
        assert!(!engine.state().is_silent);

        assert!(engine.process(&quiet()).unwrap().is_silent);
    }

    #[test]
    fn test_unmatched_pitch_emits_without_string() {
        let mut engine = running_engine();
        let state = engine.process(&pitched(1000.0)).unwrap();
        assert!(state.matched_string.is_none());
        assert!(!state.is_silent);
        assert_eq!(state.cents_offset, 0.0);
        assert_eq!(state.direction, TuningDirection::InTune);
        assert_eq!(state.detected_note.unwrap().note_name, NoteName::B);
    }

    #[test]
    fn test_pinned_string_overrides_nearest_match() {
        let mut engine = running_engine();
        let guitar = guitar_standard();
        let e2 = guitar.string_by_name("E2").unwrap().clone();
        engine.pin(e2.clone());

        // 110 Hz is the A string, but E2 is pinned
        let state = engine.process(&pitched(110.0)).unwrap();
        assert_eq!(state.matched_string.as_ref(), Some(&e2));
        assert!(state.is_pinned);
        assert_abs_diff_eq!(
            state.cents_offset,
            note::cents_between(110.0, 82.41),
            epsilon = 1e-9
        );
        assert_eq!(state.direction, TuningDirection::TooHigh);

        let flat = engine.process(&pitched(80.0)).unwrap();
        assert_eq!(flat.direction, TuningDirection::TooLow);

        // Pinned matching also applies outside the deviation bound
        let far = engine.process(&pitched(1000.0)).unwrap();
        assert_eq!(far.matched_string.as_ref(), Some(&e2));

        engine.unpin();
        let state = engine.process(&pitched(110.0)).unwrap();
        assert_eq!(state.matched_string.unwrap().name, "A2");
        assert!(!state.is_pinned);
    }

    #[test]
    fn test_toggle_pin() {
        let mut engine = running_engine();
        let g3 = guitar_standard().string_by_name("G3").unwrap().clone();
        let b3 = guitar_standard().string_by_name("B3").unwrap().clone();

        assert!(engine.toggle_pin(g3.clone()));
        assert!(engine.toggle_pin(b3.clone()));
        assert_eq!(engine.pinned(), Some(&b3));
        assert!(!engine.toggle_pin(b3));
        assert!(engine.pinned().is_none());
    }

    #[test]
    fn test_profile_swap_takes_effect_and_releases_foreign_pin() {
        let mut engine = running_engine();
        let e2 = guitar_standard().string_by_name("E2").unwrap().clone();
        engine.pin(e2);

        engine.set_profile(ukulele_standard());
        assert!(engine.pinned().is_none());

        let state = engine.process(&pitched(392.0)).unwrap();
        assert_eq!(state.matched_string.unwrap().name, "G4");
    }

    #[test]
    fn test_profile_swap_keeps_pin_of_same_instrument() {
        let mut engine = running_engine();
        let e4 = guitar_standard().string_by_name("E4").unwrap().clone();
        engine.pin(e4.clone());

        engine.set_profile(guitar_standard());
        assert_eq!(engine.pinned(), Some(&e4));

        // The ukulele E4 is a different string (ordinal 2)
        engine.set_profile(ukulele_standard());
        assert!(engine.pinned().is_none());
    }

    #[test]
    fn test_stopped_engine_ignores_observations() {
        let mut engine =
            TuningDecisionEngine::new(guitar_standard(), EngineConfig::default()).unwrap();
        assert!(engine.process(&pitched(110.0)).is_none());

        engine.start();
        engine.process(&pitched(110.0)).unwrap();
        engine.stop();
        assert_eq!(engine.state(), &TuningState::default());
        assert!(engine.process(&pitched(110.0)).is_none());
        assert!(engine.last_accepted_observation().is_none());
    }

    #[test]
    fn test_start_resets_state() {
        let mut engine = running_engine();
        engine.process(&pitched(110.0));
        engine.process(&quiet());
        engine.start();
        assert_eq!(engine.state(), &TuningState::default());
        assert_eq!(engine.silent_frame_count(), 0);
    }

    #[test]
    fn test_smoothing_averages_per_string() {
        let config = EngineConfig {
            smoothing_window: 2,
            ..EngineConfig::default()
        };
        let mut engine = TuningDecisionEngine::new(guitar_standard(), config).unwrap();
        engine.start();

        engine.process(&pitched(cents_above(110.0, 20.0)));
        let averaged = engine.process(&pitched(cents_above(110.0, 0.0))).unwrap();
        assert_abs_diff_eq!(averaged.cents_offset, 10.0, epsilon = 1e-6);

        // A different string starts a fresh average
        let other = engine.process(&pitched(cents_above(146.83, -30.0))).unwrap();
        assert_abs_diff_eq!(other.cents_offset, -30.0, epsilon = 1e-6);
        assert_eq!(other.direction, TuningDirection::TooLow);
    }

    #[test]
    fn test_config_validation() {
        assert!(EngineConfig::default().validate().is_ok());

        let bad_confidence = EngineConfig {
            confidence_threshold: 1.2,
            ..EngineConfig::default()
        };
        assert!(matches!(
            bad_confidence.validate(),
            Err(TunerError::InvalidConfig(_))
        ));

        let bad_frames = EngineConfig {
            silence_reset_frames: 0,
            ..EngineConfig::default()
        };
        assert!(TuningDecisionEngine::new(guitar_standard(), bad_frames).is_err());

        let mut engine = running_engine();
        let bad_tolerance = EngineConfig {
            tuning_tolerance_cents: f64::NAN,
            ..EngineConfig::default()
        };
        assert!(engine.set_config(bad_tolerance).is_err());
        assert_eq!(engine.config(), &EngineConfig::default());
    }

    #[test]
    fn test_custom_tolerance() {
        let mut engine = running_engine();
        engine
            .set_config(EngineConfig {
                tuning_tolerance_cents: 3.0,
                ..EngineConfig::default()
            })
            .unwrap();
        let state = engine.process(&pitched(cents_above(196.0, 5.0))).unwrap();
        assert_eq!(state.direction, TuningDirection::TooHigh);
    }
}
