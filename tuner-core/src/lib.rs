// tuner-core/src/lib.rs

//! The core decision logic for the guitar and ukulele tuner.
//! This crate turns detected pitches into note identities, string matches
//! and tuning directions. It is completely headless: audio capture and pitch
//! estimation are done elsewhere and it contains no GUI code.

pub mod config;
pub mod engine;
pub mod error;
pub mod harmonic;
pub mod instrument;
pub mod note;
pub mod session;

pub use engine::{EngineConfig, TuningDecisionEngine, TuningDirection, TuningState};
pub use error::{Result, TunerError};
pub use harmonic::{CorrectionRule, HarmonicCorrector};
pub use instrument::{InstrumentProfile, StringTarget};
pub use note::{NoteIdentity, NoteLabel, NoteName};
pub use session::{ObservationSender, TuningSession};

use serde::{Deserialize, Serialize};

/// Output of the external pitch detector for a single analysis frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchObservation {
    /// Detected fundamental in Hz. Zero or negative means no pitch.
    pub frequency_hz: f64,
    /// Probability the detector assigns to the estimate (0.0 to 1.0).
    pub confidence: f64,
    /// Signal RMS of the frame, used for silence gating.
    pub amplitude: f64,
}

impl PitchObservation {
    pub fn new(frequency_hz: f64, confidence: f64, amplitude: f64) -> Self {
        Self {
            frequency_hz,
            confidence,
            amplitude,
        }
    }

    /// A frame without pitch at the given amplitude.
    pub fn unpitched(amplitude: f64) -> Self {
        Self::new(-1.0, 0.0, amplitude)
    }

    /// False when the amplitude is not a finite number; such frames cannot
    /// be gated and are ignored.
    pub fn is_well_formed(&self) -> bool {
        self.amplitude.is_finite()
    }

    /// True when the frame carries a usable pitch estimate: a finite positive
    /// frequency and a confidence within `[0, 1]`.
    pub fn has_pitch(&self) -> bool {
        self.frequency_hz.is_finite()
            && self.frequency_hz > 0.0
            && (0.0..=1.0).contains(&self.confidence)
    }
}
