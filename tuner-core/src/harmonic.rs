//! # Harmonic Correction Module
//!
//! Pitch detectors occasionally report an octave or an overtone instead of
//! the fundamental of a low string. The corrector relabels a handful of known
//! confusions before the result is shown to the player.
//!
//! Rules are evaluated in order and the first match wins. A correction only
//! changes the note label: the MIDI number, exact frequency and cent
//! deviation still describe the measured pitch.

use serde::{Deserialize, Serialize};

use crate::note::{NoteIdentity, NoteLabel, NoteName};

/// A single relabelling rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorrectionRule {
    /// Applies to `detected` when the frequency is below `below_hz`.
    Threshold {
        detected: NoteLabel,
        below_hz: f64,
        target: NoteLabel,
    },
    /// Applies to `detected` when the frequency is strictly between
    /// `min_hz` and `max_hz`.
    Range {
        detected: NoteLabel,
        min_hz: f64,
        max_hz: f64,
        target: NoteLabel,
    },
}

impl CorrectionRule {
    pub fn threshold(detected: NoteLabel, below_hz: f64, target: NoteLabel) -> Self {
        CorrectionRule::Threshold {
            detected,
            below_hz,
            target,
        }
    }

    pub fn range(detected: NoteLabel, min_hz: f64, max_hz: f64, target: NoteLabel) -> Self {
        CorrectionRule::Range {
            detected,
            min_hz,
            max_hz,
            target,
        }
    }

    /// Returns the remap target if this rule applies.
    pub fn applies_to(&self, label: NoteLabel, freq: f64) -> Option<NoteLabel> {
        match *self {
            CorrectionRule::Threshold {
                detected,
                below_hz,
                target,
            } if detected == label && freq < below_hz => Some(target),
            CorrectionRule::Range {
                detected,
                min_hz,
                max_hz,
                target,
            } if detected == label && freq > min_hz && freq < max_hz => Some(target),
            _ => None,
        }
    }
}

/// Ordered table of correction rules.
#[derive(Debug, Clone, PartialEq)]
pub struct HarmonicCorrector {
    rules: Vec<CorrectionRule>,
}

impl HarmonicCorrector {
    pub fn new(rules: Vec<CorrectionRule>) -> Self {
        Self { rules }
    }

    /// A corrector that never relabels.
    pub fn disabled() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn rules(&self) -> &[CorrectionRule] {
        &self.rules
    }

    /// Relabels `identity` with the first rule matching it at `freq`.
    ///
    /// # Arguments
    /// * `identity` - Identity computed from the detected frequency
    /// * `freq` - The detected frequency in Hz
    ///
    /// # Returns
    /// * The identity with `note_name`/`octave` replaced by the target of the
    ///   first applicable rule, or unchanged if no rule applies
    pub fn correct(&self, identity: NoteIdentity, freq: f64) -> NoteIdentity {
        let label = identity.label();
        match self
            .rules
            .iter()
            .find_map(|rule| rule.applies_to(label, freq))
        {
            Some(target) => {
                log::trace!("[HARMONIC] {} at {:.2} Hz relabelled to {}", label, freq, target);
                NoteIdentity {
                    note_name: target.name,
                    octave: target.octave,
                    ..identity
                }
            }
            None => identity,
        }
    }
}

impl Default for HarmonicCorrector {
    /// Known confusions on a standard guitar.
    fn default() -> Self {
        use NoteName::*;
        let label = NoteLabel::new;
        Self::new(vec![
            // Octave-up errors on the three low strings
            CorrectionRule::threshold(label(D, 4), 180.0, label(D, 3)),
            CorrectionRule::threshold(label(A, 3), 130.0, label(A, 2)),
            CorrectionRule::threshold(label(E, 3), 165.0, label(E, 2)),
            // Overtone confusions
            CorrectionRule::range(label(A, 2), 300.0, 340.0, label(E, 4)),
            CorrectionRule::range(label(E, 2), 230.0, 260.0, label(B, 3)),
        ])
    }
}
