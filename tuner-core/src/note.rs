//! # Note Math Module
//!
//! Equal-temperament conversions between frequencies, MIDI note numbers,
//! note names and cent deviations, referenced to A4 = 440 Hz.
//!
//! ## Features
//! - Frequency to nearest MIDI note mapping
//! - Note name and scientific-pitch octave derivation
//! - Cent deviation from the exact equal-tempered frequency
//! - Parsing of note labels such as "E2", "C#3" or "Bb2"

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TunerError;

/// Reference frequency of A4 in Hz.
pub const A4_FREQUENCY: f64 = 440.0;

/// MIDI note number of A4.
pub const A4_MIDI: i32 = 69;

/// The twelve chromatic pitch classes, ordered from C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NoteName {
    C,
    #[serde(rename = "C#")]
    CSharp,
    D,
    #[serde(rename = "D#")]
    DSharp,
    E,
    F,
    #[serde(rename = "F#")]
    FSharp,
    G,
    #[serde(rename = "G#")]
    GSharp,
    A,
    #[serde(rename = "A#")]
    ASharp,
    B,
}

impl NoteName {
    /// All pitch classes in semitone order starting at C.
    pub const ALL: [NoteName; 12] = [
        NoteName::C,
        NoteName::CSharp,
        NoteName::D,
        NoteName::DSharp,
        NoteName::E,
        NoteName::F,
        NoteName::FSharp,
        NoteName::G,
        NoteName::GSharp,
        NoteName::A,
        NoteName::ASharp,
        NoteName::B,
    ];

    /// Pitch class of a MIDI note number. Works for negative numbers too.
    pub fn from_midi(midi: i32) -> Self {
        Self::ALL[midi.rem_euclid(12) as usize]
    }

    /// Semitone index within the octave (C = 0 ... B = 11).
    pub fn semitone(self) -> i32 {
        self as i32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NoteName::C => "C",
            NoteName::CSharp => "C#",
            NoteName::D => "D",
            NoteName::DSharp => "D#",
            NoteName::E => "E",
            NoteName::F => "F",
            NoteName::FSharp => "F#",
            NoteName::G => "G",
            NoteName::GSharp => "G#",
            NoteName::A => "A",
            NoteName::ASharp => "A#",
            NoteName::B => "B",
        }
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteName {
    type Err = TunerError;

    /// Accepts a letter optionally followed by `#` or `b`, e.g. "C#" or "Db".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_midi(base_semitone(s)? + accidental(s)?))
    }
}

/// A pitch class together with its octave, e.g. `E2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NoteLabel {
    pub name: NoteName,
    pub octave: i32,
}

impl NoteLabel {
    pub fn new(name: NoteName, octave: i32) -> Self {
        Self { name, octave }
    }

    /// MIDI note number of this label.
    pub fn midi(self) -> i32 {
        self.octave
            .saturating_add(1)
            .saturating_mul(12)
            .saturating_add(self.name.semitone())
    }

    /// Equal-tempered frequency of this label in Hz.
    pub fn frequency(self) -> f64 {
        exact_frequency(self.midi())
    }
}

impl fmt::Display for NoteLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.octave)
    }
}

impl FromStr for NoteLabel {
    type Err = TunerError;

    /// Parses labels such as "A4", "C#3", "Bb2" or "C-1".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_ascii_digit() || c == '-')
            .ok_or_else(|| TunerError::InvalidNote(s.to_string()))?;
        let (name, octave) = s.split_at(split);

        let octave: i32 = octave
            .parse()
            .map_err(|_| TunerError::InvalidNote(s.to_string()))?;

        // Accidentals may cross the octave: Cb4 sounds as B3, B#3 as C4.
        let offset = base_semitone(name)? + accidental(name)?;
        let midi = octave
            .checked_add(1)
            .and_then(|o| o.checked_mul(12))
            .and_then(|m| m.checked_add(offset))
            .ok_or_else(|| TunerError::InvalidNote(s.to_string()))?;
        Ok(Self {
            name: NoteName::from_midi(midi),
            octave: midi.div_euclid(12) - 1,
        })
    }
}

impl TryFrom<String> for NoteLabel {
    type Error = TunerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NoteLabel> for String {
    fn from(label: NoteLabel) -> Self {
        label.to_string()
    }
}

fn base_semitone(name: &str) -> Result<i32, TunerError> {
    match name.chars().next().map(|c| c.to_ascii_uppercase()) {
        Some('C') => Ok(0),
        Some('D') => Ok(2),
        Some('E') => Ok(4),
        Some('F') => Ok(5),
        Some('G') => Ok(7),
        Some('A') => Ok(9),
        Some('B') => Ok(11),
        _ => Err(TunerError::InvalidNote(name.to_string())),
    }
}

fn accidental(name: &str) -> Result<i32, TunerError> {
    match name.get(1..) {
        Some("") => Ok(0),
        Some("#") => Ok(1),
        Some("b") => Ok(-1),
        _ => Err(TunerError::InvalidNote(name.to_string())),
    }
}

/// Musical identity of a detected frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteIdentity {
    /// Nearest MIDI note number (A4 = 69)
    pub midi_note: i32,
    pub note_name: NoteName,
    /// Scientific pitch notation octave
    pub octave: i32,
    /// Equal-tempered frequency of `midi_note` in Hz
    pub exact_frequency_hz: f64,
    /// Deviation of the detected frequency from `exact_frequency_hz`
    pub cents_from_exact: f64,
}

impl NoteIdentity {
    pub fn label(&self) -> NoteLabel {
        NoteLabel::new(self.note_name, self.octave)
    }
}

/// Maps a frequency to the nearest equal-tempered MIDI note.
///
/// The caller must guarantee `freq` is positive and finite.
pub fn midi_from_frequency(freq: f64) -> i32 {
    (A4_MIDI as f64 + 12.0 * (freq / A4_FREQUENCY).log2()).round() as i32
}

/// Equal-tempered frequency of a MIDI note number.
pub fn exact_frequency(midi: i32) -> f64 {
    A4_FREQUENCY * 2.0_f64.powf((midi as f64 - A4_MIDI as f64) / 12.0)
}

/// Computes the full note identity of a frequency.
///
/// # Arguments
/// * `freq` - Detected frequency in Hz (positive and finite)
///
/// # Returns
/// * `NoteIdentity` with the nearest note and its cent deviation
pub fn note_identity(freq: f64) -> NoteIdentity {
    let midi_note = midi_from_frequency(freq);
    let exact_frequency_hz = exact_frequency(midi_note);

    NoteIdentity {
        midi_note,
        note_name: NoteName::from_midi(midi_note),
        octave: midi_note.div_euclid(12) - 1,
        exact_frequency_hz,
        cents_from_exact: cents_between(freq, exact_frequency_hz),
    }
}

/// Calculates the interval between two frequencies in cents.
///
/// Cents are a logarithmic unit of pitch measurement where:
/// - 100 cents = 1 semitone
/// - 1200 cents = 1 octave
/// - Positive values mean `freq` is sharp relative to `reference`
pub fn cents_between(freq: f64, reference: f64) -> f64 {
    1200.0 * (freq / reference).log2()
}
