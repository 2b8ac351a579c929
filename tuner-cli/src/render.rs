//! # Cent Meter Rendering
//!
//! Renders tuning states as single text lines with a needle meter, for
//! terminal output.
//!
//! ## Features
//! - Needle position clamped to a ±50 cent range
//! - Accuracy zones (close/near/far) shown by the needle glyph
//! - String, chromatic note, frequency and direction columns

use string_tuner_core::{TuningDirection, TuningState};

/// Maximum cent deviation range for the meter display.
/// The meter shows deviations from -50 to +50 cents.
pub const METER_RANGE: f64 = 50.0;

/// Number of character cells inside the meter brackets. Odd, so there is a centre cell.
pub const METER_WIDTH: usize = 41;

/// Accuracy zone of a cents offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// Within 5 cents
    Close,
    /// Within 20 cents
    Near,
    Far,
}

impl Zone {
    pub fn of(cents: f64) -> Self {
        if cents.abs() < 5.0 {
            Zone::Close
        } else if cents.abs() < 20.0 {
            Zone::Near
        } else {
            Zone::Far
        }
    }

    fn glyph(self) -> char {
        match self {
            Zone::Close => '█',
            Zone::Near => '▓',
            Zone::Far => '░',
        }
    }
}

/// Draws the needle meter for a cents offset, e.g. `[----------|--█-------]`.
pub fn meter(cents: Option<f64>) -> String {
    let center = METER_WIDTH / 2;
    let needle = cents.map(|c| {
        let clamped = c.clamp(-METER_RANGE, METER_RANGE);
        let position = (clamped + METER_RANGE) / (2.0 * METER_RANGE) * (METER_WIDTH - 1) as f64;
        (position.round() as usize, Zone::of(c).glyph())
    });

    let mut out = String::with_capacity(METER_WIDTH + 2);
    out.push('[');
    for cell in 0..METER_WIDTH {
        out.push(match needle {
            Some((pos, glyph)) if pos == cell => glyph,
            _ if cell == center => '|',
            _ => '-',
        });
    }
    out.push(']');
    out
}

fn direction_label(direction: TuningDirection) -> &'static str {
    match direction {
        TuningDirection::TooLow => "TOO LOW",
        TuningDirection::InTune => "IN TUNE",
        TuningDirection::TooHigh => "TOO HIGH",
    }
}

/// Formats one tuning state as a display line.
pub fn format_state(state: &TuningState) -> String {
    if state.is_silent {
        return format!("{:<6} {:<4} {:>9}  {:<8}  {}", "--", "--", "", "silent", meter(None));
    }

    let note = state
        .detected_note
        .map(|n| n.label().to_string())
        .unwrap_or_else(|| "--".to_string());
    let frequency = state
        .frequency_hz
        .map(|f| format!("{:.2} Hz", f))
        .unwrap_or_default();

    match &state.matched_string {
        Some(string) => {
            let pin = if state.is_pinned { " (pinned)" } else { "" };
            format!(
                "{:<6} {:<4} {:>9}  {:<8}  {} {:+6.1}c{}",
                format!("{}#{}", string.name, string.ordinal),
                note,
                frequency,
                direction_label(state.direction),
                meter(Some(state.cents_offset)),
                state.cents_offset,
                pin
            )
        }
        None => format!(
            "{:<6} {:<4} {:>9}  {:<8}  {}",
            "--",
            note,
            frequency,
            "no match",
            meter(None)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use string_tuner_core::instrument::guitar_standard;
    use string_tuner_core::note::note_identity;

    fn count(s: &str, c: char) -> usize {
        s.chars().filter(|&x| x == c).count()
    }

    #[test]
    fn test_meter_centre_and_edges() {
        let centered = meter(Some(0.0));
        assert_eq!(centered.chars().count(), METER_WIDTH + 2);
        assert_eq!(centered.chars().nth(1 + METER_WIDTH / 2), Some('█'));
        assert_eq!(count(&centered, '|'), 0);

        let empty = meter(None);
        assert_eq!(count(&empty, '|'), 1);

        let far_flat = meter(Some(-400.0));
        assert_eq!(far_flat.chars().nth(1), Some('░'));
        let far_sharp = meter(Some(75.0));
        assert_eq!(far_sharp.chars().nth(METER_WIDTH), Some('░'));
    }

    #[test]
    fn test_zones() {
        assert_eq!(Zone::of(-4.9), Zone::Close);
        assert_eq!(Zone::of(12.0), Zone::Near);
        assert_eq!(Zone::of(-20.0), Zone::Far);
    }

    #[test]
    fn test_format_states() {
        assert!(format_state(&TuningState::default()).contains("silent"));

        let d3 = guitar_standard().string_by_name("D3").unwrap().clone();
        let state = TuningState {
            matched_string: Some(d3),
            cents_offset: 12.3,
            direction: TuningDirection::TooHigh,
            is_silent: false,
            frequency_hz: Some(147.88),
            detected_note: Some(note_identity(147.88)),
            is_pinned: true,
        };
        let line = format_state(&state);
        assert!(line.starts_with("D3#4"));
        assert!(line.contains("147.88 Hz"));
        assert!(line.contains("TOO HIGH"));
        assert!(line.contains("+12.3c"));
        assert!(line.ends_with("(pinned)"));

        let unmatched = TuningState {
            matched_string: None,
            is_pinned: false,
            ..state
        };
        assert!(format_state(&unmatched).contains("no match"));
    }
}
