//! # Instrument Tuning Module
//!
//! Instrument profiles are ordered sets of string targets. The built-in
//! catalog (standard guitar and ukulele) is computed once at first use and
//! shared read-only afterwards.
//!
//! ## Features
//! - Validated profile construction (distinct frequencies, contiguous ordinals)
//! - Nearest-string lookup by percentage frequency deviation
//! - Lookup of strings by name or ordinal and of instruments by id

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TunerError};

/// Default maximum deviation, in percent, for a pitch to count as a string match.
pub const DEFAULT_MAX_PERCENT_DEVIATION: f64 = 30.0;

/// The tuned target of one instrument string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringTarget {
    /// Note label of the string (e.g., "E2")
    pub name: String,
    /// Target frequency in Hz
    pub frequency_hz: f64,
    /// Conventional string number, starting at 1
    pub ordinal: usize,
}

impl StringTarget {
    pub fn new(name: impl Into<String>, frequency_hz: f64, ordinal: usize) -> Self {
        Self {
            name: name.into(),
            frequency_hz,
            ordinal,
        }
    }
}

/// An immutable, validated set of string targets for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentProfile {
    id: String,
    name: String,
    strings: Vec<StringTarget>,
}

impl InstrumentProfile {
    /// Builds a profile, rejecting misconfigured string tables.
    ///
    /// # Arguments
    /// * `id` - Stable identifier used for lookups (e.g., "guitar")
    /// * `name` - Display name (e.g., "Guitar")
    /// * `strings` - String targets in physical order
    ///
    /// # Returns
    /// * `Ok(profile)` - Profile with non-empty, distinct, positive frequencies
    ///   and ordinals forming exactly 1..=N
    /// * `Err(e)` - The first validation failure found
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        strings: Vec<StringTarget>,
    ) -> Result<Self> {
        let id = id.into();
        if strings.is_empty() {
            return Err(TunerError::EmptyProfile(id));
        }

        let mut names = HashSet::new();
        for (i, string) in strings.iter().enumerate() {
            if !string.frequency_hz.is_finite() || string.frequency_hz <= 0.0 {
                return Err(TunerError::InvalidStringFrequency {
                    profile: id,
                    string: string.name.clone(),
                    frequency: string.frequency_hz,
                });
            }
            if strings[..i]
                .iter()
                .any(|other| other.frequency_hz == string.frequency_hz)
            {
                return Err(TunerError::DuplicateFrequency {
                    profile: id,
                    frequency: string.frequency_hz,
                });
            }
            if !names.insert(string.name.as_str()) {
                return Err(TunerError::DuplicateStringName {
                    profile: id,
                    string: string.name.clone(),
                });
            }
        }

        let mut ordinals: Vec<usize> = strings.iter().map(|s| s.ordinal).collect();
        ordinals.sort_unstable();
        if ordinals.iter().enumerate().any(|(i, &ordinal)| ordinal != i + 1) {
            return Err(TunerError::InvalidOrdinals {
                profile: id,
                count: strings.len(),
                found: strings.iter().map(|s| s.ordinal).collect(),
            });
        }

        Ok(Self {
            id,
            name: name.into(),
            strings,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// String targets in physical order.
    pub fn strings(&self) -> &[StringTarget] {
        &self.strings
    }

    pub fn string_by_name(&self, name: &str) -> Option<&StringTarget> {
        self.strings.iter().find(|s| s.name == name)
    }

    pub fn string_by_ordinal(&self, ordinal: usize) -> Option<&StringTarget> {
        self.strings.iter().find(|s| s.ordinal == ordinal)
    }

    pub fn contains(&self, target: &StringTarget) -> bool {
        self.strings.iter().any(|s| s == target)
    }
}

/// Finds the string whose target frequency is closest to `freq`.
///
/// Distance is the percentage deviation from each target. Equidistant
/// targets resolve to the lower ordinal.
///
/// # Returns
/// * `Some(target)` - Closest string within `max_percent_deviation`
/// * `None` - Every string is further away than the bound
pub fn nearest_string(
    profile: &InstrumentProfile,
    freq: f64,
    max_percent_deviation: f64,
) -> Option<&StringTarget> {
    let (closest, percent) = profile
        .strings
        .iter()
        .map(|target| {
            let percent = (freq - target.frequency_hz).abs() / target.frequency_hz * 100.0;
            (target, percent)
        })
        .min_by(|(a, pa), (b, pb)| {
            pa.total_cmp(pb).then_with(|| a.ordinal.cmp(&b.ordinal))
        })?;

    (percent <= max_percent_deviation).then_some(closest)
}

// (name, frequency, ordinal)
const GUITAR_STRINGS: [(&str, f64, usize); 6] = [
    ("E4", 329.63, 1),
    ("B3", 246.94, 2),
    ("G3", 196.00, 3),
    ("D3", 146.83, 4),
    ("A2", 110.00, 5),
    ("E2", 82.41, 6),
];

const UKULELE_STRINGS: [(&str, f64, usize); 4] = [
    ("A4", 440.00, 1),
    ("E4", 329.63, 2),
    ("C4", 261.63, 3),
    ("G4", 392.00, 4),
];

fn build_builtin(id: &str, name: &str, table: &[(&str, f64, usize)]) -> Arc<InstrumentProfile> {
    let strings = table
        .iter()
        .map(|&(label, freq, ordinal)| StringTarget::new(label, freq, ordinal))
        .collect();
    // The constant tables are covered by the catalog tests.
    Arc::new(InstrumentProfile::new(id, name, strings).expect("built-in instrument table is valid"))
}

/// Built-in instrument profiles, computed once at first use.
static CATALOG: Lazy<Vec<Arc<InstrumentProfile>>> = Lazy::new(|| {
    vec![
        build_builtin("guitar", "Guitar", &GUITAR_STRINGS),
        build_builtin("ukulele", "Ukulele", &UKULELE_STRINGS),
    ]
});

/// All built-in instruments, guitar first.
pub fn available_instruments() -> &'static [Arc<InstrumentProfile>] {
    &CATALOG
}

/// Looks up a built-in instrument by id (case-insensitive).
pub fn find_instrument(id: &str) -> Option<Arc<InstrumentProfile>> {
    CATALOG
        .iter()
        .find(|profile| profile.id.eq_ignore_ascii_case(id))
        .cloned()
}

/// Standard six-string guitar tuning (E2 A2 D3 G3 B3 E4).
pub fn guitar_standard() -> Arc<InstrumentProfile> {
    Arc::clone(&CATALOG[0])
}

/// Standard re-entrant ukulele tuning (G4 C4 E4 A4).
pub fn ukulele_standard() -> Arc<InstrumentProfile> {
    Arc::clone(&CATALOG[1])
}
