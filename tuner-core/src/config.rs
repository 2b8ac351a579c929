//! # Configuration Module
//!
//! JSON configuration for the tuner core: which instrument is active,
//! engine thresholds, additional instrument profiles and an optional
//! replacement for the harmonic-correction table.
//!
//! ```json
//! {
//!   "instrument": "drop-d",
//!   "engine": { "tuning_tolerance_cents": 5.0 },
//!   "instruments": [
//!     { "id": "drop-d", "name": "Drop D Guitar",
//!       "strings": [ { "name": "E4" }, { "name": "B3" }, { "name": "G3" },
//!                    { "name": "D3" }, { "name": "A2" }, { "name": "D2" } ] }
//!   ]
//! }
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::engine::EngineConfig;
use crate::harmonic::{CorrectionRule, HarmonicCorrector};
use crate::instrument::{self, InstrumentProfile, StringTarget};
use crate::note::NoteLabel;

/// Top-level configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunerConfig {
    /// Id of the active instrument
    #[serde(default = "default_instrument")]
    pub instrument: String,

    #[serde(default)]
    pub engine: EngineConfig,

    /// Instruments in addition to the built-in catalog
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instruments: Vec<InstrumentSpec>,

    /// Replaces the default harmonic corrections when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub harmonic_rules: Option<Vec<CorrectionRule>>,
}

/// A user-defined instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Strings in physical order; string `i` gets ordinal `i + 1`
    pub strings: Vec<StringSpec>,
}

/// One string of a user-defined instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringSpec {
    pub name: String,
    /// Target frequency; defaults to the equal-tempered frequency of `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_hz: Option<f64>,
}

fn default_instrument() -> String {
    "guitar".to_string()
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            instrument: default_instrument(),
            engine: EngineConfig::default(),
            instruments: Vec::new(),
            harmonic_rules: None,
        }
    }
}

impl InstrumentSpec {
    /// Builds a validated profile from this spec.
    pub fn build(&self) -> Result<InstrumentProfile> {
        let strings = self
            .strings
            .iter()
            .enumerate()
            .map(|(i, string)| -> Result<StringTarget> {
                let frequency = match string.frequency_hz {
                    Some(freq) => freq,
                    None => string
                        .name
                        .parse::<NoteLabel>()
                        .with_context(|| {
                            format!(
                                "String '{}' needs a frequency_hz or a note name",
                                string.name
                            )
                        })?
                        .frequency(),
                };
                Ok(StringTarget::new(string.name.clone(), frequency, i + 1))
            })
            .collect::<Result<Vec<_>>>()?;

        let name = self.name.clone().unwrap_or_else(|| self.id.clone());
        Ok(InstrumentProfile::new(self.id.clone(), name, strings)?)
    }
}

impl TunerConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_json_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: TunerConfig =
            serde_json::from_str(content).context("Failed to parse JSON config")?;
        config.validate()?;
        log::debug!(
            "[CONFIG] Loaded config: instrument '{}', {} custom instruments",
            config.instrument,
            config.instruments.len()
        );
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.engine.validate().context("Invalid engine section")?;

        for (idx, spec) in self.instruments.iter().enumerate() {
            spec.build()
                .with_context(|| format!("Invalid configuration for instrument {}", idx))?;
            if instrument::find_instrument(&spec.id).is_some() {
                return Err(anyhow!(
                    "Instrument id '{}' clashes with a built-in instrument",
                    spec.id
                ));
            }
            if self.instruments[..idx].iter().any(|other| other.id == spec.id) {
                return Err(anyhow!("Duplicate instrument id '{}'", spec.id));
            }
        }

        if let Some(rules) = &self.harmonic_rules {
            for (idx, rule) in rules.iter().enumerate() {
                validate_rule(rule).with_context(|| format!("Invalid harmonic rule {}", idx))?;
            }
        }

        self.resolve_instrument()?;
        Ok(())
    }

    /// Built-in instruments followed by the configured ones.
    pub fn instruments(&self) -> Result<Vec<Arc<InstrumentProfile>>> {
        let mut all = instrument::available_instruments().to_vec();
        for spec in &self.instruments {
            all.push(Arc::new(spec.build()?));
        }
        Ok(all)
    }

    /// The profile named by `instrument`.
    pub fn resolve_instrument(&self) -> Result<Arc<InstrumentProfile>> {
        self.find_instrument(&self.instrument)
    }

    /// Looks up a built-in or configured instrument by id.
    pub fn find_instrument(&self, id: &str) -> Result<Arc<InstrumentProfile>> {
        if let Some(profile) = instrument::find_instrument(id) {
            return Ok(profile);
        }
        match self.instruments.iter().find(|spec| spec.id == id) {
            Some(spec) => Ok(Arc::new(spec.build()?)),
            None => Err(crate::error::TunerError::UnknownInstrument(id.to_string()).into()),
        }
    }

    /// The configured harmonic corrector, or the default table.
    pub fn corrector(&self) -> HarmonicCorrector {
        match &self.harmonic_rules {
            Some(rules) => HarmonicCorrector::new(rules.clone()),
            None => HarmonicCorrector::default(),
        }
    }
}

fn validate_rule(rule: &CorrectionRule) -> Result<()> {
    match *rule {
        CorrectionRule::Threshold { below_hz, .. } => {
            if !below_hz.is_finite() || below_hz <= 0.0 {
                return Err(anyhow!("below_hz must be a positive frequency"));
            }
        }
        CorrectionRule::Range { min_hz, max_hz, .. } => {
            if !min_hz.is_finite() || !max_hz.is_finite() || min_hz < 0.0 || min_hz >= max_hz {
                return Err(anyhow!("Range must satisfy 0 <= min_hz < max_hz"));
            }
        }
    }
    Ok(())
}
