//! Error types for the tuner core

use thiserror::Error;

/// Errors raised by profile construction, configuration and session control.
///
/// Observation streams never produce errors: garbage frames are folded into
/// the silence/ambiguous paths of the engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TunerError {
    /// An instrument profile was built without strings
    #[error("Instrument '{0}' has no strings")]
    EmptyProfile(String),

    /// A string target frequency is zero, negative or not finite
    #[error("Instrument '{profile}': string '{string}' has invalid frequency {frequency} Hz")]
    InvalidStringFrequency {
        profile: String,
        string: String,
        frequency: f64,
    },

    /// Two strings of one instrument share a frequency
    #[error("Instrument '{profile}': duplicate string frequency {frequency} Hz")]
    DuplicateFrequency { profile: String, frequency: f64 },

    /// Two strings of one instrument share a name
    #[error("Instrument '{profile}': duplicate string name '{string}'")]
    DuplicateStringName { profile: String, string: String },

    /// String ordinals are not exactly 1..=N
    #[error("Instrument '{profile}': string ordinals must form 1..={count}, found {found:?}")]
    InvalidOrdinals {
        profile: String,
        count: usize,
        found: Vec<usize>,
    },

    /// A note name or label could not be parsed
    #[error("Invalid note: '{0}'")]
    InvalidNote(String),

    /// No instrument with the given id exists
    #[error("Unknown instrument: '{0}'")]
    UnknownInstrument(String),

    /// The active instrument has no string with the given name
    #[error("Instrument '{profile}' has no string named '{string}'")]
    UnknownString { profile: String, string: String },

    /// Engine thresholds are out of range
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// The session intake channel is closed
    #[error("Observation intake is closed")]
    IntakeClosed,

    /// The session worker thread could not be started
    #[error("Failed to spawn session worker: {0}")]
    WorkerSpawn(String),
}

/// Result type for tuner core operations
pub type Result<T> = std::result::Result<T, TunerError>;
