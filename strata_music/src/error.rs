// Error types for the Strata composer.
//
// The generation algorithms themselves are total: every sampling loop has a
// convergent bound. What can fail is the contract at the edges, so each public
// generation entry point validates its inputs and reports a violated
// precondition as a `ComposeError` instead of producing degenerate output.
// Key-name parsing and MIDI rendering have their own small error enums.

use thiserror::Error;

/// A violated precondition of a generation call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComposeError {
    #[error("length must be positive and finite, got {0}")]
    InvalidLength(f64),

    #[error("strictness must be in 1..=5, got {0}")]
    InvalidStrictness(u8),

    #[error("concreteness must be in [0, 1], got {0}")]
    InvalidConcreteness(f64),

    #[error("ticks per quarter note must be in {min}..={max}, got {got}")]
    InvalidTicksPerQuarter { got: u32, min: u32, max: u32 },

    #[error("motif has no notes")]
    EmptyMotif,

    #[error("theme generation needs a non-empty shared motif pool")]
    EmptyMotifPool,

    #[error("piece has no abstract themes to arrange")]
    NoThemes,

    #[error("piece has no candidate keys")]
    NoKeys,

    #[error("note timeline would run past tick {}", u32::MAX)]
    TickOverflow,
}

/// Failure to interpret a musical key name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScaleError {
    #[error("unknown key name '{0}' (expected e.g. C4, F#3, Bb5)")]
    UnknownKeyName(String),
}

/// Failure while writing a piece to a MIDI file.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ticks per quarter note {0} does not fit the 15-bit MIDI time division")]
    TicksPerQuarter(u32),
}
