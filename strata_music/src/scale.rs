// Key and scale support: the note/scale adapter used at pitch resolution.
//
// Abstract motifs speak in scale degrees (0 = tonic, 7 = the octave above).
// This module turns a degree plus a key and key type into an absolute MIDI
// pitch, and parses key names like "C4" or "F#3" into keys.
//
// This module provides:
// - `KeyType` (major, harmonic minor, natural minor) with semitone tables
// - `Key`, the MIDI pitch of a tonic
// - `resolve_pitch`, total degree-to-pitch mapping folded into the MIDI range
// - `parse_key_name` / `pitch_name` for scientific pitch notation (C4 = 60)
//
// Used by concretize.rs when rendering abstract notes and by piece.rs when
// choosing candidate keys.

use crate::error::ScaleError;
use serde::{Deserialize, Serialize};

/// Highest MIDI pitch number.
pub const MAX_PITCH: u8 = 127;

/// The three scale families a piece can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Major,
    HarmonicMinor,
    NaturalMinor,
}

impl KeyType {
    pub const ALL: [KeyType; 3] = [KeyType::Major, KeyType::HarmonicMinor, KeyType::NaturalMinor];

    /// Semitone intervals from the tonic to each of the seven scale degrees.
    pub fn intervals(self) -> [u8; 7] {
        match self {
            KeyType::Major => [0, 2, 4, 5, 7, 9, 11],
            KeyType::HarmonicMinor => [0, 2, 3, 5, 7, 8, 11],
            KeyType::NaturalMinor => [0, 2, 3, 5, 7, 8, 10],
        }
    }

    /// The key type a key-type mutation switches to. `coin` picks between
    /// the two other scale families.
    pub fn mutated(self, coin: bool) -> KeyType {
        match (self, coin) {
            (KeyType::Major, false) => KeyType::HarmonicMinor,
            (KeyType::Major, true) => KeyType::NaturalMinor,
            (KeyType::HarmonicMinor, false) => KeyType::Major,
            (KeyType::HarmonicMinor, true) => KeyType::NaturalMinor,
            (KeyType::NaturalMinor, false) => KeyType::Major,
            (KeyType::NaturalMinor, true) => KeyType::HarmonicMinor,
        }
    }
}

/// A key, identified by the MIDI pitch of its tonic (0-127).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(u8);

impl Key {
    /// Create a key from a tonic MIDI pitch, clamped to the MIDI range.
    pub fn new(tonic: u8) -> Self {
        Key(tonic.min(MAX_PITCH))
    }

    /// MIDI pitch of the tonic.
    pub fn tonic(self) -> u8 {
        self.0
    }

    /// The key moved by `semitones`, clamped to the MIDI range.
    pub fn transposed(self, semitones: i32) -> Self {
        Key((self.0 as i32 + semitones).clamp(0, MAX_PITCH as i32) as u8)
    }
}

/// Map a scale degree in a key to an absolute MIDI pitch.
///
/// Degree 0 is the tonic, 7 the octave above, and negative degrees descend
/// below the tonic. Pitches that would leave the MIDI range are folded back by
/// whole octaves, so every degree resolves.
pub fn resolve_pitch(key: Key, key_type: KeyType, degree: i32) -> u8 {
    let octave = degree.div_euclid(7);
    let step = degree.rem_euclid(7) as usize;
    let mut pitch = key.tonic() as i32 + octave * 12 + key_type.intervals()[step] as i32;

    while pitch < 0 {
        pitch += 12;
    }
    while pitch > MAX_PITCH as i32 {
        pitch -= 12;
    }
    pitch as u8
}

/// Parse a key name in scientific pitch notation ("C4" = 60, "F#3", "Bb5").
///
/// The letter is case-insensitive; one `#` or `b` accidental is allowed;
/// octaves run from -1 to 9 as long as the pitch stays within MIDI range.
pub fn parse_key_name(name: &str) -> Result<Key, ScaleError> {
    let unknown = || ScaleError::UnknownKeyName(name.to_string());
    let trimmed = name.trim();
    let mut chars = trimmed.chars();

    let letter = chars.next().ok_or_else(unknown)?;
    let pitch_class: i32 = match letter.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return Err(unknown()),
    };

    let rest = chars.as_str();
    let (accidental, octave_text) = if let Some(r) = rest.strip_prefix('#') {
        (1, r)
    } else if let Some(r) = rest.strip_prefix('b') {
        (-1, r)
    } else {
        (0, rest)
    };

    let octave: i32 = octave_text.parse().map_err(|_| unknown())?;
    if !(-1..=9).contains(&octave) {
        return Err(unknown());
    }

    let pitch = (octave + 1) * 12 + pitch_class + accidental;
    if !(0..=MAX_PITCH as i32).contains(&pitch) {
        return Err(unknown());
    }
    Ok(Key(pitch as u8))
}

/// Name a MIDI pitch in scientific pitch notation (e.g. 60 -> "C4").
pub fn pitch_name(pitch: u8) -> String {
    const NAMES: [&str; 12] = [
        "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
    ];
    let octave = pitch as i32 / 12 - 1;
    format!("{}{}", NAMES[(pitch % 12) as usize], octave)
}
