// Strictness: the 1-5 dial that trades randomness for tonal convention.
//
// A single integer expands into several independent generation tunables
// (rhythmic grid, first-note anchoring, melodic selection mode, motif length
// freedom, repetition weighting, mutation ceiling). The expansion lives in
// one lookup table here so the generators read named fields instead of
// branching on the raw level.
//
// Level 1 produces very random material; level 5 produces conventional,
// repetitive, grid-aligned music.

use crate::error::ComposeError;
use serde::{Deserialize, Serialize};

/// How the motif generator picks scale degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteSelection {
    /// Each degree is uniform over one octave (0-7).
    Uniform,
    /// Each degree is drawn from a normal distribution centred on the
    /// previous one, so the melody follows a contour.
    Contour,
}

/// The tunables one strictness level expands into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrictnessProfile {
    /// Rhythmic grid divisor: a note of length L must start on a multiple of
    /// `L / note_align`. Zero disables alignment.
    pub note_align: u32,
    /// Anchor every motif on degree 0.
    pub force_first_note_zero: bool,
    pub note_selection: NoteSelection,
    /// Allow motifs of 1.5 measures (theme-local and shared pool alike).
    pub non_integer_motifs: bool,
    /// Themes repeat the previous motif more often than chance.
    pub extra_repeat_weight: bool,
    /// The extra repeat chance shrinks with each consecutive repeat.
    pub decay_repeat_weight: bool,
    /// Mutation ceiling per motif at full concreteness.
    pub max_mutations: u32,
}

const PROFILES: [StrictnessProfile; 5] = [
    // 1
    StrictnessProfile {
        note_align: 0,
        force_first_note_zero: false,
        note_selection: NoteSelection::Uniform,
        non_integer_motifs: true,
        extra_repeat_weight: false,
        decay_repeat_weight: false,
        max_mutations: 60,
    },
    // 2
    StrictnessProfile {
        note_align: 0,
        force_first_note_zero: false,
        note_selection: NoteSelection::Contour,
        non_integer_motifs: true,
        extra_repeat_weight: false,
        decay_repeat_weight: false,
        max_mutations: 50,
    },
    // 3
    StrictnessProfile {
        note_align: 8,
        force_first_note_zero: false,
        note_selection: NoteSelection::Contour,
        non_integer_motifs: false,
        extra_repeat_weight: true,
        decay_repeat_weight: false,
        max_mutations: 40,
    },
    // 4
    StrictnessProfile {
        note_align: 4,
        force_first_note_zero: true,
        note_selection: NoteSelection::Contour,
        non_integer_motifs: false,
        extra_repeat_weight: true,
        decay_repeat_weight: true,
        max_mutations: 30,
    },
    // 5
    StrictnessProfile {
        note_align: 2,
        force_first_note_zero: true,
        note_selection: NoteSelection::Contour,
        non_integer_motifs: false,
        extra_repeat_weight: true,
        decay_repeat_weight: true,
        max_mutations: 20,
    },
];

/// A validated strictness level in 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Strictness(u8);

impl Strictness {
    pub const LOOSEST: Strictness = Strictness(1);
    pub const STRICTEST: Strictness = Strictness(5);

    pub fn new(level: u8) -> Result<Self, ComposeError> {
        if (1..=5).contains(&level) {
            Ok(Strictness(level))
        } else {
            Err(ComposeError::InvalidStrictness(level))
        }
    }

    pub fn level(self) -> u8 {
        self.0
    }

    /// The tunables for this level.
    pub fn profile(self) -> &'static StrictnessProfile {
        &PROFILES[(self.0 - 1) as usize]
    }

    /// Number of abstract themes for a piece of `length` whole notes:
    /// roughly one theme per `6 + 2 * strictness` whole notes, at least one.
    pub fn theme_count(self, length: u32) -> usize {
        let per_theme = 6.0 + 2.0 * self.0 as f64;
        ((length as f64 / per_theme + 0.5) as usize).max(1)
    }
}

impl TryFrom<u8> for Strictness {
    type Error = ComposeError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Strictness::new(level)
    }
}

impl From<Strictness> for u8 {
    fn from(s: Strictness) -> u8 {
        s.0
    }
}
