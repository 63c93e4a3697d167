// Abstract motif generation: the smallest musical cell.
//
// An abstract motif is a short run of notes that exactly fills a target
// length, with pitches expressed as scale degrees and time in 32nd-note
// units. It carries no key, instrument or tempo; those are chosen later when
// concretize.rs turns it into absolute notes.
//
// Generation walks a cursor from 0 to the target length. Each step:
// 1. samples a note-length exponent (32nd to whole note, weighted toward
//    quarters and eighths),
// 2. halves the note until it starts on the strictness grid,
// 3. halves it again until it fits the remaining time,
// 4. picks a degree (anchored, uniform, or contour-following),
// 5. emits the note and advances the cursor.
// Steps 2 and 3 bottom out at a single 32nd, so the loop always terminates.
//
// Time is integer 32nds throughout; the target length is snapped to that
// grid, which every length the pipeline asks for already lies on.

use crate::error::ComposeError;
use crate::strictness::{NoteSelection, Strictness};
use serde::{Deserialize, Serialize};
use strata_prng::RandomStream;
use tracing::trace;

/// Abstract time units (32nd notes) per whole note.
pub const UNITS_PER_WHOLE: u32 = 32;

/// Abstract time units per quarter note.
pub const UNITS_PER_QUARTER: u32 = UNITS_PER_WHOLE / 4;

/// Largest note-length exponent: a 1/2^5 = 32nd note.
const MAX_LENGTH_EXPONENT: i32 = 5;

/// A note in abstract form: scale degree plus position in 32nd notes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbstractNote {
    /// Scale degree relative to the key: 0 is the tonic, 7 the octave above.
    /// Values outside 0..=7 transpose by whole octaves.
    pub degree: f64,
    /// Offset from the start of the motif, in 32nd notes.
    pub begin: u32,
    /// Length in 32nd notes.
    pub duration: u32,
}

impl AbstractNote {
    pub fn end(&self) -> u32 {
        self.begin.saturating_add(self.duration)
    }
}

/// An ordered run of abstract notes exactly filling `[0, length)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbstractMotif {
    notes: Vec<AbstractNote>,
    /// Target length in whole notes.
    length: f64,
}

impl AbstractMotif {
    pub fn notes(&self) -> &[AbstractNote] {
        &self.notes
    }

    /// Target length in whole notes.
    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Degree of the first note, if any.
    pub fn first_degree(&self) -> Option<f64> {
        self.notes.first().map(|n| n.degree)
    }

    /// Degree of the final note, if any.
    pub fn last_degree(&self) -> Option<f64> {
        self.notes.last().map(|n| n.degree)
    }

    /// Total span of the notes, in 32nd notes.
    pub fn span_units(&self) -> u32 {
        self.notes.last().map(AbstractNote::end).unwrap_or(0)
    }

    /// Move one note's degree. Only the concretizer's working copy is ever
    /// shifted; shared motifs are cloned before mutation.
    pub(crate) fn shift_degree(&mut self, index: usize, delta: f64) {
        self.notes[index].degree += delta;
    }
}

/// Settings for one abstract motif.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotifGenConfig {
    /// Target length in whole notes.
    pub length: f64,
    pub strictness: Strictness,
}

impl MotifGenConfig {
    pub fn new(length: f64, strictness: Strictness) -> Result<Self, ComposeError> {
        validate_length(length)?;
        Ok(MotifGenConfig { length, strictness })
    }
}

pub(crate) fn validate_length(length: f64) -> Result<(), ComposeError> {
    if length.is_finite() && length > 0.0 {
        Ok(())
    } else {
        Err(ComposeError::InvalidLength(length))
    }
}

/// Generate an abstract motif.
///
/// The notes tile `[0, length)` with no gaps or overlaps. At strictness 4-5
/// the first degree is always 0.
pub fn generate_motif(
    config: &MotifGenConfig,
    rng: &mut RandomStream,
) -> Result<AbstractMotif, ComposeError> {
    validate_length(config.length)?;
    let profile = config.strictness.profile();
    let target = ((config.length * UNITS_PER_WHOLE as f64).round() as u32).max(1);

    let mut notes: Vec<AbstractNote> = Vec::new();
    let mut pos: u32 = 0;
    let mut last_degree = 0.0;

    while pos < target {
        let mut units = UNITS_PER_WHOLE >> sample_length_exponent(rng);

        // Start on a multiple of units / note_align; a grid finer than one
        // 32nd is always met.
        if profile.note_align > 0 {
            loop {
                let grid = units / profile.note_align;
                if grid == 0 || pos % grid == 0 {
                    break;
                }
                units /= 2;
            }
        }

        while units > target - pos {
            units /= 2;
        }

        let degree = if notes.is_empty() && profile.force_first_note_zero {
            0.0
        } else {
            match profile.note_selection {
                NoteSelection::Uniform => rng.range_u64(0, 8) as f64,
                NoteSelection::Contour => {
                    let degree = sample_contour_degree(last_degree, rng);
                    last_degree = degree;
                    degree
                }
            }
        };

        notes.push(AbstractNote {
            degree,
            begin: pos,
            duration: units,
        });
        pos += units;
    }

    trace!(notes = notes.len(), length = config.length, "generated abstract motif");
    Ok(AbstractMotif {
        notes,
        length: config.length,
    })
}

/// Sample `n` for a 1/2^n whole-note duration.
///
/// The offset is redrawn until it lands in [0.2, 2]; the candidate
/// (truncated toward zero) is redrawn until non-negative, then capped at a
/// 32nd note.
fn sample_length_exponent(rng: &mut RandomStream) -> u32 {
    let offset = loop {
        let o = rng.normal(0.7, 0.5);
        if (0.2..=2.0).contains(&o) {
            break o;
        }
    };
    let candidate = loop {
        let c = (rng.normal(2.0, 1.0) + offset) as i32;
        if c >= 0 {
            break c;
        }
    };
    candidate.min(MAX_LENGTH_EXPONENT) as u32
}

/// Draw a degree near `last` and round it half-up to a whole degree.
///
/// Raw draws within 0.1 of `last` are redrawn, but rounding can still land
/// on `last` itself, so a repeated degree stays fairly common.
fn sample_contour_degree(last: f64, rng: &mut RandomStream) -> f64 {
    let draw = loop {
        let d = rng.normal(last, 2.0);
        if (d - last).abs() >= 0.1 {
            break d;
        }
    };
    (draw + 0.5).floor()
}
