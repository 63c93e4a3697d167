// Motif concretization: from scale degrees and 32nds to MIDI pitches and ticks.
//
// A concrete motif is one performance of an abstract motif. Concretization
// works on a private copy of the abstract motif:
// 1. run the budgeted mutation search (mutation.rs), which may shift notes,
//    the key, the key type and the time scale,
// 2. optionally offset every degree so the motif starts near a requested
//    degree (used by themes to chain motifs melodically),
// 3. resolve each degree through the scale adapter (scale.rs) and rescale
//    32nd-note positions to ticks.
//
// The abstract motif passed in is never modified, so shared motifs can be
// concretized any number of times.

use crate::error::ComposeError;
use crate::motif::{AbstractMotif, UNITS_PER_QUARTER};
use crate::mutation::{
    MAX_TICKS_PER_QUARTER, MIN_TICKS_PER_QUARTER, MutationContext, MutationReport,
    MutationWeights, run_mutation_search,
};
use crate::scale::{Key, KeyType, resolve_pitch};
use crate::strictness::Strictness;
use crate::track::{ConcreteNote, Instrument};
use serde::{Deserialize, Serialize};
use strata_prng::RandomStream;
use tracing::debug;

/// Settings for concretizing one motif.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotifConcreteConfig {
    pub key: Key,
    pub key_type: KeyType,
    /// Mutation points this motif may spend.
    pub mutation_budget: u32,
    pub instrument: Instrument,
    /// Ticks per quarter note before any tempo mutation.
    pub ticks_per_quarter: u32,
    /// Start the motif near `start_note` instead of where it was written.
    pub force_start_note: bool,
    /// Degree to start near when `force_start_note` is set.
    pub start_note: f64,
    pub strictness: Strictness,
    #[serde(default)]
    pub mutation_weights: MutationWeights,
}

impl MotifConcreteConfig {
    /// Settings with no mutation budget, no forced start and default
    /// mutation weights.
    pub fn new(
        key: Key,
        key_type: KeyType,
        instrument: Instrument,
        ticks_per_quarter: u32,
        strictness: Strictness,
    ) -> Self {
        MotifConcreteConfig {
            key,
            key_type,
            mutation_budget: 0,
            instrument,
            ticks_per_quarter,
            force_start_note: false,
            start_note: 0.0,
            strictness,
            mutation_weights: MutationWeights::default(),
        }
    }

    pub fn with_budget(mut self, budget: u32) -> Self {
        self.mutation_budget = budget;
        self
    }

    pub fn with_start_note(mut self, degree: f64) -> Self {
        self.force_start_note = true;
        self.start_note = degree;
        self
    }
}

/// One performance of a motif, in absolute pitches and ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteMotif {
    notes: Vec<ConcreteNote>,
    mutations: MutationReport,
}

impl ConcreteMotif {
    pub fn notes(&self) -> &[ConcreteNote] {
        &self.notes
    }

    /// The mutations applied while concretizing.
    pub fn mutations(&self) -> &MutationReport {
        &self.mutations
    }

    /// Span in ticks: the latest note end (0 if empty).
    pub fn ticks(&self) -> u32 {
        self.notes.iter().map(ConcreteNote::end).max().unwrap_or(0)
    }
}

pub(crate) fn validate_ticks_per_quarter(ticks_per_quarter: u32) -> Result<(), ComposeError> {
    if (MIN_TICKS_PER_QUARTER..=MAX_TICKS_PER_QUARTER).contains(&ticks_per_quarter) {
        Ok(())
    } else {
        Err(ComposeError::InvalidTicksPerQuarter {
            got: ticks_per_quarter,
            min: MIN_TICKS_PER_QUARTER,
            max: MAX_TICKS_PER_QUARTER,
        })
    }
}

/// Concretize an abstract motif.
///
/// The result has exactly one concrete note per abstract note. With a zero
/// budget and no forced start nothing is drawn from `rng`, so repeated calls
/// give identical output.
pub fn concretize_motif(
    motif: &AbstractMotif,
    config: &MotifConcreteConfig,
    rng: &mut RandomStream,
) -> Result<ConcreteMotif, ComposeError> {
    if motif.is_empty() {
        return Err(ComposeError::EmptyMotif);
    }
    validate_ticks_per_quarter(config.ticks_per_quarter)?;

    let mut context = MutationContext {
        motif: motif.clone(),
        key: config.key,
        key_type: config.key_type,
        ticks_per_quarter: config.ticks_per_quarter,
    };
    let report = run_mutation_search(
        &mut context,
        config.mutation_budget,
        &config.mutation_weights,
        rng,
    );

    let degree_offset = if config.force_start_note {
        let first = context.motif.notes()[0].degree;
        config.start_note - first + rng.normal(0.0, 2.0)
    } else {
        0.0
    };

    let tpq = context.ticks_per_quarter as u64;
    let to_ticks = |units: u32| -> u32 {
        u32::try_from(units as u64 * tpq / UNITS_PER_QUARTER as u64).unwrap_or(u32::MAX)
    };

    let notes: Vec<ConcreteNote> = context
        .motif
        .notes()
        .iter()
        .map(|note| {
            let degree = (note.degree + degree_offset).round() as i32;
            ConcreteNote {
                pitch: resolve_pitch(context.key, context.key_type, degree),
                begin: to_ticks(note.begin),
                duration: to_ticks(note.duration),
                instrument: config.instrument,
            }
        })
        .collect();

    debug!(
        notes = notes.len(),
        budget = config.mutation_budget,
        spent = report.points_spent,
        mutations = report.applied.len(),
        "concretized motif"
    );

    Ok(ConcreteMotif {
        notes,
        mutations: report,
    })
}
