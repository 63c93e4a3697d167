// Themes: ordered runs of motifs with repetition structure.
//
// A theme is to a motif what a sentence is to a word. Abstract themes are
// assembled from two pools: the piece-wide shared motif pool and a local pool
// of the same size generated fresh for each theme, so a piece reuses some
// material everywhere while each theme still has its own. Motifs are appended
// until the theme reaches its target length, with a strictness-dependent
// bias toward repeating the previous motif.
//
// Concrete themes render every motif of an abstract theme under one key,
// key type, instrument and time division. Each motif gets its own mutation
// budget drawn around `max_mutations * concreteness`, and every motif after
// the first is pulled to start near the previous motif's final degree so the
// melody stays continuous across motif boundaries.
//
// Depends on motif.rs for generation and concretize.rs for rendering; used by
// piece.rs.

use crate::concretize::{ConcreteMotif, MotifConcreteConfig, concretize_motif, validate_ticks_per_quarter};
use crate::error::ComposeError;
use crate::motif::{AbstractMotif, MotifGenConfig, generate_motif, validate_length};
use crate::mutation::MutationWeights;
use crate::scale::{Key, KeyType};
use crate::strictness::{Strictness, StrictnessProfile};
use crate::track::{Instrument, NoteTrack};
use serde::{Deserialize, Serialize};
use strata_prng::RandomStream;
use tracing::debug;

/// Measure-length multipliers for 3/4, 4/4 and 5/4 time.
pub const TIME_SIGNATURE_SCALES: [f64; 3] = [0.75, 1.0, 1.25];

/// Base motif lengths in 4/4 measures.
pub const BASE_MOTIF_LENGTHS: [f64; 3] = [1.0, 1.5, 2.0];

/// Standard deviation of per-motif mutation budgets around the ceiling.
const BUDGET_SPREAD: f64 = 10.0;

/// Settings for assembling one abstract theme.
#[derive(Debug, Clone, Copy)]
pub struct ThemeGenConfig<'a> {
    /// Approximate length in whole notes; the theme stops at the first motif
    /// that reaches it.
    pub length: f64,
    /// Motifs shared across the whole piece.
    pub motif_pool: &'a [AbstractMotif],
    /// Fraction of the mutation ceiling granted at concretization, in [0, 1].
    pub concreteness: f64,
    pub strictness: Strictness,
}

/// Where a theme's motif came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MotifChoice {
    /// Index into the shared pool.
    Shared(usize),
    /// Index into the theme's local pool.
    Local(usize),
}

/// An ordered sequence of abstract motifs plus its concreteness.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbstractTheme {
    motifs: Vec<AbstractMotif>,
    choices: Vec<MotifChoice>,
    concreteness: f64,
}

impl AbstractTheme {
    pub fn motifs(&self) -> &[AbstractMotif] {
        &self.motifs
    }

    /// Pool origin of each motif, parallel to `motifs()`.
    pub fn choices(&self) -> &[MotifChoice] {
        &self.choices
    }

    pub fn concreteness(&self) -> f64 {
        self.concreteness
    }

    /// Sum of the motif lengths, in whole notes.
    pub fn length(&self) -> f64 {
        self.motifs.iter().map(AbstractMotif::length).sum()
    }
}

/// Chance of repeating the previous motif after `consecutive_repeats`
/// repeats in a row.
///
/// Zero without extra repeat weight; a flat 0.3 without decay; otherwise
/// `0.6 - 0.2 * consecutive_repeats`, which reaches zero at three repeats.
pub fn repeat_probability(profile: &StrictnessProfile, consecutive_repeats: u32) -> f64 {
    if !profile.extra_repeat_weight {
        0.0
    } else if !profile.decay_repeat_weight {
        0.3
    } else {
        (0.6 - 0.2 * consecutive_repeats as f64).max(0.0)
    }
}

/// Assemble an abstract theme.
pub fn generate_theme(
    config: &ThemeGenConfig<'_>,
    rng: &mut RandomStream,
) -> Result<AbstractTheme, ComposeError> {
    validate_length(config.length)?;
    if !(0.0..=1.0).contains(&config.concreteness) {
        return Err(ComposeError::InvalidConcreteness(config.concreteness));
    }
    if config.motif_pool.is_empty() {
        return Err(ComposeError::EmptyMotifPool);
    }
    let profile = config.strictness.profile();

    let scale = TIME_SIGNATURE_SCALES[rng.range_usize(0, TIME_SIGNATURE_SCALES.len())];
    let lengths = BASE_MOTIF_LENGTHS.map(|l| l * scale);

    let mut local_pool = Vec::with_capacity(config.motif_pool.len());
    for _ in 0..config.motif_pool.len() {
        let length = match rng.range_usize(0, 3) {
            0 => lengths[0],
            1 if profile.non_integer_motifs => lengths[1],
            _ => lengths[2],
        };
        let motif_config = MotifGenConfig {
            length,
            strictness: config.strictness,
        };
        local_pool.push(generate_motif(&motif_config, rng)?);
    }

    let shared_len = config.motif_pool.len();
    let combined_len = shared_len + local_pool.len();
    let uniform_pick = |rng: &mut RandomStream| {
        let index = rng.range_usize(0, combined_len);
        if index < shared_len {
            MotifChoice::Shared(index)
        } else {
            MotifChoice::Local(index - shared_len)
        }
    };

    let mut motifs = Vec::new();
    let mut choices = Vec::new();
    let mut total = 0.0;
    let mut consecutive_repeats = 0;

    while total < config.length {
        let choice = match choices.last().copied() {
            Some(previous) if profile.extra_repeat_weight => {
                if rng.next_f64() < repeat_probability(profile, consecutive_repeats) {
                    if profile.decay_repeat_weight {
                        consecutive_repeats += 1;
                    }
                    previous
                } else {
                    consecutive_repeats = 0;
                    uniform_pick(rng)
                }
            }
            _ => uniform_pick(rng),
        };

        let motif = match choice {
            MotifChoice::Shared(i) => &config.motif_pool[i],
            MotifChoice::Local(i) => &local_pool[i],
        };
        total += motif.length();
        motifs.push(motif.clone());
        choices.push(choice);
    }

    debug!(
        motifs = motifs.len(),
        time_scale = scale,
        length = total,
        concreteness = config.concreteness,
        "generated abstract theme"
    );

    Ok(AbstractTheme {
        motifs,
        choices,
        concreteness: config.concreteness,
    })
}

/// Settings for concretizing a theme.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThemeConcreteConfig {
    pub key: Key,
    pub key_type: KeyType,
    /// Mutation ceiling per motif at full concreteness.
    pub max_mutations: u32,
    pub instrument: Instrument,
    pub ticks_per_quarter: u32,
    pub strictness: Strictness,
    #[serde(default)]
    pub mutation_weights: MutationWeights,
}

/// A theme's motifs rendered back to back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteTheme {
    motifs: Vec<ConcreteMotif>,
}

impl ConcreteTheme {
    pub fn motifs(&self) -> &[ConcreteMotif] {
        &self.motifs
    }

    /// Total span: the sum of the motif spans, saturating at `u32::MAX`.
    pub fn ticks(&self) -> u32 {
        self.motifs
            .iter()
            .fold(0u32, |acc, m| acc.saturating_add(m.ticks()))
    }

    /// Append every motif to `track`, starting at `base` and laying the
    /// motifs out one after another.
    ///
    /// Fails without appending anything if the theme would end past
    /// `u32::MAX`.
    pub fn append_to(&self, track: &mut NoteTrack, base: u32) -> Result<(), ComposeError> {
        self.motifs
            .iter()
            .try_fold(base, |end, m| end.checked_add(m.ticks()))
            .ok_or(ComposeError::TickOverflow)?;

        let mut offset = base;
        for motif in &self.motifs {
            track.append_at(offset, motif.notes())?;
            offset += motif.ticks();
        }
        Ok(())
    }
}

/// Concretize every motif of an abstract theme.
pub fn concretize_theme(
    theme: &AbstractTheme,
    config: &ThemeConcreteConfig,
    rng: &mut RandomStream,
) -> Result<ConcreteTheme, ComposeError> {
    validate_ticks_per_quarter(config.ticks_per_quarter)?;

    let ceiling = config.max_mutations as f64 * theme.concreteness;
    let base = MotifConcreteConfig {
        mutation_weights: config.mutation_weights,
        ..MotifConcreteConfig::new(
            config.key,
            config.key_type,
            config.instrument,
            config.ticks_per_quarter,
            config.strictness,
        )
    };

    let mut motifs = Vec::with_capacity(theme.motifs.len());
    for (i, motif) in theme.motifs.iter().enumerate() {
        let budget = loop {
            let b = rng.normal(ceiling, BUDGET_SPREAD);
            if b >= 0.0 {
                break (b + 0.5) as u32;
            }
        };

        let mut motif_config = base.with_budget(budget);
        let previous_end = i
            .checked_sub(1)
            .and_then(|prev| theme.motifs[prev].last_degree());
        if let Some(degree) = previous_end {
            motif_config = motif_config.with_start_note(degree);
        }

        motifs.push(concretize_motif(motif, &motif_config, rng)?);
    }

    let concrete = ConcreteTheme { motifs };
    debug!(
        motifs = concrete.motifs.len(),
        ceiling,
        ticks = concrete.ticks(),
        "concretized theme"
    );
    Ok(concrete)
}
