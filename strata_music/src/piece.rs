// Piece composition: the top-level driver of the pipeline.
//
// A piece is built in two phases. The material phase draws everything that
// stays fixed for the whole piece: a shared motif pool, a handful of
// candidate keys, one key type, and a set of abstract themes that all share
// the pool. The arrangement phase then repeatedly picks a random theme and a
// random candidate key, concretizes it, and appends it to the note track
// until the accumulated ticks reach the target.
//
// Piece length is given in whole notes and converted to ticks at the piece's
// own time division (`length * 4 * ticks_per_quarter`). Theme spans can
// differ from their nominal length when a tempo mutation fires, so the
// termination check always compares ticks with ticks.
//
// `compose_piece` runs both phases. `arrange_piece` is the arrangement phase
// on its own, for callers that bring their own themes and keys.

use crate::concretize::validate_ticks_per_quarter;
use crate::error::ComposeError;
use crate::motif::{AbstractMotif, MotifGenConfig, generate_motif};
use crate::mutation::{MAX_TICKS_PER_QUARTER, MutationWeights};
use crate::scale::{Key, KeyType};
use crate::strictness::Strictness;
use crate::theme::{
    AbstractTheme, ThemeConcreteConfig, ThemeGenConfig, concretize_theme, generate_theme,
};
use crate::track::{Instrument, NoteTrack};
use serde::{Deserialize, Serialize};
use strata_prng::RandomStream;
use tracing::info;

/// Default time division of a piece.
pub const DEFAULT_TICKS_PER_QUARTER: u32 = 1500;

/// Candidate keys are drawn from G3..=C5.
pub const KEY_RANGE: (u8, u8) = (55, 72);

/// How many candidate keys a piece may use.
pub const KEY_COUNT_RANGE: (usize, usize) = (2, 5);

/// Abstract theme lengths, in whole notes.
pub const THEME_LENGTH_RANGE: (usize, usize) = (3, 6);

/// Whole notes one generated theme can span: the longest theme plus the one
/// motif that may overshoot it.
const MAX_THEME_WHOLE_NOTES: u64 = 9;

/// Ticks kept free above the target so the theme that crosses it still fits
/// in a `u32` timeline, even at the slowest tempo a mutation can reach.
pub const TICK_HEADROOM: u64 = MAX_THEME_WHOLE_NOTES * 4 * MAX_TICKS_PER_QUARTER as u64;

fn default_ticks_per_quarter() -> u32 {
    DEFAULT_TICKS_PER_QUARTER
}

/// Settings for one piece.
///
/// Loadable from JSON; only `length` and `strictness` are required.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PieceConfig {
    /// Target length in whole notes.
    pub length: u32,
    pub strictness: Strictness,
    #[serde(default)]
    pub instrument: Instrument,
    #[serde(default = "default_ticks_per_quarter")]
    pub ticks_per_quarter: u32,
    #[serde(default)]
    pub mutation_weights: MutationWeights,
}

impl PieceConfig {
    /// Settings with the default instrument, time division and mutation
    /// weights.
    pub fn new(length: u32, strictness: Strictness) -> Result<Self, ComposeError> {
        let config = PieceConfig {
            length,
            strictness,
            instrument: Instrument::default(),
            ticks_per_quarter: DEFAULT_TICKS_PER_QUARTER,
            mutation_weights: MutationWeights::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse settings from a JSON object.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check the preconditions `compose_piece` relies on.
    pub fn validate(&self) -> Result<(), ComposeError> {
        validate_ticks_per_quarter(self.ticks_per_quarter)?;
        self.target_ticks().map(|_| ())
    }

    /// Shared motif pool size: one motif per ten whole notes, at least one.
    pub fn pool_size(&self) -> usize {
        (self.length as usize / 10).max(1)
    }

    /// Length expressed in ticks at this piece's time division.
    ///
    /// Refused when the target leaves less than `TICK_HEADROOM` ticks below
    /// `u32::MAX`.
    pub fn target_ticks(&self) -> Result<u32, ComposeError> {
        let ticks = self.length as u64 * 4 * self.ticks_per_quarter as u64;
        if self.length == 0 || ticks + TICK_HEADROOM > u32::MAX as u64 {
            return Err(ComposeError::InvalidLength(self.length as f64));
        }
        Ok(ticks as u32)
    }
}

/// Where one concretized theme landed in the piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedTheme {
    /// Index into the piece's abstract themes.
    pub theme_index: usize,
    pub key: Key,
    pub begin_tick: u32,
    pub ticks: u32,
}

/// A finished piece: one flattened note timeline plus its layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    track: NoteTrack,
    ticks_per_quarter: u32,
    key_type: KeyType,
    total_ticks: u32,
    themes: Vec<PlacedTheme>,
}

impl Piece {
    pub fn track(&self) -> &NoteTrack {
        &self.track
    }

    /// Time division the tick values are expressed in.
    pub fn ticks_per_quarter(&self) -> u32 {
        self.ticks_per_quarter
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Sum of the placed theme spans.
    pub fn total_ticks(&self) -> u32 {
        self.total_ticks
    }

    /// Themes in the order they were placed.
    pub fn themes(&self) -> &[PlacedTheme] {
        &self.themes
    }
}

/// Compose a piece from scratch.
pub fn compose_piece(config: &PieceConfig, rng: &mut RandomStream) -> Result<Piece, ComposeError> {
    config.validate()?;
    let profile = config.strictness.profile();

    let pool_lengths: &[f64] = if profile.non_integer_motifs {
        &[1.0, 1.5, 2.0]
    } else {
        &[1.0, 2.0]
    };
    let mut motif_pool: Vec<AbstractMotif> = Vec::with_capacity(config.pool_size());
    for _ in 0..config.pool_size() {
        let length = pool_lengths[rng.range_usize(0, pool_lengths.len())];
        let motif_config = MotifGenConfig::new(length, config.strictness)?;
        motif_pool.push(generate_motif(&motif_config, rng)?);
    }
    info!(motifs = motif_pool.len(), "built shared motif pool");

    let key_count = rng.range_usize_inclusive(KEY_COUNT_RANGE.0, KEY_COUNT_RANGE.1);
    let keys: Vec<Key> = (0..key_count)
        .map(|_| Key::new(rng.range_u8_inclusive(KEY_RANGE.0, KEY_RANGE.1)))
        .collect();
    let key_type = KeyType::ALL[rng.range_usize(0, KeyType::ALL.len())];
    info!(?keys, ?key_type, "chose keys");

    let theme_count = config.strictness.theme_count(config.length);
    let mut themes = Vec::with_capacity(theme_count);
    for _ in 0..theme_count {
        let theme_config = ThemeGenConfig {
            length: rng.range_usize_inclusive(THEME_LENGTH_RANGE.0, THEME_LENGTH_RANGE.1) as f64,
            motif_pool: &motif_pool,
            concreteness: rng.range_f64(0.0, 1.0),
            strictness: config.strictness,
        };
        themes.push(generate_theme(&theme_config, rng)?);
    }
    info!(themes = themes.len(), "generated abstract themes");

    arrange_piece(config, &themes, &keys, key_type, rng)
}

/// Concretize randomly chosen themes in randomly chosen keys until the
/// piece reaches its target length.
///
/// Themes from `generate_theme` always fit in the headroom `target_ticks`
/// reserves. A caller-supplied theme longer than that can make the final
/// placement fail with `ComposeError::TickOverflow`.
pub fn arrange_piece(
    config: &PieceConfig,
    themes: &[AbstractTheme],
    keys: &[Key],
    key_type: KeyType,
    rng: &mut RandomStream,
) -> Result<Piece, ComposeError> {
    let target = config.target_ticks()?;
    validate_ticks_per_quarter(config.ticks_per_quarter)?;
    if themes.is_empty() || themes.iter().any(|t| t.motifs().is_empty()) {
        return Err(ComposeError::NoThemes);
    }
    if keys.is_empty() {
        return Err(ComposeError::NoKeys);
    }

    let mut track = NoteTrack::new();
    let mut placed = Vec::new();
    let mut total: u32 = 0;

    while total < target {
        let theme_index = rng.range_usize(0, themes.len());
        let key = keys[rng.range_usize(0, keys.len())];
        let theme_config = ThemeConcreteConfig {
            key,
            key_type,
            max_mutations: config.strictness.profile().max_mutations,
            instrument: config.instrument,
            ticks_per_quarter: config.ticks_per_quarter,
            strictness: config.strictness,
            mutation_weights: config.mutation_weights,
        };
        let concrete = concretize_theme(&themes[theme_index], &theme_config, rng)?;
        let ticks = concrete.ticks();

        concrete.append_to(&mut track, total)?;
        placed.push(PlacedTheme {
            theme_index,
            key,
            begin_tick: total,
            ticks,
        });
        total += ticks;
    }

    info!(
        themes = placed.len(),
        notes = track.len(),
        ticks = total,
        target,
        "assembled piece"
    );

    Ok(Piece {
        track,
        ticks_per_quarter: config.ticks_per_quarter,
        key_type,
        total_ticks: total,
        themes: placed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::resolve_pitch;

    fn config(length: u32, level: u8) -> PieceConfig {
        PieceConfig::new(length, Strictness::new(level).unwrap()).unwrap()
    }

    #[test]
    fn test_config_defaults_from_json() {
        let c = PieceConfig::from_json(r#"{"length": 20, "strictness": 5}"#).unwrap();
        assert_eq!(c, config(20, 5));
        assert_eq!(c.ticks_per_quarter, 1500);
        assert_eq!(c.instrument, Instrument::ACOUSTIC_GRAND_PIANO);

        let c = PieceConfig::from_json(
            r#"{"length": 8, "strictness": 2, "instrument": 73, "ticks_per_quarter": 480}"#,
        )
        .unwrap();
        assert_eq!(c.instrument, Instrument::FLUTE);
        assert_eq!(c.ticks_per_quarter, 480);

        assert!(PieceConfig::from_json(r#"{"length": 8, "strictness": 9}"#).is_err());
        assert!(PieceConfig::from_json(r#"{"strictness": 3}"#).is_err());
    }

    #[test]
    fn test_config_validation() {
        let s = Strictness::new(3).unwrap();
        assert_eq!(PieceConfig::new(0, s), Err(ComposeError::InvalidLength(0.0)));
        let mut c = config(10, 3);
        c.ticks_per_quarter = 2;
        assert!(matches!(
            c.validate(),
            Err(ComposeError::InvalidTicksPerQuarter { got: 2, .. })
        ));
        assert_eq!(config(20, 3).target_ticks(), Ok(20 * 4 * 1500));
        c = config(10, 3);
        c.length = u32::MAX;
        assert!(c.target_ticks().is_err());
    }

    #[test]
    fn test_longest_accepted_piece_fits_the_timeline() {
        let tpq = MAX_TICKS_PER_QUARTER;
        let per_whole = 4 * tpq as u64;
        let longest = ((u32::MAX as u64 - TICK_HEADROOM) / per_whole) as u32;
        let strict = Strictness::STRICTEST;
        let at = |length: u32| PieceConfig {
            length,
            strictness: strict,
            instrument: Instrument::default(),
            ticks_per_quarter: tpq,
            mutation_weights: MutationWeights::all_kinds(),
        };
        assert!(at(longest).validate().is_ok());
        assert_eq!(
            at(longest + 1).validate(),
            Err(ComposeError::InvalidLength((longest + 1) as f64))
        );
        assert!(at(16383).validate().is_err());

        let mut rng = RandomStream::new(0);
        let pool = vec![
            generate_motif(&MotifGenConfig::new(2.0, strict).unwrap(), &mut rng).unwrap(),
        ];
        let themes: Vec<AbstractTheme> = [3.0, 6.0]
            .iter()
            .map(|&length| {
                let theme_config = ThemeGenConfig {
                    length,
                    motif_pool: &pool,
                    concreteness: 1.0,
                    strictness: strict,
                };
                generate_theme(&theme_config, &mut rng).unwrap()
            })
            .collect();
        let keys = [Key::new(60), Key::new(67)];

        for seed in 0..4 {
            let piece = arrange_piece(
                &at(longest),
                &themes,
                &keys,
                KeyType::Major,
                &mut RandomStream::new(seed),
            )
            .unwrap();
            assert!(piece.total_ticks() as u64 >= longest as u64 * per_whole);
            assert!(piece.track().end_tick() <= piece.total_ticks());
        }
    }

    #[test]
    fn test_pool_size() {
        assert_eq!(config(5, 3).pool_size(), 1);
        assert_eq!(config(20, 3).pool_size(), 2);
        assert_eq!(config(99, 3).pool_size(), 9);
    }

    #[test]
    fn test_piece_reaches_target_without_overlap() {
        for level in 1..=5 {
            let c = config(20, level);
            let piece = compose_piece(&c, &mut RandomStream::new(level as u64)).unwrap();
            let target = c.target_ticks().unwrap();

            assert!(piece.total_ticks() >= target);
            assert!(!piece.track().is_empty());
            assert!(!piece.themes().is_empty());

            let mut expected_begin = 0;
            for placed in piece.themes() {
                assert_eq!(placed.begin_tick, expected_begin, "themes must be contiguous");
                assert!(placed.ticks > 0);
                expected_begin += placed.ticks;
            }
            assert_eq!(expected_begin, piece.total_ticks());
            // Only the final theme may cross the target.
            let last = piece.themes().last().unwrap();
            assert!(last.begin_tick < target);
            assert!(piece.track().end_tick() <= piece.total_ticks());
        }
    }

    #[test]
    fn test_notes_stay_inside_their_theme() {
        let piece = compose_piece(&config(30, 4), &mut RandomStream::new(8)).unwrap();
        let mut theme = 0;
        for note in piece.track().notes() {
            // Track order follows placement order.
            while note.begin >= piece.themes()[theme].begin_tick + piece.themes()[theme].ticks {
                theme += 1;
            }
            let placed = piece.themes()[theme];
            assert!(note.begin >= placed.begin_tick);
            assert!(note.end() <= placed.begin_tick + placed.ticks);
        }
    }

    #[test]
    fn test_keys_stay_in_band() {
        for seed in 0..10 {
            let piece = compose_piece(&config(40, 3), &mut RandomStream::new(seed)).unwrap();
            let mut distinct: Vec<Key> = piece.themes().iter().map(|p| p.key).collect();
            distinct.sort_by_key(|k| k.tonic());
            distinct.dedup();
            assert!(distinct.len() <= KEY_COUNT_RANGE.1);
            for key in distinct {
                assert!((KEY_RANGE.0..=KEY_RANGE.1).contains(&key.tonic()));
            }
        }
    }

    #[test]
    fn test_compose_is_deterministic() {
        let c = config(16, 2);
        let a = compose_piece(&c, &mut RandomStream::new(77)).unwrap();
        let b = compose_piece(&c, &mut RandomStream::new(77)).unwrap();
        assert_eq!(a, b);
        let other = compose_piece(&c, &mut RandomStream::new(78)).unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn test_instrument_and_division_carry_through() {
        let mut c = config(12, 4);
        c.instrument = Instrument::CELESTA;
        c.ticks_per_quarter = 480;
        let piece = compose_piece(&c, &mut RandomStream::new(3)).unwrap();
        assert_eq!(piece.ticks_per_quarter(), 480);
        assert!(piece.total_ticks() >= 12 * 4 * 480);
        assert!(
            piece
                .track()
                .notes()
                .iter()
                .all(|n| n.instrument == Instrument::CELESTA)
        );
    }

    #[test]
    fn test_arrange_preconditions() {
        let c = config(8, 3);
        let mut rng = RandomStream::new(0);
        assert_eq!(
            arrange_piece(&c, &[], &[Key::new(60)], KeyType::Major, &mut rng),
            Err(ComposeError::NoThemes)
        );

        let pool = vec![
            generate_motif(&MotifGenConfig::new(1.0, c.strictness).unwrap(), &mut rng).unwrap(),
        ];
        let theme = generate_theme(
            &ThemeGenConfig {
                length: 3.0,
                motif_pool: &pool,
                concreteness: 0.2,
                strictness: c.strictness,
            },
            &mut rng,
        )
        .unwrap();
        assert_eq!(
            arrange_piece(&c, &[theme.clone()], &[], KeyType::Major, &mut rng),
            Err(ComposeError::NoKeys)
        );

        let piece = arrange_piece(&c, &[theme], &[Key::new(62)], KeyType::NaturalMinor, &mut rng)
            .unwrap();
        assert!(piece.themes().iter().all(|p| p.theme_index == 0 && p.key == Key::new(62)));
        assert_eq!(piece.key_type(), KeyType::NaturalMinor);
        // Note shifts alone never leave the scale.
        let pitch_classes: Vec<u8> = (0..7)
            .map(|d| resolve_pitch(Key::new(62), KeyType::NaturalMinor, d) % 12)
            .collect();
        for note in piece.track().notes() {
            assert!(pitch_classes.contains(&(note.pitch % 12)), "pitch {} off D minor", note.pitch);
        }
    }
}
