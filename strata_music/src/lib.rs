// Strata: a three-level stochastic composer.
//
// Music is built bottom-up from short cells. Abstract motifs (scale degrees,
// 32nd-note timing) are grouped into abstract themes with a repetition
// structure, and a piece strings concretized themes together in a handful of
// keys until it reaches its target length. Every random decision draws from
// one explicit `strata_prng::RandomStream`, so output is deterministic given a
// seed.
//
// Architecture:
// - scale.rs: Key types, pitch resolution from degrees, key-name parsing
// - strictness.rs: The 1-5 strictness dial and its table of generation tunables
// - track.rs: Instruments, absolute tick-timed notes, the append-only note track
// - motif.rs: Abstract motif generation (duration sampling, grid alignment,
//   contour-following degree selection)
// - mutation.rs: Mutation catalog and the budgeted mutation search
// - concretize.rs: Abstract motif to concrete notes (mutations, forced start,
//   pitch resolution, tick rescaling)
// - theme.rs: Abstract theme assembly with repetition weighting, and theme
//   concretization with melodic continuity between motifs
// - piece.rs: Piece configuration and the top-level composer
// - midi.rs: Standard MIDI File output from a finished piece
// - error.rs: Error enums for generation, key parsing and rendering

pub mod concretize;
pub mod error;
pub mod midi;
pub mod motif;
pub mod mutation;
pub mod piece;
pub mod scale;
pub mod strictness;
pub mod theme;
pub mod track;
