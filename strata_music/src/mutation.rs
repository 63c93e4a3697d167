// Budgeted mutation search applied when a motif is concretized.
//
// Each concretization gets a budget of mutation points. The search picks a
// mutation kind from a fixed catalog, applies it if the remaining budget
// covers its cost and its lock allows it, and repeats. It stops when the
// budget is spent or after 20 consecutive failed attempts, so it always
// terminates.
//
// Catalog (slot: kind, cost):
// - 0: ShiftNote, 8. Move one note a scale step; each note's direction is
//   chosen on first use and then locked.
// - 1: reserved.
// - 2: ShiftKey, 12. Move the key a semitone; direction locked on first use.
// - 3: ChangeKeyType, 10. Switch to another scale family, at most once.
// - 4: ScaleTempo, 12. Scale ticks-per-quarter by 3/4 or 4/3; direction
//   locked on first use; refused outside 8..=65536 ticks per quarter.
// - 5: reserved.
//
// Kind selection is weighted by `MutationWeights`. The default weights
// enable ShiftNote only; the other kinds are reachable by raising their
// weight.
//
// Used by concretize.rs, which owns the working copy being mutated.

use crate::motif::{AbstractMotif, UNITS_PER_QUARTER};
use crate::scale::{Key, KeyType};
use serde::{Deserialize, Serialize};
use strata_prng::RandomStream;

/// Consecutive failed attempts after which the search gives up.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 20;

/// Lowest ticks-per-quarter a tempo mutation may produce: below this a 32nd
/// note would round to zero ticks.
pub const MIN_TICKS_PER_QUARTER: u32 = UNITS_PER_QUARTER;

/// Highest ticks-per-quarter a tempo mutation may produce.
pub const MAX_TICKS_PER_QUARTER: u32 = 1 << 16;

/// What a catalog slot does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    ShiftNote,
    ShiftKey,
    ChangeKeyType,
    ScaleTempo,
    /// Placeholder slot; never applies.
    Reserved,
}

/// One entry of the mutation catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationSlot {
    pub kind: MutationKind,
    pub cost: u32,
}

/// Number of slots in the catalog.
pub const CATALOG_SIZE: usize = 6;

pub const CATALOG: [MutationSlot; CATALOG_SIZE] = [
    MutationSlot { kind: MutationKind::ShiftNote, cost: 8 },
    MutationSlot { kind: MutationKind::Reserved, cost: 0 },
    MutationSlot { kind: MutationKind::ShiftKey, cost: 12 },
    MutationSlot { kind: MutationKind::ChangeKeyType, cost: 10 },
    MutationSlot { kind: MutationKind::ScaleTempo, cost: 12 },
    MutationSlot { kind: MutationKind::Reserved, cost: 0 },
];

/// Selection weight per catalog slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationWeights([f64; CATALOG_SIZE]);

impl Default for MutationWeights {
    /// Only note shifts are ever selected.
    fn default() -> Self {
        MutationWeights([1.0, 0.0, 0.0, 0.0, 0.0, 0.0])
    }
}

impl MutationWeights {
    /// Weights from a raw vector; negative or non-finite entries become 0.
    pub fn new(weights: [f64; CATALOG_SIZE]) -> Self {
        MutationWeights(weights.map(|w| if w.is_finite() && w > 0.0 { w } else { 0.0 }))
    }

    /// Every real mutation kind equally likely.
    pub fn all_kinds() -> Self {
        MutationWeights::new([1.0, 0.0, 1.0, 1.0, 1.0, 0.0])
    }

    fn total(&self) -> f64 {
        self.0.iter().filter(|w| w.is_finite() && **w > 0.0).sum()
    }

    /// Pick a slot index proportionally to the weights. Requires a positive
    /// total.
    fn pick(&self, rng: &mut RandomStream) -> usize {
        let total = self.total();
        let r = rng.next_f64() * total;
        let mut cumulative = 0.0;
        let mut last_enabled = 0;
        for (i, &w) in self.0.iter().enumerate() {
            if !(w.is_finite() && w > 0.0) {
                continue;
            }
            cumulative += w;
            last_enabled = i;
            if r < cumulative {
                return i;
            }
        }
        last_enabled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

impl Direction {
    fn random(rng: &mut RandomStream) -> Self {
        if rng.random_bool(0.5) { Direction::Up } else { Direction::Down }
    }

    fn sign(self) -> i32 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
        }
    }
}

/// The working state a mutation search edits: a private copy of the motif
/// plus the key, key type and time scale it will be rendered with.
#[derive(Debug, Clone)]
pub struct MutationContext {
    pub motif: AbstractMotif,
    pub key: Key,
    pub key_type: KeyType,
    pub ticks_per_quarter: u32,
}

/// Per-search lock state.
struct Locks {
    note_directions: Vec<Option<Direction>>,
    key_direction: Option<Direction>,
    key_type_changed: bool,
    /// `Up` speeds the motif up (fewer ticks per quarter).
    tempo_direction: Option<Direction>,
}

impl Locks {
    fn new(num_notes: usize) -> Self {
        Locks {
            note_directions: vec![None; num_notes],
            key_direction: None,
            key_type_changed: false,
            tempo_direction: None,
        }
    }
}

/// What a search did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationReport {
    /// Applied mutations in order.
    pub applied: Vec<MutationKind>,
    /// Sum of the applied mutations' costs.
    pub points_spent: u32,
}

/// Spend up to `budget` points mutating `context`.
///
/// Never spends more than `budget`. A zero budget, or weights that enable
/// nothing, leave the context untouched and draw nothing from `rng`.
pub fn run_mutation_search(
    context: &mut MutationContext,
    budget: u32,
    weights: &MutationWeights,
    rng: &mut RandomStream,
) -> MutationReport {
    let mut report = MutationReport::default();
    if budget == 0 || weights.total() <= 0.0 {
        return report;
    }

    let mut locks = Locks::new(context.motif.len());
    let mut failures = 0;

    while failures < MAX_CONSECUTIVE_FAILURES && report.points_spent < budget {
        let slot = CATALOG[weights.pick(rng)];
        let remaining = budget - report.points_spent;

        let applied = slot.cost <= remaining && try_apply(slot.kind, context, &mut locks, rng);

        if applied {
            report.points_spent += slot.cost;
            report.applied.push(slot.kind);
            failures = 0;
        } else {
            failures += 1;
        }
    }

    report
}

/// Attempt one mutation. Returns whether it was applied.
fn try_apply(
    kind: MutationKind,
    context: &mut MutationContext,
    locks: &mut Locks,
    rng: &mut RandomStream,
) -> bool {
    match kind {
        MutationKind::ShiftNote => {
            let num_notes = context.motif.len();
            if num_notes == 0 {
                return false;
            }
            let index = rng.range_usize(0, num_notes);
            let direction = *locks.note_directions[index].get_or_insert_with(|| Direction::random(rng));
            context.motif.shift_degree(index, direction.sign() as f64);
            true
        }
        MutationKind::ShiftKey => {
            let direction = *locks.key_direction.get_or_insert_with(|| Direction::random(rng));
            context.key = context.key.transposed(direction.sign());
            true
        }
        MutationKind::ChangeKeyType => {
            if locks.key_type_changed {
                return false;
            }
            context.key_type = context.key_type.mutated(rng.random_bool(0.5));
            locks.key_type_changed = true;
            true
        }
        MutationKind::ScaleTempo => {
            let direction = *locks.tempo_direction.get_or_insert_with(|| Direction::random(rng));
            let current = context.ticks_per_quarter as u64;
            let scaled = match direction {
                Direction::Up => current * 3 / 4,
                Direction::Down => (current as f64 * 4.0 / 3.0 + 0.5) as u64,
            };
            if !(MIN_TICKS_PER_QUARTER as u64..=MAX_TICKS_PER_QUARTER as u64).contains(&scaled) {
                return false;
            }
            context.ticks_per_quarter = scaled as u32;
            true
        }
        MutationKind::Reserved => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motif::{MotifGenConfig, generate_motif};
    use crate::strictness::Strictness;

    fn context(seed: u64) -> MutationContext {
        let config = MotifGenConfig::new(2.0, Strictness::new(2).unwrap()).unwrap();
        MutationContext {
            motif: generate_motif(&config, &mut RandomStream::new(seed)).unwrap(),
            key: Key::new(60),
            key_type: KeyType::Major,
            ticks_per_quarter: 1500,
        }
    }

    #[test]
    fn test_catalog_layout() {
        let kinds: Vec<MutationKind> = CATALOG.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MutationKind::ShiftNote,
                MutationKind::Reserved,
                MutationKind::ShiftKey,
                MutationKind::ChangeKeyType,
                MutationKind::ScaleTempo,
                MutationKind::Reserved,
            ]
        );
        let costs: Vec<u32> = CATALOG.iter().map(|s| s.cost).collect();
        assert_eq!(costs, vec![8, 0, 12, 10, 12, 0]);
    }

    #[test]
    fn test_never_exceeds_budget() {
        for weights in [MutationWeights::default(), MutationWeights::all_kinds()] {
            for budget in [0, 5, 8, 11, 23, 40, 77, 200] {
                for seed in 0..20 {
                    let mut ctx = context(seed);
                    let mut rng = RandomStream::new(seed + 1000);
                    let report = run_mutation_search(&mut ctx, budget, &weights, &mut rng);
                    assert!(report.points_spent <= budget);
                    let summed: u32 = report
                        .applied
                        .iter()
                        .map(|k| CATALOG.iter().find(|s| s.kind == *k).unwrap().cost)
                        .sum();
                    assert_eq!(summed, report.points_spent);
                }
            }
        }
    }

    #[test]
    fn test_zero_budget_draws_nothing() {
        let mut ctx = context(3);
        let before = ctx.motif.clone();
        let mut rng = RandomStream::new(5);
        let report = run_mutation_search(&mut ctx, 0, &MutationWeights::all_kinds(), &mut rng);
        assert_eq!(report, MutationReport::default());
        assert_eq!(ctx.motif, before);
        assert_eq!(rng.next_u64(), RandomStream::new(5).next_u64());
    }

    #[test]
    fn test_disabled_weights_do_nothing() {
        let mut ctx = context(3);
        let mut rng = RandomStream::new(5);
        let weights = MutationWeights::new([0.0, 3.0, -1.0, 0.0, f64::NAN, 0.0]);
        // Only a reserved slot is enabled: every attempt fails.
        let report = run_mutation_search(&mut ctx, 100, &weights, &mut rng);
        assert!(report.applied.is_empty());
        let none = MutationWeights::new([0.0; CATALOG_SIZE]);
        let report = run_mutation_search(&mut ctx, 100, &none, &mut rng);
        assert!(report.applied.is_empty());
    }

    #[test]
    fn test_default_weights_only_shift_notes() {
        let mut ctx = context(8);
        let mut rng = RandomStream::new(9);
        let report = run_mutation_search(&mut ctx, 80, &MutationWeights::default(), &mut rng);
        assert_eq!(report.applied.len(), 10);
        assert!(report.applied.iter().all(|k| *k == MutationKind::ShiftNote));
        assert_eq!(ctx.key, Key::new(60));
        assert_eq!(ctx.key_type, KeyType::Major);
        assert_eq!(ctx.ticks_per_quarter, 1500);
    }

    #[test]
    fn test_note_shifts_keep_their_direction() {
        for seed in 0..30 {
            let mut ctx = context(seed);
            let original = ctx.motif.clone();
            let mut rng = RandomStream::new(seed);
            let report = run_mutation_search(&mut ctx, 400, &MutationWeights::default(), &mut rng);
            let shifts = report.applied.len() as f64;
            let mut total_moved = 0.0;
            for (before, after) in original.notes().iter().zip(ctx.motif.notes()) {
                let delta = after.degree - before.degree;
                assert_eq!(delta.fract(), 0.0);
                total_moved += delta.abs();
            }
            // Locked directions never cancel each other out.
            assert_eq!(total_moved, shifts, "seed {seed}");
        }
    }

    #[test]
    fn test_global_mutations_respect_locks() {
        for seed in 0..30 {
            let mut ctx = context(seed);
            let mut rng = RandomStream::new(seed * 7 + 1);
            let report = run_mutation_search(&mut ctx, 300, &MutationWeights::all_kinds(), &mut rng);

            let count = |kind| report.applied.iter().filter(|k| **k == kind).count() as i32;
            assert!(count(MutationKind::ChangeKeyType) <= 1);
            assert_eq!(
                (ctx.key.tonic() as i32 - 60).abs(),
                count(MutationKind::ShiftKey),
                "key shifts should all go one way"
            );
            assert!(ctx.ticks_per_quarter >= MIN_TICKS_PER_QUARTER);
            if count(MutationKind::ChangeKeyType) == 1 {
                assert_ne!(ctx.key_type, KeyType::Major);
            }
        }
    }

    #[test]
    fn test_tempo_stays_within_bounds() {
        let weights = MutationWeights::new([0.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        for seed in 0..20 {
            let mut ctx = context(1);
            ctx.ticks_per_quarter = 9;
            let mut rng = RandomStream::new(seed);
            let report = run_mutation_search(&mut ctx, 10_000, &weights, &mut rng);
            assert!(
                (MIN_TICKS_PER_QUARTER..=MAX_TICKS_PER_QUARTER).contains(&ctx.ticks_per_quarter),
                "ticks per quarter escaped: {}",
                ctx.ticks_per_quarter
            );
            assert!(report.points_spent < 10_000, "search should stall at a bound");
        }
    }
}
