// Concrete note events and the note container the pipeline fills.
//
// A `ConcreteNote` is an absolute event: MIDI pitch, begin tick, duration in
// ticks and the instrument that plays it. A `NoteTrack` is the ordered,
// append-only sequence of such events that a finished piece hands to the
// renderer. Generation only ever appends (at a base tick offset); nothing in
// the core mutates or removes a placed note.
//
// The track is the "source of truth" for rendering: midi.rs derives the SMF
// from it, never the other way around.

use crate::error::ComposeError;
use serde::{Deserialize, Serialize};

/// A General MIDI program number (0-127). Defaults to acoustic grand piano.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Instrument(u8);

impl Instrument {
    pub const ACOUSTIC_GRAND_PIANO: Instrument = Instrument(0);
    pub const CELESTA: Instrument = Instrument(8);
    pub const CHURCH_ORGAN: Instrument = Instrument(19);
    pub const ACOUSTIC_GUITAR_NYLON: Instrument = Instrument(24);
    pub const STRING_ENSEMBLE: Instrument = Instrument(48);
    pub const FLUTE: Instrument = Instrument(73);

    /// Instrument from a General MIDI program number, clamped to 0-127.
    pub fn new(program: u8) -> Self {
        Instrument(program.min(127))
    }

    pub fn program(self) -> u8 {
        self.0
    }
}

/// One absolute, tick-timed note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcreteNote {
    /// MIDI pitch number.
    pub pitch: u8,
    /// Start, in ticks from the beginning of the enclosing container.
    pub begin: u32,
    /// Length in ticks.
    pub duration: u32,
    pub instrument: Instrument,
}

impl ConcreteNote {
    /// Tick at which the note stops sounding.
    pub fn end(&self) -> u32 {
        self.begin.saturating_add(self.duration)
    }
}

/// Ordered, append-only sequence of note events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteTrack {
    notes: Vec<ConcreteNote>,
}

impl NoteTrack {
    pub fn new() -> Self {
        NoteTrack::default()
    }

    /// Append notes whose begin ticks are relative to `base`.
    ///
    /// Fails without appending anything if a shifted note would end past
    /// `u32::MAX`.
    pub fn append_at(&mut self, base: u32, notes: &[ConcreteNote]) -> Result<(), ComposeError> {
        let fits = notes.iter().all(|n| {
            n.begin
                .checked_add(n.duration)
                .and_then(|end| end.checked_add(base))
                .is_some()
        });
        if !fits {
            return Err(ComposeError::TickOverflow);
        }
        self.notes.extend(notes.iter().map(|n| ConcreteNote {
            begin: n.begin + base,
            ..*n
        }));
        Ok(())
    }

    pub fn notes(&self) -> &[ConcreteNote] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Latest end tick over all notes (0 when empty).
    pub fn end_tick(&self) -> u32 {
        self.notes.iter().map(ConcreteNote::end).max().unwrap_or(0)
    }
}
