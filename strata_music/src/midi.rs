// MIDI output from a finished piece.
//
// Converts a Piece's note track into a Standard MIDI File for playback. The
// piece's own time division becomes the file's metrical timing, so note ticks
// are written unchanged. Output is SMF format 0: one track carrying a tempo
// event, one program change per instrument (each on its own channel, skipping
// the General MIDI percussion channel 9), and the note events.
//
// Uses the `midly` crate for MIDI writing.

use crate::error::RenderError;
use crate::piece::Piece;
use crate::track::Instrument;
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::path::Path;

/// Velocity of every note-on.
const NOTE_VELOCITY: u8 = 80;

/// General MIDI percussion channel, never assigned to a melodic instrument.
const PERCUSSION_CHANNEL: u8 = 9;

/// Largest metrical time division (15 bits).
const MAX_DIVISION: u16 = 0x7FFF;

/// Largest value of the 24-bit tempo field.
const MAX_TEMPO_MICROS: u32 = 0xFF_FFFF;

/// Render a piece to MIDI and write it to `path`.
pub fn write_midi(piece: &Piece, path: &Path, tempo_bpm: u32) -> Result<(), RenderError> {
    let smf = piece_to_smf(piece, tempo_bpm)?;
    let mut buf = Vec::new();
    smf.write_std(&mut buf)?;
    std::fs::write(path, &buf)?;
    Ok(())
}

/// Channel for the `index`-th distinct instrument.
fn channel_for(index: usize) -> u8 {
    let melodic = (index % 15) as u8;
    if melodic >= PERCUSSION_CHANNEL {
        melodic + 1
    } else {
        melodic
    }
}

/// Convert a piece to an in-memory SMF.
pub fn piece_to_smf(piece: &Piece, tempo_bpm: u32) -> Result<Smf<'static>, RenderError> {
    let division = u16::try_from(piece.ticks_per_quarter())
        .ok()
        .filter(|&d| d <= MAX_DIVISION)
        .ok_or(RenderError::TicksPerQuarter(piece.ticks_per_quarter()))?;

    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(division)),
    ));
    let mut track: Track<'static> = Vec::new();

    let tempo_micros = (60_000_000 / tempo_bpm.max(1)).min(MAX_TEMPO_MICROS);
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_micros))),
    });

    // Instruments in order of first appearance.
    let mut instruments: Vec<Instrument> = Vec::new();
    for note in piece.track().notes() {
        if !instruments.contains(&note.instrument) {
            instruments.push(note.instrument);
        }
    }
    for (i, instrument) in instruments.iter().enumerate() {
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Midi {
                channel: u4::new(channel_for(i)),
                message: MidiMessage::ProgramChange {
                    program: u7::new(instrument.program()),
                },
            },
        });
    }

    // (tick, is_note_on, channel, pitch); sorting puts note-offs first at
    // equal ticks so a repeated pitch is released before it is struck again.
    let mut events: Vec<(u32, bool, u8, u8)> = Vec::with_capacity(piece.track().len() * 2);
    for note in piece.track().notes() {
        let index = instruments
            .iter()
            .position(|&i| i == note.instrument)
            .unwrap_or(0);
        let channel = channel_for(index);
        events.push((note.begin, true, channel, note.pitch));
        events.push((note.end(), false, channel, note.pitch));
    }
    events.sort_by_key(|&(tick, on, _, _)| (tick, on));

    let mut last_tick: u32 = 0;
    for (tick, on, channel, pitch) in events {
        let message = if on {
            MidiMessage::NoteOn {
                key: u7::new(pitch),
                vel: u7::new(NOTE_VELOCITY),
            }
        } else {
            MidiMessage::NoteOff {
                key: u7::new(pitch),
                vel: u7::new(0),
            }
        };
        track.push(TrackEvent {
            delta: u28::new(tick - last_tick),
            kind: TrackEventKind::Midi {
                channel: u4::new(channel),
                message,
            },
        });
        last_tick = tick;
    }

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    Ok(smf)
}
