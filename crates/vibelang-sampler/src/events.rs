//! Control-thread handle and the event queue feeding the render thread.
//!
//! Events go through a bounded `crossbeam-channel`. The engine drains the
//! queue at the start of each block, so no event ever lands mid-block and the
//! render path takes no locks. Containers replaced by a swap travel back on a
//! second channel so they are dropped on the control side.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use vibelang_soundfont::Sound;

use crate::error::{Result, SynthError};

/// Highest MIDI note or velocity.
pub const MIDI_MAX: u8 = 127;

/// An event queued for the render thread.
#[derive(Debug, Clone)]
pub enum SynthEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    AllNotesOff { immediate: bool },
    SelectPreset(usize),
    SelectProgram { bank: u16, program: u16 },
    /// Replace the playing container. All voices stop.
    SwapSound(Arc<Sound>),
}

pub(crate) fn check_note(note: u8) -> Result<()> {
    if note > MIDI_MAX {
        return Err(SynthError::InvalidEventParameter {
            parameter: "note",
            value: u32::from(note),
        });
    }
    Ok(())
}

pub(crate) fn check_velocity(velocity: u8) -> Result<()> {
    if velocity > MIDI_MAX {
        return Err(SynthError::InvalidEventParameter {
            parameter: "velocity",
            value: u32::from(velocity),
        });
    }
    Ok(())
}

/// Render-side end of the queue.
#[derive(Debug)]
pub(crate) struct EventInbox {
    pub events: Receiver<SynthEvent>,
    pub retired: Sender<Arc<Sound>>,
    pub preset_count: Arc<AtomicUsize>,
}

/// Cloneable sender for [`SynthEvent`]s.
///
/// Note and velocity are checked before anything is queued; a rejected
/// call queues nothing.
#[derive(Debug, Clone)]
pub struct SynthHandle {
    events: Sender<SynthEvent>,
    retired: Receiver<Arc<Sound>>,
    /// Preset count of the most recently sent container.
    preset_count: Arc<AtomicUsize>,
}

pub(crate) fn channel(capacity: usize, preset_count: usize) -> (SynthHandle, EventInbox) {
    let (event_tx, event_rx) = bounded(capacity);
    let (retired_tx, retired_rx) = bounded(capacity);
    let preset_count = Arc::new(AtomicUsize::new(preset_count));
    (
        SynthHandle {
            events: event_tx,
            retired: retired_rx,
            preset_count: Arc::clone(&preset_count),
        },
        EventInbox {
            events: event_rx,
            retired: retired_tx,
            preset_count,
        },
    )
}

impl SynthHandle {
    /// Queue a raw event.
    pub fn send(&self, event: SynthEvent) -> Result<()> {
        self.events.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => SynthError::EventQueueFull,
            TrySendError::Disconnected(_) => SynthError::Disconnected,
        })
    }

    /// Start a note. Velocity 0 is a note-off.
    pub fn note_on(&self, note: u8, velocity: u8) -> Result<()> {
        check_note(note)?;
        check_velocity(velocity)?;
        self.send(SynthEvent::NoteOn { note, velocity })
    }

    pub fn note_off(&self, note: u8) -> Result<()> {
        check_note(note)?;
        self.send(SynthEvent::NoteOff { note })
    }

    pub fn all_notes_off(&self, immediate: bool) -> Result<()> {
        self.send(SynthEvent::AllNotesOff { immediate })
    }

    pub fn select_preset(&self, index: usize) -> Result<()> {
        let count = self.preset_count.load(Ordering::Acquire);
        if index >= count {
            return Err(SynthError::InvalidPresetIndex { index, count });
        }
        self.send(SynthEvent::SelectPreset(index))
    }

    pub fn select_program(&self, bank: u16, program: u16) -> Result<()> {
        self.send(SynthEvent::SelectProgram { bank, program })
    }

    /// Queue a container swap. The old container comes back through
    /// [`SynthHandle::collect_retired`].
    pub fn swap_sound(&self, sound: Arc<Sound>) -> Result<()> {
        let count = sound.preset_count();
        self.send(SynthEvent::SwapSound(sound))?;
        self.preset_count.store(count, Ordering::Release);
        Ok(())
    }

    /// Drop containers the engine has swapped out. Returns how many.
    pub fn collect_retired(&self) -> usize {
        self.retired.try_iter().count()
    }

    /// Events waiting for the next block.
    pub fn pending(&self) -> usize {
        self.events.len()
    }
}
