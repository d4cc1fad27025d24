//! Region matching logic.
//!
//! Matching walks a preset's region list in declaration order and yields every
//! region whose key and velocity ranges contain the event. Several matches are
//! normal (velocity layers, stacked samples). The iterator borrows the regions
//! and never allocates, so it is safe to use on the render path.

use std::slice;

use crate::model::{Preset, Region, RegionId, TriggerMode};

/// The event a region is being matched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    /// A note-on; `keys_held` is true when another key is already down.
    NoteOn { keys_held: bool },
    /// A note-off, matched against release-triggered regions.
    NoteOff,
}

impl TriggerEvent {
    /// Whether a region with trigger `mode` starts on this event.
    pub fn admits(self, mode: TriggerMode) -> bool {
        match (self, mode) {
            (Self::NoteOn { .. }, TriggerMode::Attack) => true,
            (Self::NoteOn { keys_held }, TriggerMode::First) => !keys_held,
            (Self::NoteOn { keys_held }, TriggerMode::Legato) => keys_held,
            (Self::NoteOff, TriggerMode::Release) => true,
            _ => false,
        }
    }
}

/// Iterator over matching regions, in declaration order.
#[derive(Debug, Clone)]
pub struct RegionMatches<'a> {
    regions: &'a [Region],
    ids: slice::Iter<'a, RegionId>,
    note: u8,
    velocity: u8,
    event: Option<TriggerEvent>,
}

impl<'a> Iterator for RegionMatches<'a> {
    type Item = (RegionId, &'a Region);

    fn next(&mut self) -> Option<Self::Item> {
        for id in self.ids.by_ref() {
            let Some(region) = self.regions.get(id.index()) else {
                continue;
            };
            if !region.matches(self.note, self.velocity) {
                continue;
            }
            if let Some(event) = self.event {
                if !event.admits(region.trigger) {
                    continue;
                }
            }
            return Some((*id, region));
        }
        None
    }
}

/// Find all regions of `preset` whose ranges contain `note` and `velocity`,
/// whatever their trigger mode.
///
/// Notes or velocities above 127 never match.
pub fn find_matching_regions<'a>(
    regions: &'a [Region],
    preset: &'a Preset,
    note: u8,
    velocity: u8,
) -> RegionMatches<'a> {
    RegionMatches {
        regions,
        ids: preset.regions.iter(),
        note,
        velocity,
        event: None,
    }
}

/// Like [`find_matching_regions`], keeping only regions that start on `event`.
pub fn regions_for_event<'a>(
    regions: &'a [Region],
    preset: &'a Preset,
    note: u8,
    velocity: u8,
    event: TriggerEvent,
) -> RegionMatches<'a> {
    RegionMatches {
        event: Some(event),
        ..find_matching_regions(regions, preset, note, velocity)
    }
}
