//! Active container and preset selection.

use std::sync::Arc;

use vibelang_soundfont::{Preset, RegionMatches, Sound, TriggerEvent};

use crate::error::{Result, SynthError};

/// Holds the playing [`Sound`] and which of its presets is active.
///
/// Changing the selection only affects later note-ons; voices already
/// sounding keep the region they started with.
#[derive(Debug)]
pub struct PresetManager {
    sound: Arc<Sound>,
    active: usize,
}

impl PresetManager {
    pub fn new(sound: Arc<Sound>) -> Self {
        Self { sound, active: 0 }
    }

    pub fn sound(&self) -> &Arc<Sound> {
        &self.sound
    }

    pub fn preset_count(&self) -> usize {
        self.sound.preset_count()
    }

    pub fn preset_name(&self, index: usize) -> Option<&str> {
        self.sound.preset_name(index)
    }

    /// Index of the active preset.
    pub fn active_index(&self) -> usize {
        self.active
    }

    /// The active preset, `None` for a container without presets.
    pub fn active_preset(&self) -> Option<&Preset> {
        self.sound.preset(self.active)
    }

    /// Make preset `index` active. Out-of-range indices leave the selection
    /// unchanged.
    pub fn select_preset(&mut self, index: usize) -> Result<()> {
        let count = self.preset_count();
        if index >= count {
            return Err(SynthError::InvalidPresetIndex { index, count });
        }
        self.active = index;
        Ok(())
    }

    /// Select the first preset with this bank and program. Returns its index.
    pub fn select_program(&mut self, bank: u16, program: u16) -> Result<usize> {
        let index = self
            .sound
            .find_preset(bank, program)
            .ok_or(SynthError::InvalidEventParameter {
                parameter: "program",
                value: u32::from(program),
            })?;
        self.active = index;
        Ok(index)
    }

    /// Swap in a new container and return the old one. The selection is kept
    /// when the new container has that many presets, otherwise it resets to 0.
    pub fn replace_sound(&mut self, sound: Arc<Sound>) -> Arc<Sound> {
        if self.active >= sound.preset_count() {
            self.active = 0;
        }
        std::mem::replace(&mut self.sound, sound)
    }

    /// Regions of the active preset that start on `event`.
    pub fn matching(&self, note: u8, velocity: u8, event: TriggerEvent) -> Option<RegionMatches<'_>> {
        self.sound.regions_for_event(self.active, note, velocity, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use vibelang_soundfont::{LoadOptions, PcmDecoder};

    fn sound(source: &str, name: &str) -> Arc<Sound> {
        let options = LoadOptions {
            name: Some(name.to_string()),
            ..LoadOptions::default()
        };
        let mut cursor = Cursor::new(source.as_bytes().to_vec());
        Arc::new(Sound::load(&mut cursor, &options, &mut PcmDecoder::new()).unwrap())
    }

    #[test]
    fn test_preset_introspection() {
        let presets = PresetManager::new(sound("<region> sample=*sine", "Sine"));
        assert_eq!(presets.preset_count(), 1);
        assert_eq!(presets.preset_name(0), Some("Sine"));
        assert_eq!(presets.preset_name(1), None);
        assert_eq!(presets.active_preset().map(|p| p.name.as_str()), Some("Sine"));
    }

    #[test]
    fn test_invalid_index_keeps_selection() {
        let mut presets = PresetManager::new(sound("<region> sample=*sine", "Sine"));
        assert_eq!(
            presets.select_preset(3),
            Err(SynthError::InvalidPresetIndex { index: 3, count: 1 })
        );
        assert_eq!(presets.active_index(), 0);
        assert!(presets.select_preset(0).is_ok());
    }

    #[test]
    fn test_select_program() {
        let mut presets = PresetManager::new(sound("<region> sample=*sine", "Sine"));
        assert_eq!(presets.select_program(0, 0), Ok(0));
        assert_eq!(
            presets.select_program(0, 9),
            Err(SynthError::InvalidEventParameter {
                parameter: "program",
                value: 9
            })
        );
    }

    #[test]
    fn test_replace_sound_returns_old() {
        let mut presets = PresetManager::new(sound("<region> sample=*sine", "First"));
        let old = presets.replace_sound(sound("<region> sample=*silence", "Second"));
        assert_eq!(old.name(), "First");
        assert_eq!(presets.sound().name(), "Second");
        assert_eq!(presets.active_index(), 0);
    }

    #[test]
    fn test_matching_uses_active_preset() {
        let presets = PresetManager::new(sound("<region> sample=*sine lokey=60 hikey=62", "Sine"));
        let on = TriggerEvent::NoteOn { keys_held: false };
        assert_eq!(presets.matching(61, 100, on).map(|m| m.count()), Some(1));
        assert_eq!(presets.matching(70, 100, on).map(|m| m.count()), Some(0));
    }
}
