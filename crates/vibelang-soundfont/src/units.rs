//! Unit conversions shared by the parsers and the engine.

/// Convert MIDI note number to frequency in Hz.
///
/// Uses the standard A4 = 440 Hz tuning.
pub fn midi_to_freq(note: f32) -> f32 {
    440.0 * 2.0_f32.powf((note - 69.0) / 12.0)
}

/// Convert dB to linear amplitude.
pub fn db_to_amp(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert an attenuation in centibels to linear amplitude.
pub fn centibels_to_amp(cb: f32) -> f32 {
    10.0_f32.powf(-cb / 200.0)
}

/// Convert timecents to seconds. Values at or below -12000 mean "instant".
pub fn timecents_to_seconds(tc: i32) -> f32 {
    if tc <= -12000 {
        0.0
    } else {
        2.0_f32.powf(tc as f32 / 1200.0)
    }
}

/// Playback-rate multiplier for a pitch offset in semitones.
pub fn semitones_to_ratio(semitones: f64) -> f64 {
    2.0_f64.powf(semitones / 12.0)
}

/// Gain for a note velocity.
///
/// `track` is the velocity sensitivity: 0 ignores velocity, 1 applies the full
/// square law; negative values invert the response.
pub fn velocity_gain(velocity: u8, track: f32) -> f32 {
    let v = (velocity.min(127) as f32 / 127.0).powi(2);
    if track >= 0.0 {
        1.0 - track * (1.0 - v)
    } else {
        1.0 + track * v
    }
}

/// Parse a note value: a number (`60`) or a note name (`c4`, `c#4`, `db4`).
///
/// Middle C is `c4` = 60.
pub fn parse_note(value: &str) -> Option<i32> {
    let value = value.trim();
    if let Ok(n) = value.parse::<i32>() {
        return Some(n);
    }

    let mut chars = value.chars();
    let letter = chars.next()?.to_ascii_lowercase();
    let base = match letter {
        'c' => 0,
        'd' => 2,
        'e' => 4,
        'f' => 5,
        'g' => 7,
        'a' => 9,
        'b' => 11,
        _ => return None,
    };
    let rest = chars.as_str();
    let (accidental, octave) = match rest.chars().next() {
        Some('#') => (1, &rest[1..]),
        Some('b') if rest.len() > 1 => (-1, &rest[1..]),
        _ => (0, rest),
    };
    let octave: i32 = octave.parse().ok()?;
    Some((octave + 1) * 12 + base + accidental)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midi_to_freq() {
        assert!((midi_to_freq(69.0) - 440.0).abs() < 0.01);
        assert!((midi_to_freq(60.0) - 261.63).abs() < 0.01);
        assert!((midi_to_freq(81.0) - 880.0).abs() < 0.01);
    }

    #[test]
    fn test_db_to_amp() {
        assert!((db_to_amp(0.0) - 1.0).abs() < 0.01);
        assert!((db_to_amp(-6.0) - 0.5).abs() < 0.01);
        assert!((db_to_amp(-12.0) - 0.25).abs() < 0.01);
    }

    #[test]
    fn test_centibels_to_amp() {
        assert!((centibels_to_amp(0.0) - 1.0).abs() < 1e-6);
        assert!((centibels_to_amp(200.0) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_timecents_to_seconds() {
        assert_eq!(timecents_to_seconds(-12000), 0.0);
        assert!((timecents_to_seconds(0) - 1.0).abs() < 1e-6);
        assert!((timecents_to_seconds(1200) - 2.0).abs() < 1e-6);
        assert!((timecents_to_seconds(-1200) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_semitones_to_ratio() {
        assert!((semitones_to_ratio(12.0) - 2.0).abs() < 1e-12);
        assert!((semitones_to_ratio(-12.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_velocity_gain() {
        assert!((velocity_gain(127, 1.0) - 1.0).abs() < 1e-6);
        assert!((velocity_gain(0, 1.0)).abs() < 1e-6);
        assert!((velocity_gain(0, 0.0) - 1.0).abs() < 1e-6);
        assert!((velocity_gain(64, 0.5) - (1.0 - 0.5 * (1.0 - (64.0f32 / 127.0).powi(2)))).abs() < 1e-6);
    }

    #[test]
    fn test_parse_note() {
        assert_eq!(parse_note("60"), Some(60));
        assert_eq!(parse_note("c4"), Some(60));
        assert_eq!(parse_note("C#4"), Some(61));
        assert_eq!(parse_note("db4"), Some(61));
        assert_eq!(parse_note("a4"), Some(69));
        assert_eq!(parse_note("c-1"), Some(0));
        assert_eq!(parse_note("h4"), None);
        assert_eq!(parse_note("b"), None);
    }
}
