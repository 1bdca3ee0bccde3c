//! LED color names and display channels
//!
//! The Launchpad takes a palette index in the velocity byte of a note-on
//! message. Colors travel through the crate by name and are only resolved to
//! a velocity at the transport.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Named palette entries understood by the device
const PALETTE: &[(&str, u8)] = &[
    ("off", 0),
    ("gray_1", 1),
    ("gray_2", 2),
    ("white", 3),
    ("red_0", 4),
    ("red_1", 5),
    ("red_2", 6),
    ("red_3", 7),
    ("orange_0", 8),
    ("orange_1", 9),
    ("orange_2", 10),
    ("orange_3", 11),
    ("yellow_0", 12),
    ("yellow_1", 13),
    ("yellow_2", 14),
    ("yellow_3", 15),
    ("green_0", 20),
    ("green_1", 21),
    ("green_2", 22),
    ("green_3", 23),
    ("cyan_0", 36),
    ("cyan_1", 37),
    ("cyan_2", 38),
    ("cyan_3", 39),
    ("lightblue_0", 40),
    ("lightblue_1", 41),
    ("lightblue_2", 42),
    ("lightblue_3", 43),
    ("blue_0", 44),
    ("blue_1", 45),
    ("blue_2", 46),
    ("blue_3", 47),
    ("purple_0", 48),
    ("purple_1", 49),
    ("purple_2", 50),
    ("purple_3", 51),
    ("pink_1", 56),
    ("pink_2", 57),
    ("pink_3", 58),
    ("pink_4", 59),
    ("amber_1", 112),
];

/// Look up the palette index for a color name
pub fn velocity(name: &str) -> Option<u8> {
    PALETTE
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, velocity)| *velocity)
}

/// True if the name is in the device palette (the empty name means off)
pub fn is_known(name: &str) -> bool {
    name.is_empty() || velocity(name).is_some()
}

/// A named LED color. The empty name means off.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(Cow<'static, str>);

impl Color {
    pub const OFF: Color = Color(Cow::Borrowed(""));

    pub const fn named(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is_off(&self) -> bool {
        self.0.is_empty() || self.0 == "off"
    }

    /// Palette index to put in the velocity byte. Unknown names render as off.
    pub fn velocity(&self) -> u8 {
        if self.is_off() {
            return 0;
        }
        velocity(&self.0).unwrap_or(0)
    }
}

impl From<String> for Color {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl From<&'static str> for Color {
    fn from(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_off() {
            write!(f, "off")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Display behaviour selected by the MIDI channel of the LED message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LedChannel {
    #[default]
    Static,
    Flash,
    Pulse,
}

impl LedChannel {
    /// MIDI channel (0-based) carrying this behaviour
    pub fn midi_channel(self) -> u8 {
        match self {
            LedChannel::Static => 0,
            LedChannel::Flash => 1,
            LedChannel::Pulse => 2,
        }
    }
}

/// Desired LED state for one pad
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LedState {
    pub color: Color,
    pub channel: LedChannel,
}

impl LedState {
    pub fn new(color: impl Into<Color>, channel: LedChannel) -> Self {
        Self {
            color: color.into(),
            channel,
        }
    }

    pub fn steady(color: impl Into<Color>) -> Self {
        Self::new(color, LedChannel::Static)
    }

    pub fn pulsing(color: impl Into<Color>) -> Self {
        Self::new(color, LedChannel::Pulse)
    }

    pub fn off() -> Self {
        Self::default()
    }

    pub fn is_off(&self) -> bool {
        self.color.is_off()
    }

    /// True if both states look the same on the device. All off states are
    /// equivalent regardless of channel or spelling.
    pub fn looks_like(&self, other: &LedState) -> bool {
        if self.is_off() || other.is_off() {
            return self.is_off() && other.is_off();
        }
        self.color == other.color && self.channel == other.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_velocity_lookup() {
        assert_eq!(velocity("off"), Some(0));
        assert_eq!(velocity("green_1"), Some(21));
        assert_eq!(velocity("amber_1"), Some(112));
        assert_eq!(velocity("chartreuse"), None);
    }

    #[test]
    fn test_off_color() {
        assert!(Color::OFF.is_off());
        assert!(Color::named("off").is_off());
        assert_eq!(Color::OFF.velocity(), 0);
        assert_eq!(Color::OFF.to_string(), "off");
    }

    #[test]
    fn test_unknown_color_renders_off() {
        let color = Color::from("not_a_color".to_string());
        assert!(!color.is_off());
        assert_eq!(color.velocity(), 0);
        assert!(!is_known("not_a_color"));
        assert!(is_known(""));
    }

    #[test]
    fn test_channels() {
        assert_eq!(LedChannel::Static.midi_channel(), 0);
        assert_eq!(LedChannel::Pulse.midi_channel(), 2);
        assert_eq!(LedState::off(), LedState::steady(Color::OFF));
    }

    #[test]
    fn test_looks_like() {
        assert!(LedState::off().looks_like(&LedState::pulsing("off")));
        assert!(LedState::steady("green_1").looks_like(&LedState::steady("green_1")));
        assert!(!LedState::steady("green_1").looks_like(&LedState::pulsing("green_1")));
        assert!(!LedState::steady("green_1").looks_like(&LedState::off()));
    }
}
