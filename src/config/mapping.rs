//! Button mapping and palette tables
//!
//! The stock tables describe a living room / bedroom setup on a Launchpad
//! Mini MK3. Every table can be replaced from the YAML configuration.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::colors::Color;
use crate::pad::Pad;

/// Sentinel target names recognised in the button table
const AMBIENT_TOGGLE: &str = "ambient_toggle";
const AMBIENT_TOGGLE_LEGACY: &str = "disco_toggle";
const VOLUME_UP_PREFIX: &str = "volume_up.";
const VOLUME_DOWN_PREFIX: &str = "volume_down.";

/// What a mapped pad controls
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ButtonTarget {
    /// A Home Assistant entity (`light.kitchen`, `scene.bedtime`, ...)
    Entity(String),
    /// Starts/stops the ambient effect
    AmbientToggle,
    /// Raises the volume of a media player
    VolumeUp(String),
    /// Lowers the volume of a media player
    VolumeDown(String),
}

impl ButtonTarget {
    /// Entity id this target reads or drives, if any
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            ButtonTarget::Entity(id) | ButtonTarget::VolumeUp(id) | ButtonTarget::VolumeDown(id) => {
                Some(id)
            }
            ButtonTarget::AmbientToggle => None,
        }
    }
}

impl FromStr for ButtonTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == AMBIENT_TOGGLE || s == AMBIENT_TOGGLE_LEGACY {
            return Ok(ButtonTarget::AmbientToggle);
        }
        if let Some(entity) = s.strip_prefix(VOLUME_UP_PREFIX) {
            return Ok(ButtonTarget::VolumeUp(entity.to_string()));
        }
        if let Some(entity) = s.strip_prefix(VOLUME_DOWN_PREFIX) {
            return Ok(ButtonTarget::VolumeDown(entity.to_string()));
        }
        match s.split_once('.') {
            Some((domain, object)) if !domain.is_empty() && !object.is_empty() => {
                Ok(ButtonTarget::Entity(s.to_string()))
            }
            _ => Err(format!("'{}' is not an entity id or a known action", s)),
        }
    }
}

impl TryFrom<String> for ButtonTarget {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ButtonTarget> for String {
    fn from(target: ButtonTarget) -> Self {
        target.to_string()
    }
}

impl fmt::Display for ButtonTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ButtonTarget::Entity(id) => write!(f, "{}", id),
            ButtonTarget::AmbientToggle => write!(f, "{}", AMBIENT_TOGGLE),
            ButtonTarget::VolumeUp(id) => write!(f, "{}{}", VOLUME_UP_PREFIX, id),
            ButtonTarget::VolumeDown(id) => write!(f, "{}{}", VOLUME_DOWN_PREFIX, id),
        }
    }
}

/// Pad -> target table, read-only after startup
pub type ButtonMap = BTreeMap<Pad, ButtonTarget>;

/// A selectable color in the adjustment palette
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorSwatch {
    /// Device palette color shown on the pad
    pub color: Color,
    /// RGB triplet sent to the light
    pub rgb: [u8; 3],
}

/// A selectable brightness level in the adjustment palette
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrightnessSwatch {
    /// Fraction of full brightness (0.0 exclusive to 1.0 inclusive)
    pub level: f32,
    /// Device palette color shown on the pad
    pub color: Color,
}

impl BrightnessSwatch {
    /// Level scaled to Home Assistant's 0-255 brightness unit
    pub fn scaled(&self) -> u8 {
        (self.level.clamp(0.0, 1.0) * 255.0).round() as u8
    }
}

fn entity(id: &str) -> ButtonTarget {
    ButtonTarget::Entity(id.to_string())
}

pub(crate) fn default_buttons() -> ButtonMap {
    let mut map = ButtonMap::new();

    // living room
    map.insert(Pad::new(81), entity("light.living_room_spotlights"));
    map.insert(Pad::new(82), entity("light.bulb_1"));
    map.insert(Pad::new(83), entity("light.bulb_2"));
    map.insert(Pad::new(84), entity("light.bulb_3"));
    map.insert(Pad::new(71), entity("switch.living_room_bulbs_string"));
    map.insert(Pad::new(72), entity("light.living_room_lamp"));
    map.insert(Pad::new(73), entity("switch.living_room_neon"));

    // bedroom
    map.insert(Pad::new(61), entity("light.bulb_bedroom"));
    map.insert(Pad::new(62), entity("light.bedroom_lamp"));

    // scenes
    map.insert(Pad::new(85), entity("scene.i_m_home"));
    map.insert(Pad::new(86), entity("scene.i_m_leaving"));
    map.insert(Pad::new(87), entity("scene.bedtime"));
    map.insert(Pad::new(88), entity("scene.goodnight"));
    map.insert(Pad::new(75), entity("scene.living_room_bright"));
    map.insert(Pad::new(76), entity("scene.living_room_red"));
    map.insert(Pad::new(77), entity("scene.living_room_1"));
    map.insert(Pad::new(78), ButtonTarget::AmbientToggle);

    // media
    for (row, player) in [
        (6u8, "media_player.living_room_sonos"),
        (5, "media_player.studio_speaker"),
        (4, "media_player.nestmini7849"),
    ] {
        map.insert(Pad::new(row * 10 + 5), entity(player));
        map.insert(Pad::new(row * 10 + 6), ButtonTarget::VolumeDown(player.to_string()));
        map.insert(Pad::new(row * 10 + 7), ButtonTarget::VolumeUp(player.to_string()));
    }

    // plants
    map.insert(Pad::new(17), entity("plant.monstera"));
    map.insert(Pad::new(18), entity("plant.pothos"));

    map
}

pub(crate) fn default_color_enabled() -> BTreeSet<Pad> {
    [81, 82, 83, 84, 62].into_iter().map(Pad::new).collect()
}

pub(crate) fn default_brightness_enabled() -> BTreeSet<Pad> {
    [81, 82, 83, 84, 72, 61, 62].into_iter().map(Pad::new).collect()
}

pub(crate) fn default_color_palette() -> BTreeMap<Pad, ColorSwatch> {
    [
        (41, "red_1", [255, 0, 0]),
        (42, "blue_1", [105, 0, 255]),
        (43, "yellow_3", [255, 152, 57]),
        (44, "green_1", [0, 255, 0]),
        (31, "orange_1", [255, 97, 0]),
        (32, "purple_1", [239, 0, 255]),
        (33, "yellow_1", [255, 174, 92]),
        (34, "white", [255, 214, 161]),
    ]
    .into_iter()
    .map(|(pad, color, rgb)| {
        (
            Pad::new(pad),
            ColorSwatch {
                color: Color::named(color),
                rgb,
            },
        )
    })
    .collect()
}

pub(crate) fn default_brightness_palette() -> BTreeMap<Pad, BrightnessSwatch> {
    [
        (21, 0.1, "gray_1"),
        (22, 0.25, "gray_2"),
        (23, 0.4, "yellow_0"),
        (24, 0.55, "yellow_1"),
        (11, 0.7, "yellow_2"),
        (12, 0.85, "yellow_3"),
        (13, 0.95, "white"),
        (14, 1.0, "white"),
    ]
    .into_iter()
    .map(|(pad, level, color)| {
        (
            Pad::new(pad),
            BrightnessSwatch {
                level,
                color: Color::named(color),
            },
        )
    })
    .collect()
}
