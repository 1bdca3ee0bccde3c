//! Configuration management for Launchpad GW
//!
//! Handles loading, parsing and validating the YAML configuration. Every
//! section has defaults reproducing the stock setup, so an empty file is a
//! valid configuration.

pub mod mapping;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

use crate::colors::{self, Color};
use crate::pad::{Pad, Rotation};

pub use mapping::{BrightnessSwatch, ButtonMap, ButtonTarget, ColorSwatch};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub home_assistant: HomeAssistantConfig,
    pub device: DeviceConfig,
    pub timing: TimingConfig,
    pub pads: PadsConfig,
    #[serde(default = "mapping::default_buttons")]
    pub buttons: ButtonMap,
    pub adjustment: AdjustmentConfig,
    pub ambient: AmbientConfig,
    pub rendering: RenderingConfig,
}

/// Home Assistant connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HomeAssistantConfig {
    /// Base URL or WebSocket endpoint of the instance
    pub url: String,
    /// Long-lived access token. Normally supplied through `HA_TOKEN`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub request_timeout_ms: u64,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub max_attempts: u32,
    /// Step applied by the volume up/down pads (0-1 scale)
    pub volume_step: f64,
}

/// MIDI device settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Case-insensitive substring matched against MIDI port names
    pub port_name: String,
    pub rotation: Rotation,
    pub alive_check_ms: u64,
    pub connect_retry_ms: u64,
    pub max_connect_retry_ms: u64,
    pub max_connect_attempts: u32,
    /// Light the whole surface briefly on startup
    pub splash: bool,
}

/// Poll cadence and feedback durations
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    pub poll_interval_ms: u64,
    pub idle_poll_interval_ms: u64,
    pub idle_timeout_secs: u64,
    pub flash_ms: u64,
    pub pulse_ms: u64,
}

/// Pads with a fixed meaning
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PadsConfig {
    pub wake: Pad,
    pub sleep: Pad,
    /// Press the first pad, then the second, to request a restart
    pub restart_chord: [Pad; 2],
}

/// Color and brightness picker settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdjustmentConfig {
    #[serde(default = "mapping::default_color_enabled")]
    pub color_enabled: BTreeSet<Pad>,
    #[serde(default = "mapping::default_brightness_enabled")]
    pub brightness_enabled: BTreeSet<Pad>,
    pub highlight_color: Color,
    #[serde(default = "mapping::default_color_palette")]
    pub color_palette: BTreeMap<Pad, ColorSwatch>,
    #[serde(default = "mapping::default_brightness_palette")]
    pub brightness_palette: BTreeMap<Pad, BrightnessSwatch>,
}

/// Ambient effect settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AmbientConfig {
    pub entities: Vec<String>,
    pub interval_ms: u64,
    /// Chance that a tick turns a light on rather than off
    pub on_probability: f64,
}

/// LED rendering settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderingConfig {
    /// Media players whose pad goes dark unless playing or paused
    pub hide_when_inactive: BTreeSet<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            home_assistant: HomeAssistantConfig::default(),
            device: DeviceConfig::default(),
            timing: TimingConfig::default(),
            pads: PadsConfig::default(),
            buttons: mapping::default_buttons(),
            adjustment: AdjustmentConfig::default(),
            ambient: AmbientConfig::default(),
            rendering: RenderingConfig::default(),
        }
    }
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            url: "ws://homeassistant.local:8123/api/websocket".to_string(),
            token: None,
            request_timeout_ms: 5000,
            retry_delay_ms: 2000,
            max_retry_delay_ms: 5000,
            max_attempts: 3,
            volume_step: 0.07,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port_name: "LPMiniMK3 MIDI".to_string(),
            rotation: Rotation::Cw180,
            alive_check_ms: 3000,
            connect_retry_ms: 5000,
            max_connect_retry_ms: 10000,
            max_connect_attempts: 30,
            splash: true,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1500,
            idle_poll_interval_ms: 120_000,
            idle_timeout_secs: 1800,
            flash_ms: 200,
            pulse_ms: 400,
        }
    }
}

impl Default for PadsConfig {
    fn default() -> Self {
        Self {
            wake: Pad::new(91),
            sleep: Pad::new(68),
            restart_chord: [Pad::new(19), Pad::new(29)],
        }
    }
}

impl Default for AdjustmentConfig {
    fn default() -> Self {
        Self {
            color_enabled: mapping::default_color_enabled(),
            brightness_enabled: mapping::default_brightness_enabled(),
            highlight_color: Color::named("amber_1"),
            color_palette: mapping::default_color_palette(),
            brightness_palette: mapping::default_brightness_palette(),
        }
    }
}

impl Default for AmbientConfig {
    fn default() -> Self {
        Self {
            entities: vec![
                "light.bulb_1".to_string(),
                "light.bulb_2".to_string(),
                "light.bulb_3".to_string(),
            ],
            interval_ms: 500,
            on_probability: 0.8,
        }
    }
}

impl Default for RenderingConfig {
    fn default() -> Self {
        Self {
            hide_when_inactive: ["media_player.nestmini7849", "media_player.studio_speaker"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl HomeAssistantConfig {
    /// WebSocket endpoint derived from `url`.
    ///
    /// Accepts either the instance base URL (`http://host:8123`) or the full
    /// endpoint; `http`/`https` map to `ws`/`wss`.
    pub fn websocket_url(&self) -> String {
        let url = self.url.trim().trim_end_matches('/');
        let url = if let Some(rest) = url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            url.to_string()
        };

        if url.ends_with("/api/websocket") {
            url
        } else {
            format!("{}/api/websocket", url)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn flash(&self) -> Duration {
        Duration::from_millis(self.flash_ms)
    }

    pub fn pulse(&self) -> Duration {
        Duration::from_millis(self.pulse_ms)
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config = Self::from_yaml(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.apply_env();
        config.validate()?;

        Ok(config)
    }

    /// Parse a configuration document without touching the environment
    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to an empty mapping
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Apply `HA_URL` / `HA_TOKEN` overrides
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("HA_URL") {
            if !url.trim().is_empty() {
                self.home_assistant.url = url;
            }
        }
        if let Ok(token) = std::env::var("HA_TOKEN") {
            if !token.trim().is_empty() {
                self.home_assistant.token = Some(token);
            }
        }
    }

    /// True if the pad starts an adjustment session
    pub fn is_adjustable(&self, pad: Pad) -> bool {
        self.adjustment.color_enabled.contains(&pad)
            || self.adjustment.brightness_enabled.contains(&pad)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        let ha = &self.home_assistant;
        if ha.url.trim().is_empty() {
            anyhow::bail!("home_assistant.url cannot be empty");
        }
        if ha.request_timeout_ms == 0 || ha.retry_delay_ms == 0 {
            anyhow::bail!("home_assistant timeouts must be greater than zero");
        }
        if ha.max_attempts == 0 {
            anyhow::bail!("home_assistant.max_attempts must be at least 1");
        }
        if !(ha.volume_step > 0.0 && ha.volume_step <= 1.0) {
            anyhow::bail!(
                "home_assistant.volume_step {} is invalid (must be in (0, 1])",
                ha.volume_step
            );
        }

        if self.device.port_name.trim().is_empty() {
            anyhow::bail!("device.port_name cannot be empty");
        }
        if self.device.alive_check_ms == 0 || self.device.connect_retry_ms == 0 {
            anyhow::bail!("device intervals must be greater than zero");
        }

        let t = &self.timing;
        if t.poll_interval_ms == 0 || t.idle_poll_interval_ms == 0 || t.idle_timeout_secs == 0 {
            anyhow::bail!("timing intervals must be greater than zero");
        }

        self.validate_pads()?;
        self.validate_adjustment()?;

        if self.ambient.interval_ms == 0 {
            anyhow::bail!("ambient.interval_ms must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.ambient.on_probability) {
            anyhow::bail!(
                "ambient.on_probability {} is invalid (must be 0-1)",
                self.ambient.on_probability
            );
        }

        Ok(())
    }

    fn validate_pads(&self) -> Result<()> {
        let pads = &self.pads;
        for (name, pad) in [
            ("wake", pads.wake),
            ("sleep", pads.sleep),
            ("restart_chord[0]", pads.restart_chord[0]),
            ("restart_chord[1]", pads.restart_chord[1]),
        ] {
            check_pad(pad).with_context(|| format!("Invalid pads.{}", name))?;
        }
        if pads.wake == pads.sleep {
            anyhow::bail!("pads.wake and pads.sleep must differ (both {})", pads.wake);
        }
        if pads.restart_chord[0] == pads.restart_chord[1] {
            anyhow::bail!("pads.restart_chord must name two different pads");
        }

        for (pad, target) in &self.buttons {
            check_pad(*pad).with_context(|| format!("Invalid button '{}'", target))?;
        }

        Ok(())
    }

    fn validate_adjustment(&self) -> Result<()> {
        let adj = &self.adjustment;

        check_color(&adj.highlight_color).context("Invalid adjustment.highlight_color")?;

        for pad in adj.color_enabled.iter().chain(&adj.brightness_enabled) {
            match self.buttons.get(pad) {
                Some(ButtonTarget::Entity(_)) => {}
                _ => anyhow::bail!("Adjustable pad {} is not mapped to an entity", pad),
            }
        }

        let mut seen = HashSet::new();
        for (pad, swatch) in &adj.color_palette {
            check_pad(*pad)?;
            check_color(&swatch.color)
                .with_context(|| format!("Invalid color palette pad {}", pad))?;
            seen.insert(*pad);
        }
        for (pad, swatch) in &adj.brightness_palette {
            check_pad(*pad)?;
            check_color(&swatch.color)
                .with_context(|| format!("Invalid brightness palette pad {}", pad))?;
            if !(swatch.level > 0.0 && swatch.level <= 1.0) {
                anyhow::bail!(
                    "Brightness level {} on pad {} is invalid (must be in (0, 1])",
                    swatch.level,
                    pad
                );
            }
            if !seen.insert(*pad) {
                anyhow::bail!("Pad {} is in both the color and brightness palettes", pad);
            }
        }

        Ok(())
    }
}

fn check_pad(pad: Pad) -> Result<()> {
    if !pad.is_valid() || pad.row() == 0 || pad.col() == 0 {
        anyhow::bail!("Pad {} is not addressable (rows and columns are 1-9)", pad);
    }
    Ok(())
}

fn check_color(color: &Color) -> Result<()> {
    if !colors::is_known(color.name()) {
        anyhow::bail!("Unknown color name '{}'", color);
    }
    Ok(())
}
