//! Color and brightness picker for one light
//!
//! While a session is active the palette pads own part of the grid. Picks
//! act on press; the session ends on any pick, on a tap of the source pad,
//! or when the coordinator abandons it.

use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info};

use super::renderer::LedRenderer;
use crate::colors::{Color, LedState};
use crate::config::AdjustmentConfig;
use crate::pad::Pad;
use crate::remote::RemoteService;

/// Result of feeding one pad to the session
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    /// Source pad tapped without a pick; the entity was toggled
    Toggled { success: bool },
    ColorSelected { color: Color, success: bool },
    BrightnessSelected { level: f32, success: bool },
    /// Pad is in neither displayed palette; the session stays active
    Ignored,
}

impl SelectionOutcome {
    /// True if the session is over after this outcome
    pub fn ends_session(&self) -> bool {
        !matches!(self, SelectionOutcome::Ignored)
    }

    /// True if a remote call was made and succeeded
    pub fn succeeded(&self) -> bool {
        match self {
            SelectionOutcome::Toggled { success }
            | SelectionOutcome::ColorSelected { success, .. }
            | SelectionOutcome::BrightnessSelected { success, .. } => *success,
            SelectionOutcome::Ignored => false,
        }
    }

    /// Color the source pad pulses to acknowledge a pick
    pub fn pulse_color(&self) -> Option<Color> {
        match self {
            SelectionOutcome::ColorSelected { color, .. } => Some(color.clone()),
            SelectionOutcome::BrightnessSelected { .. } => Some(Color::named("white")),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct AdjustmentSession {
    entity: String,
    source_pad: Pad,
    show_colors: bool,
    show_brightness: bool,
    acted_on: HashSet<Pad>,
}

impl AdjustmentSession {
    pub fn new(
        entity: impl Into<String>,
        source_pad: Pad,
        show_colors: bool,
        show_brightness: bool,
    ) -> Self {
        Self {
            entity: entity.into(),
            source_pad,
            show_colors,
            show_brightness,
            acted_on: HashSet::new(),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn source_pad(&self) -> Pad {
        self.source_pad
    }

    pub fn shows_colors(&self) -> bool {
        self.show_colors
    }

    pub fn shows_brightness(&self) -> bool {
        self.show_brightness
    }

    /// Pads already acted on in this session
    pub fn acted_on(&self) -> &HashSet<Pad> {
        &self.acted_on
    }

    /// Highlight the source pad and light the enabled palettes
    pub fn enter(&self, renderer: &mut LedRenderer, config: &AdjustmentConfig) {
        info!(
            entity = %self.entity,
            pad = %self.source_pad,
            colors = self.show_colors,
            brightness = self.show_brightness,
            "Adjustment started"
        );

        renderer.set_led(self.source_pad, LedState::pulsing(config.highlight_color.clone()));
        if self.show_colors {
            for (pad, swatch) in &config.color_palette {
                renderer.set_led(*pad, LedState::steady(swatch.color.clone()));
            }
        }
        if self.show_brightness {
            for (pad, swatch) in &config.brightness_palette {
                renderer.set_led(*pad, LedState::steady(swatch.color.clone()));
            }
        }
    }

    /// Act on a pressed pad
    pub async fn handle_selection(
        &mut self,
        pad: Pad,
        remote: &dyn RemoteService,
        config: &AdjustmentConfig,
    ) -> SelectionOutcome {
        if pad == self.source_pad {
            if !self.acted_on.is_empty() {
                return SelectionOutcome::Ignored;
            }
            self.acted_on.insert(pad);
            debug!("No pick for {}, toggling", self.entity);
            let success = remote.toggle_entity(&self.entity).await;
            return SelectionOutcome::Toggled { success };
        }

        if self.show_colors {
            if let Some(swatch) = config.color_palette.get(&pad) {
                self.acted_on.insert(pad);
                info!("Setting {} color to {} {:?}", self.entity, swatch.color, swatch.rgb);
                let success = remote
                    .call_service("light", "turn_on", &self.entity, json!({ "rgb_color": swatch.rgb }))
                    .await;
                return SelectionOutcome::ColorSelected {
                    color: swatch.color.clone(),
                    success,
                };
            }
        }

        if self.show_brightness {
            if let Some(swatch) = config.brightness_palette.get(&pad) {
                self.acted_on.insert(pad);
                let brightness = swatch.scaled();
                info!("Setting {} brightness to {} ({})", self.entity, brightness, swatch.level);
                let success = remote
                    .call_service("light", "turn_on", &self.entity, json!({ "brightness": brightness }))
                    .await;
                return SelectionOutcome::BrightnessSelected {
                    level: swatch.level,
                    success,
                };
            }
        }

        debug!("Pad {} is outside the palettes, ignoring", pad);
        SelectionOutcome::Ignored
    }

    /// Turn off the palettes and the source highlight
    pub fn exit(&self, renderer: &mut LedRenderer, config: &AdjustmentConfig) {
        let palette_pads = config
            .color_palette
            .keys()
            .chain(config.brightness_palette.keys());
        for pad in palette_pads {
            renderer.set_led(*pad, LedState::off());
        }
        renderer.set_led(self.source_pad, LedState::off());
        debug!("Adjustment of {} ended", self.entity);
    }
}
