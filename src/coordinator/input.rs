//! Press/release classification
//!
//! The router turns raw pad events into intents for the current mode. It
//! keeps the press record (for hold time and chord detection) and the set
//! of pads whose release must not act again.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, trace};

use super::mode::ModeKind;
use crate::config::{AppConfig, ButtonMap, ButtonTarget};
use crate::device::PadEvent;
use crate::pad::Pad;

/// What a pad event means in the current mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// The restart chord was completed
    Restart,
    /// The wake pad was pressed while idle
    Wake,
    /// Press while idle on anything but the wake pad
    Swallow(Pad),
    /// The sleep pad was pressed
    Sleep,
    /// An adjustable pad was pressed
    EnterAdjustment {
        pad: Pad,
        entity: String,
        show_colors: bool,
        show_brightness: bool,
    },
    /// Press forwarded to the adjustment session
    Select(Pad),
    /// Release of the session's source pad
    ConfirmSource(Pad),
    /// Release of a mapped pad
    Toggle { pad: Pad, target: ButtonTarget },
    /// Release of a pad whose press already acted
    Suppressed(Pad),
    /// Release of a pad with no mapping
    Unmapped(Pad),
    /// Nothing to do yet (a press waiting for its release)
    Ignore,
}

pub struct InputRouter {
    buttons: ButtonMap,
    color_enabled: BTreeSet<Pad>,
    brightness_enabled: BTreeSet<Pad>,
    wake_pad: Pad,
    sleep_pad: Pad,
    restart_chord: [Pad; 2],

    /// Press time of every pad currently held
    pressed: HashMap<Pad, Instant>,
    last_pressed: Option<Pad>,
    consumed: HashSet<Pad>,
}

impl InputRouter {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            buttons: config.buttons.clone(),
            color_enabled: config.adjustment.color_enabled.clone(),
            brightness_enabled: config.adjustment.brightness_enabled.clone(),
            wake_pad: config.pads.wake,
            sleep_pad: config.pads.sleep,
            restart_chord: config.pads.restart_chord,
            pressed: HashMap::new(),
            last_pressed: None,
            consumed: HashSet::new(),
        }
    }

    /// Suppress the next release of `pad`
    pub fn consume(&mut self, pad: Pad) {
        self.consumed.insert(pad);
    }

    pub fn is_held(&self, pad: Pad) -> bool {
        self.pressed.contains_key(&pad)
    }

    /// Classify one event. `session_source` is the source pad of the active
    /// adjustment session, if any.
    pub fn classify(&mut self, event: PadEvent, mode: ModeKind, session_source: Option<Pad>) -> Intent {
        if event.pressed {
            self.on_press(event, mode)
        } else {
            self.on_release(event, mode, session_source)
        }
    }

    fn on_press(&mut self, event: PadEvent, mode: ModeKind) -> Intent {
        let pad = event.pad;
        self.pressed.insert(pad, event.at);
        let previous = self.last_pressed.replace(pad);

        let [first, second] = self.restart_chord;
        if previous == Some(first) && pad == second {
            self.last_pressed = None;
            self.consumed.insert(first);
            self.consumed.insert(second);
            return Intent::Restart;
        }

        if mode == ModeKind::Idle {
            self.consumed.insert(pad);
            return if pad == self.wake_pad {
                Intent::Wake
            } else {
                Intent::Swallow(pad)
            };
        }

        if let Some(intent) = self.adjustment_intent(pad) {
            return intent;
        }

        match mode {
            ModeKind::Adjusting => {
                self.consumed.insert(pad);
                Intent::Select(pad)
            }
            _ if pad == self.sleep_pad => {
                self.consumed.insert(pad);
                Intent::Sleep
            }
            _ => Intent::Ignore,
        }
    }

    fn adjustment_intent(&self, pad: Pad) -> Option<Intent> {
        let show_colors = self.color_enabled.contains(&pad);
        let show_brightness = self.brightness_enabled.contains(&pad);
        if !show_colors && !show_brightness {
            return None;
        }
        let Some(ButtonTarget::Entity(entity)) = self.buttons.get(&pad) else {
            return None;
        };
        Some(Intent::EnterAdjustment {
            pad,
            entity: entity.clone(),
            show_colors,
            show_brightness,
        })
    }

    fn on_release(&mut self, event: PadEvent, mode: ModeKind, session_source: Option<Pad>) -> Intent {
        let pad = event.pad;
        if let Some(pressed_at) = self.pressed.remove(&pad) {
            trace!(%pad, held = ?event.at.saturating_duration_since(pressed_at), "Release");
        }

        if self.consumed.remove(&pad) {
            return Intent::Suppressed(pad);
        }

        match mode {
            ModeKind::Adjusting if session_source == Some(pad) => Intent::ConfirmSource(pad),
            ModeKind::Adjusting | ModeKind::Idle => Intent::Ignore,
            ModeKind::Normal => match self.buttons.get(&pad) {
                Some(target) => Intent::Toggle {
                    pad,
                    target: target.clone(),
                },
                None => {
                    debug!("Pad {} is not mapped", pad);
                    Intent::Unmapped(pad)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> InputRouter {
        InputRouter::new(&AppConfig::default())
    }

    fn press(pad: u8) -> PadEvent {
        PadEvent::press(Pad::new(pad))
    }

    fn release(pad: u8) -> PadEvent {
        PadEvent::release(Pad::new(pad))
    }

    #[test]
    fn test_toggle_on_release() {
        let mut router = router();
        assert_eq!(router.classify(press(73), ModeKind::Normal, None), Intent::Ignore);
        assert!(router.is_held(Pad::new(73)));
        assert_eq!(
            router.classify(release(73), ModeKind::Normal, None),
            Intent::Toggle {
                pad: Pad::new(73),
                target: ButtonTarget::Entity("switch.living_room_neon".to_string())
            }
        );
        assert!(!router.is_held(Pad::new(73)));
    }

    #[test]
    fn test_unmapped_release() {
        let mut router = router();
        router.classify(press(44), ModeKind::Normal, None);
        assert_eq!(
            router.classify(release(44), ModeKind::Normal, None),
            Intent::Unmapped(Pad::new(44))
        );
    }

    #[test]
    fn test_adjustable_press() {
        let mut router = router();
        assert_eq!(
            router.classify(press(72), ModeKind::Normal, None),
            Intent::EnterAdjustment {
                pad: Pad::new(72),
                entity: "light.living_room_lamp".to_string(),
                show_colors: false,
                show_brightness: true,
            }
        );
        assert_eq!(
            router.classify(release(72), ModeKind::Adjusting, Some(Pad::new(72))),
            Intent::ConfirmSource(Pad::new(72))
        );
    }

    #[test]
    fn test_adjusting_forwards_presses_and_suppresses_releases() {
        let mut router = router();
        assert_eq!(
            router.classify(press(41), ModeKind::Adjusting, Some(Pad::new(82))),
            Intent::Select(Pad::new(41))
        );
        assert_eq!(
            router.classify(release(41), ModeKind::Normal, None),
            Intent::Suppressed(Pad::new(41))
        );

        // Sleep pad is just another pick while adjusting
        assert_eq!(
            router.classify(press(68), ModeKind::Adjusting, Some(Pad::new(82))),
            Intent::Select(Pad::new(68))
        );
    }

    #[test]
    fn test_consumed_source_release_is_suppressed() {
        let mut router = router();
        router.classify(press(82), ModeKind::Normal, None);
        router.consume(Pad::new(82));
        assert_eq!(
            router.classify(release(82), ModeKind::Normal, None),
            Intent::Suppressed(Pad::new(82))
        );
    }

    #[test]
    fn test_idle_press_handling() {
        let mut router = router();
        assert_eq!(router.classify(press(82), ModeKind::Idle, None), Intent::Swallow(Pad::new(82)));
        assert_eq!(
            router.classify(release(82), ModeKind::Idle, None),
            Intent::Suppressed(Pad::new(82))
        );

        assert_eq!(router.classify(press(91), ModeKind::Idle, None), Intent::Wake);
        // Release lands after the wake and must not toggle anything
        assert_eq!(
            router.classify(release(91), ModeKind::Normal, None),
            Intent::Suppressed(Pad::new(91))
        );
    }

    #[test]
    fn test_sleep_pad() {
        let mut router = router();
        assert_eq!(router.classify(press(68), ModeKind::Normal, None), Intent::Sleep);
        assert_eq!(
            router.classify(release(68), ModeKind::Idle, None),
            Intent::Suppressed(Pad::new(68))
        );
    }

    #[test]
    fn test_restart_chord_any_mode() {
        for mode in [ModeKind::Normal, ModeKind::Idle, ModeKind::Adjusting] {
            let mut router = router();
            router.classify(press(19), mode, None);
            assert_eq!(router.classify(press(29), mode, None), Intent::Restart);
            assert_eq!(router.classify(release(19), mode, None), Intent::Suppressed(Pad::new(19)));
            assert_eq!(router.classify(release(29), mode, None), Intent::Suppressed(Pad::new(29)));
        }
    }

    #[test]
    fn test_chord_needs_order_and_adjacency() {
        let mut router = router();
        router.classify(press(29), ModeKind::Normal, None);
        assert_ne!(router.classify(press(19), ModeKind::Normal, None), Intent::Restart);

        let mut router = self::router();
        router.classify(press(19), ModeKind::Normal, None);
        router.classify(press(73), ModeKind::Normal, None);
        assert_ne!(router.classify(press(29), ModeKind::Normal, None), Intent::Restart);
    }

    #[test]
    fn test_chord_resets_after_detection() {
        let mut router = router();
        router.classify(press(19), ModeKind::Normal, None);
        assert_eq!(router.classify(press(29), ModeKind::Normal, None), Intent::Restart);
        assert_ne!(router.classify(press(29), ModeKind::Normal, None), Intent::Restart);
    }
}
