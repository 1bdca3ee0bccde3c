//! LED rendering
//!
//! Turns a remote snapshot into pad colors and sends only what differs from
//! the last command sent to each pad. Every LED write in the crate goes
//! through [`LedRenderer::set_led`], so the cache always matches the device.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::colors::LedState;
use crate::config::{AppConfig, ButtonMap, ButtonTarget};
use crate::device::Device;
use crate::pad::Pad;
use crate::remote::{Domain, EntityState, Snapshot};

/// Colors cycled on the ambient toggle pad while the effect runs
const AMBIENT_TOGGLE_COLORS: [&str; 5] = ["orange_1", "green_1", "cyan_1", "pink_2", "yellow_1"];

/// Outcome of one render pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderReport {
    /// Some entity pad differs from the previous full render
    pub changed: bool,
    /// Some monitored entity reports a problem
    pub needs_attention: bool,
    /// Device commands emitted
    pub sent: usize,
}

/// Desired pad states computed from one snapshot
struct Evaluation {
    desired: BTreeMap<Pad, LedState>,
    /// Entity pads only, the part compared against the baseline
    entity_pads: BTreeMap<Pad, LedState>,
    report: RenderReport,
}

pub struct LedRenderer {
    device: Arc<dyn Device>,
    buttons: ButtonMap,
    ambient_entities: HashSet<String>,
    hide_when_inactive: BTreeSet<String>,

    /// Last state sent per pad
    sent: HashMap<Pad, LedState>,
    /// Entity pad colors from the last full render, baseline for dry runs
    baseline: BTreeMap<Pad, LedState>,
    /// Entities already reported as missing or unsupported
    unresolved: HashSet<String>,
}

impl LedRenderer {
    pub fn new(device: Arc<dyn Device>, config: &AppConfig) -> Self {
        Self {
            device,
            buttons: config.buttons.clone(),
            ambient_entities: config.ambient.entities.iter().cloned().collect(),
            hide_when_inactive: config.rendering.hide_when_inactive.clone(),
            sent: HashMap::new(),
            baseline: BTreeMap::new(),
            unresolved: HashSet::new(),
        }
    }

    /// Set one LED if it differs from what the device already shows.
    /// Returns true if a command was sent.
    pub fn set_led(&mut self, pad: Pad, state: LedState) -> bool {
        let unchanged = match self.sent.get(&pad) {
            Some(current) => current.looks_like(&state),
            None => false,
        };
        if unchanged {
            return false;
        }

        trace!(%pad, color = %state.color, channel = ?state.channel, "LED");
        self.device.send(pad, &state.color, state.channel);
        self.sent.insert(pad, state);
        true
    }

    /// What the device currently shows on a pad, as far as we know
    pub fn shown(&self, pad: Pad) -> Option<&LedState> {
        self.sent.get(&pad)
    }

    /// Write every surface pad unconditionally and reset the cache to match
    pub fn reset(&mut self, state: LedState) {
        for pad in Pad::surface() {
            self.device.send(pad, &state.color, state.channel);
            self.sent.insert(pad, state.clone());
        }
    }

    /// Turn every surface pad off except `keep`
    pub fn blank_except(&mut self, keep: Option<Pad>) {
        for pad in Pad::surface() {
            if Some(pad) != keep {
                self.set_led(pad, LedState::off());
            }
        }
    }

    /// Entities reported as missing or of an unsupported domain
    pub fn unresolved(&self) -> &HashSet<String> {
        &self.unresolved
    }

    /// Compute the desired state of every mapped pad and emit the deltas.
    ///
    /// `ambient_phase` is the ambient effect's pass counter, `None` when the
    /// effect is off. A dry run only reports; nothing is sent and the
    /// baseline is kept.
    pub fn render(&mut self, snapshot: &Snapshot, ambient_phase: Option<u64>, dry_run: bool) -> RenderReport {
        let Evaluation {
            desired,
            entity_pads,
            mut report,
        } = self.evaluate(snapshot, ambient_phase);

        if dry_run {
            debug!(changed = report.changed, attention = report.needs_attention, "Dry-run render");
            return report;
        }

        self.baseline = entity_pads;
        for (pad, state) in desired {
            if self.set_led(pad, state) {
                report.sent += 1;
            }
        }

        // Leftovers from palettes or the idle wake pad
        let stale: Vec<Pad> = self
            .sent
            .iter()
            .filter(|(pad, state)| !state.is_off() && !self.buttons.contains_key(pad))
            .map(|(pad, _)| *pad)
            .collect();
        for pad in stale {
            if self.set_led(pad, LedState::off()) {
                report.sent += 1;
            }
        }

        if report.sent > 0 {
            debug!(sent = report.sent, "Rendered LED changes");
        }
        report
    }

    /// Take the snapshot as the dry-run baseline without touching the
    /// device, so later dry runs only report what changed after this point
    pub fn commit_baseline(&mut self, snapshot: &Snapshot) -> RenderReport {
        let Evaluation {
            entity_pads, report, ..
        } = self.evaluate(snapshot, None);
        self.baseline = entity_pads;
        trace!(pads = self.baseline.len(), "Baseline committed");
        report
    }

    fn evaluate(&mut self, snapshot: &Snapshot, ambient_phase: Option<u64>) -> Evaluation {
        let mut report = RenderReport::default();
        let mut desired = BTreeMap::new();
        let mut entity_pads = BTreeMap::new();

        let buttons = std::mem::take(&mut self.buttons);
        for (pad, target) in &buttons {
            let state = match target {
                ButtonTarget::AmbientToggle => ambient_toggle_state(ambient_phase),
                ButtonTarget::VolumeUp(player) | ButtonTarget::VolumeDown(player) => {
                    volume_state(snapshot.get(player))
                }
                ButtonTarget::Entity(entity_id) => {
                    if ambient_phase.is_some() && self.ambient_entities.contains(entity_id) {
                        continue;
                    }
                    let (state, attention) = self.entity_state(entity_id, snapshot.get(entity_id));
                    report.needs_attention |= attention;
                    entity_pads.insert(*pad, state.clone());
                    state
                }
            };
            desired.insert(*pad, state);
        }
        self.buttons = buttons;

        report.changed = entity_pads.iter().any(|(pad, state)| {
            self.baseline
                .get(pad)
                .map_or(true, |previous| !previous.looks_like(state))
        });

        Evaluation {
            desired,
            entity_pads,
            report,
        }
    }

    /// Color for an entity pad, plus whether the entity needs attention
    fn entity_state(&mut self, entity_id: &str, state: Option<&EntityState>) -> (LedState, bool) {
        let Some(state) = state else {
            if self.unresolved.insert(entity_id.to_string()) {
                warn!("Entity {} not reported by Home Assistant", entity_id);
            }
            return (LedState::steady("red_2"), false);
        };

        match Domain::of(entity_id) {
            Domain::Light if state.is_on() => (LedState::steady(brightness_color(state)), false),
            Domain::Switch if state.is_on() => (LedState::steady("green_1"), false),
            Domain::Light | Domain::Switch => (LedState::steady("amber_1"), false),
            Domain::Scene => (LedState::steady("blue_1"), false),
            Domain::MediaPlayer => match state.state.as_str() {
                "playing" => (LedState::pulsing("cyan_0"), false),
                "paused" => (LedState::steady("amber_1"), false),
                _ if self.hide_when_inactive.contains(entity_id) => (LedState::off(), false),
                _ => (LedState::steady("amber_1"), false),
            },
            Domain::Plant => {
                let healthy = state.attribute("problem").and_then(Value::as_str) == Some("none");
                if healthy {
                    (LedState::steady("green_3"), false)
                } else {
                    (LedState::pulsing("red_2"), true)
                }
            }
            Domain::Other => {
                if self.unresolved.insert(entity_id.to_string()) {
                    warn!("Entity {} has an unsupported domain", entity_id);
                }
                (LedState::steady("red_2"), false)
            }
        }
    }
}

/// Steady while off; while on, one color per ambient pass
fn ambient_toggle_state(phase: Option<u64>) -> LedState {
    match phase {
        None => LedState::steady("orange_1"),
        Some(phase) => {
            let index = (phase % AMBIENT_TOGGLE_COLORS.len() as u64) as usize;
            LedState::pulsing(AMBIENT_TOGGLE_COLORS[index])
        }
    }
}

/// Green tier by light brightness (0-255); a missing value counts as full
fn brightness_color(state: &EntityState) -> &'static str {
    let brightness = state
        .attribute("brightness")
        .and_then(Value::as_u64)
        .unwrap_or(255);
    match brightness {
        0..=85 => "green_3",
        86..=170 => "green_2",
        _ => "green_1",
    }
}

/// Volume pads are lit only while their player is playing or paused
fn volume_state(player: Option<&EntityState>) -> LedState {
    match player.map(|p| p.state.as_str()) {
        Some("playing" | "paused") => LedState::steady("purple_1"),
        _ => LedState::off(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colors::LedChannel;
    use crate::testing::RecordingDevice;
    use serde_json::json;

    fn channel_of(renderer: &LedRenderer, pad: Pad) -> Option<LedChannel> {
        renderer.shown(pad).map(|state| state.channel)
    }

    fn setup() -> (Arc<RecordingDevice>, LedRenderer) {
        let device = Arc::new(RecordingDevice::new());
        let renderer = LedRenderer::new(device.clone(), &AppConfig::default());
        (device, renderer)
    }

    fn snapshot(states: Vec<EntityState>) -> Snapshot {
        states
            .into_iter()
            .map(|state| (state.entity_id.clone(), state))
            .collect()
    }

    #[test]
    fn test_set_led_diffs() {
        let (device, mut renderer) = setup();
        assert!(renderer.set_led(Pad::new(11), LedState::steady("green_1")));
        assert!(!renderer.set_led(Pad::new(11), LedState::steady("green_1")));
        assert!(renderer.set_led(Pad::new(11), LedState::pulsing("green_1")));
        assert_eq!(device.sent().len(), 2);
        assert_eq!(channel_of(&renderer, Pad::new(11)), Some(LedChannel::Pulse));
    }

    #[test]
    fn test_domain_colors() {
        let (device, mut renderer) = setup();
        let snap = snapshot(vec![
            EntityState::new("light.bulb_1", "on").with_attribute("brightness", json!(60)),
            EntityState::new("light.bulb_2", "on").with_attribute("brightness", json!(150)),
            EntityState::new("light.bulb_3", "off"),
            EntityState::new("switch.living_room_neon", "on"),
            EntityState::new("scene.bedtime", "scening"),
            EntityState::new("media_player.living_room_sonos", "playing"),
            EntityState::new("media_player.studio_speaker", "idle"),
            EntityState::new("plant.monstera", "ok").with_attribute("problem", json!("none")),
            EntityState::new("plant.pothos", "problem").with_attribute("problem", json!("moisture low")),
        ]);

        let report = renderer.render(&snap, None, false);
        assert!(report.needs_attention);

        assert_eq!(device.last(Pad::new(82)), Some(LedState::steady("green_3")));
        assert_eq!(device.last(Pad::new(83)), Some(LedState::steady("green_2")));
        assert_eq!(device.last(Pad::new(84)), Some(LedState::steady("amber_1")));
        assert_eq!(device.last(Pad::new(73)), Some(LedState::steady("green_1")));
        assert_eq!(device.last(Pad::new(87)), Some(LedState::steady("blue_1")));
        assert_eq!(device.last(Pad::new(65)), Some(LedState::pulsing("cyan_0")));
        assert_eq!(device.last(Pad::new(17)), Some(LedState::steady("green_3")));
        assert_eq!(device.last(Pad::new(18)), Some(LedState::pulsing("red_2")));
        assert_eq!(device.last(Pad::new(78)), Some(LedState::steady("orange_1")));

        // Hidden idle player and its volume pads stay dark
        assert!(renderer.shown(Pad::new(55)).unwrap().is_off());
        assert!(renderer.shown(Pad::new(56)).unwrap().is_off());
        // Playing player lights its volume pads
        assert_eq!(device.last(Pad::new(67)), Some(LedState::steady("purple_1")));
    }

    #[test]
    fn test_render_is_idempotent() {
        let (device, mut renderer) = setup();
        let snap = snapshot(vec![EntityState::new("light.bulb_1", "on")]);

        let first = renderer.render(&snap, None, false);
        assert!(first.sent > 0);
        device.take_sent();

        let second = renderer.render(&snap, None, false);
        assert_eq!(second.sent, 0);
        assert!(!second.changed);
        assert!(device.sent().is_empty());
    }

    #[test]
    fn test_missing_entities_logged_once() {
        let (_device, mut renderer) = setup();
        renderer.render(&Snapshot::new(), None, false);
        let count = renderer.unresolved().len();
        assert_eq!(count, 21);

        renderer.render(&Snapshot::new(), None, false);
        assert_eq!(renderer.unresolved().len(), count);
        assert_eq!(renderer.shown(Pad::new(81)), Some(&LedState::steady("red_2")));
    }

    #[test]
    fn test_dry_run_sends_nothing() {
        let (device, mut renderer) = setup();
        let mut snap = snapshot(vec![EntityState::new("light.bulb_1", "off")]);
        renderer.render(&snap, None, false);
        device.take_sent();

        assert!(!renderer.render(&snap, None, true).changed);

        snap.insert("light.bulb_1".to_string(), EntityState::new("light.bulb_1", "on"));
        let report = renderer.render(&snap, None, true);
        assert!(report.changed);
        assert_eq!(report.sent, 0);
        assert!(device.sent().is_empty());

        // Baseline is untouched by dry runs
        assert!(renderer.render(&snap, None, true).changed);
    }

    #[test]
    fn test_ambient_pads_skipped_while_active() {
        let (device, mut renderer) = setup();
        let snap = snapshot(vec![EntityState::new("light.bulb_1", "on")]);

        renderer.render(&snap, Some(0), false);
        assert!(device.last(Pad::new(82)).is_none());
        assert_eq!(channel_of(&renderer, Pad::new(78)), Some(LedChannel::Pulse));
    }

    #[test]
    fn test_unmapped_leftovers_turned_off() {
        let (device, mut renderer) = setup();
        renderer.set_led(Pad::new(41), LedState::steady("red_1"));
        renderer.set_led(Pad::new(91), LedState::steady("green_2"));

        renderer.render(&Snapshot::new(), None, false);
        assert!(device.last(Pad::new(41)).unwrap().is_off());
        assert!(device.last(Pad::new(91)).unwrap().is_off());
    }

    #[test]
    fn test_blank_except() {
        let (device, mut renderer) = setup();
        renderer.reset(LedState::steady("cyan_1"));
        device.take_sent();

        renderer.blank_except(Some(Pad::new(91)));
        let sent = device.sent();
        assert_eq!(sent.len(), 80);
        assert!(sent.iter().all(|(pad, state)| *pad != Pad::new(91) && state.is_off()));
    }

    #[test]
    fn test_ambient_toggle_steps_with_phase() {
        let (device, mut renderer) = setup();
        let snap = snapshot(vec![]);

        renderer.render(&snap, Some(3), false);
        let first = renderer.shown(Pad::new(78)).cloned().unwrap();
        device.take_sent();

        assert_eq!(renderer.render(&snap, Some(3), false).sent, 0);
        assert!(device.sent().is_empty());

        renderer.render(&snap, Some(4), false);
        assert_ne!(device.last(Pad::new(78)), Some(first));
    }

    #[test]
    fn test_committed_baseline_hides_earlier_changes() {
        let (device, mut renderer) = setup();
        let mut snap = snapshot(vec![EntityState::new("light.bulb_1", "off")]);
        renderer.render(&snap, None, false);
        device.take_sent();

        snap.insert("light.bulb_1".to_string(), EntityState::new("light.bulb_1", "on"));
        let report = renderer.commit_baseline(&snap);
        assert!(report.changed);
        assert!(device.sent().is_empty());

        assert!(!renderer.render(&snap, None, true).changed);
    }
}
