//! Home-automation service interface
//!
//! The coordinator only sees the [`RemoteService`] trait. Toggle and volume
//! behaviour is domain-aware and provided as default methods on top of
//! `get_all_states` and `call_service`.

pub mod error;
pub mod home_assistant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, error};

pub use error::RemoteError;
pub use home_assistant::HomeAssistantClient;

/// State of one entity as reported by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl EntityState {
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn is_on(&self) -> bool {
        self.state == "on"
    }
}

/// All entity states fetched in one poll, keyed by entity id
pub type Snapshot = HashMap<String, EntityState>;

/// Entity domain, taken from the entity id prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Light,
    Switch,
    Scene,
    MediaPlayer,
    Plant,
    Other,
}

impl Domain {
    pub fn of(entity_id: &str) -> Self {
        match entity_id.split_once('.').map(|(domain, _)| domain) {
            Some("light") => Domain::Light,
            Some("switch") => Domain::Switch,
            Some("scene") => Domain::Scene,
            Some("media_player") => Domain::MediaPlayer,
            Some("plant") => Domain::Plant,
            _ => Domain::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Light => "light",
            Domain::Switch => "switch",
            Domain::Scene => "scene",
            Domain::MediaPlayer => "media_player",
            Domain::Plant => "plant",
            Domain::Other => "other",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeDirection {
    Up,
    Down,
}

/// Client for the home-automation service
///
/// All methods take `&self` so the client can be shared as
/// `Arc<dyn RemoteService>` between the poller, the coordinator and the
/// ambient loop.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Fetch every entity state in one batch
    async fn get_all_states(&self) -> Result<Snapshot, RemoteError>;

    /// Call `domain.service` on an entity. Failures are logged and reported
    /// as `false`.
    async fn call_service(&self, domain: &str, service: &str, entity_id: &str, data: Value)
        -> bool;

    /// Volume step used by `adjust_volume` (0-1 scale)
    fn volume_step(&self) -> f64 {
        0.07
    }

    /// Fetch a single entity state
    async fn get_state(&self, entity_id: &str) -> Result<EntityState, RemoteError> {
        let mut states = self.get_all_states().await?;
        states.remove(entity_id).ok_or_else(|| RemoteError::NotFound {
            entity_id: entity_id.to_string(),
        })
    }

    /// Toggle a light or switch, activate a scene, or play/pause a media
    /// player. An off or unavailable media player is left alone.
    async fn toggle_entity(&self, entity_id: &str) -> bool {
        match Domain::of(entity_id) {
            Domain::Light => self.call_service("light", "toggle", entity_id, json!({})).await,
            Domain::Switch => self.call_service("switch", "toggle", entity_id, json!({})).await,
            Domain::Scene => self.call_service("scene", "turn_on", entity_id, json!({})).await,
            Domain::MediaPlayer => {
                if let Ok(state) = self.get_state(entity_id).await {
                    if state.state == "off" || state.state == "unavailable" {
                        debug!(
                            "Media player {} is {}, skipping play/pause",
                            entity_id, state.state
                        );
                        return true;
                    }
                }
                self.call_service("media_player", "media_play_pause", entity_id, json!({}))
                    .await
            }
            domain => {
                error!("Cannot toggle {}: unsupported domain {}", entity_id, domain);
                false
            }
        }
    }

    /// Step a media player's volume, clamped to 0-1
    async fn adjust_volume(&self, entity_id: &str, direction: VolumeDirection) -> bool {
        let state = match self.get_state(entity_id).await {
            Ok(state) => state,
            Err(e) => {
                error!("Cannot get state for volume adjustment of {}: {}", entity_id, e);
                return false;
            }
        };

        let Some(current) = state.attribute("volume_level").and_then(Value::as_f64) else {
            error!("Volume level not available for {}", entity_id);
            return false;
        };

        let delta = match direction {
            VolumeDirection::Up => self.volume_step(),
            VolumeDirection::Down => -self.volume_step(),
        };
        let volume = (current + delta).clamp(0.0, 1.0);
        self.call_service(
            "media_player",
            "volume_set",
            entity_id,
            json!({ "volume_level": volume }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRemote;

    #[test]
    fn test_domain_of() {
        assert_eq!(Domain::of("light.bulb_1"), Domain::Light);
        assert_eq!(Domain::of("switch.neon"), Domain::Switch);
        assert_eq!(Domain::of("scene.bedtime"), Domain::Scene);
        assert_eq!(Domain::of("media_player.sonos"), Domain::MediaPlayer);
        assert_eq!(Domain::of("plant.pothos"), Domain::Plant);
        assert_eq!(Domain::of("sensor.temp"), Domain::Other);
        assert_eq!(Domain::of("garbage"), Domain::Other);
    }

    #[test]
    fn test_entity_state_deserialize() {
        let raw = json!({
            "entity_id": "light.bulb_1",
            "state": "on",
            "attributes": { "brightness": 120 },
            "last_changed": "2024-01-01T00:00:00Z"
        });
        let state: EntityState = serde_json::from_value(raw).unwrap();
        assert!(state.is_on());
        assert_eq!(state.attribute("brightness"), Some(&json!(120)));
    }

    #[tokio::test]
    async fn test_toggle_by_domain() {
        let remote = MockRemote::new();
        assert!(remote.toggle_entity("light.bulb_1").await);
        assert!(remote.toggle_entity("scene.bedtime").await);
        assert!(!remote.toggle_entity("sensor.temp").await);

        let calls = remote.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!((calls[0].domain.as_str(), calls[0].service.as_str()), ("light", "toggle"));
        assert_eq!((calls[1].domain.as_str(), calls[1].service.as_str()), ("scene", "turn_on"));
    }

    #[tokio::test]
    async fn test_toggle_off_media_player_is_noop() {
        let remote = MockRemote::new();
        remote.set_state(EntityState::new("media_player.sonos", "off"));
        assert!(remote.toggle_entity("media_player.sonos").await);
        assert!(remote.calls().is_empty());

        remote.set_state(EntityState::new("media_player.sonos", "paused"));
        assert!(remote.toggle_entity("media_player.sonos").await);
        assert_eq!(remote.calls()[0].service, "media_play_pause");
    }

    #[tokio::test]
    async fn test_adjust_volume_clamps() {
        let remote = MockRemote::new();
        remote.set_state(
            EntityState::new("media_player.sonos", "playing")
                .with_attribute("volume_level", json!(0.98)),
        );
        assert!(remote.adjust_volume("media_player.sonos", VolumeDirection::Up).await);

        let calls = remote.calls();
        assert_eq!(calls[0].service, "volume_set");
        assert_eq!(calls[0].data["volume_level"], json!(1.0));
    }

    #[tokio::test]
    async fn test_adjust_volume_without_level_fails() {
        let remote = MockRemote::new();
        remote.set_state(EntityState::new("media_player.sonos", "off"));
        assert!(!remote.adjust_volume("media_player.sonos", VolumeDirection::Down).await);
        assert!(remote.calls().is_empty());
    }
}
