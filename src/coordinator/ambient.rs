//! Ambient ("disco") effect
//!
//! A background loop that periodically sends random colors to a fixed set
//! of lights. `stop` waits for the loop to exit, so once it returns no
//! further calls for the ambient lights are in flight.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AmbientConfig;
use crate::remote::RemoteService;

const AMBIENT_COLORS: [[u8; 3]; 9] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [255, 255, 0],
    [255, 0, 255],
    [0, 255, 255],
    [255, 255, 255],
    [255, 128, 0],
    [128, 0, 255],
];

struct Running {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
    /// Completed passes over the ambient lights
    ticks: Arc<AtomicU64>,
}

pub struct AmbientDriver {
    remote: Arc<dyn RemoteService>,
    entities: Arc<[String]>,
    interval: Duration,
    on_probability: f64,
    running: Option<Running>,
}

impl AmbientDriver {
    pub fn new(remote: Arc<dyn RemoteService>, config: &AmbientConfig) -> Self {
        Self {
            remote,
            entities: config.entities.iter().cloned().collect(),
            interval: Duration::from_millis(config.interval_ms),
            on_probability: config.on_probability,
            running: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.running.is_some()
    }

    /// Number of completed passes while the effect runs, `None` when stopped
    pub fn phase(&self) -> Option<u64> {
        self.running
            .as_ref()
            .map(|running| running.ticks.load(Ordering::Relaxed))
    }

    /// Start the loop. Returns false if it was already running.
    pub fn start(&mut self) -> bool {
        if self.running.is_some() {
            return false;
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let ticks = Arc::new(AtomicU64::new(0));
        let handle = tokio::spawn(run(
            self.remote.clone(),
            self.entities.clone(),
            self.interval,
            self.on_probability,
            ticks.clone(),
            stop_rx,
        ));
        self.running = Some(Running {
            stop_tx,
            handle,
            ticks,
        });
        info!("Ambient effect started on {} lights", self.entities.len());
        true
    }

    /// Signal the loop and wait for it to exit. Returns false if it wasn't
    /// running.
    pub async fn stop(&mut self) -> bool {
        let Some(running) = self.running.take() else {
            return false;
        };

        let _ = running.stop_tx.send(());
        if let Err(e) = running.handle.await {
            warn!("Ambient loop ended abnormally: {}", e);
        }
        info!("Ambient effect stopped");
        true
    }

    /// Flip the effect on or off; returns whether it is now active
    pub async fn toggle(&mut self) -> bool {
        if self.is_active() {
            self.stop().await;
            false
        } else {
            self.start()
        }
    }
}

async fn run(
    remote: Arc<dyn RemoteService>,
    entities: Arc<[String]>,
    interval: Duration,
    on_probability: f64,
    ticks: Arc<AtomicU64>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut rng = StdRng::from_entropy();

    loop {
        for entity in entities.iter() {
            if stop_requested(&mut stop_rx) {
                return;
            }

            let ok = if rng.gen::<f64>() < on_probability {
                let rgb = AMBIENT_COLORS.choose(&mut rng).copied().unwrap_or([255, 255, 255]);
                remote
                    .call_service(
                        "light",
                        "turn_on",
                        entity,
                        json!({ "rgb_color": rgb, "brightness": 255 }),
                    )
                    .await
            } else {
                remote.call_service("light", "turn_off", entity, json!({})).await
            };
            if !ok {
                debug!("Ambient call for {} failed", entity);
            }
        }
        ticks.fetch_add(1, Ordering::Relaxed);

        tokio::select! {
            _ = &mut stop_rx => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// A sent signal and a dropped sender both mean stop
fn stop_requested(stop_rx: &mut oneshot::Receiver<()>) -> bool {
    !matches!(stop_rx.try_recv(), Err(oneshot::error::TryRecvError::Empty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRemote;

    fn driver(remote: Arc<MockRemote>) -> AmbientDriver {
        let config = AmbientConfig {
            interval_ms: 5,
            ..AmbientConfig::default()
        };
        AmbientDriver::new(remote, &config)
    }

    #[tokio::test]
    async fn test_calls_only_ambient_lights() {
        let remote = Arc::new(MockRemote::new());
        let mut ambient = driver(remote.clone());

        assert!(ambient.start());
        assert!(!ambient.start());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(ambient.stop().await);

        let calls = remote.calls();
        assert!(calls.len() >= 3);
        let entities = AmbientConfig::default().entities;
        for call in &calls {
            assert!(entities.contains(&call.entity_id));
            assert_eq!(call.domain, "light");
            if call.service == "turn_on" {
                assert_eq!(call.data["brightness"], json!(255));
                let rgb: Vec<u8> = serde_json::from_value(call.data["rgb_color"].clone()).unwrap();
                assert!(AMBIENT_COLORS.iter().any(|c| c[..] == rgb[..]));
            } else {
                assert_eq!(call.service, "turn_off");
            }
        }
    }

    #[tokio::test]
    async fn test_no_calls_after_stop() {
        let remote = Arc::new(MockRemote::new());
        let mut ambient = driver(remote.clone());

        ambient.start();
        tokio::time::sleep(Duration::from_millis(20)).await;
        ambient.stop().await;
        assert!(!ambient.is_active());

        let count = remote.calls().len();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(remote.calls().len(), count);
    }

    #[tokio::test]
    async fn test_toggle_and_repeated_stop() {
        let remote = Arc::new(MockRemote::new());
        let mut ambient = driver(remote);

        assert!(!ambient.stop().await);
        assert!(ambient.toggle().await);
        assert!(ambient.is_active());
        assert!(!ambient.toggle().await);
        assert!(!ambient.is_active());
        assert!(!ambient.stop().await);
    }

    #[tokio::test]
    async fn test_phase_advances_per_pass() {
        let remote = Arc::new(MockRemote::new());
        let mut ambient = driver(remote);
        assert_eq!(ambient.phase(), None);

        ambient.start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(ambient.phase().unwrap() >= 1);

        ambient.stop().await;
        assert_eq!(ambient.phase(), None);
    }
}
