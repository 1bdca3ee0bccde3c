//! Run loop for one device connection
//!
//! Spawns the coordinator and its feeders (input forwarder, state poller,
//! liveness checker) and tears them down in a fixed order: ambient effect
//! first, then the background tasks, then the LEDs, then the device.

use anyhow::{anyhow, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::coordinator::{Coordinator, CoordinatorHandle, CoordinatorSignal, ModeKind};
use crate::device::{Device, PadEvent};
use crate::remote::RemoteService;

/// Why the run loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Shutdown was requested (Ctrl+C)
    Shutdown,
    /// The device went away
    Disconnected,
    /// The restart chord was pressed
    RestartRequested,
}

pub struct Controller {
    config: Arc<AppConfig>,
    device: Arc<dyn Device>,
    remote: Arc<dyn RemoteService>,
}

impl Controller {
    pub fn new(config: Arc<AppConfig>, device: Arc<dyn Device>, remote: Arc<dyn RemoteService>) -> Self {
        Self {
            config,
            device,
            remote,
        }
    }

    /// Drive an opened device until shutdown, disconnection or a restart
    /// request
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<RunOutcome> {
        let events = self
            .device
            .take_events()
            .ok_or_else(|| anyhow!("Event stream of {} is not available", self.device.name()))?;

        let poll_now = Arc::new(Notify::new());
        let (handle, mut outputs) = Coordinator::spawn(
            self.config.clone(),
            self.device.clone(),
            self.remote.clone(),
            poll_now.clone(),
        );

        let mut input_task = tokio::spawn(forward_input(events, handle.clone()));
        let poller_task = tokio::spawn(poll_states(
            self.remote.clone(),
            handle.clone(),
            outputs.mode.clone(),
            poll_now,
            self.config.timing.poll_interval(),
            self.config.timing.idle_poll_interval(),
        ));
        let mut liveness_task = tokio::spawn(check_liveness(
            self.device.clone(),
            Duration::from_millis(self.config.device.alive_check_ms),
        ));

        info!("Running on {}", self.device.name());
        tokio::pin!(shutdown);

        let outcome = tokio::select! {
            _ = &mut shutdown => RunOutcome::Shutdown,
            signal = outputs.signals.recv() => match signal {
                Some(CoordinatorSignal::RestartRequested) => RunOutcome::RestartRequested,
                None => RunOutcome::Shutdown,
            },
            _ = &mut liveness_task => RunOutcome::Disconnected,
            _ = &mut input_task => {
                warn!("Input stream ended");
                RunOutcome::Disconnected
            }
        };
        info!(?outcome, "Stopping");

        self.stop(handle, [input_task, poller_task, liveness_task])
            .await;
        Ok(outcome)
    }

    async fn stop(&self, handle: CoordinatorHandle, tasks: [JoinHandle<()>; 3]) {
        if handle.stop_ambient().await {
            debug!("Ambient effect stopped");
        }
        for task in &tasks {
            task.abort();
        }
        // A task that already won the select above must not be polled again
        for task in tasks {
            if !task.is_finished() {
                let _ = task.await;
            }
        }
        handle.shutdown().await;
        self.device.close();
        info!("Device released");
    }
}

async fn forward_input(mut events: mpsc::Receiver<PadEvent>, handle: CoordinatorHandle) {
    while let Some(event) = events.recv().await {
        handle.pad_event(event);
    }
}

/// Fetch all states on a cadence that slows down while idle. A successful
/// action or a mode change triggers an early poll.
async fn poll_states(
    remote: Arc<dyn RemoteService>,
    handle: CoordinatorHandle,
    mut mode: watch::Receiver<ModeKind>,
    poll_now: Arc<Notify>,
    active_interval: Duration,
    idle_interval: Duration,
) {
    loop {
        match remote.get_all_states().await {
            Ok(snapshot) => {
                debug!("Polled {} entities", snapshot.len());
                handle.snapshot(snapshot);
            }
            Err(e) => {
                warn!("State poll failed: {}", e);
                handle.poll_tick();
            }
        }
        if handle.is_closed() {
            return;
        }

        let interval = if *mode.borrow() == ModeKind::Idle {
            idle_interval
        } else {
            active_interval
        };

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = poll_now.notified() => {}
            changed = mode.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

/// Returns once the device stops answering
async fn check_liveness(device: Arc<dyn Device>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if !device.is_connected() {
            error!("{} disconnected", device.name());
            return;
        }
    }
}
