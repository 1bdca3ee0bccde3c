//! Coordinator actor
//!
//! One task owns the mode, the adjustment session, the press record, the
//! idle timer, the LED cache and the ambient driver. Commands are processed
//! strictly in arrival order, so a transition is always fully applied
//! before the next event or render looks at the mode.
//!
//! ```text
//!  input task ──┐                       ┌──> Device (LEDs)
//!  poller ──────┼──> CoordinatorCommand ┤
//!  runtime ─────┘     (unbounded mpsc)  └──> RemoteService
//!                           │
//!                           └──> watch<ModeKind>, CoordinatorSignal
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, info, trace, warn};

use super::adjustment::AdjustmentSession;
use super::ambient::AmbientDriver;
use super::commands::{CoordinatorCommand, CoordinatorSignal};
use super::handle::CoordinatorHandle;
use super::idle::IdleManager;
use super::input::{InputRouter, Intent};
use super::mode::{ModeCoordinator, ModeEvent, ModeKind, SleepReason, WakeReason};
use super::renderer::LedRenderer;
use crate::colors::LedState;
use crate::config::{AppConfig, ButtonTarget};
use crate::device::{Device, PadEvent};
use crate::pad::Pad;
use crate::remote::{Domain, RemoteService, Snapshot, VolumeDirection};

const SPLASH_COLOR: &str = "cyan_1";
const SPLASH_DURATION: Duration = Duration::from_millis(300);
const FLASH_COLOR: &str = "yellow_3";

/// Receivers the runtime keeps alongside the handle
pub struct CoordinatorOutputs {
    /// Committed mode, updated after every transition
    pub mode: watch::Receiver<ModeKind>,
    pub signals: mpsc::UnboundedReceiver<CoordinatorSignal>,
}

pub struct Coordinator {
    config: Arc<AppConfig>,
    remote: Arc<dyn RemoteService>,

    modes: ModeCoordinator,
    router: InputRouter,
    renderer: LedRenderer,
    idle: IdleManager,
    ambient: AmbientDriver,

    /// Most recent snapshot from the poller
    latest: Option<Snapshot>,
    /// Attention flag from the last render or dry run
    needs_attention: bool,

    command_rx: mpsc::UnboundedReceiver<CoordinatorCommand>,
    /// Used by delayed feedback renders; weak so the actor ends once every
    /// handle is dropped
    command_tx: mpsc::WeakUnboundedSender<CoordinatorCommand>,
    signal_tx: mpsc::UnboundedSender<CoordinatorSignal>,
    poll_now: Arc<Notify>,
}

impl Coordinator {
    /// Spawn the actor on the current runtime
    ///
    /// `poll_now` is notified whenever a remote call succeeded and the
    /// poller should refresh ahead of its schedule.
    pub fn spawn(
        config: Arc<AppConfig>,
        device: Arc<dyn Device>,
        remote: Arc<dyn RemoteService>,
        poll_now: Arc<Notify>,
    ) -> (CoordinatorHandle, CoordinatorOutputs) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let modes = ModeCoordinator::new();
        let mode_rx = modes.subscribe();

        let actor = Coordinator {
            router: InputRouter::new(&config),
            renderer: LedRenderer::new(device, &config),
            idle: IdleManager::new(config.timing.idle_timeout(), config.pads.wake, Instant::now()),
            ambient: AmbientDriver::new(remote.clone(), &config.ambient),
            modes,
            config,
            remote,
            latest: None,
            needs_attention: false,
            command_rx: cmd_rx,
            command_tx: cmd_tx.downgrade(),
            signal_tx,
            poll_now,
        };

        tokio::spawn(actor.run());
        info!("Coordinator spawned");

        (
            CoordinatorHandle::new(cmd_tx),
            CoordinatorOutputs {
                mode: mode_rx,
                signals: signal_rx,
            },
        )
    }

    async fn run(mut self) {
        self.startup_display().await;

        while let Some(cmd) = self.command_rx.recv().await {
            trace!(?cmd, "Processing command");

            match cmd {
                CoordinatorCommand::PadEvent(event) => self.handle_pad_event(event).await,
                CoordinatorCommand::Snapshot(snapshot) => self.handle_snapshot(snapshot).await,
                CoordinatorCommand::PollTick => {
                    self.check_idle_timeout().await;
                }
                CoordinatorCommand::Render => self.render(),

                CoordinatorCommand::Transition { event, response } => {
                    let kind = self.transition(event).await;
                    let _ = response.send(kind);
                }
                CoordinatorCommand::CurrentMode { response } => {
                    let _ = response.send(self.modes.kind());
                }
                CoordinatorCommand::StopAmbient { response } => {
                    let stopped = self.ambient.stop().await;
                    if stopped {
                        self.render();
                    }
                    let _ = response.send(stopped);
                }
                CoordinatorCommand::Shutdown { response } => {
                    self.ambient.stop().await;
                    self.renderer.blank_except(None);
                    info!("Coordinator stopped");
                    let _ = response.send(());
                    return;
                }
            }
        }

        self.ambient.stop().await;
        debug!("Coordinator command channel closed");
    }

    /// Optional splash, then every pad off so the cache matches the device
    async fn startup_display(&mut self) {
        if self.config.device.splash {
            self.renderer.reset(LedState::steady(SPLASH_COLOR));
            tokio::time::sleep(SPLASH_DURATION).await;
        }
        self.renderer.reset(LedState::off());
    }

    // =========================================================================
    // Input
    // =========================================================================

    async fn handle_pad_event(&mut self, event: PadEvent) {
        let mode = self.modes.kind();
        let source = self.modes.session().map(AdjustmentSession::source_pad);
        let intent = self.router.classify(event, mode, source);
        debug!(pad = %event.pad, pressed = event.pressed, %mode, ?intent, "Pad event");

        // Swallowed presses while idle don't count as activity; the wake
        // pad does and wakes the surface
        if (mode != ModeKind::Idle || intent == Intent::Wake)
            && self.idle.register_activity(Instant::now(), mode)
        {
            self.transition(ModeEvent::Wake(WakeReason::Pad)).await;
        }

        match intent {
            Intent::Restart => {
                info!("Restart chord detected");
                let _ = self.signal_tx.send(CoordinatorSignal::RestartRequested);
            }
            Intent::Swallow(pad) => {
                self.renderer.set_led(pad, LedState::off());
            }
            Intent::Sleep => {
                self.transition(ModeEvent::Sleep(SleepReason::Manual)).await;
            }
            Intent::EnterAdjustment {
                pad,
                entity,
                show_colors,
                show_brightness,
            } => {
                let session = AdjustmentSession::new(entity, pad, show_colors, show_brightness);
                self.transition(ModeEvent::EnterAdjustment(session)).await;
            }
            Intent::Select(pad) | Intent::ConfirmSource(pad) => self.select(pad).await,
            Intent::Toggle { pad, target } => self.toggle(pad, target).await,
            Intent::Unmapped(pad) => debug!("Unmapped pad {} released", pad),
            Intent::Wake | Intent::Suppressed(_) | Intent::Ignore => {}
        }
    }

    async fn select(&mut self, pad: Pad) {
        let Some(session) = self.modes.session_mut() else {
            return;
        };
        let source = session.source_pad();
        let outcome = session
            .handle_selection(pad, self.remote.as_ref(), &self.config.adjustment)
            .await;
        debug!(?outcome, "Adjustment input");

        if !outcome.ends_session() {
            return;
        }

        // The source pad may still be held after a pick
        if self.router.is_held(source) {
            self.router.consume(source);
        }
        self.transition(ModeEvent::ExitAdjustment).await;

        if let Some(color) = outcome.pulse_color() {
            self.renderer.set_led(source, LedState::pulsing(color));
            self.schedule_render(self.config.timing.pulse());
        }

        if outcome.succeeded() {
            self.poll_now.notify_one();
        }
    }

    async fn toggle(&mut self, pad: Pad, target: ButtonTarget) {
        let success = match &target {
            ButtonTarget::AmbientToggle => {
                let active = self.ambient.toggle().await;
                info!("Ambient effect {}", if active { "on" } else { "off" });
                self.render();
                return;
            }
            ButtonTarget::Entity(entity_id) if Domain::of(entity_id) == Domain::Plant => {
                debug!("{} is read-only", entity_id);
                return;
            }
            ButtonTarget::Entity(entity_id) => {
                self.flash(pad);
                self.remote.toggle_entity(entity_id).await
            }
            ButtonTarget::VolumeUp(player) => {
                self.flash(pad);
                self.remote.adjust_volume(player, VolumeDirection::Up).await
            }
            ButtonTarget::VolumeDown(player) => {
                self.flash(pad);
                self.remote.adjust_volume(player, VolumeDirection::Down).await
            }
        };

        if success {
            self.poll_now.notify_one();
        } else {
            warn!("Action on pad {} ({}) failed", pad, target);
        }
    }

    /// Acknowledge a press; a render `flash_ms` later restores the pad
    fn flash(&mut self, pad: Pad) {
        self.renderer.set_led(pad, LedState::pulsing(FLASH_COLOR));
        self.schedule_render(self.config.timing.flash());
    }

    fn schedule_render(&self, after: Duration) {
        let command_tx = self.command_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(tx) = command_tx.upgrade() {
                let _ = tx.send(CoordinatorCommand::Render);
            }
        });
    }

    // =========================================================================
    // Snapshots and rendering
    // =========================================================================

    async fn handle_snapshot(&mut self, snapshot: Snapshot) {
        self.latest = Some(snapshot);
        if self.check_idle_timeout().await {
            return;
        }

        match self.modes.kind() {
            ModeKind::Normal => self.render(),
            ModeKind::Adjusting => {}
            ModeKind::Idle => self.check_remote_wake().await,
        }
    }

    /// Sleep once the inactivity timeout has passed. Runs on every poll
    /// cycle, including ones where the fetch failed.
    async fn check_idle_timeout(&mut self) -> bool {
        if !self.idle.check_timeout(Instant::now(), self.modes.kind()) {
            return false;
        }
        self.transition(ModeEvent::Sleep(SleepReason::Timeout)).await;
        true
    }

    /// Wake on a remote change seen while idle, otherwise refresh the
    /// wake pad's attention color
    async fn check_remote_wake(&mut self) {
        let Some(snapshot) = &self.latest else {
            return;
        };
        let report = self.renderer.render(snapshot, self.ambient.phase(), true);
        self.needs_attention = report.needs_attention;

        if report.changed {
            info!("Remote change while idle, waking");
            if self.idle.register_activity(Instant::now(), ModeKind::Idle) {
                self.transition(ModeEvent::Wake(WakeReason::Remote)).await;
            }
        } else {
            self.transition(ModeEvent::SetNotification(report.needs_attention))
                .await;
        }
    }

    /// Full render in normal mode. Palettes own the grid while adjusting
    /// and the surface stays dark while idle.
    fn render(&mut self) {
        if self.modes.kind() != ModeKind::Normal {
            trace!("Render skipped in {} mode", self.modes.kind());
            return;
        }
        let Some(snapshot) = &self.latest else {
            return;
        };
        let report = self.renderer.render(snapshot, self.ambient.phase(), false);
        self.needs_attention = report.needs_attention;
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Apply a mode change and update the display to match
    async fn transition(&mut self, event: ModeEvent) -> ModeKind {
        let before = self.modes.kind();
        let entering = matches!(event, ModeEvent::EnterAdjustment(_));
        let ends_session = matches!(
            event,
            ModeEvent::EnterAdjustment(_)
                | ModeEvent::ExitAdjustment
                | ModeEvent::Sleep(SleepReason::Timeout)
        );

        if before == ModeKind::Adjusting && ends_session {
            if let Some(session) = self.modes.session() {
                session.exit(&mut self.renderer, &self.config.adjustment);
            }
        }

        let after = self.modes.request_transition(event);

        match (before, after) {
            (_, ModeKind::Adjusting) if entering => {
                if let Some(session) = self.modes.session() {
                    session.enter(&mut self.renderer, &self.config.adjustment);
                }
            }
            (ModeKind::Normal | ModeKind::Adjusting, ModeKind::Idle) => {
                self.ambient.stop().await;
                // Whatever changed before going dark must not wake us later
                if let Some(snapshot) = &self.latest {
                    self.needs_attention = self.renderer.commit_baseline(snapshot).needs_attention;
                }
                self.modes
                    .request_transition(ModeEvent::SetNotification(self.needs_attention));
                self.idle.enter_idle(&mut self.renderer, self.needs_attention);
            }
            (ModeKind::Idle, ModeKind::Idle) => {
                let flag = self.modes.notification().unwrap_or(false);
                self.idle.set_notification(&mut self.renderer, flag);
            }
            (ModeKind::Idle | ModeKind::Adjusting, ModeKind::Normal) => self.render(),
            _ => {}
        }

        after
    }
}
