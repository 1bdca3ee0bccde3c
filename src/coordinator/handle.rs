//! CoordinatorHandle - public API for the coordinator actor

use tokio::sync::{mpsc, oneshot};

use super::commands::CoordinatorCommand;
use super::mode::{ModeEvent, ModeKind};
use crate::device::PadEvent;
use crate::remote::Snapshot;

/// Handle for talking to the coordinator actor
///
/// Cheap to clone. Every method is non-blocking for the caller; queries
/// return `None` (or `false`) once the actor has stopped.
#[derive(Clone)]
pub struct CoordinatorHandle {
    cmd_tx: mpsc::UnboundedSender<CoordinatorCommand>,
}

impl CoordinatorHandle {
    pub(crate) fn new(cmd_tx: mpsc::UnboundedSender<CoordinatorCommand>) -> Self {
        Self { cmd_tx }
    }

    // =========================================================================
    // Fire-and-forget
    // =========================================================================

    pub fn pad_event(&self, event: PadEvent) {
        let _ = self.cmd_tx.send(CoordinatorCommand::PadEvent(event));
    }

    pub fn snapshot(&self, snapshot: Snapshot) {
        let _ = self.cmd_tx.send(CoordinatorCommand::Snapshot(snapshot));
    }

    /// A poll cycle passed without fresh state
    pub fn poll_tick(&self) {
        let _ = self.cmd_tx.send(CoordinatorCommand::PollTick);
    }

    pub fn request_render(&self) {
        let _ = self.cmd_tx.send(CoordinatorCommand::Render);
    }

    // =========================================================================
    // Request/response
    // =========================================================================

    /// Ask for a mode change; returns the mode in force afterwards
    pub async fn request_transition(&self, event: ModeEvent) -> Option<ModeKind> {
        let (response, rx) = oneshot::channel();
        self.cmd_tx
            .send(CoordinatorCommand::Transition { event, response })
            .ok()?;
        rx.await.ok()
    }

    /// Current mode, after every command sent before this call
    pub async fn current_mode(&self) -> Option<ModeKind> {
        let (response, rx) = oneshot::channel();
        self.cmd_tx
            .send(CoordinatorCommand::CurrentMode { response })
            .ok()?;
        rx.await.ok()
    }

    /// Stop the ambient effect; true if it was running
    pub async fn stop_ambient(&self) -> bool {
        let (response, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(CoordinatorCommand::StopAmbient { response })
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Blank the surface and stop the actor
    pub async fn shutdown(&self) {
        let (response, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(CoordinatorCommand::Shutdown { response })
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }
}
