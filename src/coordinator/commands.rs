//! Messages accepted by the coordinator actor

use tokio::sync::oneshot;

use super::mode::{ModeEvent, ModeKind};
use crate::device::PadEvent;
use crate::remote::Snapshot;

/// Commands for the coordinator actor
///
/// Pad events, snapshots, poll ticks and render requests are fire-and-forget; the rest
/// answer through a oneshot channel once the actor has processed them.
#[derive(Debug)]
pub enum CoordinatorCommand {
    /// Raw press or release from the surface
    PadEvent(PadEvent),
    /// Fresh remote state from the poller
    Snapshot(Snapshot),
    /// A poll cycle ended without a snapshot
    PollTick,
    /// Re-render from the latest snapshot (used after timed feedback)
    Render,

    Transition {
        event: ModeEvent,
        response: oneshot::Sender<ModeKind>,
    },
    CurrentMode {
        response: oneshot::Sender<ModeKind>,
    },
    /// Stop the ambient effect and wait for its loop to exit
    StopAmbient {
        response: oneshot::Sender<bool>,
    },
    /// Stop the ambient effect, blank the surface and end the actor
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

/// Signals the coordinator raises to the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorSignal {
    RestartRequested,
}
