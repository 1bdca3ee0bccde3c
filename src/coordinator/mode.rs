//! Operating mode and its transition rules

use std::fmt;
use tokio::sync::watch;
use tracing::{debug, info};

use super::adjustment::AdjustmentSession;

/// Which mode is active, without the mode's payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeKind {
    Normal,
    Adjusting,
    Idle,
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeKind::Normal => write!(f, "normal"),
            ModeKind::Adjusting => write!(f, "adjusting"),
            ModeKind::Idle => write!(f, "idle"),
        }
    }
}

/// The active mode. An adjustment session exists only inside `Adjusting`.
#[derive(Debug)]
pub enum Mode {
    Normal,
    Adjusting(AdjustmentSession),
    Idle { notification: bool },
}

impl Mode {
    pub fn kind(&self) -> ModeKind {
        match self {
            Mode::Normal => ModeKind::Normal,
            Mode::Adjusting(_) => ModeKind::Adjusting,
            Mode::Idle { .. } => ModeKind::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepReason {
    Timeout,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    Pad,
    Remote,
}

/// A requested mode change
#[derive(Debug)]
pub enum ModeEvent {
    EnterAdjustment(AdjustmentSession),
    ExitAdjustment,
    Sleep(SleepReason),
    Wake(WakeReason),
    SetNotification(bool),
}

/// Single authority for the current mode
///
/// Every transition goes through [`ModeCoordinator::request_transition`];
/// the committed kind is published on a watch channel after each change.
pub struct ModeCoordinator {
    mode: Mode,
    published: watch::Sender<ModeKind>,
}

impl ModeCoordinator {
    pub fn new() -> Self {
        let (published, _) = watch::channel(ModeKind::Normal);
        Self {
            mode: Mode::Normal,
            published,
        }
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn kind(&self) -> ModeKind {
        self.mode.kind()
    }

    pub fn subscribe(&self) -> watch::Receiver<ModeKind> {
        self.published.subscribe()
    }

    pub fn session(&self) -> Option<&AdjustmentSession> {
        match &self.mode {
            Mode::Adjusting(session) => Some(session),
            _ => None,
        }
    }

    pub fn session_mut(&mut self) -> Option<&mut AdjustmentSession> {
        match &mut self.mode {
            Mode::Adjusting(session) => Some(session),
            _ => None,
        }
    }

    pub fn notification(&self) -> Option<bool> {
        match self.mode {
            Mode::Idle { notification } => Some(notification),
            _ => None,
        }
    }

    /// Apply a transition and return the mode now in force. Events that
    /// don't apply to the current mode leave it unchanged.
    pub fn request_transition(&mut self, event: ModeEvent) -> ModeKind {
        let before = self.kind();
        let next = match (&self.mode, event) {
            (Mode::Normal | Mode::Adjusting(_), ModeEvent::EnterAdjustment(session)) => {
                Some(Mode::Adjusting(session))
            }
            (Mode::Adjusting(_), ModeEvent::ExitAdjustment) => Some(Mode::Normal),
            (Mode::Normal, ModeEvent::Sleep(SleepReason::Manual)) => {
                Some(Mode::Idle { notification: false })
            }
            (Mode::Normal | Mode::Adjusting(_), ModeEvent::Sleep(SleepReason::Timeout)) => {
                Some(Mode::Idle { notification: false })
            }
            (Mode::Idle { .. }, ModeEvent::Wake(_)) => Some(Mode::Normal),
            (Mode::Idle { notification }, ModeEvent::SetNotification(flag)) => {
                (*notification != flag).then_some(Mode::Idle { notification: flag })
            }
            (_, event) => {
                debug!("Ignoring {:?} in {} mode", event, before);
                None
            }
        };

        if let Some(mode) = next {
            self.mode = mode;
            let after = self.kind();
            if after != before {
                info!("Mode {} → {}", before, after);
            }
            self.published.send_replace(after);
        }

        self.kind()
    }
}

impl Default for ModeCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
