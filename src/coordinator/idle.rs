//! Inactivity tracking and the idle display

use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::mode::ModeKind;
use super::renderer::LedRenderer;
use crate::colors::LedState;
use crate::pad::Pad;

pub struct IdleManager {
    last_activity: Instant,
    timeout: Duration,
    wake_pad: Pad,
}

impl IdleManager {
    pub fn new(timeout: Duration, wake_pad: Pad, now: Instant) -> Self {
        Self {
            last_activity: now,
            timeout,
            wake_pad,
        }
    }

    pub fn wake_pad(&self) -> Pad {
        self.wake_pad
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Reset the inactivity timer. Returns true if the surface was idle and
    /// should wake.
    pub fn register_activity(&mut self, now: Instant, mode: ModeKind) -> bool {
        self.last_activity = now;
        mode == ModeKind::Idle
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// True once the time since the last activity is strictly past the
    /// timeout and the surface isn't already idle
    pub fn check_timeout(&self, now: Instant, mode: ModeKind) -> bool {
        if mode == ModeKind::Idle {
            return false;
        }
        let elapsed = self.idle_for(now);
        if elapsed > self.timeout {
            info!("No activity for {:?}, going idle", elapsed);
            true
        } else {
            false
        }
    }

    /// Blank the surface except the wake pad
    pub fn enter_idle(&self, renderer: &mut LedRenderer, needs_attention: bool) {
        renderer.blank_except(Some(self.wake_pad));
        self.set_notification(renderer, needs_attention);
    }

    /// Recolor the wake pad without leaving idle
    pub fn set_notification(&self, renderer: &mut LedRenderer, needs_attention: bool) {
        if renderer.set_led(self.wake_pad, wake_state(needs_attention)) {
            debug!(attention = needs_attention, "Wake pad updated");
        }
    }
}

fn wake_state(needs_attention: bool) -> LedState {
    if needs_attention {
        LedState::steady("orange_1")
    } else {
        LedState::steady("green_2")
    }
}
