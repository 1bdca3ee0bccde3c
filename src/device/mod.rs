//! Control surface transport
//!
//! The coordinator talks to the surface through the [`Device`] trait. Sends
//! are best-effort: failures are logged by the implementation and never
//! reach the caller.

pub mod launchpad;
pub mod null;
pub mod rotated;

use std::time::Instant;
use tokio::sync::mpsc;

use crate::colors::{Color, LedChannel};
use crate::pad::Pad;

pub use launchpad::LaunchpadDevice;
pub use null::NullDevice;
pub use rotated::RotatedDevice;

/// Capacity of the event channel between the MIDI callback and the runtime
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A press or release reported by the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadEvent {
    pub pad: Pad,
    pub pressed: bool,
    pub at: Instant,
}

impl PadEvent {
    pub fn press(pad: Pad) -> Self {
        Self {
            pad,
            pressed: true,
            at: Instant::now(),
        }
    }

    pub fn release(pad: Pad) -> Self {
        Self {
            pad,
            pressed: false,
            at: Instant::now(),
        }
    }
}

/// Transport to a grid control surface
///
/// Implementations use interior mutability so the device can be shared
/// between the coordinator (sends) and the liveness checker.
pub trait Device: Send + Sync {
    /// Open the connection. Returns false if the device could not be opened.
    fn open(&self) -> bool;

    /// Set one LED. An off color blanks the pad.
    fn send(&self, pad: Pad, color: &Color, channel: LedChannel);

    /// Take the event stream. Only the first call returns a receiver; the
    /// stream ends when the connection is closed.
    fn take_events(&self) -> Option<mpsc::Receiver<PadEvent>>;

    fn is_connected(&self) -> bool;

    /// Release the connection. Safe to call more than once.
    fn close(&self);

    /// Human readable name for logs
    fn name(&self) -> &str;
}
