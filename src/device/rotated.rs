//! Rotation adapter
//!
//! Wraps a device mounted in a non-default orientation. Callers address pads
//! in logical coordinates; the adapter maps them to physical pads on the way
//! out and maps physical events back on the way in.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use super::{Device, PadEvent, EVENT_CHANNEL_CAPACITY};
use crate::colors::{Color, LedChannel};
use crate::pad::{Pad, Rotation};

pub struct RotatedDevice {
    inner: Arc<dyn Device>,
    rotation: Rotation,
}

impl RotatedDevice {
    pub fn new(inner: Arc<dyn Device>, rotation: Rotation) -> Self {
        Self { inner, rotation }
    }

    /// Physical pad -> logical pad
    pub fn to_logical(&self, pad: Pad) -> Pad {
        self.rotation.apply(pad)
    }

    /// Logical pad -> physical pad
    pub fn to_physical(&self, pad: Pad) -> Pad {
        self.rotation.inverse().apply(pad)
    }
}

impl Device for RotatedDevice {
    fn open(&self) -> bool {
        self.inner.open()
    }

    fn send(&self, pad: Pad, color: &Color, channel: LedChannel) {
        self.inner.send(self.to_physical(pad), color, channel);
    }

    /// Must be called from within a tokio runtime: events are rotated by a
    /// forwarding task that ends with the inner stream.
    fn take_events(&self) -> Option<mpsc::Receiver<PadEvent>> {
        let mut physical = self.inner.take_events()?;
        if self.rotation == Rotation::None {
            return Some(physical);
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let rotation = self.rotation;
        tokio::spawn(async move {
            while let Some(mut event) = physical.recv().await {
                event.pad = rotation.apply(event.pad);
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            debug!("Rotated event stream ended");
        });
        Some(rx)
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn close(&self) {
        self.inner.close();
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
