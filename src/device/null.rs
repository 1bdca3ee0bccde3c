//! Device that accepts everything and never produces events
//!
//! Used with `--mock-device` to run the gateway without hardware.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{Device, PadEvent, EVENT_CHANNEL_CAPACITY};
use crate::colors::{Color, LedChannel};
use crate::pad::Pad;

pub struct NullDevice {
    open: AtomicBool,
    /// Held so the event stream stays open until `close`
    event_tx: Mutex<Option<mpsc::Sender<PadEvent>>>,
    event_rx: Mutex<Option<mpsc::Receiver<PadEvent>>>,
}

impl NullDevice {
    pub fn new() -> Self {
        Self {
            open: AtomicBool::new(false),
            event_tx: Mutex::new(None),
            event_rx: Mutex::new(None),
        }
    }
}

impl Default for NullDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for NullDevice {
    fn open(&self) -> bool {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        *self.event_tx.lock() = Some(tx);
        *self.event_rx.lock() = Some(rx);
        self.open.store(true, Ordering::SeqCst);
        info!("Mock device opened");
        true
    }

    fn send(&self, pad: Pad, color: &Color, channel: LedChannel) {
        debug!(%pad, %color, ?channel, "mock LED");
    }

    fn take_events(&self) -> Option<mpsc::Receiver<PadEvent>> {
        self.event_rx.lock().take()
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.event_tx.lock().take();
        if self.open.swap(false, Ordering::SeqCst) {
            info!("Mock device closed");
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
