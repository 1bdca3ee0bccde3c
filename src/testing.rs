//! Recording doubles for the device and the remote service

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use crate::colors::{Color, LedChannel, LedState};
use crate::device::{Device, PadEvent, EVENT_CHANNEL_CAPACITY};
use crate::pad::Pad;
use crate::remote::{EntityState, RemoteError, RemoteService, Snapshot};

/// Device that records every LED command
pub struct RecordingDevice {
    sent: Mutex<Vec<(Pad, LedState)>>,
    connected: AtomicBool,
    event_tx: Mutex<Option<mpsc::Sender<PadEvent>>>,
    event_rx: Mutex<Option<mpsc::Receiver<PadEvent>>>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
            event_tx: Mutex::new(None),
            event_rx: Mutex::new(None),
        }
    }

    pub fn sent(&self) -> Vec<(Pad, LedState)> {
        self.sent.lock().clone()
    }

    /// Return and forget everything sent so far
    pub fn take_sent(&self) -> Vec<(Pad, LedState)> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Last state sent to a pad
    pub fn last(&self, pad: Pad) -> Option<LedState> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|(p, _)| *p == pad)
            .map(|(_, state)| state.clone())
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Push an event into the stream handed out by `take_events`
    pub async fn inject(&self, event: PadEvent) {
        let tx = self.event_tx.lock().clone();
        if let Some(tx) = tx {
            tx.send(event).await.unwrap();
        }
    }
}

impl Device for RecordingDevice {
    fn open(&self) -> bool {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        *self.event_tx.lock() = Some(tx);
        *self.event_rx.lock() = Some(rx);
        self.connected.store(true, Ordering::SeqCst);
        true
    }

    fn send(&self, pad: Pad, color: &Color, channel: LedChannel) {
        self.sent
            .lock()
            .push((pad, LedState::new(color.clone(), channel)));
    }

    fn take_events(&self) -> Option<mpsc::Receiver<PadEvent>> {
        self.event_rx.lock().take()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.event_tx.lock().take();
        self.connected.store(false, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// One recorded `call_service`
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub entity_id: String,
    pub data: Value,
}

/// Remote service backed by an in-memory snapshot
pub struct MockRemote {
    states: Mutex<Snapshot>,
    calls: Mutex<Vec<ServiceCall>>,
    fail_calls: AtomicBool,
    fail_states: AtomicBool,
}

impl MockRemote {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(Snapshot::new()),
            calls: Mutex::new(Vec::new()),
            fail_calls: AtomicBool::new(false),
            fail_states: AtomicBool::new(false),
        }
    }

    pub fn set_state(&self, state: EntityState) {
        self.states.lock().insert(state.entity_id.clone(), state);
    }

    pub fn snapshot(&self) -> Snapshot {
        self.states.lock().clone()
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Make every `call_service` report failure
    pub fn fail_calls(&self, fail: bool) {
        self.fail_calls.store(fail, Ordering::SeqCst);
    }

    /// Make `get_all_states` fail as if the connection were down
    pub fn fail_states(&self, fail: bool) {
        self.fail_states.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteService for MockRemote {
    async fn get_all_states(&self) -> Result<Snapshot, RemoteError> {
        if self.fail_states.load(Ordering::SeqCst) {
            return Err(RemoteError::Closed);
        }
        Ok(self.snapshot())
    }

    async fn call_service(&self, domain: &str, service: &str, entity_id: &str, data: Value) -> bool {
        self.calls.lock().push(ServiceCall {
            domain: domain.to_string(),
            service: service.to_string(),
            entity_id: entity_id.to_string(),
            data,
        });
        !self.fail_calls.load(Ordering::SeqCst)
    }
}
