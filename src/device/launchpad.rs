//! Novation Launchpad driver
//!
//! Handles MIDI communication with the Launchpad in programmer mode.

use anyhow::{Context, Result};
use colored::*;
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::{Device, PadEvent, EVENT_CHANNEL_CAPACITY};
use crate::colors::{Color, LedChannel};
use crate::midi::{format_hex, MidiMessage};
use crate::pad::Pad;

const CLIENT_NAME: &str = "Launchpad-GW";

/// Open MIDI connections
struct Connection {
    input: MidiInputConnection<()>,
    output: MidiOutputConnection,
}

/// Launchpad driver for hardware communication
pub struct LaunchpadDevice {
    /// Port name pattern (case-insensitive substring)
    port_name: String,

    conn: Mutex<Option<Connection>>,

    /// Receiver handed out by `take_events`, created on open
    event_rx: Mutex<Option<mpsc::Receiver<PadEvent>>>,
}

impl LaunchpadDevice {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            conn: Mutex::new(None),
            event_rx: Mutex::new(None),
        }
    }

    /// List available MIDI input ports
    pub fn list_input_ports() -> Result<Vec<String>> {
        let midi_in = MidiInput::new("Launchpad-GW-Scanner")?;
        Ok(midi_in
            .ports()
            .iter()
            .filter_map(|port| midi_in.port_name(port).ok())
            .collect())
    }

    /// List available MIDI output ports
    pub fn list_output_ports() -> Result<Vec<String>> {
        let midi_out = MidiOutput::new("Launchpad-GW-Scanner")?;
        Ok(midi_out
            .ports()
            .iter()
            .filter_map(|port| midi_out.port_name(port).ok())
            .collect())
    }

    /// Find a port by case-insensitive substring match
    fn find_port<P>(
        ports: impl IntoIterator<Item = P>,
        name_of: impl Fn(&P) -> Option<String>,
        pattern: &str,
    ) -> Option<(P, String)> {
        let pattern = pattern.to_lowercase();
        ports.into_iter().find_map(|port| {
            let name = name_of(&port)?;
            if name.to_lowercase().contains(&pattern) {
                debug!("Found port '{}' matching pattern '{}'", name, pattern);
                Some((port, name))
            } else {
                None
            }
        })
    }

    fn connect(&self) -> Result<(Connection, mpsc::Receiver<PadEvent>)> {
        let midi_in = MidiInput::new(CLIENT_NAME).context("Failed to create MIDI input")?;
        let (in_port, in_name) = Self::find_port(
            midi_in.ports(),
            |port| midi_in.port_name(port).ok(),
            &self.port_name,
        )
        .ok_or_else(|| anyhow::anyhow!("Input port '{}' not found", self.port_name))?;

        let midi_out = MidiOutput::new(CLIENT_NAME).context("Failed to create MIDI output")?;
        let (out_port, out_name) = Self::find_port(
            midi_out.ports(),
            |port| midi_out.port_name(port).ok(),
            &self.port_name,
        )
        .ok_or_else(|| anyhow::anyhow!("Output port '{}' not found", self.port_name))?;

        info!("Connecting to input port: {}", in_name);

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let input = midi_in
            .connect(
                &in_port,
                CLIENT_NAME,
                move |_timestamp, data, _| {
                    let Some(message) = MidiMessage::parse(data) else {
                        debug!("Failed to parse MIDI: {}", format_hex(data));
                        return;
                    };
                    let Some(action) = message.button_action() else {
                        return;
                    };
                    let event = PadEvent {
                        pad: Pad::new(action.note),
                        pressed: action.pressed,
                        at: Instant::now(),
                    };
                    // Never block the MIDI thread; drop the event if the runtime lags
                    if event_tx.try_send(event).is_err() {
                        warn!("Dropped pad event {:?}: channel full or closed", event);
                    }
                },
                (),
            )
            .map_err(|e| anyhow::anyhow!("Failed to connect to input port: {}", e))?;

        info!("Connecting to output port: {}", out_name);

        let output = midi_out
            .connect(&out_port, CLIENT_NAME)
            .map_err(|e| anyhow::anyhow!("Failed to connect to output port: {}", e))?;

        Ok((Connection { input, output }, event_rx))
    }

    fn send_message(&self, message: &MidiMessage) {
        let mut guard = self.conn.lock();
        let Some(conn) = guard.as_mut() else {
            trace!("Send skipped, not connected: {}", message);
            return;
        };

        let data = message.encode();
        match conn.output.send(&data) {
            Ok(()) => trace!("Sent: {} | {}", format_hex(&data), message),
            Err(e) => warn!("Failed to send MIDI message {}: {}", message, e),
        }
    }

    /// True if the configured port is still enumerated by the MIDI backend
    fn port_present(&self) -> bool {
        let Ok(midi_in) = MidiInput::new("Launchpad-GW-Probe") else {
            return false;
        };
        Self::find_port(
            midi_in.ports(),
            |port| midi_in.port_name(port).ok(),
            &self.port_name,
        )
        .is_some()
    }
}

impl Device for LaunchpadDevice {
    fn open(&self) -> bool {
        self.close();

        info!("Connecting to Launchpad '{}'", self.port_name);
        match self.connect() {
            Ok((conn, event_rx)) => {
                *self.conn.lock() = Some(conn);
                *self.event_rx.lock() = Some(event_rx);

                // Best-effort: the device may already be in programmer mode
                self.send_message(&MidiMessage::programmer_mode());
                info!("Launchpad connected");
                true
            }
            Err(e) => {
                warn!("Failed to open Launchpad: {:#}", e);
                false
            }
        }
    }

    fn send(&self, pad: Pad, color: &Color, channel: LedChannel) {
        let message = MidiMessage::led(pad.note(), color.velocity(), channel.midi_channel());
        self.send_message(&message);
    }

    fn take_events(&self) -> Option<mpsc::Receiver<PadEvent>> {
        self.event_rx.lock().take()
    }

    fn is_connected(&self) -> bool {
        self.conn.lock().is_some() && self.port_present()
    }

    fn close(&self) {
        if let Some(conn) = self.conn.lock().take() {
            // Dropping the input connection drops the callback and its sender,
            // which ends the event stream
            conn.input.close();
            conn.output.close();
            info!("Launchpad disconnected");
        }
    }

    fn name(&self) -> &str {
        &self.port_name
    }
}

/// Print available MIDI ports, highlighting the ones matching `pattern`
pub fn list_ports_formatted(pattern: &str) {
    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());

    let needle = pattern.to_lowercase();
    for (title, ports) in [
        ("Input Ports:", LaunchpadDevice::list_input_ports()),
        ("Output Ports:", LaunchpadDevice::list_output_ports()),
    ] {
        println!("\n{}", title.bold());
        match ports {
            Ok(ports) if ports.is_empty() => println!("  {}", "No ports found".dimmed()),
            Ok(ports) => {
                for name in ports {
                    if name.to_lowercase().contains(&needle) {
                        println!("  {} {}", "[MATCH]".green(), name.bright_white());
                    } else {
                        println!("  {}", name);
                    }
                }
            }
            Err(e) => println!("  {} {}", "[ERROR]".red(), e),
        }
    }

    println!();
}
