//! MIDI utilities and message types
//!
//! Provides parsing and encoding for the subset of MIDI the Launchpad speaks
//! in programmer mode: note on/off for grid pads, control change for the
//! round buttons, and SysEx for mode switching.

use std::fmt;

/// Novation SysEx header for the Launchpad Mini MK3
const NOVATION_HEADER: [u8; 5] = [0x00, 0x20, 0x29, 0x02, 0x0D];

/// MIDI message types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (0-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// System Exclusive payload without the F0/F7 framing
    SysEx { data: Vec<u8> },
}

/// A press or release decoded from an incoming message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonAction {
    pub note: u8,
    pub pressed: bool,
}

impl MidiMessage {
    /// Parse a MIDI message from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;

        // Running status is never used by the device
        if status < 0x80 {
            return None;
        }

        if status == 0xF0 {
            let end = data.iter().position(|&b| b == 0xF7)?;
            return Some(MidiMessage::SysEx {
                data: data[1..end].to_vec(),
            });
        }

        let channel = status & 0x0F;
        match status & 0xF0 {
            0x80 => {
                let [note, velocity, ..] = rest else { return None };
                Some(MidiMessage::NoteOff {
                    channel,
                    note: note & 0x7F,
                    velocity: velocity & 0x7F,
                })
            }
            0x90 => {
                // Note On with velocity 0 = Note Off
                let [note, velocity, ..] = rest else { return None };
                let (note, velocity) = (note & 0x7F, velocity & 0x7F);
                if velocity == 0 {
                    Some(MidiMessage::NoteOff { channel, note, velocity: 0 })
                } else {
                    Some(MidiMessage::NoteOn { channel, note, velocity })
                }
            }
            0xB0 => {
                let [cc, value, ..] = rest else { return None };
                Some(MidiMessage::ControlChange {
                    channel,
                    cc: cc & 0x7F,
                    value: value & 0x7F,
                })
            }
            _ => None,
        }
    }

    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                vec![0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                vec![0xB0 | (channel & 0x0F), cc & 0x7F, value & 0x7F]
            }
            MidiMessage::SysEx { ref data } => {
                let mut result = Vec::with_capacity(data.len() + 2);
                result.push(0xF0);
                result.extend_from_slice(data);
                result.push(0xF7);
                result
            }
        }
    }

    /// Interpret the message as a button press or release.
    ///
    /// Grid pads send notes; the top-row and side buttons send control
    /// changes with value 127 on press and 0 on release.
    pub fn button_action(&self) -> Option<ButtonAction> {
        match *self {
            MidiMessage::NoteOn { note, .. } => Some(ButtonAction { note, pressed: true }),
            MidiMessage::NoteOff { note, .. } => Some(ButtonAction { note, pressed: false }),
            MidiMessage::ControlChange { cc, value, .. } => Some(ButtonAction {
                note: cc,
                pressed: value > 0,
            }),
            MidiMessage::SysEx { .. } => None,
        }
    }

    /// LED message for a pad: the palette index travels in the velocity byte
    pub fn led(note: u8, velocity: u8, channel: u8) -> Self {
        MidiMessage::NoteOn {
            channel,
            note,
            velocity,
        }
    }

    /// SysEx switching the device into programmer mode
    pub fn programmer_mode() -> Self {
        let mut data = NOVATION_HEADER.to_vec();
        data.extend_from_slice(&[0x0E, 0x01]);
        MidiMessage::SysEx { data }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiMessage::SysEx { ref data } => {
                write!(f, "SysEx {} bytes", data.len())
            }
        }
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
