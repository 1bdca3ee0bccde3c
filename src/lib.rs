//! Launchpad GW - drive Home Assistant from a Novation Launchpad
//!
//! Pads toggle entities, pad colors mirror entity state, and a few gestures
//! open a color/brightness picker, start an ambient light effect or put the
//! surface to sleep.

pub mod colors;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod midi;
pub mod pad;
pub mod remote;
pub mod runtime;

#[cfg(test)]
pub(crate) mod testing;
