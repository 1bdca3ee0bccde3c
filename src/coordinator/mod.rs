//! Mode coordination
//!
//! Everything that decides what the surface shows and what a pad press
//! does lives here, owned by a single actor task ([`Coordinator`]) and
//! driven through a [`CoordinatorHandle`].

pub mod adjustment;
pub mod ambient;
pub mod idle;
pub mod input;
pub mod mode;
pub mod renderer;

mod actor;
mod commands;
mod handle;


pub use actor::{Coordinator, CoordinatorOutputs};
pub use adjustment::{AdjustmentSession, SelectionOutcome};
pub use commands::{CoordinatorCommand, CoordinatorSignal};
pub use handle::CoordinatorHandle;
pub use mode::{Mode, ModeCoordinator, ModeEvent, ModeKind, SleepReason, WakeReason};
pub use renderer::{LedRenderer, RenderReport};
