//! Mixing engine - sources, command queue, render pipeline
//!
//! This module contains the two halves of the mixer:
//! - Mixer: control-side handle (create/destroy sources, set parameters)
//! - MixEngine: render-side arena driven by the audio callback
//! - Command queue connecting the two, spilling into a backlog when full
//! - GC thread reclaiming memory released inside the callback

mod command;
mod control;
mod engine;
pub mod gc;
mod source;

pub use command::COMMAND_QUEUE_CAPACITY;
pub use control::*;
pub use engine::*;
pub use source::{channel_gains, SourceAtomics};
