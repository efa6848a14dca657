//! `reflex-bot`: a runnable bot on top of the reflex pipeline.
//!
//! [`Bot`] wires config, adapters and a [`reflex_thoughts::Runtime`] and
//! owns their start/shutdown lifecycle. [`ShellAdapter`] talks to a
//! terminal; [`demo`] registers a few branches to try it with.

pub mod bot;
pub mod demo;
pub mod shell;

pub use bot::Bot;
pub use shell::ShellAdapter;
