//! sidvm: a MOS6510 interpreter and frame scheduler for C64 SID tunes.
//!
//! [`player::Player`] owns a 64 KiB [`memory::Memory`] image, a
//! [`cpu::Cpu`] and a [`sid_device::SidChip`]. It runs the tune's init
//! and play routines and pulls audio out of the chip one frame at a time.

pub mod audio;
pub mod config;
pub mod cpu;
pub mod memory;
pub mod player;
pub mod sid_device;
pub mod sid_emulated;

pub use player::sid_file::{load_sid, SidFile, SidFileError};
pub use player::{EntryPoints, Player};
pub use sid_device::{ChipModel, NullSid, SidChip, SidClock};
