//! Descriptor tables, interrupt controller and interrupt dispatch for a
//! small 32-bit x86 kernel.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod config;
pub mod drivers;
pub mod error;
pub mod hal;
pub mod interrupts;
pub mod kernel;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod logging;

#[cfg(test)]
mod testing;

pub use error::{ConfigError, KernelError};
