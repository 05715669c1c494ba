//! # Interrupt Handling Module
//!
//! The processor-facing tables and the path an interrupt takes through the
//! kernel:
//!
//! - **GDT**: flat null/code/data/unused segment table
//! - **IDT**: 256 interrupt gates, defaulting to the ignore stub
//! - **PIC**: 8259 remapping, masking and EOI
//! - **Dispatch**: handler registry, active-manager routing, diagnostics
//! - **Timer**: tick counting on IRQ0
//!
//! ## Interrupt Vector Layout
//!
//! | Vector    | Type               | Gate target                 |
//! |-----------|--------------------|-----------------------------|
//! | 0x00-0x1F | CPU exceptions     | ignore stub                 |
//! | 0x20      | Timer (IRQ0)       | dispatch stub, quiet        |
//! | 0x21      | Keyboard (IRQ1)    | dispatch stub               |
//! | 0x22-0x2F | IRQ2-15            | dispatch stub               |
//! | 0x30-0xFF | unused             | ignore stub                 |
//!
//! ## Usage
//!
//! ```ignore
//! let gdt = gdt::install(&GDT, &platform, config.segment_limit);
//! idt::install(&IDT, &platform, gdt.code_selector(), &trampolines);
//! config.pic.chained_pics().remap(&platform, config.pic.mask.enabled_lines());
//! manager.activate(&ROUTER);
//! ```

pub mod dispatch;
pub mod gdt;
pub mod idt;
pub mod pic;
pub mod timer;

pub use dispatch::{InterruptHandler, InterruptManager, InterruptRouter, Registration};
pub use gdt::GlobalDescriptorTable;
pub use idt::{InterruptDescriptorTable, Trampolines};
pub use pic::{ChainedPics, IrqLines};
pub use timer::TickCounter;
