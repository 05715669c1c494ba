//! # Hardware Access Layer
//!
//! The two seams between the descriptor-table core and the processor:
//!
//! - [`PortIo`]: byte/word/double-word access to the I/O address space
//! - [`Cpu`]: the privileged table loads and the interrupt flag
//!
//! The real implementation lives in `arch::x86`; unit tests run the same
//! code against a recording mock.

use x86_64::structures::gdt::SegmentSelector;

/// Operand of `lgdt`/`lidt`.
///
/// The x86 backend packs this into the 6-byte pseudo-descriptor the
/// processor expects; `base` stays a `usize` so host tests can carry real
/// addresses around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorTablePointer {
    /// Size of the table in bytes, minus one.
    pub limit: u16,
    /// Linear address of the first entry.
    pub base: usize,
}

pub trait PortIo {
    fn read_u8(&self, port: u16) -> u8;
    fn write_u8(&self, port: u16, value: u8);

    fn read_u16(&self, port: u16) -> u16;
    fn write_u16(&self, port: u16, value: u16);

    fn read_u32(&self, port: u16) -> u32;
    fn write_u32(&self, port: u16, value: u32);

    /// Byte write followed by a short delay, for devices (the 8259s) that
    /// need time to settle between consecutive writes.
    fn write_u8_paced(&self, port: u16, value: u8) {
        self.write_u8(port, value);
    }
}

pub trait Cpu {
    /// # Safety
    ///
    /// `pointer` must describe a fully initialised table that lives for the
    /// rest of the kernel's life.
    unsafe fn load_gdt(&self, pointer: DescriptorTablePointer);

    /// # Safety
    ///
    /// Same contract as [`Cpu::load_gdt`], for the interrupt table.
    unsafe fn load_idt(&self, pointer: DescriptorTablePointer);

    /// # Safety
    ///
    /// Both selectors must index valid descriptors of the loaded GDT.
    unsafe fn reload_segments(&self, code: SegmentSelector, data: SegmentSelector);

    fn enable_interrupts(&self);
    fn disable_interrupts(&self);
    fn interrupts_enabled(&self) -> bool;
}

impl<T: PortIo + ?Sized> PortIo for &T {
    fn read_u8(&self, port: u16) -> u8 {
        (**self).read_u8(port)
    }

    fn write_u8(&self, port: u16, value: u8) {
        (**self).write_u8(port, value)
    }

    fn read_u16(&self, port: u16) -> u16 {
        (**self).read_u16(port)
    }

    fn write_u16(&self, port: u16, value: u16) {
        (**self).write_u16(port, value)
    }

    fn read_u32(&self, port: u16) -> u32 {
        (**self).read_u32(port)
    }

    fn write_u32(&self, port: u16, value: u32) {
        (**self).write_u32(port, value)
    }

    fn write_u8_paced(&self, port: u16, value: u8) {
        (**self).write_u8_paced(port, value)
    }
}

impl<T: Cpu + ?Sized> Cpu for &T {
    unsafe fn load_gdt(&self, pointer: DescriptorTablePointer) {
        (**self).load_gdt(pointer)
    }

    unsafe fn load_idt(&self, pointer: DescriptorTablePointer) {
        (**self).load_idt(pointer)
    }

    unsafe fn reload_segments(&self, code: SegmentSelector, data: SegmentSelector) {
        (**self).reload_segments(code, data)
    }

    fn enable_interrupts(&self) {
        (**self).enable_interrupts()
    }

    fn disable_interrupts(&self) {
        (**self).disable_interrupts()
    }

    fn interrupts_enabled(&self) -> bool {
        (**self).interrupts_enabled()
    }
}

/// Everything the interrupt core needs from the machine.
pub trait Platform: PortIo + Cpu + Sync {}

impl<T: PortIo + Cpu + Sync + ?Sized> Platform for T {}

/// Runs `f` with interrupts disabled, restoring the previous flag after.
pub fn without_interrupts<C: Cpu + ?Sized, R>(cpu: &C, f: impl FnOnce() -> R) -> R {
    let was_enabled = cpu.interrupts_enabled();
    if was_enabled {
        cpu.disable_interrupts();
    }

    let result = f();

    if was_enabled {
        cpu.enable_interrupts();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, MockPlatform};

    #[test]
    fn without_interrupts_restores_enabled_flag() {
        let platform = MockPlatform::new();
        platform.enable_interrupts();
        platform.clear_events();

        let value = without_interrupts(&platform, || {
            assert!(!platform.interrupts_enabled());
            7
        });

        assert_eq!(value, 7);
        assert!(platform.interrupts_enabled());
        assert_eq!(platform.events(), vec![Event::DisableInterrupts, Event::EnableInterrupts]);
    }

    #[test]
    fn without_interrupts_leaves_disabled_flag_alone() {
        let platform = MockPlatform::new();

        without_interrupts(&platform, || {});

        assert!(!platform.interrupts_enabled());
        assert!(platform.events().is_empty());
    }
}
