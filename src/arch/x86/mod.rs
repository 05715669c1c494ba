//! # x86 (32-bit protected mode) backend
//!
//! [`X86`] is the real [`Platform`](crate::hal::Platform): port I/O with
//! `in`/`out`, the table loads, the segment reload and the interrupt flag.

pub mod entry;

use core::arch::asm;

use x86_64::structures::gdt::SegmentSelector;

use crate::hal::{Cpu, DescriptorTablePointer, PortIo};

pub use entry::{bind_router, X86Trampolines};

const FLAGS_INTERRUPT_ENABLE: u32 = 1 << 9;

/// 6-byte operand of `lgdt`/`lidt`.
#[repr(C, packed(2))]
struct PseudoDescriptor {
    limit: u16,
    base: u32,
}

impl From<DescriptorTablePointer> for PseudoDescriptor {
    fn from(pointer: DescriptorTablePointer) -> Self {
        Self {
            limit: pointer.limit,
            base: pointer.base as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct X86;

impl PortIo for X86 {
    fn read_u8(&self, port: u16) -> u8 {
        let value: u8;
        unsafe { asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags)) };
        value
    }

    fn write_u8(&self, port: u16, value: u8) {
        unsafe { asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags)) };
    }

    fn read_u16(&self, port: u16) -> u16 {
        let value: u16;
        unsafe { asm!("in ax, dx", out("ax") value, in("dx") port, options(nomem, nostack, preserves_flags)) };
        value
    }

    fn write_u16(&self, port: u16, value: u16) {
        unsafe { asm!("out dx, ax", in("dx") port, in("ax") value, options(nomem, nostack, preserves_flags)) };
    }

    fn read_u32(&self, port: u16) -> u32 {
        let value: u32;
        unsafe { asm!("in eax, dx", out("eax") value, in("dx") port, options(nomem, nostack, preserves_flags)) };
        value
    }

    fn write_u32(&self, port: u16, value: u32) {
        unsafe { asm!("out dx, eax", in("dx") port, in("eax") value, options(nomem, nostack, preserves_flags)) };
    }

    fn write_u8_paced(&self, port: u16, value: u8) {
        self.write_u8(port, value);
        // Two short jumps: enough bus time for an 8259 between writes.
        unsafe { asm!("jmp 2f", "2:", "jmp 3f", "3:", options(nomem, nostack, preserves_flags)) };
    }
}

impl Cpu for X86 {
    unsafe fn load_gdt(&self, pointer: DescriptorTablePointer) {
        let descriptor = PseudoDescriptor::from(pointer);
        asm!("lgdt [{}]", in(reg) &descriptor, options(readonly, nostack, preserves_flags));
    }

    unsafe fn load_idt(&self, pointer: DescriptorTablePointer) {
        let descriptor = PseudoDescriptor::from(pointer);
        asm!("lidt [{}]", in(reg) &descriptor, options(readonly, nostack, preserves_flags));
    }

    unsafe fn reload_segments(&self, code: SegmentSelector, data: SegmentSelector) {
        // CS can only be reloaded by a far transfer: return to the next
        // instruction through the new code selector.
        asm!(
            "push {code}",
            "lea {target}, [2f]",
            "push {target}",
            "retf",
            "2:",
            "mov ds, {data:x}",
            "mov es, {data:x}",
            "mov fs, {data:x}",
            "mov gs, {data:x}",
            "mov ss, {data:x}",
            code = in(reg) u32::from(code.0),
            data = in(reg) u32::from(data.0),
            target = out(reg) _,
            options(preserves_flags),
        );
    }

    fn enable_interrupts(&self) {
        unsafe { asm!("sti", options(nomem, nostack)) };
    }

    fn disable_interrupts(&self) {
        unsafe { asm!("cli", options(nomem, nostack)) };
    }

    fn interrupts_enabled(&self) -> bool {
        let flags: u32;
        unsafe { asm!("pushfd", "pop {}", out(reg) flags, options(nomem, preserves_flags)) };
        flags & FLAGS_INTERRUPT_ENABLE != 0
    }
}

pub fn halt() {
    unsafe { asm!("hlt", options(nomem, nostack, preserves_flags)) };
}

/// Sleeps until the next interrupt, forever.
pub fn halt_loop() -> ! {
    loop {
        halt();
    }
}
