//! # Interrupt Descriptor Table
//!
//! 256 eight-byte interrupt gates, one per vector. Every gate starts out
//! pointing at the ignore stub; vectors with a dispatch stub (the PIC
//! lines) are then pointed at that stub instead.
//!
//! ## Gate layout
//!
//! ```text
//! byte 0..2  handler address bits 0..16
//! byte 2..4  code segment selector
//! byte 4     reserved, zero
//! byte 5     present | dpl << 5 | gate kind
//! byte 6..8  handler address bits 16..32
//! ```
//!
//! The table must be complete before `lidt`: the processor reads gates
//! straight out of memory the moment a vector fires.

use core::mem::size_of;

use spin::Once;
use x86_64::{structures::gdt::SegmentSelector, PrivilegeLevel};

use crate::hal::{Cpu, DescriptorTablePointer};

pub const GATE_COUNT: usize = 256;

const GATE_PRESENT: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GateKind {
    /// Clears IF on entry.
    Interrupt = 0xE,
    /// Leaves IF untouched.
    Trap = 0xF,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct GateDescriptor([u8; 8]);

impl GateDescriptor {
    pub const fn new(
        handler: u32,
        selector: SegmentSelector,
        privilege: PrivilegeLevel,
        kind: GateKind,
    ) -> Self {
        let access = GATE_PRESENT | ((privilege as u8) & 0b11) << 5 | kind as u8;
        Self([
            handler as u8,
            (handler >> 8) as u8,
            selector.0 as u8,
            (selector.0 >> 8) as u8,
            0,
            access,
            (handler >> 16) as u8,
            (handler >> 24) as u8,
        ])
    }

    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    pub const fn handler_address(&self) -> u32 {
        let low = self.0[0] as u32 | (self.0[1] as u32) << 8;
        let high = self.0[6] as u32 | (self.0[7] as u32) << 8;
        high << 16 | low
    }

    pub const fn selector(&self) -> SegmentSelector {
        SegmentSelector(self.0[2] as u16 | (self.0[3] as u16) << 8)
    }

    pub const fn is_present(&self) -> bool {
        self.0[5] & GATE_PRESENT != 0
    }

    pub const fn privilege_level(&self) -> PrivilegeLevel {
        match (self.0[5] >> 5) & 0b11 {
            0 => PrivilegeLevel::Ring0,
            1 => PrivilegeLevel::Ring1,
            2 => PrivilegeLevel::Ring2,
            _ => PrivilegeLevel::Ring3,
        }
    }

    pub const fn kind(&self) -> Option<GateKind> {
        match self.0[5] & 0xF {
            0xE => Some(GateKind::Interrupt),
            0xF => Some(GateKind::Trap),
            _ => None,
        }
    }
}

/// Addresses of the assembly entry stubs a table is built from.
pub trait Trampolines {
    /// Stub that returns straight away; used for every vector without its own entry.
    fn ignore(&self) -> u32;

    /// Dispatch stub for `vector`, if one exists.
    fn entry(&self, vector: u8) -> Option<u32>;
}

#[repr(C, align(8))]
pub struct InterruptDescriptorTable {
    gates: [GateDescriptor; GATE_COUNT],
}

impl InterruptDescriptorTable {
    pub fn build<T: Trampolines + ?Sized>(code_selector: SegmentSelector, trampolines: &T) -> Self {
        let ignore = GateDescriptor::new(
            trampolines.ignore(),
            code_selector,
            PrivilegeLevel::Ring0,
            GateKind::Interrupt,
        );
        let mut gates = [ignore; GATE_COUNT];

        for (vector, gate) in (0..=u8::MAX).zip(gates.iter_mut()) {
            if let Some(entry) = trampolines.entry(vector) {
                *gate = GateDescriptor::new(entry, code_selector, PrivilegeLevel::Ring0, GateKind::Interrupt);
            }
        }

        Self { gates }
    }

    pub fn gate(&self, vector: u8) -> &GateDescriptor {
        &self.gates[usize::from(vector)]
    }

    pub fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: (GATE_COUNT * size_of::<GateDescriptor>() - 1) as u16,
            base: self as *const Self as usize,
        }
    }

    pub fn load<C: Cpu + ?Sized>(&'static self, cpu: &C) {
        let pointer = self.pointer();
        log::debug!("lidt base={:#x} limit={:#x}", pointer.base, pointer.limit);

        // SAFETY: every gate was written by `build` and the table is 'static.
        unsafe { cpu.load_idt(pointer) };
    }
}

/// Builds the table into `cell` and loads it. Only the first call loads.
pub fn install<C: Cpu + ?Sized, T: Trampolines + ?Sized>(
    cell: &'static Once<InterruptDescriptorTable>,
    cpu: &C,
    code_selector: SegmentSelector,
    trampolines: &T,
) -> &'static InterruptDescriptorTable {
    let mut built = false;
    let idt = cell.call_once(|| {
        built = true;
        InterruptDescriptorTable::build(code_selector, trampolines)
    });

    if built {
        idt.load(cpu);
    }
    idt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupts::gdt::SegmentSlot;
    use crate::testing::{leak, Event, MockPlatform};

    const IGNORE: u32 = 0x0010_0000;
    const TIMER_STUB: u32 = 0x0010_2040;
    const KEYBOARD_STUB: u32 = 0xC010_2080;

    struct Stubs;

    impl Trampolines for Stubs {
        fn ignore(&self) -> u32 {
            IGNORE
        }

        fn entry(&self, vector: u8) -> Option<u32> {
            match vector {
                0x20 => Some(TIMER_STUB),
                0x21 => Some(KEYBOARD_STUB),
                _ => None,
            }
        }
    }

    #[test]
    fn gate_layout() {
        let gate = GateDescriptor::new(
            0xDEAD_BEEF,
            SegmentSlot::Code.selector(),
            PrivilegeLevel::Ring0,
            GateKind::Interrupt,
        );

        assert_eq!(gate.as_bytes(), &[0xEF, 0xBE, 0x08, 0x00, 0x00, 0x8E, 0xAD, 0xDE]);
        assert!(gate.is_present());
        assert_eq!(gate.kind(), Some(GateKind::Interrupt));
    }

    #[test]
    fn trap_gate_with_user_privilege() {
        let gate = GateDescriptor::new(0, SegmentSelector(0x08), PrivilegeLevel::Ring3, GateKind::Trap);

        assert_eq!(gate.as_bytes()[5], 0xEF);
        assert_eq!(gate.privilege_level(), PrivilegeLevel::Ring3);
        assert_eq!(gate.kind(), Some(GateKind::Trap));
    }

    #[test]
    fn handler_address_halves_reassemble() {
        let addresses = [0, 1, 0xFFFF, 0x1_0000, 0x0012_3456, 0x8000_0001, 0xFFFF_0000, u32::MAX];

        for address in addresses.into_iter().chain((0..u32::MAX).step_by(0x0101_0101)) {
            let gate = GateDescriptor::new(address, SegmentSelector(0x08), PrivilegeLevel::Ring0, GateKind::Interrupt);
            assert_eq!(gate.handler_address(), address);
            assert_eq!(gate.as_bytes()[4], 0, "reserved byte must stay zero");
        }
    }

    #[test]
    fn build_points_everything_at_ignore_except_stubs() {
        let idt = InterruptDescriptorTable::build(SegmentSlot::Code.selector(), &Stubs);

        assert_eq!(idt.gate(0x20).handler_address(), TIMER_STUB);
        assert_eq!(idt.gate(0x21).handler_address(), KEYBOARD_STUB);

        for vector in (0..=u8::MAX).filter(|v| !matches!(v, 0x20 | 0x21)) {
            assert_eq!(idt.gate(vector).handler_address(), IGNORE, "vector {vector:#04x}");
        }

        for vector in 0..=u8::MAX {
            let gate = idt.gate(vector);
            assert_eq!(gate.selector().0, 0x08);
            assert_eq!(gate.privilege_level(), PrivilegeLevel::Ring0);
            assert_eq!(gate.kind(), Some(GateKind::Interrupt));
        }
    }

    #[test]
    fn load_uses_full_table_limit() {
        let platform = MockPlatform::new();
        let idt = leak(InterruptDescriptorTable::build(SegmentSelector(0x08), &Stubs));

        idt.load(&platform);

        assert_eq!(size_of::<InterruptDescriptorTable>(), 2048);
        assert_eq!(
            platform.events(),
            vec![Event::LoadIdt(DescriptorTablePointer {
                limit: 256 * 8 - 1,
                base: idt as *const InterruptDescriptorTable as usize,
            })]
        );
    }

    #[test]
    fn install_loads_only_once() {
        let platform = MockPlatform::new();
        let cell = leak(Once::new());

        install(cell, &platform, SegmentSelector(0x08), &Stubs);
        install(cell, &platform, SegmentSelector(0x08), &Stubs);

        assert_eq!(platform.events().len(), 1);
    }
}
