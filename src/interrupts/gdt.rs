//! # Global Descriptor Table
//!
//! Four flat segments, built once at boot and never touched again:
//!
//! | Slot | Selector | Base | Limit         | Access |
//! |------|----------|------|---------------|--------|
//! | 0    | 0x00     | 0    | 0             | null   |
//! | 1    | 0x08     | 0    | 64 MiB        | 0x9A   |
//! | 2    | 0x10     | 0    | 64 MiB        | 0x92   |
//! | 3    | 0x18     | 0    | 0             | unused |
//!
//! ## Descriptor layout
//!
//! ```text
//! byte  0..2  limit bits 0..16
//! byte  2..4  base bits 0..16
//! byte  4     base bits 16..24
//! byte  5     access
//! byte  6     flags (high nibble) | limit bits 16..20 (low nibble)
//! byte  7     base bits 24..32
//! ```
//!
//! Limits above 64 KiB are stored in 4 KiB pages. The processor treats the
//! low 12 bits of a page-granular limit as all ones, so decoding such a
//! descriptor yields `(pages << 12) | 0xFFF`: up to 4095 bytes of the
//! requested limit can be lost in the round trip. That loss is expected.

use core::mem::size_of;

use bitflags::bitflags;
use spin::Once;
use x86_64::{structures::gdt::SegmentSelector, PrivilegeLevel};

use crate::hal::{Cpu, DescriptorTablePointer};

/// Largest limit stored with byte granularity.
pub const BYTE_GRANULAR_MAX: u32 = 64 * 1024;

const FLAG_SIZE_32: u8 = 0x40;
const FLAG_PAGE_GRANULAR: u8 = 0x80;
const PAGE_SHIFT: u32 = 12;
const PAGE_MASK: u32 = 0xFFF;

bitflags! {
    /// Access byte of a segment descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SegmentAccess: u8 {
        const ACCESSED = 1 << 0;
        const READ_WRITE = 1 << 1;
        const DIRECTION_CONFORMING = 1 << 2;
        const EXECUTABLE = 1 << 3;
        /// Code/data segment rather than a system descriptor.
        const DESCRIPTOR = 1 << 4;
        const DPL_LOW = 1 << 5;
        const DPL_HIGH = 1 << 6;
        const PRESENT = 1 << 7;

        /// 0x9A
        const KERNEL_CODE = Self::PRESENT.bits()
            | Self::DESCRIPTOR.bits()
            | Self::EXECUTABLE.bits()
            | Self::READ_WRITE.bits();
        /// 0x92
        const KERNEL_DATA = Self::PRESENT.bits()
            | Self::DESCRIPTOR.bits()
            | Self::READ_WRITE.bits();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct SegmentDescriptor([u8; 8]);

impl SegmentDescriptor {
    pub const fn encode(base: u32, limit: u32, access: u8) -> Self {
        let (limit, flags) = if limit <= BYTE_GRANULAR_MAX {
            (limit, FLAG_SIZE_32)
        } else if limit & PAGE_MASK != PAGE_MASK {
            // Rounding up would reach into the next segment; give up the partial page instead.
            ((limit >> PAGE_SHIFT) - 1, FLAG_SIZE_32 | FLAG_PAGE_GRANULAR)
        } else {
            (limit >> PAGE_SHIFT, FLAG_SIZE_32 | FLAG_PAGE_GRANULAR)
        };
        debug_assert!(limit <= 0xF_FFFF);

        Self([
            limit as u8,
            (limit >> 8) as u8,
            base as u8,
            (base >> 8) as u8,
            (base >> 16) as u8,
            access,
            flags | ((limit >> 16) & 0xF) as u8,
            (base >> 24) as u8,
        ])
    }

    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    pub const fn base(&self) -> u32 {
        let b = &self.0;
        b[2] as u32 | (b[3] as u32) << 8 | (b[4] as u32) << 16 | (b[7] as u32) << 24
    }

    /// Effective limit in bytes. Lossy for page-granular descriptors, see the module docs.
    pub const fn limit(&self) -> u32 {
        let b = &self.0;
        let raw = b[0] as u32 | (b[1] as u32) << 8 | ((b[6] & 0xF) as u32) << 16;
        if self.is_page_granular() {
            (raw << PAGE_SHIFT) | PAGE_MASK
        } else {
            raw
        }
    }

    pub const fn is_page_granular(&self) -> bool {
        let both = FLAG_SIZE_32 | FLAG_PAGE_GRANULAR;
        self.0[6] & both == both
    }

    pub const fn access(&self) -> SegmentAccess {
        SegmentAccess::from_bits_retain(self.0[5])
    }
}

/// The fixed slots of the table. Selectors are derived from the slot
/// index, never from addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SegmentSlot {
    Null = 0,
    Code = 1,
    Data = 2,
    Unused = 3,
}

impl SegmentSlot {
    pub const ALL: [SegmentSlot; 4] = [Self::Null, Self::Code, Self::Data, Self::Unused];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn byte_offset(self) -> u16 {
        self as u16 * size_of::<SegmentDescriptor>() as u16
    }

    pub const fn selector(self) -> SegmentSelector {
        SegmentSelector::new(self as u16, PrivilegeLevel::Ring0)
    }
}

#[repr(C, align(8))]
pub struct GlobalDescriptorTable {
    entries: [SegmentDescriptor; 4],
}

impl GlobalDescriptorTable {
    pub const fn new(segment_limit: u32) -> Self {
        Self {
            entries: [
                SegmentDescriptor::encode(0, 0, 0),
                SegmentDescriptor::encode(0, segment_limit, SegmentAccess::KERNEL_CODE.bits()),
                SegmentDescriptor::encode(0, segment_limit, SegmentAccess::KERNEL_DATA.bits()),
                SegmentDescriptor::encode(0, 0, 0),
            ],
        }
    }

    pub const fn entry(&self, slot: SegmentSlot) -> &SegmentDescriptor {
        &self.entries[slot.index()]
    }

    pub const fn code_selector(&self) -> SegmentSelector {
        SegmentSlot::Code.selector()
    }

    pub const fn data_selector(&self) -> SegmentSelector {
        SegmentSlot::Data.selector()
    }

    pub fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: (size_of::<Self>() - 1) as u16,
            base: self as *const Self as usize,
        }
    }

    /// Hands the table to the processor and reloads every segment register.
    pub fn load<C: Cpu + ?Sized>(&'static self, cpu: &C) {
        let pointer = self.pointer();
        log::debug!("lgdt base={:#x} limit={:#x}", pointer.base, pointer.limit);

        // SAFETY: the table is 'static and fully built; both selectors index it.
        unsafe {
            cpu.load_gdt(pointer);
            cpu.reload_segments(self.code_selector(), self.data_selector());
        }
    }
}

/// Builds the table into `cell` and loads it. Only the first call loads.
pub fn install<C: Cpu + ?Sized>(
    cell: &'static Once<GlobalDescriptorTable>,
    cpu: &C,
    segment_limit: u32,
) -> &'static GlobalDescriptorTable {
    let mut built = false;
    let gdt = cell.call_once(|| {
        built = true;
        GlobalDescriptorTable::new(segment_limit)
    });

    if built {
        gdt.load(cpu);
    }
    gdt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{leak, Event, MockPlatform};

    const MIB_64: u32 = 64 * 1024 * 1024;

    #[test]
    fn byte_granular_layout() {
        let descriptor = SegmentDescriptor::encode(0x1234_5678, 0xFFFF, 0x92);

        assert_eq!(
            descriptor.as_bytes(),
            &[0xFF, 0xFF, 0x78, 0x56, 0x34, 0x92, 0x40, 0x12]
        );
        assert!(!descriptor.is_page_granular());
        assert_eq!(descriptor.base(), 0x1234_5678);
        assert_eq!(descriptor.limit(), 0xFFFF);
    }

    #[test]
    fn limit_at_boundary_stays_byte_granular() {
        let descriptor = SegmentDescriptor::encode(0, BYTE_GRANULAR_MAX, 0x9A);

        assert!(!descriptor.is_page_granular());
        assert_eq!(descriptor.limit(), BYTE_GRANULAR_MAX);
        assert_eq!(descriptor.as_bytes()[6], 0x41);
    }

    #[test]
    fn partial_page_is_dropped() {
        let descriptor = SegmentDescriptor::encode(0, MIB_64, 0x9A);

        assert!(descriptor.is_page_granular());
        // 0x4000 pages requested, low bits not all ones: 0x3FFF stored.
        assert_eq!(descriptor.as_bytes()[0..2], [0xFF, 0x3F]);
        assert_eq!(descriptor.as_bytes()[6], 0xC0);
        assert_eq!(descriptor.limit(), MIB_64 - 1);
    }

    #[test]
    fn full_page_limit_is_exact() {
        let descriptor = SegmentDescriptor::encode(0, 0xF_FFFF, 0x92);

        assert!(descriptor.is_page_granular());
        assert_eq!(descriptor.limit(), 0xF_FFFF);
    }

    #[test]
    fn round_trip_follows_documented_rounding() {
        let bases = [0, 1, 0xB8000, 0x00FF_FF00, 0x8000_0000, u32::MAX];

        for &base in &bases {
            for limit in (0..=0xF_FFFFu32).step_by(4093).chain([BYTE_GRANULAR_MAX, BYTE_GRANULAR_MAX + 1]) {
                let descriptor = SegmentDescriptor::encode(base, limit, 0x92);
                assert_eq!(descriptor.base(), base);

                if limit <= BYTE_GRANULAR_MAX {
                    assert_eq!(descriptor.limit(), limit);
                } else {
                    let stored = if limit & 0xFFF != 0xFFF { (limit >> 12) - 1 } else { limit >> 12 };
                    assert_eq!(descriptor.limit(), (stored << 12) | 0xFFF);
                    assert!(descriptor.limit() <= limit | 0xFFF);
                }
            }
        }
    }

    #[test]
    fn slots_map_to_byte_offsets() {
        assert_eq!(SegmentSlot::Null.selector().0, 0x00);
        assert_eq!(SegmentSlot::Code.selector().0, 0x08);
        assert_eq!(SegmentSlot::Data.selector().0, 0x10);
        assert_eq!(SegmentSlot::Unused.byte_offset(), 0x18);

        for slot in SegmentSlot::ALL {
            assert_eq!(slot.selector().0, slot.byte_offset());
        }
    }

    #[test]
    fn kernel_table_contents() {
        let gdt = GlobalDescriptorTable::new(MIB_64);

        let code = gdt.entry(SegmentSlot::Code);
        assert_eq!(code.access(), SegmentAccess::KERNEL_CODE);
        assert_eq!(code.access().bits(), 0x9A);
        assert_eq!(code.base(), 0);
        assert_eq!(code.limit(), MIB_64 - 1);

        let data = gdt.entry(SegmentSlot::Data);
        assert_eq!(data.access().bits(), 0x92);
        assert_eq!(data.limit(), MIB_64 - 1);

        assert_eq!(gdt.entry(SegmentSlot::Null).access(), SegmentAccess::empty());
        assert_eq!(gdt.entry(SegmentSlot::Unused).limit(), 0);
        assert_eq!(size_of::<GlobalDescriptorTable>(), 32);
    }

    #[test]
    fn load_issues_lgdt_then_segment_reload() {
        let platform = MockPlatform::new();
        let gdt = leak(GlobalDescriptorTable::new(MIB_64));

        gdt.load(&platform);

        assert_eq!(
            platform.events(),
            vec![
                Event::LoadGdt(DescriptorTablePointer {
                    limit: 31,
                    base: gdt as *const GlobalDescriptorTable as usize,
                }),
                Event::ReloadSegments { code: 0x08, data: 0x10 },
            ]
        );
    }

    #[test]
    fn install_loads_only_once() {
        let platform = MockPlatform::new();
        let cell = leak(Once::new());

        let first = install(cell, &platform, MIB_64);
        let second = install(cell, &platform, 0);

        assert!(core::ptr::eq(first, second));
        assert_eq!(second.entry(SegmentSlot::Code).limit(), MIB_64 - 1);
        let loads = platform
            .events()
            .into_iter()
            .filter(|event| matches!(event, Event::LoadGdt(_)))
            .count();
        assert_eq!(loads, 1);
    }
}
