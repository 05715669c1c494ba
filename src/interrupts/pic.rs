//! # Programmable Interrupt Controller (8259 PIC)
//!
//! Programs the two chained legacy 8259s.
//!
//! ## PIC Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐
//! │   PIC 1     │     │   PIC 2     │
//! │  (Master)   │◀────│  (Slave)    │
//! │ IRQ 0-7     │IRQ2 │ IRQ 8-15    │
//! └─────────────┘     └─────────────┘
//!       │
//!       ▼
//!     CPU
//! ```
//!
//! ## Vector Remapping
//!
//! Out of reset both chips deliver on top of the CPU exception vectors, so
//! they are moved:
//! - PIC 1: vectors 0x20-0x27 (IRQ 0-7)
//! - PIC 2: vectors 0x28-0x2F (IRQ 8-15)
//!
//! ## Ports
//!
//! | Port | Role                |
//! |------|---------------------|
//! | 0x20 | Master command      |
//! | 0x21 | Master data / mask  |
//! | 0xA0 | Slave command       |
//! | 0xA1 | Slave data / mask   |

use bitflags::bitflags;

use crate::hal::PortIo;

pub const MASTER_COMMAND: u16 = 0x20;
pub const MASTER_DATA: u16 = 0x21;
pub const SLAVE_COMMAND: u16 = 0xA0;
pub const SLAVE_DATA: u16 = 0xA1;

/// ICW1: begin initialisation, ICW4 follows.
const CMD_INIT: u8 = 0x11;
const CMD_END_OF_INTERRUPT: u8 = 0x20;
/// ICW3 for the master: a slave hangs off IRQ2.
const MASTER_CASCADE: u8 = 0x04;
/// ICW3 for the slave: its cascade identity.
const SLAVE_IDENTITY: u8 = 0x02;
/// ICW4: 8086/88 mode.
const MODE_8086: u8 = 0x01;

const LINES_PER_CHIP: u8 = 8;

bitflags! {
    /// The 16 legacy interrupt lines. Used as the set of *enabled* lines.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqLines: u16 {
        const TIMER =           1 << 0;
        const KEYBOARD =        1 << 1;
        const CASCADE =         1 << 2;
        const COM2 =            1 << 3;
        const COM1 =            1 << 4;
        const LPT2 =            1 << 5;
        const FLOPPY_DISK =     1 << 6;
        const LPT1 =            1 << 7;
        const RTC =             1 << 8;
        const PERIPHERAL0 =     1 << 9;
        const PERIPHERAL1 =     1 << 10;
        const PERIPHERAL2 =     1 << 11;
        const PS2_MOUSE =       1 << 12;
        const FPU =             1 << 13;
        const PRIMARY_ATA =     1 << 14;
        const SECONDARY_ATA =   1 << 15;
    }
}

impl IrqLines {
    pub const fn low(self) -> u8 {
        self.bits() as u8
    }

    pub const fn high(self) -> u8 {
        (self.bits() >> 8) as u8
    }

    /// The single line `line`, or `None` past IRQ15.
    pub const fn line(line: u8) -> Option<Self> {
        if line as u32 >= u16::BITS {
            return None;
        }
        Some(Self::from_bits_retain(1 << line))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainedPics {
    master_offset: u8,
    slave_offset: u8,
}

impl ChainedPics {
    pub const fn new(master_offset: u8, slave_offset: u8) -> Self {
        Self { master_offset, slave_offset }
    }

    /// Re-initialises both chips onto their offsets and applies the mask
    /// for `enabled`.
    ///
    /// Write order is fixed: both ICW1s, then ICW2-4 alternating master and
    /// slave, then the two masks.
    pub fn remap<P: PortIo + ?Sized>(&self, io: &P, enabled: IrqLines) {
        io.write_u8_paced(MASTER_COMMAND, CMD_INIT);
        io.write_u8_paced(SLAVE_COMMAND, CMD_INIT);

        io.write_u8_paced(MASTER_DATA, self.master_offset);
        io.write_u8_paced(SLAVE_DATA, self.slave_offset);

        io.write_u8_paced(MASTER_DATA, MASTER_CASCADE);
        io.write_u8_paced(SLAVE_DATA, SLAVE_IDENTITY);

        io.write_u8_paced(MASTER_DATA, MODE_8086);
        io.write_u8_paced(SLAVE_DATA, MODE_8086);

        let (master_mask, slave_mask) = Self::masks_for(enabled);
        io.write_u8_paced(MASTER_DATA, master_mask);
        io.write_u8_paced(SLAVE_DATA, slave_mask);

        log::debug!(
            "PIC remapped to {:#04x}/{:#04x}, masks {:#04x}/{:#04x}",
            self.master_offset,
            self.slave_offset,
            master_mask,
            slave_mask
        );
    }

    /// Mask bytes (set bit = line ignored) for the enabled line set. The
    /// cascade line stays open whenever a slave line is enabled.
    pub const fn masks_for(enabled: IrqLines) -> (u8, u8) {
        let mut master_open = enabled.low();
        if enabled.high() != 0 {
            master_open |= IrqLines::CASCADE.low();
        }
        (!master_open, !enabled.high())
    }

    fn handled_by_master(&self, vector: u8) -> bool {
        vector.wrapping_sub(self.master_offset) < LINES_PER_CHIP
    }

    fn handled_by_slave(&self, vector: u8) -> bool {
        vector.wrapping_sub(self.slave_offset) < LINES_PER_CHIP
    }

    pub fn handles_interrupt(&self, vector: u8) -> bool {
        self.handled_by_master(vector) || self.handled_by_slave(vector)
    }

    pub fn line_for_vector(&self, vector: u8) -> Option<u8> {
        if self.handled_by_master(vector) {
            Some(vector - self.master_offset)
        } else if self.handled_by_slave(vector) {
            Some(vector - self.slave_offset + LINES_PER_CHIP)
        } else {
            None
        }
    }

    pub fn vector_for_line(&self, line: u8) -> Option<u8> {
        match line {
            0..=7 => self.master_offset.checked_add(line),
            8..=15 => self.slave_offset.checked_add(line - LINES_PER_CHIP),
            _ => None,
        }
    }

    /// Acknowledges `vector`: master first, then the slave if the vector is
    /// one of its lines. Vectors outside both chips are not acknowledged.
    pub fn notify_end_of_interrupt<P: PortIo + ?Sized>(&self, io: &P, vector: u8) {
        if !self.handles_interrupt(vector) {
            return;
        }

        io.write_u8(MASTER_COMMAND, CMD_END_OF_INTERRUPT);
        if self.handled_by_slave(vector) {
            io.write_u8(SLAVE_COMMAND, CMD_END_OF_INTERRUPT);
        }
    }

    /// Masks or unmasks one line. Lines past IRQ15 are rejected without
    /// touching either chip.
    pub fn set_line_masked<P: PortIo + ?Sized>(&self, io: &P, line: u8, masked: bool) -> bool {
        let Some(lines) = IrqLines::line(line) else {
            return false;
        };
        let (port, bit) = if line < LINES_PER_CHIP {
            (MASTER_DATA, lines.low())
        } else {
            (SLAVE_DATA, lines.high())
        };

        let current = io.read_u8(port);
        let updated = if masked { current | bit } else { current & !bit };
        io.write_u8(port, updated);
        true
    }

    /// Lines currently masked on either chip.
    pub fn masked_lines<P: PortIo + ?Sized>(&self, io: &P) -> IrqLines {
        let master = io.read_u8(MASTER_DATA);
        let slave = io.read_u8(SLAVE_DATA);
        IrqLines::from_bits_retain(u16::from(slave) << 8 | u16::from(master))
    }
}
