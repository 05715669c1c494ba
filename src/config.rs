//! # Kernel Configuration
//!
//! Fixed hardware facts as constants, plus the few boot-time choices that
//! can be overridden from the multiboot command line:
//!
//! | Option     | Values                               | Default    |
//! |------------|--------------------------------------|------------|
//! | `log`      | off, error, warn, info, debug, trace | info       |
//! | `irq`      | keyboard, timer,keyboard, 0xNNNN     | keyboard   |
//! | `quiet`    | 0xNN, none                           | 0x20       |
//! | `seglimit` | bytes, decimal or 0x-prefixed hex    | 64 MiB     |
//!
//! `irq=0xNNNN` is the set of *enabled* lines, bit n for IRQ n.

use log::LevelFilter;

use crate::{
    error::ConfigError,
    interrupts::pic::{ChainedPics, IrqLines},
};

pub const PIC_MASTER_OFFSET: u8 = 0x20;
pub const PIC_SLAVE_OFFSET: u8 = 0x28;

pub const TIMER_VECTOR: u8 = PIC_MASTER_OFFSET;
pub const KEYBOARD_VECTOR: u8 = PIC_MASTER_OFFSET + 1;

/// Limit of the flat code and data segments.
pub const KERNEL_SEGMENT_LIMIT: u32 = 64 * 1024 * 1024;

pub const COM1_BASE: u16 = 0x3F8;

/// First vector not reserved for CPU exceptions.
const FIRST_EXTERNAL_VECTOR: u8 = 0x20;

/// Which PIC lines are left unmasked after remapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskPolicy {
    KeyboardOnly,
    TimerAndKeyboard,
    Lines(IrqLines),
}

impl MaskPolicy {
    pub const fn enabled_lines(self) -> IrqLines {
        match self {
            Self::KeyboardOnly => IrqLines::KEYBOARD,
            Self::TimerAndKeyboard => IrqLines::TIMER.union(IrqLines::KEYBOARD),
            Self::Lines(lines) => lines,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PicConfig {
    pub master_offset: u8,
    pub slave_offset: u8,
    pub mask: MaskPolicy,
}

impl PicConfig {
    pub const fn chained_pics(&self) -> ChainedPics {
        ChainedPics::new(self.master_offset, self.slave_offset)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for offset in [self.master_offset, self.slave_offset] {
            if offset % 8 != 0 {
                return Err(ConfigError::MisalignedPicOffset { offset });
            }
            if offset < FIRST_EXTERNAL_VECTOR {
                return Err(ConfigError::ExceptionOverlap { offset });
            }
        }

        // Both offsets are 8-aligned, so the ranges overlap only when equal.
        if self.master_offset == self.slave_offset {
            return Err(ConfigError::OverlappingPicRanges);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    pub segment_limit: u32,
    pub pic: PicConfig,
    /// Vector whose unhandled firings are not reported.
    pub quiet_vector: Option<u8>,
    pub log_level: LevelFilter,
}

impl KernelConfig {
    pub const DEFAULT: Self = Self {
        segment_limit: KERNEL_SEGMENT_LIMIT,
        pic: PicConfig {
            master_offset: PIC_MASTER_OFFSET,
            slave_offset: PIC_SLAVE_OFFSET,
            mask: MaskPolicy::KeyboardOnly,
        },
        quiet_vector: Some(TIMER_VECTOR),
        log_level: LevelFilter::Info,
    };

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pic.validate()
    }

    /// Vector the timer line is delivered on under this configuration.
    pub fn timer_vector(&self) -> u8 {
        self.pic.master_offset
    }

    pub fn keyboard_vector(&self) -> u8 {
        self.pic.master_offset.wrapping_add(1)
    }

    pub fn timer_enabled(&self) -> bool {
        self.pic.mask.enabled_lines().contains(IrqLines::TIMER)
    }

    /// Applies whitespace-separated `key=value` options. Stops at the first
    /// bad token; options before it stay applied.
    pub fn apply_cmdline(&mut self, cmdline: &'static str) -> Result<(), ConfigError> {
        for token in cmdline.split_ascii_whitespace() {
            let Some((option, value)) = token.split_once('=') else {
                return Err(ConfigError::UnknownOption(token));
            };
            let invalid = ConfigError::InvalidValue { option, value };

            match option {
                "log" => self.log_level = value.parse().map_err(|_| invalid)?,
                "irq" => self.pic.mask = parse_mask(value).ok_or(invalid)?,
                "quiet" => {
                    self.quiet_vector = match value {
                        "none" => None,
                        _ => Some(
                            parse_number(value)
                                .and_then(|vector| u8::try_from(vector).ok())
                                .ok_or(invalid)?,
                        ),
                    }
                }
                "seglimit" => self.segment_limit = parse_number(value).ok_or(invalid)?,
                _ => return Err(ConfigError::UnknownOption(option)),
            }
        }
        Ok(())
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn parse_mask(value: &str) -> Option<MaskPolicy> {
    match value {
        "keyboard" => Some(MaskPolicy::KeyboardOnly),
        "timer,keyboard" | "keyboard,timer" => Some(MaskPolicy::TimerAndKeyboard),
        _ => {
            let bits = value.strip_prefix("0x")?;
            u16::from_str_radix(bits, 16)
                .ok()
                .map(|bits| MaskPolicy::Lines(IrqLines::from_bits_retain(bits)))
        }
    }
}

fn parse_number(value: &str) -> Option<u32> {
    match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}
