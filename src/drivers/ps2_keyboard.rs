//! # PS/2 Keyboard
//!
//! The interrupt handler only moves the raw scancode from port 0x60 into a
//! lock-free ring; decoding happens later, outside interrupt context, by
//! draining the ring through a [`ScancodeDecoder`].
//!
//! | Port | Read            | Write            |
//! |------|-----------------|------------------|
//! | 0x60 | scancode / data | data             |
//! | 0x64 | status          | controller cmd   |

use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use crate::{
    drivers::console::{inject_hex, Console},
    hal::PortIo,
    interrupts::dispatch::InterruptHandler,
};

pub const DATA_PORT: u16 = 0x60;
pub const COMMAND_PORT: u16 = 0x64;

const STATUS_OUTPUT_FULL: u8 = 0x01;

const CMD_ENABLE_FIRST_PORT: u8 = 0xAE;
const CMD_READ_CONFIG: u8 = 0x20;
const CMD_WRITE_CONFIG: u8 = 0x60;
const DEV_ENABLE_SCANNING: u8 = 0xF4;

const CONFIG_FIRST_PORT_IRQ: u8 = 0x01;
const CONFIG_FIRST_PORT_CLOCK_DISABLED: u8 = 0x10;

const BUFFER_SIZE: usize = 256;

/// Toggles keypad mode; nothing to echo or report.
const KEY_NUM_LOCK: u8 = 0x45;

const UNMAPPED_TEMPLATE: &[u8; 14] = b"KEYBOARD 0x00 ";

/// Single-producer (the interrupt handler), single-consumer ring of raw
/// scancodes. New scancodes are dropped while the ring is full.
pub struct ScancodeQueue {
    buffer: [AtomicU8; BUFFER_SIZE],
    head: AtomicUsize,
    tail: AtomicUsize,
}

impl ScancodeQueue {
    pub const fn new() -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const EMPTY: AtomicU8 = AtomicU8::new(0);
        Self {
            buffer: [EMPTY; BUFFER_SIZE],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, scancode: u8) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let next = (head + 1) % BUFFER_SIZE;
        if next == self.tail.load(Ordering::Acquire) {
            return false;
        }

        self.buffer[head].store(scancode, Ordering::Relaxed);
        self.head.store(next, Ordering::Release);
        true
    }

    pub fn pop(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }

        let scancode = self.buffer[tail].load(Ordering::Relaxed);
        self.tail.store((tail + 1) % BUFFER_SIZE, Ordering::Release);
        Some(scancode)
    }
}

impl Default for ScancodeQueue {
    fn default() -> Self {
        Self::new()
    }
}

pub struct KeyboardDriver<P: PortIo + Sync> {
    io: P,
    vector: u8,
    queue: ScancodeQueue,
}

impl<P: PortIo + Sync> KeyboardDriver<P> {
    pub const fn new(io: P, vector: u8) -> Self {
        Self {
            io,
            vector,
            queue: ScancodeQueue::new(),
        }
    }

    /// Brings the controller's first port up with its interrupt enabled and
    /// tells the keyboard to start scanning.
    pub fn initialize(&self) {
        while self.io.read_u8(COMMAND_PORT) & STATUS_OUTPUT_FULL != 0 {
            self.io.read_u8(DATA_PORT);
        }

        self.io.write_u8(COMMAND_PORT, CMD_ENABLE_FIRST_PORT);
        self.io.write_u8(COMMAND_PORT, CMD_READ_CONFIG);
        let config = (self.io.read_u8(DATA_PORT) | CONFIG_FIRST_PORT_IRQ) & !CONFIG_FIRST_PORT_CLOCK_DISABLED;
        self.io.write_u8(COMMAND_PORT, CMD_WRITE_CONFIG);
        self.io.write_u8(DATA_PORT, config);

        self.io.write_u8(DATA_PORT, DEV_ENABLE_SCANNING);
        log::debug!("PS/2 keyboard enabled, controller config {:#04x}", config);
    }

    pub fn pop_scancode(&self) -> Option<u8> {
        self.queue.pop()
    }

    /// Decodes every queued scancode, echoing typed characters to `console`
    /// and reporting keys the decoder has no mapping for.
    pub fn drain(&self, decoder: &mut ScancodeDecoder, console: &dyn Console) {
        while let Some(scancode) = self.queue.pop() {
            match decoder.process_scancode(scancode) {
                Some(Decoded::Key(event)) => {
                    let mut utf8 = [0; 4];
                    console.write_str(event.character.encode_utf8(&mut utf8));
                }
                Some(Decoded::Unmapped(key_code)) => {
                    let mut text = *UNMAPPED_TEMPLATE;
                    inject_hex(&mut text, 11, key_code);
                    console.write_bytes(&text);
                    log::warn!("no mapping for scancode {:#04x}", key_code);
                }
                None => {}
            }
        }
    }
}

impl<P: PortIo + Sync> InterruptHandler for KeyboardDriver<P> {
    fn vector(&self) -> u8 {
        self.vector
    }

    fn handle_interrupt(&self, _vector: u8, stack_pointer: usize) -> usize {
        let scancode = self.io.read_u8(DATA_PORT);
        // Full ring: the scancode is lost, the interrupt is still acknowledged.
        let _ = self.queue.push(scancode);
        stack_pointer
    }
}

/// What a single scancode turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    Key(KeyEvent),
    /// A key press with no character mapping.
    Unmapped(u8),
}

pub struct ScancodeDecoder {
    is_extended: bool,
    shift_pressed: bool,
    ctrl_pressed: bool,
    alt_pressed: bool,
}

impl ScancodeDecoder {
    pub const fn new() -> Self {
        Self {
            is_extended: false,
            shift_pressed: false,
            ctrl_pressed: false,
            alt_pressed: false,
        }
    }

    /// Scancode set 1. Modifiers and releases update state and yield nothing.
    pub fn process_scancode(&mut self, scancode: u8) -> Option<Decoded> {
        if scancode == 0xE0 {
            self.is_extended = true;
            return None;
        }

        let extended = core::mem::take(&mut self.is_extended);
        let is_release = scancode & 0x80 != 0;
        let key_code = scancode & 0x7F;

        match key_code {
            // Extended 0x2A/0x36 are the fake shifts around print screen.
            0x2A | 0x36 if extended => return None,
            0x2A | 0x36 => {
                self.shift_pressed = !is_release;
                return None;
            }
            0x1D => {
                self.ctrl_pressed = !is_release;
                return None;
            }
            0x38 => {
                self.alt_pressed = !is_release;
                return None;
            }
            KEY_NUM_LOCK => return None,
            _ => {}
        }

        if is_release {
            return None;
        }

        let decoded = match self.scancode_to_char(key_code) {
            Some(character) => Decoded::Key(KeyEvent {
                character,
                ctrl: self.ctrl_pressed,
                alt: self.alt_pressed,
                shift: self.shift_pressed,
            }),
            None => Decoded::Unmapped(key_code),
        };
        Some(decoded)
    }

    fn scancode_to_char(&self, scancode: u8) -> Option<char> {
        const LETTERS: [(u8, char); 26] = [
            (0x10, 'q'), (0x11, 'w'), (0x12, 'e'), (0x13, 'r'), (0x14, 't'),
            (0x15, 'y'), (0x16, 'u'), (0x17, 'i'), (0x18, 'o'), (0x19, 'p'),
            (0x1E, 'a'), (0x1F, 's'), (0x20, 'd'), (0x21, 'f'), (0x22, 'g'),
            (0x23, 'h'), (0x24, 'j'), (0x25, 'k'), (0x26, 'l'),
            (0x2C, 'z'), (0x2D, 'x'), (0x2E, 'c'), (0x2F, 'v'), (0x30, 'b'),
            (0x31, 'n'), (0x32, 'm'),
        ];

        if let Some(&(_, letter)) = LETTERS.iter().find(|(code, _)| *code == scancode) {
            return Some(if self.shift_pressed { letter.to_ascii_uppercase() } else { letter });
        }

        let (plain, shifted) = match scancode {
            0x02..=0x0A => {
                let digit = (scancode - 0x02 + b'1') as char;
                (digit, b"!@#$%^&*("[usize::from(scancode - 0x02)] as char)
            }
            0x0B => ('0', ')'),
            0x0C => ('-', '_'),
            0x0D => ('=', '+'),
            0x1A => ('[', '{'),
            0x1B => (']', '}'),
            0x27 => (';', ':'),
            0x28 => ('\'', '"'),
            0x29 => ('`', '~'),
            0x2B => ('\\', '|'),
            0x33 => (',', '<'),
            0x34 => ('.', '>'),
            0x35 => ('/', '?'),
            0x39 => (' ', ' '),
            0x1C => ('\n', '\n'),
            0x0E => ('\x08', '\x08'),
            0x0F => ('\t', '\t'),
            _ => return None,
        };

        Some(if self.shift_pressed { shifted } else { plain })
    }
}

impl Default for ScancodeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub character: char,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}
