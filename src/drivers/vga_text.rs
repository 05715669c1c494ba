//! 80x25 VGA text mode console, light grey on black.

use core::ptr;

use spin::Mutex;

use crate::drivers::console::Console;

pub const VGA_TEXT_BUFFER: usize = 0xB8000;

pub const BUFFER_WIDTH: usize = 80;
pub const BUFFER_HEIGHT: usize = 25;

const ATTRIBUTE: u16 = 0x07 << 8;
const BLANK: u16 = ATTRIBUTE | b' ' as u16;
/// Shown for bytes outside printable ASCII.
const REPLACEMENT: u8 = 0xFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    row: usize,
    column: usize,
}

pub struct VgaTextConsole {
    buffer: *mut u16,
    cursor: Mutex<Cursor>,
}

// SAFETY: every access to the buffer happens with the cursor lock held.
unsafe impl Send for VgaTextConsole {}
unsafe impl Sync for VgaTextConsole {}

impl VgaTextConsole {
    /// # Safety
    ///
    /// `buffer` must point to `BUFFER_WIDTH * BUFFER_HEIGHT` writable cells
    /// that nothing else writes to for the console's lifetime.
    pub const unsafe fn new(buffer: *mut u16) -> Self {
        Self {
            buffer,
            cursor: Mutex::new(Cursor { row: 0, column: 0 }),
        }
    }

    pub fn clear(&self) {
        let mut cursor = self.cursor.lock();
        for row in 0..BUFFER_HEIGHT {
            self.clear_row(row);
        }
        *cursor = Cursor { row: 0, column: 0 };
    }

    fn write_byte(&self, cursor: &mut Cursor, byte: u8) {
        match byte {
            b'\n' => self.new_line(cursor),
            b'\r' => cursor.column = 0,
            0x08 => {
                if cursor.column > 0 {
                    cursor.column -= 1;
                    self.write_cell(cursor.row, cursor.column, BLANK);
                }
            }
            byte => {
                if cursor.column >= BUFFER_WIDTH {
                    self.new_line(cursor);
                }

                let byte = if matches!(byte, 0x20..=0x7E) { byte } else { REPLACEMENT };
                self.write_cell(cursor.row, cursor.column, ATTRIBUTE | u16::from(byte));
                cursor.column += 1;
            }
        }
    }

    fn new_line(&self, cursor: &mut Cursor) {
        cursor.column = 0;
        if cursor.row + 1 < BUFFER_HEIGHT {
            cursor.row += 1;
            return;
        }

        for row in 1..BUFFER_HEIGHT {
            for column in 0..BUFFER_WIDTH {
                let cell = self.read_cell(row, column);
                self.write_cell(row - 1, column, cell);
            }
        }
        self.clear_row(BUFFER_HEIGHT - 1);
    }

    fn clear_row(&self, row: usize) {
        for column in 0..BUFFER_WIDTH {
            self.write_cell(row, column, BLANK);
        }
    }

    fn read_cell(&self, row: usize, column: usize) -> u16 {
        // SAFETY: row and column are in bounds; see `new`.
        unsafe { ptr::read_volatile(self.buffer.add(row * BUFFER_WIDTH + column)) }
    }

    fn write_cell(&self, row: usize, column: usize, cell: u16) {
        // SAFETY: row and column are in bounds; see `new`.
        unsafe { ptr::write_volatile(self.buffer.add(row * BUFFER_WIDTH + column), cell) }
    }
}

impl Console for VgaTextConsole {
    fn write_bytes(&self, bytes: &[u8]) {
        let mut cursor = self.cursor.lock();
        for &byte in bytes {
            self.write_byte(&mut cursor, byte);
        }
    }
}
