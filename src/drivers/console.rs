//! Text output used by handlers and by the dispatcher's diagnostics.

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

pub trait Console: Sync {
    fn write_bytes(&self, bytes: &[u8]);

    fn write_str(&self, text: &str) {
        self.write_bytes(text.as_bytes());
    }
}

/// Overwrites `buffer[at..at + 2]` with `value` as two uppercase hex digits.
/// Out-of-range positions leave the buffer untouched.
pub fn inject_hex(buffer: &mut [u8], at: usize, value: u8) {
    if let Some([high, low]) = buffer.get_mut(at..at + 2) {
        *high = HEX_DIGITS[usize::from(value >> 4)];
        *low = HEX_DIGITS[usize::from(value & 0xF)];
    }
}
