pub mod console;
pub mod ps2_keyboard;
pub mod vga_text;

pub use console::Console;
pub use ps2_keyboard::{KeyboardDriver, ScancodeDecoder};
pub use vga_text::VgaTextConsole;
