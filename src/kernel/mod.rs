/// Kernel initialization and bootstrap module
pub mod init;

pub use init::{init_phase, install_tables, program_interrupt_controller};
