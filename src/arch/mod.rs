//! Architecture backends. Only 32-bit x86 exists; everything outside this
//! module talks to the machine through `hal`.

#[cfg(target_arch = "x86")]
pub mod x86;
