//! # Interrupt entry stubs
//!
//! ```text
//! gate ──▶ __irq_stub_N ──▶ __interrupt_common ──▶ interrupt_entry(line, esp)
//!              push N            pushad, segments        └──▶ InterruptRouter::dispatch
//!                                mov esp, eax ◀──────────── returned esp
//!                                pop segments, popad, iretd
//! ```
//!
//! Each PIC line has a stub that pushes its line number; the shared tail
//! saves the general and segment registers, hands `(line, esp)` to Rust and
//! resumes on whatever stack pointer comes back. The stubs know nothing
//! about vector offsets: the line is translated back to a vector with the
//! `ChainedPics` the router was bound with.
//!
//! Every other vector, the CPU exceptions included, points at
//! `__interrupt_ignore`, a bare `iretd`.

use core::arch::global_asm;

use spin::Once;

use crate::{
    error::KernelError,
    interrupts::{idt::Trampolines, pic::ChainedPics, InterruptRouter},
};

use super::X86;

const IRQ_LINES: usize = 16;

global_asm!(
    ".pushsection .text",
    ".global __interrupt_ignore",
    "__interrupt_ignore:",
    "    iretd",
    "",
    ".macro irq_stub line",
    ".global __irq_stub_\\line",
    "__irq_stub_\\line:",
    "    push \\line",
    "    jmp __interrupt_common",
    ".endm",
    ".irp line, 0,1,2,3,4,5,6,7,8,9,10,11,12,13,14,15",
    "    irq_stub \\line",
    ".endr",
    "",
    "__interrupt_common:",
    "    pushad",
    "    push ds",
    "    push es",
    "    push fs",
    "    push gs",
    "    mov eax, esp",
    "    cld",
    // cdecl, right to left: frame pointer, then the line pushed by the stub.
    "    push eax",
    "    push dword ptr [eax + 48]",
    "    call {entry}",
    "    mov esp, eax",
    "    pop gs",
    "    pop fs",
    "    pop es",
    "    pop ds",
    "    popad",
    "    add esp, 4",
    "    iretd",
    ".popsection",
    "",
    ".pushsection .rodata",
    ".balign 4",
    ".global __irq_stub_table",
    "__irq_stub_table:",
    ".irp line, 0,1,2,3,4,5,6,7,8,9,10,11,12,13,14,15",
    "    .long __irq_stub_\\line",
    ".endr",
    ".popsection",
    entry = sym interrupt_entry,
);

extern "C" {
    fn __interrupt_ignore();
    static __irq_stub_table: [u32; IRQ_LINES];
}

struct Binding {
    router: &'static InterruptRouter<X86>,
    pics: ChainedPics,
}

static BINDING: Once<Binding> = Once::new();

/// Points the entry stubs at `router`. Lines are turned into vectors with
/// `pics`, which must be the pair the controllers were remapped with.
pub fn bind_router(router: &'static InterruptRouter<X86>, pics: ChainedPics) -> Result<(), KernelError> {
    let mut bound = false;
    BINDING.call_once(|| {
        bound = true;
        Binding { router, pics }
    });

    if !bound {
        return Err(KernelError::AlreadyBound);
    }
    log::debug!("interrupt entry stubs bound");
    Ok(())
}

extern "C" fn interrupt_entry(line: u32, esp: u32) -> u32 {
    let Some(binding) = BINDING.get() else {
        return esp;
    };
    let Some(vector) = u8::try_from(line).ok().and_then(|line| binding.pics.vector_for_line(line)) else {
        return esp;
    };

    binding.router.dispatch(vector, esp as usize) as u32
}

/// Stub addresses for an IDT whose PIC lines start at the given offsets.
pub struct X86Trampolines {
    pics: ChainedPics,
}

impl X86Trampolines {
    pub const fn new(pics: ChainedPics) -> Self {
        Self { pics }
    }
}

impl Trampolines for X86Trampolines {
    fn ignore(&self) -> u32 {
        __interrupt_ignore as usize as u32
    }

    fn entry(&self, vector: u8) -> Option<u32> {
        let line = self.pics.line_for_vector(vector)?;
        // SAFETY: the table is written once by the assembler and never modified.
        let stubs = unsafe { &*core::ptr::addr_of!(__irq_stub_table) };
        stubs.get(usize::from(line)).copied()
    }
}
