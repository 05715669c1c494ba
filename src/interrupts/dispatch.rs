//! # Interrupt Dispatch
//!
//! Every dispatch stub ends up in [`InterruptRouter::dispatch`] with the
//! vector number and the stack pointer of the saved register frame.
//!
//! ```text
//! stub ──▶ InterruptRouter ──▶ active InterruptManager ──▶ HandlerRegistry[vector]
//!                                      │
//!                                      └──▶ EOI (master, then slave)
//! ```
//!
//! - The router is the only delivery context. At most one manager is
//!   active in it; activating another one deactivates the previous owner.
//! - A manager owns a 256-slot registry of `&'static dyn InterruptHandler`.
//!   Registering returns a [`Registration`]; dropping it vacates the slot
//!   unless a newer handler took the vector over in the meantime.
//! - The value a handler returns becomes the stack pointer the stub resumes
//!   on. Unhandled vectors resume on the stack pointer they came in with.
//!
//! ## Handler contract
//!
//! There is no channel for a handler to report failure, and nothing can
//! unwind through the stub. A handler must always return, and must return a
//! stack pointer the stub can resume on (the one it was given if in doubt).
//! EOI is only sent after the handler returns, so a handler that never
//! returns silences its line for good.

use core::{
    ptr,
    sync::atomic::{AtomicPtr, Ordering},
};

use spin::Mutex;

use crate::{
    config::KernelConfig,
    drivers::console::{inject_hex, Console},
    hal::{without_interrupts, Platform},
    interrupts::{idt::GATE_COUNT, pic::ChainedPics},
};

const UNHANDLED_TEMPLATE: &[u8; 24] = b"UNHANDLED INTERRUPT 0x00";

pub trait InterruptHandler: Sync {
    /// The vector this handler was built for. It is registered there and nowhere else.
    fn vector(&self) -> u8;

    /// Services one firing of `vector` and returns the stack pointer to resume on.
    fn handle_interrupt(&self, vector: u8, stack_pointer: usize) -> usize;
}

/// Identifies one registration of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(u32);

#[derive(Clone, Copy)]
struct Slot {
    owner: HandlerId,
    handler: &'static dyn InterruptHandler,
}

pub struct HandlerRegistry {
    slots: [Option<Slot>; GATE_COUNT],
    next_owner: u32,
}

impl HandlerRegistry {
    pub const fn new() -> Self {
        Self {
            slots: [None; GATE_COUNT],
            next_owner: 0,
        }
    }

    /// Puts `handler` on `vector`, displacing any previous occupant.
    pub fn install(&mut self, vector: u8, handler: &'static dyn InterruptHandler) -> HandlerId {
        let owner = HandlerId(self.next_owner);
        self.next_owner = self.next_owner.wrapping_add(1);

        if self.slots[usize::from(vector)].replace(Slot { owner, handler }).is_some() {
            log::debug!("vector {:#04x}: previous handler displaced", vector);
        }
        owner
    }

    /// Clears `vector` if `owner` still holds it.
    pub fn vacate(&mut self, vector: u8, owner: HandlerId) -> bool {
        if self.owner(vector) != Some(owner) {
            return false;
        }
        self.slots[usize::from(vector)] = None;
        true
    }

    pub fn lookup(&self, vector: u8) -> Option<&'static dyn InterruptHandler> {
        self.slots[usize::from(vector)].map(|slot| slot.handler)
    }

    pub fn owner(&self, vector: u8) -> Option<HandlerId> {
        self.slots[usize::from(vector)].map(|slot| slot.owner)
    }

    pub fn occupied_vectors(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX)
            .zip(self.slots.iter())
            .filter_map(|(vector, slot)| slot.map(|_| vector))
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub struct InterruptManager<H: Platform + 'static> {
    platform: H,
    pics: ChainedPics,
    registry: Mutex<HandlerRegistry>,
    console: &'static dyn Console,
    /// Fires too often to report when nobody listens (the timer, by default).
    quiet_vector: Option<u8>,
}

impl<H: Platform + 'static> InterruptManager<H> {
    pub const fn new(
        platform: H,
        pics: ChainedPics,
        console: &'static dyn Console,
        quiet_vector: Option<u8>,
    ) -> Self {
        Self {
            platform,
            pics,
            registry: Mutex::new(HandlerRegistry::new()),
            console,
            quiet_vector,
        }
    }

    pub fn from_config(platform: H, console: &'static dyn Console, config: &KernelConfig) -> Self {
        Self::new(platform, config.pic.chained_pics(), console, config.quiet_vector)
    }

    pub fn register(&'static self, handler: &'static dyn InterruptHandler) -> Registration<H> {
        let vector = handler.vector();
        let owner = without_interrupts(&self.platform, || self.registry.lock().install(vector, handler));
        log::debug!("handler registered on vector {:#04x}", vector);

        Registration {
            manager: self,
            vector,
            owner,
        }
    }

    fn vacate(&self, vector: u8, owner: HandlerId) -> bool {
        without_interrupts(&self.platform, || self.registry.lock().vacate(vector, owner))
    }

    pub fn has_handler(&self, vector: u8) -> bool {
        without_interrupts(&self.platform, || self.registry.lock().lookup(vector).is_some())
    }

    fn owner(&self, vector: u8) -> Option<HandlerId> {
        without_interrupts(&self.platform, || self.registry.lock().owner(vector))
    }

    /// Runs the handler for `vector` (or reports it), then acknowledges it.
    pub fn service(&self, vector: u8, stack_pointer: usize) -> usize {
        let handler = self.registry.lock().lookup(vector);

        let resume = match handler {
            Some(handler) => handler.handle_interrupt(vector, stack_pointer),
            None => {
                if self.quiet_vector != Some(vector) {
                    self.report_unhandled(vector);
                }
                stack_pointer
            }
        };

        self.pics.notify_end_of_interrupt(&self.platform, vector);
        resume
    }

    fn report_unhandled(&self, vector: u8) {
        let mut text = *UNHANDLED_TEMPLATE;
        inject_hex(&mut text, UNHANDLED_TEMPLATE.len() - 2, vector);
        self.console.write_bytes(&text);
        log::warn!("unhandled interrupt {:#04x}", vector);
    }

    /// Makes this manager the one `router` delivers to and enables interrupts.
    pub fn activate(&'static self, router: &InterruptRouter<H>) {
        if let Some(previous) = router.active() {
            if !ptr::eq(previous, self) {
                log::debug!("interrupt delivery handed over to another manager");
                previous.deactivate(router);
            }
        }

        router.set_active(self);
        self.platform.enable_interrupts();
    }

    /// Stops delivery if this manager is the active one; otherwise does nothing.
    pub fn deactivate(&'static self, router: &InterruptRouter<H>) {
        if !self.is_active(router) {
            return;
        }

        self.platform.disable_interrupts();
        router.clear_active(self);
    }

    pub fn is_active(&self, router: &InterruptRouter<H>) -> bool {
        router.active().is_some_and(|active| ptr::eq(active, self))
    }
}

/// The delivery context the entry stubs are bound to.
pub struct InterruptRouter<H: Platform + 'static> {
    active: AtomicPtr<InterruptManager<H>>,
}

impl<H: Platform + 'static> InterruptRouter<H> {
    pub const fn new() -> Self {
        Self {
            active: AtomicPtr::new(ptr::null_mut()),
        }
    }

    pub fn active(&self) -> Option<&'static InterruptManager<H>> {
        let manager = self.active.load(Ordering::Acquire);
        // SAFETY: only `&'static InterruptManager` pointers are ever stored.
        unsafe { manager.as_ref() }
    }

    fn set_active(&self, manager: &'static InterruptManager<H>) {
        self.active.store(ptr::from_ref(manager).cast_mut(), Ordering::Release);
    }

    fn clear_active(&self, manager: &'static InterruptManager<H>) {
        let _ = self.active.compare_exchange(
            ptr::from_ref(manager).cast_mut(),
            ptr::null_mut(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Entry point for the stubs. Without an active manager the interrupt
    /// is dropped and `stack_pointer` comes straight back.
    pub fn dispatch(&self, vector: u8, stack_pointer: usize) -> usize {
        match self.active() {
            Some(manager) => manager.service(vector, stack_pointer),
            None => stack_pointer,
        }
    }
}

impl<H: Platform + 'static> Default for InterruptRouter<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[must_use = "dropping a registration vacates its vector"]
pub struct Registration<H: Platform + 'static> {
    manager: &'static InterruptManager<H>,
    vector: u8,
    owner: HandlerId,
}

impl<H: Platform + 'static> Registration<H> {
    pub fn vector(&self) -> u8 {
        self.vector
    }

    /// Whether this registration still owns its vector.
    pub fn is_current(&self) -> bool {
        self.manager.owner(self.vector) == Some(self.owner)
    }
}

impl<H: Platform + 'static> Drop for Registration<H> {
    fn drop(&mut self) {
        if self.manager.vacate(self.vector, self.owner) {
            log::debug!("vector {:#04x} vacated", self.vector);
        }
    }
}
