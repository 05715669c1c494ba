use core::sync::atomic::{AtomicU64, Ordering};

use crate::interrupts::dispatch::InterruptHandler;

/// Counts timer interrupts (IRQ0).
pub struct TickCounter {
    vector: u8,
    ticks: AtomicU64,
}

impl TickCounter {
    pub const fn new(vector: u8) -> Self {
        Self {
            vector,
            ticks: AtomicU64::new(0),
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl InterruptHandler for TickCounter {
    fn vector(&self) -> u8 {
        self.vector
    }

    fn handle_interrupt(&self, _vector: u8, stack_pointer: usize) -> usize {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        stack_pointer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupts::{ChainedPics, InterruptManager, InterruptRouter};
    use crate::testing::{leak, MockPlatform, RecordingConsole};

    #[test]
    fn counts_each_dispatch() {
        let platform = MockPlatform::leaked();
        let console = RecordingConsole::leaked();
        let manager = leak(InterruptManager::new(platform, ChainedPics::new(0x20, 0x28), console, Some(0x20)));
        let router = leak(InterruptRouter::new());
        let counter = leak(TickCounter::new(0x20));
        let _registration = manager.register(counter);
        manager.activate(router);

        for _ in 0..3 {
            assert_eq!(router.dispatch(0x20, 0x4000), 0x4000);
        }

        assert_eq!(counter.ticks(), 3);
        assert!(console.lines().is_empty());
    }
}
