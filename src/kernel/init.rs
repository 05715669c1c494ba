//! Boot phases, in the order the hardware requires them: segment table,
//! gate table, interrupt controller. Interrupts are only enabled later, by
//! activating a manager.

use spin::Once;

use crate::{
    config::KernelConfig,
    error::KernelError,
    hal::{Cpu, PortIo},
    interrupts::{gdt, idt, GlobalDescriptorTable, InterruptDescriptorTable, Trampolines},
};

/// Runs one boot phase and logs how it went.
pub fn init_phase<T>(name: &'static str, phase: impl FnOnce() -> Result<T, KernelError>) -> Result<T, KernelError> {
    log::info!("initializing {}...", name);

    match phase() {
        Ok(value) => {
            log::info!("{} initialized", name);
            Ok(value)
        }
        Err(error) => {
            log::error!("{} failed: {}", name, error);
            Err(error)
        }
    }
}

/// Loads the GDT (reloading every segment register), then builds and loads
/// the IDT against the new code selector.
pub fn install_tables<C: Cpu + ?Sized, T: Trampolines + ?Sized>(
    cpu: &C,
    gdt_cell: &'static Once<GlobalDescriptorTable>,
    idt_cell: &'static Once<InterruptDescriptorTable>,
    trampolines: &T,
    config: &KernelConfig,
) -> (&'static GlobalDescriptorTable, &'static InterruptDescriptorTable) {
    let gdt = gdt::install(gdt_cell, cpu, config.segment_limit);
    let idt = idt::install(idt_cell, cpu, gdt.code_selector(), trampolines);
    (gdt, idt)
}

/// Remaps both PICs onto the configured offsets and applies the mask policy.
pub fn program_interrupt_controller<P: PortIo + ?Sized>(io: &P, config: &KernelConfig) {
    let lines = config.pic.mask.enabled_lines();
    config.pic.chained_pics().remap(io, lines);
    log::info!("enabled IRQ lines: {:?}", lines);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MaskPolicy;
    use crate::error::ConfigError;
    use crate::interrupts::{pic, ChainedPics, InterruptManager, InterruptRouter};
    use crate::testing::{leak, Event, MockPlatform, RecordingConsole};

    struct Stubs;

    impl Trampolines for Stubs {
        fn ignore(&self) -> u32 {
            0x1000
        }

        fn entry(&self, vector: u8) -> Option<u32> {
            ChainedPics::new(0x20, 0x28)
                .line_for_vector(vector)
                .map(|line| 0x2000 + u32::from(line) * 0x10)
        }
    }

    #[test]
    fn boot_order_is_gdt_idt_pic_then_interrupts() {
        let platform = MockPlatform::leaked();
        let config = KernelConfig::DEFAULT;

        let (gdt, idt) = install_tables(platform, leak(Once::new()), leak(Once::new()), &Stubs, &config);
        program_interrupt_controller(platform, &config);
        let manager = leak(InterruptManager::from_config(platform, RecordingConsole::leaked(), &config));
        manager.activate(leak(InterruptRouter::new()));

        let events = platform.events();
        assert_eq!(events.len(), 3 + 10 + 1);
        assert_eq!(events[0], Event::LoadGdt(gdt.pointer()));
        assert_eq!(events[1], Event::ReloadSegments { code: 0x08, data: 0x10 });
        assert_eq!(events[2], Event::LoadIdt(idt.pointer()));
        assert!(events[3..13].iter().all(|event| matches!(event, Event::PortWrite(..))));
        assert_eq!(events[3], Event::PortWrite(pic::MASTER_COMMAND, 0x11));
        assert_eq!(events[12], Event::PortWrite(pic::SLAVE_DATA, 0xFF));
        assert_eq!(events[13], Event::EnableInterrupts);

        assert_eq!(idt.gate(0x21).handler_address(), 0x2010);
        assert_eq!(idt.gate(0x21).selector(), gdt.code_selector());
    }

    #[test]
    fn timer_policy_unmasks_irq0() {
        let platform = MockPlatform::new();
        let mut config = KernelConfig::DEFAULT;
        config.pic.mask = MaskPolicy::TimerAndKeyboard;

        program_interrupt_controller(&platform, &config);

        assert_eq!(platform.writes_to(pic::MASTER_DATA).last(), Some(&0xFC));
    }

    #[test]
    fn init_phase_passes_results_through() {
        assert_eq!(init_phase("ok", || Ok(5)).ok(), Some(5));

        let failed = init_phase("config", || -> Result<(), KernelError> {
            Err(ConfigError::OverlappingPicRanges.into())
        });
        assert!(matches!(failed, Err(KernelError::Config(ConfigError::OverlappingPicRanges))));
    }
}
