#![no_std]
#![no_main]

extern crate rlibc;

use core::{ffi::CStr, panic::PanicInfo};

use spin::Once;

use roshos::{
    arch::x86::{bind_router, halt, halt_loop, X86Trampolines, X86},
    config::KernelConfig,
    drivers::{vga_text::VGA_TEXT_BUFFER, Console, KeyboardDriver, ScancodeDecoder, VgaTextConsole},
    error::ConfigError,
    hal::without_interrupts,
    interrupts::{GlobalDescriptorTable, InterruptDescriptorTable, InterruptManager, InterruptRouter, TickCounter},
    kernel::{init_phase, install_tables, program_interrupt_controller},
    logging::{self, SerialLogger},
    serial_println,
};

const MULTIBOOT_BOOTLOADER_MAGIC: u32 = 0x2BAD_B002;
const MULTIBOOT_INFO_CMDLINE: u32 = 1 << 2;
const MULTIBOOT_CMDLINE_OFFSET: usize = 16;

static LOGGER: SerialLogger<X86> = SerialLogger::new(X86);
static CONSOLE: VgaTextConsole = unsafe { VgaTextConsole::new(VGA_TEXT_BUFFER as *mut u16) };

static GDT: Once<GlobalDescriptorTable> = Once::new();
static IDT: Once<InterruptDescriptorTable> = Once::new();

static ROUTER: InterruptRouter<X86> = InterruptRouter::new();
static MANAGER: Once<InterruptManager<X86>> = Once::new();
static KEYBOARD: Once<KeyboardDriver<X86>> = Once::new();
static TICKS: Once<TickCounter> = Once::new();

/// Entered from the multiboot loader with `ebx` and `eax` pushed, in that order.
#[no_mangle]
pub extern "C" fn kernel_main(multiboot_info: u32, magic: u32) -> ! {
    let mut config = KernelConfig::DEFAULT;
    let options = load_boot_options(&mut config, multiboot_info, magic);
    if options.is_err() {
        config = KernelConfig::DEFAULT;
    }

    if logging::install(&LOGGER, config.log_level).is_err() {
        serial_println!(X86, "logger already installed");
    }
    if let Err(error) = options {
        log::warn!("boot options ignored: {}", error);
    }

    CONSOLE.clear();
    CONSOLE.write_str("roshos: descriptor tables and interrupts\n");

    let pics = config.pic.chained_pics();
    install_tables(&X86, &GDT, &IDT, &X86Trampolines::new(pics), &config);
    program_interrupt_controller(&X86, &config);

    let manager = MANAGER.call_once(|| InterruptManager::from_config(X86, &CONSOLE, &config));

    let keyboard = KEYBOARD.call_once(|| KeyboardDriver::new(X86, config.keyboard_vector()));
    keyboard.initialize();
    let _keyboard = manager.register(keyboard);
    let _timer = config
        .timer_enabled()
        .then(|| manager.register(TICKS.call_once(|| TickCounter::new(config.timer_vector()))));

    if init_phase("interrupt entry", || bind_router(&ROUTER, pics)).is_err() {
        halt_loop();
    }
    manager.activate(&ROUTER);

    let mut decoder = ScancodeDecoder::new();
    loop {
        without_interrupts(&X86, || keyboard.drain(&mut decoder, &CONSOLE));
        halt();
    }
}

fn load_boot_options(config: &mut KernelConfig, multiboot_info: u32, magic: u32) -> Result<(), ConfigError> {
    if magic == MULTIBOOT_BOOTLOADER_MAGIC {
        // SAFETY: the loader passed a valid multiboot information structure,
        // identity mapped like the rest of low memory.
        if let Some(cmdline) = unsafe { multiboot_cmdline(multiboot_info) } {
            config.apply_cmdline(cmdline)?;
        }
    }
    config.validate()
}

/// # Safety
///
/// `info` must be the address of a multiboot information structure.
unsafe fn multiboot_cmdline(info: u32) -> Option<&'static str> {
    let info = info as usize as *const u32;
    if info.read() & MULTIBOOT_INFO_CMDLINE == 0 {
        return None;
    }

    let address = info.byte_add(MULTIBOOT_CMDLINE_OFFSET).read();
    CStr::from_ptr(address as usize as *const core::ffi::c_char).to_str().ok()
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    let msg = info.message();
    let loc = info.location();
    serial_println!(X86, "PANIC : {} | {:?}", msg, loc);

    halt_loop()
}
