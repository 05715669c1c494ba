//! Serial (COM1) output: the `log` backend and the raw `serial_println!`
//! used where the logger cannot be trusted, such as the panic handler.

use core::fmt::Write;

use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;
use uart_16550::SerialPort;

use crate::{config::COM1_BASE, error::KernelError, hal::Cpu, hal::without_interrupts};

pub static SERIAL: Mutex<SerialPort> = Mutex::new(unsafe { SerialPort::new(COM1_BASE) });

/// `serial_println!(cpu, ...)`: one line straight to COM1, bypassing the
/// logger. The port is locked with interrupts off on `cpu`.
#[macro_export]
macro_rules! serial_println {
    ($cpu:expr, $($arg:tt)*) => {{
        use core::fmt::Write;
        $crate::logging::with_serial(&$cpu, |serial| {
            let _ = writeln!(serial, $($arg)*);
        });
    }};
}

/// Runs `f` on the locked COM1 port with interrupts disabled.
pub fn with_serial<C: Cpu + ?Sized, R>(cpu: &C, f: impl FnOnce(&mut SerialPort) -> R) -> R {
    without_interrupts(cpu, || f(&mut *SERIAL.lock()))
}

/// Writes each record as one line on COM1.
///
/// The port lock is only taken with interrupts off, so a handler that logs
/// can never spin on a lock held by the code it interrupted.
pub struct SerialLogger<C: Cpu + Send + Sync + 'static> {
    cpu: C,
}

impl<C: Cpu + Send + Sync + 'static> SerialLogger<C> {
    pub const fn new(cpu: C) -> Self {
        Self { cpu }
    }
}

impl<C: Cpu + Send + Sync + 'static> Log for SerialLogger<C> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        with_serial(&self.cpu, |serial| {
            let _ = writeln!(serial, "[{:>5}] {}: {}", record.level(), record.target(), record.args());
        });
    }

    fn flush(&self) {}
}

/// Initialises the UART and makes `logger` the global logger.
pub fn install<C: Cpu + Send + Sync + 'static>(
    logger: &'static SerialLogger<C>,
    level: LevelFilter,
) -> Result<(), KernelError> {
    with_serial(&logger.cpu, SerialPort::init);

    log::set_logger(logger).map_err(|_| KernelError::LoggerInstalled)?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, MockPlatform};

    #[test]
    fn serial_port_is_only_locked_with_interrupts_off() {
        let platform = MockPlatform::new();
        platform.enable_interrupts();
        platform.clear_events();

        let held_with_interrupts_off = with_serial(&platform, |_| SERIAL.is_locked() && !platform.interrupts_enabled());

        assert!(held_with_interrupts_off);
        assert!(!SERIAL.is_locked());
        assert!(platform.interrupts_enabled());
        assert_eq!(platform.events(), vec![Event::DisableInterrupts, Event::EnableInterrupts]);
    }
}
