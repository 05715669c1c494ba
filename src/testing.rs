//! Recording stand-ins for the hardware seams, shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::string::String;
use std::vec::Vec;

use core::sync::atomic::{AtomicBool, Ordering};
use spin::Mutex;
use x86_64::structures::gdt::SegmentSelector;

use crate::drivers::console::Console;
use crate::hal::{Cpu, DescriptorTablePointer, PortIo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    PortWrite(u16, u8),
    PortWriteWide(u16, u32),
    LoadGdt(DescriptorTablePointer),
    LoadIdt(DescriptorTablePointer),
    ReloadSegments { code: u16, data: u16 },
    EnableInterrupts,
    DisableInterrupts,
}

/// Records every side effect in order; reads are served from per-port
/// scripts and return 0 once a script runs dry.
pub struct MockPlatform {
    events: Mutex<Vec<Event>>,
    reads: Mutex<HashMap<u16, VecDeque<u8>>>,
    interrupts: AtomicBool,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            reads: Mutex::new(HashMap::new()),
            interrupts: AtomicBool::new(false),
        }
    }

    pub fn leaked() -> &'static Self {
        leak(Self::new())
    }

    pub fn script_reads(&self, port: u16, values: &[u8]) {
        self.reads.lock().entry(port).or_default().extend(values.iter().copied());
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    /// Byte writes only, in order.
    pub fn port_writes(&self) -> Vec<(u16, u8)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match *event {
                Event::PortWrite(port, value) => Some((port, value)),
                _ => None,
            })
            .collect()
    }

    pub fn writes_to(&self, port: u16) -> Vec<u8> {
        self.port_writes()
            .into_iter()
            .filter(|&(p, _)| p == port)
            .map(|(_, value)| value)
            .collect()
    }

    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }
}

impl PortIo for MockPlatform {
    fn read_u8(&self, port: u16) -> u8 {
        self.reads
            .lock()
            .get_mut(&port)
            .and_then(VecDeque::pop_front)
            .unwrap_or(0)
    }

    fn write_u8(&self, port: u16, value: u8) {
        self.record(Event::PortWrite(port, value));
    }

    fn read_u16(&self, port: u16) -> u16 {
        u16::from(self.read_u8(port))
    }

    fn write_u16(&self, port: u16, value: u16) {
        self.record(Event::PortWriteWide(port, u32::from(value)));
    }

    fn read_u32(&self, port: u16) -> u32 {
        u32::from(self.read_u8(port))
    }

    fn write_u32(&self, port: u16, value: u32) {
        self.record(Event::PortWriteWide(port, value));
    }
}

impl Cpu for MockPlatform {
    unsafe fn load_gdt(&self, pointer: DescriptorTablePointer) {
        self.record(Event::LoadGdt(pointer));
    }

    unsafe fn load_idt(&self, pointer: DescriptorTablePointer) {
        self.record(Event::LoadIdt(pointer));
    }

    unsafe fn reload_segments(&self, code: SegmentSelector, data: SegmentSelector) {
        self.record(Event::ReloadSegments { code: code.0, data: data.0 });
    }

    fn enable_interrupts(&self) {
        self.interrupts.store(true, Ordering::SeqCst);
        self.record(Event::EnableInterrupts);
    }

    fn disable_interrupts(&self) {
        self.interrupts.store(false, Ordering::SeqCst);
        self.record(Event::DisableInterrupts);
    }

    fn interrupts_enabled(&self) -> bool {
        self.interrupts.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingConsole {
    lines: Mutex<Vec<String>>,
}

impl RecordingConsole {
    pub fn leaked() -> &'static Self {
        leak(Self::default())
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl Console for RecordingConsole {
    fn write_bytes(&self, bytes: &[u8]) {
        self.lines.lock().push(String::from_utf8_lossy(bytes).into_owned());
    }
}

pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}
