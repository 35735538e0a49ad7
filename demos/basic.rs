//! A minimal demo of `navi_agent` end to end: an in-memory "process" made
//! of a few NOPs and a software breakpoint opcode, served over a real TCP
//! socket through a `NativeBackend<PlatformOps>` implementation.
//!
//! Grounded on the teacher's `examples/basic.rs` (`DummyTarget` stepping
//! over `0x90` bytes until it hits `0xCC`), adapted from the teacher's
//! single `StubCalls` trait to this crate's `PlatformOps` seam (spec.md
//! §4.6, §4.8).

use std::net::TcpListener;
use std::sync::Arc;

use navi_agent::backend::native::{NativeBackend, PlatformOps};
use navi_agent::error::Error;
use navi_agent::event_queue::EventQueue;
use navi_agent::model::{
    Address, BreakpointKind, DebugEvent, DebuggerOptions, Module, RegisterDescriptor, RegisterValue,
};
use navi_agent::transport::TcpTransport;
use navi_agent::DebuggerCore;

const MEMORY: &[u8] = &[
    0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, // 0x00
    0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, // 0x08
    0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, // 0x10
    0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, // 0x18
];

const REGISTERS: &[RegisterDescriptor] = &[RegisterDescriptor { name: "eip", byte_size: 4, editable: true }];

/// A single-threaded in-memory target: one register (`eip`), one chunk of
/// writable memory, no real process behind it.
struct DummyTarget {
    eip: u32,
    mem: Vec<u8>,
    events: Arc<EventQueue>,
}

impl PlatformOps for DummyTarget {
    fn attach(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn start(&mut self, path: &str, _argv: &[String]) -> Result<(), Error> {
        let module = Module {
            name: path.to_string(),
            path: path.to_string(),
            base_address: 0,
            size: self.mem.len() as u64,
        };
        self.events.push(DebugEvent::ProcessStarted { module, tid: 0 });
        Ok(())
    }

    fn detach(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), Error> {
        self.events.push(DebugEvent::ProcessExited { exit_code: Some(0) });
        Ok(())
    }

    fn enumerate_threads(&mut self) -> Result<Vec<u32>, Error> {
        Ok(vec![0])
    }

    fn read_registers(&mut self, _tid: u32) -> Result<Vec<RegisterValue>, Error> {
        Ok(vec![RegisterValue {
            name: "eip",
            hex_value: format!("{:08x}", self.eip),
            pointed_memory: None,
            is_pc: true,
            is_sp: false,
        }])
    }

    fn write_register(&mut self, _tid: u32, name: &str, value: u64) -> Result<(), Error> {
        if name.eq_ignore_ascii_case("eip") {
            self.eip = value as u32;
            Ok(())
        } else {
            Err(Error::CouldntWriteRegisters)
        }
    }

    fn read_memory(&mut self, addr: Address, size: usize) -> Result<Vec<u8>, Error> {
        let addr = addr as usize;
        self.mem.get(addr..addr + size).map(|s| s.to_vec()).ok_or(Error::CouldntReadMemory)
    }

    fn write_memory(&mut self, addr: Address, bytes: &[u8]) -> Result<(), Error> {
        let addr = addr as usize;
        let dst = self.mem.get_mut(addr..addr + bytes.len()).ok_or(Error::CouldntWriteMemory)?;
        dst.copy_from_slice(bytes);
        Ok(())
    }

    fn enumerate_valid_memory(&mut self) -> Result<Vec<(Address, Address)>, Error> {
        Ok(vec![(0, self.mem.len() as Address)])
    }

    fn single_step(&mut self, tid: u32) -> Result<(), Error> {
        let opcode = self.mem.get(self.eip as usize).copied().ok_or(Error::CouldntReadMemory)?;
        self.eip += 1;
        if opcode == 0xCC {
            self.events.push(DebugEvent::BreakpointHit {
                kind: BreakpointKind::Simple,
                address: self.eip as Address - 1,
                tid,
                registers: None,
            });
        }
        Ok(())
    }

    fn resume_thread(&mut self, tid: u32) -> Result<(), Error> {
        self.resume_process()?;
        let _ = tid;
        Ok(())
    }

    fn resume_process(&mut self) -> Result<(), Error> {
        loop {
            match self.mem.get(self.eip as usize) {
                Some(0x90) => self.eip += 1,
                Some(0xCC) => {
                    self.events.push(DebugEvent::BreakpointHit {
                        kind: BreakpointKind::Simple,
                        address: self.eip as Address,
                        tid: 0,
                        registers: None,
                    });
                    return Ok(());
                }
                _ => return Err(Error::Generic("ran off the end of memory".into())),
            }
        }
    }

    fn suspend_thread(&mut self, _tid: u32) -> Result<(), Error> {
        Ok(())
    }

    fn halt(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn register_layout(&self) -> &[RegisterDescriptor] {
        REGISTERS
    }

    fn instruction_pointer_index(&self) -> usize {
        0
    }

    fn address_size_bits(&self) -> u32 {
        32
    }
}

fn main() {
    env_logger::init();

    let listener = TcpListener::bind("127.0.0.1:9001").expect("bind");
    println!("waiting for a front end on 127.0.0.1:9001");
    let (stream, addr) = listener.accept().expect("accept");
    println!("incoming connection from {}", addr);

    let events = Arc::new(EventQueue::new());
    let target = DummyTarget { eip: 0x10, mem: Vec::from(MEMORY), events: Arc::clone(&events) };

    let mut options = DebuggerOptions::default();
    options.can_software_breakpoint = true;
    options.can_halt = true;
    options.can_attach = true;

    let backend = NativeBackend::new(target, options, vec![0xCC], events);
    let transport = TcpTransport::new(stream).expect("configure transport");
    let mut core = DebuggerCore::new(backend, transport);

    core.send_handshake().expect("handshake");
    match core.run() {
        Ok(()) => {}
        Err(e) => eprintln!("lost debugger connection: {}", e),
    }
}
