//! Native OS debugger backend (spec.md §4.8).
//!
//! The platform-specific syscalls this backend needs (process creation,
//! thread enumeration, memory and register access through a debug API) are
//! an explicit non-goal of spec.md §1: "Platform-specific syscalls for
//! process creation and inspection (spec only defines the interface the
//! backend must implement)". `PlatformOps` is that interface; this module
//! implements everything above it — breakpoint installation via
//! `read_memory`/`write_memory`, the `Backend` trait plumbing — and leaves
//! `PlatformOps` itself to be supplied by a real OS integration outside
//! this crate's scope. A `cfg(test)` fake backs it with an in-memory byte
//! buffer so the breakpoint-table and dispatch-core tests have a concrete
//! target to drive.

use std::sync::Arc;

use crate::breakpoint::BreakpointTable;
use crate::error::Error;
use crate::event_queue::EventQueue;
use crate::model::{
    Address, BreakpointKind, DebugEvent, DebuggerOptions, ExceptionAction, Module,
    RegisterDescriptor, RegisterValue, Thread,
};

use super::Backend;

/// The platform-specific primitives a native backend needs. Left
/// unimplemented for any real OS per spec.md §1; a correct implementation
/// is expected to wrap the platform's debug API (`ptrace`, `Debug*` on
/// Windows, Mach `task_for_pid`, …) outside this crate.
pub trait PlatformOps {
    fn attach(&mut self) -> Result<(), Error>;
    fn start(&mut self, path: &str, argv: &[String]) -> Result<(), Error>;
    fn detach(&mut self) -> Result<(), Error>;
    fn terminate(&mut self) -> Result<(), Error>;

    fn enumerate_threads(&mut self) -> Result<Vec<u32>, Error>;

    fn read_registers(&mut self, tid: u32) -> Result<Vec<RegisterValue>, Error>;
    fn write_register(&mut self, tid: u32, name: &str, value: u64) -> Result<(), Error>;

    fn read_memory(&mut self, addr: Address, size: usize) -> Result<Vec<u8>, Error>;
    fn write_memory(&mut self, addr: Address, bytes: &[u8]) -> Result<(), Error>;
    fn enumerate_valid_memory(&mut self) -> Result<Vec<(Address, Address)>, Error>;

    fn single_step(&mut self, tid: u32) -> Result<(), Error>;
    fn resume_thread(&mut self, tid: u32) -> Result<(), Error>;
    fn resume_process(&mut self) -> Result<(), Error>;
    fn suspend_thread(&mut self, tid: u32) -> Result<(), Error>;
    fn halt(&mut self) -> Result<(), Error>;

    fn register_layout(&self) -> &[RegisterDescriptor];
    fn instruction_pointer_index(&self) -> usize;
    fn address_size_bits(&self) -> u32;

    fn enumerate_modules(&mut self) -> Result<Vec<Module>, Error> {
        Ok(Vec::new())
    }

    /// Continues `tid` past an exception with the given disposition,
    /// translated onto the platform's own continue-status concept (e.g.
    /// Windows `ContinueDebugEvent`'s `DBG_CONTINUE` for `skip_handler` vs
    /// `DBG_EXCEPTION_NOT_HANDLED` for `pass_to_app`). Left unimplemented
    /// for any real OS per spec.md §1.
    fn continue_exception(&mut self, tid: u32, action: ExceptionAction) -> Result<(), Error>;
}

/// A `Backend` built over a platform-specific debug API (spec.md §4.8).
///
/// Breakpoint installation is implemented here, not delegated to
/// `PlatformOps`, because it is the same `read_memory`+`write_memory`+
/// `BreakpointTable` recipe the GDB-remote backend uses (spec.md §4.5).
pub struct NativeBackend<P: PlatformOps> {
    platform: P,
    options: DebuggerOptions,
    events: Arc<EventQueue>,
    breakpoints: BreakpointTable,
    active_tid: Option<u32>,
    breakpoint_opcode: Vec<u8>,
    exception_actions: Vec<(u32, ExceptionAction)>,
}

impl<P: PlatformOps> NativeBackend<P> {
    pub fn new(platform: P, options: DebuggerOptions, breakpoint_opcode: Vec<u8>, events: Arc<EventQueue>) -> Self {
        NativeBackend {
            platform,
            options,
            events,
            breakpoints: BreakpointTable::new(),
            active_tid: None,
            breakpoint_opcode,
            exception_actions: Vec::new(),
        }
    }

    /// Pushes a `DebugEvent` the platform layer has reported, so that a
    /// concrete `PlatformOps` implementation can drive events into the
    /// shared queue without depending on the `Backend` trait.
    pub fn event_sink(&self) -> Arc<EventQueue> {
        Arc::clone(&self.events)
    }
}

impl<P: PlatformOps> Backend for NativeBackend<P> {
    fn attach(&mut self) -> Result<(), Error> {
        if !self.options.can_attach {
            return Err(Error::Unsupported);
        }
        self.platform.attach()
    }

    fn start(&mut self, path: &str, argv: &[String]) -> Result<(), Error> {
        self.platform.start(path, argv)
    }

    fn detach(&mut self) -> Result<(), Error> {
        if !self.options.can_detach {
            return Err(Error::Unsupported);
        }
        self.platform.detach()
    }

    fn terminate(&mut self) -> Result<(), Error> {
        if !self.options.can_terminate {
            return Err(Error::Unsupported);
        }
        self.platform.terminate()
    }

    fn enumerate_threads(&mut self) -> Result<Vec<Thread>, Error> {
        Ok(self.platform.enumerate_threads()?.into_iter().map(Thread::new).collect())
    }

    fn active_thread(&self) -> Option<u32> {
        self.active_tid
    }

    fn set_active_thread(&mut self, tid: u32) -> Result<(), Error> {
        self.active_tid = Some(tid);
        Ok(())
    }

    fn read_registers(&mut self, tid: u32) -> Result<Vec<RegisterValue>, Error> {
        self.platform.read_registers(tid)
    }

    fn write_register(&mut self, tid: u32, name: &str, value: u64) -> Result<(), Error> {
        self.platform.write_register(tid, name, value)
    }

    fn read_memory(&mut self, addr: Address, size: usize) -> Result<Vec<u8>, Error> {
        self.platform.read_memory(addr, size)
    }

    fn write_memory(&mut self, addr: Address, bytes: &[u8]) -> Result<(), Error> {
        self.platform.write_memory(addr, bytes)
    }

    fn enumerate_valid_memory(&mut self) -> Result<Vec<(Address, Address)>, Error> {
        if !self.options.can_valid_memory {
            return Err(Error::Unsupported);
        }
        self.platform.enumerate_valid_memory()
    }

    fn set_breakpoint(&mut self, addr: Address, kind: BreakpointKind) -> Result<(), Error> {
        if !self.options.can_software_breakpoint {
            return Err(Error::Unsupported);
        }
        if self.breakpoints.original_bytes(addr).is_none() {
            let original = self.platform.read_memory(addr, self.breakpoint_opcode.len())?;
            self.breakpoints.store_original_bytes(addr, original);
        }
        let opcode = self.breakpoint_opcode.clone();
        self.platform.write_memory(addr, &opcode)?;
        self.breakpoints
            .add(addr, kind, kind == BreakpointKind::Echo, true, None)
            .map(|_| ())
    }

    fn remove_breakpoint(&mut self, addr: Address, kind: BreakpointKind) -> Result<(), Error> {
        if let Some(original) = self.breakpoints.remove(addr, kind)? {
            self.platform.write_memory(addr, &original)?;
        }
        Ok(())
    }

    fn single_step(&mut self, tid: u32) -> Result<(), Error> {
        self.platform.single_step(tid)
    }

    fn resume_thread(&mut self, tid: u32) -> Result<(), Error> {
        if !self.options.can_multithread {
            return Err(Error::Unsupported);
        }
        self.platform.resume_thread(tid)
    }

    fn resume_process(&mut self) -> Result<(), Error> {
        self.platform.resume_process()
    }

    fn suspend_thread(&mut self, tid: u32) -> Result<(), Error> {
        if !self.options.can_multithread {
            return Err(Error::Unsupported);
        }
        self.platform.suspend_thread(tid)
    }

    fn halt(&mut self) -> Result<(), Error> {
        if !self.options.can_halt {
            return Err(Error::Unsupported);
        }
        self.platform.halt()
    }

    fn register_layout(&self) -> &[RegisterDescriptor] {
        self.platform.register_layout()
    }

    fn instruction_pointer_index(&self) -> usize {
        self.platform.instruction_pointer_index()
    }

    fn address_size_bits(&self) -> u32 {
        self.platform.address_size_bits()
    }

    fn options(&self) -> &DebuggerOptions {
        &self.options
    }

    fn poll_events(&mut self) -> Vec<DebugEvent> {
        self.events.drain_all()
    }

    fn enumerate_modules(&mut self) -> Result<Vec<Module>, Error> {
        self.platform.enumerate_modules()
    }

    fn breakpoint_condition(&self, addr: Address, kind: BreakpointKind) -> Option<crate::condition::Expr> {
        self.breakpoints.lookup_kind(addr, kind).and_then(|bp| bp.condition.clone())
    }

    fn set_breakpoint_condition(
        &mut self,
        addr: Address,
        kind: BreakpointKind,
        condition: Option<crate::condition::Expr>,
    ) -> Result<(), Error> {
        self.breakpoints.set_condition(addr, kind, condition)
    }

    fn installed_breakpoints(&self) -> Vec<(Address, BreakpointKind)> {
        self.breakpoints.iter().map(|bp| (bp.address, bp.kind)).collect()
    }

    fn set_exception_action(&mut self, code: u32, action: ExceptionAction) -> Result<(), Error> {
        if let Some(entry) = self.exception_actions.iter_mut().find(|(c, _)| *c == code) {
            entry.1 = action;
        } else {
            self.exception_actions.push((code, action));
        }
        Ok(())
    }

    fn continue_past_exception(&mut self, tid: u32, code: u32) -> Result<(), Error> {
        let action = self
            .exception_actions
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, a)| *a)
            .unwrap_or(ExceptionAction::SkipHandler);
        self.platform.continue_exception(tid, action)
    }
}

/// A `PlatformOps` that implements none of it, so that `src/bin/agent.rs`
/// has a concrete type to build a `NativeBackend` with for process-id and
/// program-path targets before a real OS integration exists. Every call
/// fails with `Error::Unsupported`, matching spec.md §1's framing of the
/// native backend as an interface a real platform layer fills in.
pub struct UnimplementedPlatform;

impl PlatformOps for UnimplementedPlatform {
    fn attach(&mut self) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn start(&mut self, _path: &str, _argv: &[String]) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn detach(&mut self) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn terminate(&mut self) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn enumerate_threads(&mut self) -> Result<Vec<u32>, Error> {
        Err(Error::Unsupported)
    }

    fn read_registers(&mut self, _tid: u32) -> Result<Vec<RegisterValue>, Error> {
        Err(Error::Unsupported)
    }

    fn write_register(&mut self, _tid: u32, _name: &str, _value: u64) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn read_memory(&mut self, _addr: Address, _size: usize) -> Result<Vec<u8>, Error> {
        Err(Error::Unsupported)
    }

    fn write_memory(&mut self, _addr: Address, _bytes: &[u8]) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn enumerate_valid_memory(&mut self) -> Result<Vec<(Address, Address)>, Error> {
        Err(Error::Unsupported)
    }

    fn single_step(&mut self, _tid: u32) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn resume_thread(&mut self, _tid: u32) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn resume_process(&mut self) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn suspend_thread(&mut self, _tid: u32) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn halt(&mut self) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn register_layout(&self) -> &[RegisterDescriptor] {
        &[]
    }

    fn instruction_pointer_index(&self) -> usize {
        0
    }

    fn address_size_bits(&self) -> u32 {
        0
    }

    fn continue_exception(&mut self, _tid: u32, _action: ExceptionAction) -> Result<(), Error> {
        Err(Error::Unsupported)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! An in-memory `PlatformOps` double standing in for a real OS
    //! integration, grounded on the teacher's `examples/basic.rs`
    //! `DummyTarget` (a byte buffer pretending to be a debugged process).

    use super::*;
    use std::collections::HashMap;

    pub struct FakePlatform {
        pub memory: Vec<u8>,
        pub memory_base: Address,
        pub registers: HashMap<u32, Vec<RegisterValue>>,
        pub threads: Vec<u32>,
        pub attached: bool,
    }

    const LAYOUT: &[RegisterDescriptor] = &[
        RegisterDescriptor { name: "PC", byte_size: 4, editable: true },
        RegisterDescriptor { name: "SP", byte_size: 4, editable: true },
    ];

    impl FakePlatform {
        pub fn new(memory_base: Address, memory: Vec<u8>) -> Self {
            let mut registers = HashMap::new();
            registers.insert(1, vec![
                RegisterValue { name: "PC", hex_value: "0x0".into(), pointed_memory: None, is_pc: true, is_sp: false },
                RegisterValue { name: "SP", hex_value: "0x0".into(), pointed_memory: None, is_pc: false, is_sp: true },
            ]);
            FakePlatform {
                memory,
                memory_base,
                registers,
                threads: vec![1],
                attached: false,
            }
        }
    }

    impl PlatformOps for FakePlatform {
        fn attach(&mut self) -> Result<(), Error> {
            self.attached = true;
            Ok(())
        }

        fn start(&mut self, _path: &str, _argv: &[String]) -> Result<(), Error> {
            self.attached = true;
            Ok(())
        }

        fn detach(&mut self) -> Result<(), Error> {
            self.attached = false;
            Ok(())
        }

        fn terminate(&mut self) -> Result<(), Error> {
            self.attached = false;
            Ok(())
        }

        fn enumerate_threads(&mut self) -> Result<Vec<u32>, Error> {
            Ok(self.threads.clone())
        }

        fn read_registers(&mut self, tid: u32) -> Result<Vec<RegisterValue>, Error> {
            self.registers.get(&tid).cloned().ok_or(Error::CouldntReadRegisters)
        }

        fn write_register(&mut self, tid: u32, name: &str, value: u64) -> Result<(), Error> {
            let regs = self.registers.get_mut(&tid).ok_or(Error::CouldntWriteRegisters)?;
            let reg = regs.iter_mut().find(|r| r.name == name).ok_or(Error::CouldntWriteRegisters)?;
            reg.hex_value = format!("{:#x}", value);
            Ok(())
        }

        fn read_memory(&mut self, addr: Address, size: usize) -> Result<Vec<u8>, Error> {
            let offset = addr.checked_sub(self.memory_base).ok_or(Error::CouldntReadMemory)? as usize;
            self.memory
                .get(offset..offset + size)
                .map(|s| s.to_vec())
                .ok_or(Error::CouldntReadMemory)
        }

        fn write_memory(&mut self, addr: Address, bytes: &[u8]) -> Result<(), Error> {
            let offset = addr.checked_sub(self.memory_base).ok_or(Error::CouldntWriteMemory)? as usize;
            let slice = self
                .memory
                .get_mut(offset..offset + bytes.len())
                .ok_or(Error::CouldntWriteMemory)?;
            slice.copy_from_slice(bytes);
            Ok(())
        }

        fn enumerate_valid_memory(&mut self) -> Result<Vec<(Address, Address)>, Error> {
            Ok(vec![(self.memory_base, self.memory_base + self.memory.len() as Address)])
        }

        fn single_step(&mut self, _tid: u32) -> Result<(), Error> {
            Ok(())
        }

        fn resume_thread(&mut self, _tid: u32) -> Result<(), Error> {
            Ok(())
        }

        fn resume_process(&mut self) -> Result<(), Error> {
            Ok(())
        }

        fn suspend_thread(&mut self, _tid: u32) -> Result<(), Error> {
            Ok(())
        }

        fn halt(&mut self) -> Result<(), Error> {
            Ok(())
        }

        fn register_layout(&self) -> &[RegisterDescriptor] {
            LAYOUT
        }

        fn instruction_pointer_index(&self) -> usize {
            0
        }

        fn address_size_bits(&self) -> u32 {
            32
        }

        fn continue_exception(&mut self, _tid: u32, _action: ExceptionAction) -> Result<(), Error> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakePlatform;
    use super::*;

    fn backend() -> NativeBackend<FakePlatform> {
        let memory = vec![0x90; 0x40];
        let platform = FakePlatform::new(0x1000, memory);
        let mut options = DebuggerOptions::default();
        options.can_attach = true;
        options.can_detach = true;
        NativeBackend::new(platform, options, vec![0xCC], Arc::new(EventQueue::new()))
    }

    #[test]
    fn set_then_remove_breakpoint_restores_bytes() {
        let mut backend = backend();
        backend.set_breakpoint(0x1000, BreakpointKind::Simple).unwrap();
        assert_eq!(backend.read_memory(0x1000, 1).unwrap(), vec![0xCC]);
        backend.remove_breakpoint(0x1000, BreakpointKind::Simple).unwrap();
        assert_eq!(backend.read_memory(0x1000, 1).unwrap(), vec![0x90]);
    }

    #[test]
    fn attach_respects_capability_flag() {
        let platform = FakePlatform::new(0x1000, vec![0; 4]);
        let options = DebuggerOptions::default(); // can_attach: false
        let mut backend = NativeBackend::new(platform, options, vec![0xCC], Arc::new(EventQueue::new()));
        assert!(matches!(backend.attach(), Err(Error::Unsupported)));
    }

    #[test]
    fn enumerate_threads_delegates_to_platform() {
        let mut backend = backend();
        let threads = backend.enumerate_threads().unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].tid, 1);
    }

    #[test]
    fn register_round_trip() {
        let mut backend = backend();
        backend.write_register(1, "PC", 0x2000).unwrap();
        let regs = backend.read_registers(1).unwrap();
        assert_eq!(regs.iter().find(|r| r.name == "PC").unwrap().hex_value, "0x2000");
    }

    #[test]
    fn continue_past_exception_uses_the_stored_action() {
        use crate::model::ExceptionAction;

        let mut backend = backend();
        backend.set_exception_action(0x80000002, ExceptionAction::PassToApp).unwrap();
        assert!(backend.continue_past_exception(1, 0x80000002).is_ok());
        assert!(backend.continue_past_exception(1, 0x80000003).is_ok());
    }
}
