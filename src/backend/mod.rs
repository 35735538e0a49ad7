//! The abstract operations a concrete debugger backend must implement
//! (spec.md §4.6), plus the three concrete backends the spec names.

pub mod gdb_remote;
pub mod instrumentation;
pub mod native;

use crate::condition::{Expr, MemorySource, RegisterSource};
use crate::error::Error;
use crate::model::{
    Address, BreakpointKind, DebuggerOptions, ExceptionAction, Module, RegisterDescriptor,
    RegisterValue, Thread,
};

/// A concrete debugger backend: native OS debugger API, GDB-remote stub, or
/// instrumentation client (spec.md §4.6).
pub trait Backend {
    fn attach(&mut self) -> Result<(), Error>;
    fn start(&mut self, path: &str, argv: &[String]) -> Result<(), Error>;
    fn detach(&mut self) -> Result<(), Error>;
    fn terminate(&mut self) -> Result<(), Error>;

    fn enumerate_threads(&mut self) -> Result<Vec<Thread>, Error>;
    fn active_thread(&self) -> Option<u32>;
    fn set_active_thread(&mut self, tid: u32) -> Result<(), Error>;

    fn read_registers(&mut self, tid: u32) -> Result<Vec<RegisterValue>, Error>;
    fn write_register(&mut self, tid: u32, name: &str, value: u64) -> Result<(), Error>;

    fn read_memory(&mut self, addr: Address, size: usize) -> Result<Vec<u8>, Error>;
    fn write_memory(&mut self, addr: Address, bytes: &[u8]) -> Result<(), Error>;
    fn enumerate_valid_memory(&mut self) -> Result<Vec<(Address, Address)>, Error>;

    fn set_breakpoint(&mut self, addr: Address, kind: BreakpointKind) -> Result<(), Error>;
    fn remove_breakpoint(&mut self, addr: Address, kind: BreakpointKind) -> Result<(), Error>;

    fn single_step(&mut self, tid: u32) -> Result<(), Error>;
    fn resume_thread(&mut self, tid: u32) -> Result<(), Error>;
    fn resume_process(&mut self) -> Result<(), Error>;
    fn suspend_thread(&mut self, tid: u32) -> Result<(), Error>;
    fn halt(&mut self) -> Result<(), Error>;

    fn register_layout(&self) -> &[RegisterDescriptor];
    fn instruction_pointer_index(&self) -> usize;
    fn address_size_bits(&self) -> u32;

    fn options(&self) -> &DebuggerOptions;

    /// On architectures where the trap delivers PC+1 (x86), returns
    /// `addr - 1`; identity everywhere else (spec.md §4.6).
    fn correct_breakpoint_address(&self, addr: Address) -> Address {
        addr
    }

    /// Drains events this backend has produced since the last call.
    /// Backends that run a producer thread feed an `EventQueue`
    /// (spec.md §4.4) directly and this simply forwards from it; backends
    /// that are purely synchronous (like the native-memory test double)
    /// can implement this by returning an empty `Vec`.
    fn poll_events(&mut self) -> Vec<crate::model::DebugEvent>;

    /// Enumerates currently loaded modules, deduplicated by `(name,
    /// base_address, size)` (spec.md §3).
    fn enumerate_modules(&mut self) -> Result<Vec<Module>, Error> {
        Ok(Vec::new())
    }

    /// The condition attached to the breakpoint of `kind` at `addr`, if any
    /// (spec.md §4.3: "a breakpoint may carry a condition AST"). Backends
    /// that keep their own `BreakpointTable` override this; the default
    /// suits a backend with no breakpoints of its own (e.g. one still being
    /// built out).
    fn breakpoint_condition(&self, _addr: Address, _kind: BreakpointKind) -> Option<Expr> {
        None
    }

    /// Attaches or clears the condition on an already-installed breakpoint
    /// (`cmd_set_breakpoint_condition`, spec.md §6).
    fn set_breakpoint_condition(
        &mut self,
        _addr: Address,
        _kind: BreakpointKind,
        _condition: Option<Expr>,
    ) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    /// Every `(address, kind)` pair currently installed, used by
    /// `clear_all_breakpoints`'s default implementation.
    fn installed_breakpoints(&self) -> Vec<(Address, BreakpointKind)> {
        Vec::new()
    }

    /// Removes every installed breakpoint (`cmd_clearall`, spec.md §6).
    fn clear_all_breakpoints(&mut self) -> Result<(), Error> {
        for (addr, kind) in self.installed_breakpoints() {
            self.remove_breakpoint(addr, kind)?;
        }
        Ok(())
    }

    /// Forwards the front end's `cmd_set_exceptions_options` disposition
    /// for `code` to the backend (spec.md §4.10: "`pass_to_app` and
    /// `skip_handler` are forwarded to the backend"), so that a later
    /// `continue_past_exception` for that code knows which one to pick.
    /// Backends with no such distinction keep the default no-op; the
    /// core's own `ExceptionPolicy` is what decides whether to halt at all.
    fn set_exception_action(&mut self, _code: u32, _action: ExceptionAction) -> Result<(), Error> {
        Ok(())
    }

    /// Continues the target past an exception the core classified
    /// `pass_to_app` or `skip_handler` instead of `halt` (spec.md §4.10).
    /// The default just resumes the process; backends that can actually
    /// distinguish forwarding the exception to the target's own handler
    /// from silently skipping it override this.
    fn continue_past_exception(&mut self, _tid: u32, _code: u32) -> Result<(), Error> {
        self.resume_process()
    }
}

/// Lets the agent binary hold whichever concrete backend a connection
/// string selects behind one type, instead of writing `DebuggerCore` three
/// times over (spec.md §6: the CLI picks the backend at accept time).
impl Backend for Box<dyn Backend> {
    fn attach(&mut self) -> Result<(), Error> {
        (**self).attach()
    }

    fn start(&mut self, path: &str, argv: &[String]) -> Result<(), Error> {
        (**self).start(path, argv)
    }

    fn detach(&mut self) -> Result<(), Error> {
        (**self).detach()
    }

    fn terminate(&mut self) -> Result<(), Error> {
        (**self).terminate()
    }

    fn enumerate_threads(&mut self) -> Result<Vec<Thread>, Error> {
        (**self).enumerate_threads()
    }

    fn active_thread(&self) -> Option<u32> {
        (**self).active_thread()
    }

    fn set_active_thread(&mut self, tid: u32) -> Result<(), Error> {
        (**self).set_active_thread(tid)
    }

    fn read_registers(&mut self, tid: u32) -> Result<Vec<RegisterValue>, Error> {
        (**self).read_registers(tid)
    }

    fn write_register(&mut self, tid: u32, name: &str, value: u64) -> Result<(), Error> {
        (**self).write_register(tid, name, value)
    }

    fn read_memory(&mut self, addr: Address, size: usize) -> Result<Vec<u8>, Error> {
        (**self).read_memory(addr, size)
    }

    fn write_memory(&mut self, addr: Address, bytes: &[u8]) -> Result<(), Error> {
        (**self).write_memory(addr, bytes)
    }

    fn enumerate_valid_memory(&mut self) -> Result<Vec<(Address, Address)>, Error> {
        (**self).enumerate_valid_memory()
    }

    fn set_breakpoint(&mut self, addr: Address, kind: BreakpointKind) -> Result<(), Error> {
        (**self).set_breakpoint(addr, kind)
    }

    fn remove_breakpoint(&mut self, addr: Address, kind: BreakpointKind) -> Result<(), Error> {
        (**self).remove_breakpoint(addr, kind)
    }

    fn single_step(&mut self, tid: u32) -> Result<(), Error> {
        (**self).single_step(tid)
    }

    fn resume_thread(&mut self, tid: u32) -> Result<(), Error> {
        (**self).resume_thread(tid)
    }

    fn resume_process(&mut self) -> Result<(), Error> {
        (**self).resume_process()
    }

    fn suspend_thread(&mut self, tid: u32) -> Result<(), Error> {
        (**self).suspend_thread(tid)
    }

    fn halt(&mut self) -> Result<(), Error> {
        (**self).halt()
    }

    fn register_layout(&self) -> &[RegisterDescriptor] {
        (**self).register_layout()
    }

    fn instruction_pointer_index(&self) -> usize {
        (**self).instruction_pointer_index()
    }

    fn address_size_bits(&self) -> u32 {
        (**self).address_size_bits()
    }

    fn options(&self) -> &DebuggerOptions {
        (**self).options()
    }

    fn correct_breakpoint_address(&self, addr: Address) -> Address {
        (**self).correct_breakpoint_address(addr)
    }

    fn poll_events(&mut self) -> Vec<crate::model::DebugEvent> {
        (**self).poll_events()
    }

    fn enumerate_modules(&mut self) -> Result<Vec<Module>, Error> {
        (**self).enumerate_modules()
    }

    fn breakpoint_condition(&self, addr: Address, kind: BreakpointKind) -> Option<Expr> {
        (**self).breakpoint_condition(addr, kind)
    }

    fn set_breakpoint_condition(
        &mut self,
        addr: Address,
        kind: BreakpointKind,
        condition: Option<Expr>,
    ) -> Result<(), Error> {
        (**self).set_breakpoint_condition(addr, kind, condition)
    }

    fn installed_breakpoints(&self) -> Vec<(Address, BreakpointKind)> {
        (**self).installed_breakpoints()
    }

    fn clear_all_breakpoints(&mut self) -> Result<(), Error> {
        (**self).clear_all_breakpoints()
    }

    fn set_exception_action(&mut self, code: u32, action: ExceptionAction) -> Result<(), Error> {
        (**self).set_exception_action(code, action)
    }

    fn continue_past_exception(&mut self, tid: u32, code: u32) -> Result<(), Error> {
        (**self).continue_past_exception(tid, code)
    }
}

/// Adapts a `Backend`'s active-thread registers to the condition
/// evaluator's `RegisterSource` (spec.md §4.3).
pub struct BackendRegisterSource<'a> {
    pub tid: u32,
    pub registers: &'a [RegisterValue],
}

impl<'a> RegisterSource for BackendRegisterSource<'a> {
    fn active_tid(&self) -> u32 {
        self.tid
    }

    fn register(&self, name: &str) -> Option<u32> {
        self.registers
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .and_then(|r| u32::from_str_radix(r.hex_value.trim_start_matches("0x"), 16).ok())
    }
}

/// Adapts a `Backend`'s memory-read primitive to the condition evaluator's
/// `MemorySource`.
pub struct BackendMemorySource<'a> {
    pub backend: std::cell::RefCell<&'a mut dyn Backend>,
}

impl<'a> MemorySource for BackendMemorySource<'a> {
    fn read_u32(&self, addr: u32) -> Option<u32> {
        let mut backend = self.backend.borrow_mut();
        let bytes = backend.read_memory(addr as Address, 4).ok()?;
        if bytes.len() != 4 {
            return None;
        }
        Some(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}
