//! The data model shared by the wire codec, the breakpoint table, the
//! backend trait and the debugger core (spec.md §3).

use std::convert::TryFrom;

use crate::error::Error;

/// A target address, always a plain 64-bit unsigned integer internally.
///
/// On the wire this is carried as a `(high32, low32)` pair regardless of
/// target width; a 32-bit build simply never sets the high word (spec.md
/// §4.1, REDESIGN FLAGS "address-width conditional compilation").
pub type Address = u64;

/// The kind of a breakpoint (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BreakpointKind {
    /// A plain breakpoint: reported to the front end, target stays suspended.
    Simple,
    /// Reports registers once, then auto-resumes the target.
    Echo,
    /// Approximates hardware single-step tracing.
    Stepping,
}

impl TryFrom<u32> for BreakpointKind {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Error> {
        match value {
            0 => Ok(BreakpointKind::Simple),
            1 => Ok(BreakpointKind::Echo),
            2 => Ok(BreakpointKind::Stepping),
            _ => Err(Error::MalformedPacket),
        }
    }
}

impl From<BreakpointKind> for u32 {
    fn from(kind: BreakpointKind) -> u32 {
        match kind {
            BreakpointKind::Simple => 0,
            BreakpointKind::Echo => 1,
            BreakpointKind::Stepping => 2,
        }
    }
}

/// A single breakpoint installed at some address (spec.md §3).
#[derive(Debug, Clone)]
pub struct Breakpoint {
    pub kind: BreakpointKind,
    pub address: Address,
    pub id: u32,
    pub auto_resume: bool,
    pub send_registers: bool,
    /// Bytes replaced by the trap opcode; shared by every breakpoint at the
    /// same address regardless of kind (captured exactly once).
    pub original_bytes: Vec<u8>,
    pub condition: Option<crate::condition::Expr>,
}

/// Whether a thread is currently running or halted at a trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Suspended,
}

/// A thread known to the debugger core (spec.md §3).
///
/// `registers` is populated on demand and considered stale between
/// operations; callers must re-read it whenever the target is suspended.
#[derive(Debug, Clone)]
pub struct Thread {
    pub tid: u32,
    pub state: ThreadState,
    pub registers: Vec<RegisterValue>,
}

impl Thread {
    pub fn new(tid: u32) -> Self {
        Thread {
            tid,
            state: ThreadState::Suspended,
            registers: Vec::new(),
        }
    }
}

/// A loaded module (spec.md §3).
///
/// Equality is by `(name, base_address, size)`; ordering is by `path` (used
/// to deduplicate module lists returned by a backend).
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub path: String,
    pub base_address: Address,
    pub size: u64,
}

impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.base_address == other.base_address
            && self.size == other.size
    }
}
impl Eq for Module {}

impl PartialOrd for Module {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Module {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.path.cmp(&other.path)
    }
}

/// Static description of one register (spec.md §3).
///
/// `byte_size == 0` denotes a single-bit flag derived from a host register
/// (e.g. x86 `ZF` from `EFLAGS`), not a directly addressable register.
#[derive(Debug, Clone)]
pub struct RegisterDescriptor {
    pub name: &'static str,
    pub byte_size: u8,
    pub editable: bool,
}

/// The value of a register at a point in time (spec.md §3).
#[derive(Debug, Clone)]
pub struct RegisterValue {
    pub name: &'static str,
    pub hex_value: String,
    pub pointed_memory: Option<Vec<u8>>,
    pub is_pc: bool,
    pub is_sp: bool,
}

/// The sentinel value returned for a failed memory read inside condition
/// evaluation (spec.md §3).
pub const MEM_READ_FAILURE_SENTINEL: u32 = 0xDEAD_BEEA;

/// Asynchronous target events produced by a backend and drained by the core
/// (spec.md §3).
#[derive(Debug, Clone)]
pub enum DebugEvent {
    BreakpointHit {
        kind: BreakpointKind,
        address: Address,
        tid: u32,
        registers: Option<Vec<RegisterValue>>,
    },
    ThreadCreated {
        tid: u32,
    },
    ThreadExited {
        tid: u32,
    },
    ModuleLoaded {
        module: Module,
        tid: u32,
    },
    ModuleUnloaded {
        module: Module,
    },
    ProcessStarted {
        module: Module,
        tid: u32,
    },
    ProcessExited {
        exit_code: Option<i32>,
    },
    Exception {
        tid: u32,
        address: Address,
        exception_code: u32,
    },
}

/// What the core should do when a given exception code is observed
/// (spec.md §3, default `Halt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionAction {
    Halt,
    PassToApp,
    SkipHandler,
}

impl Default for ExceptionAction {
    fn default() -> Self {
        ExceptionAction::Halt
    }
}

/// A flat `exception_code -> action` mapping (spec.md §4.11, §9: "writes are
/// rare, reads are one per event" — a `Vec` scan is the right structure,
/// not a hash map).
#[derive(Debug, Clone, Default)]
pub struct ExceptionPolicy {
    entries: Vec<(u32, ExceptionAction)>,
}

impl ExceptionPolicy {
    pub fn new() -> Self {
        ExceptionPolicy { entries: Vec::new() }
    }

    pub fn set(&mut self, code: u32, action: ExceptionAction) {
        if let Some(entry) = self.entries.iter_mut().find(|(c, _)| *c == code) {
            entry.1 = action;
        } else {
            self.entries.push((code, action));
        }
    }

    /// Looks up the action for `code`, defaulting to `Halt` (spec.md §3).
    pub fn action_for(&self, code: u32) -> ExceptionAction {
        self.entries
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, action)| *action)
            .unwrap_or_default()
    }
}

/// Configuration flags a concrete backend reports about its own
/// capabilities (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct DebuggerOptions {
    pub can_attach: bool,
    pub can_detach: bool,
    pub can_terminate: bool,
    pub can_memmap: bool,
    pub can_valid_memory: bool,
    pub can_multithread: bool,
    pub can_software_breakpoint: bool,
    pub can_halt: bool,
    pub halt_before_communicating: bool,
    pub has_stack: bool,
    pub page_size: u32,
    pub can_trace_count: bool,
    pub can_break_on_module_load: bool,
    pub can_break_on_module_unload: bool,
    pub exceptions: Vec<u32>,
}

impl Default for DebuggerOptions {
    fn default() -> Self {
        DebuggerOptions {
            can_attach: false,
            can_detach: false,
            can_terminate: false,
            can_memmap: false,
            can_valid_memory: false,
            can_multithread: false,
            can_software_breakpoint: true,
            can_halt: true,
            halt_before_communicating: false,
            has_stack: true,
            page_size: 4096,
            can_trace_count: false,
            can_break_on_module_load: false,
            can_break_on_module_unload: false,
            exceptions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakpoint_kind_round_trips_through_u32() {
        for kind in [BreakpointKind::Simple, BreakpointKind::Echo, BreakpointKind::Stepping] {
            let encoded: u32 = kind.into();
            assert_eq!(BreakpointKind::try_from(encoded).unwrap(), kind);
        }
    }

    #[test]
    fn breakpoint_kind_rejects_out_of_range() {
        assert!(BreakpointKind::try_from(3).is_err());
    }

    #[test]
    fn exception_policy_defaults_to_halt() {
        let policy = ExceptionPolicy::new();
        assert_eq!(policy.action_for(0xC000_0005), ExceptionAction::Halt);
    }

    #[test]
    fn exception_policy_overwrites_existing_entry() {
        let mut policy = ExceptionPolicy::new();
        policy.set(0xC000_0005, ExceptionAction::SkipHandler);
        policy.set(0xC000_0005, ExceptionAction::PassToApp);
        assert_eq!(policy.action_for(0xC000_0005), ExceptionAction::PassToApp);
        assert_eq!(policy.entries.len(), 1);
    }

    #[test]
    fn module_equality_ignores_path() {
        let a = Module { name: "a".into(), path: "/x/a".into(), base_address: 0x1000, size: 0x100 };
        let b = Module { name: "a".into(), path: "/y/a".into(), base_address: 0x1000, size: 0x100 };
        assert_eq!(a, b);
    }
}
