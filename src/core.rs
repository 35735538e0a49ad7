//! The debugger core: state machine, command dispatch, response formatting
//! and exception routing (spec.md §4.10).
//!
//! Grounded on the teacher's `GdbStub::poll`/`handle_cmd` loop: read one
//! command, dispatch it against the target, write a correlated response,
//! continue — generalized here to drain the shared event queue between
//! commands instead of blocking exclusively on the next one (spec.md §4.10,
//! §5).

use std::cell::RefCell;
use std::convert::TryFrom;

use log::{info, trace, warn};

use crate::backend::{Backend, BackendMemorySource, BackendRegisterSource};
use crate::condition::{self, ArithOp, Expr, RelOp};
use crate::error::Error;
use crate::model::{
    Address, BreakpointKind, DebugEvent, ExceptionAction, ExceptionPolicy, Module, RegisterValue,
    Thread,
};
use crate::proto::{self, Code};
use crate::transport::Transport;
use crate::wire::{self, Arg, Packet};

/// The dispatch-loop state machine (spec.md §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Disconnected,
    Connected,
    Attached,
    Running,
    Suspended,
    Exiting,
}

/// Drives one connected peer against one concrete backend.
///
/// The breakpoint table itself lives inside the backend (spec.md §4.5's
/// per-address saved-bytes bookkeeping is identical across backends, so it
/// is implemented once per backend rather than threaded through the core);
/// what the core owns exclusively, per spec.md §5, is the state machine,
/// the module/thread inventory built up from observed events, and the
/// exception-routing policy.
pub struct DebuggerCore<B: Backend, T: Transport> {
    backend: B,
    transport: T,
    state: State,
    exceptions: ExceptionPolicy,
    modules: Vec<Module>,
    threads: Vec<Thread>,
}

/// Fixed tag sent in the auth packet of the connect handshake (spec.md §6:
/// "a fixed tag and cookie the front end validates"). Spelled out here
/// rather than drawn from a config file since no front end negotiates it.
const HANDSHAKE_COOKIE: u32 = 0x4E41_5649;

impl<B: Backend, T: Transport> DebuggerCore<B, T> {
    pub fn new(backend: B, transport: T) -> Self {
        DebuggerCore {
            backend,
            transport,
            state: State::Connected,
            exceptions: ExceptionPolicy::new(),
            modules: Vec::new(),
            threads: Vec::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Sends the connect-time handshake (spec.md §6): an info string
    /// describing this backend's register layout and address width,
    /// followed by a fixed auth tag the front end checks before issuing any
    /// command. Called once, right after accept, before `run`'s loop.
    pub fn send_handshake(&mut self) -> Result<(), Error> {
        let info = format!(
            "address_size_bits={};register_count={}",
            self.backend.address_size_bits(),
            self.backend.register_layout().len(),
        );
        self.send(&proto::event(proto::RESP_INFO, vec![Arg::Data(info.into_bytes())]))?;
        self.send(&proto::event(proto::RESP_AUTH, vec![Arg::Integer(HANDSHAKE_COOKIE)]))
    }

    /// Runs the dispatch loop until the peer disconnects or a fatal
    /// transport/framing error occurs (spec.md §4.10, §4.11). The target
    /// process keeps running after this returns; only the peer connection
    /// is torn down.
    pub fn run(&mut self) -> Result<(), Error> {
        loop {
            if self.transport.has_data()? {
                match self.read_command() {
                    Ok(packet) => self.dispatch(packet)?,
                    Err(Error::ConnectionClosed) => {
                        info!("peer disconnected");
                        self.state = State::Exiting;
                        return Ok(());
                    }
                    Err(Error::MalformedPacket) => {
                        warn!("malformed packet, closing connection");
                        self.state = State::Exiting;
                        return Err(Error::MalformedPacket);
                    }
                    Err(e) => return Err(e),
                }
            }

            self.drain_events()?;

            if self.state == State::Exiting {
                return Ok(());
            }
        }
    }

    fn read_command(&mut self) -> Result<Packet, Error> {
        let mut header = [0u8; 12];
        self.transport.recv_exact(&mut header)?;
        let arg_count = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);

        let mut body = header.to_vec();
        for _ in 0..arg_count {
            let mut arg_header = [0u8; 8];
            self.transport.recv_exact(&mut arg_header)?;
            let length =
                u32::from_be_bytes([arg_header[0], arg_header[1], arg_header[2], arg_header[3]])
                    as usize;
            body.extend_from_slice(&arg_header);
            let mut payload = vec![0u8; length];
            self.transport.recv_exact(&mut payload)?;
            body.extend_from_slice(&payload);
        }

        wire::decode(&body)
    }

    fn send(&mut self, packet: &Packet) -> Result<(), Error> {
        self.transport.send_all(&wire::encode(packet))
    }

    fn reply_ok(&mut self, code: Code, id: u32, args: Vec<Arg>) -> Result<(), Error> {
        self.send(&proto::reply(code, id, args))
    }

    fn reply_err(&mut self, code: Code, id: u32, err: Error) -> Result<(), Error> {
        self.send(&proto::reply(code, id, vec![Arg::Data(err.to_string().into_bytes())]))
    }

    fn drain_events(&mut self) -> Result<(), Error> {
        for event in self.backend.poll_events() {
            self.handle_event(event)?;
        }
        Ok(())
    }

    fn handle_event(&mut self, event: DebugEvent) -> Result<(), Error> {
        match event {
            DebugEvent::Exception { tid, address, exception_code } => {
                match self.exceptions.action_for(exception_code) {
                    ExceptionAction::Halt => {
                        self.state = State::Suspended;
                        self.send(&proto::event(
                            proto::RESP_EXCEPTION_OCCURED,
                            vec![Arg::Integer(tid), Arg::Address(address), Arg::Integer(exception_code)],
                        ))
                    }
                    // Forwarded to the backend and suppressed from the
                    // event stream (spec.md §4.10): the backend is told to
                    // continue past the exception according to the policy
                    // (forward the signal to the target's own handler, or
                    // swallow it) instead of leaving it suspended.
                    ExceptionAction::PassToApp | ExceptionAction::SkipHandler => {
                        self.backend.continue_past_exception(tid, exception_code)
                    }
                }
            }
            DebugEvent::BreakpointHit { kind, address, tid, registers } => {
                self.handle_breakpoint_hit(kind, address, tid, registers)
            }
            DebugEvent::ThreadCreated { tid } => {
                if !self.threads.iter().any(|t| t.tid == tid) {
                    self.threads.push(Thread::new(tid));
                }
                self.send(&proto::event(proto::RESP_THREAD_CREATED, vec![Arg::Integer(tid)]))
            }
            DebugEvent::ThreadExited { tid } => {
                self.threads.retain(|t| t.tid != tid);
                self.send(&proto::event(proto::RESP_THREAD_CLOSED, vec![Arg::Integer(tid)]))
            }
            DebugEvent::ModuleLoaded { module, tid } => {
                let args = vec![
                    Arg::Data(module.name.clone().into_bytes()),
                    Arg::Data(module.path.clone().into_bytes()),
                    Arg::Address(module.base_address),
                    Arg::Long(module.size),
                    Arg::Integer(tid),
                ];
                self.modules.push(module);
                self.send(&proto::event(proto::RESP_MODULE_LOADED, args))
            }
            DebugEvent::ModuleUnloaded { module } => {
                let args = vec![Arg::Data(module.name.clone().into_bytes()), Arg::Address(module.base_address)];
                self.modules.retain(|m| m != &module);
                self.send(&proto::event(proto::RESP_MODULE_UNLOADED, args))
            }
            DebugEvent::ProcessStarted { module, tid } => {
                self.state = State::Running;
                let path = module.path.clone();
                self.modules.push(module);
                self.send(&proto::event(proto::RESP_PROCESS_START, vec![Arg::Data(path.into_bytes()), Arg::Integer(tid)]))
            }
            DebugEvent::ProcessExited { exit_code } => {
                self.state = State::Exiting;
                self.send(&proto::event(
                    proto::RESP_PROCESS_CLOSED,
                    vec![Arg::Integer(exit_code.unwrap_or(0) as u32)],
                ))
            }
        }
    }

    /// Echo-breakpoint handling and condition filtering (spec.md §4.3,
    /// §4.10): the condition AST is evaluated here, against the backend
    /// that owns the breakpoint, because this is the one place every
    /// backend's events converge — duplicating the evaluator inside each
    /// backend would mean duplicating this exact plumbing three times.
    fn handle_breakpoint_hit(
        &mut self,
        kind: BreakpointKind,
        address: Address,
        tid: u32,
        registers: Option<Vec<RegisterValue>>,
    ) -> Result<(), Error> {
        let condition = self.backend.breakpoint_condition(address, kind);
        let regs = match registers {
            Some(r) => r,
            None => self.backend.read_registers(tid).unwrap_or_default(),
        };

        let passes = match &condition {
            Some(expr) => {
                let reg_source = BackendRegisterSource { tid, registers: &regs };
                let mem_source = BackendMemorySource { backend: RefCell::new(&mut self.backend as &mut dyn Backend) };
                condition::eval(expr, &reg_source, &mem_source) != 0
            }
            None => true,
        };

        if !passes {
            trace!("breakpoint at {address:#x} did not satisfy its condition, resuming silently");
            return self.backend.resume_process();
        }

        match kind {
            BreakpointKind::Echo => {
                let encoded = encode_registers(&regs);
                self.send(&proto::event(
                    proto::RESP_BPE_HIT,
                    vec![Arg::Address(address), Arg::Integer(tid), Arg::Data(encoded)],
                ))?;
                self.backend.remove_breakpoint(address, kind)?;
                self.backend.resume_process()?;
                // Re-armable: echo breakpoints fire once per trap but stay
                // installed until explicitly removed by the peer.
                self.backend.set_breakpoint(address, kind)?;
                Ok(())
            }
            BreakpointKind::Simple => {
                self.state = State::Suspended;
                self.send(&proto::event(proto::RESP_BP_HIT, vec![Arg::Address(address), Arg::Integer(tid)]))
            }
            BreakpointKind::Stepping => {
                self.state = State::Suspended;
                self.send(&proto::event(proto::RESP_BPS_HIT, vec![Arg::Address(address), Arg::Integer(tid)]))
            }
        }
    }

    fn dispatch(&mut self, packet: Packet) -> Result<(), Error> {
        let id = packet.id;
        let args = packet.args;
        match packet.command {
            c if c == proto::CMD_ATTACH.0 => self.handle(id, proto::RESP_ATTACH_SUCCESS, proto::RESP_ATTACH_ERROR, |core| {
                core.backend.attach()?;
                core.state = State::Attached;
                Ok(vec![])
            }),
            c if c == proto::CMD_CLEARALL.0 => self.handle(id, proto::RESP_OK, proto::RESP_ERR, |core| {
                core.backend.clear_all_breakpoints()?;
                Ok(vec![])
            }),
            c if c == proto::CMD_SETBP.0 => self.set_breakpoint(id, &args, BreakpointKind::Simple, proto::RESP_BP_SET_SUCC, proto::RESP_BP_SET_ERR),
            c if c == proto::CMD_SETBPE.0 => self.set_breakpoint(id, &args, BreakpointKind::Echo, proto::RESP_BPE_SET_SUCC, proto::RESP_BPE_SET_ERR),
            c if c == proto::CMD_SETBPS.0 => self.set_breakpoint(id, &args, BreakpointKind::Stepping, proto::RESP_BPS_SET_SUCC, proto::RESP_BPS_SET_ERR),
            c if c == proto::CMD_REMBP.0 => self.remove_breakpoint(id, &args, BreakpointKind::Simple, proto::RESP_BP_REM_SUCC, proto::RESP_BP_REM_ERR),
            c if c == proto::CMD_REMBPE.0 => self.remove_breakpoint(id, &args, BreakpointKind::Echo, proto::RESP_BPE_REM_SUCC, proto::RESP_BPE_REM_ERR),
            c if c == proto::CMD_REMBPS.0 => self.remove_breakpoint(id, &args, BreakpointKind::Stepping, proto::RESP_BPS_REM_SUCC, proto::RESP_BPS_REM_ERR),
            c if c == proto::CMD_READ_MEMORY.0 => self.handle(id, proto::RESP_READ_MEMORY, proto::RESP_READ_MEMORY_ERR, |core| {
                let addr = arg_address(&args, 0)?;
                let size = arg_integer(&args, 1)? as usize;
                let bytes = core.backend.read_memory(addr, size)?;
                Ok(vec![Arg::Data(bytes)])
            }),
            c if c == proto::CMD_WRITE_MEMORY.0 => self.handle(id, proto::RESP_WRITE_MEMORY_SUCC, proto::RESP_WRITE_MEMORY_ERR, |core| {
                let addr = arg_address(&args, 0)?;
                let data = arg_data(&args, 1)?;
                core.backend.write_memory(addr, data)?;
                Ok(vec![])
            }),
            c if c == proto::CMD_REGISTERS.0 => self.handle(id, proto::RESP_REGISTERS, proto::RESP_REGISTERS_ERR, |core| {
                let tid = arg_integer(&args, 0)?;
                let regs = core.backend.read_registers(tid)?;
                Ok(vec![Arg::Data(encode_registers(&regs))])
            }),
            c if c == proto::CMD_SET_REGISTER.0 => self.handle(id, proto::RESP_SET_REGISTER_SUCC, proto::RESP_SET_REGISTER_ERR, |core| {
                let tid = arg_integer(&args, 0)?;
                let name = arg_str(&args, 1)?.to_string();
                let value = arg_long_or_integer(&args, 2)?;
                core.backend.write_register(tid, &name, value)?;
                Ok(vec![])
            }),
            c if c == proto::CMD_RESUME.0 => self.handle(id, proto::RESP_RESUMED, proto::RESP_RESUME_ERR, |core| {
                core.backend.resume_process()?;
                core.state = State::Running;
                Ok(vec![])
            }),
            c if c == proto::CMD_RESUME_THREAD.0 => self.handle(id, proto::RESP_RESUME_THREAD_SUCC, proto::RESP_RESUME_THREAD_ERR, |core| {
                let tid = arg_integer(&args, 0)?;
                core.backend.resume_thread(tid)?;
                Ok(vec![])
            }),
            c if c == proto::CMD_SUSPEND_THREAD.0 => self.handle(id, proto::RESP_SUSPEND_THREAD_SUCC, proto::RESP_SUSPEND_THREAD_ERR, |core| {
                let tid = arg_integer(&args, 0)?;
                core.backend.suspend_thread(tid)?;
                Ok(vec![])
            }),
            c if c == proto::CMD_SET_ACTIVE_THREAD.0 => self.handle(id, proto::RESP_SET_ACTIVE_THREAD_SUCC, proto::RESP_SET_ACTIVE_THREAD_ERR, |core| {
                let tid = arg_integer(&args, 0)?;
                core.backend.set_active_thread(tid)?;
                Ok(vec![])
            }),
            c if c == proto::CMD_SINGLE_STEP.0 => self.handle(id, proto::RESP_SINGLE_STEP_SUCC, proto::RESP_SINGLE_STEP_ERR, |core| {
                let tid = arg_integer(&args, 0)?;
                core.backend.single_step(tid)?;
                Ok(vec![])
            }),
            c if c == proto::CMD_HALT.0 => self.handle(id, proto::RESP_HALTED_SUCC, proto::RESP_HALTED_ERR, |core| {
                core.backend.halt()?;
                core.state = State::Suspended;
                Ok(vec![])
            }),
            c if c == proto::CMD_DETACH.0 => self.handle(id, proto::RESP_DETACH_SUCC, proto::RESP_DETACH_ERR, |core| {
                core.backend.detach()?;
                core.state = State::Exiting;
                Ok(vec![])
            }),
            c if c == proto::CMD_TERMINATE.0 => self.handle(id, proto::RESP_TERMINATE_SUCC, proto::RESP_TERMINATE_ERR, |core| {
                core.backend.terminate()?;
                core.state = State::Exiting;
                Ok(vec![])
            }),
            c if c == proto::CMD_VALIDMEM.0 => self.handle(id, proto::RESP_VALIDMEM_SUCC, proto::RESP_VALIDMEM_ERR, |core| {
                Ok(encode_ranges(&core.backend.enumerate_valid_memory()?))
            }),
            c if c == proto::CMD_MEMMAP.0 => self.handle(id, proto::RESP_MEMMAP_SUCC, proto::RESP_MEMMAP_ERR, |core| {
                if !core.backend.options().can_memmap {
                    return Err(Error::Unsupported);
                }
                Ok(encode_ranges(&core.backend.enumerate_valid_memory()?))
            }),
            c if c == proto::CMD_SET_BREAKPOINT_CONDITION.0 => {
                self.handle(id, proto::RESP_SET_BREAKPOINT_CONDITION_SUCC, proto::RESP_SET_BREAKPOINT_CONDITION_ERR, |core| {
                    let addr = arg_address(&args, 0)?;
                    let kind = BreakpointKind::try_from(arg_integer(&args, 1)?)?;
                    let condition = if args.len() > 2 { Some(decode_condition(&args[2..])?) } else { None };
                    core.backend.set_breakpoint_condition(addr, kind, condition)?;
                    Ok(vec![])
                })
            }
            c if c == proto::CMD_SET_EXCEPTIONS_OPTIONS.0 => {
                self.handle(id, proto::RESP_SET_EXCEPTIONS_SUCC, proto::RESP_SET_EXCEPTIONS_ERR, |core| {
                    for pair in args.chunks(2) {
                        if let [code, action] = pair {
                            let code = code.as_integer().ok_or(Error::MalformedPacket)?;
                            let action = match action.as_integer().ok_or(Error::MalformedPacket)? {
                                0 => ExceptionAction::Halt,
                                1 => ExceptionAction::PassToApp,
                                2 => ExceptionAction::SkipHandler,
                                _ => return Err(Error::MalformedPacket),
                            };
                            core.exceptions.set(code, action);
                            core.backend.set_exception_action(code, action)?;
                        }
                    }
                    Ok(vec![])
                })
            }
            c if c == proto::CMD_SET_DEBUGGER_EVENT_SETTINGS.0 => {
                self.handle(id, proto::RESP_SET_DEBUGGER_EVENT_SETTINGS_SUCC, proto::RESP_SET_DEBUGGER_EVENT_SETTINGS_ERR, |_core| Ok(vec![]))
            }
            c if c == proto::CMD_LIST_PROCESSES.0 => {
                self.reply_ok(proto::RESP_LIST_PROCESSES, id, vec![])
            }
            c if c == proto::CMD_CANCEL_TARGET_SELECTION.0 => {
                self.reply_ok(proto::RESP_CANCEL_TARGET_SELECTION_SUCC, id, vec![])
            }
            c if c == proto::CMD_SELECT_PROCESS.0 => {
                self.reply_err(proto::RESP_SELECT_PROCESS_ERR, id, Error::Unsupported)
            }
            c if c == proto::CMD_LIST_FILES.0 || c == proto::CMD_LIST_FILES_PATH.0 => {
                self.reply_err(proto::RESP_LIST_FILES_ERR, id, Error::Unsupported)
            }
            c if c == proto::CMD_SELECT_FILE.0 => {
                self.reply_err(proto::RESP_SELECT_FILE_ERR, id, Error::Unsupported)
            }
            c if c == proto::CMD_SEARCH.0 => {
                self.reply_err(proto::RESP_SEARCH_ERR, id, Error::Unsupported)
            }
            _ => self.reply_err(proto::RESP_ERR, id, Error::Unsupported),
        }
    }

    /// Runs `op` against `self`, replying with `ok` on success or `err` with
    /// the error message on failure. Backend errors never tear down the
    /// connection (spec.md §4.11); only the `?` on `self.send` below does,
    /// via a transport error propagating out of `run`.
    fn handle(
        &mut self,
        id: u32,
        ok: Code,
        err: Code,
        op: impl FnOnce(&mut Self) -> Result<Vec<Arg>, Error>,
    ) -> Result<(), Error> {
        match op(self) {
            Ok(args) => self.reply_ok(ok, id, args),
            Err(e) => self.reply_err(err, id, e),
        }
    }

    fn set_breakpoint(
        &mut self,
        id: u32,
        args: &[Arg],
        kind: BreakpointKind,
        ok: Code,
        err: Code,
    ) -> Result<(), Error> {
        let addr = match arg_address(args, 0) {
            Ok(a) => a,
            Err(e) => return self.reply_err(err, id, e),
        };
        match self.backend.set_breakpoint(addr, kind) {
            Ok(()) => self.reply_ok(ok, id, vec![]),
            Err(e) => self.reply_err(err, id, e),
        }
    }

    fn remove_breakpoint(
        &mut self,
        id: u32,
        args: &[Arg],
        kind: BreakpointKind,
        ok: Code,
        err: Code,
    ) -> Result<(), Error> {
        let addr = match arg_address(args, 0) {
            Ok(a) => a,
            Err(e) => return self.reply_err(err, id, e),
        };
        match self.backend.remove_breakpoint(addr, kind) {
            Ok(()) => self.reply_ok(ok, id, vec![]),
            Err(e) => self.reply_err(err, id, e),
        }
    }
}

fn arg_address(args: &[Arg], index: usize) -> Result<Address, Error> {
    args.get(index).and_then(Arg::as_address).ok_or_else(|| Error::Generic("missing address argument".into()))
}

fn arg_integer(args: &[Arg], index: usize) -> Result<u32, Error> {
    args.get(index).and_then(Arg::as_integer).ok_or_else(|| Error::Generic("missing integer argument".into()))
}

fn arg_long_or_integer(args: &[Arg], index: usize) -> Result<u64, Error> {
    match args.get(index) {
        Some(Arg::Long(v)) => Ok(*v),
        Some(Arg::Integer(v)) => Ok(*v as u64),
        _ => Err(Error::Generic("missing value argument".into())),
    }
}

fn arg_data<'a>(args: &'a [Arg], index: usize) -> Result<&'a [u8], Error> {
    match args.get(index) {
        Some(Arg::Data(bytes)) => Ok(bytes),
        _ => Err(Error::Generic("missing data argument".into())),
    }
}

fn arg_str(args: &[Arg], index: usize) -> Result<&str, Error> {
    args.get(index).and_then(Arg::as_str).ok_or_else(|| Error::Generic("missing string argument".into()))
}

/// `name=hex_value;name=hex_value;...` — deliberately simple since the wire
/// protocol's argument list has no native notion of a record array.
fn encode_registers(regs: &[RegisterValue]) -> Vec<u8> {
    regs.iter()
        .map(|r| format!("{}={}", r.name, r.hex_value))
        .collect::<Vec<_>>()
        .join(";")
        .into_bytes()
}

fn encode_ranges(ranges: &[(Address, Address)]) -> Vec<Arg> {
    ranges.iter().flat_map(|&(start, end)| vec![Arg::Address(start), Arg::Address(end)]).collect()
}

/// Decodes a breakpoint condition from a postfix token stream (spec.md
/// leaves the condition AST's wire encoding unspecified beyond "a small
/// scripting surface"; a flat postfix stream keeps the encoder and this
/// decoder symmetric without needing a recursive grammar on the wire).
///
/// Tokens: `Arg::Integer(v)` is `Num(v)`; `Arg::Data` carries
/// `"TAG[:field]*"` — `AND:n`/`OR:n` pop `n` children, `ARITH:op:n` pops `n`
/// children, `REL:op` pops two, `MEM`/`SUB` pop one, `IDENT:name` pushes a
/// leaf. The stream must reduce to exactly one expression.
fn decode_condition(args: &[Arg]) -> Result<Expr, Error> {
    let mut stack: Vec<Expr> = Vec::new();
    for arg in args {
        match arg {
            Arg::Integer(v) => stack.push(Expr::Num(*v)),
            Arg::Data(bytes) => {
                let text = std::str::from_utf8(bytes).map_err(|_| Error::MalformedPacket)?;
                let mut parts = text.split(':');
                let tag = parts.next().ok_or(Error::MalformedPacket)?;
                match tag {
                    "AND" | "OR" => {
                        let n = parts.next().and_then(|s| s.parse::<usize>().ok()).ok_or(Error::MalformedPacket)?;
                        if stack.len() < n {
                            return Err(Error::MalformedPacket);
                        }
                        let children = stack.split_off(stack.len() - n);
                        stack.push(if tag == "AND" { Expr::And(children) } else { Expr::Or(children) });
                    }
                    "ARITH" => {
                        let op = parse_arith_op(parts.next().ok_or(Error::MalformedPacket)?)?;
                        let n = parts.next().and_then(|s| s.parse::<usize>().ok()).ok_or(Error::MalformedPacket)?;
                        if stack.len() < n {
                            return Err(Error::MalformedPacket);
                        }
                        let children = stack.split_off(stack.len() - n);
                        stack.push(Expr::Arith(op, children));
                    }
                    "REL" => {
                        let op = parse_rel_op(parts.next().ok_or(Error::MalformedPacket)?)?;
                        let rhs = stack.pop().ok_or(Error::MalformedPacket)?;
                        let lhs = stack.pop().ok_or(Error::MalformedPacket)?;
                        stack.push(Expr::Rel(op, Box::new(lhs), Box::new(rhs)));
                    }
                    "MEM" => {
                        let inner = stack.pop().ok_or(Error::MalformedPacket)?;
                        stack.push(Expr::Mem(Box::new(inner)));
                    }
                    "SUB" => {
                        let inner = stack.pop().ok_or(Error::MalformedPacket)?;
                        stack.push(Expr::Sub(Box::new(inner)));
                    }
                    "IDENT" => {
                        let name = parts.next().ok_or(Error::MalformedPacket)?;
                        stack.push(Expr::Ident(name.to_string()));
                    }
                    _ => return Err(Error::MalformedPacket),
                }
            }
            _ => return Err(Error::MalformedPacket),
        }
    }
    if stack.len() != 1 {
        return Err(Error::MalformedPacket);
    }
    Ok(stack.pop().unwrap())
}

fn parse_arith_op(tag: &str) -> Result<ArithOp, Error> {
    Ok(match tag {
        "add" => ArithOp::Add,
        "sub" => ArithOp::Sub,
        "mul" => ArithOp::Mul,
        "div" => ArithOp::Div,
        "mod" => ArithOp::Mod,
        "shl" => ArithOp::Shl,
        "shr" => ArithOp::Shr,
        "and" => ArithOp::And,
        "or" => ArithOp::Or,
        "xor" => ArithOp::Xor,
        _ => return Err(Error::MalformedPacket),
    })
}

fn parse_rel_op(tag: &str) -> Result<RelOp, Error> {
    Ok(match tag {
        "eq" => RelOp::Eq,
        "ne" => RelOp::Ne,
        "lt" => RelOp::Lt,
        "gt" => RelOp::Gt,
        "le" => RelOp::Le,
        "ge" => RelOp::Ge,
        _ => return Err(Error::MalformedPacket),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::native::fake::FakePlatform;
    use crate::backend::native::NativeBackend;
    use crate::event_queue::EventQueue;
    use crate::model::DebuggerOptions;
    use crate::transport::test_support::MemTransport;
    use std::sync::Arc;

    fn core_with(inbox: Vec<u8>) -> DebuggerCore<NativeBackend<FakePlatform>, MemTransport> {
        let platform = FakePlatform::new(0x1000, vec![0x90; 0x40]);
        let backend = NativeBackend::new(platform, DebuggerOptions::default(), vec![0xCC], Arc::new(EventQueue::new()));
        DebuggerCore::new(backend, MemTransport::new(inbox))
    }

    fn packet_bytes(command: u32, id: u32, args: Vec<Arg>) -> Vec<u8> {
        wire::encode(&Packet::new(command, id, args))
    }

    #[test]
    fn set_then_clear_simple_breakpoint_round_trips() {
        let mut inbox = packet_bytes(proto::CMD_SETBP.0, 1, vec![Arg::Address(0x1000)]);
        inbox.extend(packet_bytes(proto::CMD_REMBP.0, 2, vec![Arg::Address(0x1000)]));
        let mut core = core_with(inbox);

        core.dispatch_next().unwrap();
        core.dispatch_next().unwrap();

        let outbox = core.outbox();
        let first = wire::decode(&outbox[0]).unwrap();
        let second = wire::decode(&outbox[1]).unwrap();
        assert_eq!(first.command, proto::RESP_BP_SET_SUCC.0);
        assert_eq!(first.id, 1);
        assert_eq!(second.command, proto::RESP_BP_REM_SUCC.0);
        assert_eq!(second.id, 2);
    }

    #[test]
    fn clearall_on_empty_table_succeeds() {
        let inbox = packet_bytes(proto::CMD_CLEARALL.0, 9, vec![]);
        let mut core = core_with(inbox);
        core.dispatch_next().unwrap();
        let reply = wire::decode(&core.outbox()[0]).unwrap();
        assert_eq!(reply.command, proto::RESP_OK.0);
    }

    #[test]
    fn unknown_command_is_a_generic_error_reply_not_a_disconnect() {
        let inbox = packet_bytes(0xFFFF_FFFF, 4, vec![]);
        let mut core = core_with(inbox);
        core.dispatch_next().unwrap();
        let reply = wire::decode(&core.outbox()[0]).unwrap();
        assert_eq!(reply.command, proto::RESP_ERR.0);
        assert_eq!(reply.id, 4);
    }

    #[test]
    fn decode_condition_builds_relational_expr() {
        let tokens = vec![
            Arg::Data(b"IDENT:EAX".to_vec()),
            Arg::Integer(5),
            Arg::Data(b"REL:eq".to_vec()),
        ];
        let expr = decode_condition(&tokens).unwrap();
        assert!(matches!(expr, Expr::Rel(RelOp::Eq, _, _)));
    }

    // Test-only helpers exposing one dispatch step and the transport's
    // outbox, so tests can drive the loop deterministically instead of
    // relying on `run`'s has_data-polling idle spin.
    impl<B: Backend, T: Transport> DebuggerCore<B, T> {
        fn dispatch_next(&mut self) -> Result<(), Error> {
            let packet = self.read_command()?;
            self.dispatch(packet)
        }
    }

    impl DebuggerCore<NativeBackend<FakePlatform>, MemTransport> {
        fn outbox(&self) -> Vec<Vec<u8>> {
            split_packets(&self.transport.outbox)
        }
    }

    fn split_packets(bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut offset = 0;
        while offset + 12 <= bytes.len() {
            let arg_count = u32::from_be_bytes([
                bytes[offset + 8],
                bytes[offset + 9],
                bytes[offset + 10],
                bytes[offset + 11],
            ]);
            let mut end = offset + 12;
            for _ in 0..arg_count {
                let length = u32::from_be_bytes([bytes[end], bytes[end + 1], bytes[end + 2], bytes[end + 3]]) as usize;
                end += 8 + length;
            }
            out.push(bytes[offset..end].to_vec());
            offset = end;
        }
        out
    }
}
