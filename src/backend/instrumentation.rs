//! Instrumentation backend: an out-of-process runner that injects a client
//! into the target and talks back over a length-prefixed RPC channel
//! (spec.md §4.9).
//!
//! Reuses the C1 wire codec's `Packet` shape for each individual command,
//! adding one `u32` big-endian length prefix per frame on top (the codec
//! itself is already self-describing via `arg_count`/argument lengths, but
//! spec.md §4.9 describes the instrumentation channel specifically as
//! "length-prefixed", so the prefix is kept explicit rather than relying on
//! the caller to know the codec's internal framing).

use std::sync::Arc;

use crate::breakpoint::BreakpointTable;
use crate::error::Error;
use crate::event_queue::EventQueue;
use crate::model::{
    Address, BreakpointKind, DebugEvent, DebuggerOptions, ExceptionAction, Module,
    RegisterDescriptor, RegisterValue, Thread, ThreadState,
};
use crate::transport::Transport;
use crate::wire::{self, Arg, Packet};

use super::Backend;

macro_rules! rpc_commands {
    ($( $name:ident = $value:expr ),+ $(,)?) => {
        $( const $name: u32 = $value; )+
    };
}

rpc_commands! {
    RPC_PING = 0,
    RPC_GET_DEBUG_EVENTS = 1,
    RPC_RESUME_FROM_BP = 2,
    RPC_TERMINATE_PROCESS = 3,
    RPC_SET_EXCEPTION_ACTION = 4,
    RPC_ADD_BREAKPOINT = 5,
    RPC_REMOVE_BREAKPOINT = 6,
    RPC_LIST_THREADS = 7,
    RPC_SUSPEND_THREAD = 8,
    RPC_RESUME_THREAD = 9,
    RPC_LIST_REGISTERS = 10,
    RPC_READ_REGISTERS = 11,
    RPC_WRITE_REGISTERS = 12,
    RPC_LIST_MEMORY = 13,
    RPC_READ_MEMORY = 14,
    RPC_WRITE_MEMORY = 15,
}

/// `error_code == 0` is success; any other value is an RPC-local error
/// code the runner reports (spec.md §4.9: "`Response{error_code, result}`
/// pairs").
struct RpcResponse {
    error_code: u32,
    result: Vec<Arg>,
}

/// An instrumentation-client backend (spec.md §4.9).
pub struct InstrumentationBackend<T: Transport> {
    channel: T,
    options: DebuggerOptions,
    events: Arc<EventQueue>,
    breakpoints: BreakpointTable,
    active_tid: Option<u32>,
    register_layout: Vec<RegisterDescriptor>,
    pc_index: usize,
}

impl<T: Transport> InstrumentationBackend<T> {
    pub fn new(
        channel: T,
        register_layout: Vec<RegisterDescriptor>,
        pc_index: usize,
        events: Arc<EventQueue>,
    ) -> Self {
        InstrumentationBackend {
            channel,
            options: DebuggerOptions {
                can_attach: true,
                can_detach: true,
                can_terminate: true,
                can_multithread: true,
                ..DebuggerOptions::default()
            },
            events,
            breakpoints: BreakpointTable::new(),
            active_tid: None,
            register_layout,
            pc_index,
        }
    }

    /// Sends a single command and blocks for its response. Spec.md §4.9
    /// allows a frame to batch several commands; this backend sends one
    /// command per frame and reads exactly one response back, which is a
    /// batch of size one and therefore a valid instance of the same
    /// protocol.
    fn call(&mut self, kind: u32, args: Vec<Arg>) -> Result<RpcResponse, Error> {
        let request = Packet::new(kind, 0, args);
        let body = wire::encode(&request);
        let mut frame = Vec::with_capacity(body.len() + 4);
        frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
        frame.extend_from_slice(&body);
        self.channel.send_all(&frame)?;

        let mut len_buf = [0u8; 4];
        self.channel.recv_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        self.channel.recv_exact(&mut body)?;
        let packet = wire::decode(&body)?;

        let error_code = packet
            .args
            .first()
            .and_then(|a| a.as_integer())
            .unwrap_or(0);
        let result = packet.args.into_iter().skip(1).collect();
        Ok(RpcResponse { error_code, result })
    }

    fn call_ok(&mut self, kind: u32, args: Vec<Arg>) -> Result<Vec<Arg>, Error> {
        let response = self.call(kind, args)?;
        if response.error_code != 0 {
            return Err(Error::Generic(format!(
                "instrumentation RPC {kind} failed with code {}",
                response.error_code
            )));
        }
        Ok(response.result)
    }

    /// Drains the events the runner has queued since the last poll
    /// (spec.md §4.9: "unsolicited `DebugEvent`s drained by
    /// `get_debug_events`").
    pub fn poll_runner_events(&mut self) -> Result<(), Error> {
        let result = self.call_ok(RPC_GET_DEBUG_EVENTS, vec![])?;
        for arg in result {
            if let Some(data) = arg.as_str() {
                if let Some(event) = parse_event(data) {
                    self.events.push(event);
                }
            }
        }
        Ok(())
    }
}

/// Events are reported by the runner as `kind:field=value;...` strings; a
/// real runner would use a denser encoding, but spec.md leaves the
/// instrumentation wire format unspecified beyond "a small RPC", so a
/// self-describing text form is used here to keep the parser and its
/// encoder symmetric and easy to test.
fn parse_event(text: &str) -> Option<DebugEvent> {
    let mut parts = text.splitn(2, ':');
    let kind = parts.next()?;
    let rest = parts.next().unwrap_or("");
    let field = |key: &str| -> Option<&str> {
        rest.split(';').find_map(|kv| {
            let mut kv = kv.splitn(2, '=');
            let k = kv.next()?;
            let v = kv.next()?;
            if k == key {
                Some(v)
            } else {
                None
            }
        })
    };
    match kind {
        "thread_created" => Some(DebugEvent::ThreadCreated { tid: field("tid")?.parse().ok()? }),
        "thread_exited" => Some(DebugEvent::ThreadExited { tid: field("tid")?.parse().ok()? }),
        "process_exited" => Some(DebugEvent::ProcessExited {
            exit_code: field("code").and_then(|c| c.parse().ok()),
        }),
        _ => None,
    }
}

impl<T: Transport> Backend for InstrumentationBackend<T> {
    fn attach(&mut self) -> Result<(), Error> {
        self.call_ok(RPC_PING, vec![]).map(|_| ())
    }

    fn start(&mut self, _path: &str, _argv: &[String]) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn detach(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), Error> {
        self.call_ok(RPC_TERMINATE_PROCESS, vec![]).map(|_| ())
    }

    fn enumerate_threads(&mut self) -> Result<Vec<Thread>, Error> {
        let result = self.call_ok(RPC_LIST_THREADS, vec![])?;
        Ok(result
            .into_iter()
            .filter_map(|a| a.as_integer())
            .map(|tid| Thread { tid, state: ThreadState::Suspended, registers: Vec::new() })
            .collect())
    }

    fn active_thread(&self) -> Option<u32> {
        self.active_tid
    }

    fn set_active_thread(&mut self, tid: u32) -> Result<(), Error> {
        self.active_tid = Some(tid);
        Ok(())
    }

    fn read_registers(&mut self, tid: u32) -> Result<Vec<RegisterValue>, Error> {
        let result = self.call_ok(RPC_READ_REGISTERS, vec![Arg::Integer(tid)])?;
        let mut values = Vec::with_capacity(self.register_layout.len());
        for (descriptor, arg) in self.register_layout.iter().zip(result.iter()) {
            let hex_value = arg
                .as_integer()
                .map(|v| format!("{v:#x}"))
                .or_else(|| arg.as_address().map(|v| format!("{v:#x}")))
                .ok_or(Error::CouldntReadRegisters)?;
            values.push(RegisterValue {
                name: descriptor.name,
                hex_value,
                pointed_memory: None,
                is_pc: false,
                is_sp: false,
            });
        }
        Ok(values)
    }

    fn write_register(&mut self, tid: u32, name: &str, value: u64) -> Result<(), Error> {
        self.call_ok(
            RPC_WRITE_REGISTERS,
            vec![Arg::Integer(tid), Arg::Data(name.as_bytes().to_vec()), Arg::Long(value)],
        )
        .map(|_| ())
    }

    fn read_memory(&mut self, addr: Address, size: usize) -> Result<Vec<u8>, Error> {
        let result = self.call_ok(RPC_READ_MEMORY, vec![Arg::Address(addr), Arg::Integer(size as u32)])?;
        result
            .into_iter()
            .next()
            .and_then(|a| if let Arg::Data(bytes) = a { Some(bytes) } else { None })
            .ok_or(Error::CouldntReadMemory)
    }

    fn write_memory(&mut self, addr: Address, bytes: &[u8]) -> Result<(), Error> {
        self.call_ok(RPC_WRITE_MEMORY, vec![Arg::Address(addr), Arg::Data(bytes.to_vec())])
            .map(|_| ())
    }

    fn enumerate_valid_memory(&mut self) -> Result<Vec<(Address, Address)>, Error> {
        let result = self.call_ok(RPC_LIST_MEMORY, vec![])?;
        Ok(result
            .chunks(2)
            .filter_map(|pair| match pair {
                [a, b] => Some((a.as_address()?, b.as_address()?)),
                _ => None,
            })
            .collect())
    }

    fn set_breakpoint(&mut self, addr: Address, kind: BreakpointKind) -> Result<(), Error> {
        self.call_ok(RPC_ADD_BREAKPOINT, vec![Arg::Address(addr), Arg::Integer(kind.into())])?;
        self.breakpoints
            .add(addr, kind, kind == BreakpointKind::Echo, true, None)
            .map(|_| ())
    }

    fn remove_breakpoint(&mut self, addr: Address, kind: BreakpointKind) -> Result<(), Error> {
        self.call_ok(RPC_REMOVE_BREAKPOINT, vec![Arg::Address(addr), Arg::Integer(kind.into())])?;
        self.breakpoints.remove(addr, kind).map(|_| ())
    }

    fn single_step(&mut self, _tid: u32) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn resume_thread(&mut self, _tid: u32) -> Result<(), Error> {
        // Open question (spec.md §9): the instrumentation backend declares
        // thread creation but never implemented suspend/resume; refuse
        // explicitly instead of silently misbehaving.
        Err(Error::Unsupported)
    }

    fn resume_process(&mut self) -> Result<(), Error> {
        self.call_ok(RPC_RESUME_FROM_BP, vec![]).map(|_| ())
    }

    fn suspend_thread(&mut self, _tid: u32) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn halt(&mut self) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn register_layout(&self) -> &[RegisterDescriptor] {
        &self.register_layout
    }

    fn instruction_pointer_index(&self) -> usize {
        self.pc_index
    }

    fn address_size_bits(&self) -> u32 {
        64
    }

    fn options(&self) -> &DebuggerOptions {
        &self.options
    }

    fn poll_events(&mut self) -> Vec<DebugEvent> {
        let _ = self.poll_runner_events();
        self.events.drain_all()
    }

    fn enumerate_modules(&mut self) -> Result<Vec<Module>, Error> {
        Ok(Vec::new())
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

    /// Forwards the disposition to the runner (spec.md §4.9's
    /// `set_exception_action` command), which is the side that actually
    /// knows how to continue the injected client past it.
    fn set_exception_action(&mut self, code: u32, action: ExceptionAction) -> Result<(), Error> {
        let action = match action {
            ExceptionAction::Halt => 0,
            ExceptionAction::PassToApp => 1,
            ExceptionAction::SkipHandler => 2,
        };
        self.call_ok(RPC_SET_EXCEPTION_ACTION, vec![Arg::Integer(code), Arg::Integer(action)])
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::MemTransport;

    fn frame(packet: &Packet) -> Vec<u8> {
        let body = wire::encode(packet);
        let mut out = (body.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(&body);
        out
    }

    fn backend_with_reply(reply: Packet) -> InstrumentationBackend<MemTransport> {
        let inbox = frame(&reply);
        InstrumentationBackend::new(
            MemTransport::new(inbox),
            vec![RegisterDescriptor { name: "PC", byte_size: 4, editable: true }],
            0,
            Arc::new(EventQueue::new()),
        )
    }

    #[test]
    fn ping_succeeds_on_zero_error_code() {
        let reply = Packet::new(0, 0, vec![Arg::Integer(0)]);
        let mut backend = backend_with_reply(reply);
        assert!(backend.attach().is_ok());
    }

    #[test]
    fn nonzero_error_code_is_surfaced() {
        let reply = Packet::new(0, 0, vec![Arg::Integer(7)]);
        let mut backend = backend_with_reply(reply);
        assert!(backend.attach().is_err());
    }

    #[test]
    fn resume_thread_and_suspend_thread_are_explicitly_unsupported() {
        let reply = Packet::new(0, 0, vec![Arg::Integer(0)]);
        let mut backend = backend_with_reply(reply);
        assert!(matches!(backend.resume_thread(1), Err(Error::Unsupported)));
        assert!(matches!(backend.suspend_thread(1), Err(Error::Unsupported)));
    }

    #[test]
    fn set_exception_action_is_forwarded_to_the_runner() {
        let reply = Packet::new(0, 0, vec![Arg::Integer(0)]);
        let mut backend = backend_with_reply(reply);
        assert!(backend.set_exception_action(0xC000_0005, ExceptionAction::SkipHandler).is_ok());
    }

    #[test]
    fn read_memory_extracts_data_argument() {
        let reply = Packet::new(0, 0, vec![Arg::Integer(0), Arg::Data(vec![1, 2, 3, 4])]);
        let mut backend = backend_with_reply(reply);
        let bytes = backend.read_memory(0x1000, 4).unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn parses_thread_created_event_text() {
        match parse_event("thread_created:tid=5;") {
            Some(DebugEvent::ThreadCreated { tid }) => assert_eq!(tid, 5),
            other => panic!("unexpected {other:?}"),
        }
    }
}
