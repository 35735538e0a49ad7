//! GDB remote-serial protocol client backend (spec.md §4.7).
//!
//! Grounded on `original_source/debug/client/gdb/cpus/GdbCpu.cpp`: packet
//! framing (`$<body>#<checksum>`), the ACK/NACK retransmit loop, reply
//! classification, the greet/restart handshake for targets that need one,
//! and the register-string cache invalidated on resume/step/thread switch.

pub mod cpu;
mod cpus;
mod byteswap;
mod reply;
mod runlength;

use std::sync::Arc;

use crate::backend::Backend;
use crate::breakpoint::BreakpointTable;
use crate::error::Error;
use crate::event_queue::EventQueue;
use crate::model::{
    Address, BreakpointKind, DebugEvent, DebuggerOptions, ExceptionAction, Module,
    RegisterDescriptor, RegisterValue, Thread,
};
use crate::transport::Transport;

pub use cpu::CpuKind;
pub use reply::GdbReply;

/// One connected GDB-remote target.
///
/// `cached_registers` mirrors the source's `cachedRegisterString`: a `g`
/// read is skipped if nothing has resumed the target since the last one.
pub struct GdbRemoteBackend<T: Transport> {
    transport: T,
    cpu: CpuKind,
    options: DebuggerOptions,
    events: Arc<EventQueue>,
    breakpoints: BreakpointTable,
    active_tid: Option<u32>,
    suspended: bool,
    cached_registers: Option<Vec<RegisterValue>>,
    /// The front end's `cmd_set_exceptions_options` disposition per code
    /// (spec.md §4.10/§4.11), mirrored from the core's own `ExceptionPolicy`
    /// so `continue_past_exception` knows whether to forward the signal to
    /// the target's own handler (`pass_to_app`) or swallow it (`skip_handler`).
    exception_actions: Vec<(u32, ExceptionAction)>,
}

impl<T: Transport> GdbRemoteBackend<T> {
    pub fn new(transport: T, cpu: CpuKind, events: Arc<EventQueue>) -> Self {
        GdbRemoteBackend {
            transport,
            options: cpu.options(),
            cpu,
            events,
            breakpoints: BreakpointTable::new(),
            active_tid: None,
            suspended: false,
            cached_registers: None,
            exception_actions: Vec::new(),
        }
    }

    fn checksum(body: &[u8]) -> u8 {
        body.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
    }

    fn send_raw_packet(&mut self, body: &[u8]) -> Result<(), Error> {
        let mut out = Vec::with_capacity(body.len() + 4);
        out.push(b'$');
        out.extend_from_slice(body);
        out.push(b'#');
        out.extend_from_slice(format!("{:02x}", Self::checksum(body)).as_bytes());
        self.transport.send_all(&out)
    }

    /// Reads one `$<body>#<hh>` packet, verifies its checksum, ACKs or NACKs
    /// it, and returns the raw body (still run-length encoded).
    fn read_raw_packet(&mut self) -> Result<Vec<u8>, Error> {
        let mut byte = [0u8; 1];
        loop {
            self.transport.recv_exact(&mut byte)?;
            if byte[0] == b'$' {
                break;
            }
        }

        let mut body = Vec::new();
        loop {
            self.transport.recv_exact(&mut byte)?;
            if byte[0] == b'#' {
                break;
            }
            body.push(byte[0]);
        }

        let mut cksum_hex = [0u8; 2];
        self.transport.recv_exact(&mut cksum_hex)?;
        let received = u8::from_str_radix(
            std::str::from_utf8(&cksum_hex).map_err(|_| Error::MalformedPacket)?,
            16,
        )
        .map_err(|_| Error::MalformedPacket)?;
        let computed = Self::checksum(&body);

        if received != computed {
            self.transport.send_all(b"-")?;
            return Err(Error::Checksum { received, computed });
        }

        self.transport.send_all(b"+")?;
        let decoded = runlength::decode(&body, self.cpu.runlength_variant())?;
        Ok(decoded)
    }

    /// Sends `body` and retransmits on NACK until the peer ACKs it
    /// (`GdbCpu::sendAndWaitForAck`).
    fn send_command(&mut self, body: &str) -> Result<(), Error> {
        self.ensure_suspended()?;
        loop {
            self.send_raw_packet(body.as_bytes())?;
            let mut ack = [0u8; 1];
            self.transport.recv_exact(&mut ack)?;
            match ack[0] {
                b'+' => return Ok(()),
                b'-' => continue,
                other => {
                    return Err(Error::UnexpectedReply(format!(
                        "expected ACK/NACK, got byte {other:#x}"
                    )))
                }
            }
        }
    }

    /// Sends the restart handshake and blocks for the greet banner if the
    /// target needs one and isn't already suspended (`GdbCpu::startServer`).
    fn ensure_suspended(&mut self) -> Result<(), Error> {
        if self.suspended || !self.cpu.needs_restarting() {
            return Ok(());
        }
        if let Some(msg) = self.cpu.restart_message() {
            self.transport.send_all(msg)?;
        }
        if let Some(banner) = self.cpu.greet_banner() {
            self.wait_for_banner(&banner)?;
        }
        self.suspended = true;
        Ok(())
    }

    fn wait_for_banner(&mut self, banner: &[u8]) -> Result<(), Error> {
        let mut window = vec![0u8; banner.len()];
        let mut byte = [0u8; 1];
        loop {
            self.transport.recv_exact(&mut byte)?;
            window.remove(0);
            window.push(byte[0]);
            if window == banner {
                return Ok(());
            }
        }
    }

    /// Reads replies until one is not a stop notification, redirecting any
    /// unsolicited stop-reply into the shared event queue along the way
    /// (`GdbCpu::waitForMessage`'s predicate loop, spec.md §4.7/§5).
    fn wait_for_data_or_status(&mut self) -> Result<GdbReply, Error> {
        loop {
            let body = self.read_raw_packet()?;
            let reply = reply::classify(&body);
            match reply {
                GdbReply::StopReply(raw) => self.handle_unsolicited_stop(raw)?,
                other => return Ok(other),
            }
        }
    }

    /// Reads replies until the expected stop notification arrives, used
    /// after `c`/`s`. Any other reply class arriving here is unexpected.
    fn wait_for_stop_reply(&mut self) -> Result<Vec<u8>, Error> {
        loop {
            let body = self.read_raw_packet()?;
            match reply::classify(&body) {
                GdbReply::StopReply(raw) => return Ok(raw),
                GdbReply::ProcessExited(code) => {
                    self.events.push(DebugEvent::ProcessExited {
                        exit_code: Some(code as i32),
                    });
                    return Err(Error::ConnectionClosed);
                }
                GdbReply::ProcessTerminated(signal) => {
                    self.events.push(DebugEvent::ProcessExited { exit_code: None });
                    return Err(Error::UnexpectedReply(format!(
                        "process terminated by signal {signal:#x}"
                    )));
                }
                other => {
                    return Err(Error::UnexpectedReply(format!("{other:?}")));
                }
            }
        }
    }

    /// Sends a continue-family command (`c`, `C<sig>`, …) and processes the
    /// resulting stop-reply the same way regardless of which variant was
    /// sent (spec.md §4.7's command subset groups all of these under one
    /// reply taxonomy).
    fn continue_with(&mut self, command: &str) -> Result<(), Error> {
        let tid = self.active_tid.unwrap_or(1);
        self.send_command(command)?;
        self.suspended = false;
        let body = self.wait_for_stop_reply()?;
        self.suspended = true;
        self.cached_registers = None;
        let reported_tid = reply::stop_reply_thread(&body).unwrap_or(tid);
        let event = self.classify_stop_event(reported_tid, &body)?;
        self.events.push(event);
        Ok(())
    }

    fn handle_unsolicited_stop(&mut self, body: Vec<u8>) -> Result<(), Error> {
        self.suspended = true;
        self.cached_registers = None;
        let tid = reply::stop_reply_thread(&body)
            .or(self.active_tid)
            .unwrap_or(1);
        let event = self.classify_stop_event(tid, &body)?;
        self.events.push(event);
        Ok(())
    }

    fn classify_stop_event(&mut self, tid: u32, body: &[u8]) -> Result<DebugEvent, Error> {
        let pc = self.current_pc(tid).unwrap_or(0);
        let corrected = self.cpu.correct_breakpoint_address(pc);

        if let Some(bp) = self.breakpoints.lookup(corrected).first() {
            let registers = if bp.send_registers {
                self.read_registers(tid).ok()
            } else {
                None
            };
            return Ok(DebugEvent::BreakpointHit {
                kind: bp.kind,
                address: corrected,
                tid,
                registers,
            });
        }

        let code = reply::stop_reply_signal(body).unwrap_or(5) as u32;
        Ok(DebugEvent::Exception {
            tid,
            address: pc,
            exception_code: code,
        })
    }

    fn current_pc(&mut self, tid: u32) -> Result<Address, Error> {
        let regs = self.read_registers(tid)?;
        let idx = self.cpu.instruction_pointer_index();
        let name = self.cpu.register_layout()[idx].name;
        let value = regs
            .iter()
            .find(|r| r.name == name)
            .ok_or(Error::CouldntDetermineInstructionPointer)?;
        u64::from_str_radix(value.hex_value.trim_start_matches("0x"), 16)
            .map_err(|_| Error::CouldntDetermineInstructionPointer)
    }

    fn read_register_string(&mut self) -> Result<String, Error> {
        self.send_command("g")?;
        match self.wait_for_data_or_status()? {
            GdbReply::Data(body) => {
                String::from_utf8(body).map_err(|_| Error::CouldntReadRegisters)
            }
            other => Err(Error::UnexpectedReply(format!("{other:?}"))),
        }
    }

    fn query_current_thread(&mut self) -> Result<u32, Error> {
        self.send_command("qC")?;
        match self.wait_for_data_or_status()? {
            GdbReply::Data(body) => {
                let text = String::from_utf8_lossy(&body).into_owned();
                let hex = text
                    .strip_prefix("QC")
                    .or_else(|| text.strip_prefix('Q'))
                    .unwrap_or(&text);
                u32::from_str_radix(hex, 16)
                    .map_err(|_| Error::UnexpectedReply(format!("qC reply {text}")))
            }
            other => Err(Error::UnexpectedReply(format!("{other:?}"))),
        }
    }

    fn expect_ok(&mut self) -> Result<(), Error> {
        match self.wait_for_data_or_status()? {
            GdbReply::Ok | GdbReply::Unsupported => Ok(()),
            GdbReply::Error(code) => Err(Error::UnexpectedReply(format!("error {code:#x}"))),
            other => Err(Error::UnexpectedReply(format!("{other:?}"))),
        }
    }
}

impl<T: Transport> Backend for GdbRemoteBackend<T> {
    fn attach(&mut self) -> Result<(), Error> {
        self.ensure_suspended()?;
        if let Ok(tid) = self.query_current_thread() {
            self.active_tid = Some(tid);
        } else {
            self.active_tid = Some(1);
        }
        Ok(())
    }

    fn start(&mut self, _path: &str, _argv: &[String]) -> Result<(), Error> {
        // A GDB-remote stub is attached to a process already running inside
        // the target; this backend has no way to launch a new one.
        Err(Error::Unsupported)
    }

    fn detach(&mut self) -> Result<(), Error> {
        self.send_command("D")?;
        self.expect_ok()
    }

    fn terminate(&mut self) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn enumerate_threads(&mut self) -> Result<Vec<Thread>, Error> {
        if !self.options.can_multithread {
            let tid = self.active_tid.unwrap_or(1);
            return Ok(vec![Thread::new(tid)]);
        }

        let mut tids = Vec::new();
        self.send_command("qfThreadInfo")?;
        let mut reply = self.wait_for_data_or_status()?;
        loop {
            let body = match reply {
                GdbReply::Data(body) => body,
                _ => break,
            };
            let text = String::from_utf8_lossy(&body).into_owned();
            if let Some(rest) = text.strip_prefix('m') {
                for part in rest.split(',') {
                    if let Ok(tid) = u32::from_str_radix(part, 16) {
                        tids.push(tid);
                    }
                }
            } else {
                break;
            }
            self.send_command("qsThreadInfo")?;
            reply = self.wait_for_data_or_status()?;
        }

        if tids.is_empty() {
            tids.push(self.active_tid.unwrap_or(1));
        }
        Ok(tids.into_iter().map(Thread::new).collect())
    }

    fn active_thread(&self) -> Option<u32> {
        self.active_tid
    }

    fn set_active_thread(&mut self, tid: u32) -> Result<(), Error> {
        if self.active_tid == Some(tid) {
            return Ok(());
        }
        self.send_command(&format!("Hg{tid:x}"))?;
        self.expect_ok()?;
        self.send_command(&format!("Hc{tid:x}"))?;
        self.expect_ok()?;
        self.active_tid = Some(tid);
        self.cached_registers = None;
        Ok(())
    }

    fn read_registers(&mut self, tid: u32) -> Result<Vec<RegisterValue>, Error> {
        if self.active_tid != Some(tid) {
            self.set_active_thread(tid)?;
        }
        if let Some(cached) = &self.cached_registers {
            return Ok(cached.clone());
        }
        let hex = self.read_register_string()?;
        let registers = self.cpu.parse_register_string(&hex)?;
        self.cached_registers = Some(registers.clone());
        Ok(registers)
    }

    fn write_register(&mut self, tid: u32, name: &str, value: u64) -> Result<(), Error> {
        if self.active_tid != Some(tid) {
            self.set_active_thread(tid)?;
        }
        let hex = self.read_register_string()?;
        let patched = self.cpu.patch_register_string(&hex, name, value as u32)?;
        self.send_command(&format!("G{patched}"))?;
        self.expect_ok()?;
        self.cached_registers = None;
        Ok(())
    }

    fn read_memory(&mut self, addr: Address, size: usize) -> Result<Vec<u8>, Error> {
        let chunk_size = self.cpu.max_read_size();
        let mut out = Vec::with_capacity(size);
        let mut read = 0usize;

        while read < size {
            let to_read = chunk_size.min(size - read);
            self.send_command(&format!("m{:x},{:x}", addr + read as Address, to_read))?;
            let body = match self.wait_for_data_or_status()? {
                GdbReply::Data(body) => body,
                GdbReply::Error(_) => return Err(Error::CouldntReadMemory),
                other => return Err(Error::UnexpectedReply(format!("{other:?}"))),
            };
            let hex = std::str::from_utf8(&body).map_err(|_| Error::CouldntReadMemory)?;
            let bytes = hex_to_bytes(hex)?;
            out.extend_from_slice(&bytes);
            read += to_read;
        }

        out.truncate(size);
        Ok(out)
    }

    fn write_memory(&mut self, addr: Address, bytes: &[u8]) -> Result<(), Error> {
        let mut command = format!("X{:x},{:x}:", addr, bytes.len());
        for b in bytes {
            command.push(*b as char);
        }
        self.send_command(&command)?;
        self.expect_ok()
    }

    fn enumerate_valid_memory(&mut self) -> Result<Vec<(Address, Address)>, Error> {
        Err(Error::Unsupported)
    }

    fn set_breakpoint(&mut self, addr: Address, kind: BreakpointKind) -> Result<(), Error> {
        let opcode = self.cpu.breakpoint_opcode();
        if self.breakpoints.original_bytes(addr).is_none() {
            let original = self.read_memory(addr, opcode.len())?;
            self.breakpoints.store_original_bytes(addr, original);
        }
        self.write_memory(addr, opcode)?;
        self.breakpoints
            .add(addr, kind, kind == BreakpointKind::Echo, true, None)
            .map(|_| ())
    }

    fn remove_breakpoint(&mut self, addr: Address, kind: BreakpointKind) -> Result<(), Error> {
        if let Some(original) = self.breakpoints.remove(addr, kind)? {
            self.write_memory(addr, &original)?;
        }
        Ok(())
    }

    fn single_step(&mut self, tid: u32) -> Result<(), Error> {
        if self.active_tid != Some(tid) {
            self.set_active_thread(tid)?;
        }
        self.send_command("s")?;
        let body = self.wait_for_stop_reply()?;
        self.suspended = true;
        self.cached_registers = None;
        let event = self.classify_stop_event(tid, &body)?;
        self.events.push(event);
        Ok(())
    }

    fn resume_thread(&mut self, tid: u32) -> Result<(), Error> {
        if self.active_tid != Some(tid) {
            self.set_active_thread(tid)?;
        }
        self.resume_process()
    }

    fn resume_process(&mut self) -> Result<(), Error> {
        self.continue_with("c")
    }

    fn suspend_thread(&mut self, _tid: u32) -> Result<(), Error> {
        self.halt()
    }

    fn halt(&mut self) -> Result<(), Error> {
        self.transport.send_all(&[0x03])?;
        self.suspended = true;
        self.cached_registers = None;
        Ok(())
    }

    fn register_layout(&self) -> &[RegisterDescriptor] {
        self.cpu.register_layout()
    }

    fn instruction_pointer_index(&self) -> usize {
        self.cpu.instruction_pointer_index()
    }

    fn address_size_bits(&self) -> u32 {
        self.cpu.address_size_bits()
    }

    fn options(&self) -> &DebuggerOptions {
        &self.options
    }

    fn correct_breakpoint_address(&self, addr: Address) -> Address {
        self.cpu.correct_breakpoint_address(addr)
    }

    fn poll_events(&mut self) -> Vec<DebugEvent> {
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

    fn set_exception_action(&mut self, code: u32, action: ExceptionAction) -> Result<(), Error> {
        if let Some(entry) = self.exception_actions.iter_mut().find(|(c, _)| *c == code) {
            entry.1 = action;
        } else {
            self.exception_actions.push((code, action));
        }
        Ok(())
    }

    /// `pass_to_app` continues with the signal (`C<sig>`, GDB remote's
    /// continue-with-signal packet) so the target's own handler sees it;
    /// `skip_handler` (and anything with no recorded policy) continues
    /// plainly (`c`), swallowing it (spec.md §4.10).
    fn continue_past_exception(&mut self, tid: u32, code: u32) -> Result<(), Error> {
        if self.active_tid != Some(tid) {
            self.set_active_thread(tid)?;
        }
        let action = self
            .exception_actions
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, a)| *a)
            .unwrap_or(ExceptionAction::SkipHandler);
        match action {
            ExceptionAction::PassToApp => self.continue_with(&format!("C{:02x}", code & 0xFF)),
            _ => self.continue_with("c"),
        }
    }
}

fn hex_to_bytes(hex: &str) -> Result<Vec<u8>, Error> {
    if hex.len() % 2 != 0 {
        return Err(Error::MalformedPacket);
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| Error::MalformedPacket))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::MemTransport;
    use std::convert::TryFrom;

    fn packetize(body: &str) -> Vec<u8> {
        let checksum = body.bytes().fold(0u8, |acc, b| acc.wrapping_add(b));
        format!("${body}#{checksum:02x}").into_bytes()
    }

    fn backend_with_inbox(inbox: Vec<u8>) -> GdbRemoteBackend<MemTransport> {
        let cpu = CpuKind::try_from("x86").unwrap();
        GdbRemoteBackend::new(MemTransport::new(inbox), cpu, Arc::new(EventQueue::new()))
    }

    #[test]
    fn read_raw_packet_acks_on_good_checksum() {
        let mut backend = backend_with_inbox(packetize("OK"));
        let body = backend.read_raw_packet().unwrap();
        assert_eq!(body, b"OK");
        assert_eq!(backend.transport.outbox, b"+");
    }

    #[test]
    fn read_raw_packet_nacks_on_bad_checksum() {
        let mut inbox = packetize("OK");
        let last = inbox.len() - 1;
        inbox[last] = b'0'; // corrupt the checksum's low nibble
        let mut backend = backend_with_inbox(inbox);
        assert!(matches!(
            backend.read_raw_packet(),
            Err(Error::Checksum { .. })
        ));
        assert_eq!(backend.transport.outbox, b"-");
    }

    #[test]
    fn send_command_retransmits_on_nack() {
        let mut backend = backend_with_inbox(vec![b'-', b'+']);
        backend.send_command("g").unwrap();
        let sent = packetize("g");
        let mut expected = sent.clone();
        expected.extend_from_slice(&sent);
        assert_eq!(backend.transport.outbox, expected);
    }

    #[test]
    fn read_registers_parses_and_caches() {
        let hex = "00000000".repeat(10);
        let mut inbox = Vec::new();
        inbox.push(b'+'); // ack for "g"
        inbox.extend(packetize(&hex));
        let mut backend = backend_with_inbox(inbox);
        let regs = backend.read_registers(1).unwrap();
        assert!(regs.iter().any(|r| r.name == "EAX"));
        assert!(backend.cached_registers.is_some());
    }

    #[test]
    fn unsolicited_stop_reply_is_queued_not_returned() {
        let hex = "00000000".repeat(10);
        let mut inbox = Vec::new();
        inbox.push(b'+'); // ack for "g"
        inbox.extend(packetize("T0505:01;")); // unsolicited, redirected
        inbox.extend(packetize(&hex)); // the actual register data
        let mut backend = backend_with_inbox(inbox);
        let regs = backend.read_registers(1).unwrap();
        assert!(regs.iter().any(|r| r.name == "EAX"));
        assert_eq!(backend.events.len(), 1);
    }

    #[test]
    fn hex_to_bytes_round_trips() {
        assert_eq!(hex_to_bytes("deadbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(hex_to_bytes("abc").is_err());
    }

    #[test]
    fn start_is_unsupported() {
        let mut backend = backend_with_inbox(Vec::new());
        assert!(matches!(backend.start("x", &[]), Err(Error::Unsupported)));
    }
}
