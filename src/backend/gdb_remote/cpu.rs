//! Per-CPU descriptions, as a tagged enum plus pure dispatch functions
//! rather than a virtual-inheritance hierarchy (spec.md §9: "Polymorphism
//! over CPUs").

use std::convert::TryFrom;

use crate::error::Error;
use crate::model::{Address, DebuggerOptions, RegisterDescriptor, RegisterValue};

use super::cpus::{arm, mips, netscreen, powerpc, x86};
use super::runlength::RunlengthVariant;

/// The CPU tag accepted on the CLI (spec.md §6) and used to select a
/// register layout, greet/restart strings, breakpoint opcode and
/// run-length variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuKind {
    X86,
    ArmLittleEndian,
    Cisco2600,
    Cisco3600,
    Ns5xt,
    Ppc603e,
}

impl TryFrom<&str> for CpuKind {
    type Error = Error;

    fn try_from(tag: &str) -> Result<Self, Error> {
        match tag {
            "x86" => Ok(CpuKind::X86),
            "ARMLittleEndian" => Ok(CpuKind::ArmLittleEndian),
            "Cisco2600" => Ok(CpuKind::Cisco2600),
            "Cisco3600" => Ok(CpuKind::Cisco3600),
            "NS5XT" => Ok(CpuKind::Ns5xt),
            "PPC603e" => Ok(CpuKind::Ppc603e),
            other => Err(Error::InvalidCpuString(other.to_string())),
        }
    }
}

impl CpuKind {
    pub fn register_layout(self) -> &'static [RegisterDescriptor] {
        match self {
            CpuKind::X86 => x86::REGISTERS,
            CpuKind::ArmLittleEndian => arm::REGISTERS,
            CpuKind::Cisco2600 | CpuKind::Cisco3600 => mips::REGISTERS,
            CpuKind::Ns5xt => netscreen::REGISTERS,
            CpuKind::Ppc603e => powerpc::REGISTERS,
        }
    }

    pub fn parse_register_string(self, hex: &str) -> Result<Vec<RegisterValue>, Error> {
        match self {
            CpuKind::X86 => x86::parse_register_string(hex),
            CpuKind::ArmLittleEndian => arm::parse_register_string(hex),
            CpuKind::Cisco2600 | CpuKind::Cisco3600 => mips::parse_register_string(hex),
            CpuKind::Ns5xt => netscreen::parse_register_string(hex),
            CpuKind::Ppc603e => powerpc::parse_register_string(hex),
        }
    }

    /// Patches one register's value into a raw `g`-reply register string
    /// (spec.md §4.7, grounded on `GdbCpu::setRegister`/`createRegisterString`).
    pub fn patch_register_string(self, hex: &str, name: &str, value: u32) -> Result<String, Error> {
        match self {
            CpuKind::X86 => x86::patch_register_string(hex, name, value),
            CpuKind::ArmLittleEndian => arm::patch_register_string(hex, name, value),
            CpuKind::Cisco2600 | CpuKind::Cisco3600 => mips::patch_register_string(hex, name, value),
            CpuKind::Ns5xt => netscreen::patch_register_string(hex, name, value),
            CpuKind::Ppc603e => powerpc::patch_register_string(hex, name, value),
        }
    }

    /// The banner the target emits once it has (re-)entered GDB mode, if
    /// any (spec.md §4.7). Cisco targets answer with `"||||"`; the
    /// Netscreen 5XT answers with fifty `|` characters.
    pub fn greet_banner(self) -> Option<Vec<u8>> {
        match self {
            CpuKind::Cisco2600 | CpuKind::Cisco3600 => Some(b"||||".to_vec()),
            CpuKind::Ns5xt => Some(vec![b'|'; 50]),
            _ => None,
        }
    }

    /// The message sent to provoke `greet_banner()` when the target is not
    /// already suspended (spec.md §4.7).
    pub fn restart_message(self) -> Option<&'static [u8]> {
        match self {
            CpuKind::Cisco2600 | CpuKind::Cisco3600 => Some(b"\r\ngdb kernel\r\n\r\n"),
            CpuKind::Ns5xt => Some(b"set gdb enable\r\n\r\n"),
            _ => None,
        }
    }

    /// Whether this target needs the restart handshake before a command is
    /// sent while it is not already suspended.
    pub fn needs_restarting(self) -> bool {
        self.restart_message().is_some()
    }

    pub fn breakpoint_opcode(self) -> &'static [u8] {
        match self {
            CpuKind::X86 => &[0xCC],
            CpuKind::ArmLittleEndian => &[0x01, 0x00, 0x9F, 0xEF],
            CpuKind::Cisco2600 | CpuKind::Cisco3600 => &[0x00, 0x00, 0x00, 0x0D],
            CpuKind::Ppc603e | CpuKind::Ns5xt => &[0x7F, 0xE0, 0x00, 0x08],
        }
    }

    pub fn runlength_variant(self) -> RunlengthVariant {
        match self {
            CpuKind::Cisco2600 | CpuKind::Cisco3600 => RunlengthVariant::Cisco,
            _ => RunlengthVariant::Standard,
        }
    }

    /// x86 traps deliver PC after the breakpoint opcode; every other CPU
    /// here delivers the breakpoint instruction's own address.
    pub fn correct_breakpoint_address(self, addr: Address) -> Address {
        match self {
            CpuKind::X86 => addr.wrapping_sub(self.breakpoint_opcode().len() as Address),
            _ => addr,
        }
    }

    /// Index of the program-counter register within `register_layout()`.
    fn pc_name(self) -> &'static str {
        match self {
            CpuKind::X86 => "EIP",
            CpuKind::ArmLittleEndian => "PC",
            CpuKind::Cisco2600 | CpuKind::Cisco3600 | CpuKind::Ppc603e | CpuKind::Ns5xt => "pc",
        }
    }

    pub fn instruction_pointer_index(self) -> usize {
        self.register_layout()
            .iter()
            .position(|d| d.name == self.pc_name())
            .expect("every CpuKind's register_layout() names its pc register")
    }

    pub fn address_size_bits(self) -> u32 {
        match self {
            CpuKind::X86 | CpuKind::ArmLittleEndian => 32,
            CpuKind::Cisco2600 | CpuKind::Cisco3600 | CpuKind::Ppc603e | CpuKind::Ns5xt => 32,
        }
    }

    /// Whether this target's stop-reply stream delivers a distinct
    /// "breakpoint hit" message, as opposed to reusing a generic "stopped"
    /// reply that must be disambiguated by comparing it to the greet
    /// banner (spec.md §4.5: `has_regular_breakpoint_message`). The Cisco
    /// and Netscreen targets fold the two together.
    pub fn has_regular_breakpoint_message(self) -> bool {
        !matches!(
            self,
            CpuKind::Cisco2600 | CpuKind::Cisco3600 | CpuKind::Ns5xt
        )
    }

    /// Maximum number of bytes requested per `m<addr>,<n>` chunk
    /// (spec.md §4.7). The Cisco MIPS link tops out at 199 bytes; other
    /// targets use a generous default.
    pub fn max_read_size(self) -> usize {
        match self {
            CpuKind::Cisco2600 | CpuKind::Cisco3600 => 199,
            _ => 256,
        }
    }

    pub fn options(self) -> DebuggerOptions {
        let mut options = DebuggerOptions {
            can_terminate: false,
            can_memmap: false,
            can_valid_memory: false,
            can_halt: true,
            halt_before_communicating: true,
            has_stack: !matches!(self, CpuKind::X86),
            can_break_on_module_load: false,
            can_break_on_module_unload: false,
            can_trace_count: false,
            can_multithread: matches!(self, CpuKind::X86),
            ..DebuggerOptions::default()
        };
        options.exceptions = Vec::new();
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_cli_tags_parse() {
        for tag in [
            "x86",
            "ARMLittleEndian",
            "Cisco2600",
            "Cisco3600",
            "NS5XT",
            "PPC603e",
        ] {
            assert!(CpuKind::try_from(tag).is_ok(), "{tag} should parse");
        }
    }

    #[test]
    fn unknown_tag_is_an_error() {
        assert!(CpuKind::try_from("Z80").is_err());
    }

    #[test]
    fn x86_breakpoint_address_is_corrected_by_opcode_length() {
        assert_eq!(CpuKind::X86.correct_breakpoint_address(0x401001), 0x401000);
    }

    #[test]
    fn non_x86_breakpoint_address_is_identity() {
        assert_eq!(
            CpuKind::ArmLittleEndian.correct_breakpoint_address(0x8000),
            0x8000
        );
    }

    #[test]
    fn cisco_targets_use_cisco_runlength_and_need_restarting() {
        assert_eq!(CpuKind::Cisco2600.runlength_variant(), RunlengthVariant::Cisco);
        assert!(CpuKind::Cisco2600.needs_restarting());
        assert!(CpuKind::Cisco3600.needs_restarting());
    }

    #[test]
    fn x86_does_not_need_restarting() {
        assert!(!CpuKind::X86.needs_restarting());
        assert!(CpuKind::X86.greet_banner().is_none());
    }
}
