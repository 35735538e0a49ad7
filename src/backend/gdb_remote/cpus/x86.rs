//! x86 register layout and GDB register-string parsing.
//!
//! Grounded on `original_source/debug/client/gdb/cpus/CpuX86.cpp`:
//! the GDB register string carries 10 little-endian 4-byte words in the
//! order EAX, ECX, EDX, EBX, ESP, EBP, ESI, EDI, EIP, EFLAGS; flag
//! registers are derived from EFLAGS bits 0, 2, 4, 6, 7, 11.

use crate::error::Error;
use crate::model::{RegisterDescriptor, RegisterValue};

use super::super::byteswap::parse_u32_hex_pair_swapped;
use super::{reg, reg_flagged};

pub const REGISTERS: &[RegisterDescriptor] = &[
    RegisterDescriptor { name: "EAX", byte_size: 4, editable: true },
    RegisterDescriptor { name: "EBX", byte_size: 4, editable: true },
    RegisterDescriptor { name: "ECX", byte_size: 4, editable: true },
    RegisterDescriptor { name: "EDX", byte_size: 4, editable: true },
    RegisterDescriptor { name: "ESI", byte_size: 4, editable: true },
    RegisterDescriptor { name: "EDI", byte_size: 4, editable: true },
    RegisterDescriptor { name: "EBP", byte_size: 4, editable: true },
    RegisterDescriptor { name: "ESP", byte_size: 4, editable: true },
    RegisterDescriptor { name: "EIP", byte_size: 4, editable: true },
    RegisterDescriptor { name: "EFLAGS", byte_size: 4, editable: false },
    RegisterDescriptor { name: "CF", byte_size: 0, editable: true },
    RegisterDescriptor { name: "PF", byte_size: 0, editable: true },
    RegisterDescriptor { name: "AF", byte_size: 0, editable: true },
    RegisterDescriptor { name: "ZF", byte_size: 0, editable: true },
    RegisterDescriptor { name: "SF", byte_size: 0, editable: true },
    RegisterDescriptor { name: "OF", byte_size: 0, editable: true },
];

/// GDB-order index of the instruction pointer (EIP), used directly as
/// `CpuKind::X86::instruction_pointer_index`.
pub const EIP_GDB_INDEX: usize = 8;

/// Patches `name`'s value into a previously-read raw register string and
/// returns the new raw string ready to send back in a `G` command.
///
/// Grounded on `CpuX86::naviIndexToGdbIndex` (`EAX, ECX, EDX, EBX, ESP, EBP,
/// ESI, EDI, EIP, EFLAGS` wire order vs. `EAX, EBX, ECX, EDX, ESI, EDI, ESP,
/// EBP, EIP, EFLAGS` display order) and `GdbCpu::setRegister`'s flag-bit
/// patching of EFLAGS for the derived single-bit registers.
pub fn patch_register_string(hex: &str, name: &str, value: u32) -> Result<String, Error> {
    const WORDS: usize = 10;
    if hex.len() < WORDS * 8 {
        return Err(Error::UnexpectedReply(format!(
            "x86 register string too short: {} chars",
            hex.len()
        )));
    }

    let gdb_index = match name {
        "EAX" => 0,
        "ECX" => 1,
        "EDX" => 2,
        "EBX" => 3,
        "ESP" => 4,
        "EBP" => 5,
        "ESI" => 6,
        "EDI" => 7,
        "EIP" => 8,
        "EFLAGS" | "CF" | "PF" | "AF" | "ZF" | "SF" | "OF" => 9,
        _ => return Err(Error::Unsupported),
    };

    if gdb_index == 9 && name != "EFLAGS" {
        let word = &hex[9 * 8..9 * 8 + 8];
        let current = parse_u32_hex_pair_swapped(word);
        let bit = match name {
            "CF" => 0,
            "PF" => 2,
            "AF" => 4,
            "ZF" => 6,
            "SF" => 7,
            "OF" => 11,
            _ => unreachable!(),
        };
        let new_eflags = (current & !(1u32 << bit)) | ((value & 1) << bit);
        return Ok(patch_word(hex, 9, new_eflags));
    }

    Ok(patch_word(hex, gdb_index, value))
}

fn patch_word(hex: &str, word_index: usize, value: u32) -> String {
    let mut out = String::with_capacity(hex.len());
    out.push_str(&hex[..word_index * 8]);
    out.push_str(&format!(
        "{:02x}{:02x}{:02x}{:02x}",
        value & 0xFF,
        (value >> 8) & 0xFF,
        (value >> 16) & 0xFF,
        (value >> 24) & 0xFF
    ));
    out.push_str(&hex[word_index * 8 + 8..]);
    out
}

pub fn parse_register_string(hex: &str) -> Result<Vec<RegisterValue>, Error> {
    const WORDS: usize = 10;
    if hex.len() < WORDS * 8 {
        return Err(Error::UnexpectedReply(format!(
            "x86 register string too short: {} chars",
            hex.len()
        )));
    }

    let mut values = [0u32; WORDS];
    for (i, slot) in values.iter_mut().enumerate() {
        *slot = parse_u32_hex_pair_swapped(&hex[i * 8..i * 8 + 8]);
    }

    // GDB order: EAX, ECX, EDX, EBX, ESP, EBP, ESI, EDI, EIP, EFLAGS
    let (eax, ecx, edx, ebx, esp, ebp, esi, edi, eip, eflags) = (
        values[0], values[1], values[2], values[3], values[4], values[5], values[6], values[7],
        values[8], values[9],
    );

    let mut out = Vec::with_capacity(REGISTERS.len());
    out.push(reg("EAX", eax));
    out.push(reg("EBX", ebx));
    out.push(reg("ECX", ecx));
    out.push(reg("EDX", edx));
    out.push(reg("ESI", esi));
    out.push(reg("EDI", edi));
    out.push(reg_flagged("ESP", esp, false, true));
    out.push(reg("EBP", ebp));
    out.push(reg_flagged("EIP", eip, true, false));
    out.push(reg("EFLAGS", eflags));
    out.push(reg("CF", eflags & 1));
    out.push(reg("PF", (eflags >> 2) & 1));
    out.push(reg("AF", (eflags >> 4) & 1));
    out.push(reg("ZF", (eflags >> 6) & 1));
    out.push(reg("SF", (eflags >> 7) & 1));
    out.push(reg("OF", (eflags >> 11) & 1));

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(value: u32) -> String {
        // little-endian byte order, as the GDB server would send it
        format!("{:02x}{:02x}{:02x}{:02x}",
            value & 0xFF, (value >> 8) & 0xFF, (value >> 16) & 0xFF, (value >> 24) & 0xFF)
    }

    #[test]
    fn parses_eax_from_first_word_little_endian() {
        let mut hex = String::new();
        hex += &word(0x1234_5678); // EAX
        for _ in 0..9 {
            hex += &word(0);
        }
        let regs = parse_register_string(&hex).unwrap();
        let eax = regs.iter().find(|r| r.name == "EAX").unwrap();
        assert_eq!(eax.hex_value, "0x12345678");
    }

    #[test]
    fn derives_flags_from_eflags_bits() {
        let mut hex = String::new();
        for _ in 0..9 {
            hex += &word(0);
        }
        // EFLAGS: ZF (bit 6) and OF (bit 11) set
        hex += &word((1 << 6) | (1 << 11));

        let regs = parse_register_string(&hex).unwrap();
        let get = |name: &str| {
            regs.iter().find(|r| r.name == name).unwrap().hex_value.clone()
        };
        assert_eq!(get("ZF"), "0x1");
        assert_eq!(get("OF"), "0x1");
        assert_eq!(get("CF"), "0x0");
        assert_eq!(get("PF"), "0x0");
    }

    #[test]
    fn too_short_string_is_an_error() {
        assert!(parse_register_string("1234").is_err());
    }

    #[test]
    fn patches_eax_at_its_own_gdb_word() {
        let mut hex = String::new();
        for _ in 0..10 {
            hex += &word(0);
        }
        let patched = patch_register_string(&hex, "EAX", 0x1122_3344).unwrap();
        let regs = parse_register_string(&patched).unwrap();
        let eax = regs.iter().find(|r| r.name == "EAX").unwrap();
        assert_eq!(eax.hex_value, "0x11223344");
    }

    #[test]
    fn patches_zf_by_flipping_eflags_bit() {
        let mut hex = String::new();
        for _ in 0..10 {
            hex += &word(0);
        }
        let patched = patch_register_string(&hex, "ZF", 1).unwrap();
        let regs = parse_register_string(&patched).unwrap();
        let get = |name: &str| regs.iter().find(|r| r.name == name).unwrap().hex_value.clone();
        assert_eq!(get("ZF"), "0x1");
        assert_eq!(get("CF"), "0x0");

        let cleared = patch_register_string(&patched, "ZF", 0).unwrap();
        let regs = parse_register_string(&cleared).unwrap();
        assert_eq!(
            regs.iter().find(|r| r.name == "ZF").unwrap().hex_value,
            "0x0"
        );
    }

    #[test]
    fn unknown_register_name_is_unsupported() {
        assert!(matches!(
            patch_register_string("0".repeat(80).as_str(), "R0", 0),
            Err(Error::Unsupported)
        ));
    }
}
