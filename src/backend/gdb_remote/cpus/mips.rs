//! MIPS register layout, shared by the two Cisco CLI tags (spec.md §6's
//! `Cisco2600`/`Cisco3600`).
//!
//! Grounded on `original_source/debug/client/gdb/cpus/Cisco3600.cpp`
//! (`MIPS::getRegisterNames`/`MIPS::parseRegistersString`): 38 big-endian(!)
//! 4-byte words read straight through in GDB order, unlike the
//! little-endian CPUs. `pc` is register index 37, matching
//! `CpuKind::instruction_pointer_index`.

use crate::error::Error;
use crate::model::{RegisterDescriptor, RegisterValue};

use super::reg_flagged;

const NAMES: &[&str] = &[
    "zr", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5", "t6", "t7",
    "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1", "gp", "sp", "fp", "ra",
    "status", "lo", "hi", "??3", "??4", "pc",
];

pub const REGISTERS: &[RegisterDescriptor] = &[
    RegisterDescriptor { name: "zr", byte_size: 4, editable: true },
    RegisterDescriptor { name: "at", byte_size: 4, editable: true },
    RegisterDescriptor { name: "v0", byte_size: 4, editable: true },
    RegisterDescriptor { name: "v1", byte_size: 4, editable: true },
    RegisterDescriptor { name: "a0", byte_size: 4, editable: true },
    RegisterDescriptor { name: "a1", byte_size: 4, editable: true },
    RegisterDescriptor { name: "a2", byte_size: 4, editable: true },
    RegisterDescriptor { name: "a3", byte_size: 4, editable: true },
    // `t0` is not editable in the source; every other GPR is.
    RegisterDescriptor { name: "t0", byte_size: 4, editable: false },
    RegisterDescriptor { name: "t1", byte_size: 4, editable: true },
    RegisterDescriptor { name: "t2", byte_size: 4, editable: true },
    RegisterDescriptor { name: "t3", byte_size: 4, editable: true },
    RegisterDescriptor { name: "t4", byte_size: 4, editable: true },
    RegisterDescriptor { name: "t5", byte_size: 4, editable: true },
    RegisterDescriptor { name: "t6", byte_size: 4, editable: true },
    RegisterDescriptor { name: "t7", byte_size: 4, editable: true },
    RegisterDescriptor { name: "s0", byte_size: 4, editable: true },
    RegisterDescriptor { name: "s1", byte_size: 4, editable: true },
    RegisterDescriptor { name: "s2", byte_size: 4, editable: true },
    RegisterDescriptor { name: "s3", byte_size: 4, editable: true },
    RegisterDescriptor { name: "s4", byte_size: 4, editable: true },
    RegisterDescriptor { name: "s5", byte_size: 4, editable: true },
    RegisterDescriptor { name: "s6", byte_size: 4, editable: true },
    RegisterDescriptor { name: "s7", byte_size: 4, editable: true },
    RegisterDescriptor { name: "t8", byte_size: 4, editable: true },
    RegisterDescriptor { name: "t9", byte_size: 4, editable: true },
    RegisterDescriptor { name: "k0", byte_size: 4, editable: true },
    RegisterDescriptor { name: "k1", byte_size: 4, editable: true },
    RegisterDescriptor { name: "gp", byte_size: 4, editable: true },
    RegisterDescriptor { name: "sp", byte_size: 4, editable: true },
    RegisterDescriptor { name: "fp", byte_size: 4, editable: true },
    RegisterDescriptor { name: "ra", byte_size: 4, editable: true },
    RegisterDescriptor { name: "status", byte_size: 4, editable: true },
    RegisterDescriptor { name: "lo", byte_size: 4, editable: true },
    RegisterDescriptor { name: "hi", byte_size: 4, editable: true },
    RegisterDescriptor { name: "??3", byte_size: 4, editable: true },
    RegisterDescriptor { name: "??4", byte_size: 4, editable: true },
    RegisterDescriptor { name: "pc", byte_size: 4, editable: true },
];

/// Patches `name`'s value into a previously-read raw register string.
/// MIPS words are big-endian and read straight through in wire order, so
/// unlike x86 no index remapping is needed; `t0` and the two unnamed
/// registers stay read-only, matching their `editable: false`/placeholder
/// descriptors.
pub fn patch_register_string(hex: &str, name: &str, value: u32) -> Result<String, Error> {
    if hex.len() < NAMES.len() * 8 {
        return Err(Error::UnexpectedReply(format!(
            "MIPS register string too short: {} chars",
            hex.len()
        )));
    }
    let idx = NAMES.iter().position(|&n| n == name).ok_or(Error::Unsupported)?;
    if !REGISTERS[idx].editable {
        return Err(Error::Unsupported);
    }
    let mut out = String::with_capacity(hex.len());
    out.push_str(&hex[..idx * 8]);
    out.push_str(&format!("{:08x}", value));
    out.push_str(&hex[idx * 8 + 8..]);
    Ok(out)
}

pub fn parse_register_string(hex: &str) -> Result<Vec<RegisterValue>, Error> {
    if hex.len() < NAMES.len() * 8 {
        return Err(Error::UnexpectedReply(format!(
            "MIPS register string too short: {} chars",
            hex.len()
        )));
    }

    let mut out = Vec::with_capacity(NAMES.len());
    for (i, &name) in NAMES.iter().enumerate() {
        let word = &hex[i * 8..i * 8 + 8];
        let value = u32::from_str_radix(word, 16).unwrap_or(0);
        let is_pc = name == "pc";
        out.push(reg_flagged(name, value, is_pc, false));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pc_from_register_37() {
        let mut hex = String::new();
        for i in 0..38u32 {
            hex += &format!("{:08x}", i);
        }
        let regs = parse_register_string(&hex).unwrap();
        let pc = regs.iter().find(|r| r.name == "pc").unwrap();
        assert_eq!(pc.hex_value, "0x25"); // index 37 == 0x25
        assert!(pc.is_pc);
    }

    #[test]
    fn too_short_string_is_an_error() {
        assert!(parse_register_string("1234").is_err());
    }

    #[test]
    fn patches_named_register_in_place() {
        let mut hex = String::new();
        for i in 0..38u32 {
            hex += &format!("{:08x}", i);
        }
        let patched = patch_register_string(&hex, "v0", 0xdead_beef).unwrap();
        let regs = parse_register_string(&patched).unwrap();
        assert_eq!(
            regs.iter().find(|r| r.name == "v0").unwrap().hex_value,
            "0xdeadbeef"
        );
    }

    #[test]
    fn t0_is_not_editable() {
        let mut hex = String::new();
        for i in 0..38u32 {
            hex += &format!("{:08x}", i);
        }
        assert!(matches!(patch_register_string(&hex, "t0", 1), Err(Error::Unsupported)));
    }
}
