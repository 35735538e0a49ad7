//! PowerPC (603e) register layout and GDB register-string parsing, shared
//! with the Netscreen 5XT's broader layout (`netscreen.rs`) which is built
//! on top of this module's GPR/CR/XER decomposition.
//!
//! Grounded on `original_source/debug/client/gdb/cpus/PowerPC.cpp` (big
//! endian, breakpoint opcode `7F E0 00 08`) and the scalar-register portion
//! of `NS5XT.cpp::parseRegistersString` (32 GPRs, then `pc, msr, cr, lr,
//! ctr, xer`, with `cr`/`xer` further decomposed into their documented
//! sub-fields).

use crate::error::Error;
use crate::model::{RegisterDescriptor, RegisterValue};

use super::{reg, reg_flagged};

/// Number of hex chars consumed by the 32 general-purpose registers.
pub const GPR_HEX_LEN: usize = 32 * 8;

pub const REGISTERS: &[RegisterDescriptor] = &[
    RegisterDescriptor { name: "r0", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r1", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r2", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r3", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r4", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r5", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r6", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r7", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r8", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r9", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r10", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r11", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r12", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r13", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r14", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r15", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r16", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r17", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r18", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r19", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r20", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r21", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r22", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r23", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r24", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r25", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r26", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r27", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r28", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r29", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r30", byte_size: 4, editable: true },
    RegisterDescriptor { name: "r31", byte_size: 4, editable: true },
    RegisterDescriptor { name: "pc", byte_size: 4, editable: true },
    RegisterDescriptor { name: "msr", byte_size: 4, editable: true },
    RegisterDescriptor { name: "cr", byte_size: 4, editable: true },
    RegisterDescriptor { name: "lr", byte_size: 4, editable: true },
    RegisterDescriptor { name: "ctr", byte_size: 4, editable: true },
    RegisterDescriptor { name: "xer", byte_size: 4, editable: true },
    RegisterDescriptor { name: "cr0", byte_size: 4, editable: true },
    RegisterDescriptor { name: "cr1", byte_size: 4, editable: true },
    RegisterDescriptor { name: "cr2", byte_size: 4, editable: true },
    RegisterDescriptor { name: "cr3", byte_size: 4, editable: true },
    RegisterDescriptor { name: "cr4", byte_size: 4, editable: true },
    RegisterDescriptor { name: "cr5", byte_size: 4, editable: true },
    RegisterDescriptor { name: "cr6", byte_size: 4, editable: true },
    RegisterDescriptor { name: "cr7", byte_size: 4, editable: true },
    RegisterDescriptor { name: "xer_so", byte_size: 0, editable: true },
    RegisterDescriptor { name: "xer_ov", byte_size: 0, editable: true },
    RegisterDescriptor { name: "xer_ca", byte_size: 0, editable: true },
    RegisterDescriptor { name: "xer_bytecount", byte_size: 2, editable: true },
];

/// Parses the 32-GPR-plus-scalar prefix shared by PowerPC and Netscreen
/// register strings, returning the values plus the byte offset the caller
/// should continue parsing from (used by `netscreen.rs` to splice in the
/// FPR block that sits between the GPRs and `pc` on that target).
pub(crate) fn parse_gprs(hex: &str) -> Result<Vec<RegisterValue>, Error> {
    if hex.len() < GPR_HEX_LEN {
        return Err(Error::UnexpectedReply(format!(
            "PowerPC register string too short for GPRs: {} chars",
            hex.len()
        )));
    }
    let mut out = Vec::with_capacity(32);
    for i in 0..32 {
        let word = &hex[i * 8..i * 8 + 8];
        let value = u32::from_str_radix(word, 16).unwrap_or(0);
        let is_sp = i == 1;
        out.push(reg_flagged(gpr_name(i), value, false, is_sp));
    }
    Ok(out)
}

fn gpr_name(i: usize) -> &'static str {
    const NAMES: [&str; 32] = [
        "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12", "r13",
        "r14", "r15", "r16", "r17", "r18", "r19", "r20", "r21", "r22", "r23", "r24", "r25", "r26",
        "r27", "r28", "r29", "r30", "r31",
    ];
    NAMES[i]
}

/// Parses the scalar `pc, msr, cr, lr, ctr, xer` block and its derived
/// sub-fields, starting at `offset` hex chars into `hex`.
pub(crate) fn parse_scalars(hex: &str, offset: usize) -> Result<Vec<RegisterValue>, Error> {
    if hex.len() < offset + 6 * 8 {
        return Err(Error::UnexpectedReply(format!(
            "PowerPC register string too short for scalar block: {} chars",
            hex.len()
        )));
    }
    let word = |n: usize| -> u32 {
        u32::from_str_radix(&hex[offset + n * 8..offset + n * 8 + 8], 16).unwrap_or(0)
    };

    let pc = word(0);
    let msr = word(1);
    let cr = word(2);
    let lr = word(3);
    let ctr = word(4);
    let xer = word(5);

    let mut out = vec![
        reg_flagged("pc", pc, true, false),
        reg("msr", msr),
        reg("cr", cr),
        reg("lr", lr),
        reg("ctr", ctr),
        reg("xer", xer),
    ];

    for i in 0..8 {
        let nibble = (cr >> (i * 4)) & 0xF;
        out.push(reg(cr_name(i), nibble));
    }

    out.push(reg("xer_so", xer & 1));
    out.push(reg("xer_ov", (xer >> 1) & 1));
    out.push(reg("xer_ca", (xer >> 2) & 1));
    out.push(reg("xer_bytecount", (xer >> 24) & 0x3F));

    Ok(out)
}

fn cr_name(i: usize) -> &'static str {
    const NAMES: [&str; 8] = ["cr0", "cr1", "cr2", "cr3", "cr4", "cr5", "cr6", "cr7"];
    NAMES[i]
}

pub fn parse_register_string(hex: &str) -> Result<Vec<RegisterValue>, Error> {
    let mut out = parse_gprs(hex)?;
    out.extend(parse_scalars(hex, GPR_HEX_LEN)?);
    Ok(out)
}

/// Overwrites the big-endian word at `word_index` (0-based, 8 hex chars
/// each) within `hex`, returning the patched string.
pub(crate) fn patch_word_at(hex: &str, word_index: usize, value: u32) -> String {
    let offset = word_index * 8;
    let mut out = String::with_capacity(hex.len());
    out.push_str(&hex[..offset]);
    out.push_str(&format!("{:08x}", value));
    out.push_str(&hex[offset + 8..]);
    out
}

/// Patches a directly-addressable register (a GPR or one of `pc, msr, cr,
/// lr, ctr, xer`); the derived `cr0..cr7`/`xer_*` sub-fields are read-only
/// here since the source never re-encodes them back into `cr`/`xer`.
pub fn patch_register_string(hex: &str, name: &str, value: u32) -> Result<String, Error> {
    if hex.len() < GPR_HEX_LEN + 6 * 8 {
        return Err(Error::UnexpectedReply(format!(
            "PowerPC register string too short: {} chars",
            hex.len()
        )));
    }
    if let Some(idx) = (0..32).find(|&i| gpr_name(i) == name) {
        return Ok(patch_word_at(hex, idx, value));
    }
    let idx = match name {
        "pc" => 32,
        "msr" => 33,
        "cr" => 34,
        "lr" => 35,
        "ctr" => 36,
        "xer" => 37,
        _ => return Err(Error::Unsupported),
    };
    Ok(patch_word_at(hex, idx, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pc_after_32_gprs() {
        let mut hex = String::new();
        for _ in 0..32 {
            hex += "00000000";
        }
        hex += "12345678"; // pc
        hex += "00000000"; // msr
        hex += "00000000"; // cr
        hex += "00000000"; // lr
        hex += "00000000"; // ctr
        hex += "00000000"; // xer

        let regs = parse_register_string(&hex).unwrap();
        let pc = regs.iter().find(|r| r.name == "pc").unwrap();
        assert_eq!(pc.hex_value, "0x12345678");
        assert!(pc.is_pc);
    }

    #[test]
    fn cr_nibbles_decompose_into_cr0_through_cr7() {
        let mut hex = String::new();
        for _ in 0..32 {
            hex += "00000000";
        }
        hex += "00000000"; // pc
        hex += "00000000"; // msr
        hex += "fedcba98"; // cr: nibbles low->high = 8,9,a,b,c,d,e,f
        hex += "00000000"; // lr
        hex += "00000000"; // ctr
        hex += "00000000"; // xer

        let regs = parse_register_string(&hex).unwrap();
        let get = |name: &str| regs.iter().find(|r| r.name == name).unwrap().hex_value.clone();
        assert_eq!(get("cr0"), "0x8");
        assert_eq!(get("cr7"), "0xf");
    }

    #[test]
    fn too_short_string_is_an_error() {
        assert!(parse_register_string("1234").is_err());
    }

    #[test]
    fn patches_a_gpr_and_the_pc() {
        let mut hex = "00000000".repeat(32 + 6);
        hex = patch_register_string(&hex, "r3", 0x1111_1111).unwrap();
        hex = patch_register_string(&hex, "pc", 0x2222_2222).unwrap();
        let regs = parse_register_string(&hex).unwrap();
        let get = |name: &str| regs.iter().find(|r| r.name == name).unwrap().hex_value.clone();
        assert_eq!(get("r3"), "0x11111111");
        assert_eq!(get("pc"), "0x22222222");
    }

    #[test]
    fn derived_cr_subfield_is_unsupported() {
        let hex = "00000000".repeat(32 + 6);
        assert!(matches!(
            patch_register_string(&hex, "cr0", 1),
            Err(Error::Unsupported)
        ));
    }
}
