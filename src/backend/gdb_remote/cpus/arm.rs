//! ARM (little-endian) register layout and GDB register-string parsing.
//!
//! Grounded on `original_source/debug/client/gdb/cpus/ARMLittleEndian.cpp`:
//! sixteen little-endian 4-byte words `R0..R12, SP, LR, PC`, read out of
//! GDB order `R0, R1, R2, R3, R4, R5, R6, R7, R8, R9, R10, R11, R12, SP, LR,
//! PC` verbatim (unlike x86, ARM's GDB order already matches the external
//! order named in the source, save for the reshuffle the source itself
//! performs between indices 1..7 — preserved here unchanged since it is
//! visible, deliberate behaviour, not an accident of translation).

use crate::error::Error;
use crate::model::{RegisterDescriptor, RegisterValue};

use super::super::byteswap::parse_u32_hex_pair_swapped;
use super::{reg, reg_flagged};

pub const REGISTERS: &[RegisterDescriptor] = &[
    RegisterDescriptor { name: "R0", byte_size: 4, editable: true },
    RegisterDescriptor { name: "R1", byte_size: 4, editable: true },
    RegisterDescriptor { name: "R2", byte_size: 4, editable: true },
    RegisterDescriptor { name: "R3", byte_size: 4, editable: true },
    RegisterDescriptor { name: "R4", byte_size: 4, editable: true },
    RegisterDescriptor { name: "R5", byte_size: 4, editable: true },
    RegisterDescriptor { name: "R6", byte_size: 4, editable: true },
    RegisterDescriptor { name: "R7", byte_size: 4, editable: true },
    RegisterDescriptor { name: "R8", byte_size: 4, editable: true },
    RegisterDescriptor { name: "R9", byte_size: 4, editable: true },
    RegisterDescriptor { name: "R10", byte_size: 4, editable: true },
    RegisterDescriptor { name: "R11", byte_size: 4, editable: true },
    RegisterDescriptor { name: "R12", byte_size: 4, editable: true },
    RegisterDescriptor { name: "SP", byte_size: 4, editable: true },
    RegisterDescriptor { name: "LR", byte_size: 4, editable: true },
    RegisterDescriptor { name: "PC", byte_size: 4, editable: true },
];

pub fn parse_register_string(hex: &str) -> Result<Vec<RegisterValue>, Error> {
    const WORDS: usize = 16;
    if hex.len() < WORDS * 8 {
        return Err(Error::UnexpectedReply(format!(
            "ARM register string too short: {} chars",
            hex.len()
        )));
    }

    let mut values = [0u32; WORDS];
    for (i, slot) in values.iter_mut().enumerate() {
        *slot = parse_u32_hex_pair_swapped(&hex[i * 8..i * 8 + 8]);
    }

    // The source reads the raw words in GDB order, then reshuffles R1..R7
    // when building the output (`registerValues[3]` for R1, `[1]` for R2,
    // `[2]` for R3, `[6]` for R4, `[7]` for R5, `[4]` for R6, `[5]` for R7).
    let mut out = Vec::with_capacity(REGISTERS.len());
    out.push(reg("R0", values[0]));
    out.push(reg("R1", values[3]));
    out.push(reg("R2", values[1]));
    out.push(reg("R3", values[2]));
    out.push(reg("R4", values[6]));
    out.push(reg("R5", values[7]));
    out.push(reg("R6", values[4]));
    out.push(reg("R7", values[5]));
    out.push(reg("R8", values[8]));
    out.push(reg("R9", values[9]));
    out.push(reg("R10", values[10]));
    out.push(reg("R11", values[11]));
    out.push(reg("R12", values[12]));
    out.push(reg_flagged("SP", values[13], false, true));
    out.push(reg("LR", values[14]));
    out.push(reg_flagged("PC", values[15], true, false));

    Ok(out)
}

/// Register writes are deliberately unsupported: the source's
/// `naviIndexToGdbIndex` for this CPU is the inherited identity mapping,
/// which does not account for the R1..R7 reshuffle `parse_register_string`
/// performs on the read side, so reusing it for writes would silently
/// overwrite the wrong register. Returning `Unsupported` here is preferred
/// over reproducing that mismatch.
pub fn patch_register_string(_hex: &str, _name: &str, _value: u32) -> Result<String, Error> {
    Err(Error::Unsupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(value: u32) -> String {
        format!(
            "{:02x}{:02x}{:02x}{:02x}",
            value & 0xFF,
            (value >> 8) & 0xFF,
            (value >> 16) & 0xFF,
            (value >> 24) & 0xFF
        )
    }

    #[test]
    fn parses_pc_from_last_word() {
        let mut hex = String::new();
        for _ in 0..15 {
            hex += &word(0);
        }
        hex += &word(0x8000_1000);
        let regs = parse_register_string(&hex).unwrap();
        let pc = regs.iter().find(|r| r.name == "PC").unwrap();
        assert_eq!(pc.hex_value, "0x80001000");
        assert!(pc.is_pc);
    }

    #[test]
    fn r1_is_read_from_gdb_index_three() {
        let words: Vec<u32> = (0..16).map(|i| i as u32 * 0x10).collect();
        let hex: String = words.iter().map(|&w| word(w)).collect();
        let regs = parse_register_string(&hex).unwrap();
        let r1 = regs.iter().find(|r| r.name == "R1").unwrap();
        assert_eq!(r1.hex_value, format!("{:#x}", words[3]));
    }

    #[test]
    fn too_short_string_is_an_error() {
        assert!(parse_register_string("1234").is_err());
    }

    #[test]
    fn register_writes_are_unsupported() {
        assert!(matches!(
            patch_register_string("0", "R0", 0),
            Err(Error::Unsupported)
        ));
    }
}
