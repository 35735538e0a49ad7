//! Netscreen 5XT (PowerPC-based VPN firewall) register layout.
//!
//! Grounded on `original_source/debug/client/gdb/cpus/NS5XT.cpp`: the same
//! 32 GPRs as plain PowerPC (`powerpc::parse_gprs`), followed by 32
//! double-precision FPRs (`f0..f31`, 16 hex chars each), then the
//! `pc, msr, cr, lr, ctr, xer` scalar block (`powerpc::parse_scalars`) and
//! finally the `fpscr` flag decomposition this target additionally exposes.

use crate::error::Error;
use crate::model::{RegisterDescriptor, RegisterValue};

use super::powerpc::{self, GPR_HEX_LEN};
use super::reg;

const FPR_COUNT: usize = 32;
const FPR_HEX_LEN: usize = FPR_COUNT * 16;
/// Offset, in hex chars, of the `pc, msr, cr, lr, ctr, xer` scalar block.
const SCALAR_OFFSET: usize = GPR_HEX_LEN + FPR_HEX_LEN;
/// Offset of the `fpscr` word within the scalar block (the 7th word).
const FPSCR_OFFSET: usize = SCALAR_OFFSET + 6 * 8;

pub const REGISTERS: &[RegisterDescriptor] = &[
    RegisterDescriptor { name: "r0", byte_size: 4, editable: true },
    RegisterDescriptor { name: "sp", byte_size: 4, editable: true },
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
    RegisterDescriptor { name: "f0", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f1", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f2", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f3", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f4", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f5", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f6", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f7", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f8", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f9", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f10", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f11", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f12", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f13", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f14", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f15", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f16", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f17", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f18", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f19", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f20", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f21", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f22", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f23", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f24", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f25", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f26", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f27", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f28", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f29", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f30", byte_size: 8, editable: false },
    RegisterDescriptor { name: "f31", byte_size: 8, editable: false },
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
    RegisterDescriptor { name: "fpscr", byte_size: 4, editable: true },
    RegisterDescriptor { name: "fpscr_FX", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_FEX", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_VX", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_QX", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_UX", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_ZX", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_XX", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_VXNAN", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_VXISI", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_VXIDI", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_VXZDZ", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_VXIMZ", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_VXVC", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_FR", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_FI", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_FPRF", byte_size: 1, editable: false },
    RegisterDescriptor { name: "fpscr_VXSOFT", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_VXSQRT", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_VXCVI", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_VE", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_OE", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_UE", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_ZE", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_XE", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_NI", byte_size: 0, editable: false },
    RegisterDescriptor { name: "fpscr_RN", byte_size: 1, editable: false },
];

fn fpscr_bit(name: &'static str, fpscr: u32, bit: u32) -> RegisterValue {
    reg(name, (fpscr >> bit) & 1)
}

pub fn parse_register_string(hex: &str) -> Result<Vec<RegisterValue>, Error> {
    if hex.len() < FPSCR_OFFSET + 8 {
        return Err(Error::UnexpectedReply(format!(
            "Netscreen register string too short: {} chars",
            hex.len()
        )));
    }

    let mut out = powerpc::parse_gprs(hex)?;
    // Netscreen uses `sp` as the name of GPR 1 (also marked the stack
    // pointer there); the shared helper already names it "r1" with
    // `is_sp = true`, so rename it to match the source's own naming.
    if let Some(r1) = out.get_mut(1) {
        r1.name = "sp";
    }

    for i in 0..FPR_COUNT {
        let off = GPR_HEX_LEN + i * 16;
        let raw = &hex[off..off + 16];
        out.push(RegisterValue {
            name: fpr_name(i),
            hex_value: format!("0x{}", raw),
            pointed_memory: None,
            is_pc: false,
            is_sp: false,
        });
    }

    out.extend(powerpc::parse_scalars(hex, SCALAR_OFFSET)?);

    let fpscr = u32::from_str_radix(&hex[FPSCR_OFFSET..FPSCR_OFFSET + 8], 16).unwrap_or(0);
    out.push(reg("fpscr", fpscr));
    out.push(fpscr_bit("fpscr_FX", fpscr, 0));
    out.push(fpscr_bit("fpscr_FEX", fpscr, 1));
    out.push(fpscr_bit("fpscr_VX", fpscr, 2));
    out.push(fpscr_bit("fpscr_QX", fpscr, 3));
    out.push(fpscr_bit("fpscr_UX", fpscr, 4));
    out.push(fpscr_bit("fpscr_ZX", fpscr, 5));
    out.push(fpscr_bit("fpscr_XX", fpscr, 6));
    out.push(fpscr_bit("fpscr_VXNAN", fpscr, 7));
    out.push(fpscr_bit("fpscr_VXISI", fpscr, 8));
    out.push(fpscr_bit("fpscr_VXIDI", fpscr, 9));
    out.push(fpscr_bit("fpscr_VXZDZ", fpscr, 10));
    out.push(fpscr_bit("fpscr_VXIMZ", fpscr, 11));
    out.push(fpscr_bit("fpscr_VXVC", fpscr, 12));
    out.push(fpscr_bit("fpscr_FR", fpscr, 13));
    out.push(fpscr_bit("fpscr_FI", fpscr, 14));
    out.push(reg("fpscr_FPRF", (fpscr >> 15) & 0x1F));
    out.push(fpscr_bit("fpscr_VXSOFT", fpscr, 21));
    out.push(fpscr_bit("fpscr_VXSQRT", fpscr, 22));
    out.push(fpscr_bit("fpscr_VXCVI", fpscr, 23));
    out.push(fpscr_bit("fpscr_VE", fpscr, 24));
    out.push(fpscr_bit("fpscr_OE", fpscr, 25));
    out.push(fpscr_bit("fpscr_UE", fpscr, 26));
    out.push(fpscr_bit("fpscr_ZE", fpscr, 27));
    out.push(fpscr_bit("fpscr_XE", fpscr, 28));
    out.push(fpscr_bit("fpscr_NI", fpscr, 29));
    out.push(reg("fpscr_RN", (fpscr >> 30) & 0x3));

    Ok(out)
}

/// Patches a directly-addressable register. Like `powerpc::patch_register_string`,
/// the FPRs and the `fpscr` bit-field decomposition are not re-encoded back
/// into the wire string here; only the GPRs and the `pc, msr, cr, lr, ctr,
/// xer, fpscr` scalars are.
pub fn patch_register_string(hex: &str, name: &str, value: u32) -> Result<String, Error> {
    if hex.len() < FPSCR_OFFSET + 8 {
        return Err(Error::UnexpectedReply(format!(
            "Netscreen register string too short: {} chars",
            hex.len()
        )));
    }
    if name == "sp" {
        return Ok(powerpc::patch_word_at(hex, 1, value));
    }
    if name != "r1" {
        if let Some(idx) = (0..32).find(|&i| gpr_name_at(i) == name) {
            return Ok(powerpc::patch_word_at(hex, idx, value));
        }
    }
    let scalar_word = SCALAR_OFFSET / 8;
    let idx = match name {
        "pc" => scalar_word,
        "msr" => scalar_word + 1,
        "cr" => scalar_word + 2,
        "lr" => scalar_word + 3,
        "ctr" => scalar_word + 4,
        "xer" => scalar_word + 5,
        "fpscr" => FPSCR_OFFSET / 8,
        _ => return Err(Error::Unsupported),
    };
    Ok(powerpc::patch_word_at(hex, idx, value))
}

fn gpr_name_at(i: usize) -> &'static str {
    const NAMES: [&str; 32] = [
        "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12", "r13",
        "r14", "r15", "r16", "r17", "r18", "r19", "r20", "r21", "r22", "r23", "r24", "r25", "r26",
        "r27", "r28", "r29", "r30", "r31",
    ];
    NAMES[i]
}

fn fpr_name(i: usize) -> &'static str {
    const NAMES: [&str; 32] = [
        "f0", "f1", "f2", "f3", "f4", "f5", "f6", "f7", "f8", "f9", "f10", "f11", "f12", "f13",
        "f14", "f15", "f16", "f17", "f18", "f19", "f20", "f21", "f22", "f23", "f24", "f25", "f26",
        "f27", "f28", "f29", "f30", "f31",
    ];
    NAMES[i]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_register_string() -> String {
        let mut hex = String::new();
        for _ in 0..32 {
            hex += "00000000"; // GPRs
        }
        for _ in 0..32 {
            hex += "0000000000000000"; // FPRs
        }
        hex += "deadbeef"; // pc
        hex += "00000000"; // msr
        hex += "00000000"; // cr
        hex += "00000000"; // lr
        hex += "00000000"; // ctr
        hex += "00000003"; // xer: so + ov set
        hex += "c0000000"; // fpscr: FX + FEX set
        hex
    }

    #[test]
    fn parses_pc_after_gprs_and_fprs() {
        let regs = parse_register_string(&synthetic_register_string()).unwrap();
        let pc = regs.iter().find(|r| r.name == "pc").unwrap();
        assert_eq!(pc.hex_value, "0xdeadbeef");
    }

    #[test]
    fn gpr_one_is_named_sp() {
        let regs = parse_register_string(&synthetic_register_string()).unwrap();
        assert!(regs.iter().any(|r| r.name == "sp"));
        assert!(!regs.iter().any(|r| r.name == "r1"));
    }

    #[test]
    fn fpscr_flags_decode() {
        let regs = parse_register_string(&synthetic_register_string()).unwrap();
        let get = |name: &str| regs.iter().find(|r| r.name == name).unwrap().hex_value.clone();
        assert_eq!(get("fpscr_FX"), "0x1");
        assert_eq!(get("fpscr_FEX"), "0x1");
        assert_eq!(get("fpscr_VX"), "0x0");
    }

    #[test]
    fn too_short_string_is_an_error() {
        assert!(parse_register_string("1234").is_err());
    }

    #[test]
    fn descriptor_count_matches_parsed_register_count() {
        let regs = parse_register_string(&synthetic_register_string()).unwrap();
        assert_eq!(REGISTERS.len(), regs.len());
    }

    #[test]
    fn patches_sp_and_pc() {
        let mut hex = synthetic_register_string();
        hex = patch_register_string(&hex, "sp", 0x1000).unwrap();
        hex = patch_register_string(&hex, "pc", 0x2000).unwrap();
        let regs = parse_register_string(&hex).unwrap();
        let get = |name: &str| regs.iter().find(|r| r.name == name).unwrap().hex_value.clone();
        assert_eq!(get("sp"), "0x1000");
        assert_eq!(get("pc"), "0x2000");
    }

    #[test]
    fn fpr_is_unsupported_for_writes() {
        let hex = synthetic_register_string();
        assert!(matches!(
            patch_register_string(&hex, "f0", 0),
            Err(Error::Unsupported)
        ));
    }
}
