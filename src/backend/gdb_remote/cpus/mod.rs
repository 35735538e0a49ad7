//! One module per CPU register family named in spec.md §4.7: x86, ARM-LE,
//! PowerPC, PowerPC-based Netscreen, MIPS (shared by the two Cisco tags).

pub mod arm;
pub mod mips;
pub mod netscreen;
pub mod powerpc;
pub mod x86;

use crate::model::RegisterValue;

pub(crate) fn reg(name: &'static str, value: u32) -> RegisterValue {
    RegisterValue {
        name,
        hex_value: format!("{:#x}", value),
        pointed_memory: None,
        is_pc: false,
        is_sp: false,
    }
}

pub(crate) fn reg_flagged(name: &'static str, value: u32, is_pc: bool, is_sp: bool) -> RegisterValue {
    RegisterValue {
        name,
        hex_value: format!("{:#x}", value),
        pointed_memory: None,
        is_pc,
        is_sp,
    }
}
