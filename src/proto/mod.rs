//! The fixed command/response/event vocabulary carried in a [`Packet`]'s
//! `command` field (spec.md §6, GLOSSARY).
//!
//! Grounded on `original_source/debug/client/commands.hpp`'s
//! `commandtype_t` enum: every command, success reply, error reply and
//! event code the original defines is represented here as one flat `u32`
//! newtype plus named constants, rather than re-deriving the C++ enum's
//! ad-hoc numbering scheme in Rust's `enum` (many of the numeric values are
//! not contiguous and several commands share a reply shape, which a strict
//! sum type would have to re-flatten anyway).

use crate::wire::Packet;

/// One command/response/event code. Kept as a transparent `u32` newtype
/// (not a closed `enum`) because unrecognized values must be represented
/// losslessly long enough to produce a `malformed_packet`/`unsupported`
/// reply correlated to the originating id, rather than panicking on an
/// unknown variant during decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Code(pub u32);

macro_rules! codes {
    ($( $name:ident = $value:expr ),+ $(,)?) => {
        $( pub const $name: Code = Code($value); )+
    };
}

codes! {
    CMD_CLEARALL = 0,
    CMD_SETBP = 1,
    CMD_SETBPE = 2,
    CMD_SETBPS = 3,
    CMD_REMBP = 4,
    CMD_REMBPE = 5,
    CMD_REMBPS = 6,
    CMD_READ_MEMORY = 7,
    CMD_REGISTERS = 8,
    CMD_RESUME = 9,
    CMD_DETACH = 10,
    RESP_OK = 12,
    RESP_ERR = 13,
    RESP_BP_HIT = 14,
    RESP_BPE_HIT = 15,
    RESP_BPS_HIT = 16,
    RESP_READ_MEMORY = 17,
    RESP_REGISTERS = 18,
    RESP_RESUMED = 19,
    RESP_PROCDEAD = 20,
    RESP_ATTACH_ERROR = 23,
    RESP_ATTACH_SUCCESS = 24,
    RESP_BP_SET_SUCC = 25,
    RESP_BP_SET_ERR = 26,
    RESP_RESUME_ERR = 27,
    RESP_BPE_SET_SUCC = 28,
    RESP_BPE_SET_ERR = 29,
    RESP_BP_REM_SUCC = 30,
    RESP_BP_REM_ERR = 31,
    RESP_DETACH_SUCC = 32,
    RESP_DETACH_ERR = 33,
    RESP_REGISTERS_ERR = 34,
    RESP_READ_MEMORY_ERR = 35,
    CMD_TERMINATE = 36,
    RESP_TERMINATE_SUCC = 37,
    RESP_TERMINATE_ERR = 38,
    RESP_BPE_REM_SUCC = 39,
    RESP_BPE_REM_ERR = 40,
    RESP_BPS_SET_SUCC = 41,
    RESP_BPS_SET_ERR = 42,
    RESP_BPS_REM_SUCC = 43,
    RESP_BPS_REM_ERR = 44,
    RESP_INFO = 45,
    CMD_SET_REGISTER = 46,
    RESP_SET_REGISTER_SUCC = 47,
    RESP_SET_REGISTER_ERR = 48,
    CMD_SINGLE_STEP = 49,
    RESP_SINGLE_STEP_SUCC = 50,
    RESP_SINGLE_STEP_ERR = 51,
    CMD_VALIDMEM = 52,
    RESP_VALIDMEM_SUCC = 53,
    RESP_VALIDMEM_ERR = 54,
    RESP_THREAD_CREATED = 55,
    RESP_THREAD_CLOSED = 56,
    CMD_SEARCH = 57,
    RESP_SEARCH_SUCC = 58,
    RESP_SEARCH_ERR = 59,
    CMD_MEMMAP = 60,
    RESP_MEMMAP_SUCC = 61,
    RESP_MEMMAP_ERR = 62,
    RESP_PROCESS_CLOSED = 63,
    RESP_EXCEPTION_OCCURED = 64,
    CMD_HALT = 65,
    RESP_HALTED_SUCC = 66,
    RESP_HALTED_ERR = 67,
    RESP_REQUEST_TARGET = 68,
    CMD_LIST_PROCESSES = 69,
    RESP_LIST_PROCESSES = 70,
    CMD_CANCEL_TARGET_SELECTION = 71,
    RESP_CANCEL_TARGET_SELECTION_SUCC = 72,
    CMD_SELECT_PROCESS = 73,
    RESP_SELECT_PROCESS_SUCC = 74,
    RESP_SELECT_PROCESS_ERR = 75,
    CMD_LIST_FILES = 76,
    CMD_LIST_FILES_PATH = 77,
    RESP_LIST_FILES_SUCC = 78,
    RESP_LIST_FILES_ERR = 79,
    CMD_SELECT_FILE = 80,
    RESP_SELECT_FILE_SUCC = 81,
    RESP_SELECT_FILE_ERR = 82,
    RESP_MODULE_LOADED = 83,
    RESP_MODULE_UNLOADED = 84,
    CMD_RESUME_THREAD = 85,
    RESP_RESUME_THREAD_SUCC = 86,
    RESP_RESUME_THREAD_ERR = 87,
    CMD_SUSPEND_THREAD = 88,
    RESP_SUSPEND_THREAD_SUCC = 89,
    RESP_SUSPEND_THREAD_ERR = 90,
    CMD_SET_ACTIVE_THREAD = 91,
    RESP_SET_ACTIVE_THREAD_SUCC = 92,
    RESP_SET_ACTIVE_THREAD_ERR = 93,
    CMD_SET_BREAKPOINT_CONDITION = 94,
    RESP_SET_BREAKPOINT_CONDITION_SUCC = 95,
    RESP_SET_BREAKPOINT_CONDITION_ERR = 96,
    CMD_WRITE_MEMORY = 97,
    RESP_WRITE_MEMORY_SUCC = 98,
    RESP_WRITE_MEMORY_ERR = 99,
    CMD_SET_EXCEPTIONS_OPTIONS = 100,
    RESP_SET_EXCEPTIONS_SUCC = 101,
    RESP_SET_EXCEPTIONS_ERR = 102,
    CMD_SET_DEBUGGER_EVENT_SETTINGS = 103,
    RESP_SET_DEBUGGER_EVENT_SETTINGS_SUCC = 104,
    RESP_SET_DEBUGGER_EVENT_SETTINGS_ERR = 105,
    RESP_QUERY_DEBUGGER_EVENT_SETTINGS = 106,
    RESP_PROCESS_START = 107,
    // Codes without a direct original-source counterpart, added to round
    // out the command set spec.md §6 names but `commands.hpp` never
    // assigned a number to (attach and authentication handshake).
    CMD_ATTACH = 200,
    RESP_AUTH = 201,
}

/// Builds a reply packet correlated to `id`.
pub fn reply(code: Code, id: u32, args: Vec<crate::wire::Arg>) -> Packet {
    Packet::new(code.0, id, args)
}

/// Builds an event packet (spec.md §3: "Unsolicited events reuse the
/// command slot with an event kind"). Event packets carry `id = 0` since
/// they do not correlate to any request.
pub fn event(code: Code, args: Vec<crate::wire::Arg>) -> Packet {
    Packet::new(code.0, 0, args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_original_source_numbering() {
        assert_eq!(CMD_SETBP.0, 1);
        assert_eq!(RESP_BP_HIT.0, 14);
        assert_eq!(RESP_PROCESS_START.0, 107);
    }

    #[test]
    fn event_packet_has_no_correlation_id() {
        let p = event(RESP_BP_HIT, vec![]);
        assert_eq!(p.id, 0);
        assert_eq!(p.command, RESP_BP_HIT.0);
    }
}
