//! Reply classification for the GDB remote-serial protocol (spec.md §4.7).
//!
//! Grounded on `original_source/debug/client/gdb/cpus/GdbCpu.cpp`'s
//! `isOkMessage`/`isUnsupportedMessage`/`isBreakpointMessage`/
//! `isDataMessage` family, generalized into one classifier over an
//! already-unwrapped packet body (the `$`/`#checksum` framing is stripped
//! by the caller before classification).

/// The classified shape of one GDB-remote reply body (spec.md §4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GdbReply {
    /// `OK`
    Ok,
    /// An empty body: the command is not implemented by this stub.
    Unsupported,
    /// `E..`
    Error(u8),
    /// `T..` or `S..` — asynchronous stop notification.
    StopReply(Vec<u8>),
    /// `W..` — the process exited normally, with the two-digit exit code.
    ProcessExited(u8),
    /// `X..` — the process was terminated by a signal.
    ProcessTerminated(u8),
    /// Lower-hex payload: a data reply (register or memory contents).
    Data(Vec<u8>),
}

pub fn classify(body: &[u8]) -> GdbReply {
    if body.is_empty() {
        return GdbReply::Unsupported;
    }
    if body == b"OK" {
        return GdbReply::Ok;
    }
    if body[0] == b'T' || body[0] == b'S' {
        return GdbReply::StopReply(body.to_vec());
    }
    if body.len() >= 3 && (body[0] == b'E' || body[0] == b'W' || body[0] == b'X') {
        if let Ok(code) = u8::from_str_radix(&String::from_utf8_lossy(&body[1..3]), 16) {
            return match body[0] {
                b'E' => GdbReply::Error(code),
                b'W' => GdbReply::ProcessExited(code),
                _ => GdbReply::ProcessTerminated(code),
            };
        }
    }
    if is_lower_hex(body) {
        return GdbReply::Data(body.to_vec());
    }
    // Anything else is still treated as data; the caller decides whether
    // that is acceptable for the command in flight.
    GdbReply::Data(body.to_vec())
}

fn is_lower_hex(body: &[u8]) -> bool {
    !body.is_empty() && body.iter().all(|&b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

/// Extracts the `thread:<tid-hex>;` field from a stop-reply body, if
/// present (spec.md §4.7's stop-reply parsing).
pub fn stop_reply_thread(body: &[u8]) -> Option<u32> {
    let text = String::from_utf8_lossy(body);
    for field in text.split(';') {
        if let Some(hex) = field.strip_prefix("thread:") {
            return u32::from_str_radix(hex, 16).ok();
        }
    }
    None
}

/// Extracts the two-digit signal number from a `T`/`S` stop-reply.
pub fn stop_reply_signal(body: &[u8]) -> Option<u8> {
    if body.len() < 3 {
        return None;
    }
    u8::from_str_radix(&String::from_utf8_lossy(&body[1..3]), 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_ok() {
        assert_eq!(classify(b"OK"), GdbReply::Ok);
    }

    #[test]
    fn classifies_unsupported_as_empty_body() {
        assert_eq!(classify(b""), GdbReply::Unsupported);
    }

    #[test]
    fn classifies_error() {
        assert_eq!(classify(b"E01"), GdbReply::Error(0x01));
    }

    #[test]
    fn classifies_stop_reply() {
        assert!(matches!(classify(b"T0505:00000000;"), GdbReply::StopReply(_)));
        assert!(matches!(classify(b"S05"), GdbReply::StopReply(_)));
    }

    #[test]
    fn classifies_process_exit_and_termination() {
        assert_eq!(classify(b"W00"), GdbReply::ProcessExited(0));
        assert_eq!(classify(b"X09"), GdbReply::ProcessTerminated(0x09));
    }

    #[test]
    fn classifies_hex_data() {
        assert!(matches!(classify(b"deadbeef"), GdbReply::Data(_)));
    }

    #[test]
    fn extracts_thread_field() {
        assert_eq!(stop_reply_thread(b"T0505:00000000;thread:03;"), Some(3));
        assert_eq!(stop_reply_thread(b"T05"), None);
    }

    #[test]
    fn extracts_signal() {
        assert_eq!(stop_reply_signal(b"T05thread:01;"), Some(0x05));
    }
}
