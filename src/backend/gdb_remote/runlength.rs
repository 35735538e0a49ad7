//! GDB remote-serial run-length decoding (spec.md §4.7, §9).
//!
//! `*` denotes repetition of the previous byte. The standard variant reads
//! one following byte and computes `repeat = byte - 29`; the Cisco variant
//! reads two following hex digits and parses them as the repeat count.
//! Neither variant subtracts one from the count: `original_source`'s
//! `GdbCpu::RunlengthDecode` explicitly keeps the repeat count inclusive of
//! the already-copied byte (the commented-out `repeat--;` is never
//! executed), and `Cisco3600.cpp`'s `MIPS::RunlengthDecode` override does
//! the same with its two-hex-digit count. A `*` at position 0, at the very
//! end, or with a zero count, is a decode error in both variants.

use crate::error::Error;

/// Which run-length convention a CPU's GDB server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunlengthVariant {
    /// One byte follows `*`; `repeat = byte - 29`.
    Standard,
    /// Two hex digits follow `*`; `repeat` is their parsed value.
    Cisco,
}

/// Decodes run-length-encoded `input` according to `variant`.
pub fn decode(input: &[u8], variant: RunlengthVariant) -> Result<Vec<u8>, Error> {
    let mut expanded = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        if input[i] == b'*' {
            if i == 0 {
                return Err(Error::MalformedPacket);
            }
            let to_repeat = input[i - 1];

            let (repeat, consumed) = match variant {
                RunlengthVariant::Standard => {
                    if i + 1 >= input.len() {
                        return Err(Error::MalformedPacket);
                    }
                    let count = (input[i + 1] as i32 - 29) as i64;
                    if count <= 0 {
                        return Err(Error::MalformedPacket);
                    }
                    (count as usize, 1)
                }
                RunlengthVariant::Cisco => {
                    if i + 2 >= input.len() {
                        return Err(Error::MalformedPacket);
                    }
                    let digits = std::str::from_utf8(&input[i + 1..i + 3])
                        .map_err(|_| Error::MalformedPacket)?;
                    let count = usize::from_str_radix(digits, 16)
                        .map_err(|_| Error::MalformedPacket)?;
                    if count == 0 {
                        return Err(Error::MalformedPacket);
                    }
                    (count, 2)
                }
            };

            for _ in 0..repeat {
                expanded.push(to_repeat);
            }
            i += 1 + consumed;
        } else {
            expanded.push(input[i]);
            i += 1;
        }
    }

    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_without_star_is_identity() {
        let input = b"deadbeef";
        assert_eq!(decode(input, RunlengthVariant::Standard).unwrap(), input);
        assert_eq!(decode(input, RunlengthVariant::Cisco).unwrap(), input);
    }

    #[test]
    fn standard_variant_expands_repeat_count() {
        // 'x' followed by '*' and a byte whose value - 29 = 8 repeats.
        let marker = (29u8 + 8) as char;
        let input = format!("x*{}", marker);
        let decoded = decode(input.as_bytes(), RunlengthVariant::Standard).unwrap();
        assert_eq!(decoded, vec![b'x'; 9], "one already-written plus 8 more, per the source's inclusive count");
    }

    #[test]
    fn cisco_variant_expands_two_hex_digit_count() {
        let input = b"y*08";
        let decoded = decode(input, RunlengthVariant::Cisco).unwrap();
        assert_eq!(decoded.len(), 1 + 8);
        assert!(decoded.iter().all(|&b| b == b'y'));
    }

    #[test]
    fn star_at_position_zero_is_an_error() {
        assert!(decode(b"*7", RunlengthVariant::Standard).is_err());
    }

    #[test]
    fn trailing_star_is_an_error() {
        assert!(decode(b"lalala*", RunlengthVariant::Standard).is_err());
    }

    #[test]
    fn zero_repeat_count_is_an_error() {
        let marker = 29u8 as char; // byte - 29 == 0
        let input = format!("x*{}", marker);
        assert!(decode(input.as_bytes(), RunlengthVariant::Standard).is_err());
    }
}
