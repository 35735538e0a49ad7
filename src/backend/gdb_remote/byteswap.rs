//! Byte-swap helper shared by every little-endian CPU register parser
//! (spec.md §10, grounded on `GdbCpu.cpp::flipBytesInString`).

/// Reverses the order of hex-digit *pairs* in `hex`, e.g. `"78563412"` ->
/// `"12345678"`. Used to convert a GDB register string (always sent as raw
/// target-byte-order hex) into the big-endian hex a `u32::from_str_radix`
/// parse expects, for little-endian targets.
pub fn flip_hex_pairs(hex: &str) -> String {
    assert!(hex.len() % 2 == 0, "hex string must have an even length");
    hex.as_bytes()
        .chunks(2)
        .rev()
        .map(|pair| std::str::from_utf8(pair).unwrap())
        .collect()
}

pub fn parse_u32_hex_pair_swapped(hex: &str) -> u32 {
    u32::from_str_radix(&flip_hex_pairs(hex), 16).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flips_byte_pairs_not_individual_nibbles() {
        assert_eq!(flip_hex_pairs("78563412"), "12345678");
    }

    #[test]
    fn parses_little_endian_hex_word() {
        assert_eq!(parse_u32_hex_pair_swapped("78563412"), 0x1234_5678);
    }
}
