//! ADB payload checksum: the wrapping sum of all payload bytes.
//!
//! The protocol predates CRC use in this family; every message header carries
//! the plain byte sum of its payload.

pub fn calculate(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32))
}

pub fn verify(data: &[u8], expected: u32) -> bool {
    calculate(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_checksum() {
        assert_eq!(calculate(&[]), 0);
    }

    #[test]
    fn test_simple_checksum() {
        let data = b"hello world";
        let expected: u32 = data.iter().map(|&b| b as u32).sum();
        assert_eq!(calculate(data), expected);
        assert!(verify(data, expected));
    }

    #[test]
    fn test_verify_mismatch() {
        assert!(!verify(b"hello world", 0x12345678));
    }

    #[test]
    fn test_checksum_wraps() {
        // 4 GiB of 0xff would overflow a u32 sum; the checksum wraps instead
        // of panicking. Exercise wrapping with a crafted accumulator run.
        let data = vec![0xffu8; 0x0101_0102];
        let sum = calculate(&data);
        assert_eq!(sum, (0x0101_0102u64 * 0xff) as u32);
    }
}
