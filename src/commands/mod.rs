//! CLI command implementations
//!
//! Every command opens its bus device, runs one operation and drops the
//! device again, which closes it. Read data goes to stdout as hex.

pub mod i2c;
mod list;
pub mod spi;

pub use list::list_buses;

/// Format bytes as space separated hex
pub(crate) fn format_bytes(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format words as space separated hex, zero padded to the word width
pub(crate) fn format_words(words: &[u32], bits_per_word: u8) -> String {
    let width = (bits_per_word as usize).div_ceil(4);
    words
        .iter()
        .map(|w| format!("{:0width$X}", w, width = width))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(&[0x66, 0x05, 0x8E]), "66 05 8E");
        assert_eq!(format_bytes(&[]), "");
    }

    #[test]
    fn test_format_words() {
        assert_eq!(format_words(&[0xABC, 0x1], 12), "ABC 001");
        assert_eq!(format_words(&[0x1], 9), "001");
        assert_eq!(format_words(&[0x5], 8), "05");
    }
}
