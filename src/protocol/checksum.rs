//! # PMTK Checksum
//!
//! NMEA-style checksum used by the PMTK GPS sub-protocol.
//!
//! **Algorithm**: XOR of every byte of the sentence body
//! **Terminator**: `*` (bytes after it are not covered)
//! **Forbidden**: `$` and `!` (sentence start markers, never part of a body)

/// Sentence body terminator
const CHECKSUM_TERMINATOR: u8 = b'*';

/// Calculate the PMTK checksum of a sentence body
///
/// # Arguments
///
/// * `body` - Sentence body without the leading `$`, e.g. `"PMTK184,1"`
///
/// # Returns
///
/// * `Option<u8>` - XOR checksum, or `None` if a `$` or `!` appears before
///   the terminator. A frame must not be sent in that case.
///
/// # Examples
///
/// ```
/// use bfv_link::protocol::checksum::pmtk_checksum;
///
/// assert_eq!(pmtk_checksum("PMTK183"), Some(0x38));
/// assert_eq!(pmtk_checksum("$PMTK183"), None);
/// ```
pub fn pmtk_checksum(body: &str) -> Option<u8> {
    let mut checksum: u8 = 0;

    for &byte in body.as_bytes() {
        match byte {
            b'$' | b'!' => return None,
            CHECKSUM_TERMINATOR => break,
            _ => checksum ^= byte,
        }
    }

    Some(checksum)
}

/// Format a checksum the way the instrument expects it
///
/// Uppercase hex without zero padding (`0x0A` -> `"A"`).
pub fn format_checksum(checksum: u8) -> String {
    format!("{:X}", checksum)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xor_all(s: &str) -> u8 {
        s.bytes().fold(0, |acc, b| acc ^ b)
    }

    #[test]
    fn test_checksum_empty() {
        assert_eq!(pmtk_checksum(""), Some(0x00));
    }

    #[test]
    fn test_checksum_known_codes() {
        // Values published alongside the MTK LOCUS command set
        assert_eq!(pmtk_checksum("PMTK183"), Some(0x38));
        assert_eq!(pmtk_checksum("PMTK184,1"), Some(0x22));
        assert_eq!(pmtk_checksum("PMTK622,0"), Some(0x28));
    }

    #[test]
    fn test_checksum_matches_xor_definition() {
        for code in ["PMTK183", "PMTK184,1", "PMTK622,0", "PMTK314,0,1,0,1"] {
            assert_eq!(pmtk_checksum(code), Some(xor_all(code)), "code {}", code);
        }
    }

    #[test]
    fn test_checksum_stops_at_terminator() {
        assert_eq!(pmtk_checksum("PMTK183*38"), pmtk_checksum("PMTK183"));
    }

    #[test]
    fn test_checksum_rejects_sentence_markers() {
        assert_eq!(pmtk_checksum("$PMTK183"), None);
        assert_eq!(pmtk_checksum("PMTK!183"), None);
        // Markers after the terminator are not inspected
        assert_eq!(pmtk_checksum("PMTK183*$"), pmtk_checksum("PMTK183"));
    }

    #[test]
    fn test_format_checksum_no_padding() {
        assert_eq!(format_checksum(0x0A), "A");
        assert_eq!(format_checksum(0x38), "38");
        assert_eq!(format_checksum(0xFF), "FF");
        assert_eq!(format_checksum(0x00), "0");
    }
}
