//! Packing of word positions into the fixed-size metadata slot of an index
//! entry.

use tracing::warn;

/// The single metadata key carried by fulltext index entries: the positions
/// at which the word occurs in the record text, as comma-joined decimals.
pub const OCCURS_KEY: &str = "_occurs_";

/// Size of one metadata slot in the record index on-disk layout.
const OCCURS_SLOT_BYTES: usize = 255;

/// Encodes word positions for storage, clamped to the slot size at a comma
/// boundary. Truncation loses the tail positions; phrase matches relying on
/// them silently miss.
pub fn encode_occurs(indexes: &[u32], word: &str, path: &str) -> String {
    let mut encoded =
        indexes.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
    if encoded.len() > OCCURS_SLOT_BYTES {
        let boundary = encoded[..=OCCURS_SLOT_BYTES].rfind(',').unwrap_or(0);
        encoded.truncate(boundary);
        warn!(
            "occurrences of `{}` in \"{}\" do not fit the metadata slot, storing the first {} only",
            word,
            path,
            encoded.split(',').count(),
        );
    }
    encoded
}

/// Decodes stored positions back into an ordered list. An empty string
/// decodes to an empty list.
pub fn decode_occurs(encoded: &str) -> Vec<u32> {
    encoded.split(',').filter_map(|part| part.parse().ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_lists_round_trip() {
        let positions = vec![0, 3, 7, 120];
        let encoded = encode_occurs(&positions, "fox", "songs/r1");
        assert_eq!(encoded, "0,3,7,120");
        assert_eq!(decode_occurs(&encoded), positions);
    }

    #[test]
    fn empty_list() {
        assert_eq!(encode_occurs(&[], "fox", "songs/r1"), "");
        assert_eq!(decode_occurs(""), Vec::<u32>::new());
    }

    #[test]
    fn oversized_lists_truncate_at_a_comma_boundary() {
        let positions: Vec<u32> = (1000..1200).collect();
        let encoded = encode_occurs(&positions, "fox", "songs/r1");

        assert!(encoded.len() <= 255);
        assert!(!encoded.ends_with(','));

        // the decoded positions are a strict prefix of the original list
        let decoded = decode_occurs(&encoded);
        assert!(!decoded.is_empty());
        assert!(decoded.len() < positions.len());
        assert_eq!(decoded[..], positions[..decoded.len()]);
    }

    #[test]
    fn fitting_lists_are_not_truncated() {
        let positions: Vec<u32> = (0..100).collect();
        let encoded = encode_occurs(&positions, "fox", "songs/r1");
        assert_eq!(decode_occurs(&encoded), positions);
    }
}
