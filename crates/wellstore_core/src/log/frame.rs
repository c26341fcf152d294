//! Frame encoding and decoding.

use super::entry::LogEntry;
use crate::error::{CoreError, CoreResult};
use crate::types::SequenceNumber;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Magic bytes opening every frame.
pub const LOG_MAGIC: [u8; 4] = *b"WSLG";

/// Current frame format version.
pub const LOG_VERSION: u16 = 1;

/// magic (4) + version (2) + length (4)
const HEADER_SIZE: usize = 10;

/// SHA-256 digest size.
const DIGEST_SIZE: usize = 32;

/// Bytes a frame adds around its payload.
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + DIGEST_SIZE;

/// A decoded commit frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Frame {
    /// Commit sequence number.
    pub sequence: SequenceNumber,
    /// Changes in commit order.
    pub entries: Vec<LogEntry>,
    /// Byte offset of the frame in the log.
    #[serde(skip)]
    pub offset: u64,
}

#[derive(Serialize)]
struct FrameRef<'a> {
    sequence: SequenceNumber,
    entries: &'a [LogEntry],
}

/// Encodes one frame.
///
/// # Errors
///
/// Returns a codec error if the payload cannot be serialized or exceeds
/// the 4 GiB length field.
pub fn encode_frame(sequence: SequenceNumber, entries: &[LogEntry]) -> CoreResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(&FrameRef { sequence, entries }, &mut payload)
        .map_err(|e| CoreError::codec(e.to_string()))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| CoreError::codec("frame payload too large"))?;

    let mut data = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    data.extend_from_slice(&LOG_MAGIC);
    data.extend_from_slice(&LOG_VERSION.to_le_bytes());
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(&payload);
    let digest = Sha256::digest(&data);
    data.extend_from_slice(&digest);
    Ok(data)
}

/// Result of scanning a log image.
#[derive(Debug, Default)]
pub struct LogScan {
    /// Complete frames in log order.
    pub frames: Vec<Frame>,
    /// Length of the valid prefix.
    pub valid_len: u64,
    /// Bytes after the valid prefix belonging to an interrupted write.
    pub torn_bytes: u64,
}

/// Decodes every complete frame in `data`.
///
/// # Errors
///
/// Returns `Corruption` for damage that is not a torn final frame.
pub fn decode_frames(data: &[u8]) -> CoreResult<LogScan> {
    let mut scan = LogScan::default();
    let mut offset = 0usize;

    while offset < data.len() {
        let rest = &data[offset..];
        if rest.len() < HEADER_SIZE {
            break;
        }
        if rest[..4] != LOG_MAGIC {
            return Err(CoreError::corruption(offset as u64, "bad frame magic"));
        }
        let version = u16::from_le_bytes([rest[4], rest[5]]);
        if version != LOG_VERSION {
            return Err(CoreError::corruption(
                offset as u64,
                format!("unsupported frame version {version}"),
            ));
        }
        let len = u32::from_le_bytes([rest[6], rest[7], rest[8], rest[9]]) as usize;
        let end = HEADER_SIZE + len + DIGEST_SIZE;
        if rest.len() < end {
            break;
        }

        let body = &rest[..HEADER_SIZE + len];
        let stored = &rest[HEADER_SIZE + len..end];
        if Sha256::digest(body).as_slice() != stored {
            if rest.len() == end {
                break;
            }
            return Err(CoreError::corruption(offset as u64, "frame digest mismatch"));
        }

        let mut frame: Frame = ciborium::from_reader(&body[HEADER_SIZE..])
            .map_err(|e| CoreError::corruption(offset as u64, format!("undecodable frame: {e}")))?;
        frame.offset = offset as u64;
        scan.frames.push(frame);
        offset += end;
    }

    scan.valid_len = offset as u64;
    scan.torn_bytes = (data.len() - offset) as u64;
    Ok(scan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn put(id: &str) -> LogEntry {
        LogEntry::Put {
            collection: "moodEntries".into(),
            record: json!({"id": id, "score": 4, "note": "calm"}),
        }
    }

    fn two_frames() -> (Vec<u8>, usize) {
        let mut data = encode_frame(SequenceNumber::new(1), &[put("a")]).unwrap();
        let first = data.len();
        data.extend(encode_frame(SequenceNumber::new(2), &[put("b"), put("c")]).unwrap());
        (data, first)
    }

    #[test]
    fn decodes_complete_frames() {
        let (data, first) = two_frames();
        let scan = decode_frames(&data).unwrap();

        assert_eq!(scan.frames.len(), 2);
        assert_eq!(scan.frames[1].sequence, SequenceNumber::new(2));
        assert_eq!(scan.frames[1].entries, vec![put("b"), put("c")]);
        assert_eq!(scan.frames[1].offset, first as u64);
        assert_eq!(scan.valid_len, data.len() as u64);
        assert_eq!(scan.torn_bytes, 0);
    }

    #[test]
    fn short_tail_is_torn() {
        let (mut data, _) = two_frames();
        let full = data.len();
        data.extend_from_slice(&LOG_MAGIC[..3]);

        let scan = decode_frames(&data).unwrap();
        assert_eq!(scan.frames.len(), 2);
        assert_eq!(scan.valid_len, full as u64);
        assert_eq!(scan.torn_bytes, 3);
    }

    #[test]
    fn truncated_final_frame_is_torn() {
        let (data, first) = two_frames();
        let cut = &data[..data.len() - 5];

        let scan = decode_frames(cut).unwrap();
        assert_eq!(scan.frames.len(), 1);
        assert_eq!(scan.valid_len, first as u64);
    }

    #[test]
    fn bad_digest_on_final_frame_is_torn() {
        let (mut data, first) = two_frames();
        let last = data.len() - 1;
        data[last] ^= 0xFF;

        let scan = decode_frames(&data).unwrap();
        assert_eq!(scan.frames.len(), 1);
        assert_eq!(scan.valid_len, first as u64);
    }

    #[test]
    fn bad_digest_mid_log_is_corruption() {
        let (mut data, first) = two_frames();
        data[first - 1] ^= 0xFF;

        let err = decode_frames(&data).unwrap_err();
        assert!(matches!(err, CoreError::Corruption { offset: 0, .. }));
    }

    #[test]
    fn bad_magic_is_corruption() {
        let (mut data, first) = two_frames();
        data[first] = b'X';

        let err = decode_frames(&data).unwrap_err();
        assert!(matches!(err, CoreError::Corruption { .. }));
    }
}
