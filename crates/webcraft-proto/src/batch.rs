//! Packet batch framing.
//!
//! A batch is a JSON array of packet envelopes. On stream transports each
//! batch is terminated by a single `\n`.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::codec::Packet;
use crate::error::ProtoError;

/// Encode packets into one newline-terminated batch.
pub fn encode_batch(packets: &[Packet]) -> Result<Bytes, ProtoError> {
    let json = serde_json::to_vec(packets)?;
    let mut buf = BytesMut::with_capacity(json.len() + 1);
    buf.put_slice(&json);
    buf.put_u8(b'\n');
    Ok(buf.freeze())
}

/// Decode one batch line. Trailing whitespace and the newline are ignored.
pub fn decode_batch(data: &[u8]) -> Result<Vec<Packet>, ProtoError> {
    let trimmed = data.trim_ascii();
    if trimmed.is_empty() {
        return Err(ProtoError::EmptyBatch);
    }
    let packets: Vec<Packet> = serde_json::from_slice(trimmed)?;
    trace!("Decoded batch of {} packets", packets.len());
    Ok(packets)
}

/// Split a batch into block-set packets and everything else, keeping the
/// relative order inside each half.
pub fn partition_block_sets(packets: Vec<Packet>) -> (Vec<Packet>, Vec<Packet>) {
    packets
        .into_iter()
        .partition(|p| p.name == crate::packets::id::BLOCK_SET)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::id;

    #[test]
    fn batch_roundtrip() {
        let packets = vec![
            Packet::raw(id::PING, serde_json::Value::Null),
            Packet::raw(id::ERROR, serde_json::json!({"message": "x"})),
        ];
        let encoded = encode_batch(&packets).unwrap();
        assert_eq!(encoded.last(), Some(&b'\n'));
        let decoded = decode_batch(&encoded).unwrap();
        assert_eq!(decoded, packets);
    }

    #[test]
    fn empty_line_is_error() {
        assert!(matches!(decode_batch(b"  \n"), Err(ProtoError::EmptyBatch)));
    }

    #[test]
    fn garbage_is_json_error() {
        assert!(matches!(
            decode_batch(b"[{not json"),
            Err(ProtoError::JsonParse(_))
        ));
    }

    #[test]
    fn partition_keeps_order() {
        let packets = vec![
            Packet::raw(id::BLOCK_SET, serde_json::json!(1)),
            Packet::raw(id::PING, serde_json::Value::Null),
            Packet::raw(id::BLOCK_SET, serde_json::json!(2)),
        ];
        let (sets, rest) = partition_block_sets(packets);
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].data, serde_json::json!(1));
        assert_eq!(sets[1].data, serde_json::json!(2));
        assert_eq!(rest.len(), 1);
    }
}
