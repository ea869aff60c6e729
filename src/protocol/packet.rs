use bytes::{Buf, BufMut, Bytes, BytesMut};

/// MySQL packet header size: 3 bytes length + 1 byte sequence
pub const PACKET_HEADER_SIZE: usize = 4;
/// Maximum packet payload size (16MB - 1)
pub const MAX_PACKET_SIZE: usize = 0xFF_FF_FF;

/// MySQL wire protocol packet
#[derive(Debug, Clone)]
pub struct Packet {
    pub sequence_id: u8,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(sequence_id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence_id,
            payload: payload.into(),
        }
    }

    /// First payload byte, used to tell OK/ERR/EOF/data packets apart
    pub fn header(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    /// Encode packet to bytes (header + payload)
    pub fn encode(&self, dst: &mut BytesMut) {
        let len = self.payload.len();
        dst.reserve(PACKET_HEADER_SIZE + len);
        // 3 bytes for length (little endian)
        dst.put_uint_le(len as u64, 3);
        dst.put_u8(self.sequence_id);
        dst.extend_from_slice(&self.payload);
    }

    /// Try to decode packet from bytes, returns None if not enough data
    pub fn decode(src: &mut BytesMut) -> Option<Self> {
        if src.len() < PACKET_HEADER_SIZE {
            return None;
        }

        let len = src[0] as usize | ((src[1] as usize) << 8) | ((src[2] as usize) << 16);

        let total_len = PACKET_HEADER_SIZE + len;
        if src.len() < total_len {
            src.reserve(total_len - src.len());
            return None;
        }

        let sequence_id = src[3];
        src.advance(PACKET_HEADER_SIZE);
        let payload = src.split_to(len).freeze();

        Some(Self {
            sequence_id,
            payload,
        })
    }
}

/// MySQL capability flags used by the monitoring client
pub mod capabilities {
    pub const CLIENT_LONG_PASSWORD: u32 = 1;
    pub const CLIENT_LONG_FLAG: u32 = 1 << 2;
    pub const CLIENT_CONNECT_WITH_DB: u32 = 1 << 3;
    pub const CLIENT_PROTOCOL_41: u32 = 1 << 9;
    pub const CLIENT_TRANSACTIONS: u32 = 1 << 13;
    pub const CLIENT_SECURE_CONNECTION: u32 = 1 << 15;
    pub const CLIENT_MULTI_RESULTS: u32 = 1 << 17;
    pub const CLIENT_PLUGIN_AUTH: u32 = 1 << 19;
    pub const CLIENT_DEPRECATE_EOF: u32 = 1 << 24;

    /// Capabilities requested by the monitor
    ///
    /// CLIENT_DEPRECATE_EOF is left out so every result set keeps its EOF
    /// terminators and the reader can rely on them.
    pub const DEFAULT_CAPABILITIES: u32 = CLIENT_LONG_PASSWORD
        | CLIENT_LONG_FLAG
        | CLIENT_CONNECT_WITH_DB
        | CLIENT_PROTOCOL_41
        | CLIENT_TRANSACTIONS
        | CLIENT_SECURE_CONNECTION
        | CLIENT_MULTI_RESULTS
        | CLIENT_PLUGIN_AUTH;
}

/// Read a length-encoded integer, returning the value and bytes consumed
///
/// `0xFB` (NULL) yields `None` for the value but still consumes one byte.
pub fn read_lenenc_int(data: &[u8]) -> Option<(Option<u64>, usize)> {
    let first = *data.first()?;
    match first {
        0..=0xFA => Some((Some(first as u64), 1)),
        0xFB => Some((None, 1)),
        0xFC if data.len() >= 3 => Some((Some(u16::from_le_bytes([data[1], data[2]]) as u64), 3)),
        0xFD if data.len() >= 4 => Some((
            Some(u32::from_le_bytes([data[1], data[2], data[3], 0]) as u64),
            4,
        )),
        0xFE if data.len() >= 9 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&data[1..9]);
            Some((Some(u64::from_le_bytes(raw)), 9))
        }
        _ => None,
    }
}

/// Read a length-encoded string, returning the value (None for NULL) and bytes consumed
pub fn read_lenenc_str(data: &[u8]) -> Option<(Option<Bytes>, usize)> {
    let (len, header) = read_lenenc_int(data)?;
    let Some(len) = len else {
        return Some((None, header));
    };
    let len = usize::try_from(len).ok()?;
    let end = header.checked_add(len)?;
    if data.len() < end {
        return None;
    }
    Some((Some(Bytes::copy_from_slice(&data[header..end])), end))
}
