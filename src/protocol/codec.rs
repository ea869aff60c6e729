use std::io;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use super::packet::{Packet, MAX_PACKET_SIZE, PACKET_HEADER_SIZE};

/// MySQL packet codec for use with tokio Framed
///
/// Packets at the 16MB boundary are split across several frames by the
/// server; status result sets never come close, so such frames are rejected.
#[derive(Debug, Default)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() >= PACKET_HEADER_SIZE {
            let len = src[0] as usize | ((src[1] as usize) << 8) | ((src[2] as usize) << 16);
            if len == MAX_PACKET_SIZE {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "multi-frame packets are not supported",
                ));
            }
        }
        Ok(Packet::decode(src))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.payload.len() >= MAX_PACKET_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "packet payload too large",
            ));
        }
        item.encode(dst);
        Ok(())
    }
}
