use bytes::{BufMut, BytesMut};

use super::packet::Packet;

const COM_QUIT: u8 = 0x01;
const COM_QUERY: u8 = 0x03;

/// Command sent by the monitor to a server
#[derive(Debug, Clone)]
pub enum ClientCommand<'a> {
    Query(&'a str),
    Quit,
}

impl ClientCommand<'_> {
    /// Encode as the first packet of a new command phase (sequence id 0)
    pub fn into_packet(self) -> Packet {
        let mut buf = BytesMut::new();
        match self {
            ClientCommand::Query(sql) => {
                buf.put_u8(COM_QUERY);
                buf.extend_from_slice(sql.as_bytes());
            }
            ClientCommand::Quit => buf.put_u8(COM_QUIT),
        }
        Packet::new(0, buf.freeze())
    }
}
