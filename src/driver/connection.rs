use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, error};

use crate::protocol::resultset::{parse_column_count, parse_column_name, parse_row};
use crate::protocol::{
    capabilities, compute_auth_response, is_eof_packet, is_err_packet, is_ok_packet,
    AuthSwitchRequest, ClientCommand, ErrPacket, HandshakeResponse, InitialHandshake, Packet,
    PacketCodec, ResultSet, NATIVE_PASSWORD_PLUGIN,
};
use crate::sample::ServerEndpoint;

/// An authenticated MySQL session used for status polling
pub struct MySqlConnection {
    framed: Framed<TcpStream, PacketCodec>,
    /// Server version from the greeting
    server_version: String,
}

impl MySqlConnection {
    /// Connect and authenticate with mysql_native_password
    pub async fn connect(endpoint: &ServerEndpoint) -> Result<Self, ConnectionError> {
        let addr = endpoint.addr();
        debug!(addr = %addr, "Connecting to server");

        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| ConnectionError::Connect(e.to_string()))?;
        stream
            .set_nodelay(true)
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        let mut framed = Framed::new(stream, PacketCodec);

        let greeting = Self::next_packet(&mut framed).await?;
        if is_err_packet(&greeting.payload) {
            // e.g. "Host is blocked" or "Too many connections"
            return Err(ConnectionError::Server(ErrPacket::describe(&greeting.payload)));
        }
        let handshake = InitialHandshake::parse(&greeting.payload)
            .ok_or_else(|| ConnectionError::Protocol("Invalid server handshake".into()))?;

        debug!(
            addr = %addr,
            server_version = %handshake.server_version,
            "Received server handshake"
        );

        let caps = (capabilities::DEFAULT_CAPABILITIES & handshake.capability_flags)
            | capabilities::CLIENT_PROTOCOL_41;

        let response = HandshakeResponse {
            capability_flags: caps & !capabilities::CLIENT_CONNECT_WITH_DB,
            max_packet_size: 16 * 1024 * 1024,
            character_set: 0x21, // utf8_general_ci
            username: endpoint.user().to_string(),
            auth_response: compute_auth_response(
                endpoint.password(),
                &handshake.auth_plugin_data(),
            ),
            database: None,
            auth_plugin_name: NATIVE_PASSWORD_PLUGIN.to_string(),
        };

        let seq = greeting.sequence_id.wrapping_add(1);
        framed
            .send(response.encode(seq))
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        let mut reply = Self::next_packet(&mut framed).await?;

        // Server may ask to redo auth with the plugin configured for the account
        if reply.header() == Some(0xFE) {
            let switch = AuthSwitchRequest::parse(&reply.payload)
                .ok_or_else(|| ConnectionError::Protocol("Invalid auth switch request".into()))?;
            if switch.plugin_name != NATIVE_PASSWORD_PLUGIN {
                return Err(ConnectionError::Auth(format!(
                    "unsupported auth plugin {}",
                    switch.plugin_name
                )));
            }
            let auth = compute_auth_response(endpoint.password(), &switch.plugin_data);
            framed
                .send(Packet::new(reply.sequence_id.wrapping_add(1), auth))
                .await
                .map_err(|e| ConnectionError::Io(e.to_string()))?;
            reply = Self::next_packet(&mut framed).await?;
        }

        if is_err_packet(&reply.payload) {
            let message = ErrPacket::describe(&reply.payload);
            error!(addr = %addr, error = %message, "Authentication failed");
            return Err(ConnectionError::Auth(message));
        }

        if !is_ok_packet(&reply.payload) {
            // 0x01 is AuthMoreData from caching_sha2_password full authentication
            return Err(ConnectionError::Auth(
                "server requested an unsupported authentication exchange".into(),
            ));
        }

        debug!(addr = %addr, "Authentication successful");

        Ok(Self {
            framed,
            server_version: handshake.server_version,
        })
    }

    async fn next_packet(
        framed: &mut Framed<TcpStream, PacketCodec>,
    ) -> Result<Packet, ConnectionError> {
        framed
            .next()
            .await
            .ok_or(ConnectionError::Disconnected)?
            .map_err(|e| ConnectionError::Io(e.to_string()))
    }

    /// Server version string from the handshake
    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Send a packet to the server
    pub async fn send(&mut self, packet: Packet) -> Result<(), ConnectionError> {
        self.framed
            .send(packet)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))
    }

    /// Receive a packet from the server
    pub async fn recv(&mut self) -> Result<Packet, ConnectionError> {
        Self::next_packet(&mut self.framed).await
    }

    /// Run a text query and buffer its result set
    ///
    /// Statements without a result set return an empty [`ResultSet`].
    pub async fn query(&mut self, sql: &str) -> Result<ResultSet, ConnectionError> {
        self.send(ClientCommand::Query(sql).into_packet()).await?;

        let first = self.recv().await?;
        if is_err_packet(&first.payload) {
            return Err(ConnectionError::Server(ErrPacket::describe(&first.payload)));
        }
        if is_ok_packet(&first.payload) {
            return Ok(ResultSet::default());
        }

        let column_count = parse_column_count(&first.payload)
            .ok_or_else(|| ConnectionError::Protocol("Invalid column count".into()))?;

        let mut columns = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            let def = self.recv().await?;
            let name = parse_column_name(&def.payload)
                .ok_or_else(|| ConnectionError::Protocol("Invalid column definition".into()))?;
            columns.push(name);
        }

        // EOF after column definitions (CLIENT_DEPRECATE_EOF is never negotiated)
        let eof = self.recv().await?;
        if !is_eof_packet(&eof.payload) {
            return Err(ConnectionError::Protocol(
                "Expected EOF after column definitions".into(),
            ));
        }

        let mut rows = Vec::new();
        loop {
            let packet = self.recv().await?;
            if is_eof_packet(&packet.payload) {
                break;
            }
            if is_err_packet(&packet.payload) {
                return Err(ConnectionError::Server(ErrPacket::describe(&packet.payload)));
            }
            let row = parse_row(&packet.payload, column_count)
                .ok_or_else(|| ConnectionError::Protocol("Malformed row".into()))?;
            rows.push(row);
        }

        Ok(ResultSet { columns, rows })
    }

    /// Send COM_QUIT and drop the socket
    pub async fn quit(mut self) {
        if let Err(e) = self.send(ClientCommand::Quit.into_packet()).await {
            debug!(error = %e, "COM_QUIT failed, dropping connection");
        }
    }
}

/// Connection errors
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Connection disconnected")]
    Disconnected,
}
