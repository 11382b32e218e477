//! The `Connected` state (§4.7): the only thing a freshly accepted
//! connection does is wait for a matching protocol handshake.

use arcadia_schema::payload::Payload;
use arcadia_schema::PROTOCOL_VERSION;

use crate::client::Connection;
use crate::prelude::*;

use super::{authentication, ClientState};

/// Sends the server's own handshake immediately on accept.
pub fn enter(conn: &Connection) {
    conn.send_packet(Payload::Handshake { version: PROTOCOL_VERSION });
}

/// Waits for the client to echo back a matching [`Payload::Handshake`];
/// anything else is ignored per §9's "unrecognized variant is not an error".
pub async fn handle_packet(conn: &mut Connection, sender_id: u64, payload: Payload) -> Option<ClientState> {
    if sender_id != conn.id {
        conn.send_packet_as(sender_id, payload);
        return None;
    }

    match payload {
        Payload::Handshake { version } if version == PROTOCOL_VERSION => {
            Some(ClientState::Authentication(authentication::enter(conn).await))
        }
        Payload::Handshake { version } => {
            warn!(client_id = conn.id, client_version = version, server_version = PROTOCOL_VERSION, "protocol version mismatch");
            None
        }
        _ => None,
    }
}
