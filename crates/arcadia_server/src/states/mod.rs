//! The per-connection state machine (§4.7): `Connected -> Authentication ->
//! Game`, modeled as a tagged union of concrete state variants rather than a
//! trait object, since there are exactly three and each carries distinct
//! private data (the inactivity deadline, the live player and movement
//! ticker) that doesn't belong on [`crate::client::Connection`] itself.

pub mod authentication;
pub mod connected;
pub mod game;

pub use authentication::AuthenticationState;
pub use game::GameState;

use arcadia_schema::payload::Payload;

use crate::client::Connection;

/// Which state a connection is currently in, plus that state's private data.
pub enum ClientState {
    /// Freshly accepted; waiting for a matching protocol handshake.
    Connected,
    /// Handshake confirmed; waiting for login or registration.
    Authentication(AuthenticationState),
    /// Logged in and placed in a region.
    Game(GameState),
}

/// Routes one inbound `(sender_id, payload)` pair to the current state's
/// handler, and applies any resulting state transition.
///
/// A handler returning `Some(next)` has already performed that transition's
/// `enter` work (e.g. `game::enter` already joined the region and sent the
/// initial `SpawnCharacter`s) — this function's only remaining job is to run
/// the outgoing state's `exit` work before swapping it in.
pub async fn dispatch(conn: &mut Connection, state: &mut ClientState, sender_id: u64, payload: Payload) {
    let next = match state {
        ClientState::Connected => connected::handle_packet(conn, sender_id, payload).await,
        ClientState::Authentication(s) => authentication::handle_packet(conn, s, sender_id, payload).await,
        ClientState::Game(s) => game::handle_packet(conn, s, sender_id, payload).await,
    };

    if let Some(next) = next {
        if let ClientState::Game(s) = state {
            game::exit(conn, s);
        }
        *state = next;
    }
}
