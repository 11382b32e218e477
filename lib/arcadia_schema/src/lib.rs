#![warn(missing_docs)]

//! Wire message schemas shared between the Arcadia server and any client.
//!
//! This crate defines the tagged-union payload contract (§6 of the design
//! document) and the framing used to carry it over a socket. It has no
//! knowledge of gameplay rules; it only describes what can be said.

pub mod codec;
pub mod payload;
pub mod weapon;

pub use codec::{FrameCodec, FrameError};
pub use payload::{Message, Payload};
pub use weapon::{FireMode, Gender, WeaponSlot};

/// Current protocol version advertised in the [`payload::Payload::Handshake`] exchange.
///
/// Bump this whenever a breaking wire change is made; the `Connected` state
/// closes the connection on any mismatch.
pub const PROTOCOL_VERSION: u32 = 1;
