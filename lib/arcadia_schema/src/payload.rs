//! The tagged-union message schema exchanged between clients and the server.

use serde::{Deserialize, Serialize};

use crate::weapon::{FireMode, Gender, WeaponSlot};

/// A framed message: who it's (nominally) from, and what it says.
///
/// `sender_id` is attacker/relay metadata, not an authentication claim — the
/// connection handler overwrites it with the owning client's id for anything
/// the client sends directly (see `Connection::run_read_pump`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// The id of the client this message nominally originates from, or `0`
    /// for "fill in my own id".
    pub sender_id: u64,
    /// The payload itself.
    pub payload: Payload,
}

/// A 2D grid position in a region.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate, non-negative, bounded by the region's grid width.
    pub x: i32,
    /// Z coordinate, non-negative, bounded by the region's grid height.
    pub z: i32,
}

impl Position {
    /// Shorthand constructor.
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// The tagged union of every message the wire protocol can carry.
///
/// A state is responsible for ignoring variants it doesn't understand; an
/// unrecognized variant from a state's perspective is not an error.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Payload {
    // --- Connected state ---
    /// Sent by the server on connect, and echoed back by the client to
    /// confirm protocol compatibility.
    Handshake {
        /// The protocol version of the sender.
        version: u32,
    },

    // --- Authentication state ---
    /// Client requests a session for an existing account.
    LoginRequest {
        /// Account username.
        username: String,
        /// Plaintext password, verified against the stored Argon2id hash.
        password: String,
    },
    /// Client requests creation of a new account.
    RegisterRequest {
        /// Desired account username.
        username: String,
        /// Desired display nickname.
        nickname: String,
        /// Plaintext password to hash and store.
        password: String,
        /// Chosen avatar gender.
        gender: Gender,
    },
    /// Informational payload sent on entering the Authentication state.
    ServerMetrics {
        /// Number of currently logged-in accounts.
        logged_in_accounts: u32,
    },
    /// Generic acknowledgement for a request that doesn't warrant its own reply.
    RequestGranted,
    /// Generic rejection for a request, carrying a human-readable reason.
    RequestDenied {
        /// Why the request was denied.
        reason: String,
    },
    /// Sent on a successful login, carrying the account's display nickname.
    LoginSuccess {
        /// The account's nickname.
        nickname: String,
    },

    // --- Presence ---
    /// Broadcast to a region when a player enters it.
    ClientEntered {
        /// The entering player's nickname.
        nickname: String,
    },
    /// Broadcast to a region (or, on logout, formerly-shared regions) when a player leaves it.
    ClientLeft {
        /// The leaving player's nickname.
        nickname: String,
    },

    // --- Region / game state ---
    /// Sent to a client on joining a region, describing its grid dimensions.
    RegionData {
        /// The region's id.
        region_id: i32,
        /// Grid width in cells.
        width: i32,
        /// Grid height in cells.
        height: i32,
    },
    /// Full avatar state, sent once per player on spawn (your own, and every
    /// peer already present in the region).
    SpawnCharacter {
        /// The hub-assigned client id owning this avatar.
        id: u64,
        /// Display nickname.
        name: String,
        /// Current grid position.
        position: Position,
        /// Current rotation, in radians.
        rotation_y: f32,
        /// Avatar gender.
        gender: Gender,
        /// Current movement speed, in cells/tick.
        speed: u8,
        /// Current health.
        health: u32,
        /// Maximum health.
        max_health: u32,
        /// Index of the currently equipped weapon slot.
        current_weapon: u8,
        /// All five weapon slots.
        weapons: [WeaponSlot; 5],
    },
    /// Client requests to walk towards a destination cell.
    Destination {
        /// Target X coordinate.
        x: i32,
        /// Target Z coordinate.
        z: i32,
    },
    /// Periodic movement update, broadcast (and self-sent) as the mover steps.
    MoveCharacter {
        /// New grid position.
        position: Position,
    },
    /// Rotation update, broadcast when a player rotates in place.
    RotateCharacter {
        /// New rotation, in radians.
        rotation_y: f32,
    },
    /// Client requests a speed change; server clamps and echoes the result.
    UpdateSpeed {
        /// Requested speed in cells/tick.
        speed: u8,
    },
    /// Client requests to transfer to a different region/map.
    JoinRegionRequest {
        /// Target region id.
        region_id: i32,
    },
    /// Client requests to return to the Authentication state.
    LogoutRequest,
    /// Chat message broadcast to the sender's region.
    PublicMessage {
        /// The message text.
        text: String,
    },
    /// Keep-alive; echoed by the server unchanged.
    Heartbeat,
    /// Toggles the sender's chat bubble UI hint.
    ChatBubble {
        /// Whether the chat bubble should be shown.
        is_active: bool,
    },

    // --- Combat ---
    /// Client requests to switch its active weapon slot.
    SwitchWeapon {
        /// Slot index, must be `< 5` and non-empty.
        slot: u8,
    },
    /// Client requests to reload a weapon slot by some ammo amount.
    ReloadWeapon {
        /// Slot index being reloaded.
        slot: u8,
        /// Amount of ammo moved from reserve into the magazine.
        amount: u32,
    },
    /// Client raises its weapon (aiming pose).
    RaiseWeapon,
    /// Client lowers its weapon.
    LowerWeapon,
    /// Client toggles the fire mode of its active weapon.
    ToggleFireMode,
    /// Client fires its active weapon once.
    FireWeapon {
        /// World-space origin of the shot, for effects only.
        x: f32,
        /// World-space origin of the shot, for effects only.
        y: f32,
        /// World-space origin of the shot, for effects only.
        z: f32,
    },
    /// Client begins continuous fire (full-auto).
    StartFiringWeapon,
    /// Client ends continuous fire.
    StopFiringWeapon,
    /// Client reports that it hit another player; the server is authoritative
    /// over the resulting damage.
    ReportPlayerDamage {
        /// The hub-assigned id of the player that was hit.
        target_id: u64,
        /// Whether the client believes this was a critical hit.
        is_critical: bool,
        /// World-space hit location, for effects only.
        x: f32,
        /// World-space hit location, for effects only.
        y: f32,
        /// World-space hit location, for effects only.
        z: f32,
    },
    /// Server-authoritative damage result, sent to the attacker and broadcast
    /// to the region.
    ApplyPlayerDamage {
        /// The player that was hit.
        target_id: u64,
        /// Damage applied.
        amount: u32,
        /// The target's remaining health after this hit.
        remaining_health: u32,
        /// Whether this was considered a critical hit.
        is_critical: bool,
    },
    /// Broadcast when a player's health reaches zero.
    PlayerDied {
        /// The player that died.
        id: u64,
    },
}
