//! The `Authentication` state (§4.7): login, registration, and the
//! 2-minute inactivity timer that closes connections which never pick one.

use std::time::Duration;

use arcadia_schema::payload::Payload;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;

use crate::client::Connection;
use crate::db::models::CharacterRecord;
use crate::error::{AuthError, DbError};
use crate::grid::Cell;
use crate::player::Player;
use crate::prelude::*;

use super::{game, ClientState};

/// How long a connection may sit in Authentication without a successful
/// login or registration before it's closed (§4.7).
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(120);

/// The Authentication state's private data: just the rolling inactivity
/// deadline, reset on every inbound packet.
pub struct AuthenticationState {
    pub deadline: tokio::time::Instant,
}

/// Sends the initial `ServerMetrics` payload and starts the inactivity clock.
pub async fn enter(conn: &Connection) -> AuthenticationState {
    conn.send_packet(Payload::ServerMetrics { logged_in_accounts: conn.hub.connected_accounts() });
    AuthenticationState { deadline: tokio::time::Instant::now() + AUTH_TIMEOUT }
}

fn touch(state: &mut AuthenticationState) {
    state.deadline = tokio::time::Instant::now() + AUTH_TIMEOUT;
}

pub async fn handle_packet(conn: &mut Connection, state: &mut AuthenticationState, sender_id: u64, payload: Payload) -> Option<ClientState> {
    if sender_id != conn.id {
        conn.send_packet_as(sender_id, payload);
        return None;
    }

    touch(state);

    match payload {
        Payload::LoginRequest { username, password } => handle_login(conn, username, password).await,
        Payload::RegisterRequest { username, nickname, password, gender } => {
            handle_register(conn, username, nickname, password, gender).await;
            None
        }
        _ => None,
    }
}

async fn handle_login(conn: &mut Connection, username: String, password: String) -> Option<ClientState> {
    let username = username.to_lowercase();

    let (player, nickname) = match authenticate(conn, &username, &password).await {
        Ok(outcome) => outcome,
        Err(err) => {
            conn.send_packet(Payload::RequestDenied { reason: err.to_string() });
            return None;
        }
    };

    conn.hub.register_username(&username, conn.id);
    conn.account_username = Some(username);
    conn.character_id = player.character_id;

    conn.send_packet(Payload::LoginSuccess { nickname });

    Some(ClientState::Game(game::enter(conn, player).await))
}

/// Runs the full login gate — syntax validation, credential check,
/// single-session enforcement, and character load — as a single typed
/// error path (§4.7's login sequence).
async fn authenticate(conn: &Connection, username: &str, password: &str) -> Result<(Player, String), AuthError> {
    validate_username(username).map_err(AuthError::Validation)?;
    validate_password(password).map_err(AuthError::Validation)?;

    let user = match conn.hub.get_user_by_username(username).await {
        Ok(Some(user)) => user,
        Ok(None) => return Err(AuthError::InvalidCredentials),
        Err(err) => {
            warn!(client_id = conn.id, error = %err, "login lookup failed");
            return Err(AuthError::InvalidCredentials);
        }
    };

    if !verify_password(password, &user.password_hash) {
        return Err(AuthError::InvalidCredentials);
    }

    if conn.hub.is_already_connected(username) {
        return Err(AuthError::AlreadyConnected);
    }

    let character_id = match user.character_id {
        Some(id) => id,
        None => {
            error!(client_id = conn.id, username, "account has no linked character");
            return Err(AuthError::NoCharacter);
        }
    };

    let loaded = match conn.hub.get_full_character_data(character_id).await {
        Ok(loaded) => loaded,
        Err(err) => {
            warn!(client_id = conn.id, error = %err, "failed to load character on login");
            return Err(AuthError::CharacterLoadFailed);
        }
    };

    let player = player_from_record(conn.id, character_id, user.nickname.clone(), &loaded.record, loaded.weapons);
    Ok((player, user.nickname))
}

async fn handle_register(conn: &mut Connection, username: String, nickname: String, password: String, gender: arcadia_schema::weapon::Gender) {
    let username = username.to_lowercase();
    let nickname = capitalize(&nickname);

    match register(conn, &username, &nickname, &password, gender).await {
        Ok(()) => conn.send_packet(Payload::RequestGranted),
        Err(err) => conn.send_packet(Payload::RequestDenied { reason: err.to_string() }),
    }
}

/// Runs the registration gate — syntax validation, uniqueness checks, and
/// account creation — as a single typed error path (§4.7's register sequence).
async fn register(conn: &Connection, username: &str, nickname: &str, password: &str, gender: arcadia_schema::weapon::Gender) -> Result<(), AuthError> {
    validate_username(username).map_err(AuthError::Validation)?;
    validate_nickname(nickname).map_err(AuthError::Validation)?;
    validate_password(password).map_err(AuthError::Validation)?;

    match conn.hub.get_user_by_username(username).await {
        Ok(Some(_)) => return Err(AuthError::UsernameExists),
        Ok(None) => {}
        Err(err) => {
            warn!(client_id = conn.id, error = %err, "uniqueness check failed");
            return Err(AuthError::AccountCreationFailed);
        }
    }
    match conn.hub.get_user_by_nickname(nickname).await {
        Ok(Some(_)) => return Err(AuthError::NicknameExists),
        Ok(None) => {}
        Err(err) => {
            warn!(client_id = conn.id, error = %err, "uniqueness check failed");
            return Err(AuthError::AccountCreationFailed);
        }
    }

    let password_hash = match hash_password(password) {
        Ok(hash) => hash,
        Err(err) => {
            error!(client_id = conn.id, error = %err, "password hashing failed");
            return Err(AuthError::AccountCreationFailed);
        }
    };

    match conn.hub.create_user(username, nickname, &password_hash, gender).await {
        Ok(_) => Ok(()),
        Err(DbError::UsernameExists) => Err(AuthError::UsernameExists),
        Err(DbError::NicknameExists) => Err(AuthError::NicknameExists),
        Err(err) => {
            warn!(client_id = conn.id, error = %err, "account creation failed");
            Err(AuthError::AccountCreationFailed)
        }
    }
}

fn player_from_record(id: u64, character_id: i64, nickname: String, record: &CharacterRecord, weapons: [arcadia_schema::weapon::WeaponSlot; 5]) -> Player {
    Player::from_saved(
        id,
        character_id,
        nickname,
        record.gender(),
        record.region_id,
        record.map_id,
        Cell::new(record.x, record.z),
        record.rotation_y,
        record.speed as u8,
        record.max_health.max(0) as u32,
        record.health.max(0) as u32,
        record.current_weapon as u8,
        weapons,
    )
}

fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string())
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

/// First char upper, rest lower (§4.7's nickname capitalization rule).
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

fn validate_no_surrounding_whitespace(field: &str, label: &str) -> Result<(), String> {
    if field != field.trim() {
        return Err(format!("{label} must not have leading or trailing whitespace"));
    }
    Ok(())
}

fn validate_username(username: &str) -> Result<(), String> {
    validate_no_surrounding_whitespace(username, "Username")?;
    if username.is_empty() || username.chars().count() > 32 {
        return Err("Username must be 1-32 characters".to_owned());
    }
    Ok(())
}

fn validate_nickname(nickname: &str) -> Result<(), String> {
    validate_no_surrounding_whitespace(nickname, "Nickname")?;
    if nickname.is_empty() || nickname.chars().count() > 20 {
        return Err("Nickname must be 1-20 characters".to_owned());
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), String> {
    validate_no_surrounding_whitespace(password, "Password")?;
    if password.chars().count() < 8 || password.chars().count() > 64 {
        return Err("Password must be 8-64 characters".to_owned());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capitalize_normalizes_case() {
        assert_eq!(capitalize("jOHN"), "John");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn validate_username_rejects_whitespace_and_length() {
        assert!(validate_username("ok").is_ok());
        assert!(validate_username(" bad").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
        assert!(validate_username("").is_err());
    }

    #[test]
    fn validate_password_enforces_length_bounds() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password(&"a".repeat(65)).is_err());
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn auth_error_messages_match_client_facing_text() {
        assert_eq!(AuthError::InvalidCredentials.to_string(), "Invalid username or password");
        assert_eq!(AuthError::AlreadyConnected.to_string(), "Account already connected");
        assert_eq!(AuthError::Validation("Username must be 1-32 characters".to_owned()).to_string(), "Username must be 1-32 characters");
    }
}
