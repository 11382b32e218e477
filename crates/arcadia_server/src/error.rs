//! Typed domain errors, mirroring the teacher's practice of a small
//! `thiserror` enum per subsystem rather than one catch-all error type.

use thiserror::Error;

/// Errors surfaced by [`crate::hub::Hub`] operations.
#[derive(Debug, Error)]
pub enum HubError {
    /// Raised by `switch_region`/`join_region` when the target region id is unknown.
    #[error("region {0} does not exist")]
    UnknownRegion(i32),
    /// Raised by `switch_region` when the target region is already at capacity.
    #[error("region is full")]
    RegionFull,
    /// Raised when no spawn cell could be found even in the fallback region.
    #[error("no spawn cell available in region {0}")]
    NoSpawnCell(i32),
    /// A database operation failed.
    #[error("database error: {0}")]
    Db(#[from] DbError),
    /// The region actor's channel was closed (its task has exited).
    #[error("region {0} is no longer running")]
    RegionGone(i32),
}

/// Errors surfaced by [`crate::region::RegionHandle`] operations.
#[derive(Debug, Error)]
pub enum RegionError {
    /// The region's multiplex task has exited; its channels are closed.
    #[error("region actor has shut down")]
    Closed,
}

/// Errors surfaced by the persistence layer in [`crate::db`].
#[derive(Debug, Error)]
pub enum DbError {
    /// The underlying SQL query failed.
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),
    /// A unique constraint on `username` was violated during registration.
    #[error("username already exists")]
    UsernameExists,
    /// A unique constraint on `nickname` was violated during registration.
    #[error("nickname already exists")]
    NicknameExists,
    /// The operation did not complete within its allotted timeout.
    #[error("database operation timed out")]
    Timeout,
}

/// Errors surfaced during authentication (login/register), carrying the
/// exact text sent back to the client in `RequestDenied.reason`.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Catch-all for "wrong username or wrong password" — deliberately
    /// generic to avoid username enumeration.
    #[error("Invalid username or password")]
    InvalidCredentials,
    /// The account named by this request already has an active connection.
    #[error("Account already connected")]
    AlreadyConnected,
    /// The account has no linked character, so there's nothing to load.
    #[error("Account has no character")]
    NoCharacter,
    /// The character record failed to load after an otherwise successful login.
    #[error("Error loading character from database")]
    CharacterLoadFailed,
    /// Registration uniqueness check: `username` is already taken.
    #[error("Username already exists")]
    UsernameExists,
    /// Registration uniqueness check: `nickname` is already taken.
    #[error("Nickname already exists")]
    NicknameExists,
    /// A database failure during registration that isn't a uniqueness conflict.
    #[error("Account creation failed")]
    AccountCreationFailed,
    /// A field failed the username/nickname/password syntax rules.
    #[error("{0}")]
    Validation(String),
}
