//! Named, single-purpose persistence operations (§6).
//!
//! Kept as small async functions over a pool or an open transaction rather
//! than a repository trait — there's exactly one backing store and no
//! reason to abstract over it.

use arcadia_schema::weapon::WeaponSlot;
use sqlx::postgres::PgDatabaseError;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::DbError;

use super::models::{gender_column, weapon_slot_columns, CharacterRecord, UserRecord, WeaponSlotRecord};

fn map_sqlx_error(err: sqlx::Error) -> DbError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            let pg_err = db_err.downcast_ref::<PgDatabaseError>();
            let constraint = pg_err.constraint().unwrap_or_default();
            if constraint.contains("username") {
                return DbError::UsernameExists;
            }
            if constraint.contains("nickname") {
                return DbError::NicknameExists;
            }
        }
    }
    DbError::Query(err)
}

/// Inserts a new account row. Returns the new user id, or
/// [`DbError::UsernameExists`]/[`DbError::NicknameExists`] if the unique
/// constraint on either column was violated.
pub async fn create_user(
    tx: &mut Transaction<'_, Postgres>,
    username: &str,
    nickname: &str,
    password_hash: &str,
) -> Result<i64, DbError> {
    sqlx::query_scalar(
        "INSERT INTO users (username, nickname, password_hash) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(username)
    .bind(nickname)
    .bind(password_hash)
    .fetch_one(&mut **tx)
    .await
    .map_err(map_sqlx_error)
}

/// Inserts a brand-new character row with the given starting stats, returning its id.
#[allow(clippy::too_many_arguments)]
pub async fn create_character(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    gender: arcadia_schema::weapon::Gender,
    region_id: i32,
    map_id: i32,
    x: i32,
    z: i32,
    health: i32,
    max_health: i32,
    speed: i16,
    rotation_y: f32,
) -> Result<i64, DbError> {
    sqlx::query_scalar(
        "INSERT INTO characters
            (user_id, gender, region_id, map_id, x, z, health, max_health, speed, rotation_y, current_weapon)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0)
         RETURNING id",
    )
    .bind(user_id)
    .bind(gender_column(gender))
    .bind(region_id)
    .bind(map_id)
    .bind(x)
    .bind(z)
    .bind(health)
    .bind(max_health)
    .bind(speed)
    .bind(rotation_y)
    .fetch_one(&mut **tx)
    .await
    .map_err(map_sqlx_error)
}

/// Links a user row to its character row.
pub async fn set_user_character_id(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    character_id: i64,
) -> Result<(), DbError> {
    sqlx::query("UPDATE users SET character_id = $1 WHERE id = $2")
        .bind(character_id)
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}

/// Looks up an account by primary key.
pub async fn get_user_by_id(pool: &PgPool, id: i64) -> Result<Option<UserRecord>, DbError> {
    sqlx::query_as::<_, UserRecord>(
        "SELECT id, username, nickname, password_hash, character_id FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(map_sqlx_error)
}

/// Looks up an account by its (already-lowercased) username.
pub async fn get_user_by_username(pool: &PgPool, username: &str) -> Result<Option<UserRecord>, DbError> {
    sqlx::query_as::<_, UserRecord>(
        "SELECT id, username, nickname, password_hash, character_id FROM users WHERE username = $1",
    )
    .bind(username)
    .fetch_optional(pool)
    .await
    .map_err(map_sqlx_error)
}

/// Looks up an account by nickname, used only for uniqueness pre-checks.
pub async fn get_user_by_nickname(pool: &PgPool, nickname: &str) -> Result<Option<UserRecord>, DbError> {
    sqlx::query_as::<_, UserRecord>(
        "SELECT id, username, nickname, password_hash, character_id FROM users WHERE nickname = $1",
    )
    .bind(nickname)
    .fetch_optional(pool)
    .await
    .map_err(map_sqlx_error)
}

/// Reads just the region/map/position columns, as needed by `join_region`
/// without paying for a full character row read.
pub async fn get_character_position(pool: &PgPool, character_id: i64) -> Result<Option<(i32, i32, i32, i32)>, DbError> {
    let row: Option<(i32, i32, i32, i32)> =
        sqlx::query_as("SELECT region_id, map_id, x, z FROM characters WHERE id = $1")
            .bind(character_id)
            .fetch_optional(pool)
            .await
            .map_err(map_sqlx_error)?;
    Ok(row)
}

/// Reads a character's full row.
pub async fn get_full_character_data(pool: &PgPool, character_id: i64) -> Result<Option<CharacterRecord>, DbError> {
    sqlx::query_as::<_, CharacterRecord>(
        "SELECT id, user_id, gender, region_id, map_id, x, z, health, max_health, speed, rotation_y, current_weapon
         FROM characters WHERE id = $1",
    )
    .bind(character_id)
    .fetch_optional(pool)
    .await
    .map_err(map_sqlx_error)
}

/// Reads a character's 5 weapon slot rows, ordered by slot index.
pub async fn load_weapon_slots(pool: &PgPool, character_id: i64) -> Result<Vec<WeaponSlotRecord>, DbError> {
    sqlx::query_as::<_, WeaponSlotRecord>(
        "SELECT character_id, slot_index, weapon_name, weapon_type, display_name, ammo, reserve_ammo, fire_mode
         FROM character_weapons WHERE character_id = $1 ORDER BY slot_index",
    )
    .bind(character_id)
    .fetch_all(pool)
    .await
    .map_err(map_sqlx_error)
}

/// Overwrites a character's full row, used by `Hub::save_character`.
#[allow(clippy::too_many_arguments)]
pub async fn update_full_character_data(
    tx: &mut Transaction<'_, Postgres>,
    character_id: i64,
    region_id: i32,
    map_id: i32,
    x: i32,
    z: i32,
    health: i32,
    max_health: i32,
    speed: i16,
    rotation_y: f32,
    current_weapon: i16,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE characters
         SET region_id = $2, map_id = $3, x = $4, z = $5, health = $6, max_health = $7,
             speed = $8, rotation_y = $9, current_weapon = $10
         WHERE id = $1",
    )
    .bind(character_id)
    .bind(region_id)
    .bind(map_id)
    .bind(x)
    .bind(z)
    .bind(health)
    .bind(max_health)
    .bind(speed)
    .bind(rotation_y)
    .bind(current_weapon)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

/// Upserts all 5 weapon slots in one round trip, keyed on
/// `(character_id, slot_index)`.
pub async fn bulk_upsert_weapon_slots(
    tx: &mut Transaction<'_, Postgres>,
    character_id: i64,
    slots: &[WeaponSlot; 5],
) -> Result<(), DbError> {
    for (index, slot) in slots.iter().enumerate() {
        let (name, weapon_type, display_name, ammo, reserve_ammo, fire_mode) = weapon_slot_columns(slot);
        sqlx::query(
            "INSERT INTO character_weapons
                (character_id, slot_index, weapon_name, weapon_type, display_name, ammo, reserve_ammo, fire_mode)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (character_id, slot_index) DO UPDATE SET
                weapon_name = EXCLUDED.weapon_name,
                weapon_type = EXCLUDED.weapon_type,
                display_name = EXCLUDED.display_name,
                ammo = EXCLUDED.ammo,
                reserve_ammo = EXCLUDED.reserve_ammo,
                fire_mode = EXCLUDED.fire_mode",
        )
        .bind(character_id)
        .bind(index as i16)
        .bind(name)
        .bind(weapon_type)
        .bind(display_name)
        .bind(ammo)
        .bind(reserve_ammo)
        .bind(fire_mode)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
    }
    Ok(())
}
