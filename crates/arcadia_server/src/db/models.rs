//! Row types returned by [`super::queries`], mirroring the `users` /
//! `characters` / `character_weapons` tables (§6).

use arcadia_schema::weapon::{FireMode, Gender, WeaponSlot};
use sqlx::FromRow;

/// A row of the `users` table.
#[derive(Clone, Debug, FromRow)]
pub struct UserRecord {
    /// Primary key.
    pub id: i64,
    /// Unique login name.
    pub username: String,
    /// Unique display nickname.
    pub nickname: String,
    /// PHC-format Argon2id hash.
    pub password_hash: String,
    /// The user's character, once one exists (every user has exactly one).
    pub character_id: Option<i64>,
}

/// A row of the `characters` table, in its raw (database-native) form.
#[derive(Clone, Debug, FromRow)]
pub struct CharacterRecord {
    /// Primary key.
    pub id: i64,
    /// Owning user.
    pub user_id: i64,
    /// `0` = Male, `1` = Female; translated to/from [`Gender`] at the edges.
    pub gender: i16,
    /// The region this character is (or was last) in.
    pub region_id: i32,
    /// The map/sub-area within the region.
    pub map_id: i32,
    /// Grid X coordinate.
    pub x: i32,
    /// Grid Z coordinate.
    pub z: i32,
    /// Current health.
    pub health: i32,
    /// Maximum health.
    pub max_health: i32,
    /// Movement speed in cells/tick.
    pub speed: i16,
    /// Facing, in radians.
    pub rotation_y: f32,
    /// Index of the currently equipped weapon slot.
    pub current_weapon: i16,
}

impl CharacterRecord {
    /// Decodes the stored gender column, defaulting to `Male` for any
    /// unrecognized value rather than failing a whole row read over it.
    pub fn gender(&self) -> Gender {
        match self.gender {
            1 => Gender::Female,
            _ => Gender::Male,
        }
    }
}

/// A row of the `character_weapons` table.
#[derive(Clone, Debug, FromRow)]
pub struct WeaponSlotRecord {
    /// Owning character.
    pub character_id: i64,
    /// Slot index, `0..5`.
    pub slot_index: i16,
    /// Internal weapon identifier.
    pub weapon_name: String,
    /// Coarse weapon category.
    pub weapon_type: String,
    /// Player-facing name.
    pub display_name: String,
    /// Ammunition currently loaded.
    pub ammo: i32,
    /// Ammunition held in reserve.
    pub reserve_ammo: i32,
    /// `0` = semi-auto, `1` = full-auto.
    pub fire_mode: i16,
}

impl From<WeaponSlotRecord> for WeaponSlot {
    fn from(row: WeaponSlotRecord) -> Self {
        WeaponSlot {
            name: row.weapon_name,
            weapon_type: row.weapon_type,
            display_name: row.display_name,
            ammo: row.ammo.max(0) as u32,
            reserve_ammo: row.reserve_ammo.max(0) as u32,
            fire_mode: if row.fire_mode == 1 { FireMode::FullAuto } else { FireMode::SemiAuto },
        }
    }
}

/// Flattens a slot's in-memory form into the columns `bulk_upsert_weapon_slots`
/// binds, alongside the index it occupies.
pub fn weapon_slot_columns(slot: &WeaponSlot) -> (String, String, String, i32, i32, i16) {
    let fire_mode = match slot.fire_mode {
        FireMode::SemiAuto => 0,
        FireMode::FullAuto => 1,
    };
    (
        slot.name.clone(),
        slot.weapon_type.clone(),
        slot.display_name.clone(),
        slot.ammo as i32,
        slot.reserve_ammo as i32,
        fire_mode,
    )
}

/// The inverse of gender's database encoding.
pub fn gender_column(gender: Gender) -> i16 {
    match gender {
        Gender::Male => 0,
        Gender::Female => 1,
    }
}
