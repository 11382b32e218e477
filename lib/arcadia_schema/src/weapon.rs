//! Small value types shared by several payload variants.

use serde::{Deserialize, Serialize};

/// A player's chosen gender, used for cosmetic purposes only.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum Gender {
    /// Male avatar.
    Male,
    /// Female avatar.
    Female,
}

/// The firing mode of a weapon slot.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum FireMode {
    /// One shot per trigger pull.
    SemiAuto,
    /// Continuous fire while triggered.
    FullAuto,
}

/// One of a player's five weapon slots.
///
/// `name` is the internal identifier (e.g. `"unarmed"`, `"rifle"`),
/// `display_name` is what's shown in the UI, `weapon_type` loosely groups
/// weapons for client-side animation/sound selection.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct WeaponSlot {
    /// Internal weapon identifier, e.g. `"unarmed"` or `"rifle"`.
    pub name: String,
    /// Coarse weapon category, e.g. `"melee"` or `"ranged"`.
    pub weapon_type: String,
    /// Player-facing name.
    pub display_name: String,
    /// Ammunition currently loaded.
    pub ammo: u32,
    /// Ammunition held in reserve.
    pub reserve_ammo: u32,
    /// Current fire mode.
    pub fire_mode: FireMode,
}

impl WeaponSlot {
    /// The permanently-empty "no weapon" slot contents.
    pub fn unarmed() -> Self {
        Self {
            name: "unarmed".to_owned(),
            weapon_type: "melee".to_owned(),
            display_name: "Unarmed".to_owned(),
            ammo: 0,
            reserve_ammo: 0,
            fire_mode: FireMode::SemiAuto,
        }
    }

    /// A rifle slot seeded with a full magazine and one reserve magazine.
    pub fn rifle() -> Self {
        Self {
            name: "rifle".to_owned(),
            weapon_type: "ranged".to_owned(),
            display_name: "Rifle".to_owned(),
            ammo: 30,
            reserve_ammo: 90,
            fire_mode: FireMode::FullAuto,
        }
    }

    /// Whether this slot holds a usable weapon (as opposed to the unarmed placeholder).
    pub fn is_empty(&self) -> bool {
        self.name == "unarmed"
    }
}

/// The default 5-slot loadout given to a freshly created character:
/// slot 0 unarmed, slots 1-2 rifles, slots 3-4 unarmed.
pub fn default_weapon_slots() -> [WeaponSlot; 5] {
    [
        WeaponSlot::unarmed(),
        WeaponSlot::rifle(),
        WeaponSlot::rifle(),
        WeaponSlot::unarmed(),
        WeaponSlot::unarmed(),
    ]
}
