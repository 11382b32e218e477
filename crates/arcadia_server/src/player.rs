//! The in-memory avatar entity and its invariant-enforcing mutators (§4.3).

use arcadia_schema::weapon::{default_weapon_slots, Gender, WeaponSlot};

use crate::grid::Cell;

/// Maximum movement speed, in cells stepped per movement tick.
pub const MAX_SPEED: u8 = 3;
/// Default health of a freshly created or respawned character.
pub const DEFAULT_MAX_HEALTH: u32 = 100;
/// Default movement speed of a freshly created character.
pub const DEFAULT_SPEED: u8 = 2;
/// Number of weapon slots every character has.
pub const WEAPON_SLOT_COUNT: usize = 5;

/// Radian rotations for the 8 cardinal/intercardinal movement directions,
/// per §4.3's `calculate_rotation` table.
mod rotation_table {
    use std::f32::consts::PI;

    pub const NORTH: f32 = PI;
    pub const SOUTH: f32 = 0.0;
    pub const EAST: f32 = PI / 2.0;
    pub const WEST: f32 = -PI / 2.0;
    pub const NORTHEAST: f32 = PI / 4.0;
    pub const SOUTHEAST: f32 = -PI / 4.0;
    pub const NORTHWEST: f32 = 3.0 * PI / 4.0;
    pub const SOUTHWEST: f32 = -3.0 * PI / 4.0;
}

/// A player's persistent, in-memory avatar state.
///
/// Owned exclusively by the connection whose player this is; a region only
/// ever sees it through the hub-assigned `id`, matching §3's ownership
/// summary ("each connection owns its playerCharacter").
#[derive(Clone, Debug)]
pub struct Player {
    /// The hub-assigned client id this avatar belongs to.
    pub id: u64,
    /// The database row id of the underlying character, once loaded.
    pub character_id: i64,
    /// Display nickname.
    pub name: String,
    /// Avatar gender.
    pub gender: Gender,
    /// The region this character is (or was last) in.
    pub region_id: i32,
    /// The map/sub-area within the region.
    pub map_id: i32,
    /// Current grid cell, or `None` if not currently placed in any grid.
    pub position: Option<Cell>,
    /// The cell the movement ticker is walking towards, if any.
    pub destination: Option<Cell>,
    /// Current facing, in radians.
    pub rotation: f32,
    /// Movement speed in cells/tick, always `<= MAX_SPEED`.
    speed: u8,
    /// Current health, always `<= max_health`.
    health: u32,
    /// Maximum health.
    pub max_health: u32,
    /// Index of the currently equipped weapon slot, always `< WEAPON_SLOT_COUNT`.
    current_weapon: u8,
    /// The five weapon slots.
    pub weapons: [WeaponSlot; WEAPON_SLOT_COUNT],
}

impl Player {
    /// Constructs a freshly-created character's default state, matching the
    /// defaults written by `Hub::create_user` (§4.5): region 1, map 1, spawn
    /// `(0, 0)`, rotation South, speed 2, health 100/100.
    pub fn new_default(id: u64, character_id: i64, name: String, gender: Gender) -> Self {
        Self {
            id,
            character_id,
            name,
            gender,
            region_id: 1,
            map_id: 1,
            position: None,
            destination: None,
            rotation: rotation_table::SOUTH,
            speed: DEFAULT_SPEED,
            health: DEFAULT_MAX_HEALTH,
            max_health: DEFAULT_MAX_HEALTH,
            current_weapon: 0,
            weapons: default_weapon_slots(),
        }
    }

    /// Reconstructs a returning player's avatar from their saved character
    /// row and weapon loadout (§4.7's Authentication-state login flow).
    #[allow(clippy::too_many_arguments)]
    pub fn from_saved(
        id: u64,
        character_id: i64,
        name: String,
        gender: Gender,
        region_id: i32,
        map_id: i32,
        position: Cell,
        rotation: f32,
        speed: u8,
        max_health: u32,
        health: u32,
        current_weapon: u8,
        weapons: [WeaponSlot; WEAPON_SLOT_COUNT],
    ) -> Self {
        let mut player = Self {
            id,
            character_id,
            name,
            gender,
            region_id,
            map_id,
            position: Some(position),
            destination: Some(position),
            rotation,
            speed: DEFAULT_SPEED,
            health: max_health,
            max_health,
            current_weapon: 0,
            weapons,
        };
        player.set_speed(speed);
        player.set_health(health);
        player.set_current_weapon(current_weapon);
        player
    }

    /// A minimal player used only by grid/pathfinder unit tests, where the
    /// rest of the character state is irrelevant.
    #[cfg(test)]
    pub fn new_for_test(id: u64) -> Self {
        Self::new_default(id, 0, format!("test-{id}"), Gender::Male)
    }

    /// Current movement speed.
    pub fn speed(&self) -> u8 {
        self.speed
    }

    /// Clamps and sets the movement speed.
    pub fn set_speed(&mut self, speed: u8) {
        self.speed = speed.min(MAX_SPEED);
    }

    /// Current health.
    pub fn health(&self) -> u32 {
        self.health
    }

    /// Clamps and sets health to `[0, max_health]`.
    pub fn set_health(&mut self, health: u32) {
        self.health = health.min(self.max_health);
    }

    /// Applies damage, clamping at zero. Returns `true` if this brought the
    /// player to zero health.
    pub fn apply_damage(&mut self, amount: u32) -> bool {
        self.health = self.health.saturating_sub(amount);
        self.health == 0
    }

    /// Currently equipped weapon slot index.
    pub fn current_weapon(&self) -> u8 {
        self.current_weapon
    }

    /// Sets the current weapon slot; no-ops if `slot >= WEAPON_SLOT_COUNT`.
    pub fn set_current_weapon(&mut self, slot: u8) {
        if (slot as usize) < WEAPON_SLOT_COUNT {
            self.current_weapon = slot;
        }
    }

    /// Restores full health and the default weapon loadout, and faces the
    /// given rotation (typically the respawn point's default facing).
    pub fn respawn(&mut self, rotation: f32) {
        self.health = self.max_health;
        self.weapons = default_weapon_slots();
        self.current_weapon = 0;
        self.rotation = rotation;
        self.destination = None;
    }

    /// Maps a single-cell movement step to one of the 8 fixed rotations.
    /// Returns the player's current rotation unchanged if `from == to`
    /// (a zero vector has no defined direction).
    pub fn calculate_rotation(from: Cell, to: Cell, fallback: f32) -> f32 {
        let dx = (to.x - from.x).signum();
        let dz = (to.z - from.z).signum();
        match (dx, dz) {
            (0, -1) => rotation_table::NORTH,
            (0, 1) => rotation_table::SOUTH,
            (1, 0) => rotation_table::EAST,
            (-1, 0) => rotation_table::WEST,
            (1, -1) => rotation_table::NORTHEAST,
            (1, 1) => rotation_table::SOUTHEAST,
            (-1, -1) => rotation_table::NORTHWEST,
            (-1, 1) => rotation_table::SOUTHWEST,
            _ => fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_health_clamps_to_max() {
        let mut p = Player::new_for_test(1);
        p.set_health(9999);
        assert_eq!(p.health(), p.max_health);
    }

    #[test]
    fn set_speed_clamps_to_max_speed() {
        let mut p = Player::new_for_test(1);
        p.set_speed(255);
        assert_eq!(p.speed(), MAX_SPEED);
    }

    #[test]
    fn set_current_weapon_ignores_out_of_range_slot() {
        let mut p = Player::new_for_test(1);
        p.set_current_weapon(2);
        assert_eq!(p.current_weapon(), 2);
        p.set_current_weapon(5);
        assert_eq!(p.current_weapon(), 2, "out-of-range slot must be a no-op");
    }

    #[test]
    fn calculate_rotation_matches_the_fixed_table() {
        use std::f32::consts::PI;
        let origin = Cell::new(1, 1);
        assert_eq!(Player::calculate_rotation(origin, Cell::new(1, 0), 0.0), PI);
        assert_eq!(Player::calculate_rotation(origin, Cell::new(1, 2), 0.0), 0.0);
        assert_eq!(Player::calculate_rotation(origin, Cell::new(2, 1), 0.0), PI / 2.0);
        assert_eq!(Player::calculate_rotation(origin, Cell::new(0, 1), 0.0), -PI / 2.0);
    }

    #[test]
    fn apply_damage_reports_death_at_zero() {
        let mut p = Player::new_for_test(1);
        assert!(!p.apply_damage(50));
        assert!(p.apply_damage(50));
        assert_eq!(p.health(), 0);
    }

    #[test]
    fn from_saved_clamps_speed_health_and_weapon_slot() {
        let p = Player::from_saved(
            1,
            7,
            "Returning".to_owned(),
            Gender::Female,
            2,
            1,
            Cell::new(3, 4),
            1.0,
            255,
            100,
            40,
            9,
            default_weapon_slots(),
        );
        assert_eq!(p.speed(), MAX_SPEED);
        assert_eq!(p.health(), 40);
        assert_eq!(p.current_weapon(), 0, "out-of-range saved slot must fall back to 0");
        assert_eq!(p.position, Some(Cell::new(3, 4)));
    }

    #[test]
    fn respawn_restores_health_and_loadout() {
        let mut p = Player::new_for_test(1);
        p.apply_damage(100);
        p.set_current_weapon(3);
        p.respawn(1.5);
        assert_eq!(p.health(), p.max_health);
        assert_eq!(p.current_weapon(), 0);
        assert_eq!(p.rotation, 1.5);
    }
}
