//! The `Game` state (§4.7): a logged-in, placed-in-a-region player. Owns the
//! live [`Player`] and the per-client movement ticker.

use std::time::Duration;

use arcadia_schema::payload::{Payload, Position};
use tokio::sync::Mutex as AsyncMutex;

use crate::client::Connection;
use crate::error::HubError;
use crate::grid::Cell;
use crate::hub::JoinOutcome;
use crate::player::{Player, MAX_SPEED};
use crate::prelude::*;
use crate::region::RegionHandle;

use super::ClientState;

/// Cadence of the per-client movement ticker (§4.7).
const PLAYER_MOVE_TICK: Duration = Duration::from_millis(500);
/// Delay before a dead player is respawned (§4.7's "short delay").
const RESPAWN_DELAY: Duration = Duration::from_secs(3);
/// Flat damage dealt by `ReportPlayerDamage`, before the critical multiplier
/// (§4.7: "base 5, x2 on critical" — a placeholder pending real weapon
/// damage tables, as the spec's combat section notes).
const BASE_DAMAGE: u32 = 5;

/// The Game state's private data.
pub struct GameState {
    player: Arc<AsyncMutex<Player>>,
    cancel_movement: Option<OneshotSender<()>>,
}

/// Joins the region named by the player's stored `region_id`, announces
/// their arrival, catches the new arrival up on everyone already there, and
/// starts the movement ticker.
pub async fn enter(conn: &mut Connection, mut player: Player) -> GameState {
    match conn.hub.join_region(conn.id, conn.handle.clone(), &mut player).await {
        Ok(JoinOutcome { region, spawn_cell: _ }) => {
            conn.region = Some(region.clone());
            conn.send_packet(Payload::RegionData { region_id: player.region_id, width: region.width, height: region.height });

            conn.hub.sync_player(conn.id, player.clone());

            let own_spawn = spawn_payload_for(conn.id, &player);
            conn.broadcast(own_spawn.clone());
            conn.broadcast(Payload::ClientEntered { nickname: player.name.clone() });
            conn.send_packet(own_spawn);

            if let Ok(roster) = region.roster().await {
                for peer_id in roster {
                    if peer_id == conn.id {
                        continue;
                    }
                    if let Some(peer) = conn.hub.get_player_snapshot(peer_id) {
                        conn.send_packet(spawn_payload_for(peer_id, &peer));
                    }
                }
            }
        }
        Err(err) => {
            warn!(client_id = conn.id, error = %err, "failed to join region on login, player left in limbo");
        }
    }

    let player = Arc::new(AsyncMutex::new(player));
    let cancel_movement = Some(spawn_movement_ticker(conn.id, conn.clone_send_tx(), conn.region.clone(), conn.hub.clone(), player.clone()));

    GameState { player, cancel_movement }
}

impl GameState {
    /// A clone of the live player's current state, for callers outside this
    /// module (the connection's close path) that need to persist or
    /// announce it without reaching into this state's private fields.
    pub async fn snapshot(&self) -> Player {
        self.player.lock().await.clone()
    }
}

/// Stops the movement ticker and removes the player from the Hub's shared
/// player map (§4.7's exit actions).
pub fn exit(conn: &mut Connection, state: &mut GameState) {
    if let Some(cancel) = state.cancel_movement.take() {
        let _ = cancel.send(());
    }
    conn.hub.remove_player_snapshot(conn.id);
}

pub async fn handle_packet(conn: &mut Connection, state: &mut GameState, sender_id: u64, payload: Payload) -> Option<ClientState> {
    if sender_id != conn.id {
        conn.send_packet_as(sender_id, payload);
        return None;
    }

    match payload {
        Payload::PublicMessage { text } => {
            conn.broadcast(Payload::PublicMessage { text });
        }
        Payload::Heartbeat => conn.send_packet(Payload::Heartbeat),
        Payload::Destination { x, z } => handle_destination(conn, state, x, z).await,
        Payload::UpdateSpeed { speed } => handle_update_speed(conn, state, speed).await,
        Payload::JoinRegionRequest { region_id } => return handle_join_region_request(conn, state, region_id).await,
        Payload::LogoutRequest => return Some(handle_logout(conn, state).await),
        Payload::ChatBubble { is_active } => conn.broadcast(Payload::ChatBubble { is_active }),
        Payload::SwitchWeapon { slot } => handle_switch_weapon(conn, state, slot).await,
        Payload::ReloadWeapon { slot, amount } => handle_reload_weapon(conn, state, slot, amount).await,
        Payload::RaiseWeapon => conn.broadcast(Payload::RaiseWeapon),
        Payload::LowerWeapon => conn.broadcast(Payload::LowerWeapon),
        Payload::RotateCharacter { rotation_y } => handle_rotate(conn, state, rotation_y).await,
        Payload::ToggleFireMode => handle_toggle_fire_mode(conn, state).await,
        Payload::FireWeapon { x, y, z } => conn.broadcast(Payload::FireWeapon { x, y, z }),
        Payload::StartFiringWeapon => conn.broadcast(Payload::StartFiringWeapon),
        Payload::StopFiringWeapon => conn.broadcast(Payload::StopFiringWeapon),
        Payload::ReportPlayerDamage { target_id, is_critical, x, y, z } => handle_report_damage(conn, target_id, is_critical, x, y, z).await,
        _ => {}
    }

    None
}

async fn handle_destination(conn: &Connection, state: &GameState, x: i32, z: i32) {
    let region = match &conn.region {
        Some(region) => region,
        None => return,
    };
    // The region owns the grid; ask it to clamp (x, z) via local_to_map and
    // gate on reachability/occupancy rather than bounds-checking locally.
    let target = match region.validate_destination(x, z).await {
        Ok(Some(cell)) => cell,
        Ok(None) | Err(_) => return,
    };
    let mut player = state.player.lock().await;
    if player.destination == Some(target) {
        return;
    }
    player.destination = Some(target);
}

async fn handle_update_speed(conn: &Connection, state: &GameState, speed: u8) {
    let clamped = speed.min(MAX_SPEED);
    let mut player = state.player.lock().await;
    player.set_speed(clamped);
    let echoed = player.speed();
    let player_snapshot = player.clone();
    drop(player);
    conn.hub.sync_player(conn.id, player_snapshot);
    conn.broadcast(Payload::UpdateSpeed { speed: echoed });
    conn.send_packet(Payload::UpdateSpeed { speed: echoed });
}

async fn handle_rotate(conn: &Connection, state: &GameState, rotation_y: f32) {
    let mut player = state.player.lock().await;
    player.rotation = rotation_y;
    let player_snapshot = player.clone();
    drop(player);
    conn.hub.sync_player(conn.id, player_snapshot);
    conn.broadcast(Payload::RotateCharacter { rotation_y });
}

async fn handle_switch_weapon(conn: &Connection, state: &GameState, slot: u8) {
    let mut player = state.player.lock().await;
    if (slot as usize) >= crate::player::WEAPON_SLOT_COUNT || player.weapons[slot as usize].is_empty() {
        return;
    }
    player.set_current_weapon(slot);
    let player_snapshot = player.clone();
    drop(player);
    conn.hub.sync_player(conn.id, player_snapshot);
    conn.broadcast(Payload::SwitchWeapon { slot });
    conn.send_packet(Payload::SwitchWeapon { slot });
}

async fn handle_reload_weapon(conn: &Connection, state: &GameState, slot: u8, amount: u32) {
    let mut player = state.player.lock().await;
    if let Some(weapon) = player.weapons.get_mut(slot as usize) {
        let moved = amount.min(weapon.reserve_ammo);
        weapon.ammo += moved;
        weapon.reserve_ammo -= moved;
    }
    let player_snapshot = player.clone();
    drop(player);
    conn.hub.sync_player(conn.id, player_snapshot);
    conn.broadcast(Payload::ReloadWeapon { slot, amount });
    conn.send_packet(Payload::ReloadWeapon { slot, amount });
}

async fn handle_toggle_fire_mode(conn: &Connection, state: &GameState) {
    let mut player = state.player.lock().await;
    let slot = player.current_weapon() as usize;
    if let Some(weapon) = player.weapons.get_mut(slot) {
        weapon.fire_mode = match weapon.fire_mode {
            arcadia_schema::weapon::FireMode::SemiAuto => arcadia_schema::weapon::FireMode::FullAuto,
            arcadia_schema::weapon::FireMode::FullAuto => arcadia_schema::weapon::FireMode::SemiAuto,
        };
    }
    let player_snapshot = player.clone();
    drop(player);
    conn.hub.sync_player(conn.id, player_snapshot);
    conn.broadcast(Payload::ToggleFireMode);
}

async fn handle_report_damage(conn: &Connection, target_id: u64, is_critical: bool, x: f32, y: f32, z: f32) {
    let _ = (x, y, z);
    let amount = if is_critical { BASE_DAMAGE * 2 } else { BASE_DAMAGE };

    let Some((remaining_health, died)) = conn.hub.apply_damage(target_id, amount) else {
        return;
    };

    let payload = Payload::ApplyPlayerDamage { target_id, amount, remaining_health, is_critical };
    conn.send_packet(payload.clone());
    conn.broadcast(payload);

    if died {
        conn.broadcast(Payload::PlayerDied { id: target_id });
        conn.send_packet(Payload::PlayerDied { id: target_id });
        if let Some(region) = conn.region.clone() {
            let hub = conn.hub.clone();
            tokio::spawn(async move {
                tokio::time::sleep(RESPAWN_DELAY).await;
                if let Some(mut player) = hub.get_player_snapshot(target_id) {
                    player.respawn(player.rotation);
                    if let Ok(Some(cell)) = region.respawn(target_id).await {
                        player.position = Some(cell);
                        player.destination = Some(cell);
                    }
                    hub.sync_player(target_id, player.clone());
                    region.broadcast(target_id, spawn_payload_for(target_id, &player));
                    if let Some(client) = hub.get_client(target_id) {
                        client.relay(target_id, spawn_payload_for(target_id, &player));
                    }
                }
            });
        }
    }
}

async fn handle_join_region_request(conn: &mut Connection, state: &mut GameState, region_id: i32) -> Option<ClientState> {
    let mut player = state.player.lock().await;
    let saved_rotation = player.rotation;

    match conn.hub.switch_region(conn.id, conn.handle.clone(), &mut *player, region_id, region_id).await {
        Ok(JoinOutcome { region, spawn_cell: _ }) => {
            player.rotation = saved_rotation;
            conn.region = Some(region.clone());
            conn.send_packet(Payload::RegionData { region_id: player.region_id, width: region.width, height: region.height });

            let snapshot = player.clone();
            drop(player);
            conn.hub.sync_player(conn.id, snapshot.clone());

            let own_spawn = spawn_payload_for(conn.id, &snapshot);
            conn.broadcast(own_spawn.clone());
            conn.broadcast(Payload::ClientEntered { nickname: snapshot.name.clone() });
            conn.send_packet(own_spawn);

            if let Ok(roster) = region.roster().await {
                for peer_id in roster {
                    if peer_id == conn.id {
                        continue;
                    }
                    if let Some(peer) = conn.hub.get_player_snapshot(peer_id) {
                        conn.send_packet(spawn_payload_for(peer_id, &peer));
                    }
                }
            }
        }
        Err(err) => {
            drop(player);
            warn!(client_id = conn.id, error = %err, "region switch failed");
            let reason = match err {
                HubError::RegionFull => "That region is full".to_owned(),
                _ => "Unable to switch regions".to_owned(),
            };
            conn.send_packet(Payload::RequestDenied { reason });
        }
    }

    None
}

async fn handle_logout(conn: &mut Connection, state: &mut GameState) -> ClientState {
    let player_snapshot = state.player.lock().await.clone();

    conn.broadcast(Payload::ClientLeft { nickname: player_snapshot.name.clone() });
    if let Err(err) = conn.hub.save_character(&player_snapshot).await {
        warn!(client_id = conn.id, error = %err, "failed to persist character on logout");
    }

    if let Some(region) = conn.region.take() {
        let _ = region.remove(conn.id).await;
    }
    if let Some(username) = conn.account_username.take() {
        conn.hub.unregister_username(&username);
    }
    conn.character_id = 0;

    // `states::dispatch` runs this state's `exit` once it sees the
    // transition below, so the movement ticker and shared-map cleanup
    // happen exactly once, after this function returns.
    ClientState::Authentication(super::authentication::enter(conn).await)
}

fn spawn_payload_for(id: u64, player: &Player) -> Payload {
    let position = player.position.map(|c| Position::new(c.x, c.z)).unwrap_or_default();
    Payload::SpawnCharacter {
        id,
        name: player.name.clone(),
        position,
        rotation_y: player.rotation,
        gender: player.gender,
        speed: player.speed(),
        health: player.health(),
        max_health: player.max_health,
        current_weapon: player.current_weapon(),
        weapons: player.weapons.clone(),
    }
}

fn spawn_movement_ticker(id: u64, send_tx: BoundedSender<arcadia_schema::payload::Message>, region: Option<RegionHandle>, hub: Arc<crate::hub::Hub>, player: Arc<AsyncMutex<Player>>) -> OneshotSender<()> {
    let (cancel_tx, mut cancel_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let Some(region) = region else { return };
        let mut interval = tokio::time::interval(PLAYER_MOVE_TICK);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    movement_tick(id, &send_tx, &region, &hub, &player).await;
                }
                _ = &mut cancel_rx => break,
            }
        }
    });

    cancel_tx
}

async fn movement_tick(id: u64, send_tx: &BoundedSender<arcadia_schema::payload::Message>, region: &RegionHandle, hub: &Arc<crate::hub::Hub>, player: &Arc<AsyncMutex<Player>>) {
    let (destination, speed, rotation) = {
        let player = player.lock().await;
        match (player.position, player.destination) {
            (Some(position), Some(destination)) if position != destination => (destination, player.speed(), player.rotation),
            _ => return,
        }
    };

    let outcome = match region.step(id, destination, speed).await {
        Ok(Some(outcome)) => outcome,
        _ => return,
    };

    if outcome.steps_taken == 0 {
        let mut player = player.lock().await;
        player.destination = None;
        return;
    }

    let new_rotation = Player::calculate_rotation(outcome.previous, outcome.position, rotation);
    let snapshot = {
        let mut player = player.lock().await;
        player.position = Some(outcome.position);
        player.rotation = new_rotation;
        player.clone()
    };
    hub.sync_player(id, snapshot);

    let payload = Payload::MoveCharacter { position: Position::new(outcome.position.x, outcome.position.z) };
    region.broadcast(id, payload.clone());
    let _ = send_tx.try_send(arcadia_schema::payload::Message { sender_id: id, payload });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_payload_defaults_position_when_unplaced() {
        let player = Player::new_for_test(7);
        let payload = spawn_payload_for(7, &player);
        match payload {
            Payload::SpawnCharacter { id, position, current_weapon, .. } => {
                assert_eq!(id, 7);
                assert_eq!(position, Position::default());
                assert_eq!(current_weapon, 0);
            }
            _ => panic!("expected SpawnCharacter"),
        }
    }

    #[test]
    fn spawn_payload_carries_the_placed_position() {
        let mut player = Player::new_for_test(3);
        player.position = Some(Cell::new(5, 9));
        let payload = spawn_payload_for(3, &player);
        match payload {
            Payload::SpawnCharacter { position, .. } => assert_eq!(position, Position::new(5, 9)),
            _ => panic!("expected SpawnCharacter"),
        }
    }
}
