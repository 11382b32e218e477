//! The process-wide coordinator (§4.5): owns the client registry, the fixed
//! set of regions, and the database handle. A single multiplex task handles
//! registration/deregistration/global-broadcast exactly as specified; the
//! rest of the Hub's duties (account creation, login dedup, region join/
//! transfer, character persistence) are plain `async fn`s called directly
//! from whichever connection task needs them, since they touch nothing that
//! isn't already its own thread-safe container ([`KeyedMap`], an `RwLock`,
//! or a pooled DB connection).

use std::sync::RwLock;

use arcadia_schema::payload::{Message, Payload};
use arcadia_schema::weapon::{Gender, WeaponSlot};
use sqlx::PgPool;

use crate::db::models::CharacterRecord;
use crate::db::{queries, with_read_timeout, with_write_timeout};
use crate::error::{DbError, HubError};
use crate::grid::Cell;
use crate::keyed_map::KeyedMap;
use crate::player::Player;
use crate::prelude::*;
use crate::region::{spawn_region, ClientHandle, RegionHandle};

enum HubCommand {
    Add {
        id: u64,
        handle: ClientHandle,
    },
    Remove {
        id: u64,
    },
    Broadcast {
        sender_id: u64,
        payload: Payload,
    },
}

/// A cheaply-clonable handle to the Hub's multiplex task, for registration
/// and global broadcast (§4.5's `add`/`remove`/`broadcast` channels).
#[derive(Clone)]
struct HubMultiplex {
    cmd_tx: UnboundedSender<HubCommand>,
}

/// A character row plus its weapon loadout, as loaded for login.
pub struct LoadedCharacter {
    /// The character's persisted row.
    pub record: CharacterRecord,
    /// The character's 5 weapon slots, in slot order.
    pub weapons: [WeaponSlot; 5],
}

/// The outcome of successfully joining or switching into a region.
pub struct JoinOutcome {
    /// The region the player ended up in.
    pub region: RegionHandle,
    /// The cell the player was placed on.
    pub spawn_cell: Cell,
}

/// The process-wide singleton coordinator.
pub struct Hub {
    clients: KeyedMap<ClientHandle>,
    /// Last-known snapshot of every logged-in player, keyed by client id
    /// (§3's "Hub's shared player map"). Each connection is the sole writer
    /// of its own entry, re-inserting after every mutation it makes to its
    /// own `Player`; other connections only read it, to build `SpawnCharacter`
    /// for peers already in a region and to look up combat targets. Combat
    /// damage is the one exception and is applied here directly by the
    /// attacker's connection — see `apply_damage` and DESIGN.md (persistence
    /// of in-flight combat is an explicit Non-goal, so this snapshot staying
    /// ahead of a target's own live `Player` until their next tick is fine).
    players: KeyedMap<Player>,
    regions: HashMap<i32, RegionHandle>,
    username_to_client: RwLock<HashMap<String, u64>>,
    db: PgPool,
    /// Serializes `create_user` end to end, matching §4.5's
    /// "serialized by a process-wide mutex" note — the DB transaction alone
    /// doesn't protect the nickname-capitalization + uniqueness dance
    /// against two concurrent registrations racing each other.
    create_user_lock: tokio::sync::Mutex<()>,
    region_capacity: usize,
    multiplex: HubMultiplex,
}

impl Hub {
    /// Builds the Hub and its fixed region set, and spawns the multiplex task.
    ///
    /// The region set is static for the process lifetime (§3: "Hub owns
    /// regions... created at startup; lives for process lifetime"); two
    /// regions are seeded, matching the default character row's `region_id =
    /// 1` and the capacity scenario in §8 (S5) which exercises region 2.
    pub fn new(db: PgPool, region_capacity: usize) -> Arc<Self> {
        let mut regions = HashMap::new();
        regions.insert(1, spawn_region(1, "Town Square".to_owned(), 64, 64, Vec::new()));
        regions.insert(2, spawn_region(2, "Wilds".to_owned(), 64, 64, Vec::new()));

        let (cmd_tx, cmd_rx) = tokio::sync::mpsc::unbounded_channel();
        let hub = Arc::new(Self {
            clients: KeyedMap::new(),
            players: KeyedMap::new(),
            regions,
            username_to_client: RwLock::new(HashMap::new()),
            db,
            create_user_lock: tokio::sync::Mutex::new(()),
            region_capacity,
            multiplex: HubMultiplex { cmd_tx },
        });

        tokio::spawn(run_multiplex(hub.clone(), cmd_rx));
        hub
    }

    /// A region by id, if it exists.
    pub fn region(&self, id: i32) -> Option<RegionHandle> {
        self.regions.get(&id).cloned()
    }

    /// Registers a freshly connected client's delivery endpoints, returning
    /// its hub-assigned id and a [`ClientHandle`] embedding that id
    /// (§4.5's `add` channel; §4.1's "ids never reused").
    pub fn register_client(&self, send: BoundedSender<Message>, processing: BoundedSender<Message>) -> (u64, ClientHandle) {
        let id = self.clients.reserve_id();
        let handle = ClientHandle::new(id, send, processing);
        if self.multiplex.cmd_tx.send(HubCommand::Add { id, handle: handle.clone() }).is_err() {
            error!("hub multiplex task is gone, registering client directly");
            self.clients.add(handle.clone(), Some(id));
        }
        (id, handle)
    }

    /// Deregisters `id` (§4.5's `remove` channel). Fire-and-forget: the
    /// caller's own cleanup doesn't depend on this having completed.
    pub fn remove_client(&self, id: u64) {
        let _ = self.multiplex.cmd_tx.send(HubCommand::Remove { id });
    }

    /// A client's relay handle, if still registered.
    pub fn get_client(&self, id: u64) -> Option<ClientHandle> {
        self.clients.get(id)
    }

    /// Publishes `player`'s latest state to the shared player map, so other
    /// connections can build `SpawnCharacter` packets for it.
    pub fn sync_player(&self, id: u64, player: Player) {
        self.players.add(player, Some(id));
    }

    /// A snapshot of `id`'s last-published player state, if still logged in.
    pub fn get_player_snapshot(&self, id: u64) -> Option<Player> {
        self.players.get(id)
    }

    /// Removes `id` from the shared player map on logout/disconnect.
    pub fn remove_player_snapshot(&self, id: u64) {
        self.players.remove(id);
    }

    /// Applies `amount` of damage to `target_id`'s shared snapshot on behalf
    /// of whichever connection reported the hit, returning the target's
    /// remaining health and whether this killed them. `None` if the target
    /// isn't (or is no longer) logged in.
    pub fn apply_damage(&self, target_id: u64, amount: u32) -> Option<(u32, bool)> {
        let mut target = self.players.get(target_id)?;
        let died = target.apply_damage(amount);
        let remaining = target.health();
        self.players.add(target, Some(target_id));
        Some((remaining, died))
    }

    /// Forwards `payload` to every other registered client (§4.5's
    /// `broadcast` channel).
    pub fn broadcast_global(&self, sender_id: u64, payload: Payload) {
        let _ = self.multiplex.cmd_tx.send(HubCommand::Broadcast { sender_id, payload });
    }

    /// Number of accounts currently logged in, for `ServerMetrics`.
    pub fn connected_accounts(&self) -> u32 {
        self.username_to_client.read().unwrap().len() as u32
    }

    /// Whether `username` already has an active connection.
    pub fn is_already_connected(&self, username: &str) -> bool {
        self.username_to_client.read().unwrap().contains_key(username)
    }

    /// Records that `username` is now owned by `client_id`.
    pub fn register_username(&self, username: &str, client_id: u64) {
        self.username_to_client.write().unwrap().insert(username.to_owned(), client_id);
    }

    /// Frees `username` for reuse by a future login.
    pub fn unregister_username(&self, username: &str) {
        self.username_to_client.write().unwrap().remove(username);
    }

    /// Looks up an account by username (already lowercased by the caller).
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<crate::db::models::UserRecord>, DbError> {
        with_read_timeout(queries::get_user_by_username(&self.db, username)).await
    }

    /// Looks up an account by nickname, used only for uniqueness checks.
    pub async fn get_user_by_nickname(&self, nickname: &str) -> Result<Option<crate::db::models::UserRecord>, DbError> {
        with_read_timeout(queries::get_user_by_nickname(&self.db, nickname)).await
    }

    /// Loads a character's full row plus its 5 weapon slots.
    pub async fn get_full_character_data(&self, character_id: i64) -> Result<LoadedCharacter, DbError> {
        let record = with_read_timeout(queries::get_full_character_data(&self.db, character_id))
            .await?
            .ok_or(DbError::Query(sqlx::Error::RowNotFound))?;
        let rows = with_read_timeout(queries::load_weapon_slots(&self.db, character_id)).await?;
        let mut weapons = arcadia_schema::weapon::default_weapon_slots();
        for row in rows {
            let idx = row.slot_index as usize;
            if idx < weapons.len() {
                weapons[idx] = WeaponSlot::from(row);
            }
        }
        Ok(LoadedCharacter { record, weapons })
    }

    /// Creates a brand-new account plus its default character row (§4.5).
    ///
    /// Serialized process-wide so two concurrent registrations can never
    /// both pass the uniqueness pre-checks the caller ran before calling in.
    pub async fn create_user(
        &self,
        username: &str,
        nickname: &str,
        password_hash: &str,
        gender: Gender,
    ) -> Result<i64, DbError> {
        let _guard = self.create_user_lock.lock().await;

        with_write_timeout(async {
            let mut tx = self.db.begin().await.map_err(DbError::Query)?;

            let user_id = queries::create_user(&mut tx, username, nickname, password_hash).await?;
            let character_id = queries::create_character(
                &mut tx,
                user_id,
                gender,
                1,
                1,
                0,
                0,
                crate::player::DEFAULT_MAX_HEALTH as i32,
                crate::player::DEFAULT_MAX_HEALTH as i32,
                crate::player::DEFAULT_SPEED as i16,
                0.0,
            )
            .await?;
            queries::set_user_character_id(&mut tx, user_id, character_id).await?;
            let slots = arcadia_schema::weapon::default_weapon_slots();
            queries::bulk_upsert_weapon_slots(&mut tx, character_id, &slots).await?;

            tx.commit().await.map_err(DbError::Query)?;
            Ok(user_id)
        })
        .await
    }

    /// Persists a player's full in-memory state (§4.5's `save_character`).
    pub async fn save_character(&self, player: &Player) -> Result<(), DbError> {
        with_write_timeout(async {
            let mut tx = self.db.begin().await.map_err(DbError::Query)?;
            let position = player.position.unwrap_or(Cell::new(0, 0));
            queries::update_full_character_data(
                &mut tx,
                player.character_id,
                player.region_id,
                player.map_id,
                position.x,
                position.z,
                player.health() as i32,
                player.max_health as i32,
                player.speed() as i16,
                player.rotation,
                player.current_weapon() as i16,
            )
            .await?;
            queries::bulk_upsert_weapon_slots(&mut tx, player.character_id, &player.weapons).await?;
            tx.commit().await.map_err(DbError::Query)?;
            Ok(())
        })
        .await
    }

    /// First spawn after login: places `player` into the region named by its
    /// own `region_id`, falling back to region 1 if no spawn cell is free
    /// there (§4.5, §7's "missing spawn cell" handling).
    pub fn join_region<'a>(
        &'a self,
        client_id: u64,
        handle: ClientHandle,
        player: &'a mut Player,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<JoinOutcome, HubError>> + Send + 'a>> {
        Box::pin(async move {
            let region = self
                .regions
                .get(&player.region_id)
                .cloned()
                .ok_or(HubError::UnknownRegion(player.region_id))?;

            let (start_x, start_z) = player.position.map(|c| (c.x, c.z)).unwrap_or((0, 0));
            let spawn = region
                .join(client_id, handle.clone(), start_x, start_z)
                .await
                .map_err(|_| HubError::RegionGone(player.region_id))?;

            match spawn {
                Some(cell) => {
                    player.position = Some(cell);
                    player.destination = Some(cell);
                    Ok(JoinOutcome { region, spawn_cell: cell })
                }
                None if player.region_id != 1 => {
                    warn!(region_id = player.region_id, "no spawn cell available, falling back to region 1");
                    player.region_id = 1;
                    player.map_id = 1;
                    self.join_region(client_id, handle, player).await
                }
                None => Err(HubError::NoSpawnCell(player.region_id)),
            }
        })
    }

    /// Transfers `player` to `(region_id, map_id)`, enforcing per-region
    /// capacity. Performs a synchronous handoff: the previous region's
    /// removal is awaited and confirmed before the new region's `join` is
    /// issued, replacing the teacher-flagged fixed sleep (§9 REDESIGN).
    pub async fn switch_region(
        &self,
        client_id: u64,
        handle: ClientHandle,
        player: &mut Player,
        region_id: i32,
        map_id: i32,
    ) -> Result<JoinOutcome, HubError> {
        let target = self.regions.get(&region_id).cloned().ok_or(HubError::UnknownRegion(region_id))?;
        let roster = target.roster().await.map_err(|_| HubError::RegionGone(region_id))?;
        if roster.len() >= self.region_capacity {
            return Err(HubError::RegionFull);
        }

        if let Some(previous) = self.regions.get(&player.region_id).cloned() {
            previous.broadcast(client_id, Payload::ClientLeft { nickname: player.name.clone() });
            previous.remove(client_id).await.map_err(|_| HubError::RegionGone(player.region_id))?;
        }

        player.region_id = region_id;
        player.map_id = map_id;
        player.position = None;
        self.join_region(client_id, handle, player).await
    }
}

async fn run_multiplex(hub: Arc<Hub>, mut cmd_rx: UnboundedReceiver<HubCommand>) {
    info!("hub multiplex task started");
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            HubCommand::Add { id, handle } => {
                hub.clients.add(handle, Some(id));
            }
            HubCommand::Remove { id } => {
                hub.clients.remove(id);
            }
            HubCommand::Broadcast { sender_id, payload } => {
                hub.clients.for_each(|id, handle| {
                    if id != sender_id {
                        handle.enqueue_for_processing(sender_id, payload.clone());
                    }
                });
            }
        }
    }
    info!("hub multiplex task shutting down, command channel closed");
}
