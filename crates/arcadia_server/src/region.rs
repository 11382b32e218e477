//! An independent area: its occupancy grid, pathfinder, and client roster (§4.6).
//!
//! A region runs as a single multiplex task owning its [`Grid`] exclusively —
//! no other task ever touches cell occupancy directly. Connections reach a
//! region only through its [`RegionHandle`], which is cheap to clone and safe
//! to hand to the Hub and to every connection that joins.

use arcadia_schema::payload::{Message, Payload};

use crate::error::RegionError;
use crate::grid::{Cell, Grid};
use crate::keyed_map::KeyedMap;
use crate::prelude::*;

/// A registered client's delivery endpoints, as seen by a region (and the Hub).
///
/// Two queues, matching §4.4: `send` carries frames destined straight for the
/// wire (used by `relay_packet`), `processing` carries payloads that must be
/// re-entered through the owning connection's state machine (used by
/// broadcasts and peer relays per §9's resolution of the processing-queue
/// question).
#[derive(Clone)]
pub struct ClientHandle {
    /// The client's Hub-assigned id.
    pub id: u64,
    send: BoundedSender<Message>,
    processing: BoundedSender<Message>,
}

impl ClientHandle {
    /// Builds a handle from a connection's two queue senders.
    pub fn new(id: u64, send: BoundedSender<Message>, processing: BoundedSender<Message>) -> Self {
        Self { id, send, processing }
    }

    /// Enqueues a frame for direct transmission, dropping it with a warning
    /// if the send queue is full (§4.4's sole back-pressure mechanism).
    pub fn relay(&self, sender_id: u64, payload: Payload) {
        let msg = Message { sender_id, payload };
        if self.send.try_send(msg).is_err() {
            warn!(client_id = self.id, "send queue full, dropping relayed packet");
        }
    }

    /// Enqueues a payload for re-processing through the owning connection's
    /// state machine, dropping it with a warning if the queue is full.
    pub fn enqueue_for_processing(&self, sender_id: u64, payload: Payload) {
        let msg = Message { sender_id, payload };
        if self.processing.try_send(msg).is_err() {
            warn!(client_id = self.id, "processing queue full, dropping packet");
        }
    }
}

/// The outcome of asking a region to step a client towards its destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepOutcome {
    /// The client's position after the step (unchanged if no step was taken).
    pub position: Cell,
    /// The previous position, before this step — used by the caller to
    /// recompute facing.
    pub previous: Cell,
    /// How many cells were actually walked this tick.
    pub steps_taken: usize,
}

enum RegionCommand {
    Remove {
        id: u64,
        reply: OneshotSender<()>,
    },
    Broadcast {
        sender_id: u64,
        payload: Payload,
    },
    Step {
        id: u64,
        destination: Cell,
        speed: u8,
        reply: OneshotSender<Option<StepOutcome>>,
    },
    /// Registers `id` and occupies the nearest free cell to `(start_x,
    /// start_z)` in one atomic actor step, so a concurrent join can never
    /// race for the same cell (§4.5/§4.6's join flow).
    Join {
        id: u64,
        handle: ClientHandle,
        start_x: i32,
        start_z: i32,
        reply: OneshotSender<Option<Cell>>,
    },
    RosterSnapshot {
        reply: OneshotSender<Vec<u64>>,
    },
    /// Places an already-registered client onto the nearest free cell to one
    /// of the region's respawn points (§4.7: "schedule a respawn at a region
    /// Respawner cell").
    Respawn {
        id: u64,
        reply: OneshotSender<Option<Cell>>,
    },
    /// Clamps `(x, z)` onto the grid and checks it against the live occupancy
    /// state, the way the original validates a requested destination against
    /// the region's own grid rather than a caller-local bounds check.
    ValidateDestination {
        x: i32,
        z: i32,
        reply: OneshotSender<Option<Cell>>,
    },
}

/// A cheaply-clonable reference to a running region actor.
#[derive(Clone)]
pub struct RegionHandle {
    /// The region's id, stable for the process lifetime.
    pub id: i32,
    /// Display name.
    pub name: String,
    /// Grid width in cells.
    pub width: i32,
    /// Grid height in cells.
    pub height: i32,
    cmd_tx: UnboundedSender<RegionCommand>,
}

impl RegionHandle {
    /// Deregisters `id`, clearing its grid cell first. Resolves only once
    /// the region has actually completed the removal, which is what lets the
    /// Hub's `switch_region` perform a synchronous handoff instead of the
    /// teacher's fixed sleep (§9 REDESIGN).
    pub async fn remove(&self, id: u64) -> Result<(), RegionError> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.cmd_tx
            .send(RegionCommand::Remove { id, reply })
            .map_err(|_| RegionError::Closed)?;
        rx.await.map_err(|_| RegionError::Closed)
    }

    /// Fans `payload` out to every other client currently in the region.
    pub fn broadcast(&self, sender_id: u64, payload: Payload) {
        let _ = self.cmd_tx.send(RegionCommand::Broadcast { sender_id, payload });
    }

    /// Asks the region to run one movement step for `id` towards `destination`
    /// at up to `speed` cells, per §4.7's movement tick algorithm. Returns
    /// `None` if `id` is not currently placed in this region's grid.
    pub async fn step(&self, id: u64, destination: Cell, speed: u8) -> Result<Option<StepOutcome>, RegionError> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.cmd_tx
            .send(RegionCommand::Step { id, destination, speed, reply })
            .map_err(|_| RegionError::Closed)?;
        rx.await.map_err(|_| RegionError::Closed)
    }

    /// Registers `id` and places it on the nearest free cell to `(start_x,
    /// start_z)`, returning the cell it was placed on, or `None` if the
    /// region has no free cell at all (§4.5's `join_region`/`switch_region`
    /// fallback path).
    pub async fn join(&self, id: u64, handle: ClientHandle, start_x: i32, start_z: i32) -> Result<Option<Cell>, RegionError> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.cmd_tx
            .send(RegionCommand::Join { id, handle, start_x, start_z, reply })
            .map_err(|_| RegionError::Closed)?;
        rx.await.map_err(|_| RegionError::Closed)
    }

    /// A snapshot of every client id currently registered in the region.
    pub async fn roster(&self) -> Result<Vec<u64>, RegionError> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.cmd_tx
            .send(RegionCommand::RosterSnapshot { reply })
            .map_err(|_| RegionError::Closed)?;
        rx.await.map_err(|_| RegionError::Closed)
    }

    /// Moves an already-registered client to the nearest free cell to one of
    /// the region's configured respawn points, returning the cell it landed
    /// on, or `None` if no free cell could be found there either.
    pub async fn respawn(&self, id: u64) -> Result<Option<Cell>, RegionError> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.cmd_tx.send(RegionCommand::Respawn { id, reply }).map_err(|_| RegionError::Closed)?;
        rx.await.map_err(|_| RegionError::Closed)
    }

    /// Clamps `(x, z)` onto the grid via `local_to_map` and accepts it only if
    /// the resulting cell is both reachable and unoccupied (§4.2/§4.7's
    /// definition of a "valid" destination). Returns `None` if the clamped
    /// cell is not valid.
    pub async fn validate_destination(&self, x: i32, z: i32) -> Result<Option<Cell>, RegionError> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.cmd_tx
            .send(RegionCommand::ValidateDestination { x, z, reply })
            .map_err(|_| RegionError::Closed)?;
        rx.await.map_err(|_| RegionError::Closed)
    }
}

/// Spawns a region's multiplex task and returns a handle to it.
///
/// `respawners` are the candidate cells a dead player may be respawned at;
/// an empty list falls back to the region's default spawn search.
pub fn spawn_region(id: i32, name: String, width: i32, height: i32, respawners: Vec<Cell>) -> RegionHandle {
    let (cmd_tx, cmd_rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = RegionHandle { id, name: name.clone(), width, height, cmd_tx };

    tokio::spawn(run_region(id, name, Grid::new_open(width, height), respawners, cmd_rx));

    handle
}

async fn run_region(
    id: i32,
    name: String,
    mut grid: Grid,
    respawners: Vec<Cell>,
    mut cmd_rx: tokio::sync::mpsc::UnboundedReceiver<RegionCommand>,
) {
    let clients: KeyedMap<ClientHandle> = KeyedMap::new();
    info!(region_id = id, region_name = %name, "region task started");

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            RegionCommand::Remove { id: client_id, reply } => {
                grid.set_object(client_id, None);
                clients.remove(client_id);
                let _ = reply.send(());
            }
            RegionCommand::Broadcast { sender_id, payload } => {
                clients.for_each(|client_id, handle| {
                    if client_id != sender_id {
                        handle.enqueue_for_processing(sender_id, payload.clone());
                    }
                });
            }
            RegionCommand::Step { id: client_id, destination, speed, reply } => {
                let outcome = step_towards(&mut grid, client_id, destination, speed);
                let _ = reply.send(outcome);
            }
            RegionCommand::Join { id: client_id, handle, start_x, start_z, reply } => {
                let cell = grid.get_spawn_cell(start_x, start_z);
                if let Some(cell) = cell {
                    grid.set_object(client_id, Some(cell));
                    clients.add(handle, Some(client_id));
                }
                let _ = reply.send(cell);
            }
            RegionCommand::RosterSnapshot { reply } => {
                let mut ids = Vec::new();
                clients.for_each(|client_id, _| ids.push(client_id));
                let _ = reply.send(ids);
            }
            RegionCommand::Respawn { id: client_id, reply } => {
                let anchor = respawners.first().copied().unwrap_or(Cell::new(0, 0));
                let cell = grid.get_spawn_cell(anchor.x, anchor.z);
                if let Some(cell) = cell {
                    grid.set_object(client_id, Some(cell));
                }
                let _ = reply.send(cell);
            }
            RegionCommand::ValidateDestination { x, z, reply } => {
                let cell = grid.local_to_map(x, z);
                let _ = reply.send(if grid.is_cell_valid(cell) { Some(cell) } else { None });
            }
        }
    }

    info!(region_id = id, "region task shutting down, command channel closed");
}

/// One movement tick's worth of A*-guided walking, per §4.7.
///
/// Runs A* from the client's current cell to `destination`, then walks up to
/// `min(pathLength - 1, speed)` cells, stopping early the moment a step's
/// next cell is no longer valid (another occupant may have claimed it since
/// the path was computed).
fn step_towards(grid: &mut Grid, id: u64, destination: Cell, speed: u8) -> Option<StepOutcome> {
    let start = grid.position_of(id)?;
    if start == destination {
        return None;
    }

    let path = grid.a_star(start, destination);
    if path.len() < 2 {
        return Some(StepOutcome { position: start, previous: start, steps_taken: 0 });
    }

    let max_steps = (path.len() - 1).min(speed as usize);
    let mut current = start;
    let mut steps_taken = 0;
    for next in path.iter().skip(1).take(max_steps) {
        if !grid.is_cell_valid(*next) {
            break;
        }
        grid.set_object(id, Some(*next));
        current = *next;
        steps_taken += 1;
    }

    Some(StepOutcome { position: current, previous: start, steps_taken })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_step_and_remove_round_trip() {
        let region = spawn_region(1, "Test Plains".to_owned(), 10, 10, Vec::new());
        let (send_tx, _send_rx) = tokio::sync::mpsc::channel(8);
        let (proc_tx, _proc_rx) = tokio::sync::mpsc::channel(8);
        let handle = ClientHandle::new(1, send_tx, proc_tx);

        let spawned = region.join(1, handle, 0, 0).await.unwrap();
        assert_eq!(spawned, Some(Cell::new(0, 0)));

        let roster = region.roster().await.unwrap();
        assert_eq!(roster, vec![1]);

        let outcome = region.step(1, Cell::new(3, 0), 2).await.unwrap().unwrap();
        assert_eq!(outcome.steps_taken, 2);
        assert_eq!(outcome.position, Cell::new(2, 0));

        region.remove(1).await.unwrap();
        let roster = region.roster().await.unwrap();
        assert!(roster.is_empty());
    }

    #[test]
    fn step_towards_walks_up_to_speed_cells() {
        let mut grid = Grid::new_open(10, 1);
        grid.set_object(1, Some(Cell::new(0, 0)));
        let outcome = step_towards(&mut grid, 1, Cell::new(5, 0), 3).unwrap();
        assert_eq!(outcome.steps_taken, 3);
        assert_eq!(outcome.position, Cell::new(3, 0));
        assert_eq!(grid.position_of(1), Some(Cell::new(3, 0)));
    }

    #[test]
    fn step_towards_stops_when_already_at_destination() {
        let mut grid = Grid::new_open(10, 1);
        grid.set_object(1, Some(Cell::new(2, 0)));
        let outcome = step_towards(&mut grid, 1, Cell::new(2, 0), 3);
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn validate_destination_clamps_out_of_bounds_requests() {
        let region = spawn_region(2, "Clamp Test".to_owned(), 64, 64, Vec::new());
        let cell = region.validate_destination(9999, 0).await.unwrap();
        assert_eq!(cell, Some(Cell::new(63, 0)));
    }

    #[tokio::test]
    async fn validate_destination_rejects_an_occupied_cell() {
        let region = spawn_region(3, "Occupied Test".to_owned(), 10, 10, Vec::new());
        let (send_tx, _send_rx) = tokio::sync::mpsc::channel(8);
        let (proc_tx, _proc_rx) = tokio::sync::mpsc::channel(8);
        let handle = ClientHandle::new(1, send_tx, proc_tx);
        region.join(1, handle, 5, 5).await.unwrap();

        let cell = region.validate_destination(5, 5).await.unwrap();
        assert_eq!(cell, None);
    }

    #[test]
    fn step_towards_reports_zero_steps_when_path_is_blocked() {
        let mut grid = Grid::new_open(3, 1);
        grid.set_object(1, Some(Cell::new(0, 0)));
        grid.set_object(2, Some(Cell::new(1, 0)));
        let outcome = step_towards(&mut grid, 1, Cell::new(2, 0), 3).unwrap();
        assert_eq!(outcome.steps_taken, 0);
        assert_eq!(outcome.position, Cell::new(0, 0));
    }
}
