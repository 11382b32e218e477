//! The 2D occupancy grid and its A* pathfinder (§4.2).
//!
//! A grid owns its cells outright; players are referenced by cells only
//! through their `u64` client id, never by value or by strong pointer — the
//! actual [`crate::player::Player`] lives in the connection that owns it, and
//! the grid keeps its own reverse `id -> Cell` index rather than reaching
//! into a `Player` to update it. This keeps the back-reference from [`Cell`]
//! to its occupant non-owning without `Weak`/`Rc` machinery that would fight
//! the rest of the async, `Send`-everywhere design (§9, "Back-references
//! without cycles"); the region actor is left to mirror the result onto its
//! `Player`'s own `position` field after the fact (see `region.rs`).

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// A single square of a region's grid, addressable as `(x, z)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Cell {
    /// X coordinate, `0 <= x < grid.width()`.
    pub x: i32,
    /// Z coordinate, `0 <= z < grid.height()`.
    pub z: i32,
}

impl Cell {
    /// Shorthand constructor.
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    fn chebyshev(self, other: Cell) -> i32 {
        (self.x - other.x).abs().max((self.z - other.z).abs())
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct CellData {
    reachable: bool,
    occupant: Option<u64>,
}

/// An independent region's occupancy grid.
///
/// Invariants maintained by construction: a cell's `occupant`, if present,
/// always names a player whose `position` equals that cell; a player's
/// `position` is either `None` or a cell of this grid; a cell holds at most
/// one occupant.
pub struct Grid {
    width: i32,
    height: i32,
    cells: Vec<CellData>,
    positions: HashMap<u64, Cell>,
}

impl Grid {
    /// Creates a grid of the given size with every cell reachable and empty.
    pub fn new_open(width: i32, height: i32) -> Self {
        assert!(width > 0 && height > 0, "grid dimensions must be positive");
        Self {
            width,
            height,
            cells: vec![CellData { reachable: true, occupant: None }; (width * height) as usize],
            positions: HashMap::new(),
        }
    }

    /// Grid width in cells.
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Grid height in cells.
    pub fn height(&self) -> i32 {
        self.height
    }

    fn index_of(&self, c: Cell) -> Option<usize> {
        if c.x < 0 || c.z < 0 || c.x >= self.width || c.z >= self.height {
            None
        } else {
            Some((c.z * self.width + c.x) as usize)
        }
    }

    /// Marks a cell as permanently unreachable (terrain).
    pub fn set_unreachable(&mut self, c: Cell) {
        if let Some(idx) = self.index_of(c) {
            self.cells[idx].reachable = false;
        }
    }

    /// Clamps an arbitrary coordinate pair to the nearest in-bounds cell.
    pub fn local_to_map(&self, x: i32, z: i32) -> Cell {
        Cell::new(x.clamp(0, self.width - 1), z.clamp(0, self.height - 1))
    }

    /// Whether `c` is in-bounds and not marked as terrain-blocked.
    pub fn is_cell_reachable(&self, c: Cell) -> bool {
        self.index_of(c).map(|i| self.cells[i].reachable).unwrap_or(false)
    }

    /// Whether `c` is in-bounds and has no occupant.
    pub fn is_cell_available(&self, c: Cell) -> bool {
        self.index_of(c).map(|i| self.cells[i].occupant.is_none()).unwrap_or(false)
    }

    /// Reachable AND available.
    pub fn is_cell_valid(&self, c: Cell) -> bool {
        self.is_cell_reachable(c) && self.is_cell_available(c)
    }

    /// The occupant of `c`, if any.
    pub fn occupant_at(&self, c: Cell) -> Option<u64> {
        self.index_of(c).and_then(|i| self.cells[i].occupant)
    }

    /// Finds the nearest reachable-and-available cell to `(start_x, start_z)`,
    /// spiraling outward in concentric rings scanned in row-major order.
    /// Returns `None` once the spiral has covered every cell in the grid
    /// without finding one.
    pub fn get_spawn_cell(&self, start_x: i32, start_z: i32) -> Option<Cell> {
        let start = self.local_to_map(start_x, start_z);
        if self.is_cell_valid(start) {
            return Some(start);
        }
        let max_radius = self.width.max(self.height);
        for radius in 1..=max_radius {
            for dz in -radius..=radius {
                for dx in -radius..=radius {
                    if dx.abs().max(dz.abs()) != radius {
                        continue;
                    }
                    let candidate = Cell::new(start.x + dx, start.z + dz);
                    if self.index_of(candidate).is_some() && self.is_cell_valid(candidate) {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }

    /// All valid cells in the `(2*size+1)^2` square centered on `c`, excluding `c` itself.
    pub fn get_neighbors(&self, c: Cell, size: i32) -> Vec<Cell> {
        let mut out = Vec::new();
        for dz in -size..=size {
            for dx in -size..=size {
                if dx == 0 && dz == 0 {
                    continue;
                }
                let candidate = Cell::new(c.x + dx, c.z + dz);
                if self.index_of(candidate).is_some() && self.is_cell_valid(candidate) {
                    out.push(candidate);
                }
            }
        }
        out
    }

    /// The cell `id` currently occupies, if any.
    pub fn position_of(&self, id: u64) -> Option<Cell> {
        self.positions.get(&id).copied()
    }

    /// Places `id` at `target`, or frees its current cell if `target` is `None`.
    ///
    /// Removes the occupant from its previous cell first, so moving within
    /// the same grid never leaves a stale occupant reference behind.
    pub fn set_object(&mut self, id: u64, target: Option<Cell>) {
        if let Some(prev) = self.positions.remove(&id) {
            if let Some(idx) = self.index_of(prev) {
                if self.cells[idx].occupant == Some(id) {
                    self.cells[idx].occupant = None;
                }
            }
        }
        if let Some(target) = target {
            if let Some(idx) = self.index_of(target) {
                self.cells[idx].occupant = Some(id);
            }
            self.positions.insert(id, target);
        }
    }

    /// 8-connected A* from `start` to `goal`.
    ///
    /// Refuses to path through occupied cells (§9: "A* refuses to path
    /// through occupied cells" — intentional and preserved as specified).
    /// Returns the path inclusive of both endpoints, or an empty vector if
    /// no path exists.
    pub fn a_star(&self, start: Cell, goal: Cell) -> Vec<Cell> {
        if start == goal {
            return vec![start];
        }
        if self.index_of(start).is_none() || self.index_of(goal).is_none() {
            return Vec::new();
        }

        let mut open_heap: BinaryHeap<HeapEntry> = BinaryHeap::new();
        let mut g_score: HashMap<Cell, i32> = HashMap::new();
        let mut came_from: HashMap<Cell, Cell> = HashMap::new();
        let mut closed: HashSet<Cell> = HashSet::new();
        let mut insertion_seq: u64 = 0;

        g_score.insert(start, 0);
        open_heap.push(HeapEntry {
            f_score: heuristic(start, goal),
            insertion_seq,
            cell: start,
        });

        while let Some(HeapEntry { cell: current, .. }) = open_heap.pop() {
            if current == goal {
                return reconstruct_path(&came_from, start, goal);
            }
            if closed.contains(&current) {
                continue;
            }
            closed.insert(current);

            for dz in -1..=1 {
                for dx in -1..=1 {
                    if dx == 0 && dz == 0 {
                        continue;
                    }
                    let neighbor = Cell::new(current.x + dx, current.z + dz);
                    if closed.contains(&neighbor)
                        || !self.is_cell_reachable(neighbor)
                        || !self.is_cell_available(neighbor)
                    {
                        continue;
                    }

                    let step_cost = if dx != 0 && dz != 0 { 14 } else { 10 };
                    let tentative_g = g_score.get(&current).copied().unwrap_or(i32::MAX / 2) + step_cost;
                    if tentative_g < g_score.get(&neighbor).copied().unwrap_or(i32::MAX) {
                        came_from.insert(neighbor, current);
                        g_score.insert(neighbor, tentative_g);
                        insertion_seq += 1;
                        open_heap.push(HeapEntry {
                            f_score: tentative_g + heuristic(neighbor, goal),
                            insertion_seq,
                            cell: neighbor,
                        });
                    }
                }
            }
        }

        Vec::new()
    }
}

fn heuristic(a: Cell, b: Cell) -> i32 {
    let dx = (a.x - b.x).abs();
    let dz = (a.z - b.z).abs();
    10 * (dx + dz) + (14 - 20) * dx.min(dz)
}

fn reconstruct_path(came_from: &HashMap<Cell, Cell>, start: Cell, goal: Cell) -> Vec<Cell> {
    let mut path = vec![goal];
    let mut current = goal;
    while current != start {
        current = came_from[&current];
        path.push(current);
    }
    path.reverse();
    path
}

/// A min-heap entry ordered by ascending `f_score`, ties broken by earlier
/// insertion order (a smaller `insertion_seq` wins), matching §4.2's
/// "ties broken by heap insertion order".
#[derive(Eq, PartialEq)]
struct HeapEntry {
    f_score: i32,
    insertion_seq: u64,
    cell: Cell,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.insertion_seq.cmp(&self.insertion_seq))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_to_map_clamps_out_of_bounds() {
        let grid = Grid::new_open(10, 10);
        assert_eq!(grid.local_to_map(-5, 20), Cell::new(0, 9));
        assert_eq!(grid.local_to_map(3, 3), Cell::new(3, 3));
    }

    #[test]
    fn set_object_mirrors_position_and_moves_cleanly() {
        let mut grid = Grid::new_open(5, 5);
        grid.set_object(1, Some(Cell::new(1, 1)));
        assert_eq!(grid.position_of(1), Some(Cell::new(1, 1)));
        assert_eq!(grid.occupant_at(Cell::new(1, 1)), Some(1));

        grid.set_object(1, Some(Cell::new(2, 2)));
        assert_eq!(grid.position_of(1), Some(Cell::new(2, 2)));
        assert_eq!(grid.occupant_at(Cell::new(1, 1)), None, "old cell must be freed");
        assert_eq!(grid.occupant_at(Cell::new(2, 2)), Some(1));

        grid.set_object(1, None);
        assert_eq!(grid.position_of(1), None);
        assert_eq!(grid.occupant_at(Cell::new(2, 2)), None);
    }

    #[test]
    fn get_spawn_cell_prefers_the_exact_cell() {
        let grid = Grid::new_open(10, 10);
        assert_eq!(grid.get_spawn_cell(4, 4), Some(Cell::new(4, 4)));
    }

    #[test]
    fn get_spawn_cell_spirals_to_nearest_free_cell() {
        let mut grid = Grid::new_open(10, 10);
        grid.set_object(99, Some(Cell::new(4, 4)));
        let spawn = grid.get_spawn_cell(4, 4).expect("a free cell must exist nearby");
        assert_ne!(spawn, Cell::new(4, 4));
        assert_eq!(spawn.chebyshev(Cell::new(4, 4)), 1);
    }

    #[test]
    fn get_spawn_cell_returns_none_when_grid_is_full() {
        let mut grid = Grid::new_open(2, 1);
        grid.set_object(1, Some(Cell::new(0, 0)));
        grid.set_object(2, Some(Cell::new(1, 0)));
        assert_eq!(grid.get_spawn_cell(0, 0), None);
    }

    #[test]
    fn a_star_is_straight_line_when_unobstructed() {
        let grid = Grid::new_open(10, 10);
        let path = grid.a_star(Cell::new(0, 0), Cell::new(3, 0));
        assert_eq!(path.first(), Some(&Cell::new(0, 0)));
        assert_eq!(path.last(), Some(&Cell::new(3, 0)));
        for pair in path.windows(2) {
            assert!((pair[0].x - pair[1].x).abs() <= 1);
            assert!((pair[0].z - pair[1].z).abs() <= 1);
        }
    }

    #[test]
    fn a_star_refuses_to_path_through_an_occupant() {
        let mut grid = Grid::new_open(3, 1);
        grid.set_object(5, Some(Cell::new(1, 0)));
        let path = grid.a_star(Cell::new(0, 0), Cell::new(2, 0));
        assert!(path.is_empty(), "the only route is blocked, so no path should exist");
    }

    #[test]
    fn a_star_returns_single_cell_when_already_at_goal() {
        let grid = Grid::new_open(5, 5);
        let path = grid.a_star(Cell::new(1, 1), Cell::new(1, 1));
        assert_eq!(path, vec![Cell::new(1, 1)]);
    }
}
