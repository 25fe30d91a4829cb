//! 3D grid of lockable cells.
//!
//! Each cell pairs its mutex with the occupant slot it protects, so an
//! occupant can only be read or written through that cell's own guard.
//! Locking and the occupancy check happen in one critical section per cell.

use parking_lot::{Mutex, MutexGuard};
use reef_core::{Bounds, Coord, CreatureId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

type Cell = Mutex<Option<CreatureId>>;

/// The shared grid every creature moves through
#[derive(Debug)]
pub struct SpatialGrid {
    bounds: Bounds,
    cells: Box<[Cell]>,
    acquisition_attempts: AtomicU64,
}

impl SpatialGrid {
    pub fn new(bounds: Bounds) -> Self {
        let cells = (0..bounds.cell_count()).map(|_| Mutex::new(None)).collect();
        Self {
            bounds,
            cells,
            acquisition_attempts: AtomicU64::new(0),
        }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Lock the cell at `coord` on behalf of `claimant`.
    ///
    /// Blocks until the cell's mutex is free. If the cell turns out to be
    /// occupied by a different creature the lock is dropped again and `None`
    /// is returned; an empty cell, or one the claimant already occupies, is
    /// handed back locked. Coordinates outside the grid are never acquirable.
    pub fn try_acquire(&self, coord: Coord, claimant: CreatureId) -> Option<CellGuard<'_>> {
        let index = self.bounds.index_of(coord)?;
        self.acquisition_attempts.fetch_add(1, Ordering::Relaxed);

        let slot = self.cells[index].lock();
        let current = *slot;
        match current {
            Some(occupant) if occupant != claimant => {
                trace!(%coord, %claimant, %occupant, "Cell occupied, releasing");
                None
            }
            _ => Some(CellGuard { coord, slot }),
        }
    }

    /// Read one cell's occupant, briefly taking its lock.
    pub fn occupant(&self, coord: Coord) -> Option<CreatureId> {
        let index = self.bounds.index_of(coord)?;
        *self.cells[index].lock()
    }

    /// Consistent view of every cell at a single instant.
    ///
    /// Holds all cell locks at once, taken in the same global order movers
    /// use, so the copy never contains a half-committed move.
    pub fn snapshot(&self) -> GridSnapshot {
        let guards: Vec<MutexGuard<'_, Option<CreatureId>>> =
            self.cells.iter().map(|cell| cell.lock()).collect();
        let occupants = guards.iter().map(|slot| **slot).collect();
        drop(guards);

        GridSnapshot {
            bounds: self.bounds,
            occupants,
        }
    }

    /// Number of in-bounds `try_acquire` calls made so far.
    pub fn acquisition_attempts(&self) -> u64 {
        self.acquisition_attempts.load(Ordering::Relaxed)
    }
}

/// A held cell lock.
///
/// The only handle through which an occupant can be written. Dropping the
/// guard (or calling [`CellGuard::release`]) unlocks the cell.
pub struct CellGuard<'g> {
    coord: Coord,
    slot: MutexGuard<'g, Option<CreatureId>>,
}

impl CellGuard<'_> {
    pub fn coord(&self) -> Coord {
        self.coord
    }

    pub fn occupant(&self) -> Option<CreatureId> {
        *self.slot
    }

    pub fn write(&mut self, occupant: Option<CreatureId>) {
        *self.slot = occupant;
    }

    pub fn release(self) {
        drop(self);
    }
}

impl std::fmt::Debug for CellGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellGuard")
            .field("coord", &self.coord)
            .field("occupant", &*self.slot)
            .finish()
    }
}

/// Copy of the grid's occupancy taken under all cell locks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSnapshot {
    bounds: Bounds,
    occupants: Vec<Option<CreatureId>>,
}

impl GridSnapshot {
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn occupant(&self, coord: Coord) -> Option<CreatureId> {
        self.bounds
            .index_of(coord)
            .and_then(|index| self.occupants[index])
    }

    pub fn occupied_count(&self) -> usize {
        self.occupants.iter().filter(|slot| slot.is_some()).count()
    }

    /// Cells held by `id`, in lock order.
    pub fn cells_of(&self, id: CreatureId) -> Vec<Coord> {
        self.occupants
            .iter()
            .enumerate()
            .filter(|(_, slot)| **slot == Some(id))
            .map(|(index, _)| self.bounds.coord_of(index))
            .collect()
    }

    /// Occupied cells grouped by creature, each list in lock order.
    pub fn by_creature(&self) -> BTreeMap<CreatureId, Vec<Coord>> {
        let mut grouped: BTreeMap<CreatureId, Vec<Coord>> = BTreeMap::new();
        for (index, slot) in self.occupants.iter().enumerate() {
            if let Some(id) = slot {
                grouped.entry(*id).or_default().push(self.bounds.coord_of(index));
            }
        }
        grouped
    }
}
