//! Creature state and the move protocol.
//!
//! A move locks every cell it touches (the cells being vacated and the
//! cells being entered) in ascending `(z, y, x)` order. All creatures use
//! that same order, so no two movers can each hold a lock the other is
//! waiting for. A move either commits with every lock held or releases what
//! it took and leaves the grid untouched.

use crate::footprint::{Footprint, ShapeKind};
use crate::grid::{CellGuard, SpatialGrid};
use reef_core::{Coord, CreatureId, Delta, Error, Result};
use std::fmt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

/// Result of one move attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MoveOutcome {
    /// Every cell was locked and the footprint now sits at `to`
    Committed { from: Coord, to: Coord },
    /// Some cell at `to` would leave the grid; no lock was taken
    OutOfBounds { from: Coord, to: Coord },
    /// `blocked_at` belongs to another creature; partial locks were released
    Contended {
        from: Coord,
        to: Coord,
        blocked_at: Coord,
    },
}

impl MoveOutcome {
    pub fn from(&self) -> Coord {
        match *self {
            MoveOutcome::Committed { from, .. }
            | MoveOutcome::OutOfBounds { from, .. }
            | MoveOutcome::Contended { from, .. } => from,
        }
    }

    /// The candidate base coordinate of the attempt.
    pub fn to(&self) -> Coord {
        match *self {
            MoveOutcome::Committed { to, .. }
            | MoveOutcome::OutOfBounds { to, .. }
            | MoveOutcome::Contended { to, .. } => to,
        }
    }

    /// Where the creature's base is once the attempt is over.
    pub fn position_after(&self) -> Coord {
        if self.is_committed() {
            self.to()
        } else {
            self.from()
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, MoveOutcome::Committed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            MoveOutcome::Committed { .. } => "committed",
            MoveOutcome::OutOfBounds { .. } => "out_of_bounds",
            MoveOutcome::Contended { .. } => "contended",
        }
    }
}

/// Per-outcome attempt counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveStats {
    pub committed: u64,
    pub out_of_bounds: u64,
    pub contended: u64,
}

impl MoveStats {
    pub fn record(&mut self, outcome: &MoveOutcome) {
        match outcome {
            MoveOutcome::Committed { .. } => self.committed += 1,
            MoveOutcome::OutOfBounds { .. } => self.out_of_bounds += 1,
            MoveOutcome::Contended { .. } => self.contended += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.committed + self.out_of_bounds + self.contended
    }

    pub fn merge(&mut self, other: &MoveStats) {
        self.committed += other.committed;
        self.out_of_bounds += other.out_of_bounds;
        self.contended += other.contended;
    }
}

/// Cell locks held by one in-flight move. Dropping releases all of them.
struct HeldCells<'g> {
    guards: Vec<CellGuard<'g>>,
}

impl<'g> HeldCells<'g> {
    /// Lock `cells` in the order given, stopping at the first refusal.
    ///
    /// On refusal the guards taken so far are dropped with the partial set
    /// and the refused coordinate is returned.
    fn acquire(
        grid: &'g SpatialGrid,
        claimant: CreatureId,
        cells: &[Coord],
    ) -> std::result::Result<Self, Coord> {
        let mut guards = Vec::with_capacity(cells.len());
        for &cell in cells {
            match grid.try_acquire(cell, claimant) {
                Some(guard) => guards.push(guard),
                None => return Err(cell),
            }
        }
        Ok(Self { guards })
    }

    /// Give every held cell its final occupant: `occupant` for cells in
    /// `destination`, empty for the rest.
    fn commit(&mut self, occupant: CreatureId, destination: &[Coord]) {
        for guard in &mut self.guards {
            let next = destination.contains(&guard.coord()).then_some(occupant);
            guard.write(next);
        }
    }

    fn release(self) {
        for guard in self.guards {
            guard.release();
        }
    }
}

/// A multi-cell creature on the shared grid
pub struct Creature {
    id: CreatureId,
    footprint: Footprint,
    base: Coord,
    grid: Arc<SpatialGrid>,
}

impl Creature {
    /// Put a new creature on the grid with its base at `base`.
    ///
    /// Uses the same locking as a move, with nothing to vacate. Fails if the
    /// footprint leaves the grid or lands on an occupied cell.
    pub fn place(
        grid: Arc<SpatialGrid>,
        id: CreatureId,
        kind: ShapeKind,
        base: Coord,
    ) -> Result<Self> {
        let footprint = kind.footprint();
        if !footprint.fits(base, grid.bounds()) {
            return Err(Error::Placement(format!(
                "{kind} {id} at {base} does not fit inside the grid"
            )));
        }

        let destination = footprint.lock_order_at(base);
        let mut held = HeldCells::acquire(&grid, id, &destination).map_err(|cell| {
            Error::Placement(format!("{kind} {id} at {base} overlaps occupied cell {cell}"))
        })?;
        held.commit(id, &destination);
        held.release();

        Ok(Self {
            id,
            footprint,
            base,
            grid,
        })
    }

    pub fn id(&self) -> CreatureId {
        self.id
    }

    pub fn kind(&self) -> ShapeKind {
        self.footprint.kind()
    }

    pub fn footprint(&self) -> Footprint {
        self.footprint
    }

    pub fn base(&self) -> Coord {
        self.base
    }

    pub fn occupied_cells(&self) -> Vec<Coord> {
        self.footprint.lock_order_at(self.base)
    }

    /// Try to shift the whole footprint by `delta`.
    ///
    /// Never blocks indefinitely and never fails hard: out-of-bounds and
    /// contended attempts leave both the creature and the grid exactly as
    /// they were.
    pub fn attempt_move(&mut self, delta: Delta) -> MoveOutcome {
        let from = self.base;
        let to = from.shifted(delta);

        // Rejected before any lock is taken
        if !self.footprint.fits(to, self.grid.bounds()) {
            return MoveOutcome::OutOfBounds { from, to };
        }

        let destination = self.footprint.lock_order_at(to);
        let lock_set = self.lock_set(from, &destination);

        let mut held = match HeldCells::acquire(&self.grid, self.id, &lock_set) {
            Ok(held) => held,
            Err(blocked_at) => {
                // Partial locks were already dropped with the failed acquire
                trace!(creature = %self.id, %from, %to, %blocked_at, "Move aborted");
                return MoveOutcome::Contended {
                    from,
                    to,
                    blocked_at,
                };
            }
        };

        // Every touched cell is held: write final occupants, then unlock
        held.commit(self.id, &destination);
        self.base = to;
        held.release();

        MoveOutcome::Committed { from, to }
    }

    /// Current and destination cells, deduplicated, in lock order.
    fn lock_set(&self, from: Coord, destination: &[Coord]) -> Vec<Coord> {
        let mut cells: Vec<Coord> = self
            .footprint
            .cells_at(from)
            .chain(destination.iter().copied())
            .collect();
        cells.sort_by_key(|cell| cell.lock_key());
        cells.dedup();
        cells
    }
}

impl fmt::Debug for Creature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Creature")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("base", &self.base)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use reef_core::Bounds;

    fn grid(edge: i32) -> Arc<SpatialGrid> {
        Arc::new(SpatialGrid::new(Bounds::cube(edge)))
    }

    fn place(grid: &Arc<SpatialGrid>, id: u64, kind: ShapeKind, base: Coord) -> Result<Creature> {
        Creature::place(grid.clone(), CreatureId(id), kind, base)
    }

    #[test]
    fn test_creature_placement() {
        let grid = grid(6);
        let creature = place(&grid, 1, ShapeKind::L, Coord::new(1, 1, 1)).unwrap();

        assert_eq!(creature.id(), CreatureId(1));
        assert_eq!(creature.kind(), ShapeKind::L);
        assert_eq!(creature.base(), Coord::new(1, 1, 1));
        assert_eq!(grid.snapshot().cells_of(CreatureId(1)), creature.occupied_cells());
        assert_eq!(creature.occupied_cells().len(), 5);
    }

    #[test]
    fn test_placement_conflicts() {
        let grid = grid(6);
        place(&grid, 1, ShapeKind::Line, Coord::new(0, 0, 0)).unwrap();

        let overlap = place(&grid, 2, ShapeKind::Line, Coord::new(0, 0, 2));
        assert!(matches!(overlap, Err(Error::Placement(_))));

        let outside = place(&grid, 3, ShapeKind::Star, Coord::new(4, 0, 0));
        assert!(matches!(outside, Err(Error::Placement(_))));

        // Failed placements leave nothing behind.
        assert_eq!(grid.snapshot().occupied_count(), 3);
    }

    #[test]
    fn test_committed_move_updates_grid() {
        let grid = grid(6);
        let mut rocket = place(&grid, 1, ShapeKind::Rocket, Coord::new(0, 0, 0)).unwrap();

        let outcome = rocket.attempt_move(Delta::new(1, 1, 1));
        assert_eq!(
            outcome,
            MoveOutcome::Committed {
                from: Coord::new(0, 0, 0),
                to: Coord::new(1, 1, 1)
            }
        );
        assert_eq!(rocket.base(), Coord::new(1, 1, 1));

        let snapshot = grid.snapshot();
        assert_eq!(snapshot.cells_of(CreatureId(1)), rocket.occupied_cells());
        assert_eq!(snapshot.occupied_count(), 6);
        assert_eq!(snapshot.occupant(Coord::new(0, 0, 0)), None);
    }

    #[test]
    fn test_overlapping_move_keeps_shared_cells() {
        let grid = grid(6);
        let mut line = place(&grid, 1, ShapeKind::Line, Coord::new(2, 2, 0)).unwrap();

        assert!(line.attempt_move(Delta::new(0, 0, 1)).is_committed());

        let snapshot = grid.snapshot();
        assert_eq!(
            snapshot.cells_of(CreatureId(1)),
            vec![Coord::new(2, 2, 1), Coord::new(2, 2, 2), Coord::new(2, 2, 3)]
        );
        assert_eq!(snapshot.occupant(Coord::new(2, 2, 0)), None);
    }

    #[test]
    fn test_out_of_bounds_takes_no_locks() {
        let grid = grid(5);
        let mut line = place(&grid, 1, ShapeKind::Line, Coord::new(4, 4, 2)).unwrap();
        let attempts_before = grid.acquisition_attempts();
        let before = grid.snapshot();

        let outcome = line.attempt_move(Delta::new(1, 0, 0));
        assert_eq!(
            outcome,
            MoveOutcome::OutOfBounds {
                from: Coord::new(4, 4, 2),
                to: Coord::new(5, 4, 2)
            }
        );
        assert_eq!(grid.acquisition_attempts(), attempts_before);
        assert_eq!(line.base(), Coord::new(4, 4, 2));
        assert_eq!(grid.snapshot(), before);
    }

    #[test]
    fn test_contended_move_changes_nothing() {
        let grid = grid(6);
        let mut mover = place(&grid, 1, ShapeKind::Line, Coord::new(0, 0, 0)).unwrap();
        place(&grid, 2, ShapeKind::Line, Coord::new(1, 0, 1)).unwrap();
        let before = grid.snapshot();

        let outcome = mover.attempt_move(Delta::new(1, 0, 0));
        assert_eq!(
            outcome,
            MoveOutcome::Contended {
                from: Coord::new(0, 0, 0),
                to: Coord::new(1, 0, 0),
                blocked_at: Coord::new(1, 0, 1),
            }
        );
        assert_eq!(outcome.position_after(), Coord::new(0, 0, 0));
        assert_eq!(mover.base(), Coord::new(0, 0, 0));
        assert_eq!(grid.snapshot(), before);

        // The mover's own cells were unlocked again on abort.
        assert_eq!(grid.occupant(Coord::new(0, 0, 0)), Some(CreatureId(1)));
    }

    #[test]
    fn test_debug_omits_grid() {
        let grid = grid(8);
        let star = place(&grid, 4, ShapeKind::Star, Coord::new(1, 2, 3)).unwrap();

        let printed = format!("{star:?}");
        assert!(printed.contains("Star"));
        assert!(printed.contains("base"));
        assert!(!printed.contains("Mutex"));
        assert!(printed.len() < 120, "debug output too long: {printed}");
    }

    #[test]
    fn test_move_stats() {
        let mut stats = MoveStats::default();
        let at = Coord::ORIGIN;
        stats.record(&MoveOutcome::Committed { from: at, to: at });
        stats.record(&MoveOutcome::OutOfBounds { from: at, to: at });
        stats.record(&MoveOutcome::Contended { from: at, to: at, blocked_at: at });
        stats.record(&MoveOutcome::Committed { from: at, to: at });
        assert_eq!(stats.committed, 2);
        assert_eq!(stats.total(), 4);

        let mut totals = MoveStats::default();
        totals.merge(&stats);
        totals.merge(&stats);
        assert_eq!(totals.contended, 2);
        assert_eq!(totals.total(), 8);
    }

    #[test]
    fn test_outcome_labels() {
        let at = Coord::new(1, 2, 3);
        let outcome = MoveOutcome::OutOfBounds { from: at, to: Coord::new(1, 2, 4) };
        assert_eq!(outcome.label(), "out_of_bounds");
        assert_eq!(outcome.position_after(), at);
        assert!(!outcome.is_committed());
    }

    proptest! {
        #[test]
        fn prop_moves_respect_bounds_and_failures_change_nothing(
            kind in prop::sample::select(ShapeKind::ALL.to_vec()),
            deltas in prop::collection::vec((-1..=1i32, -1..=1i32, -1..=1i32), 1..40),
        ) {
            let grid = grid(5);
            // A fixed obstacle the mover keeps running into.
            place(&grid, 99, ShapeKind::Line, Coord::new(4, 4, 0)).unwrap();
            let mut creature = place(&grid, 1, kind, Coord::new(0, 0, 0)).unwrap();

            for (dx, dy, dz) in deltas {
                let before = grid.snapshot();
                let base_before = creature.base();
                let outcome = creature.attempt_move(Delta::new(dx, dy, dz));

                if outcome.is_committed() {
                    prop_assert!(creature.footprint().fits(creature.base(), grid.bounds()));
                    let cells = grid.snapshot().cells_of(CreatureId(1));
                    prop_assert_eq!(cells, creature.occupied_cells());
                } else {
                    prop_assert_eq!(creature.base(), base_before);
                    prop_assert_eq!(grid.snapshot(), before);
                }
                prop_assert_eq!(grid.snapshot().cells_of(CreatureId(99)).len(), 3);
            }
        }
    }
}
