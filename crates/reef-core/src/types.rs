//! Core type definitions for the simulation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a creature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CreatureId(pub u64);

impl fmt::Display for CreatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out creature identifiers.
///
/// Identifiers start at 1 and increase monotonically. Safe to share between
/// threads; each call to [`IdGenerator::next_id`] returns a value no other
/// call on the same generator has returned.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

static GLOBAL_IDS: IdGenerator = IdGenerator::new();

impl IdGenerator {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Process-wide generator, for callers that do not inject their own.
    pub fn global() -> &'static IdGenerator {
        &GLOBAL_IDS
    }

    pub fn next_id(&self) -> CreatureId {
        CreatureId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// 3D grid coordinate (also used for footprint offsets)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Coord {
    pub const ORIGIN: Coord = Coord::new(0, 0, 0);

    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Component-wise sum, used to turn an offset into an absolute cell.
    pub const fn offset(self, by: Coord) -> Self {
        Self::new(self.x + by.x, self.y + by.y, self.z + by.z)
    }

    pub const fn shifted(self, delta: Delta) -> Self {
        Self::new(self.x + delta.dx, self.y + delta.dy, self.z + delta.dz)
    }

    /// Component-wise difference.
    pub const fn minus(self, other: Coord) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    /// Key of the global lock order: ascending z, then y, then x.
    ///
    /// Every creature acquires cell locks in this order.
    pub const fn lock_key(self) -> (i32, i32, i32) {
        (self.z, self.y, self.x)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.x, self.y, self.z)
    }
}

/// A proposed relative move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Delta {
    pub dx: i32,
    pub dy: i32,
    pub dz: i32,
}

impl Delta {
    pub const ZERO: Delta = Delta::new(0, 0, 0);

    pub const fn new(dx: i32, dy: i32, dz: i32) -> Self {
        Self { dx, dy, dz }
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:+},{:+},{:+}]", self.dx, self.dy, self.dz)
    }
}

/// Inclusive grid bounds: valid coordinates are `0..=max` on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub max_x: i32,
    pub max_y: i32,
    pub max_z: i32,
}

impl Bounds {
    pub const fn new(max_x: i32, max_y: i32, max_z: i32) -> Self {
        Self { max_x, max_y, max_z }
    }

    /// Bounds of a cube with `edge` cells per axis.
    pub const fn cube(edge: i32) -> Self {
        Self::new(edge - 1, edge - 1, edge - 1)
    }

    pub const fn width(&self) -> usize {
        self.max_x as usize + 1
    }

    pub const fn length(&self) -> usize {
        self.max_y as usize + 1
    }

    pub const fn height(&self) -> usize {
        self.max_z as usize + 1
    }

    pub const fn cell_count(&self) -> usize {
        self.width() * self.length() * self.height()
    }

    /// Like [`Bounds::cell_count`], but `None` when a maximum is negative or
    /// the product overflows.
    pub fn checked_cell_count(&self) -> Option<usize> {
        if self.max_x < 0 || self.max_y < 0 || self.max_z < 0 {
            return None;
        }
        self.width()
            .checked_mul(self.length())?
            .checked_mul(self.height())
    }

    pub const fn contains(&self, coord: Coord) -> bool {
        coord.x >= 0
            && coord.y >= 0
            && coord.z >= 0
            && coord.x <= self.max_x
            && coord.y <= self.max_y
            && coord.z <= self.max_z
    }

    /// Flattened index of `coord`, z-major so that ascending indices follow
    /// [`Coord::lock_key`] order.
    pub fn index_of(&self, coord: Coord) -> Option<usize> {
        if !self.contains(coord) {
            return None;
        }
        let (x, y, z) = (coord.x as usize, coord.y as usize, coord.z as usize);
        Some((z * self.length() + y) * self.width() + x)
    }

    pub fn coord_of(&self, index: usize) -> Coord {
        let x = index % self.width();
        let y = (index / self.width()) % self.length();
        let z = index / (self.width() * self.length());
        Coord::new(x as i32, y as i32, z as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_id_generator_is_monotonic() {
        let ids = IdGenerator::new();
        assert_eq!(ids.next_id(), CreatureId(1));
        assert_eq!(ids.next_id(), CreatureId(2));
        assert_eq!(ids.next_id(), CreatureId(3));
    }

    #[test]
    fn test_id_generator_unique_across_threads() {
        let ids = Arc::new(IdGenerator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = ids.clone();
                thread::spawn(move || (0..500).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 4000);
    }

    #[test]
    fn test_bounds_contains() {
        let bounds = Bounds::new(4, 3, 2);
        assert!(bounds.contains(Coord::new(0, 0, 0)));
        assert!(bounds.contains(Coord::new(4, 3, 2)));
        assert!(!bounds.contains(Coord::new(5, 0, 0)));
        assert!(!bounds.contains(Coord::new(0, -1, 0)));
        assert!(!bounds.contains(Coord::new(0, 0, 3)));
    }

    #[test]
    fn test_cube_bounds() {
        let bounds = Bounds::cube(10);
        assert_eq!(bounds, Bounds::new(9, 9, 9));
        assert_eq!(bounds.cell_count(), 1000);
    }

    #[test]
    fn test_index_follows_lock_order() {
        let bounds = Bounds::new(2, 2, 2);
        let mut coords: Vec<Coord> = (0..bounds.cell_count()).map(|i| bounds.coord_of(i)).collect();
        let by_index = coords.clone();
        coords.sort_by_key(|c| c.lock_key());
        assert_eq!(coords, by_index);
    }

    #[test]
    fn test_checked_cell_count() {
        assert_eq!(Bounds::new(3, 2, 1).checked_cell_count(), Some(24));
        assert_eq!(Bounds::new(0, 0, 0).checked_cell_count(), Some(1));
        assert_eq!(Bounds::new(-3, 0, 0).checked_cell_count(), None);
        assert_eq!(Bounds::new(0, 0, -1).checked_cell_count(), None);
        assert_eq!(Bounds::cube(i32::MAX).checked_cell_count(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Coord::new(1, 2, 3).to_string(), "(1,2,3)");
        assert_eq!(Delta::new(-1, 0, 1).to_string(), "[-1,+0,+1]");
        assert_eq!(CreatureId(7).to_string(), "7");
    }

    proptest! {
        #[test]
        fn prop_index_round_trips(x in 0..6i32, y in 0..5i32, z in 0..4i32) {
            let bounds = Bounds::new(5, 4, 3);
            let coord = Coord::new(x, y, z);
            let index = bounds.index_of(coord).unwrap();
            prop_assert!(index < bounds.cell_count());
            prop_assert_eq!(bounds.coord_of(index), coord);
        }
    }
}
