//! Creature shapes.
//!
//! A footprint is the fixed set of cells a creature covers, expressed as
//! offsets from its base coordinate. All kinds share one move protocol and
//! differ only in this offset table.

use reef_core::{Bounds, Coord};
use serde::{Deserialize, Serialize};
use std::fmt;

const LINE: [Coord; 3] = [
    Coord::new(0, 0, 0),
    Coord::new(0, 0, 1),
    Coord::new(0, 0, 2),
];

const STAR: [Coord; 7] = [
    Coord::new(1, 1, 0),
    Coord::new(1, 0, 1),
    Coord::new(0, 1, 1),
    Coord::new(1, 1, 1),
    Coord::new(2, 1, 1),
    Coord::new(1, 2, 1),
    Coord::new(1, 1, 2),
];

const L_SHAPE: [Coord; 5] = [
    Coord::new(0, 0, 0),
    Coord::new(1, 0, 0),
    Coord::new(0, 0, 1),
    Coord::new(0, 0, 2),
    Coord::new(0, 1, 2),
];

const ROCKET: [Coord; 6] = [
    Coord::new(0, 0, 0),
    Coord::new(2, 0, 0),
    Coord::new(0, 0, 1),
    Coord::new(1, 0, 1),
    Coord::new(2, 0, 1),
    Coord::new(1, 0, 2),
];

/// Creature kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    /// Three cells stacked along z
    Line,
    /// Seven cells: a centre with its six face neighbours
    Star,
    /// Five cells bent into an L
    L,
    /// Six cells in the xz plane
    Rocket,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 4] = [
        ShapeKind::Line,
        ShapeKind::Star,
        ShapeKind::L,
        ShapeKind::Rocket,
    ];

    pub fn footprint(self) -> Footprint {
        let offsets: &'static [Coord] = match self {
            ShapeKind::Line => &LINE,
            ShapeKind::Star => &STAR,
            ShapeKind::L => &L_SHAPE,
            ShapeKind::Rocket => &ROCKET,
        };
        Footprint { kind: self, offsets }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ShapeKind::Line => "line",
            ShapeKind::Star => "star",
            ShapeKind::L => "l-shape",
            ShapeKind::Rocket => "rocket",
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The cells one creature kind covers, relative to its base coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footprint {
    kind: ShapeKind,
    offsets: &'static [Coord],
}

impl Footprint {
    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    pub fn offsets(&self) -> &'static [Coord] {
        self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Absolute cells covered when anchored at `base`, in offset-table order.
    pub fn cells_at(&self, base: Coord) -> impl Iterator<Item = Coord> + 'static {
        let offsets = self.offsets;
        offsets.iter().map(move |offset| base.offset(*offset))
    }

    /// Absolute cells covered at `base`, sorted into the global lock order.
    pub fn lock_order_at(&self, base: Coord) -> Vec<Coord> {
        let mut cells: Vec<Coord> = self.cells_at(base).collect();
        cells.sort_by_key(|cell| cell.lock_key());
        cells
    }

    /// Whether every cell of the footprint anchored at `base` lies inside `bounds`.
    pub fn fits(&self, base: Coord, bounds: Bounds) -> bool {
        self.cells_at(base).all(|cell| bounds.contains(cell))
    }

    /// Size of the bounding box on each axis.
    pub fn extent(&self) -> Coord {
        self.offsets.iter().fold(Coord::ORIGIN, |acc, offset| {
            Coord::new(
                acc.x.max(offset.x + 1),
                acc.y.max(offset.y + 1),
                acc.z.max(offset.z + 1),
            )
        })
    }

    /// Recover the base coordinate from the cells a creature of this kind covers.
    ///
    /// Returns `None` if `cells` is not exactly this footprint at some base.
    pub fn base_of(&self, cells: &[Coord]) -> Option<Coord> {
        if cells.len() != self.len() {
            return None;
        }
        let lowest_cell = cells.iter().min_by_key(|c| c.lock_key())?;
        let lowest_offset = self.offsets.iter().min_by_key(|c| c.lock_key())?;
        let base = lowest_cell.minus(*lowest_offset);

        let expected = self.lock_order_at(base);
        let mut actual = cells.to_vec();
        actual.sort_by_key(|c| c.lock_key());
        (expected == actual).then_some(base)
    }
}

/// Largest extent on each axis over every creature kind.
pub fn max_extent() -> Coord {
    ShapeKind::ALL.iter().fold(Coord::ORIGIN, |acc, kind| {
        let extent = kind.footprint().extent();
        Coord::new(acc.x.max(extent.x), acc.y.max(extent.y), acc.z.max(extent.z))
    })
}
