//! Non-overlapping starting positions.
//!
//! The grid is cut into disjoint blocks, each as large as the biggest
//! footprint on every axis. One creature starts at the origin of each block,
//! so no two starting footprints can share a cell.

use crate::footprint::{max_extent, ShapeKind};
use rand::Rng;
use reef_core::{Bounds, Coord, Error, Result, ShapeSelection, SimulationConfig};

/// Grid size plus the kind and starting base of every creature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub bounds: Bounds,
    pub placements: Vec<(ShapeKind, Coord)>,
}

impl Layout {
    /// The standard layout for `config`: grid sized from the population,
    /// one creature per block, kinds chosen per the selection policy.
    pub fn packed(config: &SimulationConfig, rng: &mut impl Rng) -> Result<Self> {
        let bounds = config.bounds();
        let bases = slot_bases(bounds, max_extent(), config.creature_count)?;

        let kinds = ShapeKind::ALL.len();
        let placements = bases
            .into_iter()
            .enumerate()
            .map(|(slot, base)| {
                let kind = match config.shape_selection {
                    ShapeSelection::RoundRobin => ShapeKind::ALL[slot % kinds],
                    ShapeSelection::Random => ShapeKind::ALL[rng.gen_range(0..kinds)],
                };
                (kind, base)
            })
            .collect();

        Ok(Self { bounds, placements })
    }
}

/// Origins of the first `count` blocks of size `stride`, filled along x,
/// then y, then z.
pub fn slot_bases(bounds: Bounds, stride: Coord, count: usize) -> Result<Vec<Coord>> {
    if stride.x <= 0 || stride.y <= 0 || stride.z <= 0 {
        return Err(Error::Placement(format!("invalid block stride {stride}")));
    }

    let per_x = bounds.width() / stride.x as usize;
    let per_y = bounds.length() / stride.y as usize;
    let per_z = bounds.height() / stride.z as usize;
    let capacity = per_x * per_y * per_z;

    if capacity < count {
        return Err(Error::Placement(format!(
            "grid {}x{}x{} holds {} blocks of {}, need {}",
            bounds.width(),
            bounds.length(),
            bounds.height(),
            capacity,
            stride,
            count
        )));
    }

    Ok((0..count)
        .map(|slot| {
            let bx = slot % per_x;
            let by = (slot / per_x) % per_y;
            let bz = slot / (per_x * per_y);
            Coord::new(
                bx as i32 * stride.x,
                by as i32 * stride.y,
                bz as i32 * stride.z,
            )
        })
        .collect())
}
