//! Configuration types for the simulation.

use crate::{Bounds, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upper limit on grid cells; each cell carries its own lock.
pub const MAX_GRID_CELLS: usize = 1 << 26;

/// How creature kinds are chosen when populating the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeSelection {
    /// Cycle through the kinds in a fixed order
    RoundRobin,
    /// Pick a kind uniformly at random per creature
    Random,
}

/// Sleep interval between move attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseConfig {
    /// Shortest pause (milliseconds, inclusive)
    pub min_ms: u64,
    /// Longest pause (milliseconds, inclusive)
    pub max_ms: u64,
}

impl Default for PauseConfig {
    fn default() -> Self {
        Self {
            min_ms: 10,
            max_ms: 50,
        }
    }
}

/// Simulation run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of creatures to place
    pub creature_count: usize,
    /// Wall-clock run time in seconds
    pub duration_secs: u64,
    /// Grid edge length contributed by each creature (edge = this * creature_count)
    pub cells_per_creature: i32,
    /// Random seed for reproducible placement and movement; entropy when unset
    pub seed: Option<u64>,
    /// Creature kind selection policy
    pub shape_selection: ShapeSelection,
    /// Pause between move attempts
    pub pause: PauseConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            creature_count: 4,
            duration_secs: 5,
            cells_per_creature: 5,
            seed: None,
            shape_selection: ShapeSelection::Random,
            pause: PauseConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "Loaded simulation config");
        Self::from_json_str(&raw)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Grid bounds derived from the population: a cube whose edge grows
    /// linearly with the creature count.
    pub fn bounds(&self) -> Bounds {
        Bounds::cube(self.edge_length())
    }

    fn edge_length(&self) -> i32 {
        self.cells_per_creature
            .saturating_mul(i32::try_from(self.creature_count).unwrap_or(i32::MAX))
    }

    pub fn validate(&self) -> Result<()> {
        if self.creature_count == 0 {
            return Err(Error::InvalidConfig(
                "creature_count must be at least 1".to_string(),
            ));
        }
        if self.cells_per_creature < 3 {
            return Err(Error::InvalidConfig(format!(
                "cells_per_creature must be at least 3, got {}",
                self.cells_per_creature
            )));
        }
        if self.pause.min_ms > self.pause.max_ms {
            return Err(Error::InvalidConfig(format!(
                "pause.min_ms ({}) exceeds pause.max_ms ({})",
                self.pause.min_ms, self.pause.max_ms
            )));
        }

        validate_bounds(self.bounds())
    }
}

/// Reject bounds that cover no cells or more than [`MAX_GRID_CELLS`].
pub fn validate_bounds(bounds: Bounds) -> Result<()> {
    match bounds.checked_cell_count() {
        Some(count) if count <= MAX_GRID_CELLS => Ok(()),
        Some(count) => Err(Error::InvalidConfig(format!(
            "grid of {} cells exceeds the {} cell limit",
            count, MAX_GRID_CELLS
        ))),
        None => Err(Error::InvalidConfig(format!(
            "grid bounds {:?} do not describe a valid grid",
            bounds
        ))),
    }
}
