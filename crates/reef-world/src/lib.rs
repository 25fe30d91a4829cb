//! Concurrent creature world.
//!
//! Multi-cell creatures move through a shared 3D grid, each on its own
//! thread, relocating their footprints atomically under per-cell locks.

pub mod grid;
pub mod footprint;
pub mod creature;
pub mod movement;
pub mod placement;
pub mod simulation;

pub use grid::{CellGuard, GridSnapshot, SpatialGrid};
pub use footprint::{Footprint, ShapeKind};
pub use creature::{Creature, MoveOutcome, MoveStats};
pub use movement::{DeltaSource, PauseSampler, RandomDeltas, ScriptedDeltas};
pub use placement::Layout;
pub use simulation::{
    CreatureInfo, CreatureReport, RunningSimulation, Simulation, SimulationReport, StopFlag,
};
