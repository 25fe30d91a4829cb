//! Simulation driver.
//!
//! Builds the grid, places every creature, then runs each creature on its
//! own OS thread until a shared stop flag is raised.

use crate::creature::{Creature, MoveOutcome, MoveStats};
use crate::footprint::ShapeKind;
use crate::grid::SpatialGrid;
use crate::movement::{DeltaSource, PauseSampler, RandomDeltas};
use crate::placement::Layout;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use reef_core::{
    validate_bounds, Bounds, Coord, CreatureId, Error, IdGenerator, Result, SimulationConfig,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Longest the driver sleeps before re-checking the stop flag.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Cooperative cancellation signal shared by the driver and all creatures.
///
/// Reads are relaxed: a creature may run one more iteration after the flag
/// is raised, never a partial one.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One roster entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatureInfo {
    pub id: CreatureId,
    pub kind: ShapeKind,
    pub base: Coord,
}

/// What one creature did over the run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatureReport {
    pub id: CreatureId,
    pub kind: ShapeKind,
    pub start: Coord,
    pub end: Coord,
    pub stats: MoveStats,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub seed: u64,
    pub bounds: Bounds,
    pub elapsed: Duration,
    pub creatures: Vec<CreatureReport>,
    pub totals: MoveStats,
}

pub struct Simulation {
    config: SimulationConfig,
    seed: u64,
    grid: Arc<SpatialGrid>,
    creatures: Vec<Creature>,
    rng: ChaCha8Rng,
    stop: StopFlag,
}

impl Simulation {
    /// Build a simulation drawing creature ids from the process-wide generator.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        Self::with_ids(config, IdGenerator::global())
    }

    /// Build a simulation with the standard packed layout for `config`.
    pub fn with_ids(config: SimulationConfig, ids: &IdGenerator) -> Result<Self> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(rand::random);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let layout = Layout::packed(&config, &mut rng)?;
        Self::assemble(config, seed, rng, layout, ids)
    }

    /// Build a simulation from an explicit layout (custom grid size and
    /// starting positions).
    ///
    /// `config` is still validated as a whole, though only its seed and pause
    /// range are used; the layout replaces the derived grid and placements.
    pub fn with_layout(
        config: SimulationConfig,
        layout: Layout,
        ids: &IdGenerator,
    ) -> Result<Self> {
        config.validate()?;
        validate_bounds(layout.bounds)?;

        let seed = config.seed.unwrap_or_else(rand::random);
        let rng = ChaCha8Rng::seed_from_u64(seed);
        Self::assemble(config, seed, rng, layout, ids)
    }

    fn assemble(
        config: SimulationConfig,
        seed: u64,
        rng: ChaCha8Rng,
        layout: Layout,
        ids: &IdGenerator,
    ) -> Result<Self> {
        let grid = Arc::new(SpatialGrid::new(layout.bounds));

        let mut creatures = Vec::with_capacity(layout.placements.len());
        for (kind, base) in layout.placements {
            let creature = Creature::place(grid.clone(), ids.next_id(), kind, base)?;
            debug!(creature = %creature.id(), %kind, %base, "Placed creature");
            creatures.push(creature);
        }

        let bounds = grid.bounds();
        info!(
            seed,
            creatures = creatures.len(),
            width = bounds.width(),
            length = bounds.length(),
            height = bounds.height(),
            "Simulation initialized"
        );

        Ok(Self {
            config,
            seed,
            grid,
            creatures,
            rng,
            stop: StopFlag::new(),
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn grid(&self) -> &Arc<SpatialGrid> {
        &self.grid
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn roster(&self) -> Vec<CreatureInfo> {
        self.creatures
            .iter()
            .map(|creature| CreatureInfo {
                id: creature.id(),
                kind: creature.kind(),
                base: creature.base(),
            })
            .collect()
    }

    /// Run for the configured duration, or until the stop flag is raised
    /// from elsewhere, then stop every creature and collect the report.
    #[instrument(
        skip(self),
        fields(creatures = self.creatures.len(), seconds = self.config.duration_secs)
    )]
    pub fn run(self) -> Result<SimulationReport> {
        let duration = self.config.duration();
        let running = self.spawn()?;
        running.wait_for(duration);
        running.join()
    }

    /// Start every creature with random unit-step moves.
    pub fn spawn(mut self) -> Result<RunningSimulation> {
        let mut seeder = ChaCha8Rng::seed_from_u64(self.rng.gen());
        self.spawn_with(move |_| Box::new(RandomDeltas::new(seeder.gen())))
    }

    /// Start every creature, taking each one's moves from `sources`.
    pub fn spawn_with<F>(self, mut sources: F) -> Result<RunningSimulation>
    where
        F: FnMut(&Creature) -> Box<dyn DeltaSource>,
    {
        let Simulation {
            config,
            seed,
            grid,
            creatures,
            mut rng,
            stop,
        } = self;

        let started = Instant::now();
        let mut handles = Vec::with_capacity(creatures.len());

        // One named OS thread per creature

        for creature in creatures {
            let runner = CreatureRunner {
                source: sources(&creature),
                pauses: PauseSampler::new(&config.pause, rng.gen()),
                stop: stop.clone(),
                creature,
            };
            let name = format!("creature-{}", runner.creature.id());

            match thread::Builder::new().name(name).spawn(move || runner.run()) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    // Stop whatever already started before bailing out
                    warn!("Failed to start creature thread: {}", err);
                    stop.raise();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(err.into());
                }
            }
        }

        info!(threads = handles.len(), "Creatures released");

        Ok(RunningSimulation {
            seed,
            grid,
            stop,
            handles,
            started,
        })
    }
}

/// A simulation whose creature threads are live
pub struct RunningSimulation {
    seed: u64,
    grid: Arc<SpatialGrid>,
    stop: StopFlag,
    handles: Vec<JoinHandle<CreatureReport>>,
    started: Instant,
}

impl RunningSimulation {
    pub fn grid(&self) -> &Arc<SpatialGrid> {
        &self.grid
    }

    pub fn stop(&self) {
        self.stop.raise();
    }

    /// Block until `limit` has passed since the start or the stop flag is
    /// raised, whichever comes first.
    pub fn wait_for(&self, limit: Duration) {
        let deadline = self.started + limit;
        while !self.stop.is_raised() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(STOP_POLL_INTERVAL));
        }
    }

    /// Raise the stop flag and wait for every creature thread to finish.
    pub fn join(mut self) -> Result<SimulationReport> {
        self.stop.raise();

        let handles = std::mem::take(&mut self.handles);
        let mut creatures = Vec::with_capacity(handles.len());
        let mut panicked = Vec::new();
        for handle in handles {
            let name = handle.thread().name().unwrap_or("creature").to_string();
            match handle.join() {
                Ok(report) => creatures.push(report),
                Err(_) => {
                    warn!(thread = %name, "Creature thread panicked");
                    panicked.push(name);
                }
            }
        }

        if !panicked.is_empty() {
            return Err(Error::InvalidState(format!(
                "creature threads panicked: {}",
                panicked.join(", ")
            )));
        }

        let mut totals = MoveStats::default();
        for report in &creatures {
            totals.merge(&report.stats);
        }

        let report = SimulationReport {
            seed: self.seed,
            bounds: self.grid.bounds(),
            elapsed: self.started.elapsed(),
            creatures,
            totals,
        };
        emit_summary(&report);
        Ok(report)
    }
}

/// Dropping without [`RunningSimulation::join`] still stops and joins every
/// creature; their reports are discarded.
impl Drop for RunningSimulation {
    fn drop(&mut self) {
        if self.handles.is_empty() {
            return;
        }

        self.stop.raise();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("Creature thread panicked during shutdown");
            }
        }
        debug!("Running simulation dropped, creatures stopped");
    }
}

/// State moved onto a creature's thread
struct CreatureRunner {
    creature: Creature,
    source: Box<dyn DeltaSource>,
    pauses: PauseSampler,
    stop: StopFlag,
}

impl CreatureRunner {
    fn run(mut self) -> CreatureReport {
        let start = self.creature.base();
        let mut stats = MoveStats::default();

        // The flag is checked once per iteration, never mid-move
        while !self.stop.is_raised() {
            let delta = self.source.propose();
            let outcome = self.creature.attempt_move(delta);
            log_move(&self.creature, &outcome);
            stats.record(&outcome);

            // Back off before the next attempt
            thread::sleep(self.pauses.next_pause());
        }

        info!(
            creature = %self.creature.id(),
            kind = %self.creature.kind(),
            committed = stats.committed,
            attempts = stats.total(),
            "Creature terminated"
        );

        CreatureReport {
            id: self.creature.id(),
            kind: self.creature.kind(),
            start,
            end: self.creature.base(),
            stats,
        }
    }
}

fn log_move(creature: &Creature, outcome: &MoveOutcome) {
    debug!(
        kind = %creature.kind(),
        creature = %creature.id(),
        outcome = outcome.label(),
        from = %outcome.from(),
        to = %outcome.position_after(),
        target = %outcome.to(),
        "Move attempt"
    );
}

fn emit_summary(report: &SimulationReport) {
    let busiest = report
        .creatures
        .iter()
        .max_by_key(|creature| creature.stats.committed);

    info!(
        event = "simulation_summary",
        creatures = report.creatures.len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        attempts = report.totals.total(),
        committed = report.totals.committed,
        contended = report.totals.contended,
        out_of_bounds = report.totals.out_of_bounds,
        "Simulation complete"
    );

    if let Some(busiest) = busiest {
        info!(
            event = "busiest_creature",
            creature = %busiest.id,
            kind = %busiest.kind,
            committed = busiest.stats.committed,
            start = %busiest.start,
            end = %busiest.end,
            "Most mobile creature"
        );
    }
}
