//! The engine: population table, strategy handles, and the run loops.

use crate::device::{Device, Grid};
use crate::error::Error;
use crate::island::IslandRunner;
use crate::migration::{
    EmigrationPolicy, ImmigrationPolicy, Migration, ReplaceWorst, SendBest, Transport,
};
use crate::ops::{PointMutation, UniformCrossover};
use crate::pipeline;
use crate::population::{Gene, Init, Population};
use crate::random::RandomSource;
use crate::{Crossover, Mutation, Objective};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker-grid blocks.
    pub blocks: usize,
    /// Workers per block.
    pub threads: usize,
    /// Capacity of the population table.
    pub max_populations: usize,
    /// Fixed seed for the random source; wall clock when `None`.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { blocks: 8, threads: 64, max_populations: 8, seed: None }
    }
}

/// Handle to a population owned by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PopulationId(usize);

/// Best individual of a population, copied to host memory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Best {
    pub index: usize,
    pub score: f32,
    pub genome: Vec<Gene>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub generations: usize,
    pub reached_target: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct IslandSummary {
    pub generations: usize,
    pub reached_target: bool,
    pub boats_sent: usize,
    pub boats_received: usize,
}

pub struct Engine {
    device: Device,
    random: RandomSource,
    populations: Vec<Population>,
    max_populations: usize,
    objective: Option<Arc<dyn Objective>>,
    crossover: Arc<dyn Crossover>,
    mutation: Arc<dyn Mutation>,
    emigration: Box<dyn EmigrationPolicy>,
    immigration: Box<dyn ImmigrationPolicy>,
}

impl Engine {
    /// Builds the worker pool and random source and installs the default
    /// crossover and mutation strategies. The objective starts unset.
    pub fn new(config: EngineConfig) -> Result<Self, Error> {
        let device = Device::new(Grid { blocks: config.blocks, threads: config.threads })?;
        let random = match config.seed {
            Some(seed) => RandomSource::new(seed),
            None => RandomSource::from_time(),
        };
        Ok(Self {
            device,
            random,
            populations: Vec::new(),
            max_populations: config.max_populations.max(1),
            objective: None,
            crossover: Arc::new(UniformCrossover),
            mutation: Arc::new(PointMutation::default()),
            emigration: Box::new(SendBest),
            immigration: Box::new(ReplaceWorst),
        })
    }

    /// Adds a population to the table. The table is not grown on failure.
    pub fn create_population(
        &mut self,
        size: usize,
        genome_len: usize,
        init: Init,
    ) -> Result<PopulationId, Error> {
        if self.populations.len() >= self.max_populations {
            return Err(Error::Capacity { capacity: self.max_populations });
        }
        let pop = Population::new(size, genome_len, init, &mut self.random)?;
        self.populations.push(pop);
        Ok(PopulationId(self.populations.len() - 1))
    }

    pub fn population_count(&self) -> usize {
        self.populations.len()
    }

    pub fn population(&self, id: PopulationId) -> &Population {
        &self.populations[id.0]
    }

    pub fn population_mut(&mut self, id: PopulationId) -> &mut Population {
        &mut self.populations[id.0]
    }

    pub fn set_objective(&mut self, objective: impl Objective + 'static) {
        self.objective = Some(Arc::new(objective));
    }

    pub fn set_mutation(&mut self, mutation: impl Mutation + 'static) {
        self.mutation = Arc::new(mutation);
    }

    pub fn set_crossover(&mut self, crossover: impl Crossover + 'static) {
        self.crossover = Arc::new(crossover);
    }

    pub fn set_emigration(&mut self, policy: impl EmigrationPolicy + 'static) {
        self.emigration = Box::new(policy);
    }

    pub fn set_immigration(&mut self, policy: impl ImmigrationPolicy + 'static) {
        self.immigration = Box::new(policy);
    }

    /// One generation across the population table.
    pub fn step(&mut self) -> Result<(), Error> {
        let objective = self.objective.clone().ok_or(Error::ObjectiveMissing)?;
        let crossover = self.crossover.clone();
        let mutation = self.mutation.clone();
        for pop in &mut self.populations {
            pipeline::step(
                &self.device,
                pop,
                &mut self.random,
                objective.as_ref(),
                crossover.as_ref(),
                mutation.as_ref(),
            )?;
        }
        Ok(())
    }

    /// Single-process run. Stops early once any population's best score
    /// reaches `target`; ends with a final evaluation so `score` matches
    /// the published generation.
    pub fn run(&mut self, generations: usize, target: Option<f32>) -> Result<RunSummary, Error> {
        info!(
            "run: {} generations over {} population(s)",
            generations,
            self.populations.len()
        );
        let mut completed = 0;
        let mut reached = false;
        for _ in 0..generations {
            self.step()?;
            completed += 1;
            if self.target_reached(target) {
                reached = true;
                break;
            }
        }
        self.final_evaluation()?;
        debug!("run finished after {} generation(s)", completed);
        Ok(RunSummary { generations: completed, reached_target: reached })
    }

    /// Multi-process run: one island per transport rank, migration polled
    /// every `interval` generations with boats of `migrants_pct` percent
    /// of the island population.
    pub fn run_islands<T: Transport>(
        &mut self,
        transport: T,
        generations: usize,
        target: Option<f32>,
        interval: usize,
        migrants_pct: f32,
    ) -> Result<IslandSummary, Error> {
        let mut runner = IslandRunner::new(self, transport, interval, migrants_pct)?;
        info!(
            "run_islands: {} generations, migration every {} generation(s)",
            generations, interval
        );
        let mut completed = 0;
        let mut reached = false;
        for _ in 0..generations {
            runner.tick(self)?;
            completed += 1;
            if self.target_reached(target) {
                reached = true;
                break;
            }
        }
        self.final_evaluation()?;
        info!(
            "islands finished: {} boat(s) out, {} boat(s) in",
            runner.boats_sent(),
            runner.boats_received()
        );
        Ok(IslandSummary {
            generations: completed,
            reached_target: reached,
            boats_sent: runner.boats_sent(),
            boats_received: runner.boats_received(),
        })
    }

    /// Copies the best individual to host memory. Linear scan; first-seen
    /// wins ties.
    pub fn get_best(&self, id: PopulationId) -> Result<Best, Error> {
        let pop = self.population(id);
        if pop.size() == 0 {
            return Err(Error::Empty);
        }
        let score = pop.score();
        let mut best = 0;
        for i in 1..score.len() {
            if score[i] > score[best] {
                best = i;
            }
        }
        Ok(Best { index: best, score: score[best], genome: pop.genome(best).to_vec() })
    }

    fn target_reached(&self, target: Option<f32>) -> bool {
        let Some(target) = target else { return false };
        self.populations
            .iter()
            .any(|p| p.score().iter().any(|&s| s >= target))
    }

    /// Re-scores `current` after the last swap so `score` matches it.
    fn final_evaluation(&mut self) -> Result<(), Error> {
        let Some(objective) = self.objective.clone() else { return Ok(()) };
        for pop in &mut self.populations {
            pipeline::evaluate(&self.device, pop, objective.as_ref())?;
        }
        Ok(())
    }

    pub(crate) fn island_population(&self) -> Option<&Population> {
        self.populations.first()
    }

    pub(crate) fn fork_seed(&mut self) -> u64 {
        self.random.fork_seed()
    }

    /// Migration callbacks are the only path between the migration engine
    /// and population buffers; they run between kernel launches.
    pub(crate) fn migrate<T: Transport>(&mut self, migration: &mut Migration<T>, migrants: usize) {
        let Engine { populations, immigration, emigration, .. } = self;
        let Some(pop) = populations.first_mut() else { return };
        migration.immigration_tick(|arrival| immigration.arrive(&mut *pop, arrival));
        migration.emigration_tick(|boat| emigration.depart(&*pop, migrants, boat));
    }
}
