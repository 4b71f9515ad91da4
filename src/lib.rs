//! Data-parallel genetic-algorithm engine with asynchronous island
//! migration.
//!
//! Populations of fixed-length `f32` genomes evolve on a fixed worker grid;
//! independent islands exchange boats of migrants through non-blocking
//! posted transfers that never stall the evolutionary pipeline.

/// Scores one genome. Runs on the worker grid.
/// Must be pure with respect to engine buffers outside its own slice.
pub trait Objective: Send + Sync {
    fn evaluate(&self, genome: &[Gene]) -> f32;
}

impl<F> Objective for F
where
    F: Fn(&[Gene]) -> f32 + Send + Sync,
{
    fn evaluate(&self, genome: &[Gene]) -> f32 {
        self(genome)
    }
}

/// Perturbs a freshly bred child in place.
///
/// `rand_strip` is the child's slice of the generation's random pool, one
/// uniform float per gene; offsets `0..3` drive the default strategy.
pub trait Mutation: Send + Sync {
    fn mutate(&self, genome: &mut [Gene], rand_strip: &[f32]);
}

/// Combines two tournament-selected parents into a child slot.
///
/// `rand_strip` is the child's slice of the generation's random pool; the
/// first `2 * TOURNAMENT_SIZE` floats were consumed by parent selection.
pub trait Crossover: Send + Sync {
    fn crossover(&self, parent_a: &[Gene], parent_b: &[Gene], child: &mut [Gene], rand_strip: &[f32]);
}

pub mod device;
pub mod engine;
pub mod error;
pub mod island;
pub mod migration;
pub mod ops;
pub mod pipeline;
pub mod population;
pub mod random;

pub use device::{Device, DeviceError, Grid};
pub use engine::{Best, Engine, EngineConfig, IslandSummary, PopulationId, RunSummary};
pub use error::Error;
pub use island::IslandRunner;
pub use migration::{
    mesh, Arrival, ChannelTransport, EmigrationPolicy, ImmigrationPolicy, Migration, Progress,
    ReplaceWorst, RequestId, SendBest, Transport,
};
pub use ops::{PointMutation, UniformCrossover, DEFAULT_MUTATION_RATE, TOURNAMENT_SIZE};
pub use population::{Gene, Init, Population, MIN_GENOME_LEN};
pub use random::RandomSource;
