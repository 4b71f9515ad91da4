//! Couples the generation pipeline with the migration cadence.

use crate::engine::Engine;
use crate::error::Error;
use crate::migration::{Migration, Transport};

/// Drives one island: a generation per tick, with migration polled every
/// `interval` generations against the island population.
///
/// [`Engine::run_islands`] wraps this in a loop; driving ticks directly is
/// useful when several islands share a thread.
pub struct IslandRunner<T: Transport> {
    migration: Migration<T>,
    interval: usize,
    migrants: usize,
    generation: usize,
}

impl<T: Transport> IslandRunner<T> {
    /// `migrants_pct` sizes the boat as a percentage of the island
    /// population, at least one migrant.
    pub fn new(
        engine: &mut Engine,
        transport: T,
        interval: usize,
        migrants_pct: f32,
    ) -> Result<Self, Error> {
        let pop = engine.island_population().ok_or(Error::Empty)?;
        let size = pop.size();
        let genome_len = pop.genome_len();
        let migrants = (((size as f32) * migrants_pct / 100.0).ceil() as usize).clamp(1, size.max(1));
        let seed = engine.fork_seed();
        Ok(Self {
            migration: Migration::new(transport, migrants * genome_len, seed),
            interval: interval.max(1),
            migrants,
            generation: 0,
        })
    }

    /// One tick: a full generation over the population table, then, at the
    /// cadence boundary, immigration followed by emigration.
    pub fn tick(&mut self, engine: &mut Engine) -> Result<(), Error> {
        engine.step()?;
        self.generation += 1;
        if self.generation % self.interval == 0 {
            engine.migrate(&mut self.migration, self.migrants);
        }
        Ok(())
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn boats_sent(&self) -> usize {
        self.migration.boats_sent()
    }

    pub fn boats_received(&self) -> usize {
        self.migration.boats_received()
    }

    pub fn dropped_ticks(&self) -> usize {
        self.migration.dropped_ticks()
    }
}
