//! The per-generation pipeline.
//!
//! One generation runs refresh-random, evaluate, breed, mutate, swap, in
//! that order. Evaluation precedes selection because selection reads the
//! scores of `current`; mutation follows crossover so the structure-
//! preserving mixing dominates and mutation stays a perturbation.

use crate::device::{Device, DeviceError};
use crate::ops::{tournament, TOURNAMENT_SIZE};
use crate::population::Population;
use crate::random::RandomSource;
use crate::{Crossover, Mutation, Objective};

/// Refills the population's random pool for this generation.
pub fn refresh_rand(pop: &mut Population, source: &mut RandomSource) {
    source.fill(pop.rand_mut());
}

/// Scores every individual of the live generation.
pub fn evaluate(
    device: &Device,
    pop: &mut Population,
    objective: &dyn Objective,
) -> Result<(), DeviceError> {
    let len = pop.genome_len();
    let (current, score) = pop.eval_buffers();
    device.launch(score, 1, |i, out| {
        out[0] = objective.evaluate(&current[i * len..(i + 1) * len]);
    })
}

/// Fills `next`: per slot, two tournaments pick the parents and the bound
/// crossover strategy writes the child.
pub fn breed(
    device: &Device,
    pop: &mut Population,
    crossover: &dyn Crossover,
) -> Result<(), DeviceError> {
    let len = pop.genome_len();
    let (current, score, rand, next) = pop.breed_buffers();
    device.launch(next, len, |i, child| {
        let strip = &rand[i * len..(i + 1) * len];
        let a = tournament(score, &strip[..TOURNAMENT_SIZE]);
        let b = tournament(score, &strip[TOURNAMENT_SIZE..2 * TOURNAMENT_SIZE]);
        crossover.crossover(
            &current[a * len..(a + 1) * len],
            &current[b * len..(b + 1) * len],
            child,
            strip,
        );
    })
}

/// Rewrites every child of `next` through the bound mutation strategy.
pub fn mutate(
    device: &Device,
    pop: &mut Population,
    mutation: &dyn Mutation,
) -> Result<(), DeviceError> {
    let len = pop.genome_len();
    let (rand, next) = pop.mutate_buffers();
    device.launch(next, len, |i, child| {
        mutation.mutate(child, &rand[i * len..(i + 1) * len]);
    })
}

/// One full generation, ending with the pointer swap that publishes the
/// new generation.
pub fn step(
    device: &Device,
    pop: &mut Population,
    source: &mut RandomSource,
    objective: &dyn Objective,
    crossover: &dyn Crossover,
    mutation: &dyn Mutation,
) -> Result<(), DeviceError> {
    refresh_rand(pop, source);
    evaluate(device, pop, objective)?;
    breed(device, pop, crossover)?;
    mutate(device, pop, mutation)?;
    pop.swap_generations();
    Ok(())
}
