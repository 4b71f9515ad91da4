//! Built-in kernel strategies and tournament selection.
//!
//! All three consumers share one per-individual strip of the random pool,
//! with fixed offsets: `0..2` and `2..4` feed the two parent tournaments,
//! crossover reads offset `j` for gene `j`, and the default mutation reads
//! offsets `0..3`. Shrinking the pool below one float per gene breaks at
//! least one of them.

use crate::population::Gene;
use crate::{Crossover, Mutation};

/// Candidates drawn per tournament.
pub const TOURNAMENT_SIZE: usize = 2;

pub const DEFAULT_MUTATION_RATE: f32 = 0.01;

fn candidate(f: f32, size: usize) -> usize {
    ((f * size as f32) as usize).min(size - 1)
}

/// Tournament over `draws.len()` candidates mapped from unit floats onto
/// `[0, score.len())`. Highest score wins; first-seen wins ties.
pub fn tournament(score: &[f32], draws: &[f32]) -> usize {
    let mut winner = candidate(draws[0], score.len());
    for &f in &draws[1..] {
        let c = candidate(f, score.len());
        if score[c] > score[winner] {
            winner = c;
        }
    }
    winner
}

/// Per-gene coin flip between the two parents.
pub struct UniformCrossover;

impl Crossover for UniformCrossover {
    fn crossover(
        &self,
        parent_a: &[Gene],
        parent_b: &[Gene],
        child: &mut [Gene],
        rand_strip: &[f32],
    ) {
        for (j, gene) in child.iter_mut().enumerate() {
            *gene = if rand_strip[j] > 0.5 { parent_a[j] } else { parent_b[j] };
        }
    }
}

/// Replaces one gene with a fresh draw, firing at `rate` probability.
pub struct PointMutation {
    pub rate: f32,
}

impl Default for PointMutation {
    fn default() -> Self {
        Self { rate: DEFAULT_MUTATION_RATE }
    }
}

impl Mutation for PointMutation {
    fn mutate(&self, genome: &mut [Gene], rand_strip: &[f32]) {
        if rand_strip[1] <= self.rate {
            let pos = ((rand_strip[0] * genome.len() as f32) as usize).min(genome.len() - 1);
            genome[pos] = rand_strip[2];
        }
    }
}
