//! Accelerator-resident population buffers.
//!
//! A population owns four parallel buffers: the live generation `current`,
//! the scratch generation `next`, one score per individual, and the
//! per-generation random pool of one float per gene. `current` and `next`
//! are distinct allocations for the population's whole lifetime; the
//! generation swap exchanges them by pointer, never by copy.

use crate::error::Error;
use crate::random::RandomSource;

/// A single gene. Genomes are vectors of floats in whatever range the
/// bound objective accepts; the built-in initializer draws `[0, 1)`.
pub type Gene = f32;

/// The tournament indexes strip offsets `0..4` and the default mutation
/// offsets `0..3`, so every individual needs at least four floats of strip.
pub const MIN_GENOME_LEN: usize = 4;

/// How `current` is filled at creation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Init {
    /// Copy of a freshly drawn random pool.
    Random,
    /// All genes zero.
    Zero,
}

pub struct Population {
    size: usize,
    genome_len: usize,
    pub(crate) current: Vec<Gene>,
    pub(crate) next: Vec<Gene>,
    pub(crate) score: Vec<f32>,
    pub(crate) rand: Vec<f32>,
}

impl Population {
    pub fn new(
        size: usize,
        genome_len: usize,
        init: Init,
        source: &mut RandomSource,
    ) -> Result<Self, Error> {
        if genome_len < MIN_GENOME_LEN {
            return Err(Error::GenomeTooShort { len: genome_len });
        }
        let genes = size
            .checked_mul(genome_len)
            .ok_or(Error::Alloc { bytes: usize::MAX })?;

        let mut rand = alloc(genes)?;
        let mut current = alloc(genes)?;
        let next = alloc(genes)?;
        let score = alloc(size)?;

        if init == Init::Random {
            source.fill(&mut rand);
            current.copy_from_slice(&rand);
        }

        Ok(Self { size, genome_len, current, next, score, rand })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn genome_len(&self) -> usize {
        self.genome_len
    }

    pub fn current(&self) -> &[Gene] {
        &self.current
    }

    pub fn next(&self) -> &[Gene] {
        &self.next
    }

    pub fn score(&self) -> &[f32] {
        &self.score
    }

    pub fn rand_pool(&self) -> &[f32] {
        &self.rand
    }

    /// Genome `i` of the live generation.
    pub fn genome(&self, i: usize) -> &[Gene] {
        &self.current[i * self.genome_len..(i + 1) * self.genome_len]
    }

    pub fn genome_mut(&mut self, i: usize) -> &mut [Gene] {
        &mut self.current[i * self.genome_len..(i + 1) * self.genome_len]
    }

    /// Publishes `next` as the live generation. Pointer exchange only.
    pub fn swap_generations(&mut self) {
        std::mem::swap(&mut self.current, &mut self.next);
    }

    pub(crate) fn rand_mut(&mut self) -> &mut [f32] {
        &mut self.rand
    }

    pub(crate) fn eval_buffers(&mut self) -> (&[Gene], &mut [f32]) {
        (&self.current, &mut self.score)
    }

    pub(crate) fn breed_buffers(&mut self) -> (&[Gene], &[f32], &[f32], &mut [Gene]) {
        (&self.current, &self.score, &self.rand, &mut self.next)
    }

    pub(crate) fn mutate_buffers(&mut self) -> (&[f32], &mut [Gene]) {
        (&self.rand, &mut self.next)
    }
}

fn alloc(len: usize) -> Result<Vec<f32>, Error> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::Alloc { bytes: len * std::mem::size_of::<f32>() })?;
    buf.resize(len, 0.0);
    Ok(buf)
}
