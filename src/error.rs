use crate::device::DeviceError;
use crate::population::MIN_GENOME_LEN;
use thiserror::Error;

/// Driver-visible failures.
///
/// Device faults are fatal to the run that hit them; every other variant
/// leaves the engine usable.
#[derive(Debug, Error)]
pub enum Error {
    #[error("population table is full (capacity {capacity})")]
    Capacity { capacity: usize },

    #[error("genome length {len} is below the minimum of {}", MIN_GENOME_LEN)]
    GenomeTooShort { len: usize },

    #[error("buffer allocation of {bytes} bytes failed")]
    Alloc { bytes: usize },

    #[error("population has no individuals")]
    Empty,

    #[error("no objective function has been set")]
    ObjectiveMissing,

    #[error(transparent)]
    Device(#[from] DeviceError),
}
