use crate::{common::*, error::LoaderError};

/// The policy that decides which dataset indices are visited and in what order.
pub trait Sampler
where
    Self: Debug + Send + Sync,
{
    /// Number of indices produced per epoch.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The ordered indices for the current epoch.
    fn indices(&self) -> Vec<usize>;

    /// Set the epoch number, which may change the ordering of later calls to [indices](Sampler::indices).
    fn set_epoch(&mut self, epoch: usize) {
        let _ = epoch;
    }
}

/// Visits every index in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequentialSampler {
    num_records: usize,
}

impl SequentialSampler {
    pub fn new(num_records: usize) -> Self {
        Self { num_records }
    }
}

impl Sampler for SequentialSampler {
    fn len(&self) -> usize {
        self.num_records
    }

    fn indices(&self) -> Vec<usize> {
        (0..self.num_records).collect()
    }
}

/// Restricts the indices to the shard of one replica among a group of processes.
///
/// Indices are padded by wrapping around so that every replica receives the
/// same number of samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedSampler {
    num_records: usize,
    num_replicas: usize,
    rank: usize,
    shuffle_seed: Option<u64>,
    epoch: usize,
}

impl DistributedSampler {
    pub fn new(num_records: usize, num_replicas: usize, rank: usize) -> Result<Self> {
        ensure!(
            num_replicas > 0,
            LoaderError::InvalidConfig {
                reason: "num_replicas must be positive".into()
            }
        );
        ensure!(
            rank < num_replicas,
            LoaderError::InvalidConfig {
                reason: format!(
                    "rank {} is out of range for {} replicas",
                    rank, num_replicas
                )
            }
        );

        Ok(Self {
            num_records,
            num_replicas,
            rank,
            shuffle_seed: None,
            epoch: 0,
        })
    }

    /// Shuffle indices with a generator seeded by `seed + epoch`.
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn num_replicas(&self) -> usize {
        self.num_replicas
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    fn total_size(&self) -> usize {
        self.len() * self.num_replicas
    }
}

impl Sampler for DistributedSampler {
    fn len(&self) -> usize {
        (self.num_records + self.num_replicas - 1) / self.num_replicas
    }

    fn indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.num_records).collect();

        if let Some(seed) = self.shuffle_seed {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(self.epoch as u64));
            indices.shuffle(&mut rng);
        }

        indices
            .iter()
            .cycle()
            .take(self.total_size())
            .skip(self.rank)
            .step_by(self.num_replicas)
            .cloned()
            .collect()
    }

    fn set_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
    }
}
