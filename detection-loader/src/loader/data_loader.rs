use super::*;
use crate::{
    collate::CollateFn,
    common::*,
    dataset::{Batch, Dataset, Sample, Sampler},
    error::LoaderError,
    profiling::Timing,
};
use rayon::prelude::*;

/// Options of a [DataLoader].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLoaderInit {
    pub batch_size: usize,
    /// Number of sample loading threads. Zero loads on the iterating thread.
    pub num_workers: usize,
    pub pin_memory: bool,
    pub drop_last: bool,
    pub collate: CollateFn,
}

impl DataLoaderInit {
    pub fn build<D>(self, dataset: D, sampler: Box<dyn Sampler>) -> Result<DataLoader<D>>
    where
        D: Dataset,
    {
        let Self {
            batch_size,
            num_workers,
            pin_memory,
            drop_last,
            collate,
        } = self;

        ensure!(
            batch_size > 0,
            LoaderError::InvalidConfig {
                reason: "batch_size must be positive".into()
            }
        );

        let pool = match num_workers {
            0 => None,
            _ => {
                let num_cpus = num_cpus::get();
                let num_threads = if num_workers > num_cpus {
                    warn!(
                        "num_workers = {} exceeds {} available cpus, use {} workers instead",
                        num_workers, num_cpus, num_cpus
                    );
                    num_cpus
                } else {
                    num_workers
                };

                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .thread_name(|index| format!("loader-worker-{}", index))
                    .build()?;
                Some(pool)
            }
        };

        Ok(DataLoader {
            dataset,
            sampler,
            batch_size,
            drop_last,
            pin_memory,
            collate,
            pool,
        })
    }
}

/// Draws samples in the order of a sampler and merges them into batches.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct DataLoader<D>
where
    D: Dataset,
{
    dataset: D,
    sampler: Box<dyn Sampler>,
    batch_size: usize,
    drop_last: bool,
    pin_memory: bool,
    collate: CollateFn,
    #[derivative(Debug = "ignore")]
    pool: Option<rayon::ThreadPool>,
}

impl<D> DataLoader<D>
where
    D: Dataset,
{
    pub fn dataset(&self) -> &D {
        &self.dataset
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn collate_fn(&self) -> CollateFn {
        self.collate
    }

    fn load_batch(&self, indices: &[usize]) -> Result<Batch> {
        let mut timing = Timing::new("data_loader");

        let samples: Vec<Sample> = match &self.pool {
            Some(pool) => pool.install(|| {
                indices
                    .par_iter()
                    .map(|&index| self.load_sample(index))
                    .collect::<Result<_>>()
            })?,
            None => indices
                .iter()
                .map(|&index| self.load_sample(index))
                .collect::<Result<_>>()?,
        };
        timing.set_record("load samples");

        let batch = self.collate.collate(samples)?;
        timing.set_record("collate");

        let batch = if self.pin_memory {
            batch.pin_memory()?
        } else {
            batch
        };
        timing.set_record("pin memory");

        timing.report();
        Ok(batch)
    }

    fn load_sample(&self, index: usize) -> Result<Sample> {
        self.dataset
            .get(index)
            .with_context(|| format!("failed to load sample {}", index))
    }
}

impl<D> BatchLoader for DataLoader<D>
where
    D: Dataset,
{
    fn iter(&self) -> Result<BatchIter<'_>> {
        let indices = self.sampler.indices();
        let chunks: Vec<Vec<usize>> = indices
            .chunks(self.batch_size)
            .filter(|chunk| !self.drop_last || chunk.len() == self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();

        let iter = chunks
            .into_iter()
            .map(move |indices| self.load_batch(&indices));
        Ok(Box::new(iter))
    }

    fn len(&self) -> usize {
        let num_samples = self.sampler.len();
        if self.drop_last {
            num_samples / self.batch_size
        } else {
            (num_samples + self.batch_size - 1) / self.batch_size
        }
    }

    fn sampler(&self) -> &dyn Sampler {
        self.sampler.as_ref()
    }

    fn sampler_mut(&mut self) -> &mut dyn Sampler {
        self.sampler.as_mut()
    }
}
