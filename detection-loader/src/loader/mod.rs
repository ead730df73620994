//! Batch loaders and the loader construction entry point.

mod data_loader;

pub use data_loader::*;

use crate::{
    collate::{CollateFn, Collator},
    common::*,
    config::LoaderConfig,
    dataset::{Batch, Dataset, Sampler, SequentialSampler},
    error::LoaderError,
    prefetch::PrefetchLoader,
    transform::{TransformConfig, TransformFactory},
};

/// The iterator over batches of one loader pass.
pub type BatchIter<'a> = Box<dyn Iterator<Item = Result<Batch>> + 'a>;

/// An iterable source of batches with a known length.
pub trait BatchLoader {
    /// Start a new pass over the batches.
    fn iter(&self) -> Result<BatchIter<'_>>;

    /// Number of batches per pass.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sampler that decides the sample order.
    fn sampler(&self) -> &dyn Sampler;

    fn sampler_mut(&mut self) -> &mut dyn Sampler;
}

/// The loader built by [create_loader].
#[derive(Debug)]
pub enum Loader<D>
where
    D: Dataset,
{
    /// Padded batches delivered on device with normalized images.
    Prefetch(PrefetchLoader<DataLoader<D>>),
    /// Plain stacked host batches.
    Plain(DataLoader<D>),
}

impl<D> Loader<D>
where
    D: Dataset,
{
    pub fn dataset(&self) -> &D {
        match self {
            Self::Prefetch(loader) => loader.inner().dataset(),
            Self::Plain(loader) => loader.dataset(),
        }
    }
}

impl<D> BatchLoader for Loader<D>
where
    D: Dataset,
{
    fn iter(&self) -> Result<BatchIter<'_>> {
        match self {
            Self::Prefetch(loader) => BatchLoader::iter(loader),
            Self::Plain(loader) => loader.iter(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Prefetch(loader) => loader.len(),
            Self::Plain(loader) => loader.len(),
        }
    }

    fn sampler(&self) -> &dyn Sampler {
        match self {
            Self::Prefetch(loader) => loader.sampler(),
            Self::Plain(loader) => loader.sampler(),
        }
    }

    fn sampler_mut(&mut self) -> &mut dyn Sampler {
        match self {
            Self::Prefetch(loader) => loader.sampler_mut(),
            Self::Plain(loader) => loader.sampler_mut(),
        }
    }
}

/// Build an evaluation loader over `dataset`.
///
/// The transform built by `transform_factory` is attached to the dataset
/// before any sample is drawn. Requesting the training path fails before the
/// dataset is touched.
pub fn create_loader<D, F>(
    mut dataset: D,
    transform_factory: &F,
    config: &LoaderConfig,
) -> Result<Loader<D>>
where
    D: Dataset,
    F: TransformFactory + ?Sized,
{
    let LoaderConfig {
        ref input_size,
        batch_size,
        is_training,
        use_prefetcher,
        interpolation,
        num_workers,
        pin_memory,
        device,
        fp16,
        max_instances,
        drop_last,
        ..
    } = *config;

    if is_training {
        bail!(LoaderError::UnsupportedMode { mode: "training" });
    }
    config.validate()?;

    let transform = transform_factory.build(&TransformConfig {
        image_size: input_size.image_size()?,
        interpolation,
        use_prefetcher,
        mean: config.mean(),
        std: config.std(),
    })?;
    dataset.set_transform(transform);

    let collate = if use_prefetcher {
        CollateFn::Fast(Collator::new(max_instances.get())?)
    } else {
        CollateFn::Default
    };
    let sampler = Box::new(SequentialSampler::new(dataset.len()));
    let loader = DataLoaderInit {
        batch_size: batch_size.get(),
        num_workers,
        pin_memory,
        drop_last,
        collate,
    }
    .build(dataset, sampler)?;

    info!(
        "created evaluation loader with {} batches of size {}, prefetcher {}",
        loader.len(),
        batch_size,
        if use_prefetcher { "enabled" } else { "disabled" }
    );

    let loader = if use_prefetcher {
        let loader = PrefetchLoader::new(loader, config.mean(), config.std(), device)?.fp16(fp16);
        Loader::Prefetch(loader)
    } else {
        Loader::Plain(loader)
    };

    Ok(loader)
}
