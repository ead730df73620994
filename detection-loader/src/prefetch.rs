//! Double-buffered device transfer and normalization of batches.

use crate::{
    common::*,
    dataset::{Batch, Sampler},
    loader::{BatchIter, BatchLoader},
    profiling::Timing,
    stream::{PendingTransfer, TransferStream},
};

/// Wraps a batch loader and delivers its batches on a device with normalized images.
///
/// The transfer of the next batch is issued before the current batch is
/// handed out, so the consumer works on batch `n` while batch `n + 1` is
/// copied and normalized on the transfer stream.
#[derive(Debug)]
pub struct PrefetchLoader<L>
where
    L: BatchLoader,
{
    loader: L,
    device: Device,
    /// The `[1, 3, 1, 1]` mean scaled by 255.
    mean: Tensor,
    /// The `[1, 3, 1, 1]` standard deviation scaled by 255.
    std: Tensor,
    fp16: bool,
}

impl<L> PrefetchLoader<L>
where
    L: BatchLoader,
{
    /// Create a prefetch loader with per-channel mean and std in `[0, 1]` range.
    pub fn new(loader: L, mean: [f64; 3], std: [f64; 3], device: Device) -> Result<Self> {
        ensure!(
            std.iter().all(|&value| value > 0.0),
            "std values must be positive, but get {:?}",
            std
        );

        let to_tensor = |values: [f64; 3]| {
            let scaled = values.map(|value| (value * 255.0) as f32);
            Tensor::of_slice(&scaled)
                .view([1, 3, 1, 1])
                .to_device(device)
        };

        Ok(Self {
            loader,
            device,
            mean: to_tensor(mean),
            std: to_tensor(std),
            fp16: false,
        })
    }

    /// Deliver images in half precision.
    pub fn fp16(mut self, enabled: bool) -> Self {
        self.fp16 = enabled;
        self
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn mean(&self) -> &Tensor {
        &self.mean
    }

    pub fn std(&self) -> &Tensor {
        &self.std
    }

    pub fn inner(&self) -> &L {
        &self.loader
    }

    pub fn into_inner(self) -> L {
        self.loader
    }

    /// Start one pass over the underlying loader with a fresh transfer stream.
    pub fn iter(&self) -> Result<PrefetchIter<'_>> {
        let source = self.loader.iter()?;

        let stream = {
            let device = self.device;
            let mean = self.mean.shallow_clone();
            let std = self.std.shallow_clone();
            let fp16 = self.fp16;

            TransferStream::spawn("prefetch-transfer", move |batch| {
                transfer_batch(batch, device, &mean, &std, fp16)
            })?
        };

        Ok(PrefetchIter {
            source,
            stream,
            pending: None,
            deferred_error: None,
            exhausted: false,
        })
    }
}

impl<L> BatchLoader for PrefetchLoader<L>
where
    L: BatchLoader,
{
    fn iter(&self) -> Result<BatchIter<'_>> {
        Ok(Box::new(PrefetchLoader::iter(self)?))
    }

    fn len(&self) -> usize {
        self.loader.len()
    }

    fn sampler(&self) -> &dyn Sampler {
        self.loader.sampler()
    }

    fn sampler_mut(&mut self) -> &mut dyn Sampler {
        self.loader.sampler_mut()
    }
}

/// One pass of a [PrefetchLoader].
///
/// At most one transfer is in flight. Dropping the iterator abandons it.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct PrefetchIter<'a> {
    #[derivative(Debug = "ignore")]
    source: BatchIter<'a>,
    stream: TransferStream,
    pending: Option<PendingTransfer>,
    deferred_error: Option<Error>,
    exhausted: bool,
}

impl Iterator for PrefetchIter<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(err) = self.deferred_error.take() {
                return Some(Err(err));
            }

            if self.exhausted {
                return self.pending.take().map(PendingTransfer::wait);
            }

            match self.source.next() {
                Some(Ok(batch)) => {
                    let issued = match self.stream.submit(batch) {
                        Ok(issued) => issued,
                        Err(err) => return Some(Err(err)),
                    };

                    // the first batch only primes the pipeline
                    if let Some(current) = self.pending.replace(issued) {
                        return Some(current.wait());
                    }
                }
                Some(Err(err)) => match self.pending.take() {
                    Some(current) => {
                        self.deferred_error = Some(err);
                        return Some(current.wait());
                    }
                    None => return Some(Err(err)),
                },
                None => {
                    self.exhausted = true;
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let extra = self.pending.is_some() as usize + self.deferred_error.is_some() as usize;
        let (lower, upper) = self.source.size_hint();
        (
            lower.saturating_add(extra),
            upper.and_then(|upper| upper.checked_add(extra)),
        )
    }
}

/// Move a host batch to `device` and normalize its images as `(x - mean) / std`.
fn transfer_batch(
    batch: Batch,
    device: Device,
    mean: &Tensor,
    std: &Tensor,
    fp16: bool,
) -> Result<Batch> {
    let mut timing = Timing::new("prefetch_transfer");

    let Batch {
        images,
        annotations,
        num_instances,
    } = batch;

    let images = {
        let mut images = images
            .f_to_device_(device, images.kind(), true, false)?
            .f_to_kind(Kind::Float)?;
        timing.set_record("copy images");

        let _ = images.f_sub_(mean)?;
        let _ = images.f_div_(std)?;
        timing.set_record("normalize");

        if fp16 {
            images.f_to_kind(Kind::Half)?
        } else {
            images
        }
    };

    let batch = Batch {
        images,
        annotations,
        num_instances,
    }
    .try_map_tensors(|tensor| {
        if tensor.device() == device {
            return Ok(tensor);
        }
        let kind = tensor.kind();
        Ok(tensor.f_to_device_(device, kind, true, false)?)
    })?;
    timing.set_record("copy annotations");

    timing.report();
    Ok(batch)
}
