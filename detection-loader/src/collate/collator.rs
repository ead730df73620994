use super::*;
use crate::{
    common::*,
    dataset::{Annotation, Batch, Sample},
    error::{CollateError, LoaderError},
};

/// The default capacity of the padded instance dimension.
pub const MAX_NUM_INSTANCES: usize = 100;

/// Merge samples into a batch with the default instance capacity.
pub fn fast_collate(samples: Vec<Sample>) -> Result<Batch> {
    Collator::default().collate(samples)
}

/// Merges samples into a batch, padding variable-length annotations to a fixed capacity.
///
/// Instance slots beyond a sample's own instances are filled with zeros.
/// Instances beyond the capacity are dropped. The number of kept instances
/// is reported in [Batch::num_instances].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collator {
    max_instances: usize,
}

impl Default for Collator {
    fn default() -> Self {
        Self {
            max_instances: MAX_NUM_INSTANCES,
        }
    }
}

impl Collator {
    pub fn new(max_instances: usize) -> Result<Self> {
        ensure!(
            max_instances > 0,
            LoaderError::InvalidConfig {
                reason: "max_instances must be positive".into()
            }
        );
        Ok(Self { max_instances })
    }

    pub fn max_instances(&self) -> usize {
        self.max_instances
    }

    pub fn collate(&self, samples: Vec<Sample>) -> Result<Batch> {
        let schema = BatchSchema::infer(samples.first().ok_or(CollateError::EmptyBatch)?);
        samples
            .iter()
            .enumerate()
            .try_for_each(|(index, sample)| schema.validate(index, sample))?;

        let device = samples[0].image.device();
        let batch_size = samples.len() as i64;
        let max_instances = self.max_instances as i64;

        // allocate zero-filled outputs
        let images = {
            let shape: Vec<_> = iter::once(batch_size)
                .chain(schema.image_shape().iter().cloned())
                .collect();
            Tensor::zeros(&shape, (Kind::Uint8, device))
        };
        let annotations: IndexMap<String, Tensor> = schema
            .fields()
            .iter()
            .map(|(name, kind)| {
                let shape = kind.output_shape(batch_size, max_instances);
                (name.clone(), Tensor::zeros(&shape, (kind.output_kind(), device)))
            })
            .collect();
        let num_instances: IndexMap<String, Tensor> = schema
            .fields()
            .iter()
            .filter(|(_, kind)| kind.is_variable())
            .map(|(name, _)| {
                (
                    name.clone(),
                    Tensor::zeros(&[batch_size], (Kind::Int64, device)),
                )
            })
            .collect();

        // fill in samples
        for (index, sample) in samples.into_iter().enumerate() {
            let index = index as i64;
            let Sample {
                image,
                annotations: values,
            } = sample;

            images.i(index).f_copy_(&image)?;

            for (name, value) in values {
                let target = &annotations[name.as_str()];

                match value {
                    Annotation::Float(value) => {
                        target.i(index).f_copy_(&Tensor::from(value))?;
                    }
                    Annotation::Int(value) => {
                        target.i(index).f_copy_(&Tensor::from(value))?;
                    }
                    Annotation::Fixed(tensor) => {
                        target.i(index).f_copy_(&tensor)?;
                    }
                    Annotation::Instances(tensor) if tensor.dim() == 0 => {
                        target.i(index).f_copy_(&tensor)?;
                    }
                    Annotation::Instances(tensor) => {
                        let num_total = tensor.size()[0];
                        let num_kept = num_total.min(max_instances);

                        if num_kept < num_total {
                            debug!(
                                "truncate field '{}' of sample {} from {} to {} instances",
                                name, index, num_total, num_kept
                            );
                        }
                        if num_kept > 0 {
                            target
                                .i((index, 0..num_kept))
                                .f_copy_(&tensor.f_narrow(0, 0, num_kept)?)?;
                        }
                        num_instances[name.as_str()]
                            .i(index)
                            .f_copy_(&Tensor::from(num_kept))?;
                    }
                }
            }
        }

        Ok(Batch {
            images,
            annotations,
            num_instances,
        })
    }
}
