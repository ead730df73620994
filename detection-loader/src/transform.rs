//! The transform collaborator attached to datasets before loading.

use crate::{common::*, config::Interpolation, dataset::Sample};

/// A per-sample preprocessing step.
pub trait Transform
where
    Self: Debug + Send + Sync,
{
    fn apply(&self, sample: Sample) -> Result<Sample>;
}

/// The transform that passes samples through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Transform for Identity {
    fn apply(&self, sample: Sample) -> Result<Sample> {
        Ok(sample)
    }
}

/// Options handed to the evaluation transform builder.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformConfig {
    /// Target image size as `[height, width]`.
    pub image_size: [usize; 2],
    pub interpolation: Interpolation,
    /// If set, the transform must leave images in `Uint8` kind, since
    /// normalization happens on device.
    pub use_prefetcher: bool,
    pub mean: [f64; 3],
    pub std: [f64; 3],
}

/// Builds the evaluation transform for a loader.
pub trait TransformFactory {
    fn build(&self, config: &TransformConfig) -> Result<Arc<dyn Transform>>;
}

impl<F> TransformFactory for F
where
    F: Fn(&TransformConfig) -> Result<Arc<dyn Transform>>,
{
    fn build(&self, config: &TransformConfig) -> Result<Arc<dyn Transform>> {
        self(config)
    }
}

/// A [TransformFactory] that ignores the options and builds [Identity].
pub fn identity_factory(_config: &TransformConfig) -> Result<Arc<dyn Transform>> {
    Ok(Arc::new(Identity))
}
