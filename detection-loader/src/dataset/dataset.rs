use super::*;
use crate::{common::*, transform::Transform};

/// The dataset that can be random accessed by integer position.
///
/// Implementations own the transform attached by [create_loader](crate::loader::create_loader)
/// and apply it in [get](Dataset::get).
pub trait Dataset
where
    Self: Debug + Send + Sync,
{
    /// Get number of samples in the dataset.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the transformed sample at `index`.
    fn get(&self, index: usize) -> Result<Sample>;

    /// Replace the transform applied to every sample.
    fn set_transform(&mut self, transform: Arc<dyn Transform>);
}
