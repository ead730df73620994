use crate::{
    common::*,
    dataset::{Annotation, Batch, Sample},
    error::CollateError,
};

/// Stack samples into a batch without padding.
///
/// Scalars become `[batch]` tensors, keeping `Double` or `Int64` kind.
/// Arrays are stacked as they are and must share the same shape.
pub fn default_collate(samples: Vec<Sample>) -> Result<Batch> {
    ensure!(!samples.is_empty(), CollateError::EmptyBatch);

    let names = samples[0].annotations.keys().cloned().collect_vec();
    let mut images: Vec<Tensor> = Vec::with_capacity(samples.len());
    let mut columns: Vec<Vec<Tensor>> = names.iter().map(|_| vec![]).collect();

    for (index, sample) in samples.into_iter().enumerate() {
        let Sample {
            image,
            mut annotations,
        } = sample;

        if let Some(first) = images.first() {
            ensure!(
                first.size() == image.size(),
                CollateError::ImageShapeMismatch {
                    index,
                    expected: first.size(),
                    found: image.size(),
                    found_kind: image.kind(),
                }
            );
        }
        images.push(image);

        for (name, column) in izip!(&names, &mut columns) {
            let value = annotations.shift_remove(name).ok_or_else(|| {
                CollateError::SchemaMismatch {
                    index,
                    field: name.clone(),
                    expected: "present field".into(),
                    found: "missing field".into(),
                }
            })?;

            let tensor = match value {
                Annotation::Float(value) => Tensor::from(value),
                Annotation::Int(value) => Tensor::from(value),
                Annotation::Fixed(tensor) | Annotation::Instances(tensor) => tensor,
            };

            if let Some(first) = column.first() {
                ensure!(
                    first.size() == tensor.size(),
                    CollateError::SchemaMismatch {
                        index,
                        field: name.clone(),
                        expected: format!("shape {:?}", first.size()),
                        found: format!("shape {:?}", tensor.size()),
                    }
                );
            }
            column.push(tensor);
        }

        if let Some(extra) = annotations.keys().next() {
            bail!(CollateError::SchemaMismatch {
                index,
                field: extra.clone(),
                expected: "no such field".into(),
                found: "unexpected field".into(),
            });
        }
    }

    let images = Tensor::f_stack(&images, 0)?;
    let annotations: IndexMap<String, Tensor> = names
        .into_iter()
        .zip_eq(columns)
        .map(|(name, column)| Fallible::Ok((name, Tensor::f_stack(&column, 0)?)))
        .collect::<Result<_>>()?;

    Ok(Batch {
        images,
        annotations,
        num_instances: IndexMap::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: i64, num_boxes: i64) -> Sample {
        Sample::new(Tensor::zeros(&[3, 2, 2], (Kind::Uint8, Device::Cpu)))
            .with_annotation("img_id", id)
            .with_annotation("img_scale", 1.5f64)
            .with_annotation(
                "bbox",
                Annotation::Instances(Tensor::ones(&[num_boxes, 4], (Kind::Float, Device::Cpu))),
            )
    }

    #[test]
    fn stack_equal_shapes() -> Result<()> {
        let batch = default_collate(vec![sample(3, 2), sample(4, 2)])?;

        assert_eq!(batch.images.size(), [2, 3, 2, 2]);
        assert_eq!(batch.images.kind(), Kind::Uint8);
        assert_eq!(batch.annotations["bbox"].size(), [2, 2, 4]);
        assert_eq!(batch.annotations["img_id"].kind(), Kind::Int64);
        assert_eq!(batch.annotations["img_id"].int64_value(&[1]), 4);
        assert_eq!(batch.annotations["img_scale"].kind(), Kind::Double);
        assert_abs_diff_eq!(batch.annotations["img_scale"].double_value(&[0]), 1.5);
        assert!(batch.num_instances.is_empty());
        Ok(())
    }

    #[test]
    fn keep_field_order_and_values() -> Result<()> {
        let samples = (0..3i64)
            .map(|id| {
                Sample::new(Tensor::zeros(&[3, 2, 2], (Kind::Uint8, Device::Cpu)))
                    .with_annotation("img_id", id)
                    .with_annotation(
                        "img_size",
                        Annotation::Fixed(Tensor::of_slice(&[id * 10, id * 20])),
                    )
            })
            .collect_vec();
        let batch = default_collate(samples)?;

        assert_eq!(
            batch.annotations.keys().collect_vec(),
            ["img_id", "img_size"]
        );
        assert_eq!(batch.annotations["img_size"].size(), [3, 2]);
        assert_eq!(batch.annotations["img_size"].int64_value(&[2, 1]), 40);
        assert_eq!(batch.annotations["img_id"].int64_value(&[2]), 2);
        Ok(())
    }

    #[test]
    fn reject_ragged_arrays() {
        let err = default_collate(vec![sample(3, 2), sample(4, 3)]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CollateError>(),
            Some(CollateError::SchemaMismatch { index: 1, field, .. }) if field == "bbox"
        ));
    }
}
