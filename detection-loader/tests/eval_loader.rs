use anyhow::{ensure, Result};
use approx::assert_abs_diff_eq;
use detection_loader::{
    create_loader,
    error::LoaderError,
    transform::{identity_factory, Transform, TransformConfig},
    Annotation, BatchLoader, Dataset, Loader, LoaderConfig, Sample, MAX_NUM_INSTANCES,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tch::{IndexOp, Kind, Tensor};

lazy_static::lazy_static! {
    static ref CONFIG_DIR: PathBuf = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("cfg");
}

/// Detection samples with deterministic pixels and a varying number of boxes.
#[derive(Debug)]
struct SyntheticDetections {
    len: usize,
    height: i64,
    width: i64,
    transform: Option<Arc<dyn Transform>>,
}

impl SyntheticDetections {
    fn new(len: usize, height: i64, width: i64) -> Self {
        Self {
            len,
            height,
            width,
            transform: None,
        }
    }

    fn num_boxes(index: usize) -> i64 {
        (index as i64 * 37) % 130
    }

    fn image(&self, index: usize) -> Tensor {
        let num_pixels = 3 * self.height * self.width;
        let pixels: Vec<u8> = (0..num_pixels)
            .map(|pos| ((pos + index as i64 * 11) % 256) as u8)
            .collect();
        Tensor::of_slice(&pixels).view([3, self.height, self.width])
    }
}

impl Dataset for SyntheticDetections {
    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, index: usize) -> Result<Sample> {
        ensure!(index < self.len, "index {} out of range", index);

        let num_boxes = Self::num_boxes(index);
        let bboxes: Vec<f32> = (0..num_boxes)
            .flat_map(|box_index| {
                let index = index as f32;
                let box_index = box_index as f32;
                [index, box_index, index + box_index, 1.0]
            })
            .collect();
        let classes: Vec<i64> = (0..num_boxes).map(|box_index| box_index % 80).collect();

        let sample = Sample::new(self.image(index))
            .with_annotation("img_id", index as i64)
            .with_annotation("img_scale", 0.5f64)
            .with_annotation(
                "img_size",
                Annotation::Fixed(Tensor::of_slice(&[self.height, self.width])),
            )
            .with_annotation(
                "bbox",
                Annotation::Instances(Tensor::of_slice(&bboxes).view([num_boxes, 4])),
            )
            .with_annotation("cls", Annotation::Instances(Tensor::of_slice(&classes)));

        match &self.transform {
            Some(transform) => transform.apply(sample),
            None => Ok(sample),
        }
    }

    fn set_transform(&mut self, transform: Arc<dyn Transform>) {
        self.transform = Some(transform);
    }
}

/// A dataset that must not be touched.
#[derive(Debug)]
struct UntouchedDataset;

impl Dataset for UntouchedDataset {
    fn len(&self) -> usize {
        panic!("the dataset length was queried")
    }

    fn get(&self, index: usize) -> Result<Sample> {
        panic!("sample {} was requested", index)
    }

    fn set_transform(&mut self, _transform: Arc<dyn Transform>) {
        panic!("a transform was attached")
    }
}

/// Rejects samples whose image does not match the configured size.
#[derive(Debug)]
struct CheckImageSize {
    size: [i64; 2],
}

impl Transform for CheckImageSize {
    fn apply(&self, sample: Sample) -> Result<Sample> {
        let size = sample.image.size();
        ensure!(
            size[1..] == self.size,
            "expect image size {:?}, but get {:?}",
            self.size,
            size
        );
        ensure!(sample.image.kind() == Kind::Uint8, "expect uint8 images");
        Ok(sample)
    }
}

fn check_size_factory(config: &TransformConfig) -> Result<Arc<dyn Transform>> {
    let [height, width] = config.image_size;
    Ok(Arc::new(CheckImageSize {
        size: [height as i64, width as i64],
    }))
}

fn load_config(file_name: &str) -> Result<LoaderConfig> {
    LoaderConfig::open(CONFIG_DIR.join(file_name))
}

fn max_abs_diff(lhs: &Tensor, rhs: &Tensor) -> f64 {
    (lhs.to_kind(Kind::Double) - rhs.to_kind(Kind::Double))
        .abs()
        .max()
        .double_value(&[])
}

#[test]
fn load_config_files() -> Result<()> {
    let eval = load_config("coco-eval.json5")?;
    eval.validate()?;
    assert_eq!(eval.input_size.image_size()?, [8, 6]);
    assert_eq!(eval.batch_size.get(), 4);
    assert!(eval.use_prefetcher);

    let plain = load_config("coco-eval-plain.json5")?;
    assert_eq!(plain.input_size.image_size()?, [8, 8]);
    assert!(!plain.use_prefetcher);

    let train = load_config("coco-train.json5")?;
    assert!(train.is_training);

    assert!(load_config("missing.json5").is_err());
    Ok(())
}

#[test]
fn training_config_is_rejected_without_touching_dataset() -> Result<()> {
    let config = load_config("coco-train.json5")?;
    let err = create_loader(UntouchedDataset, &identity_factory, &config).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LoaderError>(),
        Some(LoaderError::UnsupportedMode { .. })
    ));
    Ok(())
}

#[test]
fn prefetched_batches_recover_original_samples() -> Result<()> {
    let _ = pretty_env_logger::try_init();

    let config = load_config("coco-eval.json5")?;
    let dataset = SyntheticDetections::new(10, 8, 6);
    let loader = create_loader(dataset, &check_size_factory, &config)?;
    assert!(matches!(loader, Loader::Prefetch(_)));
    assert_eq!(loader.len(), 3);

    let mean = Tensor::of_slice(&config.mean().map(|value| value * 255.0)).view([1, 3, 1, 1]);
    let std = Tensor::of_slice(&config.std().map(|value| value * 255.0)).view([1, 3, 1, 1]);
    let max_instances = MAX_NUM_INSTANCES as i64;

    let mut num_samples = 0;
    for batch in loader.iter()? {
        let batch = batch?;
        let batch_size = batch.batch_size() as i64;
        assert_eq!(batch.images.size(), [batch_size, 3, 8, 6]);
        assert_eq!(batch.images.kind(), Kind::Float);
        assert_eq!(batch.annotations["bbox"].size(), [batch_size, max_instances, 4]);
        assert_eq!(batch.annotations["cls"].size(), [batch_size, max_instances]);
        assert_eq!(batch.annotations["img_size"].size(), [batch_size, 2]);

        let pixels = batch.images.to_kind(Kind::Double) * &std + &mean;

        for position in 0..batch_size {
            let index = batch.annotations["img_id"].int64_value(&[position]) as usize;
            assert_eq!(index, num_samples);
            num_samples += 1;

            let expect = loader.dataset().image(index);
            assert!(max_abs_diff(&pixels.i(position), &expect) < 1e-2);

            assert_abs_diff_eq!(
                batch.annotations["img_scale"].double_value(&[position]),
                0.5
            );

            let num_kept = SyntheticDetections::num_boxes(index).min(max_instances);
            assert_eq!(
                batch.num_instances["bbox"].int64_value(&[position]),
                num_kept
            );
            assert_eq!(batch.num_instances["cls"].int64_value(&[position]), num_kept);

            let bboxes = batch.annotations["bbox"].i(position);
            if num_kept > 0 {
                let last = num_kept - 1;
                assert_abs_diff_eq!(bboxes.double_value(&[last, 0]), index as f64);
                assert_abs_diff_eq!(bboxes.double_value(&[last, 1]), last as f64);
            }
            let padding = bboxes.i(num_kept..);
            assert_abs_diff_eq!(padding.abs().sum(Kind::Double).double_value(&[]), 0.0);
        }
    }
    assert_eq!(num_samples, 10);
    Ok(())
}

#[test]
fn batch_counts_follow_dataset_size() -> Result<()> {
    let config = load_config("coco-eval.json5")?;

    for (num_samples, expect) in [(0, vec![]), (3, vec![3]), (9, vec![4, 4, 1])] {
        let dataset = SyntheticDetections::new(num_samples, 8, 6);
        let loader = create_loader(dataset, &identity_factory, &config)?;
        assert_eq!(loader.len(), expect.len());

        let sizes: Vec<usize> = loader
            .iter()?
            .map(|batch| batch.map(|batch| batch.batch_size()))
            .collect::<Result<_>>()?;
        assert_eq!(sizes, expect);
    }
    Ok(())
}

#[test]
fn plain_loader_keeps_host_batches() -> Result<()> {
    let config = load_config("coco-eval-plain.json5")?;

    // every sample carries a distinct number of boxes, so only equal-length
    // instance arrays can be stacked without padding
    #[derive(Debug)]
    struct WithoutInstances(SyntheticDetections);

    impl Dataset for WithoutInstances {
        fn len(&self) -> usize {
            self.0.len()
        }

        fn get(&self, index: usize) -> Result<Sample> {
            let mut sample = self.0.get(index)?;
            sample.annotations.shift_remove("bbox");
            sample.annotations.shift_remove("cls");
            Ok(sample)
        }

        fn set_transform(&mut self, transform: Arc<dyn Transform>) {
            self.0.set_transform(transform);
        }
    }

    let dataset = WithoutInstances(SyntheticDetections::new(4, 8, 8));
    let loader = create_loader(dataset, &check_size_factory, &config)?;
    assert!(matches!(loader, Loader::Plain(_)));

    let batches: Vec<_> = loader.iter()?.collect::<Result<_>>()?;
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].batch_size(), 1);

    let first = &batches[0];
    assert_eq!(first.images.kind(), Kind::Uint8);
    assert_eq!(first.images.size(), [3, 3, 8, 8]);
    assert_eq!(first.annotations["img_id"].kind(), Kind::Int64);
    assert_eq!(first.annotations["img_scale"].kind(), Kind::Double);
    assert!(first.num_instances.is_empty());

    let expect = loader.dataset().0.image(2);
    assert_eq!(max_abs_diff(&first.images.i(2), &expect), 0.0);
    Ok(())
}

#[test]
fn plain_loader_rejects_ragged_instances() -> Result<()> {
    let config = load_config("coco-eval-plain.json5")?;
    let loader = create_loader(
        SyntheticDetections::new(3, 8, 8),
        &identity_factory,
        &config,
    )?;
    let result = loader.iter()?.next().unwrap();
    assert!(result.is_err());
    Ok(())
}
