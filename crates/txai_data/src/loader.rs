//! Dataloader implementations for batched iteration.

use burn::prelude::*;
use ndarray::{Array2, Array3, Axis};
use rand::seq::SliceRandom;

use crate::dataset::{TSDataset, TSDatasets};
use crate::error::{DataError, Result};
use txai_core::{array2_to_tensor, array3_to_tensor, Seed, Split, TSBatch, TSTensor};

/// A dataloader that produces Burn batches from a dataset.
///
/// Shuffling draws a fresh order per epoch from `seed.derive("epoch{n}")`, so
/// a fixed seed reproduces the whole training schedule.
///
/// ```rust,ignore
/// let loader = TSDataLoader::builder(dataset)
///     .batch_size(64)
///     .shuffle(true)
///     .seed(Seed::new(2021))
///     .build()?;
///
/// for batch in loader.iter_epoch::<B>(&device, epoch) {
///     let batch = batch?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TSDataLoader {
    dataset: TSDataset,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: Seed,
    split: Split,
}

impl TSDataLoader {
    /// Create a new dataloader builder.
    #[must_use]
    pub fn builder(dataset: TSDataset) -> TSDataLoaderBuilder {
        TSDataLoaderBuilder::new(dataset)
    }

    /// The dataset.
    #[must_use]
    pub fn dataset(&self) -> &TSDataset {
        &self.dataset
    }

    /// Batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches per epoch.
    #[must_use]
    pub fn n_batches(&self) -> usize {
        let n = self.dataset.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// True when the dataset is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Split this loader serves.
    #[must_use]
    pub fn split(&self) -> Split {
        self.split
    }

    /// Iterate the first epoch.
    #[must_use]
    pub fn iter<B: Backend>(&self, device: &B::Device) -> TSDataLoaderIter<'_, B> {
        self.iter_epoch(device, 0)
    }

    /// Iterate epoch `epoch`; the order differs between epochs when shuffling.
    #[must_use]
    pub fn iter_epoch<B: Backend>(&self, device: &B::Device, epoch: usize) -> TSDataLoaderIter<'_, B> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            let mut rng = self.seed.derive(&format!("epoch{epoch}")).to_rng();
            indices.shuffle(&mut rng);
        }
        TSDataLoaderIter {
            loader: self,
            device: device.clone(),
            indices,
            current_batch: 0,
            n_batches: self.n_batches(),
        }
    }

    /// Iterate host-side `(x, y)` array batches in dataset order.
    pub fn array_batches(&self) -> impl Iterator<Item = (Array3<f32>, Option<Array2<f32>>)> + '_ {
        let n = self.dataset.len();
        (0..self.n_batches()).map(move |b| {
            let start = b * self.batch_size;
            let end = (start + self.batch_size).min(n);
            let x = self
                .dataset
                .x()
                .slice_axis(Axis(0), (start..end).into())
                .to_owned();
            let y = self
                .dataset
                .y()
                .map(|y| y.slice_axis(Axis(0), (start..end).into()).to_owned());
            (x, y)
        })
    }
}

/// Builder for [`TSDataLoader`].
#[derive(Debug)]
pub struct TSDataLoaderBuilder {
    dataset: TSDataset,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: Seed,
    split: Split,
}

impl TSDataLoaderBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new(dataset: TSDataset) -> Self {
        Self {
            dataset,
            batch_size: 32,
            shuffle: false,
            drop_last: false,
            seed: Seed::default(),
            split: Split::Train,
        }
    }

    /// Set the batch size.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable or disable shuffling.
    #[must_use]
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Enable or disable dropping the last incomplete batch.
    #[must_use]
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Set the seed for shuffling.
    #[must_use]
    pub fn seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    /// Set the split served.
    #[must_use]
    pub fn split(mut self, split: Split) -> Self {
        self.split = split;
        self
    }

    /// Build the dataloader.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero batch size or an empty dataset.
    pub fn build(self) -> Result<TSDataLoader> {
        if self.batch_size == 0 {
            return Err(DataError::InvalidBatchSize(
                "Batch size must be greater than 0".to_string(),
            ));
        }
        if self.dataset.is_empty() {
            return Err(DataError::EmptyDataset);
        }
        Ok(TSDataLoader {
            dataset: self.dataset,
            batch_size: self.batch_size,
            shuffle: self.shuffle,
            drop_last: self.drop_last,
            seed: self.seed,
            split: self.split,
        })
    }
}

/// Iterator over batches from a [`TSDataLoader`].
pub struct TSDataLoaderIter<'a, B: Backend> {
    loader: &'a TSDataLoader,
    device: B::Device,
    indices: Vec<usize>,
    current_batch: usize,
    n_batches: usize,
}

impl<B: Backend> Iterator for TSDataLoaderIter<'_, B> {
    type Item = Result<TSBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_batch >= self.n_batches {
            return None;
        }
        let start = self.current_batch * self.loader.batch_size;
        let end = (start + self.loader.batch_size).min(self.indices.len());
        self.current_batch += 1;
        Some(self.create_batch(start..end))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.n_batches - self.current_batch;
        (remaining, Some(remaining))
    }
}

impl<B: Backend> ExactSizeIterator for TSDataLoaderIter<'_, B> {}

impl<B: Backend> TSDataLoaderIter<'_, B> {
    fn create_batch(&self, range: std::ops::Range<usize>) -> Result<TSBatch<B>> {
        let dataset = &self.loader.dataset;
        let indices = &self.indices[range];

        let x = dataset.x().select(Axis(0), indices);
        let x = TSTensor::new(array3_to_tensor::<B>(&x, &self.device));

        match dataset.y() {
            Some(y) => {
                let y = y.select(Axis(0), indices);
                Ok(TSBatch::with_target(x, array2_to_tensor::<B>(&y, &self.device))?)
            }
            None => Ok(TSBatch::new(x)),
        }
    }
}

/// Loaders for the three parts of one fold.
#[derive(Debug, Clone)]
pub struct TSDataLoaders {
    train: TSDataLoader,
    valid: TSDataLoader,
    test: TSDataLoader,
}

impl TSDataLoaders {
    /// Build loaders for a fold.
    ///
    /// The training loader shuffles with `seed.derive("train")`; validation and
    /// test keep dataset order. `test_batch_size` applies to the test loader.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero batch size or an empty part.
    pub fn from_datasets(
        data: &TSDatasets,
        batch_size: usize,
        test_batch_size: usize,
        seed: Seed,
    ) -> Result<Self> {
        let train = TSDataLoader::builder(data.train().clone())
            .batch_size(batch_size)
            .shuffle(true)
            .seed(seed.derive("train"))
            .split(Split::Train)
            .build()?;
        let valid = TSDataLoader::builder(data.valid().clone())
            .batch_size(batch_size)
            .split(Split::Valid)
            .build()?;
        let test = TSDataLoader::builder(data.test().clone())
            .batch_size(test_batch_size)
            .split(Split::Test)
            .build()?;
        Ok(Self { train, valid, test })
    }

    /// Training loader.
    #[must_use]
    pub fn train(&self) -> &TSDataLoader {
        &self.train
    }

    /// Validation loader.
    #[must_use]
    pub fn valid(&self) -> &TSDataLoader {
        &self.valid
    }

    /// Test loader.
    #[must_use]
    pub fn test(&self) -> &TSDataLoader {
        &self.test
    }

    /// Number of variables.
    #[must_use]
    pub fn n_vars(&self) -> usize {
        self.train.dataset().n_vars()
    }

    /// Sequence length.
    #[must_use]
    pub fn seq_len(&self) -> usize {
        self.train.dataset().seq_len()
    }
}
