//! Stratified train/test partitioning with optional majority downsampling.
//!
//! All randomness comes from one `StdRng` seeded with the run seed, so a
//! (seed, ratio, downsample) triple always yields the same partition.

use crate::core::{Error, Result};
use crate::graph::Sequence;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, warn};

/// Disjoint training and testing collections.
#[derive(Clone, Debug, Default)]
pub struct DatasetSplit {
    pub train: Vec<Sequence>,
    pub test: Vec<Sequence>,
}

/// Group sequences by label, preserving stored order.
pub fn partition_by_label(sequences: Vec<Sequence>) -> [Vec<Sequence>; 2] {
    let mut classes: [Vec<Sequence>; 2] = [Vec::new(), Vec::new()];
    for sequence in sequences {
        let label = usize::from(sequence.label).min(1);
        classes[label].push(sequence);
    }
    classes
}

/// Subsample the larger class, without replacement, to the smaller class's size.
pub fn downsample_majority(classes: &mut [Vec<Sequence>; 2], rng: &mut StdRng) {
    let minority = classes[0].len().min(classes[1].len());
    if minority == 0 {
        warn!("Skipping downsampling: one class has no sequences");
        return;
    }
    for class in classes.iter_mut() {
        if class.len() > minority {
            class.shuffle(rng);
            class.truncate(minority);
        }
    }
}

/// Number of test sequences drawn from each class.
///
/// The total is `ceil(ratio * n)`; per-class shares follow the class
/// proportions with leftover slots going to the largest remainders.
pub fn allocate_test_counts(class_sizes: [usize; 2], test_ratio: f64) -> Result<[usize; 2]> {
    let n: usize = class_sizes.iter().sum();
    let n_test = (test_ratio * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(Error::InvalidDataset(format!(
            "split ratio {} over {} sequences leaves an empty partition",
            test_ratio, n
        )));
    }

    let mut counts = [0usize; 2];
    let mut remainders = [(0.0f64, 0usize); 2];
    for (label, &size) in class_sizes.iter().enumerate() {
        let exact = size as f64 * n_test as f64 / n as f64;
        counts[label] = exact.floor() as usize;
        remainders[label] = (exact - exact.floor(), label);
    }

    let mut order: Vec<usize> = vec![0, 1];
    order.sort_by(|&a, &b| {
        remainders[b]
            .0
            .partial_cmp(&remainders[a].0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(class_sizes[b].cmp(&class_sizes[a]))
            .then(a.cmp(&b))
    });

    let mut left = n_test - counts.iter().sum::<usize>();
    for label in order {
        if left == 0 {
            break;
        }
        if counts[label] < class_sizes[label] {
            counts[label] += 1;
            left -= 1;
        }
    }
    Ok(counts)
}

/// Stratified shuffle split keyed on label.
pub fn stratified_split(
    classes: [Vec<Sequence>; 2],
    test_ratio: f64,
    rng: &mut StdRng,
) -> Result<DatasetSplit> {
    let sizes = [classes[0].len(), classes[1].len()];
    let test_counts = allocate_test_counts(sizes, test_ratio)?;

    let mut split = DatasetSplit::default();
    for (mut class, n_test) in classes.into_iter().zip(test_counts) {
        class.shuffle(rng);
        let train_part = class.split_off(n_test);
        split.test.extend(class);
        split.train.extend(train_part);
    }
    split.train.shuffle(rng);
    split.test.shuffle(rng);

    debug!(
        train = split.train.len(),
        test = split.test.len(),
        "Stratified split complete"
    );
    Ok(split)
}

/// Full split pipeline: label partition, optional downsampling, stratified split.
pub fn split_sequences(
    sequences: Vec<Sequence>,
    test_ratio: f64,
    downsample: bool,
    seed: u64,
) -> Result<DatasetSplit> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut classes = partition_by_label(sequences);
    if downsample {
        downsample_majority(&mut classes, &mut rng);
    }
    stratified_split(classes, test_ratio, &mut rng)
}

/// Count of each label in a collection.
pub fn label_counts(sequences: &[Sequence]) -> [usize; 2] {
    let mut counts = [0usize; 2];
    for sequence in sequences {
        counts[usize::from(sequence.label).min(1)] += 1;
    }
    counts
}
