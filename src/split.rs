use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::errors::SplitError;

pub const TEST_FRACTION: f64 = 0.2;
pub const RANDOM_STATE: u64 = 42;

/// Row positions of each partition, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffled train/test partition that keeps each class's share in both halves.
///
/// Every class contributes at least one row to each side, so a class with a
/// single member (or a single-class label set) is rejected up front.
pub fn stratified_split(labels: &[usize], test_fraction: f64, seed: u64) -> Result<SplitIndices, SplitError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(SplitError::InvalidFraction(test_fraction));
    }

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (row, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(row);
    }

    if by_class.len() < 2 {
        return Err(SplitError::TooFewClasses(by_class.len()));
    }
    if let Some((&label, members)) = by_class.iter().find(|(_, members)| members.len() < 2) {
        return Err(SplitError::ClassTooSmall {
            label,
            count: members.len(),
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for members in by_class.values_mut() {
        members.shuffle(&mut rng);
        let n_test = ((members.len() as f64 * test_fraction).round() as usize).clamp(1, members.len() - 1);
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();

    Ok(SplitIndices { train, test })
}
