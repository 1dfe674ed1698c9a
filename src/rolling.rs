use std::collections::HashMap;
use std::hash::Hash;

use chrono::{Duration, NaiveDateTime};

/// Per-group, time-sorted index of row positions.
///
/// Built once over the whole table, then queried per row with a trailing
/// window `(at - window, at]`. Entries sharing a timestamp are ordered by
/// original row position, but a window bound never splits them: every row
/// stamped `at` falls inside the window ending at `at`.
pub struct RollingIndex<K> {
    groups: HashMap<K, Vec<(NaiveDateTime, usize)>>,
}

impl<K: Eq + Hash + Copy> RollingIndex<K> {
    /// Builds the index from `(group key, timestamp)` pairs given in row order.
    pub fn build<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (K, NaiveDateTime)>,
    {
        let mut groups: HashMap<K, Vec<(NaiveDateTime, usize)>> = HashMap::new();
        for (row, (key, timestamp)) in rows.into_iter().enumerate() {
            groups.entry(key).or_default().push((timestamp, row));
        }

        for entries in groups.values_mut() {
            entries.sort_unstable();
        }

        Self { groups }
    }

    /// Rows of `key` whose timestamp lies in `(at - window, at]`. A window
    /// reaching past the earliest representable instant covers all earlier rows.
    pub fn window(&self, key: K, at: NaiveDateTime, window: Duration) -> impl Iterator<Item = usize> + '_ {
        let entries = self.groups.get(&key).map(Vec::as_slice).unwrap_or(&[]);

        let lower = match at.checked_sub_signed(window) {
            Some(start) => entries.partition_point(|&(timestamp, _)| timestamp <= start),
            None => 0,
        };
        let upper = entries.partition_point(|&(timestamp, _)| timestamp <= at);

        entries[lower.min(upper)..upper].iter().map(|&(_, row)| row)
    }

    /// Sum of `values` over the window.
    pub fn sum(&self, key: K, at: NaiveDateTime, window: Duration, values: &[f64]) -> f64 {
        self.window(key, at, window).map(|row| values[row]).sum()
    }

    /// Mean of `values` over the window, `None` when nothing falls inside it.
    pub fn mean(&self, key: K, at: NaiveDateTime, window: Duration, values: &[f64]) -> Option<f64> {
        let (total, count) = self
            .window(key, at, window)
            .fold((0.0, 0usize), |(total, count), row| (total + values[row], count + 1));

        if count == 0 {
            None
        } else {
            Some(total / count as f64)
        }
    }
}
