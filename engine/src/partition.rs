//! Splitting the output index space into disjoint contiguous ranges.
//!
//! Ranges are in *units*: rows or flattened elements depending on the
//! [`Granularity`]. [`WorkRange::elements`] maps a unit range onto the
//! flattened element space every worker writes into.

use std::ops::Range;

use crate::config::{Granularity, Sizing};
use crate::Error;

/// Half-open range `[start, end)` of work units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkRange {
    pub start: usize,
    pub end: usize,
}

impl WorkRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Flattened element indices covered by this range in an output with
    /// `cols` columns.
    pub fn elements(&self, granularity: Granularity, cols: usize) -> Range<usize> {
        match granularity {
            Granularity::Rows => self.start * cols..self.end * cols,
            Granularity::Elements => self.start..self.end,
        }
    }
}

/// Splits `total_units` across `worker_count` workers.
///
/// The first `total_units % worker_count` workers get one extra unit, so no
/// two loads differ by more than one.
pub fn partition(total_units: usize, worker_count: usize) -> Result<Vec<WorkRange>, Error> {
    if total_units == 0 {
        return Err(Error::Configuration("nothing to partition".into()));
    }
    if worker_count == 0 {
        return Err(Error::Configuration("worker count must be positive".into()));
    }
    if worker_count > total_units {
        return Err(Error::Configuration(format!(
            "{worker_count} workers for {total_units} units would leave workers idle"
        )));
    }

    let base = total_units / worker_count;
    let remainder = total_units % worker_count;
    let mut ranges = Vec::with_capacity(worker_count);
    let mut start = 0;
    for i in 0..worker_count {
        let len = base + usize::from(i < remainder);
        ranges.push(WorkRange::new(start, start + len));
        start += len;
    }
    Ok(ranges)
}

/// Splits `total_units` into chunks of `quantum` units.
///
/// Worker count is `ceil(total_units / quantum)`; the last range is clipped
/// to `total_units`.
pub fn partition_by_quantum(total_units: usize, quantum: usize) -> Result<Vec<WorkRange>, Error> {
    if total_units == 0 {
        return Err(Error::Configuration("nothing to partition".into()));
    }
    if quantum == 0 {
        return Err(Error::Configuration("quantum must be positive".into()));
    }

    Ok((0..total_units.div_ceil(quantum))
        .map(|i| {
            let start = i * quantum;
            WorkRange::new(start, (start + quantum).min(total_units))
        })
        .collect())
}

/// Ranges for a `rows x cols` output under `sizing` and `granularity`.
pub fn plan(
    sizing: Sizing,
    granularity: Granularity,
    rows: usize,
    cols: usize,
) -> Result<Vec<WorkRange>, Error> {
    let total_units = match granularity {
        Granularity::Rows => rows,
        Granularity::Elements => rows.checked_mul(cols).ok_or_else(|| {
            Error::Configuration(format!("{rows}x{cols} output has too many elements"))
        })?,
    };
    match sizing {
        Sizing::Workers(count) => partition(total_units, count),
        Sizing::Quantum(quantum) => partition_by_quantum(total_units, quantum),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_exact_cover(ranges: &[WorkRange], total: usize) {
        let mut next = 0;
        for range in ranges {
            assert_eq!(range.start, next);
            assert!(!range.is_empty());
            next = range.end;
        }
        assert_eq!(next, total);
    }

    #[test]
    fn remainder_goes_to_first_workers() {
        let ranges = partition(10, 4).unwrap();
        let lens: Vec<_> = ranges.iter().map(WorkRange::len).collect();
        assert_eq!(lens, vec![3, 3, 2, 2]);
        assert_exact_cover(&ranges, 10);
    }

    #[test]
    fn single_worker_takes_everything() {
        assert_eq!(partition(7, 1).unwrap(), vec![WorkRange::new(0, 7)]);
    }

    #[test]
    fn invalid_inputs_are_configuration_errors() {
        assert!(matches!(partition(0, 1), Err(Error::Configuration(_))));
        assert!(matches!(partition(5, 0), Err(Error::Configuration(_))));
        assert!(matches!(partition(3, 4), Err(Error::Configuration(_))));
        assert!(matches!(partition_by_quantum(0, 2), Err(Error::Configuration(_))));
        assert!(matches!(partition_by_quantum(4, 0), Err(Error::Configuration(_))));
    }

    #[test]
    fn quantum_clips_last_range() {
        let ranges = partition_by_quantum(10, 4).unwrap();
        assert_eq!(
            ranges,
            vec![WorkRange::new(0, 4), WorkRange::new(4, 8), WorkRange::new(8, 10)]
        );
    }

    #[test]
    fn quantum_larger_than_total_is_one_worker() {
        assert_eq!(partition_by_quantum(3, 100).unwrap(), vec![WorkRange::new(0, 3)]);
    }

    #[test]
    fn row_ranges_map_to_whole_rows_of_elements() {
        let range = WorkRange::new(1, 3);
        assert_eq!(range.elements(Granularity::Rows, 5), 5..15);
        assert_eq!(range.elements(Granularity::Elements, 5), 1..3);
    }

    #[test]
    fn plan_uses_granularity_for_unit_count() {
        let rows = plan(Sizing::Workers(2), Granularity::Rows, 3, 4).unwrap();
        assert_eq!(rows, vec![WorkRange::new(0, 2), WorkRange::new(2, 3)]);

        let elements = plan(Sizing::Workers(5), Granularity::Elements, 3, 4).unwrap();
        assert_exact_cover(&elements, 12);

        assert!(plan(Sizing::Workers(4), Granularity::Rows, 3, 4).is_err());
        assert_eq!(plan(Sizing::Quantum(5), Granularity::Elements, 3, 4).unwrap().len(), 3);
    }

    proptest! {
        #[test]
        fn balanced_partition_covers_exactly_once(
            (total, workers) in (1usize..2000).prop_flat_map(|t| (Just(t), 1..=t))
        ) {
            let ranges = partition(total, workers).unwrap();
            prop_assert_eq!(ranges.len(), workers);
            assert_exact_cover(&ranges, total);

            let max = ranges.iter().map(WorkRange::len).max().unwrap();
            let min = ranges.iter().map(WorkRange::len).min().unwrap();
            prop_assert!(max - min <= 1);
        }

        #[test]
        fn quantum_partition_covers_exactly_once(total in 1usize..2000, quantum in 1usize..300) {
            let ranges = partition_by_quantum(total, quantum).unwrap();
            prop_assert_eq!(ranges.len(), total.div_ceil(quantum));
            assert_exact_cover(&ranges, total);

            let (last, head) = ranges.split_last().unwrap();
            prop_assert!(head.iter().all(|r| r.len() == quantum));
            prop_assert_eq!(last.len(), total - (ranges.len() - 1) * quantum);
        }
    }
}
