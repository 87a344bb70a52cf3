// Ordered, deduplicated sample history
use crate::domain::sample::HeatingSample;
use chrono::NaiveDateTime;
use std::collections::HashSet;

/// Chronologically sorted samples, unique by timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSeries {
    samples: Vec<HeatingSample>,
}

/// Result of merging a batch into an existing series.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub series: SampleSeries,
    /// Samples from the batch that were not already present, in chronological order.
    pub added: Vec<HeatingSample>,
    pub duplicates: usize,
}

impl MergeOutcome {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
    }
}

impl SampleSeries {
    /// Builds a series from samples in any order. The first occurrence of a timestamp wins.
    pub fn from_samples(samples: Vec<HeatingSample>) -> Self {
        SampleSeries::default().merge(samples).series
    }

    /// Merges `batch` into a copy of this series. Existing timestamps are never replaced,
    /// and within the batch later duplicates are discarded.
    pub fn merge(&self, batch: Vec<HeatingSample>) -> MergeOutcome {
        let mut seen: HashSet<NaiveDateTime> = self.samples.iter().map(|s| s.timestamp).collect();
        let mut added = Vec::new();
        let mut duplicates = 0;

        for sample in batch {
            if seen.insert(sample.timestamp) {
                added.push(sample);
            } else {
                duplicates += 1;
            }
        }

        added.sort_by_key(|s| s.timestamp);

        if added.is_empty() {
            return MergeOutcome {
                series: self.clone(),
                added,
                duplicates,
            };
        }

        let mut samples = Vec::with_capacity(self.samples.len() + added.len());
        samples.extend_from_slice(&self.samples);
        samples.extend_from_slice(&added);
        samples.sort_by_key(|s| s.timestamp);

        MergeOutcome {
            series: SampleSeries { samples },
            added,
            duplicates,
        }
    }

    pub fn as_slice(&self) -> &[HeatingSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_support::{minute, sample_at};

    fn batch(range: std::ops::Range<i64>) -> Vec<HeatingSample> {
        range.map(|m| sample_at(minute(m))).collect()
    }

    fn assert_strictly_sorted(series: &SampleSeries) {
        for pair in series.as_slice().windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
    }

    #[test]
    fn test_merge_sorts_out_of_order_batch() {
        let mut samples = batch(0..5);
        samples.reverse();

        let series = SampleSeries::from_samples(samples);

        assert_eq!(series.len(), 5);
        assert_strictly_sorted(&series);
    }

    #[test]
    fn test_merge_keeps_existing_sample_on_duplicate_key() {
        let mut original = sample_at(minute(0));
        original.collector_temp = 40.0;
        let series = SampleSeries::from_samples(vec![original]);

        let mut replacement = sample_at(minute(0));
        replacement.collector_temp = 99.0;
        let outcome = series.merge(vec![replacement]);

        assert!(outcome.is_noop());
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.series.as_slice()[0].collector_temp, 40.0);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let once = SampleSeries::default().merge(batch(0..20)).series;
        let twice = once.merge(batch(0..20));

        assert!(twice.is_noop());
        assert_eq!(twice.series, once);
    }

    #[test]
    fn test_reingest_with_new_samples_has_no_duplicates() {
        let first = SampleSeries::default().merge(batch(10..110)).series;

        let mut second_batch = batch(0..10);
        second_batch.extend(batch(10..110));
        let outcome = first.merge(second_batch);

        assert_eq!(outcome.series.len(), 110);
        assert_eq!(outcome.added.len(), 10);
        assert_eq!(outcome.duplicates, 100);
        assert_strictly_sorted(&outcome.series);
    }
}
