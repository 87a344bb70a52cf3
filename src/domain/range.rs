// Range aggregation - energy and activity over full, zoom and marked windows
use crate::domain::energy::DerivedSeries;
use crate::domain::subsystem::{PerSubsystem, Subsystem};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One end of a window, either a sample index or an instant resolved to the nearest sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Index(usize),
    Instant(NaiveDateTime),
}

/// The window statistics are requested for. Bounds may be given in either order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeQuery {
    /// The entire series.
    Full,
    /// The visible chart window.
    Zoom { start: Bound, end: Bound },
    /// Two user-marked points.
    Marked { first: Bound, second: Bound },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeScope {
    Full,
    Zoom,
    Marked,
}

impl RangeQuery {
    pub fn scope(&self) -> RangeScope {
        match self {
            RangeQuery::Full => RangeScope::Full,
            RangeQuery::Zoom { .. } => RangeScope::Zoom,
            RangeQuery::Marked { .. } => RangeScope::Marked,
        }
    }

    /// Inclusive `(start, end)` indices with `start <= end`, or `None` for an empty series.
    pub fn resolve(&self, series: &DerivedSeries) -> Option<(usize, usize)> {
        let last = series.len().checked_sub(1)?;
        let (a, b) = match *self {
            RangeQuery::Full => return Some((0, last)),
            RangeQuery::Zoom { start, end } => (start, end),
            RangeQuery::Marked { first, second } => (first, second),
        };
        let a = resolve_bound(series, a, last)?;
        let b = resolve_bound(series, b, last)?;
        Some((a.min(b), a.max(b)))
    }
}

fn resolve_bound(series: &DerivedSeries, bound: Bound, last: usize) -> Option<usize> {
    match bound {
        Bound::Index(index) => Some(index.min(last)),
        Bound::Instant(instant) => nearest_index(series.timestamps(), instant),
    }
}

/// Index of the sample closest to `instant` in a sorted slice. Ties go to the earlier sample.
pub fn nearest_index(timestamps: &[NaiveDateTime], instant: NaiveDateTime) -> Option<usize> {
    if timestamps.is_empty() {
        return None;
    }
    let after = timestamps.partition_point(|ts| *ts < instant);
    if after == 0 {
        return Some(0);
    }
    if after == timestamps.len() {
        return Some(after - 1);
    }
    let before = after - 1;
    if instant - timestamps[before] <= timestamps[after] - instant {
        Some(before)
    } else {
        Some(after)
    }
}

/// Energy and activity figures for one subsystem over one window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RangeStats {
    pub energy_kwh: f64,
    pub active_sample_count: usize,
    pub total_sample_count: usize,
    pub active_percent: f64,
}

/// Per-subsystem statistics for a resolved window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeSummary {
    pub scope: RangeScope,
    pub start_index: Option<usize>,
    pub end_index: Option<usize>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub stats: PerSubsystem<RangeStats>,
}

/// Statistics over the inclusive window `[start, end]`; reversed bounds are swapped.
pub fn range_stats(series: &DerivedSeries, subsystem: Subsystem, start: usize, end: usize) -> RangeStats {
    let (start, end) = (start.min(end), start.max(end));
    if end >= series.len() {
        return RangeStats::default();
    }

    let total_sample_count = end - start + 1;
    let active_sample_count = series.active_between(subsystem, start, end);

    RangeStats {
        energy_kwh: series.energy_between(subsystem, start, end),
        active_sample_count,
        total_sample_count,
        active_percent: active_sample_count as f64 / total_sample_count as f64 * 100.0,
    }
}

pub fn range_summary(series: &DerivedSeries, query: &RangeQuery) -> RangeSummary {
    let window = query.resolve(series);
    let stats = match window {
        Some((start, end)) => PerSubsystem::from_fn(|subsystem| range_stats(series, subsystem, start, end)),
        None => PerSubsystem::default(),
    };

    RangeSummary {
        scope: query.scope(),
        start_index: window.map(|(start, _)| start),
        end_index: window.map(|(_, end)| end),
        start: window.map(|(start, _)| series.timestamps()[start]),
        end: window.map(|(_, end)| series.timestamps()[end]),
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::energy::DerivationSettings;
    use crate::domain::sample::HeatingSample;
    use crate::domain::test_support::{approx_eq, dhw_sample, heating_sample, minute, sample_at, solar_sample};
    use chrono::Duration;

    fn series() -> DerivedSeries {
        let samples: Vec<HeatingSample> = (0..60)
            .map(|m| match m % 5 {
                0 => solar_sample(m, 45.0 + m as f64 / 10.0, 40.0),
                1 => dhw_sample(m, Some(55.0)),
                2 => heating_sample(m, Some(35.0)),
                _ => sample_at(minute(m)),
            })
            .collect();
        DerivedSeries::derive(&samples, &DerivationSettings::default())
    }

    #[test]
    fn test_energy_is_additive_across_any_split() {
        let series = series();
        let last = series.len() - 1;

        for subsystem in Subsystem::ALL {
            let full = range_stats(&series, subsystem, 0, last).energy_kwh;
            for k in 0..last {
                let left = range_stats(&series, subsystem, 0, k).energy_kwh;
                let right = range_stats(&series, subsystem, k + 1, last).energy_kwh;
                assert_eq!(left + right, full, "{subsystem} split at {k}");
            }
        }
    }

    #[test]
    fn test_marker_order_does_not_matter() {
        let series = series();
        let forward = RangeQuery::Marked {
            first: Bound::Index(3),
            second: Bound::Index(7),
        };
        let reversed = RangeQuery::Marked {
            first: Bound::Index(7),
            second: Bound::Index(3),
        };

        assert_eq!(range_summary(&series, &forward), range_summary(&series, &reversed));
    }

    #[test]
    fn test_active_percent() {
        let series = series();
        let stats = range_stats(&series, Subsystem::Gas, 0, 9);

        assert_eq!(stats.total_sample_count, 10);
        assert_eq!(stats.active_sample_count, 2);
        assert!(approx_eq(stats.active_percent, 20.0, 1e-12));
    }

    #[test]
    fn test_full_range_matches_series_totals() {
        let series = series();
        let summary = range_summary(&series, &RangeQuery::Full);

        assert_eq!(summary.scope, RangeScope::Full);
        assert_eq!(summary.start_index, Some(0));
        assert_eq!(summary.end_index, Some(59));
        for subsystem in Subsystem::ALL {
            assert_eq!(summary.stats.get(subsystem).energy_kwh, series.total_energy_kwh(subsystem));
        }
    }

    #[test]
    fn test_zoom_by_instant_resolves_nearest_samples() {
        let series = series();
        let query = RangeQuery::Zoom {
            start: Bound::Instant(minute(10) + Duration::seconds(20)),
            end: Bound::Instant(minute(19) + Duration::seconds(40)),
        };

        assert_eq!(query.resolve(&series), Some((10, 20)));
    }

    #[test]
    fn test_nearest_index_edges() {
        let timestamps: Vec<NaiveDateTime> = (0..5).map(|m| minute(m * 2)).collect();

        assert_eq!(nearest_index(&timestamps, minute(-30)), Some(0));
        assert_eq!(nearest_index(&timestamps, minute(100)), Some(4));
        assert_eq!(nearest_index(&timestamps, minute(3)), Some(1));
        assert_eq!(nearest_index(&timestamps, minute(4)), Some(2));
        assert_eq!(nearest_index(&[], minute(4)), None);
    }

    #[test]
    fn test_index_bounds_are_clamped() {
        let series = series();
        let query = RangeQuery::Zoom {
            start: Bound::Index(50),
            end: Bound::Index(500),
        };

        assert_eq!(query.resolve(&series), Some((50, 59)));
    }

    #[test]
    fn test_empty_series_gives_zero_stats() {
        let empty = DerivedSeries::default();
        let summary = range_summary(&empty, &RangeQuery::Full);

        assert_eq!(summary.start_index, None);
        assert_eq!(summary.stats, PerSubsystem::default());
        assert_eq!(range_stats(&empty, Subsystem::Solar, 0, 0), RangeStats::default());
    }
}
