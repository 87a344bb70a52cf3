// Activity intervals - maximal runs of active samples
use crate::domain::energy::DerivedSeries;
use crate::domain::subsystem::Subsystem;
use chrono::NaiveDateTime;
use serde::Serialize;

/// A maximal contiguous run of active samples for one subsystem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityInterval {
    pub subsystem: Subsystem,
    pub start_index: usize,
    pub end_index: usize,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Active samples in the run; one sample stands for one minute.
    pub sample_count: usize,
    pub energy_kwh: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct IntervalStats {
    pub count: usize,
    pub total_minutes: usize,
    pub longest_minutes: usize,
    pub mean_minutes: f64,
}

impl IntervalStats {
    pub fn from_intervals(intervals: &[ActivityInterval]) -> Self {
        let count = intervals.len();
        let total_minutes: usize = intervals.iter().map(|i| i.sample_count).sum();
        let longest_minutes = intervals.iter().map(|i| i.sample_count).max().unwrap_or(0);
        let mean_minutes = if count > 0 {
            total_minutes as f64 / count as f64
        } else {
            0.0
        };

        Self {
            count,
            total_minutes,
            longest_minutes,
            mean_minutes,
        }
    }
}

/// Active runs inside the inclusive window `[start, end]`. Runs crossing a window edge are clipped.
pub fn activity_intervals(
    series: &DerivedSeries,
    subsystem: Subsystem,
    start: usize,
    end: usize,
) -> Vec<ActivityInterval> {
    let samples = series.samples();
    if samples.is_empty() || start > end {
        return Vec::new();
    }
    let end = end.min(samples.len() - 1);

    let mut intervals = Vec::new();
    let mut run_start: Option<usize> = None;

    for index in start..=end {
        match (samples[index].is_active(subsystem), run_start) {
            (true, None) => run_start = Some(index),
            (false, Some(first)) => {
                intervals.push(build_interval(series, subsystem, first, index - 1));
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(first) = run_start {
        intervals.push(build_interval(series, subsystem, first, end));
    }

    intervals
}

fn build_interval(
    series: &DerivedSeries,
    subsystem: Subsystem,
    start_index: usize,
    end_index: usize,
) -> ActivityInterval {
    let timestamps = series.timestamps();
    ActivityInterval {
        subsystem,
        start_index,
        end_index,
        start: timestamps[start_index],
        end: timestamps[end_index],
        sample_count: end_index - start_index + 1,
        energy_kwh: series.energy_between(subsystem, start_index, end_index),
    }
}
