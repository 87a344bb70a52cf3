// Display decimation - a sparse view over the full-resolution series
use crate::domain::energy::{DerivedSample, DerivedSeries};
use crate::domain::subsystem::PerSubsystem;
use chrono::NaiveDateTime;
use serde::Serialize;

pub const DEFAULT_DECIMATION_FACTOR: usize = 5;

/// One plotted point, read straight from the full-resolution arrays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartPoint {
    pub index: usize,
    pub timestamp: NaiveDateTime,
    #[serde(flatten)]
    pub sample: DerivedSample,
    pub cumulative_kwh: PerSubsystem<f64>,
}

/// Every `factor`-th index of a window, plus the window's last index.
///
/// The view holds indices only. It exposes no totals, so figures shown next
/// to a decimated chart must come from the underlying `DerivedSeries`.
#[derive(Debug, Clone)]
pub struct DecimatedView<'a> {
    series: &'a DerivedSeries,
    indices: Vec<usize>,
}

impl<'a> DecimatedView<'a> {
    /// `factor` of 0 is treated as 1 (no decimation).
    pub fn new(series: &'a DerivedSeries, window: Option<(usize, usize)>, factor: usize) -> Self {
        let indices = match window {
            Some((start, end)) if !series.is_empty() => {
                let end = end.min(series.len() - 1);
                let mut indices: Vec<usize> = (start..=end).step_by(factor.max(1)).collect();
                if indices.last().is_some_and(|last| *last != end) {
                    indices.push(end);
                }
                indices
            }
            _ => Vec::new(),
        };

        Self { series, indices }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn points(&self) -> impl Iterator<Item = ChartPoint> + '_ {
        self.indices.iter().map(|&index| self.point(index))
    }

    /// The point for a full-resolution index; `index` must come from `indices()`.
    pub fn point(&self, index: usize) -> ChartPoint {
        ChartPoint {
            index,
            timestamp: self.series.timestamps()[index],
            sample: self.series.samples()[index],
            cumulative_kwh: PerSubsystem::from_fn(|subsystem| self.series.cumulative_kwh(subsystem)[index]),
        }
    }
}
