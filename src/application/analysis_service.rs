// Analysis service - Range statistics, chart series and activity intervals
use crate::application::snapshot::SnapshotStore;
use crate::domain::activity::{ActivityInterval, IntervalStats, activity_intervals};
use crate::domain::decimation::{ChartPoint, DecimatedView};
use crate::domain::range::{RangeQuery, RangeSummary, range_summary};
use crate::domain::subsystem::Subsystem;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Decimated points for drawing, with a legend computed on the full-resolution series.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSeries {
    pub generation: u64,
    pub factor: usize,
    pub legend: RangeSummary,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityReport {
    pub subsystem: Subsystem,
    pub generation: u64,
    pub window: RangeSummary,
    pub stats: IntervalStats,
    pub intervals: Vec<ActivityInterval>,
}

/// Messages of a progressively delivered chart series.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SeriesMessage {
    Legend {
        generation: u64,
        factor: usize,
        total_points: usize,
        summary: RangeSummary,
    },
    Points {
        offset: usize,
        points: Vec<ChartPoint>,
    },
    Complete {
        total_points: usize,
        duration_ms: u64,
    },
}

#[derive(Clone)]
pub struct AnalysisService {
    store: Arc<SnapshotStore>,
    decimation_factor: usize,
    max_stream_chunk: usize,
}

impl AnalysisService {
    pub fn new(store: Arc<SnapshotStore>, decimation_factor: usize, max_stream_chunk: usize) -> Self {
        Self {
            store,
            decimation_factor,
            max_stream_chunk,
        }
    }

    pub fn range_summary(&self, query: &RangeQuery) -> RangeSummary {
        range_summary(&self.store.current().derived, query)
    }

    pub fn chart_series(&self, query: &RangeQuery, factor: Option<usize>) -> ChartSeries {
        let snapshot = self.store.current();
        let factor = self.factor(factor);
        let window = query.resolve(&snapshot.derived);
        let view = DecimatedView::new(&snapshot.derived, window, factor);

        ChartSeries {
            generation: snapshot.generation,
            factor,
            legend: range_summary(&snapshot.derived, query),
            points: view.points().collect(),
        }
    }

    pub fn activity_report(&self, subsystem: Subsystem, query: &RangeQuery) -> ActivityReport {
        let snapshot = self.store.current();
        let window = range_summary(&snapshot.derived, query);
        let intervals = match (window.start_index, window.end_index) {
            (Some(start), Some(end)) => activity_intervals(&snapshot.derived, subsystem, start, end),
            _ => Vec::new(),
        };

        ActivityReport {
            subsystem,
            generation: snapshot.generation,
            window,
            stats: IntervalStats::from_intervals(&intervals),
            intervals,
        }
    }

    /// Sends the legend first, then the points in chunks, then a completion marker.
    /// The whole stream is served from the snapshot current at call time.
    pub fn stream_chart_series(&self, query: RangeQuery, factor: Option<usize>) -> mpsc::Receiver<SeriesMessage> {
        let (tx, rx) = mpsc::channel(16);
        let snapshot = self.store.current();
        let factor = self.factor(factor);
        let chunk_size = self.max_stream_chunk.max(1);

        tokio::spawn(async move {
            let start_time = Instant::now();
            let window = query.resolve(&snapshot.derived);
            let view = DecimatedView::new(&snapshot.derived, window, factor);
            let total_points = view.indices().len();

            let legend = SeriesMessage::Legend {
                generation: snapshot.generation,
                factor,
                total_points,
                summary: range_summary(&snapshot.derived, &query),
            };
            if tx.send(legend).await.is_err() {
                return;
            }

            for (i, chunk) in view.indices().chunks(chunk_size).enumerate() {
                let msg = SeriesMessage::Points {
                    offset: i * chunk_size,
                    points: chunk.iter().map(|&index| view.point(index)).collect(),
                };
                if tx.send(msg).await.is_err() {
                    tracing::debug!("Chart stream receiver dropped after {} chunks", i);
                    return;
                }
            }

            let duration_ms = start_time.elapsed().as_millis() as u64;
            let _ = tx
                .send(SeriesMessage::Complete {
                    total_points,
                    duration_ms,
                })
                .await;
        });

        rx
    }

    fn factor(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.decimation_factor).max(1)
    }
}
