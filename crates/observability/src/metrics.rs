//! Readout metrics
//!
//! Prometheus-facing recording helpers plus an in-memory aggregator used for
//! the end-of-run summary.

use std::collections::BTreeMap;

use contracts::ReadoutEvent;
use metrics::{counter, gauge, histogram};

/// Record metrics for one emitted event.
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_event_metrics;
///
/// if let Some(event) = simulation.step()? {
///     record_event_metrics(&event);
/// }
/// ```
pub fn record_event_metrics(event: &ReadoutEvent) {
    gauge!("readout_last_event_number").set(event.event_number as f64);
    histogram!("readout_window_width_ns").record(event.window.width());
    histogram!("readout_trigger_displacement_ns")
        .record(event.sim_trigger_time - event.trigger_time);

    for (name, collection) in &event.collections {
        histogram!(
            "readout_collection_elements",
            "collection" => name.to_string()
        )
        .record(collection.len() as f64);
    }
    if event.element_count() == 0 {
        counter!("readout_empty_events_total").increment(1);
    }
}

/// Record the number of batches buffered for a collection
pub fn record_buffer_depth(collection: &str, batches: usize) {
    gauge!(
        "readout_buffer_batches",
        "collection" => collection.to_string()
    )
    .set(batches as f64);
}

/// Record the number of queued trigger requests
pub fn record_pending_triggers(pending: usize) {
    gauge!("readout_pending_triggers").set(pending as f64);
}

/// Readout statistics aggregator
///
/// Aggregates in memory for the run summary.
#[derive(Debug, Clone, Default)]
pub struct ReadoutStatsAggregator {
    /// Events seen
    pub total_events: u64,

    /// Elements over all events
    pub total_elements: u64,

    /// Events without any element
    pub empty_events: u64,

    /// Elements per event
    pub element_stats: RunningStats,

    /// Default window width (ns)
    pub window_stats: RunningStats,

    /// Emission time minus trigger time (ns)
    pub latency_stats: RunningStats,

    /// Elements per collection
    pub collection_elements: BTreeMap<String, u64>,

    /// Events per trigger source
    pub source_counts: BTreeMap<String, u64>,
}

impl ReadoutStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for `event`, emitted at simulation time `emitted_at`.
    pub fn update(&mut self, event: &ReadoutEvent, emitted_at: f64) {
        let elements = event.element_count() as u64;
        self.total_events += 1;
        self.total_elements += elements;
        if elements == 0 {
            self.empty_events += 1;
        }

        self.element_stats.push(elements as f64);
        self.window_stats.push(event.window.width());
        self.latency_stats.push(emitted_at - event.trigger_time);

        for (name, collection) in &event.collections {
            *self
                .collection_elements
                .entry(name.to_string())
                .or_insert(0) += collection.len() as u64;
        }
        *self
            .source_counts
            .entry(event.trigger_source.clone())
            .or_insert(0) += 1;
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_events: self.total_events,
            total_elements: self.total_elements,
            empty_events: self.empty_events,
            empty_rate: if self.total_events > 0 {
                self.empty_events as f64 / self.total_events as f64 * 100.0
            } else {
                0.0
            },
            elements_per_event: StatsSummary::from(&self.element_stats),
            window_width_ns: StatsSummary::from(&self.window_stats),
            latency_ns: StatsSummary::from(&self.latency_stats),
            collection_elements: self.collection_elements.clone(),
            source_counts: self.source_counts.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// End-of-run summary
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_events: u64,
    pub total_elements: u64,
    pub empty_events: u64,
    pub empty_rate: f64,
    pub elements_per_event: StatsSummary,
    pub window_width_ns: StatsSummary,
    pub latency_ns: StatsSummary,
    pub collection_elements: BTreeMap<String, u64>,
    pub source_counts: BTreeMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Readout Summary ===")?;
        writeln!(f, "Total events: {}", self.total_events)?;
        writeln!(f, "Total elements: {}", self.total_elements)?;
        writeln!(
            f,
            "Empty events: {} ({:.2}%)",
            self.empty_events, self.empty_rate
        )?;
        writeln!(f, "Elements per event: {}", self.elements_per_event)?;
        writeln!(f, "Window width (ns): {}", self.window_width_ns)?;
        writeln!(f, "Readout latency (ns): {}", self.latency_ns)?;

        if !self.collection_elements.is_empty() {
            writeln!(f, "Elements per collection:")?;
            for (collection, count) in &self.collection_elements {
                writeln!(f, "  {}: {}", collection, count)?;
            }
        }
        if !self.source_counts.is_empty() {
            writeln!(f, "Events per trigger:")?;
            for (source, count) in &self.source_counts {
                writeln!(f, "  {}: {}", source, count)?;
            }
        }

        Ok(())
    }
}

/// Summary of a [`RunningStats`]
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online mean and variance (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{TimeWindow, TriggeredCollection};

    fn event(trigger_time: f64, hits: Vec<u32>) -> ReadoutEvent {
        let mut event = ReadoutEvent {
            event_number: 1,
            trigger_time,
            sim_trigger_time: trigger_time + 16.0,
            timestamp: 0,
            trigger_source: "threshold".to_string(),
            window: TimeWindow::new(trigger_time - 50.0, trigger_time + 150.0),
            collections: BTreeMap::new(),
        };
        event
            .insert_collection(TriggeredCollection::new("Hits", hits))
            .unwrap();
        event
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();

        stats.push(1.0);
        stats.push(2.0);
        stats.push(3.0);
        stats.push(4.0);
        stats.push(5.0);

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = ReadoutStatsAggregator::new();

        aggregator.update(&event(10.0, vec![1, 2, 3]), 176.0);
        aggregator.update(&event(20.0, Vec::new()), 186.0);

        assert_eq!(aggregator.total_events, 2);
        assert_eq!(aggregator.total_elements, 3);
        assert_eq!(aggregator.empty_events, 1);
        assert_eq!(aggregator.collection_elements.get("Hits"), Some(&3));
        assert_eq!(aggregator.source_counts.get("threshold"), Some(&2));
        assert!((aggregator.latency_stats.mean() - 166.0).abs() < 1e-10);
        assert!((aggregator.window_stats.max() - 200.0).abs() < 1e-10);

        let summary = aggregator.summary();
        assert!((summary.empty_rate - 50.0).abs() < 1e-10);

        aggregator.reset();
        assert_eq!(aggregator.total_events, 0);
    }

    #[test]
    fn test_summary_display() {
        let summary = MetricsSummary {
            total_events: 100,
            total_elements: 2500,
            empty_events: 5,
            empty_rate: 5.0,
            elements_per_event: StatsSummary {
                count: 100,
                min: 0.0,
                max: 80.0,
                mean: 25.0,
                std_dev: 15.0,
            },
            collection_elements: BTreeMap::from([("Hits".to_string(), 2500)]),
            ..Default::default()
        };

        let output = format!("{}", summary);
        assert!(output.contains("Total events: 100"));
        assert!(output.contains("5.00%"));
        assert!(output.contains("Hits: 2500"));
        assert!(output.contains("Readout latency (ns): N/A"));
    }
}
