//! Statistics tracking for kismet ingestion.
//!
//! This module provides structures for tracking various metrics about
//! the sentences read from a kismet server and the batches delivered to
//! listeners, including counts and distributions of signal strength and
//! batch size.

use hdrhistogram::Histogram;
use serde::Serialize;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::message::Message;
use crate::sentence::Sentence;

/// Offset applied to dBm values so they fit the histogram's positive range.
const SIGNAL_OFFSET: i64 = 200;

/// Thread-safe statistics collector for kismet ingestion.
#[derive(Debug)]
pub struct ConnectionStats {
    /// Total number of measurement sentences
    pub measurements: AtomicU64,

    /// Total number of drone directory updates
    pub directory_updates: AtomicU64,

    /// Total number of sentences with unrecognized markers
    pub ignored_sentences: AtomicU64,

    /// Total number of lines that failed to parse
    pub parse_failures: AtomicU64,

    /// Total number of batches built at cycle boundaries
    pub batches_built: AtomicU64,

    /// Total number of batches accepted by a listener
    pub batches_delivered: AtomicU64,

    /// Total number of deliveries that failed and were swallowed
    pub delivery_failures: AtomicU64,

    /// Total bytes of raw input processed
    pub bytes_processed: AtomicU64,

    /// Histogram of signal strength values (dBm, offset-encoded)
    signal_histogram: RwLock<Histogram<u64>>,

    /// Histogram of measurements per batch
    batch_size_histogram: RwLock<Histogram<u64>>,

    /// When stats collection started
    start_time: Instant,
}

impl ConnectionStats {
    /// Create a new statistics collector.
    pub fn new() -> Self {
        Self {
            measurements: AtomicU64::new(0),
            directory_updates: AtomicU64::new(0),
            ignored_sentences: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            batches_built: AtomicU64::new(0),
            batches_delivered: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            bytes_processed: AtomicU64::new(0),
            // Signal histogram: -199 to +199 dBm after offset, 2 significant figures
            signal_histogram: RwLock::new(
                Histogram::new_with_bounds(1, 2 * SIGNAL_OFFSET as u64, 2)
                    .expect("Failed to create signal histogram"),
            ),
            // Batch size histogram: 1 to 100k measurements
            batch_size_histogram: RwLock::new(
                Histogram::new_with_bounds(1, 100_000, 3)
                    .expect("Failed to create batch size histogram"),
            ),
            start_time: Instant::now(),
        }
    }

    /// Record one raw line of input.
    pub fn record_line(&self, bytes: u64) {
        self.bytes_processed.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a successfully classified sentence.
    pub fn record_sentence(&self, sentence: &Sentence) {
        match sentence {
            Sentence::Measurement(value) => {
                self.measurements.fetch_add(1, Ordering::Relaxed);

                let offset = (value.signal_strength as i64 + SIGNAL_OFFSET)
                    .clamp(1, 2 * SIGNAL_OFFSET - 1) as u64;
                if let Ok(mut hist) = self.signal_histogram.write() {
                    let _ = hist.record(offset);
                }
            }
            Sentence::DroneSource { .. } => {
                self.directory_updates.fetch_add(1, Ordering::Relaxed);
            }
            Sentence::Ignored => {
                self.ignored_sentences.fetch_add(1, Ordering::Relaxed);
            }
            Sentence::Time { .. } => {}
        }
    }

    /// Record a parse failure.
    pub fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a batch built at a cycle boundary.
    pub fn record_batch(&self, message: &Message) {
        self.batches_built.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut hist) = self.batch_size_histogram.write() {
            let _ = hist.record((message.measured_values.len() as u64).max(1));
        }
    }

    /// Record the outcome of one delivery attempt.
    pub fn record_delivery(&self, delivered: bool) {
        if delivered {
            self.batches_delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.delivery_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get the elapsed time since stats collection started.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get the current measurements per second rate.
    pub fn measurements_per_second(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.measurements.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Generate a summary report.
    pub fn summary(&self) -> StatsSummary {
        let signal_percentiles = self
            .signal_histogram
            .read()
            .ok()
            .filter(|h| !h.is_empty())
            .map(|h| SignalPercentiles {
                p50: h.value_at_quantile(0.50) as i64 - SIGNAL_OFFSET,
                p90: h.value_at_quantile(0.90) as i64 - SIGNAL_OFFSET,
                p99: h.value_at_quantile(0.99) as i64 - SIGNAL_OFFSET,
                min: h.min() as i64 - SIGNAL_OFFSET,
                max: h.max() as i64 - SIGNAL_OFFSET,
                mean: h.mean() - SIGNAL_OFFSET as f64,
            });

        let batch_size_percentiles = self
            .batch_size_histogram
            .read()
            .ok()
            .filter(|h| !h.is_empty())
            .map(|h| HistogramPercentiles {
                p50: h.value_at_quantile(0.50),
                p90: h.value_at_quantile(0.90),
                p99: h.value_at_quantile(0.99),
                min: h.min(),
                max: h.max(),
                mean: h.mean(),
            });

        StatsSummary {
            elapsed_secs: self.elapsed().as_secs_f64(),
            measurements: self.measurements.load(Ordering::Relaxed),
            directory_updates: self.directory_updates.load(Ordering::Relaxed),
            ignored_sentences: self.ignored_sentences.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            batches_built: self.batches_built.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            measurements_per_second: self.measurements_per_second(),
            signal_percentiles,
            batch_size_percentiles,
        }
    }
}

impl Default for ConnectionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentile values from a histogram.
#[derive(Debug, Clone, Serialize)]
pub struct HistogramPercentiles {
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
}

/// Percentile values for signal strength (dBm, signed).
#[derive(Debug, Clone, Serialize)]
pub struct SignalPercentiles {
    pub p50: i64,
    pub p90: i64,
    pub p99: i64,
    pub min: i64,
    pub max: i64,
    pub mean: f64,
}

/// Summary of collected statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub elapsed_secs: f64,
    pub measurements: u64,
    pub directory_updates: u64,
    pub ignored_sentences: u64,
    pub parse_failures: u64,
    pub batches_built: u64,
    pub batches_delivered: u64,
    pub delivery_failures: u64,
    pub bytes_processed: u64,
    pub measurements_per_second: f64,
    pub signal_percentiles: Option<SignalPercentiles>,
    pub batch_size_percentiles: Option<HistogramPercentiles>,
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "═══════════════════════════════════════════════════════")?;
        writeln!(f, "                KISMET INGESTION STATISTICS")?;
        writeln!(f, "═══════════════════════════════════════════════════════")?;
        writeln!(f)?;
        writeln!(f, "Runtime: {:.1}s", self.elapsed_secs)?;
        writeln!(f, "Measurements: {}", self.measurements)?;
        writeln!(f, "Directory updates: {}", self.directory_updates)?;
        writeln!(f, "Ignored sentences: {}", self.ignored_sentences)?;
        writeln!(f, "Parse failures: {}", self.parse_failures)?;
        writeln!(
            f,
            "Batches: {} built, {} delivered, {} failed",
            self.batches_built, self.batches_delivered, self.delivery_failures
        )?;
        writeln!(f, "Bytes processed: {} KB", self.bytes_processed / 1024)?;
        writeln!(f, "Rate: {:.1} measurements/sec", self.measurements_per_second)?;
        writeln!(f)?;

        if let Some(ref p) = self.signal_percentiles {
            writeln!(f, "Signal Strength Distribution (dBm):")?;
            writeln!(f, "  Min: {}, Max: {}, Mean: {:.1}", p.min, p.max, p.mean)?;
            writeln!(f, "  P50: {}, P90: {}, P99: {}", p.p50, p.p90, p.p99)?;
            writeln!(f)?;
        }

        if let Some(ref p) = self.batch_size_percentiles {
            writeln!(f, "Batch Size Distribution (measurements):")?;
            writeln!(f, "  Min: {}, Max: {}, Mean: {:.1}", p.min, p.max, p.mean)?;
            writeln!(f, "  P50: {}, P90: {}, P99: {}", p.p50, p.p90, p.p99)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MeasuredValue;
    use std::collections::HashMap;

    fn make_measurement(signal_strength: i32) -> Sentence {
        Sentence::Measurement(MeasuredValue {
            device_id: "AA:BB:CC:DD:EE:FF".parse().unwrap(),
            drone_id: "7c1e5200-0000-0000-0000-000000000001".parse().unwrap(),
            signal_strength,
            timestamp: 1000,
        })
    }

    #[test]
    fn test_record_sentences_by_kind() {
        let stats = ConnectionStats::new();

        stats.record_sentence(&make_measurement(-42));
        stats.record_sentence(&Sentence::DroneSource {
            drone_id: "7c1e5200-0000-0000-0000-000000000001".parse().unwrap(),
            name: "alpha".to_string(),
        });
        stats.record_sentence(&Sentence::Ignored);
        stats.record_sentence(&Sentence::Time { timestamp: 1 });

        assert_eq!(stats.measurements.load(Ordering::Relaxed), 1);
        assert_eq!(stats.directory_updates.load(Ordering::Relaxed), 1);
        assert_eq!(stats.ignored_sentences.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_signal_percentiles_are_signed() {
        let stats = ConnectionStats::new();

        for _ in 0..100 {
            stats.record_sentence(&make_measurement(-42));
        }

        let p = stats.summary().signal_percentiles.unwrap();
        assert!(p.p50 <= -40 && p.p50 >= -45);
        assert!(p.min <= p.max);
    }

    #[test]
    fn test_summary_generation() {
        let stats = ConnectionStats::new();

        for _ in 0..10 {
            stats.record_sentence(&make_measurement(-60));
        }
        stats.record_parse_failure();
        stats.record_line(1000);

        let message = Message {
            drone_names: HashMap::new(),
            measured_values: Vec::new(),
            timestamp: 1,
        };
        stats.record_batch(&message);
        stats.record_delivery(true);
        stats.record_delivery(false);

        let summary = stats.summary();

        assert_eq!(summary.measurements, 10);
        assert_eq!(summary.parse_failures, 1);
        assert_eq!(summary.bytes_processed, 1000);
        assert_eq!(summary.batches_built, 1);
        assert_eq!(summary.batches_delivered, 1);
        assert_eq!(summary.delivery_failures, 1);
    }

    #[test]
    fn test_empty_histograms_omitted_from_summary() {
        let stats = ConnectionStats::new();
        let summary = stats.summary();

        assert!(summary.signal_percentiles.is_none());
        assert!(summary.batch_size_percentiles.is_none());
    }
}
