//! Cumulative arrival time series.
//!
//! Arrivals are counted into fixed-width buckets of simulated time. Each
//! bucket in which the count changed yields one [`ArrivalSample`] stamped with
//! the bucket start. The "graph evacuation time" is the time of the last
//! sample.

use std::time::Duration;

use chrono::NaiveDateTime;

use super::types::*;
use crate::error::AnalysisError;

/// Calendar offset of simulated time zero (23:00:00). Display only.
pub const DAY_START_SECONDS: i64 = 23 * 3600;

pub const DEFAULT_BUCKET_WIDTH: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct TimeSeriesBuilder {
    bucket_width: f64,
    samples: Vec<ArrivalSample>,
    count: u64,
}

impl TimeSeriesBuilder {
    /// A zero bucket width falls back to one second.
    pub fn new(bucket_width: Duration) -> Self {
        let width = bucket_width.as_secs_f64();
        Self {
            bucket_width: if width > 0.0 { width } else { DEFAULT_BUCKET_WIDTH.as_secs_f64() },
            samples: Vec::new(),
            count: 0,
        }
    }

    /// Feed an event; only arrivals are counted.
    pub fn observe(&mut self, event: &Event) {
        if event.kind == EventKind::Arrival {
            self.record_arrival(event.timestamp);
        }
    }

    pub fn record_arrival(&mut self, time: SimTime) {
        self.count += 1;
        let bucket = (time / self.bucket_width).floor() * self.bucket_width;

        match self.samples.last_mut() {
            Some(last) if bucket <= last.time => last.cumulative_count = self.count,
            _ => self.samples.push(ArrivalSample {
                time: bucket,
                cumulative_count: self.count,
            }),
        }
    }

    pub fn finish(self) -> ArrivalSeries {
        ArrivalSeries {
            sample_size: self.count,
            samples: self.samples,
        }
    }
}

impl Default for TimeSeriesBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_WIDTH)
    }
}

/// Finished arrival series of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrivalSeries {
    samples: Vec<ArrivalSample>,
    sample_size: u64,
}

impl ArrivalSeries {
    pub fn samples(&self) -> &[ArrivalSample] {
        &self.samples
    }

    /// Total number of arrivals observed.
    pub fn sample_size(&self) -> u64 {
        self.sample_size
    }

    /// Time of the last bucket in which the arrival count changed.
    pub fn graph_evacuation_time(&self) -> Result<SimTime, AnalysisError> {
        if self.sample_size == 0 {
            return Err(AnalysisError::EmptySample);
        }
        self.samples
            .last()
            .map(|sample| sample.time)
            .ok_or(AnalysisError::EmptySample)
    }

    /// `(time, cumulative / sample_size)` pairs; the last value is exactly 1.0.
    pub fn normalized(&self) -> Result<Vec<(SimTime, f64)>, AnalysisError> {
        if self.sample_size == 0 {
            return Err(AnalysisError::EmptySample);
        }
        let total = self.sample_size as f64;
        Ok(self
            .samples
            .iter()
            .map(|sample| (sample.time, sample.cumulative_count as f64 / total))
            .collect())
    }
}

/// Calendar timestamp of a simulated time, for plotting.
pub fn calendar_time(time: SimTime) -> NaiveDateTime {
    let millis = ((DAY_START_SECONDS as f64 + time) * 1000.0).round() as i64;
    NaiveDateTime::default() + chrono::Duration::milliseconds(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(times: &[f64]) -> ArrivalSeries {
        let mut builder = TimeSeriesBuilder::default();
        for &t in times {
            builder.record_arrival(t);
        }
        builder.finish()
    }

    #[test]
    fn test_buckets_by_second() {
        let s = series(&[10.2, 10.7, 11.0, 15.9]);
        let samples: Vec<(f64, u64)> = s.samples().iter().map(|x| (x.time, x.cumulative_count)).collect();
        assert_eq!(samples, vec![(10.0, 2), (11.0, 3), (15.0, 4)]);
        assert_eq!(s.sample_size(), 4);
        assert_eq!(s.graph_evacuation_time().unwrap(), 15.0);
    }

    #[test]
    fn test_wider_buckets() {
        let mut builder = TimeSeriesBuilder::new(Duration::from_secs(60));
        for t in [5.0, 59.0, 61.0, 300.0] {
            builder.record_arrival(t);
        }
        let s = builder.finish();
        let times: Vec<f64> = s.samples().iter().map(|x| x.time).collect();
        assert_eq!(times, vec![0.0, 60.0, 300.0]);
        assert_eq!(s.graph_evacuation_time().unwrap(), 300.0);
    }

    #[test]
    fn test_normalized_series_ends_at_one() {
        let s = series(&[1.0, 2.0, 2.5, 7.0, 7.1, 9.0, 13.0]);
        let normalized = s.normalized().unwrap();
        assert_eq!(normalized.last().unwrap().1, 1.0);
        assert!(normalized.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn test_empty_sample_is_an_error() {
        let s = TimeSeriesBuilder::default().finish();
        assert!(matches!(s.normalized(), Err(AnalysisError::EmptySample)));
        assert!(matches!(s.graph_evacuation_time(), Err(AnalysisError::EmptySample)));
    }

    #[test]
    fn test_only_arrivals_are_counted() {
        let mut builder = TimeSeriesBuilder::default();
        builder.observe(&Event::new(1.0, EventKind::Departure, "1", "a"));
        builder.observe(&Event::new(2.0, EventKind::LinkEnter, "1", "b"));
        builder.observe(&Event::new(3.0, EventKind::Arrival, "1", "b"));
        assert_eq!(builder.finish().sample_size(), 1);
    }

    #[test]
    fn test_calendar_time_offset() {
        let t = calendar_time(3725.0);
        assert_eq!(t.format("%H:%M:%S").to_string(), "00:02:05");
        assert_eq!(calendar_time(0.0).format("%H:%M:%S").to_string(), "23:00:00");
    }
}
