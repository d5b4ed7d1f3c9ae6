//! Rolling per-series sample buffers.
//!
//! A [`Series`] owns one time axis and any number of sub-series sharing it.
//! Batches are appended, gaps between expected buckets are padded with
//! missing samples, and data older than the retention window is evicted from
//! the front. Every sub-series always has exactly one slot per timestamp.
//!
//! ```
//! use meterview_core::envelope::SeriesBatch;
//! use meterview_core::series::Series;
//!
//! let mut series = Series::new();
//! series.push_update(&SeriesBatch {
//!     timestamps: vec![100, 160],
//!     values: [("a".to_string(), vec![Some(1.0), Some(2.0)])].into_iter().collect(),
//!     bucket_size: Some(60),
//!     window_size: Some(120),
//!     ..Default::default()
//! });
//! assert_eq!(series.timestamps(), &[100, 160]);
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::envelope::{Envelope, EnvelopeKind, SeriesBatch};
use crate::error::InvariantViolation;

/// One sample slot. `None` is a missing sample and renders as a gap.
pub type Slot = Option<f64>;

/// Name of the single trace produced by [`SplitKind::Total`].
pub const TOTAL_TRACE: &str = "total";

// ---------------------------------------------------------------------------
// PushSummary
// ---------------------------------------------------------------------------

/// What one ingest did to a series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushSummary {
    /// Real samples appended.
    pub appended: usize,
    /// Padding timestamps synthesized for skipped buckets, including those
    /// that fell outside the window and were never materialized.
    pub padded: usize,
    /// Incoming samples not newer than the last stored timestamp.
    pub dropped_stale: usize,
    /// Samples evicted from the front by the window.
    pub trimmed: usize,
}

// ---------------------------------------------------------------------------
// Series
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    bucket_size: Option<u64>,
    window_size: Option<u64>,
    timestamps: Vec<i64>,
    values: IndexMap<String, Vec<Slot>>,
    last_timestamp: Option<i64>,
    unit_label: Option<String>,
    kind: Option<String>,
}

impl Series {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a series from a complete batch without window trimming.
    ///
    /// Used for historical previews, where the whole requested range is kept
    /// even if the batch carries a live-view window size.
    pub fn load(batch: &SeriesBatch) -> Self {
        let mut series = Self::new();
        series.apply_config(batch, batch.window_size);
        series.ingest(batch, None);
        series.debug_check();
        series
    }

    /// Append a batch, pad skipped buckets, then evict data outside the
    /// window.
    pub fn push_update(&mut self, batch: &SeriesBatch) -> PushSummary {
        self.push_with_window(batch, batch.window_size)
    }

    /// Like [`push_update`](Self::push_update), with the window already
    /// resolved by the caller (batch value or a stream-wide default).
    pub(crate) fn push_with_window(
        &mut self,
        batch: &SeriesBatch,
        window_size: Option<u64>,
    ) -> PushSummary {
        self.apply_config(batch, window_size);
        let mut summary = self.ingest(batch, self.window_size);
        summary.trimmed = self.trim();
        self.debug_check();
        summary
    }

    fn apply_config(&mut self, batch: &SeriesBatch, window_size: Option<u64>) {
        // A zero bucket would never advance the padding cursor.
        self.bucket_size = batch.bucket_size.filter(|&b| b > 0);
        self.window_size = window_size;
        if let Some(label) = &batch.unit_label {
            self.unit_label = Some(label.clone());
        }
        if let Some(kind) = &batch.kind {
            self.kind = Some(kind.clone());
        }
    }

    /// Append samples and padding. `skip_window` lets padding that the
    /// following trim would evict anyway be counted without allocating it.
    fn ingest(&mut self, batch: &SeriesBatch, skip_window: Option<u64>) -> PushSummary {
        let mut summary = PushSummary::default();

        // Late-joining sub-series are backfilled so every column stays
        // aligned with the time axis.
        for key in batch.values.keys() {
            if !self.values.contains_key(key) {
                self.values
                    .insert(key.clone(), vec![None; self.timestamps.len()]);
            }
        }

        for (i, &t) in batch.timestamps.iter().enumerate() {
            if let Some(last) = self.last_timestamp
                && t <= last
            {
                log::warn!("dropping sample at {t}: not newer than {last}");
                summary.dropped_stale += 1;
                continue;
            }

            if let (Some(prev), Some(bucket)) = (self.last_timestamp, self.bucket_size) {
                summary.padded += self.pad_gap(prev, t, bucket_step(bucket), skip_window);
            }

            self.timestamps.push(t);
            for (key, column) in self.values.iter_mut() {
                let value = batch
                    .values
                    .get(key)
                    .and_then(|incoming| incoming.get(i).copied().flatten())
                    .filter(|v| v.is_finite());
                column.push(value);
            }
            self.last_timestamp = Some(t);
            summary.appended += 1;
        }

        summary
    }

    /// Insert one missing row per expected bucket strictly before `t`.
    fn pad_gap(&mut self, prev: i64, t: i64, step: i64, skip_window: Option<u64>) -> usize {
        let mut count = 0;
        let mut pad = prev.saturating_add(step);

        // Padding at or before `t - window` is evicted by the trim that
        // follows, since the final last_timestamp is at least `t`.
        if let Some(window) = skip_window {
            let floor = t
                .saturating_sub(window_secs(window))
                .min(t.saturating_sub(1));
            if pad <= floor {
                let skipped = (floor - pad) / step + 1;
                pad = pad.saturating_add(skipped.saturating_mul(step));
                count += skipped as usize;
            }
        }

        while pad < t {
            self.timestamps.push(pad);
            for column in self.values.values_mut() {
                column.push(None);
            }
            self.last_timestamp = Some(pad);
            count += 1;
            pad = pad.saturating_add(step);
        }
        count
    }

    /// Drop samples older than the window, always keeping the newest one.
    fn trim(&mut self) -> usize {
        let (Some(window), Some(last)) = (self.window_size, self.last_timestamp) else {
            return 0;
        };
        if self.timestamps.is_empty() {
            return 0;
        }

        let window = window_secs(window);
        let index = self
            .timestamps
            .iter()
            .position(|&ts| last.saturating_sub(ts) < window)
            .unwrap_or(self.timestamps.len() - 1);
        if index == 0 {
            return 0;
        }

        self.timestamps.drain(..index);
        for column in self.values.values_mut() {
            column.drain(..index);
        }
        index
    }

    fn debug_check(&self) {
        debug_assert_eq!(self.check_invariants(), Ok(()));
    }

    /// Verify column alignment and axis ordering.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        for (key, column) in &self.values {
            if column.len() != self.timestamps.len() {
                return Err(InvariantViolation::LengthMismatch {
                    key: key.clone(),
                    values: column.len(),
                    timestamps: self.timestamps.len(),
                });
            }
        }
        for (index, pair) in self.timestamps.windows(2).enumerate() {
            if pair[1] < pair[0] {
                return Err(InvariantViolation::Unsorted {
                    index: index + 1,
                    prev: pair[0],
                    next: pair[1],
                });
            }
        }
        Ok(())
    }

    // --- Accessors ---

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn values(&self) -> &IndexMap<String, Vec<Slot>> {
        &self.values
    }

    pub fn column(&self, key: &str) -> Option<&[Slot]> {
        self.values.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn bucket_size(&self) -> Option<u64> {
        self.bucket_size
    }

    pub fn window_size(&self) -> Option<u64> {
        self.window_size
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.last_timestamp
    }

    pub fn unit_label(&self) -> Option<&str> {
        self.unit_label.as_deref()
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// The buffered state as a batch, e.g. for an `initial` envelope.
    pub fn snapshot(&self) -> SeriesBatch {
        self.slice(i64::MIN, i64::MAX)
    }

    /// Samples with `oldest <= t < newest`, with this series' metadata.
    pub fn slice(&self, oldest: i64, newest: i64) -> SeriesBatch {
        let start = self.timestamps.partition_point(|&t| t < oldest);
        let end = self.timestamps.partition_point(|&t| t < newest).max(start);
        SeriesBatch {
            timestamps: self.timestamps[start..end].to_vec(),
            values: self
                .values
                .iter()
                .map(|(key, column)| (key.clone(), column[start..end].to_vec()))
                .collect(),
            bucket_size: self.bucket_size,
            window_size: self.window_size,
            unit_label: self.unit_label.clone(),
            kind: self.kind.clone(),
        }
    }

    /// Chart-ready view of the buffer.
    pub fn project(&self, style: &PlotStyle) -> Projection {
        let traces = match style.split {
            SplitKind::Split => self
                .values
                .iter()
                .map(|(name, column)| Trace {
                    name: name.clone(),
                    y: column.clone(),
                })
                .collect(),
            SplitKind::Total if self.values.is_empty() => Vec::new(),
            SplitKind::Total => vec![Trace {
                name: TOTAL_TRACE.to_string(),
                y: self.total(),
            }],
        };

        let x_range = match (self.last_timestamp, self.window_size) {
            (Some(last), Some(window)) => Some((last.saturating_sub(window_secs(window)), last)),
            _ => None,
        };

        let y_range = y_bounds(&traces, style.include_zero);

        Projection {
            x: self.timestamps.clone(),
            traces,
            x_range,
            y_range,
            unit_label: self.unit_label.clone(),
        }
    }

    /// Pointwise sum across sub-series. A missing sample anywhere in a
    /// column makes that position missing.
    fn total(&self) -> Vec<Slot> {
        (0..self.timestamps.len())
            .map(|i| self.values.values().map(|column| column[i]).sum())
            .collect()
    }
}

fn bucket_step(bucket: u64) -> i64 {
    i64::try_from(bucket).unwrap_or(i64::MAX)
}

fn window_secs(window: u64) -> i64 {
    i64::try_from(window).unwrap_or(i64::MAX)
}

fn y_bounds(traces: &[Trace], include_zero: bool) -> Option<(f64, f64)> {
    let mut present = traces.iter().flat_map(|t| t.y.iter().flatten().copied());
    let first = present.next()?;
    let (mut lo, mut hi) = present.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if include_zero {
        lo = lo.min(0.0);
        hi = hi.max(0.0);
    }
    Some((lo, hi))
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// How sub-series are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitKind {
    /// One line per sub-series.
    #[default]
    Split,
    /// A single summed line.
    Total,
}

impl SplitKind {
    pub fn toggled(self) -> Self {
        match self {
            Self::Split => Self::Total,
            Self::Total => Self::Split,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Split => "split",
            Self::Total => "total",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlotStyle {
    #[serde(default, rename = "style")]
    pub split: SplitKind,
    /// Force the y axis to include zero.
    #[serde(default)]
    pub include_zero: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub name: String,
    pub y: Vec<Slot>,
}

/// Everything a renderer needs for one chart.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// Shared x axis, unix seconds.
    pub x: Vec<i64>,
    pub traces: Vec<Trace>,
    /// `[last - window, last]` when the series has a window.
    pub x_range: Option<(i64, i64)>,
    /// Extent of present values, widened to zero on request.
    pub y_range: Option<(f64, f64)>,
    pub unit_label: Option<String>,
}

impl Projection {
    /// Present points of one trace, paired with their timestamps.
    pub fn points(&self, trace: &Trace) -> Vec<(f64, f64)> {
        self.x
            .iter()
            .zip(&trace.y)
            .filter_map(|(&x, y)| y.map(|y| (x as f64, y)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// MultiSeries
// ---------------------------------------------------------------------------

/// All buffered series of one stream, keyed by series name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiSeries {
    series: IndexMap<String, Series>,
    /// Stream-wide window from `history_window_size`, used by batches that
    /// carry none of their own.
    default_window: Option<u64>,
}

impl MultiSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every series. The default window is kept.
    pub fn clear(&mut self) {
        self.series.clear();
    }

    /// Merge one batch into the named series, creating it on first sight.
    pub fn push(&mut self, key: &str, batch: &SeriesBatch) -> PushSummary {
        let window = batch.window_size.or(self.default_window);
        self.series
            .entry(key.to_string())
            .or_default()
            .push_with_window(batch, window)
    }

    /// Apply a decoded envelope. `initial` replaces all state first.
    /// Returns the keys of the series that were touched.
    pub fn apply(&mut self, envelope: &Envelope) -> Vec<String> {
        if envelope.kind == EnvelopeKind::Initial {
            self.clear();
        }
        if let Some(window) = envelope.history_window_size {
            self.default_window = Some(window);
        }

        let mut touched = Vec::with_capacity(envelope.series.len());
        for (key, batch) in &envelope.series {
            let summary = self.push(key, batch);
            log::debug!(
                "series '{key}': +{} samples, {} padded, {} trimmed, {} stale",
                summary.appended,
                summary.padded,
                summary.trimmed,
                summary.dropped_stale
            );
            touched.push(key.clone());
        }
        touched
    }

    pub fn get(&self, key: &str) -> Option<&Series> {
        self.series.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Series)> {
        self.series.iter().map(|(k, s)| (k.as_str(), s))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn default_window(&self) -> Option<u64> {
        self.default_window
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(timestamps: &[i64], values: &[(&str, &[Slot])]) -> SeriesBatch {
        SeriesBatch {
            timestamps: timestamps.to_vec(),
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_vec()))
                .collect(),
            ..Default::default()
        }
    }

    fn windowed(mut b: SeriesBatch, bucket: Option<u64>, window: Option<u64>) -> SeriesBatch {
        b.bucket_size = bucket;
        b.window_size = window;
        b
    }

    #[test]
    fn pads_gap_and_trims_to_window() {
        let mut s = Series::new();
        s.push_update(&windowed(
            batch(&[100, 160], &[("a", &[Some(1.0), Some(2.0)])]),
            Some(60),
            Some(120),
        ));
        let summary = s.push_update(&windowed(
            batch(&[280], &[("a", &[Some(3.0)])]),
            Some(60),
            Some(120),
        ));

        assert_eq!(summary.padded, 1);
        assert_eq!(s.timestamps(), &[220, 280]);
        assert_eq!(s.column("a").unwrap(), &[None, Some(3.0)]);
        assert_eq!(s.last_timestamp(), Some(280));
    }

    #[test]
    fn padding_count_matches_bucket_formula() {
        for (p, t, b) in [(0_i64, 10_i64, 3_u64), (0, 9, 3), (5, 100, 7), (0, 2, 1)] {
            let mut s = Series::new();
            s.push_update(&windowed(batch(&[p], &[("a", &[Some(0.0)])]), Some(b), None));
            let summary =
                s.push_update(&windowed(batch(&[t], &[("a", &[Some(1.0)])]), Some(b), None));
            let expected = ((t - p - 1) / b as i64) as usize;
            assert_eq!(summary.padded, expected, "p={p} t={t} b={b}");
            assert_eq!(s.len(), expected + 2);
            let column = s.column("a").unwrap();
            assert!(column[1..column.len() - 1].iter().all(Option::is_none));
        }
    }

    #[test]
    fn no_padding_without_bucket_size() {
        let mut s = Series::new();
        s.push_update(&batch(&[0, 1000], &[("a", &[Some(1.0), Some(2.0)])]));
        assert_eq!(s.timestamps(), &[0, 1000]);
    }

    #[test]
    fn zero_bucket_size_disables_padding() {
        let mut s = Series::new();
        s.push_update(&windowed(
            batch(&[0, 10], &[("a", &[Some(1.0), Some(2.0)])]),
            Some(0),
            None,
        ));
        assert_eq!(s.bucket_size(), None);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn large_gap_padding_outside_window_is_not_materialized() {
        let mut s = Series::new();
        s.push_update(&windowed(batch(&[0], &[("a", &[Some(1.0)])]), Some(1), Some(10)));
        let summary = s.push_update(&windowed(
            batch(&[1_000_000], &[("a", &[Some(2.0)])]),
            Some(1),
            Some(10),
        ));
        assert_eq!(summary.padded, 999_999);
        assert_eq!(s.len(), 10);
        assert_eq!(s.timestamps()[0], 999_991);
        assert!(1_000_000 - s.timestamps()[0] < 10);
    }

    #[test]
    fn window_always_keeps_one_sample() {
        let mut s = Series::new();
        s.push_update(&windowed(batch(&[5, 6, 7], &[("a", &[Some(1.0); 3])]), None, Some(0)));
        assert_eq!(s.timestamps(), &[7]);
        assert_eq!(s.column("a").unwrap(), &[Some(1.0)]);
    }

    #[test]
    fn no_window_retains_everything() {
        let mut s = Series::new();
        for t in 0..100 {
            s.push_update(&batch(&[t * 1000], &[("a", &[Some(t as f64)])]));
        }
        assert_eq!(s.len(), 100);
    }

    #[test]
    fn late_sub_series_is_backfilled() {
        let mut s = Series::new();
        s.push_update(&batch(&[1, 2], &[("a", &[Some(1.0), Some(2.0)])]));
        s.push_update(&batch(&[3], &[("a", &[Some(3.0)]), ("b", &[Some(30.0)])]));

        assert_eq!(s.column("b").unwrap(), &[None, None, Some(30.0)]);
        assert_eq!(s.check_invariants(), Ok(()));
    }

    #[test]
    fn absent_sub_series_gets_missing_slots() {
        let mut s = Series::new();
        s.push_update(&batch(&[1], &[("a", &[Some(1.0)]), ("b", &[Some(2.0)])]));
        s.push_update(&batch(&[2], &[("a", &[Some(3.0)])]));
        assert_eq!(s.column("b").unwrap(), &[Some(2.0), None]);
    }

    #[test]
    fn short_value_array_pads_with_missing() {
        let mut s = Series::new();
        s.push_update(&batch(&[1, 2, 3], &[("a", &[Some(1.0)])]));
        assert_eq!(s.column("a").unwrap(), &[Some(1.0), None, None]);
    }

    #[test]
    fn non_finite_values_become_missing() {
        let mut s = Series::new();
        s.push_update(&batch(&[1, 2], &[("a", &[Some(f64::NAN), Some(f64::INFINITY)])]));
        assert_eq!(s.column("a").unwrap(), &[None, None]);
    }

    #[test]
    fn stale_timestamps_are_dropped() {
        let mut s = Series::new();
        s.push_update(&batch(&[10, 20], &[("a", &[Some(1.0), Some(2.0)])]));
        let summary = s.push_update(&batch(&[20, 15, 30], &[("a", &[Some(9.0), Some(9.0), Some(3.0)])]));
        assert_eq!(summary.dropped_stale, 2);
        assert_eq!(s.timestamps(), &[10, 20, 30]);
        assert_eq!(s.column("a").unwrap(), &[Some(1.0), Some(2.0), Some(3.0)]);
    }

    #[test]
    fn invariants_hold_over_random_sequences() {
        // Deterministic LCG so the sequence is reproducible.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move |m: u64| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) % m
        };

        let mut s = Series::new();
        let mut t = 0_i64;
        let names = ["a", "b", "c"];
        for _ in 0..500 {
            let n = next(4) as usize;
            let mut timestamps = Vec::new();
            for _ in 0..n {
                t += 1 + next(5) as i64;
                timestamps.push(t);
            }
            let mut values = IndexMap::new();
            for name in names.iter().take(1 + next(3) as usize) {
                let column: Vec<Slot> = (0..n)
                    .map(|_| if next(5) == 0 { None } else { Some(next(100) as f64) })
                    .collect();
                values.insert(name.to_string(), column);
            }
            let window = if next(2) == 0 { Some(20) } else { Some(1 + next(50)) };
            s.push_update(&SeriesBatch {
                timestamps,
                values,
                bucket_size: Some(2),
                window_size: window,
                ..Default::default()
            });

            assert_eq!(s.check_invariants(), Ok(()));
            if let (Some(last), Some(w), Some(&oldest)) =
                (s.last_timestamp(), s.window_size(), s.timestamps().first())
            {
                assert!(last - oldest < w as i64 || s.len() == 1);
            }
        }
    }

    #[test]
    fn load_keeps_full_range() {
        let s = Series::load(&windowed(
            batch(&[0, 300, 600], &[("a", &[Some(1.0), Some(2.0), Some(3.0)])]),
            Some(300),
            Some(60),
        ));
        assert_eq!(s.timestamps(), &[0, 300, 600]);
    }

    #[test]
    fn slice_is_half_open() {
        let s = Series::load(&windowed(
            batch(&[0, 300, 600], &[("a", &[Some(1.0), Some(2.0), Some(3.0)])]),
            Some(300),
            None,
        ));
        let part = s.slice(300, 600);
        assert_eq!(part.timestamps, vec![300]);
        assert_eq!(part.values["a"], vec![Some(2.0)]);
        assert_eq!(part.bucket_size, Some(300));
        assert!(s.slice(700, 100).is_empty());
        assert_eq!(s.snapshot().timestamps, vec![0, 300, 600]);
    }

    #[test]
    fn total_sums_sub_series() {
        let s = {
            let mut s = Series::new();
            s.push_update(&batch(
                &[1, 2],
                &[("a", &[Some(1.0), Some(2.0)]), ("b", &[Some(3.0), Some(4.0)])],
            ));
            s
        };
        let style = PlotStyle {
            split: SplitKind::Total,
            include_zero: false,
        };
        let projection = s.project(&style);
        assert_eq!(projection.traces.len(), 1);
        assert_eq!(projection.traces[0].name, TOTAL_TRACE);
        assert_eq!(projection.traces[0].y, vec![Some(4.0), Some(6.0)]);
    }

    #[test]
    fn total_propagates_missing() {
        let mut s = Series::new();
        s.push_update(&batch(
            &[1, 2],
            &[("a", &[Some(1.0), None]), ("b", &[Some(3.0), Some(4.0)])],
        ));
        let projection = s.project(&PlotStyle {
            split: SplitKind::Total,
            include_zero: false,
        });
        assert_eq!(projection.traces[0].y, vec![Some(4.0), None]);
    }

    #[test]
    fn split_projection_has_window_bounds() {
        let mut s = Series::new();
        s.push_update(&windowed(
            batch(&[100, 160], &[("a", &[Some(5.0), None]), ("b", &[Some(7.0), Some(9.0)])]),
            Some(60),
            Some(120),
        ));
        let projection = s.project(&PlotStyle::default());
        assert_eq!(projection.traces.len(), 2);
        assert_eq!(projection.x_range, Some((40, 160)));
        assert_eq!(projection.y_range, Some((5.0, 9.0)));
        assert_eq!(projection.points(&projection.traces[0]), vec![(100.0, 5.0)]);

        let with_zero = s.project(&PlotStyle {
            split: SplitKind::Split,
            include_zero: true,
        });
        assert_eq!(with_zero.y_range, Some((0.0, 9.0)));
    }

    #[test]
    fn initial_envelope_replaces_state() {
        let mut multi = MultiSeries::new();
        let envelope = |kind, t: i64| Envelope {
            kind,
            series: IndexMap::from([("minute".to_string(), batch(&[t], &[("a", &[Some(1.0)])]))]),
            history_window_size: None,
        };

        multi.apply(&envelope(EnvelopeKind::Initial, 10));
        multi.apply(&envelope(EnvelopeKind::Update, 20));
        assert_eq!(multi.get("minute").unwrap().timestamps(), &[10, 20]);

        multi.apply(&envelope(EnvelopeKind::Initial, 5));
        multi.apply(&envelope(EnvelopeKind::Initial, 7));
        assert_eq!(multi.get("minute").unwrap().timestamps(), &[7]);
    }

    #[test]
    fn history_window_applies_to_batches_without_window() {
        let mut multi = MultiSeries::new();
        multi.apply(&Envelope {
            kind: EnvelopeKind::Initial,
            series: IndexMap::from([(
                "s".to_string(),
                batch(&[0, 5, 10, 15], &[("a", &[Some(1.0); 4])]),
            )]),
            history_window_size: Some(10),
        });
        assert_eq!(multi.default_window(), Some(10));
        assert_eq!(multi.get("s").unwrap().timestamps(), &[10, 15]);
    }
}
