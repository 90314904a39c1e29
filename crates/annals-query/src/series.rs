//! The snapshot series: filters and downsampling.

use std::collections::BTreeMap;

use annals_types::Snapshot;
use chrono::{DateTime, Duration, Utc};

/// Seconds per day, the base of the fixed window approximations.
const DAY_SECONDS: i64 = 86_400;

// ---------------------------------------------------------------------------
// Bucket
// ---------------------------------------------------------------------------

/// Fixed-width resampling bucket.
///
/// Buckets are aligned to the Unix epoch; a snapshot falls into the
/// bucket containing its `created` timestamp. `Month` and `Year` use the
/// 28-day and 365-day conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bucket {
    /// One-second buckets.
    Second,
    /// One-minute buckets.
    Minute,
    /// One-hour buckets.
    Hour,
    /// One-day buckets.
    Day,
    /// One-week buckets.
    Week,
    /// 28-day buckets.
    Month,
    /// 365-day buckets.
    Year,
}

impl Bucket {
    /// Width of this bucket in seconds.
    pub const fn width_seconds(self) -> i64 {
        match self {
            Self::Second => 1,
            Self::Minute => 60,
            Self::Hour => 3_600,
            Self::Day => DAY_SECONDS,
            Self::Week => 7 * DAY_SECONDS,
            Self::Month => 28 * DAY_SECONDS,
            Self::Year => 365 * DAY_SECONDS,
        }
    }
}

// ---------------------------------------------------------------------------
// Series
// ---------------------------------------------------------------------------

/// A borrowed, time-ordered view over a subject's snapshot history.
///
/// Construct one from the history slice the snapshot log hands out, then
/// chain filters. All operations preserve `(created, seq)` ordering.
#[derive(Debug, Clone)]
pub struct Series<'a> {
    snapshots: Vec<&'a Snapshot>,
}

impl<'a> Series<'a> {
    /// Build a series over a history slice, ordered by `(created, seq)`.
    pub fn new(history: &'a [Snapshot]) -> Self {
        let mut snapshots: Vec<&'a Snapshot> = history.iter().collect();
        snapshots.sort_by_key(|s| (s.created, s.seq));
        Self { snapshots }
    }

    /// Number of snapshots in the series.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether the series is empty.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Iterate the snapshots in order.
    pub fn iter(&self) -> impl Iterator<Item = &'a Snapshot> + '_ {
        self.snapshots.iter().copied()
    }

    /// The most recent snapshot, `None` for an empty series.
    pub fn latest(&self) -> Option<&'a Snapshot> {
        self.snapshots.last().copied()
    }

    // -----------------------------------------------------------------------
    // Time-window filters
    // -----------------------------------------------------------------------

    /// Snapshots created at or after `cutoff`.
    pub fn created_since(&self, cutoff: DateTime<Utc>) -> Self {
        Self {
            snapshots: self
                .snapshots
                .iter()
                .copied()
                .filter(|s| s.created >= cutoff)
                .collect(),
        }
    }

    /// Snapshots created within `window` before now.
    pub fn created_in(&self, window: Duration) -> Self {
        self.created_since(Utc::now() - window)
    }

    /// Snapshots created within the past `n` seconds.
    pub fn created_in_seconds(&self, n: i64) -> Self {
        self.created_in(Duration::seconds(n))
    }

    /// Snapshots created within the past `n` minutes.
    pub fn created_in_minutes(&self, n: i64) -> Self {
        self.created_in(Duration::minutes(n))
    }

    /// Snapshots created within the past `n` hours.
    pub fn created_in_hours(&self, n: i64) -> Self {
        self.created_in(Duration::hours(n))
    }

    /// Snapshots created within the past `n` days.
    pub fn created_in_days(&self, n: i64) -> Self {
        self.created_in(Duration::days(n))
    }

    /// Snapshots created within the past `n` weeks.
    pub fn created_in_weeks(&self, n: i64) -> Self {
        self.created_in(Duration::weeks(n))
    }

    /// Snapshots created within the past `n` months, a month being 28
    /// days by convention.
    pub fn created_in_months(&self, n: i64) -> Self {
        self.created_in(Duration::weeks(n.saturating_mul(4)))
    }

    /// Snapshots created within the past `n` years, a year being 365
    /// days by convention.
    pub fn created_in_years(&self, n: i64) -> Self {
        self.created_in(Duration::days(n.saturating_mul(365)))
    }

    // -----------------------------------------------------------------------
    // Resampling
    // -----------------------------------------------------------------------

    /// Downsample to at most one snapshot per bucket, keeping the
    /// chronologically-last snapshot of each.
    ///
    /// Buckets containing no snapshots are simply absent -- there is no
    /// gap filling -- and an empty series resamples to an empty series.
    pub fn resample(&self, bucket: Bucket) -> Self {
        let width = bucket.width_seconds();
        let mut kept: BTreeMap<i64, &'a Snapshot> = BTreeMap::new();

        for snapshot in self.snapshots.iter().copied() {
            let index = snapshot.created.timestamp().div_euclid(width);
            match kept.get(&index) {
                Some(existing) if (existing.created, existing.seq) >= (snapshot.created, snapshot.seq) => {}
                _ => {
                    kept.insert(index, snapshot);
                }
            }
        }

        Self {
            snapshots: kept.into_values().collect(),
        }
    }

    /// Filter to `window` before now, then resample into `bucket`s.
    pub fn resampled_in(&self, window: Duration, bucket: Bucket) -> Self {
        self.created_in(window).resample(bucket)
    }

    /// The past hour at minute granularity.
    pub fn resampled_hour(&self) -> Self {
        self.resampled_in(Duration::hours(1), Bucket::Minute)
    }

    /// The past day at hour granularity.
    pub fn resampled_day(&self) -> Self {
        self.resampled_in(Duration::days(1), Bucket::Hour)
    }

    /// The past week at day granularity.
    pub fn resampled_week(&self) -> Self {
        self.resampled_in(Duration::weeks(1), Bucket::Day)
    }

    /// The past month (28 days) at day granularity.
    pub fn resampled_month(&self) -> Self {
        self.resampled_in(Duration::weeks(4), Bucket::Day)
    }

    /// The past year (365 days) at month granularity.
    pub fn resampled_year(&self) -> Self {
        self.resampled_in(Duration::days(365), Bucket::Month)
    }
}

impl<'a> From<&'a [Snapshot]> for Series<'a> {
    fn from(history: &'a [Snapshot]) -> Self {
        Self::new(history)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use annals_types::{EntityId, EntityType, FieldValue, SnapshotId};
    use chrono::TimeZone;

    use super::*;

    /// Build a snapshot carrying one text value at a fixed instant.
    fn snapshot_at(seq: u64, created: DateTime<Utc>, text: &str) -> Snapshot {
        let mut values = BTreeMap::new();
        values.insert("text".to_owned(), FieldValue::from(text));
        Snapshot {
            id: SnapshotId::new(),
            seq,
            subject_type: EntityType::from("comment"),
            subject_id: EntityId::new(),
            created,
            modified: created,
            values,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().map_or_else(Utc::now, |t| t)
    }

    fn text_of(s: &Snapshot) -> Option<&FieldValue> {
        s.value("text")
    }

    #[test]
    fn empty_series_resamples_to_empty() {
        let history: Vec<Snapshot> = Vec::new();
        let series = Series::new(&history);
        assert!(series.resample(Bucket::Hour).is_empty());
        assert!(series.latest().is_none());
    }

    #[test]
    fn resample_keeps_last_snapshot_per_bucket() {
        // Three snapshots in one hour bucket, one in the next.
        let history = vec![
            snapshot_at(0, at(3_600), "a"),
            snapshot_at(1, at(3_700), "b"),
            snapshot_at(2, at(3_800), "c"),
            snapshot_at(3, at(7_300), "d"),
        ];
        let resampled = Series::new(&history).resample(Bucket::Hour);

        assert_eq!(resampled.len(), 2);
        let texts: Vec<_> = resampled.iter().filter_map(text_of).cloned().collect();
        assert_eq!(texts, [FieldValue::from("c"), FieldValue::from("d")]);
    }

    #[test]
    fn resample_never_increases_count() {
        let history = vec![
            snapshot_at(0, at(10), "a"),
            snapshot_at(1, at(70), "b"),
            snapshot_at(2, at(130), "c"),
        ];
        let series = Series::new(&history);
        for bucket in [
            Bucket::Second,
            Bucket::Minute,
            Bucket::Hour,
            Bucket::Day,
            Bucket::Week,
            Bucket::Month,
            Bucket::Year,
        ] {
            assert!(series.resample(bucket).len() <= series.len());
        }
        // Second-wide buckets keep everything here; year-wide keep one.
        assert_eq!(series.resample(Bucket::Second).len(), 3);
        assert_eq!(series.resample(Bucket::Year).len(), 1);
    }

    #[test]
    fn resample_ties_fall_to_the_higher_sequence() {
        let instant = at(3_600);
        let history = vec![
            snapshot_at(0, instant, "first"),
            snapshot_at(1, instant, "second"),
        ];
        let resampled = Series::new(&history).resample(Bucket::Hour);
        assert_eq!(resampled.len(), 1);
        assert_eq!(
            resampled.latest().and_then(text_of).cloned(),
            Some(FieldValue::from("second"))
        );
    }

    #[test]
    fn created_since_filters_by_cutoff() {
        let history = vec![
            snapshot_at(0, at(100), "old"),
            snapshot_at(1, at(200), "mid"),
            snapshot_at(2, at(300), "new"),
        ];
        let series = Series::new(&history);
        let recent = series.created_since(at(200));
        assert_eq!(recent.len(), 2);
        assert_eq!(
            recent.latest().and_then(text_of).cloned(),
            Some(FieldValue::from("new"))
        );
    }

    #[test]
    fn created_in_keeps_fresh_snapshots() {
        let now = Utc::now();
        let history = vec![
            snapshot_at(0, now - Duration::days(10), "stale"),
            snapshot_at(1, now - Duration::seconds(5), "fresh"),
        ];
        let series = Series::new(&history);

        assert_eq!(series.created_in_hours(1).len(), 1);
        assert_eq!(series.created_in_days(30).len(), 2);
        assert_eq!(series.created_in_seconds(1).len(), 0);
    }

    #[test]
    fn month_and_year_windows_use_fixed_approximations() {
        let now = Utc::now();
        let history = vec![
            // 29 days old: outside one 28-day month, inside one year.
            snapshot_at(0, now - Duration::days(29), "a"),
            // 370 days old: outside one 365-day year.
            snapshot_at(1, now - Duration::days(370), "b"),
        ];
        let series = Series::new(&history);

        assert_eq!(series.created_in_months(1).len(), 0);
        assert_eq!(series.created_in_months(2).len(), 1);
        assert_eq!(series.created_in_years(1).len(), 1);
        assert_eq!(series.created_in_years(2).len(), 2);
    }

    #[test]
    fn series_orders_by_created_then_seq() {
        // Deliberately shuffled input.
        let history = vec![
            snapshot_at(2, at(300), "c"),
            snapshot_at(0, at(100), "a"),
            snapshot_at(1, at(200), "b"),
        ];
        let series = Series::new(&history);
        let texts: Vec<_> = series.iter().filter_map(text_of).cloned().collect();
        assert_eq!(
            texts,
            [
                FieldValue::from("a"),
                FieldValue::from("b"),
                FieldValue::from("c")
            ]
        );
    }

    #[test]
    fn resampled_convenience_windows_compose_filter_and_bucket() {
        let now = Utc::now();
        let history = vec![
            snapshot_at(0, now - Duration::minutes(30), "a"),
            snapshot_at(1, now - Duration::minutes(30), "b"),
            snapshot_at(2, now - Duration::hours(3), "out"),
        ];
        let series = Series::new(&history);
        let resampled = series.resampled_hour();

        // The two fresh snapshots share a minute bucket; the stale one is
        // outside the window entirely.
        assert_eq!(resampled.len(), 1);
        assert_eq!(
            resampled.latest().and_then(text_of).cloned(),
            Some(FieldValue::from("b"))
        );
    }
}
