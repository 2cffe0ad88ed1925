//! Generic aggregation over already-fetched rows.
//!
//! Everything here is a pure function of its inputs. Data problems (empty
//! collections, nulls, dangling references) never fail; only nonsensical
//! static parameters such as a zero-width window panic.

use crate::schema::Monetary;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::ops::Add;

/// Ordered key -> count map. Keys keep the order in which they were first
/// seen (or seeded), so chart legends stay put between renders.
#[derive(Debug, Clone)]
pub struct Tally<K> {
    entries: Vec<(K, u64)>,
    index: HashMap<K, usize>,
}

impl<K: Eq + Hash + Clone> Tally<K> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Starts with every key present at zero.
    pub fn seeded(keys: &[K]) -> Self {
        let mut tally = Self::new();
        for key in keys {
            tally.slot(key.clone());
        }
        tally
    }

    fn slot(&mut self, key: K) -> &mut u64 {
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, 0));
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx].1
    }

    pub fn bump(&mut self, key: K) {
        *self.slot(key) += 1;
    }

    /// Count for `key`, zero when it was never seen.
    pub fn get(&self, key: &K) -> u64 {
        self.index.get(key).map_or(0, |&idx| self.entries[idx].1)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, u64)> {
        self.entries.iter().map(|(k, n)| (k, *n))
    }

    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, n)| n).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for Tally<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: PartialEq> PartialEq for Tally<K> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<K: Eq> Eq for Tally<K> {}

impl<K: Serialize> Serialize for Tally<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, count) in &self.entries {
            map.serialize_entry(key, count)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyPoint<V> {
    pub day: NaiveDate,
    pub value: V,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CumulativePoint<V> {
    pub day: NaiveDate,
    pub value: V,
    pub running_total: V,
}

/// Per-month status counts, `month` is `YYYY-MM`, `label` the short month name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthBucket<S: Eq + Hash + Clone> {
    pub month: String,
    pub label: String,
    pub counts: Tally<S>,
}

/// Counts rows per status. Every status in `known` is present in the result,
/// zero when no row carries it; statuses outside `known` are not counted.
pub fn count_by_status<T, S, F>(rows: &[T], status_of: F, known: &[S]) -> Tally<S>
where
    S: Eq + Hash + Clone,
    F: Fn(&T) -> S,
{
    let mut tally = Tally::seeded(known);
    for row in rows {
        let status = status_of(row);
        if tally.contains(&status) {
            tally.bump(status);
        }
    }
    tally
}

pub fn count_where<T>(rows: &[T], predicate: impl Fn(&T) -> bool) -> u64 {
    rows.iter().filter(|row| predicate(*row)).count() as u64
}

/// Exact decimal total of the rows matching `predicate`.
pub fn sum_amount_where<T: Monetary>(rows: &[T], predicate: impl Fn(&T) -> bool) -> Decimal {
    rows.iter()
        .filter(|row| predicate(*row))
        .map(Monetary::amount)
        .sum()
}

/// Mean amount, zero for an empty collection.
pub fn average_amount<T: Monetary>(rows: &[T]) -> Decimal {
    if rows.is_empty() {
        return Decimal::ZERO;
    }
    let total = sum_amount_where(rows, |_| true);
    (total / Decimal::from(rows.len())).round_dp(2)
}

/// Whole-number percentage of `part` in `whole`, rounded half up; 0 when
/// `whole` is 0.
pub fn rate(part: u64, whole: u64) -> u32 {
    if whole == 0 {
        return 0;
    }
    let scaled = (u128::from(part) * 200 + u128::from(whole)) / (2 * u128::from(whole));
    u32::try_from(scaled).unwrap_or(u32::MAX)
}

/// Buckets rows by UTC calendar day, ascending. `value_of` returning `None`
/// leaves the row out; a day whose rows are all left out does not appear.
/// Same-day values are added, so pass `Some(1)` to count.
pub fn group_by_day<T, V, F, G>(rows: &[T], timestamp_of: F, value_of: G) -> Vec<DailyPoint<V>>
where
    V: Add<Output = V> + Copy,
    F: Fn(&T) -> DateTime<Utc>,
    G: Fn(&T) -> Option<V>,
{
    let mut by_day: BTreeMap<NaiveDate, V> = BTreeMap::new();
    for row in rows {
        let Some(value) = value_of(row) else {
            continue;
        };
        let day = timestamp_of(row).date_naive();
        by_day
            .entry(day)
            .and_modify(|acc| *acc = *acc + value)
            .or_insert(value);
    }
    by_day
        .into_iter()
        .map(|(day, value)| DailyPoint { day, value })
        .collect()
}

pub fn cumulative_series<V>(points: &[DailyPoint<V>]) -> Vec<CumulativePoint<V>>
where
    V: Add<Output = V> + Copy,
{
    let mut running: Option<V> = None;
    points
        .iter()
        .map(|point| {
            let total = running.map_or(point.value, |acc| acc + point.value);
            running = Some(total);
            CumulativePoint {
                day: point.day,
                value: point.value,
                running_total: total,
            }
        })
        .collect()
}

/// Trailing mean over at most `window` entries ending at each position. The
/// window shrinks at the start of the series instead of padding with zeros.
///
/// # Panics
///
/// Panics when `window` is zero.
pub fn moving_average(series: &[f64], window: usize) -> Vec<f64> {
    assert!(window >= 1, "moving average window must be at least 1");
    (0..series.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &series[start..=i];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Counts rows per key, folding null and empty keys into `default_key`.
pub fn group_by_key<'a, T, F>(rows: &'a [T], key_of: F, default_key: &str) -> Tally<String>
where
    F: Fn(&'a T) -> Option<&'a str>,
{
    let mut tally = Tally::new();
    for row in rows {
        let key = match key_of(row) {
            Some(key) if !key.is_empty() => key,
            _ => default_key,
        };
        tally.bump(key.to_string());
    }
    tally
}

/// Pairs each row with the parent its foreign key points at, or `None` when
/// the key is null or points nowhere.
pub fn join_weak<'r, 'p, T, P, K, F, G>(
    rows: &'r [T],
    parents: &'p [P],
    foreign_key: F,
    parent_key: G,
) -> Vec<(&'r T, Option<&'p P>)>
where
    K: Eq + Hash,
    F: Fn(&T) -> Option<K>,
    G: Fn(&P) -> K,
{
    let by_key: HashMap<K, &'p P> = parents.iter().map(|p| (parent_key(p), p)).collect();
    rows.iter()
        .map(|row| {
            let parent = foreign_key(row).and_then(|key| by_key.get(&key).copied());
            (row, parent)
        })
        .collect()
}

/// Status counts per calendar month, oldest month first.
pub fn group_by_month<T, S, F, G>(
    rows: &[T],
    timestamp_of: F,
    status_of: G,
    known: &[S],
) -> Vec<MonthBucket<S>>
where
    S: Eq + Hash + Clone,
    F: Fn(&T) -> DateTime<Utc>,
    G: Fn(&T) -> S,
{
    let mut by_month: BTreeMap<(i32, u32), Tally<S>> = BTreeMap::new();
    for row in rows {
        let ts = timestamp_of(row);
        let status = status_of(row);
        let tally = by_month
            .entry((ts.year(), ts.month()))
            .or_insert_with(|| Tally::seeded(known));
        if tally.contains(&status) {
            tally.bump(status);
        }
    }
    by_month
        .into_iter()
        .map(|((year, month), counts)| MonthBucket {
            month: format!("{year:04}-{month:02}"),
            label: month_label(month).to_string(),
            counts,
        })
        .collect()
}

pub fn month_label(month: u32) -> &'static str {
    const LABELS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    month
        .checked_sub(1)
        .and_then(|idx| LABELS.get(idx as usize))
        .copied()
        .unwrap_or("")
}

/// Inserts `zero` entries for the days missing between the first and last
/// point of an ascending series.
pub fn fill_daily_gaps<V: Copy>(points: &[DailyPoint<V>], zero: V) -> Vec<DailyPoint<V>> {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return Vec::new();
    };
    let known: BTreeMap<NaiveDate, V> = points.iter().map(|p| (p.day, p.value)).collect();
    first
        .day
        .iter_days()
        .take_while(|day| *day <= last.day)
        .map(|day| DailyPoint {
            day,
            value: known.get(&day).copied().unwrap_or(zero),
        })
        .collect()
}
