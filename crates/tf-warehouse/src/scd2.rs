//! SCD2 merge engine.
//!
//! [`merge`] folds one run's batch into a table's full prior history and
//! returns the complete new history. It never mutates its inputs.
//!
//! Guarantees for every business key in the output:
//! - exactly one row is current, and its `effective_end` is [`open_end`]
//! - versions are numbered `1..=N` in temporal order
//! - `effective_end` of version `k` equals `effective_start` of version `k + 1`
//! - `created_run_id` / `created_at` of an unchanged state never change

use chrono::{DateTime, TimeZone, Utc};
use ordered_float::OrderedFloat;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tf_core::table::{Column, ColumnType, RowView, TableRecord, Value};
use tf_core::RunContext;

/// Open-ended `effective_end` of current rows: 2262-04-11T00:00:00+08:00
pub fn open_end() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2262, 4, 10, 16, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// One component of a dedupe-key tuple
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DedupeValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(OrderedFloat<f64>),
    Text(String),
    Time(DateTime<Utc>),
}

impl From<Option<i64>> for DedupeValue {
    fn from(v: Option<i64>) -> Self {
        v.map_or(DedupeValue::Null, DedupeValue::Int)
    }
}

impl From<Option<u64>> for DedupeValue {
    fn from(v: Option<u64>) -> Self {
        v.map_or(DedupeValue::Null, DedupeValue::UInt)
    }
}

impl From<Option<f64>> for DedupeValue {
    fn from(v: Option<f64>) -> Self {
        v.map_or(DedupeValue::Null, |f| DedupeValue::Float(OrderedFloat(f)))
    }
}

impl From<Option<&str>> for DedupeValue {
    fn from(v: Option<&str>) -> Self {
        v.map_or(DedupeValue::Null, |s| DedupeValue::Text(s.to_string()))
    }
}

impl From<Option<DateTime<Utc>>> for DedupeValue {
    fn from(v: Option<DateTime<Utc>>) -> Self {
        v.map_or(DedupeValue::Null, DedupeValue::Time)
    }
}

/// Attribute tuple identifying "the same state" of a record
pub type DedupeKey = Vec<DedupeValue>;

/// How a table places versions in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeline {
    /// Versions start at the record's own event time, falling back to
    /// `created_at`
    EventTime,
    /// Versions start when the run first observed the state as the latest
    Observed,
}

/// A record that can be versioned by the merge engine
pub trait Mergeable: Clone {
    const TIMELINE: Timeline;

    /// Natural identity; `None` rows are never versioned together
    fn business_key(&self) -> Option<u64>;

    /// Attributes that define "no real change"; lineage is excluded
    fn dedupe_key(&self) -> DedupeKey;

    /// Business event time used by [`Timeline::EventTime`]
    fn event_time(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// Provenance columns carried by every persisted row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Lineage {
    pub created_run_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_seen_run_id: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Lineage {
    /// Lineage of a row first produced by `run`
    pub fn stamped(run: &RunContext) -> Self {
        Self {
            created_run_id: Some(run.run_id.to_string()),
            created_at: Some(run.run_timestamp),
            last_seen_run_id: Some(run.run_id.to_string()),
            updated_at: Some(run.run_timestamp),
        }
    }

    fn columns() -> [Column; 4] {
        [
            Column::new("created_run_id", ColumnType::Text),
            Column::new("created_at", ColumnType::Timestamp),
            Column::new("last_seen_run_id", ColumnType::Text),
            Column::new("updated_at", ColumnType::Timestamp),
        ]
    }

    fn values(&self) -> [Value; 4] {
        [
            Value::from(self.created_run_id.clone()),
            Value::from(self.created_at),
            Value::from(self.last_seen_run_id.clone()),
            Value::from(self.updated_at),
        ]
    }

    fn from_view(row: &RowView<'_>) -> Self {
        Self {
            created_run_id: row.text("created_run_id"),
            created_at: row.timestamp("created_at"),
            last_seen_run_id: row.text("last_seen_run_id"),
            updated_at: row.timestamp("updated_at"),
        }
    }
}

/// Version bookkeeping of a persisted row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validity {
    pub version: u32,
    pub effective_start: Option<DateTime<Utc>>,
    pub effective_end: Option<DateTime<Utc>>,
    pub is_current: bool,
}

impl Validity {
    fn columns() -> [Column; 4] {
        [
            Column::new("version", ColumnType::Int),
            Column::new("effective_start", ColumnType::Timestamp),
            Column::new("effective_end", ColumnType::Timestamp),
            Column::new("is_current", ColumnType::Bool),
        ]
    }

    fn values(&self) -> [Value; 4] {
        [
            Value::Int(i64::from(self.version)),
            Value::from(self.effective_start),
            Value::from(self.effective_end),
            Value::Bool(self.is_current),
        ]
    }

    fn from_view(row: &RowView<'_>) -> Self {
        Self {
            version: row
                .int("version")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(1),
            effective_start: row.timestamp("effective_start"),
            effective_end: row.timestamp("effective_end"),
            is_current: row.bool("is_current").unwrap_or(false),
        }
    }
}

/// A batch row produced by the current run
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    pub record: T,
    pub lineage: Lineage,
}

impl<T> Stamped<T> {
    pub fn new(record: T, run: &RunContext) -> Self {
        Self {
            record,
            lineage: Lineage::stamped(run),
        }
    }
}

/// A persisted, versioned row
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub record: T,
    pub lineage: Lineage,
    pub validity: Validity,
}

impl<T: TableRecord> TableRecord for Versioned<T> {
    fn schema() -> Vec<Column> {
        let mut columns = T::schema();
        columns.extend(Lineage::columns());
        columns.extend(Validity::columns());
        columns
    }

    fn to_values(&self) -> Vec<Value> {
        let mut values = self.record.to_values();
        values.extend(self.lineage.values());
        values.extend(self.validity.values());
        values
    }

    fn from_view(row: RowView<'_>) -> Self {
        Self {
            record: T::from_view(row),
            lineage: Lineage::from_view(&row),
            validity: Validity::from_view(&row),
        }
    }
}

/// Where a merge candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Prior,
    Batch,
}

struct Candidate<T> {
    record: T,
    lineage: Lineage,
    origin: Origin,
    prior_start: Option<DateTime<Utc>>,
    dedupe: DedupeKey,
}

/// Merge `batch` into `prior`, returning the table's full new state.
///
/// An empty batch returns `prior` unchanged.
pub fn merge<T: Mergeable>(
    prior: &[Versioned<T>],
    batch: &[Stamped<T>],
    run: &RunContext,
) -> Vec<Versioned<T>> {
    if batch.is_empty() {
        return prior.to_vec();
    }

    // First prior row per dedupe tuple supplies creation provenance.
    let mut first_seen: HashMap<DedupeKey, usize> = HashMap::new();
    let mut stored_start: HashMap<DedupeKey, Option<DateTime<Utc>>> = HashMap::new();
    let mut was_current: HashSet<DedupeKey> = HashSet::new();
    for (i, row) in prior.iter().enumerate() {
        let dedupe = row.record.dedupe_key();
        if row.validity.is_current {
            was_current.insert(dedupe.clone());
            stored_start.insert(dedupe.clone(), row.validity.effective_start);
        } else {
            stored_start
                .entry(dedupe.clone())
                .or_insert(row.validity.effective_start);
        }
        first_seen.entry(dedupe).or_insert(i);
    }

    // Latest batch state per business key.
    let mut latest_in_batch: HashMap<u64, DedupeKey> = HashMap::new();
    for row in batch {
        if let Some(key) = row.record.business_key() {
            latest_in_batch.insert(key, row.record.dedupe_key());
        }
    }

    let mut candidates: Vec<Candidate<T>> = Vec::with_capacity(prior.len() + batch.len());
    for row in prior {
        candidates.push(Candidate {
            record: row.record.clone(),
            lineage: row.lineage.clone(),
            origin: Origin::Prior,
            prior_start: row.validity.effective_start,
            dedupe: row.record.dedupe_key(),
        });
    }

    let mut in_batch: HashSet<DedupeKey> = HashSet::new();
    for row in batch {
        let dedupe = row.record.dedupe_key();
        let mut lineage = row.lineage.clone();
        if let Some(&i) = first_seen.get(&dedupe) {
            let existing = &prior[i].lineage;
            lineage.created_run_id = existing.created_run_id.clone().or(lineage.created_run_id);
            lineage.created_at = existing.created_at.or(lineage.created_at);
        }
        // A retired state that is again the latest one restarts at this run.
        let reverted = !was_current.contains(&dedupe)
            && row
                .record
                .business_key()
                .and_then(|key| latest_in_batch.get(&key))
                == Some(&dedupe);
        let prior_start = if reverted {
            None
        } else {
            stored_start.get(&dedupe).copied().flatten()
        };
        in_batch.insert(dedupe.clone());
        candidates.push(Candidate {
            record: row.record.clone(),
            lineage,
            origin: Origin::Batch,
            prior_start,
            dedupe,
        });
    }

    let survivors = drop_duplicates_keep_last(candidates);

    let mut by_key: BTreeMap<u64, Vec<Candidate<T>>> = BTreeMap::new();
    let mut standalone: Vec<Candidate<T>> = Vec::new();
    for candidate in survivors {
        match candidate.record.business_key() {
            Some(key) => by_key.entry(key).or_default().push(candidate),
            None => standalone.push(candidate),
        }
    }

    let mut merged = Vec::new();
    let mut retired = 0usize;
    for (_, versions) in by_key {
        let mut timed: Vec<(Option<DateTime<Utc>>, Candidate<T>)> = versions
            .into_iter()
            .map(|c| (effective_start(&c, run), c))
            .collect();
        timed.sort_by(|(a_start, a), (b_start, b)| {
            nulls_last(a_start, b_start)
                .then_with(|| nulls_last(&a.lineage.updated_at, &b.lineage.updated_at))
        });

        let starts: Vec<Option<DateTime<Utc>>> = timed.iter().map(|(s, _)| *s).collect();
        let count = timed.len();
        for (i, (start, candidate)) in timed.into_iter().enumerate() {
            let is_current = i + 1 == count;
            let effective_end = if is_current { Some(open_end()) } else { starts[i + 1] };
            let mut lineage = candidate.lineage;
            if in_batch.contains(&candidate.dedupe) {
                lineage.last_seen_run_id = Some(run.run_id.to_string());
            }
            if !is_current && was_current.contains(&candidate.dedupe) {
                lineage.updated_at = Some(run.run_timestamp);
                retired += 1;
            }
            merged.push(Versioned {
                record: candidate.record,
                lineage,
                validity: Validity {
                    version: u32::try_from(i + 1).unwrap_or(u32::MAX),
                    effective_start: start,
                    effective_end,
                    is_current,
                },
            });
        }
    }

    for candidate in standalone {
        let start = effective_start(&candidate, run);
        let mut lineage = candidate.lineage;
        if matches!(candidate.origin, Origin::Batch) {
            lineage.last_seen_run_id = Some(run.run_id.to_string());
        }
        merged.push(Versioned {
            record: candidate.record,
            lineage,
            validity: Validity {
                version: 1,
                effective_start: start,
                effective_end: Some(open_end()),
                is_current: true,
            },
        });
    }

    log::debug!(
        "Merged {} batch row(s) into {} prior row(s): {} row(s), {} retired",
        batch.len(),
        prior.len(),
        merged.len(),
        retired
    );
    merged
}

/// Collapse rows with an identical dedupe tuple, keeping the last one.
///
/// Rows without a business key are never collapsed.
fn drop_duplicates_keep_last<T: Mergeable>(candidates: Vec<Candidate<T>>) -> Vec<Candidate<T>> {
    let mut last: HashMap<&DedupeKey, usize> = HashMap::new();
    for (i, c) in candidates.iter().enumerate() {
        if c.record.business_key().is_some() {
            last.insert(&c.dedupe, i);
        }
    }
    let keep: HashSet<usize> = last.into_values().collect();
    candidates
        .into_iter()
        .enumerate()
        .filter(|(i, c)| c.record.business_key().is_none() || keep.contains(i))
        .map(|(_, c)| c)
        .collect()
}

fn effective_start<T: Mergeable>(
    candidate: &Candidate<T>,
    run: &RunContext,
) -> Option<DateTime<Utc>> {
    match T::TIMELINE {
        Timeline::EventTime => candidate
            .record
            .event_time()
            .or(candidate.lineage.created_at),
        Timeline::Observed => match candidate.origin {
            Origin::Prior => candidate.prior_start.or(candidate.lineage.created_at),
            Origin::Batch => candidate.prior_start.or(Some(run.run_timestamp)),
        },
    }
}

fn nulls_last(a: &Option<DateTime<Utc>>, b: &Option<DateTime<Utc>>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
#[path = "scd2_test.rs"]
mod tests;
