use super::*;
use crate::model::{TaxReturnRecord, TaxpayerRecord};
use tf_core::RunId;

fn run(n: u32) -> RunContext {
    RunContext::with_id(
        RunId::new(format!("run_{n}")),
        Utc.with_ymd_and_hms(2024, 6, n, 12, 0, 0).unwrap(),
    )
}

fn day(month: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, month, d, 0, 0, 0).unwrap()
}

fn fact(key: u64, filed: Option<DateTime<Utc>>, payable: f64) -> TaxReturnRecord {
    TaxReturnRecord {
        return_key: Some(key),
        taxpayer_id: Some(7),
        assessment_year: Some(2023),
        filing_date: filed,
        annual_income: Some(100.0),
        tax_payable: Some(payable),
        ..Default::default()
    }
}

fn taxpayer(id: u64, name: &str) -> TaxpayerRecord {
    TaxpayerRecord {
        taxpayer_id: Some(id),
        nric: Some(format!("S000000{id}A")),
        full_name: Some(name.to_string()),
        ..Default::default()
    }
}

fn stamp<T: Clone>(records: &[T], run: &RunContext) -> Vec<Stamped<T>> {
    records.iter().cloned().map(|r| Stamped::new(r, run)).collect()
}

fn rows_for<T: Mergeable>(table: &[Versioned<T>], key: u64) -> Vec<&Versioned<T>> {
    let mut rows: Vec<_> = table
        .iter()
        .filter(|r| r.record.business_key() == Some(key))
        .collect();
    rows.sort_by_key(|r| r.validity.version);
    rows
}

/// Single current row per key, open-ended, contiguous, versions 1..N
fn assert_scd2_invariants<T: Mergeable>(table: &[Versioned<T>]) {
    let keys: std::collections::BTreeSet<u64> =
        table.iter().filter_map(|r| r.record.business_key()).collect();
    for key in keys {
        let rows = rows_for(table, key);
        let current: Vec<_> = rows.iter().filter(|r| r.validity.is_current).collect();
        assert_eq!(current.len(), 1, "key {key} must have one current row");
        assert_eq!(current[0].validity.effective_end, Some(open_end()));
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.validity.version as usize, i + 1);
        }
        for pair in rows.windows(2) {
            assert_eq!(pair[0].validity.effective_end, pair[1].validity.effective_start);
            assert!(!pair[0].validity.is_current);
        }
    }
}

#[test]
fn test_open_end_sentinel() {
    assert_eq!(open_end().to_rfc3339(), "2262-04-10T16:00:00+00:00");
}

#[test]
fn test_first_load_versions_every_key() {
    let r1 = run(1);
    let batch = stamp(
        &[fact(1, Some(day(3, 1)), 10.0), fact(2, Some(day(3, 2)), 20.0)],
        &r1,
    );
    let table = merge(&[], &batch, &r1);

    assert_eq!(table.len(), 2);
    for row in &table {
        assert_eq!(row.validity.version, 1);
        assert!(row.validity.is_current);
        assert_eq!(row.validity.effective_end, Some(open_end()));
        assert_eq!(row.lineage.created_run_id.as_deref(), Some("run_1"));
    }
    assert_eq!(table[0].validity.effective_start, Some(day(3, 1)));
    assert_scd2_invariants(&table);
}

#[test]
fn test_empty_batch_is_noop() {
    let r1 = run(1);
    let table = merge(&[], &stamp(&[fact(1, Some(day(3, 1)), 10.0)], &r1), &r1);
    let again = merge(&table, &[], &run(2));
    assert_eq!(again, table);
}

#[test]
fn test_newer_fact_retires_previous_version() {
    let r1 = run(1);
    let r2 = run(2);
    let first = merge(&[], &stamp(&[fact(1, Some(day(3, 1)), 10.0)], &r1), &r1);
    let second = merge(&first, &stamp(&[fact(1, Some(day(5, 1)), 12.0)], &r2), &r2);

    let rows = rows_for(&second, 1);
    assert_eq!(rows.len(), 2);

    let retired = rows[0];
    assert_eq!(retired.record.tax_payable, Some(10.0));
    assert!(!retired.validity.is_current);
    assert_eq!(retired.validity.effective_end, Some(day(5, 1)));
    assert_eq!(retired.lineage.updated_at, Some(r2.run_timestamp));
    assert_eq!(retired.lineage.last_seen_run_id.as_deref(), Some("run_1"));

    let current = rows[1];
    assert_eq!(current.validity.version, 2);
    assert!(current.validity.is_current);
    assert_eq!(current.validity.effective_end, Some(open_end()));
    assert_eq!(current.lineage.created_run_id.as_deref(), Some("run_2"));
    assert_scd2_invariants(&second);
}

#[test]
fn test_unchanged_record_keeps_provenance() {
    let r1 = run(1);
    let r2 = run(2);
    let records = [fact(1, Some(day(3, 1)), 10.0)];
    let first = merge(&[], &stamp(&records, &r1), &r1);
    let second = merge(&first, &stamp(&records, &r2), &r2);

    assert_eq!(second.len(), 1);
    let row = &second[0];
    assert_eq!(row.lineage.created_run_id.as_deref(), Some("run_1"));
    assert_eq!(row.lineage.created_at, Some(r1.run_timestamp));
    assert_eq!(row.lineage.last_seen_run_id.as_deref(), Some("run_2"));
    assert_eq!(row.validity.version, 1);
    assert!(row.validity.is_current);
}

#[test]
fn test_rows_absent_from_batch_keep_last_seen() {
    let r1 = run(1);
    let r2 = run(2);
    let first = merge(
        &[],
        &stamp(&[fact(1, Some(day(3, 1)), 10.0), fact(2, Some(day(3, 1)), 5.0)], &r1),
        &r1,
    );
    let second = merge(&first, &stamp(&[fact(2, Some(day(3, 1)), 5.0)], &r2), &r2);

    let untouched = rows_for(&second, 1)[0];
    assert_eq!(untouched.lineage.last_seen_run_id.as_deref(), Some("run_1"));
    assert_eq!(untouched.lineage.updated_at, Some(r1.run_timestamp));
    let seen = rows_for(&second, 2)[0];
    assert_eq!(seen.lineage.last_seen_run_id.as_deref(), Some("run_2"));
}

#[test]
fn test_fact_without_filing_date_starts_at_creation() {
    let r1 = run(1);
    let table = merge(&[], &stamp(&[fact(1, None, 10.0)], &r1), &r1);
    assert_eq!(table[0].validity.effective_start, Some(r1.run_timestamp));
}

#[test]
fn test_late_arriving_older_fact_is_not_current() {
    let r1 = run(1);
    let r2 = run(2);
    let first = merge(&[], &stamp(&[fact(1, Some(day(5, 1)), 12.0)], &r1), &r1);
    let second = merge(&first, &stamp(&[fact(1, Some(day(3, 1)), 10.0)], &r2), &r2);

    let rows = rows_for(&second, 1);
    assert_eq!(rows[0].record.tax_payable, Some(10.0));
    assert_eq!(rows[1].record.tax_payable, Some(12.0));
    assert!(rows[1].validity.is_current);
    assert_eq!(rows[1].lineage.updated_at, Some(r1.run_timestamp));
    assert_scd2_invariants(&second);
}

#[test]
fn test_duplicate_key_in_first_batch_keeps_single_current() {
    let r1 = run(1);
    let table = merge(
        &[],
        &stamp(&[fact(1, Some(day(3, 1)), 10.0), fact(1, Some(day(4, 1)), 11.0)], &r1),
        &r1,
    );
    assert_eq!(table.len(), 2);
    assert_scd2_invariants(&table);
}

#[test]
fn test_dimension_history_across_runs() {
    let (r1, r2, r3, r4) = (run(1), run(2), run(3), run(4));

    let t1 = merge(&[], &stamp(&[taxpayer(1, "Alice Tan")], &r1), &r1);
    assert_eq!(t1[0].validity.effective_start, Some(r1.run_timestamp));

    // Re-affirmed state keeps its start.
    let t2 = merge(&t1, &stamp(&[taxpayer(1, "Alice Tan")], &r2), &r2);
    assert_eq!(t2.len(), 1);
    assert_eq!(t2[0].validity.effective_start, Some(r1.run_timestamp));
    assert_eq!(t2[0].lineage.last_seen_run_id.as_deref(), Some("run_2"));

    // A changed state starts at the run that observed it.
    let t3 = merge(&t2, &stamp(&[taxpayer(1, "Alice Lim")], &r3), &r3);
    let rows = rows_for(&t3, 1);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].record.full_name.as_deref(), Some("Alice Tan"));
    assert_eq!(rows[0].validity.effective_end, Some(r3.run_timestamp));
    assert_eq!(rows[0].lineage.updated_at, Some(r3.run_timestamp));
    assert_eq!(rows[1].record.full_name.as_deref(), Some("Alice Lim"));
    assert_eq!(rows[1].validity.effective_start, Some(r3.run_timestamp));
    assert_scd2_invariants(&t3);

    // Reverting to an earlier state makes it current again.
    let t4 = merge(&t3, &stamp(&[taxpayer(1, "Alice Tan")], &r4), &r4);
    let rows = rows_for(&t4, 1);
    assert_eq!(rows.len(), 2);
    let current = rows.iter().find(|r| r.validity.is_current).unwrap();
    assert_eq!(current.record.full_name.as_deref(), Some("Alice Tan"));
    assert_eq!(current.validity.effective_start, Some(r4.run_timestamp));
    assert_eq!(current.lineage.created_run_id.as_deref(), Some("run_1"));
    let retired = rows.iter().find(|r| !r.validity.is_current).unwrap();
    assert_eq!(retired.record.full_name.as_deref(), Some("Alice Lim"));
    assert_eq!(retired.lineage.updated_at, Some(r4.run_timestamp));
    assert_scd2_invariants(&t4);
}

#[test]
fn test_null_business_keys_stay_standalone() {
    let r1 = run(1);
    let orphan = TaxpayerRecord {
        full_name: Some("Unknown".into()),
        ..Default::default()
    };
    let table = merge(
        &[],
        &stamp(&[orphan.clone(), orphan.clone(), taxpayer(1, "Alice Tan")], &r1),
        &r1,
    );

    let orphans: Vec<_> = table
        .iter()
        .filter(|r| r.record.business_key().is_none())
        .collect();
    assert_eq!(orphans.len(), 2);
    for row in orphans {
        assert_eq!(row.validity.version, 1);
        assert!(row.validity.is_current);
        assert_eq!(row.validity.effective_end, Some(open_end()));
    }
    assert_scd2_invariants(&table);
}

#[test]
fn test_versioned_table_round_trip() {
    let r1 = run(1);
    let table = merge(&[], &stamp(&[taxpayer(1, "Alice Tan")], &r1), &r1);
    let stored = tf_core::Table::from_records(table.iter());
    assert!(stored.has_column("effective_end"));
    assert!(stored.has_column("created_run_id"));
    let back: Vec<Versioned<TaxpayerRecord>> = stored.to_records();
    assert_eq!(back, table);
}

#[test]
fn test_rerun_of_multi_state_extract_is_stable() {
    let states = [taxpayer(1, "Alice Tan"), taxpayer(1, "Alice Lim")];
    let r1 = run(1);
    let mut table = merge(&[], &stamp(&states, &r1), &r1);
    let first: Vec<Validity> = rows_for(&table, 1)
        .iter()
        .map(|r| r.validity.clone())
        .collect();
    assert_eq!(first.len(), 2);

    for n in 2..=3 {
        let rn = run(n);
        table = merge(&table, &stamp(&states, &rn), &rn);
        let rows = rows_for(&table, 1);
        let current = rows.iter().find(|r| r.validity.is_current).unwrap();
        assert_eq!(current.record.full_name.as_deref(), Some("Alice Lim"));
        let validity: Vec<Validity> = rows.iter().map(|r| r.validity.clone()).collect();
        assert_eq!(validity, first, "run {n} must not reshuffle versions");
        for row in &rows {
            assert_eq!(row.validity.effective_start, Some(r1.run_timestamp));
            assert_eq!(row.lineage.created_run_id.as_deref(), Some("run_1"));
        }
        assert_scd2_invariants(&table);
    }
}

#[test]
fn test_earlier_state_inside_batch_keeps_its_start() {
    let (r1, r2, r3) = (run(1), run(2), run(3));
    let t1 = merge(&[], &stamp(&[taxpayer(1, "Alice Tan")], &r1), &r1);
    let t2 = merge(&t1, &stamp(&[taxpayer(1, "Alice Lim")], &r2), &r2);

    // Both known states again, latest last: nothing moves.
    let batch = [taxpayer(1, "Alice Tan"), taxpayer(1, "Alice Lim")];
    let t3 = merge(&t2, &stamp(&batch, &r3), &r3);
    let rows = rows_for(&t3, 1);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].record.full_name.as_deref(), Some("Alice Tan"));
    assert_eq!(rows[0].validity.effective_start, Some(r1.run_timestamp));
    assert_eq!(rows[0].validity.effective_end, Some(r2.run_timestamp));
    assert_eq!(rows[1].record.full_name.as_deref(), Some("Alice Lim"));
    assert_eq!(rows[1].validity.effective_start, Some(r2.run_timestamp));
    assert!(rows[1].validity.is_current);
    assert_scd2_invariants(&t3);
}

#[test]
fn test_sub_microsecond_filing_date_survives_storage() {
    use chrono::SubsecRound;

    let filed = tf_core::parse::parse_timestamp("2024-03-01T10:00:00.123456789");
    let record = fact(1, filed, 10.0);
    let r1 = run(1);
    let table = merge(&[], &stamp(&[record.clone()], &r1), &r1);

    // Stored timestamps come back at microsecond precision.
    let mut stored: Vec<Versioned<TaxReturnRecord>> =
        tf_core::Table::from_records(table.iter()).to_records();
    for row in &mut stored {
        row.record.filing_date = row.record.filing_date.map(|t| t.trunc_subsecs(6));
        row.validity.effective_start = row.validity.effective_start.map(|t| t.trunc_subsecs(6));
    }

    let r2 = run(2);
    let again = merge(&stored, &stamp(&[record], &r2), &r2);
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].validity.version, 1);
    assert_eq!(again[0].lineage.created_run_id.as_deref(), Some("run_1"));
    assert_eq!(again[0].lineage.last_seen_run_id.as_deref(), Some("run_2"));
}
