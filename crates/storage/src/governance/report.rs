//! Markdown and CSV renderings of a [`SnapshotAnalysis`].

use std::fs;
use std::path::{Path, PathBuf};

use nanosense_core::constants::{SNAPSHOT_DUPLICATES_CSV, SNAPSHOT_REPORT_FILE, SNAPSHOT_SUMMARY_CSV};
use nanosense_core::snapshot::serialize;
use nanosense_core::timestamp::now_timestamp;
use serde::Serialize;

use super::analyze::{DuplicateBucket, SnapshotAnalysis, TableAnalysis};
use super::cleanup::{CleanupReport, CleanupStatus};
use crate::error::Result;

/// Top fingerprints listed per table in the governance summary.
const SUMMARY_TOP_FINGERPRINTS: usize = 3;

/// Candidate ids previewed per table in the governance summary.
const SUMMARY_PREVIEW_IDS: usize = 5;

/// Paths written by [`write_reports`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportFiles {
    pub markdown: PathBuf,
    pub summary_csv: PathBuf,
    pub duplicates_csv: PathBuf,
}

impl ReportFiles {
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        vec![self.markdown.clone(), self.summary_csv.clone(), self.duplicates_csv.clone()]
    }
}

/// Write `snapshot_report.md` plus both CSV files into `output_dir`,
/// creating the directory if needed.
///
/// # Errors
/// Returns error if a file cannot be written.
pub fn write_reports(analysis: &SnapshotAnalysis, output_dir: &Path) -> Result<ReportFiles> {
    fs::create_dir_all(output_dir)?;
    let markdown = output_dir.join(SNAPSHOT_REPORT_FILE);
    fs::write(&markdown, render_markdown_report(analysis, &now_timestamp()))?;
    let (summary_csv, duplicates_csv) = write_csv_reports(analysis, output_dir)?;
    tracing::info!(dir = %output_dir.display(), "Snapshot reports written");
    Ok(ReportFiles { markdown, summary_csv, duplicates_csv })
}

/// Human-facing Markdown report: a metrics table per snapshot table followed
/// by its top duplicate buckets.
#[must_use]
pub fn render_markdown_report(analysis: &SnapshotAnalysis, generated_at: &str) -> String {
    let mut lines = vec![format!("# Snapshot Governance Report ({generated_at})"), String::new()];
    for (table, stats) in analysis.tables() {
        lines.push(format!("## {}", table.title()));
        let Some(stats) = stats else {
            lines.push("Table not present in database.".to_owned());
            lines.push(String::new());
            continue;
        };
        lines.extend(metrics_table(stats));
        lines.push(String::new());

        if !stats.top_duplicates.is_empty() {
            lines.push(format!("### Duplicate fingerprints Top {}", stats.top_duplicates.len()));
            lines.push("| Fingerprint | Records | References | Record IDs | Representative | Time range |".to_owned());
            lines.push("| --- | --- | --- | --- | --- | --- |".to_owned());
            for bucket in &stats.top_duplicates {
                lines.push(format!(
                    "| `{}` | {} | {} | {} | `{}` | {} |",
                    bucket.fingerprint,
                    bucket.count,
                    bucket.reference_count,
                    join_ids(&bucket.record_ids, ", "),
                    serialize(&bucket.representative),
                    bucket.time_range().unwrap_or_else(|| "N/A".to_owned()),
                ));
            }
            lines.push(String::new());
        }
    }
    lines.join("\n")
}

fn metrics_table(stats: &TableAnalysis) -> Vec<String> {
    vec![
        "| Metric | Value |".to_owned(),
        "| --- | --- |".to_owned(),
        format!("| Total records | {} |", stats.total_records),
        format!("| Unique fingerprints | {} |", stats.unique_fingerprints),
        format!("| Duplicate records | {} |", stats.duplicate_records),
        format!("| Duplicate ratio | {:.2}% |", stats.duplicate_ratio * 100.0),
        format!("| Referenced records | {} |", stats.referenced_records),
        format!("| Unreferenced records | {} |", stats.unreferenced_records),
        format!("| Time range | {} |", stats.date_range_label().unwrap_or_else(|| "N/A".to_owned())),
    ]
}

/// Write `snapshot_summary.csv` and `snapshot_duplicates.csv` into `output_dir`.
///
/// # Errors
/// Returns error if a file cannot be written.
pub fn write_csv_reports(analysis: &SnapshotAnalysis, output_dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let summary_path = output_dir.join(SNAPSHOT_SUMMARY_CSV);
    let mut summary = csv::Writer::from_path(&summary_path)?;
    summary.write_record(["table", "metric", "value"])?;
    for (table, stats) in analysis.tables() {
        let Some(stats) = stats else {
            summary.write_record([table.as_str(), "status", "table missing"])?;
            continue;
        };
        let metrics = [
            ("total_records", stats.total_records.to_string()),
            ("unique_fingerprints", stats.unique_fingerprints.to_string()),
            ("duplicate_records", stats.duplicate_records.to_string()),
            ("duplicate_ratio", format!("{:.4}", stats.duplicate_ratio)),
            ("referenced_records", stats.referenced_records.to_string()),
            ("unreferenced_records", stats.unreferenced_records.to_string()),
            ("date_range", stats.date_range_label().unwrap_or_default()),
        ];
        for (metric, value) in metrics {
            summary.write_record([table.as_str(), metric, value.as_str()])?;
        }
    }
    summary.flush()?;

    let duplicates_path = output_dir.join(SNAPSHOT_DUPLICATES_CSV);
    let mut duplicates = csv::Writer::from_path(&duplicates_path)?;
    duplicates.write_record([
        "table",
        "fingerprint",
        "count",
        "reference_count",
        "record_ids",
        "representative",
        "first_timestamp",
        "last_timestamp",
    ])?;
    for (table, stats) in analysis.tables() {
        for bucket in stats.map(|s| s.top_duplicates.as_slice()).unwrap_or_default() {
            duplicates.write_record(duplicate_record(table.as_str(), bucket))?;
        }
    }
    duplicates.flush()?;

    Ok((summary_path, duplicates_path))
}

fn duplicate_record(table: &str, bucket: &DuplicateBucket) -> [String; 8] {
    [
        table.to_owned(),
        bucket.fingerprint.clone(),
        bucket.count.to_string(),
        bucket.reference_count.to_string(),
        join_ids(&bucket.record_ids, ";"),
        serialize(&bucket.representative),
        bucket.first_timestamp.clone().unwrap_or_default(),
        bucket.last_timestamp.clone().unwrap_or_default(),
    ]
}

fn join_ids(ids: &[i64], separator: &str) -> String {
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(separator)
}

/// Markdown summary of one governance run: snapshot statistics, cleanup
/// outcome (`None` when cleanup was skipped) and the files produced.
#[must_use]
pub fn render_governance_summary(
    db_path: &Path,
    analysis: &SnapshotAnalysis,
    cleanup: Option<&CleanupReport>,
    files: &[PathBuf],
    generated_at: &str,
) -> String {
    let mut lines = vec![
        format!("# Snapshot Governance Summary ({generated_at} UTC)"),
        String::new(),
        "## Context".to_owned(),
        format!("- Database: `{}`", db_path.display()),
        String::new(),
        "## Snapshot Statistics".to_owned(),
    ];

    for (table, stats) in analysis.tables() {
        let Some(stats) = stats else {
            lines.push(format!("- `{table}`: table missing or empty."));
            continue;
        };
        lines.push(format!(
            "- `{table}` total={} unique={} duplicates={} ({:.2}%) unreferenced={}",
            stats.total_records,
            stats.unique_fingerprints,
            stats.duplicate_records,
            stats.duplicate_ratio * 100.0,
            stats.unreferenced_records,
        ));
        if !stats.top_duplicates.is_empty() {
            lines.push("  - Top fingerprints:".to_owned());
            for bucket in stats.top_duplicates.iter().take(SUMMARY_TOP_FINGERPRINTS) {
                lines.push(format!(
                    "    - `{}` (records={}, references={})",
                    bucket.fingerprint, bucket.count, bucket.reference_count
                ));
            }
        }
    }

    lines.push(String::new());
    lines.push("## Cleanup".to_owned());
    match cleanup {
        None => lines.push("- Cleanup skipped.".to_owned()),
        Some(report) => {
            lines.push(format!("- Mode: {}", if report.dry_run { "dry-run" } else { "apply" }));
            for outcome in &report.tables {
                match outcome.status {
                    CleanupStatus::TableMissing => {
                        lines.push(format!("- `{}` table missing; skipped.", outcome.table));
                    },
                    CleanupStatus::NoSoftDelete => {
                        lines.push(format!("- `{}` has no is_active column; skipped.", outcome.table));
                    },
                    CleanupStatus::Processed => {
                        lines.push(format!(
                            "- `{}` candidates={} updated={}",
                            outcome.table,
                            outcome.candidates.len(),
                            outcome.updated_count
                        ));
                        if !outcome.candidates.is_empty() {
                            let preview: Vec<i64> = outcome
                                .candidates
                                .iter()
                                .take(SUMMARY_PREVIEW_IDS)
                                .map(|c| c.record_id)
                                .collect();
                            lines.push(format!("  - Preview IDs: {}", join_ids(&preview, ", ")));
                        }
                    },
                }
            }
        },
    }

    lines.push(String::new());
    lines.push("## Files".to_owned());
    for path in files {
        lines.push(format!("- {}", path.display()));
    }
    lines.join("\n")
}
