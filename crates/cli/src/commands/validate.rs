use std::process::ExitCode;

use anyhow::Result;
use nanosense_storage::validate;

use super::Context;

/// Exit code 1 when any structural error is found.
pub(crate) fn run(ctx: &Context) -> Result<ExitCode> {
    let store = ctx.open()?;
    let report = validate(store.conn())?;

    ctx.emit(&report, || {
        let mut lines = Vec::new();
        if report.is_ok() {
            lines.push("Schema validation passed.".to_owned());
        }
        lines.extend(report.errors.iter().map(|e| format!("ERROR: {e}")));
        lines.extend(report.warnings.iter().map(|w| format!("WARNING: {w}")));
        for (title, samples) in [("spectrum", &report.spectrum_samples), ("analysis", &report.analysis_samples)] {
            if samples.is_empty() {
                continue;
            }
            lines.push(format!("Sample {title} rows:"));
            for sample in samples {
                lines.push(format!(
                    "  - experiment={} type={} timestamp={}",
                    sample.experiment_id.map_or_else(|| "-".to_owned(), |id| id.to_string()),
                    sample.kind.as_deref().unwrap_or("-"),
                    sample.timestamp.as_deref().unwrap_or("-"),
                ));
            }
        }
        lines.join("\n")
    })?;

    Ok(if report.is_ok() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
