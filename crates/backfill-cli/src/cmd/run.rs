use crate::output::{print_json, print_table};
use crate::setup;
use anyhow::Context;
use backfill_core::batch::{BatchOptions, BatchReport, BatchRunner, CancelToken};
use backfill_core::types::{ErrorPolicy, PlannerKind, PlanningPolicy};
use backfill_core::{io, paths};
use clap::Args;
use std::path::{Path, PathBuf};

/// Input selection and planning overrides shared by `plan` and `run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Records file (JSON array, or YAML list for .yaml/.yml)
    #[arg(long, short = 'i', conflicts_with = "sample")]
    pub input: Option<PathBuf>,

    /// Use the built-in sample records
    #[arg(long)]
    pub sample: bool,

    /// Decision source: rules, json or react
    #[arg(long)]
    pub planner: Option<PlannerKind>,

    /// Planning policy: single_step or cascade
    #[arg(long)]
    pub policy: Option<PlanningPolicy>,

    /// What to do with a record that cannot be planned: skip, collect or abort
    #[arg(long = "on-error")]
    pub on_error: Option<ErrorPolicy>,
}

pub fn run(
    root: &Path,
    args: &RunArgs,
    out: Option<&Path>,
    report_path: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let config = setup::load_config(root, args)?;
    let records = setup::load_input(root, args)?;

    let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let planner = setup::build_planner(&config, rt.handle())?;
    let lookup = config
        .lookup
        .build()
        .context("failed to build lookup provider")?;

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        rt.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; stopping after the current record");
                cancel.cancel();
            }
        });
    }

    let runner = BatchRunner::new(
        planner.as_ref(),
        lookup.as_ref(),
        BatchOptions {
            on_error: config.on_error,
        },
    )
    .with_cancel(cancel);
    let report = runner.run_entries(records)?;

    let out_path = match out {
        Some(p) => paths::resolve(root, p),
        None => paths::resolve(root, Path::new(&config.output.path)),
    };
    io::write_records(&out_path, &report.records)
        .with_context(|| format!("failed to write {}", out_path.display()))?;

    let report_path = report_path
        .map(Path::to_path_buf)
        .or_else(|| config.output.report.as_ref().map(PathBuf::from))
        .map(|p| paths::resolve(root, &p));
    if let Some(path) = &report_path {
        io::write_report(path, &report)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    if json {
        print_json(&report)?;
    } else {
        print_summary(&report, &out_path, report_path.as_deref());
    }

    if report.cancelled {
        anyhow::bail!(
            "interrupted after {} of {} records",
            report.outcomes.len(),
            report.summary.total
        );
    }
    Ok(())
}

fn print_summary(report: &BatchReport, out_path: &Path, report_path: Option<&Path>) {
    let rows: Vec<Vec<String>> = report
        .outcomes
        .iter()
        .map(|o| {
            vec![
                o.index.to_string(),
                o.owner.clone().unwrap_or_else(|| "<unknown>".into()),
                o.status.as_str().to_string(),
                o.plan.clone().unwrap_or_else(|| "-".into()),
                o.lookups.to_string(),
            ]
        })
        .collect();
    print_table(&["#", "OWNER", "STATUS", "PLAN", "LOOKUPS"], rows);

    if !report.diagnostics.is_empty() {
        println!();
        for d in &report.diagnostics {
            println!("{d}");
        }
    }

    let s = &report.summary;
    println!();
    println!(
        "{} resolved, {} unchanged, {} skipped, {} failed ({} lookups)",
        s.resolved, s.unchanged, s.skipped, s.failed, s.lookups
    );
    println!(
        "Wrote {} record(s) to {}",
        report.records.len(),
        out_path.display()
    );
    if let Some(path) = report_path {
        println!("Report: {}", path.display());
    }
}
