use crate::cmd::run::RunArgs;
use crate::output::{print_json, print_table};
use crate::setup;
use anyhow::Context;
use backfill_core::batch::{BatchOptions, BatchRunner};
use backfill_core::types::Plan;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct PlanRow {
    index: usize,
    owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan: Option<Plan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn run(root: &Path, args: &RunArgs, json: bool) -> anyhow::Result<()> {
    let config = setup::load_config(root, args)?;
    let records = setup::load_input(root, args)?;

    let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let planner = setup::build_planner(&config, rt.handle())?;
    let lookup = config
        .lookup
        .build()
        .context("failed to build lookup provider")?;

    let runner = BatchRunner::new(planner.as_ref(), lookup.as_ref(), BatchOptions::default());
    let rows: Vec<PlanRow> = runner
        .plan_entries(&records)
        .into_iter()
        .zip(&records)
        .enumerate()
        .map(|(index, (result, entry))| {
            let (plan, error) = match result {
                Ok(plan) => (Some(plan), None),
                Err(e) => (None, Some(e.to_string())),
            };
            PlanRow {
                index,
                owner: entry.as_ref().ok().and_then(|r| r.owner.clone()),
                plan,
                error,
            }
        })
        .collect();

    if json {
        return print_json(&rows);
    }

    let table: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            vec![
                row.index.to_string(),
                row.owner.clone().unwrap_or_else(|| "<unknown>".into()),
                match (&row.plan, &row.error) {
                    (Some(plan), _) => plan.to_string(),
                    (None, Some(err)) => format!("error: {err}"),
                    (None, None) => "-".into(),
                },
            ]
        })
        .collect();
    print_table(&["#", "OWNER", "PLAN"], table);
    Ok(())
}
