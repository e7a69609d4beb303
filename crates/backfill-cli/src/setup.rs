use crate::cmd::run::RunArgs;
use crate::reasoner::ClaudeReasoner;
use anyhow::Context;
use backfill_agent::CompletionOptions;
use backfill_core::config::{Config, ReasonerKind, WarnLevel};
use backfill_core::planner::{Planner, RulePlanner};
use backfill_core::react::ReactPlanner;
use backfill_core::reasoning::{CommandReasoner, JsonPlanner, Reasoner};
use backfill_core::record::{sample_records, Entry};
use backfill_core::types::PlannerKind;
use backfill_core::{io, paths};
use std::path::Path;
use tokio::runtime::Handle;

/// Load the config (defaults when absent) and apply command-line overrides.
pub fn load_config(root: &Path, args: &RunArgs) -> anyhow::Result<Config> {
    let mut config = Config::load_or_default(root).context("failed to load config")?;
    if let Some(kind) = args.planner {
        config.planner.kind = kind;
    }
    if let Some(policy) = args.policy {
        config.planner.policy = policy;
    }
    if let Some(on_error) = args.on_error {
        config.on_error = on_error;
    }

    let mut errors = Vec::new();
    for w in config.validate() {
        match w.level {
            WarnLevel::Warning => tracing::warn!("config: {}", w.message),
            WarnLevel::Error => errors.push(w.message),
        }
    }
    if !errors.is_empty() {
        anyhow::bail!("invalid config: {}", errors.join("; "));
    }
    Ok(config)
}

/// Input entries; elements of the file that are not records come back as
/// `Err` and are handled per record by the batch policy.
pub fn load_input(root: &Path, args: &RunArgs) -> anyhow::Result<Vec<Entry>> {
    match (&args.input, args.sample) {
        (Some(path), _) => {
            let path = paths::resolve(root, path);
            io::load_entries(&path)
                .with_context(|| format!("failed to read records from {}", path.display()))
        }
        (None, true) => Ok(sample_records().into_iter().map(Ok).collect()),
        (None, false) => anyhow::bail!("no input: pass --input <FILE> or --sample"),
    }
}

pub fn build_planner(config: &Config, handle: &Handle) -> anyhow::Result<Box<dyn Planner>> {
    let policy = config.planner.policy;
    let planner: Box<dyn Planner> = match config.planner.kind {
        PlannerKind::Rules => Box::new(RulePlanner::with_policy(policy)),
        PlannerKind::Json => Box::new(JsonPlanner::new(build_reasoner(config, handle)?, policy)),
        PlannerKind::React => Box::new(ReactPlanner::new(build_reasoner(config, handle)?)),
    };
    tracing::info!(planner = planner.name(), %policy, "planner ready");
    Ok(planner)
}

fn build_reasoner(config: &Config, handle: &Handle) -> anyhow::Result<Box<dyn Reasoner>> {
    let rc = &config.reasoner;
    match rc.kind {
        ReasonerKind::Claude => Ok(Box::new(ClaudeReasoner::new(
            handle.clone(),
            CompletionOptions {
                model: Some(rc.model.clone()),
                system_prompt: None,
                executable: rc.executable.clone(),
            },
            rc.timeout(),
        ))),
        ReasonerKind::Command => {
            let program = rc
                .program()
                .context("reasoner.kind is 'command' but reasoner.executable is not set")?;
            Ok(Box::new(CommandReasoner::new(
                program,
                rc.args.clone(),
                rc.timeout(),
            )))
        }
    }
}
