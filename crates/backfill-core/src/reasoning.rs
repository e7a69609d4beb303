//! Reasoning-backed planning.
//!
//! A [`Reasoner`] is any text-completion service. The planners in this module
//! and in [`crate::react`] turn its free-form reply into a closed [`Action`]
//! sequence at the boundary and reject anything that does not fit: a reply
//! that cannot be parsed, an empty reply, or a plan that disagrees with what
//! the record actually needs is a `Planning` error, never "no action".
//!
//! # Response protocol
//!
//! [`JsonPlanner`] asks for a JSON array such as
//!
//! ```text
//! [{"action": "get_account_number", "input": "Jane Smith"},
//!  {"action": "get_central_account_number", "input": null}]
//! ```
//!
//! Code fences around the array are tolerated.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{BackfillError, Result};
use crate::exec::{run_with_timeout, ExecError};
use crate::planner::{Planner, RulePlanner};
use crate::record::Record;
use crate::types::{Action, ActionKind, Plan, PlanningPolicy};

// ---------------------------------------------------------------------------
// Reasoner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReasoningRequest {
    pub system: String,
    pub prompt: String,
    /// Generation stops at the first of these sequences. Planners also cut
    /// the reply at them, so reasoners that ignore stops stay correct.
    pub stop: Vec<String>,
}

/// An external text-generation service. Transport failures and timeouts are
/// reported as `PlannerUnavailable`.
pub trait Reasoner {
    fn name(&self) -> &str;

    fn complete(&self, request: &ReasoningRequest) -> Result<String>;
}

impl<R: Reasoner + ?Sized> Reasoner for Box<R> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn complete(&self, request: &ReasoningRequest) -> Result<String> {
        (**self).complete(request)
    }
}

// ---------------------------------------------------------------------------
// CommandReasoner
// ---------------------------------------------------------------------------

/// Reasoner that pipes the prompt to a local command and reads its stdout.
///
/// An argument equal to `{system}` is replaced by the system prompt;
/// otherwise the system prompt is sent on stdin ahead of the user prompt.
#[derive(Debug, Clone)]
pub struct CommandReasoner {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandReasoner {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

impl Reasoner for CommandReasoner {
    fn name(&self) -> &str {
        "command"
    }

    fn complete(&self, request: &ReasoningRequest) -> Result<String> {
        let mut has_placeholder = false;
        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg == "{system}" {
                    has_placeholder = true;
                    request.system.clone()
                } else {
                    arg.clone()
                }
            })
            .collect();

        let stdin = if has_placeholder || request.system.is_empty() {
            request.prompt.clone()
        } else {
            format!("{}\n\n{}", request.system, request.prompt)
        };

        let mut cmd = Command::new(&self.program);
        cmd.args(&args);
        run_with_timeout(cmd, Some(&stdin), self.timeout).map_err(|e: ExecError| {
            BackfillError::PlannerUnavailable(format!(
                "{}: {e}",
                self.program.display()
            ))
        })
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// Cut `text` at the first stop sequence.
pub fn apply_stop<'t>(text: &'t str, stop: &[String]) -> &'t str {
    stop.iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
        .map_or(text, |end| &text[..end])
}

pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut lines: Vec<&str> = trimmed.lines().collect();
    if lines.first().is_some_and(|l| l.trim_start().starts_with("```")) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim_start().starts_with("```")) {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

/// Find the first parseable JSON array embedded in prose.
fn extract_json_array(raw: &str) -> Option<Value> {
    raw.char_indices()
        .filter(|(_, ch)| *ch == '[')
        .find_map(|(idx, _)| {
            let mut de = serde_json::Deserializer::from_str(&raw[idx..]);
            Value::deserialize(&mut de).ok().filter(Value::is_array)
        })
}

#[derive(Debug, Deserialize)]
struct RawAction {
    action: String,
    #[serde(default)]
    input: Option<Value>,
}

/// Parse a reply into actions, without checking them against a record.
pub fn parse_action_list(text: &str) -> Result<Vec<Action>> {
    let cleaned = strip_code_fences(text);
    if cleaned.is_empty() {
        return Err(BackfillError::Planning("empty response".to_string()));
    }

    let value = match serde_json::from_str::<Value>(&cleaned) {
        Ok(value) => value,
        Err(err) => extract_json_array(&cleaned).ok_or_else(|| {
            BackfillError::Planning(format!("response is not a JSON action list: {err}"))
        })?,
    };

    let Value::Array(items) = value else {
        return Err(BackfillError::Planning(
            "expected a JSON array of actions".to_string(),
        ));
    };
    if items.is_empty() {
        return Err(BackfillError::Planning(
            "response contained no actions".to_string(),
        ));
    }

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let raw: RawAction = serde_json::from_value(item).map_err(|e| {
                BackfillError::Planning(format!("action {i} is malformed: {e}"))
            })?;
            to_action(i, raw)
        })
        .collect()
}

fn to_action(i: usize, raw: RawAction) -> Result<Action> {
    let kind: ActionKind = raw
        .action
        .trim()
        .parse()
        .map_err(|_| BackfillError::Planning(format!("action {i}: unknown action '{}'", raw.action)))?;

    let input = match raw.input {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(other) => {
            return Err(BackfillError::Planning(format!(
                "action {i}: input must be a string or null, got {other}"
            )))
        }
    };

    match kind {
        ActionKind::FetchId => match input {
            Some(owner) if !owner.is_empty() => Ok(Action::FetchId(owner)),
            _ => Err(BackfillError::Planning(format!(
                "action {i}: '{kind}' requires the owner as input"
            ))),
        },
        ActionKind::FetchCentralId => Ok(Action::FetchCentralId(input.filter(|s| !s.is_empty()))),
        ActionKind::None => Ok(Action::None),
    }
}

/// Validate externally proposed actions against the record.
///
/// The action kinds must match what the rule planner derives under `policy`;
/// a `FetchId` must name the record's owner and a `FetchCentralId` for a
/// record that already has an id must name that id. Surrounding whitespace is
/// ignored and the checked plan carries the record's own values. A central-id
/// fetch that depends on an id fetched in the same pass is normalised to carry
/// no input.
pub fn check_against_record(
    record: &Record,
    actions: Vec<Action>,
    policy: PlanningPolicy,
) -> Result<Plan> {
    let owner = record.owner()?;
    let proposed = Plan::new(actions)?;
    let expected = RulePlanner::with_policy(policy).plan(record)?;

    if proposed.kinds() != expected.kinds() {
        return Err(BackfillError::Planning(format!(
            "proposed [{proposed}] but the record needs [{expected}]"
        )));
    }

    let mut checked = Vec::with_capacity(proposed.len());
    for action in proposed.actions() {
        match action {
            Action::FetchId(input) => {
                if input.trim() != owner.trim() {
                    return Err(BackfillError::Planning(format!(
                        "'{}' input '{input}' does not match owner '{owner}'",
                        ActionKind::FetchId
                    )));
                }
                checked.push(Action::FetchId(owner.to_string()));
            }
            Action::FetchCentralId(input) if record.has_id() => {
                if input.as_deref().map(str::trim) != record.id.as_deref().map(str::trim) {
                    return Err(BackfillError::Planning(format!(
                        "'{}' input {:?} does not match account_id {:?}",
                        ActionKind::FetchCentralId,
                        input,
                        record.id
                    )));
                }
                checked.push(Action::FetchCentralId(record.id.clone()));
            }
            Action::FetchCentralId(_) => checked.push(Action::FetchCentralId(None)),
            other => checked.push(other.clone()),
        }
    }
    Plan::new(checked)
}

// ---------------------------------------------------------------------------
// JsonPlanner
// ---------------------------------------------------------------------------

const JSON_SYSTEM_PROMPT: &str = "You help process account information. \
Examine the given JSON object, work out which fields are missing, and list \
the actions that fill them in the correct order. Reply with a JSON array of \
objects, each with 'action' and 'input' fields, and nothing else.";

/// Planner that asks a reasoner for a JSON action list.
pub struct JsonPlanner<R> {
    reasoner: R,
    policy: PlanningPolicy,
}

impl<R: Reasoner> JsonPlanner<R> {
    pub fn new(reasoner: R, policy: PlanningPolicy) -> Self {
        Self { reasoner, policy }
    }

    pub fn request_for(&self, record: &Record) -> Result<ReasoningRequest> {
        let record_json = serde_json::to_string(record)?;
        let central_rule = match self.policy {
            PlanningPolicy::SingleStep => {
                "If account_central_id is missing and account_id is present, include:\n\
                 {\"action\": \"get_central_account_number\", \"input\": \"<account_id>\"}\n\
                 If account_id is missing, do not include this action; it runs on a later pass."
            }
            PlanningPolicy::Cascade => {
                "If account_central_id is missing, include:\n\
                 {\"action\": \"get_central_account_number\", \"input\": \"<account_id>\"}\n\
                 When account_id is also missing, use null as the input; it is filled by the earlier action."
            }
        };
        let prompt = format!(
            "Decide which actions to take for this JSON object:\n{record_json}\n\n\
             If account_id is missing, include:\n\
             {{\"action\": \"get_account_number\", \"input\": \"<account_owner>\"}}\n\n\
             {central_rule}\n\n\
             If both fields are present, reply with:\n\
             [{{\"action\": \"none\", \"input\": null}}]\n\n\
             When both actions are needed, get_account_number must come before \
             get_central_account_number. Reply with the JSON array only."
        );
        Ok(ReasoningRequest {
            system: JSON_SYSTEM_PROMPT.to_string(),
            prompt,
            stop: Vec::new(),
        })
    }
}

impl<R: Reasoner> Planner for JsonPlanner<R> {
    fn name(&self) -> &str {
        "json"
    }

    fn plan(&self, record: &Record) -> Result<Plan> {
        record.owner()?;
        let request = self.request_for(record)?;
        let reply = self.reasoner.complete(&request)?;
        tracing::debug!(
            reasoner = self.reasoner.name(),
            owner = record.owner_label(),
            reply = %reply.trim(),
            "reasoner reply"
        );
        let actions = parse_action_list(apply_stop(&reply, &request.stop))?;
        check_against_record(record, actions, self.policy)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
