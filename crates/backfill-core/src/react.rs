//! Single-step ReAct planner.
//!
//! The reasoner is shown the record, the tool catalogue, and a
//! Thought/Action/Observation template, and generation stops before it can
//! invent an observation. The reply either names one tool and its input or
//! gives a final answer. Only one step is taken per pass, so the expected
//! plan is always the single-step one.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{BackfillError, Result};
use crate::planner::Planner;
use crate::reasoning::{apply_stop, check_against_record, Reasoner, ReasoningRequest};
use crate::record::Record;
use crate::types::{Action, ActionKind, Plan, PlanningPolicy};

const TEMPLATE: &str = "\
Answer the following questions as best you can. You have access to the following tools:

{tools}

Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of [{tool_names}]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original input question

Begin!

Question: This JSON object describes an account: {record}
If account_id is missing, look it up from account_owner. If account_id is \
present and account_central_id is missing, look up the central account from \
account_id. If nothing is missing, give the Final Answer 'none'.
Thought:";

pub const STOP_SEQUENCES: &[&str] = &["\nObservation", "Observation"];

/// One parsed reasoning step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactStep {
    Action { tool: String, input: String },
    Finish(String),
}

fn action_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)[\s]*Action\s*\d*\s*Input\s*\d*\s*:[\s]*(.*)")
            .unwrap()
    })
}

const FINAL_ANSWER: &str = "Final Answer:";

/// Parse a reply into a step.
pub fn parse_step(text: &str) -> Result<ReactStep> {
    let has_final = text.contains(FINAL_ANSWER);
    let action = action_re().captures(text);

    match (action, has_final) {
        (Some(_), true) => Err(BackfillError::Planning(
            "reply contains both an action and a final answer".to_string(),
        )),
        (Some(caps), false) => {
            let tool = caps[1].trim().to_string();
            let input = caps[2]
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or_default()
                .trim_matches('"')
                .trim()
                .to_string();
            Ok(ReactStep::Action { tool, input })
        }
        (None, true) => {
            let answer = text
                .split_once(FINAL_ANSWER)
                .map(|(_, rest)| rest.trim().to_string())
                .unwrap_or_default();
            Ok(ReactStep::Finish(answer))
        }
        (None, false) => Err(BackfillError::Planning(format!(
            "could not parse reasoning step: {}",
            text.trim()
        ))),
    }
}

pub fn find_tool(name: &str) -> Result<ActionKind> {
    ActionKind::tools()
        .iter()
        .copied()
        .find(|kind| kind.as_str() == name)
        .ok_or_else(|| BackfillError::Planning(format!("tool '{name}' not found")))
}

fn render_tools() -> String {
    ActionKind::tools()
        .iter()
        .map(|kind| format!("{}: {}", kind.as_str(), kind.description()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn tool_names() -> String {
    ActionKind::tools()
        .iter()
        .map(|kind| kind.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct ReactPlanner<R> {
    reasoner: R,
}

impl<R: Reasoner> ReactPlanner<R> {
    pub fn new(reasoner: R) -> Self {
        Self { reasoner }
    }

    pub fn request_for(&self, record: &Record) -> Result<ReasoningRequest> {
        let prompt = TEMPLATE
            .replace("{tools}", &render_tools())
            .replace("{tool_names}", &tool_names())
            .replace("{record}", &serde_json::to_string(record)?);
        Ok(ReasoningRequest {
            system: String::new(),
            prompt,
            stop: STOP_SEQUENCES.iter().map(|s| s.to_string()).collect(),
        })
    }
}

impl<R: Reasoner> Planner for ReactPlanner<R> {
    fn name(&self) -> &str {
        "react"
    }

    fn plan(&self, record: &Record) -> Result<Plan> {
        record.owner()?;
        let request = self.request_for(record)?;
        let reply = self.reasoner.complete(&request)?;
        let step = parse_step(apply_stop(&reply, &request.stop))?;
        tracing::debug!(owner = record.owner_label(), ?step, "react step");

        let actions = match step {
            ReactStep::Action { tool, input } => {
                let action = match find_tool(&tool)? {
                    ActionKind::FetchId => Action::FetchId(input),
                    _ => Action::FetchCentralId(Some(input).filter(|s| !s.is_empty())),
                };
                vec![action]
            }
            ReactStep::Finish(_) => Vec::new(),
        };
        check_against_record(record, actions, PlanningPolicy::SingleStep)
    }
}
