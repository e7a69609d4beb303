use crate::error::{BackfillError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

/// The closed set of fill operations. The string forms double as the tool
/// names exposed to reasoning planners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionKind {
    #[serde(rename = "get_account_number")]
    FetchId,
    #[serde(rename = "get_central_account_number")]
    FetchCentralId,
    #[serde(rename = "none")]
    None,
}

impl ActionKind {
    pub fn all() -> &'static [ActionKind] {
        &[
            ActionKind::FetchId,
            ActionKind::FetchCentralId,
            ActionKind::None,
        ]
    }

    /// Kinds that call a lookup; `None` is not a tool.
    pub fn tools() -> &'static [ActionKind] {
        &[ActionKind::FetchId, ActionKind::FetchCentralId]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::FetchId => "get_account_number",
            ActionKind::FetchCentralId => "get_central_account_number",
            ActionKind::None => "none",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ActionKind::FetchId => {
                "Returns the account number id based on the name of the account owner"
            }
            ActionKind::FetchCentralId => {
                "Returns the central account number id based on the account number id"
            }
            ActionKind::None => "No action is needed",
        }
    }

    /// Position in the precedence order: an id must exist before a central
    /// id can be derived from it.
    pub fn precedence(self) -> u8 {
        match self {
            ActionKind::FetchId => 0,
            ActionKind::FetchCentralId => 1,
            ActionKind::None => 2,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = BackfillError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "get_account_number" => Ok(ActionKind::FetchId),
            "get_central_account_number" => Ok(ActionKind::FetchCentralId),
            "none" => Ok(ActionKind::None),
            _ => Err(BackfillError::UnknownAction(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// A single fill operation carrying the input it needs.
///
/// `FetchCentralId` holds the id known when the plan was made. It is `None`
/// when the id is expected to be filled by an earlier `FetchId` in the same
/// pass; the resolver always reads the record's current id at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "input")]
pub enum Action {
    #[serde(rename = "get_account_number")]
    FetchId(String),
    #[serde(rename = "get_central_account_number")]
    FetchCentralId(Option<String>),
    #[serde(rename = "none")]
    None,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::FetchId(_) => ActionKind::FetchId,
            Action::FetchCentralId(_) => ActionKind::FetchCentralId,
            Action::None => ActionKind::None,
        }
    }

    pub fn input(&self) -> Option<&str> {
        match self {
            Action::FetchId(owner) => Some(owner),
            Action::FetchCentralId(id) => id.as_deref(),
            Action::None => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.input() {
            Some(input) => write!(f, "{}({input})", self.kind()),
            None => write!(f, "{}", self.kind()),
        }
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// An ordered, validated action sequence for one record.
///
/// Invariants: at most one action of each kind, `FetchId` before
/// `FetchCentralId`, and `None` never mixed with fetch actions. A plan made
/// only of `None` is normalised to the empty plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Plan {
    actions: Vec<Action>,
}

impl Plan {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(actions: Vec<Action>) -> Result<Self> {
        let has_none = actions.iter().any(|a| a.kind() == ActionKind::None);
        let fetches: Vec<Action> = actions
            .into_iter()
            .filter(|a| a.kind() != ActionKind::None)
            .collect();

        if has_none && !fetches.is_empty() {
            return Err(BackfillError::Planning(
                "'none' cannot be combined with fetch actions".to_string(),
            ));
        }

        for (i, action) in fetches.iter().enumerate() {
            if fetches[..i].iter().any(|a| a.kind() == action.kind()) {
                return Err(BackfillError::Planning(format!(
                    "duplicate action '{}'",
                    action.kind()
                )));
            }
        }

        if fetches
            .windows(2)
            .any(|w| w[0].kind().precedence() > w[1].kind().precedence())
        {
            return Err(BackfillError::Planning(format!(
                "'{}' must come before '{}'",
                ActionKind::FetchId,
                ActionKind::FetchCentralId
            )));
        }

        Ok(Self { actions: fetches })
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn kinds(&self) -> Vec<ActionKind> {
        self.actions.iter().map(Action::kind).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn contains(&self, kind: ActionKind) -> bool {
        self.actions.iter().any(|a| a.kind() == kind)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.actions.is_empty() {
            return f.write_str("none");
        }
        let parts: Vec<String> = self.actions.iter().map(|a| a.to_string()).collect();
        f.write_str(&parts.join(" -> "))
    }
}

// ---------------------------------------------------------------------------
// PlanningPolicy
// ---------------------------------------------------------------------------

/// What the planner proposes when a record is missing both fields.
///
/// `SingleStep` only fetches the id; the central id is left for a later pass.
/// `Cascade` fetches the id and then derives the central id from it in the
/// same pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanningPolicy {
    #[default]
    SingleStep,
    Cascade,
}

impl PlanningPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanningPolicy::SingleStep => "single_step",
            PlanningPolicy::Cascade => "cascade",
        }
    }
}

impl fmt::Display for PlanningPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlanningPolicy {
    type Err = BackfillError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "single_step" | "single-step" => Ok(PlanningPolicy::SingleStep),
            "cascade" => Ok(PlanningPolicy::Cascade),
            _ => Err(BackfillError::UnknownPolicy(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorPolicy
// ---------------------------------------------------------------------------

/// How the batch runner treats a record whose planning fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Drop the record from the output and record a `skipped` diagnostic.
    Skip,
    /// Keep the record unchanged in the output and record an `error` diagnostic.
    #[default]
    Collect,
    /// Stop the batch and return the error; no records are returned.
    Abort,
}

impl ErrorPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorPolicy::Skip => "skip",
            ErrorPolicy::Collect => "collect",
            ErrorPolicy::Abort => "abort",
        }
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorPolicy {
    type Err = BackfillError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "skip" => Ok(ErrorPolicy::Skip),
            "collect" => Ok(ErrorPolicy::Collect),
            "abort" => Ok(ErrorPolicy::Abort),
            _ => Err(BackfillError::UnknownErrorPolicy(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// PlannerKind
// ---------------------------------------------------------------------------

/// Which decision source the batch uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerKind {
    #[default]
    Rules,
    Json,
    React,
}

impl PlannerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PlannerKind::Rules => "rules",
            PlannerKind::Json => "json",
            PlannerKind::React => "react",
        }
    }

    pub fn needs_reasoner(self) -> bool {
        !matches!(self, PlannerKind::Rules)
    }
}

impl fmt::Display for PlannerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlannerKind {
    type Err = BackfillError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "rules" => Ok(PlannerKind::Rules),
            "json" => Ok(PlannerKind::Json),
            "react" => Ok(PlannerKind::React),
            _ => Err(BackfillError::UnknownPlanner(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_kind_round_trips_through_str() {
        for kind in ActionKind::all() {
            let parsed: ActionKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, *kind);
        }
        assert!("fetch_everything".parse::<ActionKind>().is_err());
    }

    #[test]
    fn action_serializes_with_tool_name_and_input() {
        let json = serde_json::to_value(Action::FetchId("Jane Smith".into())).unwrap();
        assert_eq!(json["action"], "get_account_number");
        assert_eq!(json["input"], "Jane Smith");

        let json = serde_json::to_value(Action::FetchCentralId(None)).unwrap();
        assert_eq!(json["action"], "get_central_account_number");
        assert!(json["input"].is_null());
    }

    #[test]
    fn plan_of_only_none_is_empty() {
        let plan = Plan::new(vec![Action::None]).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn plan_rejects_none_mixed_with_fetch() {
        let err = Plan::new(vec![Action::FetchId("a".into()), Action::None]).unwrap_err();
        assert!(err.to_string().contains("'none' cannot be combined"));
    }

    #[test]
    fn plan_rejects_central_before_id() {
        let err = Plan::new(vec![
            Action::FetchCentralId(Some("1".into())),
            Action::FetchId("a".into()),
        ])
        .unwrap_err();
        assert!(matches!(err, BackfillError::Planning(_)));
    }

    #[test]
    fn plan_rejects_duplicates() {
        let err = Plan::new(vec![
            Action::FetchId("a".into()),
            Action::FetchId("a".into()),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn plan_display_joins_actions() {
        let plan = Plan::new(vec![
            Action::FetchId("Jane".into()),
            Action::FetchCentralId(None),
        ])
        .unwrap();
        assert_eq!(
            plan.to_string(),
            "get_account_number(Jane) -> get_central_account_number"
        );
        assert_eq!(Plan::empty().to_string(), "none");
    }

    #[test]
    fn policies_parse_and_default() {
        assert_eq!(PlanningPolicy::default(), PlanningPolicy::SingleStep);
        assert_eq!(
            "cascade".parse::<PlanningPolicy>().unwrap(),
            PlanningPolicy::Cascade
        );
        assert!("eager".parse::<PlanningPolicy>().is_err());

        assert_eq!(ErrorPolicy::default(), ErrorPolicy::Collect);
        assert_eq!("abort".parse::<ErrorPolicy>().unwrap(), ErrorPolicy::Abort);
        assert!("retry".parse::<ErrorPolicy>().is_err());
    }

    #[test]
    fn planner_kind_parses() {
        assert_eq!(PlannerKind::default(), PlannerKind::Rules);
        assert_eq!("react".parse::<PlannerKind>().unwrap(), PlannerKind::React);
        assert!(PlannerKind::Json.needs_reasoner());
        assert!(!PlannerKind::Rules.needs_reasoner());
        let err = "oracle".parse::<PlannerKind>().unwrap_err();
        assert!(matches!(err, BackfillError::UnknownPlanner(_)));
    }
}
