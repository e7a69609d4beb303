use crate::error::Result;
use crate::record::Record;
use crate::rules::default_rules;
use crate::types::{Action, Plan, PlanningPolicy};

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// A decision source: turns one record into an ordered, validated plan.
///
/// Implementations must never return an unvalidated sequence; build plans
/// with [`Plan::new`] so the ordering invariants hold regardless of where
/// the decision came from. A record without an owner is `InvalidRecord`.
pub trait Planner {
    fn name(&self) -> &str;

    fn plan(&self, record: &Record) -> Result<Plan>;
}

impl<P: Planner + ?Sized> Planner for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn plan(&self, record: &Record) -> Result<Plan> {
        (**self).plan(record)
    }
}

// ---------------------------------------------------------------------------
// EvalContext
// ---------------------------------------------------------------------------

pub struct EvalContext<'a> {
    pub record: &'a Record,
    /// Already validated non-blank owner.
    pub owner: &'a str,
    pub policy: PlanningPolicy,
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// A fn-pointer rule: no heap allocation, no captured state.
pub struct Rule {
    pub id: &'static str,
    pub condition: fn(&EvalContext) -> bool,
    pub action: fn(&EvalContext) -> Action,
}

// ---------------------------------------------------------------------------
// RulePlanner
// ---------------------------------------------------------------------------

/// Deterministic planner: evaluates every rule in table order and keeps the
/// action of each one whose condition holds.
pub struct RulePlanner {
    rules: Vec<Rule>,
    policy: PlanningPolicy,
}

impl RulePlanner {
    pub fn new(rules: Vec<Rule>, policy: PlanningPolicy) -> Self {
        Self { rules, policy }
    }

    pub fn with_policy(policy: PlanningPolicy) -> Self {
        Self::new(default_rules(), policy)
    }

    /// Ids of the rules that fired for `record`, in evaluation order.
    pub fn matched_rules(&self, record: &Record) -> Result<Vec<&'static str>> {
        let ctx = EvalContext {
            record,
            owner: record.owner()?,
            policy: self.policy,
        };
        Ok(self
            .rules
            .iter()
            .filter(|rule| (rule.condition)(&ctx))
            .map(|rule| rule.id)
            .collect())
    }
}

impl Default for RulePlanner {
    fn default() -> Self {
        Self::with_policy(PlanningPolicy::default())
    }
}

impl Planner for RulePlanner {
    fn name(&self) -> &str {
        "rules"
    }

    fn plan(&self, record: &Record) -> Result<Plan> {
        let ctx = EvalContext {
            record,
            owner: record.owner()?,
            policy: self.policy,
        };
        let actions = self
            .rules
            .iter()
            .filter(|rule| (rule.condition)(&ctx))
            .map(|rule| (rule.action)(&ctx))
            .collect();
        Plan::new(actions)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackfillError;

    #[test]
    fn missing_owner_is_invalid_record() {
        let planner = RulePlanner::default();
        let err = planner.plan(&Record::default()).unwrap_err();
        assert!(matches!(err, BackfillError::InvalidRecord(_)));
    }

    #[test]
    fn matched_rules_reports_fired_ids() {
        let planner = RulePlanner::with_policy(PlanningPolicy::Cascade);
        let ids = planner.matched_rules(&Record::new("Jane Smith")).unwrap();
        assert_eq!(ids, vec!["missing_id", "cascade_central_id"]);
    }

    #[test]
    fn empty_rule_table_plans_nothing() {
        let planner = RulePlanner::new(Vec::new(), PlanningPolicy::SingleStep);
        assert!(planner.plan(&Record::new("Jane")).unwrap().is_empty());
    }

    #[test]
    fn misordered_custom_rules_are_rejected() {
        let rules = vec![
            Rule {
                id: "central_first",
                condition: |_| true,
                action: |_| Action::FetchCentralId(None),
            },
            Rule {
                id: "id_second",
                condition: |_| true,
                action: |ctx| Action::FetchId(ctx.owner.to_string()),
            },
        ];
        let planner = RulePlanner::new(rules, PlanningPolicy::SingleStep);
        let err = planner.plan(&Record::new("Jane")).unwrap_err();
        assert!(matches!(err, BackfillError::Planning(_)));
    }

    #[test]
    fn boxed_planner_delegates() {
        let planner: Box<dyn Planner> = Box::new(RulePlanner::default());
        assert_eq!(planner.name(), "rules");
        assert_eq!(planner.plan(&Record::new("Jane")).unwrap().len(), 1);
    }
}
