use crate::planner::{EvalContext, Rule};
use crate::types::{Action, PlanningPolicy};

// ---------------------------------------------------------------------------
// Helper macro for concise rule definitions
// ---------------------------------------------------------------------------

macro_rules! rule {
    (
        id: $id:expr,
        condition: $cond:expr,
        action: $action:expr
    ) => {
        Rule {
            id: $id,
            condition: $cond,
            action: $action,
        }
    };
}

// ---------------------------------------------------------------------------
// Condition helpers
// ---------------------------------------------------------------------------

fn id_missing(ctx: &EvalContext) -> bool {
    !ctx.record.has_id()
}

fn central_id_missing(ctx: &EvalContext) -> bool {
    !ctx.record.has_central_id()
}

fn cascading(ctx: &EvalContext) -> bool {
    ctx.policy == PlanningPolicy::Cascade
}

// ---------------------------------------------------------------------------
// Default rules (precedence-ordered)
// ---------------------------------------------------------------------------

/// Every matching rule contributes one action, in table order. The table is
/// ordered so that the id fetch always precedes any central-id fetch.
pub fn default_rules() -> Vec<Rule> {
    vec![
        // 1. No id: derive it from the owner
        rule! {
            id: "missing_id",
            condition: id_missing,
            action: |ctx| Action::FetchId(ctx.owner.to_string())
        },
        // 2. Id present, central id missing: derive central id from the id
        rule! {
            id: "missing_central_id",
            condition: |ctx| !id_missing(ctx) && central_id_missing(ctx),
            action: |ctx| Action::FetchCentralId(ctx.record.id.clone())
        },
        // 3. Both missing under cascade: central id follows the id fetched in rule 1
        rule! {
            id: "cascade_central_id",
            condition: |ctx| cascading(ctx) && id_missing(ctx) && central_id_missing(ctx),
            action: |_| Action::FetchCentralId(None)
        },
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
