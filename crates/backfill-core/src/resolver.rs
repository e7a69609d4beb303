use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::lookup::{
    LookupProvider, LookupResult, LookupUnavailable, CENTRAL_ID_LOOKUP, ID_LOOKUP,
};
use crate::record::Record;
use crate::types::{Action, Plan};

/// The outcome of executing one plan against one record.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub record: Record,
    pub diagnostics: Vec<Diagnostic>,
    /// Number of lookup provider calls made.
    pub lookups: usize,
}

impl Resolution {
    pub fn changed_from(&self, original: &Record) -> bool {
        self.record != *original
    }
}

/// Executes plans through a lookup provider.
///
/// Lookup failures never escape: the affected field stays unset and a
/// diagnostic is recorded. A central-id fetch whose id is still absent when
/// it runs is skipped with a `missing_id` diagnostic.
pub struct Resolver<'a> {
    lookup: &'a dyn LookupProvider,
}

impl<'a> Resolver<'a> {
    pub fn new(lookup: &'a dyn LookupProvider) -> Self {
        Self { lookup }
    }

    /// Execute `plan` against `record`. `index` is the record's position in
    /// its batch and is carried into every diagnostic.
    pub fn resolve(&self, index: usize, record: Record, plan: &Plan) -> Resolution {
        let mut record = record;
        let mut diagnostics = Vec::new();
        let mut lookups = 0;

        for action in plan.actions() {
            match action {
                Action::FetchId(owner) => {
                    lookups += 1;
                    match answered(self.lookup.resolve_id(owner), ID_LOOKUP, owner) {
                        Ok(id) => {
                            tracing::debug!(index, owner = %owner, id = %id, "filled account_id");
                            record.id = Some(id);
                        }
                        Err(e) => diagnostics.push(report(
                            index,
                            &record,
                            DiagnosticKind::LookupUnavailable,
                            e.to_string(),
                        )),
                    }
                }
                Action::FetchCentralId(planned) => {
                    let Some(id) = record.id.clone().filter(|_| record.has_id()) else {
                        diagnostics.push(report(
                            index,
                            &record,
                            DiagnosticKind::MissingId,
                            format!(
                                "attempted to get central account number for {} without an account_id",
                                record.owner_label()
                            ),
                        ));
                        continue;
                    };
                    if let Some(planned) = planned {
                        if *planned != id {
                            tracing::debug!(
                                index,
                                planned = %planned,
                                current = %id,
                                "central-id fetch uses the record's current account_id"
                            );
                        }
                    }
                    lookups += 1;
                    match answered(self.lookup.resolve_central_id(&id), CENTRAL_ID_LOOKUP, &id) {
                        Ok(central) => {
                            tracing::debug!(index, id = %id, central_id = %central, "filled account_central_id");
                            record.central_id = Some(central);
                        }
                        Err(e) => diagnostics.push(report(
                            index,
                            &record,
                            DiagnosticKind::LookupUnavailable,
                            e.to_string(),
                        )),
                    }
                }
                Action::None => {}
            }
        }

        Resolution {
            record,
            diagnostics,
            lookups,
        }
    }
}

/// A blank answer is no answer; it must not fill the field.
fn answered(result: LookupResult, lookup: &'static str, input: &str) -> LookupResult {
    result.and_then(|value| {
        if value.trim().is_empty() {
            Err(LookupUnavailable::new(lookup, input, "empty result"))
        } else {
            Ok(value)
        }
    })
}

fn report(index: usize, record: &Record, kind: DiagnosticKind, message: String) -> Diagnostic {
    let d = Diagnostic::new(index, record.owner.as_deref(), kind, message);
    d.log();
    d
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
