use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::error::{BackfillError, Result};
use crate::lookup::LookupProvider;
use crate::planner::Planner;
use crate::record::{Entry, Record};
use crate::resolver::Resolver;
use crate::types::{ErrorPolicy, Plan};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// CancelToken
// ---------------------------------------------------------------------------

/// Shared stop flag. The batch runner checks it between records, never
/// inside one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// At least one field was filled.
    Resolved,
    /// The plan ran (or was empty) and nothing changed.
    Unchanged,
    /// Dropped from the output under the `skip` policy.
    Skipped,
    /// Kept unchanged under the `collect` policy after a failure.
    Failed,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Resolved => "resolved",
            RecordStatus::Unchanged => "unchanged",
            RecordStatus::Skipped => "skipped",
            RecordStatus::Failed => "failed",
        }
    }
}

/// Per-record trace of what the batch did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub status: RecordStatus,
    /// The executed plan in display form; absent when planning failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    pub lookups: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub resolved: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub lookups: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub planner: String,
    pub on_error: ErrorPolicy,
    /// Output records in input order. Skipped records are absent.
    pub records: Vec<Record>,
    pub outcomes: Vec<RecordOutcome>,
    pub diagnostics: Vec<Diagnostic>,
    pub summary: BatchSummary,
    pub cancelled: bool,
}

// ---------------------------------------------------------------------------
// BatchRunner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    pub on_error: ErrorPolicy,
}

/// Plans and resolves records one at a time, in input order.
///
/// Planner and lookup provider are borrowed for the runner's lifetime; the
/// runner owns no global state.
pub struct BatchRunner<'a> {
    planner: &'a dyn Planner,
    resolver: Resolver<'a>,
    options: BatchOptions,
    cancel: CancelToken,
}

impl<'a> BatchRunner<'a> {
    pub fn new(
        planner: &'a dyn Planner,
        lookup: &'a dyn LookupProvider,
        options: BatchOptions,
    ) -> Self {
        Self {
            planner,
            resolver: Resolver::new(lookup),
            options,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Plan every record without executing anything.
    pub fn plan_all(&self, records: &[Record]) -> Vec<Result<Plan>> {
        records.iter().map(|r| self.planner.plan(r)).collect()
    }

    /// Like [`BatchRunner::plan_all`], for input that may hold unreadable
    /// elements. Those plan as `InvalidRecord`.
    pub fn plan_entries(&self, entries: &[Entry]) -> Vec<Result<Plan>> {
        entries
            .iter()
            .map(|entry| match entry {
                Ok(record) => self.planner.plan(record),
                Err(reason) => Err(BackfillError::InvalidRecord(reason.clone())),
            })
            .collect()
    }

    /// Run the whole batch.
    ///
    /// Record-level failures (invalid record, planning error, planner
    /// unavailable) are handled by the configured [`ErrorPolicy`]; under
    /// `abort` the first one is returned as [`BackfillError::Aborted`] and no
    /// records are returned.
    pub fn run(&self, records: Vec<Record>) -> Result<BatchReport> {
        self.run_entries(records.into_iter().map(Ok).collect())
    }

    /// Run a batch whose elements may have failed to load. An unreadable
    /// element is an `InvalidRecord` at its index and goes through the same
    /// policy; it has no record to keep, so `collect` reports it without
    /// writing anything for it.
    pub fn run_entries(&self, records: Vec<Entry>) -> Result<BatchReport> {
        let mut report = BatchReport {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            planner: self.planner.name().to_string(),
            on_error: self.options.on_error,
            records: Vec::with_capacity(records.len()),
            outcomes: Vec::with_capacity(records.len()),
            diagnostics: Vec::new(),
            summary: BatchSummary {
                total: records.len(),
                ..Default::default()
            },
            cancelled: false,
        };

        for (index, entry) in records.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                let d = Diagnostic::new(
                    index,
                    None,
                    DiagnosticKind::Cancelled,
                    format!(
                        "batch cancelled; {} record(s) not processed",
                        report.summary.total - index
                    ),
                );
                d.log();
                report.diagnostics.push(d);
                report.cancelled = true;
                break;
            }

            let record = match entry {
                Ok(record) => record,
                Err(reason) => {
                    let e = BackfillError::InvalidRecord(reason);
                    self.handle_failure(&mut report, index, None, e)?;
                    continue;
                }
            };

            tracing::info!(index, owner = record.owner_label(), "processing record");

            let plan = match self.planner.plan(&record) {
                Ok(plan) => plan,
                Err(e) if e.is_record_level() => {
                    self.handle_failure(&mut report, index, Some(record), e)?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let original = record.clone();
            let resolution = self.resolver.resolve(index, record, &plan);
            let status = if resolution.changed_from(&original) {
                report.summary.resolved += 1;
                RecordStatus::Resolved
            } else {
                report.summary.unchanged += 1;
                RecordStatus::Unchanged
            };
            report.summary.lookups += resolution.lookups;
            report.outcomes.push(RecordOutcome {
                index,
                owner: resolution.record.owner.clone(),
                status,
                plan: Some(plan.to_string()),
                lookups: resolution.lookups,
                error: None,
            });
            report.diagnostics.extend(resolution.diagnostics);
            report.records.push(resolution.record);
        }

        Ok(report)
    }

    fn handle_failure(
        &self,
        report: &mut BatchReport,
        index: usize,
        record: Option<Record>,
        error: BackfillError,
    ) -> Result<()> {
        let owner = record.as_ref().and_then(|r| r.owner.clone());
        let (kind, status) = match self.options.on_error {
            ErrorPolicy::Abort => {
                tracing::error!(
                    index,
                    owner = owner.as_deref().unwrap_or("<unknown>"),
                    error = %error,
                    "aborting batch"
                );
                return Err(BackfillError::Aborted {
                    index,
                    source: Box::new(error),
                });
            }
            ErrorPolicy::Skip => (DiagnosticKind::Skipped, RecordStatus::Skipped),
            ErrorPolicy::Collect => (DiagnosticKind::Error, RecordStatus::Failed),
        };

        let d = Diagnostic::new(index, owner.as_deref(), kind, error.to_string());
        d.log();
        report.diagnostics.push(d);
        report.outcomes.push(RecordOutcome {
            index,
            owner,
            status,
            plan: None,
            lookups: 0,
            error: Some(error.to_string()),
        });

        match status {
            RecordStatus::Skipped => report.summary.skipped += 1,
            _ => {
                report.summary.failed += 1;
                report.records.extend(record);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{SuffixLookup, TableLookup};
    use crate::planner::RulePlanner;
    use crate::record::sample_records;
    use crate::types::PlanningPolicy;

    /// The sample batch with the fourth record's owner removed.
    fn batch_with_invalid() -> Vec<Record> {
        let mut records = sample_records();
        records[3].owner = None;
        records
    }

    fn runner<'a>(
        planner: &'a dyn Planner,
        lookup: &'a dyn LookupProvider,
        on_error: ErrorPolicy,
    ) -> BatchRunner<'a> {
        BatchRunner::new(planner, lookup, BatchOptions { on_error })
    }

    #[test]
    fn sample_batch_resolves_in_input_order() {
        let planner = RulePlanner::default();
        let lookup = SuffixLookup::default();
        let report = runner(&planner, &lookup, ErrorPolicy::Collect)
            .run(sample_records())
            .unwrap();

        let owners: Vec<_> = report.records.iter().map(|r| r.owner_label()).collect();
        assert_eq!(
            owners,
            vec![
                "John Doe",
                "Jane Smith",
                "Emily Johnson",
                "Michael Brown",
                "Olivia Davis"
            ]
        );
        assert_eq!(
            report.records[0].central_id.as_deref(),
            Some("123456-central-account")
        );
        assert_eq!(report.records[1].id.as_deref(), Some("Jane Smith-999"));
        assert_eq!(report.records[1].central_id, None);
        assert_eq!(report.records[3].id.as_deref(), Some("Michael Brown-999"));
        assert_eq!(report.records[3].central_id.as_deref(), Some("CENTRAL_543"));
        assert_eq!(report.summary.resolved, 4);
        assert_eq!(report.summary.unchanged, 1);
        assert_eq!(report.summary.lookups, 4);
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn skip_policy_drops_invalid_record() {
        let planner = RulePlanner::default();
        let lookup = SuffixLookup::default();
        let report = runner(&planner, &lookup, ErrorPolicy::Skip)
            .run(batch_with_invalid())
            .unwrap();

        assert_eq!(report.records.len(), 4);
        assert_eq!(report.summary.skipped, 1);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].kind, DiagnosticKind::Skipped);
        assert_eq!(report.diagnostics[0].index, 3);
        assert_eq!(report.outcomes[3].status, RecordStatus::Skipped);
    }

    #[test]
    fn collect_policy_keeps_invalid_record_unchanged() {
        let planner = RulePlanner::default();
        let lookup = SuffixLookup::default();
        let input = batch_with_invalid();
        let report = runner(&planner, &lookup, ErrorPolicy::Collect)
            .run(input.clone())
            .unwrap();

        assert_eq!(report.records.len(), 5);
        assert_eq!(report.records[3], input[3]);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].kind, DiagnosticKind::Error);
        assert!(report.outcomes[3].error.as_deref().unwrap().contains("account_owner"));
    }

    #[test]
    fn abort_policy_returns_error_and_no_records() {
        let planner = RulePlanner::default();
        let lookup = SuffixLookup::default();
        let err = runner(&planner, &lookup, ErrorPolicy::Abort)
            .run(batch_with_invalid())
            .unwrap_err();

        let BackfillError::Aborted { index, source } = err else {
            panic!("expected Aborted");
        };
        assert_eq!(index, 3);
        assert!(matches!(*source, BackfillError::InvalidRecord(_)));
    }

    #[test]
    fn cancelled_token_stops_before_first_record() {
        let planner = RulePlanner::default();
        let lookup = SuffixLookup::default();
        let token = CancelToken::new();
        token.cancel();
        let report = runner(&planner, &lookup, ErrorPolicy::Collect)
            .with_cancel(token)
            .run(sample_records())
            .unwrap();

        assert!(report.cancelled);
        assert!(report.records.is_empty());
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].kind, DiagnosticKind::Cancelled);
        assert!(report.diagnostics[0].message.contains("5 record(s)"));
    }

    #[test]
    fn cancel_between_records_keeps_completed_ones() {
        /// Cancels the batch as soon as it is asked about the second record.
        struct CancelOnSecond {
            inner: RulePlanner,
            token: CancelToken,
        }
        impl Planner for CancelOnSecond {
            fn name(&self) -> &str {
                "cancel-on-second"
            }
            fn plan(&self, record: &Record) -> Result<Plan> {
                if record.owner.as_deref() == Some("Jane Smith") {
                    self.token.cancel();
                }
                self.inner.plan(record)
            }
        }

        let token = CancelToken::new();
        let planner = CancelOnSecond {
            inner: RulePlanner::default(),
            token: token.clone(),
        };
        let lookup = SuffixLookup::default();
        let report = runner(&planner, &lookup, ErrorPolicy::Collect)
            .with_cancel(token)
            .run(sample_records())
            .unwrap();

        // Jane Smith's record finishes; nothing after it starts.
        assert!(report.cancelled);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[1].id.as_deref(), Some("Jane Smith-999"));
    }

    #[test]
    fn lookup_failure_is_contained_not_fatal() {
        let planner = RulePlanner::with_policy(PlanningPolicy::Cascade);
        let lookup = TableLookup::default();
        let report = runner(&planner, &lookup, ErrorPolicy::Abort)
            .run(vec![Record::new("Jane Smith")])
            .unwrap();

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.outcomes[0].status, RecordStatus::Unchanged);
        let kinds: Vec<_> = report.diagnostics.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![DiagnosticKind::LookupUnavailable, DiagnosticKind::MissingId]
        );
    }

    #[test]
    fn plan_all_reports_per_record_results() {
        let planner = RulePlanner::default();
        let lookup = SuffixLookup::default();
        let plans = runner(&planner, &lookup, ErrorPolicy::Collect).plan_all(&batch_with_invalid());
        assert_eq!(plans.len(), 5);
        assert!(plans[3].is_err());
        assert!(plans[2].as_ref().unwrap().is_empty());
    }

    fn entries_with_unreadable() -> Vec<Entry> {
        vec![
            Ok(Record::new("Jane Smith")),
            Err("invalid type: integer `42`, expected a string".to_string()),
            Ok(Record::new("John Doe").with_id("123456")),
        ]
    }

    #[test]
    fn unreadable_entry_is_skipped_and_later_records_run() {
        let planner = RulePlanner::default();
        let lookup = SuffixLookup::default();
        let report = runner(&planner, &lookup, ErrorPolicy::Skip)
            .run_entries(entries_with_unreadable())
            .unwrap();

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].id.as_deref(), Some("Jane Smith-999"));
        assert_eq!(
            report.records[1].central_id.as_deref(),
            Some("123456-central-account")
        );
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.skipped, 1);
        assert_eq!(report.diagnostics[0].kind, DiagnosticKind::Skipped);
        assert_eq!(report.diagnostics[0].index, 1);
        assert_eq!(report.outcomes[1].owner, None);
    }

    #[test]
    fn unreadable_entry_under_collect_is_reported_not_written() {
        let planner = RulePlanner::default();
        let lookup = SuffixLookup::default();
        let report = runner(&planner, &lookup, ErrorPolicy::Collect)
            .run_entries(entries_with_unreadable())
            .unwrap();

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.outcomes[1].status, RecordStatus::Failed);
        assert!(report.outcomes[1]
            .error
            .as_deref()
            .unwrap()
            .starts_with("invalid record: invalid type"));
    }

    #[test]
    fn unreadable_entry_under_abort_stops_the_batch() {
        let planner = RulePlanner::default();
        let lookup = SuffixLookup::default();
        let err = runner(&planner, &lookup, ErrorPolicy::Abort)
            .run_entries(entries_with_unreadable())
            .unwrap_err();
        assert!(matches!(err, BackfillError::Aborted { index: 1, .. }));
    }

    #[test]
    fn plan_entries_marks_unreadable_as_invalid() {
        let planner = RulePlanner::default();
        let lookup = SuffixLookup::default();
        let plans = runner(&planner, &lookup, ErrorPolicy::Collect)
            .plan_entries(&entries_with_unreadable());
        assert!(matches!(plans[1], Err(BackfillError::InvalidRecord(_))));
        assert_eq!(plans[2].as_ref().unwrap().len(), 1);
    }

    #[test]
    fn report_serializes_summary_and_policy() {
        let planner = RulePlanner::default();
        let lookup = SuffixLookup::default();
        let report = runner(&planner, &lookup, ErrorPolicy::Skip)
            .run(sample_records())
            .unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["on_error"], "skip");
        assert_eq!(json["planner"], "rules");
        assert_eq!(json["summary"]["total"], 5);
    }
}
