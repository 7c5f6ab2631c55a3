//! Change Application Engine (C8).
//!
//! The outer state machine: read change records, build and dispatch one
//! request per record (or, in bulk-modify mode, one template record applied
//! to a set of target entries), decide after each result whether the run
//! continues, and select a single process-level final result code
//! (`spec.md` §4.8, §7).

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::warn;

use crate::composer::RequestComposer;
use crate::config::{BulkModifySelector, Config};
use crate::connection::ConnectionPool;
use crate::dn;
use crate::error::{Result, ToolError};
use crate::grouping::GroupingCoordinator;
use crate::ldif::{ChangeRecord, LdifReader, NextRecord};
use crate::notifications;
use crate::output::OutputSink;
use crate::paged_search::{EntryHandler, HandlerSignal, PagedSearchDriver};
use crate::rate_limit::RateBudget;
use crate::reject::RejectSink;
use crate::result_model::{OperationOutcome, ResultCode};

/// Runs one full pass: connect, process every change record from
/// `config.target.files` (or stdin if empty), and return the single result
/// code the process should exit with.
pub async fn run(config: Config, output: &mut dyn OutputSink) -> Result<ResultCode> {
    let (notif_tx, mut notif_rx) = notifications::channel();
    let mut pool = match ConnectionPool::connect(config.connect.clone(), notif_tx).await {
        Ok(p) => p,
        Err(e) => return Ok(connect_failure_code(&e, output)),
    };

    let composer = RequestComposer::new(&config.control);
    let mut grouping = GroupingCoordinator::new(config.grouping.clone(), &config.control);

    if let Some(outcome) = grouping.start(&mut pool).await? {
        output.failure(&format!("could not start transaction: {}", outcome.diagnostic_string()));
        return Ok(outcome.result_code);
    }

    let mut reject_sink = match &config.policy.reject_file {
        Some(path) => Some(RejectSink::new(Box::new(std::fs::File::create(path)?))),
        None => None,
    };
    let mut rate_budget = config.policy.rate_per_second.map(RateBudget::new);

    let mut tracker = FinalCodeTracker::new();
    let mut fatal = false;

    'sources: for (label, reader) in input_sources(&config.target.files)? {
        let mut ldif = LdifReader::new(reader, config.policy.trailing_space, config.policy.default_add);
        loop {
            notif_rx.drain(output);
            let next = match ldif.next_record() {
                Ok(next) => next,
                Err(e) => {
                    let message = format!("{}: could not read: {}", label, e);
                    output.failure(&message);
                    if let Some(sink) = reject_sink.as_mut() {
                        sink.reject(Some("could not read"), None, None);
                    }
                    tracker.record_fatal(ResultCode::LOCAL_ERROR);
                    fatal = true;
                    break 'sources;
                }
            };
            match next {
                NextRecord::Record(record) => {
                    if !dn::is_syntactically_valid(record.dn()) {
                        warn!("record in {} has a syntactically implausible DN: {}", label, record.dn());
                    }
                    if !config.target.selectors.is_empty() {
                        let bulk_fatal = run_bulk_modify(
                            &config,
                            &composer,
                            &mut grouping,
                            &mut pool,
                            &record,
                            &mut rate_budget,
                            &mut reject_sink,
                            output,
                            &mut tracker,
                        )
                        .await?;
                        fatal = bulk_fatal;
                        break 'sources;
                    }

                    if let Some(budget) = rate_budget.as_mut() {
                        budget.wait().await;
                    }
                    let outcome = dispatch_one(&config, &composer, &mut grouping, &mut pool, &record).await?;
                    report(&config, &record, &outcome, output, &mut reject_sink);
                    match interpret(&outcome, config.policy.continue_on_error) {
                        Verdict::Success => {}
                        Verdict::Continuable(code) => tracker.record_continuable(code),
                        Verdict::Fatal(code) => {
                            tracker.record_fatal(code);
                            fatal = true;
                        }
                    }
                    if fatal {
                        break 'sources;
                    }
                }
                NextRecord::ParseError { line, message, may_continue } => {
                    let line_msg = format!("{}:{}: {}", label, line, message);
                    output.failure(&line_msg);
                    if let Some(sink) = reject_sink.as_mut() {
                        sink.reject(Some(&message), None, None);
                    }
                    tracker.record_continuable(ResultCode::PARAM_ERROR);
                    if !may_continue {
                        fatal = true;
                        break 'sources;
                    }
                }
                NextRecord::EndOfStream => break,
            }
        }
    }

    let grouping_result = grouping.finish(&mut pool, fatal).await?;
    if let Some(outcome) = grouping_result {
        output.progress(&format!("grouping result: {}", outcome.diagnostic_string()));
        if !outcome.is_success() {
            tracker.record_fatal(outcome.result_code);
        }
    }
    notif_rx.drain(output);
    Ok(tracker.finish())
}

async fn dispatch_one(
    config: &Config,
    composer: &RequestComposer<'_>,
    grouping: &mut GroupingCoordinator,
    pool: &mut ConnectionPool,
    record: &ChangeRecord,
) -> Result<OperationOutcome> {
    if config.policy.dry_run {
        return Ok(OperationOutcome::synthetic(
            ResultCode::SUCCESS,
            format!("dry run: would {} {}", record.kind_name(), record.dn()),
        ));
    }
    let req = composer.compose(record, None, grouping.is_grouping_active());
    dispatch_with_referral(config, grouping, pool, req).await
}

/// Dispatches `req` through `grouping` and, when `--followReferrals` is set
/// and the server returns `REFERRAL` with at least one URL, retries once
/// against the first referral URL (`spec.md` §6). Config validation
/// (`config.rs`) already rejects `--followReferrals` together with either
/// grouping mode, so a referral retry is always a plain immediate dispatch.
async fn dispatch_with_referral(
    config: &Config,
    grouping: &mut GroupingCoordinator,
    pool: &mut ConnectionPool,
    req: crate::composer::ComposedRequest,
) -> Result<OperationOutcome> {
    let retry_req = if config.policy.follow_referrals { Some(req.clone()) } else { None };
    let outcome = grouping.dispatch(pool, req).await?;
    if config.policy.follow_referrals && outcome.result_code == ResultCode::REFERRAL {
        if let Some(url) = outcome.referral_urls.first() {
            return pool.dispatch_to_referral(url, retry_req.expect("cloned above")).await;
        }
    }
    Ok(outcome)
}

/// Applies `config.target.selectors`'s bulk-modify targets with `template`
/// as the modification to apply to each (`spec.md` §4.5). Returns whether a
/// fatal failure occurred, in which case the caller stops reading further
/// input.
async fn run_bulk_modify(
    config: &Config,
    composer: &RequestComposer<'_>,
    grouping: &mut GroupingCoordinator,
    pool: &mut ConnectionPool,
    template: &ChangeRecord,
    rate_budget: &mut Option<RateBudget>,
    reject_sink: &mut Option<RejectSink>,
    output: &mut dyn OutputSink,
    tracker: &mut FinalCodeTracker,
) -> Result<bool> {
    for selector in &config.target.selectors {
        let fatal = match selector {
            BulkModifySelector::Dn(target_dn) => {
                apply_one(config, composer, grouping, pool, template, target_dn, rate_budget, reject_sink, output, tracker).await?
            }
            BulkModifySelector::DnFile(path) => {
                let mut hit_fatal = false;
                for target_dn in read_lines(path)? {
                    if apply_one(config, composer, grouping, pool, template, &target_dn, rate_budget, reject_sink, output, tracker).await? {
                        hit_fatal = true;
                        break;
                    }
                }
                hit_fatal
            }
            BulkModifySelector::Filter(filter) => {
                run_filter_selector(config, composer, grouping, pool, template, filter, rate_budget, reject_sink, output, tracker).await?
            }
            BulkModifySelector::FilterFile(path) => {
                let mut hit_fatal = false;
                for filter in read_lines(path)? {
                    if run_filter_selector(config, composer, grouping, pool, template, &filter, rate_budget, reject_sink, output, tracker).await? {
                        hit_fatal = true;
                        break;
                    }
                }
                hit_fatal
            }
        };
        if fatal {
            return Ok(true);
        }
    }
    Ok(false)
}

async fn run_filter_selector(
    config: &Config,
    composer: &RequestComposer<'_>,
    grouping: &mut GroupingCoordinator,
    pool: &mut ConnectionPool,
    template: &ChangeRecord,
    filter: &str,
    rate_budget: &mut Option<RateBudget>,
    reject_sink: &mut Option<RejectSink>,
    output: &mut dyn OutputSink,
    tracker: &mut FinalCodeTracker,
) -> Result<bool> {
    let driver = PagedSearchDriver::new(config.policy.search_page_size);
    let extra_controls = composer.search_controls(grouping.is_grouping_active());
    let mut handler = BulkModifyHandler {
        config,
        composer,
        grouping,
        template,
        rate_budget,
        reject_sink,
        output,
        tracker,
    };
    let outcome = driver.run(pool, template.dn(), filter, extra_controls, &mut handler).await?;
    if !outcome.final_result.is_success() {
        output.failure(&format!("search for \"{}\" failed: {}", filter, outcome.final_result.diagnostic_string()));
        tracker.record_fatal(outcome.final_result.result_code);
        return Ok(true);
    }
    Ok(outcome.stopped_by_handler)
}

/// Composes, rate-limits and dispatches `template` retargeted at `target_dn`,
/// then records and reports the result. Returns whether the result was
/// fatal to the run.
async fn apply_one(
    config: &Config,
    composer: &RequestComposer<'_>,
    grouping: &mut GroupingCoordinator,
    pool: &mut ConnectionPool,
    template: &ChangeRecord,
    target_dn: &str,
    rate_budget: &mut Option<RateBudget>,
    reject_sink: &mut Option<RejectSink>,
    output: &mut dyn OutputSink,
    tracker: &mut FinalCodeTracker,
) -> Result<bool> {
    if let Some(budget) = rate_budget.as_mut() {
        budget.wait().await;
    }
    let outcome = if config.policy.dry_run {
        OperationOutcome::synthetic(
            ResultCode::SUCCESS,
            format!("dry run: would {} {}", template.kind_name(), target_dn),
        )
    } else {
        let req = composer.compose(template, Some(target_dn), grouping.is_grouping_active());
        dispatch_with_referral(config, grouping, pool, req).await?
    };
    let targeted = retarget(template, target_dn);
    report(config, &targeted, &outcome, output, reject_sink);
    match interpret(&outcome, config.policy.continue_on_error) {
        Verdict::Success => Ok(false),
        Verdict::Continuable(code) => {
            tracker.record_continuable(code);
            Ok(false)
        }
        Verdict::Fatal(code) => {
            tracker.record_fatal(code);
            Ok(true)
        }
    }
}

/// Feeds the bulk-modify template to each entry DN a paged search turns up
/// (`spec.md` §4.5 step 2).
struct BulkModifyHandler<'a> {
    config: &'a Config,
    composer: &'a RequestComposer<'a>,
    grouping: &'a mut GroupingCoordinator,
    template: &'a ChangeRecord,
    rate_budget: &'a mut Option<RateBudget>,
    reject_sink: &'a mut Option<RejectSink>,
    output: &'a mut dyn OutputSink,
    tracker: &'a mut FinalCodeTracker,
}

#[async_trait]
impl<'a> EntryHandler for BulkModifyHandler<'a> {
    async fn handle(&mut self, pool: &mut ConnectionPool, dn: &str) -> Result<HandlerSignal> {
        let fatal = apply_one(
            self.config,
            self.composer,
            self.grouping,
            pool,
            self.template,
            dn,
            self.rate_budget,
            self.reject_sink,
            self.output,
            self.tracker,
        )
        .await?;
        Ok(if fatal { HandlerSignal::Stop } else { HandlerSignal::Continue })
    }
}

const ASSERTION_CONTROL_OID: &str = "1.3.6.1.1.12";

fn report(
    config: &Config,
    record: &ChangeRecord,
    outcome: &OperationOutcome,
    output: &mut dyn OutputSink,
    reject_sink: &mut Option<RejectSink>,
) {
    if outcome.is_success() {
        output.progress(&format!("{} {}: {}", record.kind_name(), record.dn(), outcome.diagnostic_string()));
    } else {
        output.failure(&format!("{} {} failed: {}", record.kind_name(), record.dn(), outcome.diagnostic_string()));
        if let Some(sink) = reject_sink.as_mut() {
            let comment = assertion_failure_comment(config, record, outcome);
            sink.reject(comment.as_deref(), Some(record), Some(outcome));
        }
    }
}

/// `spec.md` §4.8 step 5 asks for the assertion filter to be quoted in the
/// rejection when the `Assertion` control caused `ASSERTION_FAILED`; the
/// server's own diagnostic message does not necessarily echo the filter
/// text back, so the comment names it explicitly. The filter may come from
/// the globally-configured `--assertionFilter` or from a per-record
/// assertion control line (`spec.md` §6).
fn assertion_failure_comment(config: &Config, record: &ChangeRecord, outcome: &OperationOutcome) -> Option<String> {
    if outcome.result_code != ResultCode::ASSERTION_FAILED {
        return None;
    }
    let filter = config.control.assertion_filter.clone().or_else(|| {
        record
            .controls()
            .iter()
            .find(|c| c.oid == ASSERTION_CONTROL_OID)
            .and_then(|c| c.value.as_ref())
            .and_then(|v| std::str::from_utf8(v).ok())
            .map(|s| s.to_owned())
    });
    Some(match filter {
        Some(f) => format!("assertion failed: filter \"{}\" did not match the target entry", f),
        None => "assertion failed: filter did not match the target entry".to_owned(),
    })
}

fn retarget(record: &ChangeRecord, new_dn: &str) -> ChangeRecord {
    let mut r = record.clone();
    match &mut r {
        ChangeRecord::Add { dn, .. }
        | ChangeRecord::Delete { dn, .. }
        | ChangeRecord::Modify { dn, .. }
        | ChangeRecord::ModifyDn { dn, .. } => *dn = new_dn.to_owned(),
    }
    r
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content.lines().map(|l| l.trim().to_owned()).filter(|l| !l.is_empty()).collect())
}

fn input_sources(files: &[PathBuf]) -> Result<Vec<(String, Box<dyn BufRead>)>> {
    if files.is_empty() {
        let reader: Box<dyn BufRead> = Box::new(io::BufReader::new(io::stdin()));
        return Ok(vec![("<stdin>".to_owned(), reader)]);
    }
    files
        .iter()
        .map(|path| {
            let file = std::fs::File::open(path)?;
            let reader: Box<dyn BufRead> = Box::new(io::BufReader::new(file));
            Ok((path.display().to_string(), reader))
        })
        .collect()
}

fn connect_failure_code(err: &ToolError, output: &mut dyn OutputSink) -> ResultCode {
    if let ToolError::Ldap(ldap3::LdapError::LdapResult { result }) = err {
        let code = ResultCode(result.rc as i32);
        // A failed health-check bind already logged its own warning
        // (`connection.rs`); avoid a redundant top-level message for it.
        if code != ResultCode::INVALID_CREDENTIALS {
            output.failure(&format!("could not connect: {}", code));
        }
        return code;
    }
    output.failure(&format!("could not connect: {}", err));
    err.result_code()
}

/// What one operation's outcome means for the run as a whole
/// (`spec.md` §7's fatal/continuable/success classification).
pub enum Verdict {
    Success,
    Continuable(ResultCode),
    Fatal(ResultCode),
}

/// A failed result whose connection is no longer usable is always fatal,
/// regardless of `--continueOnError`. `ASSERTION_FAILED` is likewise always
/// fatal (`spec.md` §4.8 step 5, §7): the engine reports it and stops
/// processing even when `--continueOnError` is set. Otherwise
/// `--continueOnError` decides whether the run proceeds past it.
pub fn interpret(outcome: &OperationOutcome, continue_on_error: bool) -> Verdict {
    if outcome.is_success() {
        return Verdict::Success;
    }
    if outcome.result_code == ResultCode::ASSERTION_FAILED {
        return Verdict::Fatal(outcome.result_code);
    }
    if !outcome.result_code.is_connection_usable() {
        return Verdict::Fatal(outcome.result_code);
    }
    if continue_on_error {
        Verdict::Continuable(outcome.result_code)
    } else {
        Verdict::Fatal(outcome.result_code)
    }
}

/// Accumulates per-record verdicts into the single process exit code
/// (`spec.md` §4.8 step 5): the first fatal code wins; failing that, the
/// first continuable code; failing that, success.
pub struct FinalCodeTracker {
    first_fatal: Option<ResultCode>,
    first_continuable: Option<ResultCode>,
}

impl FinalCodeTracker {
    pub fn new() -> FinalCodeTracker {
        FinalCodeTracker {
            first_fatal: None,
            first_continuable: None,
        }
    }

    pub fn record_continuable(&mut self, code: ResultCode) {
        if self.first_continuable.is_none() {
            self.first_continuable = Some(code);
        }
    }

    pub fn record_fatal(&mut self, code: ResultCode) {
        if self.first_fatal.is_none() {
            self.first_fatal = Some(code);
        }
    }

    pub fn finish(self) -> ResultCode {
        self.first_fatal.or(self.first_continuable).unwrap_or(ResultCode::SUCCESS)
    }
}

impl Default for FinalCodeTracker {
    fn default() -> FinalCodeTracker {
        FinalCodeTracker::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_code_wins_over_earlier_continuable() {
        let mut tracker = FinalCodeTracker::new();
        tracker.record_continuable(ResultCode::NO_SUCH_OBJECT);
        tracker.record_fatal(ResultCode::BUSY);
        assert_eq!(tracker.finish(), ResultCode::BUSY);
    }

    #[test]
    fn first_continuable_wins_when_no_fatal_seen() {
        let mut tracker = FinalCodeTracker::new();
        tracker.record_continuable(ResultCode::NO_SUCH_OBJECT);
        tracker.record_continuable(ResultCode::ENTRY_ALREADY_EXISTS);
        assert_eq!(tracker.finish(), ResultCode::NO_SUCH_OBJECT);
    }

    #[test]
    fn success_when_nothing_recorded() {
        assert_eq!(FinalCodeTracker::new().finish(), ResultCode::SUCCESS);
    }

    #[test]
    fn busy_is_fatal_even_with_continue_on_error() {
        let outcome = OperationOutcome::synthetic(ResultCode::BUSY, "overloaded");
        assert!(matches!(interpret(&outcome, true), Verdict::Fatal(ResultCode::BUSY)));
    }

    #[test]
    fn assertion_failed_is_fatal_even_with_continue_on_error() {
        let outcome = OperationOutcome::synthetic(ResultCode::ASSERTION_FAILED, "filter did not match");
        assert!(matches!(interpret(&outcome, true), Verdict::Fatal(ResultCode::ASSERTION_FAILED)));
        assert!(matches!(interpret(&outcome, false), Verdict::Fatal(ResultCode::ASSERTION_FAILED)));
    }

    #[test]
    fn no_such_object_is_continuable_only_with_flag() {
        let outcome = OperationOutcome::synthetic(ResultCode::NO_SUCH_OBJECT, "gone");
        assert!(matches!(interpret(&outcome, true), Verdict::Continuable(_)));
        assert!(matches!(interpret(&outcome, false), Verdict::Fatal(_)));
    }

    #[test]
    fn retarget_preserves_everything_but_the_dn() {
        let record = ChangeRecord::Delete {
            dn: "uid=old,dc=x".into(),
            controls: vec![],
        };
        let moved = retarget(&record, "uid=new,dc=x");
        assert_eq!(moved.dn(), "uid=new,dc=x");
        assert_eq!(moved.kind_name(), "delete");
    }
}
