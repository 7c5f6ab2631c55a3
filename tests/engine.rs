use clap::Parser;

use ldapmodify::cli::Cli;
use ldapmodify::config::Config;
use ldapmodify::engine::{interpret, FinalCodeTracker, Verdict};
use ldapmodify::result_model::{OperationOutcome, ResultCode};

fn cli(argv: &[&str]) -> Cli {
    let mut full = vec!["ldapmodify"];
    full.extend_from_slice(argv);
    Cli::parse_from(full)
}

#[test]
fn plain_config_lowers_without_error() {
    let config = Config::from_cli(cli(&["--bindDN", "cn=admin", "--bindPassword", "secret"])).unwrap();
    assert!(!config.policy.continue_on_error);
    assert!(config.target.selectors.is_empty());
}

#[test]
fn bulk_modify_selectors_accumulate_in_declaration_order() {
    let config = Config::from_cli(cli(&[
        "--modifyEntryWithDN",
        "uid=a,dc=x",
        "--modifyEntriesMatchingFilter",
        "(objectClass=person)",
        "--modifyEntriesMatchingFilter",
        "(objectClass=group)",
    ]))
    .unwrap();
    assert_eq!(config.target.selectors.len(), 3);
}

#[test]
fn transaction_and_bulk_modify_targets_are_rejected_together() {
    let result = Config::from_cli(cli(&["--useTransaction", "--modifyEntryWithDN", "uid=a,dc=x"]));
    assert!(result.is_err());
}

#[test]
fn sasl_external_conflicts_with_simple_bind_dn() {
    let result = Cli::try_parse_from(["ldapmodify", "--saslExternal", "--bindDN", "cn=admin"]);
    assert!(result.is_err());
}

#[test]
fn interpret_classifies_the_three_verdict_kinds() {
    let ok = OperationOutcome::synthetic(ResultCode::SUCCESS, "");
    assert!(matches!(interpret(&ok, false), Verdict::Success));

    let recoverable = OperationOutcome::synthetic(ResultCode::NO_SUCH_OBJECT, "gone");
    assert!(matches!(interpret(&recoverable, true), Verdict::Continuable(_)));
    assert!(matches!(interpret(&recoverable, false), Verdict::Fatal(_)));

    let connection_down = OperationOutcome::synthetic(ResultCode::UNAVAILABLE, "down");
    assert!(matches!(interpret(&connection_down, true), Verdict::Fatal(_)));
}

#[test]
fn final_code_tracker_prefers_fatal_over_continuable_regardless_of_order() {
    let mut tracker = FinalCodeTracker::new();
    tracker.record_continuable(ResultCode::NO_SUCH_OBJECT);
    tracker.record_fatal(ResultCode::UNAVAILABLE);
    tracker.record_continuable(ResultCode::ENTRY_ALREADY_EXISTS);
    assert_eq!(tracker.finish(), ResultCode::UNAVAILABLE);
}
