//! Lowers the raw `Cli` arguments into the immutable configuration the
//! engine consumes, applying the mutual-exclusion validation rules of
//! `spec.md` §4.7.

use std::path::PathBuf;

use crate::cli::Cli;
use crate::composer::{ControlOptions, ProxiedAuth};
use crate::connection::{BindCredentials, ConnectOpts};
use crate::controls::{AssuredReplication, LocalLevel, RemoteLevel, SuppressedOperation};
use crate::error::{Result, ToolError};
use crate::grouping::{GroupingOpts, MultiUpdateErrorBehavior};
use crate::ldif::TrailingSpacePolicy;

#[derive(Clone, Debug)]
pub enum BulkModifySelector {
    Dn(String),
    DnFile(PathBuf),
    Filter(String),
    FilterFile(PathBuf),
}

#[derive(Clone, Debug, Default)]
pub struct TargetOpts {
    pub files: Vec<PathBuf>,
    pub selectors: Vec<BulkModifySelector>,
}

#[derive(Clone, Debug)]
pub struct PolicyOpts {
    pub continue_on_error: bool,
    pub retry_failed_operations: bool,
    pub follow_referrals: bool,
    pub dry_run: bool,
    pub default_add: bool,
    pub rate_per_second: Option<u32>,
    pub search_page_size: Option<i32>,
    pub trailing_space: TrailingSpacePolicy,
    pub reject_file: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub connect: ConnectOpts,
    pub target: TargetOpts,
    pub grouping: GroupingOpts,
    pub policy: PolicyOpts,
    pub control: ControlOptions,
}

impl Config {
    pub fn from_cli(args: Cli) -> Result<Config> {
        if !args.encoding.eq_ignore_ascii_case("utf-8") {
            return Err(ToolError::Param(format!("unsupported --encoding value: {} (only utf-8 is supported)", args.encoding)));
        }

        let grouping = lower_grouping(&args)?;
        let grouping_active = !matches!(grouping, GroupingOpts::Immediate);

        validate_exclusions(&args, grouping_active)?;

        let credentials = if args.sasl_external {
            BindCredentials::SaslExternal
        } else if let Some(dn) = &args.bind_dn {
            BindCredentials::Simple {
                bind_dn: dn.clone(),
                password: args.bind_password.clone().unwrap_or_default(),
            }
        } else {
            BindCredentials::Anonymous
        };

        let connect = ConnectOpts {
            servers: args.ldap_url.clone(),
            credentials,
            starttls: args.use_start_tls,
            no_tls_verify: args.trust_all,
            post_connect_extended_oid: if args.use_administrative_session {
                Some(crate::connection::START_ADMINISTRATIVE_SESSION_OID.to_owned())
            } else {
                None
            },
            retry_on_invalid_connection: args.retry_failed_operations,
        };

        let mut selectors = Vec::new();
        if let Some(dn) = &args.modify_entry_with_dn {
            selectors.push(BulkModifySelector::Dn(dn.clone()));
        }
        if let Some(path) = &args.modify_entries_with_dns_from_file {
            selectors.push(BulkModifySelector::DnFile(path.clone()));
        }
        for filter in &args.modify_entries_matching_filter {
            selectors.push(BulkModifySelector::Filter(filter.clone()));
        }
        if let Some(path) = &args.modify_entries_matching_filters_from_file {
            selectors.push(BulkModifySelector::FilterFile(path.clone()));
        }

        let target = TargetOpts {
            files: args.file.clone(),
            selectors,
        };

        let trailing_space = match args.trailing_space_behavior.as_deref() {
            Some("reject") => TrailingSpacePolicy::Reject,
            Some("retain") => TrailingSpacePolicy::Retain,
            Some("strip") | None => TrailingSpacePolicy::Strip,
            Some(other) => return Err(ToolError::Param(format!("invalid --trailingSpaceBehavior value: {}", other))),
        };

        let policy = PolicyOpts {
            continue_on_error: args.continue_on_error,
            retry_failed_operations: args.retry_failed_operations,
            follow_referrals: args.follow_referrals,
            dry_run: args.dry_run,
            default_add: args.default_add,
            rate_per_second: args.rate_per_second,
            search_page_size: args.search_page_size,
            trailing_space,
            reject_file: args.reject_file.clone(),
        };

        let control = lower_controls(&args)?;

        Ok(Config {
            connect,
            target,
            grouping,
            policy,
            control,
        })
    }
}

fn lower_grouping(args: &Cli) -> Result<GroupingOpts> {
    match (&args.use_transaction, &args.multi_update_error_behavior) {
        (true, Some(_)) => Err(ToolError::Param(
            "--useTransaction and --multiUpdateErrorBehavior are mutually exclusive".into(),
        )),
        (true, None) => Ok(GroupingOpts::Transaction),
        (false, Some(behavior)) => {
            let behavior = match behavior.as_str() {
                "atomic" => MultiUpdateErrorBehavior::Atomic,
                "abort-on-error" => MultiUpdateErrorBehavior::AbortOnError,
                "continue-on-error" => MultiUpdateErrorBehavior::ContinueOnError,
                other => return Err(ToolError::Param(format!("invalid --multiUpdateErrorBehavior value: {}", other))),
            };
            Ok(GroupingOpts::MultiUpdate(behavior))
        }
        (false, None) => Ok(GroupingOpts::Immediate),
    }
}

/// `spec.md` §4.7's exclusion rules: transactional and multi-update are
/// each incompatible with continue-on-error, follow-referrals, no-op,
/// retry-failed-operations, dry-run, name-with-entry-UUID, a reject file,
/// the per-operation-type controls, and (multi-update only) a rate limit;
/// both are incompatible with the bulk-modify target arguments.
fn validate_exclusions(args: &Cli, grouping_active: bool) -> Result<()> {
    if !grouping_active {
        return Ok(());
    }
    let bad = [
        (args.continue_on_error, "--continueOnError"),
        (args.follow_referrals, "--followReferrals"),
        (args.no_operation, "--noOperation"),
        (args.retry_failed_operations, "--retryFailedOperations"),
        (args.dry_run, "--dryRun"),
        (args.name_with_entry_uuid, "--nameWithEntryUUID"),
        (args.permissive_modify, "--permissiveModify"),
        (args.subtree_delete, "--subtreeDelete"),
        (args.hard_delete, "--hardDelete"),
        (args.soft_delete, "--softDelete"),
        (args.suppress_referential_integrity_updates, "--suppressReferentialIntegrityUpdates"),
        (args.ignore_no_user_modification, "--ignoreNoUserModification"),
        (args.pre_read_attributes.is_some(), "--preReadAttributes"),
        (args.post_read_attributes.is_some(), "--postReadAttributes"),
        (args.use_password_policy_control, "--usePasswordPolicyControl"),
    ];
    for (set, flag) in bad {
        if set {
            return Err(ToolError::Param(format!("{} cannot be used with --useTransaction or --multiUpdateErrorBehavior", flag)));
        }
    }
    if args.reject_file.is_some() {
        return Err(ToolError::Param(
            "--rejectFile cannot be used with --useTransaction or --multiUpdateErrorBehavior".into(),
        ));
    }
    let has_bulk_target = args.modify_entry_with_dn.is_some()
        || args.modify_entries_with_dns_from_file.is_some()
        || !args.modify_entries_matching_filter.is_empty()
        || args.modify_entries_matching_filters_from_file.is_some();
    if has_bulk_target {
        return Err(ToolError::Param(
            "bulk-modify target arguments cannot be used with --useTransaction or --multiUpdateErrorBehavior".into(),
        ));
    }
    if args.multi_update_error_behavior.is_some() && args.rate_per_second.is_some() {
        return Err(ToolError::Param("--ratePerSecond cannot be used with --multiUpdateErrorBehavior".into()));
    }
    Ok(())
}

fn lower_controls(args: &Cli) -> Result<ControlOptions> {
    let proxied_auth = match (&args.proxy_as, &args.proxy_v1_as) {
        (Some(_), Some(_)) => {
            return Err(ToolError::Param("--proxyAs and --proxyV1As are mutually exclusive".into()))
        }
        (Some(authz_id), None) => Some(ProxiedAuth::V2 {
            authz_id: authz_id.clone(),
        }),
        (None, Some(dn)) => Some(ProxiedAuth::V1 { proxy_dn: dn.clone() }),
        (None, None) => None,
    };

    let assured_replication = if args.assured_replication_local_level.is_some() || args.assured_replication_remote_level.is_some() {
        Some(AssuredReplication {
            local_level: match args.assured_replication_local_level.as_deref() {
                Some("none") | None => LocalLevel::None,
                Some("received-any-server") => LocalLevel::ReceivedAnyServer,
                Some("processed-all-servers") => LocalLevel::ProcessedAllServers,
                Some(other) => return Err(ToolError::Param(format!("invalid assured replication local level: {}", other))),
            },
            remote_level: match args.assured_replication_remote_level.as_deref() {
                Some("none") | None => RemoteLevel::None,
                Some("received-any-remote-location") => RemoteLevel::ReceivedAnyRemoteLocation,
                Some("received-all-remote-locations") => RemoteLevel::ReceivedAllRemoteLocations,
                Some("processed-all-remote-servers") => RemoteLevel::ProcessedAllRemoteServers,
                Some(other) => return Err(ToolError::Param(format!("invalid assured replication remote level: {}", other))),
            },
            timeout_millis: args.assured_replication_timeout_millis.map(|ms| ms as i64),
        })
    } else {
        None
    };

    let mut suppress_operational_attrs = Vec::new();
    for s in &args.suppress_operational_attribute_updates {
        suppress_operational_attrs.push(match s.as_str() {
            "last-access-time" => SuppressedOperation::LastAccessTime,
            "last-login-time" => SuppressedOperation::LastLoginTime,
            "last-login-ip" => SuppressedOperation::LastLoginIp,
            "lastmod" => SuppressedOperation::LastMod,
            other => return Err(ToolError::Param(format!("invalid --suppressOperationalAttributeUpdates value: {}", other))),
        });
    }

    Ok(ControlOptions {
        assertion_filter: args.assertion_filter.clone(),
        proxied_auth,
        pre_read_attrs: args.pre_read_attributes.clone(),
        post_read_attrs: args.post_read_attributes.clone(),
        assured_replication,
        suppress_operational_attrs,
        no_op: args.no_operation,
        manage_dsa_it: args.manage_dsa_it,
        permissive_modify: args.permissive_modify,
        subtree_delete: args.subtree_delete,
        hard_delete: args.hard_delete,
        soft_delete: args.soft_delete,
        suppress_referential_integrity_updates: args.suppress_referential_integrity_updates,
        ignore_no_user_modification: args.ignore_no_user_modification,
        name_with_entry_uuid: args.name_with_entry_uuid,
        replication_repair: args.replication_repair,
        operation_purpose: args.operation_purpose.clone(),
        get_authorization_entry: args.get_authorization_entry,
        get_user_resource_limits: args.get_user_resource_limits,
        authorization_identity: args.use_authorization_identity_control,
        password_policy: args.use_password_policy_control,
        password_validation_details: args.password_validation_details,
        retire_password: args.retire_password,
        purge_password: args.purge_password,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli::parse_from(["ldapmodify"])
    }

    use clap::Parser as _;

    #[test]
    fn transaction_and_multi_update_are_mutually_exclusive() {
        let mut args = base_cli();
        args.use_transaction = true;
        args.multi_update_error_behavior = Some("atomic".into());
        assert!(Config::from_cli(args).is_err());
    }

    #[test]
    fn transaction_rejects_continue_on_error() {
        let mut args = base_cli();
        args.use_transaction = true;
        args.continue_on_error = true;
        assert!(Config::from_cli(args).is_err());
    }

    #[test]
    fn immediate_mode_with_no_flags_is_valid() {
        let args = base_cli();
        assert!(Config::from_cli(args).is_ok());
    }

    #[test]
    fn multi_update_rejects_rate_limit() {
        let mut args = base_cli();
        args.multi_update_error_behavior = Some("atomic".into());
        args.rate_per_second = Some(10);
        assert!(Config::from_cli(args).is_err());
    }

    #[test]
    fn non_utf8_encoding_is_rejected() {
        let mut args = base_cli();
        args.encoding = "latin1".into();
        assert!(Config::from_cli(args).is_err());
    }
}
