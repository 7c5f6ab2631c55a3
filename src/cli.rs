//! CLI surface (`SPEC_FULL.md` §4): one `clap` derive struct covering
//! connection/bind options, input/target selection, grouping mode, run
//! policy, and one flag per `spec.md` §4.2 control family. `Config::from_cli`
//! lowers and validates this into the immutable `Config` the engine runs
//! with.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Clone, Debug)]
#[command(name = "ldapmodify", version, about = "Apply LDIF change records to a directory server")]
pub struct Cli {
    /// LDAP URL to connect to; may be given more than once to list failover
    /// servers tried in order.
    #[arg(long = "ldapUrl", default_value = "ldap://localhost:389")]
    pub ldap_url: Vec<String>,

    #[arg(long = "bindDN")]
    pub bind_dn: Option<String>,

    #[arg(long = "bindPassword")]
    pub bind_password: Option<String>,

    #[arg(long = "saslExternal", conflicts_with_all = ["bind_dn", "bind_password"])]
    pub sasl_external: bool,

    #[arg(long = "useStartTLS")]
    pub use_start_tls: bool,

    #[arg(long = "trustAll")]
    pub trust_all: bool,

    #[arg(long = "useAdministrativeSession")]
    pub use_administrative_session: bool,

    #[arg(long = "retryFailedOperations")]
    pub retry_failed_operations: bool,

    /// One or more LDIF files to read; stdin is used when none are given.
    #[arg(long = "filename", short = 'f')]
    pub file: Vec<PathBuf>,

    #[arg(long = "defaultAdd")]
    pub default_add: bool,

    #[arg(long = "trailingSpaceBehavior", value_parser = ["reject", "strip", "retain"])]
    pub trailing_space_behavior: Option<String>,

    /// `spec.md` §6 names the LDIF character set as configurable; only
    /// UTF-8 (the `LdifReader`'s only supported decoding) is accepted today.
    #[arg(long = "encoding", default_value = "utf-8")]
    pub encoding: String,

    #[arg(long = "verbose")]
    pub verbose: bool,

    #[arg(long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,

    /// CLI-surface compatibility stub; this tool has no properties file.
    #[arg(long = "noPropertiesFile")]
    pub no_properties_file: bool,

    #[arg(long = "continueOnError")]
    pub continue_on_error: bool,

    #[arg(long = "followReferrals")]
    pub follow_referrals: bool,

    #[arg(long = "dryRun")]
    pub dry_run: bool,

    #[arg(long = "ratePerSecond")]
    pub rate_per_second: Option<u32>,

    #[arg(long = "simplePageSize")]
    pub search_page_size: Option<i32>,

    #[arg(long = "rejectFile")]
    pub reject_file: Option<PathBuf>,

    /// Target a single DN with the one change record read from input,
    /// instead of dispatching the record at its own `dn:` line.
    #[arg(long = "modifyEntryWithDN")]
    pub modify_entry_with_dn: Option<String>,

    #[arg(long = "modifyEntriesWithDNsFromFile")]
    pub modify_entries_with_dns_from_file: Option<PathBuf>,

    #[arg(long = "modifyEntriesMatchingFilter")]
    pub modify_entries_matching_filter: Vec<String>,

    #[arg(long = "modifyEntriesMatchingFiltersFromFile")]
    pub modify_entries_matching_filters_from_file: Option<PathBuf>,

    #[arg(long = "useTransaction")]
    pub use_transaction: bool,

    #[arg(long = "multiUpdateErrorBehavior", value_parser = ["atomic", "abort-on-error", "continue-on-error"])]
    pub multi_update_error_behavior: Option<String>,

    // --- per-spec.md-§4.2 control flags -----------------------------------
    #[arg(long = "assertionFilter")]
    pub assertion_filter: Option<String>,

    #[arg(long = "proxyAs")]
    pub proxy_as: Option<String>,

    #[arg(long = "proxyV1As")]
    pub proxy_v1_as: Option<String>,

    #[arg(long = "preReadAttributes")]
    pub pre_read_attributes: Option<String>,

    #[arg(long = "postReadAttributes")]
    pub post_read_attributes: Option<String>,

    #[arg(long = "assuredReplicationLocalLevel", value_parser = ["none", "received-any-server", "processed-all-servers"])]
    pub assured_replication_local_level: Option<String>,

    #[arg(long = "assuredReplicationRemoteLevel", value_parser = [
        "none", "received-any-remote-location", "received-all-remote-locations", "processed-all-remote-servers",
    ])]
    pub assured_replication_remote_level: Option<String>,

    #[arg(long = "assuredReplicationTimeoutMillis")]
    pub assured_replication_timeout_millis: Option<u64>,

    #[arg(long = "suppressOperationalAttributeUpdates", value_parser = [
        "last-access-time", "last-login-time", "last-login-ip", "lastmod",
    ])]
    pub suppress_operational_attribute_updates: Vec<String>,

    #[arg(long = "noOperation")]
    pub no_operation: bool,

    #[arg(long = "manageDsaIT")]
    pub manage_dsa_it: bool,

    #[arg(long = "permissiveModify")]
    pub permissive_modify: bool,

    #[arg(long = "subtreeDelete")]
    pub subtree_delete: bool,

    #[arg(long = "hardDelete")]
    pub hard_delete: bool,

    #[arg(long = "softDelete", conflicts_with = "hard_delete")]
    pub soft_delete: bool,

    #[arg(long = "suppressReferentialIntegrityUpdates")]
    pub suppress_referential_integrity_updates: bool,

    #[arg(long = "ignoreNoUserModification")]
    pub ignore_no_user_modification: bool,

    #[arg(long = "nameWithEntryUUID")]
    pub name_with_entry_uuid: bool,

    #[arg(long = "replicationRepair")]
    pub replication_repair: bool,

    #[arg(long = "operationPurpose")]
    pub operation_purpose: Option<String>,

    #[arg(long = "getAuthorizationEntry")]
    pub get_authorization_entry: bool,

    #[arg(long = "getUserResourceLimits")]
    pub get_user_resource_limits: bool,

    #[arg(long = "useAuthorizationIdentityControl")]
    pub use_authorization_identity_control: bool,

    #[arg(long = "usePasswordPolicyControl")]
    pub use_password_policy_control: bool,

    #[arg(long = "passwordValidationDetails")]
    pub password_validation_details: bool,

    #[arg(long = "retirePassword", conflicts_with = "purge_password")]
    pub retire_password: bool,

    #[arg(long = "purgePassword")]
    pub purge_password: bool,
}
