//! Control Registry (C2).
//!
//! Named, typed request-control factories keyed by OID, each with its own
//! parameter shape (`spec.md` §4.2). Controls with a form already
//! implemented by `ldap3` (paged results, assertion, proxied authorization
//! v2, pre-/post-read, relax rules) are built from the library's own types;
//! the proprietary UnboundID-style controls `ldap3` doesn't implement are
//! built here the same way `ldap3`'s own `controls_impl` submodules build
//! theirs: a small struct, an OID constant, and a `From<T> for RawControl`
//! that BER-encodes the value with `ldap3::asn1`.

use ldap3::controls::RawControl;

pub mod assured_replication;
pub(crate) mod encoding;
pub mod flags;
pub mod password_policy;
pub mod proxy_auth;
pub mod read_entry;
pub mod suppress_op_attrs;
pub mod transaction;
pub mod undelete;

pub use assured_replication::{AssuredReplication, LocalLevel, RemoteLevel};
pub use flags::*;
pub use password_policy::{PasswordPolicyRequest, PasswordValidationDetails, RetireOrPurgePassword, RetireOrPurgeKind};
pub use proxy_auth::ProxyAuthV1;
pub use suppress_op_attrs::{SuppressOperationalAttributeUpdates, SuppressedOperation};
pub use transaction::TransactionSpecification;
pub use undelete::Undelete;

/// The operation kind an outgoing request is being built for, used to look
/// up which controls attach per the table in `spec.md` §4.2.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Add,
    Delete,
    Modify,
    ModifyDn,
    Search,
}

/// Builds a minimal control with no value, critical as requested.
pub(crate) fn flag_control(oid: &str, critical: bool) -> RawControl {
    RawControl {
        ctype: oid.to_owned(),
        crit: critical,
        val: None,
    }
}

/// Tokenizes a comma- and whitespace-separated attribute list, as
/// `spec.md` §4.2 requires for the pre-/post-read attribute selection.
pub fn tokenize_attr_list(spec: &str) -> Vec<String> {
    spec.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_comma_and_whitespace() {
        let toks = tokenize_attr_list(" cn, sn ,  mail  ,uid");
        assert_eq!(toks, vec!["cn", "sn", "mail", "uid"]);
    }

    #[test]
    fn empty_list_is_empty() {
        assert!(tokenize_attr_list("").is_empty());
        assert!(tokenize_attr_list("   ").is_empty());
    }
}
