//! Suppress Operational Attribute Updates control.
//!
//! Carries a set drawn from `{last-access-time, last-login-time,
//! last-login-ip, lastmod}` (`spec.md` §4.2), encoded as a `SEQUENCE OF
//! ENUMERATED` the way the real control does.

use ldap3::controls::{MakeCritical, RawControl};

use super::encoding::{enumerated, encode_sequence};

pub const SUPPRESS_OPERATIONAL_ATTRIBUTE_UPDATES_OID: &str = "1.3.6.1.4.1.30221.2.5.903";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SuppressedOperation {
    LastAccessTime,
    LastLoginTime,
    LastLoginIp,
    LastMod,
}

impl SuppressedOperation {
    fn enumerated_value(self) -> i64 {
        match self {
            SuppressedOperation::LastAccessTime => 0,
            SuppressedOperation::LastLoginTime => 1,
            SuppressedOperation::LastLoginIp => 2,
            SuppressedOperation::LastMod => 3,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SuppressOperationalAttributeUpdates {
    pub suppressed: Vec<SuppressedOperation>,
}

impl MakeCritical for SuppressOperationalAttributeUpdates {}

impl From<SuppressOperationalAttributeUpdates> for RawControl {
    fn from(s: SuppressOperationalAttributeUpdates) -> RawControl {
        let inner = s
            .suppressed
            .into_iter()
            .map(|op| enumerated(op.enumerated_value()))
            .collect();
        RawControl {
            ctype: SUPPRESS_OPERATIONAL_ATTRIBUTE_UPDATES_OID.to_owned(),
            crit: false,
            val: Some(encode_sequence(inner)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_empty_set() {
        let raw: RawControl = SuppressOperationalAttributeUpdates { suppressed: vec![] }.into();
        assert!(raw.val.is_some());
    }

    #[test]
    fn distinct_members_distinct_values() {
        assert_ne!(
            SuppressedOperation::LastAccessTime.enumerated_value(),
            SuppressedOperation::LastMod.enumerated_value()
        );
    }
}
