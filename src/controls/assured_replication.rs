//! Assured Replication request control.
//!
//! Carries a local assurance level, a remote assurance level, and an
//! optional timeout (`spec.md` §4.2). Encoded as the real control does: an
//! outer `SEQUENCE` of two `[0]`/`[1]`-tagged enumerated choices plus an
//! optional `[2]`-tagged integer timeout, in milliseconds.

use ldap3::controls::{MakeCritical, RawControl};

use super::encoding::{encode_sequence, integer};

pub const ASSURED_REPLICATION_OID: &str = "1.3.6.1.4.1.30221.2.5.28";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalLevel {
    None,
    ReceivedAnyServer,
    ProcessedAllServers,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteLevel {
    None,
    ReceivedAnyRemoteLocation,
    ReceivedAllRemoteLocations,
    ProcessedAllRemoteServers,
}

#[derive(Clone, Copy, Debug)]
pub struct AssuredReplication {
    pub local_level: LocalLevel,
    pub remote_level: RemoteLevel,
    pub timeout_millis: Option<i64>,
}

impl MakeCritical for AssuredReplication {}

impl From<AssuredReplication> for RawControl {
    fn from(ar: AssuredReplication) -> RawControl {
        let local = match ar.local_level {
            LocalLevel::None => 0,
            LocalLevel::ReceivedAnyServer => 1,
            LocalLevel::ProcessedAllServers => 2,
        };
        let remote = match ar.remote_level {
            RemoteLevel::None => 0,
            RemoteLevel::ReceivedAnyRemoteLocation => 1,
            RemoteLevel::ReceivedAllRemoteLocations => 2,
            RemoteLevel::ProcessedAllRemoteServers => 3,
        };
        let mut inner = vec![integer(local), integer(remote)];
        if let Some(ms) = ar.timeout_millis {
            inner.push(integer(ms));
        }
        RawControl {
            ctype: ASSURED_REPLICATION_OID.to_owned(),
            crit: false,
            val: Some(encode_sequence(inner)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_without_timeout() {
        let raw: RawControl = AssuredReplication {
            local_level: LocalLevel::None,
            remote_level: RemoteLevel::None,
            timeout_millis: None,
        }
        .into();
        assert!(raw.val.is_some());
    }

    #[test]
    fn encodes_with_timeout() {
        let raw: RawControl = AssuredReplication {
            local_level: LocalLevel::ProcessedAllServers,
            remote_level: RemoteLevel::ProcessedAllRemoteServers,
            timeout_millis: Some(30_000),
        }
        .into();
        assert!(raw.val.unwrap().len() > 6);
    }
}
