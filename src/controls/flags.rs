//! Flag-derived controls: those whose request value is absent entirely and
//! whose presence alone (plus criticality) communicates the whole request
//! (`spec.md` §4.2's closing bullet list).

use ldap3::controls::{MakeCritical, RawControl};

use super::flag_control;

macro_rules! flag_control_type {
    ($name:ident, $oid_const:ident, $oid:expr) => {
        pub const $oid_const: &str = $oid;

        #[derive(Clone, Copy, Debug)]
        pub struct $name;

        impl MakeCritical for $name {}

        impl From<$name> for RawControl {
            fn from(_: $name) -> RawControl {
                flag_control($oid_const, false)
            }
        }
    };
}

flag_control_type!(NoOp, NO_OP_OID, "1.3.6.1.4.1.4203.1.10.2");
flag_control_type!(ManageDsaIt, MANAGE_DSA_IT_OID, "2.16.840.1.113730.3.4.2");
flag_control_type!(PermissiveModify, PERMISSIVE_MODIFY_OID, "1.2.840.113556.1.4.1413");
flag_control_type!(SubtreeDelete, SUBTREE_DELETE_OID, "1.2.840.113556.1.4.805");
flag_control_type!(HardDelete, HARD_DELETE_OID, "1.3.6.1.4.1.30221.2.5.2");
flag_control_type!(SoftDelete, SOFT_DELETE_OID, "1.3.6.1.4.1.30221.2.5.21");
flag_control_type!(
    ReplicationRepair,
    REPLICATION_REPAIR_OID,
    "1.3.6.1.4.1.30221.2.5.31"
);
flag_control_type!(
    IgnoreNoUserModification,
    IGNORE_NO_USER_MODIFICATION_OID,
    "1.3.6.1.4.1.30221.2.5.5"
);
flag_control_type!(
    NameWithEntryUuid,
    NAME_WITH_ENTRY_UUID_OID,
    "1.3.6.1.4.1.30221.2.5.24"
);
flag_control_type!(
    SuppressReferentialIntegrityUpdates,
    SUPPRESS_REFERENTIAL_INTEGRITY_UPDATES_OID,
    "1.3.6.1.4.1.30221.2.5.30"
);
flag_control_type!(
    GetAuthorizationEntry,
    GET_AUTHORIZATION_ENTRY_OID,
    "1.3.6.1.4.1.30221.2.5.6"
);
flag_control_type!(
    GetUserResourceLimits,
    GET_USER_RESOURCE_LIMITS_OID,
    "1.3.6.1.4.1.42.2.27.9.5.16"
);
flag_control_type!(
    AuthorizationIdentity,
    AUTHORIZATION_IDENTITY_OID,
    "2.16.840.1.113730.3.4.16"
);

pub const OPERATION_PURPOSE_OID: &str = "1.3.6.1.4.1.30221.2.5.34";

/// Operation Purpose control. Unlike the other flag controls this one does
/// carry a value (a free-text application name, version, and purpose
/// string), but it is "flag-derived" in the sense that it is attached
/// whenever the corresponding CLI option is present, with no conditional
/// logic keyed off record content.
#[derive(Clone, Debug)]
pub struct OperationPurpose {
    pub application_name: Option<String>,
    pub application_version: Option<String>,
    pub code_location: Option<String>,
    pub purpose: String,
}

impl MakeCritical for OperationPurpose {}

impl From<OperationPurpose> for RawControl {
    fn from(op: OperationPurpose) -> RawControl {
        use super::encoding::{encode_sequence, octet_string};
        let mut inner = Vec::new();
        if let Some(name) = &op.application_name {
            inner.push(octet_string(name.clone().into_bytes()));
        }
        if let Some(version) = &op.application_version {
            inner.push(octet_string(version.clone().into_bytes()));
        }
        if let Some(loc) = &op.code_location {
            inner.push(octet_string(loc.clone().into_bytes()));
        }
        inner.push(octet_string(op.purpose.into_bytes()));
        RawControl {
            ctype: OPERATION_PURPOSE_OID.to_owned(),
            crit: false,
            val: Some(encode_sequence(inner)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_controls_have_no_value() {
        let raw: RawControl = SubtreeDelete.into();
        assert_eq!(raw.ctype, SUBTREE_DELETE_OID);
        assert!(raw.val.is_none());
    }

    #[test]
    fn flag_controls_can_be_made_critical() {
        let raw: RawControl = PermissiveModify.critical().into();
        assert!(raw.crit);
    }

    #[test]
    fn operation_purpose_carries_a_value() {
        let raw: RawControl = OperationPurpose {
            application_name: Some("ldapmodify".into()),
            application_version: None,
            code_location: None,
            purpose: "bulk onboarding".into(),
        }
        .into();
        assert!(raw.val.is_some());
    }
}
