//! Password-policy-adjacent controls, conditionally attached to `modify`
//! (and `add`, for the policy request) operations whose target attribute is
//! `userPassword` or `authPassword` (`spec.md` §4.2).

use ldap3::controls::{MakeCritical, RawControl};

use super::flag_control;

pub const PASSWORD_POLICY_REQUEST_OID: &str = "1.3.6.1.4.1.42.2.27.8.5.1";
pub const PASSWORD_VALIDATION_DETAILS_OID: &str = "1.3.6.1.4.1.30221.2.5.40";
pub const RETIRE_PASSWORD_OID: &str = "1.3.6.1.4.1.30221.2.5.8";
pub const PURGE_PASSWORD_OID: &str = "1.3.6.1.4.1.30221.2.5.9";

/// Password Policy request control. Flag-only; the server's response
/// control carries the policy warning/error state.
#[derive(Clone, Copy, Debug)]
pub struct PasswordPolicyRequest;

impl MakeCritical for PasswordPolicyRequest {}

impl From<PasswordPolicyRequest> for RawControl {
    fn from(_: PasswordPolicyRequest) -> RawControl {
        flag_control(PASSWORD_POLICY_REQUEST_OID, false)
    }
}

/// Password Validation Details request control. Flag-only; asks the server
/// to report which password-quality requirements a new password did or
/// didn't satisfy.
#[derive(Clone, Copy, Debug)]
pub struct PasswordValidationDetails;

impl MakeCritical for PasswordValidationDetails {}

impl From<PasswordValidationDetails> for RawControl {
    fn from(_: PasswordValidationDetails) -> RawControl {
        flag_control(PASSWORD_VALIDATION_DETAILS_OID, false)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetireOrPurgeKind {
    Retire,
    Purge,
}

/// Retire/Purge Password controls. Two distinct flag controls in the real
/// protocol (not one control with a choice), selected by `kind`.
#[derive(Clone, Copy, Debug)]
pub struct RetireOrPurgePassword {
    pub kind: RetireOrPurgeKind,
}

impl MakeCritical for RetireOrPurgePassword {}

impl From<RetireOrPurgePassword> for RawControl {
    fn from(r: RetireOrPurgePassword) -> RawControl {
        let oid = match r.kind {
            RetireOrPurgeKind::Retire => RETIRE_PASSWORD_OID,
            RetireOrPurgeKind::Purge => PURGE_PASSWORD_OID,
        };
        flag_control(oid, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retire_and_purge_use_distinct_oids() {
        let retire: RawControl = RetireOrPurgePassword {
            kind: RetireOrPurgeKind::Retire,
        }
        .into();
        let purge: RawControl = RetireOrPurgePassword {
            kind: RetireOrPurgeKind::Purge,
        }
        .into();
        assert_eq!(retire.ctype, RETIRE_PASSWORD_OID);
        assert_eq!(purge.ctype, PURGE_PASSWORD_OID);
        assert_ne!(retire.ctype, purge.ctype);
    }
}
