//! Result Model (C1).
//!
//! An immutable value describing a server response, and the closed
//! `ResultCode` enumeration the rest of the engine branches on. Decoding
//! itself is delegated to `ldap3` (the wire codec is out of scope here,
//! per `spec.md` §1); this module only adapts `ldap3::LdapResult` into the
//! shape `spec.md` §3/§4.1 specifies and adds the classification methods
//! the engine needs.

use std::fmt;

use ldap3::controls::RawControl;
use ldap3::LdapResult as WireResult;

/// A closed result-code enumeration with a numeric value and classification
/// helpers, mirroring the "lookup table, not subclassing" guidance of
/// `spec.md` §9.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResultCode(pub i32);

#[allow(non_upper_case_globals)]
impl ResultCode {
    pub const SUCCESS: ResultCode = ResultCode(0);
    pub const OPERATIONS_ERROR: ResultCode = ResultCode(1);
    pub const PROTOCOL_ERROR: ResultCode = ResultCode(2);
    pub const TIME_LIMIT_EXCEEDED: ResultCode = ResultCode(3);
    pub const SIZE_LIMIT_EXCEEDED: ResultCode = ResultCode(4);
    pub const COMPARE_FALSE: ResultCode = ResultCode(5);
    pub const COMPARE_TRUE: ResultCode = ResultCode(6);
    pub const AUTH_METHOD_NOT_SUPPORTED: ResultCode = ResultCode(7);
    pub const STRONGER_AUTH_REQUIRED: ResultCode = ResultCode(8);
    pub const REFERRAL: ResultCode = ResultCode(10);
    pub const ADMIN_LIMIT_EXCEEDED: ResultCode = ResultCode(11);
    pub const UNAVAILABLE_CRITICAL_EXTENSION: ResultCode = ResultCode(12);
    pub const CONFIDENTIALITY_REQUIRED: ResultCode = ResultCode(13);
    pub const SASL_BIND_IN_PROGRESS: ResultCode = ResultCode(14);
    pub const NO_SUCH_ATTRIBUTE: ResultCode = ResultCode(16);
    pub const UNDEFINED_ATTRIBUTE_TYPE: ResultCode = ResultCode(17);
    pub const INAPPROPRIATE_MATCHING: ResultCode = ResultCode(18);
    pub const CONSTRAINT_VIOLATION: ResultCode = ResultCode(19);
    pub const ATTRIBUTE_OR_VALUE_EXISTS: ResultCode = ResultCode(20);
    pub const INVALID_ATTRIBUTE_SYNTAX: ResultCode = ResultCode(21);
    pub const NO_SUCH_OBJECT: ResultCode = ResultCode(32);
    pub const ALIAS_PROBLEM: ResultCode = ResultCode(33);
    pub const INVALID_DN_SYNTAX: ResultCode = ResultCode(34);
    pub const ALIAS_DEREFERENCING_PROBLEM: ResultCode = ResultCode(36);
    pub const INAPPROPRIATE_AUTHENTICATION: ResultCode = ResultCode(48);
    pub const INVALID_CREDENTIALS: ResultCode = ResultCode(49);
    pub const INSUFFICIENT_ACCESS_RIGHTS: ResultCode = ResultCode(50);
    pub const BUSY: ResultCode = ResultCode(51);
    pub const UNAVAILABLE: ResultCode = ResultCode(52);
    pub const UNWILLING_TO_PERFORM: ResultCode = ResultCode(53);
    pub const LOOP_DETECT: ResultCode = ResultCode(54);
    pub const NAMING_VIOLATION: ResultCode = ResultCode(64);
    pub const OBJECT_CLASS_VIOLATION: ResultCode = ResultCode(65);
    pub const NOT_ALLOWED_ON_NONLEAF: ResultCode = ResultCode(66);
    pub const NOT_ALLOWED_ON_RDN: ResultCode = ResultCode(67);
    pub const ENTRY_ALREADY_EXISTS: ResultCode = ResultCode(68);
    pub const OBJECT_CLASS_MODS_PROHIBITED: ResultCode = ResultCode(69);
    pub const AFFECTS_MULTIPLE_DSAS: ResultCode = ResultCode(71);
    pub const ASSERTION_FAILED: ResultCode = ResultCode(122);
    pub const OTHER: ResultCode = ResultCode(80);

    /// Client-side codes, not returned by any server, that this tool uses to
    /// drive its own final-exit-code selection (`spec.md` §3, §7).
    pub const NO_OPERATION: ResultCode = ResultCode(-1);
    pub const LOCAL_ERROR: ResultCode = ResultCode(-2);
    pub const PARAM_ERROR: ResultCode = ResultCode(-3);
    pub const CONTROL_NOT_FOUND: ResultCode = ResultCode(-4);
    pub const DECODING_ERROR: ResultCode = ResultCode(-5);
    pub const CONNECT_ERROR: ResultCode = ResultCode(-6);
    pub const TIMEOUT: ResultCode = ResultCode(-7);

    pub fn is_client_side(self) -> bool {
        self.0 < 0
    }

    /// Whether the connection that produced this result can still be used
    /// for further operations (`spec.md` §9's `isConnectionUsable`).
    pub fn is_connection_usable(self) -> bool {
        !matches!(
            self,
            ResultCode::PROTOCOL_ERROR
                | ResultCode::BUSY
                | ResultCode::UNAVAILABLE
                | ResultCode::LOCAL_ERROR
                | ResultCode::CONNECT_ERROR
                | ResultCode::TIMEOUT
                | ResultCode::DECODING_ERROR
        )
    }

    pub fn is_success(self) -> bool {
        self == ResultCode::SUCCESS || self == ResultCode::NO_OPERATION
    }

    pub fn description(self) -> &'static str {
        match self.0 {
            0 => "success",
            1 => "operationsError",
            2 => "protocolError",
            3 => "timeLimitExceeded",
            4 => "sizeLimitExceeded",
            5 => "compareFalse",
            6 => "compareTrue",
            7 => "authMethodNotSupported",
            8 => "strongerAuthRequired",
            10 => "referral",
            11 => "adminLimitExceeded",
            12 => "unavailableCriticalExtension",
            13 => "confidentialityRequired",
            14 => "saslBindInProgress",
            16 => "noSuchAttribute",
            17 => "undefinedAttributeType",
            18 => "inappropriateMatching",
            19 => "constraintViolation",
            20 => "attributeOrValueExists",
            21 => "invalidAttributeSyntax",
            32 => "noSuchObject",
            33 => "aliasProblem",
            34 => "invalidDNSyntax",
            36 => "aliasDereferencingProblem",
            48 => "inappropriateAuthentication",
            49 => "invalidCredentials",
            50 => "insufficientAccessRights",
            51 => "busy",
            52 => "unavailable",
            53 => "unwillingToPerform",
            54 => "loopDetect",
            64 => "namingViolation",
            65 => "objectClassViolation",
            66 => "notAllowedOnNonLeaf",
            67 => "notAllowedOnRDN",
            68 => "entryAlreadyExists",
            69 => "objectClassModsProhibited",
            71 => "affectsMultipleDSAs",
            80 => "other",
            122 => "assertionFailed",
            -1 => "noOperation",
            -2 => "localError",
            -3 => "paramError",
            -4 => "controlNotFound",
            -5 => "decodingError",
            -6 => "connectError",
            -7 => "timeout",
            _ => "unknown",
        }
    }

    /// Clamp to the 0..255 range an OS exit status accepts (`spec.md` §6, §8 property 6).
    pub fn exit_code(self) -> u8 {
        if self.0 < 0 {
            // Client-side codes still need a concrete process exit status;
            // UnboundID tools reserve small negative-looking codes in the
            // low double digits for this. 1 is the conventional "something
            // went wrong locally" status.
            match self {
                ResultCode::LOCAL_ERROR => 1,
                ResultCode::PARAM_ERROR => 2,
                ResultCode::CONTROL_NOT_FOUND => 3,
                ResultCode::DECODING_ERROR => 4,
                ResultCode::CONNECT_ERROR => 5,
                ResultCode::TIMEOUT => 6,
                ResultCode::NO_OPERATION => 0,
                _ => 1,
            }
        } else {
            self.0.min(255) as u8
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.description())
    }
}

/// Immutable server-response value (`spec.md` §3's `LDAPResult`).
///
/// Empty `matched_dn`/`diagnostic_message` normalize to `None`; referral and
/// control lists normalize to empty (never absent), satisfying the purity
/// property in `spec.md` §8.
#[derive(Clone, Debug)]
pub struct OperationOutcome {
    pub message_id: i64,
    pub result_code: ResultCode,
    pub matched_dn: Option<String>,
    pub diagnostic_message: Option<String>,
    pub referral_urls: Vec<String>,
    pub response_controls: Vec<RawControl>,
}

fn normalize(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

impl OperationOutcome {
    /// Build an outcome from a wire `LdapResult`, assigning it the next
    /// message id from the connection's own counter (the wire codec itself
    /// does not surface message ids through `ldap3`'s high level API).
    pub fn from_wire(message_id: i64, wire: WireResult) -> OperationOutcome {
        OperationOutcome {
            message_id,
            result_code: ResultCode(wire.rc as i32),
            matched_dn: normalize(wire.matched),
            diagnostic_message: normalize(wire.text),
            referral_urls: wire.refs.into_iter().flatten().collect(),
            response_controls: wire.ctrls.into_iter().map(|c| c.1).collect(),
        }
    }

    /// An outcome synthesized locally (no wire round trip happened at all),
    /// used for dry-run reporting and for local/IO failures.
    pub fn synthetic(result_code: ResultCode, diagnostic_message: impl Into<String>) -> OperationOutcome {
        OperationOutcome {
            message_id: -1,
            result_code,
            matched_dn: None,
            diagnostic_message: normalize(diagnostic_message.into()),
            referral_urls: Vec::new(),
            response_controls: Vec::new(),
        }
    }

    pub fn has_response_control(&self, oid: &str) -> bool {
        self.response_controls.iter().any(|c| c.ctype == oid)
    }

    pub fn get_response_control(&self, oid: &str) -> Option<&RawControl> {
        self.response_controls.iter().find(|c| c.ctype == oid)
    }

    /// A one-line diagnostic suitable for the reject sink's result trailer.
    pub fn diagnostic_string(&self) -> String {
        let mut s = format!("result: {}", self.result_code);
        if let Some(dn) = &self.matched_dn {
            s.push_str(&format!(", matchedDN: \"{}\"", dn));
        }
        if let Some(msg) = &self.diagnostic_message {
            s.push_str(&format!(", message: \"{}\"", msg));
        }
        if !self.referral_urls.is_empty() {
            s.push_str(&format!(", referrals: {:?}", self.referral_urls));
        }
        s
    }

    pub fn is_success(&self) -> bool {
        self.result_code.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_wire_strings_normalize_to_absent() {
        let wire = WireResult {
            rc: 0,
            matched: String::new(),
            text: String::new(),
            refs: vec![],
            ctrls: vec![],
        };
        let outcome = OperationOutcome::from_wire(1, wire);
        assert!(outcome.matched_dn.is_none());
        assert!(outcome.diagnostic_message.is_none());
        assert!(outcome.referral_urls.is_empty());
        assert!(outcome.response_controls.is_empty());
    }

    #[test]
    fn roundtrip_preserves_referrals_and_controls() {
        use std::collections::HashSet;
        let mut refs = HashSet::new();
        refs.insert("ldap://other/".to_string());
        let ctrl = RawControl {
            ctype: "1.2.3".into(),
            crit: false,
            val: Some(vec![1, 2, 3]),
        };
        let wire = WireResult {
            rc: 10,
            matched: "dc=example,dc=org".into(),
            text: "go elsewhere".into(),
            refs: vec![refs],
            ctrls: vec![ldap3::controls::Control(None, ctrl.clone())],
        };
        let outcome = OperationOutcome::from_wire(7, wire);
        assert_eq!(outcome.referral_urls, vec!["ldap://other/".to_string()]);
        assert_eq!(outcome.response_controls[0].ctype, ctrl.ctype);
        assert_eq!(outcome.response_controls[0].val, ctrl.val);
    }

    #[test]
    fn exit_code_clamped_to_byte_range() {
        assert_eq!(ResultCode::SUCCESS.exit_code(), 0);
        assert_eq!(ResultCode(300).exit_code(), 255);
        assert_eq!(ResultCode::ASSERTION_FAILED.exit_code(), 122);
    }

    #[test]
    fn connection_usability_classification() {
        assert!(ResultCode::SUCCESS.is_connection_usable());
        assert!(ResultCode::NO_SUCH_OBJECT.is_connection_usable());
        assert!(!ResultCode::BUSY.is_connection_usable());
        assert!(!ResultCode::LOCAL_ERROR.is_connection_usable());
    }
}
