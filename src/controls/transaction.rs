//! Transaction Specification control.
//!
//! Attaches a transaction identifier (obtained from a prior start-transaction
//! extended operation) to a single modifying request, per `spec.md` §4.2 and
//! §4.7.

use ldap3::controls::{MakeCritical, RawControl};

pub const TRANSACTION_SPECIFICATION_OID: &str = "1.3.6.1.1.21.2";

/// The control's value is the bare transaction identifier octet string
/// returned by the start-transaction extended operation; no further ASN.1
/// structure wraps it (RFC 5805 §4).
#[derive(Clone, Debug)]
pub struct TransactionSpecification {
    pub transaction_id: Vec<u8>,
}

impl MakeCritical for TransactionSpecification {}

impl From<TransactionSpecification> for RawControl {
    fn from(t: TransactionSpecification) -> RawControl {
        RawControl {
            ctype: TRANSACTION_SPECIFICATION_OID.to_owned(),
            crit: false,
            val: Some(t.transaction_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_is_bare_transaction_id() {
        let raw: RawControl = TransactionSpecification {
            transaction_id: vec![1, 2, 3],
        }
        .into();
        assert_eq!(raw.ctype, TRANSACTION_SPECIFICATION_OID);
        assert_eq!(raw.val, Some(vec![1, 2, 3]));
        assert!(!raw.crit);
    }
}
