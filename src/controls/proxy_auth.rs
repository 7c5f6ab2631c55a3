//! Proxied Authorization v1 (legacy, DN-based) control.
//!
//! `ldap3::controls::ProxyAuth` already implements v2 (authzID-based,
//! RFC 4370); this module adds the older DN-based v1 form in the same
//! style, since the two are mutually exclusive per `spec.md` §4.2 and a
//! caller may still need the legacy one against older servers.

use ldap3::controls::RawControl;

pub const PROXY_AUTH_V1_OID: &str = "2.16.840.1.113730.3.4.12";

/// This control only has a request form and must always be critical,
/// mirroring `ldap3::controls::ProxyAuth`'s own documented rationale for
/// not implementing `MakeCritical`.
#[derive(Clone, Debug)]
pub struct ProxyAuthV1 {
    pub proxy_dn: String,
}

impl From<ProxyAuthV1> for RawControl {
    fn from(pa: ProxyAuthV1) -> RawControl {
        RawControl {
            ctype: PROXY_AUTH_V1_OID.to_owned(),
            crit: true,
            val: Some(pa.proxy_dn.into_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_critical() {
        let raw: RawControl = ProxyAuthV1 {
            proxy_dn: "uid=admin,dc=example,dc=com".into(),
        }
        .into();
        assert!(raw.crit);
        assert_eq!(raw.val.unwrap(), b"uid=admin,dc=example,dc=com");
    }
}
