//! Request Composer (C6).
//!
//! Builds a complete per-record request: the data to send, plus its control
//! list in insertion order — global per-operation-type controls, then
//! global cross-operation controls, then record-derived conditional
//! controls (`spec.md` §4.6, attachment table in §4.2).

use std::collections::HashSet;

use ldap3::controls::{MakeCritical, RawControl};
use ldap3::Mod;

use crate::controls::{
    tokenize_attr_list, AssuredReplication, AuthorizationIdentity, GetAuthorizationEntry,
    GetUserResourceLimits, HardDelete, IgnoreNoUserModification, ManageDsaIt, NameWithEntryUuid, NoOp,
    OperationPurpose, PasswordPolicyRequest, PasswordValidationDetails, PermissiveModify, ProxyAuthV1,
    ReplicationRepair, RetireOrPurgeKind, RetireOrPurgePassword, SoftDelete, SubtreeDelete,
    SuppressOperationalAttributeUpdates, SuppressedOperation, SuppressReferentialIntegrityUpdates,
    Undelete,
};
use crate::ldif::{ChangeRecord, ModOp, Modification, RecordControl};

/// Proxied-authorization choice; v1 (DN-based) and v2 (authzID-based) are
/// mutually exclusive (`spec.md` §4.2).
#[derive(Clone, Debug)]
pub enum ProxiedAuth {
    V1 { proxy_dn: String },
    V2 { authz_id: String },
}

/// One field per `spec.md` §4.2 control family, lowered from the CLI
/// (`SPEC_FULL.md` §4's `ControlOpts`).
#[derive(Clone, Debug, Default)]
pub struct ControlOptions {
    pub assertion_filter: Option<String>,
    pub proxied_auth: Option<ProxiedAuth>,
    pub pre_read_attrs: Option<String>,
    pub post_read_attrs: Option<String>,
    pub assured_replication: Option<AssuredReplication>,
    pub suppress_operational_attrs: Vec<SuppressedOperation>,
    pub no_op: bool,
    pub manage_dsa_it: bool,
    pub permissive_modify: bool,
    pub subtree_delete: bool,
    pub hard_delete: bool,
    pub soft_delete: bool,
    pub suppress_referential_integrity_updates: bool,
    pub ignore_no_user_modification: bool,
    pub name_with_entry_uuid: bool,
    pub replication_repair: bool,
    pub operation_purpose: Option<String>,
    pub get_authorization_entry: bool,
    pub get_user_resource_limits: bool,
    pub authorization_identity: bool,
    pub password_policy: bool,
    pub password_validation_details: bool,
    pub retire_password: bool,
    pub purge_password: bool,
}

fn password_attribute(name: &str) -> bool {
    name.eq_ignore_ascii_case("userPassword") || name.eq_ignore_ascii_case("authPassword")
}

fn modification_touches_password(mods: &[Modification]) -> bool {
    mods.iter().any(|m| password_attribute(&m.attribute))
}

fn entry_has_attribute(attrs: &[(String, Vec<String>)], name: &str) -> bool {
    attrs.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
}

impl ControlOptions {
    /// Cross-operation controls present on every operation kind
    /// (`spec.md` §4.2's final row), except that proxied authorization is
    /// suppressed on inner operations while a transaction or multi-update
    /// is active (`in_grouping`).
    fn cross_operation(&self, in_grouping: bool) -> Vec<RawControl> {
        let mut out = Vec::new();
        if self.no_op {
            out.push(NoOp.into());
        }
        if self.replication_repair {
            out.push(ReplicationRepair.into());
        }
        if let Some(ar) = self.assured_replication {
            out.push(ar.into());
        }
        if let Some(filter) = &self.assertion_filter {
            out.push(assertion_control(filter));
        }
        if let Some(purpose) = &self.operation_purpose {
            out.push(
                OperationPurpose {
                    application_name: Some("ldapmodify".to_owned()),
                    application_version: None,
                    code_location: None,
                    purpose: purpose.clone(),
                }
                .into(),
            );
        }
        if self.manage_dsa_it {
            out.push(ManageDsaIt.into());
        }
        if !self.suppress_operational_attrs.is_empty() {
            out.push(
                SuppressOperationalAttributeUpdates {
                    suppressed: self.suppress_operational_attrs.clone(),
                }
                .into(),
            );
        }
        if self.get_authorization_entry {
            out.push(GetAuthorizationEntry.into());
        }
        if self.get_user_resource_limits {
            out.push(GetUserResourceLimits.into());
        }
        if self.authorization_identity {
            out.push(AuthorizationIdentity.into());
        }
        if !in_grouping {
            if let Some(pa) = &self.proxied_auth {
                out.push(proxied_auth_control(pa));
            }
        }
        out
    }
}

fn record_control(c: &RecordControl) -> RawControl {
    RawControl {
        ctype: c.oid.clone(),
        crit: c.critical,
        val: c.value.clone(),
    }
}

fn assertion_control(filter: &str) -> RawControl {
    ldap3::controls::Assertion {
        filter: filter.to_owned(),
    }
    .critical()
    .into()
}

/// Builds the configured proxied-authorization control, if any — used both
/// for inner per-record requests (outside grouping) and for the outer
/// start-transaction/multi-update request a `GroupingCoordinator` sends
/// (`spec.md` §4.2, §4.7, §8 property 5: the outer request carries it even
/// though inner ones don't).
pub fn proxied_auth_controls(opts: &ControlOptions) -> Vec<RawControl> {
    opts.proxied_auth.as_ref().map(proxied_auth_control).into_iter().collect()
}

fn proxied_auth_control(pa: &ProxiedAuth) -> RawControl {
    match pa {
        ProxiedAuth::V1 { proxy_dn } => ProxyAuthV1 {
            proxy_dn: proxy_dn.clone(),
        }
        .into(),
        ProxiedAuth::V2 { authz_id } => ldap3::controls::ProxyAuth {
            authzid: authz_id.clone(),
        }
        .into(),
    }
}

/// A fully-built request, ready to attach grouping controls (transaction
/// specification / none) and dispatch.
#[derive(Clone, Debug)]
pub enum ComposedRequest {
    Add {
        dn: String,
        attributes: Vec<(String, HashSet<String>)>,
        controls: Vec<RawControl>,
    },
    Delete {
        dn: String,
        controls: Vec<RawControl>,
    },
    Modify {
        dn: String,
        mods: Vec<Mod<String>>,
        controls: Vec<RawControl>,
    },
    ModifyDn {
        dn: String,
        new_rdn: String,
        delete_old_rdn: bool,
        new_superior: Option<String>,
        controls: Vec<RawControl>,
    },
}

impl ComposedRequest {
    pub fn dn(&self) -> &str {
        match self {
            ComposedRequest::Add { dn, .. }
            | ComposedRequest::Delete { dn, .. }
            | ComposedRequest::Modify { dn, .. }
            | ComposedRequest::ModifyDn { dn, .. } => dn,
        }
    }

    pub fn controls_mut(&mut self) -> &mut Vec<RawControl> {
        match self {
            ComposedRequest::Add { controls, .. }
            | ComposedRequest::Delete { controls, .. }
            | ComposedRequest::Modify { controls, .. }
            | ComposedRequest::ModifyDn { controls, .. } => controls,
        }
    }
}

pub struct RequestComposer<'a> {
    opts: &'a ControlOptions,
}

impl<'a> RequestComposer<'a> {
    pub fn new(opts: &'a ControlOptions) -> RequestComposer<'a> {
        RequestComposer { opts }
    }

    /// Builds the request for `record`. `override_dn` substitutes the
    /// target DN (used by `--modifyEntryWithDN`/`--modifyEntriesWithDNsFromFile`
    /// and by the paged-search bulk-modify path) while preserving the
    /// record's modifications and record-level controls (`spec.md` §4.6).
    /// `in_grouping` is true while a transaction or multi-update is active,
    /// which suppresses proxied-authorization on this (inner) request.
    pub fn compose(
        &self,
        record: &ChangeRecord,
        override_dn: Option<&str>,
        in_grouping: bool,
    ) -> ComposedRequest {
        let dn = override_dn.unwrap_or_else(|| record.dn()).to_owned();
        let mut controls = Vec::new();

        match record {
            ChangeRecord::Add { attributes, .. } => {
                if self.opts.ignore_no_user_modification {
                    controls.push(IgnoreNoUserModification.into());
                }
                if self.opts.name_with_entry_uuid {
                    controls.push(NameWithEntryUuid.into());
                }
                if let Some(attrs) = &self.opts.post_read_attrs {
                    controls.push(crate::controls::read_entry::post_read(attrs, false));
                }
                if self.opts.password_policy
                    && (entry_has_attribute(attributes, "userPassword")
                        || entry_has_attribute(attributes, "authPassword"))
                {
                    controls.push(PasswordPolicyRequest.into());
                }
                if entry_has_attribute(attributes, "ds-undelete-from-dn") {
                    controls.push(Undelete.critical().into());
                }
                controls.extend(self.opts.cross_operation(in_grouping));
                controls.extend(record.controls().iter().map(record_control));
                let attrs = attributes
                    .iter()
                    .map(|(name, values)| (name.clone(), values.iter().cloned().collect::<HashSet<_>>()))
                    .collect();
                ComposedRequest::Add {
                    dn,
                    attributes: attrs,
                    controls,
                }
            }
            ChangeRecord::Delete { .. } => {
                if self.opts.subtree_delete {
                    controls.push(SubtreeDelete.into());
                }
                if self.opts.hard_delete {
                    controls.push(HardDelete.into());
                }
                if self.opts.soft_delete {
                    controls.push(SoftDelete.into());
                }
                if self.opts.suppress_referential_integrity_updates {
                    controls.push(SuppressReferentialIntegrityUpdates.into());
                }
                if let Some(attrs) = &self.opts.pre_read_attrs {
                    controls.push(crate::controls::read_entry::pre_read(attrs, false));
                }
                controls.extend(self.opts.cross_operation(in_grouping));
                controls.extend(record.controls().iter().map(record_control));
                ComposedRequest::Delete { dn, controls }
            }
            ChangeRecord::Modify { modifications, .. } => {
                if self.opts.permissive_modify {
                    controls.push(PermissiveModify.into());
                }
                if let Some(attrs) = &self.opts.pre_read_attrs {
                    controls.push(crate::controls::read_entry::pre_read(attrs, false));
                }
                if let Some(attrs) = &self.opts.post_read_attrs {
                    controls.push(crate::controls::read_entry::post_read(attrs, false));
                }
                if modification_touches_password(modifications) {
                    if self.opts.password_policy {
                        controls.push(PasswordPolicyRequest.into());
                    }
                    if self.opts.password_validation_details {
                        controls.push(PasswordValidationDetails.into());
                    }
                    if self.opts.retire_password {
                        controls.push(
                            RetireOrPurgePassword {
                                kind: RetireOrPurgeKind::Retire,
                            }
                            .into(),
                        );
                    }
                    if self.opts.purge_password {
                        controls.push(
                            RetireOrPurgePassword {
                                kind: RetireOrPurgeKind::Purge,
                            }
                            .into(),
                        );
                    }
                }
                controls.extend(self.opts.cross_operation(in_grouping));
                controls.extend(record.controls().iter().map(record_control));
                let mods = modifications
                    .iter()
                    .map(|m| {
                        let values: HashSet<String> = m.values.iter().cloned().collect();
                        match m.op {
                            ModOp::Add => Mod::Add(m.attribute.clone(), values),
                            ModOp::Delete => Mod::Delete(m.attribute.clone(), values),
                            ModOp::Replace => Mod::Replace(m.attribute.clone(), values),
                            // ldap3's `Mod` has no increment variant (not yet common);
                            // an increment is semantically a single-valued replace of
                            // the delta, which the server interprets per its own
                            // increment extension if it supports one.
                            ModOp::Increment => Mod::Replace(m.attribute.clone(), values),
                        }
                    })
                    .collect();
                ComposedRequest::Modify { dn, mods, controls }
            }
            ChangeRecord::ModifyDn {
                new_rdn,
                delete_old_rdn,
                new_superior,
                ..
            } => {
                if self.opts.suppress_referential_integrity_updates {
                    controls.push(SuppressReferentialIntegrityUpdates.into());
                }
                if let Some(attrs) = &self.opts.pre_read_attrs {
                    controls.push(crate::controls::read_entry::pre_read(attrs, false));
                }
                if let Some(attrs) = &self.opts.post_read_attrs {
                    controls.push(crate::controls::read_entry::post_read(attrs, false));
                }
                controls.extend(self.opts.cross_operation(in_grouping));
                controls.extend(record.controls().iter().map(record_control));
                ComposedRequest::ModifyDn {
                    dn,
                    new_rdn: new_rdn.clone(),
                    delete_old_rdn: *delete_old_rdn,
                    new_superior: new_superior.clone(),
                    controls,
                }
            }
        }
    }

    /// The controls attached to a paged search issued by the bulk-modify
    /// path (`spec.md` §4.5): just the cross-operation set (only
    /// proxied-auth of those is meaningful for a search) plus the simple
    /// paged results control, added by the driver itself.
    pub fn search_controls(&self, in_grouping: bool) -> Vec<RawControl> {
        self.opts.cross_operation(in_grouping)
    }
}

// tokenize_attr_list is re-exported for callers building pre/post-read
// attribute lists outside of compose() (e.g. CLI validation).
pub use tokenize_attr_list as tokenize_read_attrs;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldif::RecordControl;

    fn add_record(attrs: Vec<(&str, Vec<&str>)>) -> ChangeRecord {
        ChangeRecord::Add {
            dn: "uid=a,dc=x".into(),
            attributes: attrs
                .into_iter()
                .map(|(n, v)| (n.to_owned(), v.into_iter().map(|s| s.to_owned()).collect()))
                .collect(),
            controls: vec![],
        }
    }

    #[test]
    fn password_policy_only_attaches_when_password_present() {
        let mut opts = ControlOptions::default();
        opts.password_policy = true;
        let composer = RequestComposer::new(&opts);
        let with_pw = ChangeRecord::Modify {
            dn: "uid=a,dc=x".into(),
            modifications: vec![Modification {
                op: ModOp::Replace,
                attribute: "userPassword".into(),
                values: vec!["secret".into()],
            }],
            controls: vec![],
        };
        let without_pw = ChangeRecord::Modify {
            dn: "uid=a,dc=x".into(),
            modifications: vec![Modification {
                op: ModOp::Replace,
                attribute: "cn".into(),
                values: vec!["A".into()],
            }],
            controls: vec![],
        };
        let req = composer.compose(&with_pw, None, false);
        assert!(matches!(req, ComposedRequest::Modify { ref controls, .. } if controls.iter().any(|c| c.ctype == crate::controls::password_policy::PASSWORD_POLICY_REQUEST_OID)));
        let req = composer.compose(&without_pw, None, false);
        assert!(matches!(req, ComposedRequest::Modify { ref controls, .. } if !controls.iter().any(|c| c.ctype == crate::controls::password_policy::PASSWORD_POLICY_REQUEST_OID)));
    }

    #[test]
    fn password_policy_on_add_triggers_on_auth_password_too() {
        let mut opts = ControlOptions::default();
        opts.password_policy = true;
        let composer = RequestComposer::new(&opts);
        let record = add_record(vec![("authPassword", vec!["secret"])]);
        let req = composer.compose(&record, None, false);
        assert!(matches!(req, ComposedRequest::Add { ref controls, .. }
            if controls.iter().any(|c| c.ctype == crate::controls::password_policy::PASSWORD_POLICY_REQUEST_OID)));
    }

    #[test]
    fn assertion_control_encodes_filter_as_ber_not_raw_text() {
        let mut opts = ControlOptions::default();
        opts.assertion_filter = Some("(objectClass=*)".to_owned());
        let composer = RequestComposer::new(&opts);
        let record = ChangeRecord::Delete {
            dn: "uid=a,dc=x".into(),
            controls: vec![],
        };
        let req = composer.compose(&record, None, false);
        if let ComposedRequest::Delete { controls, .. } = req {
            let assertion = controls.iter().find(|c| c.ctype == "1.3.6.1.1.12").expect("assertion control present");
            assert!(assertion.crit);
            let val = assertion.val.as_ref().expect("assertion control carries a value");
            assert_ne!(val.as_slice(), b"(objectClass=*)".as_slice());
        } else {
            panic!("expected Delete");
        }
    }

    #[test]
    fn proxied_auth_omitted_inside_grouping() {
        let mut opts = ControlOptions::default();
        opts.proxied_auth = Some(ProxiedAuth::V2 {
            authz_id: "dn:uid=admin,dc=x".into(),
        });
        let composer = RequestComposer::new(&opts);
        let record = ChangeRecord::Delete {
            dn: "uid=a,dc=x".into(),
            controls: vec![],
        };
        const PROXY_AUTH_V2_OID: &str = "2.16.840.1.113730.3.4.18";
        let outside = composer.compose(&record, None, false);
        let inside = composer.compose(&record, None, true);
        assert!(matches!(outside, ComposedRequest::Delete { ref controls, .. } if controls.iter().any(|c| c.ctype == PROXY_AUTH_V2_OID)));
        assert!(matches!(inside, ComposedRequest::Delete { ref controls, .. } if !controls.iter().any(|c| c.ctype == PROXY_AUTH_V2_OID)));
    }

    #[test]
    fn override_dn_preserves_modifications() {
        let opts = ControlOptions::default();
        let composer = RequestComposer::new(&opts);
        let record = ChangeRecord::Modify {
            dn: "uid=a,dc=x".into(),
            modifications: vec![Modification {
                op: ModOp::Add,
                attribute: "mail".into(),
                values: vec!["a@x.com".into()],
            }],
            controls: vec![RecordControl {
                oid: "1.2.3".into(),
                critical: false,
                value: None,
            }],
        };
        let req = composer.compose(&record, Some("uid=found,dc=x"), false);
        assert_eq!(req.dn(), "uid=found,dc=x");
        if let ComposedRequest::Modify { mods, .. } = req {
            assert_eq!(mods.len(), 1);
        } else {
            panic!("expected Modify");
        }
    }

    #[test]
    fn record_level_control_lines_are_attached() {
        let opts = ControlOptions::default();
        let composer = RequestComposer::new(&opts);
        let record = ChangeRecord::Delete {
            dn: "uid=a,dc=x".into(),
            controls: vec![RecordControl {
                oid: "1.2.840.113556.1.4.805".into(),
                critical: true,
                value: None,
            }],
        };
        let req = composer.compose(&record, None, false);
        assert!(matches!(req, ComposedRequest::Delete { ref controls, .. }
            if controls.iter().any(|c| c.ctype == "1.2.840.113556.1.4.805" && c.crit)));
    }

    #[test]
    fn undelete_control_from_entry_attribute() {
        let opts = ControlOptions::default();
        let composer = RequestComposer::new(&opts);
        let record = add_record(vec![("ds-undelete-from-dn", vec!["uid=old,dc=x"])]);
        let req = composer.compose(&record, None, false);
        assert!(matches!(req, ComposedRequest::Add { ref controls, .. } if controls.iter().any(|c| c.ctype == crate::controls::undelete::UNDELETE_OID)));
    }
}
