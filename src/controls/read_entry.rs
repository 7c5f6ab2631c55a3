//! Pre-/post-read control construction.
//!
//! `ldap3::controls::{PreRead, PostRead}` already implement the RFC 4527
//! encoding; this module only supplies the comma/whitespace attribute-list
//! tokenizing `spec.md` §4.2 asks for before handing the list to them.

use ldap3::controls::{MakeCritical, PostRead, PreRead, RawControl};

use super::tokenize_attr_list;

pub fn pre_read(attr_list: &str, critical: bool) -> RawControl {
    let attrs = tokenize_attr_list(attr_list);
    let ctrl = PreRead { attrs };
    if critical {
        ctrl.critical().into()
    } else {
        ctrl.into()
    }
}

pub fn post_read(attr_list: &str, critical: bool) -> RawControl {
    let attrs = tokenize_attr_list(attr_list);
    let ctrl = PostRead { attrs };
    if critical {
        ctrl.critical().into()
    } else {
        ctrl.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_noncritical_by_default() {
        let raw = pre_read("cn,sn", false);
        assert!(!raw.crit);
    }

    #[test]
    fn builds_critical_when_requested() {
        let raw = post_read("cn, sn", true);
        assert!(raw.crit);
    }
}
