//! Undelete request control.
//!
//! Attached to an `add` request when the input entry carries the
//! `ds-undelete-from-dn` attribute (`spec.md` §4.2); the source DN to
//! undelete from travels in that attribute's value, not in the control
//! itself, so the control is a plain critical flag.

use ldap3::controls::{MakeCritical, RawControl};

use super::flag_control;

pub const UNDELETE_OID: &str = "1.3.6.1.4.1.30221.2.5.20";

#[derive(Clone, Copy, Debug)]
pub struct Undelete;

impl MakeCritical for Undelete {}

impl From<Undelete> for RawControl {
    fn from(_: Undelete) -> RawControl {
        flag_control(UNDELETE_OID, true)
    }
}
