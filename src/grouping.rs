//! Grouping Coordinator (C7).
//!
//! Exactly one of three modes is active for a whole engine run: immediate
//! dispatch, a server-side transaction, or a buffered multi-update
//! (`spec.md` §4.7). This module owns the transaction identifier / commit
//! flag and the multi-update buffer, and decides what an inner per-record
//! request actually does: go straight to the wire, go to the wire wrapped in
//! a transaction-specification control, or get appended to a list for one
//! extended request sent after the loop.

use ldap3::controls::RawControl;
use log::info;

use crate::composer::{proxied_auth_controls, ComposedRequest, ControlOptions};
use crate::connection::ConnectionPool;
use crate::controls::encoding::{boolean, encode_sequence, enumerated, octet_string, sequence};
use crate::controls::TransactionSpecification;
use crate::error::Result;
use crate::result_model::OperationOutcome;

pub const START_TRANSACTION_OID: &str = "1.3.6.1.1.21.1";
pub const END_TRANSACTION_OID: &str = "1.3.6.1.1.21.3";
pub const MULTI_UPDATE_OID: &str = "1.3.6.1.4.1.30221.2.6.17";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MultiUpdateErrorBehavior {
    Atomic,
    AbortOnError,
    ContinueOnError,
}

impl MultiUpdateErrorBehavior {
    fn enumerated_value(self) -> i64 {
        match self {
            MultiUpdateErrorBehavior::Atomic => 0,
            MultiUpdateErrorBehavior::AbortOnError => 1,
            MultiUpdateErrorBehavior::ContinueOnError => 2,
        }
    }
}

/// Which of the three mutually exclusive modes (`spec.md` §4.7) a run uses.
#[derive(Clone, Debug)]
pub enum GroupingOpts {
    Immediate,
    Transaction,
    MultiUpdate(MultiUpdateErrorBehavior),
}

struct TransactionState {
    transaction_id: Vec<u8>,
    commit: bool,
}

struct MultiUpdateState {
    behavior: MultiUpdateErrorBehavior,
    buffered: Vec<ComposedRequest>,
}

enum Mode {
    Immediate,
    Transaction(TransactionState),
    MultiUpdate(MultiUpdateState),
}

pub struct GroupingCoordinator {
    mode: Mode,
    /// Proxied authorization, attached to the outer start-transaction /
    /// multi-update request only — inner requests have it suppressed by
    /// the Request Composer while grouping is active (`spec.md` §4.2, §4.7,
    /// §8 property 5).
    outer_controls: Vec<RawControl>,
}

impl GroupingCoordinator {
    pub fn new(opts: GroupingOpts, control_opts: &ControlOptions) -> GroupingCoordinator {
        let mode = match opts {
            GroupingOpts::Immediate => Mode::Immediate,
            GroupingOpts::Transaction => Mode::Transaction(TransactionState {
                transaction_id: Vec::new(),
                commit: true,
            }),
            GroupingOpts::MultiUpdate(behavior) => Mode::MultiUpdate(MultiUpdateState {
                behavior,
                buffered: Vec::new(),
            }),
        };
        GroupingCoordinator {
            mode,
            outer_controls: proxied_auth_controls(control_opts),
        }
    }

    /// True while a transaction or multi-update is in effect — the signal
    /// the Request Composer and control-attachment policy use to suppress
    /// proxied authorization on inner operations (`spec.md` §4.2, §4.7, §8
    /// property 5).
    pub fn is_grouping_active(&self) -> bool {
        !matches!(self.mode, Mode::Immediate)
    }

    /// Sends the start-transaction extended request, if transactional.
    /// Returns `Some(outcome)` only when that start failed, so the caller
    /// can abort the whole run before the change loop begins.
    pub async fn start(&mut self, pool: &mut ConnectionPool) -> Result<Option<OperationOutcome>> {
        if let Mode::Transaction(state) = &mut self.mode {
            let (exop, wire) = pool
                .extended(START_TRANSACTION_OID.to_owned(), None, self.outer_controls.clone())
                .await?;
            let outcome = OperationOutcome::from_wire(-1, wire);
            if !outcome.is_success() {
                return Ok(Some(outcome));
            }
            state.transaction_id = exop.val.unwrap_or_default();
            info!("started transaction");
        }
        Ok(None)
    }

    /// Dispatches (transaction/immediate) or buffers (multi-update) one
    /// composed request. The caller is responsible for deciding, from the
    /// returned outcome, whether the run continues (`spec.md` §4.8 step 5);
    /// a buffered request always reports a synthetic success since nothing
    /// was actually sent yet.
    pub async fn dispatch(&mut self, pool: &mut ConnectionPool, mut req: ComposedRequest) -> Result<OperationOutcome> {
        match &mut self.mode {
            Mode::Immediate => send(pool, req).await,
            Mode::Transaction(state) => {
                req.controls_mut().insert(
                    0,
                    TransactionSpecification {
                        transaction_id: state.transaction_id.clone(),
                    }
                    .into(),
                );
                let outcome = send(pool, req).await?;
                if !outcome.is_success() {
                    state.commit = false;
                }
                Ok(outcome)
            }
            Mode::MultiUpdate(state) => {
                state.buffered.push(req);
                Ok(OperationOutcome::synthetic(
                    crate::result_model::ResultCode::NO_OPERATION,
                    "buffered for multi-update",
                ))
            }
        }
    }

    /// Marks the transaction for abort regardless of the per-operation
    /// results seen so far — used when the engine breaks the loop for a
    /// reason that never produced a server result (a local I/O failure, an
    /// unparsable record it couldn't continue past).
    pub fn force_abort(&mut self) {
        if let Mode::Transaction(state) = &mut self.mode {
            state.commit = false;
        }
    }

    /// Finalizes grouping after the change loop: commits/aborts the
    /// transaction, or sends the one buffered multi-update request.
    /// `had_fatal_failure` additionally forces an abort (it covers cases —
    /// like a read failure — that never reached `dispatch`).
    pub async fn finish(
        mut self,
        pool: &mut ConnectionPool,
        had_fatal_failure: bool,
    ) -> Result<Option<OperationOutcome>> {
        if had_fatal_failure {
            self.force_abort();
        }
        match self.mode {
            Mode::Immediate => Ok(None),
            Mode::Transaction(state) => {
                // Proxied authorization attaches only to start-transaction, not
                // end-transaction (`spec.md` §8 property 5, §4.7).
                let value = encode_end_transaction(state.commit, &state.transaction_id);
                let (_exop, wire) = pool
                    .extended(END_TRANSACTION_OID.to_owned(), Some(value), Vec::new())
                    .await?;
                info!("ended transaction, commit={}", state.commit);
                Ok(Some(OperationOutcome::from_wire(-1, wire)))
            }
            Mode::MultiUpdate(state) => {
                let value = encode_multi_update(state.behavior, &state.buffered);
                info!("sending multi-update request with {} buffered operations", state.buffered.len());
                let (_exop, wire) = pool
                    .extended(MULTI_UPDATE_OID.to_owned(), Some(value), self.outer_controls.clone())
                    .await?;
                Ok(Some(OperationOutcome::from_wire(-1, wire)))
            }
        }
    }
}

async fn send(pool: &mut ConnectionPool, req: ComposedRequest) -> Result<OperationOutcome> {
    match req {
        ComposedRequest::Add { dn, attributes, controls } => pool.add(&dn, attributes, controls).await,
        ComposedRequest::Delete { dn, controls } => pool.delete(&dn, controls).await,
        ComposedRequest::Modify { dn, mods, controls } => pool.modify(&dn, mods, controls).await,
        ComposedRequest::ModifyDn {
            dn,
            new_rdn,
            delete_old_rdn,
            new_superior,
            controls,
        } => pool.modify_dn(&dn, &new_rdn, delete_old_rdn, new_superior.as_deref(), controls).await,
    }
}

/// RFC 5805 §4's end-transaction request value: `SEQUENCE { commit BOOLEAN
/// DEFAULT TRUE, identifier OCTET STRING }`. The boolean is always encoded
/// explicitly here rather than omitted when true, which is non-canonical
/// DER but accepted by any BER-tolerant decoder.
fn encode_end_transaction(commit: bool, transaction_id: &[u8]) -> Vec<u8> {
    encode_sequence(vec![boolean(commit), octet_string(transaction_id.to_vec())])
}

/// This tool's own framing for the buffered requests inside a multi-update
/// extended request: `SEQUENCE { errorBehavior ENUMERATED, requests
/// SEQUENCE OF SEQUENCE { opType ENUMERATED, dn OCTET STRING, payload
/// OCTET STRING } }`, `payload` being an LDIF-change-style rendering of the
/// operation's attributes/modifications. The wire codec and its embedded
/// per-operation encoding are `spec.md` §1's out-of-scope collaborator; this
/// is a self-consistent stand-in for it rather than a byte-for-byte replica
/// of any particular server's multi-update framing.
fn encode_multi_update(behavior: MultiUpdateErrorBehavior, buffered: &[ComposedRequest]) -> Vec<u8> {
    let requests = buffered
        .iter()
        .map(|req| {
            let (op_type, dn, payload) = match req {
                ComposedRequest::Add { dn, attributes, .. } => {
                    let mut lines = Vec::new();
                    for (name, values) in attributes {
                        for v in values {
                            lines.push(format!("{}: {}", name, v));
                        }
                    }
                    (0, dn.clone(), lines.join("\n"))
                }
                ComposedRequest::Delete { dn, .. } => (1, dn.clone(), String::new()),
                ComposedRequest::Modify { dn, mods, .. } => {
                    let lines: Vec<String> = mods.iter().map(render_mod).collect();
                    (2, dn.clone(), lines.join("\n"))
                }
                ComposedRequest::ModifyDn {
                    dn,
                    new_rdn,
                    delete_old_rdn,
                    new_superior,
                    ..
                } => {
                    let mut lines = vec![
                        format!("newrdn: {}", new_rdn),
                        format!("deleteoldrdn: {}", if *delete_old_rdn { 1 } else { 0 }),
                    ];
                    if let Some(sup) = new_superior {
                        lines.push(format!("newsuperior: {}", sup));
                    }
                    (3, dn.clone(), lines.join("\n"))
                }
            };
            sequence(vec![enumerated(op_type), octet_string(dn.into_bytes()), octet_string(payload.into_bytes())])
        })
        .collect();
    encode_sequence(vec![enumerated(behavior.enumerated_value()), sequence(requests)])
}

fn render_mod(m: &ldap3::Mod<String>) -> String {
    fn join(values: &std::collections::HashSet<String>) -> String {
        values.iter().cloned().collect::<Vec<_>>().join(",")
    }
    match m {
        ldap3::Mod::Add(name, values) => format!("add: {} = {}", name, join(values)),
        ldap3::Mod::Delete(name, values) => format!("delete: {} = {}", name, join(values)),
        ldap3::Mod::Replace(name, values) => format!("replace: {} = {}", name, join(values)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn add_req(dn: &str) -> ComposedRequest {
        let mut attrs = HashSet::new();
        attrs.insert("top".to_owned());
        ComposedRequest::Add {
            dn: dn.to_owned(),
            attributes: vec![("objectClass".to_owned(), attrs)],
            controls: Vec::new(),
        }
    }

    #[test]
    fn immediate_mode_is_not_grouping() {
        let coord = GroupingCoordinator::new(GroupingOpts::Immediate, &ControlOptions::default());
        assert!(!coord.is_grouping_active());
    }

    #[test]
    fn transaction_mode_is_grouping() {
        let coord = GroupingCoordinator::new(GroupingOpts::Transaction, &ControlOptions::default());
        assert!(coord.is_grouping_active());
    }

    #[test]
    fn outer_controls_carry_configured_proxied_auth() {
        let mut opts = ControlOptions::default();
        opts.proxied_auth = Some(crate::composer::ProxiedAuth::V2 {
            authz_id: "dn:uid=admin,dc=x".into(),
        });
        let coord = GroupingCoordinator::new(GroupingOpts::Transaction, &opts);
        assert_eq!(coord.outer_controls.len(), 1);
    }

    #[test]
    fn multi_update_encodes_buffered_requests_in_order() {
        let value = encode_multi_update(
            MultiUpdateErrorBehavior::AbortOnError,
            &[add_req("uid=a,dc=x"), add_req("uid=b,dc=x")],
        );
        assert!(!value.is_empty());
    }

    #[test]
    fn end_transaction_value_carries_commit_flag_and_id() {
        let value = encode_end_transaction(false, &[1, 2, 3]);
        assert!(!value.is_empty());
    }
}
