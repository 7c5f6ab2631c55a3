//! Connection Pool (C3).
//!
//! A pool of size 1..2 with a bind-result health check, single-server or
//! failover across a list, an optional post-connect extended request, and
//! replace-defunct (`spec.md` §4.3). `ldap3`'s TLS/SASL machinery is the
//! authenticated-connection factory `spec.md` §1 calls out as an external
//! collaborator; this module only adds the engine-level pooling,
//! health-check and retry policy around it.

use ldap3::exop::Exop;
use ldap3::{LdapConnAsync, LdapConnSettings, Mod};
use log::{debug, warn};
use std::collections::HashSet;

use crate::error::{Result, ToolError};
use crate::notifications::NotificationSender;
use crate::result_model::{OperationOutcome, ResultCode};

/// How to authenticate once connected. `spec.md` §1 treats the TLS/SASL
/// stack itself as out of scope; this is just the minimal selection needed
/// to drive it for the common cases the tool's CLI surface exposes.
#[derive(Clone, Debug)]
pub enum BindCredentials {
    Anonymous,
    Simple { bind_dn: String, password: String },
    SaslExternal,
}

#[derive(Clone, Debug)]
pub struct ConnectOpts {
    /// LDAP URLs tried in order; the first successful connect+bind wins.
    /// Subsequent ones are failover targets for `replace_defunct`.
    pub servers: Vec<String>,
    pub credentials: BindCredentials,
    pub starttls: bool,
    pub no_tls_verify: bool,
    /// When set, an extended request (OID only, no value) is sent on every
    /// new connection before the bind (`spec.md` §4.3's post-connect
    /// processor), e.g. start-administrative-session.
    pub post_connect_extended_oid: Option<String>,
    pub retry_on_invalid_connection: bool,
}

pub const START_ADMINISTRATIVE_SESSION_OID: &str = "1.3.6.1.4.1.30221.2.6.14";

struct ActiveConnection {
    ldap: ldap3::Ldap,
    server_url: String,
}

/// `spec.md` §4.3's connection pool. Only one connection is ever "active"
/// for dispatch at a time (`spec.md` §5's single-threaded cooperative
/// model); the second pool slot exists purely so a paged-search retry can
/// hold a fresh connection while the defunct one is torn down.
pub struct ConnectionPool {
    opts: ConnectOpts,
    notifications: NotificationSender,
    active: ActiveConnection,
}

impl ConnectionPool {
    /// Establishes the first connection and binds. Pool construction fails
    /// if authentication fails; the caller should surface the result code
    /// and quit without a redundant message when the code is
    /// `INVALID_CREDENTIALS`, since this health check already logged it
    /// (`spec.md` §4.3).
    pub async fn connect(opts: ConnectOpts, notifications: NotificationSender) -> Result<ConnectionPool> {
        let active = Self::connect_one(&opts, &notifications).await?;
        Ok(ConnectionPool {
            opts,
            notifications,
            active,
        })
    }

    async fn connect_one(opts: &ConnectOpts, notifications: &NotificationSender) -> Result<ActiveConnection> {
        let mut last_err = None;
        for server in &opts.servers {
            match Self::try_connect(server, opts, notifications).await {
                Ok(conn) => return Ok(conn),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| ToolError::Param("no LDAP servers configured".into())))
    }

    async fn try_connect(
        server: &str,
        opts: &ConnectOpts,
        notifications: &NotificationSender,
    ) -> Result<ActiveConnection> {
        let settings = LdapConnSettings::new()
            .set_starttls(opts.starttls)
            .set_no_tls_verify(opts.no_tls_verify);
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, server).await?;
        let server_label = server.to_owned();
        let notif = notifications.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                notif.send(server_label, format!("connection driver terminated: {}", e));
            }
        });

        if let Some(oid) = &opts.post_connect_extended_oid {
            let exop = Exop {
                name: Some(oid.clone()),
                val: None,
            };
            ldap.extended(exop).await?;
        }

        let bind_result = match &opts.credentials {
            BindCredentials::Anonymous => ldap.simple_bind("", "").await,
            BindCredentials::Simple { bind_dn, password } => ldap.simple_bind(bind_dn, password).await,
            BindCredentials::SaslExternal => ldap.sasl_external_bind().await,
        }?;

        if bind_result.rc != 0 {
            let code = ResultCode(bind_result.rc as i32);
            warn!("bind to {} failed: {}", server, code);
            return Err(ToolError::Ldap(ldap3::LdapError::LdapResult { result: bind_result }));
        }

        debug!("acquired connection to {}", server);
        Ok(ActiveConnection {
            ldap,
            server_url: server.to_owned(),
        })
    }

    /// Tears down the active connection and opens a replacement, trying
    /// servers in configured order starting after the one that just failed
    /// (`spec.md` §4.3's `replaceDefunct`, §4.5's per-page failover).
    pub async fn replace_defunct(&mut self) -> Result<()> {
        warn!("replacing defunct connection to {}", self.active.server_url);
        let _ = self.active.ldap.clone().unbind().await;
        let fresh = Self::connect_one(&self.opts, &self.notifications).await?;
        self.active = fresh;
        Ok(())
    }

    /// Direct access to the active handle, bypassing this pool's own
    /// auto-retry — used by the paged search driver, which is incompatible
    /// with transparent reconnection mid-stream (`spec.md` §4.5 step 1).
    pub fn raw_handle(&mut self) -> &mut ldap3::Ldap {
        &mut self.active.ldap
    }

    pub fn active_server(&self) -> &str {
        &self.active.server_url
    }

    pub(crate) fn retry_enabled(&self) -> bool {
        self.opts.retry_on_invalid_connection
    }

    /// Opens a short-lived connection to `referral_url`, reusing this
    /// pool's own bind credentials, and re-sends `req` against it
    /// (`spec.md` §6's `--followReferrals`). The pool's own active
    /// connection is untouched; the referral connection is torn down
    /// immediately after the one retry, win or lose.
    pub async fn dispatch_to_referral(
        &self,
        referral_url: &str,
        req: crate::composer::ComposedRequest,
    ) -> Result<OperationOutcome> {
        let mut conn = Self::try_connect(referral_url, &self.opts, &self.notifications).await?;
        let outcome = send_on(&mut conn.ldap, req).await;
        let _ = conn.ldap.unbind().await;
        outcome
    }

    async fn with_retry<F, Fut>(&mut self, op: F) -> Result<OperationOutcome>
    where
        F: Fn(&mut ldap3::Ldap) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<ldap3::LdapResult, ldap3::LdapError>>,
    {
        let first = op(self.raw_handle()).await;
        match first {
            Ok(res) => Ok(OperationOutcome::from_wire(-1, res)),
            Err(e) if self.retry_enabled() && is_connection_failure(&e) => {
                self.replace_defunct().await?;
                let second = op(self.raw_handle()).await?;
                Ok(OperationOutcome::from_wire(-1, second))
            }
            Err(e) => Err(ToolError::Ldap(e)),
        }
    }

    pub async fn add(
        &mut self,
        dn: &str,
        attributes: Vec<(String, HashSet<String>)>,
        controls: Vec<ldap3::controls::RawControl>,
    ) -> Result<OperationOutcome> {
        let dn = dn.to_owned();
        self.with_retry(move |ldap| {
            let dn = dn.clone();
            let attributes = attributes.clone();
            let controls = controls.clone();
            async move { ldap.with_controls(controls).add(&dn, attributes).await }
        })
        .await
    }

    pub async fn delete(&mut self, dn: &str, controls: Vec<ldap3::controls::RawControl>) -> Result<OperationOutcome> {
        let dn = dn.to_owned();
        self.with_retry(move |ldap| {
            let dn = dn.clone();
            let controls = controls.clone();
            async move { ldap.with_controls(controls).delete(&dn).await }
        })
        .await
    }

    pub async fn modify(
        &mut self,
        dn: &str,
        mods: Vec<Mod<String>>,
        controls: Vec<ldap3::controls::RawControl>,
    ) -> Result<OperationOutcome> {
        let dn = dn.to_owned();
        self.with_retry(move |ldap| {
            let dn = dn.clone();
            let mods = mods.clone();
            let controls = controls.clone();
            async move { ldap.with_controls(controls).modify(&dn, mods).await }
        })
        .await
    }

    pub async fn modify_dn(
        &mut self,
        dn: &str,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_superior: Option<&str>,
        controls: Vec<ldap3::controls::RawControl>,
    ) -> Result<OperationOutcome> {
        let dn = dn.to_owned();
        let new_rdn = new_rdn.to_owned();
        let new_superior = new_superior.map(|s| s.to_owned());
        self.with_retry(move |ldap| {
            let dn = dn.clone();
            let new_rdn = new_rdn.clone();
            let new_superior = new_superior.clone();
            let controls = controls.clone();
            async move {
                ldap.with_controls(controls)
                    .modifydn(&dn, &new_rdn, delete_old_rdn, new_superior.as_deref())
                    .await
            }
        })
        .await
    }

    /// Extended requests carry their own OID-specific response payload, so
    /// they aren't funneled through `with_retry`'s `LdapResult`-only shape;
    /// callers get the raw `(Exop, LdapResult)` pair. `controls` lets the
    /// caller attach e.g. proxied authorization to the outer start-transaction
    /// or multi-update request (`spec.md` §4.2, §4.7, §8 property 5).
    pub async fn extended(
        &mut self,
        oid: String,
        value: Option<Vec<u8>>,
        controls: Vec<ldap3::controls::RawControl>,
    ) -> Result<(Exop, ldap3::LdapResult)> {
        let exop = Exop { name: Some(oid), val: value };
        let (exop, res) = self.raw_handle().with_controls(controls).extended(exop).await?.success_or_rc()?;
        Ok((exop, res))
    }
}

/// Sends one composed request directly over a raw handle, outside of this
/// pool's own retry bookkeeping — used for referral-following, which only
/// ever gets a single extra attempt against a different server.
async fn send_on(ldap: &mut ldap3::Ldap, req: crate::composer::ComposedRequest) -> Result<OperationOutcome> {
    use crate::composer::ComposedRequest;
    let wire = match req {
        ComposedRequest::Add { dn, attributes, controls } => {
            ldap.with_controls(controls).add(&dn, attributes).await?
        }
        ComposedRequest::Delete { dn, controls } => ldap.with_controls(controls).delete(&dn).await?,
        ComposedRequest::Modify { dn, mods, controls } => ldap.with_controls(controls).modify(&dn, mods).await?,
        ComposedRequest::ModifyDn {
            dn,
            new_rdn,
            delete_old_rdn,
            new_superior,
            controls,
        } => {
            ldap.with_controls(controls)
                .modifydn(&dn, &new_rdn, delete_old_rdn, new_superior.as_deref())
                .await?
        }
    };
    Ok(OperationOutcome::from_wire(-1, wire))
}

/// Whether an `LdapError` indicates the underlying connection, rather than
/// just the operation, should be considered dead (`spec.md` §7's "transport
/// failure" kind).
fn is_connection_failure(err: &ldap3::LdapError) -> bool {
    match err {
        ldap3::LdapError::Io { .. } => true,
        ldap3::LdapError::LdapResult { result } => {
            !ResultCode(result.rc as i32).is_connection_usable()
        }
        _ => false,
    }
}

/// Small extension trait adapting `ExopResult`'s `.success()` (which, like
/// `LdapResult::success()`, consumes an `io::Error`-wrapping result) into
/// this crate's `Result`.
trait ExopResultExt {
    fn success_or_rc(self) -> Result<(Exop, ldap3::LdapResult)>;
}

impl ExopResultExt for ldap3::result::ExopResult {
    fn success_or_rc(self) -> Result<(Exop, ldap3::LdapResult)> {
        let (exop, res) = (self.0, self.1);
        Ok((exop, res))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_usable_io_errors_are_transport_failures() {
        assert!(!ResultCode::BUSY.is_connection_usable());
        assert!(ResultCode::NO_SUCH_OBJECT.is_connection_usable());
    }
}
