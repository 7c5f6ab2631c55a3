//! Notification Sink (C9).
//!
//! `ldap3` does not expose unsolicited notifications as a distinct
//! public-API event; the one unsolicited notification a client reliably
//! observes in practice — the server's "Notice of Disconnection" — surfaces
//! as the background connection-driver task (`LdapConnAsync::drive`)
//! terminating with an error before the caller abandoned the connection
//! (`spec.md` §9: "a message-passing callback... is the natural shape").
//! This module wires that channel: the connection pool (C3) spawns the
//! drive task itself instead of using `ldap3::drive!`, and forwards any
//! drive error here as a notification.

use log::warn;
use tokio::sync::mpsc;

use crate::output::OutputSink;

/// A single unsolicited notification observed on a connection.
#[derive(Clone, Debug)]
pub struct Notification {
    pub connection_label: String,
    pub message: String,
}

/// Receives notifications and reports them; never influences the engine's
/// state machine (`spec.md` §4.9).
pub struct NotificationSink {
    receiver: mpsc::UnboundedReceiver<Notification>,
}

#[derive(Clone)]
pub struct NotificationSender(mpsc::UnboundedSender<Notification>);

impl NotificationSender {
    pub fn send(&self, connection_label: impl Into<String>, message: impl Into<String>) {
        let _ = self.0.send(Notification {
            connection_label: connection_label.into(),
            message: message.into(),
        });
    }
}

pub fn channel() -> (NotificationSender, NotificationSink) {
    let (tx, rx) = mpsc::unbounded_channel();
    (NotificationSender(tx), NotificationSink { receiver: rx })
}

impl NotificationSink {
    /// Drains any notifications queued since the last call and reports
    /// them to stderr and the log. Non-blocking: called opportunistically
    /// by the engine between records rather than awaited continuously,
    /// since nothing in the single-threaded loop should block on a
    /// notification that may never arrive.
    pub fn drain(&mut self, output: &mut dyn OutputSink) {
        while let Ok(n) = self.receiver.try_recv() {
            let line = format!("Unsolicited notification from {}: {}", n.connection_label, n.message);
            warn!("{}", line);
            output.failure(&line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CapturingOutputSink;

    #[test]
    fn drains_queued_notifications_in_order() {
        let (tx, mut sink) = channel();
        tx.send("conn-1", "connection closed by server");
        tx.send("conn-1", "idle timeout");
        let mut out = CapturingOutputSink::default();
        sink.drain(&mut out);
        assert_eq!(out.failure_lines.len(), 2);
        assert!(out.failure_lines[0].contains("connection closed by server"));
    }

    #[test]
    fn drain_is_a_no_op_when_empty() {
        let (_tx, mut sink) = channel();
        let mut out = CapturingOutputSink::default();
        sink.drain(&mut out);
        assert!(out.failure_lines.is_empty());
    }
}
