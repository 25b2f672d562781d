//! Outbound command channel toward the persistence engine.

use crate::policy::command::PolicyCommand;
use tokio::sync::mpsc;

/// Fire-and-forget sink for policy commands.
///
/// The controller never waits for a response through this channel; deletion
/// confirmation arrives separately as a subject-deleted notification.
#[derive(Debug, Clone)]
pub struct CommandForwarder {
    tx: mpsc::UnboundedSender<PolicyCommand>,
}

impl CommandForwarder {
    /// Create a forwarder and the receiving end for the persistence engine.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PolicyCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Wrap an existing command channel.
    pub fn from_sender(tx: mpsc::UnboundedSender<PolicyCommand>) -> Self {
        Self { tx }
    }

    /// Enqueue a command.
    ///
    /// A closed channel is logged and swallowed; lifecycle progress must not
    /// depend on the persistence engine being reachable.
    pub fn tell(&self, command: impl Into<PolicyCommand>) {
        let command = command.into();
        if self.tx.send(command).is_err() {
            tracing::warn!("command forwarder closed, dropping policy command");
        }
    }
}
