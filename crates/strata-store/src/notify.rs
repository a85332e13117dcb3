use std::fmt;

use async_trait::async_trait;
use strata_types::{ConfigId, Properties};
use tokio::sync::mpsc;

use crate::error::{NotifyError, NotifyResult};

/// What happened to a configuration object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Updated,
    Deleted,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Updated => f.write_str("updated"),
            EventKind::Deleted => f.write_str("deleted"),
        }
    }
}

/// One change delivered to a [`ConfigNotifier`].
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigEvent {
    pub identity: ConfigId,
    pub pid: String,
    pub kind: EventKind,
    /// New properties; `None` for deletions.
    pub properties: Option<Properties>,
    /// Why the object changed, for logs.
    pub reason: String,
}

/// Receives configuration changes after they have been persisted.
#[async_trait]
pub trait ConfigNotifier: Send + Sync {
    async fn notify(&self, event: ConfigEvent) -> NotifyResult<()>;
}

/// Discards every event.
pub struct NoOpNotifier;

#[async_trait]
impl ConfigNotifier for NoOpNotifier {
    async fn notify(&self, _event: ConfigEvent) -> NotifyResult<()> {
        Ok(())
    }
}

/// Forwards events into an unbounded tokio channel.
#[derive(Clone, Debug)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<ConfigEvent>,
}

impl ChannelNotifier {
    /// A notifier and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConfigEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl ConfigNotifier for ChannelNotifier {
    async fn notify(&self, event: ConfigEvent) -> NotifyResult<()> {
        self.sender.send(event).map_err(|_| NotifyError::ChannelClosed)
    }
}
