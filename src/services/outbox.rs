use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    dto::announcement::{Announcement, RoleAssignment},
    state::{ChannelId, roster::ParticipantId},
};

/// Error returned by a [`Messenger`] when a message could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The participant does not accept private messages.
    #[error("participant {0} cannot be reached privately")]
    Unreachable(ParticipantId),
}

/// Outbound side of the chat platform.
pub trait Messenger: Send + Sync {
    /// Post `announcement` in `channel`.
    fn notify_channel(
        &self,
        channel: ChannelId,
        announcement: Announcement,
    ) -> BoxFuture<'static, Result<(), DeliveryError>>;

    /// Send `participant` their role in a private message.
    fn notify_privately(
        &self,
        participant: ParticipantId,
        role: RoleAssignment,
    ) -> BoxFuture<'static, Result<(), DeliveryError>>;
}

#[derive(Debug)]
enum Outbound {
    Channel(Announcement),
    Private(ParticipantId, RoleAssignment),
}

/// Per-game queue in front of the [`Messenger`].
///
/// Enqueueing never blocks, so the engine can publish while holding its lock; a single
/// worker task delivers everything in enqueue order.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Outbox {
    /// Spawn the delivery worker for `channel`. It stops once every handle is dropped.
    pub fn spawn(channel: ChannelId, messenger: Arc<dyn Messenger>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(deliver(channel, messenger, rx));
        Self { tx }
    }

    /// Queue a public announcement.
    pub fn announce(&self, announcement: Announcement) {
        self.push(Outbound::Channel(announcement));
    }

    /// Queue several public announcements, keeping their order.
    pub fn announce_all(&self, announcements: impl IntoIterator<Item = Announcement>) {
        for announcement in announcements {
            self.announce(announcement);
        }
    }

    /// Queue a private role message.
    pub fn whisper(&self, participant: ParticipantId, role: RoleAssignment) {
        self.push(Outbound::Private(participant, role));
    }

    fn push(&self, message: Outbound) {
        if self.tx.send(message).is_err() {
            warn!("outbox worker stopped; dropping message");
        }
    }
}

async fn deliver(
    channel: ChannelId,
    messenger: Arc<dyn Messenger>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            Outbound::Channel(announcement) => {
                if let Err(err) = messenger.notify_channel(channel, announcement).await {
                    warn!(%channel, error = %err, "failed to post announcement");
                }
            }
            Outbound::Private(participant, role) => {
                if let Err(err) = messenger.notify_privately(participant, role).await {
                    warn!(%channel, %participant, error = %err, "failed to send role message");
                    let notice = Announcement::RoleMessageUndelivered { participant };
                    if let Err(err) = messenger.notify_channel(channel, notice).await {
                        warn!(%channel, error = %err, "failed to post delivery notice");
                    }
                }
            }
        }
    }
    debug!(%channel, "outbox closed");
}
