use async_trait::async_trait;
use log::{error, info};

use crate::error::Error;
use crate::model::NotificationEvent;

/// One notification delivery mechanism.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short channel name used in logs.
    fn channel(&self) -> &'static str;

    async fn notify(&self, event: &NotificationEvent) -> Result<(), Error>;
}

/// The configured channels, invoked in order for every event.
#[derive(Default)]
pub struct NotifierSet {
    channels: Vec<Box<dyn Notifier>>,
}

impl NotifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notifier: Box<dyn Notifier>) {
        self.channels.push(notifier);
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|n| n.channel()).collect()
    }

    /// Sends the event through every channel exactly once. Failures are
    /// logged and do not stop the remaining channels. Returns how many
    /// channels delivered successfully.
    pub async fn dispatch(&self, event: &NotificationEvent) -> usize {
        let mut delivered = 0;
        for notifier in &self.channels {
            match notifier.notify(event).await {
                Ok(()) => {
                    info!("{} notification sent for {}", notifier.channel(), event.store_name);
                    delivered += 1;
                }
                Err(e) => error!(
                    "Failed to send {} notification for {}: {e}",
                    notifier.channel(),
                    event.store_name
                ),
            }
        }
        delivered
    }
}
