use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Error;
use crate::model::NotificationEvent;
use crate::notifier::Notifier;
use crate::telephony::Telephony;

/// Fire-and-forget text message with the event text as body.
pub struct SmsNotifier {
    telephony: Arc<dyn Telephony>,
    to: String,
    from: String,
}

impl SmsNotifier {
    pub fn new(telephony: Arc<dyn Telephony>, to: &str, from: &str) -> Self {
        Self {
            telephony,
            to: to.to_string(),
            from: from.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for SmsNotifier {
    fn channel(&self) -> &'static str {
        "sms"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<(), Error> {
        self.telephony
            .create_message(&self.to, &self.from, &event.message_text)
            .await
    }
}
