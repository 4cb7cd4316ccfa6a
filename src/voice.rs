//! Keep calling a human until a call is answered.
//!
//! Every attempt is a brand-new call: place it, wait the full
//! `call_timeout + grace_period`, then read its final status. Anything but
//! `completed` starts over. There is no attempt limit and no backoff.

use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Sleeper;
use crate::error::Error;
use crate::model::NotificationEvent;
use crate::notifier::Notifier;
use crate::telephony::Telephony;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallState {
    Placing,
    Waiting { call_id: String },
    Checking { call_id: String },
    Completed { call_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallReport {
    pub call_id: String,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct CallSettings {
    pub to: String,
    pub from: String,
    pub twiml_url: String,
    pub call_timeout_secs: u64,
    pub grace_period_secs: u64,
}

pub struct VoiceCallNotifier {
    telephony: Arc<dyn Telephony>,
    sleeper: Arc<dyn Sleeper>,
    settings: CallSettings,
}

impl VoiceCallNotifier {
    pub fn new(
        telephony: Arc<dyn Telephony>,
        sleeper: Arc<dyn Sleeper>,
        settings: CallSettings,
    ) -> Self {
        Self {
            telephony,
            sleeper,
            settings,
        }
    }

    fn wait_window(&self) -> Duration {
        Duration::from_secs(self.settings.call_timeout_secs + self.settings.grace_period_secs)
    }

    /// Runs the call state machine until a call completes.
    ///
    /// # Errors
    ///
    /// Returns the provider error if the first call cannot be placed. Once a
    /// call has been placed, failures to place the next one or to look up a
    /// status are treated like an unanswered call.
    pub async fn call_until_answered(&self) -> Result<CallReport, Error> {
        let mut state = CallState::Placing;
        let mut attempts = 0;

        loop {
            state = match state {
                CallState::Placing => {
                    attempts += 1;
                    let placed = self
                        .telephony
                        .create_call(
                            &self.settings.to,
                            &self.settings.from,
                            &self.settings.twiml_url,
                            self.settings.call_timeout_secs,
                        )
                        .await;
                    match placed {
                        Ok(call_id) => {
                            info!(
                                "Call {call_id} started. Waiting for {} seconds...",
                                self.wait_window().as_secs()
                            );
                            CallState::Waiting { call_id }
                        }
                        Err(e) if attempts == 1 => return Err(e),
                        Err(e) => {
                            // a call already went unanswered, keep trying
                            warn!("Could not place call: {e}. Retrying after the call window...");
                            self.sleeper.sleep(self.wait_window()).await;
                            CallState::Placing
                        }
                    }
                }
                CallState::Waiting { call_id } => {
                    self.sleeper.sleep(self.wait_window()).await;
                    CallState::Checking { call_id }
                }
                CallState::Checking { call_id } => {
                    match self.telephony.call_status(&call_id).await {
                        Ok(status) if status.eq_ignore_ascii_case("completed") => {
                            CallState::Completed { call_id }
                        }
                        Ok(status) => {
                            warn!(
                                "Call status '{}'. Attempting new call...",
                                status.to_uppercase()
                            );
                            CallState::Placing
                        }
                        Err(e) => {
                            warn!("Could not read status of call {call_id}: {e}. Attempting new call...");
                            CallState::Placing
                        }
                    }
                }
                CallState::Completed { call_id } => {
                    info!("Call successfully made after {attempts} attempt(s).");
                    return Ok(CallReport { call_id, attempts });
                }
            };
        }
    }
}

#[async_trait]
impl Notifier for VoiceCallNotifier {
    fn channel(&self) -> &'static str {
        "voice"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<(), Error> {
        info!("Calling {} about {}", self.settings.to, event.store_name);
        self.call_until_answered().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::RecordingSleeper;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Hands out fresh call ids and replays scripted statuses.
    #[derive(Default)]
    struct ScriptedTelephony {
        statuses: Mutex<VecDeque<Result<String, u16>>>,
        placed: Mutex<Vec<String>>,
        queried: Mutex<Vec<String>>,
        fail_placing: bool,
        /// Attempt numbers (1-based) whose placement is rejected.
        rejected_attempts: Vec<usize>,
        attempts: Mutex<usize>,
    }

    impl ScriptedTelephony {
        fn with_statuses(statuses: &[&str]) -> Self {
            Self {
                statuses: Mutex::new(statuses.iter().map(|s| Ok((*s).to_string())).collect()),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Telephony for ScriptedTelephony {
        async fn create_message(&self, _: &str, _: &str, _: &str) -> Result<(), Error> {
            Ok(())
        }

        async fn create_call(&self, _: &str, _: &str, _: &str, _: u64) -> Result<String, Error> {
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                *attempts += 1;
                *attempts
            };
            if self.fail_placing || self.rejected_attempts.contains(&attempt) {
                return Err(Error::Telephony {
                    status: 401,
                    body: "unauthorized".to_string(),
                });
            }
            let mut placed = self.placed.lock().unwrap();
            let id = format!("CA{}", placed.len() + 1);
            placed.push(id.clone());
            Ok(id)
        }

        async fn call_status(&self, call_id: &str) -> Result<String, Error> {
            self.queried.lock().unwrap().push(call_id.to_string());
            match self.statuses.lock().unwrap().pop_front() {
                Some(Ok(status)) => Ok(status),
                Some(Err(code)) => Err(Error::Telephony {
                    status: code,
                    body: String::new(),
                }),
                None => Ok("completed".to_string()),
            }
        }
    }

    fn settings() -> CallSettings {
        CallSettings {
            to: "+15550001111".to_string(),
            from: "+15552223333".to_string(),
            twiml_url: "https://example.com/twiml".to_string(),
            call_timeout_secs: 30,
            grace_period_secs: 15,
        }
    }

    #[tokio::test]
    async fn test_answered_first_time() {
        let telephony = Arc::new(ScriptedTelephony::with_statuses(&["completed"]));
        let sleeper = Arc::new(RecordingSleeper::default());
        let voice = VoiceCallNotifier::new(telephony.clone(), sleeper.clone(), settings());

        let report = voice.call_until_answered().await.unwrap();

        assert_eq!(
            report,
            CallReport {
                call_id: "CA1".to_string(),
                attempts: 1
            }
        );
        assert_eq!(*sleeper.waits.lock().unwrap(), vec![Duration::from_secs(45)]);
    }

    #[tokio::test]
    async fn test_busy_call_is_replaced_by_a_new_call() {
        let telephony = Arc::new(ScriptedTelephony::with_statuses(&[
            "busy",
            "no-answer",
            "COMPLETED",
        ]));
        let sleeper = Arc::new(RecordingSleeper::default());
        let voice = VoiceCallNotifier::new(telephony.clone(), sleeper.clone(), settings());

        let report = voice.call_until_answered().await.unwrap();

        assert_eq!(report.attempts, 3);
        assert_eq!(report.call_id, "CA3");
        // each status check targets the call placed just before it
        assert_eq!(*telephony.placed.lock().unwrap(), vec!["CA1", "CA2", "CA3"]);
        assert_eq!(*telephony.queried.lock().unwrap(), vec!["CA1", "CA2", "CA3"]);
        // the full window elapses before every check
        assert_eq!(
            *sleeper.waits.lock().unwrap(),
            vec![Duration::from_secs(45); 3]
        );
    }

    #[tokio::test]
    async fn test_status_lookup_failure_counts_as_unanswered() {
        let telephony = Arc::new(ScriptedTelephony {
            statuses: Mutex::new(VecDeque::from([Err(503), Ok("completed".to_string())])),
            ..ScriptedTelephony::default()
        });
        let sleeper = Arc::new(RecordingSleeper::default());
        let voice = VoiceCallNotifier::new(telephony.clone(), sleeper.clone(), settings());

        let report = voice.call_until_answered().await.unwrap();

        assert_eq!(report.attempts, 2);
        assert_eq!(sleeper.total(), Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_placement_failure_after_unanswered_call_keeps_calling() {
        let telephony = Arc::new(ScriptedTelephony {
            statuses: Mutex::new(VecDeque::from([
                Ok("busy".to_string()),
                Ok("completed".to_string()),
            ])),
            rejected_attempts: vec![2],
            ..ScriptedTelephony::default()
        });
        let sleeper = Arc::new(RecordingSleeper::default());
        let voice = VoiceCallNotifier::new(telephony.clone(), sleeper.clone(), settings());

        let report = voice.call_until_answered().await.unwrap();

        assert_eq!(report.attempts, 3);
        assert_eq!(*telephony.placed.lock().unwrap(), vec!["CA1", "CA2"]);
        assert_eq!(report.call_id, "CA2");
        assert_eq!(
            *sleeper.waits.lock().unwrap(),
            vec![Duration::from_secs(45); 3]
        );
    }

    #[tokio::test]
    async fn test_failure_to_place_is_returned() {
        let telephony = Arc::new(ScriptedTelephony {
            fail_placing: true,
            ..ScriptedTelephony::default()
        });
        let sleeper = Arc::new(RecordingSleeper::default());
        let voice = VoiceCallNotifier::new(telephony, sleeper.clone(), settings());

        let result = voice.call_until_answered().await;

        assert!(matches!(result, Err(Error::Telephony { status: 401, .. })));
        assert!(sleeper.waits.lock().unwrap().is_empty());
    }
}
