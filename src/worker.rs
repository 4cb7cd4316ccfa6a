use chrono::Local;
use log::{error, info, warn};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio_util::sync::CancellationToken;

use crate::clock::{Sleeper, TokioSleeper};
use crate::config::Config;
use crate::diff::{Classification, DiffPolicy, LastKnownState, QUOTE_DELIMITER};
use crate::email::EmailNotifier;
use crate::error::Error;
use crate::fetcher::AvailabilityFetcher;
use crate::model::{EventKind, FetchOutcome, NotificationEvent};
use crate::notifier::NotifierSet;
use crate::sms::SmsNotifier;
use crate::stores::StoreTarget;
use crate::telephony::{Telephony, TwilioClient};
use crate::voice::{CallSettings, VoiceCallNotifier};

/// How the pause between iterations is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStyle {
    Silent,
    Countdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreResult {
    Classified(Classification),
    FetchFailed(FetchOutcome),
}

/// What happened to one store during one iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreReport {
    pub store_name: String,
    pub result: StoreResult,
    pub notifications_sent: usize,
}

/// Drives the fetch, classify, notify and wait cycle.
pub struct Monitor {
    fetcher: AvailabilityFetcher,
    notifiers: NotifierSet,
    state: LastKnownState,
    sleeper: Arc<dyn Sleeper>,
    interval: Duration,
    wait_style: WaitStyle,
    iteration: u64,
}

impl Monitor {
    pub fn new(
        fetcher: AvailabilityFetcher,
        notifiers: NotifierSet,
        policy: DiffPolicy,
        sleeper: Arc<dyn Sleeper>,
        interval: Duration,
        wait_style: WaitStyle,
    ) -> Self {
        Self {
            fetcher,
            notifiers,
            state: LastKnownState::new(policy),
            sleeper,
            interval,
            wait_style,
            iteration: 0,
        }
    }

    /// Builds the fetcher and every configured channel from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetcher or the telephony client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let monitor = &config.monitor;
        let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
        let fetcher = AvailabilityFetcher::new(
            &monitor.endpoint_url,
            &monitor.product_code,
            monitor.timeout_secs,
        )?;
        let notifiers = build_notifiers(config, Arc::clone(&sleeper))?;
        let wait_style = if monitor.countdown {
            WaitStyle::Countdown
        } else {
            WaitStyle::Silent
        };

        Ok(Self::new(
            fetcher,
            notifiers,
            monitor.diff_policy,
            sleeper,
            Duration::from_secs(monitor.retrial_interval_secs),
            wait_style,
        ))
    }

    pub fn notifiers(&self) -> &NotifierSet {
        &self.notifiers
    }

    pub fn state(&self) -> &LastKnownState {
        &self.state
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// One pass over `stores`: fetch them all in order, then classify each
    /// success and notify on notable changes. Failed fetches leave that
    /// store's state untouched.
    pub async fn run_iteration(&mut self, stores: &[StoreTarget]) -> Vec<StoreReport> {
        info!("*** Starting new check @ {}", Local::now().format("%Y-%m-%d %H:%M:%S"));

        let mut outcomes = Vec::with_capacity(stores.len());
        for store in stores {
            outcomes.push((store, self.fetcher.fetch(store).await));
        }

        let mut reports = Vec::with_capacity(outcomes.len());
        for (store, outcome) in outcomes {
            let report = match outcome {
                FetchOutcome::Success(snapshot) => {
                    let classification = self.state.observe(snapshot.clone());
                    log_classification(&classification, &snapshot.store_name, &snapshot.raw_quote);

                    let mut notifications_sent = 0;
                    if classification.is_notable()
                        && let Some(event) = classification.event(&snapshot)
                    {
                        info!("---> {}", event.message_text);
                        notifications_sent = self.notifiers.dispatch(&event).await;
                    }

                    StoreReport {
                        store_name: snapshot.store_name,
                        result: StoreResult::Classified(classification),
                        notifications_sent,
                    }
                }
                failure => {
                    log_failure(&store.display_name, &failure);
                    StoreReport {
                        store_name: store.display_name.clone(),
                        result: StoreResult::FetchFailed(failure),
                        notifications_sent: 0,
                    }
                }
            };
            reports.push(report);
        }

        self.iteration += 1;
        reports
    }

    /// Waits the configured interval. Returns `true` if shutdown was
    /// requested during the wait.
    pub async fn wait(&self, token: &CancellationToken) -> bool {
        match self.wait_style {
            WaitStyle::Silent => select! {
                () = self.sleeper.sleep(self.interval) => false,
                () = token.cancelled() => true,
            },
            WaitStyle::Countdown => self.countdown(token).await,
        }
    }

    async fn countdown(&self, token: &CancellationToken) -> bool {
        let mut stdout = std::io::stdout();
        let mut cancelled = false;

        for remaining in (1..=self.interval.as_secs()).rev() {
            // terminal redraw only, failures are irrelevant
            let _ = write!(stdout, "\rNext check in {}...\x1b[K", format_timespan(remaining));
            let _ = stdout.flush();

            select! {
                () = self.sleeper.sleep(Duration::from_secs(1)) => {},
                () = token.cancelled() => {
                    cancelled = true;
                    break;
                }
            }
        }

        let _ = write!(stdout, "\r\x1b[K");
        let _ = stdout.flush();
        cancelled
    }

    /// Iterates until `token` is cancelled. Cancellation is only observed
    /// between iterations and while waiting, never mid-iteration.
    pub async fn run(mut self, stores: &[StoreTarget], token: CancellationToken) {
        loop {
            if token.is_cancelled() {
                info!("Shutdown requested, stopping monitor");
                break;
            }

            self.run_iteration(stores).await;

            if self.wait(&token).await {
                info!("Shutdown requested during wait");
                break;
            }
        }

        info!("Store monitoring stopped gracefully");
    }
}

fn log_classification(classification: &Classification, store: &str, quote: &str) {
    match classification {
        Classification::FirstObservation => info!("{store}: first observation ({quote})"),
        Classification::Unchanged | Classification::StillUnavailable => {
            info!("{store}: nothing new ({quote})");
        }
        Classification::Unparseable => {
            warn!("The result for {store} couldn't be split by '{QUOTE_DELIMITER}': {quote}");
        }
        Classification::BecameAvailable
        | Classification::RestockDateChanged { .. }
        | Classification::StatusChanged { .. } => {}
    }
}

fn log_failure(store: &str, outcome: &FetchOutcome) {
    match outcome {
        FetchOutcome::HttpError { status_code, body } => error!(
            "The request to {store} returned status code {status_code} and body:\n{body}"
        ),
        FetchOutcome::TransportError { kind, message } => {
            error!("The request to {store} failed ({kind}): {message}");
        }
        FetchOutcome::Success(_) => {}
    }
}

/// Channels in delivery order: SMS, email, then the call that may block
/// until answered.
///
/// # Errors
///
/// Returns an error if the telephony client cannot be built or a Twilio
/// credential is missing.
pub fn build_notifiers(config: &Config, sleeper: Arc<dyn Sleeper>) -> Result<NotifierSet, Error> {
    let mut notifiers = NotifierSet::new();
    let mut voice = None;

    if let Some(twilio) = config.twilio.as_ref().filter(|t| t.sms || t.voice) {
        let missing = || Error::Config("Twilio credentials are not set".to_string());
        let account_sid = twilio.account_sid.as_deref().ok_or_else(missing)?;
        let auth_token = twilio.auth_token.as_deref().ok_or_else(missing)?;
        let client: Arc<dyn Telephony> = Arc::new(TwilioClient::new(
            &twilio.api_base_url,
            account_sid,
            auth_token,
        )?);

        if twilio.sms {
            notifiers.push(Box::new(SmsNotifier::new(
                Arc::clone(&client),
                &twilio.to_number,
                &twilio.from_number,
            )));
        }
        if twilio.voice {
            voice = Some(VoiceCallNotifier::new(
                client,
                sleeper,
                CallSettings {
                    to: twilio.to_number.clone(),
                    from: twilio.from_number.clone(),
                    twiml_url: twilio.twiml_url.clone(),
                    call_timeout_secs: twilio.call_timeout_secs,
                    grace_period_secs: twilio.grace_period_secs,
                },
            ));
        }
    }

    if let Some(email) = &config.email {
        notifiers.push(Box::new(EmailNotifier::new(email.clone())));
    }
    if let Some(voice) = voice {
        notifiers.push(Box::new(voice));
    }

    Ok(notifiers)
}

/// Sends a fixed test message through every configured channel once.
pub async fn test_channels(notifiers: &NotifierSet) -> usize {
    let event = NotificationEvent {
        store_name: "test".to_string(),
        kind: EventKind::BecameAvailable,
        message_text: "This is a test message.".to_string(),
    };
    notifiers.dispatch(&event).await
}

/// Logs the setup, then runs the monitor until `token` is cancelled.
///
/// # Errors
///
/// Returns an error if the monitor cannot be built from `config`.
pub async fn monitor_stores(
    config: &Config,
    stores: &[StoreTarget],
    token: CancellationToken,
) -> Result<(), Error> {
    let monitor = Monitor::from_config(config)?;

    info!("Starting store monitoring...");
    info!(
        "Checking {}...",
        stores
            .iter()
            .map(|s| s.display_name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    info!("Product: {}", config.monitor.product_code);
    info!("Diff policy: {:?}", config.monitor.diff_policy);
    info!(
        "Check interval: {} seconds",
        config.monitor.retrial_interval_secs
    );
    if monitor.notifiers().is_empty() {
        warn!("No notification channel is configured, changes will only be logged");
    } else {
        info!(
            "Notification channels: {}",
            monitor.notifiers().channel_names().join(", ")
        );
    }

    monitor.run(stores, token).await;
    Ok(())
}

/// Renders seconds like "1 hour, 2 minutes and 5 seconds".
pub fn format_timespan(total_secs: u64) -> String {
    let units = [
        (total_secs / 3600, "hour"),
        (total_secs % 3600 / 60, "minute"),
        (total_secs % 60, "second"),
    ];
    let parts: Vec<String> = units
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| format!("{n} {unit}{}", if *n == 1 { "" } else { "s" }))
        .collect();

    match parts.as_slice() {
        [] => "0 seconds".to_string(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}
