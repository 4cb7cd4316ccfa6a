//! Drives whole monitor iterations against a `wiremock` pickup endpoint.
//!
//! Channels are replaced by recording notifiers and waits by a no-op
//! sleeper, so no real messages are sent and nothing sleeps.

use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use restock_watch::Error;
use restock_watch::clock::Sleeper;
use restock_watch::diff::{Classification, DiffPolicy};
use restock_watch::fetcher::AvailabilityFetcher;
use restock_watch::model::NotificationEvent;
use restock_watch::notifier::{Notifier, NotifierSet};
use restock_watch::stores::{self, StoreTarget};
use restock_watch::worker::{Monitor, StoreResult, WaitStyle};

const PRODUCT: &str = "MMEF2AM/A";

struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _: Duration) {}
}

struct Recording {
    name: &'static str,
    events: Arc<Mutex<Vec<(String, NotificationEvent)>>>,
}

#[async_trait]
impl Notifier for Recording {
    fn channel(&self) -> &'static str {
        self.name
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<(), Error> {
        self.events
            .lock()
            .unwrap()
            .push((self.name.to_string(), event.clone()));
        Ok(())
    }
}

fn quote_body(quote: &str, display: &str) -> serde_json::Value {
    json!({
        "body": {"stores": [{"partsAvailability": {PRODUCT: {
            "pickupSearchQuote": quote,
            "pickupDisplay": display
        }}}]}
    })
}

async fn mount_once(server: &MockServer, store_id: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/pickup-message"))
        .and(query_param("store", store_id))
        .respond_with(response)
        .up_to_n_times(1)
        .mount(server)
        .await;
}

fn build_monitor(
    server: &MockServer,
    policy: DiffPolicy,
) -> (Monitor, Arc<Mutex<Vec<(String, NotificationEvent)>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let mut notifiers = NotifierSet::new();
    for name in ["sms", "email"] {
        notifiers.push(Box::new(Recording {
            name,
            events: Arc::clone(&events),
        }));
    }

    let fetcher = AvailabilityFetcher::new(&format!("{}/pickup-message", server.uri()), PRODUCT, 5)
        .expect("failed to build fetcher");
    let monitor = Monitor::new(
        fetcher,
        notifiers,
        policy,
        Arc::new(NoSleep),
        Duration::from_secs(60),
        WaitStyle::Silent,
    );
    (monitor, events)
}

fn pick(codes: &[&str]) -> Vec<StoreTarget> {
    codes
        .iter()
        .flat_map(|code| stores::select(PRODUCT, Some(code)).unwrap())
        .collect()
}

#[tokio::test]
async fn test_failing_store_is_skipped_without_touching_state() {
    let server = MockServer::start().await;
    mount_once(&server, "R014", ResponseTemplate::new(500).set_body_string("oops")).await;
    mount_once(
        &server,
        "R075",
        ResponseTemplate::new(200).set_body_json(quote_body("Sold out<br/>2024-04-20", "unavailable")),
    )
    .await;

    let (mut monitor, events) = build_monitor(&server, DiffPolicy::DateSubstring);
    let reports = monitor.run_iteration(&pick(&["WACR", "SFUS"])).await;

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].store_name, "Walnut Creek");
    assert!(matches!(reports[0].result, StoreResult::FetchFailed(_)));
    assert_eq!(
        reports[1].result,
        StoreResult::Classified(Classification::FirstObservation)
    );
    assert!(monitor.state().get("Walnut Creek").is_none());
    assert!(monitor.state().get("San Francisco Union Square").is_some());
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_date_changes_notify_each_channel_once_per_store() {
    let server = MockServer::start().await;
    for store_id in ["R014", "R075"] {
        mount_once(
            &server,
            store_id,
            ResponseTemplate::new(200)
                .set_body_json(quote_body("Sold out<br/>2024-04-20", "unavailable")),
        )
        .await;
    }
    for store_id in ["R014", "R075"] {
        mount_once(
            &server,
            store_id,
            ResponseTemplate::new(200)
                .set_body_json(quote_body("In stock<br/>2024-05-01", "unavailable")),
        )
        .await;
    }

    let stores = pick(&["WACR", "SFUS"]);
    let (mut monitor, events) = build_monitor(&server, DiffPolicy::DateSubstring);

    monitor.run_iteration(&stores).await;
    assert!(events.lock().unwrap().is_empty());

    let reports = monitor.run_iteration(&stores).await;
    assert!(reports.iter().all(|r| r.notifications_sent == 2));

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 4);
    for store in ["Walnut Creek", "San Francisco Union Square"] {
        let for_store: Vec<_> = events
            .iter()
            .filter(|(_, event)| event.store_name == store)
            .collect();
        assert_eq!(for_store.len(), 2);
        assert_eq!(for_store[0].0, "sms");
        assert_eq!(for_store[1].0, "email");
        assert_eq!(
            for_store[0].1.message_text,
            format!("The new date for {store} is 2024-05-01")
        );
    }
}

#[tokio::test]
async fn test_unchanged_results_stay_quiet() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pickup-message"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(quote_body("Sold out<br/>2024-04-20", "unavailable")),
        )
        .mount(&server)
        .await;

    let stores = pick(&["ROSE"]);
    let (mut monitor, events) = build_monitor(&server, DiffPolicy::DateSubstring);

    for _ in 0..3 {
        monitor.run_iteration(&stores).await;
    }
    let reports = monitor.run_iteration(&stores).await;

    assert_eq!(
        reports[0].result,
        StoreResult::Classified(Classification::StillUnavailable)
    );
    assert_eq!(monitor.iteration(), 4);
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_becoming_available_is_announced_under_status_policy() {
    let server = MockServer::start().await;
    mount_once(
        &server,
        "R298",
        ResponseTemplate::new(200).set_body_json(quote_body("Unavailable for Pickup", "unavailable")),
    )
    .await;
    mount_once(
        &server,
        "R298",
        ResponseTemplate::new(200).set_body_json(quote_body("Available Today", "available")),
    )
    .await;

    let stores = pick(&["ROSE"]);
    let (mut monitor, events) = build_monitor(&server, DiffPolicy::AvailabilityField);

    monitor.run_iteration(&stores).await;
    let reports = monitor.run_iteration(&stores).await;

    assert_eq!(
        reports[0].result,
        StoreResult::Classified(Classification::BecameAvailable)
    );
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[0].1.message_text.contains("Roseville"));
}
