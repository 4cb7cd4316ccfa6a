pub mod clock;
pub mod config;
pub mod diff;
pub mod email;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod notifier;
pub mod sms;
pub mod stores;
pub mod telephony;
pub mod voice;
pub mod worker;

pub use config::Config;
pub use error::Error;
pub use worker::{Monitor, monitor_stores};
