// src/notify.rs
//! Push notifications for geofence events
//!
//! Delivery is best effort: a failed or slow endpoint is logged and the
//! ingestion loop never waits on it.

use crate::{error::Result, geofence::GeofenceEvent, geofence::Transition};
use std::time::Duration;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Receives every geofence event after it has been persisted
pub trait Notifier {
    fn notify(&self, event: &GeofenceEvent);
}

/// Posts events to an ntfy-style HTTP topic
#[derive(Debug, Clone)]
pub struct NtfyNotifier {
    client: reqwest::Client,
    url: String,
}

impl NtfyNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(NOTIFY_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn title(event: &GeofenceEvent) -> String {
    let boundary = event.boundary.as_deref().unwrap_or("Geofence");
    match event.event_type {
        Transition::Entry => format!("Vehicle entered {}", boundary),
        Transition::Exit => format!("Vehicle left {}", boundary),
    }
}

fn priority(transition: Transition) -> &'static str {
    match transition {
        Transition::Exit => "4",
        Transition::Entry => "3",
    }
}

fn tags(transition: Transition) -> &'static str {
    match transition {
        Transition::Exit => "warning,car",
        Transition::Entry => "house,car",
    }
}

impl Notifier for NtfyNotifier {
    fn notify(&self, event: &GeofenceEvent) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                log::warn!("No async runtime, dropping {} notification", event.event_type);
                return;
            }
        };

        let request = self
            .client
            .post(&self.url)
            .header("Title", title(event))
            .header("Priority", priority(event.event_type))
            .header("Tags", tags(event.event_type))
            .body(event.summary());
        let transition = event.event_type;

        handle.spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    log::info!("Sent {} notification", transition);
                }
                Ok(response) => {
                    log::warn!("Notification endpoint returned {}", response.status());
                }
                Err(e) => {
                    log::warn!("Failed to send notification: {}", e);
                }
            }
        });
    }
}

/// Used when no notification URL is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNotifier;

impl Notifier for DisabledNotifier {
    fn notify(&self, event: &GeofenceEvent) {
        log::debug!("Notifications disabled, not sending {}", event.event_type);
    }
}

/// Pick the notifier for an optional endpoint URL
pub fn notifier_for(url: Option<&str>) -> Result<Box<dyn Notifier>> {
    match url {
        Some(url) if !url.trim().is_empty() => {
            log::info!("Notifications will be posted to {}", url);
            Ok(Box::new(NtfyNotifier::new(url.trim())?))
        }
        _ => {
            log::warn!("No notification URL configured, notifications disabled");
            Ok(Box::new(DisabledNotifier))
        }
    }
}
