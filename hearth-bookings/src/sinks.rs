use std::time::Duration;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use hearth_domain::events::{AnalyticsEvent, NotifyEvent};

#[derive(Clone)]
struct Sink {
    url: String,
    api_key: Option<String>,
}

/// Best-effort side channels. Every send is spawned off the request path and
/// absorbs its own failures; nothing here can fail a booking transition.
#[derive(Clone)]
pub struct SideChannels {
    http: reqwest::Client,
    notify: Option<Sink>,
    analytics: Option<Sink>,
}

impl SideChannels {
    pub fn new(
        notify_url: Option<String>,
        notify_api_key: Option<String>,
        analytics_url: Option<String>,
        analytics_api_key: Option<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap_or_default();

        Self {
            http,
            notify: notify_url.map(|url| Sink {
                url,
                api_key: notify_api_key,
            }),
            analytics: analytics_url.map(|url| Sink {
                url,
                api_key: analytics_api_key,
            }),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, None, None, None)
    }

    pub fn notify_booking(
        &self,
        kind: &str,
        tenant_id: &str,
        booking_id: Uuid,
        guest_id: &str,
        host_id: &str,
    ) {
        let Some(sink) = self.notify.clone() else {
            return;
        };
        let event = NotifyEvent {
            kind: kind.to_owned(),
            tenant_id: tenant_id.to_owned(),
            booking_id,
            guest_id: guest_id.to_owned(),
            host_id: host_id.to_owned(),
            timestamp: Utc::now().timestamp(),
        };
        self.post(sink, serde_json::json!(event), "notify");
    }

    pub fn track(&self, name: &str, tenant_id: &str, booking_id: Uuid) {
        let Some(sink) = self.analytics.clone() else {
            return;
        };
        let event = AnalyticsEvent {
            name: name.to_owned(),
            tenant_id: tenant_id.to_owned(),
            booking_id,
            timestamp: Utc::now().timestamp(),
        };
        self.post(sink, serde_json::json!(event), "analytics");
    }

    fn post(&self, sink: Sink, payload: serde_json::Value, label: &'static str) {
        let http = self.http.clone();
        tokio::spawn(async move {
            let mut request = http.post(&sink.url).json(&payload);
            if let Some(key) = &sink.api_key {
                request = request.header("x-api-key", key);
            }
            match request.send().await {
                Ok(response) if !response.status().is_success() => {
                    debug!("{} sink returned {}", label, response.status());
                }
                Ok(_) => {}
                Err(err) => debug!("{} sink failed: {}", label, err),
            }
        });
    }
}
