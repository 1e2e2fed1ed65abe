//! Alert channels.

use crate::ports::http_port::{HttpPort, HttpRequest};
use crate::ports::notifier_port::NotifierPort;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Posts `{"text": message}` to a Slack incoming webhook.
pub struct SlackNotifier {
    http: Arc<dyn HttpPort>,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new(http: Arc<dyn HttpPort>, webhook_url: &str) -> Self {
        Self {
            http,
            webhook_url: webhook_url.to_string(),
        }
    }
}

impl NotifierPort for SlackNotifier {
    fn notify(&self, message: &str) {
        let request = HttpRequest::post_json(&self.webhook_url, &serde_json::json!({ "text": message }));
        match self.http.send(&request) {
            Ok(resp) if resp.is_success() => info!("alert sent"),
            Ok(resp) => warn!(status = resp.status, "slack webhook rejected alert"),
            Err(e) => warn!("slack webhook unreachable: {e}"),
        }
    }
}

/// Fallback when no webhook is configured.
pub struct LogNotifier;

impl NotifierPort for LogNotifier {
    fn notify(&self, message: &str) {
        error!(alert = message, "pipeline alert");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::stub_http::StubHttp;
    use crate::ports::http_port::Method;

    #[test]
    fn posts_text_payload() {
        let http = Arc::new(StubHttp::new().route("hooks.slack", 200, "ok"));
        let notifier = SlackNotifier::new(http.clone(), "https://hooks.slack.test/T000/B000");
        notifier.notify("Daily ETL failed: boom");

        let requests = http.requests.borrow();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Post);
        let body: serde_json::Value =
            serde_json::from_slice(requests[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body["text"], "Daily ETL failed: boom");
    }

    #[test]
    fn webhook_failure_is_swallowed() {
        let http = Arc::new(StubHttp::new().route("hooks.slack", 500, "invalid_token"));
        let notifier = SlackNotifier::new(http.clone(), "https://hooks.slack.test/T000/B000");
        notifier.notify("still returns");
        assert_eq!(http.calls(), 1);
    }
}
