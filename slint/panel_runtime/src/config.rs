use std::time::Duration;

use crate::protocol::{INBOUND_MESSAGE_CAP, socket_url};

const DEFAULT_HOST: &str = "127.0.0.1:8080";
const DEFAULT_OUTBOUND_QUEUE_CAP: usize = 256;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REVEAL_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runtime configuration for one panel session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelConfig {
    /// Websocket endpoint of the application.
    pub url: String,
    /// Updates buffered for the transport before new ones are dropped.
    pub outbound_queue_cap: usize,
    /// Largest inbound message accepted by the transport.
    pub max_message_bytes: usize,
    /// How long the startup connect step waits for the first `hello`.
    pub connect_timeout: Duration,
    /// Pause between finishing startup and revealing the panel.
    pub reveal_delay: Duration,
    /// Transport read timeout between outbound queue polls.
    pub poll_interval: Duration,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            url: socket_url(DEFAULT_HOST),
            outbound_queue_cap: DEFAULT_OUTBOUND_QUEUE_CAP,
            max_message_bytes: INBOUND_MESSAGE_CAP,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reveal_delay: DEFAULT_REVEAL_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PanelConfig {
    /// Defaults overridden by `TWEAK_PANEL_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("TWEAK_PANEL_HOST").filter(|host| !host.is_empty()) {
            config.url = socket_url(&host);
        }
        if let Some(url) = lookup("TWEAK_PANEL_URL").filter(|url| !url.is_empty()) {
            config.url = url;
        }
        if let Some(cap) = parse_positive(lookup("TWEAK_PANEL_OUTBOUND_QUEUE_CAP")) {
            config.outbound_queue_cap = cap;
        }
        if let Some(ms) = parse_positive(lookup("TWEAK_PANEL_CONNECT_TIMEOUT_MS")) {
            config.connect_timeout = Duration::from_millis(ms as u64);
        }

        config
    }
}

fn parse_positive(raw: Option<String>) -> Option<usize> {
    raw.and_then(|raw| raw.parse::<usize>().ok())
        .filter(|value| *value > 0)
}
