mod bindings;

use clap::Parser;
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tweak_panel_runtime::PanelConfig;
use tweak_panel_runtime::protocol::socket_url;

slint::include_modules!();

#[derive(Debug, Parser)]
#[command(
    name = "tweak_panel",
    about = "Live control panel for an application's tunable variables",
    version
)]
struct Args {
    /// Application host and port; `/socket` is appended.
    #[arg(long)]
    host: Option<String>,

    /// Full websocket URL. Takes precedence over `--host`.
    #[arg(long)]
    url: Option<String>,

    /// Updates buffered for the socket before new ones are dropped.
    #[arg(long)]
    outbound_queue_cap: Option<usize>,

    /// How long startup waits for the application's first hello.
    #[arg(long)]
    connect_timeout_ms: Option<u64>,
}

impl Args {
    /// Flags override the `TWEAK_PANEL_*` environment.
    fn apply(self, config: &mut PanelConfig) {
        if let Some(host) = self.host {
            config.url = socket_url(&host);
        }
        if let Some(url) = self.url {
            config.url = url;
        }
        if let Some(cap) = self.outbound_queue_cap.filter(|cap| *cap > 0) {
            config.outbound_queue_cap = cap;
        }
        if let Some(ms) = self.connect_timeout_ms.filter(|ms| *ms > 0) {
            config.connect_timeout = Duration::from_millis(ms);
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = PanelConfig::from_env();
    Args::parse().apply(&mut config);
    tracing::info!(url = %config.url, "starting tweak panel");

    if let Err(err) = tweak_panel_runtime::run::<bindings::PanelWindow>(config) {
        tracing::error!("tweak_panel fatal error: {err}");
        process::exit(1);
    }
}
