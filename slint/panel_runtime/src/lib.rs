pub mod bootstrap;
pub mod config;
pub mod connection;
pub mod datatype;
pub mod error;
pub mod field;
pub mod protocol;
pub mod session;
pub mod store;
pub mod transport;
pub mod variable;

use std::marker::PhantomData;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError};
use std::thread;
use std::time::{Duration, Instant};

use slint::ComponentHandle;
use tracing::{debug, error, info, warn};

use crate::bootstrap::Bootstrap;
use crate::protocol::encode_client_message;
use crate::transport::{TransportHandle, TransportSettings};

pub use crate::bootstrap::Progress;
pub use crate::config::PanelConfig;
pub use crate::connection::ConnectionStatus;
pub use crate::datatype::Datatype;
pub use crate::error::{FieldError, PanelError, Result};
pub use crate::field::{Field, FieldRegistry, NumericField, Options};
pub use crate::protocol::{ClientMessage, Handle};
pub use crate::session::{Command, Session, SessionEvent, SessionStats, TransportEvent};
pub use crate::variable::FieldView;
pub use serde_json;

pub const STEP_VALIDATE: &str = "Validating socket endpoint";
pub const STEP_REGISTER: &str = "Registering field types";
pub const STEP_CONNECT: &str = "Connecting to application";
pub const STEP_RENDER: &str = "Rendering variables";

/// Glue between the session and a concrete slint window.
///
/// Every method except the `bind_*` ones runs on the UI event loop.
/// Variables are addressed by `key`, the [`Handle::key`] of their handle.
pub trait HostBindings: 'static {
    type Ui: ComponentHandle + 'static;

    fn new_ui() -> std::result::Result<Self::Ui, slint::PlatformError>;

    /// `handler(key, text)` must fire once per committed edit.
    fn bind_field_committed<F>(ui: &Self::Ui, handler: F)
    where
        F: Fn(String, String) + Send + 'static;

    fn bind_reconnect<F>(ui: &Self::Ui, handler: F)
    where
        F: Fn() + Send + 'static;

    /// Appends one labelled field to the panel.
    fn attach_variable(ui: &Self::Ui, view: &FieldView);

    /// Replaces the text shown by an attached field without firing
    /// `field_committed`.
    fn show_value(ui: &Self::Ui, key: &str, text: &str);

    fn set_status(ui: &Self::Ui, status: ConnectionStatus);
    fn set_progress(ui: &Self::Ui, progress: &Progress);
    fn show_failure(ui: &Self::Ui, message: &str);
    fn reveal_panel(ui: &Self::Ui);
}

/// Runs the panel with the built-in field types.
pub fn run<B: HostBindings>(config: PanelConfig) -> std::result::Result<(), Box<dyn std::error::Error>> {
    run_with_registry::<B>(config, FieldRegistry::new())
}

/// Runs the panel with host-registered field types. Numeric datatypes the
/// registry leaves unclaimed get the built-in numeric field.
pub fn run_with_registry<B: HostBindings>(
    config: PanelConfig,
    registry: FieldRegistry,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let ui = B::new_ui()?;
    let (events_tx, events_rx) = mpsc::channel();

    install_callbacks::<B>(&ui, &events_tx);

    let driver = Driver::<B>::new(ui.as_weak(), events_tx.clone(), &config);
    let session = Session::new(registry, config.url.clone());
    let panel = PanelLoop::new(session, driver, events_rx, config);

    let session_handle = thread::spawn(move || panel.run());

    ui.run()?;

    // Drop UI first so callback closures release their sender clones.
    drop(ui);
    if events_tx.send(SessionEvent::Shutdown).is_err() {
        debug!("session thread already gone at shutdown");
    }
    drop(events_tx);

    let deadline = Instant::now() + SHUTDOWN_GRACE;
    while !session_handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }

    if session_handle.is_finished() {
        match session_handle.join() {
            Ok(stats) => info!(?stats, "session finished"),
            Err(err) => error!("session thread join failed: {err:?}"),
        }
    } else {
        // Avoid hanging process exit on a blocked bootstrap step.
        warn!("session thread still active during shutdown; skipping join");
    }

    Ok(())
}

const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

fn install_callbacks<B: HostBindings>(ui: &B::Ui, events: &Sender<SessionEvent>) {
    let commit_tx = events.clone();
    B::bind_field_committed(ui, move |key, text| {
        if key.is_empty() {
            return;
        }
        if commit_tx
            .send(SessionEvent::FieldCommitted { key, text })
            .is_err()
        {
            warn!("session gone; edit dropped");
        }
    });

    let reconnect_tx = events.clone();
    B::bind_reconnect(ui, move || {
        if reconnect_tx.send(SessionEvent::ReconnectRequested).is_err() {
            warn!("session gone; reconnect ignored");
        }
    });
}

/// Side effects of the session loop. The window-backed [`Driver`] is the
/// only production implementation.
trait Executor: 'static {
    fn execute(&mut self, commands: Vec<Command>);
    fn progress(&mut self, progress: &Progress);
    fn reveal(&mut self);
    /// Drops the live socket, if any.
    fn close_transport(&mut self);
    fn show_failure(&mut self, banner: &str);
}

/// Executes session commands against the UI and the live transport.
struct Driver<B: HostBindings> {
    ui: slint::Weak<B::Ui>,
    events: Sender<SessionEvent>,
    settings: TransportSettings,
    transport: Option<TransportHandle>,
    dropped_updates: u64,
    _bindings: PhantomData<fn() -> B>,
}

impl<B: HostBindings> Driver<B> {
    fn new(ui: slint::Weak<B::Ui>, events: Sender<SessionEvent>, config: &PanelConfig) -> Self {
        Self {
            ui,
            events,
            settings: TransportSettings {
                outbound_queue_cap: config.outbound_queue_cap,
                max_message_bytes: config.max_message_bytes,
                poll_interval: config.poll_interval,
            },
            transport: None,
            dropped_updates: 0,
            _bindings: PhantomData,
        }
    }

    fn send(&mut self, message: &ClientMessage) {
        let payload = match encode_client_message(message) {
            Ok(payload) => payload,
            Err(err) => {
                error!(%err, "failed to encode update");
                return;
            }
        };
        let Some(transport) = &self.transport else {
            warn!("no transport; update dropped");
            return;
        };
        queue_update(
            transport.sender(),
            payload,
            &mut self.dropped_updates,
            self.settings.outbound_queue_cap,
        );
    }

    fn on_ui<F>(&self, apply: F)
    where
        F: FnOnce(&B::Ui) + Send + 'static,
    {
        if let Err(err) = self.ui.upgrade_in_event_loop(move |ui| apply(&ui)) {
            debug!(%err, "ui event loop gone; update dropped");
        }
    }
}

impl<B: HostBindings> Executor for Driver<B> {
    fn execute(&mut self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::Open(open) => {
                    // Dropping the previous handle closes its socket.
                    self.transport = None;
                    debug!(generation = open.generation, url = %open.url, "opening transport");
                    self.transport = Some(transport::spawn(open, self.settings, self.events.clone()));
                }
                Command::Send(message) => self.send(&message),
                Command::Render(view) => self.on_ui(move |ui| B::attach_variable(ui, &view)),
                Command::ShowValue { handle, text } => {
                    let key = handle.key();
                    self.on_ui(move |ui| B::show_value(ui, &key, &text));
                }
                Command::Status(status) => self.on_ui(move |ui| B::set_status(ui, status)),
            }
        }
    }

    fn progress(&mut self, progress: &Progress) {
        let progress = progress.clone();
        self.on_ui(move |ui| B::set_progress(ui, &progress));
    }

    fn reveal(&mut self) {
        self.on_ui(B::reveal_panel);
    }

    fn close_transport(&mut self) {
        if self.transport.take().is_some() {
            debug!("transport closed");
        }
    }

    fn show_failure(&mut self, banner: &str) {
        let banner = banner.to_string();
        self.on_ui(move |ui| B::show_failure(ui, &banner));
    }
}

/// Session state plus everything the startup steps and the event loop touch.
struct PanelLoop<E: Executor> {
    session: Session,
    executor: E,
    events: Receiver<SessionEvent>,
    config: PanelConfig,
    shutdown: bool,
}

impl<E: Executor> PanelLoop<E> {
    fn new(session: Session, executor: E, events: Receiver<SessionEvent>, config: PanelConfig) -> Self {
        Self {
            session,
            executor,
            events,
            config,
            shutdown: false,
        }
    }

    fn run(mut self) -> SessionStats {
        if self.start() {
            self.event_loop();
        } else if !self.shutdown {
            self.wait_for_shutdown();
        }
        self.session.stats()
    }

    /// Runs the startup steps. Returns `true` once the panel is revealed.
    fn start(&mut self) -> bool {
        let outcome =
            startup::<E>().run(self, |panel, progress| panel.executor.progress(progress));

        match outcome {
            Ok(()) => {
                info!(variables = self.session.store().len(), "panel ready");
                true
            }
            Err(_) if self.shutdown => false,
            Err(err) => {
                self.fail(&err);
                false
            }
        }
    }

    /// A failed startup is terminal: no socket stays open and reconnect is
    /// not offered.
    fn fail(&mut self, err: &PanelError) {
        self.executor.close_transport();
        self.executor
            .execute(vec![Command::Status(ConnectionStatus::Disconnected)]);
        self.executor.show_failure(&failure_banner(&err.to_string()));
    }

    fn event_loop(&mut self) {
        while let Ok(event) = self.events.recv() {
            if !self.dispatch(event) {
                break;
            }
        }
    }

    /// Handles one event. Returns `false` once shutdown was requested.
    fn dispatch(&mut self, event: SessionEvent) -> bool {
        if event == SessionEvent::Shutdown {
            self.shutdown = true;
            return false;
        }
        let commands = self.session.dispatch(event);
        self.executor.execute(commands);
        true
    }

    fn wait_for_shutdown(&mut self) {
        while let Ok(event) = self.events.recv() {
            if event == SessionEvent::Shutdown {
                self.shutdown = true;
                return;
            }
        }
    }

    fn register_fields(&mut self) -> std::result::Result<(), String> {
        let registry = self.session.registry_mut();
        registry.install_defaults();
        if registry.is_empty() {
            return Err("no field types available".to_string());
        }
        info!(field_types = registry.len(), ?registry, "field types registered");
        Ok(())
    }

    /// Opens the first connection and processes events until the first
    /// `hello` arrives, the attempt fails, or the timeout elapses.
    fn connect_and_wait(&mut self) -> std::result::Result<(), String> {
        let commands = self.session.connect();
        self.executor.execute(commands);

        let deadline = Instant::now() + self.config.connect_timeout;
        while !self.session.has_hello() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = match self.events.recv_timeout(remaining) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(format!(
                        "no hello from {} within {} ms",
                        self.config.url,
                        self.config.connect_timeout.as_millis()
                    ));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err("event channel closed".to_string());
                }
            };

            if !self.dispatch(event) {
                return Err("shutdown requested".to_string());
            }

            if self.session.status() == ConnectionStatus::Disconnected
                && !self.session.has_hello()
            {
                let reason = self
                    .session
                    .connection()
                    .last_error()
                    .unwrap_or("connection closed before hello")
                    .to_string();
                return Err(reason);
            }
        }
        Ok(())
    }

    /// Waits out the reveal delay, still servicing events, then shows the
    /// panel.
    fn reveal(&mut self) -> std::result::Result<(), String> {
        let deadline = Instant::now() + self.config.reveal_delay;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.events.recv_timeout(remaining) {
                Ok(event) => {
                    if !self.dispatch(event) {
                        return Err("shutdown requested".to_string());
                    }
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err("event channel closed".to_string());
                }
            }
        }
        self.executor.reveal();
        Ok(())
    }
}

fn startup<E: Executor>() -> Bootstrap<PanelLoop<E>> {
    Bootstrap::new()
        .step(STEP_VALIDATE, |panel: &mut PanelLoop<E>| {
            transport::validate_url(&panel.config.url).map_err(|err| err.to_string())
        })
        .step(STEP_REGISTER, |panel: &mut PanelLoop<E>| panel.register_fields())
        .step(STEP_CONNECT, |panel: &mut PanelLoop<E>| panel.connect_and_wait())
        .step(STEP_RENDER, |panel: &mut PanelLoop<E>| panel.reveal())
}

/// Banner text for a failed startup. `error` already names the step.
#[must_use]
pub fn failure_banner(error: &str) -> String {
    let detail = error.strip_prefix("task failed: ").unwrap_or(error);
    format!("Task failed: {detail}")
}

fn queue_update(
    tx: &SyncSender<String>,
    payload: String,
    dropped_updates: &mut u64,
    queue_capacity: usize,
) {
    match tx.try_send(payload) {
        Ok(()) => {}
        Err(TrySendError::Full(_payload)) => {
            *dropped_updates += 1;
            let dropped = *dropped_updates;
            if dropped == 1 || dropped.is_power_of_two() {
                warn!("outbound queue full (cap={queue_capacity}); dropped {dropped} update(s)");
            }
        }
        Err(TrySendError::Disconnected(_payload)) => {
            warn!("transport gone; update dropped");
        }
    }
}
