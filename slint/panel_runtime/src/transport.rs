//! Blocking websocket client, one I/O thread per connection generation.

use std::io;
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TryRecvError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};
use tungstenite::client::IntoClientRequest;
use tungstenite::http::HeaderValue;
use tungstenite::protocol::WebSocketConfig;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Error as WsError, Message, WebSocket};

use crate::connection::OpenRequest;
use crate::error::{PanelError, Result};
use crate::session::{SessionEvent, TransportEvent};

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    pub outbound_queue_cap: usize,
    pub max_message_bytes: usize,
    pub poll_interval: Duration,
}

/// Sending half of a live transport. Dropping it closes the connection.
#[derive(Debug)]
pub struct TransportHandle {
    outbound: SyncSender<String>,
}

impl TransportHandle {
    /// Bounded queue of text frames drained by the I/O thread.
    pub fn sender(&self) -> &SyncSender<String> {
        &self.outbound
    }
}

/// Checks that `url` can form a websocket client request.
pub fn validate_url(url: &str) -> Result<()> {
    url.into_client_request()
        .map(|_| ())
        .map_err(|err| PanelError::Transport(format!("invalid socket url {url}: {err}")))
}

pub fn spawn(
    open: OpenRequest,
    settings: TransportSettings,
    events: Sender<SessionEvent>,
) -> TransportHandle {
    let (outbound, outbound_rx) = mpsc::sync_channel(settings.outbound_queue_cap);
    let generation = open.generation;

    thread::spawn(move || {
        let emit = |event| {
            let _ = events.send(SessionEvent::Transport { generation, event });
        };

        match connect(&open, &settings) {
            Ok(socket) => {
                emit(TransportEvent::Opened);
                match pump(socket, &outbound_rx, &emit) {
                    Ok(()) => emit(TransportEvent::Closed),
                    Err(err) => emit(TransportEvent::Errored(err.to_string())),
                }
            }
            Err(err) => emit(TransportEvent::Errored(err.to_string())),
        }
        debug!(generation, "transport thread exiting");
    });

    TransportHandle { outbound }
}

fn connect(open: &OpenRequest, settings: &TransportSettings) -> Result<Socket> {
    let mut request = open
        .url
        .as_str()
        .into_client_request()
        .map_err(|err| PanelError::Transport(format!("invalid socket url: {err}")))?;
    let protocol = HeaderValue::from_str(&open.protocol)
        .map_err(|err| PanelError::Transport(format!("invalid sub-protocol: {err}")))?;
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", protocol);

    let ws_config = WebSocketConfig::default()
        .max_message_size(Some(settings.max_message_bytes))
        .max_frame_size(Some(settings.max_message_bytes));

    let (mut socket, _response) =
        tungstenite::client::connect_with_config(request, Some(ws_config), 3)
            .map_err(|err| PanelError::Transport(format!("handshake failed: {err}")))?;

    if let MaybeTlsStream::Plain(stream) = socket.get_mut() {
        stream
            .set_read_timeout(Some(settings.poll_interval))
            .map_err(|err| PanelError::Transport(err.to_string()))?;
    }

    Ok(socket)
}

/// Alternates between flushing queued frames and reading one message.
/// Returns `Ok(())` on an orderly close from either side.
fn pump<E>(mut socket: Socket, outbound: &Receiver<String>, emit: &E) -> Result<()>
where
    E: Fn(TransportEvent),
{
    loop {
        loop {
            match outbound.try_recv() {
                Ok(payload) => socket
                    .send(Message::text(payload))
                    .map_err(|err| PanelError::Transport(format!("send failed: {err}")))?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    let _ = socket.close(None);
                    let _ = socket.flush();
                    return Ok(());
                }
            }
        }

        match socket.read() {
            Ok(Message::Text(text)) => emit(TransportEvent::Message(text.as_str().to_owned())),
            Ok(Message::Close(_)) => return Ok(()),
            Ok(_) => {}
            Err(WsError::Io(err))
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) => {}
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return Ok(()),
            Err(err) => {
                warn!(%err, "websocket read failed");
                return Err(PanelError::Transport(format!("read failed: {err}")));
            }
        }
    }
}
