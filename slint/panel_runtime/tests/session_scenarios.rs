use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tungstenite::Message;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tweak_panel_runtime::protocol::{SUB_PROTOCOL, encode_client_message};
use tweak_panel_runtime::serde_json::{Value, json};
use tweak_panel_runtime::transport::{self, TransportSettings};
use tweak_panel_runtime::{
    ClientMessage, Command, ConnectionStatus, FieldRegistry, Handle, Session, SessionEvent,
    TransportEvent,
};

const URL: &str = "ws://127.0.0.1:8080/socket";

const GAIN_HELLO: &str = r#"{"type":"hello","vars":[
    {"handle":"h1","name":"Gain","datatype":"float","value":1.5,
     "options":{"min":0,"max":10,"step":0.1}}
]}"#;

fn transport_event(generation: u64, event: TransportEvent) -> SessionEvent {
    SessionEvent::Transport { generation, event }
}

fn message(generation: u64, payload: &str) -> SessionEvent {
    transport_event(generation, TransportEvent::Message(payload.to_string()))
}

fn commit(key: &str, text: &str) -> SessionEvent {
    SessionEvent::FieldCommitted {
        key: key.to_string(),
        text: text.to_string(),
    }
}

/// Session after connect + open + the gain `hello`.
fn gain_session() -> Session {
    let mut session = Session::new(FieldRegistry::with_defaults(), URL);
    session.connect();
    session.dispatch(transport_event(1, TransportEvent::Opened));
    session.dispatch(message(1, GAIN_HELLO));
    session
}

#[test]
fn hello_renders_constrained_gain_field() {
    let mut session = Session::new(FieldRegistry::with_defaults(), URL);
    session.connect();
    let opened = session.dispatch(transport_event(1, TransportEvent::Opened));
    assert_eq!(opened, vec![Command::Status(ConnectionStatus::Connected)]);

    let commands = session.dispatch(message(1, GAIN_HELLO));
    let [Command::Render(view)] = &commands[..] else {
        panic!("expected one render, got {commands:?}");
    };

    assert_eq!(view.handle, Handle::from("h1"));
    assert_eq!(view.name, "Gain");
    assert_eq!(view.text, "1.5");
    assert_eq!(view.attributes["min"], json!(0));
    assert_eq!(view.attributes["max"], json!(10));
    assert_eq!(view.attributes["step"], json!(0.1));
    assert!(session.has_hello());
}

#[test]
fn user_edit_sends_update_with_serialized_value() {
    let mut session = gain_session();

    let commands = session.dispatch(commit("s:h1", "3.2"));
    assert_eq!(
        commands,
        vec![Command::Send(ClientMessage::Update {
            handle: Handle::from("h1"),
            value: json!(3.2),
        })]
    );

    let Command::Send(update) = &commands[0] else {
        unreachable!();
    };
    let wire: Value =
        tweak_panel_runtime::serde_json::from_str(&encode_client_message(update).expect("encode"))
            .expect("json");
    assert_eq!(wire, json!({"type": "update", "handle": "h1", "value": 3.2}));
}

#[test]
fn refresh_shows_value_without_echoing_update() {
    let mut session = gain_session();
    let sent_before = session.stats().updates_sent;

    let commands = session.dispatch(message(
        1,
        r#"{"type":"refresh","vars":[{"handle":"h1","value":4.0}]}"#,
    ));

    assert_eq!(
        commands,
        vec![Command::ShowValue {
            handle: Handle::from("h1"),
            text: "4.0".to_string(),
        }]
    );
    assert!(!commands.iter().any(|c| matches!(c, Command::Send(_))));
    assert_eq!(session.stats().updates_sent, sent_before);
}

#[test]
fn refresh_for_unknown_handle_is_recorded_and_dropped() {
    let mut session = gain_session();

    let commands = session.dispatch(message(
        1,
        r#"{"type":"refresh","vars":[{"handle":"h9","value":1}]}"#,
    ));

    assert!(commands.is_empty());
    assert!(!session.store().contains(&Handle::from("h9")));
    assert_eq!(session.store().len(), 1);
    assert_eq!(session.stats().entry_issues, 1);
}

#[test]
fn close_offers_reconnect_which_goes_back_through_connecting() {
    let mut session = gain_session();

    let commands = session.dispatch(transport_event(1, TransportEvent::Closed));
    assert_eq!(commands, vec![Command::Status(ConnectionStatus::Disconnected)]);
    assert!(session.status().can_reconnect());

    let commands = session.dispatch(SessionEvent::ReconnectRequested);
    assert!(matches!(
        &commands[..],
        [Command::Status(ConnectionStatus::Connecting), Command::Open(open)]
            if open.generation == 2 && open.protocol == SUB_PROTOCOL
    ));

    // A late close from the first socket does not disturb the new attempt.
    assert!(
        session
            .dispatch(transport_event(1, TransportEvent::Closed))
            .is_empty()
    );
    assert_eq!(session.status(), ConnectionStatus::Connecting);

    session.dispatch(transport_event(2, TransportEvent::Opened));
    assert_eq!(session.status(), ConnectionStatus::Connected);
}

#[test]
fn session_round_trips_over_a_real_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let callback = |request: &Request,
                        mut response: Response|
         -> Result<Response, ErrorResponse> {
            if let Some(offered) = request.headers().get("Sec-WebSocket-Protocol") {
                response
                    .headers_mut()
                    .insert("Sec-WebSocket-Protocol", offered.clone());
            }
            Ok(response)
        };
        let mut ws = tungstenite::accept_hdr(stream, callback).expect("handshake");
        ws.send(Message::text(GAIN_HELLO)).expect("send hello");
        let update = ws.read().expect("read update");
        let _ = ws.close(None);
        update.into_text().expect("text").as_str().to_owned()
    });

    let mut session = Session::new(FieldRegistry::with_defaults(), format!("ws://{addr}/socket"));
    let (events_tx, events_rx) = mpsc::channel();
    let settings = TransportSettings {
        outbound_queue_cap: 4,
        max_message_bytes: 1 << 20,
        poll_interval: Duration::from_millis(10),
    };

    let mut live = None;
    let mut pending = session.connect();
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut edited = false;

    while Instant::now() < deadline {
        for command in pending.drain(..) {
            match command {
                Command::Open(open) => {
                    live = Some(transport::spawn(open, settings, events_tx.clone()));
                }
                Command::Send(update) => {
                    let payload = encode_client_message(&update).expect("encode");
                    live.as_ref()
                        .expect("transport open")
                        .sender()
                        .try_send(payload)
                        .expect("queue update");
                }
                _ => {}
            }
        }

        if session.has_hello() && !edited {
            edited = true;
            pending = session.dispatch(commit("s:h1", "7.25"));
            continue;
        }

        let Ok(event) = events_rx.recv_timeout(Duration::from_millis(100)) else {
            continue;
        };
        pending = session.dispatch(event);
        if session.status() == ConnectionStatus::Disconnected {
            break;
        }
    }

    let received: Value =
        tweak_panel_runtime::serde_json::from_str(&server.join().expect("server")).expect("json");
    assert_eq!(received, json!({"type": "update", "handle": "h1", "value": 7.25}));
    assert_eq!(session.stats().updates_sent, 1);
}
